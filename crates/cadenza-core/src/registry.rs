//! Node factories and the resources they share.
//!
//! [`NodeRegistry`] maps kind names to factory functions so graphs can be
//! built from descriptions at runtime. Factories receive a
//! [`SharedResources`] registry for state that several node instances reuse
//! (sample banks, lookup tables); entries are reference-counted and can be
//! evicted explicitly once no node holds them.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::node::{Node, NodeError, NodeId, NodeParams};

type SharedEntry = Arc<dyn Any + Send + Sync>;

/// Keyed, type-erased, reference-counted resources.
#[derive(Default)]
pub struct SharedResources {
    entries: Mutex<HashMap<String, SharedEntry>>,
}

impl SharedResources {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the resource stored under `key`, creating it with `init` if
    /// absent.
    ///
    /// Fails if `key` already holds a resource of a different type.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Result<Arc<T>, NodeError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(init()) as SharedEntry);
        Arc::clone(entry)
            .downcast::<T>()
            .map_err(|_| NodeError::Setup(format!("shared resource '{key}' has another type")))
    }

    /// Returns the resource stored under `key`, if present with type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .and_then(|e| Arc::clone(e).downcast::<T>().ok())
    }

    /// Drops every entry no node holds any more. Returns how many were dropped.
    pub fn evict_unused(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| Arc::strong_count(e) > 1);
        before - entries.len()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl core::fmt::Debug for SharedResources {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let entries = self.entries.lock();
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        f.debug_struct("SharedResources").field("keys", &keys).finish()
    }
}

/// Describes a registered node kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeKindDescriptor {
    /// Kind name used in graph descriptions (lowercase, no spaces).
    pub kind: &'static str,
    /// One-line summary.
    pub description: &'static str,
}

/// Factory function type for creating nodes.
pub type NodeFactory =
    fn(&NodeId, &NodeParams, &SharedResources) -> Result<Box<dyn Node>, NodeError>;

struct RegistryEntry {
    descriptor: NodeKindDescriptor,
    factory: NodeFactory,
}

/// Registry of node kinds.
#[derive(Default)]
pub struct NodeRegistry {
    entries: Vec<RegistryEntry>,
    resources: SharedResources,
}

impl NodeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a kind, replacing any earlier registration with the same name.
    pub fn register(&mut self, descriptor: NodeKindDescriptor, factory: NodeFactory) {
        self.entries.retain(|e| e.descriptor.kind != descriptor.kind);
        self.entries.push(RegistryEntry {
            descriptor,
            factory,
        });
    }

    /// Descriptors for all registered kinds, in registration order.
    pub fn kinds(&self) -> Vec<&NodeKindDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    /// Looks up a kind.
    pub fn get(&self, kind: &str) -> Option<&NodeKindDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.kind == kind)
            .map(|e| &e.descriptor)
    }

    /// Creates a node of the given kind.
    pub fn create(
        &self,
        kind: &str,
        id: &NodeId,
        params: &NodeParams,
    ) -> Result<Box<dyn Node>, NodeError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.descriptor.kind == kind)
            .ok_or_else(|| NodeError::UnknownKind(kind.to_owned()))?;
        (entry.factory)(id, params, &self.resources)
    }

    /// Resources shared by all nodes this registry creates.
    pub fn resources(&self) -> &SharedResources {
        &self.resources
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no kinds are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
