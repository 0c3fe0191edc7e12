//! Graph node entries.
//!
//! Each entry pairs a [`NodeId`] with a [`NodeKind`] and caches the node's
//! [`NodeDescription`] at insertion time, so compilation never calls back into
//! node code.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::node::{Node, NodeDescription, NodeId, PortKind};

/// Shared handle to a node implementation.
///
/// The graph keeps one handle and every compiled program that references the
/// node keeps another; the engine locks it only while running the node.
pub type NodeHandle = Arc<Mutex<Box<dyn Node>>>;

/// Port name of the sink's left input.
pub const SINK_LEFT: &str = "in:left";
/// Port name of the sink's right input.
pub const SINK_RIGHT: &str = "in:right";

/// The role of a node in the graph.
#[derive(Clone)]
pub enum NodeKind {
    /// A user-supplied processing node.
    Processor(NodeHandle),
    /// The stereo output. Compiles to `OUTPUT_STEREO` instead of a call.
    Sink,
}

impl NodeKind {
    /// Returns true for the sink.
    #[inline]
    pub fn is_sink(&self) -> bool {
        matches!(self, Self::Sink)
    }
}

impl core::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Processor(_) => f.write_str("Processor"),
            Self::Sink => f.write_str("Sink"),
        }
    }
}

/// A node owned by a [`Graph`](super::Graph).
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) description: NodeDescription,
}

impl GraphNode {
    pub(crate) fn processor(id: NodeId, node: Box<dyn Node>) -> Self {
        let description = node.description();
        Self {
            id,
            kind: NodeKind::Processor(Arc::new(Mutex::new(node))),
            description,
        }
    }

    pub(crate) fn sink(id: NodeId) -> Self {
        Self {
            id,
            kind: NodeKind::Sink,
            description: NodeDescription::new()
                .with_input(SINK_LEFT, PortKind::Audio)
                .with_input(SINK_RIGHT, PortKind::Audio),
        }
    }

    /// Node identifier.
    #[inline]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Node role.
    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Ports and parameters, captured when the node was added.
    #[inline]
    pub fn description(&self) -> &NodeDescription {
        &self.description
    }

    /// Handle to the implementation, `None` for the sink.
    pub fn handle(&self) -> Option<&NodeHandle> {
        match &self.kind {
            NodeKind::Processor(handle) => Some(handle),
            NodeKind::Sink => None,
        }
    }
}
