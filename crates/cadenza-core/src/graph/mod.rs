//! Processing graph: nodes, typed port connections, and dependency order.
//!
//! [`Graph`] is owned by the control thread. It holds nodes (user processors
//! plus at most one stereo sink) and port-to-port connections, and rejects any
//! mutation that would break its invariants:
//!
//! - every connection joins an output port to an input port of the same kind
//! - an input port has at most one upstream connection
//! - the connection relation is acyclic
//!
//! A rejected mutation leaves the graph unchanged. The compiler
//! ([`crate::compiler::compile`]) turns a validated graph into a
//! [`Spec`](crate::Spec); the graph itself is never touched by the audio
//! thread, which only sees the node handles carried by a
//! [`Program`](crate::Program).
//!
//! # Example
//!
//! ```rust,ignore
//! use cadenza_core::{Graph, PortRef};
//!
//! let mut graph = Graph::new(48000.0, 256);
//! graph.add_node("osc", Box::new(Oscillator::default()))?;
//! graph.add_sink("out")?;
//! graph.connect("osc:out".parse()?, "out:in:left".parse()?)?;
//! graph.connect("osc:out".parse()?, "out:in:right".parse()?)?;
//! let program = cadenza_core::compile(&graph, 4096)?;
//! ```

mod node;
mod port;
mod topology;

pub use node::{GraphNode, NodeHandle, NodeKind, SINK_LEFT, SINK_RIGHT};
pub use port::{Connection, PortRef};

use std::sync::Arc;

use crate::node::{Node, NodeError, NodeId, ParamValue, PortDirection, PortKind, SetupContext};

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur during graph operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Node ids must be non-empty and free of `:`.
    #[error("invalid node id '{0}'")]
    InvalidNodeId(String),

    /// A node with this id is already in the graph.
    #[error("node '{0}' already exists")]
    DuplicateNode(NodeId),

    /// The node is not owned by this graph.
    #[error("node '{0}' not found")]
    NodeNotFound(NodeId),

    /// A port address could not be parsed.
    #[error("invalid port reference '{0}' (expected node:port)")]
    InvalidPortRef(String),

    /// The node exists but has no such port.
    #[error("port '{0}' not found")]
    PortNotFound(PortRef),

    /// A connection must run from an output to an input.
    #[error("port '{port}' is not an {expected} port")]
    DirectionMismatch {
        /// Offending port.
        port: PortRef,
        /// Direction the connection required.
        expected: PortDirection,
    },

    /// Connected ports carry different kinds of data.
    #[error("cannot connect {from} ({from_kind}) to {to} ({to_kind})")]
    TypeMismatch {
        /// Upstream port.
        from: PortRef,
        /// Upstream port kind.
        from_kind: PortKind,
        /// Downstream port.
        to: PortRef,
        /// Downstream port kind.
        to_kind: PortKind,
    },

    /// The input port already has an upstream connection.
    #[error("input '{0}' is already connected")]
    AlreadyConnected(PortRef),

    /// The input port has no upstream connection.
    #[error("input '{0}' is not connected")]
    NotConnected(PortRef),

    /// The connection relation contains a cycle.
    #[error("cycle detected among nodes [{}]", join_ids(.nodes))]
    CycleDetected {
        /// Nodes that could not be ordered.
        nodes: Vec<NodeId>,
    },

    /// A connection refers to a node not in this graph.
    #[error("connection {0} refers to a node outside the graph")]
    DanglingConnection(String),

    /// A graph holds at most one sink.
    #[error("graph already has sink '{0}'")]
    SinkAlreadyPresent(NodeId),

    /// A node rejected a lifecycle or parameter call.
    #[error("node '{id}': {source}")]
    Node {
        /// Node that failed.
        id: NodeId,
        /// Underlying error.
        #[source]
        source: NodeError,
    },
}

/// Directed acyclic graph of processing nodes.
///
/// # Usage
///
/// 1. Create a graph with [`new()`](Self::new)
/// 2. Add nodes with [`add_node()`](Self::add_node) and
///    [`add_sink()`](Self::add_sink)
/// 3. Wire ports with [`connect()`](Self::connect)
/// 4. Compile with [`crate::compile`]
pub struct Graph {
    nodes: Vec<GraphNode>,
    connections: Vec<Connection>,
    setup: SetupContext,
}

impl Graph {
    /// Creates an empty graph.
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - Sample rate in Hz handed to every node's `setup`
    /// * `block_size` - Frames per block; sizes every audio buffer
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        Self {
            nodes: Vec::new(),
            connections: Vec::new(),
            setup: SetupContext {
                sample_rate,
                block_size,
            },
        }
    }

    /// Configuration handed to nodes on insertion.
    #[inline]
    pub fn setup_context(&self) -> SetupContext {
        self.setup
    }

    /// Frames per block.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.setup.block_size
    }

    /// Sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.setup.sample_rate
    }

    // --- Node mutations ---

    /// Adds a processing node and runs its `setup`.
    ///
    /// If `setup` fails the node is dropped and the graph is unchanged.
    pub fn add_node(
        &mut self,
        id: impl Into<NodeId>,
        mut node: Box<dyn Node>,
    ) -> Result<(), GraphError> {
        let id = id.into();
        self.check_new_id(&id)?;
        node.setup(&self.setup).map_err(|source| GraphError::Node {
            id: id.clone(),
            source,
        })?;
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_add: node {id}");
        self.nodes.push(GraphNode::processor(id, node));
        Ok(())
    }

    /// Adds the stereo sink with inputs `in:left` and `in:right`.
    pub fn add_sink(&mut self, id: impl Into<NodeId>) -> Result<(), GraphError> {
        let id = id.into();
        if let Some(existing) = self.sink() {
            return Err(GraphError::SinkAlreadyPresent(existing.id.clone()));
        }
        self.check_new_id(&id)?;
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_add: sink {id}");
        self.nodes.push(GraphNode::sink(id));
        Ok(())
    }

    /// Removes a node and detaches its connections.
    ///
    /// The node's `cleanup` runs now if the graph was its only owner.
    /// Otherwise a compiled [`Program`](crate::Program) still calls it, and
    /// `cleanup` runs when the last such program is dropped. Recompile and
    /// swap to stop running a removed node.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<(), GraphError> {
        let idx = self.position(id)?;
        self.connections
            .retain(|c| &c.from.node != id && &c.to.node != id);
        let removed = self.nodes.remove(idx);
        if let Some(handle) = removed.handle()
            && Arc::strong_count(handle) == 1
        {
            handle.lock().cleanup();
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_remove: node {id}");
        Ok(())
    }

    /// Looks up a node.
    pub fn find_node(&self, id: &NodeId) -> Result<&GraphNode, GraphError> {
        self.nodes
            .iter()
            .find(|n| &n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    /// Returns true if the node is in this graph.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|n| &n.id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// The sink, if one was added.
    pub fn sink(&self) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.kind.is_sink())
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Forwards a parameter change to a node.
    pub fn set_parameter(
        &mut self,
        id: &NodeId,
        name: &str,
        value: ParamValue,
    ) -> Result<(), GraphError> {
        let node = self.find_node(id)?;
        let handle = node.handle().ok_or_else(|| GraphError::Node {
            id: id.clone(),
            source: NodeError::UnknownParameter(name.to_owned()),
        })?;
        handle
            .lock()
            .set_parameter(name, value)
            .map_err(|source| GraphError::Node {
                id: id.clone(),
                source,
            })
    }

    // --- Connections ---

    /// Connects an output port to an input port.
    ///
    /// Returns an error, leaving the graph unchanged, if:
    /// - either node or port doesn't exist
    /// - `from` is not an output or `to` is not an input
    /// - the port kinds differ
    /// - `to` already has an upstream connection
    /// - the connection would create a cycle
    pub fn connect(&mut self, from: PortRef, to: PortRef) -> Result<(), GraphError> {
        let from_kind = self.port_kind(&from, PortDirection::Output)?;
        let to_kind = self.port_kind(&to, PortDirection::Input)?;
        if from_kind != to_kind {
            return Err(GraphError::TypeMismatch {
                from,
                from_kind,
                to,
                to_kind,
            });
        }
        if self.upstream(&to).is_some() {
            return Err(GraphError::AlreadyConnected(to));
        }
        // Adding from -> to closes a cycle iff `to` already reaches `from`.
        if topology::can_reach(&self.connections, &to.node, &from.node) {
            return Err(GraphError::CycleDetected {
                nodes: vec![from.node, to.node],
            });
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("graph_connect: {from} -> {to}");
        self.connections.push(Connection { from, to });
        Ok(())
    }

    /// Removes the connection feeding an input port and returns it.
    pub fn disconnect(&mut self, to: &PortRef) -> Result<Connection, GraphError> {
        let idx = self
            .connections
            .iter()
            .position(|c| &c.to == to)
            .ok_or_else(|| GraphError::NotConnected(to.clone()))?;
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_disconnect: {to}");
        Ok(self.connections.remove(idx))
    }

    /// The output port feeding `to`, if connected.
    pub fn upstream(&self, to: &PortRef) -> Option<&PortRef> {
        self.connections
            .iter()
            .find(|c| &c.to == to)
            .map(|c| &c.from)
    }

    /// All connections in insertion order.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    // --- Ordering ---

    /// Nodes in dependency order: every node after all nodes feeding it.
    ///
    /// Independent nodes keep insertion order.
    pub fn sorted_nodes(&self) -> Result<Vec<&GraphNode>, GraphError> {
        let order = topology::kahn_sort(&self.nodes, &self.connections)?;
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_sort: {} nodes in topo order", order.len());
        Ok(order.into_iter().map(|i| &self.nodes[i]).collect())
    }

    /// Checks that every connection stays inside the graph and that the
    /// dependency relation is acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        topology::kahn_sort(&self.nodes, &self.connections).map(|_| ())
    }

    // --- Internal ---

    #[cfg(test)]
    pub(crate) fn connections_mut_for_test(&mut self) -> &mut Vec<Connection> {
        &mut self.connections
    }

    fn check_new_id(&self, id: &NodeId) -> Result<(), GraphError> {
        if !id.is_valid() {
            return Err(GraphError::InvalidNodeId(id.to_string()));
        }
        if self.contains(id) {
            return Err(GraphError::DuplicateNode(id.clone()));
        }
        Ok(())
    }

    fn position(&self, id: &NodeId) -> Result<usize, GraphError> {
        self.nodes
            .iter()
            .position(|n| &n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    fn port_kind(&self, port: &PortRef, expected: PortDirection) -> Result<PortKind, GraphError> {
        let node = self.find_node(&port.node)?;
        let desc = node
            .description
            .port(&port.port)
            .ok_or_else(|| GraphError::PortNotFound(port.clone()))?;
        if desc.direction != expected {
            return Err(GraphError::DirectionMismatch {
                port: port.clone(),
                expected,
            });
        }
        Ok(desc.kind)
    }
}

impl core::fmt::Debug for Graph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.iter().map(|n| &n.id).collect::<Vec<_>>())
            .field("connections", &self.connections)
            .field("setup", &self.setup)
            .finish()
    }
}
