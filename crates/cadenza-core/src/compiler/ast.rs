//! Stage one: graph to instruction tree.
//!
//! Nodes are visited in dependency order. Each contributes one fragment
//! holding its buffer allocations, its port wiring, and the operation that
//! runs it. Buffers are named after the port they back (`node:port`).

use crate::buffer::BufferType;
use crate::graph::{Graph, GraphNode, NodeKind, PortRef, SINK_LEFT, SINK_RIGHT};
use crate::node::{NodeId, PortDescription, PortDirection, PortKind};

use super::CompileError;
use super::opcode::{AstOp, Op};

/// A node of the intermediate instruction tree.
#[derive(Clone, Debug, PartialEq)]
pub enum AstNode {
    /// Children in order.
    Sequence(Vec<AstNode>),
    /// Declares a buffer.
    AllocBuffer {
        /// Buffer name, unique per spec.
        name: String,
        /// Buffer type.
        ty: BufferType,
    },
    /// Declares that the program references a node.
    NodeRef {
        /// Referenced node.
        id: NodeId,
    },
    /// An instruction naming buffers and nodes symbolically.
    Op(AstOp),
}

impl AstNode {
    /// Visits every leaf in order.
    pub fn for_each_leaf<'a>(&'a self, f: &mut impl FnMut(&'a AstNode)) {
        match self {
            Self::Sequence(children) => {
                for child in children {
                    child.for_each_leaf(f);
                }
            }
            leaf => f(leaf),
        }
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        self.for_each_leaf(&mut |_| count += 1);
        count
    }
}

/// How one port is fed each block.
///
/// Every (kind, direction) pair resolves here; adding a port kind is a
/// compile error until this table covers it.
fn port_feed(
    port: &PortDescription,
    own: &str,
    upstream: Option<&PortRef>,
    default: Option<f32>,
) -> AstOp {
    let buf = own.to_owned();
    match (port.kind, port.direction, upstream) {
        (_, PortDirection::Output, _) => Op::ClearBuffer { buf },
        (PortKind::Audio | PortKind::Control | PortKind::Events, PortDirection::Input, Some(up)) => {
            Op::CopyBuffer {
                src: up.buffer_name(),
                dst: buf,
            }
        }
        (PortKind::Control, PortDirection::Input, None) => match default {
            Some(value) => Op::SetFloat { buf, value },
            None => Op::ClearBuffer { buf },
        },
        (PortKind::Audio | PortKind::Events, PortDirection::Input, None) => {
            Op::ClearBuffer { buf }
        }
    }
}

fn node_fragment(graph: &Graph, node: &GraphNode, atom_capacity: usize) -> AstNode {
    let id = node.id();
    let desc = node.description();
    let mut allocs = Vec::with_capacity(desc.ports.len());
    let mut wiring = Vec::new();
    let mut feeds = Vec::with_capacity(desc.ports.len());

    // Inputs are fed before outputs are cleared.
    let ordered = desc.inputs().chain(desc.outputs());
    for port in ordered {
        let own = PortRef::new(id.clone(), port.name.clone());
        let name = own.buffer_name();
        allocs.push(AstNode::AllocBuffer {
            name: name.clone(),
            ty: port.kind.buffer_type(graph.block_size(), atom_capacity),
        });

        let default = match (port.kind, port.direction, node.handle()) {
            (PortKind::Control, PortDirection::Input, Some(handle)) => handle
                .lock()
                .parameter(&port.name)
                .and_then(|v| v.as_float())
                .or_else(|| desc.parameter(&port.name).and_then(|p| p.default.as_float())),
            _ => None,
        };
        feeds.push(AstNode::Op(port_feed(port, &name, graph.upstream(&own), default)));

        if !node.kind().is_sink() {
            wiring.push(AstNode::Op(Op::ConnectPort {
                node: id.clone(),
                port: port.name.clone(),
                buf: name,
            }));
        }
    }

    let run = match node.kind() {
        NodeKind::Processor(_) => Op::Call { node: id.clone() },
        NodeKind::Sink => Op::OutputStereo {
            left: PortRef::new(id.clone(), SINK_LEFT).buffer_name(),
            right: PortRef::new(id.clone(), SINK_RIGHT).buffer_name(),
        },
    };

    let mut fragment = allocs;
    if !node.kind().is_sink() {
        fragment.push(AstNode::NodeRef { id: id.clone() });
    }
    fragment.extend(wiring);
    fragment.extend(feeds);
    fragment.push(AstNode::Op(run));
    AstNode::Sequence(fragment)
}

/// Builds the instruction tree for a graph.
///
/// Fails with the graph's validation error if it has dangling connections or
/// a cycle. The graph is not modified.
pub fn build_ast(graph: &Graph, atom_capacity: usize) -> Result<AstNode, CompileError> {
    let sorted = graph.sorted_nodes()?;
    let fragments = sorted
        .into_iter()
        .map(|node| node_fragment(graph, node, atom_capacity))
        .collect();
    Ok(AstNode::Sequence(fragments))
}
