//! Graph compiler.
//!
//! Compilation is two pure stages over a [`Graph`]:
//!
//! 1. [`build_ast`] visits nodes in dependency order and emits one fragment
//!    per node: buffer allocations for each port, `CONNECT_PORT` wiring, the
//!    per-block feeds for each port, and finally `CALL` (or `OUTPUT_STEREO`
//!    for the sink).
//! 2. [`build_spec`] collects declarations into symbol tables, then flattens
//!    and resolves every instruction into a [`Spec`].
//!
//! Compiling an unchanged graph twice yields equal specs.

mod ast;
mod build;
mod opcode;
mod spec;

pub use ast::{AstNode, build_ast};
pub use build::build_spec;
pub use opcode::{AstOp, Op, Opcode, Phase};
pub use spec::{BufferDecl, Program, Spec, SpecBuilder};

use crate::buffer::BufferType;
use crate::graph::{Graph, GraphError};
use crate::node::NodeId;

/// Errors raised while compiling. None of these ever reach the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// The graph failed validation.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// An instruction names a buffer that was never allocated.
    #[error("unknown buffer '{0}'")]
    UnknownBuffer(String),

    /// An instruction names a node that was never referenced.
    #[error("unknown node '{0}'")]
    UnknownNode(NodeId),

    /// Two allocations share a name.
    #[error("buffer '{0}' declared twice")]
    DuplicateBuffer(String),

    /// An operand has the wrong buffer type.
    #[error("{op}: buffer '{buffer}' must be {expected}, found {found}")]
    OperandType {
        /// Instruction mnemonic.
        op: &'static str,
        /// Offending buffer.
        buffer: String,
        /// Required type family.
        expected: &'static str,
        /// Declared type.
        found: BufferType,
    },

    /// Two operands that must share a type do not.
    #[error("{op}: operand types differ: {left} vs {right}")]
    OperandMismatch {
        /// Instruction mnemonic.
        op: &'static str,
        /// First operand and its type.
        left: String,
        /// Second operand and its type.
        right: String,
    },

    /// A binary instruction uses the same buffer twice.
    #[error("{op}: buffer '{buffer}' is both source and destination")]
    AliasedOperands {
        /// Instruction mnemonic.
        op: &'static str,
        /// Offending buffer.
        buffer: String,
    },

    /// A program was assembled with the wrong number of node handles.
    #[error("spec references {expected} nodes but {found} handles were given")]
    NodeCountMismatch {
        /// Nodes the spec references.
        expected: usize,
        /// Handles supplied.
        found: usize,
    },
}

/// Compiles a graph into a spec.
///
/// `atom_capacity` sizes every event-port buffer.
pub fn compile_spec(graph: &Graph, atom_capacity: usize) -> Result<Spec, CompileError> {
    let ast = build_ast(graph, atom_capacity)?;
    build_spec(&ast)
}

/// Compiles a graph into a runnable program holding the graph's node handles.
pub fn compile(graph: &Graph, atom_capacity: usize) -> Result<Program, CompileError> {
    let spec = compile_spec(graph, atom_capacity)?;
    let handles = spec
        .nodes()
        .iter()
        .map(|id| {
            graph
                .find_node(id)?
                .handle()
                .cloned()
                .ok_or_else(|| CompileError::UnknownNode(id.clone()))
        })
        .collect::<Result<Vec<_>, CompileError>>()?;
    Program::new(spec, handles)
}
