//! Compiled programs.
//!
//! A [`Spec`] is pure data: buffer layout, referenced node ids, and a flat
//! opcode list. It is immutable once built and is the unit of hot-swap.
//! A [`Program`] pairs a spec with the node handles its `CALL` and
//! `CONNECT_PORT` opcodes index into.

use core::fmt::{self, Write as _};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::arena::{BufferArena, BufferRef};
use crate::buffer::BufferType;
use crate::graph::NodeHandle;
use crate::node::NodeId;

use super::CompileError;
use super::ast::AstNode;
use super::build::build_spec;
use super::opcode::{AstOp, Opcode, Phase};

/// One buffer declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferDecl {
    /// Unique name.
    pub name: String,
    /// Buffer type.
    pub ty: BufferType,
    /// Byte offset: sum of the lengths of all earlier declarations.
    pub offset: usize,
}

/// Immutable compiled program.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    pub(crate) buffers: Vec<BufferDecl>,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) opcodes: Vec<Opcode>,
}

impl Spec {
    /// Buffer declarations in offset order.
    pub fn buffers(&self) -> &[BufferDecl] {
        &self.buffers
    }

    /// Referenced nodes; opcode node operands index into this list.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Opcodes in execution order.
    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    /// Returns true if the spec declares nothing and does nothing.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.opcodes.is_empty()
    }

    /// Total arena size in bytes.
    pub fn byte_len(&self) -> usize {
        self.buffers
            .last()
            .map_or(0, |b| b.offset + b.ty.byte_len())
    }

    /// Looks up a declaration by name.
    pub fn buffer(&self, name: &str) -> Option<&BufferDecl> {
        self.buffers.iter().find(|b| b.name == name)
    }

    /// Resolves a buffer name to its reference.
    pub fn buffer_ref(&self, name: &str) -> Option<BufferRef> {
        self.buffers
            .iter()
            .position(|b| b.name == name)
            .map(|index| BufferRef {
                index,
                offset: self.buffers[index].offset,
            })
    }

    /// Opcodes of one phase, in order.
    pub fn phase_ops(&self, phase: Phase) -> impl Iterator<Item = &Opcode> {
        self.opcodes.iter().filter(move |op| op.phase() == phase)
    }

    /// Allocates a fresh arena with one buffer per declaration.
    pub fn allocate(&self) -> BufferArena {
        BufferArena::from_types(self.buffers.iter().map(|b| b.ty))
    }

    /// Human-readable listing with buffers and nodes shown by name.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_dump(&mut out);
        out
    }

    fn write_dump(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "buffers ({} bytes):", self.byte_len())?;
        for (i, b) in self.buffers.iter().enumerate() {
            writeln!(out, "  [{i:>3}] @{:<8} {:<10} {}", b.offset, b.ty.to_string(), b.name)?;
        }
        writeln!(out, "nodes:")?;
        for (i, id) in self.nodes.iter().enumerate() {
            writeln!(out, "  [{i:>3}] {id}")?;
        }
        writeln!(out, "opcodes:")?;
        for (i, op) in self.opcodes.iter().enumerate() {
            writeln!(out, "  {i:04} {:<5} {}", phase_tag(op.phase()), self.describe(op))?;
        }
        Ok(())
    }

    /// Renders one opcode with symbolic operands.
    pub fn describe(&self, op: &Opcode) -> String {
        op.map(
            |r| {
                self.buffers
                    .get(r.index)
                    .map_or_else(|| r.to_string(), |b| b.name.clone())
            },
            |&n| {
                self.nodes
                    .get(n)
                    .map_or_else(|| format!("#{n}"), ToString::to_string)
            },
        )
        .to_string()
    }
}

fn phase_tag(phase: Phase) -> &'static str {
    match phase {
        Phase::Init => "init",
        Phase::Performance => "perf",
    }
}

/// A spec together with the node implementations it calls.
///
/// Node handles are shared with the graph the program was compiled from.
/// `cleanup` runs once, when the last owner of a node lets go of it.
#[derive(Clone)]
pub struct Program {
    spec: Arc<Spec>,
    nodes: Vec<NodeHandle>,
}

impl Program {
    /// Pairs a spec with its node handles, one per entry of
    /// [`Spec::nodes`].
    pub fn new(spec: impl Into<Arc<Spec>>, nodes: Vec<NodeHandle>) -> Result<Self, CompileError> {
        let spec = spec.into();
        if spec.nodes.len() != nodes.len() {
            return Err(CompileError::NodeCountMismatch {
                expected: spec.nodes.len(),
                found: nodes.len(),
            });
        }
        Ok(Self { spec, nodes })
    }

    /// The compiled spec.
    #[inline]
    pub fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }

    /// Node handles, indexed like [`Spec::nodes`].
    #[inline]
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }
}

impl Drop for Program {
    /// Runs `cleanup` on nodes this program was the last owner of, such as
    /// nodes removed from their graph while the program was installed.
    fn drop(&mut self) {
        for handle in &self.nodes {
            if Arc::strong_count(handle) == 1 {
                handle.lock().cleanup();
            }
        }
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("spec", &self.spec)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

/// Assembles a spec by hand through the same resolution path the compiler
/// uses.
///
/// ```
/// use cadenza_core::{BufferType, Op, SpecBuilder};
///
/// let spec = SpecBuilder::new()
///     .buffer("level", BufferType::Control)
///     .op(Op::SetFloat { buf: "level".into(), value: 0.5 })
///     .build()
///     .unwrap();
/// assert_eq!(spec.opcodes().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SpecBuilder {
    items: Vec<AstNode>,
}

impl SpecBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a buffer.
    pub fn buffer(&mut self, name: impl Into<String>, ty: BufferType) -> &mut Self {
        self.items.push(AstNode::AllocBuffer {
            name: name.into(),
            ty,
        });
        self
    }

    /// Declares a referenced node.
    pub fn node(&mut self, id: impl Into<NodeId>) -> &mut Self {
        self.items.push(AstNode::NodeRef { id: id.into() });
        self
    }

    /// Appends an instruction.
    pub fn op(&mut self, op: AstOp) -> &mut Self {
        self.items.push(AstNode::Op(op));
        self
    }

    /// The instruction tree built so far.
    pub fn to_ast(&self) -> AstNode {
        AstNode::Sequence(self.items.clone())
    }

    /// Resolves names and produces the spec.
    pub fn build(&self) -> Result<Spec, CompileError> {
        build_spec(&self.to_ast())
    }
}
