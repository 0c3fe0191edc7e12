//! Stage two: instruction tree to spec.
//!
//! The first pass collects buffer declarations (assigning each the next free
//! offset) and node references into symbol tables. The second pass flattens
//! every instruction in order, resolving names through those tables and
//! checking operand types. Any unresolved name fails the whole build.

use std::collections::HashMap;

use crate::arena::BufferRef;
use crate::buffer::BufferType;
use crate::node::NodeId;

use super::CompileError;
use super::ast::AstNode;
use super::opcode::{AstOp, Op, Opcode};
use super::spec::{BufferDecl, Spec};

struct Symbols<'a> {
    buffers: HashMap<&'a str, BufferRef>,
    nodes: HashMap<&'a NodeId, usize>,
}

impl Symbols<'_> {
    fn resolve(&self, op: &AstOp) -> Result<Opcode, CompileError> {
        op.try_map(
            |name| {
                self.buffers
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| CompileError::UnknownBuffer(name.clone()))
            },
            |id| {
                self.nodes
                    .get(id)
                    .copied()
                    .ok_or_else(|| CompileError::UnknownNode(id.clone()))
            },
        )
    }
}

fn expect_type(
    op: &'static str,
    decl: &BufferDecl,
    expected: &'static str,
    ok: bool,
) -> Result<(), CompileError> {
    if ok {
        Ok(())
    } else {
        Err(CompileError::OperandType {
            op,
            buffer: decl.name.clone(),
            expected,
            found: decl.ty,
        })
    }
}

fn check_operands(op: &Opcode, decls: &[BufferDecl]) -> Result<(), CompileError> {
    let is_audio = |d: &BufferDecl| matches!(d.ty, BufferType::AudioBlock { .. });
    let name = op.name();

    match op {
        Op::CopyBuffer { src, dst } | Op::Mix { src, dst } => {
            if src == dst {
                return Err(CompileError::AliasedOperands {
                    op: name,
                    buffer: decls[src.index].name.clone(),
                });
            }
            same_type(name, &decls[src.index], &decls[dst.index])
        }
        Op::SetFloat { buf, .. } => {
            let d = &decls[buf.index];
            expect_type(name, d, "control", d.ty == BufferType::Control)
        }
        Op::Mul { buf, .. } | Op::Noise { buf } | Op::Sine { buf, .. } => {
            let d = &decls[buf.index];
            expect_type(name, d, "audio", is_audio(d))
        }
        Op::OutputStereo { left, right } => {
            let (l, r) = (&decls[left.index], &decls[right.index]);
            expect_type(name, l, "audio", is_audio(l))?;
            expect_type(name, r, "audio", is_audio(r))?;
            same_type(name, l, r)
        }
        Op::ClearBuffer { .. } | Op::ConnectPort { .. } | Op::Call { .. } => Ok(()),
    }
}

fn same_type(op: &'static str, a: &BufferDecl, b: &BufferDecl) -> Result<(), CompileError> {
    if a.ty == b.ty {
        Ok(())
    } else {
        Err(CompileError::OperandMismatch {
            op,
            left: format!("{} ({})", a.name, a.ty),
            right: format!("{} ({})", b.name, b.ty),
        })
    }
}

/// Flattens an instruction tree into a spec.
pub fn build_spec(ast: &AstNode) -> Result<Spec, CompileError> {
    let mut leaves = Vec::new();
    ast.for_each_leaf(&mut |leaf| leaves.push(leaf));

    let mut spec = Spec::default();
    let mut symbols = Symbols {
        buffers: HashMap::new(),
        nodes: HashMap::new(),
    };

    // Pass 1: declarations.
    let mut offset = 0usize;
    for leaf in &leaves {
        match leaf {
            AstNode::AllocBuffer { name, ty } => {
                let r = BufferRef {
                    index: spec.buffers.len(),
                    offset,
                };
                if symbols.buffers.insert(name.as_str(), r).is_some() {
                    return Err(CompileError::DuplicateBuffer(name.clone()));
                }
                spec.buffers.push(BufferDecl {
                    name: name.clone(),
                    ty: *ty,
                    offset,
                });
                offset += ty.byte_len();
            }
            AstNode::NodeRef { id } => {
                if !symbols.nodes.contains_key(id) {
                    symbols.nodes.insert(id, spec.nodes.len());
                    spec.nodes.push(id.clone());
                }
            }
            AstNode::Op(_) | AstNode::Sequence(_) => {}
        }
    }

    // Pass 2: instructions.
    for leaf in &leaves {
        if let AstNode::Op(op) = leaf {
            let resolved = symbols.resolve(op)?;
            check_operands(&resolved, &spec.buffers)?;
            spec.opcodes.push(resolved);
        }
    }

    #[cfg(feature = "tracing")]
    {
        tracing::debug!(
            "spec_build: {} buffers ({} bytes), {} nodes, {} opcodes",
            spec.buffers.len(),
            offset,
            spec.nodes.len(),
            spec.opcodes.len()
        );
        for (i, op) in spec.opcodes.iter().enumerate() {
            tracing::debug!("  op[{i}]: {}", spec.describe(op));
        }
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::SpecBuilder;

    const AUDIO4: BufferType = BufferType::AudioBlock { frames: 4 };

    #[test]
    fn test_offsets_follow_declaration_order() {
        let spec = SpecBuilder::new()
            .buffer("a", BufferType::Control)
            .buffer("b", AUDIO4)
            .buffer("c", BufferType::AtomBlob { capacity: 64 })
            .buffer("d", BufferType::Control)
            .build()
            .unwrap();
        let offsets: Vec<usize> = spec.buffers().iter().map(|b| b.offset).collect();
        assert_eq!(offsets, vec![0, 4, 20, 84]);
        assert_eq!(spec.byte_len(), 88);
    }

    #[test]
    fn test_resolves_names() {
        let spec = SpecBuilder::new()
            .buffer("x", AUDIO4)
            .buffer("y", AUDIO4)
            .node("n")
            .op(Op::CopyBuffer {
                src: "x".into(),
                dst: "y".into(),
            })
            .op(Op::Call { node: "n".into() })
            .build()
            .unwrap();
        assert_eq!(
            spec.opcodes()[0],
            Op::CopyBuffer {
                src: BufferRef {
                    index: 0,
                    offset: 0
                },
                dst: BufferRef {
                    index: 1,
                    offset: 16
                },
            }
        );
        assert_eq!(spec.opcodes()[1], Op::Call { node: 0 });
    }

    #[test]
    fn test_use_before_declaration_resolves() {
        // Declarations are collected before any instruction is resolved.
        let spec = SpecBuilder::new()
            .op(Op::ClearBuffer { buf: "late".into() })
            .buffer("late", BufferType::Control)
            .build()
            .unwrap();
        assert_eq!(spec.opcodes().len(), 1);
    }

    #[test]
    fn test_unknown_buffer() {
        let err = SpecBuilder::new()
            .op(Op::ClearBuffer {
                buf: "missing".into(),
            })
            .build()
            .unwrap_err();
        assert_eq!(err, CompileError::UnknownBuffer("missing".into()));
    }

    #[test]
    fn test_unknown_node() {
        let err = SpecBuilder::new()
            .op(Op::Call {
                node: "ghost".into(),
            })
            .build()
            .unwrap_err();
        assert_eq!(err, CompileError::UnknownNode("ghost".into()));
    }

    #[test]
    fn test_duplicate_buffer() {
        let err = SpecBuilder::new()
            .buffer("a", BufferType::Control)
            .buffer("a", AUDIO4)
            .build()
            .unwrap_err();
        assert_eq!(err, CompileError::DuplicateBuffer("a".into()));
    }

    #[test]
    fn test_mismatched_audio_blocks_rejected() {
        for op in [
            Op::CopyBuffer {
                src: "short".into(),
                dst: "long".into(),
            },
            Op::Mix {
                src: "short".into(),
                dst: "long".into(),
            },
        ] {
            let err = SpecBuilder::new()
                .buffer("short", AUDIO4)
                .buffer("long", BufferType::AudioBlock { frames: 8 })
                .op(op)
                .build()
                .unwrap_err();
            assert!(matches!(err, CompileError::OperandMismatch { .. }), "{err}");
        }
    }

    #[test]
    fn test_operand_types() {
        let err = SpecBuilder::new()
            .buffer("a", AUDIO4)
            .op(Op::SetFloat {
                buf: "a".into(),
                value: 1.0,
            })
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::OperandType {
                op: "SET_FLOAT",
                ..
            }
        ));

        let err = SpecBuilder::new()
            .buffer("c", BufferType::Control)
            .op(Op::Sine {
                buf: "c".into(),
                freq: 440.0,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, CompileError::OperandType { op: "SINE", .. }));
    }

    #[test]
    fn test_aliased_copy_rejected() {
        let err = SpecBuilder::new()
            .buffer("a", AUDIO4)
            .op(Op::Mix {
                src: "a".into(),
                dst: "a".into(),
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, CompileError::AliasedOperands { .. }));
    }

    #[test]
    fn test_node_refs_are_deduplicated() {
        let spec = SpecBuilder::new()
            .node("a")
            .node("b")
            .node("a")
            .build()
            .unwrap();
        assert_eq!(spec.nodes(), &[NodeId::from("a"), NodeId::from("b")]);
    }
}
