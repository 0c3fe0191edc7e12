//! The VM instruction set.
//!
//! [`Op`] is generic over how buffers and nodes are named so the same variants
//! serve both stages of compilation: the AST refers to buffers by name and
//! nodes by id ([`AstOp`]); a finished spec refers to resolved
//! [`BufferRef`]s and node indices ([`Opcode`]).

use core::convert::Infallible;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::arena::BufferRef;
use crate::node::NodeId;

/// When an opcode runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Once, on the first block after a spec is installed.
    Init,
    /// Every block.
    Performance,
}

/// One VM instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Op<B, N> {
    /// Reset a buffer to its type's identity value.
    ClearBuffer {
        /// Target buffer.
        buf: B,
    },
    /// Copy `src` into `dst`. Types must match.
    CopyBuffer {
        /// Source buffer.
        src: B,
        /// Destination buffer.
        dst: B,
    },
    /// Write a literal into a control buffer.
    SetFloat {
        /// Target control buffer.
        buf: B,
        /// Value to write.
        value: f32,
    },
    /// `dst += src` under the type's mix rule.
    Mix {
        /// Source buffer, never modified.
        src: B,
        /// Destination buffer.
        dst: B,
    },
    /// Scale an audio block in place.
    Mul {
        /// Target audio buffer.
        buf: B,
        /// Scale factor.
        factor: f32,
    },
    /// Fill an audio block with uniform noise in `[-1, 1]`.
    Noise {
        /// Target audio buffer.
        buf: B,
    },
    /// Fill an audio block with a phase-continuous sine.
    Sine {
        /// Target audio buffer.
        buf: B,
        /// Frequency in Hz.
        freq: f32,
    },
    /// Hand two audio blocks to the backend.
    OutputStereo {
        /// Left channel.
        left: B,
        /// Right channel.
        right: B,
    },
    /// Bind a node's port to a buffer. Init phase only.
    ConnectPort {
        /// Target node.
        node: N,
        /// Port name.
        port: String,
        /// Buffer to bind.
        buf: B,
    },
    /// Run a node for the current block.
    Call {
        /// Target node.
        node: N,
    },
}

/// An instruction as it appears in the AST, naming buffers and nodes.
pub type AstOp = Op<String, NodeId>;

/// A resolved instruction as it appears in a [`Spec`](crate::Spec).
pub type Opcode = Op<BufferRef, usize>;

impl<B, N> Op<B, N> {
    /// Phase the instruction runs in.
    pub fn phase(&self) -> Phase {
        match self {
            Self::ConnectPort { .. } => Phase::Init,
            _ => Phase::Performance,
        }
    }

    /// Mnemonic used in listings.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ClearBuffer { .. } => "CLEAR_BUFFER",
            Self::CopyBuffer { .. } => "COPY_BUFFER",
            Self::SetFloat { .. } => "SET_FLOAT",
            Self::Mix { .. } => "MIX",
            Self::Mul { .. } => "MUL",
            Self::Noise { .. } => "NOISE",
            Self::Sine { .. } => "SINE",
            Self::OutputStereo { .. } => "OUTPUT_STEREO",
            Self::ConnectPort { .. } => "CONNECT_PORT",
            Self::Call { .. } => "CALL",
        }
    }

    /// Returns true if the opcode keeps state across blocks.
    pub fn is_stateful(&self) -> bool {
        matches!(self, Self::Noise { .. } | Self::Sine { .. })
    }

    /// Rewrites buffer and node operands, stopping at the first failure.
    pub fn try_map<B2, N2, E>(
        &self,
        mut buf: impl FnMut(&B) -> Result<B2, E>,
        mut node: impl FnMut(&N) -> Result<N2, E>,
    ) -> Result<Op<B2, N2>, E> {
        Ok(match self {
            Self::ClearBuffer { buf: b } => Op::ClearBuffer { buf: buf(b)? },
            Self::CopyBuffer { src, dst } => Op::CopyBuffer {
                src: buf(src)?,
                dst: buf(dst)?,
            },
            Self::SetFloat { buf: b, value } => Op::SetFloat {
                buf: buf(b)?,
                value: *value,
            },
            Self::Mix { src, dst } => Op::Mix {
                src: buf(src)?,
                dst: buf(dst)?,
            },
            Self::Mul { buf: b, factor } => Op::Mul {
                buf: buf(b)?,
                factor: *factor,
            },
            Self::Noise { buf: b } => Op::Noise { buf: buf(b)? },
            Self::Sine { buf: b, freq } => Op::Sine {
                buf: buf(b)?,
                freq: *freq,
            },
            Self::OutputStereo { left, right } => Op::OutputStereo {
                left: buf(left)?,
                right: buf(right)?,
            },
            Self::ConnectPort {
                node: n,
                port,
                buf: b,
            } => Op::ConnectPort {
                node: node(n)?,
                port: port.clone(),
                buf: buf(b)?,
            },
            Self::Call { node: n } => Op::Call { node: node(n)? },
        })
    }

    /// Rewrites buffer and node operands.
    pub fn map<B2, N2>(
        &self,
        mut buf: impl FnMut(&B) -> B2,
        mut node: impl FnMut(&N) -> N2,
    ) -> Op<B2, N2> {
        match self.try_map::<_, _, Infallible>(|b| Ok(buf(b)), |n| Ok(node(n))) {
            Ok(op) => op,
            Err(never) => match never {},
        }
    }
}

impl<B: fmt::Display, N: fmt::Display> fmt::Display for Op<B, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            Self::ClearBuffer { buf } | Self::Noise { buf } => write!(f, "{name}({buf})"),
            Self::CopyBuffer { src, dst } | Self::Mix { src, dst } => {
                write!(f, "{name}({src} -> {dst})")
            }
            Self::SetFloat { buf, value } => write!(f, "{name}({buf}, {value})"),
            Self::Mul { buf, factor } => write!(f, "{name}({buf}, x{factor})"),
            Self::Sine { buf, freq } => write!(f, "{name}({buf}, {freq} Hz)"),
            Self::OutputStereo { left, right } => write!(f, "{name}({left}, {right})"),
            Self::ConnectPort { node, port, buf } => {
                write!(f, "{name}(node[{node}].{port} <- {buf})")
            }
            Self::Call { node } => write!(f, "{name}(node[{node}])"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase() {
        let init: AstOp = Op::ConnectPort {
            node: "osc".into(),
            port: "out".into(),
            buf: "osc:out".into(),
        };
        let call: AstOp = Op::Call { node: "osc".into() };
        assert_eq!(init.phase(), Phase::Init);
        assert_eq!(call.phase(), Phase::Performance);
    }

    #[test]
    fn test_display() {
        let op: AstOp = Op::CopyBuffer {
            src: "a:out".into(),
            dst: "b:in".into(),
        };
        assert_eq!(op.to_string(), "COPY_BUFFER(a:out -> b:in)");
        let op: AstOp = Op::Sine {
            buf: "tone".into(),
            freq: 440.0,
        };
        assert_eq!(op.to_string(), "SINE(tone, 440 Hz)");
    }

    #[test]
    fn test_serialize_tag() {
        let op: Opcode = Op::SetFloat {
            buf: BufferRef {
                index: 0,
                offset: 0,
            },
            value: 12.0,
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "SET_FLOAT");
        assert_eq!(json["value"], 12.0);
    }
}
