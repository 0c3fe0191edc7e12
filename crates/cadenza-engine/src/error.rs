//! Error types for the VM and the engine thread.

use cadenza_core::{BufferError, BufferType, NodeError, NodeId};
use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised while installing or executing a program.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A buffer operation inside an opcode failed.
    #[error("opcode {index} ({op}) failed: {source}")]
    Opcode {
        /// Position of the opcode in the spec.
        index: usize,
        /// Opcode mnemonic.
        op: &'static str,
        /// Underlying buffer error.
        #[source]
        source: BufferError,
    },

    /// A node's `connect_port` or `run` failed.
    #[error("node '{node}' failed: {source}")]
    Node {
        /// Failing node.
        node: NodeId,
        /// Underlying node error.
        #[source]
        source: NodeError,
    },

    /// An opcode refers to a node index the program has no handle for.
    #[error("node index {0} out of range")]
    UnknownNode(usize),

    /// A program's audio buffers do not match the engine block size.
    #[error("buffer '{buffer}' is {ty}, engine block size is {block_size}")]
    BlockSizeMismatch {
        /// Offending buffer.
        buffer: String,
        /// Its declared type.
        ty: BufferType,
        /// Engine block size.
        block_size: usize,
    },

    /// A block was run with no program installed.
    #[error("no program installed")]
    NoProgram,

    /// The backend failed.
    #[error("backend '{name}' failed: {source}")]
    Backend {
        /// Backend name.
        name: String,
        /// Underlying backend error.
        #[source]
        source: BackendError,
    },

    /// A block panicked.
    #[error("block panicked: {0}")]
    Panicked(String),

    /// The engine thread could not be spawned.
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The engine was stopped or disabled and cannot accept changes.
    #[error("engine is {0}")]
    NotRunning(&'static str),
}

impl EngineError {
    pub(crate) fn backend(name: &str, source: BackendError) -> Self {
        EngineError::Backend {
            name: name.to_string(),
            source,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_opcode_error_message_and_source() {
        let err = EngineError::Opcode {
            index: 3,
            op: "MIX",
            source: BufferError::TypeMismatch {
                expected: BufferType::AudioBlock { frames: 4 },
                found: BufferType::AudioBlock { frames: 8 },
            },
        };
        assert_eq!(
            err.to_string(),
            "opcode 3 (MIX) failed: buffer type mismatch: audio[4] vs audio[8]"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_backend_error_names_backend() {
        let err = EngineError::backend("wav", BackendError::NotSetUp);
        assert_eq!(
            err.to_string(),
            "backend 'wav' failed: backend is not set up"
        );
    }
}
