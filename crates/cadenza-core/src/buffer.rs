//! Typed, fixed-size buffers.
//!
//! Every value that flows between nodes lives in a [`Buffer`] of a fixed
//! [`BufferType`]:
//!
//! - [`BufferType::Control`] - a single `f32`
//! - [`BufferType::AudioBlock`] - one block of `f32` samples
//! - [`BufferType::AtomBlob`] - a time-ordered event sequence ([`AtomSequence`])
//!
//! Buffers are allocated once when a spec is installed and never resized.
//! Each type defines its own identity value ([`Buffer::clear`]) and mix rule
//! ([`Buffer::mix`]): elementwise addition for numeric types, a stable
//! offset-ordered merge for event sequences.
//!
//! The raw byte view ([`Buffer::get_bytes`] / [`Buffer::set_bytes`]) is
//! little-endian and has exactly [`BufferType::byte_len`] bytes.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::atom::{ATOM_HEADER_LEN, AtomSequence};

/// Size in bytes of one sample.
const SAMPLE_BYTES: usize = core::mem::size_of::<f32>();

/// The type of a buffer, including its fixed dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BufferType {
    /// A single 32-bit float control value.
    Control,
    /// `frames` consecutive 32-bit float samples.
    AudioBlock {
        /// Number of samples in the block.
        frames: usize,
    },
    /// Opaque byte blob holding an [`AtomSequence`].
    AtomBlob {
        /// Total blob size in bytes, header included.
        capacity: usize,
    },
}

impl BufferType {
    /// Length of the buffer's raw byte view.
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Control => SAMPLE_BYTES,
            Self::AudioBlock { frames } => frames * SAMPLE_BYTES,
            Self::AtomBlob { capacity } => (*capacity).max(ATOM_HEADER_LEN),
        }
    }

    /// Short type name used in listings and errors.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::AudioBlock { .. } => "audio",
            Self::AtomBlob { .. } => "atom",
        }
    }
}

impl fmt::Display for BufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => f.write_str("control"),
            Self::AudioBlock { frames } => write!(f, "audio[{frames}]"),
            Self::AtomBlob { capacity } => write!(f, "atom[{capacity}]"),
        }
    }
}

/// Errors raised by buffer operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The two operands of a binary operation have different types.
    #[error("buffer type mismatch: {expected} vs {found}")]
    TypeMismatch {
        /// Type of the destination operand.
        expected: BufferType,
        /// Type of the source operand.
        found: BufferType,
    },

    /// `set_bytes` was given the wrong number of bytes.
    #[error("byte length mismatch: expected {expected}, got {found}")]
    LengthMismatch {
        /// Declared byte length of the buffer.
        expected: usize,
        /// Length of the provided payload.
        found: usize,
    },

    /// The operation is not defined for this buffer type.
    #[error("{op} is not supported on {ty} buffers")]
    Unsupported {
        /// Name of the attempted operation.
        op: &'static str,
        /// Type of the buffer.
        ty: BufferType,
    },

    /// An event sequence would exceed the blob's capacity.
    #[error("atom sequence overflow: {needed} bytes needed, capacity is {capacity}")]
    AtomOverflow {
        /// Bytes the resulting sequence would occupy.
        needed: usize,
        /// Blob capacity in bytes.
        capacity: usize,
    },

    /// An event was appended with an offset earlier than the last event.
    #[error("atom event at offset {offset} precedes last event at {last}")]
    AtomOutOfOrder {
        /// Offset of the rejected event.
        offset: u32,
        /// Offset of the current last event.
        last: u32,
    },

    /// Raw bytes do not form a well-formed event sequence.
    #[error("malformed atom sequence: {0}")]
    MalformedAtom(&'static str),

    /// A buffer reference points outside the arena.
    #[error("no buffer at slot {0}")]
    UnknownSlot(usize),

    /// A binary operation named the same buffer as source and destination.
    #[error("buffer slot {0} used as both source and destination")]
    Aliased(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum BufferData {
    Control(f32),
    Audio(Vec<f32>),
    Atom(AtomSequence),
}

/// A typed buffer with fixed-size storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    ty: BufferType,
    data: BufferData,
}

impl Buffer {
    /// Allocates a buffer of the given type in its cleared state.
    ///
    /// Numeric buffers start zeroed; atom blobs start as an empty, well-formed
    /// sequence.
    pub fn new(ty: BufferType) -> Self {
        let data = match ty {
            BufferType::Control => BufferData::Control(0.0),
            BufferType::AudioBlock { frames } => BufferData::Audio(vec![0.0; frames]),
            BufferType::AtomBlob { .. } => BufferData::Atom(AtomSequence::new(ty.byte_len())),
        };
        Self { ty, data }
    }

    /// Returns the buffer's type.
    #[inline]
    pub fn buffer_type(&self) -> BufferType {
        self.ty
    }

    /// Resets the buffer to its type's identity value.
    pub fn clear(&mut self) {
        match &mut self.data {
            BufferData::Control(v) => *v = 0.0,
            BufferData::Audio(samples) => samples.fill(0.0),
            BufferData::Atom(seq) => seq.clear(),
        }
    }

    /// Mixes `src` into `self` (`self += src`) using the type's mix rule.
    ///
    /// `src` is never modified. On error `self` is left unchanged.
    pub fn mix(&mut self, src: &Buffer) -> Result<(), BufferError> {
        self.check_same_type(src)?;
        match (&mut self.data, &src.data) {
            (BufferData::Control(dst), BufferData::Control(s)) => *dst += *s,
            (BufferData::Audio(dst), BufferData::Audio(s)) => {
                for (d, s) in dst.iter_mut().zip(s.iter()) {
                    *d += *s;
                }
            }
            (BufferData::Atom(dst), BufferData::Atom(s)) => dst.merge_from(s)?,
            _ => unreachable!("buffer data always matches its type"),
        }
        Ok(())
    }

    /// Copies the contents of `src` into `self`. Types must match.
    pub fn copy_from(&mut self, src: &Buffer) -> Result<(), BufferError> {
        self.check_same_type(src)?;
        match (&mut self.data, &src.data) {
            (BufferData::Control(dst), BufferData::Control(s)) => *dst = *s,
            (BufferData::Audio(dst), BufferData::Audio(s)) => dst.copy_from_slice(s),
            (BufferData::Atom(dst), BufferData::Atom(s)) => dst.copy_from(s)?,
            _ => unreachable!("buffer data always matches its type"),
        }
        Ok(())
    }

    /// Scales every sample of an audio block in place.
    pub fn mul(&mut self, factor: f32) -> Result<(), BufferError> {
        let samples = self.audio_mut()?;
        for s in samples.iter_mut() {
            *s *= factor;
        }
        Ok(())
    }

    /// Returns the control value.
    pub fn control(&self) -> Result<f32, BufferError> {
        match self.data {
            BufferData::Control(v) => Ok(v),
            _ => Err(self.unsupported("control read")),
        }
    }

    /// Writes the control value.
    pub fn set_control(&mut self, value: f32) -> Result<(), BufferError> {
        match &mut self.data {
            BufferData::Control(v) => {
                *v = value;
                Ok(())
            }
            _ => Err(self.unsupported("control write")),
        }
    }

    /// Returns the samples of an audio block.
    pub fn audio(&self) -> Result<&[f32], BufferError> {
        match &self.data {
            BufferData::Audio(samples) => Ok(samples),
            _ => Err(self.unsupported("audio read")),
        }
    }

    /// Returns the samples of an audio block for writing.
    pub fn audio_mut(&mut self) -> Result<&mut [f32], BufferError> {
        let ty = self.ty;
        match &mut self.data {
            BufferData::Audio(samples) => Ok(samples),
            _ => Err(BufferError::Unsupported {
                op: "audio write",
                ty,
            }),
        }
    }

    /// Returns the event sequence of an atom blob.
    pub fn atoms(&self) -> Result<&AtomSequence, BufferError> {
        match &self.data {
            BufferData::Atom(seq) => Ok(seq),
            _ => Err(self.unsupported("atom read")),
        }
    }

    /// Returns the event sequence of an atom blob for writing.
    pub fn atoms_mut(&mut self) -> Result<&mut AtomSequence, BufferError> {
        let ty = self.ty;
        match &mut self.data {
            BufferData::Atom(seq) => Ok(seq),
            _ => Err(BufferError::Unsupported {
                op: "atom write",
                ty,
            }),
        }
    }

    /// Returns a copy of the buffer's raw little-endian bytes.
    pub fn get_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ty.byte_len());
        self.write_bytes(&mut out);
        out
    }

    /// Appends the buffer's raw bytes to `out`.
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        match &self.data {
            BufferData::Control(v) => out.extend_from_slice(&v.to_le_bytes()),
            BufferData::Audio(samples) => {
                for s in samples {
                    out.extend_from_slice(&s.to_le_bytes());
                }
            }
            BufferData::Atom(seq) => out.extend_from_slice(seq.as_bytes()),
        }
    }

    /// Replaces the buffer's contents from raw little-endian bytes.
    ///
    /// Fails unless `bytes.len()` equals the type's byte length. Atom blobs
    /// must additionally carry a well-formed sequence header.
    pub fn set_bytes(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let expected = self.ty.byte_len();
        if bytes.len() != expected {
            return Err(BufferError::LengthMismatch {
                expected,
                found: bytes.len(),
            });
        }
        match &mut self.data {
            BufferData::Control(v) => *v = f32::from_le_bytes(sample_bytes(bytes)),
            BufferData::Audio(samples) => {
                for (s, chunk) in samples.iter_mut().zip(bytes.chunks_exact(SAMPLE_BYTES)) {
                    *s = f32::from_le_bytes(sample_bytes(chunk));
                }
            }
            BufferData::Atom(seq) => seq.set_bytes(bytes)?,
        }
        Ok(())
    }

    fn check_same_type(&self, other: &Buffer) -> Result<(), BufferError> {
        if self.ty == other.ty {
            Ok(())
        } else {
            Err(BufferError::TypeMismatch {
                expected: self.ty,
                found: other.ty,
            })
        }
    }

    fn unsupported(&self, op: &'static str) -> BufferError {
        BufferError::Unsupported { op, ty: self.ty }
    }
}

#[inline]
fn sample_bytes(chunk: &[u8]) -> [u8; SAMPLE_BYTES] {
    let mut raw = [0u8; SAMPLE_BYTES];
    raw.copy_from_slice(&chunk[..SAMPLE_BYTES]);
    raw
}
