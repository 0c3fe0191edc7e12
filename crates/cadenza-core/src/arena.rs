//! The buffer arena backing one installed spec.
//!
//! [`BufferArena`] owns one [`Buffer`] per declaration, allocated once when a
//! spec is installed. Buffers are addressed by [`BufferRef`], which carries
//! both the slot index and the byte offset assigned by the compiler.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::{Buffer, BufferError, BufferType};

/// Resolved address of a buffer inside an arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferRef {
    /// Declaration index.
    pub index: usize,
    /// Byte offset within the arena's raw view.
    pub offset: usize,
}

impl fmt::Display for BufferRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf[{}]@{}", self.index, self.offset)
    }
}

/// Pre-allocated storage for every buffer a spec declares.
#[derive(Debug, Clone, Default)]
pub struct BufferArena {
    buffers: Vec<Buffer>,
    offsets: Vec<usize>,
    byte_len: usize,
}

impl BufferArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates one buffer per type, laid out contiguously in order.
    pub fn from_types<I>(types: I) -> Self
    where
        I: IntoIterator<Item = BufferType>,
    {
        let mut arena = Self::new();
        for ty in types {
            arena.push(ty);
        }
        arena
    }

    /// Appends a buffer and returns its reference.
    pub fn push(&mut self, ty: BufferType) -> BufferRef {
        let r = BufferRef {
            index: self.buffers.len(),
            offset: self.byte_len,
        };
        self.byte_len += ty.byte_len();
        self.buffers.push(Buffer::new(ty));
        self.offsets.push(r.offset);
        r
    }

    /// Number of buffers.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true if the arena holds no buffers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Total size of the raw view in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Reference to the buffer at `index`.
    pub fn buffer_ref(&self, index: usize) -> Option<BufferRef> {
        self.offsets
            .get(index)
            .map(|&offset| BufferRef { index, offset })
    }

    /// Returns the buffer behind `r`.
    #[inline]
    pub fn get(&self, r: BufferRef) -> Result<&Buffer, BufferError> {
        self.buffers
            .get(r.index)
            .ok_or(BufferError::UnknownSlot(r.index))
    }

    /// Returns the buffer behind `r` for writing.
    #[inline]
    pub fn get_mut(&mut self, r: BufferRef) -> Result<&mut Buffer, BufferError> {
        self.buffers
            .get_mut(r.index)
            .ok_or(BufferError::UnknownSlot(r.index))
    }

    /// Borrows `src` for reading and `dst` for writing at the same time.
    ///
    /// Fails with [`BufferError::Aliased`] if both name the same slot.
    pub fn pair_mut(
        &mut self,
        src: BufferRef,
        dst: BufferRef,
    ) -> Result<(&Buffer, &mut Buffer), BufferError> {
        let len = self.buffers.len();
        if src.index >= len {
            return Err(BufferError::UnknownSlot(src.index));
        }
        if dst.index >= len {
            return Err(BufferError::UnknownSlot(dst.index));
        }
        if src.index == dst.index {
            return Err(BufferError::Aliased(src.index));
        }
        if src.index < dst.index {
            let (head, tail) = self.buffers.split_at_mut(dst.index);
            Ok((&head[src.index], &mut tail[0]))
        } else {
            let (head, tail) = self.buffers.split_at_mut(src.index);
            Ok((&tail[0], &mut head[dst.index]))
        }
    }

    /// Borrows two distinct buffers for reading.
    pub fn pair(&self, a: BufferRef, b: BufferRef) -> Result<(&Buffer, &Buffer), BufferError> {
        Ok((self.get(a)?, self.get(b)?))
    }

    /// Iterates buffers in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (BufferRef, &Buffer)> {
        self.buffers
            .iter()
            .zip(self.offsets.iter())
            .enumerate()
            .map(|(index, (buf, &offset))| (BufferRef { index, offset }, buf))
    }

    /// Clears every buffer.
    pub fn clear_all(&mut self) {
        for buf in &mut self.buffers {
            buf.clear();
        }
    }

    /// Concatenated raw bytes of all buffers in offset order.
    pub fn get_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len);
        for buf in &self.buffers {
            buf.write_bytes(&mut out);
        }
        out
    }
}
