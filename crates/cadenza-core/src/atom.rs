//! Time-ordered binary event sequences stored in atom blobs.
//!
//! Layout (little-endian), `capacity` bytes in total:
//!
//! ```text
//! [magic "SEQ\0"][body_len u32] ( [offset u32][size u32][data; size][pad to 4] )*
//! ```
//!
//! An empty sequence is the 8-byte header with `body_len = 0`, so a cleared
//! blob is never all-zero bytes. Storage is allocated once; pushes and merges
//! never reallocate and fail with [`BufferError::AtomOverflow`] instead of
//! truncating.

use crate::buffer::BufferError;

/// Header magic tag.
pub const ATOM_MAGIC: [u8; 4] = *b"SEQ\0";

/// Size of the sequence header in bytes.
pub const ATOM_HEADER_LEN: usize = 8;

/// Size of a single event header (`offset` + `size`).
pub const EVENT_HEADER_LEN: usize = 8;

#[inline]
const fn padded(size: usize) -> usize {
    (size + 3) & !3
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_header(bytes: &mut [u8], body_len: usize) {
    bytes[..4].copy_from_slice(&ATOM_MAGIC);
    write_u32(bytes, 4, body_len as u32);
}

/// Total bytes one event with `size` payload bytes occupies.
#[inline]
pub const fn event_len(size: usize) -> usize {
    EVENT_HEADER_LEN + padded(size)
}

/// One event inside an [`AtomSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomEvent<'a> {
    /// Position of the event within the block, in samples.
    pub offset: u32,
    /// Raw event payload.
    pub data: &'a [u8],
}

/// Summary produced by walking a well-formed sequence.
#[derive(Debug, Clone, Copy, Default)]
struct Shape {
    count: usize,
    last_offset: Option<u32>,
}

/// Validates `bytes` as a sequence blob and returns its shape.
fn validate(bytes: &[u8]) -> Result<(usize, Shape), BufferError> {
    if bytes.len() < ATOM_HEADER_LEN {
        return Err(BufferError::MalformedAtom("blob shorter than header"));
    }
    if bytes[..4] != ATOM_MAGIC {
        return Err(BufferError::MalformedAtom("bad magic"));
    }
    let body_len = read_u32(bytes, 4) as usize;
    let end = ATOM_HEADER_LEN
        .checked_add(body_len)
        .filter(|&end| end <= bytes.len())
        .ok_or(BufferError::MalformedAtom("body exceeds blob"))?;

    let mut shape = Shape::default();
    let mut pos = ATOM_HEADER_LEN;
    while pos < end {
        if end - pos < EVENT_HEADER_LEN {
            return Err(BufferError::MalformedAtom("truncated event header"));
        }
        let offset = read_u32(bytes, pos);
        let size = read_u32(bytes, pos + 4) as usize;
        let next = pos
            .checked_add(event_len(size))
            .filter(|&next| next <= end)
            .ok_or(BufferError::MalformedAtom("event exceeds body"))?;
        if shape.last_offset.is_some_and(|last| offset < last) {
            return Err(BufferError::MalformedAtom("events out of order"));
        }
        shape.last_offset = Some(offset);
        shape.count += 1;
        pos = next;
    }
    Ok((end, shape))
}

/// A fixed-capacity event sequence.
///
/// Holds a second scratch region of the same size so [`merge_from`](Self::merge_from)
/// can interleave two sequences without allocating.
#[derive(Debug, Clone)]
pub struct AtomSequence {
    data: Vec<u8>,
    scratch: Vec<u8>,
    used: usize,
    shape: Shape,
}

impl AtomSequence {
    /// Allocates an empty sequence with room for `capacity` bytes
    /// (header included, never less than the header).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(ATOM_HEADER_LEN);
        let mut data = vec![0u8; capacity];
        write_header(&mut data, 0);
        Self {
            data,
            scratch: vec![0u8; capacity],
            used: ATOM_HEADER_LEN,
            shape: Shape::default(),
        }
    }

    /// Total blob size in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes in use (header plus body).
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Number of events.
    #[inline]
    pub fn len(&self) -> usize {
        self.shape.count
    }

    /// Returns true if the sequence holds no events.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shape.count == 0
    }

    /// Removes all events, leaving a well-formed empty header.
    pub fn clear(&mut self) {
        self.data[ATOM_HEADER_LEN..self.used].fill(0);
        write_header(&mut self.data, 0);
        self.used = ATOM_HEADER_LEN;
        self.shape = Shape::default();
    }

    /// Appends an event. Offsets must be non-decreasing.
    pub fn push(&mut self, offset: u32, data: &[u8]) -> Result<(), BufferError> {
        if let Some(last) = self.shape.last_offset
            && offset < last
        {
            return Err(BufferError::AtomOutOfOrder { offset, last });
        }
        let needed = self.used + event_len(data.len());
        if needed > self.capacity() {
            return Err(BufferError::AtomOverflow {
                needed,
                capacity: self.capacity(),
            });
        }
        let pos = self.used;
        write_u32(&mut self.data, pos, offset);
        write_u32(&mut self.data, pos + 4, data.len() as u32);
        let payload = pos + EVENT_HEADER_LEN;
        self.data[payload..payload + data.len()].copy_from_slice(data);
        self.data[payload + data.len()..needed].fill(0);

        self.used = needed;
        self.shape.count += 1;
        self.shape.last_offset = Some(offset);
        write_header(&mut self.data, needed - ATOM_HEADER_LEN);
        Ok(())
    }

    /// Iterates events in order.
    pub fn iter(&self) -> AtomIter<'_> {
        AtomIter {
            bytes: &self.data[..self.used],
            pos: ATOM_HEADER_LEN,
        }
    }

    /// Stable merge of `other` into `self`, ordered by offset.
    ///
    /// Events with equal offsets keep `self`'s events first. On overflow
    /// `self` is left unchanged.
    pub fn merge_from(&mut self, other: &AtomSequence) -> Result<(), BufferError> {
        let body = other.used - ATOM_HEADER_LEN;
        if body == 0 {
            return Ok(());
        }
        let needed = self.used + body;
        if needed > self.capacity() {
            return Err(BufferError::AtomOverflow {
                needed,
                capacity: self.capacity(),
            });
        }

        let ours = &self.data[..self.used];
        let theirs = &other.data[..other.used];
        let mut a = ATOM_HEADER_LEN;
        let mut b = ATOM_HEADER_LEN;
        let mut out = ATOM_HEADER_LEN;
        while a < ours.len() || b < theirs.len() {
            let take_ours = if a >= ours.len() {
                false
            } else if b >= theirs.len() {
                true
            } else {
                read_u32(ours, a) <= read_u32(theirs, b)
            };
            let (src, at) = if take_ours { (ours, &mut a) } else { (theirs, &mut b) };
            let len = event_len(read_u32(src, *at + 4) as usize);
            self.scratch[out..out + len].copy_from_slice(&src[*at..*at + len]);
            *at += len;
            out += len;
        }
        write_header(&mut self.scratch, out - ATOM_HEADER_LEN);
        std::mem::swap(&mut self.data, &mut self.scratch);
        self.scratch[ATOM_HEADER_LEN..].fill(0);

        self.used = out;
        self.shape.count += other.shape.count;
        self.shape.last_offset = match (self.shape.last_offset, other.shape.last_offset) {
            (Some(x), Some(y)) => Some(x.max(y)),
            (x, y) => x.or(y),
        };
        Ok(())
    }

    /// Replaces the contents with a copy of `other`.
    pub fn copy_from(&mut self, other: &AtomSequence) -> Result<(), BufferError> {
        if other.used > self.capacity() {
            return Err(BufferError::AtomOverflow {
                needed: other.used,
                capacity: self.capacity(),
            });
        }
        if other.used < self.used {
            self.data[other.used..self.used].fill(0);
        }
        self.data[..other.used].copy_from_slice(&other.data[..other.used]);
        self.used = other.used;
        self.shape = other.shape;
        Ok(())
    }

    /// The whole blob, `capacity` bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Replaces the blob from raw bytes. `bytes` must be exactly `capacity`
    /// long and hold a well-formed sequence.
    pub fn set_bytes(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if bytes.len() != self.capacity() {
            return Err(BufferError::LengthMismatch {
                expected: self.capacity(),
                found: bytes.len(),
            });
        }
        let (used, shape) = validate(bytes)?;
        self.data.copy_from_slice(bytes);
        self.used = used;
        self.shape = shape;
        Ok(())
    }
}

impl PartialEq for AtomSequence {
    fn eq(&self, other: &Self) -> bool {
        self.data[..self.used] == other.data[..other.used]
    }
}

impl<'a> IntoIterator for &'a AtomSequence {
    type Item = AtomEvent<'a>;
    type IntoIter = AtomIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the events of an [`AtomSequence`].
#[derive(Debug, Clone)]
pub struct AtomIter<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for AtomIter<'a> {
    type Item = AtomEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + EVENT_HEADER_LEN > self.bytes.len() {
            return None;
        }
        let offset = read_u32(self.bytes, self.pos);
        let size = read_u32(self.bytes, self.pos + 4) as usize;
        let start = self.pos + EVENT_HEADER_LEN;
        let data = self.bytes.get(start..start + size)?;
        self.pos += event_len(size);
        Some(AtomEvent { offset, data })
    }
}
