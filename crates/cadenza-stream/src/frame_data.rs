//! Binary payload schema carried inside frames.
//!
//! A [`FrameData`] is one block's worth of named buffers. It is encoded with
//! `postcard`, so both ends must agree on this schema.

use cadenza_core::{Buffer, BufferError, BufferType};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Type tag of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Event sequence bytes.
    Atom,
    /// Audio block samples.
    Audio,
    /// Single control value.
    Control,
}

impl From<BufferType> for EntityKind {
    fn from(ty: BufferType) -> Self {
        match ty {
            BufferType::Control => EntityKind::Control,
            BufferType::AudioBlock { .. } => EntityKind::Audio,
            BufferType::AtomBlob { .. } => EntityKind::Atom,
        }
    }
}

/// One named buffer inside a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Buffer name.
    pub id: String,
    /// Type tag.
    pub kind: EntityKind,
    /// Declared size of `data` in bytes.
    pub size: u32,
    /// Raw little-endian buffer bytes.
    pub data: Vec<u8>,
}

impl Entity {
    /// Create an entity, taking `size` from the data.
    pub fn new(id: impl Into<String>, kind: EntityKind, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            kind,
            size: data.len() as u32,
            data,
        }
    }

    /// Snapshot a buffer.
    pub fn from_buffer(id: impl Into<String>, buffer: &Buffer) -> Self {
        Self::new(id, buffer.buffer_type().into(), buffer.get_bytes())
    }

    /// The buffer type this entity describes.
    pub fn buffer_type(&self) -> BufferType {
        let size = self.size as usize;
        match self.kind {
            EntityKind::Control => BufferType::Control,
            EntityKind::Audio => BufferType::AudioBlock { frames: size / 4 },
            EntityKind::Atom => BufferType::AtomBlob { capacity: size },
        }
    }

    /// Write this entity's bytes into a buffer of the same type.
    pub fn apply(&self, buffer: &mut Buffer) -> std::result::Result<(), BufferError> {
        let expected = buffer.buffer_type();
        if EntityKind::from(expected) != self.kind {
            return Err(BufferError::TypeMismatch {
                expected,
                found: self.buffer_type(),
            });
        }
        buffer.set_bytes(&self.data)
    }

    /// Whether `size` matches the data length.
    pub fn is_consistent(&self) -> bool {
        self.size as usize == self.data.len()
    }
}

/// One block of named buffers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameData {
    /// Absolute sample position of the block's first frame.
    pub sample_pos: u64,
    /// Frames in the block.
    pub frame_size: u32,
    /// Buffers carried in this frame.
    pub entities: Vec<Entity>,
}

impl FrameData {
    /// Create an empty frame.
    pub fn new(sample_pos: u64, frame_size: u32) -> Self {
        Self {
            sample_pos,
            frame_size,
            entities: Vec::new(),
        }
    }

    /// Append an entity (builder style).
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Find an entity by id.
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Encode with postcard.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_stdvec(self)?)
    }

    /// Decode a postcard payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_preserves_entities() {
        let mut audio = Buffer::new(BufferType::AudioBlock { frames: 4 });
        audio
            .audio_mut()
            .unwrap()
            .copy_from_slice(&[0.5, -0.5, 0.25, 1.0]);
        let mut control = Buffer::new(BufferType::Control);
        control.set_control(12.0).unwrap();

        let frame = FrameData::new(1024, 4)
            .with_entity(Entity::from_buffer("left", &audio))
            .with_entity(Entity::from_buffer("gain", &control));
        let back = FrameData::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(back, frame);
        let left = back.entity("left").unwrap();
        assert_eq!(left.kind, EntityKind::Audio);
        assert_eq!(left.size, 16);
        assert!(left.is_consistent());

        let mut restored = Buffer::new(BufferType::AudioBlock { frames: 4 });
        left.apply(&mut restored).unwrap();
        assert_eq!(restored, audio);
    }

    #[test]
    fn apply_rejects_wrong_kind_and_length() {
        let entity = Entity::new("x", EntityKind::Control, 1.0f32.to_le_bytes().to_vec());
        let mut audio = Buffer::new(BufferType::AudioBlock { frames: 1 });
        assert!(matches!(
            entity.apply(&mut audio),
            Err(BufferError::TypeMismatch { .. })
        ));

        let short = Entity::new("y", EntityKind::Audio, vec![0; 8]);
        let mut wide = Buffer::new(BufferType::AudioBlock { frames: 4 });
        assert!(matches!(
            short.apply(&mut wide),
            Err(BufferError::LengthMismatch { expected: 16, found: 8 })
        ));
    }

    #[test]
    fn entity_kind_follows_buffer_type() {
        assert_eq!(EntityKind::from(BufferType::AtomBlob { capacity: 64 }), EntityKind::Atom);
        let frame = FrameData::new(0, 0);
        assert!(FrameData::decode(&frame.encode().unwrap()).unwrap().entities.is_empty());
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(FrameData::decode(&[0xFF; 3]).is_err());
    }
}
