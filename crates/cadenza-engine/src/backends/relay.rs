//! Backend that forwards blocks to another process.

use std::path::{Path, PathBuf};

use cadenza_config::StreamSettings;
use cadenza_core::BlockContext;
use cadenza_stream::{Entity, EntityKind, FrameData, FramedStream};

use crate::backend::{Backend, BackendError, ChannelLayout, stereo_pair};

/// Entity id of the left channel.
pub const RELAY_LEFT: &str = "left";

/// Entity id of the right channel.
pub const RELAY_RIGHT: &str = "right";

/// Sends every block as a [`FrameData`] over a framed stream client.
///
/// Connects in [`Backend::setup`] to a server listening in `dir`, blocking
/// until the server side has opened the FIFOs. Each block becomes one frame
/// with two audio entities, `left` and `right`. Pacing comes from the pipe:
/// a slow reader blocks the engine in `output`.
pub struct RelayBackend {
    dir: PathBuf,
    settings: StreamSettings,
    stream: Option<FramedStream>,
    sample_pos: u64,
}

impl RelayBackend {
    /// Relay to the server in `dir`.
    pub fn new(dir: impl AsRef<Path>, settings: StreamSettings) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            settings,
            stream: None,
            sample_pos: 0,
        }
    }
}

fn audio_entity(id: &str, samples: &[f32]) -> Entity {
    let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    Entity::new(id, EntityKind::Audio, data)
}

impl Backend for RelayBackend {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn setup(&mut self, sample_rate: u32) -> Result<(), BackendError> {
        let stream = FramedStream::client(&self.dir, &self.settings)?;
        tracing::info!(dir = %self.dir.display(), sample_rate, "relay connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), BackendError> {
        if let Some(mut stream) = self.stream.take() {
            match stream.close() {
                Ok(()) | Err(cadenza_stream::StreamError::HungUp) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn begin_frame(&mut self, ctx: &BlockContext) -> Result<(), BackendError> {
        self.sample_pos = ctx.sample_pos;
        Ok(())
    }

    fn output(
        &mut self,
        layout: ChannelLayout,
        frames: usize,
        blocks: &[&[f32]],
    ) -> Result<(), BackendError> {
        let (left, right) = stereo_pair(layout, frames, blocks)?;
        let stream = self.stream.as_mut().ok_or(BackendError::NotSetUp)?;
        let frame = FrameData::new(self.sample_pos, left.len() as u32)
            .with_entity(audio_entity(RELAY_LEFT, left))
            .with_entity(audio_entity(RELAY_RIGHT, right));
        stream.send_data(&frame)?;
        Ok(())
    }
}

impl std::fmt::Debug for RelayBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayBackend")
            .field("dir", &self.dir)
            .field("connected", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_entity_bytes() {
        let entity = audio_entity(RELAY_LEFT, &[1.0, -1.0]);
        assert_eq!(entity.size, 8);
        assert_eq!(&entity.data[..4], &1.0f32.to_le_bytes());
        assert_eq!(entity.buffer_type(), cadenza_core::BufferType::AudioBlock { frames: 2 });
    }

    #[test]
    fn test_output_before_setup_fails() {
        let mut backend = RelayBackend::new("/nonexistent", StreamSettings::default());
        assert!(matches!(
            backend.output(ChannelLayout::Mono, 1, &[&[0.0]]),
            Err(BackendError::NotSetUp)
        ));
        assert!(matches!(
            backend.setup(48000),
            Err(BackendError::Stream(_))
        ));
    }
}
