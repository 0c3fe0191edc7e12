//! Backend that renders to a WAV file.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::backend::{Backend, BackendError, ChannelLayout, stereo_pair};

/// Writes every block to a stereo 32-bit float WAV file.
///
/// The file is created in [`Backend::setup`] and finalized in
/// [`Backend::cleanup`]. Mono output is written to both channels.
pub struct WavBackend {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames: u64,
}

impl WavBackend {
    /// Backend that will write to `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            frames: 0,
        }
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Backend for WavBackend {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn setup(&mut self, sample_rate: u32) -> Result<(), BackendError> {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        self.writer = Some(WavWriter::create(&self.path, spec)?);
        self.frames = 0;
        tracing::info!(path = %self.path.display(), sample_rate, "rendering to WAV");
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), BackendError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            tracing::info!(path = %self.path.display(), frames = self.frames, "WAV finalized");
        }
        Ok(())
    }

    fn output(
        &mut self,
        layout: ChannelLayout,
        frames: usize,
        blocks: &[&[f32]],
    ) -> Result<(), BackendError> {
        let (left, right) = stereo_pair(layout, frames, blocks)?;
        let writer = self.writer.as_mut().ok_or(BackendError::NotSetUp)?;
        for (&l, &r) in left.iter().zip(right) {
            writer.write_sample(l)?;
            writer.write_sample(r)?;
        }
        self.frames += left.len() as u64;
        Ok(())
    }
}

impl std::fmt::Debug for WavBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavBackend")
            .field("path", &self.path)
            .field("open", &self.writer.is_some())
            .field("frames", &self.frames)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;
    use tempfile::NamedTempFile;

    #[test]
    fn test_writes_interleaved_stereo() {
        let file = NamedTempFile::new().unwrap();
        let mut backend = WavBackend::new(file.path());
        backend.setup(44100).unwrap();
        backend
            .output(ChannelLayout::Stereo, 2, &[&[0.5, 0.25], &[-0.5, -0.25]])
            .unwrap();
        backend.output(ChannelLayout::Mono, 1, &[&[1.0]]).unwrap();
        assert_eq!(backend.frames(), 3);
        backend.cleanup().unwrap();

        let reader = WavReader::open(file.path()).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44100);
        let samples: Vec<f32> = reader.into_samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.5, -0.5, 0.25, -0.25, 1.0, 1.0]);
    }

    #[test]
    fn test_output_before_setup_fails() {
        let mut backend = WavBackend::new("/nonexistent/out.wav");
        assert!(matches!(
            backend.output(ChannelLayout::Mono, 1, &[&[0.0]]),
            Err(BackendError::NotSetUp)
        ));
        assert!(backend.setup(48000).is_err());
        backend.cleanup().unwrap();
    }
}
