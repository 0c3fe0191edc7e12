//! Backend that discards output.

use std::time::Instant;

use cadenza_core::BlockContext;

use crate::backend::{Backend, BackendError, ChannelLayout, stereo_pair};

/// Discards every block.
///
/// Unpaced by default, so the engine runs as fast as it can. A
/// [`paced`](NullBackend::paced) backend sleeps in [`Backend::wait`] so
/// blocks are produced at wall-clock rate.
#[derive(Debug, Default)]
pub struct NullBackend {
    paced: bool,
    deadline: Option<Instant>,
    frames: u64,
}

impl NullBackend {
    /// Unpaced null backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Null backend paced to real time.
    pub fn paced() -> Self {
        Self {
            paced: true,
            ..Self::default()
        }
    }

    /// Frames discarded so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Backend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn setup(&mut self, sample_rate: u32) -> Result<(), BackendError> {
        tracing::debug!(sample_rate, paced = self.paced, "null backend ready");
        self.deadline = None;
        self.frames = 0;
        Ok(())
    }

    fn wait(&mut self) -> Result<(), BackendError> {
        if let Some(deadline) = self.deadline {
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }
        Ok(())
    }

    fn begin_frame(&mut self, ctx: &BlockContext) -> Result<(), BackendError> {
        if self.paced {
            let start = self.deadline.unwrap_or_else(Instant::now);
            self.deadline = Some(start + ctx.duration());
        }
        Ok(())
    }

    fn output(
        &mut self,
        layout: ChannelLayout,
        frames: usize,
        blocks: &[&[f32]],
    ) -> Result<(), BackendError> {
        stereo_pair(layout, frames, blocks)?;
        self.frames += frames as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn remaining(backend: &NullBackend) -> Duration {
        backend
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    #[test]
    fn test_unpaced_never_sleeps() {
        let mut backend = NullBackend::new();
        backend.setup(48000).unwrap();
        backend
            .begin_frame(&BlockContext::new(0, 48000, 48000.0))
            .unwrap();
        assert_eq!(remaining(&backend), Duration::ZERO);
        backend.output(ChannelLayout::Mono, 4, &[&[0.0; 4]]).unwrap();
        assert_eq!(backend.frames(), 4);
    }

    #[test]
    fn test_paced_waits_one_block() {
        let mut backend = NullBackend::paced();
        backend.setup(1000).unwrap();
        backend.wait().unwrap();
        backend.begin_frame(&BlockContext::new(0, 20, 1000.0)).unwrap();
        assert!(remaining(&backend) > Duration::from_millis(10));

        let start = Instant::now();
        backend.wait().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
