//! Pluggable audio sink abstraction.
//!
//! The engine never talks to a device directly. Every block it calls into a
//! [`Backend`]:
//!
//! ```text
//! wait() ─▶ begin_frame(ctx) ─▶ output(layout, frames, blocks)* ─▶ end_frame()
//! ```
//!
//! `wait` is where a backend that owns real-time pacing (a sound card, a
//! wall-clock timer) blocks the engine thread until the next block is due.
//! Backends that are paced by something else leave it as a no-op.
//!
//! Implementations in this crate:
//!
//! - [`NullBackend`](crate::NullBackend) - discards output, optionally paced to wall-clock time
//! - [`WavBackend`](crate::WavBackend) - writes stereo float WAV via `hound`
//! - [`CpalBackend`](crate::CpalBackend) - device output through a ring buffer
//! - [`RelayBackend`](crate::RelayBackend) - forwards blocks over a framed stream

use cadenza_core::BlockContext;
use cadenza_stream::StreamError;

/// Channel arrangement of the blocks passed to [`Backend::output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// One block.
    Mono,
    /// Left and right blocks.
    Stereo,
}

impl ChannelLayout {
    /// Number of blocks this layout carries.
    pub const fn channels(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Errors raised by backends.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No output device is available.
    #[error("no audio device available")]
    NoDevice,

    /// The requested device was not found.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device or its stream failed.
    #[error("audio device error: {0}")]
    Device(String),

    /// The number of blocks does not match the layout.
    #[error("{layout:?} output needs {expected} blocks, got {found}")]
    LayoutMismatch {
        /// Requested layout.
        layout: ChannelLayout,
        /// Blocks the layout needs.
        expected: usize,
        /// Blocks passed.
        found: usize,
    },

    /// `output` was called before `setup` or after `cleanup`.
    #[error("backend is not set up")]
    NotSetUp,

    /// WAV file error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Framed stream error.
    #[error("relay stream error: {0}")]
    Stream(#[from] StreamError),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An audio sink driven once per block by the engine.
///
/// Backends run on the engine thread. A backend that owns its own realtime
/// thread (a device callback) must only share bounded, non-blocking state
/// with it.
pub trait Backend: Send {
    /// Human-readable name of this backend.
    fn name(&self) -> &str;

    /// Prepare for output at the given sample rate.
    fn setup(&mut self, sample_rate: u32) -> Result<(), BackendError>;

    /// Release resources. Called before the backend is replaced or dropped.
    fn cleanup(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Block until the next block should be produced.
    fn wait(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Start of a block.
    fn begin_frame(&mut self, _ctx: &BlockContext) -> Result<(), BackendError> {
        Ok(())
    }

    /// End of a block.
    fn end_frame(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Consume `frames` samples from each block in `blocks`.
    fn output(
        &mut self,
        layout: ChannelLayout,
        frames: usize,
        blocks: &[&[f32]],
    ) -> Result<(), BackendError>;
}

/// Check `blocks` matches `layout` and return the left/right pair.
///
/// Mono input is duplicated to both sides; blocks longer than `frames` are
/// truncated.
pub fn stereo_pair<'a>(
    layout: ChannelLayout,
    frames: usize,
    blocks: &[&'a [f32]],
) -> Result<(&'a [f32], &'a [f32]), BackendError> {
    let expected = layout.channels();
    if blocks.len() != expected {
        return Err(BackendError::LayoutMismatch {
            layout,
            expected,
            found: blocks.len(),
        });
    }
    let left = blocks[0];
    let right = blocks[expected - 1];
    let n = frames.min(left.len()).min(right.len());
    Ok((&left[..n], &right[..n]))
}

/// Interleave a stereo pair into `out`.
pub fn interleave_into(left: &[f32], right: &[f32], out: &mut Vec<f32>) {
    out.reserve(left.len() * 2);
    for (&l, &r) in left.iter().zip(right) {
        out.push(l);
        out.push(r);
    }
}
