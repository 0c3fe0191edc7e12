//! Sound card output through cpal.
//!
//! The engine thread and the device callback share a small ring of
//! interleaved stereo samples under a `parking_lot` mutex. The callback only
//! ever `try_lock`s it, so a busy engine thread costs one buffer of silence
//! rather than a blocked audio thread. The engine side paces itself in
//! [`Backend::wait`] by sleeping until the ring has room for another block.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use crate::backend::{Backend, BackendError, ChannelLayout, interleave_into, stereo_pair};

/// Ring length in seconds of audio.
const RING_SECONDS: f32 = 0.1;

/// Longest `wait` before the device is considered stalled.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Sleep between ring checks in `wait`.
const WAIT_POLL: Duration = Duration::from_millis(1);

/// Output device information.
#[derive(Debug, Clone)]
pub struct OutputDevice {
    /// Human-readable device name.
    pub name: String,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
    /// Whether this is the host's default output.
    pub is_default: bool,
}

/// Extract device name via `description()` (cpal 0.17+).
fn device_name(device: &cpal::Device) -> Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// List output devices of the default host.
pub fn list_output_devices() -> Result<Vec<OutputDevice>, BackendError> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| device_name(&d).ok());

    let outputs = host
        .output_devices()
        .map_err(|e| BackendError::Device(e.to_string()))?;
    let mut devices = Vec::new();
    for device in outputs {
        if let Ok(name) = device_name(&device) {
            let default_sample_rate = device
                .default_output_config()
                .map(|c| c.sample_rate())
                .unwrap_or(48000);
            devices.push(OutputDevice {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                default_sample_rate,
            });
        }
    }
    Ok(devices)
}

#[derive(Debug, Default)]
struct Ring {
    samples: VecDeque<f32>,
    capacity: usize,
}

/// State shared with the device callback.
#[derive(Debug, Default)]
struct Shared {
    ring: Mutex<Ring>,
    failed: AtomicBool,
    underruns: AtomicU64,
}

/// Stereo output to a cpal device.
pub struct CpalBackend {
    device_name: Option<String>,
    shared: Arc<Shared>,
    stream: Option<cpal::Stream>,
    scratch: Vec<f32>,
    block_samples: usize,
}

impl CpalBackend {
    /// Backend for the default output device.
    pub fn new() -> Self {
        Self::with_device(None)
    }

    /// Backend for the first output device whose name contains `name`
    /// (case-insensitive), or the default when `None`.
    pub fn with_device(name: Option<String>) -> Self {
        Self {
            device_name: name,
            shared: Arc::new(Shared::default()),
            stream: None,
            scratch: Vec::new(),
            block_samples: 0,
        }
    }

    /// Callback invocations that found too few samples.
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    fn find_device(&self, host: &cpal::Host) -> Result<cpal::Device, BackendError> {
        match &self.device_name {
            Some(search) => {
                let search_lower = search.to_lowercase();
                let devices = host
                    .output_devices()
                    .map_err(|e| BackendError::Device(e.to_string()))?;
                for device in devices {
                    if let Ok(name) = device_name(&device)
                        && name.to_lowercase().contains(&search_lower)
                    {
                        return Ok(device);
                    }
                }
                Err(BackendError::DeviceNotFound(format!(
                    "no output device matching '{}'",
                    search
                )))
            }
            None => host.default_output_device().ok_or(BackendError::NoDevice),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Device callback: drain the ring into `data`, padding with silence.
fn fill_output(shared: &Shared, data: &mut [f32]) {
    let Some(mut ring) = shared.ring.try_lock() else {
        data.fill(0.0);
        shared.underruns.fetch_add(1, Ordering::Relaxed);
        return;
    };
    let n = data.len().min(ring.samples.len());
    for (out, s) in data.iter_mut().zip(ring.samples.drain(..n)) {
        *out = s;
    }
    drop(ring);
    if n < data.len() {
        data[n..].fill(0.0);
        shared.underruns.fetch_add(1, Ordering::Relaxed);
    }
}

impl Backend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn setup(&mut self, sample_rate: u32) -> Result<(), BackendError> {
        let host = cpal::default_host();
        let device = self.find_device(&host)?;

        {
            let mut ring = self.shared.ring.lock();
            ring.capacity = ((sample_rate as f32 * RING_SECONDS) as usize).max(64) * 2;
            ring.samples.clear();
            let capacity = ring.capacity;
            ring.samples.reserve(capacity);
        }
        self.shared.failed.store(false, Ordering::Release);

        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        let callback_shared = Arc::clone(&self.shared);
        let error_shared = Arc::clone(&self.shared);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    fill_output(&callback_shared, data);
                },
                move |err| {
                    tracing::error!(error = %err, "output stream error");
                    error_shared.failed.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(|e| BackendError::Device(e.to_string()))?;
        stream
            .play()
            .map_err(|e| BackendError::Device(e.to_string()))?;

        tracing::info!(
            device = %device_name(&device).unwrap_or_default(),
            sample_rate,
            "output stream started"
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), BackendError> {
        if self.stream.take().is_some() {
            tracing::info!(underruns = self.underruns(), "output stream stopped");
        }
        self.shared.ring.lock().samples.clear();
        Ok(())
    }

    fn wait(&mut self) -> Result<(), BackendError> {
        if self.stream.is_none() {
            return Err(BackendError::NotSetUp);
        }
        let start = Instant::now();
        loop {
            if self.shared.failed.load(Ordering::Acquire) {
                return Err(BackendError::Device("output stream failed".into()));
            }
            {
                let ring = self.shared.ring.lock();
                if ring.samples.len() + self.block_samples <= ring.capacity {
                    return Ok(());
                }
            }
            if start.elapsed() > STALL_TIMEOUT {
                return Err(BackendError::Device("output device stalled".into()));
            }
            std::thread::sleep(WAIT_POLL);
        }
    }

    fn output(
        &mut self,
        layout: ChannelLayout,
        frames: usize,
        blocks: &[&[f32]],
    ) -> Result<(), BackendError> {
        if self.stream.is_none() {
            return Err(BackendError::NotSetUp);
        }
        let (left, right) = stereo_pair(layout, frames, blocks)?;
        self.scratch.clear();
        interleave_into(left, right, &mut self.scratch);
        self.block_samples = self.scratch.len();

        let mut ring = self.shared.ring.lock();
        let room = ring.capacity.saturating_sub(ring.samples.len());
        let n = room.min(self.scratch.len());
        ring.samples.extend(&self.scratch[..n]);
        if n < self.scratch.len() {
            tracing::trace!(dropped = self.scratch.len() - n, "ring full");
        }
        Ok(())
    }
}

impl std::fmt::Debug for CpalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalBackend")
            .field("device_name", &self.device_name)
            .field("running", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}
