//! Block VM, engine thread, and audio backends for cadenza.
//!
//! This crate provides:
//!
//! - **VM**: [`Vm`] executes a compiled [`Program`](cadenza_core::Program)
//!   one block at a time against its own buffer arena
//! - **Engine**: [`Engine`] drives a VM from a dedicated thread, with
//!   between-block program and backend swaps
//! - **Backends**: [`Backend`] implementations for silence
//!   ([`NullBackend`]), WAV files ([`WavBackend`]), sound cards
//!   ([`CpalBackend`]), and another process ([`RelayBackend`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cadenza_config::EngineSettings;
//! use cadenza_engine::{Engine, NullBackend};
//!
//! let engine = Engine::start(EngineSettings::default())?;
//! engine.set_backend(Some(Box::new(NullBackend::paced())))?;
//! engine.set_spec(Some(program))?;
//!
//! for event in engine.subscribe().iter().take(10) {
//!     println!("{event:?}");
//! }
//! ```
//!
//! ## Faults
//!
//! A failing block is logged at `error` and handled per
//! [`FaultPolicy`](cadenza_config::FaultPolicy): `abort` terminates the
//! process, `disable` tears down the program and reports
//! [`EngineEvent::PipelineDisabled`].

pub mod backend;
pub mod backends;
mod engine;
mod error;
mod vm;

pub use backend::{Backend, BackendError, ChannelLayout, interleave_into, stereo_pair};
pub use backends::{
    CpalBackend, NullBackend, OutputDevice, RELAY_LEFT, RELAY_RIGHT, RelayBackend, WavBackend,
    list_output_devices,
};
pub use engine::{EVENT_CAPACITY, Engine, EngineEvent, EngineState};
pub use error::{EngineError, Result};
pub use vm::{NOTIFICATION_CAPACITY, OpState, Vm};
