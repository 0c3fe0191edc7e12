//! The engine thread.
//!
//! [`Engine`] owns one OS thread that drives a [`Vm`] block by block. Other
//! threads swap the program and the backend through the same mutex the loop
//! holds for the duration of a block, so a block always sees one consistent
//! program/backend pair and swaps land between blocks.
//!
//! ```text
//!  app thread                      engine thread
//!  ──────────                      ─────────────
//!  set_spec ──┐                    loop {
//!  set_backend┼──► Mutex<Vm> ◄──     lock; wait; run_block; unlock
//!             │                      publish events ──► subscribers
//!  subscribe ◄┘                    }
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use cadenza_config::{EngineSettings, FaultPolicy};
use cadenza_core::{BlockContext, BufferType, NodeNotification, PerfStats, Program};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::{Mutex, MutexGuard};

use crate::backend::Backend;
use crate::error::{EngineError, Result};
use crate::vm::{NOTIFICATION_CAPACITY, Vm};

/// Capacity of each subscriber's event queue.
pub const EVENT_CAPACITY: usize = 256;

/// Lifecycle state of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    /// No program installed.
    Idle = 0,
    /// A program is installed and has not run its first block.
    Ready = 1,
    /// Blocks are being executed.
    Running = 2,
    /// The engine was stopped.
    Stopped = 3,
    /// A block failed and the pipeline was torn down.
    Disabled = 4,
}

impl EngineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => EngineState::Idle,
            1 => EngineState::Ready,
            2 => EngineState::Running,
            3 => EngineState::Stopped,
            _ => EngineState::Disabled,
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Ready => "ready",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
            EngineState::Disabled => "disabled",
        }
    }

    /// Whether the engine still accepts programs and backends.
    pub fn is_live(self) -> bool {
        !matches!(self, EngineState::Stopped | EngineState::Disabled)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened on the engine thread.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Timing of a completed block.
    Perf(PerfStats),
    /// A node emitted a notification.
    Notification(NodeNotification),
    /// A block failed; the engine is disabled and needs a restart.
    PipelineDisabled(String),
}

struct Shared {
    vm: Mutex<Vm>,
    state: AtomicU8,
    exit: AtomicBool,
    position: AtomicU64,
    subscribers: Mutex<Vec<Sender<EngineEvent>>>,
}

impl Shared {
    fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn publish(&self, event: EngineEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    fn has_subscribers(&self) -> bool {
        !self.subscribers.lock().is_empty()
    }
}

/// A running engine thread.
///
/// Dropping the engine stops the thread and cleans up the backend.
pub struct Engine {
    shared: Arc<Shared>,
    settings: EngineSettings,
    thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Spawn the engine thread.
    ///
    /// The thread idles until both a program and a backend are installed.
    pub fn start(settings: EngineSettings) -> Result<Self> {
        let shared = Arc::new(Shared {
            vm: Mutex::new(Vm::new(settings.sample_rate)),
            state: AtomicU8::new(EngineState::Idle as u8),
            exit: AtomicBool::new(false),
            position: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        });

        let thread = {
            let shared = Arc::clone(&shared);
            let settings = settings.clone();
            thread::Builder::new()
                .name("cadenza-engine".into())
                .spawn(move || run_loop(&shared, &settings))
                .map_err(EngineError::Spawn)?
        };

        tracing::info!(
            sample_rate = settings.sample_rate,
            block_size = settings.block_size,
            fault_policy = ?settings.fault_policy,
            "engine started"
        );
        Ok(Self {
            shared,
            settings,
            thread: Some(thread),
        })
    }

    /// Engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// Sample position of the next block.
    pub fn position(&self) -> u64 {
        self.shared.position.load(Ordering::Acquire)
    }

    /// Install a program, or uninstall with `None`.
    ///
    /// Every audio buffer of the program must hold exactly one engine block.
    /// Takes effect between blocks.
    pub fn set_spec(&self, program: Option<Program>) -> Result<()> {
        self.ensure_live()?;
        if let Some(program) = &program {
            check_block_size(program, self.settings.block_size)?;
        }
        let mut vm = self.shared.vm.lock();
        vm.set_spec(program);
        self.shared.set_state(if vm.has_program() {
            EngineState::Ready
        } else {
            EngineState::Idle
        });
        Ok(())
    }

    /// Replace the backend, or remove it with `None`.
    ///
    /// Takes effect between blocks.
    pub fn set_backend(&self, backend: Option<Box<dyn Backend>>) -> Result<()> {
        self.ensure_live()?;
        self.shared.vm.lock().set_backend(backend)
    }

    /// Receive engine events.
    ///
    /// Events are dropped for a subscriber whose queue is full.
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = bounded(EVENT_CAPACITY);
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Run `f` with exclusive access to the VM, between blocks.
    pub fn with_vm<R>(&self, f: impl FnOnce(&mut Vm) -> R) -> R {
        f(&mut self.shared.vm.lock())
    }

    /// Stop the thread and clean up the backend.
    ///
    /// A disabled engine stays [`EngineState::Disabled`].
    pub fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.shared.exit.store(true, Ordering::Release);
        if thread.join().is_err() {
            tracing::error!("engine thread panicked");
        }
        if self.shared.state() != EngineState::Disabled {
            self.shared.set_state(EngineState::Stopped);
        }
        let mut vm = self.shared.vm.lock();
        vm.set_spec(None);
        let cleaned = vm.set_backend(None);
        tracing::info!(position = self.position(), "engine stopped");
        cleaned
    }

    fn ensure_live(&self) -> Result<()> {
        let state = self.state();
        if state.is_live() {
            Ok(())
        } else {
            Err(EngineError::NotRunning(state.as_str()))
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "engine shutdown failed");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("position", &self.position())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn check_block_size(program: &Program, block_size: usize) -> Result<()> {
    let bad = program.spec().buffers().iter().find(|decl| {
        matches!(decl.ty, BufferType::AudioBlock { frames } if frames != block_size)
    });
    match bad {
        Some(decl) => Err(EngineError::BlockSizeMismatch {
            buffer: decl.name.clone(),
            ty: decl.ty,
            block_size,
        }),
        None => Ok(()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_loop(shared: &Shared, settings: &EngineSettings) {
    let sample_rate = settings.sample_rate as f32;
    let mut sample_pos = 0u64;
    let mut notifications: Vec<NodeNotification> = Vec::with_capacity(NOTIFICATION_CAPACITY);

    while !shared.exit.load(Ordering::Acquire) {
        let mut vm = shared.vm.lock();
        if !(vm.has_program() && vm.has_backend()) {
            drop(vm);
            thread::sleep(settings.idle_sleep());
            continue;
        }

        let mut block = BlockContext::new(sample_pos, settings.block_size, sample_rate);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            vm.wait()?;
            vm.run_block(&mut block)
        }))
        .unwrap_or_else(|payload| Err(EngineError::Panicked(panic_message(&*payload))));

        if let Err(e) = outcome {
            tracing::error!(sample_pos, error = %e, "engine fault");
            match settings.fault_policy {
                FaultPolicy::Abort => std::process::abort(),
                FaultPolicy::Disable => {
                    vm.set_spec(None);
                    shared.set_state(EngineState::Disabled);
                    drop(vm);
                    shared.publish(EngineEvent::PipelineDisabled(e.to_string()));
                    return;
                }
            }
        }

        vm.drain_notifications(&mut notifications);
        if shared.state() == EngineState::Ready {
            shared.set_state(EngineState::Running);
        }
        MutexGuard::unlock_fair(vm);

        sample_pos += block.frames as u64;
        shared.position.store(sample_pos, Ordering::Release);
        if shared.has_subscribers() {
            shared.publish(EngineEvent::Perf(block.perf));
            for n in notifications.drain(..) {
                shared.publish(EngineEvent::Notification(n));
            }
        } else {
            notifications.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::{Op, SpecBuilder};

    #[test]
    fn test_state_round_trip() {
        for state in [
            EngineState::Idle,
            EngineState::Ready,
            EngineState::Running,
            EngineState::Stopped,
            EngineState::Disabled,
        ] {
            assert_eq!(EngineState::from_u8(state as u8), state);
        }
        assert!(EngineState::Running.is_live());
        assert!(!EngineState::Disabled.is_live());
    }

    #[test]
    fn test_block_size_check() {
        let mut builder = SpecBuilder::new();
        builder
            .buffer("a", BufferType::AudioBlock { frames: 128 })
            .buffer("c", BufferType::Control)
            .op(Op::Mul {
                buf: "a".into(),
                factor: 0.5,
            });
        let program = Program::new(builder.build().unwrap(), Vec::new()).unwrap();
        assert!(check_block_size(&program, 128).is_ok());
        match check_block_size(&program, 256) {
            Err(EngineError::BlockSizeMismatch { buffer, block_size, .. }) => {
                assert_eq!(buffer, "a");
                assert_eq!(block_size, 256);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[test]
    fn test_idle_engine_stops() {
        let mut engine = Engine::start(EngineSettings::default()).unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
        engine.stop().unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(matches!(
            engine.set_spec(None),
            Err(EngineError::NotRunning("stopped"))
        ));
        engine.stop().unwrap();
    }
}
