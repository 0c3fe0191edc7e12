//! Single-threaded executor for compiled programs.
//!
//! The [`Vm`] owns the buffer arena of the installed program and the
//! current backend. It has no thread of its own: [`Engine`](crate::Engine)
//! drives it from a dedicated thread, while offline renders and tests call
//! [`Vm::run_block`] directly.
//!
//! ## Block execution
//!
//! The first block after a program is installed runs its `Init` opcodes
//! (port wiring) and then its `Performance` opcodes. Every later block runs
//! only the `Performance` opcodes, in list order.

use std::f32::consts::TAU;
use std::time::Instant;

use cadenza_core::{
    BlockContext, Buffer, BufferArena, BufferError, NodeHandle, NodeId, NodeNotification, Op,
    Opcode, Phase, Program, ProcessContext, Spec,
};

use crate::backend::{Backend, ChannelLayout};
use crate::error::{EngineError, Result};

/// Seed of the noise generator of the first NOISE opcode.
const NOISE_SEED: u32 = 0x2545_F491;

/// Notifications a block can queue before the VM's queue reallocates.
pub const NOTIFICATION_CAPACITY: usize = 64;

/// State an opcode carries from one block to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpState {
    /// Stateless opcode.
    None,
    /// Oscillator phase in radians, kept in `[0, 2π)`.
    Phase(f32),
    /// Linear congruential generator state.
    Rng(u32),
}

impl OpState {
    fn initial(index: usize, op: &Opcode) -> Self {
        match op {
            Op::Sine { .. } => OpState::Phase(0.0),
            Op::Noise { .. } => OpState::Rng(NOISE_SEED.wrapping_add(index as u32)),
            _ => OpState::None,
        }
    }
}

/// Advance the LCG and return a value in `[-1, 1]`.
#[inline]
fn next_noise(state: &mut u32) -> f32 {
    *state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    let upper = (*state >> 16) as u16;
    f32::from(upper) / 32_767.5 - 1.0
}

/// A program together with the memory it runs against.
struct Installed {
    program: Program,
    arena: BufferArena,
    states: Vec<OpState>,
    initialized: bool,
}

impl Installed {
    fn new(program: Program) -> Self {
        let spec = program.spec();
        let arena = spec.allocate();
        let states = spec
            .opcodes()
            .iter()
            .enumerate()
            .map(|(i, op)| OpState::initial(i, op))
            .collect();
        Self {
            program,
            arena,
            states,
            initialized: false,
        }
    }
}

/// Executes one program against its arena, one block at a time.
pub struct Vm {
    sample_rate: u32,
    installed: Option<Installed>,
    backend: Option<Box<dyn Backend>>,
    notifications: Vec<NodeNotification>,
}

impl Vm {
    /// Create an idle VM for the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            installed: None,
            backend: None,
            notifications: Vec::with_capacity(NOTIFICATION_CAPACITY),
        }
    }

    /// Sample rate passed to backends.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Install a program, or uninstall with `None`.
    ///
    /// The previous arena is discarded and a fresh one allocated, so the
    /// next block starts with `Init` opcodes and zeroed buffers.
    pub fn set_spec(&mut self, program: Option<Program>) {
        self.notifications.clear();
        self.installed = program.and_then(|program| {
            if program.spec().is_empty() {
                None
            } else {
                Some(Installed::new(program))
            }
        });
        match &self.installed {
            Some(installed) => {
                let spec = installed.program.spec();
                tracing::info!(
                    buffers = spec.buffers().len(),
                    nodes = spec.nodes().len(),
                    opcodes = spec.opcodes().len(),
                    bytes = spec.byte_len(),
                    "spec installed"
                );
            }
            None => tracing::info!("spec cleared"),
        }
    }

    /// Replace the backend, cleaning up the old one and setting up the new.
    ///
    /// A failing cleanup is logged and does not prevent the swap. A failing
    /// setup leaves the VM without a backend.
    pub fn set_backend(&mut self, backend: Option<Box<dyn Backend>>) -> Result<()> {
        if let Some(mut old) = self.backend.take() {
            if let Err(e) = old.cleanup() {
                tracing::warn!(backend = old.name(), error = %e, "backend cleanup failed");
            }
        }
        if let Some(mut backend) = backend {
            backend
                .setup(self.sample_rate)
                .map_err(|e| EngineError::backend(backend.name(), e))?;
            tracing::info!(backend = backend.name(), "backend installed");
            self.backend = Some(backend);
        }
        Ok(())
    }

    /// Whether a program is installed.
    pub fn has_program(&self) -> bool {
        self.installed.is_some()
    }

    /// Whether a backend is installed.
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Whether the installed program has run its `Init` opcodes.
    pub fn is_initialized(&self) -> bool {
        self.installed.as_ref().is_some_and(|i| i.initialized)
    }

    /// The installed spec.
    pub fn spec(&self) -> Option<&Spec> {
        self.installed.as_ref().map(|i| &**i.program.spec())
    }

    /// Name of the installed backend.
    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    /// Look up a buffer of the installed program by name.
    pub fn buffer(&self, name: &str) -> Option<&Buffer> {
        let installed = self.installed.as_ref()?;
        let r = installed.program.spec().buffer_ref(name)?;
        installed.arena.get(r).ok()
    }

    /// Look up a buffer of the installed program by name, for writing.
    pub fn buffer_mut(&mut self, name: &str) -> Option<&mut Buffer> {
        let installed = self.installed.as_mut()?;
        let r = installed.program.spec().buffer_ref(name)?;
        installed.arena.get_mut(r).ok()
    }

    /// State slot of the opcode at `index`.
    pub fn op_state(&self, index: usize) -> Option<OpState> {
        self.installed.as_ref()?.states.get(index).copied()
    }

    /// Block until the backend is ready for the next block.
    pub fn wait(&mut self) -> Result<()> {
        match self.backend.as_deref_mut() {
            Some(backend) => backend
                .wait()
                .map_err(|e| EngineError::backend(backend.name(), e)),
            None => Ok(()),
        }
    }

    /// Move notifications emitted during the last block into `out`.
    ///
    /// Anything not drained is discarded when the next block starts.
    pub fn drain_notifications(&mut self, out: &mut Vec<NodeNotification>) {
        out.append(&mut self.notifications);
    }

    /// Run one block.
    ///
    /// Records executed opcode count and elapsed time in `block.perf`.
    pub fn run_block(&mut self, block: &mut BlockContext) -> Result<()> {
        self.notifications.clear();
        let installed = self.installed.as_mut().ok_or(EngineError::NoProgram)?;
        let start = Instant::now();

        if let Some(backend) = self.backend.as_deref_mut() {
            backend
                .begin_frame(block)
                .map_err(|e| EngineError::backend(backend.name(), e))?;
        }

        let spec = std::sync::Arc::clone(installed.program.spec());
        let mut exec = Exec {
            block,
            arena: &mut installed.arena,
            nodes: installed.program.nodes(),
            ids: spec.nodes(),
            backend: self.backend.as_deref_mut(),
            notifications: &mut self.notifications,
        };

        let mut executed = 0;
        let phases: &[Phase] = if installed.initialized {
            &[Phase::Performance]
        } else {
            &[Phase::Init, Phase::Performance]
        };
        for &phase in phases {
            for (index, (op, state)) in spec
                .opcodes()
                .iter()
                .zip(installed.states.iter_mut())
                .enumerate()
            {
                if op.phase() == phase {
                    exec.run(index, op, state)?;
                    executed += 1;
                }
            }
            if phase == Phase::Init {
                installed.initialized = true;
            }
        }

        if let Some(backend) = self.backend.as_deref_mut() {
            backend
                .end_frame()
                .map_err(|e| EngineError::backend(backend.name(), e))?;
        }

        block.perf.opcodes = executed;
        block.perf.elapsed = start.elapsed();
        tracing::trace!(
            sample_pos = block.sample_pos,
            opcodes = executed,
            load = block.perf.load(),
            "block done"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("sample_rate", &self.sample_rate)
            .field("spec", &self.spec())
            .field("initialized", &self.is_initialized())
            .field("backend", &self.backend_name())
            .finish()
    }
}

/// Borrowed state for executing the opcodes of one block.
struct Exec<'a> {
    block: &'a BlockContext,
    arena: &'a mut BufferArena,
    nodes: &'a [NodeHandle],
    ids: &'a [NodeId],
    backend: Option<&'a mut (dyn Backend + 'static)>,
    notifications: &'a mut Vec<NodeNotification>,
}

impl Exec<'_> {
    fn run(&mut self, index: usize, op: &Opcode, state: &mut OpState) -> Result<()> {
        let buffer_err = |source: BufferError| EngineError::Opcode {
            index,
            op: op.name(),
            source,
        };

        match op {
            Op::ClearBuffer { buf } => self.arena.get_mut(*buf).map_err(buffer_err)?.clear(),
            Op::CopyBuffer { src, dst } => {
                let (src, dst) = self.arena.pair_mut(*src, *dst).map_err(buffer_err)?;
                dst.copy_from(src).map_err(buffer_err)?;
            }
            Op::SetFloat { buf, value } => self
                .arena
                .get_mut(*buf)
                .and_then(|b| b.set_control(*value))
                .map_err(buffer_err)?,
            Op::Mix { src, dst } => {
                let (src, dst) = self.arena.pair_mut(*src, *dst).map_err(buffer_err)?;
                dst.mix(src).map_err(buffer_err)?;
            }
            Op::Mul { buf, factor } => self
                .arena
                .get_mut(*buf)
                .and_then(|b| b.mul(*factor))
                .map_err(buffer_err)?,
            Op::Noise { buf } => {
                let samples = self
                    .arena
                    .get_mut(*buf)
                    .and_then(Buffer::audio_mut)
                    .map_err(buffer_err)?;
                if let OpState::Rng(seed) = state {
                    for s in samples {
                        *s = next_noise(seed);
                    }
                }
            }
            Op::Sine { buf, freq } => {
                let samples = self
                    .arena
                    .get_mut(*buf)
                    .and_then(Buffer::audio_mut)
                    .map_err(buffer_err)?;
                let increment = TAU * freq / self.block.sample_rate;
                if let OpState::Phase(phase) = state {
                    for s in samples {
                        *s = phase.sin();
                        *phase = (*phase + increment).rem_euclid(TAU);
                    }
                }
            }
            Op::OutputStereo { left, right } => {
                let (l, r) = self.arena.pair(*left, *right).map_err(buffer_err)?;
                let l = l.audio().map_err(buffer_err)?;
                let r = r.audio().map_err(buffer_err)?;
                if let Some(backend) = self.backend.as_deref_mut() {
                    backend
                        .output(ChannelLayout::Stereo, self.block.frames, &[l, r])
                        .map_err(|e| EngineError::backend(backend.name(), e))?;
                }
            }
            Op::ConnectPort { node, port, buf } => {
                let handle = self.nodes.get(*node).ok_or(EngineError::UnknownNode(*node))?;
                handle
                    .lock()
                    .connect_port(port, *buf)
                    .map_err(|source| EngineError::Node {
                        node: self.ids[*node].clone(),
                        source,
                    })?;
            }
            Op::Call { node } => {
                let handle = self.nodes.get(*node).ok_or(EngineError::UnknownNode(*node))?;
                let id = &self.ids[*node];
                let mut ctx = ProcessContext::new(self.block, self.arena, self.notifications, id);
                handle
                    .lock()
                    .run(&mut ctx)
                    .map_err(|source| EngineError::Node {
                        node: id.clone(),
                        source,
                    })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::result::Result;
    use std::sync::Arc;

    use cadenza_core::{
        BufferRef, BufferType, Node, NodeDescription, NodeError, ParamValue, SpecBuilder,
    };
    use parking_lot::Mutex;

    fn program(builder: &SpecBuilder) -> Program {
        Program::new(builder.build().unwrap(), Vec::new()).unwrap()
    }

    /// Emits two notifications per block.
    struct Beacon {
        runs: u32,
    }

    impl Node for Beacon {
        fn description(&self) -> NodeDescription {
            NodeDescription::new()
        }

        fn connect_port(&mut self, port: &str, _buffer: BufferRef) -> Result<(), NodeError> {
            Err(NodeError::UnknownPort(port.into()))
        }

        fn run(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
            self.runs += 1;
            let frames = ctx.frames() as f32;
            ctx.notify("runs", self.runs as f32);
            ctx.notify("frames", frames);
            Ok(())
        }
    }

    #[test]
    fn test_noise_range() {
        let mut state = NOISE_SEED;
        for _ in 0..10_000 {
            let v = next_noise(&mut state);
            assert!((-1.0..=1.0).contains(&v), "{v}");
        }
    }

    #[test]
    fn test_sine_is_phase_continuous() {
        let mut builder = SpecBuilder::new();
        builder
            .buffer("tone", BufferType::AudioBlock { frames: 8 })
            .op(Op::Sine {
                buf: "tone".into(),
                freq: 1000.0,
            });
        let mut vm = Vm::new(8000);
        vm.set_spec(Some(program(&builder)));

        let mut all = Vec::new();
        for n in 0..3u64 {
            let mut block = BlockContext::new(n * 8, 8, 8000.0);
            vm.run_block(&mut block).unwrap();
            all.extend_from_slice(vm.buffer("tone").unwrap().audio().unwrap());
        }
        for (i, s) in all.iter().enumerate() {
            let expected = (TAU * 1000.0 * i as f32 / 8000.0).sin();
            assert!((s - expected).abs() < 1e-4, "sample {i}: {s} vs {expected}");
        }
        match vm.op_state(0) {
            Some(OpState::Phase(p)) => assert!((0.0..TAU).contains(&p)),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_noise_and_mul() {
        let mut builder = SpecBuilder::new();
        builder
            .buffer("n", BufferType::AudioBlock { frames: 64 })
            .op(Op::Noise { buf: "n".into() })
            .op(Op::Mul {
                buf: "n".into(),
                factor: 0.5,
            });
        let mut vm = Vm::new(48000);
        vm.set_spec(Some(program(&builder)));
        let mut block = BlockContext::new(0, 64, 48000.0);
        vm.run_block(&mut block).unwrap();

        let samples = vm.buffer("n").unwrap().audio().unwrap();
        assert!(samples.iter().all(|s| s.abs() <= 0.5));
        assert!(samples.iter().any(|s| *s != 0.0));
        assert_eq!(block.perf.opcodes, 2);
    }

    #[test]
    fn test_run_without_program() {
        let mut vm = Vm::new(48000);
        let mut block = BlockContext::new(0, 4, 48000.0);
        assert!(matches!(
            vm.run_block(&mut block),
            Err(EngineError::NoProgram)
        ));
        vm.set_spec(Some(Program::new(Spec::default(), Vec::new()).unwrap()));
        assert!(!vm.has_program());
    }

    #[test]
    fn test_mix_control() {
        let mut builder = SpecBuilder::new();
        builder
            .buffer("a", BufferType::Control)
            .buffer("b", BufferType::Control)
            .op(Op::SetFloat {
                buf: "a".into(),
                value: 1.5,
            })
            .op(Op::SetFloat {
                buf: "b".into(),
                value: 2.0,
            })
            .op(Op::Mix {
                src: "a".into(),
                dst: "b".into(),
            });
        let mut vm = Vm::new(48000);
        vm.set_spec(Some(program(&builder)));
        vm.run_block(&mut BlockContext::new(0, 1, 48000.0)).unwrap();
        assert_eq!(vm.buffer("b").unwrap().control().unwrap(), 3.5);
        assert_eq!(vm.buffer("a").unwrap().control().unwrap(), 1.5);
    }

    #[test]
    fn test_undrained_notifications_keep_one_block() {
        let mut builder = SpecBuilder::new();
        builder.node("beacon").op(Op::Call {
            node: "beacon".into(),
        });
        let handle: NodeHandle = Arc::new(Mutex::new(Box::new(Beacon { runs: 0 })));
        let program = Program::new(builder.build().unwrap(), vec![handle]).unwrap();
        let mut vm = Vm::new(48000);
        vm.set_spec(Some(program));

        for n in 0..50u64 {
            vm.run_block(&mut BlockContext::new(n * 16, 16, 48000.0)).unwrap();
        }
        let mut notes = Vec::new();
        vm.drain_notifications(&mut notes);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].node.as_str(), "beacon");
        assert_eq!(notes[0].key, "runs");
        assert_eq!(notes[0].value, ParamValue::Float(50.0));

        vm.run_block(&mut BlockContext::new(800, 16, 48000.0)).unwrap();
        vm.set_spec(None);
        vm.drain_notifications(&mut notes);
        assert_eq!(notes.len(), 2, "a swap discards pending notifications");
    }
}
