//! Per-block execution state and the view nodes get of it.

use std::time::Duration;

use crate::arena::{BufferArena, BufferRef};
use crate::atom::AtomSequence;
use crate::node::{NodeError, NodeId, ParamValue};

/// Timing for one executed block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerfStats {
    /// Absolute position of the block's first sample.
    pub sample_pos: u64,
    /// Frames in the block.
    pub frames: usize,
    /// Opcodes executed.
    pub opcodes: usize,
    /// Wall-clock time spent executing opcodes.
    pub elapsed: Duration,
    /// Real time the block represents.
    pub budget: Duration,
}

impl PerfStats {
    /// Fraction of the real-time budget used (1.0 = exactly real time).
    pub fn load(&self) -> f32 {
        if self.budget.is_zero() {
            0.0
        } else {
            self.elapsed.as_secs_f32() / self.budget.as_secs_f32()
        }
    }
}

/// State shared by every opcode of one block.
///
/// Created fresh by the engine for each block; only [`perf`](Self::perf)
/// outlives it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockContext {
    /// Absolute position of the block's first sample.
    pub sample_pos: u64,
    /// Frames in the block.
    pub frames: usize,
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Timing accumulator.
    pub perf: PerfStats,
}

impl BlockContext {
    /// Creates the context for a block starting at `sample_pos`.
    pub fn new(sample_pos: u64, frames: usize, sample_rate: f32) -> Self {
        let budget = if sample_rate > 0.0 {
            Duration::from_secs_f64(frames as f64 / f64::from(sample_rate))
        } else {
            Duration::ZERO
        };
        Self {
            sample_pos,
            frames,
            sample_rate,
            perf: PerfStats {
                sample_pos,
                frames,
                budget,
                ..PerfStats::default()
            },
        }
    }

    /// Block length as wall-clock duration.
    #[inline]
    pub fn duration(&self) -> Duration {
        self.perf.budget
    }
}

/// A message a node emits from [`run`](crate::Node::run) for the embedding
/// application.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeNotification {
    /// Emitting node.
    pub node: NodeId,
    /// Application-defined key.
    pub key: &'static str,
    /// Payload.
    pub value: ParamValue,
}

/// What a node sees while running: the block state and checked, typed access
/// to the buffers its ports are bound to.
pub struct ProcessContext<'a> {
    block: &'a BlockContext,
    arena: &'a mut BufferArena,
    notifications: &'a mut Vec<NodeNotification>,
    node: &'a NodeId,
}

impl<'a> ProcessContext<'a> {
    /// Creates a context for running `node`.
    pub fn new(
        block: &'a BlockContext,
        arena: &'a mut BufferArena,
        notifications: &'a mut Vec<NodeNotification>,
        node: &'a NodeId,
    ) -> Self {
        Self {
            block,
            arena,
            notifications,
            node,
        }
    }

    /// The current block.
    #[inline]
    pub fn block(&self) -> &BlockContext {
        self.block
    }

    /// Frames in the current block.
    #[inline]
    pub fn frames(&self) -> usize {
        self.block.frames
    }

    /// Sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.block.sample_rate
    }

    /// Reads an audio block.
    pub fn audio(&self, buf: BufferRef) -> Result<&[f32], NodeError> {
        Ok(self.arena.get(buf)?.audio()?)
    }

    /// Writes an audio block.
    pub fn audio_mut(&mut self, buf: BufferRef) -> Result<&mut [f32], NodeError> {
        Ok(self.arena.get_mut(buf)?.audio_mut()?)
    }

    /// Reads one audio block while writing another.
    pub fn audio_io(
        &mut self,
        input: BufferRef,
        output: BufferRef,
    ) -> Result<(&[f32], &mut [f32]), NodeError> {
        let (src, dst) = self.arena.pair_mut(input, output)?;
        Ok((src.audio()?, dst.audio_mut()?))
    }

    /// Reads a control value.
    pub fn control(&self, buf: BufferRef) -> Result<f32, NodeError> {
        Ok(self.arena.get(buf)?.control()?)
    }

    /// Writes a control value.
    pub fn set_control(&mut self, buf: BufferRef, value: f32) -> Result<(), NodeError> {
        Ok(self.arena.get_mut(buf)?.set_control(value)?)
    }

    /// Reads an event sequence.
    pub fn events(&self, buf: BufferRef) -> Result<&AtomSequence, NodeError> {
        Ok(self.arena.get(buf)?.atoms()?)
    }

    /// Writes an event sequence.
    pub fn events_mut(&mut self, buf: BufferRef) -> Result<&mut AtomSequence, NodeError> {
        Ok(self.arena.get_mut(buf)?.atoms_mut()?)
    }

    /// Queues a notification for delivery after the block.
    ///
    /// Does not allocate while the queue has spare capacity and `value` is a
    /// float.
    pub fn notify(&mut self, key: &'static str, value: impl Into<ParamValue>) {
        self.notifications.push(NodeNotification {
            node: self.node.clone(),
            key,
            value: value.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferType;

    #[test]
    fn test_block_budget() {
        let block = BlockContext::new(0, 480, 48000.0);
        assert_eq!(block.duration(), Duration::from_millis(10));
        assert_eq!(block.perf.frames, 480);
    }

    #[test]
    fn test_perf_load() {
        let perf = PerfStats {
            elapsed: Duration::from_millis(5),
            budget: Duration::from_millis(10),
            ..PerfStats::default()
        };
        assert!((perf.load() - 0.5).abs() < 1e-6);
        assert_eq!(PerfStats::default().load(), 0.0);
    }

    #[test]
    fn test_typed_access() {
        let mut arena = BufferArena::from_types([
            BufferType::AudioBlock { frames: 2 },
            BufferType::AudioBlock { frames: 2 },
            BufferType::Control,
        ]);
        let input = arena.buffer_ref(0).unwrap();
        let output = arena.buffer_ref(1).unwrap();
        let gain = arena.buffer_ref(2).unwrap();
        arena.get_mut(input).unwrap().audio_mut().unwrap()[0] = 0.5;

        let block = BlockContext::new(0, 2, 48000.0);
        let mut notes = Vec::new();
        let id = NodeId::from("amp");
        let mut ctx = ProcessContext::new(&block, &mut arena, &mut notes, &id);

        ctx.set_control(gain, 2.0).unwrap();
        let g = ctx.control(gain).unwrap();
        let (src, dst) = ctx.audio_io(input, output).unwrap();
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s * g;
        }
        assert!(matches!(ctx.control(input), Err(NodeError::Buffer(_))));
        ctx.notify("peak", 1.0);

        assert_eq!(arena.get(output).unwrap().audio().unwrap(), &[1.0, 0.0]);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].node.as_str(), "amp");
        assert_eq!(notes[0].key, "peak");
        // The tag shares the id's storage.
        assert!(std::ptr::eq(notes[0].node.as_str(), id.as_str()));
    }
}
