//! Built-in demo node kinds: oscillator, gain, noise, mixer.
//!
//! Each kind exposes its tunables both as parameters and as control inputs
//! of the same name, so a graph file can set a fixed value or patch another
//! node into it.

use std::f32::consts::TAU;
use std::sync::Arc;

use cadenza_core::{
    BufferRef, Node, NodeDescription, NodeError, NodeId, NodeKindDescriptor, NodeParams,
    NodeRegistry, ParamValue, PortKind, ProcessContext, SharedResources,
};

/// Shared-resource key of the oscillator sine table.
pub const SINE_TABLE_KEY: &str = "oscillator.sine_table";

const SINE_TABLE_SIZE: usize = 2048;

/// Registry with every demo kind.
pub fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(
        NodeKindDescriptor {
            kind: "oscillator",
            description: "Sine, saw, or square oscillator",
        },
        oscillator_factory,
    );
    registry.register(
        NodeKindDescriptor {
            kind: "gain",
            description: "Scales its input by a control value",
        },
        gain_factory,
    );
    registry.register(
        NodeKindDescriptor {
            kind: "noise",
            description: "Uniform white noise",
        },
        noise_factory,
    );
    registry.register(
        NodeKindDescriptor {
            kind: "mixer",
            description: "Sums two inputs and applies a level",
        },
        mixer_factory,
    );
    registry
}

// --- Parameter helpers ---

fn float_param(params: &NodeParams, name: &str, default: f32) -> Result<f32, NodeError> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v.as_float().ok_or_else(|| NodeError::InvalidParameter {
            name: name.into(),
            reason: "expected a number".into(),
        }),
    }
}

fn expect_float(name: &str, value: &ParamValue) -> Result<f32, NodeError> {
    value.as_float().ok_or_else(|| NodeError::InvalidParameter {
        name: name.into(),
        reason: "expected a number".into(),
    })
}

fn port(slot: Option<BufferRef>, name: &str) -> Result<BufferRef, NodeError> {
    slot.ok_or_else(|| NodeError::PortNotConnected(name.into()))
}

// --- Oscillator ---

/// One cycle of a sine, shared by every oscillator instance.
#[derive(Debug)]
pub struct SineTable {
    samples: Vec<f32>,
}

impl SineTable {
    fn new(size: usize) -> Self {
        let samples = (0..size)
            .map(|i| (TAU * i as f32 / size as f32).sin())
            .collect();
        Self { samples }
    }

    /// Linearly interpolated lookup; `phase` is in cycles, `[0, 1)`.
    fn lookup(&self, phase: f32) -> f32 {
        let len = self.samples.len();
        let pos = phase * len as f32;
        let i = pos as usize % len;
        let frac = pos - pos.floor();
        let a = self.samples[i];
        let b = self.samples[(i + 1) % len];
        a + (b - a) * frac
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waveform {
    Sine,
    Saw,
    Square,
}

impl Waveform {
    fn parse(value: &ParamValue) -> Result<Self, NodeError> {
        match value.as_text() {
            Some("sine") => Ok(Waveform::Sine),
            Some("saw") => Ok(Waveform::Saw),
            Some("square") => Ok(Waveform::Square),
            _ => Err(NodeError::InvalidParameter {
                name: "waveform".into(),
                reason: format!("expected sine, saw or square, found {value}"),
            }),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Saw => "saw",
            Waveform::Square => "square",
        }
    }
}

struct Oscillator {
    table: Arc<SineTable>,
    waveform: Waveform,
    frequency: f32,
    amplitude: f32,
    phase: f32,
    frequency_in: Option<BufferRef>,
    amplitude_in: Option<BufferRef>,
    out: Option<BufferRef>,
}

fn oscillator_factory(
    _id: &NodeId,
    params: &NodeParams,
    shared: &SharedResources,
) -> Result<Box<dyn Node>, NodeError> {
    let waveform = match params.get("waveform") {
        Some(v) => Waveform::parse(v)?,
        None => Waveform::Sine,
    };
    let table = shared.get_or_insert_with(SINE_TABLE_KEY, || SineTable::new(SINE_TABLE_SIZE))?;
    Ok(Box::new(Oscillator {
        table,
        waveform,
        frequency: float_param(params, "frequency", 440.0)?,
        amplitude: float_param(params, "amplitude", 0.5)?,
        phase: 0.0,
        frequency_in: None,
        amplitude_in: None,
        out: None,
    }))
}

impl Node for Oscillator {
    fn description(&self) -> NodeDescription {
        NodeDescription::new()
            .with_input("frequency", PortKind::Control)
            .with_input("amplitude", PortKind::Control)
            .with_output("out", PortKind::Audio)
            .with_parameter("frequency", 440.0)
            .with_parameter("amplitude", 0.5)
            .with_parameter("waveform", "sine")
    }

    fn connect_port(&mut self, port: &str, buffer: BufferRef) -> Result<(), NodeError> {
        match port {
            "frequency" => self.frequency_in = Some(buffer),
            "amplitude" => self.amplitude_in = Some(buffer),
            "out" => self.out = Some(buffer),
            other => return Err(NodeError::UnknownPort(other.into())),
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        let frequency = ctx.control(port(self.frequency_in, "frequency")?)?;
        let amplitude = ctx.control(port(self.amplitude_in, "amplitude")?)?;
        let increment = frequency / ctx.sample_rate();
        let out = ctx.audio_mut(port(self.out, "out")?)?;

        for s in out.iter_mut() {
            let shape = match self.waveform {
                Waveform::Sine => self.table.lookup(self.phase),
                Waveform::Saw => 2.0 * self.phase - 1.0,
                Waveform::Square => {
                    if self.phase < 0.5 {
                        1.0
                    } else {
                        -1.0
                    }
                }
            };
            *s = shape * amplitude;
            self.phase += increment;
            self.phase -= self.phase.floor();
        }
        Ok(())
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), NodeError> {
        match name {
            "frequency" => self.frequency = expect_float(name, &value)?,
            "amplitude" => self.amplitude = expect_float(name, &value)?,
            "waveform" => self.waveform = Waveform::parse(&value)?,
            _ => return Err(NodeError::UnknownParameter(name.into())),
        }
        Ok(())
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        match name {
            "frequency" => Some(self.frequency.into()),
            "amplitude" => Some(self.amplitude.into()),
            "waveform" => Some(self.waveform.as_str().into()),
            _ => None,
        }
    }
}

// --- Gain ---

struct Gain {
    gain: f32,
    input: Option<BufferRef>,
    gain_in: Option<BufferRef>,
    out: Option<BufferRef>,
}

fn gain_factory(
    _id: &NodeId,
    params: &NodeParams,
    _shared: &SharedResources,
) -> Result<Box<dyn Node>, NodeError> {
    Ok(Box::new(Gain {
        gain: float_param(params, "gain", 1.0)?,
        input: None,
        gain_in: None,
        out: None,
    }))
}

impl Node for Gain {
    fn description(&self) -> NodeDescription {
        NodeDescription::new()
            .with_input("in", PortKind::Audio)
            .with_input("gain", PortKind::Control)
            .with_output("out", PortKind::Audio)
            .with_parameter("gain", 1.0)
    }

    fn connect_port(&mut self, port: &str, buffer: BufferRef) -> Result<(), NodeError> {
        match port {
            "in" => self.input = Some(buffer),
            "gain" => self.gain_in = Some(buffer),
            "out" => self.out = Some(buffer),
            other => return Err(NodeError::UnknownPort(other.into())),
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        let gain = ctx.control(port(self.gain_in, "gain")?)?;
        let (src, dst) = ctx.audio_io(port(self.input, "in")?, port(self.out, "out")?)?;
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s * gain;
        }
        Ok(())
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), NodeError> {
        match name {
            "gain" => self.gain = expect_float(name, &value)?,
            _ => return Err(NodeError::UnknownParameter(name.into())),
        }
        Ok(())
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        (name == "gain").then_some(ParamValue::Float(self.gain))
    }
}

// --- Noise ---

struct Noise {
    amplitude: f32,
    state: u32,
    amplitude_in: Option<BufferRef>,
    out: Option<BufferRef>,
}

fn noise_factory(
    _id: &NodeId,
    params: &NodeParams,
    _shared: &SharedResources,
) -> Result<Box<dyn Node>, NodeError> {
    Ok(Box::new(Noise {
        amplitude: float_param(params, "amplitude", 0.1)?,
        state: float_param(params, "seed", 12345.0)? as u32,
        amplitude_in: None,
        out: None,
    }))
}

impl Noise {
    #[inline]
    fn next(&mut self) -> f32 {
        self.state = self
            .state
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        f32::from((self.state >> 16) as u16) / 32_767.5 - 1.0
    }
}

impl Node for Noise {
    fn description(&self) -> NodeDescription {
        NodeDescription::new()
            .with_input("amplitude", PortKind::Control)
            .with_output("out", PortKind::Audio)
            .with_parameter("amplitude", 0.1)
    }

    fn connect_port(&mut self, port: &str, buffer: BufferRef) -> Result<(), NodeError> {
        match port {
            "amplitude" => self.amplitude_in = Some(buffer),
            "out" => self.out = Some(buffer),
            other => return Err(NodeError::UnknownPort(other.into())),
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        let amplitude = ctx.control(port(self.amplitude_in, "amplitude")?)?;
        let out = ctx.audio_mut(port(self.out, "out")?)?;
        for s in out.iter_mut() {
            *s = self.next() * amplitude;
        }
        Ok(())
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), NodeError> {
        match name {
            "amplitude" => self.amplitude = expect_float(name, &value)?,
            _ => return Err(NodeError::UnknownParameter(name.into())),
        }
        Ok(())
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        (name == "amplitude").then_some(ParamValue::Float(self.amplitude))
    }
}

// --- Mixer ---

struct Mixer {
    level: f32,
    a: Option<BufferRef>,
    b: Option<BufferRef>,
    level_in: Option<BufferRef>,
    out: Option<BufferRef>,
}

fn mixer_factory(
    _id: &NodeId,
    params: &NodeParams,
    _shared: &SharedResources,
) -> Result<Box<dyn Node>, NodeError> {
    Ok(Box::new(Mixer {
        level: float_param(params, "level", 1.0)?,
        a: None,
        b: None,
        level_in: None,
        out: None,
    }))
}

impl Node for Mixer {
    fn description(&self) -> NodeDescription {
        NodeDescription::new()
            .with_input("a", PortKind::Audio)
            .with_input("b", PortKind::Audio)
            .with_input("level", PortKind::Control)
            .with_output("out", PortKind::Audio)
            .with_parameter("level", 1.0)
    }

    fn connect_port(&mut self, port: &str, buffer: BufferRef) -> Result<(), NodeError> {
        match port {
            "a" => self.a = Some(buffer),
            "b" => self.b = Some(buffer),
            "level" => self.level_in = Some(buffer),
            "out" => self.out = Some(buffer),
            other => return Err(NodeError::UnknownPort(other.into())),
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        let level = ctx.control(port(self.level_in, "level")?)?;
        let out = port(self.out, "out")?;

        let (a, dst) = ctx.audio_io(port(self.a, "a")?, out)?;
        for (d, s) in dst.iter_mut().zip(a) {
            *d = s * level;
        }
        let (b, dst) = ctx.audio_io(port(self.b, "b")?, out)?;
        for (d, s) in dst.iter_mut().zip(b) {
            *d += s * level;
        }
        Ok(())
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), NodeError> {
        match name {
            "level" => self.level = expect_float(name, &value)?,
            _ => return Err(NodeError::UnknownParameter(name.into())),
        }
        Ok(())
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        (name == "level").then_some(ParamValue::Float(self.level))
    }
}
