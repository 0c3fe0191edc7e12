//! The node contract.
//!
//! A [`Node`] is a unit of signal processing supplied by the embedding
//! application. It declares typed ports and parameters through
//! [`NodeDescription`], is bound to arena buffers once per installed spec via
//! [`connect_port`](Node::connect_port), and is driven once per block via
//! [`run`](Node::run).

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::arena::BufferRef;
use crate::buffer::{BufferError, BufferType};
use crate::context::ProcessContext;

/// Stable, application-chosen node identifier.
///
/// Identifiers must be non-empty and must not contain `:`, which separates
/// node and port in a [`PortRef`](crate::graph::PortRef). Clones share one
/// allocation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Arc<str>);

impl NodeId {
    /// Creates an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    /// Returns the identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier can be used in a graph.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.contains(':')
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of data a port carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    /// One block of audio samples.
    Audio,
    /// A single control value.
    Control,
    /// A time-ordered event sequence.
    Events,
}

impl PortKind {
    /// Buffer type backing a port of this kind.
    pub fn buffer_type(self, block_size: usize, atom_capacity: usize) -> BufferType {
        match self {
            Self::Audio => BufferType::AudioBlock { frames: block_size },
            Self::Control => BufferType::Control,
            Self::Events => BufferType::AtomBlob {
                capacity: atom_capacity,
            },
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Audio => "audio",
            Self::Control => "control",
            Self::Events => "events",
        })
    }
}

/// Direction of a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    /// Consumes data produced upstream.
    Input,
    /// Produces data for downstream nodes.
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// One named port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescription {
    /// Port name, unique per node.
    pub name: String,
    /// Input or output.
    pub direction: PortDirection,
    /// Data kind.
    pub kind: PortKind,
}

impl PortDescription {
    /// Describes an input port.
    pub fn input(name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            kind,
        }
    }

    /// Describes an output port.
    pub fn output(name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
            kind,
        }
    }
}

/// A parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Numeric parameter.
    Float(f32),
    /// String parameter.
    Text(String),
}

impl ParamValue {
    /// Returns the numeric value, if any.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Returns the string value, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Float(_) => None,
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// Named parameter values handed to node factories.
pub type NodeParams = BTreeMap<String, ParamValue>;

/// One named parameter and its default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamDescription {
    /// Parameter name.
    pub name: String,
    /// Value used when none is given.
    pub default: ParamValue,
}

impl ParamDescription {
    /// Describes a parameter.
    pub fn new(name: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
        }
    }
}

/// Static shape of a node: its ports and parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    /// Ports in declaration order.
    pub ports: Vec<PortDescription>,
    /// Parameters in declaration order.
    pub parameters: Vec<ParamDescription>,
}

impl NodeDescription {
    /// Creates an empty description.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input port.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, kind: PortKind) -> Self {
        self.ports.push(PortDescription::input(name, kind));
        self
    }

    /// Adds an output port.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, kind: PortKind) -> Self {
        self.ports.push(PortDescription::output(name, kind));
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        default: impl Into<ParamValue>,
    ) -> Self {
        self.parameters.push(ParamDescription::new(name, default));
        self
    }

    /// Looks up a port by name.
    pub fn port(&self, name: &str) -> Option<&PortDescription> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Looks up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&ParamDescription> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Iterates input ports.
    pub fn inputs(&self) -> impl Iterator<Item = &PortDescription> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Input)
    }

    /// Iterates output ports.
    pub fn outputs(&self) -> impl Iterator<Item = &PortDescription> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Output)
    }
}

/// Engine configuration handed to [`Node::setup`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SetupContext {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Frames per block.
    pub block_size: usize,
}

/// Errors raised by node implementations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeError {
    /// `setup` failed.
    #[error("setup failed: {0}")]
    Setup(String),

    /// The node has no port with this name.
    #[error("unknown port '{0}'")]
    UnknownPort(String),

    /// A port was used before being connected.
    #[error("port '{0}' is not connected")]
    PortNotConnected(String),

    /// The node has no parameter with this name.
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// A parameter value was rejected.
    #[error("invalid value for parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No factory is registered for this kind.
    #[error("unknown node kind '{0}'")]
    UnknownKind(String),

    /// A buffer access inside `run` failed.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// `run` failed.
    #[error("{0}")]
    Run(String),
}

/// A unit of signal processing.
///
/// Lifecycle: [`setup`](Self::setup) once when added to a graph, then for each
/// installed spec one [`connect_port`](Self::connect_port) per port followed by
/// [`run`](Self::run) once per block, and finally [`cleanup`](Self::cleanup)
/// when removed.
///
/// `run` executes on the realtime thread and must not block or allocate.
pub trait Node: Send {
    /// Returns the node's ports and parameters.
    ///
    /// Must be stable for the lifetime of the node.
    fn description(&self) -> NodeDescription;

    /// Prepares the node for the given engine configuration.
    fn setup(&mut self, _ctx: &SetupContext) -> Result<(), NodeError> {
        Ok(())
    }

    /// Releases resources acquired in [`setup`](Self::setup).
    fn cleanup(&mut self) {}

    /// Binds a named port to an arena buffer.
    fn connect_port(&mut self, port: &str, buffer: BufferRef) -> Result<(), NodeError>;

    /// Processes one block.
    fn run(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), NodeError>;

    /// Updates a parameter.
    fn set_parameter(&mut self, name: &str, _value: ParamValue) -> Result<(), NodeError> {
        Err(NodeError::UnknownParameter(name.to_owned()))
    }

    /// Current value of a parameter.
    fn parameter(&self, _name: &str) -> Option<ParamValue> {
        None
    }
}
