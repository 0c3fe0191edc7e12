//! Cadenza Core - typed buffers, processing graph, and spec compiler
//!
//! This crate holds everything about a realtime audio program that does not
//! need a thread: the data it operates on, the graph it is described by, and
//! the compiler that flattens that graph into instructions.
//!
//! # Core Abstractions
//!
//! ## Buffers
//!
//! - [`BufferType`] - Control value, audio block, or event blob, with fixed size
//! - [`Buffer`] - Typed storage with per-type clear and mix rules
//! - [`AtomSequence`] - Time-ordered binary events inside an atom blob
//! - [`BufferArena`] - One buffer per declaration of an installed spec
//!
//! ## Nodes and Graphs
//!
//! - [`Node`] - Object-safe trait implemented by processing units
//! - [`Graph`] - Nodes plus typed port connections, kept acyclic
//! - [`NodeRegistry`] / [`SharedResources`] - Factories and the state they share
//!
//! ## Compilation
//!
//! - [`compile`] - Graph to [`Program`] (a [`Spec`] plus node handles)
//! - [`SpecBuilder`] - Hand-assembled specs through the same resolver
//! - [`Opcode`] - The closed instruction set executed by the engine
//!
//! # Logging
//!
//! With the `tracing` feature enabled, graph mutations and compiled specs are
//! logged at `debug` level.
//!
//! # Example
//!
//! ```rust,ignore
//! use cadenza_core::{Graph, compile};
//!
//! let mut graph = Graph::new(48000.0, 256);
//! graph.add_node("osc", registry.create("oscillator", &"osc".into(), &params)?)?;
//! graph.add_sink("out")?;
//! graph.connect("osc:out".parse()?, "out:in:left".parse()?)?;
//! graph.connect("osc:out".parse()?, "out:in:right".parse()?)?;
//!
//! let program = compile(&graph, 4096)?;
//! println!("{}", program.spec().dump());
//! ```

pub mod arena;
pub mod atom;
pub mod buffer;
pub mod compiler;
pub mod context;
pub mod graph;
pub mod node;
pub mod registry;

pub use arena::{BufferArena, BufferRef};
pub use atom::{ATOM_HEADER_LEN, ATOM_MAGIC, AtomEvent, AtomSequence};
pub use buffer::{Buffer, BufferError, BufferType};
pub use compiler::{
    AstNode, AstOp, BufferDecl, CompileError, Op, Opcode, Phase, Program, Spec, SpecBuilder,
    build_ast, build_spec, compile, compile_spec,
};
pub use context::{BlockContext, NodeNotification, PerfStats, ProcessContext};
pub use graph::{
    Connection, Graph, GraphError, GraphNode, NodeHandle, NodeKind, PortRef, SINK_LEFT,
    SINK_RIGHT,
};
pub use node::{
    Node, NodeDescription, NodeError, NodeId, NodeParams, ParamDescription, ParamValue,
    PortDescription, PortDirection, PortKind, SetupContext,
};
pub use registry::{NodeFactory, NodeKindDescriptor, NodeRegistry, SharedResources};
