//! Integration tests for cadenza-core: registry to graph to spec.

use cadenza_core::{
    BufferRef, BufferType, CompileError, Graph, GraphError, Node, NodeDescription, NodeError,
    NodeId, NodeKindDescriptor, NodeParams, NodeRegistry, Op, ParamValue, Phase, PortKind,
    PortRef, ProcessContext, SharedResources, Spec, SpecBuilder, compile, compile_spec,
};

/// Audio source with an event output.
struct Source;

impl Node for Source {
    fn description(&self) -> NodeDescription {
        NodeDescription::new()
            .with_output("out", PortKind::Audio)
            .with_output("midi", PortKind::Events)
    }

    fn connect_port(&mut self, _port: &str, _buffer: BufferRef) -> Result<(), NodeError> {
        Ok(())
    }

    fn run(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Gain with a control input that defaults to its `level` parameter.
struct Level {
    level: f32,
}

impl Node for Level {
    fn description(&self) -> NodeDescription {
        NodeDescription::new()
            .with_input("in", PortKind::Audio)
            .with_input("midi", PortKind::Events)
            .with_input("level", PortKind::Control)
            .with_output("out", PortKind::Audio)
            .with_parameter("level", 1.0)
    }

    fn connect_port(&mut self, _port: &str, _buffer: BufferRef) -> Result<(), NodeError> {
        Ok(())
    }

    fn run(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        (name == "level").then_some(ParamValue::Float(self.level))
    }
}

fn source_factory(
    _id: &NodeId,
    _params: &NodeParams,
    _shared: &SharedResources,
) -> Result<Box<dyn Node>, NodeError> {
    Ok(Box::new(Source))
}

fn level_factory(
    _id: &NodeId,
    params: &NodeParams,
    _shared: &SharedResources,
) -> Result<Box<dyn Node>, NodeError> {
    let level = match params.get("level") {
        None => 1.0,
        Some(v) => v.as_float().ok_or_else(|| NodeError::InvalidParameter {
            name: "level".into(),
            reason: "expected a number".into(),
        })?,
    };
    Ok(Box::new(Level { level }))
}

fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(
        NodeKindDescriptor {
            kind: "source",
            description: "Test source",
        },
        source_factory,
    );
    registry.register(
        NodeKindDescriptor {
            kind: "level",
            description: "Test gain",
        },
        level_factory,
    );
    registry
}

fn p(s: &str) -> PortRef {
    s.parse().unwrap()
}

fn graph(registry: &NodeRegistry) -> Graph {
    let mut graph = Graph::new(44100.0, 32);
    let mut params = NodeParams::new();
    params.insert("level".into(), ParamValue::Float(0.8));

    for (id, kind, params) in [
        ("src", "source", NodeParams::new()),
        ("lvl", "level", params),
    ] {
        let id = NodeId::from(id);
        let node = registry.create(kind, &id, &params).unwrap();
        graph.add_node(id, node).unwrap();
    }
    graph.add_sink("master").unwrap();
    graph.connect(p("src:out"), p("lvl:in")).unwrap();
    graph.connect(p("src:midi"), p("lvl:midi")).unwrap();
    graph.connect(p("lvl:out"), p("master:in:left")).unwrap();
    graph.connect(p("src:out"), p("master:in:right")).unwrap();
    graph
}

#[test]
fn test_registry_graph_compiles() {
    let registry = registry();
    let graph = graph(&registry);
    let program = compile(&graph, 1024).unwrap();
    let spec = program.spec();

    assert_eq!(program.nodes().len(), 2);
    assert_eq!(
        spec.buffer("src:midi").unwrap().ty,
        BufferType::AtomBlob { capacity: 1024 }
    );
    assert_eq!(
        spec.buffer("lvl:in").unwrap().ty,
        BufferType::AudioBlock { frames: 32 }
    );

    let listing = spec.dump();
    assert!(listing.contains("SET_FLOAT(lvl:level, 0.8)"), "{listing}");
    assert!(listing.contains("COPY_BUFFER(src:midi -> lvl:midi)"), "{listing}");
    assert!(listing.contains("CALL(node[src])"), "{listing}");
}

#[test]
fn test_init_ops_bind_every_processor_port() {
    let registry = registry();
    let spec = compile_spec(&graph(&registry), 1024).unwrap();
    let bound: Vec<(usize, &str)> = spec
        .phase_ops(Phase::Init)
        .map(|op| match op {
            Op::ConnectPort { node, port, .. } => (*node, port.as_str()),
            other => panic!("unexpected init op {other:?}"),
        })
        .collect();
    assert_eq!(
        bound,
        vec![
            (0, "out"),
            (0, "midi"),
            (1, "in"),
            (1, "midi"),
            (1, "level"),
            (1, "out"),
        ]
    );
}

#[test]
fn test_spec_serde_roundtrip() {
    let registry = registry();
    let spec = compile_spec(&graph(&registry), 1024).unwrap();
    let json = serde_json::to_string(&spec).unwrap();
    let back: Spec = serde_json::from_str(&json).unwrap();
    assert_eq!(back, spec);
}

#[test]
fn test_removing_node_changes_spec() {
    let registry = registry();
    let mut graph = graph(&registry);
    let before = compile_spec(&graph, 1024).unwrap();
    graph.remove_node(&"lvl".into()).unwrap();
    let after = compile_spec(&graph, 1024).unwrap();
    assert_ne!(before, after);
    assert!(after.buffer("lvl:in").is_none());
    // The sink's left input is now unconnected and cleared every block.
    assert!(after.dump().contains("CLEAR_BUFFER(master:in:left)"));
}

#[test]
fn test_unknown_kind_and_bad_param() {
    let registry = registry();
    assert!(matches!(
        registry.create("reverb", &"r".into(), &NodeParams::new()),
        Err(NodeError::UnknownKind(_))
    ));
    let mut params = NodeParams::new();
    params.insert("level".into(), ParamValue::Text("loud".into()));
    assert!(matches!(
        registry.create("level", &"l".into(), &params),
        Err(NodeError::InvalidParameter { .. })
    ));
}

#[test]
fn test_mismatched_ports_rejected_before_compile() {
    let registry = registry();
    let mut graph = graph(&registry);
    let err = graph.connect(p("src:midi"), p("lvl:level")).unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
    assert!(compile(&graph, 1024).is_ok());
}

#[test]
fn test_builder_matches_compiled_shape() {
    let spec = SpecBuilder::new()
        .buffer("buf1", BufferType::Control)
        .buffer("buf2", BufferType::AudioBlock { frames: 4 })
        .buffer("buf3", BufferType::AudioBlock { frames: 4 })
        .op(Op::SetFloat {
            buf: "buf1".into(),
            value: 12.0,
        })
        .op(Op::CopyBuffer {
            src: "buf2".into(),
            dst: "buf3".into(),
        })
        .op(Op::ClearBuffer { buf: "buf2".into() })
        .build()
        .unwrap();
    assert_eq!(spec.byte_len(), 4 + 16 + 16);
    assert_eq!(spec.phase_ops(Phase::Performance).count(), 3);

    let err = SpecBuilder::new()
        .buffer("x", BufferType::Control)
        .op(Op::Call { node: "nope".into() })
        .build()
        .unwrap_err();
    assert!(matches!(err, CompileError::UnknownNode(_)));
}
