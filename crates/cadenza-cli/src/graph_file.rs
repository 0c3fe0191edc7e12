//! Graph files to compiled programs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use cadenza_config::{EngineSettings, GraphDescription, find_graph};
use cadenza_core::{
    Graph, NodeRegistry, PortRef, Program, SINK_LEFT, SINK_RIGHT, compile,
};

/// Resolve a graph argument: an existing path, or a name in the user graphs
/// directory.
pub fn resolve(arg: &Path) -> anyhow::Result<PathBuf> {
    if arg.exists() {
        return Ok(arg.to_path_buf());
    }
    arg.to_str()
        .and_then(find_graph)
        .ok_or_else(|| anyhow::anyhow!("graph not found: {}", arg.display()))
}

/// Instantiate every node of `desc` and wire it up.
pub fn build(
    desc: &GraphDescription,
    registry: &NodeRegistry,
    settings: &EngineSettings,
) -> anyhow::Result<Graph> {
    let mut graph = Graph::new(settings.sample_rate as f32, settings.block_size);

    for node in &desc.nodes {
        let instance = registry
            .create(&node.kind, &node.id, &node.params)
            .with_context(|| format!("creating node '{}' ({})", node.id, node.kind))?;
        graph.add_node(node.id.clone(), instance)?;
    }

    for conn in &desc.connections {
        graph
            .connect(conn.from.clone(), conn.to.clone())
            .with_context(|| format!("connecting {} -> {}", conn.from, conn.to))?;
    }

    if let Some(sink) = &desc.sink {
        graph.add_sink(sink.id.clone())?;
        for (from, port) in [(&sink.left, SINK_LEFT), (&sink.right, SINK_RIGHT)] {
            if let Some(from) = from {
                graph.connect(from.clone(), PortRef::new(sink.id.clone(), port))?;
            }
        }
    }

    graph.validate()?;
    Ok(graph)
}

/// Load, build, and compile the graph at `path`.
pub fn load_program(
    path: &Path,
    registry: &NodeRegistry,
    settings: &EngineSettings,
) -> anyhow::Result<Program> {
    let path = resolve(path)?;
    let desc = GraphDescription::load(&path)?;
    let graph = build(&desc, registry, settings)
        .with_context(|| format!("building graph {}", path.display()))?;
    tracing::debug!(?graph, "graph built");
    let program = compile(&graph, settings.atom_capacity)?;
    tracing::info!(
        path = %path.display(),
        nodes = program.nodes().len(),
        opcodes = program.spec().opcodes().len(),
        "graph compiled"
    );
    Ok(program)
}
