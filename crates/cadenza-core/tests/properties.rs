//! Property-based tests for cadenza-core.
//!
//! Covers dependency ordering, cycle rejection, buffer mix laws, event
//! sequence merging, raw byte round-trips, and compile determinism.

use proptest::prelude::*;
use cadenza_core::{
    AtomSequence, Buffer, BufferArena, BufferRef, BufferType, Graph, GraphError, Node,
    NodeDescription, NodeError, PortKind, PortRef, ProcessContext, compile_spec,
};

const MAX_NODES: usize = 12;

/// Node with one audio output and one audio input per possible upstream.
struct Fan;

impl Node for Fan {
    fn description(&self) -> NodeDescription {
        let mut desc = NodeDescription::new().with_output("out", PortKind::Audio);
        for i in 0..MAX_NODES {
            desc = desc.with_input(format!("in{i}"), PortKind::Audio);
        }
        desc
    }

    fn connect_port(&mut self, _port: &str, _buffer: BufferRef) -> Result<(), NodeError> {
        Ok(())
    }

    fn run(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }
}

fn name(i: usize) -> String {
    format!("n{i}")
}

/// Random DAG: edges only run from lower to higher logical index, nodes are
/// inserted in a shuffled order.
fn dag() -> impl Strategy<Value = (usize, Vec<usize>, Vec<(usize, usize)>)> {
    (2usize..MAX_NODES).prop_flat_map(|n| {
        let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
        let edges = prop::collection::vec((0..n, 0..n), 0..n * 2).prop_map(|pairs| {
            let mut edges: Vec<(usize, usize)> = pairs
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.min(b), a.max(b)))
                .collect();
            edges.sort_unstable();
            edges.dedup();
            edges
        });
        (Just(n), order, edges)
    })
}

fn build(order: &[usize], edges: &[(usize, usize)]) -> Graph {
    let mut graph = Graph::new(48000.0, 16);
    for &i in order {
        graph.add_node(name(i), Box::new(Fan)).unwrap();
    }
    for &(from, to) in edges {
        graph
            .connect(
                PortRef::new(name(from), "out"),
                PortRef::new(name(to), format!("in{from}")),
            )
            .unwrap();
    }
    graph
}

fn audio(samples: &[f32]) -> Buffer {
    let mut buf = Buffer::new(BufferType::AudioBlock {
        frames: samples.len(),
    });
    buf.audio_mut().unwrap().copy_from_slice(samples);
    buf
}

fn events(offsets: &[u32], tag: u8) -> AtomSequence {
    let mut sorted = offsets.to_vec();
    sorted.sort_unstable();
    let mut seq = AtomSequence::new(4096);
    for (i, &off) in sorted.iter().enumerate() {
        seq.push(off, &[tag, i as u8]).unwrap();
    }
    seq
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every node appears after all nodes that feed it.
    #[test]
    fn sorted_nodes_respect_dependencies((_n, order, edges) in dag()) {
        let graph = build(&order, &edges);
        let sorted: Vec<String> = graph
            .sorted_nodes()
            .unwrap()
            .iter()
            .map(|node| node.id().to_string())
            .collect();
        prop_assert_eq!(sorted.len(), order.len());
        for &(from, to) in &edges {
            let a = sorted.iter().position(|s| *s == name(from)).unwrap();
            let b = sorted.iter().position(|s| *s == name(to)).unwrap();
            prop_assert!(a < b, "{} must precede {}", name(from), name(to));
        }
    }

    /// Closing any path into a loop is rejected and leaves the graph as it was.
    #[test]
    fn back_edges_are_rejected((_n, order, edges) in dag(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!edges.is_empty());
        let mut graph = build(&order, &edges);
        let (from, to) = edges[pick.index(edges.len())];
        let before = graph.connections().len();
        let err = graph
            .connect(
                PortRef::new(name(to), "out"),
                PortRef::new(name(from), format!("in{to}")),
            )
            .unwrap_err();
        let is_cycle = matches!(err, GraphError::CycleDetected { .. });
        prop_assert!(is_cycle);
        prop_assert_eq!(graph.connections().len(), before);
        prop_assert!(graph.validate().is_ok());
    }

    /// Compiling an unchanged graph twice yields equal specs.
    #[test]
    fn compile_is_deterministic((_n, order, edges) in dag()) {
        let graph = build(&order, &edges);
        let first = compile_spec(&graph, 256).unwrap();
        let second = compile_spec(&graph, 256).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.dump(), second.dump());
    }

    /// Audio mix is commutative.
    #[test]
    fn audio_mix_commutes(
        pair in prop::collection::vec((-1.0f32..1.0, -1.0f32..1.0), 1..64),
    ) {
        let (xs, ys): (Vec<f32>, Vec<f32>) = pair.into_iter().unzip();
        let mut ab = audio(&xs);
        ab.mix(&audio(&ys)).unwrap();
        let mut ba = audio(&ys);
        ba.mix(&audio(&xs)).unwrap();
        prop_assert_eq!(ab, ba);
    }

    /// Control mix is commutative.
    #[test]
    fn control_mix_commutes(x in -1e6f32..1e6, y in -1e6f32..1e6) {
        let mk = |v: f32| {
            let mut b = Buffer::new(BufferType::Control);
            b.set_control(v).unwrap();
            b
        };
        let mut ab = mk(x);
        ab.mix(&mk(y)).unwrap();
        let mut ba = mk(y);
        ba.mix(&mk(x)).unwrap();
        prop_assert_eq!(ab.control().unwrap(), ba.control().unwrap());
    }

    /// Atom mix is the stably time-ordered union of both inputs.
    #[test]
    fn atom_merge_is_stable_union(
        a in prop::collection::vec(0u32..64, 0..40),
        b in prop::collection::vec(0u32..64, 0..40),
    ) {
        let mut dst = events(&a, 0xA);
        let src = events(&b, 0xB);
        dst.merge_from(&src).unwrap();

        let merged: Vec<(u32, u8)> = dst.iter().map(|e| (e.offset, e.data[0])).collect();
        prop_assert_eq!(merged.len(), a.len() + b.len());
        for w in merged.windows(2) {
            prop_assert!(w[0].0 <= w[1].0, "offsets out of order: {:?}", w);
            if w[0].0 == w[1].0 {
                // First operand's events come first on ties.
                prop_assert!(!(w[0].1 == 0xB && w[1].1 == 0xA));
            }
        }
        prop_assert_eq!(src.len(), b.len());
    }

    /// Raw bytes written to an audio buffer read back unchanged.
    #[test]
    fn audio_bytes_roundtrip(samples in prop::collection::vec(-1e6f32..1e6, 1..128)) {
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut buf = Buffer::new(BufferType::AudioBlock { frames: samples.len() });
        buf.set_bytes(&payload).unwrap();
        prop_assert_eq!(buf.get_bytes(), payload);
    }

    /// Raw bytes of a well-formed atom blob read back unchanged.
    #[test]
    fn atom_bytes_roundtrip(offsets in prop::collection::vec(0u32..1000, 0..50)) {
        let payload = events(&offsets, 1).as_bytes().to_vec();
        let mut buf = Buffer::new(BufferType::AtomBlob { capacity: 4096 });
        buf.set_bytes(&payload).unwrap();
        prop_assert_eq!(buf.get_bytes(), payload);
    }

    /// The arena's raw view is the concatenation of its buffers.
    #[test]
    fn arena_bytes_concatenate(frames in 1usize..32, count in 1usize..6) {
        let arena = BufferArena::from_types(
            (0..count).map(|_| BufferType::AudioBlock { frames }),
        );
        prop_assert_eq!(arena.get_bytes().len(), frames * 4 * count);
        let last = arena.iter().last().unwrap().0;
        prop_assert_eq!(last.offset, frames * 4 * (count - 1));
    }
}
