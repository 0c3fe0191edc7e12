//! Dependency ordering over node connections.
//!
//! Kahn's algorithm with an explicit in-degree counter. Ready nodes are taken
//! from a min-heap keyed on insertion index, so independent nodes come out in
//! the order they were added and the result is deterministic.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::node::NodeId;

use super::GraphError;
use super::node::GraphNode;
use super::port::Connection;

/// Maps node ids to their insertion index.
pub(crate) fn index_of(nodes: &[GraphNode]) -> HashMap<&NodeId, usize> {
    nodes.iter().enumerate().map(|(i, n)| (&n.id, i)).collect()
}

/// Returns node indices in dependency order.
///
/// Fails with [`GraphError::DanglingConnection`] if a connection names a node
/// not in `nodes`, and with [`GraphError::CycleDetected`] (listing the nodes
/// left unsorted) if the dependency relation is cyclic.
pub(crate) fn kahn_sort(
    nodes: &[GraphNode],
    connections: &[Connection],
) -> Result<Vec<usize>, GraphError> {
    let index = index_of(nodes);
    let n = nodes.len();
    let mut in_degree = vec![0usize; n];
    let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); n];

    for conn in connections {
        let from = *index
            .get(&conn.from.node)
            .ok_or_else(|| GraphError::DanglingConnection(conn.to_string()))?;
        let to = *index
            .get(&conn.to.node)
            .ok_or_else(|| GraphError::DanglingConnection(conn.to_string()))?;
        downstream[from].push(to);
        in_degree[to] += 1;
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut sorted = Vec::with_capacity(n);

    while let Some(Reverse(idx)) = ready.pop() {
        sorted.push(idx);
        for &to in &downstream[idx] {
            in_degree[to] -= 1;
            if in_degree[to] == 0 {
                ready.push(Reverse(to));
            }
        }
    }

    if sorted.len() != n {
        let stuck = (0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| nodes[i].id.clone())
            .collect();
        return Err(GraphError::CycleDetected { nodes: stuck });
    }
    Ok(sorted)
}

/// Returns true if `to` is reachable from `from` by following connections
/// downstream. A node always reaches itself.
pub(crate) fn can_reach(connections: &[Connection], from: &NodeId, to: &NodeId) -> bool {
    let mut visited: Vec<&NodeId> = Vec::new();
    let mut stack = vec![from];

    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if visited.contains(&current) {
            continue;
        }
        visited.push(current);
        for conn in connections {
            if &conn.from.node == current {
                stack.push(&conn.to.node);
            }
        }
    }
    false
}
