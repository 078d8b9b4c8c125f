#![forbid(unsafe_code)]

//! Downstream-reachability queries over a finished [`FlowGraph`].
//!
//! The engine is built once per graph and owns its own adjacency index,
//! so repeated queries against the same graph never rebuild it. It does
//! not mutate the graph and raises no errors: an unknown start id yields
//! the degenerate singleton result rather than a failure.

use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

use fv_core::FlowGraph;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Result of a [`HighlightEngine::downstream`] query.
///
/// `nodes` and `edges` are lexicographically sorted and deduplicated;
/// edge keys use the `"src->dst"` form. `duration_ms` is diagnostic only
/// and never influences the sets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamResult {
    pub nodes: Vec<String>,
    pub edges: Vec<String>,
    pub duration_ms: f64,
}

/// Read-only reachability engine over one parse result.
#[derive(Debug, Clone)]
pub struct HighlightEngine {
    /// Node id to deduplicated successor list in edge insertion order.
    /// Every node appears as a key, even without outgoing edges.
    adjacency: FxHashMap<String, Vec<String>>,
}

impl HighlightEngine {
    #[must_use]
    pub fn new(graph: &FlowGraph) -> Self {
        let mut adjacency: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for node in &graph.nodes {
            adjacency.entry(node.id.clone()).or_default();
        }
        for edge in &graph.edges {
            let successors = adjacency.entry(edge.source.clone()).or_default();
            if !successors.iter().any(|existing| existing == &edge.target) {
                successors.push(edge.target.clone());
            }
        }
        Self { adjacency }
    }

    /// Breadth-first reachability from `start`, following outgoing edges
    /// only. The start node always counts as visited, even when it is
    /// absent from the graph (the adjacency lookup then yields no
    /// successors and the result is `{nodes: [start], edges: []}`).
    #[must_use]
    pub fn downstream(&self, start: &str) -> DownstreamResult {
        let began = Instant::now();

        let mut visited: FxHashSet<String> = FxHashSet::default();
        let mut edge_keys: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(start.to_string());

        while let Some(current) = queue.pop_front() {
            if visited.contains(&current) {
                continue;
            }
            if let Some(successors) = self.adjacency.get(&current) {
                for successor in successors {
                    edge_keys.insert(format!("{current}->{successor}"));
                    if !visited.contains(successor) {
                        queue.push_back(successor.clone());
                    }
                }
            }
            visited.insert(current);
        }

        let mut nodes: Vec<String> = visited.into_iter().collect();
        nodes.sort_unstable();

        DownstreamResult {
            nodes,
            edges: edge_keys.into_iter().collect(),
            duration_ms: began.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

/// One-shot convenience wrapper for a single query. Callers with
/// repeated queries against the same graph should hold on to a
/// [`HighlightEngine`] instead.
#[must_use]
pub fn downstream(graph: &FlowGraph, start: &str) -> DownstreamResult {
    HighlightEngine::new(graph).downstream(start)
}
