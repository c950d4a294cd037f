//! Graph integrity analyzers: circular chains and duplicate edges.
//!
//! Findings are warnings for the caller to report; they never abort a run.

use ctrlq_core::RuleState;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::model::TaskGraph;

/// A pair of tasks participating in a circular dependency, de-duplicated by
/// unordered endpoint identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircularPair {
    pub from: Uuid,
    pub to: Uuid,
}

impl CircularPair {
    fn key(&self) -> (Uuid, Uuid) {
        if self.from <= self.to {
            (self.from, self.to)
        } else {
            (self.to, self.from)
        }
    }
}

/// A `(upstream, downstream, state)` triple that occurs more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateEdge {
    pub upstream: Uuid,
    pub downstream: Uuid,
    pub state: RuleState,
    pub count: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Depth-first search over the composite edges; every back-edge into a gray
/// node yields one circular pair.
pub fn find_circular_chains(graph: &TaskGraph) -> Vec<CircularPair> {
    let mut colors: HashMap<Uuid, Color> = graph.tasks().map(|n| (n.id, Color::White)).collect();
    let mut pairs: Vec<CircularPair> = Vec::new();
    let mut seen: HashSet<(Uuid, Uuid)> = HashSet::new();

    let mut ids: Vec<Uuid> = graph.tasks().map(|n| n.id).collect();
    ids.sort();
    for id in ids {
        if colors.get(&id) == Some(&Color::White) {
            visit(graph, id, &mut colors, &mut pairs, &mut seen);
        }
    }
    pairs
}

fn visit(
    graph: &TaskGraph,
    node: Uuid,
    colors: &mut HashMap<Uuid, Color>,
    pairs: &mut Vec<CircularPair>,
    seen: &mut HashSet<(Uuid, Uuid)>,
) {
    colors.insert(node, Color::Gray);
    for edge in graph.edges_from(node) {
        match colors.get(&edge.downstream) {
            Some(Color::Gray) => {
                let pair = CircularPair {
                    from: node,
                    to: edge.downstream,
                };
                if seen.insert(pair.key()) {
                    pairs.push(pair);
                }
            }
            Some(Color::White) => visit(graph, edge.downstream, colors, pairs, seen),
            _ => {}
        }
    }
    colors.insert(node, Color::Black);
}

/// Count every `(upstream, downstream, state)` triple; counts of two or
/// more become one report each.
pub fn find_duplicate_edges(graph: &TaskGraph) -> Vec<DuplicateEdge> {
    let mut counts: HashMap<(Uuid, Uuid, RuleState), usize> = HashMap::new();
    for edge in graph.edges() {
        *counts
            .entry((edge.upstream, edge.downstream, edge.state))
            .or_insert(0) += 1;
    }
    let mut duplicates: Vec<DuplicateEdge> = counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|((upstream, downstream, state), count)| DuplicateEdge {
            upstream,
            downstream,
            state,
            count,
        })
        .collect();
    duplicates.sort_by_key(|d| (d.upstream, d.downstream));
    duplicates
}
