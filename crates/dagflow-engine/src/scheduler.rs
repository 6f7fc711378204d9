//! Topological scheduling (Kahn's algorithm).
//!
//! Ready nodes are kept in a min-heap keyed by insertion sequence, so among
//! several ready nodes the one added to the graph first always goes next.
//! The schedule for a given graph is therefore fully reproducible.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::error;

use dagflow_core::error::{FlowError, Result};

use crate::graph::Graph;

/// Incremental Kahn frontier over a borrowed graph.
///
/// Holds its own copy of every node's in-degree; completing a node
/// decrements its successors' counters without touching the graph.
pub struct Frontier<'g> {
    graph: &'g Graph,
    in_degree: HashMap<&'g str, usize>,
    ready: BinaryHeap<Reverse<(u64, &'g str)>>,
    completed: HashSet<&'g str>,
}

impl<'g> Frontier<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        let mut in_degree = HashMap::with_capacity(graph.node_count());
        let mut ready = BinaryHeap::new();
        for node in graph.nodes() {
            let id = node.id.as_str();
            let degree = graph.incoming_edges(id).count();
            if degree == 0 {
                ready.push(Reverse((graph.seq(id).unwrap_or(u64::MAX), id)));
            }
            in_degree.insert(id, degree);
        }
        Self {
            graph,
            in_degree,
            ready,
            completed: HashSet::new(),
        }
    }

    /// Next ready node, earliest-inserted first.
    pub fn pop(&mut self) -> Option<&'g str> {
        self.ready.pop().map(|Reverse((_, id))| id)
    }

    /// Mark a node done: every outgoing edge decrements its target's counter,
    /// and targets reaching zero become ready. Completing twice is a no-op.
    pub fn complete(&mut self, id: &str) {
        let Some(&id) = self.in_degree.get_key_value(id).map(|(k, _)| k) else {
            return;
        };
        if !self.completed.insert(id) {
            return;
        }
        for edge in self.graph.outgoing_edges(id) {
            let target = edge.target.as_str();
            if let Some(degree) = self.in_degree.get_mut(target) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    let seq = self.graph.seq(target).unwrap_or(u64::MAX);
                    self.ready.push(Reverse((seq, target)));
                }
            }
        }
    }

    pub fn remaining_in_degree(&self, id: &str) -> Option<usize> {
        self.in_degree.get(id).copied()
    }

    /// Nodes never completed, in insertion order.
    pub fn unresolved(&self) -> Vec<String> {
        self.graph
            .node_ids()
            .filter(|id| !self.completed.contains(id))
            .map(String::from)
            .collect()
    }
}

/// Full execution order: every node after all of its predecessors, exactly once.
///
/// Fails with `Schedule` if fewer nodes are ordered than exist, which means a
/// cycle got past the graph's own checks.
pub fn topological_order(graph: &Graph) -> Result<Vec<String>> {
    let mut frontier = Frontier::new(graph);
    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(id) = frontier.pop() {
        order.push(id.to_string());
        frontier.complete(id);
    }

    let total = graph.node_count();
    if order.len() < total {
        let unresolved = frontier.unresolved();
        error!(
            invariant = "schedule",
            ordered = order.len(),
            total,
            unresolved = ?unresolved,
            "Topological sort left nodes unordered"
        );
        return Err(FlowError::Schedule {
            ordered: order.len(),
            total,
            unresolved,
        });
    }
    Ok(order)
}

/// Group enabled nodes by level: a node's level is the longest path to it
/// from any enabled root. Disabled nodes are left out and do not extend
/// paths. Nodes within a level are in insertion order.
pub fn levels(graph: &Graph, enabled: &dyn Fn(&str) -> bool) -> Result<Vec<Vec<String>>> {
    let order = topological_order(graph)?;
    let mut level_of: HashMap<&str, usize> = HashMap::new();
    let mut grouped: Vec<Vec<&str>> = Vec::new();

    for id in &order {
        let id = id.as_str();
        if !enabled(id) {
            continue;
        }
        let level = graph
            .incoming_edges(id)
            .filter_map(|e| level_of.get(e.source.as_str()).map(|l| l + 1))
            .max()
            .unwrap_or(0);
        level_of.insert(id, level);
        if grouped.len() <= level {
            grouped.resize_with(level + 1, Vec::new);
        }
        grouped[level].push(id);
    }

    Ok(grouped
        .into_iter()
        .map(|mut ids| {
            ids.sort_by_key(|id| graph.seq(id));
            ids.into_iter().map(String::from).collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::{Edge, Node};
    use crate::registry::FnUnit;
    use dagflow_core::types::SlotValues;

    fn graph_with(ids: &[&str]) -> Graph {
        let mut g = Graph::new();
        for id in ids {
            let unit = Arc::new(FnUnit::new("noop", |_| Ok(SlotValues::new())));
            g.add_node(Node::new(*id, unit)).unwrap();
        }
        g
    }

    fn link(g: &mut Graph, from: &str, to: &str) {
        g.add_edge(Edge::same_slot(from, to, "v")).unwrap();
    }

    #[test]
    fn test_order_follows_edges() {
        let mut g = graph_with(&["c", "b", "a"]);
        link(&mut g, "a", "b");
        link(&mut g, "b", "c");
        assert_eq!(topological_order(&g).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        let mut g = graph_with(&["x", "a", "b", "sink"]);
        link(&mut g, "b", "sink");
        link(&mut g, "a", "sink");
        link(&mut g, "x", "sink");
        assert_eq!(topological_order(&g).unwrap(), vec!["x", "a", "b", "sink"]);
    }

    #[test]
    fn test_newly_ready_node_competes_on_insertion_order() {
        // "late" was added before "c", so once "a" completes it jumps ahead of "c".
        let mut g = graph_with(&["a", "late", "c"]);
        link(&mut g, "a", "late");
        assert_eq!(topological_order(&g).unwrap(), vec!["a", "late", "c"]);
    }

    #[test]
    fn test_parallel_edges_count_separately() {
        let mut g = graph_with(&["a", "b"]);
        g.add_edge(Edge::new("a", "x", "b", "x")).unwrap();
        g.add_edge(Edge::new("a", "y", "b", "y")).unwrap();

        let mut frontier = Frontier::new(&g);
        assert_eq!(frontier.remaining_in_degree("b"), Some(2));
        assert_eq!(frontier.pop(), Some("a"));
        assert_eq!(frontier.pop(), None);
        frontier.complete("a");
        frontier.complete("a");
        assert_eq!(frontier.remaining_in_degree("b"), Some(0));
        assert_eq!(frontier.pop(), Some("b"));
        assert_eq!(frontier.pop(), None);
    }

    #[test]
    fn test_frontier_does_not_mutate_graph() {
        let mut g = graph_with(&["a", "b"]);
        link(&mut g, "a", "b");
        let mut frontier = Frontier::new(&g);
        let a = frontier.pop().unwrap();
        frontier.complete(a);
        assert_eq!(g.in_degree("b").unwrap(), 1);
    }

    #[test]
    fn test_schedule_error_on_bypassed_cycle() {
        let mut g = graph_with(&["a", "b", "c"]);
        link(&mut g, "a", "b");
        g.insert_edge_unchecked(Edge::same_slot("b", "a", "w"));

        match topological_order(&g) {
            Err(FlowError::Schedule {
                ordered,
                total,
                unresolved,
            }) => {
                assert_eq!(ordered, 1);
                assert_eq!(total, 3);
                assert_eq!(unresolved, vec!["a", "b"]);
            }
            other => panic!("expected schedule error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_graph() {
        assert!(topological_order(&Graph::new()).unwrap().is_empty());
    }

    #[test]
    fn test_levels_use_longest_path() {
        let mut g = graph_with(&["a", "b", "c", "d"]);
        link(&mut g, "a", "b");
        link(&mut g, "b", "d");
        link(&mut g, "a", "d");
        link(&mut g, "c", "d");

        let levels = levels(&g, &|_| true).unwrap();
        assert_eq!(levels, vec![vec!["a", "c"], vec!["b"], vec!["d"]]);
    }

    #[test]
    fn test_levels_skip_disabled() {
        let mut g = graph_with(&["a", "b", "c"]);
        link(&mut g, "a", "b");
        link(&mut g, "b", "c");

        let levels = levels(&g, &|id| id != "b").unwrap();
        assert_eq!(levels, vec![vec!["a", "c"]]);
    }
}
