//! Property-based tests for graph invariants.
//!
//! - Topological order respects every edge and lists each node once
//! - A rejected cycle-closing edge leaves the graph untouched
//! - Fan-in resolution and the overwrite log are reproducible across runs

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use dagflow_core::types::SlotValues;
use dagflow_core::ErrorKind;
use dagflow_engine::scheduler::{levels, topological_order};
use dagflow_engine::{Edge, FnUnit, Graph, GraphExecutor, Node};

/// Node count plus forward edges `(from, to)` with `from < to`, so the
/// generated graph is always acyclic. Edges may repeat; every one lands in
/// its own target slot.
fn dag_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2..=10_usize).prop_flat_map(|n| {
        let edge = (0..n - 1).prop_flat_map(move |from| (Just(from), from + 1..n));
        (Just(n), proptest::collection::vec(edge, 0..=20))
    })
}

/// Build the generated graph. With `shared_slot` every edge targets slot
/// `in`, so nodes with several predecessors see fan-in overwrites.
fn build(n: usize, edges: &[(usize, usize)], shared_slot: bool) -> Graph {
    let mut g = Graph::new();
    for i in 0..n {
        let id = format!("n{i}");
        let tag = id.clone();
        let unit = FnUnit::new("tag", move |inputs: SlotValues| {
            let mut out = SlotValues::new();
            out.insert("out".into(), json!({ "node": tag, "seen": inputs.len() }));
            Ok(out)
        });
        g.add_node(Node::new(id, Arc::new(unit))).unwrap();
    }
    for (k, (from, to)) in edges.iter().enumerate() {
        let slot = if shared_slot {
            "in".to_string()
        } else {
            format!("s{k}")
        };
        let edge = Edge::new(format!("n{from}"), "out", format!("n{to}"), slot);
        // Repeated (from, to) pairs on the shared slot are duplicates; skip them.
        let _ = g.add_edge(edge);
    }
    g
}

proptest! {
    #[test]
    fn topological_order_respects_edges((n, edges) in dag_strategy()) {
        let g = build(n, &edges, false);
        let order = topological_order(&g).unwrap();

        prop_assert_eq!(order.len(), n);
        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        prop_assert_eq!(position.len(), n);
        for edge in g.edges() {
            prop_assert!(position[edge.source.as_str()] < position[edge.target.as_str()]);
        }
    }

    #[test]
    fn levels_place_targets_below_sources((n, edges) in dag_strategy()) {
        let g = build(n, &edges, false);
        let grouped = levels(&g, &|_| true).unwrap();

        let level: HashMap<&str, usize> = grouped
            .iter()
            .enumerate()
            .flat_map(|(l, ids)| ids.iter().map(move |id| (id.as_str(), l)))
            .collect();
        prop_assert_eq!(level.len(), n);
        for edge in g.edges() {
            prop_assert!(level[edge.source.as_str()] < level[edge.target.as_str()]);
        }
    }

    #[test]
    fn rejected_cycle_leaves_graph_unchanged((n, edges) in dag_strategy()) {
        let mut g = build(n, &edges, false);
        prop_assume!(g.edge_count() > 0);

        let before = g.to_definition();
        let degrees: Vec<usize> = g.node_ids().map(|id| g.in_degree(id).unwrap()).collect();
        let first = g.edges().next().unwrap().clone();
        let closing = Edge::new(first.target, "back", first.source, "back");

        let err = g.add_edge(closing).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Cycle);
        prop_assert_eq!(g.to_definition(), before);
        let after: Vec<usize> = g.node_ids().map(|id| g.in_degree(id).unwrap()).collect();
        prop_assert_eq!(after, degrees);
    }

    #[test]
    fn fan_in_runs_are_reproducible((n, edges) in dag_strategy()) {
        let g = build(n, &edges, true);
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let executor = GraphExecutor::default();

        let first = rt.block_on(executor.run(&g)).unwrap();
        let second = rt.block_on(executor.run(&g)).unwrap();

        prop_assert!(first.succeeded());
        prop_assert_eq!(&first.order, &second.order);
        prop_assert_eq!(first.outputs(), second.outputs());
        prop_assert_eq!(&first.overwrites, &second.overwrites);
    }
}
