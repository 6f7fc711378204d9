//! Cycle detection.
//!
//! Two entry points:
//! - [`would_create_cycle`]: incremental check used by `Graph::add_edge`. A
//!   depth-first search from the new edge's target looking for its source;
//!   only the part of the graph reachable from the target is visited.
//! - [`find_cycle`]: three-color depth-first search over the whole graph,
//!   used to re-validate a graph before every run. Returns the first cycle
//!   found as an ordered path of node ids.

use std::collections::{HashMap, HashSet};

use dagflow_core::error::{FlowError, Result};

use crate::graph::Graph;

/// If adding `source -> target` would close a cycle, return the cycle as a
/// path that starts and ends at `source`, e.g. `[source, target, .., source]`.
pub fn would_create_cycle(graph: &Graph, source: &str, target: &str) -> Option<Vec<String>> {
    if source == target {
        return Some(vec![source.to_string(), source.to_string()]);
    }

    // DFS from target; parent links reconstruct the path back to target.
    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = vec![target];
    visited.insert(target);

    while let Some(current) = stack.pop() {
        if current == source {
            let mut path = vec![source.to_string()];
            let mut walk = vec![current];
            let mut cursor = current;
            while let Some(&p) = parent.get(cursor) {
                walk.push(p);
                cursor = p;
            }
            walk.reverse();
            path.extend(walk.into_iter().map(String::from));
            return Some(path);
        }
        for edge in graph.outgoing_edges(current) {
            let next = edge.target.as_str();
            if visited.insert(next) {
                parent.insert(next, current);
                stack.push(next);
            }
        }
    }

    None
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Three-color DFS over the whole graph. Returns the first cycle discovered
/// (roots visited in insertion order, successors in edge order) as a path
/// that starts and ends at the same node, or an empty vector if none.
pub fn find_cycle(graph: &Graph) -> Vec<String> {
    let mut color: HashMap<&str, Color> = graph.node_ids().map(|id| (id, Color::White)).collect();

    for root in graph.node_ids() {
        if color.get(root) != Some(&Color::White) {
            continue;
        }

        // Explicit stack of (node, successors, next successor index).
        let mut stack: Vec<(&str, Vec<&str>, usize)> = Vec::new();
        color.insert(root, Color::Gray);
        stack.push((root, successor_ids(graph, root), 0));

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if top.2 >= top.1.len() {
                color.insert(node, Color::Black);
                stack.pop();
                continue;
            }
            let next = top.1[top.2];
            top.2 += 1;

            match color.get(next).copied().unwrap_or(Color::White) {
                Color::White => {
                    color.insert(next, Color::Gray);
                    let next_succs = successor_ids(graph, next);
                    stack.push((next, next_succs, 0));
                }
                Color::Gray => {
                    // Back edge: the cycle is the stack suffix starting at `next`.
                    let start = stack
                        .iter()
                        .position(|(n, _, _)| *n == next)
                        .unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[start..].iter().map(|(n, _, _)| n.to_string()).collect();
                    path.push(next.to_string());
                    return path;
                }
                Color::Black => {}
            }
        }
    }

    vec![]
}

/// Run [`find_cycle`] and turn a discovered cycle into a `Cycle` error.
pub fn validate_acyclic(graph: &Graph) -> Result<()> {
    let path = find_cycle(graph);
    if path.is_empty() {
        Ok(())
    } else {
        Err(FlowError::Cycle { path })
    }
}

fn successor_ids<'a>(graph: &'a Graph, id: &str) -> Vec<&'a str> {
    graph.outgoing_edges(id).map(|e| e.target.as_str()).collect()
}
