//! Graph model: nodes, edges, and incrementally maintained adjacency.
//!
//! Every mutation checks its preconditions before touching any index, so a
//! rejected call leaves the graph exactly as it was. Edge additions go
//! through the incremental cycle check; the graph is acyclic at all times.

pub mod edge;
pub mod lease;
pub mod node;

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use dagflow_core::error::{FlowError, Result};

use crate::cycle;

pub use edge::{Edge, EdgeId};
pub use lease::{ActiveRuns, RunLease};
pub use node::Node;

struct NodeEntry {
    node: Node,
    seq: u64,
}

/// Directed acyclic graph of nodes connected by slot-to-slot edges.
pub struct Graph {
    nodes: HashMap<String, NodeEntry>,
    /// Insertion sequence -> node id.
    order: BTreeMap<u64, String>,
    next_seq: u64,
    edges: BTreeMap<EdgeId, Edge>,
    next_edge: u64,
    outgoing: HashMap<String, Vec<EdgeId>>,
    incoming: HashMap<String, Vec<EdgeId>>,
    runs: ActiveRuns,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            edges: BTreeMap::new(),
            next_edge: 0,
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            runs: ActiveRuns::default(),
        }
    }

    // ── Mutation ────────────────────────────────────────────────

    /// Add a node.
    ///
    /// Fails with `DuplicateNode` if a node with the same id exists.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        self.ensure_idle("add node")?;
        if self.nodes.contains_key(&node.id) {
            return Err(FlowError::DuplicateNode(node.id));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(node_id = %node.id, unit = %node.unit_name(), "Added node");
        self.order.insert(seq, node.id.clone());
        self.outgoing.insert(node.id.clone(), vec![]);
        self.incoming.insert(node.id.clone(), vec![]);
        self.nodes.insert(node.id.clone(), NodeEntry { node, seq });
        Ok(())
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Result<Node> {
        self.ensure_idle("remove node")?;
        if !self.nodes.contains_key(id) {
            return Err(FlowError::NodeNotFound(id.to_string()));
        }

        let mut touching: Vec<EdgeId> = self
            .outgoing
            .get(id)
            .into_iter()
            .chain(self.incoming.get(id))
            .flatten()
            .copied()
            .collect();
        touching.sort_unstable();
        touching.dedup();
        for eid in touching {
            self.detach_edge(eid);
        }

        self.outgoing.remove(id);
        self.incoming.remove(id);
        let entry = self
            .nodes
            .remove(id)
            .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        self.order.remove(&entry.seq);
        debug!(node_id = %id, "Removed node");
        Ok(entry.node)
    }

    /// Add an edge.
    ///
    /// Fails with `NodeNotFound` if either endpoint is missing, `SlotNotFound`
    /// if an endpoint declares slots and the named one is not among them,
    /// `DuplicateEdge` if the identical edge exists, and `Cycle` if the edge
    /// would close a cycle.
    pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId> {
        self.ensure_idle("add edge")?;

        let source = self
            .node(&edge.source)
            .ok_or_else(|| FlowError::NodeNotFound(edge.source.clone()))?;
        let target = self
            .node(&edge.target)
            .ok_or_else(|| FlowError::NodeNotFound(edge.target.clone()))?;

        if !source.provides_output(&edge.source_slot) {
            return Err(FlowError::SlotNotFound {
                node: edge.source.clone(),
                slot: edge.source_slot.clone(),
            });
        }
        if !target.accepts_input(&edge.target_slot) {
            return Err(FlowError::SlotNotFound {
                node: edge.target.clone(),
                slot: edge.target_slot.clone(),
            });
        }
        if self.find_edge(&edge).is_some() {
            return Err(FlowError::DuplicateEdge(edge.to_string()));
        }
        if let Some(path) = cycle::would_create_cycle(self, &edge.source, &edge.target) {
            debug!(edge = %edge, "Rejected edge closing a cycle");
            return Err(FlowError::Cycle { path });
        }

        Ok(self.attach_edge(edge))
    }

    /// Remove an edge.
    pub fn remove_edge(&mut self, edge: &Edge) -> Result<Edge> {
        self.ensure_idle("remove edge")?;
        let eid = self
            .find_edge(edge)
            .ok_or_else(|| FlowError::EdgeNotFound(edge.to_string()))?;
        self.detach_edge(eid)
            .ok_or_else(|| FlowError::EdgeNotFound(edge.to_string()))
    }

    fn attach_edge(&mut self, edge: Edge) -> EdgeId {
        let eid = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.outgoing.entry(edge.source.clone()).or_default().push(eid);
        self.incoming.entry(edge.target.clone()).or_default().push(eid);
        debug!(edge = %edge, "Added edge");
        self.edges.insert(eid, edge);
        eid
    }

    fn detach_edge(&mut self, eid: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(&eid)?;
        if let Some(out) = self.outgoing.get_mut(&edge.source) {
            out.retain(|e| *e != eid);
        }
        if let Some(inc) = self.incoming.get_mut(&edge.target) {
            inc.retain(|e| *e != eid);
        }
        debug!(edge = %edge, "Removed edge");
        Some(edge)
    }

    /// Insert an edge without any structural check.
    #[cfg(test)]
    pub(crate) fn insert_edge_unchecked(&mut self, edge: Edge) -> EdgeId {
        self.attach_edge(edge)
    }

    fn ensure_idle(&self, operation: &str) -> Result<()> {
        let active_runs = self.runs.count();
        if active_runs > 0 {
            return Err(FlowError::NodeInUse {
                operation: operation.to_string(),
                active_runs,
            });
        }
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id).map(|e| &e.node)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insertion sequence number of a node (the scheduler's tie-break key).
    pub fn seq(&self, id: &str) -> Option<u64> {
        self.nodes.get(id).map(|e| e.seq)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.values().filter_map(|id| self.node(id))
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn find_edge(&self, edge: &Edge) -> Option<EdgeId> {
        self.outgoing
            .get(&edge.source)?
            .iter()
            .copied()
            .find(|eid| self.edges.get(eid) == Some(edge))
    }

    /// Outgoing edges of a node, in insertion order.
    pub fn outgoing_edges<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(move |eid| self.edges.get(eid))
    }

    /// Incoming edges of a node, in insertion order.
    pub fn incoming_edges<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(move |eid| self.edges.get(eid))
    }

    /// Distinct source nodes feeding `id`, in edge insertion order.
    pub fn predecessors(&self, id: &str) -> Result<Vec<&str>> {
        if !self.contains_node(id) {
            return Err(FlowError::NodeNotFound(id.to_string()));
        }
        let mut preds: Vec<&str> = Vec::new();
        for edge in self.incoming_edges(id) {
            if !preds.contains(&edge.source.as_str()) {
                preds.push(&edge.source);
            }
        }
        Ok(preds)
    }

    /// Distinct target nodes fed by `id`, in edge insertion order.
    pub fn successors(&self, id: &str) -> Result<Vec<&str>> {
        if !self.contains_node(id) {
            return Err(FlowError::NodeNotFound(id.to_string()));
        }
        let mut succs: Vec<&str> = Vec::new();
        for edge in self.outgoing_edges(id) {
            if !succs.contains(&edge.target.as_str()) {
                succs.push(&edge.target);
            }
        }
        Ok(succs)
    }

    /// Number of incoming edges (each edge counts, including parallel ones).
    pub fn in_degree(&self, id: &str) -> Result<usize> {
        self.incoming
            .get(id)
            .map(Vec::len)
            .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))
    }

    pub fn out_degree(&self, id: &str) -> Result<usize> {
        self.outgoing
            .get(id)
            .map(Vec::len)
            .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))
    }

    /// Nodes with no incoming edges, in insertion order.
    pub fn roots(&self) -> Vec<&str> {
        self.node_ids()
            .filter(|id| self.incoming.get(*id).map_or(true, |v| v.is_empty()))
            .collect()
    }

    /// Nodes with no outgoing edges, in insertion order.
    pub fn leaves(&self) -> Vec<&str> {
        self.node_ids()
            .filter(|id| self.outgoing.get(*id).map_or(true, |v| v.is_empty()))
            .collect()
    }

    // ── Run guard ───────────────────────────────────────────────

    /// Register an active run. Mutations fail with `NodeInUse` until every
    /// lease on this graph (or on a snapshot of it) is dropped.
    pub fn lease(&self) -> RunLease {
        self.runs.acquire()
    }

    pub fn active_runs(&self) -> usize {
        self.runs.count()
    }

    /// Frozen copy sharing this graph's run guard: a run holding a lease on
    /// the snapshot blocks mutation of the original.
    pub fn snapshot(&self) -> Graph {
        let mut copy = self.clone();
        copy.runs = self.runs.clone();
        copy
    }
}

impl Clone for Graph {
    /// Independent copy with its own (idle) run guard.
    fn clone(&self) -> Self {
        Self {
            nodes: self
                .nodes
                .iter()
                .map(|(id, e)| {
                    (
                        id.clone(),
                        NodeEntry {
                            node: e.node.clone(),
                            seq: e.seq,
                        },
                    )
                })
                .collect(),
            order: self.order.clone(),
            next_seq: self.next_seq,
            edges: self.edges.clone(),
            next_edge: self.next_edge,
            outgoing: self.outgoing.clone(),
            incoming: self.incoming.clone(),
            runs: ActiveRuns::default(),
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes().collect::<Vec<_>>())
            .field("edges", &self.edges().collect::<Vec<_>>())
            .field("active_runs", &self.active_runs())
            .finish()
    }
}
