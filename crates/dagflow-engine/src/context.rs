use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use dagflow_core::config::OverwritePolicy;
use dagflow_core::error::{FlowError, Result};
use dagflow_core::types::*;

use crate::graph::{Edge, Graph};
use crate::run_config::RunConfig;
use crate::scheduler::Frontier;

#[derive(Debug, Clone)]
struct SlotEntry {
    value: Value,
    source: ValueSource,
}

/// Bookkeeping for a single run.
///
/// Borrows the graph for the lifetime of the run and owns everything the run
/// mutates: the in-degree frontier, resolved slot values, per-node reports,
/// the error list and the overwrite log. Nothing here outlives the run except
/// the [`RunResult`] it turns into.
pub struct RunContext<'g> {
    graph: &'g Graph,
    policy: OverwritePolicy,
    frontier: Frontier<'g>,
    values: BTreeMap<String, BTreeMap<String, SlotEntry>>,
    conflicts: BTreeSet<(String, String)>,
    reports: BTreeMap<String, NodeReport>,
    visited: Vec<String>,
    errors: Vec<NodeError>,
    overwrites: Vec<OverwriteEvent>,
}

impl<'g> RunContext<'g> {
    /// Fresh context: every node pending, root inputs and pinned values seeded.
    pub fn new(graph: &'g Graph, run_config: &RunConfig, policy: OverwritePolicy) -> Self {
        let mut ctx = Self {
            graph,
            policy,
            frontier: Frontier::new(graph),
            values: BTreeMap::new(),
            conflicts: BTreeSet::new(),
            reports: graph
                .node_ids()
                .map(|id| (id.to_string(), NodeReport::pending()))
                .collect(),
            visited: Vec::with_capacity(graph.node_count()),
            errors: vec![],
            overwrites: vec![],
        };
        for (node, slots) in &run_config.root_inputs {
            ctx.seed(node, slots, ValueSource::RootInput);
        }
        for (node, slots) in &run_config.data_overwrites {
            ctx.seed(node, slots, ValueSource::Pinned);
        }
        ctx
    }

    fn seed(&mut self, node: &str, slots: &SlotValues, source: ValueSource) {
        let entry = self.values.entry(node.to_string()).or_default();
        for (slot, value) in slots {
            entry.insert(
                slot.clone(),
                SlotEntry {
                    value: value.clone(),
                    source: source.clone(),
                },
            );
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Next node whose predecessors have all completed.
    pub fn next_ready(&mut self) -> Option<&'g str> {
        let id = self.frontier.pop()?;
        self.visited.push(id.to_string());
        Some(id)
    }

    /// Release a node's successors. Called once per visited node, whatever
    /// its outcome.
    pub fn complete(&mut self, node: &str) {
        self.frontier.complete(node);
    }

    /// Inputs for a node: every value written to it this run, plus declared
    /// defaults for slots nothing wrote.
    ///
    /// Fails with `InputConflict` if a slot received conflicting writes under
    /// the `Reject` policy, and `MissingInput` if a declared slot, or a slot
    /// an incoming edge targets, has neither a value nor a default.
    pub fn resolve_inputs(&self, node_id: &str) -> Result<SlotValues> {
        let node = self
            .graph
            .node(node_id)
            .ok_or_else(|| FlowError::NodeNotFound(node_id.to_string()))?;

        if let Some((_, slot)) = self.conflicts.iter().find(|(n, _)| n == node_id) {
            return Err(FlowError::InputConflict {
                node: node_id.to_string(),
                slot: slot.clone(),
            });
        }

        let mut inputs: SlotValues = self
            .values
            .get(node_id)
            .map(|slots| {
                slots
                    .iter()
                    .map(|(slot, entry)| (slot.clone(), entry.value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        for (slot, default) in &node.inputs {
            if inputs.contains_key(slot) {
                continue;
            }
            match default {
                Some(value) => {
                    inputs.insert(slot.clone(), value.clone());
                }
                None => {
                    return Err(FlowError::MissingInput {
                        node: node_id.to_string(),
                        slot: slot.clone(),
                    })
                }
            }
        }

        // Wired slots are required even on a node that declares no inputs.
        if let Some(edge) = self
            .graph
            .incoming_edges(node_id)
            .find(|edge| !inputs.contains_key(&edge.target_slot))
        {
            return Err(FlowError::MissingInput {
                node: node_id.to_string(),
                slot: edge.target_slot.clone(),
            });
        }
        Ok(inputs)
    }

    /// Where the current value of `node.slot` came from, if one was written.
    pub fn source_of(&self, node: &str, slot: &str) -> Option<&ValueSource> {
        self.values.get(node)?.get(slot).map(|e| &e.source)
    }

    pub fn value_of(&self, node: &str, slot: &str) -> Option<&Value> {
        self.values.get(node)?.get(slot).map(|e| &e.value)
    }

    /// Write a value along an edge into its target slot, applying the
    /// overwrite policy. Returns the overwrite event if the slot already
    /// held a value.
    pub fn write_edge(&mut self, edge: &Edge, value: Value) -> Option<OverwriteEvent> {
        let incoming = ValueSource::Edge {
            node: edge.source.clone(),
            slot: edge.source_slot.clone(),
        };
        let slots = self.values.entry(edge.target.clone()).or_default();

        let Some(existing) = slots.get_mut(&edge.target_slot) else {
            debug!(edge = %edge, "Wrote input");
            slots.insert(
                edge.target_slot.clone(),
                SlotEntry {
                    value,
                    source: incoming,
                },
            );
            return None;
        };

        let resolution = if existing.source == ValueSource::Pinned {
            OverwriteResolution::Pinned
        } else {
            match self.policy {
                OverwritePolicy::LastWins => OverwriteResolution::Replaced,
                OverwritePolicy::FirstWins => OverwriteResolution::Kept,
                OverwritePolicy::Reject => OverwriteResolution::Conflict,
            }
        };

        let event = OverwriteEvent {
            node: edge.target.clone(),
            slot: edge.target_slot.clone(),
            previous: existing.source.clone(),
            incoming: incoming.clone(),
            old_value: existing.value.clone(),
            new_value: value.clone(),
            resolution,
        };

        match resolution {
            OverwriteResolution::Replaced => {
                existing.value = value;
                existing.source = incoming;
            }
            OverwriteResolution::Conflict => {
                self.conflicts
                    .insert((edge.target.clone(), edge.target_slot.clone()));
            }
            OverwriteResolution::Kept | OverwriteResolution::Pinned => {}
        }

        warn!(
            node_id = %event.node,
            slot = %event.slot,
            from = %edge.source,
            resolution = ?event.resolution,
            "Input slot written more than once"
        );
        self.overwrites.push(event.clone());
        Some(event)
    }

    pub fn record_success(
        &mut self,
        node: &str,
        inputs: SlotValues,
        outputs: SlotValues,
        elapsed_ms: u64,
    ) {
        let report = self.report_mut(node);
        report.status = NodeStatus::Succeeded;
        report.inputs = inputs;
        report.outputs = outputs;
        report.elapsed_ms = elapsed_ms;
    }

    pub fn record_failure(
        &mut self,
        node: &str,
        inputs: SlotValues,
        error: &FlowError,
        elapsed_ms: u64,
    ) {
        let message = error.to_string();
        let report = self.report_mut(node);
        report.status = NodeStatus::Failed;
        report.inputs = inputs;
        report.error = Some(message.clone());
        report.elapsed_ms = elapsed_ms;
        self.errors.push(NodeError {
            node: node.to_string(),
            kind: error.kind(),
            message,
        });
    }

    /// Mark a node skipped. A node that already has an outcome keeps it.
    pub fn mark_skipped(&mut self, node: &str, reason: SkipReason) -> bool {
        let report = self.report_mut(node);
        if report.status != NodeStatus::Pending {
            return false;
        }
        report.status = NodeStatus::Skipped { reason };
        true
    }

    /// Skip every node reachable from `failed`. Returns the newly skipped ids
    /// in breadth-first order.
    pub fn skip_downstream(&mut self, failed: &str) -> Vec<String> {
        let graph = self.graph;
        let mut skipped = vec![];
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(failed);

        while let Some(current) = queue.pop_front() {
            for edge in graph.outgoing_edges(current) {
                let next = edge.target.as_str();
                if !seen.insert(next) {
                    continue;
                }
                if self.mark_skipped(next, SkipReason::UpstreamFailed(failed.to_string())) {
                    skipped.push(next.to_string());
                }
                queue.push_back(next);
            }
        }
        skipped
    }

    pub fn status(&self, node: &str) -> Option<&NodeStatus> {
        self.reports.get(node).map(|r| &r.status)
    }

    pub fn is_skipped(&self, node: &str) -> bool {
        self.status(node).is_some_and(NodeStatus::is_skipped)
    }

    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[NodeError] {
        &self.errors
    }

    pub fn overwrites(&self) -> &[OverwriteEvent] {
        &self.overwrites
    }

    /// Nodes visited so far, in schedule order.
    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    fn report_mut(&mut self, node: &str) -> &mut NodeReport {
        self.reports.entry(node.to_string()).or_insert_with(NodeReport::pending)
    }

    /// Close the context into a run result.
    pub fn into_result(
        self,
        run_id: RunId,
        status: RunStatus,
        cancelled: bool,
        started_at: DateTime<Utc>,
    ) -> RunResult {
        RunResult {
            run_id,
            graph_id: None,
            status,
            order: self.visited,
            leaves: self.graph.leaves().into_iter().map(String::from).collect(),
            nodes: self.reports,
            errors: self.errors,
            overwrites: self.overwrites,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
