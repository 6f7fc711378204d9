use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dagflow_core::config::EngineConfig;
use dagflow_core::error::{FlowError, Result};
use dagflow_core::event::EventBus;
use dagflow_core::types::{NodeStatus, RunEvent, RunId, RunResult, RunStatus, SkipReason};

use crate::context::RunContext;
use crate::cycle;
use crate::graph::Graph;
use crate::run_config::RunConfig;
use crate::scheduler;

/// Executes a DAG workflow.
///
/// Each call to [`execute`](Self::execute) is an independent run: the graph
/// is re-validated, a fresh [`RunContext`] is built from it, and nodes run
/// one at a time in topological order (ties broken by insertion order).
/// The graph is only borrowed, and is leased for the duration of the run so
/// that shared snapshots cannot be mutated underneath it.
pub struct GraphExecutor {
    config: EngineConfig,
    event_bus: Option<Arc<EventBus>>,
}

impl GraphExecutor {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            event_bus: None,
        }
    }

    /// Publish run progress on an event bus.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    fn publish(&self, event: RunEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Run with the default run config and no cancellation.
    pub async fn run(&self, graph: &Graph) -> Result<RunResult> {
        self.execute(graph, &RunConfig::default(), &CancellationToken::new())
            .await
    }

    /// Execute the graph once.
    ///
    /// Returns `Err` only if the run cannot start: the graph contains a cycle
    /// (`Cycle`), scheduling fails (`Schedule`), or the run config does not
    /// fit the graph (`InvalidRunConfig`). Node failures are reported inside
    /// the returned [`RunResult`]. `cancel` is checked between nodes; once it
    /// fires, every node not yet executed is skipped.
    pub async fn execute(
        &self,
        graph: &Graph,
        run_config: &RunConfig,
        cancel: &CancellationToken,
    ) -> Result<RunResult> {
        if let Err(e) = cycle::validate_acyclic(graph) {
            error!(error = %e, "Graph failed validation before run");
            return Err(e);
        }
        scheduler::topological_order(graph)?;
        run_config.validate(graph)?;

        let _lease = graph.lease();
        let run_id = RunId::new();
        let started_at = Utc::now();
        let start = Instant::now();

        let mut status = RunStatus::Pending;
        transition(&run_id, &mut status, RunStatus::Running);
        info!(
            run_id = %run_id,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            policy = ?self.config.overwrite_policy,
            fail_fast = self.config.fail_fast,
            "Run started"
        );
        self.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
            nodes: graph.node_count(),
        });

        let mut ctx = RunContext::new(graph, run_config, self.config.overwrite_policy);
        let mut halted = false;
        let mut cancelled = false;

        while let Some(id) = ctx.next_ready() {
            if !cancelled && cancel.is_cancelled() {
                warn!(run_id = %run_id, node_id = %id, "Run cancelled, skipping remaining nodes");
                cancelled = true;
            }

            if cancelled {
                self.skip(&mut ctx, &run_id, id, SkipReason::Cancelled);
            } else if halted {
                self.skip(&mut ctx, &run_id, id, SkipReason::Halted);
            } else if ctx.is_skipped(id) {
                debug!(node_id = %id, "Node skipped");
                self.node_finished(&ctx, &run_id, id);
            } else if !run_config.is_enabled(id) {
                self.skip(&mut ctx, &run_id, id, SkipReason::Disabled);
            } else if self.run_node(&mut ctx, &run_id, id).await {
                warn!(run_id = %run_id, node_id = %id, "Halting run after node failure");
                halted = true;
            }

            ctx.complete(id);
        }

        let final_status = if cancelled || ctx.has_failures() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        transition(&run_id, &mut status, final_status);

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            status = %status,
            errors = ctx.errors().len(),
            overwrites = ctx.overwrites().len(),
            cancelled,
            elapsed_ms,
            "Run finished"
        );
        self.publish(RunEvent::RunFinished {
            run_id: run_id.clone(),
            status,
        });

        Ok(ctx.into_result(run_id, status, cancelled, started_at))
    }

    /// Execute one node and propagate its outputs. Returns whether the
    /// failure (if any) halts the run.
    async fn run_node<'g>(&self, ctx: &mut RunContext<'g>, run_id: &RunId, id: &str) -> bool {
        let graph = ctx.graph();
        let Some(node) = graph.node(id) else {
            return false;
        };

        self.publish(RunEvent::NodeStarted {
            run_id: run_id.clone(),
            node: id.to_string(),
        });

        let inputs = match ctx.resolve_inputs(id) {
            Ok(inputs) => inputs,
            Err(e) => {
                let fatal = match e {
                    FlowError::MissingInput { .. } => self.config.fail_on_missing_input,
                    _ => self.config.fail_fast,
                };
                error!(node_id = %id, error = %e, "Could not resolve node inputs");
                ctx.record_failure(id, Default::default(), &e, 0);
                self.skip_downstream(ctx, id);
                self.node_finished(ctx, run_id, id);
                return fatal;
            }
        };

        info!(node_id = %id, unit = %node.unit_name(), "Executing node");
        let node_start = Instant::now();
        let result = node.unit.execute(inputs.clone()).await;
        let elapsed_ms = node_start.elapsed().as_millis() as u64;

        match result {
            Ok(produced) => {
                let outputs = node.publishable(produced);
                for edge in graph.outgoing_edges(id) {
                    let Some(value) = outputs.get(&edge.source_slot) else {
                        warn!(edge = %edge, "Source slot produced no value, target input left unset");
                        continue;
                    };
                    if let Some(event) = ctx.write_edge(edge, value.clone()) {
                        self.publish(RunEvent::InputOverwritten {
                            run_id: run_id.clone(),
                            event,
                        });
                    }
                }
                debug!(
                    node_id = %id,
                    outputs = outputs.len(),
                    elapsed_ms,
                    "Node execution complete"
                );
                ctx.record_success(id, inputs, outputs, elapsed_ms);
                self.node_finished(ctx, run_id, id);
                false
            }
            Err(e) => {
                let err = FlowError::Unit {
                    node: id.to_string(),
                    message: e.message,
                };
                error!(node_id = %id, error = %err, elapsed_ms, "Node failed");
                ctx.record_failure(id, inputs, &err, elapsed_ms);
                self.skip_downstream(ctx, id);
                self.node_finished(ctx, run_id, id);
                self.config.fail_fast
            }
        }
    }

    fn skip_downstream(&self, ctx: &mut RunContext<'_>, failed: &str) {
        let skipped = ctx.skip_downstream(failed);
        if !skipped.is_empty() {
            warn!(node_id = %failed, skipped = ?skipped, "Skipping nodes downstream of failure");
        }
    }

    fn skip(&self, ctx: &mut RunContext<'_>, run_id: &RunId, id: &str, reason: SkipReason) {
        if ctx.mark_skipped(id, reason.clone()) {
            debug!(node_id = %id, reason = ?reason, "Node skipped");
        }
        self.node_finished(ctx, run_id, id);
    }

    fn node_finished(&self, ctx: &RunContext<'_>, run_id: &RunId, id: &str) {
        let status = ctx.status(id).cloned().unwrap_or(NodeStatus::Pending);
        self.publish(RunEvent::NodeFinished {
            run_id: run_id.clone(),
            node: id.to_string(),
            status,
        });
    }
}

impl Default for GraphExecutor {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn transition(run_id: &RunId, status: &mut RunStatus, next: RunStatus) {
    debug!(run_id = %run_id, from = %status, to = %next, "Run state transition");
    *status = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};
    use crate::registry::FnUnit;
    use dagflow_core::types::SlotValues;
    use dagflow_core::ErrorKind;
    use serde_json::json;

    fn constant(id: &str, value: i64) -> Node {
        Node::new(
            id,
            Arc::new(FnUnit::new("constant", move |_| {
                let mut out = SlotValues::new();
                out.insert("out".into(), json!(value));
                Ok(out)
            })),
        )
    }

    fn echo(id: &str) -> Node {
        Node::new(id, Arc::new(FnUnit::new("echo", Ok)))
    }

    #[tokio::test]
    async fn test_run_events_in_order() {
        let mut g = Graph::new();
        g.add_node(constant("a", 1)).unwrap();
        g.add_node(echo("b")).unwrap();
        g.add_edge(Edge::new("a", "out", "b", "in")).unwrap();

        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let executor = GraphExecutor::default().with_event_bus(bus);
        let result = executor.run(&g).await.unwrap();
        assert!(result.succeeded());

        let mut kinds = vec![];
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event {
                RunEvent::RunStarted { .. } => "run_started".to_string(),
                RunEvent::NodeStarted { node, .. } => format!("start:{node}"),
                RunEvent::NodeFinished { node, .. } => format!("finish:{node}"),
                RunEvent::InputOverwritten { .. } => "overwrite".to_string(),
                RunEvent::RunFinished { .. } => "run_finished".to_string(),
            });
        }
        assert_eq!(
            kinds,
            vec![
                "run_started",
                "start:a",
                "finish:a",
                "start:b",
                "finish:b",
                "run_finished"
            ]
        );
    }

    #[tokio::test]
    async fn test_lease_held_only_during_run() {
        let mut g = Graph::new();
        g.add_node(constant("a", 1)).unwrap();
        GraphExecutor::default().run(&g).await.unwrap();
        assert_eq!(g.active_runs(), 0);
        g.add_node(echo("b")).unwrap();
    }

    #[tokio::test]
    async fn test_bypassed_cycle_rejected_before_run() {
        let mut g = Graph::new();
        g.add_node(echo("a")).unwrap();
        g.add_node(echo("b")).unwrap();
        g.add_edge(Edge::new("a", "out", "b", "in")).unwrap();
        g.insert_edge_unchecked(Edge::new("b", "out", "a", "in"));

        let err = GraphExecutor::default().run(&g).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cycle);
        assert_eq!(err.to_string(), "Cycle detected: a -> b -> a");
        assert_eq!(g.active_runs(), 0);
    }

    #[tokio::test]
    async fn test_invalid_run_config_rejected() {
        let mut g = Graph::new();
        g.add_node(echo("a")).unwrap();
        let config = RunConfig::new().disable("ghost");
        let err = GraphExecutor::default()
            .execute(&g, &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidRunConfig(_)));
    }

    #[tokio::test]
    async fn test_missing_input_not_fatal_by_default() {
        let mut g = Graph::new();
        g.add_node(echo("needs").with_input("x")).unwrap();
        g.add_node(echo("after")).unwrap();
        g.add_node(constant("other", 2)).unwrap();
        g.add_edge(Edge::new("needs", "x", "after", "in")).unwrap();

        let result = GraphExecutor::default().run(&g).await.unwrap();
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.node_status("needs"), Some(&NodeStatus::Failed));
        assert_eq!(
            result.node_status("after"),
            Some(&NodeStatus::Skipped {
                reason: SkipReason::UpstreamFailed("needs".into())
            })
        );
        assert_eq!(result.node_status("other"), Some(&NodeStatus::Succeeded));
        assert_eq!(result.errors[0].kind, ErrorKind::MissingInput);
    }

    #[tokio::test]
    async fn test_missing_input_fatal_when_configured() {
        let mut g = Graph::new();
        g.add_node(echo("needs").with_input("x")).unwrap();
        g.add_node(constant("other", 2)).unwrap();

        let config = EngineConfig {
            fail_on_missing_input: true,
            ..EngineConfig::default()
        };
        let result = GraphExecutor::new(config).run(&g).await.unwrap();
        assert_eq!(
            result.node_status("other"),
            Some(&NodeStatus::Skipped {
                reason: SkipReason::Halted
            })
        );
    }

    #[tokio::test]
    async fn test_default_fills_unwired_slot() {
        let mut g = Graph::new();
        g.add_node(echo("a").with_default("x", json!("fallback")))
            .unwrap();
        let result = GraphExecutor::default().run(&g).await.unwrap();
        assert_eq!(result.node_outputs("a").unwrap()["x"], json!("fallback"));
        assert_eq!(result.nodes["a"].inputs["x"], json!("fallback"));
    }
}
