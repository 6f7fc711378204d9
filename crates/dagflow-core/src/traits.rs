use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Error returned by a unit of work. Opaque to the engine; surfaced as the
/// node's failure payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct UnitError {
    pub message: String,
}

impl UnitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The pluggable logic behind a node.
///
/// Given the node's resolved inputs, return its outputs or fail with a
/// domain error. The engine never looks inside.
pub trait WorkUnit: Send + Sync + 'static {
    /// Unit name (referenced by node definitions).
    fn name(&self) -> &str;

    /// Execute with resolved inputs.
    fn execute(&self, inputs: SlotValues) -> BoxFuture<'_, std::result::Result<SlotValues, UnitError>>;
}

/// Persistence backend for graph documents and run results.
pub trait GraphStore: Send + Sync + 'static {
    /// Persist a new graph document and assign it an id.
    fn create_graph(&self, definition: &GraphDefinition) -> BoxFuture<'_, Result<StoredGraph>>;

    /// Load a graph document.
    fn get_graph(&self, id: &GraphId) -> BoxFuture<'_, Result<StoredGraph>>;

    /// List all graph documents, oldest first.
    fn list_graphs(&self) -> BoxFuture<'_, Result<Vec<StoredGraph>>>;

    /// Replace a graph document.
    fn update_graph(
        &self,
        id: &GraphId,
        definition: &GraphDefinition,
    ) -> BoxFuture<'_, Result<StoredGraph>>;

    /// Delete a graph document and every run recorded for it.
    fn delete_graph(&self, id: &GraphId) -> BoxFuture<'_, Result<()>>;

    /// Record the result of a run.
    fn save_run(&self, result: &RunResult) -> BoxFuture<'_, Result<()>>;

    /// Load a run result belonging to a graph.
    fn get_run(&self, graph_id: &GraphId, run_id: &RunId) -> BoxFuture<'_, Result<RunResult>>;

    /// List run results of a graph, most recent first.
    fn list_runs(&self, graph_id: &GraphId) -> BoxFuture<'_, Result<Vec<RunResult>>>;
}
