use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dagflow_core::config::{EngineConfig, GatewayConfig};
use dagflow_core::error::{FlowError, Result};
use dagflow_core::event::EventBus;
use dagflow_core::traits::GraphStore;
use dagflow_core::types::{GraphDefinition, GraphId, StoredGraph};
use dagflow_engine::{Graph, GraphExecutor, RunLease, UnitRegistry};

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub engine: EngineConfig,
    pub registry: Arc<UnitRegistry>,
    pub store: Arc<dyn GraphStore>,
    pub event_bus: Arc<EventBus>,
    /// Cancelled on shutdown; in-flight runs stop between nodes.
    pub shutdown: CancellationToken,
    /// Built graphs, keyed by id. The cached graph carries the run guard, so
    /// a run on a snapshot of it blocks mutations through the API.
    graphs: Mutex<HashMap<GraphId, Graph>>,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        engine: EngineConfig,
        registry: Arc<UnitRegistry>,
        store: Arc<dyn GraphStore>,
        event_bus: Arc<EventBus>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            engine,
            registry,
            store,
            event_bus,
            shutdown,
            graphs: Mutex::new(HashMap::new()),
        }
    }

    pub fn executor(&self) -> GraphExecutor {
        GraphExecutor::new(self.engine.clone()).with_event_bus(self.event_bus.clone())
    }

    /// Build a graph from a definition (every structural check applies).
    pub fn build(&self, definition: &GraphDefinition) -> Result<Graph> {
        Graph::from_definition(definition, &self.registry)
    }

    async fn load(&self, id: &GraphId) -> Result<Graph> {
        let stored = self.store.get_graph(id).await?;
        debug!(graph_id = %id, "Graph loaded into cache");
        self.build(&stored.definition)
    }

    /// Snapshot of a graph plus a lease on it, taken under the cache lock so
    /// no mutation can slip in between.
    pub async fn checkout(&self, id: &GraphId) -> Result<(Graph, RunLease)> {
        let mut graphs = self.graphs.lock().await;
        if !graphs.contains_key(id) {
            let graph = self.load(id).await?;
            graphs.insert(id.clone(), graph);
        }
        let graph = graphs
            .get(id)
            .ok_or_else(|| FlowError::GraphNotFound(id.to_string()))?;
        let snapshot = graph.snapshot();
        let lease = snapshot.lease();
        Ok((snapshot, lease))
    }

    /// Apply a mutation to the cached graph and persist the result. A
    /// rejected mutation leaves both cache and store untouched; a failed
    /// write evicts the cache entry so the next access reloads from the store.
    pub async fn mutate<T>(
        &self,
        id: &GraphId,
        f: impl FnOnce(&mut Graph, &UnitRegistry) -> Result<T> + Send,
    ) -> Result<T> {
        let mut graphs = self.graphs.lock().await;
        if !graphs.contains_key(id) {
            let graph = self.load(id).await?;
            graphs.insert(id.clone(), graph);
        }
        let graph = graphs
            .get_mut(id)
            .ok_or_else(|| FlowError::GraphNotFound(id.to_string()))?;

        let value = f(graph, &self.registry)?;
        let definition = graph.to_definition();
        if let Err(e) = self.store.update_graph(id, &definition).await {
            graphs.remove(id);
            return Err(e);
        }
        Ok(value)
    }

    /// Replace a graph wholesale. Fails with `NodeInUse` while it is running.
    pub async fn replace(&self, id: &GraphId, definition: &GraphDefinition) -> Result<StoredGraph> {
        let graph = self.build(definition)?;
        let mut graphs = self.graphs.lock().await;
        ensure_idle(graphs.get(id), "replace graph")?;
        let stored = self.store.update_graph(id, definition).await?;
        graphs.insert(id.clone(), graph);
        Ok(stored)
    }

    /// Delete a graph and its runs. Fails with `NodeInUse` while it is running.
    pub async fn remove(&self, id: &GraphId) -> Result<()> {
        let mut graphs = self.graphs.lock().await;
        ensure_idle(graphs.get(id), "delete graph")?;
        self.store.delete_graph(id).await?;
        graphs.remove(id);
        Ok(())
    }
}

fn ensure_idle(graph: Option<&Graph>, operation: &str) -> Result<()> {
    match graph.map(Graph::active_runs) {
        Some(active_runs) if active_runs > 0 => Err(FlowError::NodeInUse {
            operation: operation.to_string(),
            active_runs,
        }),
        _ => Ok(()),
    }
}
