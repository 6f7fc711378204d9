use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use dagflow_core::types::{
    EdgeDefinition, GraphDefinition, GraphId, NodeDefinition, RunId, RunResult, StoredGraph,
};
use dagflow_core::FlowError;
use dagflow_engine::scheduler::{levels, topological_order};
use dagflow_engine::{Edge, Node, RunConfig};

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Graphs ──────────────────────────────────────────────────────

// POST /api/graphs
pub async fn create_graph(
    State(state): State<Arc<AppState>>,
    Json(definition): Json<GraphDefinition>,
) -> ApiResult<(StatusCode, Json<StoredGraph>)> {
    // Build first so a structurally invalid definition is never stored.
    state.build(&definition)?;
    let stored = state.store.create_graph(&definition).await?;
    info!(graph_id = %stored.id, nodes = definition.nodes.len(), "Graph created");
    Ok((StatusCode::CREATED, Json(stored)))
}

// GET /api/graphs
pub async fn list_graphs(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let graphs = state.store.list_graphs().await?;
    Ok(Json(json!({ "graphs": graphs })))
}

// GET /api/graphs/{id}
pub async fn get_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StoredGraph>> {
    let stored = state.store.get_graph(&GraphId::from_string(&id)).await?;
    Ok(Json(stored))
}

// PUT /api/graphs/{id}
pub async fn replace_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(definition): Json<GraphDefinition>,
) -> ApiResult<Json<StoredGraph>> {
    let stored = state
        .replace(&GraphId::from_string(&id), &definition)
        .await?;
    Ok(Json(stored))
}

// DELETE /api/graphs/{id}
pub async fn delete_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.remove(&GraphId::from_string(&id)).await?;
    info!(graph_id = %id, "Graph deleted");
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/graphs/{id}/nodes
pub async fn add_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(def): Json<NodeDefinition>,
) -> ApiResult<(StatusCode, Json<NodeDefinition>)> {
    let added = state
        .mutate(&GraphId::from_string(&id), |graph, registry| {
            graph.add_node(Node::from_definition(&def, registry)?)?;
            Ok(def)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(added)))
}

// DELETE /api/graphs/{id}/nodes/{node}
pub async fn remove_node(
    State(state): State<Arc<AppState>>,
    Path((id, node)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state
        .mutate(&GraphId::from_string(&id), |graph, _| graph.remove_node(&node))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/graphs/{id}/edges
pub async fn add_edge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(def): Json<EdgeDefinition>,
) -> ApiResult<(StatusCode, Json<EdgeDefinition>)> {
    let added = state
        .mutate(&GraphId::from_string(&id), |graph, _| {
            graph.add_edge(Edge::from(def.clone()))?;
            Ok(def)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(added)))
}

// DELETE /api/graphs/{id}/edges
pub async fn remove_edge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(def): Json<EdgeDefinition>,
) -> ApiResult<StatusCode> {
    state
        .mutate(&GraphId::from_string(&id), |graph, _| {
            graph.remove_edge(&Edge::from(def))
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/graphs/{id}/toposort
pub async fn toposort(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(config): Json<RunConfig>,
) -> ApiResult<Json<Value>> {
    let (graph, _lease) = state.checkout(&GraphId::from_string(&id)).await?;
    config.validate(&graph)?;
    let order: Vec<String> = topological_order(&graph)?
        .into_iter()
        .filter(|node| config.is_enabled(node))
        .collect();
    Ok(Json(json!({ "order": order })))
}

// POST /api/graphs/{id}/levels
pub async fn graph_levels(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(config): Json<RunConfig>,
) -> ApiResult<Json<Value>> {
    let (graph, _lease) = state.checkout(&GraphId::from_string(&id)).await?;
    config.validate(&graph)?;
    let levels = levels(&graph, &|node| config.is_enabled(node))?;
    Ok(Json(json!({ "levels": levels })))
}

// ── Runs ────────────────────────────────────────────────────────

// POST /api/graphs/{id}/runs
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(config): Json<RunConfig>,
) -> ApiResult<(StatusCode, Json<RunResult>)> {
    let graph_id = GraphId::from_string(&id);
    let (graph, lease) = state.checkout(&graph_id).await?;

    let mut result = state
        .executor()
        .execute(&graph, &config, &state.shutdown.child_token())
        .await?;
    drop(lease);

    result.graph_id = Some(graph_id);
    state.store.save_run(&result).await?;
    info!(graph_id = %id, run_id = %result.run_id, status = %result.status, "Run recorded");
    Ok((StatusCode::CREATED, Json(result)))
}

// GET /api/graphs/{id}/runs
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let graph_id = GraphId::from_string(&id);
    // 404 for an unknown graph rather than an empty list.
    state.store.get_graph(&graph_id).await?;
    let runs = state.store.list_runs(&graph_id).await?;
    Ok(Json(json!({ "runs": runs })))
}

async fn load_run(state: &AppState, id: &str, run_id: &str) -> ApiResult<RunResult> {
    let run = state
        .store
        .get_run(&GraphId::from_string(id), &RunId::from_string(run_id))
        .await?;
    Ok(run)
}

// GET /api/graphs/{id}/runs/{run_id}
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path((id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<RunResult>> {
    Ok(Json(load_run(&state, &id, &run_id).await?))
}

// GET /api/graphs/{id}/runs/{run_id}/outputs
pub async fn run_outputs(
    State(state): State<Arc<AppState>>,
    Path((id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let run = load_run(&state, &id, &run_id).await?;
    Ok(Json(json!({ "run_id": run.run_id, "outputs": run.outputs() })))
}

// GET /api/graphs/{id}/runs/{run_id}/leaf-outputs
pub async fn leaf_outputs(
    State(state): State<Arc<AppState>>,
    Path((id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let run = load_run(&state, &id, &run_id).await?;
    Ok(Json(json!({ "run_id": run.run_id, "outputs": run.leaf_outputs() })))
}

// GET /api/graphs/{id}/runs/{run_id}/nodes/{node}/outputs
pub async fn node_outputs(
    State(state): State<Arc<AppState>>,
    Path((id, run_id, node)): Path<(String, String, String)>,
) -> ApiResult<Json<Value>> {
    let run = load_run(&state, &id, &run_id).await?;
    let report = run
        .nodes
        .get(&node)
        .ok_or_else(|| FlowError::NodeNotFound(node.clone()))?;
    Ok(Json(json!({
        "node": node,
        "status": report.status,
        "outputs": report.outputs,
    })))
}
