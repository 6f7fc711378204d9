use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use dagflow_core::config::{EngineConfig, GatewayConfig};
use dagflow_core::event::EventBus;
use dagflow_core::traits::GraphStore;
use dagflow_engine::UnitRegistry;

use crate::routes;
use crate::state::AppState;

/// Build the API router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        // Graphs
        .route(
            "/api/graphs",
            post(routes::create_graph).get(routes::list_graphs),
        )
        .route(
            "/api/graphs/{id}",
            get(routes::get_graph)
                .put(routes::replace_graph)
                .delete(routes::delete_graph),
        )
        .route("/api/graphs/{id}/nodes", post(routes::add_node))
        .route("/api/graphs/{id}/nodes/{node}", delete(routes::remove_node))
        .route(
            "/api/graphs/{id}/edges",
            post(routes::add_edge).delete(routes::remove_edge),
        )
        .route("/api/graphs/{id}/toposort", post(routes::toposort))
        .route("/api/graphs/{id}/levels", post(routes::graph_levels))
        // Runs
        .route(
            "/api/graphs/{id}/runs",
            post(routes::start_run).get(routes::list_runs),
        )
        .route("/api/graphs/{id}/runs/{run_id}", get(routes::get_run))
        .route(
            "/api/graphs/{id}/runs/{run_id}/outputs",
            get(routes::run_outputs),
        )
        .route(
            "/api/graphs/{id}/runs/{run_id}/leaf-outputs",
            get(routes::leaf_outputs),
        )
        .route(
            "/api/graphs/{id}/runs/{run_id}/nodes/{node}/outputs",
            get(routes::node_outputs),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    engine: EngineConfig,
    registry: Arc<UnitRegistry>,
    store: Arc<dyn GraphStore>,
    event_bus: Arc<EventBus>,
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        engine: EngineConfig,
        registry: Arc<UnitRegistry>,
        store: Arc<dyn GraphStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            engine,
            registry,
            store,
            event_bus,
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState::new(
            self.config.clone(),
            self.engine.clone(),
            self.registry.clone(),
            self.store.clone(),
            self.event_bus.clone(),
            shutdown.clone(),
        ));
        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}
