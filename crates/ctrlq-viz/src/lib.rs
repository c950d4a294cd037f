//! Ctrl-Q Task Network Server
//!
//! Axum server exposing the task graph as JSON for the visualization
//! front-end. A read-only snapshot of the graph is taken at startup.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use ctrlq_graph::TaskGraph;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// One node of the network payload.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkNode {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub enabled: bool,
    pub scheduled: bool,
    pub last_status: Option<String>,
}

/// One edge of the network payload.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkEdge {
    pub from: Uuid,
    pub to: Uuid,
    pub state: String,
    pub event_id: Uuid,
}

/// The full task network, as served to the front-end.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkPayload {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

/// Project a graph snapshot into the wire payload.
pub fn build_network(graph: &TaskGraph) -> NetworkPayload {
    let mut nodes: Vec<NetworkNode> = graph
        .tasks()
        .map(|node| NetworkNode {
            id: node.id,
            name: node.name.clone(),
            kind: node.kind.as_str().to_string(),
            enabled: node.enabled,
            scheduled: !node.schedule_triggers.is_empty(),
            last_status: node.last_status.clone(),
        })
        .collect();
    nodes.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let edges: Vec<NetworkEdge> = graph
        .edges()
        .map(|edge| NetworkEdge {
            from: edge.upstream,
            to: edge.downstream,
            state: edge.state.as_str().to_string(),
            event_id: edge.event_id,
        })
        .collect();

    NetworkPayload { nodes, edges }
}

/// Create the application router.
pub fn create_router(payload: Arc<NetworkPayload>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/network", get(get_network))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(payload)
}

async fn get_network(State(payload): State<Arc<NetworkPayload>>) -> Json<NetworkPayload> {
    Json(payload.as_ref().clone())
}

async fn healthz() -> &'static str {
    "ok"
}

/// Run the visualization server until the process exits.
pub async fn run_server(graph: &TaskGraph, port: u16) -> anyhow::Result<()> {
    let payload = Arc::new(build_network(graph));
    let app = create_router(payload);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("task network server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}
