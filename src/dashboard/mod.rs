use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::cluster::Cluster;
use crate::protocol::NodeId;

#[derive(Clone)]
pub struct DashboardState {
    pub cluster: Arc<Cluster>,
}

#[derive(Serialize)]
struct CreateNodeResponse {
    success: bool,
    node_id: Option<NodeId>,
    error: Option<String>,
}

#[derive(Serialize)]
struct DeposeResponse {
    success: bool,
    deposed: Option<NodeId>,
    successor: Option<NodeId>,
    discarded: Vec<NodeId>,
    error: Option<String>,
}

/// Routes for inspecting the cluster and injecting membership changes.
pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/cluster", get(cluster_status_handler))
        .route("/api/nodes", post(create_node_handler))
        .route("/api/coordinator/depose", post(depose_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the dashboard until `shutdown` is cancelled.
pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn cluster_status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.cluster.snapshot().await)
}

async fn create_node_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.cluster.create_node().await {
        Ok(node_id) => (
            StatusCode::CREATED,
            Json(CreateNodeResponse {
                success: true,
                node_id: Some(node_id),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(CreateNodeResponse {
                success: false,
                node_id: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

async fn depose_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.cluster.depose_coordinator().await {
        Some(deposition) => (
            StatusCode::OK,
            Json(DeposeResponse {
                success: true,
                deposed: Some(deposition.deposed),
                successor: deposition.successor,
                discarded: deposition.discarded,
                error: None,
            }),
        ),
        None => (
            StatusCode::CONFLICT,
            Json(DeposeResponse {
                success: false,
                deposed: None,
                successor: None,
                discarded: Vec::new(),
                error: Some("No coordinator to depose".to_string()),
            }),
        ),
    }
}
