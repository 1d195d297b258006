//! Synchronizer HTTP server
//!
//! One worker (or the launcher) hosts this server; every worker is given its
//! address and talks to it over plain request/response.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use spectree_common::WorkerReport;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::aggregator::Aggregator;
use crate::error::SyncError;
use crate::protocol::{
    BeginRequest, BeginResponse, ErrorResponse, HealthResponse, AGGREGATE_PATH, BEGIN_PATH,
    END_PATH, UP_PATH,
};

/// Synchronizer for `parallel_total` workers
pub struct SyncServer {
    state: Arc<Aggregator>,
}

pub async fn serve(addr: SocketAddr, parallel_total: u32) -> anyhow::Result<()> {
    let server = SyncServer::new(parallel_total);
    server.serve(addr).await
}

impl SyncServer {
    pub fn new(parallel_total: u32) -> Self {
        Self {
            state: Arc::new(Aggregator::new(parallel_total)),
        }
    }

    /// Create router
    pub fn router(&self) -> Router {
        Router::new()
            .route(UP_PATH, get(up_handler).post(up_handler))
            .route(BEGIN_PATH, post(begin_handler))
            .route(END_PATH, post(end_handler))
            .route(AGGREGATE_PATH, get(aggregate_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until the process exits
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(
            "Synchronizer for {} node(s) listening on http://{}",
            self.state.parallel_total(),
            listener.local_addr()?
        );
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Bind and serve in the background; returns the bound address
    ///
    /// Binding to port 0 picks a free port.
    pub async fn spawn(self, addr: SocketAddr) -> Result<(SocketAddr, JoinHandle<()>), SyncError> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let router = self.router();
        info!("Synchronizer spawned on http://{}", local);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("Synchronizer error: {}", e);
            }
        });

        Ok((local, handle))
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn up_handler(State(state): State<Arc<Aggregator>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "spectree-sync".to_string(),
        parallel_total: state.parallel_total(),
    })
}

async fn begin_handler(
    State(state): State<Arc<Aggregator>>,
    Json(req): Json<BeginRequest>,
) -> Response {
    match state.begin(req.node) {
        Ok(suite_started_at) => (StatusCode::OK, Json(BeginResponse { suite_started_at })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn end_handler(
    State(state): State<Arc<Aggregator>>,
    Json(report): Json<WorkerReport>,
) -> Response {
    match state.report(report) {
        Ok(ack) => (StatusCode::ACCEPTED, Json(ack)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn aggregate_handler(State(state): State<Arc<Aggregator>>) -> Response {
    match state.wait_aggregate().await {
        Ok(aggregate) => (StatusCode::OK, Json(aggregate)).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: SyncError) -> Response {
    let status = match e {
        SyncError::NodeOutOfRange { .. } => StatusCode::BAD_REQUEST,
        SyncError::DuplicateReport(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}
