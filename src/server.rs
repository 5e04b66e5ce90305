//! HTTP query endpoint.

use crate::ingest::FlightSource;
use crate::models::FlightMap;
use crate::scheduler::ViewSnapshot;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Source polled on every `/api/flights` request.
    pub source: Arc<dyn FlightSource>,
    /// Latest frame published by the scheduler.
    pub view: watch::Receiver<Arc<ViewSnapshot>>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/flights", get(flights))
        .route("/api/view", get(view))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn start<F>(bind_addr: &str, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Fresh poll of every source. Always 200, possibly with an empty map.
async fn flights(State(state): State<AppState>) -> Json<FlightMap> {
    let map = state.source.poll().await;
    debug!("Serving {} hours", map.len());
    Json(map)
}

async fn view(State(state): State<AppState>) -> Json<ViewSnapshot> {
    let snapshot = state.view.borrow().clone();
    Json(ViewSnapshot::clone(&snapshot))
}
