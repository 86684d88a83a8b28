//! Web server: axum JSON API over the live track table.
//!
//! Clients call `/first` once for every track with its history, then poll
//! `/update` for the mutable fields of live tracks.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use http::header::{HeaderValue, CACHE_CONTROL};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use seasky_core::liveness::LivenessRegistry;
use seasky_core::table::TrackTable;

pub mod routes;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub table: Arc<TrackTable>,
    pub liveness: Arc<LivenessRegistry>,
    /// Reported in the full snapshot.
    pub version: String,
    /// Pretty-print JSON responses.
    pub readable_json: bool,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/first", get(routes::first))
        .route("/update", get(routes::update))
        .route("/status", get(routes::status))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(cors)
}

/// Serve until the shutdown channel flips.
pub async fn serve(
    state: Arc<AppState>,
    host: &str,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(addr = %addr, "web server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}
