//! REST API route handlers.
//!
//! Snapshots are built under one read of the table and serialized after
//! the lock is released.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use seasky_core::snapshot::{delta_snapshot, full_snapshot, to_json};
use seasky_core::types::now_millis;

use crate::web::AppState;

fn json_response<T: Serialize>(value: &T, readable: bool) -> Response {
    match to_json(value, readable) {
        Ok(body) => ([(CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// GET /first: every track, including fixed entities and full history.
pub async fn first(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = full_snapshot(&state.table, now_millis(), &state.version);
    json_response(&snapshot, state.readable_json)
}

/// GET /update: mutable fields of live tracks.
pub async fn update(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = delta_snapshot(&state.table, now_millis());
    json_response(&snapshot, state.readable_json)
}

/// GET /status: per-source liveness and track counts.
pub async fn status(State(state): State<Arc<AppState>>) -> Response {
    let now = now_millis();
    let body = json!({
        "time": now,
        "version": state.version,
        "sources": state.liveness.statuses(now),
        "tracks": state.table.counts_by_type(),
        "ais_names": state.table.name_cache_len(),
    });
    json_response(&body, state.readable_json)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
