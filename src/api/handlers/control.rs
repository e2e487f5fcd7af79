use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::AppState;

/// POST /api/control/pause: Stop admitting new entries. Exits keep running.
pub async fn pause(State(state): State<AppState>) -> impl IntoResponse {
    state.status.gate().pause();
    tracing::warn!("Entries PAUSED via control API");
    (StatusCode::OK, Json(json!({ "status": "paused" })))
}

/// POST /api/control/resume: Resume admitting entries.
pub async fn resume(State(state): State<AppState>) -> impl IntoResponse {
    state.status.gate().resume();
    tracing::info!("Entries RESUMED via control API");
    (StatusCode::OK, Json(json!({ "status": "running" })))
}

/// GET /api/control/status: Current system status.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.status.snapshot().await;
    let mode = if snapshot.live { "live" } else { "dry_run" };

    Json(json!({
        "mode": mode,
        "wallet": snapshot.wallet,
        "balance_sol": snapshot.balance_sol,
        "dry_run": snapshot.dry_run,
        "live": snapshot.live,
        "open_positions": snapshot.open_positions,
        "exposure_sol": snapshot.exposure_sol,
        "feed_connected": snapshot.feed_connected,
        "paused": snapshot.entries_paused,
    }))
}
