//! Health and statistics endpoints.

use axum::{extract::State, Json};
use synchub_shared::{HealthReport, StatsReport};

use crate::state::AppState;

/// Liveness probe, also served at `/`
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.hub.stats().health())
}

/// Counters plus the number of currently registered devices
pub async fn stats(State(state): State<AppState>) -> Json<StatsReport> {
    let registered = state.hub.registry().count().await;
    Json(state.hub.stats().report(registered))
}
