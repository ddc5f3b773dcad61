use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use super::state::AppState;
use crate::emitter::FrozenEmitterStats;
use crate::subscribers::FrozenRegistryStats;
use crate::transport::FrozenTransportStats;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub subscribers: usize,
    pub tracked_senders: usize,
    pub pending_events: u64,
    pub counting_policy: String,
    pub broadcast: FrozenRegistryStats,
    pub emitter: FrozenEmitterStats,
    pub transport: FrozenTransportStats,
}

#[instrument(skip(state), level = "debug")]
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let registry = state.engine.subscribers().get_stats();
    Json(StatsResponse {
        subscribers: registry.subscribers,
        tracked_senders: state.engine.limiter().len(),
        pending_events: state.engine.aggregate().pending(),
        counting_policy: state.engine.counting_policy().to_string(),
        broadcast: registry,
        emitter: state.emitter_stats.freeze(),
        transport: state.transport_stats.freeze(),
    })
}

#[instrument(skip(state), level = "debug")]
pub async fn expire_keys(State(state): State<AppState>) -> StatusCode {
    let removed = state.engine.limiter().expire_keys(Utc::now());
    info!("Expired {} idle senders on request", removed);
    StatusCode::OK
}
