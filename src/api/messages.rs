use axum::{extract::State, Json};

use super::state::AppState;
use crate::subscribers::BroadcastMessage;

/// Recently accepted messages, oldest first
pub async fn recent_messages(State(state): State<AppState>) -> Json<Vec<BroadcastMessage>> {
    Json(state.engine.history().recent())
}
