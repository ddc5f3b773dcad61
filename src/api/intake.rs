use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, event, instrument, Level};

use super::state::AppState;
use crate::api_error;
use crate::error::Result;
use crate::relay::InboundEvent;
use crate::webhook::WebhookPayload;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub text: Option<String>,
}

/// Chat platform webhook: every text message is relayed in payload order
#[instrument(skip(state, body), level = "debug")]
pub async fn webhook(State(state): State<AppState>, body: Bytes) -> Result<Json<StatusResponse>> {
    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|err| {
        event!(
            Level::ERROR,
            message = "Rejected webhook payload",
            err = format!("{:?}", err)
        );
        api_error!("Invalid JSON: {}", err)
    })?;

    let report = state.engine.process_batch(payload.into_events());
    debug!(
        "Relayed batch: {} events, {} broadcast, {} rate limited",
        report.events, report.broadcast, report.rate_limited
    );
    Ok(Json(StatusResponse::ok()))
}

/// Viewer intake: the message has no sender identity and is always broadcast
#[instrument(skip(state, body), level = "debug")]
pub async fn post_message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse>> {
    let message: NewMessage =
        serde_json::from_slice(&body).map_err(|err| api_error!("Invalid JSON: {}", err))?;
    let text = match message.text {
        Some(text) if !text.is_empty() => text,
        _ => return Err(api_error!("Missing text field")),
    };

    state
        .engine
        .process_batch(vec![InboundEvent::anonymous(text)]);
    Ok(Json(StatusResponse::ok()))
}
