use serde::Serialize;
use tracing::instrument;

use super::paths;
use crate::settings::{APP_NAME, APP_VERSION};

pub async fn root() -> &'static str {
    "chatrelay: POST chat webhooks to /webhook, stream broadcasts from /events"
}

pub async fn health() -> &'static str {
    "OK"
}

/// Service identity plus the endpoints a chat viewer needs
#[derive(Debug, Serialize)]
pub struct AboutResponse {
    name: &'static str,
    version: &'static str,
    webhook: &'static str,
    events: &'static str,
}

#[instrument]
pub async fn about() -> axum::Json<AboutResponse> {
    axum::Json(AboutResponse {
        name: APP_NAME,
        version: APP_VERSION,
        webhook: paths::intake::WEBHOOK,
        events: paths::stream::EVENTS,
    })
}
