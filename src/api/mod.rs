mod admin;
mod base;
mod events;
mod intake;
mod messages;

pub mod paths;
pub mod state;

use std::borrow::Cow;

use axum::{
    error_handling::HandleErrorLayer, extract::DefaultBodyLimit, http::StatusCode,
    response::IntoResponse, routing, Router,
};
use tokio::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

pub use admin::StatsResponse;
pub use intake::StatusResponse;
pub use state::AppState;

// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the relay HTTP API
pub fn api(state: AppState) -> Router {
    Router::new()
        .route(paths::base::ROOT, routing::get(base::root))
        .route(paths::base::HEALTH, routing::get(base::health))
        .route(paths::base::ABOUT, routing::get(base::about))
        // Inbound events
        .route(paths::intake::WEBHOOK, routing::post(intake::webhook))
        .route(paths::intake::WEBHOOK_LEGACY, routing::post(intake::webhook))
        .route(paths::intake::MESSAGE, routing::post(intake::post_message))
        // Subscribers
        .route(paths::stream::EVENTS, routing::get(events::events))
        .route(paths::stream::EVENTS_LEGACY, routing::get(events::events))
        .route(paths::MESSAGES, routing::get(messages::recent_messages))
        // Operations
        .route(paths::STATS, routing::get(admin::stats))
        .route(paths::EXPIRE_KEYS, routing::post(admin::expire_keys))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(Duration::from_secs(10)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("Unhandled internal error: {}", error)),
    )
}
