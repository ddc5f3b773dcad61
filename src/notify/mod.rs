//! Downstream notification of rate-limited senders.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{RelayError, Result};
use crate::settings::NotifierSettings;

/// Sends a text notice back to one sender
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, sender_id: &str, message: &str) -> Result<()>;
}

#[derive(Serialize)]
struct PushMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: [PushMessage<'a>; 1],
}

/// Push-API client for the chat platform
#[derive(Clone, Debug)]
pub struct LinePushNotifier {
    client: reqwest::Client,
    push_api_url: String,
    channel_access_token: String,
}

impl LinePushNotifier {
    pub fn new(push_api_url: impl Into<String>, channel_access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            push_api_url: push_api_url.into(),
            channel_access_token: channel_access_token.into(),
        }
    }
}

#[async_trait]
impl Notifier for LinePushNotifier {
    async fn notify(&self, sender_id: &str, message: &str) -> Result<()> {
        let body = PushRequest {
            to: sender_id,
            messages: [PushMessage {
                kind: "text",
                text: message,
            }],
        };
        let resp = self
            .client
            .post(self.push_api_url.as_str())
            .bearer_auth(&self.channel_access_token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(RelayError::Notify(format!(
                "Push to {} rejected with {}: {}",
                sender_id, status, detail
            )));
        }
        debug!("Pushed rate-limit notice to {}", sender_id);
        Ok(())
    }
}

/// Logs notices instead of sending them; used when no access token is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, sender_id: &str, message: &str) -> Result<()> {
        info!("Notice for {}: {}", sender_id, message);
        Ok(())
    }
}

pub fn from_settings(settings: &NotifierSettings) -> Arc<dyn Notifier> {
    match settings.channel_access_token.as_deref() {
        Some(token) if !token.is_empty() => Arc::new(LinePushNotifier::new(
            settings.push_api_url.clone(),
            token,
        )),
        _ => {
            info!("No channel access token configured; rate-limit notices will only be logged");
            Arc::new(LogNotifier)
        }
    }
}
