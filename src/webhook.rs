//! Chat platform webhook payloads.
//!
//! Only text messages become `InboundEvent`s; every other event or message
//! kind decodes into an ignored variant instead of failing the request.
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::relay::{EventSource, InboundEvent};

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookEvent {
    Message {
        message: MessageContent,
        // epoch milliseconds
        #[serde(default)]
        timestamp: Option<i64>,
        #[serde(default = "unknown_source")]
        source: EventSource,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: String },
    #[serde(other)]
    Other,
}

fn unknown_source() -> EventSource {
    EventSource::Unknown
}

fn received_at(timestamp: Option<i64>) -> DateTime<Utc> {
    timestamp
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}

impl WebhookPayload {
    /// Text messages in payload order
    pub fn into_events(self) -> Vec<InboundEvent> {
        self.events
            .into_iter()
            .filter_map(|event| match event {
                WebhookEvent::Message {
                    message: MessageContent::Text { text },
                    timestamp,
                    source,
                } => Some(InboundEvent::new(source, text, received_at(timestamp))),
                _ => None,
            })
            .collect()
    }
}
