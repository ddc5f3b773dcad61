use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Where an inbound chat message came from
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventSource {
    User {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Group {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
    Room {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
    /// No usable identity; the event is anonymous
    #[serde(other)]
    Unknown,
}

impl EventSource {
    /// Identity the rate limiter gates on, if any
    pub fn sender_id(&self) -> Option<&str> {
        let id = match self {
            EventSource::User { user_id } => Some(user_id.as_str()),
            EventSource::Group { user_id, .. } | EventSource::Room { user_id, .. } => {
                user_id.as_deref()
            }
            EventSource::Unknown => None,
        };
        id.filter(|id| !id.is_empty())
    }
}

/// One chat message as the relay sees it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    pub source: EventSource,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(source: EventSource, text: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            source,
            text: text.into(),
            received_at,
        }
    }

    pub fn from_user(
        user_id: impl Into<String>,
        text: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            EventSource::User {
                user_id: user_id.into(),
            },
            text,
            received_at,
        )
    }

    /// An event without sender identity, received now
    pub fn anonymous(text: impl Into<String>) -> Self {
        Self::new(EventSource::Unknown, text, Utc::now())
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.source.sender_id()
    }
}
