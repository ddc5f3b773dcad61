//! Subscriber handles.
//!
//! A subscriber is split in two: the `SubscriberHandle` (sending side) is what
//! the registry keeps, the receiving side is owned by the connection. The
//! registry never keeps a connection alive; once the receiving side is gone
//! every delivery fails and the handle is pruned.
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// One push event delivered to every subscriber
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub text: String,
    // ISO-8601
    pub timestamp: String,
}

impl BroadcastMessage {
    pub fn new(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    pub fn now(text: impl Into<String>) -> Self {
        Self::new(text, Utc::now())
    }
}

/// Why a delivery attempt failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryError {
    /// Handle was unregistered or already failed once
    Closed,
    /// Receiving side no longer exists
    Disconnected,
    /// Receiving side stopped draining its queue
    Lagging,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Closed => write!(f, "subscriber closed"),
            DeliveryError::Disconnected => write!(f, "connection gone"),
            DeliveryError::Lagging => write!(f, "subscriber queue full"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Sending side of a subscriber. `Open` until closed; closing is terminal.
#[derive(Clone, Debug)]
pub struct SubscriberHandle {
    id: SubscriberId,
    tx: mpsc::Sender<BroadcastMessage>,
    closed: Arc<AtomicBool>,
}

impl SubscriberHandle {
    /// Create a new handle and the receiver the connection layer keeps.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<BroadcastMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: SubscriberId::next(),
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (handle, rx)
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Queue a message without waiting
    pub fn try_deliver(&self, message: BroadcastMessage) -> Result<(), DeliveryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Lagging,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }
}
