//! Per-event orchestration: count, gate, then broadcast or notify.
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info_span, warn};
use tracing_futures::Instrument;

use crate::aggregate::AggregateStore;
use crate::limiters::{Decision, RateLimiter};
use crate::notify::Notifier;
use crate::settings::{CountingPolicy, Settings};
use crate::subscribers::{BroadcastMessage, MessageHistory, SubscriberRegistry};

pub mod event;

pub use event::{EventSource, InboundEvent};

/// What happened to a single event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Broadcast { delivered: usize },
    RateLimited,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub events: usize,
    pub broadcast: usize,
    pub rate_limited: usize,
    pub counted: usize,
}

pub struct RelayEngine {
    limiter: Arc<RateLimiter>,
    aggregate: Arc<AggregateStore>,
    subscribers: Arc<SubscriberRegistry>,
    history: Arc<MessageHistory>,
    notifier: Arc<dyn Notifier>,
    counting: CountingPolicy,
    notice: String,
}

impl std::fmt::Debug for RelayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayEngine")
            .field("counting", &self.counting)
            .field("tracked_senders", &self.limiter.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl RelayEngine {
    pub fn new(
        limiter: Arc<RateLimiter>,
        aggregate: Arc<AggregateStore>,
        subscribers: Arc<SubscriberRegistry>,
        history: Arc<MessageHistory>,
        notifier: Arc<dyn Notifier>,
        counting: CountingPolicy,
        notice: impl Into<String>,
    ) -> Self {
        Self {
            limiter,
            aggregate,
            subscribers,
            history,
            notifier,
            counting,
            notice: notice.into(),
        }
    }

    /// Build the engine and its collaborators from settings
    pub fn from_settings(settings: &Settings, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(
            Arc::new(RateLimiter::new(settings.rate_limit.clone())),
            Arc::new(AggregateStore::new(&settings.aggregate_mode)),
            Arc::new(SubscriberRegistry::new(settings.subscriber_buffer)),
            Arc::new(MessageHistory::new(settings.history_size)),
            notifier,
            settings.counting_policy,
            settings.rate_limit_notice(),
        )
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    pub fn aggregate(&self) -> Arc<AggregateStore> {
        self.aggregate.clone()
    }

    pub fn subscribers(&self) -> Arc<SubscriberRegistry> {
        self.subscribers.clone()
    }

    /// Accepted messages, whether or not anyone was subscribed
    pub fn history(&self) -> Arc<MessageHistory> {
        self.history.clone()
    }

    pub fn counting_policy(&self) -> CountingPolicy {
        self.counting
    }

    /// Process one inbound batch in arrival order
    pub fn process_batch(&self, events: Vec<InboundEvent>) -> BatchReport {
        let mut report = BatchReport::default();
        for event in events {
            report.events += 1;
            let (outcome, counted) = self.process_event(event);
            if counted {
                report.counted += 1;
            }
            match outcome {
                EventOutcome::Broadcast { .. } => report.broadcast += 1,
                EventOutcome::RateLimited => report.rate_limited += 1,
            }
        }
        report
    }

    /// Returns the outcome and whether the event reached the aggregate
    pub fn process_event(&self, event: InboundEvent) -> (EventOutcome, bool) {
        let mut counted = false;
        if self.counting == CountingPolicy::Always {
            counted = self.aggregate.record(&event.text, event.received_at);
        }

        let decision = match event.sender_id() {
            Some(sender_id) => self.limiter.check_and_update(sender_id, event.received_at),
            None => Decision::Accepted,
        };

        match decision {
            Decision::Accepted => {
                if self.counting == CountingPolicy::AcceptedOnly {
                    counted = self.aggregate.record(&event.text, event.received_at);
                }
                let message = BroadcastMessage::now(event.text);
                self.history.remember(&message);
                let report = self.subscribers.broadcast(&message);
                (
                    EventOutcome::Broadcast {
                        delivered: report.delivered,
                    },
                    counted,
                )
            }
            Decision::RateLimited { retry_after } => {
                if let Some(sender_id) = event.sender_id() {
                    debug!(
                        "Rate limited {} (retry in {}s)",
                        sender_id,
                        retry_after.num_seconds()
                    );
                    self.spawn_notice(sender_id);
                }
                (EventOutcome::RateLimited, counted)
            }
        }
    }

    fn spawn_notice(&self, sender_id: &str) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No runtime available; dropping notice for {}", sender_id);
                return;
            }
        };
        let notifier = self.notifier.clone();
        let sender = sender_id.to_string();
        let notice = self.notice.clone();
        let span = info_span!("notify", sender = %sender);
        handle.spawn(
            async move {
                if let Err(e) = notifier.notify(&sender, &notice).await {
                    warn!("Failed to notify {}: {}", sender, e);
                }
            }
            .instrument(span),
        );
    }
}
