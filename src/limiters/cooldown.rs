//! Per-sender cooldown gate.
//!
//! A sender is accepted if it has never been seen, or if at least one full
//! window has passed since its last *accepted* event. Rejected events never
//! move the window forward, so a burst cannot keep a sender locked out longer
//! than one window past its last accepted event.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::settings;

/// Outcome of a limiter check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    RateLimited {
        // time left until the sender's window reopens
        retry_after: chrono::Duration,
    },
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }
}

/// Each limited sender is stored in here with the time of its last accepted event.
#[derive(Debug)]
pub struct RateLimiter {
    settings: settings::RateLimitSettings,
    last_accepted: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(rate_limit_settings: settings::RateLimitSettings) -> Self {
        Self {
            settings: rate_limit_settings,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_settings(&self) -> &settings::RateLimitSettings {
        &self.settings
    }

    /// Check the sender against its window and record `now` if accepted.
    /// The read-check-write happens under a single lock.
    pub fn check_and_update(&self, sender_id: &str, now: DateTime<Utc>) -> Decision {
        let window = self.settings.window();
        let mut last_accepted = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match last_accepted.get_mut(sender_id) {
            None => {
                last_accepted.insert(sender_id.to_string(), now);
                Decision::Accepted
            }
            Some(last) => {
                let elapsed = now - *last;
                if elapsed >= window {
                    *last = now;
                    Decision::Accepted
                } else {
                    Decision::RateLimited {
                        retry_after: window - elapsed,
                    }
                }
            }
        }
    }

    /// Time of the sender's last accepted event, if tracked
    pub fn last_accepted_at(&self, sender_id: &str) -> Option<DateTime<Utc>> {
        self.last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sender_id)
            .copied()
    }

    /// Drop every sender whose window has already elapsed at `now`.
    /// Such a sender would be accepted anyway, so no decision changes.
    /// Returns the number of entries removed.
    pub fn expire_keys(&self, now: DateTime<Utc>) -> usize {
        let window = self.settings.window();
        let mut last_accepted = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = last_accepted.len();
        last_accepted.retain(|_sender, last| now - *last < window);
        before - last_accepted.len()
    }

    pub fn len(&self) -> usize {
        self.last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodically evict expired senders until `shutdown` flips or its sender is dropped.
pub fn spawn_expiry_sweeper(
    limiter: Arc<RateLimiter>,
    every: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let removed = limiter.expire_keys(Utc::now());
                    if removed > 0 {
                        debug!("Expired {} idle senders, {} still tracked", removed, limiter.len());
                    }
                }
            }
        }
        info!("Rate limiter sweeper stopped");
    })
}
