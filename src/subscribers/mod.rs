//! Dynamic set of live broadcast destinations.
//!
//! Membership changes and broadcasts may run concurrently. A broadcast works
//! on a copy of the membership taken under the read lock, delivers to each
//! subscriber independently, then prunes the ones that failed.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

pub mod handle;
pub mod history;

pub use handle::{BroadcastMessage, DeliveryError, SubscriberHandle, SubscriberId};
pub use history::MessageHistory;

/// Result of one broadcast call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

#[derive(Debug, Default)]
pub struct RegistryStats {
    pub broadcasts: AtomicU64,
    pub deliveries: AtomicU64,
    pub pruned: AtomicU64,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct FrozenRegistryStats {
    pub subscribers: usize,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub pruned: u64,
}

#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, SubscriberHandle>>,
    // queue depth for subscriptions opened through `subscribe`
    buffer: usize,
    stats: RegistryStats,
}

impl SubscriberRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            buffer,
            stats: RegistryStats::default(),
        }
    }

    /// Add a handle. Re-registering the same handle is a no-op and a closed
    /// handle can never come back; both return false.
    pub fn register(&self, handle: SubscriberHandle) -> bool {
        if handle.is_closed() {
            debug!("Refusing to register closed {}", handle.id());
            return false;
        }
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if subscribers.contains_key(&handle.id()) {
            return false;
        }
        debug!("Registered {}", handle.id());
        subscribers.insert(handle.id(), handle);
        true
    }

    /// Remove and close a handle; no-op if absent.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match removed {
            Some(handle) => {
                handle.close();
                debug!("Unregistered {}", id);
                true
            }
            None => false,
        }
    }

    /// Open a subscription: a fresh registered handle plus the receiving side,
    /// which unregisters itself when dropped.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (handle, rx) = SubscriberHandle::channel(self.buffer);
        let id = handle.id();
        self.register(handle);
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(self),
        }
    }

    /// Deliver `message` to every registered subscriber and prune the ones
    /// whose delivery failed. Without subscribers this is a no-op.
    pub fn broadcast(&self, message: &BroadcastMessage) -> BroadcastReport {
        let targets: Vec<SubscriberHandle> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for target in &targets {
            match target.try_deliver(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    debug!("Dropping {}: {}", target.id(), err);
                    failed.push(target.id());
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for id in failed {
                if let Some(handle) = subscribers.remove(&id) {
                    handle.close();
                    report.pruned += 1;
                }
            }
        }

        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats
            .deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.stats
            .pruned
            .fetch_add(report.pruned as u64, Ordering::Relaxed);
        report
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_stats(&self) -> FrozenRegistryStats {
        FrozenRegistryStats {
            subscribers: self.len(),
            broadcasts: self.stats.broadcasts.load(Ordering::Relaxed),
            deliveries: self.stats.deliveries.load(Ordering::Relaxed),
            pruned: self.stats.pruned.load(Ordering::Relaxed),
        }
    }
}

/// Receiving side of a registry subscription, owned by the connection
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<BroadcastMessage>,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next broadcast message; `None` once the subscriber has been pruned or unregistered
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BroadcastMessage> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}
