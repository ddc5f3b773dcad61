//! Periodic emission of aggregate snapshots.
//!
//! Every tick drains the aggregate store and ships the snapshot as one
//! datagram. A failed send closes the link and triggers exactly one immediate
//! reconnect (and resend). If that fails too, the emitter waits for the
//! cooldown instead of the regular interval before trying again. A snapshot
//! that encodes larger than one datagram is dropped. Transport errors never
//! stop the loop; only the shutdown signal does, even mid-send.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::aggregate::{AggregateStore, Snapshot};
use crate::error::Result;
use crate::settings::EmitterSettings;
use crate::transport::{DatagramConnector, DatagramLink};

/// What a single tick did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Empty snapshot, nothing sent
    Skipped,
    /// Sent on the existing link
    Sent { bytes: usize },
    /// First send failed, sent after reconnecting
    Recovered { bytes: usize },
    /// Nothing sent; wait for the cooldown
    Cooldown,
    /// Encoded snapshot larger than one datagram; dropped
    Oversized { bytes: usize },
}

enum Prepared {
    Done(TickOutcome),
    Ready { snapshot: Snapshot, payload: Vec<u8> },
}

#[derive(Debug, Default)]
pub struct EmitterStats {
    pub ticks: AtomicU64,
    pub sent: AtomicU64,
    pub skipped: AtomicU64,
    pub send_failures: AtomicU64,
    pub reconnects: AtomicU64,
    pub reconnect_failures: AtomicU64,
    pub restored: AtomicU64,
    pub dropped: AtomicU64,
}

impl EmitterStats {
    pub fn freeze(&self) -> FrozenEmitterStats {
        FrozenEmitterStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            reconnect_failures: self.reconnect_failures.load(Ordering::Relaxed),
            restored: self.restored.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FrozenEmitterStats {
    pub ticks: u64,
    pub sent: u64,
    pub skipped: u64,
    pub send_failures: u64,
    pub reconnects: u64,
    pub reconnect_failures: u64,
    pub restored: u64,
    pub dropped: u64,
}

pub struct PeriodicEmitter {
    store: Arc<AggregateStore>,
    connector: Arc<dyn DatagramConnector>,
    settings: EmitterSettings,
    link: Option<Box<dyn DatagramLink>>,
    stats: Arc<EmitterStats>,
}

impl std::fmt::Debug for PeriodicEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicEmitter")
            .field("destination", &self.connector.destination())
            .field("interval", &self.settings.interval)
            .field("cooldown", &self.settings.cooldown)
            .field("connected", &self.link.is_some())
            .finish()
    }
}

impl PeriodicEmitter {
    pub fn new(
        store: Arc<AggregateStore>,
        connector: Arc<dyn DatagramConnector>,
        settings: EmitterSettings,
    ) -> Self {
        Self {
            store,
            connector,
            settings,
            link: None,
            stats: Arc::new(EmitterStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<EmitterStats> {
        self.stats.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Drain the store and try to ship the snapshot once.
    pub async fn tick(&mut self) -> TickOutcome {
        match self.prepare() {
            Prepared::Done(outcome) => outcome,
            Prepared::Ready { snapshot, payload } => {
                let outcome = self.deliver(&payload).await;
                self.settle(snapshot, outcome)
            }
        }
    }

    /// Drain the store and encode the snapshot, or decide there is nothing to send.
    fn prepare(&mut self) -> Prepared {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.store.snapshot_and_reset();
        let always_send = matches!(snapshot, Snapshot::Vocabulary(_));
        if self.settings.skip_empty_snapshots && !always_send && snapshot.is_empty() {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return Prepared::Done(TickOutcome::Skipped);
        }

        let payload = match snapshot.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode snapshot: {}", e);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                return Prepared::Done(TickOutcome::Skipped);
            }
        };

        // no retry could ever send it, so it is not restored
        let limit = self.connector.max_datagram_size();
        if payload.len() > limit {
            error!(
                "Dropping {} byte snapshot ({} events): exceeds {} byte datagram limit",
                payload.len(),
                snapshot.total(),
                limit
            );
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return Prepared::Done(TickOutcome::Oversized {
                bytes: payload.len(),
            });
        }

        Prepared::Ready { snapshot, payload }
    }

    /// Send on the current link, reconnecting and resending once on failure.
    async fn deliver(&mut self, payload: &[u8]) -> TickOutcome {
        let link = match self.link.take() {
            Some(link) => link,
            None => match self.connector.connect().await {
                Ok(link) => {
                    info!("Connected aggregate link to {}", self.connector.destination());
                    link
                }
                Err(e) => {
                    error!(
                        "Failed to connect to {}: {}",
                        self.connector.destination(),
                        e
                    );
                    self.stats.reconnect_failures.fetch_add(1, Ordering::Relaxed);
                    return TickOutcome::Cooldown;
                }
            },
        };

        match link.send(payload).await {
            Ok(bytes) => {
                self.link = Some(link);
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                return TickOutcome::Sent { bytes };
            }
            Err(e) => {
                warn!("Snapshot send failed, reconnecting: {}", e);
                self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
                // dropping the link closes it
                drop(link);
            }
        }

        self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
        let link = match self.connector.connect().await {
            Ok(link) => link,
            Err(e) => {
                error!(
                    "Failed to re-establish link to {}: {}",
                    self.connector.destination(),
                    e
                );
                self.stats.reconnect_failures.fetch_add(1, Ordering::Relaxed);
                return TickOutcome::Cooldown;
            }
        };

        match link.send(payload).await {
            Ok(bytes) => {
                info!("Re-established aggregate link to {}", self.connector.destination());
                self.link = Some(link);
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Recovered { bytes }
            }
            Err(e) => {
                error!("Snapshot send failed after reconnect: {}", e);
                self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Cooldown
            }
        }
    }

    fn settle(&self, snapshot: Snapshot, outcome: TickOutcome) -> TickOutcome {
        match outcome {
            TickOutcome::Cooldown => self.unsent(snapshot),
            TickOutcome::Sent { bytes } | TickOutcome::Recovered { bytes } => {
                debug!("Sent {} byte snapshot ({} events)", bytes, snapshot.total())
            }
            _ => {}
        }
        outcome
    }

    fn unsent(&self, snapshot: Snapshot) {
        let events = snapshot.total();
        if self.settings.retain_failed_snapshots && self.store.restore(snapshot) {
            self.stats.restored.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!("Dropping unsent snapshot ({} events)", events);
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Run ticks until `shutdown` flips to true or its sender is dropped.
    ///
    /// A shutdown that arrives while a snapshot is in flight abandons the
    /// send; the snapshot is then retained or dropped like any unsent one.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Emitting aggregates to {} every {}ms",
            self.connector.destination(),
            self.settings.interval.as_millis()
        );

        while !*shutdown.borrow() {
            let outcome = match self.prepare() {
                Prepared::Done(outcome) => outcome,
                Prepared::Ready { snapshot, payload } => {
                    let delivered = tokio::select! {
                        outcome = self.deliver(&payload) => Some(outcome),
                        _ = shutdown.changed() => None,
                    };
                    match delivered {
                        Some(outcome) => self.settle(snapshot, outcome),
                        None => {
                            info!("Shutdown while emitting; snapshot not sent");
                            self.unsent(snapshot);
                            break;
                        }
                    }
                }
            };

            let delay = match outcome {
                TickOutcome::Cooldown => {
                    warn!(
                        "Aggregate link down, next attempt in {}ms",
                        self.settings.cooldown.as_millis()
                    );
                    self.settings.cooldown
                }
                _ => self.settings.interval,
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if self.link.take().is_some() {
            debug!("Closed aggregate link to {}", self.connector.destination());
        }
        info!("Aggregate emitter stopped");
    }

    /// Spawn the emitter loop on the runtime
    pub fn start(self) -> EmitterHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = self.stats();
        let join = tokio::spawn(self.run(shutdown_rx));
        EmitterHandle {
            shutdown_tx,
            join,
            stats,
        }
    }
}

/// Handle to a running emitter
#[derive(Debug)]
pub struct EmitterHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: Arc<EmitterStats>,
}

impl EmitterHandle {
    pub fn stats(&self) -> Arc<EmitterStats> {
        self.stats.clone()
    }

    /// Signal the loop to stop and wait until it has closed its link
    pub async fn shutdown(self) -> Result<()> {
        // the loop may already be gone; a closed channel is fine
        let _ = self.shutdown_tx.send(true);
        self.join.await?;
        Ok(())
    }
}
