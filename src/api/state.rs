use std::sync::Arc;

use tokio::sync::watch;

use crate::emitter::EmitterStats;
use crate::relay::RelayEngine;
use crate::transport::TransportStats;

/// Shared by every handler
#[derive(Clone, Debug)]
pub struct AppState {
    pub engine: Arc<RelayEngine>,
    pub emitter_stats: Arc<EmitterStats>,
    pub transport_stats: Arc<TransportStats>,
    // flips to true when the server starts draining
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        engine: Arc<RelayEngine>,
        emitter_stats: Arc<EmitterStats>,
        transport_stats: Arc<TransportStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            engine,
            emitter_stats,
            transport_stats,
            shutdown,
        }
    }
}
