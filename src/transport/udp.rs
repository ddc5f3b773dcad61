//! UDP Transport Implementation
//!
//! Fire-and-forget datagrams to a single destination. The socket is bound to
//! an ephemeral local port and connected, so send errors reported by the OS
//! (e.g. ICMP port unreachable) surface on the next send.
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, warn};

use super::stats::TransportStats;
use super::traits::{DatagramConnector, DatagramLink, MAX_DATAGRAM_SIZE};
use crate::error::{RelayError, Result};
use crate::transport_error;

#[derive(Clone, Debug)]
pub struct UdpConnector {
    // host:port, resolved on every connect
    destination: String,
    stats: Arc<TransportStats>,
}

impl UdpConnector {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            stats: Arc::new(TransportStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<TransportStats> {
        self.stats.clone()
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        lookup_host(self.destination.as_str())
            .await?
            .next()
            .ok_or_else(|| transport_error!("No address found for {}", self.destination))
    }
}

#[async_trait]
impl DatagramConnector for UdpConnector {
    async fn connect(&self) -> Result<Box<dyn DatagramLink>> {
        self.stats.connects.fetch_add(1, Ordering::Relaxed);
        let peer_addr = self.resolve().await?;
        let local_addr: SocketAddr = if peer_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| transport_error!("Socket creation failed: {}", e))?;
        socket
            .connect(peer_addr)
            .await
            .map_err(|e| transport_error!("Connecting to {} failed: {}", peer_addr, e))?;

        debug!("UDP link open to {} ({})", self.destination, peer_addr);
        Ok(Box::new(UdpLink {
            socket,
            peer_addr,
            stats: self.stats.clone(),
        }))
    }

    fn destination(&self) -> String {
        self.destination.clone()
    }
}

#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
    peer_addr: SocketAddr,
    stats: Arc<TransportStats>,
}

#[async_trait]
impl DatagramLink for UdpLink {
    async fn send(&self, payload: &[u8]) -> Result<usize> {
        if payload.len() > MAX_DATAGRAM_SIZE {
            self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(transport_error!(
                "Datagram too large: {} bytes (max: {} bytes)",
                payload.len(),
                MAX_DATAGRAM_SIZE
            ));
        }
        match self.socket.send(payload).await {
            Ok(written) => {
                self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_sent
                    .fetch_add(written as u64, Ordering::Relaxed);
                Ok(written)
            }
            Err(e) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!("[{}] Failed to send UDP data: {}", self.peer_addr, e);
                Err(RelayError::Io(e))
            }
        }
    }
}
