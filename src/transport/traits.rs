//! Transport traits for datagram emission
//!
//! A connector opens links to one fixed destination; a link sends whole
//! datagrams. Dropping a link closes it.
use async_trait::async_trait;

use crate::error::Result;

// Largest payload that fits a single UDP datagram
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Opens a fresh link to the configured destination
#[async_trait]
pub trait DatagramConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DatagramLink>>;

    /// Destination description for logs
    fn destination(&self) -> String;

    /// Largest payload a link from this connector accepts
    fn max_datagram_size(&self) -> usize {
        MAX_DATAGRAM_SIZE
    }
}

/// An open, connectionless send path
#[async_trait]
pub trait DatagramLink: Send + Sync {
    /// Send one datagram, returning the number of bytes written
    async fn send(&self, payload: &[u8]) -> Result<usize>;
}
