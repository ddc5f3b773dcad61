//! Datagram transport
//!
//! Best-effort, connectionless delivery of aggregate snapshots to a single
//! destination.

pub mod stats;
pub mod traits;
pub mod udp;

pub use stats::{FrozenTransportStats, TransportStats};
pub use traits::{DatagramConnector, DatagramLink, MAX_DATAGRAM_SIZE};
pub use udp::{UdpConnector, UdpLink};
