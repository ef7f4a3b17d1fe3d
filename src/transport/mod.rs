mod channel;
mod error;
mod udp;

pub use channel::PacketHub;
pub use error::{RecvError, SendError, TransportError};
pub use udp::UdpTransport;

use std::net::SocketAddr;

/// Sends one datagram to a peer. Shared by every synchronizer worker
/// and the connect path.
pub trait PacketSender: Send + Sync {
    fn send(&self, address: &SocketAddr, payload: &[u8]) -> Result<(), SendError>;
}

/// Receives datagrams on the local endpoint. Owned by the receiver
/// worker; `Ok(None)` means nothing is waiting right now.
pub trait PacketReceiver: Send {
    fn receive(&mut self) -> Result<Option<(SocketAddr, &[u8])>, RecvError>;
}
