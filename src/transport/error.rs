use thiserror::Error;

/// Errors that can occur while bringing the transport up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Binding the local datagram endpoint failed
    #[error("Failed to bind datagram endpoint {address}: {reason}")]
    BindFailed {
        address: String,
        reason: String,
    },

    /// A peer address could not be parsed
    #[error("'{address}' is not a valid peer address (expected ip:port)")]
    InvalidAddress {
        address: String,
    },
}

/// A datagram could not be sent. Per-occurrence; the sender keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to send datagram: {reason}")]
pub struct SendError {
    pub reason: String,
}

/// A datagram could not be received. Per-occurrence; the receiver keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to receive datagram: {reason}")]
pub struct RecvError {
    pub reason: String,
}
