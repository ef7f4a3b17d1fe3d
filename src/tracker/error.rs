use thiserror::Error;

/// Errors that can occur during change tracking and reassembly.
///
/// Worker threads recover from all of these locally; they surface in
/// logs rather than return values (only initialization paths hand
/// errors back to the caller).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// CHUNK or END arrived for an id with no in-flight record
    #[error("No in-flight update with id {update_id:#x}")]
    UnknownUpdateId {
        update_id: u64,
    },

    /// A partial update sat in the reassembly table past the timeout
    #[error("Update {update_id:#x} exceeded the {timeout_ms} ms reassembly timeout and was discarded")]
    UpdateTimedOut {
        update_id: u64,
        timeout_ms: u64,
    },
}
