use thiserror::Error;

/// Errors that can occur while encoding or decoding wire frames
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Region name does not fit the fixed name field
    #[error("Region name of {length} bytes exceeds the {max} byte limit (one byte is reserved for the terminating NUL)")]
    NameTooLong {
        length: usize,
        max: usize,
    },

    /// Region name contains bytes that cannot travel in the name field
    #[error("Region name contains a NUL or non-printable byte and cannot be framed")]
    NameNotPrintable,

    /// Payload does not fit the fixed data field
    #[error("Payload of {size} bytes exceeds the maximum chunk payload of {max} bytes")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// Datagram is shorter than the fixed frame layout
    #[error("Datagram of {length} bytes is shorter than the {expected} byte frame and was discarded")]
    TruncatedFrame {
        length: usize,
        expected: usize,
    },

    /// Invalid message type index received (potentially a foreign datagram)
    #[error("Invalid message type index {index} received (valid range: 0-3)")]
    InvalidMessageTypeIndex {
        index: u32,
    },

    /// The frame's size field exceeds the data field width
    #[error("Frame declares {size} payload bytes but the data field holds at most {max}")]
    SizeFieldOutOfRange {
        size: u64,
        max: usize,
    },
}
