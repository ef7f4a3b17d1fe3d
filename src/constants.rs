//! Constants shared between the sync workers and their callers.
//!
//! Every peer must agree on the wire-facing values here; changing
//! `MAX_MEMORY_NAME` or `MAX_CHUNK_PAYLOAD` changes the frame layout.

use std::time::Duration;

/// Width of the region-name field in a wire frame, including the
/// terminating NUL. Usable name length is one byte less.
pub const MAX_MEMORY_NAME: usize = 64;

/// Maximum number of payload bytes a single frame may carry.
pub const MAX_CHUNK_PAYLOAD: usize = 1024;

/// How long a partially received multi-frame update may sit in the
/// reassembly table before it is discarded.
pub const UPDATE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Poll cadence of the synchronizer, receiver, and observer workers.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Size of the fixed region metadata prefix: version, last-modified
/// timestamp, and the dirty flag, each 8 bytes. The application payload
/// starts at this offset.
pub const HEADER_SIZE: usize = 24;

/// Region name reserved for connectivity probes. Frames carrying this
/// name are classified normally but never target a real region.
pub const PROBE_REGION_NAME: &str = "TEST";

/// Default cap on simultaneously reassembling updates. Inserting beyond
/// the cap evicts the oldest partial update.
pub const DEFAULT_MAX_IN_FLIGHT_UPDATES: usize = 64;
