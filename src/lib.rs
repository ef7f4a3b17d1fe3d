//! # memsync
//! Replicates named shared-memory regions between peer processes over a
//! best-effort datagram transport. A local producer mutates a region in
//! place and marks the touched byte ranges; per-region synchronizer
//! workers slice those ranges into frames and fan them out to every
//! peer, where a single receiver worker reassembles and applies them.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

#[macro_use]
extern crate cfg_if;

mod backends;
mod config;
mod constants;
mod peer;
mod protocol;
mod region;
mod service;
mod sync;
mod tracker;
mod transport;

pub use backends::{Clock, ClockError};
pub use config::SyncConfig;
pub use constants::{
    DEFAULT_MAX_IN_FLIGHT_UPDATES, HEADER_SIZE, MAX_CHUNK_PAYLOAD, MAX_MEMORY_NAME, POLL_INTERVAL,
    PROBE_REGION_NAME, UPDATE_TIMEOUT,
};
pub use peer::PeerRoster;
pub use protocol::{FrameError, MessageType, SyncFrame, FRAME_BYTES};
#[cfg(unix)]
pub use region::SharedMemoryProvider;
pub use region::{
    LocalMemoryProvider, Mapping, MappingProvider, RegionError, RegionHandle, RegionObserver,
    RegionRegistry,
};
pub use service::{ServiceError, SyncService};
pub use tracker::{ChangeTracker, PendingChange, TrackerError, UpdateListener};
pub use transport::{
    PacketHub, PacketReceiver, PacketSender, RecvError, SendError, TransportError, UdpTransport,
};
