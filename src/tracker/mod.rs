mod error;
mod pending;
mod reassembly;
mod update_id;

pub use error::TrackerError;
pub use pending::PendingChange;

pub(crate) use pending::PendingStore;
pub(crate) use reassembly::ReassemblyTable;
pub(crate) use update_id::UpdateIdGenerator;

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use log::{debug, warn};

use crate::{
    protocol::{MessageType, SyncFrame},
    region::{RegionError, RegionRegistry},
};

/// Capability object fired once for every frame applied from the
/// network, with the region name and the applied byte range. Frames
/// that were received but dropped never fire it.
pub trait UpdateListener: Send + Sync {
    fn update_applied(&self, region: &str, offset: usize, size: usize);
}

/// Records producer-announced changes for the synchronizers and
/// reassembles multi-frame updates for the receiver.
pub struct ChangeTracker {
    registry: Arc<RegionRegistry>,
    pending: PendingStore,
    in_flight: ReassemblyTable,
    ids: UpdateIdGenerator,
    listener: RwLock<Option<Arc<dyn UpdateListener>>>,
}

impl ChangeTracker {
    pub fn new(
        registry: Arc<RegionRegistry>,
        update_timeout: Duration,
        max_in_flight: usize,
    ) -> Self {
        Self {
            registry,
            pending: PendingStore::new(),
            in_flight: ReassemblyTable::new(update_timeout, max_in_flight),
            ids: UpdateIdGenerator::new(),
            listener: RwLock::new(None),
        }
    }

    /// Replaces the network-update listener. One slot for the process.
    pub fn register_listener(&self, listener: Arc<dyn UpdateListener>) {
        if let Ok(mut slot) = self.listener.write() {
            *slot = Some(listener);
        }
    }

    /// Records a changed byte range and bumps the region's version.
    ///
    /// The pending append is observable before the version bump, so a
    /// synchronizer that wakes on the new version always finds the
    /// change (it also tolerates the benign empty-queue wake).
    pub fn mark_region_changed(&self, name: &str, offset: usize, size: usize) {
        let handle = match self.registry.region(name) {
            Ok(handle) => handle,
            Err(_) => {
                warn!("cannot mark change: region '{name}' is not registered");
                return;
            }
        };
        if offset.checked_add(size).map_or(true, |end| end > handle.size()) {
            warn!(
                "cannot mark change: range [{offset}, {offset}+{size}) exceeds region '{name}' of {} bytes",
                handle.size()
            );
            return;
        }

        self.pending.record(name, offset, size);
        handle.bump_version();
        handle.set_dirty(true);
    }

    /// Marks a single field of the region's record as changed.
    pub fn mark_field_changed(&self, name: &str, field_offset: usize, field_size: usize) {
        self.mark_region_changed(name, field_offset, field_size)
    }

    /// Copies one frame's payload into its region and fires the
    /// listener. Probe frames and frames for unknown regions land
    /// nowhere; only the probe is silent about it.
    pub fn apply_single(&self, frame: &SyncFrame) {
        let handle = match self.registry.region(&frame.region) {
            Ok(handle) => handle,
            Err(_) => {
                if frame.is_probe() {
                    debug!("connectivity probe received");
                } else {
                    warn!("dropping frame for unknown region '{}'", frame.region);
                }
                return;
            }
        };

        match handle.apply_remote(frame.offset, &frame.payload) {
            Ok(()) => self.notify_applied(&frame.region, frame.offset, frame.size()),
            Err(RegionError::RangeOutOfBounds { .. }) => {
                warn!(
                    "dropping frame for region '{}': range [{}, {}+{}) is out of bounds",
                    frame.region,
                    frame.offset,
                    frame.offset,
                    frame.size()
                );
            }
            Err(err) => warn!("failed to apply frame to region '{}': {err}", frame.region),
        }
    }

    /// Applies a completed multi-frame update: frames sorted by
    /// ascending region offset, applied in that order regardless of
    /// arrival order, then the record is erased.
    pub fn apply_multipart(&self, update_id: u64) {
        let Some(frames) = self.in_flight.remove_sorted(update_id) else {
            warn!("no in-flight update {update_id:#x} to apply");
            return;
        };
        for frame in &frames {
            self.apply_single(frame);
        }
    }

    /// Receiver-side classification of one inbound frame.
    pub fn handle_frame(&self, frame: SyncFrame) {
        match frame.message_type {
            MessageType::Single => self.apply_single(&frame),
            MessageType::Start => {
                // A re-ordered START for a known id joins the existing
                // record instead of resetting its arrival clock.
                self.in_flight.start(frame.update_id, frame);
            }
            MessageType::Chunk => {
                let update_id = frame.update_id;
                if !self.in_flight.append(update_id, frame) {
                    warn!("dropping chunk: {}", TrackerError::UnknownUpdateId { update_id });
                }
            }
            MessageType::End => {
                let update_id = frame.update_id;
                if self.in_flight.append(update_id, frame.clone()) {
                    self.apply_multipart(update_id);
                } else {
                    // The start was lost; at least this chunk lands.
                    warn!(
                        "{}; applying the end frame as a single update",
                        TrackerError::UnknownUpdateId { update_id }
                    );
                    self.apply_single(&frame);
                }
            }
        }
    }

    /// A 64-bit id guaranteed different from the previous one returned
    /// by this process. Cross-process uniqueness is probabilistic.
    pub fn generate_unique_id(&self) -> u64 {
        self.ids.generate()
    }

    /// Discards every in-flight update whose first frame is older than
    /// the update timeout. The payload is lost; the sender is never
    /// informed.
    pub fn check_update_timeouts(&self) {
        let timeout_ms = self.in_flight.timeout().as_millis() as u64;
        for update_id in self.in_flight.sweep_timeouts() {
            warn!(
                "{}",
                TrackerError::UpdateTimedOut {
                    update_id,
                    timeout_ms,
                }
            );
        }
    }

    /// Drops all pending and in-flight state. Shutdown path.
    pub fn clear(&self) {
        self.pending.clear();
        self.in_flight.clear();
    }

    pub(crate) fn take_pending(&self, name: &str) -> Vec<PendingChange> {
        self.pending.take(name)
    }

    /// Number of recorded-but-unsent changes for a region.
    pub fn pending_len(&self, name: &str) -> usize {
        self.pending.len(name)
    }

    /// Number of updates currently being reassembled.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    fn notify_applied(&self, region: &str, offset: usize, size: usize) {
        if let Ok(slot) = self.listener.read() {
            if let Some(listener) = slot.as_ref() {
                listener.update_applied(region, offset, size);
            }
        }
    }
}
