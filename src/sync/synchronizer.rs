use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::warn;

use crate::{
    backends::Clock,
    constants::MAX_CHUNK_PAYLOAD,
    peer::PeerRoster,
    protocol::{MessageType, SyncFrame},
    region::RegionHandle,
    tracker::{ChangeTracker, PendingChange},
    transport::PacketSender,
};

/// Everything one per-region synchronizer worker needs. Workers take
/// only references into the shared core; nothing here is owned
/// per-region except the handle.
pub(crate) struct SynchronizerContext {
    pub handle: RegionHandle,
    pub tracker: Arc<ChangeTracker>,
    pub roster: Arc<PeerRoster>,
    pub sender: Arc<dyn PacketSender>,
    pub poll_interval: Duration,
}

/// Spawns the per-region emit worker: poll for a version ahead of the
/// last sent one with the dirty flag up, drain the pending changes into
/// frames, fan them out, then acknowledge by clearing the flag.
pub(crate) fn spawn_synchronizer(
    context: SynchronizerContext,
    global_running: Arc<AtomicBool>,
    worker_running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let SynchronizerContext {
            handle,
            tracker,
            roster,
            sender,
            poll_interval,
        } = context;
        let mut last_sent_version = handle.version();

        while global_running.load(Ordering::Acquire) && worker_running.load(Ordering::Acquire) {
            if handle.version() > last_sent_version && handle.is_dirty() {
                let changes = tracker.take_pending(handle.name());
                let update_id = tracker.generate_unique_id();
                let frames = build_emission(&handle, &changes, update_id);

                // Fan-out happens outside every lock; the roster was
                // snapshotted and the changes captured above.
                let peers = roster.peers();
                for frame in &frames {
                    let bytes = frame.to_bytes();
                    for peer in &peers {
                        if let Err(err) = sender.send(peer, bytes.as_slice()) {
                            warn!(
                                "failed to send frame for region '{}' to {peer}: {err}",
                                handle.name()
                            );
                        }
                    }
                }

                last_sent_version = handle.version();
                handle.set_dirty(false);
            }
            thread::sleep(poll_interval);
        }
    })
}

/// Slices one drained change list into wire frames, copying payload
/// bytes out of the region at emission time.
///
/// An empty list with the dirty flag observed is a valid transient
/// (the producer bumped between our append and wake): fall back to
/// emitting the entire region so peers still converge.
pub(crate) fn build_emission(
    handle: &RegionHandle,
    changes: &[PendingChange],
    update_id: u64,
) -> Vec<SyncFrame> {
    let ranges: Vec<(usize, usize)> = if changes.is_empty() {
        full_region_ranges(handle.size())
    } else {
        changes.iter().map(|change| (change.offset, change.size)).collect()
    };

    let timestamp = Clock::wire_tick();
    let last = ranges.len() - 1;
    let mut frames = Vec::with_capacity(ranges.len());
    for (index, &(offset, size)) in ranges.iter().enumerate() {
        let message_type = if last == 0 {
            MessageType::Single
        } else if index == 0 {
            MessageType::Start
        } else if index == last {
            MessageType::End
        } else {
            MessageType::Chunk
        };

        let mut payload = vec![0u8; size];
        if let Err(err) = handle.read(offset, &mut payload) {
            warn!("skipping change for region '{}': {err}", handle.name());
            continue;
        }
        match SyncFrame::new(
            handle.name(),
            message_type,
            update_id,
            offset,
            timestamp,
            payload,
        ) {
            Ok(frame) => frames.push(frame),
            Err(err) => warn!("skipping change for region '{}': {err}", handle.name()),
        }
    }
    frames
}

/// The whole region as chunk-sized `(offset, size)` ranges.
fn full_region_ranges(region_size: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    while offset < region_size {
        let size = (region_size - offset).min(MAX_CHUNK_PAYLOAD);
        ranges.push((offset, size));
        offset += size;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use crate::{
        constants::HEADER_SIZE,
        region::{LocalMemoryProvider, RegionRegistry},
    };

    use super::*;

    fn handle(size: usize) -> RegionHandle {
        let registry = RegionRegistry::new(
            Box::new(LocalMemoryProvider::new()),
            crate::constants::POLL_INTERVAL,
        );
        registry.initialize("R", size).expect("init");
        registry.region("R").expect("handle")
    }

    fn change(offset: usize, size: usize) -> PendingChange {
        PendingChange {
            offset,
            size,
            in_progress: false,
        }
    }

    #[test]
    fn one_change_becomes_a_single_frame() {
        let handle = handle(64);
        handle.write(16, &[0x2A, 0, 0, 0]).expect("write");

        let frames = build_emission(&handle, &[change(16, 4)], 7);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message_type, MessageType::Single);
        assert_eq!(frames[0].update_id, 7);
        assert_eq!(frames[0].offset, 16);
        assert_eq!(frames[0].payload, vec![0x2A, 0, 0, 0]);
    }

    #[test]
    fn several_changes_become_start_chunk_end_in_call_order() {
        let handle = handle(64);
        let changes = [change(32, 4), change(16, 4), change(48, 4)];

        let frames = build_emission(&handle, &changes, 9);
        assert_eq!(
            frames.iter().map(|f| f.message_type).collect::<Vec<_>>(),
            vec![MessageType::Start, MessageType::Chunk, MessageType::End]
        );
        // Insertion order is preserved on the wire; the receiver is the
        // one that re-sorts by offset.
        assert_eq!(
            frames.iter().map(|f| f.offset).collect::<Vec<_>>(),
            vec![32, 16, 48]
        );
        assert!(frames.iter().all(|f| f.update_id == 9));
    }

    #[test]
    fn two_changes_have_no_middle_chunk() {
        let handle = handle(64);
        let frames = build_emission(&handle, &[change(0, 4), change(8, 4)], 1);
        assert_eq!(
            frames.iter().map(|f| f.message_type).collect::<Vec<_>>(),
            vec![MessageType::Start, MessageType::End]
        );
    }

    #[test]
    fn empty_changes_fall_back_to_the_full_region() {
        let handle = handle(64);
        handle.write(HEADER_SIZE, &[0xAB; 8]).expect("write");

        let frames = build_emission(&handle, &[], 5);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message_type, MessageType::Single);
        assert_eq!(frames[0].offset, 0);
        assert_eq!(frames[0].size(), 64);
        assert_eq!(frames[0].payload[HEADER_SIZE..HEADER_SIZE + 8], [0xAB; 8]);
    }

    #[test]
    fn full_region_fallback_chunks_large_regions() {
        let handle = handle(MAX_CHUNK_PAYLOAD * 2 + 100);

        let frames = build_emission(&handle, &[], 5);
        assert_eq!(
            frames.iter().map(|f| f.message_type).collect::<Vec<_>>(),
            vec![MessageType::Start, MessageType::Chunk, MessageType::End]
        );
        assert_eq!(
            frames.iter().map(|f| (f.offset, f.size())).collect::<Vec<_>>(),
            vec![
                (0, MAX_CHUNK_PAYLOAD),
                (MAX_CHUNK_PAYLOAD, MAX_CHUNK_PAYLOAD),
                (MAX_CHUNK_PAYLOAD * 2, 100),
            ]
        );
    }
}
