//! Change-tracking behavior as seen by a local producer: marks are
//! recorded in order, version and dirty follow every mark, and ids
//! never repeat consecutively.

use std::{sync::Arc, time::Duration};

use memsync::{
    ChangeTracker, LocalMemoryProvider, RegionRegistry, POLL_INTERVAL, UPDATE_TIMEOUT,
};

fn tracker_with_region(name: &str, size: usize) -> (Arc<RegionRegistry>, ChangeTracker) {
    let registry = Arc::new(RegionRegistry::new(
        Box::new(LocalMemoryProvider::new()),
        POLL_INTERVAL,
    ));
    registry.initialize(name, size).expect("region initializes");
    let tracker = ChangeTracker::new(registry.clone(), UPDATE_TIMEOUT, 64);
    (registry, tracker)
}

#[test]
fn mark_region_changed_records_the_range() {
    let (_registry, tracker) = tracker_with_region("TestMemory", 128);

    tracker.mark_region_changed("TestMemory", 40, 20);

    assert_eq!(tracker.pending_len("TestMemory"), 1);
}

#[test]
fn mark_field_changed_is_an_alias() {
    let (_registry, tracker) = tracker_with_region("TestMemory", 128);

    tracker.mark_field_changed("TestMemory", 24, 8);

    assert_eq!(tracker.pending_len("TestMemory"), 1);
}

#[test]
fn every_mark_bumps_version_and_sets_dirty() {
    let (registry, tracker) = tracker_with_region("TestMemory", 128);
    let handle = registry.region("TestMemory").expect("handle");
    let version_before = handle.version();

    tracker.mark_region_changed("TestMemory", 24, 4);
    tracker.mark_region_changed("TestMemory", 32, 4);
    tracker.mark_region_changed("TestMemory", 48, 8);

    assert_eq!(handle.version(), version_before + 3);
    assert!(handle.is_dirty());
    assert_eq!(tracker.pending_len("TestMemory"), 3);
}

#[test]
fn marking_an_unknown_region_is_a_no_op() {
    let (_registry, tracker) = tracker_with_region("TestMemory", 128);

    tracker.mark_region_changed("NoSuchMemory", 0, 4);

    assert_eq!(tracker.pending_len("NoSuchMemory"), 0);
}

#[test]
fn marking_out_of_bounds_is_refused() {
    let (registry, tracker) = tracker_with_region("TestMemory", 128);
    let handle = registry.region("TestMemory").expect("handle");
    let version_before = handle.version();

    tracker.mark_region_changed("TestMemory", 120, 64);

    assert_eq!(tracker.pending_len("TestMemory"), 0);
    assert_eq!(handle.version(), version_before);
}

#[test]
fn generated_ids_are_unique_in_sequence() {
    let (_registry, tracker) = tracker_with_region("TestMemory", 128);

    let first = tracker.generate_unique_id();
    let second = tracker.generate_unique_id();
    let third = tracker.generate_unique_id();

    assert_ne!(first, second);
    assert_ne!(second, third);
}

#[test]
fn expired_updates_are_discarded_and_fresh_ones_kept() {
    use memsync::{MessageType, SyncFrame};

    let registry = Arc::new(RegionRegistry::new(
        Box::new(LocalMemoryProvider::new()),
        POLL_INTERVAL,
    ));
    registry.initialize("TestMemory", 128).expect("init");
    // Short timeout so the test does not sit out the full five seconds.
    let tracker = ChangeTracker::new(registry, Duration::from_millis(30), 64);

    let stale = SyncFrame::new("TestMemory", MessageType::Start, 1, 24, 0, vec![0xAA; 4])
        .expect("valid frame");
    tracker.handle_frame(stale);
    std::thread::sleep(Duration::from_millis(40));

    let fresh = SyncFrame::new("TestMemory", MessageType::Start, 2, 32, 0, vec![0xBB; 4])
        .expect("valid frame");
    tracker.handle_frame(fresh);

    tracker.check_update_timeouts();

    assert_eq!(tracker.in_flight_len(), 1);
}
