use std::{
    collections::HashMap,
    sync::Mutex,
};

use log::warn;

use crate::constants::MAX_CHUNK_PAYLOAD;

/// One producer-announced byte range, measured from the region base.
/// Ranges never exceed `MAX_CHUNK_PAYLOAD`; larger marks are recorded
/// as consecutive slices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingChange {
    pub offset: usize,
    pub size: usize,
    pub in_progress: bool,
}

/// Ordered per-region log of changes awaiting emission, in
/// `mark_region_changed` call order.
pub(crate) struct PendingStore {
    changes: Mutex<HashMap<String, Vec<PendingChange>>>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self {
            changes: Mutex::new(HashMap::new()),
        }
    }

    /// Appends the range, sliced to the chunk payload limit.
    pub fn record(&self, name: &str, offset: usize, size: usize) {
        let Ok(mut changes) = self.changes.lock() else {
            warn!("pending-change store poisoned; change to '{name}' lost");
            return;
        };
        let list = changes.entry(name.to_string()).or_default();
        let mut remaining = size;
        let mut at = offset;
        loop {
            let slice = remaining.min(MAX_CHUNK_PAYLOAD);
            list.push(PendingChange {
                offset: at,
                size: slice,
                in_progress: false,
            });
            remaining -= slice;
            if remaining == 0 {
                break;
            }
            at += slice;
        }
    }

    /// Captures and clears the region's change list in one step.
    pub fn take(&self, name: &str) -> Vec<PendingChange> {
        let Ok(mut changes) = self.changes.lock() else {
            warn!("pending-change store poisoned; draining '{name}' as empty");
            return Vec::new();
        };
        changes.remove(name).unwrap_or_default()
    }

    pub fn len(&self, name: &str) -> usize {
        self.changes
            .lock()
            .map(|changes| changes.get(name).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut changes) = self.changes.lock() {
            changes.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changes_are_recorded_in_call_order() {
        let store = PendingStore::new();
        store.record("R", 32, 4);
        store.record("R", 16, 4);
        store.record("R", 48, 8);

        let changes = store.take("R");
        assert_eq!(
            changes.iter().map(|c| (c.offset, c.size)).collect::<Vec<_>>(),
            vec![(32, 4), (16, 4), (48, 8)]
        );
        assert!(changes.iter().all(|c| !c.in_progress));
    }

    #[test]
    fn take_clears_the_list() {
        let store = PendingStore::new();
        store.record("R", 0, 4);
        assert_eq!(store.len("R"), 1);
        store.take("R");
        assert_eq!(store.len("R"), 0);
        assert!(store.take("R").is_empty());
    }

    #[test]
    fn regions_are_tracked_independently() {
        let store = PendingStore::new();
        store.record("A", 0, 4);
        store.record("B", 8, 4);
        assert_eq!(store.len("A"), 1);
        store.take("A");
        assert_eq!(store.len("B"), 1);
    }

    #[test]
    fn oversized_ranges_are_sliced_to_the_chunk_limit() {
        let store = PendingStore::new();
        store.record("R", 100, MAX_CHUNK_PAYLOAD * 2 + 10);

        let changes = store.take("R");
        assert_eq!(
            changes.iter().map(|c| (c.offset, c.size)).collect::<Vec<_>>(),
            vec![
                (100, MAX_CHUNK_PAYLOAD),
                (100 + MAX_CHUNK_PAYLOAD, MAX_CHUNK_PAYLOAD),
                (100 + 2 * MAX_CHUNK_PAYLOAD, 10),
            ]
        );
    }

    #[test]
    fn zero_sized_mark_still_records_one_entry() {
        let store = PendingStore::new();
        store.record("R", 8, 0);
        let changes = store.take("R");
        assert_eq!(changes, vec![PendingChange { offset: 8, size: 0, in_progress: false }]);
    }
}
