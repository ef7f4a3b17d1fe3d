use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use log::warn;

use crate::protocol::SyncFrame;

/// One partially received multi-frame update: the frames in arrival
/// order and the arrival time of the first one.
struct InFlightUpdate {
    frames: Vec<SyncFrame>,
    started: Instant,
}

/// Receiver-side reassembly table, keyed by update id. Every record
/// either completes (frames applied, record removed) or ages out after
/// the update timeout. The table is capped; inserting past the cap
/// evicts the oldest record.
pub(crate) struct ReassemblyTable {
    updates: Mutex<HashMap<u64, InFlightUpdate>>,
    timeout: Duration,
    capacity: usize,
}

impl ReassemblyTable {
    pub fn new(timeout: Duration, capacity: usize) -> Self {
        Self {
            updates: Mutex::new(HashMap::new()),
            timeout,
            capacity,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Opens a record for the id, or appends when one already exists
    /// (a re-ordered START must not reset the arrival clock).
    pub fn start(&self, update_id: u64, frame: SyncFrame) {
        let Ok(mut updates) = self.updates.lock() else {
            warn!("reassembly table poisoned; start frame for {update_id:#x} lost");
            return;
        };
        if let Some(update) = updates.get_mut(&update_id) {
            update.frames.push(frame);
            return;
        }

        if updates.len() >= self.capacity {
            if let Some(oldest) = updates
                .iter()
                .min_by_key(|(_, update)| update.started)
                .map(|(&id, _)| id)
            {
                updates.remove(&oldest);
                warn!("reassembly table full; evicted oldest update {oldest:#x}");
            }
        }
        updates.insert(
            update_id,
            InFlightUpdate {
                frames: vec![frame],
                started: Instant::now(),
            },
        );
    }

    /// Appends to an existing record. Returns false when the id is
    /// unknown (the caller decides whether to drop or fall back).
    pub fn append(&self, update_id: u64, frame: SyncFrame) -> bool {
        let Ok(mut updates) = self.updates.lock() else {
            warn!("reassembly table poisoned; chunk for {update_id:#x} lost");
            return false;
        };
        match updates.get_mut(&update_id) {
            Some(update) => {
                update.frames.push(frame);
                true
            }
            None => false,
        }
    }

    /// Removes the record and returns its frames sorted by ascending
    /// region offset, ready to apply in order.
    pub fn remove_sorted(&self, update_id: u64) -> Option<Vec<SyncFrame>> {
        let Ok(mut updates) = self.updates.lock() else {
            warn!("reassembly table poisoned; update {update_id:#x} lost");
            return None;
        };
        updates.remove(&update_id).map(|update| {
            let mut frames = update.frames;
            frames.sort_by_key(|frame| frame.offset);
            frames
        })
    }

    /// Removes every record older than the timeout and returns the
    /// discarded ids.
    pub fn sweep_timeouts(&self) -> Vec<u64> {
        let Ok(mut updates) = self.updates.lock() else {
            return Vec::new();
        };
        let timeout = self.timeout;
        let expired: Vec<u64> = updates
            .iter()
            .filter(|(_, update)| update.started.elapsed() > timeout)
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            updates.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.updates.lock().map(|updates| updates.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::MessageType;

    use super::*;

    fn frame(update_id: u64, offset: usize) -> SyncFrame {
        SyncFrame::new(
            "R",
            MessageType::Chunk,
            update_id,
            offset,
            0,
            vec![offset as u8],
        )
        .expect("valid frame")
    }

    #[test]
    fn append_to_unknown_id_is_refused() {
        let table = ReassemblyTable::new(Duration::from_secs(5), 8);
        assert!(!table.append(7, frame(7, 0)));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn frames_come_back_sorted_by_offset() {
        let table = ReassemblyTable::new(Duration::from_secs(5), 8);
        table.start(42, frame(42, 32));
        table.append(42, frame(42, 16));
        table.append(42, frame(42, 48));

        let frames = table.remove_sorted(42).expect("record exists");
        assert_eq!(
            frames.iter().map(|f| f.offset).collect::<Vec<_>>(),
            vec![16, 32, 48]
        );
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn reordered_start_joins_the_existing_record() {
        let table = ReassemblyTable::new(Duration::from_secs(5), 8);
        table.start(42, frame(42, 16));
        table.start(42, frame(42, 0));
        let frames = table.remove_sorted(42).expect("record exists");
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn sweep_discards_only_expired_records() {
        let table = ReassemblyTable::new(Duration::from_millis(0), 8);
        table.start(1, frame(1, 0));
        std::thread::sleep(Duration::from_millis(5));

        let expired = table.sweep_timeouts();
        assert_eq!(expired, vec![1]);
        assert_eq!(table.len(), 0);

        let fresh = ReassemblyTable::new(Duration::from_secs(5), 8);
        fresh.start(2, frame(2, 0));
        assert!(fresh.sweep_timeouts().is_empty());
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn capacity_evicts_the_oldest_record() {
        let table = ReassemblyTable::new(Duration::from_secs(5), 2);
        table.start(1, frame(1, 0));
        std::thread::sleep(Duration::from_millis(2));
        table.start(2, frame(2, 0));
        std::thread::sleep(Duration::from_millis(2));
        table.start(3, frame(3, 0));

        assert_eq!(table.len(), 2);
        assert!(table.remove_sorted(1).is_none());
        assert!(table.remove_sorted(2).is_some());
        assert!(table.remove_sorted(3).is_some());
    }
}
