//! Fixed metadata prefix at the base of every region.
//!
//! | offset | width | field |
//! |--------|-------|-------|
//! | 0      | 8     | `version`, bumped on every local change mark |
//! | 8      | 8     | `last_modified`, wall-clock seconds |
//! | 16     | 8     | `dirty`, nonzero until the synchronizer drains |
//! | 24     | …     | application payload |
//!
//! The prefix is part of the region's replicated bytes: a full-region
//! update from a peer overwrites it wholesale, which is how a fallback
//! sync carries the producer's version across.

use std::sync::atomic::{AtomicU64, Ordering};

use super::mapping::Mapping;

pub(crate) const VERSION_OFFSET: usize = 0;
pub(crate) const LAST_MODIFIED_OFFSET: usize = 8;
pub(crate) const DIRTY_OFFSET: usize = 16;

/// Word-level view of a region's metadata prefix.
///
/// Producer, synchronizer, observer, and receiver threads all poll or
/// update these words concurrently; going through atomics keeps the
/// header words tear-free. Payload bytes carry no such guarantee
/// (callers needing all-or-nothing reads wrap their own lock).
pub(crate) struct HeaderView<'m> {
    mapping: &'m dyn Mapping,
}

impl<'m> HeaderView<'m> {
    pub fn new(mapping: &'m dyn Mapping) -> Self {
        Self { mapping }
    }

    fn word(&self, offset: usize) -> &AtomicU64 {
        let base = self.mapping.base().as_ptr();
        debug_assert!(offset + 8 <= self.mapping.len());
        debug_assert!(offset % 8 == 0);
        debug_assert_eq!(base as usize % std::mem::align_of::<AtomicU64>(), 0);
        // SAFETY: the registry rejects regions smaller than the header,
        // offset is word-aligned, and `Mapping::base` promises an 8-byte
        // aligned base (mmap is page-aligned, the local provider backs
        // segments with 64-bit words), so base + offset is a valid
        // AtomicU64 location. The atomic view aliases bytes that raw
        // range copies may also touch; header words are only ever
        // accessed word-at-a-time here.
        unsafe { &*(base.add(offset) as *const AtomicU64) }
    }

    pub fn version(&self) -> u64 {
        self.word(VERSION_OFFSET).load(Ordering::Acquire)
    }

    /// Increments the version. Release ordering pairs with the readers'
    /// acquire loads so a bumped version is never observed before the
    /// pending-change append that caused it.
    pub fn bump_version(&self) -> u64 {
        self.word(VERSION_OFFSET).fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_dirty(&self) -> bool {
        self.word(DIRTY_OFFSET).load(Ordering::Acquire) != 0
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.word(DIRTY_OFFSET)
            .store(u64::from(dirty), Ordering::Release);
    }

    pub fn last_modified(&self) -> u64 {
        self.word(LAST_MODIFIED_OFFSET).load(Ordering::Acquire)
    }

    pub fn set_last_modified(&self, seconds: u64) {
        self.word(LAST_MODIFIED_OFFSET)
            .store(seconds, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::constants::HEADER_SIZE;

    use super::super::mapping::{LocalMemoryProvider, MappingProvider};
    use super::*;

    fn mapping() -> Arc<dyn Mapping> {
        LocalMemoryProvider::new()
            .create("header-test", HEADER_SIZE + 8)
            .expect("local mapping")
    }

    #[test]
    fn fresh_region_starts_clean() {
        let mapping = mapping();
        let header = HeaderView::new(mapping.as_ref());
        assert_eq!(header.version(), 0);
        assert!(!header.is_dirty());
        assert_eq!(header.last_modified(), 0);
    }

    #[test]
    fn version_bumps_are_cumulative() {
        let mapping = mapping();
        let header = HeaderView::new(mapping.as_ref());
        assert_eq!(header.bump_version(), 1);
        assert_eq!(header.bump_version(), 2);
        assert_eq!(header.version(), 2);
    }

    #[test]
    fn dirty_flag_round_trips() {
        let mapping = mapping();
        let header = HeaderView::new(mapping.as_ref());
        header.set_dirty(true);
        assert!(header.is_dirty());
        header.set_dirty(false);
        assert!(!header.is_dirty());
    }
}
