use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
    thread::JoinHandle,
    time::Duration,
};

use log::warn;

use crate::{
    backends::Clock,
    constants::{HEADER_SIZE, MAX_MEMORY_NAME},
};

use super::{
    error::RegionError,
    layout::HeaderView,
    mapping::{Mapping, MappingProvider},
    observer::{spawn_observer, ObserverSlot, RegionObserver},
};

struct RegionRecord {
    mapping: Arc<dyn Mapping>,
    observer: ObserverSlot,
    monitoring: Arc<AtomicBool>,
    observer_thread: Option<JoinHandle<()>>,
}

/// Owns every mapped region and is the sole entry point for reads,
/// writes, and applications of remote updates.
pub struct RegionRegistry {
    provider: Box<dyn MappingProvider>,
    regions: Mutex<HashMap<String, RegionRecord>>,
    poll_interval: Duration,
}

impl RegionRegistry {
    pub fn new(provider: Box<dyn MappingProvider>, poll_interval: Duration) -> Self {
        Self {
            provider,
            regions: Mutex::new(HashMap::new()),
            poll_interval,
        }
    }

    /// Creates (or attaches to) the named region. Idempotent: a name
    /// that is already registered succeeds without remapping.
    pub fn initialize(&self, name: &str, size: usize) -> Result<(), RegionError> {
        validate_name(name)?;
        if size < HEADER_SIZE {
            return Err(RegionError::SizeTooSmall {
                size,
                header: HEADER_SIZE,
            });
        }

        let Ok(mut regions) = self.regions.lock() else {
            return Err(poisoned(name));
        };
        if regions.contains_key(name) {
            return Ok(());
        }

        let mapping = self
            .provider
            .create(name, size)
            .map_err(|err| RegionError::MappingFailed {
                name: name.to_string(),
                reason: err.to_string(),
            })?;
        regions.insert(name.to_string(), RegionRecord::new(mapping));
        Ok(())
    }

    /// Returns a handle to the named region, attaching to an existing
    /// segment of that name if it is not yet registered. The provider
    /// reports the attached segment's actual size.
    pub fn region(&self, name: &str) -> Result<RegionHandle, RegionError> {
        let Ok(mut regions) = self.regions.lock() else {
            return Err(poisoned(name));
        };
        if let Some(record) = regions.get(name) {
            return Ok(RegionHandle::new(name, record.mapping.clone()));
        }

        let Ok(mapping) = self.provider.open(name) else {
            return Err(RegionError::UnknownRegion {
                name: name.to_string(),
            });
        };
        let handle = RegionHandle::new(name, mapping.clone());
        regions.insert(name.to_string(), RegionRecord::new(mapping));
        Ok(handle)
    }

    /// Stops the observer worker if any, unmaps, and deregisters.
    /// Unknown names are a no-op.
    pub fn cleanup(&self, name: &str) -> Result<(), RegionError> {
        let record = {
            let Ok(mut regions) = self.regions.lock() else {
                return Err(poisoned(name));
            };
            regions.remove(name)
        };
        let Some(mut record) = record else {
            return Ok(());
        };

        record.monitoring.store(false, Ordering::Release);
        if let Some(thread) = record.observer_thread.take() {
            if thread.join().is_err() {
                warn!("observer worker for region '{name}' panicked during cleanup");
            }
        }
        // The mapping unmaps on drop; unmap failures are logged there
        // and never surface here.
        drop(record);
        Ok(())
    }

    /// Attaches an observer and starts the region's observer worker if
    /// it is not already running. At most one worker per region; a
    /// second registration replaces the callback in place.
    pub fn register_observer(
        &self,
        name: &str,
        observer: Arc<dyn RegionObserver>,
    ) -> Result<(), RegionError> {
        let Ok(mut regions) = self.regions.lock() else {
            return Err(poisoned(name));
        };
        let Some(record) = regions.get_mut(name) else {
            return Err(RegionError::UnknownRegion {
                name: name.to_string(),
            });
        };

        match record.observer.write() {
            Ok(mut slot) => *slot = Some(observer),
            Err(_) => return Err(poisoned(name)),
        }

        if record.observer_thread.is_none() {
            record.monitoring.store(true, Ordering::Release);
            record.observer_thread = Some(spawn_observer(
                name.to_string(),
                record.mapping.clone(),
                record.observer.clone(),
                record.monitoring.clone(),
                self.poll_interval,
            ));
        }
        Ok(())
    }

    /// True iff the region's current version is strictly greater than
    /// the caller's baseline. Unknown regions have not changed.
    pub fn has_changed(&self, name: &str, baseline_version: u64) -> bool {
        let Ok(regions) = self.regions.lock() else {
            return false;
        };
        regions
            .get(name)
            .map(|record| HeaderView::new(record.mapping.as_ref()).version() > baseline_version)
            .unwrap_or(false)
    }

    /// Names of all currently registered regions.
    pub fn names(&self) -> Vec<String> {
        self.regions
            .lock()
            .map(|regions| regions.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl RegionRecord {
    fn new(mapping: Arc<dyn Mapping>) -> Self {
        Self {
            mapping,
            observer: Arc::new(RwLock::new(None)),
            monitoring: Arc::new(AtomicBool::new(false)),
            observer_thread: None,
        }
    }
}

fn validate_name(name: &str) -> Result<(), RegionError> {
    let valid = !name.is_empty()
        && name.len() < MAX_MEMORY_NAME
        && name.bytes().all(|b| (0x20..0x7f).contains(&b));
    if valid {
        Ok(())
    } else {
        Err(RegionError::InvalidName {
            name: name.to_string(),
            max: MAX_MEMORY_NAME - 1,
        })
    }
}

fn poisoned(name: &str) -> RegionError {
    RegionError::MappingFailed {
        name: name.to_string(),
        reason: "region registry lock poisoned".to_string(),
    }
}

// RegionHandle

/// Cheap cloneable view of one region: header words plus bounds-checked
/// byte access. Holding a handle keeps the mapping alive even across a
/// registry cleanup.
#[derive(Clone)]
pub struct RegionHandle {
    name: String,
    mapping: Arc<dyn Mapping>,
}

impl RegionHandle {
    fn new(name: &str, mapping: Arc<dyn Mapping>) -> Self {
        Self {
            name: name.to_string(),
            mapping,
        }
    }

    fn header(&self) -> HeaderView<'_> {
        HeaderView::new(self.mapping.as_ref())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.mapping.len()
    }

    pub fn version(&self) -> u64 {
        self.header().version()
    }

    /// Increments the version counter. Normally done through
    /// `mark_region_changed`; exposed because the producer owns the
    /// header words.
    pub fn bump_version(&self) -> u64 {
        self.header().bump_version()
    }

    pub fn is_dirty(&self) -> bool {
        self.header().is_dirty()
    }

    /// Raises or clears the dirty flag. Normally done through
    /// `mark_region_changed` and the synchronizer's acknowledge.
    pub fn set_dirty(&self, dirty: bool) {
        self.header().set_dirty(dirty)
    }

    pub fn last_modified(&self) -> u64 {
        self.header().last_modified()
    }

    fn check_range(&self, offset: usize, size: usize) -> Result<(), RegionError> {
        if offset.checked_add(size).is_some_and(|end| end <= self.size()) {
            Ok(())
        } else {
            Err(RegionError::RangeOutOfBounds {
                name: self.name.clone(),
                offset,
                size,
                region_size: self.size(),
            })
        }
    }

    /// Copies region bytes out into `buf`.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), RegionError> {
        self.check_range(offset, buf.len())?;
        // SAFETY: the range was bounds-checked against the live mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.mapping.base().as_ptr().add(offset),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        Ok(())
    }

    /// Producer-side write: copies `bytes` in and stamps
    /// `last_modified`. Does not mark the range dirty; callers follow
    /// up with `mark_region_changed`.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), RegionError> {
        self.apply_remote(offset, bytes)?;
        if let Ok(now) = Clock::wall_seconds() {
            self.header().set_last_modified(now);
        }
        Ok(())
    }

    /// Raw range copy used when applying a peer's frame. No timestamp
    /// stamping: the frame's bytes land exactly as sent.
    pub(crate) fn apply_remote(&self, offset: usize, bytes: &[u8]) -> Result<(), RegionError> {
        self.check_range(offset, bytes.len())?;
        // SAFETY: the range was bounds-checked against the live mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.mapping.base().as_ptr().add(offset),
                bytes.len(),
            );
        }
        Ok(())
    }

    /// Copy of the entire region, header included.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut snapshot = vec![0u8; self.size()];
        // Infallible: the full range is always in bounds.
        let _ = self.read(0, &mut snapshot);
        snapshot
    }
}
