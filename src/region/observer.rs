use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::warn;

use super::{layout::HeaderView, mapping::Mapping};

/// Capability object invoked when a region's version advances locally.
/// One per observed region; called from the observer worker thread with
/// a snapshot of the region bytes.
pub trait RegionObserver: Send + Sync {
    fn region_changed(&self, bytes: &[u8]);
}

pub(crate) type ObserverSlot = Arc<RwLock<Option<Arc<dyn RegionObserver>>>>;

/// Spawns the per-region observer worker: snapshot the version, poll,
/// and fire the observer whenever the live version exceeds the
/// snapshot. Exits when `monitoring` is cleared.
pub(crate) fn spawn_observer(
    name: String,
    mapping: Arc<dyn Mapping>,
    slot: ObserverSlot,
    monitoring: Arc<AtomicBool>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut last_version = HeaderView::new(mapping.as_ref()).version();

        while monitoring.load(Ordering::Acquire) {
            let version = HeaderView::new(mapping.as_ref()).version();
            if version > last_version {
                let snapshot = snapshot_bytes(mapping.as_ref());
                match slot.read() {
                    Ok(observer) => {
                        if let Some(observer) = observer.as_ref() {
                            observer.region_changed(&snapshot);
                        }
                    }
                    Err(_) => warn!("observer slot for region '{name}' is poisoned"),
                }
                last_version = version;
            }
            thread::sleep(poll_interval);
        }
    })
}

fn snapshot_bytes(mapping: &dyn Mapping) -> Vec<u8> {
    let mut snapshot = vec![0u8; mapping.len()];
    // SAFETY: the mapping is valid for len() bytes; concurrent payload
    // writes may tear, which observers accept.
    unsafe {
        std::ptr::copy_nonoverlapping(
            mapping.base().as_ptr(),
            snapshot.as_mut_ptr(),
            mapping.len(),
        );
    }
    snapshot
}
