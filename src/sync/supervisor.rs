use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

use log::warn;

/// A started per-region worker: its cancellation flag and the handle
/// to join it on.
pub(crate) struct WorkerHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Owns the map of region name to synchronizer worker. Shutdown is
/// cooperative: clear the worker's flag, then join.
pub(crate) struct SyncSupervisor {
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl SyncSupervisor {
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a worker for the region unless one is already running.
    /// The spawn closure receives the worker's cancellation flag.
    pub fn start<F>(&self, name: &str, spawn: F)
    where
        F: FnOnce(Arc<AtomicBool>) -> JoinHandle<()>,
    {
        let Ok(mut workers) = self.workers.lock() else {
            warn!("sync-worker table poisoned; cannot start worker for '{name}'");
            return;
        };
        if workers.contains_key(name) {
            // Already syncing this region, nothing to do.
            return;
        }
        let running = Arc::new(AtomicBool::new(true));
        let thread = spawn(running.clone());
        workers.insert(name.to_string(), WorkerHandle { running, thread });
    }

    /// Stops and joins the region's worker. Unknown names are a no-op.
    pub fn stop(&self, name: &str) {
        let handle = {
            let Ok(mut workers) = self.workers.lock() else {
                return;
            };
            workers.remove(name)
        };
        if let Some(handle) = handle {
            handle.running.store(false, Ordering::Release);
            if handle.thread.join().is_err() {
                warn!("synchronizer worker for region '{name}' panicked");
            }
        }
    }

    /// Stops and joins every worker. Flags drop first so the workers
    /// wind down in parallel before the joins.
    pub fn stop_all(&self) {
        let drained: Vec<(String, WorkerHandle)> = {
            let Ok(mut workers) = self.workers.lock() else {
                return;
            };
            workers.drain().collect()
        };
        for (_, handle) in &drained {
            handle.running.store(false, Ordering::Release);
        }
        for (name, handle) in drained {
            if handle.thread.join().is_err() {
                warn!("synchronizer worker for region '{name}' panicked");
            }
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.workers
            .lock()
            .map(|workers| workers.contains_key(name))
            .unwrap_or(false)
    }
}
