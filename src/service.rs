use std::{
    net::{SocketAddr, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
    thread::JoinHandle,
};

use log::{info, warn};
use thiserror::Error;

use crate::{
    backends::Clock,
    config::SyncConfig,
    peer::PeerRoster,
    protocol::SyncFrame,
    region::{MappingProvider, RegionError, RegionHandle, RegionObserver, RegionRegistry},
    sync::{spawn_receiver, spawn_synchronizer, SyncSupervisor, SynchronizerContext},
    tracker::{ChangeTracker, UpdateListener},
    transport::{PacketReceiver, PacketSender, TransportError, UdpTransport},
};

/// Errors surfaced by the service's initialization paths. Worker-side
/// failures never land here; they are logged and recovered in place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Region error
    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Operation needs the datagram transport, which is not bound yet
    #[error("The datagram transport is not bound; call bind or bind_udp first")]
    NotBound,

    /// The transport is already bound; a service binds at most once
    #[error("The datagram transport is already bound")]
    AlreadyBound,
}

/// The replication core: region registry, change tracker, peer roster,
/// and worker supervision behind one value. Create it once at start-up;
/// every worker thread borrows the pieces it needs from here.
pub struct SyncService {
    config: SyncConfig,
    registry: Arc<RegionRegistry>,
    tracker: Arc<ChangeTracker>,
    roster: Arc<PeerRoster>,
    supervisor: SyncSupervisor,
    running: Arc<AtomicBool>,
    sender: RwLock<Option<Arc<dyn PacketSender>>>,
    receiver_thread: Mutex<Option<JoinHandle<()>>>,
}

impl SyncService {
    pub fn new(provider: Box<dyn MappingProvider>, config: SyncConfig) -> Self {
        let registry = Arc::new(RegionRegistry::new(provider, config.poll_interval));
        let tracker = Arc::new(ChangeTracker::new(
            registry.clone(),
            config.update_timeout,
            config.max_in_flight_updates,
        ));
        Self {
            config,
            registry,
            tracker,
            roster: Arc::new(PeerRoster::new()),
            supervisor: SyncSupervisor::new(),
            running: Arc::new(AtomicBool::new(false)),
            sender: RwLock::new(None),
            receiver_thread: Mutex::new(None),
        }
    }

    // Transport lifecycle

    /// Attaches a transport pair and starts the receiver worker.
    pub fn bind(
        &self,
        sender: Box<dyn PacketSender>,
        receiver: Box<dyn PacketReceiver>,
    ) -> Result<(), ServiceError> {
        {
            let Ok(mut slot) = self.sender.write() else {
                return Err(ServiceError::NotBound);
            };
            if slot.is_some() {
                return Err(ServiceError::AlreadyBound);
            }
            *slot = Some(Arc::from(sender));
        }

        self.running.store(true, Ordering::Release);
        let thread = spawn_receiver(
            receiver,
            self.tracker.clone(),
            self.running.clone(),
            self.config.poll_interval,
        );
        if let Ok(mut receiver_thread) = self.receiver_thread.lock() {
            *receiver_thread = Some(thread);
        }
        info!("sync transport bound; receiver worker started");
        Ok(())
    }

    /// Binds a UDP endpoint on `address` and starts the receiver worker.
    pub fn bind_udp(&self, address: SocketAddr) -> Result<(), ServiceError> {
        let (sender, receiver) = UdpTransport::bind(address)?;
        self.bind(sender, receiver)
    }

    // Region lifecycle

    /// Creates (or attaches to) a named region. Idempotent.
    pub fn initialize_region(&self, name: &str, size: usize) -> Result<(), ServiceError> {
        Ok(self.registry.initialize(name, size)?)
    }

    /// A handle to the named region's bytes.
    pub fn region(&self, name: &str) -> Result<RegionHandle, ServiceError> {
        Ok(self.registry.region(name)?)
    }

    /// Stops observation and synchronization of the region, unmaps it,
    /// and forgets it. Unknown names are a no-op.
    pub fn cleanup_region(&self, name: &str) -> Result<(), ServiceError> {
        self.supervisor.stop(name);
        Ok(self.registry.cleanup(name)?)
    }

    /// Invokes `observer` with a snapshot whenever the region's version
    /// advances locally.
    pub fn register_observer(
        &self,
        name: &str,
        observer: Arc<dyn RegionObserver>,
    ) -> Result<(), ServiceError> {
        Ok(self.registry.register_observer(name, observer)?)
    }

    /// True iff the region's version is past the caller's baseline.
    pub fn has_changed(&self, name: &str, baseline_version: u64) -> bool {
        self.registry.has_changed(name, baseline_version)
    }

    // Change tracking

    /// Records a changed byte range for emission and bumps the
    /// region's version.
    pub fn mark_region_changed(&self, name: &str, offset: usize, size: usize) {
        self.tracker.mark_region_changed(name, offset, size)
    }

    /// Marks a single field of the region's record as changed.
    pub fn mark_field_changed(&self, name: &str, field_offset: usize, field_size: usize) {
        self.tracker.mark_field_changed(name, field_offset, field_size)
    }

    /// Fires once per frame applied from the network.
    pub fn register_update_listener(&self, listener: Arc<dyn UpdateListener>) {
        self.tracker.register_listener(listener)
    }

    // Peers

    /// Adds a peer to the roster and probes its reachability. A failed
    /// probe is logged; the peer stays (its endpoint may come up later).
    pub fn connect(&self, host: &str, port: u16) -> Result<(), ServiceError> {
        let address = resolve_peer(host, port)?;
        let sender = self.sender()?;

        if !self.roster.insert(address) {
            return Ok(());
        }

        let probe = SyncFrame::probe(Clock::wire_tick());
        if let Err(err) = sender.send(&address, probe.to_bytes().as_slice()) {
            warn!("connectivity probe to {address} failed: {err}");
        } else {
            info!("peer {address} added to roster");
        }
        Ok(())
    }

    // Synchronization workers

    /// Starts the per-region synchronizer worker. Requires the region
    /// to exist and the transport to be bound; starting twice is a
    /// no-op.
    pub fn start_region_sync(&self, name: &str) -> Result<(), ServiceError> {
        let handle = self.registry.region(name)?;
        let sender = self.sender()?;

        let tracker = self.tracker.clone();
        let roster = self.roster.clone();
        let global_running = self.running.clone();
        let poll_interval = self.config.poll_interval;
        self.supervisor.start(name, move |worker_running| {
            spawn_synchronizer(
                SynchronizerContext {
                    handle,
                    tracker,
                    roster,
                    sender,
                    poll_interval,
                },
                global_running,
                worker_running,
            )
        });
        Ok(())
    }

    /// Cooperatively stops the region's synchronizer worker. Unknown
    /// names are a no-op.
    pub fn stop_region_sync(&self, name: &str) {
        self.supervisor.stop(name)
    }

    /// True while the region has a running synchronizer worker.
    pub fn is_syncing(&self, name: &str) -> bool {
        self.supervisor.is_running(name)
    }

    /// Stops every worker, clears the roster, and drops all tracker
    /// state. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);

        let receiver = self
            .receiver_thread
            .lock()
            .ok()
            .and_then(|mut thread| thread.take());
        if let Some(thread) = receiver {
            if thread.join().is_err() {
                warn!("receiver worker panicked during shutdown");
            }
        }

        self.supervisor.stop_all();
        self.roster.clear();
        self.tracker.clear();
        if was_running {
            info!("sync service shut down");
        }
    }

    fn sender(&self) -> Result<Arc<dyn PacketSender>, ServiceError> {
        self.sender
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or(ServiceError::NotBound)
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn resolve_peer(host: &str, port: u16) -> Result<SocketAddr, ServiceError> {
    let mut addresses = (host, port).to_socket_addrs().map_err(|_| {
        ServiceError::Transport(TransportError::InvalidAddress {
            address: format!("{host}:{port}"),
        })
    })?;
    addresses
        .next()
        .ok_or(ServiceError::Transport(TransportError::InvalidAddress {
            address: format!("{host}:{port}"),
        }))
}

#[cfg(test)]
mod tests {
    use crate::region::LocalMemoryProvider;
    use crate::transport::PacketHub;

    use super::*;

    fn service() -> SyncService {
        SyncService::new(Box::new(LocalMemoryProvider::new()), SyncConfig::default())
    }

    #[test]
    fn connect_requires_a_bound_transport() {
        let service = service();
        assert_eq!(
            service.connect("127.0.0.1", 9000),
            Err(ServiceError::NotBound)
        );
    }

    #[test]
    fn binding_twice_is_refused() {
        let service = service();
        let hub = PacketHub::new();
        let address = "127.0.0.1:7000".parse().expect("valid address");
        let (sender, receiver) = hub.endpoint(address);
        service.bind(sender, receiver).expect("first bind");

        let (sender, receiver) = hub.endpoint(address);
        assert_eq!(
            service.bind(sender, receiver),
            Err(ServiceError::AlreadyBound)
        );
        service.shutdown();
    }

    #[test]
    fn start_region_sync_requires_the_region() {
        let service = service();
        let hub = PacketHub::new();
        let (sender, receiver) = hub.endpoint("127.0.0.1:7001".parse().expect("valid address"));
        service.bind(sender, receiver).expect("bind");

        assert!(matches!(
            service.start_region_sync("ghost"),
            Err(ServiceError::Region(RegionError::UnknownRegion { .. }))
        ));
        service.shutdown();
    }

    #[test]
    fn connect_rejects_garbage_addresses() {
        let service = service();
        let hub = PacketHub::new();
        let (sender, receiver) = hub.endpoint("127.0.0.1:7002".parse().expect("valid address"));
        service.bind(sender, receiver).expect("bind");

        assert!(matches!(
            service.connect("not an address", 0),
            Err(ServiceError::Transport(TransportError::InvalidAddress { .. }))
        ));
        service.shutdown();
    }
}
