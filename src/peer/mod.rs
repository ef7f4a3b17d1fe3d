use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::Mutex,
};

/// Set of remote endpoints that receive every emitted frame. No
/// duplicates; insertion order is irrelevant.
pub struct PeerRoster {
    peers: Mutex<HashSet<SocketAddr>>,
}

impl PeerRoster {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashSet::new()),
        }
    }

    /// Adds a peer. Returns false if it was already present.
    pub fn insert(&self, address: SocketAddr) -> bool {
        self.peers
            .lock()
            .map(|mut peers| peers.insert(address))
            .unwrap_or(false)
    }

    /// Snapshot for fan-out; taken under the roster lock so sends can
    /// run outside it.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.peers
            .lock()
            .map(|peers| peers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, address: &SocketAddr) -> bool {
        self.peers
            .lock()
            .map(|peers| peers.contains(address))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.peers.lock().map(|peers| peers.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut peers) = self.peers.lock() {
            peers.clear();
        }
    }
}

impl Default for PeerRoster {
    fn default() -> Self {
        Self::new()
    }
}
