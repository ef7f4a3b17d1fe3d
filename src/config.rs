use std::time::Duration;

use crate::constants::{DEFAULT_MAX_IN_FLIGHT_UPDATES, POLL_INTERVAL, UPDATE_TIMEOUT};

/// Tuning knobs for the sync core. The defaults are the protocol's
/// published constants; deployments mostly leave them alone.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Cadence of the synchronizer, receiver, and observer polls.
    pub poll_interval: Duration,
    /// Age at which a partially received update is discarded.
    pub update_timeout: Duration,
    /// Cap on simultaneously reassembling updates.
    pub max_in_flight_updates: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            update_timeout: UPDATE_TIMEOUT,
            max_in_flight_updates: DEFAULT_MAX_IN_FLIGHT_UPDATES,
        }
    }
}
