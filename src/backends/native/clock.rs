use std::{
    sync::OnceLock,
    time::{Instant, SystemTime},
};

use thiserror::Error;

/// Errors that can occur when reading the wall clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClockError {
    /// The system clock reads earlier than the UNIX epoch
    #[error("System clock reads earlier than the UNIX epoch; cannot produce a timestamp")]
    BeforeUnixEpoch,
}

/// Time source for the sync workers: a process-monotonic millisecond
/// tick for scheduling and update-id generation, plus wall-clock
/// seconds for a region's `last_modified` word.
pub struct Clock;

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

impl Clock {
    fn start() -> Instant {
        *PROCESS_START.get_or_init(Instant::now)
    }

    /// Milliseconds elapsed since the first call into this clock.
    /// Monotonic, never goes backwards.
    pub fn elapsed_millis() -> u64 {
        Self::start().elapsed().as_millis() as u64
    }

    /// Coarse tick placed in the wire frame's timestamp field. Advisory
    /// only; wraps after ~49 days.
    pub fn wire_tick() -> u32 {
        Self::elapsed_millis() as u32
    }

    /// Seconds of UNIX time right now. Fails only on hosts whose clock
    /// predates the epoch.
    pub fn wall_seconds() -> Result<u64, ClockError> {
        let since_epoch = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_err(|_| ClockError::BeforeUnixEpoch)?;
        Ok(since_epoch.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_millis_is_monotonic() {
        let first = Clock::elapsed_millis();
        let second = Clock::elapsed_millis();
        assert!(second >= first);
    }

    #[test]
    fn wall_seconds_reads_a_post_epoch_clock() {
        assert!(Clock::wall_seconds().expect("clock after epoch") > 0);
    }
}
