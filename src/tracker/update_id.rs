use std::sync::Mutex;

use crate::backends::Clock;

/// Generates the 64-bit ids that group the frames of a multi-frame
/// update: a coarse monotonic tick in the high bits, a random value in
/// the low bits. A collision with the immediately previous id is
/// bumped by one, so consecutive ids from one process never repeat.
pub(crate) struct UpdateIdGenerator {
    last: Mutex<u64>,
}

impl UpdateIdGenerator {
    pub fn new() -> Self {
        Self { last: Mutex::new(0) }
    }

    pub fn generate(&self) -> u64 {
        let mut id = (Clock::elapsed_millis() << 32) | u64::from(fastrand::u32(..));
        match self.last.lock() {
            Ok(mut last) => {
                if id == *last {
                    id = id.wrapping_add(1);
                }
                *last = id;
            }
            Err(_) => {
                // Poisoned: fall through with the raw id; collisions
                // stay probabilistic.
            }
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_ids_differ() {
        let ids = UpdateIdGenerator::new();
        let mut previous = ids.generate();
        for _ in 0..1000 {
            let next = ids.generate();
            assert_ne!(next, previous);
            previous = next;
        }
    }

    #[test]
    fn tick_occupies_the_high_bits() {
        let ids = UpdateIdGenerator::new();
        let id = ids.generate();
        let tick = id >> 32;
        // The process clock starts near zero, so early ticks are small.
        assert!(tick <= Clock::elapsed_millis());
    }
}
