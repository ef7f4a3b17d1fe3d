mod clock;

pub use clock::{Clock, ClockError};
