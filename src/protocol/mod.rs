mod error;
mod frame;

pub use error::FrameError;
pub use frame::{MessageType, SyncFrame, FRAME_BYTES};
