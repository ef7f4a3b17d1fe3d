mod receiver;
mod supervisor;
mod synchronizer;

pub(crate) use receiver::spawn_receiver;
pub(crate) use supervisor::SyncSupervisor;
pub(crate) use synchronizer::{spawn_synchronizer, SynchronizerContext};
