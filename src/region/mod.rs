mod error;
mod layout;
mod mapping;
mod observer;
mod registry;

pub use error::RegionError;
pub use mapping::{LocalMemoryProvider, Mapping, MappingProvider};
#[cfg(unix)]
pub use mapping::SharedMemoryProvider;
pub use observer::RegionObserver;
pub use registry::{RegionHandle, RegionRegistry};
