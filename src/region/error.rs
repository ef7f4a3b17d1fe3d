use thiserror::Error;

/// Errors that can occur during region registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    /// The mapping provider failed to create, open, or map a region
    #[error("Mapping of region '{name}' failed: {reason}")]
    MappingFailed {
        name: String,
        reason: String,
    },

    /// Operation targeted a region that is neither registered nor attachable
    #[error("Region '{name}' is not registered; initialize it before use")]
    UnknownRegion {
        name: String,
    },

    /// Region name is empty, too long, or contains non-printable bytes
    #[error("'{name}' is not a valid region name (printable ASCII, 1-{max} bytes)")]
    InvalidName {
        name: String,
        max: usize,
    },

    /// Requested size cannot hold the region metadata prefix
    #[error("Region size of {size} bytes is smaller than the {header} byte metadata prefix")]
    SizeTooSmall {
        size: usize,
        header: usize,
    },

    /// A read, write, or applied frame fell outside the region bounds
    #[error("Range [{offset}, {offset}+{size}) is out of bounds for region '{name}' of {region_size} bytes")]
    RangeOutOfBounds {
        name: String,
        offset: usize,
        size: usize,
        region_size: usize,
    },
}
