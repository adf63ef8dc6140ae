use std::io;

use hddsaver_platform::RegionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HddSaverError>;

#[derive(Debug, Error)]
pub enum HddSaverError {
    /// No supported chip answered, or it answered with an unusable configuration.
    #[error("no supported Super-I/O chip found")]
    DeviceNotFound,

    #[error("Super-I/O ports at {port:#06x} are busy")]
    DeviceBusy { port: u16 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("board is not known to wire the HDD Saver GPIO")]
    UnsupportedPlatform,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    #[error("ports {start:#06x}+{len} are reserved by firmware ({owner})")]
    ResourceConflict { start: u16, len: u16, owner: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl HddSaverError {
    /// True for the outcomes that mean "the feature is simply not there" rather than a fault.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            HddSaverError::DeviceNotFound
                | HddSaverError::UnsupportedPlatform
                | HddSaverError::ResourceConflict { .. }
        )
    }
}

impl From<RegionError> for HddSaverError {
    fn from(err: RegionError) -> Self {
        match err {
            RegionError::Busy { start, .. } => HddSaverError::DeviceBusy { port: start },
            RegionError::Reserved { start, len, owner } => {
                HddSaverError::ResourceConflict { start, len, owner }
            }
            RegionError::TableFull { .. } => HddSaverError::ResourceExhausted("port region table"),
            RegionError::InvalidRange { start, len } => HddSaverError::InvalidArgument(format!(
                "port range {start:#06x}+{len} is outside the I/O space"
            )),
        }
    }
}
