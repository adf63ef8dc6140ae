use std::time::Duration;

use hddsaver_platform::region::DEFAULT_REGION_CAPACITY;

use crate::capability::BoardAllowList;

/// Standard Super-I/O configuration port.
pub const DEFAULT_SIO_BASE: u16 = 0x2E;
/// Alternate configuration port some boards strap the chip to.
pub const ALT_SIO_BASE: u16 = 0x4E;

/// Attempts made to claim the chip while a co-resident monitor driver holds it.
pub const DEFAULT_CLAIM_RETRIES: u32 = 5;
pub const DEFAULT_CLAIM_BACKOFF: Duration = Duration::from_millis(100);

/// How long a cached status stays fresh (`HZ + HZ / 2`).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Index port of the Super-I/O configuration pair.
    pub sio_base: u16,
    /// Total claim attempts during probe. Runtime requests never retry.
    pub claim_retries: u32,
    /// Sleep between probe claim attempts.
    pub claim_backoff: Duration,
    pub refresh_interval: Duration,
    pub allow_list: BoardAllowList,
    /// On resume, put the SATA power switch back where it was before suspend if the chip lost
    /// it. When false the hardware value is adopted instead.
    pub restore_on_resume: bool,
    /// Capacity of the region table created by [`crate::HddSaverDriver::with_defaults`].
    pub max_regions: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            sio_base: DEFAULT_SIO_BASE,
            claim_retries: DEFAULT_CLAIM_RETRIES,
            claim_backoff: DEFAULT_CLAIM_BACKOFF,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            allow_list: BoardAllowList::default(),
            restore_on_resume: true,
            max_regions: DEFAULT_REGION_CAPACITY,
        }
    }
}

impl DriverConfig {
    pub fn with_sio_base(mut self, sio_base: u16) -> Self {
        self.sio_base = sio_base;
        self
    }

    pub fn with_allow_list(mut self, allow_list: BoardAllowList) -> Self {
        self.allow_list = allow_list;
        self
    }
}
