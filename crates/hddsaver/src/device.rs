//! Driver registration, probe and the bound device handle.
//!
//! ```text
//! HddSaverDriver::register
//!   find           (chip ID, monitor base, enable + unlock; retried while busy)
//!   check_reserved (firmware owns the monitor ports?)
//!   probe          (claim monitor ports with bounded retry, detect, capture initial state)
//! HddSaverDevice
//!   show_status / store_status, suspend / resume, remove
//! ```

use std::fmt;
use std::sync::Arc;

use hddsaver_platform::{
    BoardIdentity, Clock, MonotonicClock, PortBus, RegionGuard, RegionRegistry,
};
use tracing::{info, warn};

use crate::capability::{self, CapabilityFlags};
use crate::chip::{self, ChipIdentity, LD_HWM};
use crate::config::DriverConfig;
use crate::error::{HddSaverError, Result};
use crate::power::{on_off, parse_bool, PowerControl, PowerControlParts, PowerState};
use crate::superio::{SuperIoSession, DRVNAME, SIO_REG_ENABLE};

/// Binds HDD Saver devices on one port bus.
pub struct HddSaverDriver {
    config: DriverConfig,
    bus: Arc<dyn PortBus>,
    regions: RegionRegistry,
    clock: Arc<dyn Clock>,
}

impl HddSaverDriver {
    /// `regions` must be the table shared with every other consumer of the same chip.
    pub fn new(
        config: DriverConfig,
        bus: Arc<dyn PortBus>,
        regions: RegionRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            bus,
            regions,
            clock,
        }
    }

    /// Driver with a private region table and the host's monotonic clock.
    pub fn with_defaults(config: DriverConfig, bus: Arc<dyn PortBus>) -> Self {
        let regions = RegionRegistry::with_capacity(config.max_regions);
        Self::new(config, bus, regions, Arc::new(MonotonicClock::new()))
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn regions(&self) -> &RegionRegistry {
        &self.regions
    }

    /// Finds the chip and binds a device to it.
    pub fn register(&self, board: &BoardIdentity) -> Result<HddSaverDevice> {
        let sio_base = self.config.sio_base;
        let identity =
            self.retry_busy(sio_base, || chip::find(&*self.bus, &self.regions, sio_base))?;

        let (start, len) = identity.hwm_region();
        if let Err(err) = self.regions.check_reserved(start, len) {
            warn!("not binding: {err}");
            return Err(err.into());
        }

        self.probe(identity, board)
    }

    /// Binds a device to an already identified chip.
    pub fn probe(&self, identity: ChipIdentity, board: &BoardIdentity) -> Result<HddSaverDevice> {
        let (start, len) = identity.hwm_region();
        let hwm_region = self.retry_busy(start, || self.regions.try_claim(start, len, DRVNAME))?;

        let session = self.retry_busy(identity.sio_base, || {
            SuperIoSession::enter(&*self.bus, &self.regions, identity.sio_base)
        })?;

        let caps = capability::detect(&session, identity.kind, board, &self.config.allow_list);
        let status_on = if caps.has_hdd_saver_gpio() {
            let on = capability::read_gpio_status(&session);
            info!("HDD Saver is {}", on_off(on));
            on
        } else {
            false
        };

        session.select(LD_HWM);
        let enable_shadow = session.inb(SIO_REG_ENABLE);
        session.exit();

        let power = PowerControl::new(PowerControlParts {
            identity,
            caps,
            bus: self.bus.clone(),
            regions: self.regions.clone(),
            clock: self.clock.clone(),
            refresh_interval: self.config.refresh_interval,
            restore_on_resume: self.config.restore_on_resume,
            initial: PowerState::new(status_on, enable_shadow),
        });

        Ok(HddSaverDevice {
            power,
            _hwm_region: hwm_region,
        })
    }

    /// Runs `attempt` until it stops reporting busy, at most `claim_retries` times.
    fn retry_busy<T, E, F>(&self, port: u16, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, E>,
        E: Into<HddSaverError>,
    {
        let tries = self.config.claim_retries.max(1);
        for n in 1..=tries {
            let result: Result<T> = attempt().map_err(Into::into);
            match result {
                Ok(value) => return Ok(value),
                Err(HddSaverError::DeviceBusy { .. }) if n < tries => {
                    warn!("ports at {port:#06x} busy, retrying chip access ({n}/{tries})");
                    self.clock.sleep(self.config.claim_backoff);
                }
                Err(HddSaverError::DeviceBusy { .. }) => break,
                Err(err) => return Err(err),
            }
        }
        warn!("chip at {port:#06x} is busy");
        Err(HddSaverError::DeviceBusy { port })
    }
}

/// A bound HDD Saver. Dropping it (or calling [`HddSaverDevice::remove`]) releases the monitor
/// ports claimed at probe time.
pub struct HddSaverDevice {
    power: PowerControl,
    _hwm_region: RegionGuard,
}

impl fmt::Debug for HddSaverDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = self.identity();
        f.debug_struct("HddSaverDevice")
            .field("kind", &identity.kind)
            .field("sio_base", &format_args!("{:#06x}", identity.sio_base))
            .field("hwm_base", &format_args!("{:#06x}", identity.hwm_base))
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

impl HddSaverDevice {
    pub fn identity(&self) -> &ChipIdentity {
        self.power.identity()
    }

    pub fn capabilities(&self) -> CapabilityFlags {
        self.power.capabilities()
    }

    pub fn has_hdd_saver(&self) -> bool {
        self.capabilities().has_hdd_saver_gpio()
    }

    pub fn power(&self) -> &PowerControl {
        &self.power
    }

    /// Always refreshes the cache bookkeeping; reports off when the board lacks the switch.
    pub fn status(&self) -> bool {
        let on = self.power.status();
        self.has_hdd_saver() && on
    }

    pub fn set_status(&self, on: bool) -> Result<()> {
        self.power.set_status(on)
    }

    /// Contents of the status attribute: `"On\n"` or `"Off\n"`.
    pub fn show_status(&self) -> String {
        format!("{}\n", on_off(self.status()))
    }

    /// Parses and applies a write to the status attribute, returning the bytes consumed.
    pub fn store_status(&self, input: &str) -> Result<usize> {
        let on = parse_bool(input)?;
        self.set_status(on)?;
        Ok(input.len())
    }

    pub fn suspend(&self) {
        self.power.suspend();
    }

    pub fn resume(&self) -> Result<()> {
        self.power.resume()
    }

    pub fn remove(self) {
        let identity = *self.identity();
        drop(self);
        info!(
            "removed {} at {:#x}:{:#x}",
            identity.kind.name(),
            identity.sio_base,
            identity.hwm_base
        );
    }
}
