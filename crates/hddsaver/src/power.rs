//! SATA power switch state and the requests that read, flip and re-synchronize it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hddsaver_platform::{Clock, PortBus, RegionRegistry};
use tracing::{debug, info, warn};

use crate::capability::{read_gpio_status, CapabilityFlags, HDD_SAVER_TOGGLE};
use crate::chip::{enable_io_mapping, ChipIdentity, LD_GPIO_DATA, LD_HWM};
use crate::error::{HddSaverError, Result};
use crate::superio::{SuperIoSession, SIO_REG_ENABLE};

/// Bank cache value that forces the next monitor access to reselect its bank.
pub const BANK_UNSELECTED: u8 = 0xFF;

/// Parses a boolean the way kernel attribute files do: only the first one or two characters
/// count.
///
/// `y`, `t`, `e`, `1` and `on` are true; `n`, `f`, `d`, `0` and `off` are false (any case).
pub fn parse_bool(input: &str) -> Result<bool> {
    let s = input.trim().as_bytes();
    match s.first().copied() {
        Some(b'y' | b'Y' | b't' | b'T' | b'e' | b'E' | b'1') => return Ok(true),
        Some(b'n' | b'N' | b'f' | b'F' | b'd' | b'D' | b'0') => return Ok(false),
        Some(b'o' | b'O') => match s.get(1).copied() {
            Some(b'n' | b'N') => return Ok(true),
            Some(b'f' | b'F') => return Ok(false),
            _ => {}
        },
        _ => {}
    }
    Err(HddSaverError::InvalidArgument(format!(
        "expected a boolean, got {:?}",
        input.trim()
    )))
}

pub fn on_off(on: bool) -> &'static str {
    if on {
        "On"
    } else {
        "Off"
    }
}

/// Everything guarded by the update lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerState {
    status_on: bool,
    last_updated: Option<Duration>,
    valid: bool,
    sio_enable_shadow: u8,
    bank: u8,
}

impl PowerState {
    pub fn new(status_on: bool, sio_enable_shadow: u8) -> Self {
        Self {
            status_on,
            last_updated: None,
            valid: false,
            sio_enable_shadow,
            bank: BANK_UNSELECTED,
        }
    }

    pub fn status_on(&self) -> bool {
        self.status_on
    }

    /// Clock reading of the last cache refresh.
    pub fn last_updated(&self) -> Option<Duration> {
        self.last_updated
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Hardware monitor enable register as captured at probe time.
    pub fn sio_enable_shadow(&self) -> u8 {
        self.sio_enable_shadow
    }

    pub fn bank(&self) -> u8 {
        self.bank
    }

    fn is_stale(&self, now: Duration, interval: Duration) -> bool {
        match self.last_updated {
            Some(at) => now.saturating_sub(at) > interval,
            None => true,
        }
    }
}

/// The switch, its cached state and the hardware handles needed to change it.
pub struct PowerControl {
    identity: ChipIdentity,
    caps: CapabilityFlags,
    bus: Arc<dyn PortBus>,
    regions: RegionRegistry,
    clock: Arc<dyn Clock>,
    refresh_interval: Duration,
    restore_on_resume: bool,
    state: Mutex<PowerState>,
}

pub(crate) struct PowerControlParts {
    pub identity: ChipIdentity,
    pub caps: CapabilityFlags,
    pub bus: Arc<dyn PortBus>,
    pub regions: RegionRegistry,
    pub clock: Arc<dyn Clock>,
    pub refresh_interval: Duration,
    pub restore_on_resume: bool,
    pub initial: PowerState,
}

impl PowerControl {
    pub(crate) fn new(parts: PowerControlParts) -> Self {
        Self {
            identity: parts.identity,
            caps: parts.caps,
            bus: parts.bus,
            regions: parts.regions,
            clock: parts.clock,
            refresh_interval: parts.refresh_interval,
            restore_on_resume: parts.restore_on_resume,
            state: Mutex::new(parts.initial),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PowerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn identity(&self) -> &ChipIdentity {
        &self.identity
    }

    pub fn capabilities(&self) -> CapabilityFlags {
        self.caps
    }

    /// Copy of the locked state, for diagnostics.
    pub fn snapshot(&self) -> PowerState {
        self.lock().clone()
    }

    /// Current switch position. Never touches hardware: the position only changes through
    /// [`PowerControl::set_status`] and [`PowerControl::resume`], both under the same lock.
    pub fn status(&self) -> bool {
        let mut state = self.lock();
        let now = self.clock.now();
        if !state.valid || state.is_stale(now, self.refresh_interval) {
            state.last_updated = Some(now);
            state.valid = true;
        }
        state.status_on
    }

    /// Moves the switch to `on`.
    ///
    /// A request for the current position performs no port access beyond entering and leaving
    /// configuration mode. Busy ports fail immediately with [`HddSaverError::DeviceBusy`].
    pub fn set_status(&self, on: bool) -> Result<()> {
        if !self.caps.has_hdd_saver_gpio() {
            return Err(HddSaverError::UnsupportedPlatform);
        }

        info!("changing HDD Saver to {}", on_off(on));
        let mut state = self.lock();
        let session = SuperIoSession::enter(&*self.bus, &self.regions, self.identity.sio_base)?;

        if on != state.status_on {
            session.select(LD_GPIO_DATA);
            session.update(HDD_SAVER_TOGGLE);
            state.status_on = on;
            info!("HDD Saver is {}", on_off(on));
        }

        session.exit();
        Ok(())
    }

    /// Waits for any in-flight request to finish. Nothing is saved: the switch is expected to
    /// keep its position across S3 on this board family.
    pub fn suspend(&self) {
        debug!("suspend: draining requests");
        drop(self.lock());
    }

    /// Restores what a low-power transition may have reset and invalidates the cache.
    ///
    /// A failure is logged and returned but leaves the device usable for later requests.
    pub fn resume(&self) -> Result<()> {
        let mut state = self.lock();
        state.bank = BANK_UNSELECTED;

        let result = self.resync(&mut state);
        if let Err(err) = &result {
            warn!("resume: could not re-synchronize the Super-I/O chip: {err}");
        }

        state.valid = false;
        result
    }

    fn resync(&self, state: &mut PowerState) -> Result<()> {
        let session = SuperIoSession::enter(&*self.bus, &self.regions, self.identity.sio_base)?;

        session.select(LD_HWM);
        let enable = session.inb(SIO_REG_ENABLE);
        if enable != state.sio_enable_shadow {
            debug!(
                "resume: restoring monitor enable {enable:#04x} -> {:#04x}",
                state.sio_enable_shadow
            );
            session.outb(SIO_REG_ENABLE, state.sio_enable_shadow);
        }

        if self.identity.kind.needs_io_space_unlock() {
            enable_io_mapping(&session);
        }

        if self.caps.has_hdd_saver_gpio() {
            let hw_on = read_gpio_status(&session);
            if hw_on != state.status_on {
                if self.restore_on_resume {
                    warn!(
                        "resume: HDD Saver came back {}, restoring {}",
                        on_off(hw_on),
                        on_off(state.status_on)
                    );
                    session.update(HDD_SAVER_TOGGLE);
                } else {
                    warn!("resume: HDD Saver came back {}", on_off(hw_on));
                    state.status_on = hw_on;
                }
            }
        }

        session.exit();
        Ok(())
    }
}
