//! Chip identification and hardware-monitor base discovery.

use hddsaver_platform::{PortBus, RegionRegistry};
use tracing::{debug, error, info, warn};

use crate::error::{HddSaverError, Result};
use crate::superio::{BitUpdate, SuperIoSession, SIO_REG_ADDR, SIO_REG_DEVID, SIO_REG_ENABLE};

/// The low three bits of the device ID carry the silicon revision.
pub const SIO_ID_MASK: u16 = 0xFFF8;
pub const SIO_NCT6791_ID: u16 = 0xC800;

/// What an empty ISA bus returns for the two ID bytes.
pub const SIO_ID_ABSENT: u16 = 0xFFFF;

/// Hardware monitor logical device.
pub const LD_HWM: u8 = 0x0B;
/// GPIO data logical device (GPIO1 lives here on the NCT679x).
pub const LD_GPIO_DATA: u8 = 0x08;

/// Global register holding the hardware-monitor I/O space lock.
pub const NCT6791_REG_HM_IO_SPACE_LOCK: u8 = 0x28;
pub const NCT6791_HM_IO_SPACE_LOCK_BIT: u8 = 4;

pub const LD_ENABLE_BIT: u8 = 0;

/// The monitor's I/O window is 8-byte aligned.
pub const IOREGION_ALIGNMENT: u16 = !7;
/// Offset of the monitor's address/data pair inside its window.
pub const IOREGION_OFFSET: u16 = 5;
pub const IOREGION_LENGTH: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipKind {
    Nct6791,
}

impl ChipKind {
    pub fn from_device_id(id: u16) -> Option<Self> {
        match id & SIO_ID_MASK {
            SIO_NCT6791_ID => Some(ChipKind::Nct6791),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChipKind::Nct6791 => "nct6791",
        }
    }

    /// Whether the monitor's logical device stays hidden until the I/O space lock is cleared.
    pub fn needs_io_space_unlock(self) -> bool {
        matches!(self, ChipKind::Nct6791)
    }
}

/// A chip found by [`find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipIdentity {
    pub kind: ChipKind,
    /// Base of the hardware monitor's 8-byte I/O window.
    pub hwm_base: u16,
    /// Index port of the Super-I/O configuration pair.
    pub sio_base: u16,
}

impl ChipIdentity {
    /// The monitor's address/data port pair, as `(start, len)`.
    pub fn hwm_region(&self) -> (u16, u16) {
        (self.hwm_base + IOREGION_OFFSET, IOREGION_LENGTH)
    }
}

/// Probes `sio_base` for a supported chip and prepares its hardware monitor.
///
/// Absence is the common case and is reported as [`HddSaverError::DeviceNotFound`] without
/// logging anything above debug level.
pub fn find(bus: &dyn PortBus, regions: &RegionRegistry, sio_base: u16) -> Result<ChipIdentity> {
    let session = SuperIoSession::enter(bus, regions, sio_base)?;

    let id = session.read_u16(SIO_REG_DEVID);
    let Some(kind) = ChipKind::from_device_id(id) else {
        if id != SIO_ID_ABSENT {
            debug!("unsupported chip ID: {id:#06x}");
        }
        return Err(HddSaverError::DeviceNotFound);
    };

    session.select(LD_HWM);
    let hwm_base = session.read_u16(SIO_REG_ADDR) & IOREGION_ALIGNMENT;
    if hwm_base == 0 {
        error!("refusing to enable a Super-I/O device with a base I/O port 0");
        return Err(HddSaverError::DeviceNotFound);
    }

    let enable = session.update(BitUpdate::set(SIO_REG_ENABLE, LD_ENABLE_BIT));
    if enable.changed() {
        warn!("forcibly enabled the hardware monitor; sensors are probably unusable");
    }

    if kind.needs_io_space_unlock() {
        enable_io_mapping(&session);
    }

    session.exit();
    info!("found {} at {sio_base:#x}:{hwm_base:#x}", kind.name());

    Ok(ChipIdentity {
        kind,
        hwm_base,
        sio_base,
    })
}

/// Clears the NCT6791 hardware-monitor I/O space lock if the firmware left it set.
pub(crate) fn enable_io_mapping(session: &SuperIoSession<'_>) {
    let change = session.update(BitUpdate::clear(
        NCT6791_REG_HM_IO_SPACE_LOCK,
        NCT6791_HM_IO_SPACE_LOCK_BIT,
    ));
    if change.changed() {
        info!("enabled hardware monitor logical device mappings");
    }
}
