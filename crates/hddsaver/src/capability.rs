//! HDD Saver presence detection.
//!
//! The NCT6791 exposes a strap bit (global register `0x2A`, bit 6) that ASRock boards use to
//! route GPIO10 to the SATA power switch. Other vendors wire the same pin differently, so the
//! bit is only believed on boards that are known to use it.

use bitflags::bitflags;
use hddsaver_platform::BoardIdentity;
use tracing::{debug, info};

use crate::chip::{ChipKind, LD_GPIO_DATA};
use crate::superio::{BitUpdate, SuperIoSession};

pub const NCT6791_REG_GPIO_STRAP: u8 = 0x2A;
pub const HDD_SAVER_STRAP_BIT: u8 = 6;

/// GPIO1 data register in logical device 8.
pub const NCT6791_REG_GPIO1_DATA: u8 = 0xF1;
/// GPIO10, the SATA power switch. The pin is active low.
pub const HDD_SAVER_GPIO_BIT: u8 = 0;

/// Flips the SATA power switch.
pub const HDD_SAVER_TOGGLE: BitUpdate =
    BitUpdate::toggle(NCT6791_REG_GPIO1_DATA, HDD_SAVER_GPIO_BIT);

pub const DEFAULT_BOARD_VENDOR: &str = "ASRock";
pub const DEFAULT_BOARD_MODELS: &[&str] = &["Z97 Extreme4", "Z97 Extreme6", "X99 Extreme4/3.1"];

bitflags! {
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct CapabilityFlags: u8 {
        const HDD_SAVER_GPIO = 1 << 0;
    }
}

impl CapabilityFlags {
    pub fn has_hdd_saver_gpio(self) -> bool {
        self.contains(CapabilityFlags::HDD_SAVER_GPIO)
    }
}

/// Boards whose firmware strings are trusted to mean "the strap bit is the HDD Saver".
///
/// Matching is exact and case-sensitive against the raw DMI strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardAllowList {
    vendor: String,
    models: Vec<String>,
}

impl BoardAllowList {
    pub fn new<I, S>(vendor: impl Into<String>, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vendor: vendor.into(),
            models: models.into_iter().map(Into::into).collect(),
        }
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn matches(&self, board: &BoardIdentity) -> bool {
        let (Some(vendor), Some(name)) = (board.vendor.as_deref(), board.name.as_deref()) else {
            return false;
        };
        vendor == self.vendor && self.models.iter().any(|m| m == name)
    }
}

impl Default for BoardAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_BOARD_VENDOR, DEFAULT_BOARD_MODELS.iter().copied())
    }
}

/// Reads the strap register and combines it with the board gate.
pub fn detect(
    session: &SuperIoSession<'_>,
    kind: ChipKind,
    board: &BoardIdentity,
    allow: &BoardAllowList,
) -> CapabilityFlags {
    let strap = session.inb(NCT6791_REG_GPIO_STRAP);

    let mut flags = CapabilityFlags::empty();
    match kind {
        ChipKind::Nct6791 => {
            if allow.matches(board) {
                flags.set(
                    CapabilityFlags::HDD_SAVER_GPIO,
                    strap & (1 << HDD_SAVER_STRAP_BIT) != 0,
                );
            } else {
                debug!(
                    "board {:?}/{:?} is not on the HDD Saver allow-list",
                    board.vendor, board.name
                );
            }
        }
    }

    if flags.has_hdd_saver_gpio() {
        info!("HDD Saver found");
    }
    flags
}

/// Reads the switch position. The GPIO is active low: a set bit means the drives are unpowered.
pub fn read_gpio_status(session: &SuperIoSession<'_>) -> bool {
    session.select(LD_GPIO_DATA);
    let data = session.inb(NCT6791_REG_GPIO1_DATA);
    data & (1 << HDD_SAVER_GPIO_BIT) == 0
}
