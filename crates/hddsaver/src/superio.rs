//! Super-I/O configuration-space sessions.
//!
//! Nuvoton/Winbond parts hide their configuration registers behind an index/data port pair
//! (`0x2E/0x2F` or `0x4E/0x4F`). Access is bracketed by a key sequence:
//!
//! ```text
//! enter:  0x87 -> base, 0x87 -> base
//! select: 0x07 -> base, ldn  -> base+1
//! read:   reg  -> base, base+1 -> value
//! exit:   0xAA -> base, 0x02 -> base, 0x02 -> base+1
//! ```
//!
//! Leaving the chip unlocked, or unlocking it while another consumer is halfway through its own
//! sequence, corrupts both transactions. [`SuperIoSession`] owns the port pair's exclusive region
//! for its whole lifetime and always writes the exit sequence before releasing it.

use std::fmt;

use hddsaver_platform::{PortBus, RegionGuard, RegionRegistry};

use crate::error::Result;

/// Owner name recorded for every port range this crate claims.
pub const DRVNAME: &str = "hddsaver";

/// Logical device select.
pub const SIO_REG_LDSEL: u8 = 0x07;
/// Device ID, two bytes, big-endian.
pub const SIO_REG_DEVID: u8 = 0x20;
/// Logical device enable.
pub const SIO_REG_ENABLE: u8 = 0x30;
/// Logical device base address, two bytes, big-endian.
pub const SIO_REG_ADDR: u8 = 0x60;

pub const SIO_ENTER_KEY: u8 = 0x87;
pub const SIO_EXIT_KEY: u8 = 0xAA;
/// Config control register and the value that returns the chip to wait-for-key.
pub const SIO_REG_CONFIG_CTRL: u8 = 0x02;
pub const SIO_CONFIG_CTRL_WAIT_FOR_KEY: u8 = 0x02;

/// Number of ports in an index/data pair.
pub const SIO_REGION_LEN: u16 = 2;

/// Bit operation applied by a [`BitUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    Set,
    Clear,
    Toggle,
}

/// A read-modify-write of exactly one bit of one configuration register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitUpdate {
    pub index: u8,
    pub bit: u8,
    pub op: BitOp,
}

impl BitUpdate {
    pub const fn set(index: u8, bit: u8) -> Self {
        Self {
            index,
            bit,
            op: BitOp::Set,
        }
    }

    pub const fn clear(index: u8, bit: u8) -> Self {
        Self {
            index,
            bit,
            op: BitOp::Clear,
        }
    }

    pub const fn toggle(index: u8, bit: u8) -> Self {
        Self {
            index,
            bit,
            op: BitOp::Toggle,
        }
    }

    pub const fn mask(&self) -> u8 {
        1 << self.bit
    }

    pub const fn apply(&self, value: u8) -> u8 {
        match self.op {
            BitOp::Set => value | self.mask(),
            BitOp::Clear => value & !self.mask(),
            BitOp::Toggle => value ^ self.mask(),
        }
    }
}

/// Register contents before and after a [`BitUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterChange {
    pub before: u8,
    pub after: u8,
}

impl RegisterChange {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// An entered configuration-space session.
///
/// Created by [`SuperIoSession::enter`]; the exit sequence runs exactly once, either through
/// [`SuperIoSession::exit`] or when the session is dropped on an early return.
pub struct SuperIoSession<'a> {
    bus: &'a dyn PortBus,
    base: u16,
    // Dropped after `Drop::drop` has written the exit sequence.
    _region: RegionGuard,
}

impl<'a> SuperIoSession<'a> {
    /// Claims `[base, base + 1]` and unlocks the chip.
    ///
    /// Never waits: a claim held elsewhere fails with [`crate::HddSaverError::DeviceBusy`].
    pub fn enter(bus: &'a dyn PortBus, regions: &RegionRegistry, base: u16) -> Result<Self> {
        let region = regions.try_claim(base, SIO_REGION_LEN, DRVNAME)?;

        bus.outb(base, SIO_ENTER_KEY);
        bus.outb(base, SIO_ENTER_KEY);

        Ok(Self {
            bus,
            base,
            _region: region,
        })
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn inb(&self, index: u8) -> u8 {
        self.bus.read_indexed(self.base, index)
    }

    pub fn outb(&self, index: u8, value: u8) {
        self.bus.write_indexed(self.base, index, value);
    }

    /// Reads a big-endian register pair (`index`, `index + 1`).
    pub fn read_u16(&self, index: u8) -> u16 {
        let hi = self.inb(index);
        let lo = self.inb(index.wrapping_add(1));
        u16::from_be_bytes([hi, lo])
    }

    pub fn select(&self, ldn: u8) {
        self.outb(SIO_REG_LDSEL, ldn);
    }

    /// Applies `update` to the currently selected register file.
    ///
    /// `Set`/`Clear` skip the write when the bit already has the requested value.
    pub fn update(&self, update: BitUpdate) -> RegisterChange {
        let before = self.inb(update.index);
        let after = update.apply(before);
        if after != before {
            self.outb(update.index, after);
        }
        RegisterChange { before, after }
    }

    /// Locks the chip and releases the port pair.
    pub fn exit(self) {}
}

impl fmt::Debug for SuperIoSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuperIoSession")
            .field("base", &format_args!("{:#06x}", self.base))
            .finish()
    }
}

impl Drop for SuperIoSession<'_> {
    fn drop(&mut self) {
        self.bus.outb(self.base, SIO_EXIT_KEY);
        self.bus
            .write_indexed(self.base, SIO_REG_CONFIG_CTRL, SIO_CONFIG_CTRL_WAIT_FOR_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HddSaverError;
    use hddsaver_platform::{IoPortBus, PortAccess, RecordingPortBus};
    use pretty_assertions::assert_eq;

    const BASE: u16 = 0x2E;

    fn write(port: u16, value: u8) -> PortAccess {
        PortAccess::Write { port, value }
    }

    #[test]
    fn enter_and_exit_bracket_the_transaction() {
        let bus = RecordingPortBus::new(IoPortBus::new());
        let regions = RegionRegistry::new();

        let session = SuperIoSession::enter(&bus, &regions, BASE).unwrap();
        assert!(regions.is_claimed(BASE, 2));
        session.select(0x0B);
        session.exit();

        assert!(!regions.is_claimed(BASE, 2));
        assert_eq!(
            bus.accesses(),
            vec![
                write(0x2E, 0x87),
                write(0x2E, 0x87),
                write(0x2E, 0x07),
                write(0x2F, 0x0B),
                write(0x2E, 0xAA),
                write(0x2E, 0x02),
                write(0x2F, 0x02),
            ]
        );
    }

    #[test]
    fn early_return_still_exits() {
        fn bail_out(bus: &dyn PortBus, regions: &RegionRegistry) -> Result<()> {
            let session = SuperIoSession::enter(bus, regions, BASE)?;
            session.select(0x08);
            Err(HddSaverError::DeviceNotFound)
        }

        let bus = RecordingPortBus::new(IoPortBus::new());
        let regions = RegionRegistry::new();
        assert!(bail_out(&bus, &regions).is_err());

        assert!(!regions.is_claimed(BASE, 2));
        let tail: Vec<_> = bus.accesses().into_iter().rev().take(3).collect();
        assert_eq!(tail, vec![write(0x2F, 0x02), write(0x2E, 0x02), write(0x2E, 0xAA)]);
    }

    #[test]
    fn enter_fails_fast_when_the_region_is_held() {
        let bus = RecordingPortBus::new(IoPortBus::new());
        let regions = RegionRegistry::new();
        let _hwmon = regions.try_claim(BASE, 2, "nct6775").unwrap();

        let err = SuperIoSession::enter(&bus, &regions, BASE).unwrap_err();
        assert!(matches!(err, HddSaverError::DeviceBusy { port: BASE }));
        assert!(bus.accesses().is_empty(), "no key may be written while busy");
    }

    #[test]
    fn bit_updates_touch_only_their_bit() {
        let toggle = BitUpdate::toggle(0xF1, 0);
        assert_eq!(toggle.apply(0b1010_1010), 0b1010_1011);
        assert_eq!(toggle.apply(0b1010_1011), 0b1010_1010);

        let clear = BitUpdate::clear(0x28, 4);
        assert_eq!(clear.apply(0xFF), 0xEF);
        assert_eq!(clear.apply(0x00), 0x00);

        let set = BitUpdate::set(0x30, 0);
        assert_eq!(set.apply(0x80), 0x81);
    }

    #[test]
    fn update_skips_the_write_when_the_bit_already_matches() {
        let bus = RecordingPortBus::new(IoPortBus::new());
        let regions = RegionRegistry::new();
        let session = SuperIoSession::enter(&bus, &regions, BASE).unwrap();
        bus.clear();

        // Nothing decodes the ports, so reads float to 0xFF and bit 4 is set.
        let change = session.update(BitUpdate::set(0x28, 4));
        assert!(!change.changed());
        assert_eq!(bus.indexed_writes(BASE, 0x28), 0);

        let change = session.update(BitUpdate::clear(0x28, 4));
        assert_eq!(change, RegisterChange { before: 0xFF, after: 0xEF });
        assert_eq!(bus.indexed_writes(BASE, 0x28), 1);
    }
}
