use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::port::PortBus;

/// A byte-wide device model reachable through one or more I/O ports.
pub trait PortIoDevice: Send {
    fn read(&mut self, port: u16) -> u8;
    fn write(&mut self, port: u16, value: u8);

    /// Reset the device back to its power-on state.
    fn reset(&mut self) {}
}

struct RangeDevice {
    start: u16,
    len: u16,
    dev: Box<dyn PortIoDevice>,
}

impl RangeDevice {
    fn end_exclusive(&self) -> u32 {
        u32::from(self.start) + u32::from(self.len)
    }

    fn contains(&self, port: u16) -> bool {
        let p = u32::from(port);
        p >= u32::from(self.start) && p < self.end_exclusive()
    }
}

#[derive(Default)]
struct Routes {
    devices: HashMap<u16, Box<dyn PortIoDevice>>,
    ranges: Vec<RangeDevice>,
}

impl Routes {
    fn find_range_index(&self, port: u16) -> Option<usize> {
        let idx = self.ranges.partition_point(|r| r.start <= port);
        if idx == 0 {
            return None;
        }
        let cand = idx - 1;
        self.ranges
            .get(cand)
            .is_some_and(|r| r.contains(port))
            .then_some(cand)
    }

    fn device_mut(&mut self, port: u16) -> Option<&mut Box<dyn PortIoDevice>> {
        if self.devices.contains_key(&port) {
            return self.devices.get_mut(&port);
        }
        let idx = self.find_range_index(port)?;
        self.ranges.get_mut(idx).map(|r| &mut r.dev)
    }
}

/// In-memory port bus that dispatches byte accesses to registered device models.
///
/// Exact-port registrations win over range registrations. Reads from unmapped ports float the
/// bus high (`0xFF`) and writes to them are dropped, which is what an ISA bus with nothing
/// decoding the address does.
///
/// All routing state sits behind one lock, so every access is atomic with respect to other
/// threads sharing the bus. Multi-access protocols still need their own exclusion (see
/// [`crate::region`]).
#[derive(Default)]
pub struct IoPortBus {
    routes: Mutex<Routes>,
}

impl IoPortBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        match self.routes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn register(&self, port: u16, device: Box<dyn PortIoDevice>) {
        self.routes().devices.insert(port, device);
    }

    /// Unregister an I/O port handler, returning the removed device (if any).
    pub fn unregister(&self, port: u16) -> Option<Box<dyn PortIoDevice>> {
        self.routes().devices.remove(&port)
    }

    /// Registers a single device over a contiguous I/O port range.
    ///
    /// Range devices are searched only if there is no exact port match.
    pub fn register_range(&self, start: u16, len: u16, dev: Box<dyn PortIoDevice>) {
        assert!(len != 0, "I/O port range length must be non-zero");

        let end_exclusive = u32::from(start) + u32::from(len);
        assert!(
            end_exclusive <= 0x1_0000,
            "I/O port range wraps past 0xFFFF: start={start:#x} len={len:#x}"
        );

        let mut routes = self.routes();
        let idx = routes.ranges.partition_point(|r| r.start < start);

        if let Some(prev) = routes.ranges.get(idx.wrapping_sub(1)) {
            assert!(
                u32::from(start) >= prev.end_exclusive(),
                "overlapping I/O port ranges: new=[{start:#x}..{end_exclusive:#x}) prev=[{:#x}..{:#x})",
                prev.start,
                prev.end_exclusive()
            );
        }
        if let Some(next) = routes.ranges.get(idx) {
            assert!(
                end_exclusive <= u32::from(next.start),
                "overlapping I/O port ranges: new=[{start:#x}..{end_exclusive:#x}) next=[{:#x}..{:#x})",
                next.start,
                next.end_exclusive()
            );
        }

        routes.ranges.insert(idx, RangeDevice { start, len, dev });
    }

    pub fn read_u8(&self, port: u16) -> u8 {
        match self.routes().device_mut(port) {
            Some(dev) => dev.read(port),
            None => 0xFF,
        }
    }

    pub fn write_u8(&self, port: u16, value: u8) {
        if let Some(dev) = self.routes().device_mut(port) {
            dev.write(port, value);
        }
    }

    pub fn reset(&self) {
        let mut routes = self.routes();
        for dev in routes.devices.values_mut() {
            dev.reset();
        }
        for range in routes.ranges.iter_mut() {
            range.dev.reset();
        }
    }
}

impl PortBus for IoPortBus {
    fn inb(&self, port: u16) -> u8 {
        self.read_u8(port)
    }

    fn outb(&self, port: u16, value: u8) {
        self.write_u8(port, value);
    }
}
