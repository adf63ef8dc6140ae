//! Byte-wide x86 port I/O.
//!
//! [`PortBus`] is the narrow interface the driver talks to. Indexed chips (Super-I/O, CMOS, ...)
//! expose a pair of ports: an index/address port at `base` and a data port at `base + 1`. The
//! provided [`PortBus::write_indexed`] / [`PortBus::read_indexed`] helpers perform exactly two
//! bus accesses each and never retry or validate the index.

use std::sync::{Arc, Mutex, MutexGuard};

/// Offset of the data register relative to an index/data port pair.
pub const DATA_PORT_OFFSET: u16 = 1;

pub trait PortBus: Send + Sync {
    fn inb(&self, port: u16) -> u8;
    fn outb(&self, port: u16, value: u8);

    fn write_indexed(&self, base: u16, index: u8, value: u8) {
        self.outb(base, index);
        self.outb(base.wrapping_add(DATA_PORT_OFFSET), value);
    }

    fn read_indexed(&self, base: u16, index: u8) -> u8 {
        self.outb(base, index);
        self.inb(base.wrapping_add(DATA_PORT_OFFSET))
    }
}

impl<T: PortBus + ?Sized> PortBus for Arc<T> {
    fn inb(&self, port: u16) -> u8 {
        (**self).inb(port)
    }

    fn outb(&self, port: u16, value: u8) {
        (**self).outb(port, value)
    }
}

impl<T: PortBus + ?Sized> PortBus for &T {
    fn inb(&self, port: u16) -> u8 {
        (**self).inb(port)
    }

    fn outb(&self, port: u16, value: u8) {
        (**self).outb(port, value)
    }
}

/// Port I/O through the Linux `/dev/port` character device.
///
/// The file offset is the port number, so a one-byte positioned read or write is exactly one
/// `inb`/`outb`. Opening the device needs `CAP_SYS_RAWIO`.
///
/// Individual accesses cannot fail in the [`PortBus`] contract. A failed access is logged and a
/// failed read returns `0xFF`, the value an undecoded ISA read produces.
///
/// Region claims made alongside this bus are process-local: a kernel driver bound to the same
/// chip (`nct6775`) does not see them.
#[cfg(unix)]
#[derive(Debug)]
pub struct DevPortBus {
    file: std::fs::File,
}

#[cfg(unix)]
impl DevPortBus {
    pub const DEFAULT_PATH: &'static str = "/dev/port";

    pub fn open() -> std::io::Result<Self> {
        Self::open_path(Self::DEFAULT_PATH)
    }

    pub fn open_path(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;
        Ok(Self { file })
    }
}

#[cfg(unix)]
impl PortBus for DevPortBus {
    fn inb(&self, port: u16) -> u8 {
        use std::os::unix::fs::FileExt;

        let mut buf = [0xFFu8; 1];
        if let Err(err) = self.file.read_exact_at(&mut buf, u64::from(port)) {
            tracing::error!("inb({port:#06x}) failed: {err}");
            return 0xFF;
        }
        buf[0]
    }

    fn outb(&self, port: u16, value: u8) {
        use std::os::unix::fs::FileExt;

        if let Err(err) = self.file.write_all_at(&[value], u64::from(port)) {
            tracing::error!("outb({port:#06x}, {value:#04x}) failed: {err}");
        }
    }
}

/// One access observed by a [`RecordingPortBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortAccess {
    Read { port: u16, value: u8 },
    Write { port: u16, value: u8 },
}

impl PortAccess {
    pub fn is_write(&self) -> bool {
        matches!(self, PortAccess::Write { .. })
    }

    pub fn port(&self) -> u16 {
        match *self {
            PortAccess::Read { port, .. } | PortAccess::Write { port, .. } => port,
        }
    }
}

/// Wraps another bus and keeps an ordered log of every access.
pub struct RecordingPortBus<B> {
    inner: B,
    log: Mutex<Vec<PortAccess>>,
}

impl<B: PortBus> RecordingPortBus<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn log(&self) -> MutexGuard<'_, Vec<PortAccess>> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn accesses(&self) -> Vec<PortAccess> {
        self.log().clone()
    }

    /// Takes and clears the access log.
    pub fn take(&self) -> Vec<PortAccess> {
        std::mem::take(&mut *self.log())
    }

    pub fn clear(&self) {
        self.log().clear();
    }

    /// Writes whose value lands on a data port (`base + 1`) right after `index` was written to
    /// `base`.
    pub fn indexed_writes(&self, base: u16, index: u8) -> usize {
        let log = self.log();
        log.windows(2)
            .filter(|w| {
                w[0] == PortAccess::Write { port: base, value: index }
                    && matches!(w[1], PortAccess::Write { port, .. } if port == base.wrapping_add(DATA_PORT_OFFSET))
            })
            .count()
    }

    pub fn write_count(&self) -> usize {
        self.log().iter().filter(|a| a.is_write()).count()
    }
}

impl<B: PortBus> PortBus for RecordingPortBus<B> {
    fn inb(&self, port: u16) -> u8 {
        let value = self.inner.inb(port);
        self.log().push(PortAccess::Read { port, value });
        value
    }

    fn outb(&self, port: u16, value: u8) {
        self.inner.outb(port, value);
        self.log().push(PortAccess::Write { port, value });
    }
}
