//! Host platform primitives used by the HDD Saver driver.
//!
//! This crate owns everything the driver needs from its surroundings but does not implement
//! itself:
//! - [`port`]: byte-wide port I/O ([`port::PortBus`]) with a `/dev/port` backend and a recorder.
//! - [`io`]: an in-memory port bus that routes accesses to device models.
//! - [`region`]: exclusive port-range reservations shared by every consumer of a chip.
//! - [`time`]: a monotonic clock abstraction with a deterministic test clock.
//! - [`dmi`]: board identity strings from the firmware description tables.

pub mod dmi;
pub mod io;
pub mod port;
pub mod region;
pub mod time;

pub use dmi::BoardIdentity;
pub use io::{IoPortBus, PortIoDevice};
pub use port::{PortAccess, PortBus, RecordingPortBus};
pub use region::{RegionError, RegionGuard, RegionRegistry};
pub use time::{Clock, ManualClock, MonotonicClock};

#[cfg(unix)]
pub use port::DevPortBus;
