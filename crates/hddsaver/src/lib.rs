//! Driver for the ASRock "HDD Saver" SATA power switch.
//!
//! Some ASRock boards route the SATA power rail through a switch driven by GPIO10 of the
//! Nuvoton NCT6791D Super-I/O chip. This crate finds the chip through its configuration ports,
//! decides whether the board really wires the switch, and exposes it as a single on/off status
//! that survives suspend/resume.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hddsaver::{DriverConfig, HddSaverDriver};
//! use hddsaver_platform::{BoardIdentity, DevPortBus};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Arc::new(DevPortBus::open()?);
//! let driver = HddSaverDriver::with_defaults(DriverConfig::default(), bus);
//! let device = driver.register(&BoardIdentity::from_sysfs()?)?;
//! device.store_status("off")?;
//! print!("{}", device.show_status());
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod chip;
pub mod config;
pub mod device;
pub mod error;
pub mod power;
pub mod sim;
pub mod superio;

pub use capability::{BoardAllowList, CapabilityFlags};
pub use chip::{find, ChipIdentity, ChipKind};
pub use config::DriverConfig;
pub use device::{HddSaverDevice, HddSaverDriver};
pub use error::{HddSaverError, Result};
pub use power::{parse_bool, PowerControl, PowerState};
pub use superio::{BitOp, BitUpdate, SuperIoSession};
