//! Board identity from the SMBIOS/DMI tables.
//!
//! Linux exports the decoded type-2 (baseboard) strings under `/sys/class/dmi/id/`. Only the
//! vendor and product name are needed here.

use std::fs;
use std::io;
use std::path::Path;

pub const SYSFS_DMI_ROOT: &str = "/sys/class/dmi/id";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardIdentity {
    pub vendor: Option<String>,
    pub name: Option<String>,
}

impl BoardIdentity {
    pub fn new(vendor: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            vendor: Some(vendor.into()),
            name: Some(name.into()),
        }
    }

    /// A platform that publishes no board strings at all.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn from_sysfs() -> io::Result<Self> {
        Self::from_dir(SYSFS_DMI_ROOT)
    }

    /// Reads `board_vendor` and `board_name` from `dir`. Missing files yield `None`.
    pub fn from_dir(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        Ok(Self {
            vendor: read_attr(&dir.join("board_vendor"))?,
            name: read_attr(&dir.join("board_name"))?,
        })
    }
}

fn read_attr(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        // sysfs attributes end with a single newline; interior whitespace is significant.
        Ok(raw) => Ok(Some(raw.strip_suffix('\n').unwrap_or(raw.as_str()).to_string())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
