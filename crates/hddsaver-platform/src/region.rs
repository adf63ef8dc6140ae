//! Exclusive I/O port range reservations.
//!
//! A [`RegionRegistry`] is the process-wide table every consumer of a chip shares (clone the
//! handle, do not create a second table). Two kinds of entries live in it:
//! - *claims*, taken with [`RegionRegistry::try_claim`] and held by a [`RegionGuard`] until it is
//!   dropped. A claim never waits: overlapping an existing claim fails with
//!   [`RegionError::Busy`].
//! - *reservations*, recorded with [`RegionRegistry::reserve`] on behalf of firmware. They never
//!   block claims but [`RegionRegistry::check_reserved`] reports them so a driver can refuse to
//!   touch a range the firmware owns.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

/// Default number of simultaneously tracked entries.
pub const DEFAULT_REGION_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("port range {start:#06x}+{len} is busy (held by {owner})")]
    Busy { start: u16, len: u16, owner: String },

    #[error("port range {start:#06x}+{len} conflicts with firmware reservation {owner}")]
    Reserved { start: u16, len: u16, owner: String },

    #[error("region table full ({capacity} entries)")]
    TableFull { capacity: usize },

    #[error("invalid port range {start:#06x}+{len}")]
    InvalidRange { start: u16, len: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Claim,
    Reservation,
}

#[derive(Debug, Clone)]
struct Entry {
    id: u64,
    start: u16,
    len: u16,
    owner: String,
    kind: EntryKind,
}

impl Entry {
    fn overlaps(&self, start: u16, len: u16) -> bool {
        let a0 = u32::from(self.start);
        let a1 = a0 + u32::from(self.len);
        let b0 = u32::from(start);
        let b1 = b0 + u32::from(len);
        a0 < b1 && b0 < a1
    }
}

#[derive(Debug)]
struct RegionTable {
    entries: Vec<Entry>,
    next_id: u64,
    capacity: usize,
}

impl RegionTable {
    fn insert(&mut self, start: u16, len: u16, owner: &str, kind: EntryKind) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            start,
            len,
            owner: owner.to_string(),
            kind,
        });
        id
    }

    fn check_room(&self) -> Result<(), RegionError> {
        if self.entries.len() >= self.capacity {
            return Err(RegionError::TableFull {
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

/// Cloneable handle to a shared port reservation table.
#[derive(Clone)]
pub struct RegionRegistry {
    table: Arc<Mutex<RegionTable>>,
}

impl fmt::Debug for RegionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table();
        f.debug_struct("RegionRegistry")
            .field("entries", &table.entries)
            .field("capacity", &table.capacity)
            .finish()
    }
}

impl Default for RegionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(start: u16, len: u16) -> Result<(), RegionError> {
    if len == 0 || u32::from(start) + u32::from(len) > 0x1_0000 {
        return Err(RegionError::InvalidRange { start, len });
    }
    Ok(())
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REGION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: Arc::new(Mutex::new(RegionTable {
                entries: Vec::new(),
                next_id: 0,
                capacity,
            })),
        }
    }

    fn table(&self) -> MutexGuard<'_, RegionTable> {
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Claims `[start, start + len)` for `owner` without waiting.
    pub fn try_claim(&self, start: u16, len: u16, owner: &str) -> Result<RegionGuard, RegionError> {
        validate(start, len)?;

        let mut table = self.table();
        if let Some(held) = table
            .entries
            .iter()
            .find(|e| e.kind == EntryKind::Claim && e.overlaps(start, len))
        {
            return Err(RegionError::Busy {
                start,
                len,
                owner: held.owner.clone(),
            });
        }
        table.check_room()?;
        let id = table.insert(start, len, owner, EntryKind::Claim);
        tracing::trace!("claimed ports {start:#06x}+{len} for {owner}");

        Ok(RegionGuard {
            registry: self.clone(),
            id,
            start,
            len,
        })
    }

    /// Records a permanent firmware reservation.
    pub fn reserve(&self, start: u16, len: u16, owner: &str) -> Result<(), RegionError> {
        validate(start, len)?;

        let mut table = self.table();
        table.check_room()?;
        table.insert(start, len, owner, EntryKind::Reservation);
        Ok(())
    }

    /// Fails with [`RegionError::Reserved`] if any firmware reservation overlaps the range.
    pub fn check_reserved(&self, start: u16, len: u16) -> Result<(), RegionError> {
        validate(start, len)?;

        let table = self.table();
        match table
            .entries
            .iter()
            .find(|e| e.kind == EntryKind::Reservation && e.overlaps(start, len))
        {
            Some(entry) => Err(RegionError::Reserved {
                start,
                len,
                owner: entry.owner.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Returns true if any claim currently overlaps the range.
    pub fn is_claimed(&self, start: u16, len: u16) -> bool {
        self.table()
            .entries
            .iter()
            .any(|e| e.kind == EntryKind::Claim && e.overlaps(start, len))
    }

    fn release(&self, id: u64) {
        self.table().entries.retain(|e| e.id != id);
    }
}

/// An active claim. Dropping it releases the range.
#[must_use = "dropping the guard releases the region immediately"]
pub struct RegionGuard {
    registry: RegionRegistry,
    id: u64,
    start: u16,
    len: u16,
}

impl RegionGuard {
    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn len(&self) -> u16 {
        self.len
    }
}

impl fmt::Debug for RegionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionGuard")
            .field("start", &format_args!("{:#06x}", self.start))
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for RegionGuard {
    fn drop(&mut self) {
        self.registry.release(self.id);
        tracing::trace!("released ports {:#06x}+{}", self.start, self.len);
    }
}
