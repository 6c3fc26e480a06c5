//! # Handle Table
//!
//! Bounded, lowest-free-first descriptor table implementing
//! [`HandleSpace`]. Slots move `Free → Reserved → Installed → Free`;
//! `Occupied` marks descriptors opened outside the display path.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::descriptor::{Descriptor, DescriptorFlags, HandleSpace};
use crate::error::{Error, Result};
use crate::sw_sync::SyncFile;

// =============================================================================
// SLOT
// =============================================================================

#[derive(Debug, Clone)]
enum Slot {
    Free,
    Occupied,
    Reserved(DescriptorFlags),
    Installed(DescriptorFlags, SyncFile),
}

impl Slot {
    fn is_free(&self) -> bool {
        matches!(self, Slot::Free)
    }
}

// =============================================================================
// HANDLE TABLE
// =============================================================================

/// In-memory descriptor table
#[derive(Debug)]
pub struct HandleTable {
    /// Slots indexed by descriptor value
    slots: Mutex<Vec<Slot>>,
    /// Maximum number of slots
    capacity: usize,
    /// Number of `alloc` calls
    alloc_calls: AtomicU64,
}

impl HandleTable {
    /// Empty table with room for `capacity` descriptors
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            capacity,
            alloc_calls: AtomicU64::new(0),
        }
    }

    /// Table with 0, 1 and 2 already open, like a regular process
    pub fn with_stdio(capacity: usize) -> Self {
        let table = Self::new(capacity);
        for raw in 0..3 {
            if let Some(fd) = Descriptor::from_raw(raw) {
                table.occupy(fd);
            }
        }
        table
    }

    /// Table capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mark `fd` as opened elsewhere
    pub fn occupy(&self, fd: Descriptor) {
        let idx = fd.as_raw() as usize;
        if idx >= self.capacity {
            return;
        }
        let mut slots = self.slots.lock();
        if slots.len() <= idx {
            slots.resize(idx + 1, Slot::Free);
        }
        slots[idx] = Slot::Occupied;
    }

    /// Force `fd` back to free, whatever its state
    pub fn release(&self, fd: Descriptor) {
        if let Some(slot) = self.slots.lock().get_mut(fd.as_raw() as usize) {
            *slot = Slot::Free;
        }
    }

    /// Whether `fd` is free
    pub fn is_free(&self, fd: Descriptor) -> bool {
        self.slots
            .lock()
            .get(fd.as_raw() as usize)
            .map_or(true, Slot::is_free)
    }

    /// Number of slots in use
    pub fn open_count(&self) -> usize {
        self.slots.lock().iter().filter(|s| !s.is_free()).count()
    }

    /// Number of slots bound to a fence file
    pub fn installed_count(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|s| matches!(s, Slot::Installed(..)))
            .count()
    }

    /// Flags recorded for a reserved or installed descriptor
    pub fn flags(&self, fd: Descriptor) -> Option<DescriptorFlags> {
        match self.slots.lock().get(fd.as_raw() as usize)? {
            Slot::Reserved(flags) | Slot::Installed(flags, _) => Some(*flags),
            _ => None,
        }
    }

    /// Number of `alloc` calls so far
    pub fn alloc_calls(&self) -> u64 {
        self.alloc_calls.load(Ordering::Relaxed)
    }
}

impl HandleSpace for HandleTable {
    fn alloc(&self, flags: DescriptorFlags) -> Result<Descriptor> {
        self.alloc_calls.fetch_add(1, Ordering::Relaxed);

        let mut slots = self.slots.lock();
        let idx = match slots.iter().position(Slot::is_free) {
            Some(idx) => idx,
            None if slots.len() < self.capacity => {
                slots.push(Slot::Free);
                slots.len() - 1
            },
            None => return Err(Error::TooManyOpenFiles),
        };

        slots[idx] = Slot::Reserved(flags);
        Descriptor::from_raw(idx as i32).ok_or(Error::TooManyOpenFiles)
    }

    fn free(&self, fd: Descriptor) {
        let mut slots = self.slots.lock();
        match slots.get_mut(fd.as_raw() as usize) {
            Some(slot) if matches!(slot, Slot::Reserved(_)) => *slot = Slot::Free,
            _ => log::warn!("handle table: free of unreserved {}", fd),
        }
    }

    fn install(&self, fd: Descriptor, file: SyncFile) {
        let mut slots = self.slots.lock();
        match slots.get_mut(fd.as_raw() as usize) {
            Some(slot) => match *slot {
                Slot::Reserved(flags) => *slot = Slot::Installed(flags, file),
                _ => log::warn!("handle table: install into unreserved {}", fd),
            },
            None => log::warn!("handle table: install into unknown {}", fd),
        }
    }

    fn close(&self, fd: Descriptor) -> Result<()> {
        let mut slots = self.slots.lock();
        match slots.get_mut(fd.as_raw() as usize) {
            Some(slot) if matches!(slot, Slot::Reserved(_) | Slot::Installed(..)) => {
                *slot = Slot::Free;
                Ok(())
            },
            _ => Err(Error::BadDescriptor(fd.as_raw())),
        }
    }

    fn get(&self, fd: Descriptor) -> Option<SyncFile> {
        match self.slots.lock().get(fd.as_raw() as usize)? {
            Slot::Installed(_, file) => Some(file.clone()),
            _ => None,
        }
    }
}
