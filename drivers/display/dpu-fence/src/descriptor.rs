//! # Fence Descriptors
//!
//! Small-integer handles that expose fences to compositors, and the
//! allocator that keeps them out of the standard I/O range.
//!
//! ## Allocation Policy
//!
//! ```text
//!  alloc() ──▶ fd >= 3 ? ──yes──▶ return fd
//!                 │
//!                 no
//!                 ▼
//!          park fd in scratch ──▶ alloc() again ──▶ ... (budget FD_TRY_COUNT)
//!                 │
//!                 ▼
//!   release every parked fd (newest first), then return / fail
//! ```

use core::fmt;

use arrayvec::ArrayVec;

use crate::config::{FD_TRY_COUNT, VALID_FD_FLOOR};
use crate::error::{Error, Result};
use crate::sw_sync::SyncFile;

// =============================================================================
// DESCRIPTOR FLAGS
// =============================================================================

bitflags::bitflags! {
    /// Flags requested when reserving a descriptor
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescriptorFlags: u32 {
        /// Close on exec
        const CLOEXEC = 1 << 0;
        /// Non-blocking I/O
        const NONBLOCK = 1 << 1;
    }
}

// =============================================================================
// DESCRIPTOR
// =============================================================================

/// Non-negative descriptor value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Descriptor(i32);

impl Descriptor {
    /// Wrap a raw value; negative values are not descriptors
    pub const fn from_raw(raw: i32) -> Option<Self> {
        if raw >= 0 {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Raw value
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// Whether the value lies in the stdin/stdout/stderr range
    pub const fn is_reserved(self) -> bool {
        self.0 < VALID_FD_FLOOR
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd[{}]", self.0)
    }
}

// =============================================================================
// HANDLE SPACE
// =============================================================================

/// Process-wide descriptor table
///
/// Reservation and binding are separate steps so a reserved descriptor can
/// be handed back with [`HandleSpace::free`] before anything is bound to it.
pub trait HandleSpace: Send + Sync {
    /// Reserve the lowest free descriptor
    fn alloc(&self, flags: DescriptorFlags) -> Result<Descriptor>;

    /// Release a reserved, unbound descriptor
    fn free(&self, fd: Descriptor);

    /// Bind a reserved descriptor to a fence file
    fn install(&self, fd: Descriptor, file: SyncFile);

    /// Release a descriptor and drop its file reference
    fn close(&self, fd: Descriptor) -> Result<()>;

    /// Fence file bound to `fd`, if any
    fn get(&self, fd: Descriptor) -> Option<SyncFile>;
}

// =============================================================================
// DESCRIPTOR GUARD
// =============================================================================

/// Reserved descriptor, released on drop unless installed
pub struct DescriptorGuard<'a> {
    space: &'a dyn HandleSpace,
    fd: Descriptor,
    armed: bool,
}

impl<'a> DescriptorGuard<'a> {
    /// Guarded descriptor value
    pub fn descriptor(&self) -> Descriptor {
        self.fd
    }

    /// Bind the descriptor to `file` and give up the guard
    pub fn install(mut self, file: SyncFile) -> Descriptor {
        self.armed = false;
        self.space.install(self.fd, file);
        self.fd
    }
}

impl Drop for DescriptorGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.space.free(self.fd);
        }
    }
}

impl fmt::Debug for DescriptorGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorGuard")
            .field("fd", &self.fd)
            .field("armed", &self.armed)
            .finish()
    }
}

// =============================================================================
// DESCRIPTOR ALLOCATOR
// =============================================================================

/// Hands out descriptors at or above [`VALID_FD_FLOOR`]
pub struct DescriptorAllocator<'a> {
    space: &'a dyn HandleSpace,
    flags: DescriptorFlags,
}

impl<'a> DescriptorAllocator<'a> {
    /// Allocator over `space` requesting `flags`
    pub fn new(space: &'a dyn HandleSpace, flags: DescriptorFlags) -> Self {
        Self { space, flags }
    }

    /// Reserve a usable descriptor
    ///
    /// Reserved low values handed out on the way are parked and released
    /// again before returning, on success and on failure alike.
    pub fn allocate(&self) -> Result<Descriptor> {
        let mut fd = self
            .space
            .alloc(self.flags)
            .map_err(|_| Error::AllocationFailed)?;
        if !fd.is_reserved() {
            return Ok(fd);
        }

        let mut unused: ArrayVec<Descriptor, FD_TRY_COUNT> = ArrayVec::new();
        let outcome = loop {
            log::debug!("dpu-fence: invalid {} assigned, retrying", fd);
            if unused.try_push(fd).is_err() {
                log::error!("dpu-fence: retry budget exhausted at {}", fd);
                self.space.free(fd);
                break Err(Error::AllocationFailed);
            }

            match self.space.alloc(self.flags) {
                Ok(next) if next.is_reserved() => fd = next,
                Ok(next) => break Ok(next),
                Err(e) => {
                    log::error!("dpu-fence: descriptor allocation failed: {}", e);
                    break Err(Error::AllocationFailed);
                },
            }
        };

        while let Some(low) = unused.pop() {
            log::debug!("dpu-fence: invalid {} released", low);
            self.space.free(low);
        }

        outcome
    }

    /// Reserve a usable descriptor behind a guard
    pub fn reserve(&self) -> Result<DescriptorGuard<'a>> {
        let fd = self.allocate()?;
        Ok(DescriptorGuard {
            space: self.space,
            fd,
            armed: true,
        })
    }
}

impl fmt::Debug for DescriptorAllocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorAllocator")
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
