//! # Fence Factory
//!
//! Mints acquire fences on a device timeline and hands out release fence
//! descriptors for the buffer-bearing slots of a frame.
//!
//! ## Acquire Fence
//!
//! ```text
//! begin_mint ──▶ point_create ──▶ fence_wrap ──▶ reserve fd ──▶ install ──▶ commit
//!     │               │               │              │
//!     └───────────────┴───────────────┴──────────────┴── any failure: guards
//!                                                        drop, value rolls back
//! ```
//!
//! ## Release Fences
//!
//! Descriptors are staged first and only bound once every buffer slot has
//! one, so a failed batch leaves nothing installed.

use core::fmt;

use arrayvec::ArrayVec;

use crate::config::MAX_WINDOWS;
use crate::descriptor::{
    Descriptor, DescriptorAllocator, DescriptorFlags, DescriptorGuard, HandleSpace,
};
use crate::error::{Error, Result};
use crate::frame::FrameConfigBatch;
use crate::sw_sync::{FenceStatus, SyncFile};
use crate::timeline::DeviceTimeline;

// =============================================================================
// ACQUIRE FENCE
// =============================================================================

/// Freshly minted fence and the descriptor bound to it
#[derive(Debug, Clone)]
pub struct AcquireFence {
    /// Descriptor handed to the caller
    pub descriptor: Descriptor,
    /// Fence file, shared with the descriptor
    pub file: SyncFile,
    /// Timeline value the fence waits for
    pub value: u64,
}

impl AcquireFence {
    /// Current fence state
    pub fn status(&self) -> FenceStatus {
        self.file.status()
    }
}

// =============================================================================
// RELEASE FENCE STAGE
// =============================================================================

/// Release descriptors reserved for a batch but not bound yet
///
/// Dropping the stage releases every reservation.
#[derive(Debug)]
pub struct ReleaseFenceStage<'a> {
    allocator: DescriptorAllocator<'a>,
    staged: ArrayVec<(usize, DescriptorGuard<'a>), MAX_WINDOWS>,
}

impl<'a> ReleaseFenceStage<'a> {
    /// Empty stage over `space`
    pub fn new(space: &'a dyn HandleSpace, flags: DescriptorFlags) -> Self {
        Self {
            allocator: DescriptorAllocator::new(space, flags),
            staged: ArrayVec::new(),
        }
    }

    /// Reserve a descriptor for window `slot`
    pub fn stage(&mut self, slot: usize) -> Result<Descriptor> {
        if slot >= MAX_WINDOWS || self.staged.iter().any(|(s, _)| *s == slot) {
            return Err(Error::InvalidArgument);
        }
        let guard = self.allocator.reserve()?;
        let fd = guard.descriptor();
        self.staged
            .try_push((slot, guard))
            .map_err(|_| Error::InvalidArgument)?;
        Ok(fd)
    }

    /// Number of staged descriptors
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Whether nothing is staged
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Bind every staged descriptor to `fence` and publish them in `batch`
    ///
    /// Slots without a staged descriptor get [`crate::frame::NO_FENCE`].
    pub fn commit(self, batch: &mut FrameConfigBatch, fence: &SyncFile) {
        batch.clear_release_fences();
        for (slot, guard) in self.staged {
            let fd = guard.install(fence.clone());
            batch.config[slot].release_fence = fd.as_raw();
        }
    }
}

// =============================================================================
// FENCE FACTORY
// =============================================================================

/// Fence minting for one device
pub struct FenceFactory<'a> {
    timeline: &'a DeviceTimeline,
    space: &'a dyn HandleSpace,
    flags: DescriptorFlags,
}

impl<'a> FenceFactory<'a> {
    /// Factory minting on `timeline` with descriptors from `space`
    pub fn new(
        timeline: &'a DeviceTimeline,
        space: &'a dyn HandleSpace,
        flags: DescriptorFlags,
    ) -> Self {
        Self {
            timeline,
            space,
            flags,
        }
    }

    /// Mint a fence for the next timeline value
    pub fn create_fence(&self) -> Result<AcquireFence> {
        let id = self.timeline.id();
        let mint = self.timeline.begin_mint();
        let value = mint.value();
        let primitives = self.timeline.primitives();

        let point = primitives
            .point_create(self.timeline.sync_timeline(), value)
            .ok_or_else(|| {
                log::error!("decon{}: failed to create sync pt", id);
                Error::PointCreationFailed
            })?;

        let file = primitives.fence_wrap(&point);
        drop(point);
        let file = file.ok_or_else(|| {
            log::error!("decon{}: failed to create sync file", id);
            Error::FenceCreationFailed
        })?;

        let guard = DescriptorAllocator::new(self.space, self.flags)
            .reserve()
            .map_err(|e| {
                log::error!("decon{}: failed to get unused fd: {}", id, e);
                Error::DescriptorFailed
            })?;
        let descriptor = guard.install(file.clone());

        mint.commit();
        log::debug!("decon{}: fence {} bound to value {}", id, descriptor, value);

        Ok(AcquireFence {
            descriptor,
            file,
            value,
        })
    }

    /// Give every buffer-bearing slot of `batch` a descriptor for `fence`
    ///
    /// All-or-nothing: on failure every buffer-bearing slot reads
    /// [`crate::frame::NO_FENCE`], other slots are left as they were and no
    /// descriptor stays reserved. On success slots without a buffer read
    /// [`crate::frame::NO_FENCE`] as well.
    pub fn create_release_fences(
        &self,
        batch: &mut FrameConfigBatch,
        fence: &SyncFile,
    ) -> Result<()> {
        let mut stage = ReleaseFenceStage::new(self.space, self.flags);
        let buffer_slots: ArrayVec<usize, MAX_WINDOWS> = batch
            .config
            .iter()
            .enumerate()
            .filter(|(_, window)| window.state.has_buffer())
            .map(|(slot, _)| slot)
            .collect();

        for slot in buffer_slots {
            if let Err(e) = stage.stage(slot) {
                log::error!(
                    "decon{}: failed to get unused fd for window {}: {}",
                    self.timeline.id(),
                    slot,
                    e
                );
                drop(stage);
                batch.clear_buffer_release_fences();
                return Err(e);
            }
        }

        stage.commit(batch, fence);
        Ok(())
    }
}

impl fmt::Debug for FenceFactory<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FenceFactory")
            .field("timeline", self.timeline)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
