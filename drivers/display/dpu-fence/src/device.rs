//! # Display Device
//!
//! Per-controller entry point for the sync path. A device owns its
//! configuration and timeline and borrows the process-wide primitives and
//! handle space it was built with.

use alloc::sync::Arc;

use crate::config::DeviceConfig;
use crate::descriptor::{Descriptor, HandleSpace};
use crate::error::{Error, Result};
use crate::fence::{AcquireFence, FenceFactory};
use crate::frame::FrameConfigBatch;
use crate::sw_sync::{FenceStatus, SyncFile, SyncPrimitives};
use crate::timeline::{DeviceTimeline, TimelineStats};
use crate::wait::{self, WaitOutcome};

/// Descriptor capacity of the table built by [`DisplayDevice::with_defaults`]
#[cfg(feature = "std")]
pub const DEFAULT_HANDLE_CAPACITY: usize = 256;

/// Display controller sync state
pub struct DisplayDevice {
    config: DeviceConfig,
    primitives: Arc<dyn SyncPrimitives>,
    handles: Arc<dyn HandleSpace>,
    timeline: Option<DeviceTimeline>,
}

impl DisplayDevice {
    /// Device over the given collaborators; no timeline yet
    pub fn new(
        config: DeviceConfig,
        primitives: Arc<dyn SyncPrimitives>,
        handles: Arc<dyn HandleSpace>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            primitives,
            handles,
            timeline: None,
        })
    }

    /// Device `id` backed by [`crate::SoftwareSync`] and a fresh
    /// [`crate::HandleTable`] with standard I/O already open
    #[cfg(feature = "std")]
    pub fn with_defaults(id: u32) -> Result<Self> {
        Self::new(
            DeviceConfig::new(id),
            Arc::new(crate::sw_sync::SoftwareSync::new()),
            Arc::new(crate::handle_table::HandleTable::with_stdio(
                DEFAULT_HANDLE_CAPACITY,
            )),
        )
    }

    /// Device configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Handle space fence descriptors live in
    pub fn handles(&self) -> &dyn HandleSpace {
        &*self.handles
    }

    /// Create the device timeline, replacing any previous one
    pub fn create_timeline(&mut self, name: &str) {
        if self.timeline.is_some() {
            log::warn!("decon{}: timeline recreated as '{}'", self.config.id, name);
        }
        self.timeline = Some(DeviceTimeline::create(
            Arc::clone(&self.primitives),
            self.config.id,
            self.config.out_type,
            name,
        ));
    }

    /// Device timeline
    pub fn timeline(&self) -> Result<&DeviceTimeline> {
        self.timeline.as_ref().ok_or(Error::NoTimeline)
    }

    fn factory(&self) -> Result<FenceFactory<'_>> {
        Ok(FenceFactory::new(
            self.timeline()?,
            &*self.handles,
            self.config.fence.descriptor_flags,
        ))
    }

    /// Mint a fence for the next frame
    pub fn create_fence(&self) -> Result<AcquireFence> {
        self.factory()?.create_fence()
    }

    /// Mint a fence for the next frame and return its raw descriptor, or a
    /// negative errno on failure
    pub fn create_fence_fd(&self) -> i32 {
        match self.create_fence() {
            Ok(fence) => fence.descriptor.as_raw(),
            Err(e) => e.errno(),
        }
    }

    /// Give every buffer slot of `batch` a release descriptor for `fence`
    pub fn create_release_fences(
        &self,
        batch: &mut FrameConfigBatch,
        fence: &SyncFile,
    ) -> Result<()> {
        self.factory()?.create_release_fences(batch, fence)
    }

    /// Wait for `fence` up to the configured bound
    pub fn wait_fence(&self, fence: &SyncFile) -> WaitOutcome {
        wait::wait_fence(&*self.primitives, fence, self.config.fence.wait_timeout_ms)
    }

    /// Mark one frame complete
    pub fn signal_fence(&self) -> Result<u64> {
        Ok(wait::signal_fence(self.timeline()?))
    }

    /// Fence file bound to raw descriptor `fd`
    pub fn fence_file(&self, fd: i32) -> Result<SyncFile> {
        Descriptor::from_raw(fd)
            .and_then(|d| self.handles.get(d))
            .ok_or(Error::BadDescriptor(fd))
    }

    /// State of the fence bound to raw descriptor `fd`
    pub fn fence_status(&self, fd: i32) -> Result<FenceStatus> {
        self.fence_file(fd).map(|file| file.status())
    }

    /// Close a fence descriptor handed out earlier
    pub fn close_fence(&self, fd: i32) -> Result<()> {
        let fd = Descriptor::from_raw(fd).ok_or(Error::BadDescriptor(fd))?;
        self.handles.close(fd)
    }

    /// Timeline snapshot
    pub fn stats(&self) -> Result<TimelineStats> {
        Ok(self.timeline()?.stats())
    }
}

impl core::fmt::Debug for DisplayDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DisplayDevice")
            .field("config", &self.config)
            .field("timeline", &self.timeline)
            .finish_non_exhaustive()
    }
}
