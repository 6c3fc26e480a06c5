//! # DPU Fence
//!
//! Explicit synchronization for the display controller: a per-device
//! completion timeline, acquire and release fences minted on it, and the
//! descriptors that hand those fences to compositors.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DisplayDevice                         │
//! │  ┌────────────────┐  ┌───────────────┐  ┌─────────────────┐  │
//! │  │  FenceFactory  │  │ DeviceTimeline│  │   wait/signal   │  │
//! │  │ (acquire and   │─▶│ (value, max,  │◀─│ (bounded wait,  │  │
//! │  │  release)      │  │  mint lock)   │  │  frame signal)  │  │
//! │  └───────┬────────┘  └───────┬───────┘  └─────────────────┘  │
//! │          ▼                   ▼                               │
//! │  ┌────────────────┐  ┌───────────────┐                       │
//! │  │  Descriptor    │  │ SyncPrimitives│                       │
//! │  │  Allocator     │  │ (SoftwareSync)│                       │
//! │  └───────┬────────┘  └───────────────┘                       │
//! │          ▼                                                   │
//! │  ┌────────────────┐                                          │
//! │  │  HandleSpace   │                                          │
//! │  │  (HandleTable) │                                          │
//! │  └────────────────┘                                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The producer path mints fences while the completion path signals the
//! timeline; both may run concurrently against the same device.

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod config;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod fence;
pub mod frame;
pub mod handle_table;
pub mod sw_sync;
pub mod timeline;
pub mod wait;

#[cfg(all(test, feature = "std"))]
mod testing;

// Re-exports for convenience
pub use config::{DeviceConfig, FenceConfig, OutputType};
pub use descriptor::{Descriptor, DescriptorAllocator, DescriptorFlags, HandleSpace};
pub use device::DisplayDevice;
pub use error::{Error, Result};
pub use fence::{AcquireFence, FenceFactory, ReleaseFenceStage};
pub use frame::{FrameConfigBatch, WindowConfig, WindowState, NO_FENCE};
pub use handle_table::HandleTable;
pub use sw_sync::{FenceStatus, SoftwareSync, SyncFile, SyncPoint, SyncPrimitives, SyncTimeline};
pub use timeline::{DeviceTimeline, TimelineStats};
pub use wait::WaitOutcome;
