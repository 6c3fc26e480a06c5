//! # Wait and Signal
//!
//! Bounded waits on fences and per-frame timeline signaling. Wait failures
//! are logged and handed back as a soft outcome; they never change fence or
//! timeline state.

use crate::error::Error;
use crate::sw_sync::{SyncFile, SyncPrimitives};
use crate::timeline::DeviceTimeline;

/// Timeline increment for one completed frame
pub const FRAME_SIGNAL_DELTA: u32 = 1;

// =============================================================================
// WAIT OUTCOME
// =============================================================================

/// Result of a bounded fence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Fence reached signaled state in time
    Signaled,
    /// Timeout elapsed first
    TimedOut,
    /// Wait mechanism reported an error
    Failed(Error),
}

impl WaitOutcome {
    /// Whether the fence was signaled
    pub const fn is_signaled(self) -> bool {
        matches!(self, Self::Signaled)
    }
}

// =============================================================================
// WAIT / SIGNAL
// =============================================================================

/// Wait up to `timeout_ms` for `file`
pub fn wait_fence(
    primitives: &dyn SyncPrimitives,
    file: &SyncFile,
    timeout_ms: u32,
) -> WaitOutcome {
    match primitives.wait(file, timeout_ms) {
        Ok(()) => WaitOutcome::Signaled,
        Err(Error::WaitTimeout) => {
            log::warn!(
                "error waiting on acquire fence: timed out after {} ms",
                timeout_ms
            );
            WaitOutcome::TimedOut
        },
        Err(e) => {
            log::warn!("error waiting on acquire fence: {}", e.errno());
            WaitOutcome::Failed(e)
        },
    }
}

/// Advance `timeline` by `delta`, returning the new value
pub fn signal(timeline: &DeviceTimeline, delta: u32) -> u64 {
    timeline.signal(delta)
}

/// Mark one frame complete on `timeline`
pub fn signal_fence(timeline: &DeviceTimeline) -> u64 {
    signal(timeline, FRAME_SIGNAL_DELTA)
}
