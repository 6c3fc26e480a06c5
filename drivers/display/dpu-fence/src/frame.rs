//! # Frame Configuration
//!
//! Per-window slot descriptions submitted with one frame.

use crate::config::MAX_WINDOWS;
use crate::descriptor::Descriptor;

/// Release descriptor value meaning "no fence"
pub const NO_FENCE: i32 = -1;

// =============================================================================
// WINDOW STATE
// =============================================================================

/// What a window slot shows this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowState {
    /// Window off
    #[default]
    Disabled,
    /// Solid color fill, no buffer
    Color,
    /// Scans out a client buffer
    Buffer,
    /// Partial update region marker, no buffer
    Update,
}

impl WindowState {
    /// Whether the slot carries a client buffer
    pub const fn has_buffer(self) -> bool {
        matches!(self, Self::Buffer)
    }
}

// =============================================================================
// WINDOW CONFIG
// =============================================================================

/// One window slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Slot state
    pub state: WindowState,
    /// Release fence descriptor, [`NO_FENCE`] if none
    pub release_fence: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            state: WindowState::Disabled,
            release_fence: NO_FENCE,
        }
    }
}

impl WindowConfig {
    /// Slot in `state` without a release fence
    pub const fn new(state: WindowState) -> Self {
        Self {
            state,
            release_fence: NO_FENCE,
        }
    }

    /// Release descriptor, if one is set
    pub fn release_descriptor(&self) -> Option<Descriptor> {
        Descriptor::from_raw(self.release_fence)
    }
}

// =============================================================================
// FRAME CONFIG BATCH
// =============================================================================

/// Fixed-size window configuration for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameConfigBatch {
    /// Window slots in z-order
    pub config: [WindowConfig; MAX_WINDOWS],
}

impl FrameConfigBatch {
    /// Batch with every slot disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch from slot states
    pub fn from_states(states: [WindowState; MAX_WINDOWS]) -> Self {
        Self {
            config: states.map(WindowConfig::new),
        }
    }

    /// Number of buffer-bearing slots
    pub fn buffer_count(&self) -> usize {
        self.config.iter().filter(|w| w.state.has_buffer()).count()
    }

    /// Release descriptors currently set, in slot order
    pub fn release_descriptors(&self) -> impl Iterator<Item = Descriptor> + '_ {
        self.config.iter().filter_map(WindowConfig::release_descriptor)
    }

    /// Reset every release descriptor to [`NO_FENCE`]
    pub fn clear_release_fences(&mut self) {
        for window in &mut self.config {
            window.release_fence = NO_FENCE;
        }
    }

    /// Reset the release descriptor of buffer-bearing slots only
    pub fn clear_buffer_release_fences(&mut self) {
        for window in self.config.iter_mut().filter(|w| w.state.has_buffer()) {
            window.release_fence = NO_FENCE;
        }
    }
}
