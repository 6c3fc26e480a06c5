//! # Fence Configuration
//!
//! Per-device tunables for the sync path.

use static_assertions::const_assert;

use crate::descriptor::DescriptorFlags;
use crate::error::{Error, Result};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Number of window slots in one frame configuration
pub const MAX_WINDOWS: usize = 6;

/// Lowest descriptor value the display path may hand out
///
/// Values below this are stdin/stdout/stderr.
pub const VALID_FD_FLOOR: i32 = 3;

/// Retry budget when the handle space keeps returning reserved values
pub const FD_TRY_COUNT: usize = 3;

/// Default acquire fence wait bound in milliseconds
pub const DEFAULT_WAIT_TIMEOUT_MS: u32 = 900;

// Every reserved value must fit in the scratch buffer.
const_assert!(FD_TRY_COUNT >= VALID_FD_FLOOR as usize);
const_assert!(MAX_WINDOWS > 0);

// =============================================================================
// OUTPUT TYPE
// =============================================================================

/// Display controller output path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    /// MIPI DSI panel
    #[default]
    Dsi,
    /// DisplayPort link
    DisplayPort,
    /// Write-back into memory, no physical output
    Writeback,
}

// =============================================================================
// FENCE CONFIG
// =============================================================================

/// Sync path configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceConfig {
    /// Bound for acquire fence waits
    pub wait_timeout_ms: u32,
    /// Flags requested for every fence descriptor
    pub descriptor_flags: DescriptorFlags,
}

impl Default for FenceConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            descriptor_flags: DescriptorFlags::CLOEXEC,
        }
    }
}

impl FenceConfig {
    /// Set the wait bound
    pub fn with_wait_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.wait_timeout_ms = timeout_ms;
        self
    }

    /// Set descriptor flags
    pub fn with_descriptor_flags(mut self, flags: DescriptorFlags) -> Self {
        self.descriptor_flags = flags;
        self
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<()> {
        if self.wait_timeout_ms == 0 {
            return Err(Error::InvalidConfig("wait timeout must be non-zero"));
        }
        if !self.descriptor_flags.contains(DescriptorFlags::CLOEXEC) {
            return Err(Error::InvalidConfig("fence descriptors must be close-on-exec"));
        }
        Ok(())
    }
}

// =============================================================================
// DEVICE CONFIG
// =============================================================================

/// Display device configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    /// Controller index, used as the log tag
    pub id: u32,
    /// Output path
    pub out_type: OutputType,
    /// Sync path settings
    pub fence: FenceConfig,
}

impl DeviceConfig {
    /// Configuration for controller `id` with defaults elsewhere
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Set the output path
    pub fn with_out_type(mut self, out_type: OutputType) -> Self {
        self.out_type = out_type;
        self
    }

    /// Set the sync path settings
    pub fn with_fence(mut self, fence: FenceConfig) -> Self {
        self.fence = fence;
        self
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<()> {
        self.fence.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FenceConfig::default();
        assert_eq!(config.wait_timeout_ms, 900);
        assert!(config.descriptor_flags.contains(DescriptorFlags::CLOEXEC));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = FenceConfig::default().with_wait_timeout_ms(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_requires_cloexec() {
        let config = DeviceConfig::new(1)
            .with_fence(FenceConfig::default().with_descriptor_flags(DescriptorFlags::NONBLOCK));
        assert!(config.validate().is_err());
    }
}
