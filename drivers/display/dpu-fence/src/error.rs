//! # DPU Fence Error Handling
//!
//! Error types for the display sync path.
//!
//! Allocation-path errors are always returned after every provisional
//! resource (reserved timeline value, point, fence file, descriptor) has been
//! released again. Wait-path errors never touch timeline state.

use core::fmt;

// =============================================================================
// ERRNO SENTINELS
// =============================================================================

/// Bad file descriptor
pub const EBADF: i32 = 9;
/// Invalid argument
pub const EINVAL: i32 = 22;
/// Too many open files
pub const EMFILE: i32 = 24;
/// Timer expired
pub const ETIME: i32 = 62;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// DPU fence result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// Display sync error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Invalid parameter provided
    InvalidArgument,
    /// Configuration rejected by `validate()`
    InvalidConfig(&'static str),
    /// Device has no timeline yet
    NoTimeline,

    // =========================================================================
    // Handle Space Errors
    // =========================================================================
    /// Handle space has no free slot left
    TooManyOpenFiles,
    /// No acceptable descriptor could be obtained
    AllocationFailed,
    /// Descriptor does not name a bound fence
    BadDescriptor(i32),

    // =========================================================================
    // Fence Creation Errors
    // =========================================================================
    /// Completion point could not be created
    PointCreationFailed,
    /// Completion point could not be wrapped in a fence file
    FenceCreationFailed,
    /// Descriptor for a freshly minted fence could not be obtained
    DescriptorFailed,

    // =========================================================================
    // Wait Errors
    // =========================================================================
    /// Fence was not signaled before the timeout elapsed
    WaitTimeout,
    /// Underlying wait mechanism reported an error
    WaitFailed(i32),
}

impl Error {
    /// Negative errno sentinel reported to descriptor-style callers
    pub const fn errno(self) -> i32 {
        match self {
            Self::InvalidArgument
            | Self::InvalidConfig(_)
            | Self::NoTimeline
            | Self::AllocationFailed
            | Self::DescriptorFailed => -EINVAL,
            Self::TooManyOpenFiles | Self::PointCreationFailed | Self::FenceCreationFailed => {
                -EMFILE
            },
            Self::BadDescriptor(_) => -EBADF,
            Self::WaitTimeout => -ETIME,
            Self::WaitFailed(code) => {
                if code < 0 {
                    code
                } else {
                    -code
                }
            },
        }
    }

    /// Whether this error came from the wait path
    pub const fn is_wait_error(self) -> bool {
        matches!(self, Self::WaitTimeout | Self::WaitFailed(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::InvalidConfig(why) => write!(f, "invalid fence configuration: {}", why),
            Self::NoTimeline => write!(f, "device has no sync timeline"),

            Self::TooManyOpenFiles => write!(f, "too many open files"),
            Self::AllocationFailed => write!(f, "failed to get unused fd"),
            Self::BadDescriptor(fd) => write!(f, "bad fence descriptor {}", fd),

            Self::PointCreationFailed => write!(f, "failed to create sync pt"),
            Self::FenceCreationFailed => write!(f, "failed to create sync file"),
            Self::DescriptorFailed => write!(f, "failed to get fd for fence"),

            Self::WaitTimeout => write!(f, "fence wait timed out"),
            Self::WaitFailed(code) => write!(f, "fence wait failed: {}", code),
        }
    }
}
