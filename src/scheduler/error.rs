use core::fmt;

/// Failure of a scheduler operation.
///
/// Each variant maps onto the kernel's negative errno convention through
/// [`SchedError::errno`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Stack too small for the bootstrap frame, or an otherwise malformed
    /// request.
    InvalidArgument,

    /// Heap allocation for the task stack or scheduler metadata failed.
    NoMemory,

    /// No such entity (unknown request id).
    NoEntry,

    /// The request is well-formed but not implemented (process-group waits).
    NotSupported,

    /// Scheduler has not been initialized via [`Scheduler::init`].
    ///
    /// [`Scheduler::init`]: super::Scheduler::init
    NotInitialized,
}

impl SchedError {
    /// Negative errno value reported across the system-call boundary.
    pub const fn errno(self) -> i32 {
        match self {
            Self::NoEntry | Self::NotInitialized => -2,
            Self::NoMemory => -12,
            Self::InvalidArgument => -22,
            Self::NotSupported => -134,
        }
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NoMemory => write!(f, "out of memory"),
            Self::NoEntry => write!(f, "no such entry"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::NotInitialized => write!(f, "scheduler not initialized"),
        }
    }
}
