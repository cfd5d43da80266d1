//! Error handling for the EMG controller
//!
//! One error type shared by every crate in the workspace. Malformed frames
//! are not errors at this level; they are reported as [`crate::DecodeError`]
//! values and dropped by the pipeline.

use core::fmt;

/// Result type alias for EMG controller operations
pub type EmgResult<T> = Result<T, EmgError>;

/// Error type for all EMG controller operations
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EmgError {
    /// Invalid session or channel configuration
    InvalidConfig {
        /// Description of the configuration error
        reason: String,
    },

    /// Channel count outside the supported range
    InvalidChannelCount {
        /// Requested channel count
        count: usize,
        /// Maximum supported channels
        max: usize,
    },

    /// Sampling rate outside the supported range
    InvalidSamplingRate {
        /// Provided sampling rate
        rate: f64,
        /// Valid range description
        valid_range: String,
    },

    /// Channel index does not exist in this session
    UnknownChannel {
        /// Offending index
        index: usize,
        /// Configured channel count
        channel_count: usize,
    },

    /// Frame width does not match the channel count
    FrameWidth {
        expected: usize,
        found: usize,
    },

    /// Transport could not be opened, read or written
    Transport {
        /// Transport error description
        reason: String,
    },

    /// Configuration could not be (de)serialized
    Serialization {
        /// Serialization error description
        reason: String,
    },

    /// The session was stopped or its worker went away
    SessionClosed,
}

impl fmt::Display for EmgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmgError::InvalidConfig { reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
            EmgError::InvalidChannelCount { count, max } => {
                write!(f, "Invalid channel count: {}, supported range 1-{}", count, max)
            }
            EmgError::InvalidSamplingRate { rate, valid_range } => {
                write!(f, "Invalid sampling rate: {}Hz, valid range: {}", rate, valid_range)
            }
            EmgError::UnknownChannel { index, channel_count } => {
                write!(f, "Unknown channel {} (session has {} channels)", index, channel_count)
            }
            EmgError::FrameWidth { expected, found } => {
                write!(f, "Frame carries {} values, expected {}", found, expected)
            }
            EmgError::Transport { reason } => {
                write!(f, "Transport error: {}", reason)
            }
            EmgError::Serialization { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
            EmgError::SessionClosed => write!(f, "Session closed"),
        }
    }
}

impl std::error::Error for EmgError {}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::EmgError::InvalidConfig {
            reason: format!($($arg)*),
        }
    };
}

/// Convenience macro for creating transport errors
#[macro_export]
macro_rules! transport_error {
    ($($arg:tt)*) => {
        $crate::error::EmgError::Transport {
            reason: format!($($arg)*),
        }
    };
}
