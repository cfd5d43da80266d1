//! EMG-Core: Foundation types for the EMG arm controller
//!
//! Errors, electrode identities, frame decoding, session clocks and the
//! transport contract shared by the processing and controller crates.

pub mod emg_types;
pub mod error;
pub mod frame;
pub mod timestamp;
pub mod transport;

pub use emg_types::*;
pub use error::{EmgError, EmgResult};
pub use frame::{DecodeError, Frame, FrameDecoder, FRAME_DELIMITER};
pub use timestamp::{MonotonicClock, SessionClock, SteppedClock};
pub use transport::Transport;
