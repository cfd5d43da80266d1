//! EMG-Processing: Real-time detection and arbitration core
//!
//! Notch filtering, debounced burst detection, cross-channel priority
//! resolution and command dispatch, driven one frame at a time.

pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod filters;
pub mod pipeline;
pub mod resolver;

pub use config::{ChannelConfig, ConfigProfile, NotchConfig, SessionConfig, MAX_CHANNELS};
pub use detector::{ChannelState, DetectorState, SpikeDetector, SpikeEvent};
pub use dispatcher::{CommandDispatcher, DispatchStats};
pub use filters::{DelayLine, FilterBank, NotchCoefficients};
pub use pipeline::*;
pub use resolver::{
    PriorityResolver, Resolution, Suppression, SuppressionCause, SuppressionGraph, SuppressionRule,
};
