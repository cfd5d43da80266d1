//! EMG-Simulation: Synthetic board for development and tests
//!
//! Generates multi-channel rectified EMG lines with noise and mains
//! interference, and serves them through in-memory transports.

pub mod emg_simulator;
pub mod loopback;
pub mod signal_patterns;

pub use emg_simulator::{EmgSimulator, NoiseConfig, SimulatorConfig};
pub use loopback::{CommandLog, ScriptedTransport, SimulatedTransport};
pub use signal_patterns::{presets, BurstPattern, ChannelPattern};
