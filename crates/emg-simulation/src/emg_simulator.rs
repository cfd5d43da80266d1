//! Multi-channel EMG board simulator
//!
//! Produces the same text frames the acquisition board sends: one line per
//! sample, one rectified reading per channel, with mains interference and
//! noise layered on top of scheduled muscle bursts.

use crate::signal_patterns::{BurstPattern, ChannelPattern};
use emg_core::{config_error, EmgResult, FRAME_DELIMITER};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Noise configuration for realistic EMG simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Gaussian noise standard deviation (0.0 = no noise)
    pub gaussian_std: f64,
    /// Resting level of the rectified signal
    pub baseline: f64,
    /// Motion artifact probability per sample (0.0 to 1.0)
    pub motion_artifact_prob: f64,
    /// Motion artifact amplitude
    pub motion_artifact_amp: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            gaussian_std: 3.0,
            baseline: 20.0,
            motion_artifact_prob: 0.0,
            motion_artifact_amp: 60.0,
        }
    }
}

/// Configuration for EMG simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Number of channels per frame
    pub channel_count: usize,
    /// Burst schedule; channels without an entry stay quiet
    pub patterns: Vec<ChannelPattern>,
    pub noise: NoiseConfig,
    /// Power line interference (50/60Hz)
    pub powerline_freq: Option<f64>,
    pub powerline_amplitude: f64,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 1000.0,
            channel_count: 6,
            patterns: Vec::new(),
            noise: NoiseConfig::default(),
            powerline_freq: Some(60.0),
            powerline_amplitude: 40.0,
            seed: None,
        }
    }
}

/// EMG board simulator
pub struct EmgSimulator {
    config: SimulatorConfig,
    rng: rand::rngs::StdRng,
    normal_dist: Normal<f64>,
    envelopes: Vec<BurstPattern>,
    sample_index: u64,
}

impl EmgSimulator {
    /// Create new simulator with configuration
    pub fn new(config: SimulatorConfig) -> EmgResult<Self> {
        if config.channel_count == 0 {
            return Err(config_error!("simulator needs at least one channel"));
        }
        if !(config.sampling_rate > 0.0) {
            return Err(config_error!("simulator sampling rate must be positive"));
        }

        let mut envelopes = vec![BurstPattern::Quiet; config.channel_count];
        for entry in &config.patterns {
            let slot = envelopes.get_mut(entry.channel).ok_or_else(|| {
                config_error!("pattern targets channel {} of {}", entry.channel, config.channel_count)
            })?;
            *slot = entry.pattern;
            tracing::debug!(channel = entry.channel, "Simulating {}", entry.pattern.description());
        }

        let normal_dist = Normal::new(0.0, config.noise.gaussian_std)
            .map_err(|e| config_error!("Failed to create normal distribution: {}", e))?;

        let rng = match config.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        };

        Ok(EmgSimulator {
            config,
            rng,
            normal_dist,
            envelopes,
            sample_index: 0,
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Time of the next sample, in seconds
    pub fn time(&self) -> f64 {
        self.sample_index as f64 / self.config.sampling_rate
    }

    /// Generate the readings for the next sample instant
    pub fn next_frame(&mut self) -> Vec<f64> {
        let time = self.time();
        self.sample_index += 1;

        let interference = match self.config.powerline_freq {
            Some(freq) => self.config.powerline_amplitude * (2.0 * PI * freq * time).sin(),
            None => 0.0,
        };

        (0..self.config.channel_count)
            .map(|channel| {
                let activation = self.envelopes[channel].activation_at_time(time);
                // Random muscle fiber recruitment
                let muscle = activation * self.rng.gen_range(0.8..1.2);
                let value = self.config.noise.baseline + muscle + interference + self.add_noise();
                value.max(0.0)
            })
            .collect()
    }

    /// Next frame rendered as a board line (without terminator)
    pub fn next_line(&mut self) -> String {
        let mut delimiter = [0u8; 4];
        let delimiter = FRAME_DELIMITER.encode_utf8(&mut delimiter);
        self.next_frame()
            .iter()
            .map(|v| format!("{:.2}", v))
            .collect::<Vec<_>>()
            .join(delimiter)
    }

    fn add_noise(&mut self) -> f64 {
        let mut noise = self.normal_dist.sample(&mut self.rng);

        // Motion artifacts (random spikes)
        if self.rng.gen::<f64>() < self.config.noise.motion_artifact_prob {
            noise += self.config.noise.motion_artifact_amp * self.rng.gen_range(-1.0..1.0);
        }

        noise
    }
}
