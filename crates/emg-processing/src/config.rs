//! Session configuration
//!
//! Channel count, thresholds, cooldowns, action symbols and the suppression
//! graph are all data. A session validates its configuration once at start
//! and never changes it afterwards.

use emg_core::{config_error, EmgError, EmgResult, MuscleSite};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum number of channels a session may declare
pub const MAX_CHANNELS: usize = 16;

/// How long a committed spike stays in its channel history (seconds)
pub const DEFAULT_RETENTION_SECS: f64 = 2.0;

/// Default debounce between two commits on one channel (seconds)
pub const DEFAULT_COOLDOWN_SECS: f64 = 0.8;

/// Default suppression window around a dominant channel's spike (seconds)
pub const DEFAULT_PRIORITY_WINDOW_SECS: f64 = 1.0;

/// Symbol that returns the arm to its default pose
pub const DEFAULT_RESET_SYMBOL: char = 'Z';

const MIN_SAMPLING_RATE: f64 = 100.0;
const MAX_SAMPLING_RATE: f64 = 10_000.0;

/// Built-in channel layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigProfile {
    /// Six electrodes, wrists suppressed by the elbow on the same side
    SixChannelArm,
    /// Five electrodes on the threaded reader rig
    FiveChannelThreaded,
    /// Five electrodes with the right elbow wired last
    FiveChannelCrossed,
    /// Loaded from a file or built by hand
    Custom,
}

impl ConfigProfile {
    pub fn description(&self) -> &'static str {
        match self {
            ConfigProfile::SixChannelArm => "6-channel arm, elbow priority",
            ConfigProfile::FiveChannelThreaded => "5-channel arm, threaded reader",
            ConfigProfile::FiveChannelCrossed => "5-channel arm, right elbow on A4",
            ConfigProfile::Custom => "custom",
        }
    }
}

/// Power-line notch parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NotchConfig {
    /// Interference frequency (Hz), 50 or 60 depending on the mains grid
    pub frequency: f64,
    /// Quality factor; higher is narrower
    pub quality: f64,
}

impl Default for NotchConfig {
    fn default() -> Self {
        Self {
            frequency: 60.0,
            quality: 10.0,
        }
    }
}

/// Immutable configuration of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub label: String,
    pub site: MuscleSite,
    /// Filtered value that must be exceeded to trigger
    pub threshold: f64,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: f64,
    /// Symbol written to the arm when this channel commits
    pub action: char,
    /// Channels whose recent activity suppresses this one
    #[serde(default)]
    pub dominants: Vec<usize>,
    #[serde(default = "default_priority_window")]
    pub priority_window_secs: f64,
}

fn default_cooldown() -> f64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_priority_window() -> f64 {
    DEFAULT_PRIORITY_WINDOW_SECS
}

impl ChannelConfig {
    /// Channel with default cooldown, window and no dominants
    pub fn new(index: usize, site: MuscleSite, threshold: f64, action: char) -> Self {
        Self {
            label: site.label(index),
            site,
            threshold,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            action,
            dominants: Vec::new(),
            priority_window_secs: DEFAULT_PRIORITY_WINDOW_SECS,
        }
    }

    /// Declare the channels that suppress this one
    pub fn dominated_by(mut self, dominants: &[usize]) -> Self {
        self.dominants = dominants.to_vec();
        self
    }
}

/// Complete configuration of one detection session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub name: String,
    pub profile: ConfigProfile,
    /// Board sampling rate (Hz), used for the notch design
    pub sampling_rate: f64,
    pub notch: NotchConfig,
    #[serde(default = "default_retention")]
    pub retention_secs: f64,
    #[serde(default = "default_reset_symbol")]
    pub reset_symbol: char,
    /// Optional byte appended after every symbol (e.g. '\n')
    #[serde(default)]
    pub command_terminator: Option<char>,
    /// Consecutive width mismatches before the session reports a wiring fault
    #[serde(default = "default_mismatch_tolerance")]
    pub mismatch_tolerance: usize,
    pub channels: Vec<ChannelConfig>,
}

fn default_retention() -> f64 {
    DEFAULT_RETENTION_SECS
}

fn default_reset_symbol() -> char {
    DEFAULT_RESET_SYMBOL
}

fn default_mismatch_tolerance() -> usize {
    50
}

/// Preset configurations for the known rigs
impl SessionConfig {
    /// Six electrodes; each wrist is suppressed by the elbow on its side
    pub fn six_channel_arm() -> Self {
        let thresholds = [85.0, 180.0, 100.0, 180.0, 400.0, 180.0];
        let actions = ['L', 'R', 'F', 'B', 'G', 'O'];

        let mut channels: Vec<ChannelConfig> = MuscleSite::ARM_RIG
            .iter()
            .enumerate()
            .map(|(i, site)| ChannelConfig::new(i, *site, thresholds[i], actions[i]))
            .collect();
        channels[0].dominants = vec![2];
        channels[1].dominants = vec![3];

        Self::with_channels("6-channel arm", ConfigProfile::SixChannelArm, channels)
    }

    /// Five electrodes (no right leg) with lower thresholds
    pub fn five_channel_threaded() -> Self {
        let thresholds = [40.0, 18.0, 13.0, 13.0, 15.0];
        let actions = ['L', 'R', 'F', 'B', 'G'];

        let mut channels: Vec<ChannelConfig> = MuscleSite::ARM_RIG[..5]
            .iter()
            .enumerate()
            .map(|(i, site)| ChannelConfig::new(i, *site, thresholds[i], actions[i]))
            .collect();
        channels[0].dominants = vec![2];
        channels[1].dominants = vec![3];

        Self::with_channels("5-channel threaded", ConfigProfile::FiveChannelThreaded, channels)
    }

    /// Five electrodes where the right elbow sits on A4 after the left leg
    pub fn five_channel_crossed() -> Self {
        let channels = vec![
            ChannelConfig::new(0, MuscleSite::LeftWrist, 12.0, 'L').dominated_by(&[2]),
            ChannelConfig::new(1, MuscleSite::RightWrist, 40.0, 'R').dominated_by(&[4]),
            ChannelConfig::new(2, MuscleSite::LeftElbow, 18.0, 'F'),
            ChannelConfig::new(3, MuscleSite::LeftLeg, 13.0, 'G'),
            ChannelConfig::new(4, MuscleSite::RightElbow, 22.0, 'B'),
        ];

        Self::with_channels("5-channel crossed", ConfigProfile::FiveChannelCrossed, channels)
    }

    /// Configuration for given profile
    pub fn for_profile(profile: ConfigProfile) -> Self {
        match profile {
            ConfigProfile::SixChannelArm => Self::six_channel_arm(),
            ConfigProfile::FiveChannelThreaded => Self::five_channel_threaded(),
            ConfigProfile::FiveChannelCrossed => Self::five_channel_crossed(),
            ConfigProfile::Custom => Self::six_channel_arm(), // Default to the 6-channel rig
        }
    }

    /// Rig defaults (1 kHz, 60 Hz notch at Q=10) around the given channels
    pub fn with_channels(name: &str, profile: ConfigProfile, channels: Vec<ChannelConfig>) -> Self {
        SessionConfig {
            name: name.to_string(),
            profile,
            sampling_rate: 1000.0,
            notch: NotchConfig::default(),
            retention_secs: DEFAULT_RETENTION_SECS,
            reset_symbol: DEFAULT_RESET_SYMBOL,
            command_terminator: None,
            mismatch_tolerance: default_mismatch_tolerance(),
            channels,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Validate entire configuration
    pub fn validate(&self) -> EmgResult<()> {
        let count = self.channels.len();
        if count == 0 || count > MAX_CHANNELS {
            return Err(EmgError::InvalidChannelCount {
                count,
                max: MAX_CHANNELS,
            });
        }

        if !(MIN_SAMPLING_RATE..=MAX_SAMPLING_RATE).contains(&self.sampling_rate) {
            return Err(EmgError::InvalidSamplingRate {
                rate: self.sampling_rate,
                valid_range: format!("{}-{}Hz", MIN_SAMPLING_RATE, MAX_SAMPLING_RATE),
            });
        }

        let nyquist = self.sampling_rate / 2.0;
        if !(self.notch.frequency > 0.0 && self.notch.frequency < nyquist) {
            return Err(config_error!(
                "notch frequency {}Hz must lie between 0 and {}Hz",
                self.notch.frequency,
                nyquist
            ));
        }
        if !(self.notch.quality > 0.0 && self.notch.quality.is_finite()) {
            return Err(config_error!("notch quality factor must be positive"));
        }

        if !(self.retention_secs > 0.0 && self.retention_secs.is_finite()) {
            return Err(config_error!("history retention must be positive"));
        }

        if self.mismatch_tolerance == 0 {
            return Err(config_error!("mismatch tolerance must be at least 1"));
        }

        if !self.reset_symbol.is_ascii_graphic() {
            return Err(config_error!("reset symbol {:?} is not a printable ASCII character", self.reset_symbol));
        }

        if let Some(terminator) = self.command_terminator {
            if !terminator.is_ascii() {
                return Err(config_error!("command terminator {:?} is not ASCII", terminator));
            }
        }

        for (index, channel) in self.channels.iter().enumerate() {
            self.validate_channel(index, channel)?;
        }

        Ok(())
    }

    /// Validate individual channel
    fn validate_channel(&self, index: usize, channel: &ChannelConfig) -> EmgResult<()> {
        if !channel.threshold.is_finite() {
            return Err(config_error!("channel {} threshold must be finite", index));
        }

        if !(channel.cooldown_secs >= 0.0 && channel.cooldown_secs.is_finite()) {
            return Err(config_error!("channel {} cooldown must be non-negative", index));
        }

        if !channel.action.is_ascii_graphic() {
            return Err(config_error!(
                "channel {} action {:?} is not a printable ASCII character",
                index,
                channel.action
            ));
        }
        if channel.action == self.reset_symbol {
            return Err(config_error!(
                "channel {} action {:?} collides with the reset symbol",
                index,
                channel.action
            ));
        }

        if !(channel.priority_window_secs >= 0.0 && channel.priority_window_secs.is_finite()) {
            return Err(config_error!("channel {} priority window must be non-negative", index));
        }
        if !channel.dominants.is_empty() && channel.priority_window_secs > self.retention_secs {
            return Err(config_error!(
                "channel {} priority window {}s exceeds history retention {}s",
                index,
                channel.priority_window_secs,
                self.retention_secs
            ));
        }

        for &dominant in &channel.dominants {
            if dominant >= self.channels.len() {
                return Err(EmgError::UnknownChannel {
                    index: dominant,
                    channel_count: self.channels.len(),
                });
            }
            if dominant == index {
                return Err(config_error!("channel {} lists itself as dominant", index));
            }
        }

        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> EmgResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EmgError::Serialization {
            reason: format!("Failed to serialize configuration: {}", e),
        })
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> EmgResult<Self> {
        serde_json::from_str(json).map_err(|e| EmgError::Serialization {
            reason: format!("Failed to deserialize configuration: {}", e),
        })
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> EmgResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {}", path.display(), e))?;

        let config = Self::from_json(&json)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::six_channel_arm()
    }
}
