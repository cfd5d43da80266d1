//! Muscle activation patterns for simulated channels

use serde::{Deserialize, Serialize};

/// Activation envelope of one simulated channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BurstPattern {
    /// Resting muscle
    Quiet,
    /// One contraction
    Single {
        start: f64,
        duration: f64,
        amplitude: f64,
    },
    /// Repeated contractions (on/off cycles)
    Periodic {
        first: f64,
        period: f64,
        duration: f64,
        amplitude: f64,
    },
}

impl BurstPattern {
    /// Envelope amplitude at `time` seconds
    pub fn activation_at_time(&self, time: f64) -> f64 {
        match *self {
            BurstPattern::Quiet => 0.0,

            BurstPattern::Single { start, duration, amplitude } => {
                if time >= start && time < start + duration {
                    amplitude
                } else {
                    0.0
                }
            }

            BurstPattern::Periodic { first, period, duration, amplitude } => {
                if time < first || period <= 0.0 {
                    return 0.0;
                }
                let phase = (time - first) % period;
                if phase < duration {
                    amplitude
                } else {
                    0.0
                }
            }
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BurstPattern::Quiet => "Rest",
            BurstPattern::Single { .. } => "Single contraction",
            BurstPattern::Periodic { .. } => "Repeated contractions",
        }
    }
}

/// Pattern assigned to one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelPattern {
    pub channel: usize,
    pub pattern: BurstPattern,
}

/// Common scenarios for the six-electrode arm rig
pub fn presets() -> Vec<(&'static str, Vec<ChannelPattern>)> {
    vec![
        ("Rest", Vec::new()),
        (
            "Elbow then wrist",
            vec![
                ChannelPattern {
                    channel: 2,
                    pattern: BurstPattern::Single { start: 2.0, duration: 0.15, amplitude: 300.0 },
                },
                ChannelPattern {
                    channel: 0,
                    pattern: BurstPattern::Single { start: 2.2, duration: 0.15, amplitude: 250.0 },
                },
            ],
        ),
        (
            "Alternating wrists",
            vec![
                ChannelPattern {
                    channel: 0,
                    pattern: BurstPattern::Periodic { first: 1.0, period: 3.0, duration: 0.2, amplitude: 250.0 },
                },
                ChannelPattern {
                    channel: 1,
                    pattern: BurstPattern::Periodic { first: 2.5, period: 3.0, duration: 0.2, amplitude: 400.0 },
                },
            ],
        ),
        (
            "Grab cycle",
            vec![
                ChannelPattern {
                    channel: 4,
                    pattern: BurstPattern::Periodic { first: 1.0, period: 4.0, duration: 0.3, amplitude: 700.0 },
                },
                ChannelPattern {
                    channel: 5,
                    pattern: BurstPattern::Periodic { first: 3.0, period: 4.0, duration: 0.3, amplitude: 400.0 },
                },
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_burst_window() {
        let pattern = BurstPattern::Single { start: 2.0, duration: 0.5, amplitude: 300.0 };
        assert_eq!(pattern.activation_at_time(1.99), 0.0);
        assert_eq!(pattern.activation_at_time(2.0), 300.0);
        assert_eq!(pattern.activation_at_time(2.49), 300.0);
        assert_eq!(pattern.activation_at_time(2.5), 0.0);
    }

    #[test]
    fn test_periodic_burst_repeats() {
        let pattern = BurstPattern::Periodic { first: 1.0, period: 2.0, duration: 0.25, amplitude: 50.0 };
        assert_eq!(pattern.activation_at_time(0.5), 0.0);
        assert_eq!(pattern.activation_at_time(1.1), 50.0);
        assert_eq!(pattern.activation_at_time(2.0), 0.0);
        assert_eq!(pattern.activation_at_time(3.1), 50.0);
    }

    #[test]
    fn test_presets_target_rig_channels() {
        for (name, patterns) in presets() {
            assert!(patterns.iter().all(|p| p.channel < 6), "{} uses an unknown channel", name);
        }
    }
}
