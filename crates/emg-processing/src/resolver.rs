//! Cross-channel priority resolution
//!
//! The suppression graph is declared per channel: a subordinate lists the
//! dominant channels that silence it, together with the window (seconds)
//! around a dominant spike during which it stays silent. Rules are one-way.

use crate::config::SessionConfig;
use crate::detector::ChannelState;
use emg_core::{config_error, EmgError, EmgResult};
use serde::{Deserialize, Serialize};

/// "subordinate is suppressed while dominant fired within ±window_secs"
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuppressionRule {
    pub subordinate: usize,
    pub dominant: usize,
    pub window_secs: f64,
}

/// Declarative suppression topology, indexed by subordinate channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuppressionGraph {
    dominants: Vec<Vec<(usize, f64)>>,
}

impl SuppressionGraph {
    pub fn from_config(config: &SessionConfig) -> Self {
        SuppressionGraph {
            dominants: config
                .channels
                .iter()
                .map(|channel| {
                    channel
                        .dominants
                        .iter()
                        .map(|&dominant| (dominant, channel.priority_window_secs))
                        .collect()
                })
                .collect(),
        }
    }

    /// Build a graph from explicit rules
    pub fn from_rules(channel_count: usize, rules: &[SuppressionRule]) -> EmgResult<Self> {
        let mut dominants = vec![Vec::new(); channel_count];
        for rule in rules {
            for index in [rule.subordinate, rule.dominant] {
                if index >= channel_count {
                    return Err(EmgError::UnknownChannel { index, channel_count });
                }
            }
            if rule.subordinate == rule.dominant {
                return Err(config_error!("channel {} cannot suppress itself", rule.subordinate));
            }
            dominants[rule.subordinate].push((rule.dominant, rule.window_secs));
        }
        Ok(SuppressionGraph { dominants })
    }

    pub fn dominants_of(&self, channel: usize) -> &[(usize, f64)] {
        self.dominants.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Flattened rule list, by subordinate then declaration order
    pub fn rules(&self) -> Vec<SuppressionRule> {
        self.dominants
            .iter()
            .enumerate()
            .flat_map(|(subordinate, list)| {
                list.iter().map(move |&(dominant, window_secs)| SuppressionRule {
                    subordinate,
                    dominant,
                    window_secs,
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dominants.iter().all(Vec::is_empty)
    }
}

/// Why a candidate was dropped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SuppressionCause {
    /// The dominant is a live candidate in the same frame
    SameFrame,
    /// The dominant committed a spike at `fired_at`, inside the window
    RecentSpike { fired_at: f64 },
}

/// One dropped candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Suppression {
    pub channel: usize,
    pub dominant: usize,
    pub cause: SuppressionCause,
}

/// Result of resolving one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Channels allowed to commit, ascending
    pub winners: Vec<usize>,
    pub suppressed: Vec<Suppression>,
}

/// Applies the suppression graph to a frame's candidates
#[derive(Debug, Clone)]
pub struct PriorityResolver {
    graph: SuppressionGraph,
}

impl PriorityResolver {
    pub fn new(graph: SuppressionGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &SuppressionGraph {
        &self.graph
    }

    /// Decide which candidates commit at `now`
    ///
    /// Candidates are examined in ascending channel order. A same-frame
    /// dominant only suppresses if it has not already been suppressed
    /// itself; history entries always count.
    pub fn resolve(&self, candidates: &[usize], history: &[ChannelState], now: f64) -> Resolution {
        let mut ordered = candidates.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut is_candidate = vec![false; history.len()];
        for &channel in &ordered {
            is_candidate[channel] = true;
        }
        let mut suppressed = vec![false; history.len()];

        let mut resolution = Resolution::default();
        for &channel in &ordered {
            let verdict = self.graph.dominants_of(channel).iter().find_map(|&(dominant, window)| {
                if is_candidate[dominant] && !suppressed[dominant] {
                    return Some((dominant, SuppressionCause::SameFrame));
                }
                history[dominant]
                    .fired_within(now, window)
                    .map(|fired_at| (dominant, SuppressionCause::RecentSpike { fired_at }))
            });

            match verdict {
                Some((dominant, cause)) => {
                    suppressed[channel] = true;
                    resolution.suppressed.push(Suppression { channel, dominant, cause });
                }
                None => resolution.winners.push(channel),
            }
        }

        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::SpikeDetector;

    fn rig() -> (SpikeDetector, PriorityResolver) {
        let config = SessionConfig::six_channel_arm();
        (
            SpikeDetector::new(&config),
            PriorityResolver::new(SuppressionGraph::from_config(&config)),
        )
    }

    #[test]
    fn test_graph_from_config() {
        let graph = SuppressionGraph::from_config(&SessionConfig::six_channel_arm());
        assert_eq!(
            graph.rules(),
            vec![
                SuppressionRule { subordinate: 0, dominant: 2, window_secs: 1.0 },
                SuppressionRule { subordinate: 1, dominant: 3, window_secs: 1.0 },
            ]
        );
        assert!(graph.dominants_of(2).is_empty());
        assert!(graph.dominants_of(99).is_empty());
    }

    #[test]
    fn test_graph_from_rules_validates_indices() {
        let bad = [SuppressionRule { subordinate: 0, dominant: 7, window_secs: 1.0 }];
        assert!(SuppressionGraph::from_rules(6, &bad).is_err());

        let selfish = [SuppressionRule { subordinate: 1, dominant: 1, window_secs: 1.0 }];
        assert!(SuppressionGraph::from_rules(6, &selfish).is_err());

        assert!(SuppressionGraph::from_rules(6, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_recent_dominant_spike_suppresses() {
        let (mut detector, resolver) = rig();
        detector.commit(2, 10.0).unwrap();

        let resolution = resolver.resolve(&[0], detector.channels(), 10.3);
        assert!(resolution.winners.is_empty());
        assert_eq!(
            resolution.suppressed,
            vec![Suppression {
                channel: 0,
                dominant: 2,
                cause: SuppressionCause::RecentSpike { fired_at: 10.0 },
            }]
        );

        let resolution = resolver.resolve(&[0], detector.channels(), 11.5);
        assert_eq!(resolution.winners, vec![0]);
    }

    #[test]
    fn test_same_frame_dominant_suppresses() {
        let (detector, resolver) = rig();
        let resolution = resolver.resolve(&[0, 2], detector.channels(), 4.0);

        assert_eq!(resolution.winners, vec![2]);
        assert_eq!(resolution.suppressed[0].cause, SuppressionCause::SameFrame);
    }

    #[test]
    fn test_suppression_is_one_way() {
        let (mut detector, resolver) = rig();
        detector.commit(0, 10.0).unwrap();

        // Wrist activity never silences the elbow
        let resolution = resolver.resolve(&[2], detector.channels(), 10.2);
        assert_eq!(resolution.winners, vec![2]);
    }

    #[test]
    fn test_unrelated_channels_commit_together() {
        let (detector, resolver) = rig();
        let resolution = resolver.resolve(&[5, 1, 4], detector.channels(), 1.0);

        assert_eq!(resolution.winners, vec![1, 4, 5]);
        assert!(resolution.suppressed.is_empty());
    }

    #[test]
    fn test_suppressed_channel_cannot_suppress() {
        // 0 silences 1, 1 silences 2
        let rules = [
            SuppressionRule { subordinate: 1, dominant: 0, window_secs: 1.0 },
            SuppressionRule { subordinate: 2, dominant: 1, window_secs: 1.0 },
        ];
        let resolver = PriorityResolver::new(SuppressionGraph::from_rules(3, &rules).unwrap());
        let history = vec![ChannelState::default(); 3];

        let resolution = resolver.resolve(&[2, 1, 0], &history, 1.0);
        assert_eq!(resolution.winners, vec![0, 2]);
        assert_eq!(resolution.suppressed.len(), 1);
        assert_eq!(resolution.suppressed[0].channel, 1);
    }

    #[test]
    fn test_later_dominants_count_by_candidacy() {
        // 1 silences 0, 2 silences 1; 0 is examined before 1 is known to be silenced
        let rules = [
            SuppressionRule { subordinate: 0, dominant: 1, window_secs: 1.0 },
            SuppressionRule { subordinate: 1, dominant: 2, window_secs: 1.0 },
        ];
        let resolver = PriorityResolver::new(SuppressionGraph::from_rules(3, &rules).unwrap());
        let history = vec![ChannelState::default(); 3];

        let resolution = resolver.resolve(&[0, 1, 2], &history, 1.0);
        assert_eq!(resolution.winners, vec![2]);
        let dropped: Vec<usize> = resolution.suppressed.iter().map(|s| s.channel).collect();
        assert_eq!(dropped, vec![0, 1]);
    }
}
