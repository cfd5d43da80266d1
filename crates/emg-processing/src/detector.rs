//! Debounced burst detection
//!
//! A channel is armed when its cooldown has elapsed since the last committed
//! spike. An armed channel whose filtered sample exceeds its threshold is a
//! candidate; candidates only become spikes once the priority resolver lets
//! them commit.

use crate::config::SessionConfig;
use emg_core::{EmgError, EmgResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A committed burst on one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub channel: usize,
    pub timestamp: f64,
}

/// Detector state of one channel at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Still inside the cooldown of the last commit
    Idle,
    /// Eligible to trigger
    Armed,
}

/// Mutable trigger state of one channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelState {
    last_trigger: Option<f64>,
    history: VecDeque<SpikeEvent>,
}

impl ChannelState {
    pub fn last_trigger(&self) -> Option<f64> {
        self.last_trigger
    }

    /// Committed spikes, oldest first
    pub fn history(&self) -> impl Iterator<Item = &SpikeEvent> + '_ {
        self.history.iter()
    }

    pub fn state_at(&self, now: f64, cooldown: f64) -> DetectorState {
        match self.last_trigger {
            Some(last) if now - last <= cooldown => DetectorState::Idle,
            _ => DetectorState::Armed,
        }
    }

    /// Most recent spike within `window` seconds of `now`, either side
    pub fn fired_within(&self, now: f64, window: f64) -> Option<f64> {
        self.history
            .iter()
            .rev()
            .map(|event| event.timestamp)
            .find(|t| (now - t).abs() <= window)
    }

    fn commit(&mut self, event: SpikeEvent, retention: f64) {
        debug_assert!(self.last_trigger.map_or(true, |last| event.timestamp >= last));

        self.last_trigger = Some(event.timestamp);
        self.history.push_back(event);
        self.prune(event.timestamp, retention);
    }

    fn prune(&mut self, now: f64, retention: f64) {
        while let Some(oldest) = self.history.front() {
            if now - oldest.timestamp > retention {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Threshold-and-cooldown detector for every channel of a session
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    thresholds: Vec<f64>,
    cooldowns: Vec<f64>,
    retention: f64,
    channels: Vec<ChannelState>,
}

impl SpikeDetector {
    pub fn new(config: &SessionConfig) -> Self {
        SpikeDetector {
            thresholds: config.channels.iter().map(|c| c.threshold).collect(),
            cooldowns: config.channels.iter().map(|c| c.cooldown_secs).collect(),
            retention: config.retention_secs,
            channels: vec![ChannelState::default(); config.channel_count()],
        }
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelState> {
        self.channels.get(index)
    }

    pub fn retention(&self) -> f64 {
        self.retention
    }

    /// Whether `value` on `channel` would trigger at `now`; unknown channels never do
    pub fn is_candidate(&self, channel: usize, value: f64, now: f64) -> bool {
        let (Some(&threshold), Some(&cooldown), Some(state)) = (
            self.thresholds.get(channel),
            self.cooldowns.get(channel),
            self.channels.get(channel),
        ) else {
            return false;
        };
        value > threshold && state.state_at(now, cooldown) == DetectorState::Armed
    }

    /// Candidate channels for one frame of filtered values, ascending
    pub fn candidates(&self, filtered: &[f64], now: f64) -> Vec<usize> {
        filtered
            .iter()
            .enumerate()
            .filter(|(channel, value)| self.is_candidate(*channel, **value, now))
            .map(|(channel, _)| channel)
            .collect()
    }

    /// Accept a spike on `channel` at `now`
    pub fn commit(&mut self, channel: usize, now: f64) -> EmgResult<SpikeEvent> {
        let channel_count = self.channels.len();
        let state = self
            .channels
            .get_mut(channel)
            .ok_or(EmgError::UnknownChannel { index: channel, channel_count })?;

        let event = SpikeEvent { channel, timestamp: now };
        state.commit(event, self.retention);
        Ok(event)
    }

    /// Drop history entries older than the retention window on every channel
    pub fn prune(&mut self, now: f64) {
        let retention = self.retention;
        for state in &mut self.channels {
            state.prune(now, retention);
        }
    }

    /// Forget every trigger
    pub fn reset(&mut self) {
        self.channels.iter_mut().for_each(|state| *state = ChannelState::default());
    }
}
