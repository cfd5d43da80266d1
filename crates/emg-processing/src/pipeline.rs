//! Per-frame detection pipeline
//!
//! `DetectionPipeline` is the session context: it owns the decoder, the
//! filter bank, every channel's trigger state and the resolver, and runs
//! decode -> filter -> detect -> resolve -> commit once per frame. Dispatch
//! is left to the caller, which owns the transport.

use crate::config::SessionConfig;
use crate::detector::{ChannelState, SpikeDetector, SpikeEvent};
use crate::filters::{DelayLine, FilterBank};
use crate::resolver::{PriorityResolver, Suppression, SuppressionGraph};
use emg_core::{DecodeError, EmgResult, Frame, FrameDecoder};
use serde::{Deserialize, Serialize};

/// One channel's filtered value for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilteredSample {
    pub channel: usize,
    pub timestamp: f64,
    pub value: f64,
}

/// Why a frame never reached the filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    Empty,
    ChannelCount,
    InvalidToken,
    NonFinite,
    /// Timestamp earlier than the previous processed frame
    OutOfOrder,
}

impl From<&DecodeError> for DropReason {
    fn from(error: &DecodeError) -> Self {
        match error {
            DecodeError::Empty => DropReason::Empty,
            DecodeError::ChannelCount { .. } => DropReason::ChannelCount,
            DecodeError::InvalidToken { .. } => DropReason::InvalidToken,
            DecodeError::NonFinite { .. } => DropReason::NonFinite,
        }
    }
}

/// Dropped-frame counters, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounters {
    pub empty: u64,
    pub channel_count: u64,
    pub invalid_token: u64,
    pub non_finite: u64,
    pub out_of_order: u64,
}

impl DropCounters {
    fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::Empty => self.empty += 1,
            DropReason::ChannelCount => self.channel_count += 1,
            DropReason::InvalidToken => self.invalid_token += 1,
            DropReason::NonFinite => self.non_finite += 1,
            DropReason::OutOfOrder => self.out_of_order += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.empty + self.channel_count + self.invalid_token + self.non_finite + self.out_of_order
    }
}

/// Whether the wire data matches the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineHealth {
    Healthy,
    /// Every recent line carried `observed` values instead of `expected`
    ChannelCountMismatch { expected: usize, observed: usize },
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub frames_dropped: DropCounters,
    pub candidates: u64,
    pub suppressions: u64,
    pub commits: u64,
}

/// Everything that happened to one processed frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub timestamp: f64,
    pub filtered: Vec<FilteredSample>,
    pub candidates: Vec<usize>,
    pub suppressed: Vec<Suppression>,
    pub committed: Vec<SpikeEvent>,
}

/// Result of feeding one line or frame to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Processed(FrameReport),
    Dropped(DropReason),
}

impl FrameOutcome {
    pub fn report(&self) -> Option<&FrameReport> {
        match self {
            FrameOutcome::Processed(report) => Some(report),
            FrameOutcome::Dropped(_) => None,
        }
    }

    pub fn committed(&self) -> &[SpikeEvent] {
        self.report().map(|r| r.committed.as_slice()).unwrap_or(&[])
    }
}

/// Read-only copy of one channel's mutable state
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub filter: DelayLine,
    pub trigger: ChannelState,
}

/// Detection session context
pub struct DetectionPipeline {
    config: SessionConfig,
    decoder: FrameDecoder,
    filters: FilterBank,
    detector: SpikeDetector,
    resolver: PriorityResolver,
    stats: PipelineStats,
    health: PipelineHealth,
    last_timestamp: Option<f64>,
    mismatch_run: usize,
    mismatch_width: Option<usize>,
}

impl DetectionPipeline {
    /// Validate `config` and build a pipeline with fresh channel state
    pub fn new(config: SessionConfig) -> EmgResult<Self> {
        config.validate()?;

        let filters = FilterBank::from_config(&config)?;
        let detector = SpikeDetector::new(&config);
        let resolver = PriorityResolver::new(SuppressionGraph::from_config(&config));

        tracing::debug!(
            channels = config.channel_count(),
            rules = resolver.graph().rules().len(),
            "Detection pipeline ready: {}",
            config.name
        );

        Ok(DetectionPipeline {
            decoder: FrameDecoder::new(config.channel_count()),
            config,
            filters,
            detector,
            resolver,
            stats: PipelineStats::default(),
            health: PipelineHealth::Healthy,
            last_timestamp: None,
            mismatch_run: 0,
            mismatch_width: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn health(&self) -> PipelineHealth {
        self.health
    }

    pub fn detector(&self) -> &SpikeDetector {
        &self.detector
    }

    pub fn filters(&self) -> &FilterBank {
        &self.filters
    }

    pub fn channel_snapshot(&self, channel: usize) -> Option<ChannelSnapshot> {
        Some(ChannelSnapshot {
            filter: *self.filters.delay_line(channel)?,
            trigger: self.detector.channel(channel)?.clone(),
        })
    }

    /// Decode and process one inbound line received at `now`
    pub fn process_line(&mut self, line: &str, now: f64) -> FrameOutcome {
        match self.decoder.decode(line, now) {
            Ok(frame) => self.process_frame(&frame),
            Err(error) => {
                self.track_mismatch(&error);
                tracing::trace!("Dropped frame: {}", error);
                self.drop_frame(DropReason::from(&error))
            }
        }
    }

    /// Run one decoded frame through filter, detector and resolver
    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutcome {
        if frame.channel_count() != self.config.channel_count() {
            let error = DecodeError::ChannelCount {
                expected: self.config.channel_count(),
                found: frame.channel_count(),
            };
            self.track_mismatch(&error);
            return self.drop_frame(DropReason::ChannelCount);
        }
        if !frame.timestamp.is_finite() || frame.values.iter().any(|v| !v.is_finite()) {
            tracing::trace!("Dropped frame at {}s with non-finite data", frame.timestamp);
            return self.drop_frame(DropReason::NonFinite);
        }
        if let Some(last) = self.last_timestamp {
            if frame.timestamp < last {
                tracing::trace!("Dropped frame at {:.3}s, previous was {:.3}s", frame.timestamp, last);
                return self.drop_frame(DropReason::OutOfOrder);
            }
        }

        self.clear_mismatch();
        self.last_timestamp = Some(frame.timestamp);
        let now = frame.timestamp;

        let values = match self.filters.filter_frame(&frame.values) {
            Ok(values) => values,
            Err(e) => {
                tracing::error!("Filter bank rejected frame: {}", e);
                return self.drop_frame(DropReason::ChannelCount);
            }
        };
        self.detector.prune(now);

        let candidates = self.detector.candidates(&values, now);
        let resolution = self.resolver.resolve(&candidates, self.detector.channels(), now);

        for suppression in &resolution.suppressed {
            tracing::debug!(
                channel = suppression.channel,
                dominant = suppression.dominant,
                "Suppressed burst on {}: {:?}",
                self.config.channels[suppression.channel].label,
                suppression.cause
            );
        }

        let mut committed = Vec::with_capacity(resolution.winners.len());
        for &channel in &resolution.winners {
            tracing::debug!(channel, "Burst on {}", self.config.channels[channel].label);
            match self.detector.commit(channel, now) {
                Ok(event) => committed.push(event),
                Err(e) => tracing::error!("Commit rejected: {}", e),
            }
        }

        self.stats.frames_processed += 1;
        self.stats.candidates += candidates.len() as u64;
        self.stats.suppressions += resolution.suppressed.len() as u64;
        self.stats.commits += committed.len() as u64;

        FrameOutcome::Processed(FrameReport {
            timestamp: now,
            filtered: values
                .into_iter()
                .enumerate()
                .map(|(channel, value)| FilteredSample { channel, timestamp: now, value })
                .collect(),
            candidates,
            suppressed: resolution.suppressed,
            committed,
        })
    }

    /// Clear all channel state for a new session
    pub fn reset(&mut self) {
        self.filters.reset();
        self.detector.reset();
        self.stats = PipelineStats::default();
        self.health = PipelineHealth::Healthy;
        self.last_timestamp = None;
        self.mismatch_run = 0;
        self.mismatch_width = None;
    }

    fn drop_frame(&mut self, reason: DropReason) -> FrameOutcome {
        self.stats.frames_dropped.record(reason);
        FrameOutcome::Dropped(reason)
    }

    fn track_mismatch(&mut self, error: &DecodeError) {
        let DecodeError::ChannelCount { expected, found } = *error else {
            self.mismatch_run = 0;
            self.mismatch_width = None;
            return;
        };

        if self.mismatch_width == Some(found) {
            self.mismatch_run += 1;
        } else {
            self.mismatch_width = Some(found);
            self.mismatch_run = 1;
        }

        let mismatch = PipelineHealth::ChannelCountMismatch { expected, observed: found };
        if self.mismatch_run >= self.config.mismatch_tolerance && self.health != mismatch {
            tracing::error!(
                expected,
                observed = found,
                "Board sends {} channels but the session is configured for {}; every frame is being dropped",
                found,
                expected
            );
            self.health = mismatch;
        }
    }

    fn clear_mismatch(&mut self) {
        self.mismatch_run = 0;
        self.mismatch_width = None;
        if self.health != PipelineHealth::Healthy {
            tracing::info!("Channel count matches configuration again");
            self.health = PipelineHealth::Healthy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(values: &[f64]) -> String {
        values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
    }

    /// Quiet line with a 1000-count impulse on the listed channels
    fn burst(channels: &[usize]) -> String {
        let mut values = [0.0; 6];
        for &c in channels {
            values[c] = 1000.0;
        }
        line(&values)
    }

    fn snapshots(pipeline: &DetectionPipeline) -> Vec<ChannelSnapshot> {
        (0..6).map(|c| pipeline.channel_snapshot(c).unwrap()).collect()
    }

    #[test]
    fn test_elbow_wins_over_wrist() {
        let mut pipeline = DetectionPipeline::new(SessionConfig::six_channel_arm()).unwrap();
        let mut committed = Vec::new();

        for step in 0..=80 {
            let now = step as f64 * 0.05;
            let text = match step {
                40 => burst(&[2]), // elbow at 2.0s
                44 => burst(&[0]), // wrist at 2.2s
                _ => line(&[0.0; 6]),
            };
            committed.extend_from_slice(pipeline.process_line(&text, now).committed());
        }

        assert_eq!(committed, vec![SpikeEvent { channel: 2, timestamp: 2.0 }]);
        assert_eq!(pipeline.stats().suppressions, 1);
        assert_eq!(pipeline.stats().commits, 1);
    }

    #[test]
    fn test_wrist_commits_outside_priority_window() {
        let mut config = SessionConfig::six_channel_arm();
        config.channels[2].threshold = 100.0;
        let mut pipeline = DetectionPipeline::new(config).unwrap();

        pipeline.process_line(&burst(&[2]), 10.0);
        pipeline.process_line(&line(&[0.0; 6]), 10.1);

        let outcome = pipeline.process_line(&burst(&[0]), 10.3);
        assert!(outcome.committed().is_empty());
        assert_eq!(outcome.report().unwrap().candidates, vec![0]);

        pipeline.process_line(&line(&[0.0; 6]), 10.4);
        let outcome = pipeline.process_line(&burst(&[0]), 11.5);
        assert_eq!(outcome.committed(), &[SpikeEvent { channel: 0, timestamp: 11.5 }]);
    }

    #[test]
    fn test_simultaneous_elbow_and_wrist() {
        let mut pipeline = DetectionPipeline::new(SessionConfig::six_channel_arm()).unwrap();
        let outcome = pipeline.process_line(&burst(&[0, 2, 5]), 1.0);

        let channels: Vec<usize> = outcome.committed().iter().map(|e| e.channel).collect();
        assert_eq!(channels, vec![2, 5]);
    }

    #[test]
    fn test_filtered_samples_follow_channel_order() {
        let mut pipeline = DetectionPipeline::new(SessionConfig::six_channel_arm()).unwrap();
        let outcome = pipeline.process_line("1,2,3,4,5,6", 0.5);
        let report = outcome.report().unwrap();

        assert_eq!(report.filtered.len(), 6);
        for (i, sample) in report.filtered.iter().enumerate() {
            assert_eq!(sample.channel, i);
            assert_eq!(sample.timestamp, 0.5);
            assert!((sample.value - (i + 1) as f64 * 0.981_497).abs() < 1e-4);
        }
    }

    #[test]
    fn test_malformed_frame_leaves_state_untouched() {
        let mut pipeline = DetectionPipeline::new(SessionConfig::six_channel_arm()).unwrap();
        pipeline.process_line(&burst(&[1, 2]), 1.0);
        pipeline.process_line("3,-4,5,6,7,8", 1.001);

        let before = snapshots(&pipeline);
        let stats = pipeline.stats();

        let outcome = pipeline.process_line("1,2,abc,4,5,6", 1.002);

        assert_eq!(outcome, FrameOutcome::Dropped(DropReason::InvalidToken));
        assert_eq!(snapshots(&pipeline), before);
        assert_eq!(pipeline.stats().frames_processed, stats.frames_processed);
        assert_eq!(pipeline.stats().frames_dropped.invalid_token, 1);
    }

    #[test]
    fn test_out_of_order_frame_is_dropped() {
        let mut pipeline = DetectionPipeline::new(SessionConfig::six_channel_arm()).unwrap();
        pipeline.process_line(&line(&[0.0; 6]), 2.0);

        let before = snapshots(&pipeline);
        let outcome = pipeline.process_line(&burst(&[4]), 1.5);

        assert_eq!(outcome, FrameOutcome::Dropped(DropReason::OutOfOrder));
        assert_eq!(snapshots(&pipeline), before);
    }

    #[test]
    fn test_history_is_pruned_every_frame() {
        let mut pipeline = DetectionPipeline::new(SessionConfig::six_channel_arm()).unwrap();
        pipeline.process_line(&burst(&[3]), 5.0);

        pipeline.process_line(&line(&[0.0; 6]), 6.9);
        assert_eq!(pipeline.detector().channel(3).unwrap().history().count(), 1);

        pipeline.process_line(&line(&[0.0; 6]), 7.1);
        assert_eq!(pipeline.detector().channel(3).unwrap().history().count(), 0);
    }

    #[test]
    fn test_channel_count_mismatch_is_diagnosed() {
        let mut config = SessionConfig::six_channel_arm();
        config.mismatch_tolerance = 5;
        let mut pipeline = DetectionPipeline::new(config).unwrap();

        for i in 0..4 {
            pipeline.process_line("1,2,3,4,5", i as f64 * 0.01);
        }
        assert_eq!(pipeline.health(), PipelineHealth::Healthy);

        pipeline.process_line("1,2,3,4,5", 0.05);
        assert_eq!(
            pipeline.health(),
            PipelineHealth::ChannelCountMismatch { expected: 6, observed: 5 }
        );
        assert_eq!(pipeline.stats().frames_dropped.channel_count, 5);

        pipeline.process_line("1,2,3,4,5,6", 0.06);
        assert_eq!(pipeline.health(), PipelineHealth::Healthy);
    }

    #[test]
    fn test_interleaved_garbage_does_not_trip_mismatch() {
        let mut config = SessionConfig::six_channel_arm();
        config.mismatch_tolerance = 3;
        let mut pipeline = DetectionPipeline::new(config).unwrap();

        for i in 0..10 {
            let text = if i % 2 == 0 { "1,2,3" } else { "" };
            pipeline.process_line(text, i as f64);
        }
        assert_eq!(pipeline.health(), PipelineHealth::Healthy);
        assert_eq!(pipeline.stats().frames_dropped.total(), 10);
    }

    #[test]
    fn test_reset_clears_session_state() {
        let mut pipeline = DetectionPipeline::new(SessionConfig::six_channel_arm()).unwrap();
        pipeline.process_line(&burst(&[2]), 3.0);

        pipeline.reset();

        let fresh = DetectionPipeline::new(SessionConfig::six_channel_arm()).unwrap();
        assert_eq!(snapshots(&pipeline), snapshots(&fresh));
        assert_eq!(pipeline.stats(), PipelineStats::default());
        // Earlier timestamps are accepted again
        assert!(pipeline.process_line(&line(&[0.0; 6]), 0.0).report().is_some());
    }

    #[test]
    fn test_non_finite_frames_leave_state_untouched() {
        let mut pipeline = DetectionPipeline::new(SessionConfig::six_channel_arm()).unwrap();
        let before = snapshots(&pipeline);

        let poisoned = Frame::new(1.0, vec![f64::NAN, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(pipeline.process_frame(&poisoned), FrameOutcome::Dropped(DropReason::NonFinite));

        let infinite = Frame::new(1.1, vec![0.0, 0.0, f64::INFINITY, 0.0, 0.0, 0.0]);
        assert_eq!(pipeline.process_frame(&infinite), FrameOutcome::Dropped(DropReason::NonFinite));

        let untimed = Frame::new(f64::NAN, vec![1000.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(pipeline.process_frame(&untimed), FrameOutcome::Dropped(DropReason::NonFinite));

        assert_eq!(snapshots(&pipeline), before);
        assert_eq!(pipeline.stats().frames_dropped.non_finite, 3);
        assert_eq!(pipeline.stats().commits, 0);

        // Clean frames still filter to finite values and debounce normally
        let outcome = pipeline.process_frame(&Frame::new(5.0, vec![1000.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
        let report = outcome.report().unwrap();
        assert!(report.filtered.iter().all(|s| s.value.is_finite()));
        assert_eq!(outcome.committed(), &[SpikeEvent { channel: 0, timestamp: 5.0 }]);

        let again = Frame::new(5.5, vec![1000.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(pipeline.process_frame(&again).committed().is_empty());
    }
}
