//! In-memory transports
//!
//! `SimulatedTransport` feeds simulator lines to the processing loop and
//! keeps every command written back, standing in for the board during
//! `--simulate` runs. `ScriptedTransport` replays a fixed script for tests.

use crate::emg_simulator::{EmgSimulator, SimulatorConfig};
use emg_core::{transport_error, EmgResult, Transport};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Commands written to an in-memory transport, shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicked writer leaves the log readable.
    fn lock(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, bytes: &[u8]) {
        self.lock().push(bytes.to_vec());
    }

    /// Raw writes in arrival order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().clone()
    }

    /// First character of every write, in order
    pub fn symbols(&self) -> String {
        self.lock()
            .iter()
            .filter_map(|bytes| String::from_utf8_lossy(bytes).chars().next())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Simulated board behind the transport contract
pub struct SimulatedTransport {
    simulator: EmgSimulator,
    log: CommandLog,
    /// Pace lines at the sampling rate instead of as fast as possible
    realtime: bool,
    started: Instant,
    closed: bool,
}

impl SimulatedTransport {
    pub fn new(config: SimulatorConfig, realtime: bool) -> EmgResult<Self> {
        Ok(Self {
            simulator: EmgSimulator::new(config)?,
            log: CommandLog::new(),
            realtime,
            started: Instant::now(),
            closed: false,
        })
    }

    /// Handle on the commands this transport receives
    pub fn command_log(&self) -> CommandLog {
        self.log.clone()
    }
}

impl Transport for SimulatedTransport {
    fn read_line(&mut self) -> EmgResult<Option<String>> {
        if self.closed {
            return Err(transport_error!("simulator link closed"));
        }
        if self.realtime {
            let due = Duration::from_secs_f64(self.simulator.time());
            let elapsed = self.started.elapsed();
            if due > elapsed {
                std::thread::sleep(due - elapsed);
            }
        }
        Ok(Some(self.simulator.next_line()))
    }

    fn write(&mut self, bytes: &[u8]) -> EmgResult<()> {
        if self.closed {
            return Err(transport_error!("simulator link closed"));
        }
        self.log.record(bytes);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            debug!(commands = self.log.len(), "closing simulated transport");
        }
        self.closed = true;
        self.log.mark_closed();
    }

    fn describe(&self) -> String {
        let config = self.simulator.config();
        format!(
            "simulator ({} ch @ {} Hz)",
            config.channel_count, config.sampling_rate
        )
    }
}

/// Replays a fixed sequence of reads; `None` entries are read timeouts
pub struct ScriptedTransport {
    script: VecDeque<Option<String>>,
    log: CommandLog,
    fail_writes: bool,
    closed: bool,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Option<String>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            log: CommandLog::new(),
            fail_writes: false,
            closed: false,
        }
    }

    /// Script made only of lines, no timeouts
    pub fn from_lines<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self::new(lines.into_iter().map(|line| Some(line.into())))
    }

    /// Every write fails, as a stalled link would
    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn command_log(&self) -> CommandLog {
        self.log.clone()
    }
}

impl Transport for ScriptedTransport {
    fn read_line(&mut self) -> EmgResult<Option<String>> {
        if self.closed {
            return Err(transport_error!("scripted link closed"));
        }
        match self.script.pop_front() {
            Some(entry) => Ok(entry),
            None => {
                // Exhausted scripts behave like an idle board.
                std::thread::sleep(Duration::from_millis(1));
                Ok(None)
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> EmgResult<()> {
        if self.closed {
            return Err(transport_error!("scripted link closed"));
        }
        if self.fail_writes {
            return Err(transport_error!("write timed out"));
        }
        self.log.record(bytes);
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.log.mark_closed();
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal_patterns::presets;
    use emg_processing::{DetectionPipeline, SessionConfig};

    #[test]
    fn test_scripted_replay_and_timeouts() {
        let mut transport = ScriptedTransport::new(vec![Some("1,2".to_string()), None]);

        assert_eq!(transport.read_line().unwrap().as_deref(), Some("1,2"));
        assert_eq!(transport.read_line().unwrap(), None);
        assert_eq!(transport.read_line().unwrap(), None);
    }

    #[test]
    fn test_command_log_is_shared() {
        let mut transport = ScriptedTransport::from_lines(Vec::<String>::new());
        let log = transport.command_log();

        transport.write(b"F").unwrap();
        transport.write(b"Z\n").unwrap();

        assert_eq!(log.symbols(), "FZ");
        assert_eq!(log.writes()[1], b"Z\n".to_vec());
    }

    #[test]
    fn test_failing_writes_are_not_recorded() {
        let mut transport = ScriptedTransport::from_lines(Vec::<String>::new()).with_failing_writes();
        let log = transport.command_log();

        assert!(transport.write(b"L").is_err());
        assert!(log.is_empty());
    }

    #[test]
    fn test_closed_transport_rejects_io() {
        let mut transport = ScriptedTransport::from_lines(["1,2,3"]);
        let log = transport.command_log();
        transport.close();

        assert!(log.is_closed());
        assert!(transport.read_line().is_err());
        assert!(transport.write(b"L").is_err());
    }

    #[test]
    fn test_simulated_elbow_then_wrist_commits_elbow_only() {
        let (_, patterns) = presets()
            .into_iter()
            .find(|(name, _)| *name == "Elbow then wrist")
            .unwrap();
        let config = SimulatorConfig {
            patterns,
            seed: Some(42),
            ..Default::default()
        };
        let mut transport = SimulatedTransport::new(config, false).unwrap();
        let mut pipeline = DetectionPipeline::new(SessionConfig::six_channel_arm()).unwrap();

        let mut committed = Vec::new();
        for i in 0..4000 {
            let line = transport.read_line().unwrap().unwrap();
            let outcome = pipeline.process_line(&line, i as f64 / 1000.0);
            committed.extend(outcome.committed().iter().copied());
        }

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].channel, 2);
        assert!((committed[0].timestamp - 2.0).abs() < 0.01);
    }
}
