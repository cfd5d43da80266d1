//! Processing session
//!
//! The processing role runs on a blocking worker that owns the transport and
//! the detection pipeline. Filtered samples and counters are published
//! through `watch` channels so readers only ever see the latest values, and
//! operator commands arrive over a bounded `mpsc` channel polled once per
//! tick.

use chrono::{DateTime, Utc};
use emg_core::{EmgError, EmgResult, SessionClock, Transport};
use emg_processing::{
    CommandDispatcher, DetectionPipeline, DispatchStats, FilteredSample, FrameOutcome,
    PipelineHealth, PipelineStats, SessionConfig,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Pause after a failed read before polling again
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Operator commands for a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Send the reset symbol to the arm
    Reset,
    Stop,
}

/// Last command written to the arm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentCommand {
    pub symbol: char,
    pub timestamp: f64,
}

/// Live counters of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub pipeline: PipelineStats,
    pub dispatch: DispatchStats,
    pub health: PipelineHealth,
    pub read_errors: u64,
    pub last_command: Option<SentCommand>,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            pipeline: PipelineStats::default(),
            dispatch: DispatchStats::default(),
            health: PipelineHealth::Healthy,
            read_errors: 0,
            last_command: None,
        }
    }
}

/// Final report of a finished session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub config_name: String,
    pub transport: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub stats: SessionStats,
}

impl SessionSummary {
    pub fn duration_secs(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Handle on a running session
pub struct SessionHandle {
    id: Uuid,
    started_at: DateTime<Utc>,
    commands: mpsc::Sender<SessionCommand>,
    samples: watch::Receiver<Vec<FilteredSample>>,
    stats: watch::Receiver<SessionStats>,
    worker: JoinHandle<SessionSummary>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Latest filtered samples, last value wins
    pub fn subscribe(&self) -> watch::Receiver<Vec<FilteredSample>> {
        self.samples.clone()
    }

    pub fn stats(&self) -> watch::Receiver<SessionStats> {
        self.stats.clone()
    }

    pub fn command_handle(&self) -> mpsc::Sender<SessionCommand> {
        self.commands.clone()
    }

    pub async fn reset(&self) -> EmgResult<()> {
        self.commands
            .send(SessionCommand::Reset)
            .await
            .map_err(|_| EmgError::SessionClosed)
    }

    /// Stop the processing role and wait for its summary
    pub async fn stop(self) -> EmgResult<SessionSummary> {
        // The worker may already be gone; joining still yields its summary.
        let _ = self.commands.send(SessionCommand::Stop).await;
        self.join().await
    }

    /// Wait for the session to end on its own
    pub async fn join(self) -> EmgResult<SessionSummary> {
        self.worker.await.map_err(|e| {
            tracing::error!("Processing worker failed: {}", e);
            EmgError::SessionClosed
        })
    }
}

/// Validate `config` and start processing frames from `transport`
pub fn start_session<T, C>(config: SessionConfig, transport: T, clock: C) -> EmgResult<SessionHandle>
where
    T: Transport + 'static,
    C: SessionClock + 'static,
{
    let pipeline = DetectionPipeline::new(config)?;
    let id = Uuid::new_v4();
    let started_at = Utc::now();

    let (command_tx, command_rx) = mpsc::channel(32);
    let (samples_tx, samples_rx) = watch::channel(Vec::new());
    let (stats_tx, stats_rx) = watch::channel(SessionStats::default());

    tracing::info!(
        session = %id,
        transport = %transport.describe(),
        "Session started: {}",
        pipeline.config().name
    );

    let worker = ProcessingWorker {
        id,
        started_at,
        dispatcher: CommandDispatcher::new(pipeline.config()),
        pipeline,
        transport,
        clock,
        commands: command_rx,
        samples: samples_tx,
        stats: stats_tx,
        read_errors: 0,
        consecutive_read_errors: 0,
        last_command: None,
    };

    Ok(SessionHandle {
        id,
        started_at,
        commands: command_tx,
        samples: samples_rx,
        stats: stats_rx,
        worker: tokio::task::spawn_blocking(move || worker.run()),
    })
}

/// State owned by the processing role
struct ProcessingWorker<T, C> {
    id: Uuid,
    started_at: DateTime<Utc>,
    pipeline: DetectionPipeline,
    dispatcher: CommandDispatcher,
    transport: T,
    clock: C,
    commands: mpsc::Receiver<SessionCommand>,
    samples: watch::Sender<Vec<FilteredSample>>,
    stats: watch::Sender<SessionStats>,
    read_errors: u64,
    consecutive_read_errors: u64,
    last_command: Option<SentCommand>,
}

impl<T: Transport, C: SessionClock> ProcessingWorker<T, C> {
    fn run(mut self) -> SessionSummary {
        loop {
            match self.commands.try_recv() {
                Ok(SessionCommand::Reset) => {
                    self.dispatcher.send_reset(&mut self.transport);
                    self.publish_stats();
                }
                Ok(SessionCommand::Stop) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::info!("Command channel closed");
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            let line = match self.transport.read_line() {
                Ok(Some(line)) => {
                    self.consecutive_read_errors = 0;
                    line
                }
                Ok(None) => continue,
                Err(e) => {
                    self.read_errors += 1;
                    self.consecutive_read_errors += 1;
                    if self.consecutive_read_errors == 1 {
                        tracing::warn!("Read failed: {}", e);
                    }
                    std::thread::sleep(READ_RETRY_DELAY);
                    continue;
                }
            };

            let now = self.clock.now();
            if let FrameOutcome::Processed(report) = self.pipeline.process_line(&line, now) {
                for event in &report.committed {
                    if let Some(symbol) = self.dispatcher.dispatch(event, &mut self.transport) {
                        self.last_command = Some(SentCommand { symbol, timestamp: event.timestamp });
                    }
                }
                self.samples.send_replace(report.filtered);
            }
            self.publish_stats();
        }

        self.transport.close();
        let summary = SessionSummary {
            id: self.id,
            config_name: self.pipeline.config().name.clone(),
            transport: self.transport.describe(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            stats: self.snapshot(),
        };

        tracing::info!(
            session = %summary.id,
            frames = summary.stats.pipeline.frames_processed,
            dropped = summary.stats.pipeline.frames_dropped.total(),
            sent = summary.stats.dispatch.sent,
            failed = summary.stats.dispatch.failed,
            "Session ended after {:.1}s",
            summary.duration_secs()
        );

        summary
    }

    fn snapshot(&self) -> SessionStats {
        SessionStats {
            pipeline: self.pipeline.stats(),
            dispatch: self.dispatcher.stats(),
            health: self.pipeline.health(),
            read_errors: self.read_errors,
            last_command: self.last_command,
        }
    }

    fn publish_stats(&self) {
        self.stats.send_replace(self.snapshot());
    }
}
