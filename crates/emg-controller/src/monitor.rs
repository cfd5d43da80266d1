//! Console monitor
//!
//! The presentation role: prints one compact line per refresh with the
//! latest filtered value of every channel and the last command sent.

use crate::session::SessionStats;
use emg_processing::{FilteredSample, PipelineHealth};
use std::fmt::Write as _;
use std::time::Duration;
use tokio::sync::watch;

/// Fastest refresh the monitor will run at
const MIN_REFRESH_PERIOD: Duration = Duration::from_millis(1);

/// Tick period for `refresh_hz`, never shorter than [`MIN_REFRESH_PERIOD`]
pub fn refresh_period(refresh_hz: f64) -> Duration {
    Duration::try_from_secs_f64(1.0 / refresh_hz)
        .unwrap_or(MIN_REFRESH_PERIOD)
        .max(MIN_REFRESH_PERIOD)
}

/// Render one monitor line
pub fn render_line(labels: &[String], samples: &[FilteredSample], stats: &SessionStats) -> String {
    let mut line = match samples.first() {
        Some(sample) => format!("t={:8.3}s", sample.timestamp),
        None => "t=     --- ".to_string(),
    };

    for (channel, label) in labels.iter().enumerate() {
        match samples.iter().find(|s| s.channel == channel) {
            Some(sample) => {
                let _ = write!(line, " | {} {:7.1}", label, sample.value);
            }
            None => {
                let _ = write!(line, " | {} {:>7}", label, "-");
            }
        }
    }

    match stats.last_command {
        Some(command) => {
            let _ = write!(line, " | last {} @ {:.3}s", command.symbol, command.timestamp);
        }
        None => line.push_str(" | last -"),
    }

    let _ = write!(
        line,
        " | sent {} dropped {}",
        stats.dispatch.sent,
        stats.pipeline.frames_dropped.total()
    );

    if let PipelineHealth::ChannelCountMismatch { expected, observed } = stats.health {
        let _ = write!(line, " | CHANNEL MISMATCH {}/{}", observed, expected);
    }

    line
}

/// Print monitor lines at `refresh_hz` until the session stops publishing
pub async fn run_monitor(
    labels: Vec<String>,
    mut samples: watch::Receiver<Vec<FilteredSample>>,
    stats: watch::Receiver<SessionStats>,
    refresh_hz: f64,
) {
    let mut ticker = tokio::time::interval(refresh_period(refresh_hz));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match samples.has_changed() {
            Ok(true) => {
                let latest = samples.borrow_and_update().clone();
                let counters = stats.borrow().clone();
                println!("{}", render_line(&labels, &latest, &counters));
            }
            Ok(false) => {}
            // Sender dropped: the session is over
            Err(_) => break,
        }
    }
}
