//! Session time sources
//!
//! Every timestamp in the pipeline is `f64` seconds since the session
//! started. Detection only ever compares differences of these values, so the
//! clock only has to be monotonic.

use std::time::Instant;

/// Source of "now" for the processing role
pub trait SessionClock: Send {
    /// Seconds elapsed since the session started. Never decreases.
    fn now(&mut self) -> f64;
}

/// Wall-clock time from a monotonic [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    started: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl SessionClock for MonotonicClock {
    #[inline]
    fn now(&mut self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// Deterministic clock advancing a fixed step per reading
///
/// The first call returns `start`; each later call adds `step`. Used when
/// frames come from a simulator or a script instead of a live board.
#[derive(Debug, Clone, Copy)]
pub struct SteppedClock {
    next: f64,
    step: f64,
}

impl SteppedClock {
    pub fn new(start: f64, step: f64) -> Self {
        Self { next: start, step }
    }

    /// Clock ticking once per sample at `sampling_rate` Hz
    pub fn per_sample(sampling_rate: f64) -> Self {
        Self::new(0.0, 1.0 / sampling_rate)
    }
}

impl SessionClock for SteppedClock {
    fn now(&mut self) -> f64 {
        let now = self.next;
        self.next += self.step;
        now
    }
}
