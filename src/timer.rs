//! Step timers
//!
//! A [`Timer`] tracks two durations in seconds: time since the current step
//! began and a stopwatch that restarts on every gate pulse. It does not
//! know where time comes from; a [`TickSource`] turns one host tick into a
//! delta, either by counting samples or by sampling a monotonic clock.

use crate::config::TimingMode;
use std::time::Instant;

/// Elapsed-since-begin plus a restartable stopwatch
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timer {
    elapsed: f64,
    stopwatch: f64,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero both durations
    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.stopwatch = 0.0;
    }

    /// Start a new step; a fresh step also starts a fresh gate window
    pub fn begin(&mut self) {
        self.elapsed = 0.0;
        self.stopwatch = 0.0;
    }

    /// Zero only the stopwatch
    pub fn restart_stopwatch(&mut self) {
        self.stopwatch = 0.0;
    }

    /// Advance both durations by `dt` seconds
    #[inline]
    pub fn step(&mut self, dt: f64) {
        if dt > 0.0 {
            self.elapsed += dt;
            self.stopwatch += dt;
        }
    }

    /// Seconds since the last `begin` or `reset`
    #[inline]
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Seconds since the last `restart_stopwatch`, `begin` or `reset`
    #[inline]
    pub fn stopwatch(&self) -> f64 {
        self.stopwatch
    }
}

/// Produces the time delta for each host tick
#[derive(Debug, Clone)]
pub enum TickSource {
    SampleAccurate { dt: f64 },
    WallClock { last: Option<Instant> },
}

impl TickSource {
    pub fn new(mode: TimingMode, sample_rate: f64) -> Self {
        match mode {
            TimingMode::SampleAccurate => TickSource::SampleAccurate {
                dt: sample_period(sample_rate),
            },
            TimingMode::WallClock => TickSource::WallClock { last: None },
        }
    }

    pub fn mode(&self) -> TimingMode {
        match self {
            TickSource::SampleAccurate { .. } => TimingMode::SampleAccurate,
            TickSource::WallClock { .. } => TimingMode::WallClock,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if let TickSource::SampleAccurate { dt } = self {
            *dt = sample_period(sample_rate);
        }
    }

    /// Seconds covered by this tick. The first wall-clock tick is zero.
    #[inline]
    pub fn next_dt(&mut self) -> f64 {
        match self {
            TickSource::SampleAccurate { dt } => *dt,
            TickSource::WallClock { last } => {
                let now = Instant::now();
                let dt = last.map_or(0.0, |prev| now.duration_since(prev).as_secs_f64());
                *last = Some(now);
                dt
            }
        }
    }

    /// Forget the previous wall-clock sample
    pub fn reset(&mut self) {
        if let TickSource::WallClock { last } = self {
            *last = None;
        }
    }
}

fn sample_period(sample_rate: f64) -> f64 {
    if sample_rate > 0.0 {
        1.0 / sample_rate
    } else {
        0.0
    }
}
