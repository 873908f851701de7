//! Schmitt-trigger edge detection and fixed-width trigger pulses

use serde::{Deserialize, Serialize};

/// Width of a trigger output pulse in seconds
pub const TRIGGER_DURATION: f64 = 0.002;

/// Edge reported by [`EdgeDetector::process`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Rising,
    Falling,
    None,
}

impl Edge {
    #[inline]
    pub fn is_rising(self) -> bool {
        self == Edge::Rising
    }

    #[inline]
    pub fn is_falling(self) -> bool {
        self == Edge::Falling
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Unknown,
    Low,
    High,
}

/// Hysteresis edge detector for clock, reset and button signals
///
/// From the unknown state reaching `high` reports a rising edge, while
/// reaching `low` settles silently on low. After that the detector only
/// moves Low to High and back, reporting each crossing once.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    level: Level,
    low: f64,
    high: f64,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::with_thresholds(0.0, 1.0)
    }

    pub fn with_thresholds(low: f64, high: f64) -> Self {
        Self {
            level: Level::Unknown,
            low,
            high,
        }
    }

    pub fn reset(&mut self) {
        self.level = Level::Unknown;
    }

    /// Latched state: true once a rising edge has been seen and no falling one since
    #[inline]
    pub fn is_high(&self) -> bool {
        self.level == Level::High
    }

    #[inline]
    pub fn process(&mut self, value: f64) -> Edge {
        match self.level {
            Level::Unknown => {
                if value >= self.high {
                    self.level = Level::High;
                    Edge::Rising
                } else {
                    if value <= self.low {
                        self.level = Level::Low;
                    }
                    Edge::None
                }
            }
            Level::Low => {
                if value >= self.high {
                    self.level = Level::High;
                    Edge::Rising
                } else {
                    Edge::None
                }
            }
            Level::High => {
                if value <= self.low {
                    self.level = Level::Low;
                    Edge::Falling
                } else {
                    Edge::None
                }
            }
        }
    }

    /// Shorthand for `process(value).is_rising()`
    #[inline]
    pub fn rising(&mut self, value: f64) -> bool {
        self.process(value).is_rising()
    }
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds an output high for a fixed time after being triggered
#[derive(Debug, Clone, Copy, Default)]
pub struct PulseGenerator {
    remaining: f64,
}

impl PulseGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pulse; an already running longer pulse is kept
    pub fn trigger(&mut self, duration: f64) {
        if duration > self.remaining {
            self.remaining = duration;
        }
    }

    /// Advance by `dt` seconds, returning whether the pulse is high for this tick
    #[inline]
    pub fn process(&mut self, dt: f64) -> bool {
        if self.remaining > 0.0 {
            self.remaining -= dt;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.remaining = 0.0;
    }
}
