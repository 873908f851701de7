//! Step counters
//!
//! [`StepCounter`] drives the 8-stage M581 and the Renato axes: it walks a
//! set of enabled steps under one of five run modes and divides the clock
//! by a per-step pulse count. [`StrideCounter`] drives the Spiralone and
//! Z8K instances: it jumps by a stride around a ring and never skips.

use crate::rng::Rng;
use serde::{Deserialize, Serialize};

/// Largest number of steps a [`StepCounter`] walks
pub const MAX_STEPS: usize = 8;

/// Order in which a [`StepCounter`] visits its steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Forward,
    Backward,
    /// Bounce between the first and last enabled step
    Pendulum,
    /// Forward 50%, backward 25%, stay 25%
    Brownian,
    /// Any step in range, enabled or not
    Random,
}

impl RunMode {
    /// Decode a selector position, clamping out-of-range values
    pub fn from_position(position: i32) -> Self {
        match position {
            i32::MIN..=0 => RunMode::Forward,
            1 => RunMode::Backward,
            2 => RunMode::Pendulum,
            3 => RunMode::Brownian,
            _ => RunMode::Random,
        }
    }
}

#[inline]
fn is_enabled(enabled: &[bool], step: usize) -> bool {
    enabled.get(step).copied().unwrap_or(false)
}

/// Run-mode step counter with per-step clock division
#[derive(Debug, Clone)]
pub struct StepCounter {
    current: usize,
    num_steps: usize,
    mode: RunMode,
    reversed: bool,
    pulse_counter: u32,
    committed: bool,
    max_steps: usize,
}

impl StepCounter {
    pub fn new() -> Self {
        Self::with_max_steps(MAX_STEPS)
    }

    /// Counter over at most `max_steps` steps (at least one)
    pub fn with_max_steps(max_steps: usize) -> Self {
        let max_steps = max_steps.max(1);
        Self {
            current: 0,
            num_steps: max_steps,
            mode: RunMode::Forward,
            reversed: false,
            pulse_counter: 0,
            committed: false,
            max_steps,
        }
    }

    /// Update run mode and length. The length is clamped to `[1, max_steps]`
    /// and the current step wrapped back into it.
    pub fn set(&mut self, mode: RunMode, num_steps: usize) {
        self.mode = mode;
        self.num_steps = num_steps.clamp(1, self.max_steps);
        if self.current >= self.num_steps {
            self.current %= self.num_steps;
        }
    }

    /// Return to the first enabled step (or 0) and forget pulse progress
    pub fn reset(&mut self, enabled: &[bool]) {
        self.pulse_counter = 0;
        self.reversed = false;
        self.committed = false;
        self.current = self.first_enabled(enabled);
    }

    fn first_enabled(&self, enabled: &[bool]) -> usize {
        (0..self.num_steps)
            .find(|&k| is_enabled(enabled, k))
            .unwrap_or(0)
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    #[inline]
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Clocks counted towards the current step's threshold
    #[inline]
    pub fn pulse_counter(&self) -> u32 {
        self.pulse_counter
    }

    /// Whether any step in range is enabled
    pub fn any_enabled(&self, enabled: &[bool]) -> bool {
        (0..self.num_steps).any(|k| is_enabled(enabled, k))
    }

    /// Count one clock against `threshold`. Returns true when a step is
    /// committed: the first clock after a reset commits the initial step,
    /// afterwards a new step is committed once the count exceeds the
    /// threshold. The initial step moves to the first enabled one if it
    /// was disabled since the reset.
    pub fn play(&mut self, threshold: u32, enabled: &[bool], rng: &mut Rng) -> bool {
        if !self.committed {
            self.committed = true;
            self.pulse_counter = 0;
            if !is_enabled(enabled, self.current) {
                self.current = self.first_enabled(enabled);
            }
            return true;
        }
        self.pulse_counter += 1;
        if self.pulse_counter > threshold {
            self.pulse_counter = 0;
            self.current = self.advance(self.current, enabled, rng);
            true
        } else {
            false
        }
    }

    /// Step to the next index after `current` under the run mode. Callers
    /// should check [`StepCounter::any_enabled`] first; with nothing
    /// enabled the scans come back to `current`.
    pub fn advance(&mut self, current: usize, enabled: &[bool], rng: &mut Rng) -> usize {
        let current = current % self.num_steps;
        match self.mode {
            RunMode::Forward => self.scan_forward(current, enabled),
            RunMode::Backward => self.scan_backward(current, enabled),
            RunMode::Pendulum => {
                if self.reversed {
                    let step = self.scan_backward(current, enabled);
                    if step <= current {
                        return step;
                    }
                    self.reversed = false;
                    self.scan_forward(current, enabled)
                } else {
                    let step = self.scan_forward(current, enabled);
                    if step >= current {
                        return step;
                    }
                    self.reversed = true;
                    self.scan_backward(current, enabled)
                }
            }
            RunMode::Brownian => {
                if rng.coin() {
                    self.scan_forward(current, enabled)
                } else if rng.coin() {
                    self.scan_backward(current, enabled)
                } else {
                    current
                }
            }
            RunMode::Random => rng.below(self.num_steps),
        }
    }

    fn scan_forward(&self, from: usize, enabled: &[bool]) -> usize {
        let n = self.num_steps;
        let mut step = from;
        for _ in 0..n {
            step = (step + 1) % n;
            if is_enabled(enabled, step) {
                break;
            }
        }
        step
    }

    fn scan_backward(&self, from: usize, enabled: &[bool]) -> usize {
        let n = self.num_steps;
        let mut step = from;
        for _ in 0..n {
            step = (step + n - 1) % n;
            if is_enabled(enabled, step) {
                break;
            }
        }
        step
    }
}

impl Default for StepCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Direction policy for a [`StrideCounter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrideMode {
    Forward,
    Backward,
    /// Turn around instead of jumping off either end of the ring
    Alternate,
}

/// Position on a ring of steps, moved by a stride
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrideCounter {
    position: i32,
    reversed: bool,
}

impl StrideCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.position = 0;
        self.reversed = false;
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position.max(0) as usize
    }

    /// Jump by `stride` and wrap into `[0, num_steps)`. A ring of no
    /// steps parks the counter at 0.
    pub fn advance(&mut self, mode: StrideMode, stride: i32, num_steps: i32) -> usize {
        if num_steps <= 0 {
            self.position = 0;
            return 0;
        }
        match mode {
            StrideMode::Forward => self.position += stride,
            StrideMode::Backward => self.position -= stride,
            StrideMode::Alternate => {
                if self.reversed {
                    if self.position - stride < 0 {
                        self.reversed = false;
                        self.position += stride;
                    } else {
                        self.position -= stride;
                    }
                } else if self.position + stride >= num_steps {
                    self.reversed = true;
                    self.position -= stride;
                } else {
                    self.position += stride;
                }
            }
        }
        if self.position < 0 {
            self.position += num_steps;
        }
        self.position = self.position.rem_euclid(num_steps);
        self.position as usize
    }
}
