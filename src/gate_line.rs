//! Per-step gate shaping

use crate::port::{GATE_HIGH, GATE_LOW};
use serde::{Deserialize, Serialize};

/// What a step does with its gate output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// Silent step
    Off,
    /// One pulse of the gate time
    Single,
    /// A pulse on every `step_division`-th clock within the step
    Multi,
    /// High for the whole step
    Continuous,
}

impl GateMode {
    /// Decode a selector position, clamping out-of-range values
    pub fn from_position(position: i32) -> Self {
        match position {
            i32::MIN..=0 => GateMode::Off,
            1 => GateMode::Single,
            2 => GateMode::Multi,
            _ => GateMode::Continuous,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GateLine {
    gate_time: f64,
    step_division: u32,
    sub_counter: u32,
    level: f64,
}

impl GateLine {
    pub fn new() -> Self {
        Self {
            gate_time: 0.0,
            step_division: 1,
            sub_counter: 0,
            level: GATE_LOW,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Configure a new step; `step_division` below 1 counts as 1
    pub fn set(&mut self, gate_time: f64, step_division: u32) {
        self.gate_time = gate_time;
        self.step_division = step_division.max(1);
        self.sub_counter = 0;
    }

    /// Gate level for this tick. `elapsed` is the time since the last
    /// pulse started.
    pub fn play(&mut self, triggered: bool, mode: GateMode, elapsed: f64) -> f64 {
        match mode {
            GateMode::Off => {
                if triggered {
                    self.level = GATE_LOW;
                }
            }
            GateMode::Single => {
                if triggered {
                    self.level = GATE_HIGH;
                } else {
                    self.decay(elapsed);
                }
            }
            GateMode::Multi => {
                if triggered {
                    if self.sub_counter % self.step_division == 0 {
                        self.level = GATE_HIGH;
                    }
                    self.sub_counter = self.sub_counter.wrapping_add(1);
                } else {
                    self.decay(elapsed);
                }
            }
            GateMode::Continuous => {
                if triggered {
                    self.level = GATE_HIGH;
                }
            }
        }
        self.level
    }

    /// Whether the next triggered multi-pulse call re-arms the gate
    pub fn rearms_next(&self) -> bool {
        self.sub_counter % self.step_division == 0
    }

    #[inline]
    pub fn level(&self) -> f64 {
        self.level
    }

    fn decay(&mut self, elapsed: f64) {
        if elapsed > self.gate_time {
            self.level = GATE_LOW;
        }
    }
}

impl Default for GateLine {
    fn default() -> Self {
        Self::new()
    }
}
