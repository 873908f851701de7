//! PwmClock: master clock with divided, dotted and triplet outputs
//!
//! A whole note lasts `240 / bpm` seconds. Outputs come in groups of three
//! (straight, dotted, triplet) for each division from 1/1 down to 1/64.
//! Every output owns its own timer and stays high for the PWM fraction of
//! its period.

use crate::config::EngineConfig;
use crate::params::{ParamDef, ParamId, ParamStore};
use crate::port::{GraphModule, PortDef, PortSpec, PortValues, SignalKind, GATE_HIGH, GATE_LOW};
use crate::timer::{TickSource, Timer};
use crate::trigger::EdgeDetector;

/// Number of clock outputs
pub const OUT_SOCKETS: usize = 21;

const DIVISIONS: usize = OUT_SOCKETS / 3;
const MIN_BPM: f64 = 20.0;
const MAX_BPM: f64 = 220.0;

// Parameters
pub const BPM_INC: ParamId = 0;
pub const BPM_DEC: ParamId = 1;
pub const PWM: ParamId = 2;
pub const BPM: ParamId = 3;
pub const BPM_DECIMAL: ParamId = 4;

// Outputs
pub const OUT_CLOCK: u32 = 10;

/// Output id for division `1 / 2^division`; `variant` 0 is straight,
/// 1 dotted, 2 triplet
#[inline]
pub fn output_id(division: usize, variant: usize) -> u32 {
    OUT_CLOCK + (3 * division + variant) as u32
}

/// Periods in seconds of every output at `bpm`
pub fn durations(bpm: f64) -> [f64; OUT_SOCKETS] {
    let mut d = [0.0; OUT_SOCKETS];
    d[0] = 240.0 / bpm;
    d[1] = d[0] + d[0] / 2.0;
    d[2] = 2.0 * d[0] / 3.0;
    for k in 1..DIVISIONS {
        for v in 0..3 {
            d[3 * k + v] = d[3 * (k - 1) + v] / 2.0;
        }
    }
    d
}

pub struct PwmClock {
    params: ParamStore,
    timers: [Timer; OUT_SOCKETS],
    durations: [f64; OUT_SOCKETS],
    bpm: f64,
    inc_button: EdgeDetector,
    dec_button: EdgeDetector,
    ticks: TickSource,
    spec: PortSpec,
}

impl PwmClock {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_config(&EngineConfig::new(sample_rate))
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        let defs = vec![
            ParamDef::toggle(BPM_INC, "bpm_inc", 0.0),
            ParamDef::toggle(BPM_DEC, "bpm_dec", 0.0),
            ParamDef::continuous(PWM, "pwm", 0.1, 0.9, 0.5),
            ParamDef::stepped(BPM, "bpm", MIN_BPM, MAX_BPM, 120.0),
            ParamDef::stepped(BPM_DECIMAL, "bpm_decimal", 0.0, 9.0, 0.0),
        ];

        let mut outputs = Vec::with_capacity(OUT_SOCKETS);
        for division in 0..DIVISIONS {
            let base = format!("1_{}", 1 << division);
            outputs.push(PortDef::new(output_id(division, 0), base.clone(), SignalKind::Clock));
            outputs.push(PortDef::new(output_id(division, 1), format!("{}_dotted", base), SignalKind::Clock));
            outputs.push(PortDef::new(output_id(division, 2), format!("{}_triplet", base), SignalKind::Clock));
        }

        let mut clock = Self {
            params: ParamStore::new(defs),
            timers: [Timer::new(); OUT_SOCKETS],
            durations: [0.0; OUT_SOCKETS],
            bpm: 0.0,
            inc_button: super::edge_detector(config),
            dec_button: super::edge_detector(config),
            ticks: TickSource::new(config.timing, config.sample_rate),
            spec: PortSpec {
                inputs: Vec::new(),
                outputs,
            },
        };
        clock.update_bpm();
        clock
    }

    /// Tempo including the decimal knob
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Period of output `index` in seconds
    pub fn duration(&self, index: usize) -> Option<f64> {
        self.durations.get(index).copied()
    }

    fn process_buttons(&mut self) {
        let bpm = self.params.value(BPM);
        if self.inc_button.rising(self.params.value(BPM_INC)) && bpm < MAX_BPM {
            self.params.set(BPM, bpm + 1.0);
        }
        let bpm = self.params.value(BPM);
        if self.dec_button.rising(self.params.value(BPM_DEC)) && bpm > 0.0 {
            self.params.set(BPM, bpm - 1.0);
        }
    }

    fn update_bpm(&mut self) {
        let integer = self.params.position(BPM) as f64;
        let decimal = self.params.position(BPM_DECIMAL) as f64;
        let bpm = (decimal + 10.0 * integer) / 10.0;
        if bpm != self.bpm {
            log::debug!("pwm clock at {} bpm", bpm);
            self.bpm = bpm;
            self.durations = durations(bpm);
        }
    }
}

impl Default for PwmClock {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for PwmClock {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, _inputs: &PortValues, outputs: &mut PortValues) {
        let dt = self.ticks.next_dt();
        self.process_buttons();
        self.update_bpm();

        let pwm = self.params.value(PWM);
        for (k, timer) in self.timers.iter_mut().enumerate() {
            let duration = self.durations[k];
            timer.step(dt);
            if timer.elapsed() >= duration {
                timer.reset();
            }
            let level = if timer.elapsed() <= duration * pwm {
                GATE_HIGH
            } else {
                GATE_LOW
            };
            outputs.set(OUT_CLOCK + k as u32, level);
        }
    }

    fn reset(&mut self) {
        self.timers.iter_mut().for_each(Timer::reset);
        self.inc_button.reset();
        self.dec_button.reset();
        self.ticks.reset();
        self.bpm = 0.0;
        self.update_bpm();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.ticks.set_sample_rate(sample_rate);
    }

    fn params(&self) -> &[ParamDef] {
        self.params.defs()
    }

    fn get_param(&self, id: ParamId) -> Option<f64> {
        self.params.get(id)
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        self.params.set(id, value);
    }

    fn type_id(&self) -> &'static str {
        "pwm_clock"
    }
}
