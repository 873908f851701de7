//! M581: 8-stage step sequencer
//!
//! Every stage has a note slider, an enable/slide switch, a gate mode and a
//! pulse count: the number of extra clocks the stage is held for. The
//! counter walks enabled stages in one of five run modes.

use crate::config::EngineConfig;
use crate::counter::{RunMode, StepCounter, MAX_STEPS};
use crate::cv_line::CvLine;
use crate::gate_line::{GateLine, GateMode};
use crate::params::{ParamDef, ParamId, ParamStore};
use crate::port::{GraphModule, PortDef, PortSpec, PortValues, SignalKind, LIGHT_ON};
use crate::rng::Rng;
use crate::timer::{TickSource, Timer};
use crate::trigger::EdgeDetector;

const STAGES: u32 = MAX_STEPS as u32;

// Parameters
pub const GATE_SWITCH: ParamId = 0;
pub const COUNTER_SWITCH: ParamId = GATE_SWITCH + STAGES;
pub const STEP_NOTE: ParamId = COUNTER_SWITCH + STAGES;
pub const STEP_ENABLE: ParamId = STEP_NOTE + STAGES;
pub const GATE_TIME: ParamId = STEP_ENABLE + STAGES;
pub const SLIDE_TIME: ParamId = GATE_TIME + 1;
pub const NUM_STEPS: ParamId = SLIDE_TIME + 1;
pub const RUN_MODE: ParamId = NUM_STEPS + 1;
pub const STEP_DIV: ParamId = RUN_MODE + 1;
pub const MAX_VOLTS: ParamId = STEP_DIV + 1;

// Inputs
pub const IN_CLOCK: u32 = 0;
pub const IN_RESET: u32 = 1;

// Outputs
pub const OUT_CV: u32 = 10;
pub const OUT_GATE: u32 = 11;

// Lights
pub const LIGHT_STEP: u32 = 0;
pub const LIGHT_SUBDIV: u32 = LIGHT_STEP + STAGES;
const NUM_LIGHTS: usize = 2 * MAX_STEPS;

fn param_defs() -> Vec<ParamDef> {
    let mut defs = Vec::new();
    for k in 0..STAGES {
        defs.push(ParamDef::stepped(GATE_SWITCH + k, format!("gate_mode_{}", k + 1), 0.0, 3.0, 2.0));
    }
    for k in 0..STAGES {
        defs.push(ParamDef::stepped(COUNTER_SWITCH + k, format!("pulses_{}", k + 1), 0.0, 7.0, 0.0));
    }
    for k in 0..STAGES {
        defs.push(ParamDef::continuous(STEP_NOTE + k, format!("note_{}", k + 1), 0.001, 1.0, 0.5));
    }
    for k in 0..STAGES {
        defs.push(ParamDef::stepped(STEP_ENABLE + k, format!("enable_{}", k + 1), 0.0, 2.0, 1.0));
    }
    defs.push(ParamDef::continuous(GATE_TIME, "gate_time", 0.005, 1.0, 0.25));
    defs.push(ParamDef::continuous(SLIDE_TIME, "slide_time", 0.005, 2.0, 0.5));
    defs.push(ParamDef::stepped(NUM_STEPS, "num_steps", 1.0, MAX_STEPS as f64, 8.0));
    defs.push(ParamDef::stepped(RUN_MODE, "run_mode", 0.0, 4.0, 0.0));
    defs.push(ParamDef::stepped(STEP_DIV, "step_div", 0.0, 3.0, 0.0));
    defs.push(ParamDef::toggle(MAX_VOLTS, "max_volts_5v", 1.0));
    defs
}

/// Eight-stage sequencer with run modes, pulse counts and slide
pub struct M581 {
    params: ParamStore,
    counter: StepCounter,
    cv_line: CvLine,
    gate_line: GateLine,
    timer: Timer,
    gate: f64,
    clock_trigger: EdgeDetector,
    reset_trigger: EdgeDetector,
    ticks: TickSource,
    rng: Rng,
    lights: Vec<f64>,
    spec: PortSpec,
}

impl M581 {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_config(&EngineConfig::new(sample_rate))
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        let mut m581 = Self {
            params: ParamStore::new(param_defs()),
            counter: StepCounter::new(),
            cv_line: CvLine::new(),
            gate_line: GateLine::new(),
            timer: Timer::new(),
            gate: 0.0,
            clock_trigger: super::edge_detector(config),
            reset_trigger: super::edge_detector(config),
            ticks: TickSource::new(config.timing, config.sample_rate),
            rng: Rng::from_optional_seed(config.seed),
            lights: vec![0.0; NUM_LIGHTS],
            spec: PortSpec {
                inputs: vec![
                    PortDef::new(IN_CLOCK, "clock", SignalKind::Clock),
                    PortDef::new(IN_RESET, "reset", SignalKind::Trigger),
                ],
                outputs: vec![
                    PortDef::new(OUT_CV, "cv", SignalKind::VoltPerOctave),
                    PortDef::new(OUT_GATE, "gate", SignalKind::Gate),
                ],
            },
        };
        m581.restart();
        m581
    }

    /// Stage currently playing
    pub fn current_step(&self) -> usize {
        self.counter.current()
    }

    pub fn randomize_pitch(&mut self) {
        self.params.randomize_range(STEP_NOTE, STAGES, &mut self.rng);
    }

    pub fn randomize_counter(&mut self) {
        self.params.randomize_range(COUNTER_SWITCH, STAGES, &mut self.rng);
    }

    pub fn randomize_mode(&mut self) {
        self.params.randomize_range(GATE_SWITCH, STAGES, &mut self.rng);
    }

    pub fn randomize_enable(&mut self) {
        self.params.randomize_range(STEP_ENABLE, STAGES, &mut self.rng);
    }

    fn enabled(&self) -> [bool; MAX_STEPS] {
        let mut enabled = [false; MAX_STEPS];
        for (k, e) in enabled.iter_mut().enumerate() {
            *e = self.params.value(STEP_ENABLE + k as u32) > 0.0;
        }
        enabled
    }

    fn is_slide(&self, step: usize) -> bool {
        self.params.value(STEP_ENABLE + step as u32) > 1.0
    }

    fn gate_mode(&self, step: usize) -> GateMode {
        GateMode::from_position(self.params.position(GATE_SWITCH + step as u32))
    }

    fn pulse_count(&self, step: usize) -> u32 {
        self.params.position(COUNTER_SWITCH + step as u32).max(0) as u32
    }

    fn note(&self, step: usize) -> f64 {
        let scale = if self.params.value(MAX_VOLTS) > 0.0 { 5.0 } else { 3.0 };
        self.params.value(STEP_NOTE + step as u32) * scale
    }

    fn configure_counter(&mut self) {
        let mode = RunMode::from_position(self.params.position(RUN_MODE));
        let num_steps = self.params.position(NUM_STEPS).max(1) as usize;
        self.counter.set(mode, num_steps);
    }

    /// Re-initialise lines and counter; edge detectors keep their state
    fn restart(&mut self) {
        self.configure_counter();
        let enabled = self.enabled();
        self.counter.reset(&enabled);
        self.cv_line.reset();
        self.gate_line.reset();
        self.timer.reset();
        self.gate = self.gate_line.level();
        self.show_step();
    }

    fn pulse(&mut self, enabled: &[bool; MAX_STEPS]) {
        self.configure_counter();
        let threshold = self.pulse_count(self.counter.current());
        let new_step = self.counter.play(threshold, enabled, &mut self.rng);
        let step = self.counter.current();
        let mode = self.gate_mode(step);

        if new_step {
            self.timer.begin();
            let division = self.params.position(STEP_DIV).max(0) as u32 + 1;
            self.gate_line.set(self.params.value(GATE_TIME), division);
            self.cv_line.set(
                self.note(step),
                self.params.value(SLIDE_TIME),
                self.is_slide(step),
            );
        }
        if new_step || mode == GateMode::Multi {
            if mode == GateMode::Multi && self.gate_line.rearms_next() {
                self.timer.restart_stopwatch();
            }
            self.gate = self.gate_line.play(true, mode, 0.0);
        }
        self.show_step();
    }

    fn show_step(&mut self) {
        let step = self.counter.current();
        let sub = self.counter.pulse_counter() as usize;
        for k in 0..MAX_STEPS {
            self.lights[LIGHT_STEP as usize + k] = if k == step { LIGHT_ON } else { 0.0 };
            self.lights[LIGHT_SUBDIV as usize + k] = if k == sub { LIGHT_ON } else { 0.0 };
        }
    }
}

impl Default for M581 {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for M581 {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let dt = self.ticks.next_dt();

        if self.reset_trigger.rising(inputs.get_or(IN_RESET, 0.0)) {
            self.restart();
        } else {
            self.timer.step(dt);
            let enabled = self.enabled();
            let clock = self.clock_trigger.process(inputs.get_or(IN_CLOCK, 0.0));
            if clock.is_rising() && enabled.iter().any(|&e| e) {
                self.pulse(&enabled);
            } else {
                let mode = self.gate_mode(self.counter.current());
                self.gate = self.gate_line.play(false, mode, self.timer.stopwatch());
            }
        }

        let step = self.counter.current();
        let cv = self.cv_line.play(self.timer.elapsed(), self.note(step));
        outputs.set(OUT_CV, cv);
        outputs.set(OUT_GATE, self.gate);
    }

    fn reset(&mut self) {
        self.clock_trigger.reset();
        self.reset_trigger.reset();
        self.ticks.reset();
        self.restart();
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

    fn lights(&self) -> &[f64] {
        &self.lights
    }

    fn type_id(&self) -> &'static str {
        "m581"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{GATE_HIGH, GATE_LOW};
    use approx::assert_relative_eq;

    const SR: f64 = 1000.0;

    fn m581() -> M581 {
        let mut m = M581::with_config(&EngineConfig::new(SR).with_seed(5));
        for k in 0..STAGES {
            m.set_param(GATE_SWITCH + k, 1.0);
        }
        m.on_loaded();
        m
    }

    fn tick(m: &mut M581, clock: f64, reset: f64) -> (f64, f64) {
        let mut inputs = PortValues::new();
        inputs.set(IN_CLOCK, clock);
        inputs.set(IN_RESET, reset);
        let mut outputs = PortValues::new();
        m.tick(&inputs, &mut outputs);
        (outputs.get_or(OUT_CV, f64::NAN), outputs.get_or(OUT_GATE, f64::NAN))
    }

    /// One clock pulse: a high tick followed by `low_ticks` low ticks
    fn clock_pulse(m: &mut M581, low_ticks: usize) -> (f64, f64) {
        let first = tick(m, 10.0, 0.0);
        for _ in 0..low_ticks {
            tick(m, 0.0, 0.0);
        }
        first
    }

    #[test]
    fn test_first_clock_plays_first_stage() {
        let mut m = m581();
        m.set_param(STEP_NOTE, 0.4);
        tick(&mut m, 0.0, 0.0);
        let (cv, gate) = tick(&mut m, 10.0, 0.0);
        assert_eq!(m.current_step(), 0);
        assert_relative_eq!(cv, 2.0);
        assert_eq!(gate, GATE_HIGH);
        assert_eq!(m.light(LIGHT_STEP), Some(LIGHT_ON));
    }

    #[test]
    fn test_single_gate_decays_after_gate_time() {
        let mut m = m581();
        m.set_param(GATE_TIME, 0.1);
        tick(&mut m, 0.0, 0.0);
        tick(&mut m, 10.0, 0.0);
        // 50 ms in: still high
        for _ in 0..50 {
            tick(&mut m, 0.0, 0.0);
        }
        assert_eq!(tick(&mut m, 0.0, 0.0).1, GATE_HIGH);
        for _ in 0..60 {
            tick(&mut m, 0.0, 0.0);
        }
        assert_eq!(tick(&mut m, 0.0, 0.0).1, GATE_LOW);
    }

    #[test]
    fn test_forward_skips_disabled_stages() {
        let mut m = m581();
        for k in 0..STAGES {
            m.set_param(STEP_ENABLE + k, 0.0);
        }
        for k in [0, 2, 5] {
            m.set_param(STEP_ENABLE + k, 1.0);
        }
        tick(&mut m, 0.0, 0.0);
        let mut seen = Vec::new();
        for _ in 0..4 {
            clock_pulse(&mut m, 3);
            seen.push(m.current_step());
        }
        assert_eq!(seen, vec![0, 2, 5, 0]);
    }

    #[test]
    fn test_pulse_count_holds_stage() {
        let mut m = m581();
        m.set_param(COUNTER_SWITCH, 2.0);
        tick(&mut m, 0.0, 0.0);
        let mut seen = Vec::new();
        for _ in 0..5 {
            clock_pulse(&mut m, 3);
            seen.push(m.current_step());
        }
        assert_eq!(seen, vec![0, 0, 0, 1, 2]);
        assert_eq!(m.light(LIGHT_SUBDIV), Some(LIGHT_ON));
    }

    #[test]
    fn test_reset_returns_to_first_enabled() {
        let mut m = m581();
        m.set_param(STEP_ENABLE, 0.0);
        m.on_loaded();
        tick(&mut m, 0.0, 0.0);
        for _ in 0..3 {
            clock_pulse(&mut m, 2);
        }
        assert_eq!(m.current_step(), 3);
        tick(&mut m, 0.0, 10.0);
        assert_eq!(m.current_step(), 1);
        tick(&mut m, 0.0, 0.0);
        clock_pulse(&mut m, 2);
        assert_eq!(m.current_step(), 1);
    }

    #[test]
    fn test_first_clock_skips_stage_disabled_after_load() {
        let mut m = m581();
        m.set_param(STEP_NOTE + 1, 0.4);
        m.set_param(STEP_ENABLE, 0.0);
        tick(&mut m, 0.0, 0.0);
        let (cv, gate) = tick(&mut m, 10.0, 0.0);
        assert_eq!(m.current_step(), 1);
        assert_relative_eq!(cv, 2.0, epsilon = 1e-9);
        assert_eq!(gate, GATE_HIGH);
    }

    #[test]
    fn test_first_clock_finds_stage_enabled_after_load() {
        let mut m = m581();
        for k in 0..STAGES {
            m.set_param(STEP_ENABLE + k, 0.0);
        }
        m.on_loaded();
        m.set_param(STEP_ENABLE + 2, 1.0);
        tick(&mut m, 0.0, 0.0);
        let (_, gate) = tick(&mut m, 10.0, 0.0);
        assert_eq!(m.current_step(), 2);
        assert_eq!(gate, GATE_HIGH);
    }

    #[test]
    fn test_no_enabled_stage_is_noop() {
        let mut m = m581();
        for k in 0..STAGES {
            m.set_param(STEP_ENABLE + k, 0.0);
        }
        tick(&mut m, 0.0, 0.0);
        for _ in 0..4 {
            let (_, gate) = clock_pulse(&mut m, 2);
            assert_eq!(gate, GATE_LOW);
        }
        assert_eq!(m.current_step(), 0);
    }

    #[test]
    fn test_slide_glides_to_next_note() {
        let mut m = m581();
        m.set_param(STEP_NOTE, 0.0);
        m.set_param(STEP_NOTE + 1, 1.0);
        m.set_param(STEP_ENABLE + 1, 2.0);
        m.set_param(SLIDE_TIME, 0.1);
        tick(&mut m, 0.0, 0.0);
        clock_pulse(&mut m, 10);
        let (start, _) = tick(&mut m, 10.0, 0.0);
        assert_eq!(m.current_step(), 1);
        assert!(start < 0.1);
        for _ in 0..49 {
            tick(&mut m, 0.0, 0.0);
        }
        let (mid, _) = tick(&mut m, 0.0, 0.0);
        assert!(mid > 1.0 && mid < 4.0, "mid {}", mid);
        for _ in 0..100 {
            tick(&mut m, 0.0, 0.0);
        }
        let (end, _) = tick(&mut m, 0.0, 0.0);
        assert_relative_eq!(end, 5.0);
    }

    #[test]
    fn test_max_volts_switch() {
        let mut m = m581();
        m.set_param(STEP_NOTE, 1.0);
        m.set_param(MAX_VOLTS, 0.0);
        tick(&mut m, 0.0, 0.0);
        let (cv, _) = tick(&mut m, 10.0, 0.0);
        assert_relative_eq!(cv, 3.0);
    }

    #[test]
    fn test_multi_gate_pulses_on_each_division() {
        let mut m = m581();
        m.set_param(GATE_SWITCH, 2.0);
        m.set_param(COUNTER_SWITCH, 3.0);
        m.set_param(STEP_DIV, 1.0);
        m.set_param(GATE_TIME, 0.005);
        tick(&mut m, 0.0, 0.0);
        let mut gates = Vec::new();
        for _ in 0..4 {
            gates.push(clock_pulse(&mut m, 20).1);
        }
        assert_eq!(gates, vec![GATE_HIGH, GATE_LOW, GATE_HIGH, GATE_LOW]);
        assert_eq!(m.current_step(), 0);
    }

    #[test]
    fn test_off_stage_silences_gate() {
        let mut m = m581();
        m.set_param(GATE_SWITCH + 1, 0.0);
        m.set_param(GATE_SWITCH, 3.0);
        tick(&mut m, 0.0, 0.0);
        assert_eq!(clock_pulse(&mut m, 5).1, GATE_HIGH);
        assert_eq!(tick(&mut m, 0.0, 0.0).1, GATE_HIGH);
        assert_eq!(clock_pulse(&mut m, 0).1, GATE_LOW);
    }

    #[test]
    fn test_group_randomize_stays_in_range() {
        let mut m = m581();
        m.randomize_counter();
        m.randomize_enable();
        m.randomize_mode();
        m.randomize_pitch();
        for k in 0..STAGES {
            let c = m.get_param(COUNTER_SWITCH + k).unwrap();
            assert!((0.0..=7.0).contains(&c) && c == c.round());
            let n = m.get_param(STEP_NOTE + k).unwrap();
            assert!((0.001..=1.0).contains(&n));
        }
    }
}
