//! Spiralone: five strided sequencers around a ring of 32 voltages
//!
//! The sequencers share the voltage ring but each has its own length,
//! stride, direction and transpose, so they trace different spirals
//! through the same material.

use crate::config::EngineConfig;
use crate::counter::{StrideCounter, StrideMode};
use crate::params::{ParamDef, ParamId, ParamStore};
use crate::port::{GraphModule, PortDef, PortSpec, PortValues, SignalKind, GATE_HIGH, GATE_LOW, LIGHT_ON};
use crate::rng::Rng;
use crate::timer::TickSource;
use crate::trigger::EdgeDetector;
use libm::Libm;

/// Voltages in the ring
pub const TOTAL_STEPS: usize = 32;

/// Number of sequencers
pub const NUM_SEQUENCERS: usize = 5;

const SEQS: u32 = NUM_SEQUENCERS as u32;
const MAX_STRIDE: f64 = 8.0;

/// Reset input level above which a sequencer is held at the start
const RESET_LEVEL: f64 = GATE_HIGH / 2.0;

/// Full-scale voltage of the length and stride inputs
const CV_FULL_SCALE: f64 = 5.0;

// Parameters
pub const VOLTAGE: ParamId = 0;
pub const MODE: ParamId = VOLTAGE + TOTAL_STEPS as u32;
pub const LENGTH: ParamId = MODE + SEQS;
pub const STRIDE: ParamId = LENGTH + SEQS;
pub const XPOSE: ParamId = STRIDE + SEQS;

// Inputs
pub const IN_RESET: u32 = 0;
pub const IN_LENGTH: u32 = IN_RESET + SEQS;
pub const IN_STRIDE: u32 = IN_LENGTH + SEQS;
pub const IN_XPOSE: u32 = IN_STRIDE + SEQS;
pub const IN_CLOCK: u32 = IN_XPOSE + SEQS;

// Outputs
pub const OUT_CV: u32 = 30;
pub const OUT_GATE: u32 = OUT_CV + SEQS;

/// Light for `step` of sequencer `seq`
#[inline]
pub fn light_id(seq: usize, step: usize) -> u32 {
    (seq * TOTAL_STEPS + step) as u32
}

fn param_defs() -> Vec<ParamDef> {
    let mut defs = Vec::new();
    for k in 0..TOTAL_STEPS as u32 {
        defs.push(ParamDef::continuous(VOLTAGE + k, format!("voltage_{}", k + 1), 0.0, 6.0, 1.0));
    }
    for k in 0..SEQS {
        defs.push(ParamDef::stepped(MODE + k, format!("mode_{}", k + 1), 0.0, 3.0, 0.0));
    }
    for k in 0..SEQS {
        defs.push(ParamDef::stepped(LENGTH + k, format!("length_{}", k + 1), 1.0, TOTAL_STEPS as f64, TOTAL_STEPS as f64));
    }
    for k in 0..SEQS {
        defs.push(ParamDef::stepped(STRIDE + k, format!("stride_{}", k + 1), 1.0, MAX_STRIDE, 1.0));
    }
    for k in 0..SEQS {
        defs.push(ParamDef::continuous(XPOSE + k, format!("xpose_{}", k + 1), 0.0, 5.0, 0.0));
    }
    defs
}

/// Knob plus optional 0..5 V control voltage, rescaled to the knob's range
/// and clamped into `[1, max]`
fn modulated(knob: f64, cv: Option<f64>, max: f64) -> i32 {
    let cv = cv.map_or(0.0, |v| v / CV_FULL_SCALE * max);
    Libm::<f64>::round((knob + cv).clamp(1.0, max)) as i32
}

#[derive(Debug, Clone, Default)]
struct RingSequencer {
    counter: StrideCounter,
    clock: EdgeDetector,
    cv: f64,
    gate: f64,
}

pub struct Spiralone {
    params: ParamStore,
    sequencers: Vec<RingSequencer>,
    ticks: TickSource,
    rng: Rng,
    lights: Vec<f64>,
    spec: PortSpec,
}

impl Spiralone {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_config(&EngineConfig::new(sample_rate))
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for (first, name, kind) in [
            (IN_RESET, "reset", SignalKind::Gate),
            (IN_LENGTH, "length", SignalKind::CvUnipolar),
            (IN_STRIDE, "stride", SignalKind::CvUnipolar),
            (IN_XPOSE, "xpose", SignalKind::CvUnipolar),
            (IN_CLOCK, "clock", SignalKind::Clock),
        ] {
            for k in 0..SEQS {
                inputs.push(PortDef::new(first + k, format!("{}_{}", name, k + 1), kind));
            }
        }
        for k in 0..SEQS {
            outputs.push(PortDef::new(OUT_CV + k, format!("cv_{}", k + 1), SignalKind::CvUnipolar));
        }
        for k in 0..SEQS {
            outputs.push(PortDef::new(OUT_GATE + k, format!("gate_{}", k + 1), SignalKind::Gate));
        }

        let sequencer = RingSequencer {
            clock: super::edge_detector(config),
            ..RingSequencer::default()
        };

        Self {
            params: ParamStore::new(param_defs()),
            sequencers: vec![sequencer; NUM_SEQUENCERS],
            ticks: TickSource::new(config.timing, config.sample_rate),
            rng: Rng::from_optional_seed(config.seed),
            lights: vec![0.0; NUM_SEQUENCERS * TOTAL_STEPS],
            spec: PortSpec { inputs, outputs },
        }
    }

    /// Ring position of sequencer `seq`
    pub fn position(&self, seq: usize) -> Option<usize> {
        self.sequencers.get(seq).map(|s| s.counter.position())
    }

    pub fn randomize_pitch(&mut self) {
        self.params.randomize_range(VOLTAGE, TOTAL_STEPS as u32, &mut self.rng);
    }

    fn clear_lights(&mut self, seq: usize) {
        let first = light_id(seq, 0) as usize;
        self.lights[first..first + TOTAL_STEPS]
            .iter_mut()
            .for_each(|l| *l = 0.0);
    }

    fn step(&mut self, seq: usize, inputs: &PortValues) {
        let k = seq as u32;
        if inputs.get_or(IN_RESET + k, 0.0) > RESET_LEVEL {
            self.sequencers[seq].counter.reset();
            self.clear_lights(seq);
            return;
        }
        let mode = match self.params.position(MODE + k) {
            1 => StrideMode::Forward,
            2 => StrideMode::Backward,
            3 => StrideMode::Alternate,
            _ => return,
        };

        let edge = self.sequencers[seq].clock.process(inputs.get_or(IN_CLOCK + k, 0.0));
        if edge.is_rising() {
            let num_steps = modulated(
                self.params.value(LENGTH + k),
                inputs.get(IN_LENGTH + k),
                TOTAL_STEPS as f64,
            );
            let stride = modulated(self.params.value(STRIDE + k), inputs.get(IN_STRIDE + k), MAX_STRIDE);

            let old = self.sequencers[seq].counter.position();
            self.lights[light_id(seq, old) as usize] = 0.0;
            let pos = self.sequencers[seq].counter.advance(mode, stride, num_steps);

            let xpose = self.params.value(XPOSE + k) + inputs.get_or(IN_XPOSE + k, 0.0);
            let cv = (self.params.value(VOLTAGE + pos as u32) + xpose).clamp(0.0, 10.0);
            let sequencer = &mut self.sequencers[seq];
            sequencer.cv = cv;
            sequencer.gate = GATE_HIGH;
            self.lights[light_id(seq, pos) as usize] = LIGHT_ON;
        } else if edge.is_falling() {
            self.sequencers[seq].gate = GATE_LOW;
        }
    }
}

impl Default for Spiralone {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Spiralone {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        self.ticks.next_dt();
        for seq in 0..NUM_SEQUENCERS {
            self.step(seq, inputs);
            let k = seq as u32;
            outputs.set(OUT_CV + k, self.sequencers[seq].cv);
            outputs.set(OUT_GATE + k, self.sequencers[seq].gate);
        }
    }

    fn reset(&mut self) {
        for sequencer in &mut self.sequencers {
            sequencer.counter.reset();
            sequencer.clock.reset();
            sequencer.gate = GATE_LOW;
        }
        self.ticks.reset();
        self.lights.iter_mut().for_each(|l| *l = 0.0);
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
        "spiralone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spiralone() -> Spiralone {
        let mut s = Spiralone::with_config(&EngineConfig::new(1000.0).with_seed(4));
        for k in 0..TOTAL_STEPS as u32 {
            s.set_param(VOLTAGE + k, 0.1 * k as f64);
        }
        s.set_param(MODE, 1.0);
        s
    }

    /// One clock pulse on sequencer 1 with extra patched inputs; returns the
    /// outputs of the rising tick
    fn pulse(s: &mut Spiralone, extra: &[(u32, f64)]) -> PortValues {
        let mut inputs = PortValues::new();
        for &(id, v) in extra {
            inputs.set(id, v);
        }
        inputs.set(IN_CLOCK, 10.0);
        let mut outputs = PortValues::new();
        s.tick(&inputs, &mut outputs);
        inputs.set(IN_CLOCK, 0.0);
        s.tick(&inputs, &mut PortValues::new());
        outputs
    }

    #[test]
    fn test_forward_stride_wraps_over_length() {
        let mut s = spiralone();
        s.set_param(LENGTH, 5.0);
        s.set_param(STRIDE, 3.0);
        s.tick(&PortValues::new(), &mut PortValues::new());
        let seen: Vec<usize> = (0..4)
            .map(|_| {
                pulse(&mut s, &[]);
                s.position(0).unwrap()
            })
            .collect();
        assert_eq!(seen, vec![3, 1, 4, 2]);
    }

    #[test]
    fn test_cv_gate_and_light() {
        let mut s = spiralone();
        s.tick(&PortValues::new(), &mut PortValues::new());
        let out = pulse(&mut s, &[]);
        assert_relative_eq!(out.get(OUT_CV).unwrap(), 0.1, epsilon = 1e-9);
        assert_eq!(out.get(OUT_GATE), Some(GATE_HIGH));
        assert_eq!(s.light(light_id(0, 1)), Some(LIGHT_ON));

        let mut out = PortValues::new();
        s.tick(&PortValues::new(), &mut out);
        assert_eq!(out.get(OUT_GATE), Some(GATE_LOW));

        pulse(&mut s, &[]);
        assert_eq!(s.light(light_id(0, 1)), Some(0.0));
        assert_eq!(s.light(light_id(0, 2)), Some(LIGHT_ON));
    }

    #[test]
    fn test_transpose_knob_and_input_clamped() {
        let mut s = spiralone();
        s.set_param(XPOSE, 2.0);
        s.tick(&PortValues::new(), &mut PortValues::new());
        let out = pulse(&mut s, &[]);
        assert_relative_eq!(out.get(OUT_CV).unwrap(), 2.1, epsilon = 1e-9);
        let out = pulse(&mut s, &[(IN_XPOSE, 9.0)]);
        assert_eq!(out.get(OUT_CV), Some(10.0));
    }

    #[test]
    fn test_stride_input_rescaled_and_added() {
        let mut s = spiralone();
        s.tick(&PortValues::new(), &mut PortValues::new());
        // 2.5 V is half of the 1..8 range: 1 + 4 = 5
        pulse(&mut s, &[(IN_STRIDE, 2.5)]);
        assert_eq!(s.position(0), Some(5));
        // length input swamps the knob and clamps at 32
        pulse(&mut s, &[(IN_LENGTH, 5.0), (IN_STRIDE, 0.0)]);
        assert_eq!(s.position(0), Some(6));
    }

    #[test]
    fn test_length_input_shrinks_ring() {
        let mut s = spiralone();
        s.set_param(LENGTH, 1.0);
        s.tick(&PortValues::new(), &mut PortValues::new());
        // 0.5 V adds 3.2 steps: length 4
        for _ in 0..3 {
            pulse(&mut s, &[(IN_LENGTH, 0.5)]);
        }
        assert_eq!(s.position(0), Some(3));
        pulse(&mut s, &[(IN_LENGTH, 0.5)]);
        assert_eq!(s.position(0), Some(0));
    }

    #[test]
    fn test_backward_and_alternate_modes() {
        let mut s = spiralone();
        s.set_param(MODE, 2.0);
        s.set_param(LENGTH, 4.0);
        s.tick(&PortValues::new(), &mut PortValues::new());
        pulse(&mut s, &[]);
        assert_eq!(s.position(0), Some(3));

        s.reset();
        s.set_param(MODE, 3.0);
        s.tick(&PortValues::new(), &mut PortValues::new());
        let seen: Vec<usize> = (0..6)
            .map(|_| {
                pulse(&mut s, &[]);
                s.position(0).unwrap()
            })
            .collect();
        assert_eq!(seen, vec![1, 2, 3, 2, 1, 0]);
    }

    #[test]
    fn test_reset_level_holds_and_clears_lights() {
        let mut s = spiralone();
        s.tick(&PortValues::new(), &mut PortValues::new());
        pulse(&mut s, &[]);
        pulse(&mut s, &[]);
        assert_eq!(s.position(0), Some(2));
        // held in reset, clocks are ignored
        pulse(&mut s, &[(IN_RESET, 6.0)]);
        assert_eq!(s.position(0), Some(0));
        assert!((0..TOTAL_STEPS).all(|k| s.light(light_id(0, k)) == Some(0.0)));
        // 4 V is below the reset level
        pulse(&mut s, &[(IN_RESET, 4.0)]);
        assert_eq!(s.position(0), Some(1));
    }

    #[test]
    fn test_off_sequencer_ignores_clock() {
        let mut s = spiralone();
        s.set_param(MODE, 0.0);
        s.tick(&PortValues::new(), &mut PortValues::new());
        let out = pulse(&mut s, &[]);
        assert_eq!(s.position(0), Some(0));
        assert_eq!(out.get(OUT_GATE), Some(GATE_LOW));
    }

    #[test]
    fn test_sequencers_are_independent() {
        let mut s = spiralone();
        s.set_param(MODE + 1, 1.0);
        s.set_param(STRIDE + 1, 2.0);
        s.tick(&PortValues::new(), &mut PortValues::new());
        let mut inputs = PortValues::new();
        inputs.set(IN_CLOCK + 1, 10.0);
        s.tick(&inputs, &mut PortValues::new());
        assert_eq!(s.position(0), Some(0));
        assert_eq!(s.position(1), Some(2));
        assert_eq!(s.light(light_id(1, 2)), Some(LIGHT_ON));
    }
}
