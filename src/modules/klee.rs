//! Klee: 16-step shift-register pattern generator
//!
//! A clock rotates the register. Each set cell routes to one of three buses
//! which drive gates and triggers, while the two halves sum their pitch
//! knobs into four CV outputs.

use crate::config::EngineConfig;
use crate::params::{ParamDef, ParamId, ParamStore};
use crate::port::{
    GraphModule, PortDef, PortSpec, PortValues, SignalKind, GATE_HIGH, GATE_LOW, LIGHT_ON,
};
use crate::rng::Rng;
use crate::shift_register::{
    route, BusLogic, Carry, RotateMode, ShiftRegister, BUS_COUNT, HALF_LEN, REGISTER_LEN,
};
use crate::timer::TickSource;
use crate::trigger::{Edge, EdgeDetector, PulseGenerator, TRIGGER_DURATION};

// Parameters
pub const PITCH: ParamId = 0;
pub const BUS_ROUTE: ParamId = PITCH + 16;
pub const LOAD_SWITCH: ParamId = BUS_ROUTE + 16;
pub const LOAD_BUTTON: ParamId = LOAD_SWITCH + 16;
pub const STEP_BUTTON: ParamId = LOAD_BUTTON + 1;
pub const SPLIT_MODE: ParamId = STEP_BUTTON + 1;
pub const RANDOM_PATTERN: ParamId = SPLIT_MODE + 1;
pub const INVERT_B: ParamId = RANDOM_PATTERN + 1;
pub const THRESHOLD: ParamId = INVERT_B + 1;
pub const BUS1_LOAD: ParamId = THRESHOLD + 1;
pub const BUS_MERGE: ParamId = BUS1_LOAD + 1;
pub const RANGE: ParamId = BUS_MERGE + 3;
pub const BUS2_MODE: ParamId = RANGE + 1;
const NUM_PARAMS: u32 = BUS2_MODE + 1;

// Inputs
pub const IN_LOAD: u32 = 0;
pub const IN_CLOCK: u32 = 1;
pub const IN_THRESHOLD: u32 = 2;
pub const IN_RANGE: u32 = 3;

// Outputs
pub const OUT_CV_A: u32 = 10;
pub const OUT_CV_B: u32 = 11;
pub const OUT_CV_A_PLUS_B: u32 = 12;
pub const OUT_CV_A_MINUS_B: u32 = 13;
pub const OUT_GATE: u32 = 14;
pub const OUT_TRIG: u32 = OUT_GATE + 3;

// Lights
pub const LIGHT_CELL: u32 = 0;
pub const LIGHT_BUS: u32 = LIGHT_CELL + 16;
const NUM_LIGHTS: usize = LIGHT_BUS as usize + BUS_COUNT;

/// Switches at or above this value count as on
const SWITCH_ON: f64 = 0.5;

fn param_defs() -> Vec<ParamDef> {
    let mut defs = Vec::with_capacity(NUM_PARAMS as usize);
    for k in 0..16 {
        defs.push(ParamDef::continuous(PITCH + k, format!("pitch_{}", k + 1), 0.0, 1.0, 0.125));
    }
    for k in 0..16 {
        defs.push(ParamDef::stepped(BUS_ROUTE + k, format!("bus_{}", k + 1), 0.0, 2.0, 2.0));
    }
    for k in 0..16 {
        defs.push(ParamDef::toggle(LOAD_SWITCH + k, format!("load_{}", k + 1), 0.0));
    }
    defs.push(ParamDef::toggle(LOAD_BUTTON, "load", 0.0));
    defs.push(ParamDef::toggle(STEP_BUTTON, "step", 0.0));
    defs.push(ParamDef::toggle(SPLIT_MODE, "split_8_8", 0.0));
    defs.push(ParamDef::toggle(RANDOM_PATTERN, "random_pattern", 0.0));
    defs.push(ParamDef::toggle(INVERT_B, "invert_b", 0.0));
    defs.push(ParamDef::continuous(THRESHOLD, "threshold", 0.0, 1.0, 0.0));
    defs.push(ParamDef::toggle(BUS1_LOAD, "bus1_load", 0.0));
    for k in 0..3 {
        defs.push(ParamDef::toggle(BUS_MERGE + k, format!("merge_{}", k + 1), 0.0));
    }
    defs.push(ParamDef::continuous(RANGE, "range", 0.001, 5.0, 1.0));
    defs.push(ParamDef::toggle(BUS2_MODE, "bus2_and", 0.0));
    defs
}

/// Shift-register pattern generator
pub struct Klee {
    params: ParamStore,
    register: ShiftRegister,
    bus_active: [bool; BUS_COUNT],
    gates: [f64; BUS_COUNT],
    cv: [f64; 4],
    triggers: [PulseGenerator; BUS_COUNT],
    load_trigger: EdgeDetector,
    clock_trigger: EdgeDetector,
    ticks: TickSource,
    rng: Rng,
    lights: Vec<f64>,
    spec: PortSpec,
}

impl Klee {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_config(&EngineConfig::new(sample_rate))
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        let mut klee = Self {
            params: ParamStore::new(param_defs()),
            register: ShiftRegister::new(),
            bus_active: [false; BUS_COUNT],
            gates: [GATE_LOW; BUS_COUNT],
            cv: [0.0; 4],
            triggers: [PulseGenerator::new(); BUS_COUNT],
            load_trigger: super::edge_detector(config),
            clock_trigger: super::edge_detector(config),
            ticks: TickSource::new(config.timing, config.sample_rate),
            rng: Rng::from_optional_seed(config.seed),
            lights: vec![0.0; NUM_LIGHTS],
            spec: PortSpec {
                inputs: vec![
                    PortDef::new(IN_LOAD, "load", SignalKind::Trigger),
                    PortDef::new(IN_CLOCK, "clock", SignalKind::Clock),
                    PortDef::new(IN_THRESHOLD, "threshold", SignalKind::CvUnipolar),
                    PortDef::new(IN_RANGE, "range", SignalKind::CvUnipolar),
                ],
                outputs: vec![
                    PortDef::new(OUT_CV_A, "cv_a", SignalKind::VoltPerOctave),
                    PortDef::new(OUT_CV_B, "cv_b", SignalKind::VoltPerOctave),
                    PortDef::new(OUT_CV_A_PLUS_B, "cv_a_plus_b", SignalKind::VoltPerOctave),
                    PortDef::new(OUT_CV_A_MINUS_B, "cv_a_minus_b", SignalKind::VoltPerOctave),
                    PortDef::new(OUT_GATE, "gate_1", SignalKind::Gate),
                    PortDef::new(OUT_GATE + 1, "gate_2", SignalKind::Gate),
                    PortDef::new(OUT_GATE + 2, "gate_3", SignalKind::Gate),
                    PortDef::new(OUT_TRIG, "trig_1", SignalKind::Trigger),
                    PortDef::new(OUT_TRIG + 1, "trig_2", SignalKind::Trigger),
                    PortDef::new(OUT_TRIG + 2, "trig_3", SignalKind::Trigger),
                ],
            },
        };
        klee.load();
        klee
    }

    /// Current register contents
    pub fn register(&self) -> &ShiftRegister {
        &self.register
    }

    /// Bus states after the last rotation
    pub fn buses(&self) -> [bool; BUS_COUNT] {
        self.bus_active
    }

    pub fn randomize_pitch(&mut self) {
        self.params.randomize_range(PITCH, 16, &mut self.rng);
    }

    pub fn randomize_bus(&mut self) {
        self.params.randomize_range(BUS_ROUTE, 16, &mut self.rng);
    }

    pub fn randomize_load(&mut self) {
        self.params.randomize_range(LOAD_SWITCH, 16, &mut self.rng);
    }

    /// Put the range knob back to one volt per pitch unit
    pub fn set_range_1v(&mut self) {
        self.params.set(RANGE, 1.0);
    }

    fn switch_on(&self, id: ParamId) -> bool {
        self.params.value(id) >= SWITCH_ON
    }

    /// Copy the load switches into the register
    fn load(&mut self) {
        let mut cells = [false; REGISTER_LEN];
        for (k, cell) in cells.iter_mut().enumerate() {
            *cell = self.switch_on(LOAD_SWITCH + k as u32);
        }
        self.register.load(cells);
    }

    fn rotate(&mut self, inputs: &PortValues) {
        let mode = if self.switch_on(SPLIT_MODE) {
            RotateMode::Split {
                invert_b: self.switch_on(INVERT_B),
            }
        } else {
            RotateMode::Whole
        };
        let carry = if self.switch_on(RANDOM_PATTERN) {
            Carry::Chance(self.params.value(THRESHOLD) + inputs.get_or(IN_THRESHOLD, 0.0))
        } else {
            Carry::Copy
        };
        self.register.rotate(mode, carry, &mut self.rng);
    }

    fn update_bus(&mut self) {
        let bus0_was_active = self.bus_active[0];
        let mut routes = [0usize; REGISTER_LEN];
        for (k, r) in routes.iter_mut().enumerate() {
            *r = route(self.params.value(BUS_ROUTE + k as u32));
        }
        let logic = if self.switch_on(BUS2_MODE) {
            BusLogic::And
        } else {
            BusLogic::Nor
        };
        self.bus_active = self.register.buses(&routes, logic);

        if self.switch_on(BUS1_LOAD) && !bus0_was_active && self.bus_active[0] {
            self.load();
        }
    }

    fn fire_triggers_and_cv(&mut self, inputs: &PortValues) {
        for (active, trigger) in self.bus_active.iter().zip(self.triggers.iter_mut()) {
            if *active {
                trigger.trigger(TRIGGER_DURATION);
            }
        }

        let mult = self.params.value(RANGE) + inputs.get_or(IN_RANGE, 0.0);
        let mut a = 0.0;
        let mut b = 0.0;
        for k in 0..HALF_LEN {
            if self.register.half_a()[k] {
                a += self.params.value(PITCH + k as u32) * mult;
            }
            if self.register.half_b()[k] {
                b += self.params.value(PITCH + (k + HALF_LEN) as u32) * mult;
            }
        }
        self.cv = [a, b, a + b, a - b];
    }

    fn update_gates(&mut self, edge: Edge) {
        for k in 0..BUS_COUNT {
            match edge {
                Edge::Rising => {
                    self.gates[k] = if self.bus_active[k] { GATE_HIGH } else { GATE_LOW };
                }
                Edge::Falling => {
                    if !self.bus_active[k] || !self.switch_on(BUS_MERGE + k as u32) {
                        self.gates[k] = GATE_LOW;
                    }
                }
                Edge::None => {}
            }
        }
    }

    fn show_values(&mut self) {
        for (k, &cell) in self.register.whole().iter().enumerate() {
            self.lights[LIGHT_CELL as usize + k] = if cell { LIGHT_ON } else { 0.0 };
        }
        for k in 0..BUS_COUNT {
            self.lights[LIGHT_BUS as usize + k] = self.gates[k];
        }
    }
}

impl Default for Klee {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Klee {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let dt = self.ticks.next_dt();

        let load = self.params.value(LOAD_BUTTON) + inputs.get_or(IN_LOAD, 0.0);
        if self.load_trigger.rising(load) {
            self.load();
        }

        let clock = inputs.get_or(IN_CLOCK, 0.0) + self.params.value(STEP_BUTTON);
        let edge = self.clock_trigger.process(clock);
        if edge.is_rising() {
            self.rotate(inputs);
            self.update_bus();
            self.fire_triggers_and_cv(inputs);
        }
        self.update_gates(edge);
        self.show_values();

        outputs.set(OUT_CV_A, self.cv[0]);
        outputs.set(OUT_CV_B, self.cv[1]);
        outputs.set(OUT_CV_A_PLUS_B, self.cv[2]);
        outputs.set(OUT_CV_A_MINUS_B, self.cv[3]);
        for k in 0..BUS_COUNT {
            outputs.set(OUT_GATE + k as u32, self.gates[k]);
            let trig = if self.triggers[k].process(dt) {
                GATE_HIGH
            } else {
                GATE_LOW
            };
            outputs.set(OUT_TRIG + k as u32, trig);
        }
    }

    fn reset(&mut self) {
        self.load();
        self.bus_active = [false; BUS_COUNT];
        self.gates = [GATE_LOW; BUS_COUNT];
        self.cv = [0.0; 4];
        for trigger in self.triggers.iter_mut() {
            trigger.reset();
        }
        self.load_trigger.reset();
        self.clock_trigger.reset();
        self.ticks.reset();
        self.show_values();
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
        "klee"
    }
}
