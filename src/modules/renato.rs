//! Renato: 4x4 coordinate sequencer
//!
//! Two axes with their own clock, reset and count mode address a 4x4 grid.
//! Each cell carries a voltage and three switches: access, gate on X and
//! gate on Y. When an axis lands on a cell without access, seek mode keeps
//! moving that axis until it finds one; sleep mode parks there until the
//! next clock or reset.

use crate::config::EngineConfig;
use crate::counter::{RunMode, StepCounter};
use crate::params::{ParamDef, ParamId, ParamStore};
use crate::port::{GraphModule, PortDef, PortSpec, PortValues, SignalKind, GATE_HIGH, GATE_LOW, LIGHT_ON};
use crate::rng::Rng;
use crate::timer::TickSource;
use crate::trigger::{Edge, EdgeDetector};

/// Cells per axis
pub const AXIS_LEN: usize = 4;
const CELLS: u32 = (AXIS_LEN * AXIS_LEN) as u32;

/// Extra moves an axis makes in one tick while seeking
const SEEK_TRIES: usize = AXIS_LEN;

// Parameters
pub const COUNT_MODE_X: ParamId = 0;
pub const COUNT_MODE_Y: ParamId = 1;
pub const SEEK_SLEEP: ParamId = 2;
pub const ACCESS: ParamId = 3;
pub const GATE_X: ParamId = ACCESS + CELLS;
pub const GATE_Y: ParamId = GATE_X + CELLS;
pub const VOLTAGE: ParamId = GATE_Y + CELLS;

// Inputs
pub const IN_X_CLOCK: u32 = 0;
pub const IN_Y_CLOCK: u32 = 1;
pub const IN_X_RESET: u32 = 2;
pub const IN_Y_RESET: u32 = 3;

// Outputs
pub const OUT_CV: u32 = 10;
pub const OUT_X_GATE: u32 = 11;
pub const OUT_Y_GATE: u32 = 12;

// Lights
pub const LIGHT_GATE_X: u32 = 0;
pub const LIGHT_GATE_Y: u32 = 1;
pub const LIGHT_CELL: u32 = 2;
const NUM_LIGHTS: usize = LIGHT_CELL as usize + CELLS as usize;

fn param_defs() -> Vec<ParamDef> {
    let mut defs = vec![
        ParamDef::stepped(COUNT_MODE_X, "count_mode_x", 0.0, 2.0, 0.0),
        ParamDef::stepped(COUNT_MODE_Y, "count_mode_y", 0.0, 2.0, 0.0),
        ParamDef::toggle(SEEK_SLEEP, "seek", 0.0),
    ];
    for k in 0..CELLS {
        defs.push(ParamDef::toggle(ACCESS + k, format!("access_{}", k + 1), 1.0));
    }
    for k in 0..CELLS {
        defs.push(ParamDef::toggle(GATE_X + k, format!("gate_x_{}", k + 1), 1.0));
    }
    for k in 0..CELLS {
        defs.push(ParamDef::toggle(GATE_Y + k, format!("gate_y_{}", k + 1), 1.0));
    }
    for k in 0..CELLS {
        defs.push(ParamDef::continuous(VOLTAGE + k, format!("voltage_{}", k + 1), 0.005, 6.0, 1.0));
    }
    defs
}

/// Grid index of column `x`, row `y`
#[inline]
pub fn cell_index(x: usize, y: usize) -> usize {
    AXIS_LEN * y + x
}

/// Renato axes only know forward, backward and random
fn count_mode(position: i32) -> RunMode {
    match position {
        i32::MIN..=0 => RunMode::Forward,
        1 => RunMode::Backward,
        _ => RunMode::Random,
    }
}

/// One axis: a position moved by its own clock and reset
#[derive(Debug, Clone)]
struct Axis {
    position: usize,
    counter: StepCounter,
    clock: EdgeDetector,
    reset: EdgeDetector,
    seeking: bool,
    gate: f64,
}

impl Axis {
    fn new(config: &EngineConfig) -> Self {
        Self {
            position: 0,
            counter: StepCounter::with_max_steps(AXIS_LEN),
            clock: super::edge_detector(config),
            reset: super::edge_detector(config),
            seeking: false,
            gate: GATE_LOW,
        }
    }

    fn restart(&mut self) {
        self.position = 0;
        self.seeking = false;
        self.gate = GATE_LOW;
    }

    /// Handle reset and clock for this tick, returning the clock edge.
    /// `accessible` tells whether a position on this axis may be played.
    fn step<F>(&mut self, clock: f64, reset: f64, mode: RunMode, seek: bool, accessible: F, rng: &mut Rng) -> Edge
    where
        F: Fn(usize) -> bool,
    {
        self.counter.set(mode, AXIS_LEN);
        let mut moved = false;
        if self.reset.rising(reset) {
            self.position = 0;
            moved = true;
        }
        let edge = self.clock.process(clock);
        if edge.is_rising() {
            self.position = self.counter.advance(self.position, &[true; AXIS_LEN], rng);
            moved = true;
        }
        if moved {
            self.seeking = seek && !accessible(self.position);
        }
        if self.seeking && seek {
            for _ in 0..SEEK_TRIES {
                if accessible(self.position) {
                    break;
                }
                self.position = self.counter.advance(self.position, &[true; AXIS_LEN], rng);
            }
            self.seeking = !accessible(self.position);
        }
        edge
    }

    /// Gate follows the axis clock
    fn follow(&mut self, edge: Edge) {
        match edge {
            Edge::Rising => self.gate = GATE_HIGH,
            Edge::Falling => self.gate = GATE_LOW,
            Edge::None => {}
        }
    }
}

/// Two-axis grid sequencer
pub struct Renato {
    params: ParamStore,
    x: Axis,
    y: Axis,
    cv: f64,
    ticks: TickSource,
    rng: Rng,
    lights: Vec<f64>,
    spec: PortSpec,
}

impl Renato {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_config(&EngineConfig::new(sample_rate))
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        let mut renato = Self {
            params: ParamStore::new(param_defs()),
            x: Axis::new(config),
            y: Axis::new(config),
            cv: 0.0,
            ticks: TickSource::new(config.timing, config.sample_rate),
            rng: Rng::from_optional_seed(config.seed),
            lights: vec![0.0; NUM_LIGHTS],
            spec: PortSpec {
                inputs: vec![
                    PortDef::new(IN_X_CLOCK, "x_clock", SignalKind::Clock),
                    PortDef::new(IN_Y_CLOCK, "y_clock", SignalKind::Clock),
                    PortDef::new(IN_X_RESET, "x_reset", SignalKind::Trigger),
                    PortDef::new(IN_Y_RESET, "y_reset", SignalKind::Trigger),
                ],
                outputs: vec![
                    PortDef::new(OUT_CV, "cv", SignalKind::CvUnipolar),
                    PortDef::new(OUT_X_GATE, "x_gate", SignalKind::Gate),
                    PortDef::new(OUT_Y_GATE, "y_gate", SignalKind::Gate),
                ],
            },
        };
        renato.restart();
        renato
    }

    /// Current (x, y) coordinates
    pub fn position(&self) -> (usize, usize) {
        (self.x.position, self.y.position)
    }

    /// Grid index currently addressed
    pub fn cell(&self) -> usize {
        cell_index(self.x.position, self.y.position)
    }

    pub fn randomize_pitch(&mut self) {
        self.params.randomize_range(VOLTAGE, CELLS, &mut self.rng);
    }

    pub fn randomize_gate_x(&mut self) {
        self.params.randomize_range(GATE_X, CELLS, &mut self.rng);
    }

    pub fn randomize_gate_y(&mut self) {
        self.params.randomize_range(GATE_Y, CELLS, &mut self.rng);
    }

    pub fn randomize_access(&mut self) {
        self.params.randomize_range(ACCESS, CELLS, &mut self.rng);
    }

    fn flag(&self, first: ParamId, cell: usize) -> bool {
        self.params.value(first + cell as u32) > 0.0
    }

    fn restart(&mut self) {
        self.x.restart();
        self.y.restart();
        self.cv = 0.0;
        self.lights.iter_mut().for_each(|l| *l = 0.0);
    }
}

impl Default for Renato {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Renato {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        self.ticks.next_dt();
        let seek = self.params.value(SEEK_SLEEP) > 0.0;

        let access: [bool; CELLS as usize] = std::array::from_fn(|n| self.flag(ACCESS, n));
        let y_pos = self.y.position;

        let x_edge = self.x.step(
            inputs.get_or(IN_X_CLOCK, 0.0),
            inputs.get_or(IN_X_RESET, 0.0),
            count_mode(self.params.position(COUNT_MODE_X)),
            seek,
            |p| access[cell_index(p, y_pos)],
            &mut self.rng,
        );
        let x_pos = self.x.position;
        let y_edge = self.y.step(
            inputs.get_or(IN_Y_CLOCK, 0.0),
            inputs.get_or(IN_Y_RESET, 0.0),
            count_mode(self.params.position(COUNT_MODE_Y)),
            seek,
            |p| access[cell_index(x_pos, p)],
            &mut self.rng,
        );

        let n = self.cell();
        if access[n] {
            if self.flag(GATE_X, n) {
                self.x.follow(x_edge);
                self.lights[LIGHT_GATE_X as usize] = self.x.gate;
            }
            if self.flag(GATE_Y, n) {
                self.y.follow(y_edge);
                self.lights[LIGHT_GATE_Y as usize] = self.y.gate;
            }
            self.cv = self.params.value(VOLTAGE + n as u32);
            for (k, light) in self.lights[LIGHT_CELL as usize..].iter_mut().enumerate() {
                *light = if k == n { LIGHT_ON } else { 0.0 };
            }
        }

        outputs.set(OUT_CV, self.cv);
        outputs.set(OUT_X_GATE, self.x.gate);
        outputs.set(OUT_Y_GATE, self.y.gate);
    }

    fn reset(&mut self) {
        for axis in [&mut self.x, &mut self.y] {
            axis.clock.reset();
            axis.reset.reset();
        }
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
        "renato"
    }
}
