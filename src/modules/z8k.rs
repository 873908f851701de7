//! Z8K: ten sequencers over one 4x4 voltage grid
//!
//! Four sequencers walk the rows, four walk the columns, and two walk the
//! whole grid along a vertical and a horizontal zig-zag path. Every
//! sequencer has its own reset, direction and clock inputs and one CV
//! output. A grid light shows which kinds of sequencer sit on that cell.

use crate::config::EngineConfig;
use crate::counter::{StrideCounter, StrideMode};
use crate::params::{ParamDef, ParamId, ParamStore};
use crate::port::{GraphModule, PortDef, PortSpec, PortValues, SignalKind, LIGHT_ON};
use crate::rng::Rng;
use crate::timer::TickSource;
use crate::trigger::EdgeDetector;

/// Cells in the grid
pub const GRID_CELLS: usize = 16;

/// Number of sequencers
pub const NUM_SEQUENCERS: usize = 10;

pub const SEQ_ROW_1: usize = 0;
pub const SEQ_COL_A: usize = 4;
pub const SEQ_VERT: usize = 8;
pub const SEQ_HORIZ: usize = 9;

// Parameters
pub const VOLTAGE: ParamId = 0;

// Inputs, three per sequencer
pub const IN_RESET: u32 = 0;
pub const IN_DIR: u32 = 1;
pub const IN_CLOCK: u32 = 2;
const INPUTS_PER_SEQ: u32 = 3;

// Outputs
pub const OUT_CV: u32 = 40;

/// Light bit for a row sequencer on the cell
pub const LIGHT_ROW: u8 = 0x01;
/// Light bit for a column sequencer on the cell
pub const LIGHT_COL: u8 = 0x02;
/// Light bit for the horizontal path
pub const LIGHT_HORIZ: u8 = 0x04;
/// Light bit for the vertical path
pub const LIGHT_VERT: u8 = 0x08;

const VERT_PATH: [usize; GRID_CELLS] = [0, 4, 8, 12, 13, 9, 5, 1, 2, 6, 10, 14, 15, 11, 7, 3];
const HORIZ_PATH: [usize; GRID_CELLS] = [0, 1, 2, 3, 7, 6, 5, 4, 8, 9, 10, 11, 15, 14, 13, 12];

/// Input port id for `port` (one of [`IN_RESET`], [`IN_DIR`], [`IN_CLOCK`])
/// of sequencer `seq`
#[inline]
pub fn input_id(seq: usize, port: u32) -> u32 {
    seq as u32 * INPUTS_PER_SEQ + port
}

/// Grid cells visited by sequencer `seq`, in order
pub fn path(seq: usize) -> Vec<usize> {
    match seq {
        0..=3 => (0..4).map(|k| 4 * seq + k).collect(),
        4..=7 => (0..4).map(|k| (seq - SEQ_COL_A) + 4 * k).collect(),
        SEQ_VERT => VERT_PATH.to_vec(),
        _ => HORIZ_PATH.to_vec(),
    }
}

fn light_bit(seq: usize) -> u8 {
    match seq {
        SEQ_VERT => LIGHT_VERT,
        SEQ_HORIZ => LIGHT_HORIZ,
        s if s < SEQ_COL_A => LIGHT_ROW,
        _ => LIGHT_COL,
    }
}

fn seq_name(seq: usize) -> String {
    match seq {
        0..=3 => format!("row_{}", seq + 1),
        4..=7 => format!("col_{}", (b'a' + (seq - SEQ_COL_A) as u8) as char),
        SEQ_VERT => "vert".to_string(),
        _ => "horiz".to_string(),
    }
}

#[derive(Debug, Clone)]
struct PathSequencer {
    cells: Vec<usize>,
    counter: StrideCounter,
    reset: EdgeDetector,
    direction: EdgeDetector,
    clock: EdgeDetector,
}

impl PathSequencer {
    fn new(seq: usize, config: &EngineConfig) -> Self {
        Self {
            cells: path(seq),
            counter: StrideCounter::new(),
            reset: super::edge_detector(config),
            direction: super::edge_detector(config),
            clock: super::edge_detector(config),
        }
    }

    /// Advance on reset or clock and return the grid cell now addressed.
    /// Direction is level sensitive: high walks backward.
    fn step(&mut self, reset: f64, direction: f64, clock: f64) -> usize {
        self.direction.process(direction);
        if self.reset.rising(reset) {
            self.counter.reset();
        } else if self.clock.rising(clock) {
            let mode = if self.direction.is_high() {
                StrideMode::Backward
            } else {
                StrideMode::Forward
            };
            self.counter.advance(mode, 1, self.cells.len() as i32);
        }
        self.cell()
    }

    fn cell(&self) -> usize {
        self.cells[self.counter.position() % self.cells.len()]
    }

    fn reset_edges(&mut self) {
        self.reset.reset();
        self.direction.reset();
        self.clock.reset();
    }
}

pub struct Z8k {
    params: ParamStore,
    sequencers: Vec<PathSequencer>,
    ticks: TickSource,
    rng: Rng,
    lights: Vec<f64>,
    spec: PortSpec,
}

impl Z8k {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_config(&EngineConfig::new(sample_rate))
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        let defs = (0..GRID_CELLS as u32)
            .map(|k| ParamDef::continuous(VOLTAGE + k, format!("voltage_{}", k + 1), 0.005, 6.0, 1.0))
            .collect();

        let mut inputs = Vec::with_capacity(NUM_SEQUENCERS * 3);
        let mut outputs = Vec::with_capacity(NUM_SEQUENCERS);
        for seq in 0..NUM_SEQUENCERS {
            let name = seq_name(seq);
            inputs.push(PortDef::new(input_id(seq, IN_RESET), format!("{}_reset", name), SignalKind::Trigger));
            inputs.push(PortDef::new(input_id(seq, IN_DIR), format!("{}_dir", name), SignalKind::Gate));
            inputs.push(PortDef::new(input_id(seq, IN_CLOCK), format!("{}_clock", name), SignalKind::Clock));
            outputs.push(PortDef::new(OUT_CV + seq as u32, format!("{}_cv", name), SignalKind::CvUnipolar));
        }

        Self {
            params: ParamStore::new(defs),
            sequencers: (0..NUM_SEQUENCERS).map(|s| PathSequencer::new(s, config)).collect(),
            ticks: TickSource::new(config.timing, config.sample_rate),
            rng: Rng::from_optional_seed(config.seed),
            lights: vec![0.0; GRID_CELLS],
            spec: PortSpec { inputs, outputs },
        }
    }

    /// Grid cell addressed by sequencer `seq`
    pub fn cell(&self, seq: usize) -> Option<usize> {
        self.sequencers.get(seq).map(PathSequencer::cell)
    }

    pub fn randomize_pitch(&mut self) {
        self.params.randomize_range(VOLTAGE, GRID_CELLS as u32, &mut self.rng);
    }
}

impl Default for Z8k {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for Z8k {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        self.ticks.next_dt();
        let mut masks = [0u8; GRID_CELLS];
        for (seq, sequencer) in self.sequencers.iter_mut().enumerate() {
            let cell = sequencer.step(
                inputs.get_or(input_id(seq, IN_RESET), 0.0),
                inputs.get_or(input_id(seq, IN_DIR), 0.0),
                inputs.get_or(input_id(seq, IN_CLOCK), 0.0),
            );
            masks[cell] |= light_bit(seq);
            outputs.set(OUT_CV + seq as u32, self.params.value(VOLTAGE + cell as u32));
        }
        for (light, mask) in self.lights.iter_mut().zip(masks) {
            *light = LIGHT_ON * f64::from(mask) / 15.0;
        }
    }

    fn reset(&mut self) {
        for sequencer in &mut self.sequencers {
            sequencer.counter.reset();
            sequencer.reset_edges();
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
        "z8k"
    }
}
