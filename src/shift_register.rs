//! 16-cell shift register with whole and split (8+8) rotation
//!
//! The register is one flat array. Half A is cells 0..8, half B is cells
//! 8..16; there is no other view. Bits enter at the head of a half (index 0
//! or 8) and leave at its tail (index 7 or 15).

use crate::rng::Rng;

/// Number of cells in the register
pub const REGISTER_LEN: usize = 16;

/// Number of cells in each half
pub const HALF_LEN: usize = REGISTER_LEN / 2;

/// Number of logic buses fed by the register
pub const BUS_COUNT: usize = 3;

/// How the register is rotated on a clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateMode {
    /// One 16-cell ring
    Whole,
    /// Two independent 8-cell rings
    Split { invert_b: bool },
}

/// Where the bit entering the head comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Carry {
    /// The bit leaving the tail
    Copy,
    /// A fresh random bit, set with this probability
    Chance(f64),
}

/// Rule combining bus 1 with buses 0 and 2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusLogic {
    /// bus1 = bus0 AND bus2
    And,
    /// bus1 = bus1 AND NOT (bus0 OR bus2)
    Nor,
}

/// Map a 3-way routing control to the bus it selects
#[inline]
pub fn route(value: f64) -> usize {
    if value < 0.5 {
        2
    } else if value > 1.0 {
        0
    } else {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShiftRegister {
    cells: [bool; REGISTER_LEN],
}

impl ShiftRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [bool; REGISTER_LEN]) -> Self {
        Self { cells }
    }

    /// Copy a full pattern into the register
    pub fn load(&mut self, cells: [bool; REGISTER_LEN]) {
        self.cells = cells;
    }

    pub fn whole(&self) -> &[bool; REGISTER_LEN] {
        &self.cells
    }

    pub fn half_a(&self) -> &[bool] {
        &self.cells[..HALF_LEN]
    }

    pub fn half_b(&self) -> &[bool] {
        &self.cells[HALF_LEN..]
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        self.cells.get(index).copied().unwrap_or(false)
    }

    /// Rotate one step towards the tail
    pub fn rotate(&mut self, mode: RotateMode, carry: Carry, rng: &mut Rng) {
        match mode {
            RotateMode::Whole => {
                let tail = shift_in(&mut self.cells, false);
                self.cells[0] = carry_bit(carry, tail, rng);
            }
            RotateMode::Split { invert_b } => {
                let (a, b) = self.cells.split_at_mut(HALF_LEN);
                let tail_a = shift_in(a, false);
                let tail_b = shift_in(b, false);
                a[0] = carry_bit(carry, tail_a, rng);
                b[0] = tail_b != invert_b;
            }
        }
    }

    /// Classify every set cell onto its routed bus, then combine bus 1
    pub fn buses(&self, routes: &[usize; REGISTER_LEN], logic: BusLogic) -> [bool; BUS_COUNT] {
        let mut active = [false; BUS_COUNT];
        for (&set, &bus) in self.cells.iter().zip(routes) {
            if set {
                active[bus.min(BUS_COUNT - 1)] = true;
            }
        }
        active[1] = match logic {
            BusLogic::And => active[0] && active[2],
            BusLogic::Nor => active[1] && !(active[0] || active[2]),
        };
        active
    }
}

/// Shift every cell one place towards the tail, returning the old tail
fn shift_in(cells: &mut [bool], head: bool) -> bool {
    let last = cells.len() - 1;
    let tail = cells[last];
    cells.copy_within(0..last, 1);
    cells[0] = head;
    tail
}

fn carry_bit(carry: Carry, tail: bool, rng: &mut Rng) -> bool {
    match carry {
        Carry::Copy => tail,
        Carry::Chance(p) => rng.chance(p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> [bool; REGISTER_LEN] {
        let mut cells = [false; REGISTER_LEN];
        for k in [0, 3, 4, 9, 15] {
            cells[k] = true;
        }
        cells
    }

    #[test]
    fn test_whole_rotation_period_is_16() {
        let mut rng = Rng::from_seed(1);
        let mut sr = ShiftRegister::from_cells(pattern());
        for k in 1..=REGISTER_LEN {
            sr.rotate(RotateMode::Whole, Carry::Copy, &mut rng);
            if k < REGISTER_LEN {
                assert_ne!(sr.whole(), &pattern(), "returned early after {}", k);
            }
        }
        assert_eq!(sr.whole(), &pattern());
    }

    #[test]
    fn test_whole_rotation_moves_tail_to_head() {
        let mut rng = Rng::from_seed(1);
        let mut sr = ShiftRegister::from_cells(pattern());
        sr.rotate(RotateMode::Whole, Carry::Copy, &mut rng);
        assert!(sr.get(0));
        assert!(sr.get(1));
        assert!(!sr.get(3));
        assert!(sr.get(4));
        assert!(sr.get(5));
    }

    #[test]
    fn test_split_rotation_period_is_8() {
        let mut rng = Rng::from_seed(1);
        let mut sr = ShiftRegister::from_cells(pattern());
        for _ in 0..HALF_LEN {
            sr.rotate(RotateMode::Split { invert_b: false }, Carry::Copy, &mut rng);
        }
        assert_eq!(sr.whole(), &pattern());
    }

    #[test]
    fn test_split_halves_do_not_mix() {
        let mut rng = Rng::from_seed(1);
        let mut cells = [false; REGISTER_LEN];
        cells[7] = true;
        let mut sr = ShiftRegister::from_cells(cells);
        sr.rotate(RotateMode::Split { invert_b: false }, Carry::Copy, &mut rng);
        assert!(sr.get(0));
        assert!(!sr.get(8));
        assert_eq!(sr.half_b(), &[false; HALF_LEN]);
    }

    #[test]
    fn test_split_invert_b_flips_carry() {
        let mut rng = Rng::from_seed(1);
        let mut sr = ShiftRegister::new();
        sr.rotate(RotateMode::Split { invert_b: true }, Carry::Copy, &mut rng);
        assert!(sr.get(8));
        assert!(!sr.get(0));
        // 16 rotations of an inverting 8-ring return to the start
        let mut sr = ShiftRegister::from_cells(pattern());
        for _ in 0..2 * HALF_LEN {
            sr.rotate(RotateMode::Split { invert_b: true }, Carry::Copy, &mut rng);
        }
        assert_eq!(sr.whole(), &pattern());
    }

    #[test]
    fn test_chance_carry_extremes() {
        let mut rng = Rng::from_seed(4);
        let mut sr = ShiftRegister::new();
        for _ in 0..REGISTER_LEN {
            sr.rotate(RotateMode::Whole, Carry::Chance(1.0), &mut rng);
        }
        assert!(sr.whole().iter().all(|&c| c));
        for _ in 0..REGISTER_LEN {
            sr.rotate(RotateMode::Whole, Carry::Chance(0.0), &mut rng);
        }
        assert!(sr.whole().iter().all(|&c| !c));
    }

    #[test]
    fn test_route_thresholds() {
        assert_eq!(route(0.0), 2);
        assert_eq!(route(0.49), 2);
        assert_eq!(route(0.5), 1);
        assert_eq!(route(1.0), 1);
        assert_eq!(route(1.5), 0);
        assert_eq!(route(2.0), 0);
    }

    #[test]
    fn test_bus_nor_rule() {
        let mut cells = [false; REGISTER_LEN];
        cells[0] = true;
        let sr = ShiftRegister::from_cells(cells);
        let mut routes = [1; REGISTER_LEN];
        assert_eq!(sr.buses(&routes, BusLogic::Nor), [false, true, false]);

        cells[1] = true;
        routes[1] = 0;
        let sr = ShiftRegister::from_cells(cells);
        assert_eq!(sr.buses(&routes, BusLogic::Nor), [true, false, false]);
    }

    #[test]
    fn test_bus_and_rule() {
        let mut cells = [false; REGISTER_LEN];
        cells[0] = true;
        cells[5] = true;
        let sr = ShiftRegister::from_cells(cells);
        let mut routes = [1; REGISTER_LEN];
        routes[0] = 0;
        assert_eq!(sr.buses(&routes, BusLogic::And), [true, false, false]);
        routes[5] = 2;
        assert_eq!(sr.buses(&routes, BusLogic::And), [true, true, true]);
    }

    #[test]
    fn test_views() {
        let sr = ShiftRegister::from_cells(pattern());
        assert_eq!(sr.half_a().len(), HALF_LEN);
        assert!(sr.half_a()[3]);
        assert!(sr.half_b()[1]);
        assert!(!sr.get(99));
    }
}
