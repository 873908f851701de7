//! Parameter records and the per-module parameter store
//!
//! A panel control is described by plain data: its range, default and a
//! [`ParamKind`] capability tag. Randomization is a pure function of that
//! record, so a "randomize pitch" menu action is just a loop over ids.

use crate::error::SequencerError;
use crate::rng::Rng;
use libm::Libm;
use serde::{Deserialize, Serialize};

/// Unique identifier for a parameter within a module
pub type ParamId = u32;

/// How a control moves between its bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Knob or slider, any value in range
    Continuous,
    /// Detented selector, integer positions only
    Stepped,
    /// Two-position switch or button, `min` or `max`
    Toggle,
}

/// Parameter definition for UI and controller binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    pub id: ParamId,
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub kind: ParamKind,
}

impl ParamDef {
    pub fn new(
        id: ParamId,
        name: impl Into<String>,
        kind: ParamKind,
        min: f64,
        max: f64,
        default: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            min,
            max,
            default,
            kind,
        }
    }

    pub fn continuous(id: ParamId, name: impl Into<String>, min: f64, max: f64, default: f64) -> Self {
        Self::new(id, name, ParamKind::Continuous, min, max, default)
    }

    pub fn stepped(id: ParamId, name: impl Into<String>, min: f64, max: f64, default: f64) -> Self {
        Self::new(id, name, ParamKind::Stepped, min, max, default)
    }

    pub fn toggle(id: ParamId, name: impl Into<String>, default: f64) -> Self {
        Self::new(id, name, ParamKind::Toggle, 0.0, 1.0, default)
    }

    /// Clamp a value into this parameter's range
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Draw a random value for a control of the given kind and range
pub fn randomize(kind: ParamKind, min: f64, max: f64, rng: &mut Rng) -> f64 {
    match kind {
        ParamKind::Continuous => min + rng.next_f64() * (max - min),
        ParamKind::Stepped => {
            let v = Libm::<f64>::round(min + rng.next_f64() * (max - min));
            v.clamp(min, max)
        }
        ParamKind::Toggle => {
            if rng.coin() {
                max
            } else {
                min
            }
        }
    }
}

/// Parameter values owned by one module instance
#[derive(Debug, Clone)]
pub struct ParamStore {
    defs: Vec<ParamDef>,
    values: Vec<f64>,
}

impl ParamStore {
    /// Build a store from definitions whose ids are `0..defs.len()` in order
    pub fn new(defs: Vec<ParamDef>) -> Self {
        debug_assert!(defs.iter().enumerate().all(|(i, d)| d.id as usize == i));
        let values = defs.iter().map(|d| d.default).collect();
        Self { defs, values }
    }

    pub fn defs(&self) -> &[ParamDef] {
        &self.defs
    }

    /// Current value, or 0.0 for an unknown id
    #[inline]
    pub fn value(&self, id: ParamId) -> f64 {
        self.values.get(id as usize).copied().unwrap_or(0.0)
    }

    /// Current value rounded to the nearest integer position
    #[inline]
    pub fn position(&self, id: ParamId) -> i32 {
        Libm::<f64>::round(self.value(id)) as i32
    }

    pub fn get(&self, id: ParamId) -> Option<f64> {
        self.values.get(id as usize).copied()
    }

    /// Set a value, clamped into range. Unknown ids and NaN are ignored.
    pub fn set(&mut self, id: ParamId, value: f64) {
        let _ = self.try_set(id, value);
    }

    /// Set a value, reporting unknown ids and non-finite values
    pub fn try_set(&mut self, id: ParamId, value: f64) -> Result<(), SequencerError> {
        let def = self
            .defs
            .get(id as usize)
            .ok_or_else(|| SequencerError::UnknownParam(id.to_string()))?;
        if !value.is_finite() {
            return Err(SequencerError::InvalidParamValue { param: id, value });
        }
        self.values[id as usize] = def.clamp(value);
        Ok(())
    }

    pub fn id_by_name(&self, name: &str) -> Option<ParamId> {
        self.defs.iter().find(|d| d.name == name).map(|d| d.id)
    }

    /// Restore every parameter to its default
    pub fn reset_defaults(&mut self) {
        for (value, def) in self.values.iter_mut().zip(&self.defs) {
            *value = def.default;
        }
    }

    /// Randomize `count` consecutive parameters starting at `first`
    pub fn randomize_range(&mut self, first: ParamId, count: u32, rng: &mut Rng) {
        for id in first..first + count {
            if let Some(def) = self.defs.get(id as usize) {
                self.values[id as usize] = randomize(def.kind, def.min, def.max, rng);
            }
        }
    }
}
