//! Signal conventions, port definitions and the host-facing module trait
//!
//! Modules never see cables. The host hands them a [`PortValues`] map per
//! tick holding one voltage for every *patched* input; an input that is
//! absent from the map is unpatched and the module falls back to its knob.

use crate::params::ParamDef;
use crate::StdMap;
use serde::{Deserialize, Serialize};

pub use crate::params::ParamId;

/// Unique identifier for a port within a module
pub type PortId = u32;

/// Unique identifier for a light within a module
pub type LightId = u32;

/// Output level of an active gate or trigger
pub const GATE_HIGH: f64 = 10.0;

/// Output level of an inactive gate or trigger
pub const GATE_LOW: f64 = 0.0;

/// Brightness of a fully lit light
pub const LIGHT_ON: f64 = 10.0;

/// Semantic signal classification following hardware modular conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Unipolar control voltage, 0–10V (step voltages, length/stride CV)
    CvUnipolar,

    /// Pitch CV following 1V/octave standard
    VoltPerOctave,

    /// Gate signal: 0V low or +10V high, held for the event
    Gate,

    /// Trigger signal, short pulse at +10V
    Trigger,

    /// Clock signal, regular pulses at tempo
    Clock,
}

impl SignalKind {
    /// Whether multiple signals of this kind should be summed when connected
    pub fn is_summable(&self) -> bool {
        matches!(self, SignalKind::CvUnipolar | SignalKind::VoltPerOctave)
    }
}

/// Definition of a single port (input or output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    /// Unique identifier within the module
    pub id: PortId,

    /// Human-readable name (e.g., "clock", "cv_a", "gate_x")
    pub name: String,

    /// Signal type, decides how several cables into one input mix
    pub kind: SignalKind,
}

impl PortDef {
    pub fn new(id: PortId, name: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }
}

/// Specification of all ports for a module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSpec {
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
}

impl PortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_by_name(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn input_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.id == id)
    }

    pub fn output_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.id == id)
    }
}

/// Runtime port values container
#[derive(Debug, Clone, Default)]
pub struct PortValues {
    pub values: StdMap<PortId, f64>,
}

impl PortValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: PortId) -> Option<f64> {
        self.values.get(&id).copied()
    }

    pub fn get_or(&self, id: PortId, default: f64) -> f64 {
        self.values.get(&id).copied().unwrap_or(default)
    }

    pub fn set(&mut self, id: PortId, value: f64) {
        self.values.insert(id, value);
    }

    /// Accumulate (sum) a value into a port (for input mixing)
    pub fn accumulate(&mut self, id: PortId, value: f64) {
        *self.values.entry(id).or_insert(0.0) += value;
    }

    /// Keep the larger of the stored and incoming value (for gate mixing)
    pub fn merge_max(&mut self, id: PortId, value: f64) {
        let slot = self.values.entry(id).or_insert(value);
        if value > *slot {
            *slot = value;
        }
    }

    /// True when the input is patched
    pub fn has(&self, id: PortId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Type-erased module interface for graph-based patching
///
/// This is also the whole contract the controller bridge relies on:
/// parameters are read and written by id, lights are read by id.
pub trait GraphModule: Send + Sync {
    /// Returns the module's port specification
    fn port_spec(&self) -> &PortSpec;

    /// Process one sample given port values
    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues);

    /// Reset internal state
    fn reset(&mut self);

    /// Set sample rate
    fn set_sample_rate(&mut self, sample_rate: f64);

    /// Get parameter definitions for UI binding
    fn params(&self) -> &[ParamDef] {
        &[]
    }

    /// Get a parameter value
    fn get_param(&self, _id: ParamId) -> Option<f64> {
        None
    }

    /// Set a parameter value
    fn set_param(&mut self, _id: ParamId, _value: f64) {}

    /// Current light brightness indexed by light id, 0.0 (off) to 10.0 (full)
    fn lights(&self) -> &[f64] {
        &[]
    }

    /// Read a single light
    fn light(&self, id: LightId) -> Option<f64> {
        self.lights().get(id as usize).copied()
    }

    /// Rebuild derived state after parameters were restored
    fn on_loaded(&mut self) {
        self.reset();
    }

    /// Get module type identifier for serialization
    fn type_id(&self) -> &'static str {
        "unknown"
    }

    /// Snapshot parameter values keyed by name (alloc feature only)
    #[cfg(feature = "alloc")]
    fn serialize_state(&self) -> Option<serde_json::Value> {
        let mut params = serde_json::Map::new();
        for def in self.params() {
            if let Some(value) = self.get_param(def.id) {
                params.insert(def.name.clone(), serde_json::Value::from(value));
            }
        }
        let mut state = serde_json::Map::new();
        state.insert("type".into(), serde_json::Value::from(self.type_id()));
        state.insert("params".into(), serde_json::Value::Object(params));
        Some(serde_json::Value::Object(state))
    }

    /// Restore parameter values by name, then call [`GraphModule::on_loaded`]
    /// (alloc feature only)
    #[cfg(feature = "alloc")]
    fn deserialize_state(
        &mut self,
        state: &serde_json::Value,
    ) -> Result<(), crate::error::SequencerError> {
        use crate::error::SequencerError;

        if let Some(kind) = state.get("type").and_then(|t| t.as_str()) {
            if kind != self.type_id() {
                return Err(SequencerError::InvalidState(format!(
                    "snapshot is for {}, not {}",
                    kind,
                    self.type_id()
                )));
            }
        }
        let values = state
            .get("params")
            .and_then(|p| p.as_object())
            .ok_or_else(|| SequencerError::InvalidState("missing params object".into()))?;

        let known: Vec<(ParamId, String)> =
            self.params().iter().map(|d| (d.id, d.name.clone())).collect();
        let mut restored = 0;
        for (id, name) in &known {
            if let Some(value) = values.get(name) {
                let value = value.as_f64().ok_or_else(|| {
                    SequencerError::InvalidState(format!("{} is not a number", name))
                })?;
                self.set_param(*id, value);
                restored += 1;
            }
        }
        for name in values.keys() {
            if !known.iter().any(|(_, n)| n == name) {
                log::warn!("{}: ignoring unknown parameter {}", self.type_id(), name);
            }
        }
        log::debug!("{}: restored {} parameters", self.type_id(), restored);

        self.on_loaded();
        Ok(())
    }
}
