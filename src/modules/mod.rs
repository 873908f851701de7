//! Sequencer modules
//!
//! Each module is a [`GraphModule`] that owns its parameters, lights, edge
//! detectors, tick source and random generator. The [`ModuleRegistry`]
//! builds any of them from a type id.

pub mod klee;
pub mod m581;
pub mod pwm_clock;
pub mod renato;
pub mod spiralone;
pub mod z8k;

pub use klee::Klee;
pub use m581::M581;
pub use pwm_clock::PwmClock;
pub use renato::Renato;
pub use spiralone::Spiralone;
pub use z8k::Z8k;

use crate::config::EngineConfig;
use crate::error::SequencerError;
use crate::port::{GraphModule, PortSpec};
use crate::trigger::EdgeDetector;
use crate::StdMap;

/// Edge detector using the configured clock thresholds
pub(crate) fn edge_detector(config: &EngineConfig) -> EdgeDetector {
    EdgeDetector::with_thresholds(config.edge_low, config.edge_high)
}

/// Builds a module from the engine configuration
pub type ModuleFactory = Box<dyn Fn(&EngineConfig) -> Box<dyn GraphModule> + Send + Sync>;

/// Metadata about a registered module type
#[derive(Debug, Clone)]
pub struct ModuleMetadata {
    pub type_id: String,
    pub name: String,
    pub description: String,
    pub port_spec: PortSpec,
}

/// Registry of available module types for instantiation
pub struct ModuleRegistry {
    factories: StdMap<String, ModuleFactory>,
    metadata: StdMap<String, ModuleMetadata>,
}

impl ModuleRegistry {
    /// Create a registry holding every built-in module
    pub fn new() -> Self {
        let mut registry = Self {
            factories: StdMap::new(),
            metadata: StdMap::new(),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&mut self) {
        self.register_factory(
            "klee",
            "Klee",
            "16-step shift-register pattern generator with three logic buses",
            |c| Box::new(Klee::with_config(c)),
        );
        self.register_factory(
            "m581",
            "M581",
            "8-stage step sequencer with run modes, pulse counts and slide",
            |c| Box::new(M581::with_config(c)),
        );
        self.register_factory(
            "renato",
            "Renato",
            "4x4 coordinate sequencer with independent X and Y clocks",
            |c| Box::new(Renato::with_config(c)),
        );
        self.register_factory(
            "z8k",
            "Z8K",
            "Ten sequencers reading rows, columns and paths of one 4x4 grid",
            |c| Box::new(Z8k::with_config(c)),
        );
        self.register_factory(
            "spiralone",
            "Spiralone",
            "Five strided sequencers over a shared ring of 32 voltages",
            |c| Box::new(Spiralone::with_config(c)),
        );
        self.register_factory(
            "pwm_clock",
            "PWM Clock",
            "Master clock with 21 divided, dotted and triplet outputs",
            |c| Box::new(PwmClock::with_config(c)),
        );
    }

    /// Register a module factory
    pub fn register_factory<F>(&mut self, type_id: &str, name: &str, description: &str, factory: F)
    where
        F: Fn(&EngineConfig) -> Box<dyn GraphModule> + Send + Sync + 'static,
    {
        let sample = factory(&EngineConfig::default());
        let port_spec = sample.port_spec().clone();
        self.metadata.insert(
            type_id.to_string(),
            ModuleMetadata {
                type_id: type_id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                port_spec,
            },
        );
        self.factories.insert(type_id.to_string(), Box::new(factory));
    }

    /// Instantiate a module by type id
    pub fn create(
        &self,
        type_id: &str,
        config: &EngineConfig,
    ) -> Result<Box<dyn GraphModule>, SequencerError> {
        config.validate()?;
        let factory = self.factories.get(type_id).ok_or_else(|| {
            log::warn!("no module registered as {}", type_id);
            SequencerError::InvalidState(format!("unknown module type {}", type_id))
        })?;
        log::debug!("creating {} at {} Hz", type_id, config.sample_rate);
        Ok(factory(config))
    }

    pub fn has_module(&self, type_id: &str) -> bool {
        self.factories.contains_key(type_id)
    }

    pub fn get_metadata(&self, type_id: &str) -> Option<&ModuleMetadata> {
        self.metadata.get(type_id)
    }

    /// Registered type ids, sorted
    pub fn type_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
