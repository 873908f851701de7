//! # xorseq: Eurorack-style CV/gate sequencers
//!
//! `xorseq` implements a family of clocked sequencer modules that turn clock
//! and reset voltages into pitch CV, gates and triggers, one sample at a time.
//!
//! ## Architecture
//!
//! The library is organized in three layers:
//!
//! - **Layer 1: Building blocks** - timers, edge detectors, step counters,
//!   shift registers and the CV/gate lines that shape each step
//! - **Layer 2: Modules** - Klee, M581, Renato, Z8K, Spiralone and PwmClock,
//!   all behind the type-erased [`GraphModule`](port::GraphModule) interface
//! - **Layer 3: Rack** - runtime cabling between modules, plus an optional
//!   controller bridge that mirrors parameters and lights
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use xorseq::prelude::*;
//!
//! # fn main() -> Result<(), SequencerError> {
//! let mut rack = Rack::new(44100.0);
//!
//! let clock = rack.add("clock", PwmClock::new(44100.0));
//! let seq = rack.add("seq", M581::new(44100.0));
//!
//! rack.connect(clock.out("1_16")?, seq.in_("clock")?)?;
//! rack.compile()?;
//!
//! for _ in 0..44100 {
//!     rack.tick();
//! }
//! let cv = rack.output(seq.out("cv")?);
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod config;
pub mod counter;
pub mod cv_line;
pub mod error;
pub mod gate_line;
pub mod graph;
pub mod modules;
pub mod params;
pub mod port;
pub mod rng;
pub mod shift_register;
pub mod timer;
pub mod trigger;

pub(crate) type StdMap<K, V> = std::collections::HashMap<K, V>;

/// Prelude module for convenient imports
pub mod prelude {
    // Layer 1: Building blocks
    pub use crate::counter::{RunMode, StepCounter, StrideCounter, StrideMode};
    pub use crate::cv_line::CvLine;
    pub use crate::gate_line::{GateLine, GateMode};
    pub use crate::shift_register::{BusLogic, Carry, RotateMode, ShiftRegister};
    pub use crate::timer::{TickSource, Timer};
    pub use crate::trigger::{Edge, EdgeDetector, PulseGenerator};

    // Layer 2: Modules
    pub use crate::config::{EngineConfig, TimingMode};
    pub use crate::error::SequencerError;
    pub use crate::modules::{
        Klee, M581, ModuleMetadata, ModuleRegistry, PwmClock, Renato, Spiralone, Z8k,
    };
    pub use crate::params::{ParamDef, ParamId, ParamKind};
    pub use crate::port::{
        GraphModule, LightId, PortDef, PortId, PortSpec, PortValues, SignalKind, GATE_HIGH,
        GATE_LOW, LIGHT_ON,
    };
    pub use crate::rng::Rng;

    // Layer 3: Rack
    pub use crate::binding::{
        bridge, ControlEvent, ControlId, ControlMessage, ControllerBridge, ControllerPort, Target,
    };
    pub use crate::graph::{Cable, CableId, NodeHandle, NodeId, PortRef, Rack};
}

pub use prelude::*;
