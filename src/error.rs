//! Error types for the non-real-time surface
//!
//! Nothing on the per-sample path returns an error: engines clamp, wrap or
//! no-op instead. These errors come from configuration, parameter edits,
//! state restoration, rack topology and the controller bridge.

use crate::port::{ParamId, PortId};

/// Errors reported outside the audio path
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerError {
    /// No parameter with this id or name exists on the module
    UnknownParam(String),
    /// A parameter value was not a finite number
    InvalidParamValue { param: ParamId, value: f64 },
    /// A state snapshot could not be applied
    InvalidState(String),
    /// The engine configuration is inconsistent
    InvalidConfig(String),
    /// The rack has no node with this handle
    UnknownNode,
    /// No port with this name exists on the node
    UnknownPort(String),
    /// The port does not exist on the node
    InvalidPort(PortId),
    /// The cable graph contains a feedback loop
    CycleDetected { nodes: usize },
    /// The controller bridge has no binding for this id
    Unbound(u32),
}

impl std::fmt::Display for SequencerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequencerError::UnknownParam(name) => write!(f, "Unknown parameter: {}", name),
            SequencerError::InvalidParamValue { param, value } => {
                write!(f, "Invalid value {} for parameter {}", value, param)
            }
            SequencerError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            SequencerError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            SequencerError::UnknownNode => write!(f, "Unknown node"),
            SequencerError::UnknownPort(name) => write!(f, "Unknown port: {}", name),
            SequencerError::InvalidPort(port) => write!(f, "Invalid port {}", port),
            SequencerError::CycleDetected { nodes } => {
                write!(f, "Cycle detected involving {} nodes", nodes)
            }
            SequencerError::Unbound(id) => write!(f, "No binding for id {}", id),
        }
    }
}

impl std::error::Error for SequencerError {}
