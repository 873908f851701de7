//! Rack: a minimal host for patching modules together
//!
//! Modules are added to the rack, cabled output to input, and ticked once
//! per sample in topological order. Only patched inputs reach a module:
//! several cables into one input are summed for CV kinds and merged by
//! maximum for gate, trigger and clock kinds.

use crate::error::SequencerError;
use crate::port::{GraphModule, LightId, ParamId, PortId, PortSpec, PortValues};
use crate::StdMap;
use serde::{Deserialize, Serialize};
use slotmap::{DefaultKey, SlotMap};
use std::collections::VecDeque;

/// Unique identifier for a node in the rack
pub type NodeId = DefaultKey;

/// Index of a cable in the rack
pub type CableId = usize;

/// Reference to a specific port on a specific node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub port: PortId,
}

/// A cable from an output to an input
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cable {
    pub from: PortRef,
    pub to: PortRef,
}

struct Node {
    module: Box<dyn GraphModule>,
    name: String,
}

/// Handle to a node for looking up ports by name
#[derive(Clone)]
pub struct NodeHandle {
    id: NodeId,
    spec: PortSpec,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Reference an output port by name
    pub fn out(&self, name: &str) -> Result<PortRef, SequencerError> {
        let port = self
            .spec
            .output_by_name(name)
            .ok_or_else(|| SequencerError::UnknownPort(name.to_string()))?;
        Ok(PortRef {
            node: self.id,
            port: port.id,
        })
    }

    /// Reference an input port by name
    pub fn in_(&self, name: &str) -> Result<PortRef, SequencerError> {
        let port = self
            .spec
            .input_by_name(name)
            .ok_or_else(|| SequencerError::UnknownPort(name.to_string()))?;
        Ok(PortRef {
            node: self.id,
            port: port.id,
        })
    }

    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }
}

/// Modules plus the cables between them
pub struct Rack {
    nodes: SlotMap<NodeId, Node>,
    cables: Vec<Cable>,

    execution_order: Vec<NodeId>,
    compiled: bool,
    /// Compilation failed and was logged; cleared by any topology edit
    cycle_reported: bool,
    buffers: StdMap<PortRef, f64>,

    sample_rate: f64,
}

impl Rack {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            nodes: SlotMap::new(),
            cables: Vec::new(),
            execution_order: Vec::new(),
            compiled: false,
            cycle_reported: false,
            buffers: StdMap::new(),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Add a module to the rack
    pub fn add<M: GraphModule + 'static>(&mut self, name: impl Into<String>, module: M) -> NodeHandle {
        self.add_boxed(name, Box::new(module))
    }

    /// Add a boxed module, e.g. one built by the module registry
    pub fn add_boxed(&mut self, name: impl Into<String>, mut module: Box<dyn GraphModule>) -> NodeHandle {
        module.set_sample_rate(self.sample_rate);
        let spec = module.port_spec().clone();
        let name = name.into();
        log::debug!("rack: adding {} ({})", name, module.type_id());
        let id = self.nodes.insert(Node { module, name });
        self.invalidate();
        NodeHandle { id, spec }
    }

    /// Remove a module and every cable touching it
    pub fn remove(&mut self, node: NodeId) -> Result<(), SequencerError> {
        if self.nodes.remove(node).is_none() {
            return Err(SequencerError::UnknownNode);
        }
        self.cables
            .retain(|cable| cable.from.node != node && cable.to.node != node);
        self.buffers.retain(|port, _| port.node != node);
        self.invalidate();
        Ok(())
    }

    /// Connect an output port to an input port
    pub fn connect(&mut self, from: PortRef, to: PortRef) -> Result<CableId, SequencerError> {
        self.validate_output_port(from)?;
        self.validate_input_port(to)?;
        self.cables.push(Cable { from, to });
        self.invalidate();
        Ok(self.cables.len() - 1)
    }

    /// Connect one output to several inputs
    pub fn mult(&mut self, from: PortRef, to: &[PortRef]) -> Result<Vec<CableId>, SequencerError> {
        to.iter().map(|&dest| self.connect(from, dest)).collect()
    }

    /// Remove a cable. Later cable ids shift down by one.
    pub fn disconnect(&mut self, cable_id: CableId) -> Result<(), SequencerError> {
        if cable_id >= self.cables.len() {
            return Err(SequencerError::InvalidState(format!("no cable {}", cable_id)));
        }
        self.cables.remove(cable_id);
        self.invalidate();
        Ok(())
    }

    pub fn set_param(&mut self, node: NodeId, param: ParamId, value: f64) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.module.set_param(param, value);
        }
    }

    pub fn get_param(&self, node: NodeId, param: ParamId) -> Option<f64> {
        self.nodes.get(node).and_then(|n| n.module.get_param(param))
    }

    /// Output voltage written on the last tick
    pub fn output(&self, port: PortRef) -> Option<f64> {
        self.buffers.get(&port).copied()
    }

    pub fn light(&self, node: NodeId, light: LightId) -> Option<f64> {
        self.nodes.get(node).and_then(|n| n.module.light(light))
    }

    pub fn get_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).map(|n| n.name.as_str())
    }

    pub fn module(&self, node: NodeId) -> Option<&dyn GraphModule> {
        self.nodes.get(node).map(|n| n.module.as_ref())
    }

    pub fn module_mut(&mut self, node: NodeId) -> Option<&mut (dyn GraphModule + 'static)> {
        self.nodes.get_mut(node).map(|n| n.module.as_mut())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn cable_count(&self) -> usize {
        self.cables.len()
    }

    pub fn cables(&self) -> &[Cable] {
        &self.cables
    }

    /// Execution order (after compile)
    pub fn execution_order(&self) -> &[NodeId] {
        &self.execution_order
    }

    fn invalidate(&mut self) {
        self.execution_order.clear();
        self.compiled = false;
        self.cycle_reported = false;
    }

    fn validate_output_port(&self, port_ref: PortRef) -> Result<(), SequencerError> {
        let node = self.nodes.get(port_ref.node).ok_or(SequencerError::UnknownNode)?;
        node.module
            .port_spec()
            .output_by_id(port_ref.port)
            .ok_or(SequencerError::InvalidPort(port_ref.port))?;
        Ok(())
    }

    fn validate_input_port(&self, port_ref: PortRef) -> Result<(), SequencerError> {
        let node = self.nodes.get(port_ref.node).ok_or(SequencerError::UnknownNode)?;
        node.module
            .port_spec()
            .input_by_id(port_ref.port)
            .ok_or(SequencerError::InvalidPort(port_ref.port))?;
        Ok(())
    }

    /// Sort the nodes so every module runs after the modules feeding it
    pub fn compile(&mut self) -> Result<(), SequencerError> {
        let order = self.topological_sort()?;
        log::debug!("rack: compiled {} nodes, {} cables", order.len(), self.cables.len());
        self.execution_order = order;
        self.compiled = true;
        Ok(())
    }

    fn topological_sort(&self) -> Result<Vec<NodeId>, SequencerError> {
        let mut in_degree: StdMap<NodeId, usize> = self.nodes.keys().map(|k| (k, 0)).collect();
        let mut successors: StdMap<NodeId, Vec<NodeId>> =
            self.nodes.keys().map(|k| (k, vec![])).collect();

        for cable in &self.cables {
            *in_degree.entry(cable.to.node).or_insert(0) += 1;
            successors.entry(cable.from.node).or_default().push(cable.to.node);
        }

        // Kahn's algorithm, seeded in insertion order
        let mut queue: VecDeque<NodeId> = self
            .nodes
            .keys()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(node) = queue.pop_front() {
            result.push(node);
            if let Some(next) = successors.get(&node) {
                for succ in next {
                    if let Some(deg) = in_degree.get_mut(succ) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(*succ);
                        }
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            let nodes = in_degree.values().filter(|&&deg| deg > 0).count();
            return Err(SequencerError::CycleDetected { nodes });
        }
        Ok(result)
    }

    /// Run every module once. Compiles first if the topology changed; a
    /// rack that does not compile is left silent until the next edit.
    pub fn tick(&mut self) {
        if !self.compiled {
            if self.cycle_reported {
                return;
            }
            if let Err(e) = self.compile() {
                log::warn!("rack: not ticking until the cables change, {}", e);
                self.cycle_reported = true;
                return;
            }
        }
        for i in 0..self.execution_order.len() {
            let node_id = self.execution_order[i];
            let inputs = self.gather_inputs(node_id);
            let mut outputs = PortValues::new();
            if let Some(node) = self.nodes.get_mut(node_id) {
                node.module.tick(&inputs, &mut outputs);
            }
            for (&port, &value) in &outputs.values {
                self.buffers.insert(PortRef { node: node_id, port }, value);
            }
        }
    }

    fn gather_inputs(&self, node_id: NodeId) -> PortValues {
        let mut values = PortValues::new();
        let node = match self.nodes.get(node_id) {
            Some(n) => n,
            None => return values,
        };
        let spec = node.module.port_spec();
        for cable in self.cables.iter().filter(|c| c.to.node == node_id) {
            let value = self.buffers.get(&cable.from).copied().unwrap_or(0.0);
            match spec.input_by_id(cable.to.port) {
                Some(def) if def.kind.is_summable() => values.accumulate(cable.to.port, value),
                _ => values.merge_max(cable.to.port, value),
            }
        }
        values
    }

    /// Reset every module and zero the cable buffers
    pub fn reset(&mut self) {
        for (_, node) in &mut self.nodes {
            node.module.reset();
        }
        for value in self.buffers.values_mut() {
            *value = 0.0;
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &str, &dyn GraphModule)> {
        self.nodes
            .iter()
            .map(|(id, node)| (id, node.name.as_str(), node.module.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{m581, pwm_clock, M581, PwmClock};
    use crate::port::{PortDef, SignalKind, GATE_HIGH};

    // Copies its input, remembering whether it was patched
    struct Probe {
        spec: PortSpec,
        patched: bool,
    }

    impl Probe {
        fn new(kind: SignalKind) -> Self {
            Self {
                spec: PortSpec {
                    inputs: vec![PortDef::new(0, "in", kind)],
                    outputs: vec![PortDef::new(10, "out", kind)],
                },
                patched: false,
            }
        }
    }

    impl GraphModule for Probe {
        fn port_spec(&self) -> &PortSpec {
            &self.spec
        }

        fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
            self.patched = inputs.has(0);
            outputs.set(10, inputs.get_or(0, 1.0));
        }

        fn reset(&mut self) {}

        fn set_sample_rate(&mut self, _: f64) {}
    }

    #[test]
    fn test_add_and_connect() {
        let mut rack = Rack::new(1000.0);
        let a = rack.add("a", Probe::new(SignalKind::CvUnipolar));
        let b = rack.add("b", Probe::new(SignalKind::CvUnipolar));
        assert_eq!(rack.node_count(), 2);
        assert_eq!(rack.get_name(a.id()), Some("a"));
        rack.connect(a.out("out").unwrap(), b.in_("in").unwrap()).unwrap();
        assert_eq!(rack.cable_count(), 1);
    }

    #[test]
    fn test_unknown_ports_and_nodes() {
        let mut rack = Rack::new(1000.0);
        let a = rack.add("a", Probe::new(SignalKind::Gate));
        let b = rack.add("b", Probe::new(SignalKind::Gate));
        assert!(matches!(a.out("nope"), Err(SequencerError::UnknownPort(_))));
        let bad = PortRef { node: b.id(), port: 99 };
        assert_eq!(
            rack.connect(a.out("out").unwrap(), bad),
            Err(SequencerError::InvalidPort(99))
        );
        // outputs cannot be used as inputs
        assert!(rack.connect(a.out("out").unwrap(), b.out("out").unwrap()).is_err());
        rack.remove(b.id()).unwrap();
        assert_eq!(rack.remove(b.id()), Err(SequencerError::UnknownNode));
    }

    #[test]
    fn test_topological_order() {
        let mut rack = Rack::new(1000.0);
        let c = rack.add("c", Probe::new(SignalKind::CvUnipolar));
        let b = rack.add("b", Probe::new(SignalKind::CvUnipolar));
        let a = rack.add("a", Probe::new(SignalKind::CvUnipolar));
        rack.connect(a.out("out").unwrap(), b.in_("in").unwrap()).unwrap();
        rack.connect(b.out("out").unwrap(), c.in_("in").unwrap()).unwrap();
        rack.compile().unwrap();
        let order = rack.execution_order();
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(a.id()) < pos(b.id()));
        assert!(pos(b.id()) < pos(c.id()));
    }

    #[test]
    fn test_cycle_detection() {
        let mut rack = Rack::new(1000.0);
        let a = rack.add("a", Probe::new(SignalKind::CvUnipolar));
        let b = rack.add("b", Probe::new(SignalKind::CvUnipolar));
        rack.connect(a.out("out").unwrap(), b.in_("in").unwrap()).unwrap();
        rack.connect(b.out("out").unwrap(), a.in_("in").unwrap()).unwrap();
        assert_eq!(rack.compile(), Err(SequencerError::CycleDetected { nodes: 2 }));
        // ticking a cyclic rack is a silent no-op
        rack.tick();
        assert_eq!(rack.output(a.out("out").unwrap()), None);
    }

    #[test]
    fn test_cyclic_rack_stays_silent_until_edited() {
        let mut rack = Rack::new(1000.0);
        let a = rack.add("a", Probe::new(SignalKind::CvUnipolar));
        let b = rack.add("b", Probe::new(SignalKind::CvUnipolar));
        rack.connect(a.out("out").unwrap(), b.in_("in").unwrap()).unwrap();
        rack.tick();
        assert_eq!(rack.output(b.out("out").unwrap()), Some(1.0));

        let feedback = rack.connect(b.out("out").unwrap(), a.in_("in").unwrap()).unwrap();
        for _ in 0..100 {
            rack.tick();
        }
        assert!(rack.cycle_reported);
        assert!(!rack.compiled);
        assert_eq!(rack.output(a.out("out").unwrap()), Some(1.0));
        assert_eq!(rack.output(b.out("out").unwrap()), Some(1.0));

        rack.disconnect(feedback).unwrap();
        assert!(!rack.cycle_reported);
        rack.tick();
        assert!(rack.compiled);
        assert_eq!(rack.execution_order(), &[a.id(), b.id()]);
    }

    #[test]
    fn test_cv_inputs_sum_and_gates_merge() {
        let mut rack = Rack::new(1000.0);
        let a = rack.add("a", Probe::new(SignalKind::CvUnipolar));
        let b = rack.add("b", Probe::new(SignalKind::CvUnipolar));
        let sum = rack.add("sum", Probe::new(SignalKind::CvUnipolar));
        let gate = rack.add("gate", Probe::new(SignalKind::Gate));
        for src in [&a, &b] {
            rack.connect(src.out("out").unwrap(), sum.in_("in").unwrap()).unwrap();
            rack.connect(src.out("out").unwrap(), gate.in_("in").unwrap()).unwrap();
        }
        rack.tick();
        assert_eq!(rack.output(sum.out("out").unwrap()), Some(2.0));
        assert_eq!(rack.output(gate.out("out").unwrap()), Some(1.0));
    }

    #[test]
    fn test_unpatched_inputs_are_absent() {
        let mut rack = Rack::new(1000.0);
        let a = rack.add("a", Probe::new(SignalKind::CvUnipolar));
        rack.tick();
        // Probe falls back to 1.0 when nothing is patched
        assert_eq!(rack.output(a.out("out").unwrap()), Some(1.0));
    }

    #[test]
    fn test_disconnect_and_mult() {
        let mut rack = Rack::new(1000.0);
        let a = rack.add("a", Probe::new(SignalKind::Gate));
        let b = rack.add("b", Probe::new(SignalKind::Gate));
        let c = rack.add("c", Probe::new(SignalKind::Gate));
        let ids = rack
            .mult(a.out("out").unwrap(), &[b.in_("in").unwrap(), c.in_("in").unwrap()])
            .unwrap();
        assert_eq!(ids, vec![0, 1]);
        rack.disconnect(0).unwrap();
        assert_eq!(rack.cable_count(), 1);
        assert!(rack.disconnect(5).is_err());
    }

    #[test]
    fn test_clock_drives_m581() {
        let mut rack = Rack::new(1000.0);
        let clock = rack.add("clock", PwmClock::new(1000.0));
        let seq = rack.add("seq", M581::new(1000.0));
        rack.set_param(clock.id(), pwm_clock::BPM, 220.0);
        // 1/16 at 220 bpm is about 68 ms
        rack.connect(clock.out("1_16").unwrap(), seq.in_("clock").unwrap())
            .unwrap();

        let gate = seq.out("gate").unwrap();
        let mut steps = Vec::new();
        let mut high_ticks = 0;
        for _ in 0..1000 {
            rack.tick();
            if rack.output(gate) == Some(GATE_HIGH) {
                high_ticks += 1;
            }
            let step = (0..8)
                .position(|k| rack.light(seq.id(), m581::LIGHT_STEP + k) == Some(10.0))
                .unwrap();
            if steps.last() != Some(&step) {
                steps.push(step);
            }
        }
        assert_eq!(&steps[..5], &[0, 1, 2, 3, 4]);
        assert!(high_ticks > 0);
    }
}
