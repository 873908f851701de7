//! Controller bridge
//!
//! Mirrors module parameters and lights onto an external grid controller
//! and feeds the controller's edits back in. The bridge sits entirely
//! outside the sequencing engines: it only uses `get_param`, `set_param`
//! and `light` from [`GraphModule`], so a controller edit is
//! indistinguishable from any other parameter change.
//!
//! Both directions are queues. The controller side holds a
//! [`ControllerPort`]; the host calls [`ControllerBridge::poll`] between
//! blocks of ticks, which drains incoming messages and publishes whatever
//! changed since the last poll.

use crate::error::SequencerError;
use crate::port::{GraphModule, LightId, ParamId};
use crate::StdMap;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

/// Identifier of a physical control (key, pad or LED) on the controller
pub type ControlId = u32;

/// What a control is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Editable parameter, mirrored back to the control
    Param(ParamId),
    /// Read-only light
    Light(LightId),
}

/// Controller to module
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// A control was moved or pressed
    Set { control: ControlId, value: f64 },
    /// The device came online; the bridge resends every bound value
    Connected,
    Disconnected,
}

/// Module to controller
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    ParamChanged { control: ControlId, value: f64 },
    LightChanged { control: ControlId, value: f64 },
    /// An incoming message could not be applied
    Rejected { control: ControlId, error: SequencerError },
}

/// Controller end of the bridge
pub struct ControllerPort {
    tx: Sender<ControlMessage>,
    rx: Receiver<ControlEvent>,
}

impl ControllerPort {
    pub fn send(&self, message: ControlMessage) -> Result<(), SequencerError> {
        self.tx
            .send(message)
            .map_err(|_| SequencerError::InvalidState("controller bridge dropped".into()))
    }

    pub fn set(&self, control: ControlId, value: f64) -> Result<(), SequencerError> {
        self.send(ControlMessage::Set { control, value })
    }

    /// Events published since the last call
    pub fn events(&self) -> Vec<ControlEvent> {
        self.rx.try_iter().collect()
    }
}

/// Module end of the bridge
pub struct ControllerBridge {
    bindings: StdMap<ControlId, Target>,
    mirrored: StdMap<ControlId, f64>,
    incoming: Receiver<ControlMessage>,
    outgoing: Sender<ControlEvent>,
    connected: bool,
}

/// Create a connected bridge and controller port pair
pub fn bridge() -> (ControllerBridge, ControllerPort) {
    let (msg_tx, msg_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    (
        ControllerBridge {
            bindings: StdMap::new(),
            mirrored: StdMap::new(),
            incoming: msg_rx,
            outgoing: event_tx,
            connected: false,
        },
        ControllerPort {
            tx: msg_tx,
            rx: event_rx,
        },
    )
}

impl ControllerBridge {
    pub fn bind_param(&mut self, control: ControlId, param: ParamId) {
        self.bind(control, Target::Param(param));
    }

    pub fn bind_light(&mut self, control: ControlId, light: LightId) {
        self.bind(control, Target::Light(light));
    }

    fn bind(&mut self, control: ControlId, target: Target) {
        if let Some(old) = self.bindings.insert(control, target) {
            log::debug!("control {} rebound from {:?} to {:?}", control, old, target);
        }
        self.mirrored.remove(&control);
    }

    pub fn unbind(&mut self, control: ControlId) -> Option<Target> {
        self.mirrored.remove(&control);
        self.bindings.remove(&control)
    }

    pub fn binding(&self, control: ControlId) -> Option<Target> {
        self.bindings.get(&control).copied()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Apply queued controller messages to `module`, then publish every
    /// bound value that changed. Returns the number of events published.
    pub fn poll(&mut self, module: &mut dyn GraphModule) -> usize {
        let mut published = 0;
        loop {
            match self.incoming.try_recv() {
                Ok(ControlMessage::Set { control, value }) => {
                    if let Err(error) = self.apply(module, control, value) {
                        log::warn!("controller: {}", error);
                        published += self.publish(ControlEvent::Rejected { control, error });
                    }
                }
                Ok(ControlMessage::Connected) => {
                    log::info!("controller connected");
                    self.connected = true;
                    self.mirrored.clear();
                }
                Ok(ControlMessage::Disconnected) => {
                    log::info!("controller disconnected");
                    self.connected = false;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.connected {
                        log::info!("controller port dropped");
                    }
                    self.connected = false;
                    break;
                }
            }
        }

        if self.connected {
            published += self.mirror(module);
        }
        published
    }

    fn apply(&self, module: &mut dyn GraphModule, control: ControlId, value: f64) -> Result<(), SequencerError> {
        match self.bindings.get(&control) {
            Some(Target::Param(param)) => {
                if module.get_param(*param).is_none() {
                    return Err(SequencerError::UnknownParam(param.to_string()));
                }
                if !value.is_finite() {
                    return Err(SequencerError::InvalidParamValue { param: *param, value });
                }
                module.set_param(*param, value);
                Ok(())
            }
            Some(Target::Light(_)) => Err(SequencerError::InvalidState(format!(
                "control {} is bound to a light",
                control
            ))),
            None => Err(SequencerError::Unbound(control)),
        }
    }

    fn mirror(&mut self, module: &dyn GraphModule) -> usize {
        let mut changes = Vec::new();
        for (&control, &target) in &self.bindings {
            let (value, event) = match target {
                Target::Param(id) => match module.get_param(id) {
                    Some(v) => (v, ControlEvent::ParamChanged { control, value: v }),
                    None => continue,
                },
                Target::Light(id) => match module.light(id) {
                    Some(v) => (v, ControlEvent::LightChanged { control, value: v }),
                    None => continue,
                },
            };
            if self.mirrored.get(&control) != Some(&value) {
                changes.push((control, value, event));
            }
        }
        // deterministic order for the device
        changes.sort_by_key(|(control, _, _)| *control);

        let mut published = 0;
        for (control, value, event) in changes {
            self.mirrored.insert(control, value);
            published += self.publish(event);
        }
        published
    }

    fn publish(&mut self, event: ControlEvent) -> usize {
        match self.outgoing.send(event) {
            Ok(()) => 1,
            Err(_) => {
                log::debug!("controller event dropped, port is gone");
                self.connected = false;
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::modules::{m581, M581};
    use crate::port::{PortValues, LIGHT_ON};

    fn setup() -> (ControllerBridge, ControllerPort, M581) {
        let (mut bridge, port) = bridge();
        bridge.bind_param(1, m581::STEP_NOTE);
        bridge.bind_param(2, m581::RUN_MODE);
        bridge.bind_light(3, m581::LIGHT_STEP);
        bridge.bind_light(4, m581::LIGHT_STEP + 1);
        let m = M581::with_config(&EngineConfig::new(1000.0).with_seed(1));
        (bridge, port, m)
    }

    #[test]
    fn test_connect_sends_full_state() {
        let (mut bridge, port, mut m) = setup();
        port.send(ControlMessage::Connected).unwrap();
        assert_eq!(bridge.poll(&mut m), 4);
        assert!(bridge.is_connected());
        let events = port.events();
        assert_eq!(events[0], ControlEvent::ParamChanged { control: 1, value: 0.5 });
        assert_eq!(events[2], ControlEvent::LightChanged { control: 3, value: LIGHT_ON });
        // nothing changed since
        assert_eq!(bridge.poll(&mut m), 0);
    }

    #[test]
    fn test_controller_edits_reach_the_module() {
        let (mut bridge, port, mut m) = setup();
        port.send(ControlMessage::Connected).unwrap();
        bridge.poll(&mut m);
        port.events();

        port.set(2, 3.0).unwrap();
        bridge.poll(&mut m);
        assert_eq!(m.get_param(m581::RUN_MODE), Some(3.0));
        // the echo carries the clamped value
        port.set(1, 4.0).unwrap();
        bridge.poll(&mut m);
        let events = port.events();
        assert!(events.contains(&ControlEvent::ParamChanged { control: 1, value: 1.0 }));
    }

    #[test]
    fn test_lights_follow_the_sequencer() {
        let (mut bridge, port, mut m) = setup();
        port.send(ControlMessage::Connected).unwrap();
        bridge.poll(&mut m);
        port.events();

        let mut inputs = PortValues::new();
        let mut outputs = PortValues::new();
        for clock in [0.0, 10.0, 0.0, 10.0] {
            inputs.set(m581::IN_CLOCK, clock);
            m.tick(&inputs, &mut outputs);
        }
        bridge.poll(&mut m);
        let events = port.events();
        assert!(events.contains(&ControlEvent::LightChanged { control: 3, value: 0.0 }));
        assert!(events.contains(&ControlEvent::LightChanged { control: 4, value: LIGHT_ON }));
    }

    #[test]
    fn test_rejects_unbound_and_light_controls() {
        let (mut bridge, port, mut m) = setup();
        port.set(9, 1.0).unwrap();
        port.set(3, 1.0).unwrap();
        port.send(ControlMessage::Connected).unwrap();
        bridge.poll(&mut m);
        let events = port.events();
        assert_eq!(
            events[0],
            ControlEvent::Rejected { control: 9, error: SequencerError::Unbound(9) }
        );
        assert!(matches!(
            events[1],
            ControlEvent::Rejected { control: 3, error: SequencerError::InvalidState(_) }
        ));
    }

    #[test]
    fn test_no_mirroring_while_disconnected() {
        let (mut bridge, port, mut m) = setup();
        port.set(2, 1.0).unwrap();
        assert_eq!(bridge.poll(&mut m), 0);
        // edits still apply
        assert_eq!(m.get_param(m581::RUN_MODE), Some(1.0));

        port.send(ControlMessage::Connected).unwrap();
        port.send(ControlMessage::Disconnected).unwrap();
        assert_eq!(bridge.poll(&mut m), 0);
        assert!(!bridge.is_connected());
    }

    #[test]
    fn test_dropped_port_disconnects() {
        let (mut bridge, port, mut m) = setup();
        port.send(ControlMessage::Connected).unwrap();
        drop(port);
        bridge.poll(&mut m);
        assert!(!bridge.is_connected());
    }

    #[test]
    fn test_rebinding_resends() {
        let (mut bridge, port, mut m) = setup();
        port.send(ControlMessage::Connected).unwrap();
        bridge.poll(&mut m);
        port.events();
        bridge.bind_param(1, m581::SLIDE_TIME);
        assert_eq!(bridge.binding(1), Some(Target::Param(m581::SLIDE_TIME)));
        assert_eq!(bridge.poll(&mut m), 1);
        assert_eq!(bridge.unbind(4), Some(Target::Light(m581::LIGHT_STEP + 1)));
    }
}
