//! Devices and the automata instances deployed on them.

use crate::engine::error::EngineError;
use crate::engine::host::GuardActionHost;
use crate::engine::instance::{AutomataInstance, InstanceKey, RunState};
use crate::model::{Automata, TransitionId, TypedValue};
use crate::snapshot::{
    CaptureFrame, CommunicationEvent, ConnectionStatus, DeviceSnapshotState, EventKind,
    ExecutionSnapshot, NetworkEvent, Severity,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

struct Device {
    connection: ConnectionStatus,
    instances: BTreeMap<String, AutomataInstance>,
}

/// What happened during one fleet-wide tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FleetTick {
    pub ticked: Vec<InstanceKey>,
    pub fired: BTreeMap<InstanceKey, TransitionId>,
    pub faulted: Vec<InstanceKey>,
}

/// Every device and instance under one scheduler.
///
/// Instances tick sequentially in key order. Outputs written on an
/// automata-level output channel are delivered, after all instances have
/// ticked, as inputs to every other instance declaring that channel as an
/// automata-level input.
#[derive(Default)]
pub struct Fleet {
    devices: BTreeMap<String, Device>,
    pending_communications: Vec<CommunicationEvent>,
    pending_events: Vec<NetworkEvent>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device. Returns `false` if it already exists.
    pub fn add_device(&mut self, device_id: impl Into<String>) -> bool {
        let device_id = device_id.into();
        if self.devices.contains_key(&device_id) {
            return false;
        }
        self.devices.insert(
            device_id,
            Device {
                connection: ConnectionStatus::Connected,
                instances: BTreeMap::new(),
            },
        );
        true
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Deploy an automata onto a device as a new, stopped instance.
    pub fn deploy(
        &mut self,
        device_id: &str,
        automata: Arc<Automata>,
    ) -> Result<InstanceKey, EngineError> {
        let device = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| EngineError::UnknownDevice(device_id.to_string()))?;

        let key = InstanceKey::new(device_id, automata.id());
        if device.instances.contains_key(&key.automata_id) {
            return Err(EngineError::DuplicateInstance(key));
        }

        device.instances.insert(
            key.automata_id.clone(),
            AutomataInstance::new(device_id, automata),
        );
        tracing::debug!(instance = %key, "automata deployed");
        Ok(key)
    }

    pub fn instance(&self, key: &InstanceKey) -> Option<&AutomataInstance> {
        self.devices
            .get(&key.device_id)
            .and_then(|d| d.instances.get(&key.automata_id))
    }

    pub fn instances(&self) -> impl Iterator<Item = &AutomataInstance> {
        self.devices.values().flat_map(|d| d.instances.values())
    }

    fn instance_mut(&mut self, key: &InstanceKey) -> Result<&mut AutomataInstance, EngineError> {
        self.devices
            .get_mut(&key.device_id)
            .and_then(|d| d.instances.get_mut(&key.automata_id))
            .ok_or_else(|| EngineError::UnknownInstance(key.clone()))
    }

    pub fn start(&mut self, key: &InstanceKey) -> Result<(), EngineError> {
        self.instance_mut(key)?.start()?;
        self.lifecycle_event(key, "started");
        Ok(())
    }

    pub fn pause(&mut self, key: &InstanceKey) -> Result<(), EngineError> {
        self.instance_mut(key)?.pause()?;
        self.lifecycle_event(key, "paused");
        Ok(())
    }

    pub fn resume(&mut self, key: &InstanceKey) -> Result<(), EngineError> {
        self.instance_mut(key)?.resume()?;
        self.lifecycle_event(key, "resumed");
        Ok(())
    }

    pub fn stop(&mut self, key: &InstanceKey) -> Result<(), EngineError> {
        self.instance_mut(key)?.stop()?;
        self.lifecycle_event(key, "stopped");
        Ok(())
    }

    /// Start every stopped instance.
    pub fn start_all(&mut self) {
        let stopped: Vec<InstanceKey> = self
            .instances()
            .filter(|i| i.run_state() == RunState::Stopped)
            .map(|i| i.key().clone())
            .collect();
        for key in stopped {
            if let Err(err) = self.start(&key) {
                tracing::warn!(instance = %key, error = %err, "failed to start instance");
            }
        }
    }

    pub fn set_input(
        &mut self,
        key: &InstanceKey,
        name: impl Into<String>,
        value: impl Into<TypedValue>,
    ) -> Result<(), EngineError> {
        self.instance_mut(key)?.set_input(name, value);
        Ok(())
    }

    /// Record a connectivity change. Disconnected devices do not tick.
    pub fn set_connection(
        &mut self,
        device_id: &str,
        status: ConnectionStatus,
    ) -> Result<(), EngineError> {
        let device = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| EngineError::UnknownDevice(device_id.to_string()))?;
        if device.connection == status {
            return Ok(());
        }
        device.connection = status;

        let severity = match status {
            ConnectionStatus::Connected => Severity::Info,
            ConnectionStatus::Disconnected => Severity::Warning,
        };
        tracing::info!(device = device_id, ?status, "device connection changed");
        self.pending_events.push(NetworkEvent::new(
            severity,
            EventKind::ConnectionChanged,
            device_id,
            format!("device {device_id} is now {status:?}"),
        ));
        Ok(())
    }

    /// Tick every running instance on every connected device once.
    pub fn tick(&mut self, host: &dyn GuardActionHost) -> FleetTick {
        let mut report = FleetTick::default();
        let mut outbound: Vec<(InstanceKey, BTreeMap<String, TypedValue>)> = Vec::new();

        for device in self.devices.values_mut() {
            if device.connection == ConnectionStatus::Disconnected {
                continue;
            }
            for instance in device.instances.values_mut() {
                if instance.run_state() != RunState::Running {
                    continue;
                }
                let key = instance.key().clone();
                match instance.tick(host) {
                    Ok(outcome) => {
                        if let Some(transition) = outcome.fired {
                            report.fired.insert(key.clone(), transition);
                        }
                        if !outcome.events.is_empty() && outcome.snapshot.is_faulted() {
                            report.faulted.push(key.clone());
                        }
                        self.pending_events.extend(outcome.events);

                        let channels = instance.automata().outputs();
                        let routed: BTreeMap<String, TypedValue> = outcome
                            .emitted
                            .into_iter()
                            .filter(|(name, _)| channels.contains(name))
                            .collect();
                        if !routed.is_empty() {
                            outbound.push((key.clone(), routed));
                        }
                        report.ticked.push(key);
                    }
                    Err(err) => {
                        tracing::error!(instance = %key, error = %err, "tick failed");
                        self.pending_events.push(NetworkEvent::for_instance(
                            Severity::Error,
                            EventKind::ScriptFailure,
                            &key,
                            err.to_string(),
                        ));
                    }
                }
            }
        }

        for (from, emitted) in outbound {
            self.route(&from, emitted);
        }
        report
    }

    fn route(&mut self, from: &InstanceKey, emitted: BTreeMap<String, TypedValue>) {
        for (channel, value) in emitted {
            let receivers: Vec<InstanceKey> = self
                .instances()
                .filter(|i| i.key() != from && i.automata().inputs().contains(&channel))
                .map(|i| i.key().clone())
                .collect();

            for to in receivers {
                let Some(device) = self.devices.get_mut(&to.device_id) else {
                    continue;
                };
                if device.connection == ConnectionStatus::Disconnected {
                    self.pending_events.push(NetworkEvent::for_instance(
                        Severity::Warning,
                        EventKind::MessageDropped,
                        &to,
                        format!("'{channel}' from {from} dropped: device offline"),
                    ));
                    continue;
                }
                if let Some(instance) = device.instances.get_mut(&to.automata_id) {
                    instance.set_input(channel.clone(), value.clone());
                }
                self.pending_communications.push(CommunicationEvent {
                    timestamp: Utc::now(),
                    from: from.clone(),
                    to,
                    channel: channel.clone(),
                    value: value.clone(),
                });
            }
        }
    }

    fn lifecycle_event(&mut self, key: &InstanceKey, verb: &str) {
        self.pending_events.push(NetworkEvent::for_instance(
            Severity::Info,
            EventKind::Lifecycle,
            key,
            format!("instance {key} {verb}"),
        ));
    }

    /// Gather the latest published snapshots and drain pending events.
    pub fn take_frame(&mut self) -> CaptureFrame {
        let mut executions = Vec::new();
        let mut devices = Vec::new();

        for (device_id, device) in &self.devices {
            let latest: Vec<Arc<ExecutionSnapshot>> =
                device.instances.values().map(|i| i.latest()).collect();
            devices.push(DeviceSnapshotState::summarize(
                device_id.clone(),
                device.connection,
                latest.iter().map(Arc::as_ref),
            ));
            executions.extend(latest);
        }

        CaptureFrame {
            executions,
            devices,
            communications: std::mem::take(&mut self.pending_communications),
            events: std::mem::take(&mut self.pending_events),
        }
    }
}
