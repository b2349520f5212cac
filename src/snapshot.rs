//! Immutable snapshot values.
//!
//! Snapshots are created once and never mutated. The engine publishes an
//! [`ExecutionSnapshot`] at the end of every tick; the recorder bundles the
//! latest ones into a [`NetworkSnapshot`] per captured frame.

use crate::engine::{InstanceKey, RunState};
use crate::model::{StateId, TransitionId, TypedValue, ERROR_STATE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// State of one automata instance at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    pub instance: InstanceKey,
    pub timestamp: DateTime<Utc>,
    /// Number of transitions fired since the instance was created or reset.
    pub execution_cycle: u64,
    pub current_state: StateId,
    pub previous_state: Option<StateId>,
    pub last_transition: Option<TransitionId>,
    pub variables: BTreeMap<String, TypedValue>,
    pub inputs: BTreeMap<String, TypedValue>,
    pub outputs: BTreeMap<String, TypedValue>,
    pub run_state: RunState,
}

impl ExecutionSnapshot {
    /// Whether the instance has fallen into the error sink.
    pub fn is_faulted(&self) -> bool {
        self.current_state == ERROR_STATE
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// A guard or action body raised a script error.
    ScriptFailure,
    /// A device connected or disconnected.
    ConnectionChanged,
    /// An instance was started, paused, resumed or stopped.
    Lifecycle,
    /// A channel message could not be delivered.
    MessageDropped,
}

/// Error, warning or status change observed during a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub kind: EventKind,
    pub device_id: String,
    pub instance: Option<InstanceKey>,
    pub message: String,
}

impl NetworkEvent {
    pub fn new(
        severity: Severity,
        kind: EventKind,
        device_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            kind,
            device_id: device_id.into(),
            instance: None,
            message: message.into(),
        }
    }

    pub fn for_instance(
        severity: Severity,
        kind: EventKind,
        key: &InstanceKey,
        message: impl Into<String>,
    ) -> Self {
        Self {
            instance: Some(key.clone()),
            ..Self::new(severity, kind, key.device_id.clone(), message)
        }
    }
}

/// A value carried over an inter-automata channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationEvent {
    pub timestamp: DateTime<Utc>,
    pub from: InstanceKey,
    pub to: InstanceKey,
    pub channel: String,
    pub value: TypedValue,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Connected,
    Disconnected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceHealth {
    Healthy,
    /// At least one instance is in the error sink.
    Degraded,
    Offline,
}

/// Per-device health and metrics for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshotState {
    pub device_id: String,
    pub connection: ConnectionStatus,
    pub health: DeviceHealth,
    pub instance_count: usize,
    pub running: usize,
    pub faulted: usize,
    pub total_cycles: u64,
}

impl DeviceSnapshotState {
    /// Derive a device summary from its instances' latest snapshots.
    pub fn summarize<'a>(
        device_id: impl Into<String>,
        connection: ConnectionStatus,
        executions: impl IntoIterator<Item = &'a ExecutionSnapshot>,
    ) -> Self {
        let mut state = Self {
            device_id: device_id.into(),
            connection,
            health: DeviceHealth::Healthy,
            instance_count: 0,
            running: 0,
            faulted: 0,
            total_cycles: 0,
        };

        for execution in executions {
            state.instance_count += 1;
            state.total_cycles += execution.execution_cycle;
            if execution.run_state == RunState::Running {
                state.running += 1;
            }
            if execution.is_faulted() {
                state.faulted += 1;
            }
        }

        state.health = match (connection, state.faulted) {
            (ConnectionStatus::Disconnected, _) => DeviceHealth::Offline,
            (_, 0) => DeviceHealth::Healthy,
            _ => DeviceHealth::Degraded,
        };
        state
    }
}

/// Everything gathered for one frame, before the recorder numbers it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureFrame {
    pub executions: Vec<Arc<ExecutionSnapshot>>,
    pub devices: Vec<DeviceSnapshotState>,
    pub communications: Vec<CommunicationEvent>,
    pub events: Vec<NetworkEvent>,
}

/// Consistent cross-device capture at one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSnapshot {
    /// Global, monotonic, 1-based frame number within the session.
    pub frame_number: u64,
    pub timestamp: DateTime<Utc>,
    pub executions: Vec<Arc<ExecutionSnapshot>>,
    pub devices: Vec<DeviceSnapshotState>,
    pub communications: Vec<CommunicationEvent>,
    pub events: Vec<NetworkEvent>,
}

impl NetworkSnapshot {
    pub fn from_capture(frame_number: u64, timestamp: DateTime<Utc>, frame: CaptureFrame) -> Self {
        Self {
            frame_number,
            timestamp,
            executions: frame.executions,
            devices: frame.devices,
            communications: frame.communications,
            events: frame.events,
        }
    }

    pub fn execution(&self, key: &InstanceKey) -> Option<&ExecutionSnapshot> {
        self.executions
            .iter()
            .map(Arc::as_ref)
            .find(|e| &e.instance == key)
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceSnapshotState> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    pub fn events_at(&self, severity: Severity) -> impl Iterator<Item = &NetworkEvent> {
        self.events.iter().filter(move |e| e.severity == severity)
    }

    pub fn has_errors(&self) -> bool {
        self.events_at(Severity::Error).next().is_some()
    }
}
