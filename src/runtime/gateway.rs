//! Gateway between running instances and the network.
//!
//! A [`Gateway`] supplies inputs, accepts emitted outputs and reports
//! device connectivity. [`LoopbackGateway`] keeps all of it in memory and
//! routes outputs to every instance subscribed to the channel.

use crate::engine::InstanceKey;
use crate::model::TypedValue;
use crate::snapshot::{CommunicationEvent, ConnectionStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("instance {0} is not registered with the gateway")]
    UnknownInstance(InstanceKey),
}

/// Transport between running instances and the outside world.
///
/// The station awaits the gateway between ticks, so a slow implementation
/// slows only the instance it is serving.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Announce an instance and the input channels it listens on.
    async fn register(
        &self,
        key: &InstanceKey,
        inputs: &BTreeSet<String>,
    ) -> Result<(), GatewayError>;

    /// Inputs that arrived for an instance since the last call.
    async fn fetch_inputs(
        &self,
        key: &InstanceKey,
    ) -> Result<Vec<(String, TypedValue)>, GatewayError>;

    /// Hand over outputs an instance wrote on its output channels.
    async fn deliver_outputs(
        &self,
        from: &InstanceKey,
        outputs: &BTreeMap<String, TypedValue>,
    ) -> Result<(), GatewayError>;

    async fn device_status(&self, device_id: &str) -> Result<ConnectionStatus, GatewayError>;

    /// Channel messages delivered since the last call.
    async fn drain_communications(&self) -> Result<Vec<CommunicationEvent>, GatewayError>;
}

#[derive(Default)]
struct LoopbackState {
    subscriptions: BTreeMap<String, BTreeSet<InstanceKey>>,
    pending: BTreeMap<InstanceKey, Vec<(String, TypedValue)>>,
    statuses: BTreeMap<String, ConnectionStatus>,
    observed: Vec<CommunicationEvent>,
}

impl LoopbackState {
    fn is_connected(&self, device_id: &str) -> bool {
        !matches!(
            self.statuses.get(device_id),
            Some(ConnectionStatus::Disconnected)
        )
    }
}

/// In-process gateway that routes outputs straight to subscribed inputs.
///
/// Devices are connected unless marked otherwise. Messages for a
/// disconnected device are dropped.
#[derive(Default)]
pub struct LoopbackGateway {
    state: Mutex<LoopbackState>,
}

impl LoopbackGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an input for an instance, as if sent from outside.
    pub async fn push_input(
        &self,
        key: &InstanceKey,
        name: impl Into<String>,
        value: impl Into<TypedValue>,
    ) {
        let mut state = self.state.lock().await;
        state
            .pending
            .entry(key.clone())
            .or_default()
            .push((name.into(), value.into()));
    }

    /// Mark a device connected or disconnected.
    pub async fn set_status(&self, device_id: impl Into<String>, status: ConnectionStatus) {
        self.state.lock().await.statuses.insert(device_id.into(), status);
    }
}

#[async_trait]
impl Gateway for LoopbackGateway {
    async fn register(
        &self,
        key: &InstanceKey,
        inputs: &BTreeSet<String>,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        for channel in inputs {
            state
                .subscriptions
                .entry(channel.clone())
                .or_default()
                .insert(key.clone());
        }
        state.pending.entry(key.clone()).or_default();
        Ok(())
    }

    async fn fetch_inputs(
        &self,
        key: &InstanceKey,
    ) -> Result<Vec<(String, TypedValue)>, GatewayError> {
        let mut state = self.state.lock().await;
        state
            .pending
            .get_mut(key)
            .map(std::mem::take)
            .ok_or_else(|| GatewayError::UnknownInstance(key.clone()))
    }

    async fn deliver_outputs(
        &self,
        from: &InstanceKey,
        outputs: &BTreeMap<String, TypedValue>,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        for (channel, value) in outputs {
            let receivers: Vec<InstanceKey> = state
                .subscriptions
                .get(channel)
                .into_iter()
                .flatten()
                .filter(|to| *to != from)
                .cloned()
                .collect();

            for to in receivers {
                if !state.is_connected(&to.device_id) {
                    tracing::debug!(%from, %to, channel = %channel, "dropping message for offline device");
                    continue;
                }
                state
                    .pending
                    .entry(to.clone())
                    .or_default()
                    .push((channel.clone(), value.clone()));
                state.observed.push(CommunicationEvent {
                    timestamp: Utc::now(),
                    from: from.clone(),
                    to,
                    channel: channel.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    async fn device_status(&self, device_id: &str) -> Result<ConnectionStatus, GatewayError> {
        let state = self.state.lock().await;
        Ok(state.statuses.get(device_id).copied().unwrap_or_default())
    }

    async fn drain_communications(&self) -> Result<Vec<CommunicationEvent>, GatewayError> {
        Ok(std::mem::take(&mut self.state.lock().await.observed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn routes_outputs_to_subscribers() {
        let gateway = LoopbackGateway::new();
        let from = InstanceKey::new("a", "sender");
        let to = InstanceKey::new("b", "receiver");
        gateway.register(&from, &channels(&[])).await.unwrap();
        gateway.register(&to, &channels(&["ping"])).await.unwrap();

        let mut outputs = BTreeMap::new();
        outputs.insert("ping".to_string(), TypedValue::Bool(true));
        outputs.insert("unheard".to_string(), TypedValue::Int(1));
        gateway.deliver_outputs(&from, &outputs).await.unwrap();

        let inputs = gateway.fetch_inputs(&to).await.unwrap();
        assert_eq!(inputs, vec![("ping".to_string(), TypedValue::Bool(true))]);
        assert!(gateway.fetch_inputs(&to).await.unwrap().is_empty());

        let observed = gateway.drain_communications().await.unwrap();
        assert_eq!(observed.len(), 1);
        assert_eq!(observed[0].to, to);
        assert!(gateway.drain_communications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_devices_miss_messages() {
        let gateway = LoopbackGateway::new();
        let from = InstanceKey::new("a", "sender");
        let to = InstanceKey::new("b", "receiver");
        gateway.register(&to, &channels(&["ping"])).await.unwrap();
        gateway.set_status("b", ConnectionStatus::Disconnected).await;

        let mut outputs = BTreeMap::new();
        outputs.insert("ping".to_string(), TypedValue::Bool(true));
        gateway.deliver_outputs(&from, &outputs).await.unwrap();

        assert_eq!(
            gateway.device_status("b").await.unwrap(),
            ConnectionStatus::Disconnected
        );
        assert_eq!(
            gateway.device_status("a").await.unwrap(),
            ConnectionStatus::Connected
        );
        assert!(gateway.fetch_inputs(&to).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unregistered_instance_is_an_error() {
        let gateway = LoopbackGateway::new();
        let key = InstanceKey::new("a", "ghost");

        assert_eq!(
            gateway.fetch_inputs(&key).await.unwrap_err(),
            GatewayError::UnknownInstance(key)
        );
    }
}
