//! One automata instance running on one device.

use crate::engine::error::EngineError;
use crate::engine::host::{Effects, GuardActionHost, HostContext, ScriptError};
use crate::model::{Automata, StateId, TransitionId, TypedValue, VariableDecl, ERROR_STATE};
use crate::selector::{self, GuardResults};
use crate::snapshot::{EventKind, ExecutionSnapshot, NetworkEvent, Severity};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Identifies an instance: which automata on which device.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceKey {
    pub device_id: String,
    pub automata_id: String,
}

impl InstanceKey {
    pub fn new(device_id: impl Into<String>, automata_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            automata_id: automata_id.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.automata_id)
    }
}

/// Lifecycle of an instance.
///
/// `Stopped → Running ⇄ Paused → Stopped`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Stopped,
    Running,
    Paused,
}

/// Result of a single tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickOutcome {
    pub snapshot: Arc<ExecutionSnapshot>,
    /// Transition fired this tick, if any.
    pub fired: Option<TransitionId>,
    /// Outputs written by action bodies during this tick.
    pub emitted: BTreeMap<String, TypedValue>,
    pub events: Vec<NetworkEvent>,
}

/// Execution state of one automata instance.
///
/// The instance exclusively owns its mutable state. Readers only ever see
/// the immutable [`ExecutionSnapshot`] published at the end of a tick.
pub struct AutomataInstance {
    key: InstanceKey,
    automata: Arc<Automata>,
    run_state: RunState,
    current_state: StateId,
    previous_state: Option<StateId>,
    last_transition: Option<TransitionId>,
    cycle: u64,
    variables: BTreeMap<String, TypedValue>,
    inputs: BTreeMap<String, TypedValue>,
    outputs: BTreeMap<String, TypedValue>,
    latest: Arc<ExecutionSnapshot>,
}

impl AutomataInstance {
    /// Create a stopped instance sitting in the automata's initial state.
    pub fn new(device_id: impl Into<String>, automata: Arc<Automata>) -> Self {
        let key = InstanceKey::new(device_id, automata.id());
        let current_state = automata.initial_state().to_string();
        let (variables, inputs, outputs) = seed_values(&automata);

        let mut instance = Self {
            key,
            automata,
            run_state: RunState::Stopped,
            current_state,
            previous_state: None,
            last_transition: None,
            cycle: 0,
            variables,
            inputs,
            outputs,
            latest: Arc::new(placeholder_snapshot()),
        };
        instance.publish();
        instance
    }

    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    pub fn automata(&self) -> &Arc<Automata> {
        &self.automata
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    pub fn execution_cycle(&self) -> u64 {
        self.cycle
    }

    pub fn is_faulted(&self) -> bool {
        self.current_state == ERROR_STATE
    }

    pub fn variable(&self, name: &str) -> Option<&TypedValue> {
        self.variables.get(name)
    }

    pub fn output(&self, name: &str) -> Option<&TypedValue> {
        self.outputs.get(name)
    }

    /// The snapshot published by the last completed tick or lifecycle change.
    pub fn latest(&self) -> Arc<ExecutionSnapshot> {
        Arc::clone(&self.latest)
    }

    /// Inject an input value for the next tick.
    pub fn set_input(&mut self, name: impl Into<String>, value: impl Into<TypedValue>) {
        self.inputs.insert(name.into(), value.into());
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        self.transition_lifecycle(RunState::Stopped, RunState::Running, "start")
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.transition_lifecycle(RunState::Running, RunState::Paused, "pause")
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.transition_lifecycle(RunState::Paused, RunState::Running, "resume")
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        match self.run_state {
            RunState::Running | RunState::Paused => {
                self.run_state = RunState::Stopped;
                tracing::debug!(instance = %self.key, "instance stopped");
                self.publish();
                Ok(())
            }
            RunState::Stopped => Err(self.lifecycle_error("stop")),
        }
    }

    /// Return a stopped instance to its initial state with fresh values.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        if self.run_state != RunState::Stopped {
            return Err(self.lifecycle_error("reset"));
        }
        let (variables, inputs, outputs) = seed_values(&self.automata);
        self.current_state = self.automata.initial_state().to_string();
        self.previous_state = None;
        self.last_transition = None;
        self.cycle = 0;
        self.variables = variables;
        self.inputs = inputs;
        self.outputs = outputs;
        self.publish();
        Ok(())
    }

    /// Advance the instance by one cycle.
    ///
    /// Script failures do not surface as `Err`: they move the instance into
    /// the error sink and are reported as an error event in the outcome.
    pub fn tick(&mut self, host: &dyn GuardActionHost) -> Result<TickOutcome, EngineError> {
        if self.run_state != RunState::Running {
            return Err(EngineError::NotRunning {
                key: self.key.clone(),
                state: self.run_state,
            });
        }

        let mut emitted = BTreeMap::new();
        let mut events = Vec::new();
        let mut fired = None;

        if !self.is_faulted() {
            match self.advance(host, &mut emitted) {
                Ok(transition) => fired = transition,
                Err(err @ EngineError::UnknownState { .. }) => return Err(err),
                Err(err) => {
                    tracing::warn!(instance = %self.key, error = %err, "instance faulted");
                    events.push(NetworkEvent::for_instance(
                        Severity::Error,
                        EventKind::ScriptFailure,
                        &self.key,
                        err.to_string(),
                    ));
                    self.enter_error_sink();
                }
            }
        }

        let snapshot = self.publish();
        Ok(TickOutcome {
            snapshot,
            fired,
            emitted,
            events,
        })
    }

    fn advance(
        &mut self,
        host: &dyn GuardActionHost,
        emitted: &mut BTreeMap<String, TypedValue>,
    ) -> Result<Option<TransitionId>, EngineError> {
        let automata = Arc::clone(&self.automata);
        let state_id = self.current_state.clone();
        let state = automata
            .state_by_id(&state_id)
            .ok_or_else(|| EngineError::UnknownState {
                key: self.key.clone(),
                state: state_id.clone(),
            })?;

        if !state.code.is_empty() {
            self.run_action(host, &state_id, &state.code, emitted)?;
        }

        let mut guards = GuardResults::new();
        for transition in automata.transitions_from(&state_id) {
            let passed = self.guard_passes(host, &state_id, transition.guard_bodies())
                .map_err(|source| EngineError::GuardEvaluation {
                    key: self.key.clone(),
                    transition: transition.id.clone(),
                    source,
                })?;
            guards.insert(transition.id.clone(), passed);
        }

        let Some(transition) = selector::select(&automata, &state_id, &guards, self.cycle) else {
            return Ok(None);
        };

        if let Some(body) = transition.body.as_deref() {
            self.run_action(host, &state_id, body, emitted)?;
        }
        if let Some(on_exit) = state.on_exit.as_deref() {
            self.run_action(host, &state_id, on_exit, emitted)?;
        }
        if let Some(on_enter) = automata
            .state_by_id(&transition.to)
            .and_then(|s| s.on_enter.as_deref())
        {
            self.run_action(host, &transition.to, on_enter, emitted)?;
        }

        tracing::trace!(
            instance = %self.key,
            transition = %transition.id,
            from = %state_id,
            to = %transition.to,
            "transition fired"
        );
        self.previous_state = Some(state_id);
        self.current_state = transition.to.clone();
        self.last_transition = Some(transition.id.clone());
        self.cycle += 1;

        Ok(Some(transition.id.clone()))
    }

    fn context<'a>(&'a self, state_id: &'a str) -> HostContext<'a> {
        HostContext {
            automata_id: self.automata.id(),
            state_id,
            cycle: self.cycle,
            inputs: &self.inputs,
            variables: &self.variables,
        }
    }

    fn guard_passes(
        &self,
        host: &dyn GuardActionHost,
        state_id: &str,
        bodies: Vec<&str>,
    ) -> Result<bool, ScriptError> {
        let context = self.context(state_id);
        for body in bodies {
            if !host.evaluate(body, &context)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn run_action(
        &mut self,
        host: &dyn GuardActionHost,
        state_id: &str,
        body: &str,
        emitted: &mut BTreeMap<String, TypedValue>,
    ) -> Result<(), EngineError> {
        let effects = host
            .execute(body, &self.context(state_id))
            .map_err(|source| EngineError::ActionExecution {
                key: self.key.clone(),
                state: state_id.to_string(),
                source,
            })?;
        self.apply(effects, emitted);
        Ok(())
    }

    fn apply(&mut self, effects: Effects, emitted: &mut BTreeMap<String, TypedValue>) {
        self.variables.extend(effects.variables);
        for (name, value) in effects.outputs {
            self.outputs.insert(name.clone(), value.clone());
            emitted.insert(name, value);
        }
    }

    fn enter_error_sink(&mut self) {
        let failed_in = std::mem::replace(&mut self.current_state, ERROR_STATE.to_string());
        self.previous_state = Some(failed_in);
        self.last_transition = None;
        self.cycle += 1;
    }

    fn transition_lifecycle(
        &mut self,
        from: RunState,
        to: RunState,
        action: &'static str,
    ) -> Result<(), EngineError> {
        if self.run_state != from {
            return Err(self.lifecycle_error(action));
        }
        self.run_state = to;
        tracing::debug!(instance = %self.key, action, "instance lifecycle changed");
        self.publish();
        Ok(())
    }

    fn lifecycle_error(&self, action: &'static str) -> EngineError {
        EngineError::InvalidLifecycle {
            key: self.key.clone(),
            state: self.run_state,
            action,
        }
    }

    fn publish(&mut self) -> Arc<ExecutionSnapshot> {
        let snapshot = Arc::new(ExecutionSnapshot {
            instance: self.key.clone(),
            timestamp: Utc::now(),
            execution_cycle: self.cycle,
            current_state: self.current_state.clone(),
            previous_state: self.previous_state.clone(),
            last_transition: self.last_transition.clone(),
            variables: self.variables.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            run_state: self.run_state,
        });
        self.latest = Arc::clone(&snapshot);
        snapshot
    }
}

type Values = BTreeMap<String, TypedValue>;

/// Zero values for every typed declaration across all states.
fn seed_values(automata: &Automata) -> (Values, Values, Values) {
    let mut variables = Values::new();
    let mut inputs = Values::new();
    let mut outputs = Values::new();

    for state in automata.states() {
        let groups = [
            (&state.variables, &mut variables),
            (&state.inputs, &mut inputs),
            (&state.outputs, &mut outputs),
        ];
        for (declarations, values) in groups {
            for decl in declarations.iter().filter_map(|d| VariableDecl::parse(d)) {
                values
                    .entry(decl.name)
                    .or_insert_with(|| decl.var_type.zero_value());
            }
        }
    }

    (variables, inputs, outputs)
}

fn placeholder_snapshot() -> ExecutionSnapshot {
    ExecutionSnapshot {
        instance: InstanceKey::new("", ""),
        timestamp: Utc::now(),
        execution_cycle: 0,
        current_state: String::new(),
        previous_state: None,
        last_transition: None,
        variables: BTreeMap::new(),
        inputs: BTreeMap::new(),
        outputs: BTreeMap::new(),
        run_state: RunState::Stopped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{AutomataBuilder, StateBuilder, TransitionBuilder};
    use crate::engine::host::FnHost;

    /// Guards of the form `check("name")` read an input flag; `fail` bodies raise.
    fn scripted_host() -> FnHost {
        FnHost::new(
            |condition, ctx| {
                let name = condition
                    .strip_prefix("check(\"")
                    .and_then(|rest| rest.strip_suffix("\")"))
                    .ok_or_else(|| ScriptError::new(condition, "unknown guard"))?;
                Ok(ctx.input(name).is_some_and(TypedValue::is_truthy))
            },
            |action, ctx| match action {
                "fail" => Err(ScriptError::new(action, "boom")),
                "count" => {
                    let current = match ctx.variable("count") {
                        Some(TypedValue::Int(n)) => *n,
                        _ => 0,
                    };
                    Ok(Effects::none().set("count", current + 1))
                }
                "announce" => Ok(Effects::none().emit("status", "active")),
                _ => Ok(Effects::none()),
            },
        )
    }

    fn trigger_automata() -> Arc<Automata> {
        Arc::new(
            AutomataBuilder::new("switch")
                .initial("Idle")
                .state(StateBuilder::new("Idle").input("trigger:bool").variable("count:int"))
                .state(StateBuilder::new("Active").on_enter("announce"))
                .transition(
                    TransitionBuilder::new("go")
                        .from("Idle")
                        .to("Active")
                        .when("check(\"trigger\")"),
                )
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn new_instance_is_stopped_in_initial_state() {
        let instance = AutomataInstance::new("dev", trigger_automata());

        assert_eq!(instance.run_state(), RunState::Stopped);
        assert_eq!(instance.current_state(), "Idle");
        assert_eq!(instance.variable("count"), Some(&TypedValue::Int(0)));
        assert_eq!(instance.latest().current_state, "Idle");
        assert_eq!(instance.key(), &InstanceKey::new("dev", "switch"));
    }

    #[test]
    fn tick_requires_running() {
        let mut instance = AutomataInstance::new("dev", trigger_automata());
        let err = instance.tick(&scripted_host()).unwrap_err();

        assert!(matches!(err, EngineError::NotRunning { .. }));
    }

    #[test]
    fn lifecycle_transitions() {
        let mut instance = AutomataInstance::new("dev", trigger_automata());

        assert!(instance.pause().is_err());
        instance.start().unwrap();
        assert!(instance.start().is_err());
        instance.pause().unwrap();
        assert_eq!(instance.latest().run_state, RunState::Paused);
        instance.resume().unwrap();
        instance.stop().unwrap();
        assert!(instance.stop().is_err());
        assert_eq!(instance.run_state(), RunState::Stopped);
    }

    #[test]
    fn guard_false_keeps_state() {
        let mut instance = AutomataInstance::new("dev", trigger_automata());
        instance.start().unwrap();

        let outcome = instance.tick(&scripted_host()).unwrap();

        assert!(outcome.fired.is_none());
        assert_eq!(outcome.snapshot.current_state, "Idle");
        assert_eq!(outcome.snapshot.execution_cycle, 0);
    }

    #[test]
    fn trigger_fires_transition_and_runs_on_enter() {
        let mut instance = AutomataInstance::new("dev", trigger_automata());
        instance.start().unwrap();
        instance.set_input("trigger", true);

        let outcome = instance.tick(&scripted_host()).unwrap();

        assert_eq!(outcome.fired.as_deref(), Some("go"));
        assert_eq!(outcome.snapshot.current_state, "Active");
        assert_eq!(outcome.snapshot.previous_state.as_deref(), Some("Idle"));
        assert_eq!(outcome.snapshot.last_transition.as_deref(), Some("go"));
        assert_eq!(outcome.snapshot.execution_cycle, 1);
        assert_eq!(
            outcome.emitted.get("status"),
            Some(&TypedValue::Str("active".into()))
        );
    }

    #[test]
    fn resident_code_runs_every_cycle() {
        let automata = Arc::new(
            AutomataBuilder::new("counter")
                .initial("Counting")
                .state(StateBuilder::new("Counting").variable("count:int").code("count"))
                .build()
                .unwrap(),
        );
        let mut instance = AutomataInstance::new("dev", automata);
        instance.start().unwrap();

        for _ in 0..3 {
            instance.tick(&scripted_host()).unwrap();
        }

        assert_eq!(instance.variable("count"), Some(&TypedValue::Int(3)));
        assert_eq!(instance.execution_cycle(), 0);
    }

    #[test]
    fn action_failure_moves_to_error_sink() {
        let automata = Arc::new(
            AutomataBuilder::new("worker")
                .initial("Processing")
                .state(StateBuilder::new("Processing").code("fail"))
                .build()
                .unwrap(),
        );
        let mut instance = AutomataInstance::new("dev", automata);
        instance.start().unwrap();

        let outcome = instance.tick(&scripted_host()).unwrap();

        assert!(instance.is_faulted());
        assert!(outcome.snapshot.is_faulted());
        assert_eq!(outcome.snapshot.previous_state.as_deref(), Some("Processing"));
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].severity, Severity::Error);

        // The sink is absorbing and quiet.
        let again = instance.tick(&scripted_host()).unwrap();
        assert!(again.events.is_empty());
        assert!(again.snapshot.is_faulted());
    }

    #[test]
    fn guard_failure_moves_to_error_sink() {
        let automata = Arc::new(
            AutomataBuilder::new("bad_guard")
                .initial("A")
                .plain_state("A")
                .plain_state("B")
                .transition(TransitionBuilder::new("t").from("A").to("B").when("gibberish"))
                .unwrap()
                .build()
                .unwrap(),
        );
        let mut instance = AutomataInstance::new("dev", automata);
        instance.start().unwrap();

        let outcome = instance.tick(&scripted_host()).unwrap();

        assert!(outcome.snapshot.is_faulted());
        assert!(outcome.events[0].message.contains("gibberish"));
    }

    #[test]
    fn reset_restores_initial_values() {
        let mut instance = AutomataInstance::new("dev", trigger_automata());
        instance.start().unwrap();
        instance.set_input("trigger", true);
        instance.tick(&scripted_host()).unwrap();

        assert!(instance.reset().is_err());
        instance.stop().unwrap();
        instance.reset().unwrap();

        assert_eq!(instance.current_state(), "Idle");
        assert_eq!(instance.execution_cycle(), 0);
        assert_eq!(instance.latest().inputs.get("trigger"), Some(&TypedValue::Bool(false)));
    }

    #[test]
    fn published_snapshot_is_not_affected_by_later_ticks() {
        let mut instance = AutomataInstance::new("dev", trigger_automata());
        instance.start().unwrap();
        let before = instance.latest();

        instance.set_input("trigger", true);
        instance.tick(&scripted_host()).unwrap();

        assert_eq!(before.current_state, "Idle");
        assert_eq!(instance.latest().current_state, "Active");
    }
}
