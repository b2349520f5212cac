//! End-to-end runs: load, tick, record, replay.

use aetherium::engine::{
    Effects, Fleet, FnHost, GuardActionHost, LiteralHost, RunState, ScriptError,
};
use aetherium::model::{Automata, TypedValue, ERROR_STATE};
use aetherium::recording::RecordingOptions;
use aetherium::snapshot::{DeviceHealth, EventKind, Severity};
use aetherium::timetravel::TimeTravel;
use std::sync::Arc;
use std::time::Duration;

const SWITCH: &str = r#"{
    "version": "0.0.1",
    "config": {
        "name": "switch",
        "type": "inline",
        "language": "lua",
        "description": "Idle until triggered",
        "tags": ["demo"]
    },
    "automata": {
        "initialState": "Idle",
        "states": {
            "Idle": { "inputs": ["trigger:bool"] },
            "Active": { "outputs": ["lamp:bool"] }
        },
        "transitions": {
            "activate": { "from": "Idle", "to": "Active", "condition": "trigger" }
        }
    }
}"#;

const WORKER: &str = r#"{
    "version": "0.0.1",
    "config": { "name": "worker", "type": "inline", "language": "lua", "description": "", "tags": [] },
    "automata": {
        "initialState": "Processing",
        "states": {
            "Processing": { "code": "explode()" },
            "Done": {}
        },
        "transitions": {
            "finish": { "from": "Processing", "to": "Done", "condition": "false" }
        }
    }
}"#;

fn options(max_snapshots: usize) -> RecordingOptions {
    RecordingOptions {
        capture_interval: Duration::from_millis(100),
        max_snapshots,
    }
}

#[test]
fn ten_ticks_with_five_slots_keep_frames_six_to_ten() {
    let mut fleet = Fleet::new();
    fleet.add_device("dev");
    let key = fleet
        .deploy("dev", Arc::new(Automata::from_json(SWITCH).unwrap()))
        .unwrap();
    fleet.start(&key).unwrap();

    let mut tt = TimeTravel::new();
    let session = tt.start_recording(options(5)).unwrap();
    for _ in 0..10 {
        fleet.tick(&LiteralHost);
        tt.capture(session, fleet.take_frame()).unwrap();
    }

    let retained: Vec<u64> = tt
        .session(session)
        .unwrap()
        .frames()
        .map(|f| f.frame_number)
        .collect();
    assert_eq!(retained, vec![6, 7, 8, 9, 10]);
    assert_eq!(tt.seek(session, 0).unwrap().frame_number, 6);
    assert_eq!(tt.step(session, -3).unwrap().frame_number, 6);
    assert_eq!(tt.seek(session, 4).unwrap().frame_number, 10);
    assert_eq!(tt.step(session, 1).unwrap().frame_number, 10);
}

#[test]
fn trigger_moves_idle_to_active_and_replays_exactly() {
    let mut fleet = Fleet::new();
    fleet.add_device("dev");
    let key = fleet
        .deploy("dev", Arc::new(Automata::from_json(SWITCH).unwrap()))
        .unwrap();
    fleet.start(&key).unwrap();

    let mut tt = TimeTravel::new();
    let session = tt.start_recording(options(100)).unwrap();

    fleet.tick(&LiteralHost);
    tt.capture(session, fleet.take_frame()).unwrap();
    fleet.set_input(&key, "trigger", true).unwrap();
    let report = fleet.tick(&LiteralHost);
    tt.capture(session, fleet.take_frame()).unwrap();
    tt.stop_recording(session).unwrap();

    assert_eq!(report.fired.get(&key).map(String::as_str), Some("activate"));
    let instance = fleet.instance(&key).unwrap();
    assert_eq!(instance.current_state(), "Active");
    assert_eq!(instance.execution_cycle(), 1);

    let before = tt.get_frame(session, 0).unwrap();
    let after = tt.get_frame(session, 1).unwrap();
    let idle = before.execution(&key).unwrap();
    let active = after.execution(&key).unwrap();
    assert_eq!(idle.current_state, "Idle");
    assert_eq!(idle.inputs.get("trigger"), Some(&TypedValue::Bool(false)));
    assert_eq!(active.current_state, "Active");
    assert_eq!(active.previous_state.as_deref(), Some("Idle"));
    assert_eq!(active.last_transition.as_deref(), Some("activate"));
    assert_eq!(active.execution_cycle, 1);
    assert_eq!(active.outputs.get("lamp"), Some(&TypedValue::Bool(false)));

    // Replaying returns the stored frame, not a re-derivation.
    assert!(Arc::ptr_eq(&after, &tt.seek(session, 1).unwrap()));
}

#[test]
fn faulting_instance_is_isolated_in_the_recording() {
    let host = FnHost::new(
        |condition, ctx| LiteralHost.evaluate(condition, ctx),
        |action, _| match action {
            "explode()" => Err(ScriptError::new(action, "division by zero")),
            _ => Ok(Effects::none()),
        },
    );

    let mut fleet = Fleet::new();
    fleet.add_device("dev");
    let worker = fleet
        .deploy("dev", Arc::new(Automata::from_json(WORKER).unwrap()))
        .unwrap();
    let switch = fleet
        .deploy("dev", Arc::new(Automata::from_json(SWITCH).unwrap()))
        .unwrap();
    fleet.start_all();

    let mut tt = TimeTravel::new();
    let session = tt.start_recording(options(100)).unwrap();
    tt.capture(session, fleet.take_frame()).unwrap();

    fleet.set_input(&switch, "trigger", true).unwrap();
    fleet.tick(&host);
    tt.capture(session, fleet.take_frame()).unwrap();
    fleet.tick(&host);
    tt.capture(session, fleet.take_frame()).unwrap();

    let faulted = tt.get_frame(session, 1).unwrap();
    let worker_state = faulted.execution(&worker).unwrap();
    assert_eq!(worker_state.current_state, ERROR_STATE);
    assert_eq!(worker_state.previous_state.as_deref(), Some("Processing"));
    assert_eq!(worker_state.run_state, RunState::Running);
    assert_eq!(faulted.execution(&switch).unwrap().current_state, "Active");

    let errors: Vec<_> = faulted.events_at(Severity::Error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, EventKind::ScriptFailure);
    assert_eq!(errors[0].instance.as_ref(), Some(&worker));
    assert!(errors[0].message.contains("division by zero"));
    assert_eq!(faulted.device("dev").unwrap().health, DeviceHealth::Degraded);

    // The sink is quiet on later frames; nothing else was disturbed.
    let later = tt.get_frame(session, 2).unwrap();
    assert!(!later.has_errors());
    assert!(later.execution(&worker).unwrap().is_faulted());
    assert!(!tt.get_frame(session, 0).unwrap().has_errors());
}
