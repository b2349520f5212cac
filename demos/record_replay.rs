//! Record and Replay
//!
//! This example records a small network, saves the session to disk and
//! steps back through it.
//!
//! Key concepts:
//! - Every capture becomes a numbered, immutable network frame
//! - Bookmarks pin a global frame number
//! - Archives round-trip through JSON and come back as read-only sessions
//!
//! Run with: cargo run --example record_replay

use aetherium::archive::SessionArchive;
use aetherium::builder::{AutomataBuilder, StateBuilder, TransitionBuilder};
use aetherium::engine::{Fleet, LiteralHost};
use aetherium::model::Automata;
use aetherium::recording::RecordingOptions;
use aetherium::timetravel::TimeTravel;
use std::sync::Arc;
use std::time::Duration;

fn switch() -> Automata {
    AutomataBuilder::new("switch")
        .initial("Idle")
        .state(StateBuilder::new("Idle").input("trigger:bool"))
        .plain_state("Active")
        .transition(TransitionBuilder::new("activate").from("Idle").to("Active").when("trigger"))
        .unwrap()
        .transition(TransitionBuilder::new("release").from("Active").to("Idle").when("!trigger"))
        .unwrap()
        .build()
        .unwrap()
}

fn main() {
    println!("=== Record and Replay ===\n");

    let mut fleet = Fleet::new();
    fleet.add_device("panel");
    let key = fleet.deploy("panel", Arc::new(switch())).unwrap();
    fleet.start(&key).unwrap();

    let mut tt = TimeTravel::new();
    let session = tt
        .start_recording(RecordingOptions {
            capture_interval: Duration::from_millis(50),
            max_snapshots: 6,
        })
        .unwrap();

    println!("Recording 8 ticks into a 6-frame buffer:");
    for tick in 0..8 {
        fleet.set_input(&key, "trigger", (3..6).contains(&tick)).unwrap();
        fleet.tick(&LiteralHost);
        let report = tt.capture(session, fleet.take_frame()).unwrap();
        let state = fleet.instance(&key).unwrap().current_state().to_string();
        match report.evicted {
            Some(old) => println!("  frame {} -> {state} (evicted frame {old})", report.frame_number),
            None => println!("  frame {} -> {state}", report.frame_number),
        }
        if tick == 3 {
            tt.seek(session, i64::MAX).unwrap();
            tt.bookmark(session, "pressed").unwrap();
        }
    }
    tt.stop_recording(session).unwrap();

    let path = std::env::temp_dir().join("aetherium-record-replay.json");
    tt.export(session).unwrap().write_to(&path).unwrap();
    println!("\nSaved session to {}", path.display());

    let mut viewer = TimeTravel::new();
    let replay = viewer.import(SessionArchive::read_from(&path).unwrap());

    println!("\nStepping through the archive:");
    let mut frame = viewer.seek(replay, 0).unwrap();
    loop {
        let execution = frame.execution(&key).unwrap();
        println!(
            "  frame {:>2}: {:<6} cycle {}",
            frame.frame_number, execution.current_state, execution.execution_cycle
        );
        let next = viewer.step(replay, 1).unwrap();
        if next.frame_number == frame.frame_number {
            break;
        }
        frame = next;
    }

    let pressed = viewer.jump_to_bookmark(replay, "pressed").unwrap();
    println!(
        "\nBookmark 'pressed' -> frame {} ({})",
        pressed.frame_number,
        pressed.execution(&key).unwrap().current_state
    );

    std::fs::remove_file(&path).ok();
}
