//! Aetherium: deterministic execution and time-travel replay for networked
//! finite-state automata.
//!
//! The crate follows a "pure core, imperative shell" layout. Model
//! validation and transition selection are pure functions; instances,
//! recording and the async runtime are the shell that owns mutable state.
//!
//! # Core Concepts
//!
//! - **Model**: validated, immutable automata definitions ([`model`])
//! - **Selection**: deterministic choice of at most one transition per cycle,
//!   priorities first, then seeded weighted draws ([`selector`])
//! - **Engine**: per-instance tick loop with a pluggable script host ([`engine`])
//! - **Recording**: bounded, frame-numbered network snapshots ([`recording`])
//! - **Replay**: seek, step, play and bookmark over recorded frames ([`replay`])
//!
//! # Example
//!
//! ```rust
//! use aetherium::builder::{AutomataBuilder, StateBuilder, TransitionBuilder};
//! use aetherium::engine::{Fleet, LiteralHost};
//! use aetherium::recording::RecordingOptions;
//! use aetherium::timetravel::TimeTravel;
//! use std::sync::Arc;
//!
//! let automata = AutomataBuilder::new("switch")
//!     .initial("Idle")
//!     .state(StateBuilder::new("Idle").input("trigger:bool"))
//!     .plain_state("Active")
//!     .transition(TransitionBuilder::new("go").from("Idle").to("Active").when("trigger"))
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let mut fleet = Fleet::new();
//! fleet.add_device("dev");
//! let key = fleet.deploy("dev", Arc::new(automata)).unwrap();
//! fleet.start(&key).unwrap();
//!
//! let mut tt = TimeTravel::new();
//! let session = tt.start_recording(RecordingOptions::default()).unwrap();
//!
//! fleet.tick(&LiteralHost);
//! tt.capture(session, fleet.take_frame()).unwrap();
//! fleet.set_input(&key, "trigger", true).unwrap();
//! fleet.tick(&LiteralHost);
//! tt.capture(session, fleet.take_frame()).unwrap();
//!
//! let before = tt.seek(session, 0).unwrap();
//! let after = tt.step(session, 1).unwrap();
//! assert_eq!(before.execution(&key).unwrap().current_state, "Idle");
//! assert_eq!(after.execution(&key).unwrap().current_state, "Active");
//! ```

pub mod archive;
pub mod builder;
pub mod config;
pub mod engine;
pub mod model;
pub mod recording;
pub mod replay;
pub mod runtime;
pub mod selector;
pub mod snapshot;
pub mod timetravel;

// Re-export commonly used types
pub use builder::{AutomataBuilder, StateBuilder, TransitionBuilder};
pub use engine::{AutomataInstance, Fleet, GuardActionHost, InstanceKey};
pub use model::{Automata, AutomataDefinition, TypedValue};
pub use snapshot::{ExecutionSnapshot, NetworkSnapshot};
pub use timetravel::TimeTravel;
