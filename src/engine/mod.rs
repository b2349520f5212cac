//! The imperative shell around the pure selection core.
//!
//! An [`AutomataInstance`] owns the mutable execution state of one automata
//! on one device and advances it one cycle per [`tick`](AutomataInstance::tick):
//!
//! 1. run the current state's resident code
//! 2. evaluate guards of outgoing transitions through the [`GuardActionHost`]
//! 3. pick at most one transition with [`crate::selector::select`]
//! 4. run the transition body, then `onExit`, then the target's `onEnter`
//! 5. publish an immutable [`ExecutionSnapshot`](crate::snapshot::ExecutionSnapshot)
//!
//! Script failures are contained: the instance moves to the error sink and
//! the failure is reported as an event. Other instances keep running.
//!
//! A [`Fleet`] groups instances by device and routes channel outputs.

mod error;
mod fleet;
mod host;
mod instance;

pub use error::EngineError;
pub use fleet::{Fleet, FleetTick};
pub use host::{Effects, FnHost, GuardActionHost, HostContext, LiteralHost, ScriptError};
pub use instance::{AutomataInstance, InstanceKey, RunState, TickOutcome};
