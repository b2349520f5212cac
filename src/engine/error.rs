//! Engine error types.

use crate::engine::host::ScriptError;
use crate::engine::instance::{InstanceKey, RunState};
use thiserror::Error;

/// Errors that can occur while driving instances.
///
/// Script failures (`GuardEvaluation`, `ActionExecution`) are recovered at the
/// instance boundary and reported as events; the rest are returned to callers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("instance {key} is {state:?}, cannot {action}")]
    InvalidLifecycle {
        key: InstanceKey,
        state: RunState,
        action: &'static str,
    },

    #[error("instance {key} is {state:?}, not running")]
    NotRunning { key: InstanceKey, state: RunState },

    #[error("guard of transition '{transition}' failed in {key}: {source}")]
    GuardEvaluation {
        key: InstanceKey,
        transition: String,
        #[source]
        source: ScriptError,
    },

    #[error("action in state '{state}' failed in {key}: {source}")]
    ActionExecution {
        key: InstanceKey,
        state: String,
        #[source]
        source: ScriptError,
    },

    #[error("instance {key} is in unknown state '{state}'")]
    UnknownState { key: InstanceKey, state: String },

    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("unknown instance {0}")]
    UnknownInstance(InstanceKey),

    #[error("instance {0} is already deployed")]
    DuplicateInstance(InstanceKey),
}
