//! Build errors for automata, state and transition builders.

use crate::model::ValidationError;
use thiserror::Error;

/// Errors that can occur when building automata definitions.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Initial state not specified. Call .initial(state) before .build()")]
    MissingInitialState,

    #[error("Transition '{0}' has no source state. Call .from(state)")]
    MissingFromState(String),

    #[error("Transition '{0}' has no target state. Call .to(state)")]
    MissingToState(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}
