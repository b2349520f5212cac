//! Automata model: states, transitions, definitions and validation.
//!
//! The model is an immutable-shape description of one state machine. Runtime
//! values never live here; the engine keeps them in execution state.

mod automata;
pub mod definition;
mod error;
pub mod validation;
mod value;

pub use automata::Automata;
pub use definition::{
    AutomataBody, AutomataConfig, AutomataDefinition, AutomataKind, Entries, FuzzyGuard,
    Position, Probabilistic, State, StateId, Transition, TransitionId,
};
pub use error::{DefinitionError, ValidationError, ValidationIssue};
pub use value::{TypedValue, VariableDecl, VariableType};

/// Id of the sink state an instance falls into when its host script fails.
///
/// Reserved: definitions may not declare a state with this id.
pub const ERROR_STATE: &str = "$error";
