//! Automata definition errors.

use std::path::PathBuf;
use thiserror::Error;

/// A single problem found while validating a definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationIssue {
    #[error("duplicate state id '{id}'")]
    DuplicateState { id: String },

    #[error("duplicate transition id '{id}'")]
    DuplicateTransition { id: String },

    #[error("state keyed '{key}' declares id '{id}'")]
    StateKeyMismatch { key: String, id: String },

    #[error("transition keyed '{key}' declares id '{id}'")]
    TransitionKeyMismatch { key: String, id: String },

    #[error("initial state '{id}' does not exist")]
    MissingInitialState { id: String },

    #[error("transition '{transition}' leaves unknown state '{state}'")]
    DanglingFrom { transition: String, state: String },

    #[error("transition '{transition}' targets unknown state '{state}'")]
    DanglingTo { transition: String, state: String },

    #[error("transition '{transition}' has invalid weight {weight}")]
    InvalidWeight { transition: String, weight: f64 },

    #[error("state id '{id}' is reserved")]
    ReservedStateId { id: String },

    #[error("state '{state}' has malformed declaration '{declaration}'")]
    InvalidDeclaration { state: String, declaration: String },

    #[error("folder automata requires a location")]
    MissingLocation,
}

/// Every issue that made a definition unloadable.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid automata definition: {}", join(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn join(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from reading a definition document.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed definition: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("malformed definition: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}
