//! Structural validation of automata definitions.
//!
//! Every check runs; failures accumulate into one `NonEmptyVec` so a caller
//! sees every dangling reference in a single pass instead of fixing them one
//! at a time.

use super::definition::AutomataDefinition;
use super::definition::AutomataKind;
use super::error::{ValidationError, ValidationIssue};
use super::value::VariableDecl;
use super::ERROR_STATE;
use std::collections::HashSet;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<ValidationIssue>>;

fn ensure(ok: bool, issue: impl FnOnce() -> ValidationIssue) -> Check {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(issue())
    }
}

/// Run all structural checks, accumulating every issue.
pub fn validate(definition: &AutomataDefinition) -> Validation<(), NonEmptyVec<ValidationIssue>> {
    let body = &definition.automata;
    let mut checks: Vec<Check> = Vec::new();

    checks.push(ensure(
        definition.config.kind != AutomataKind::Folder || definition.config.location.is_some(),
        || ValidationIssue::MissingLocation,
    ));

    let mut state_ids: HashSet<&str> = HashSet::new();
    for (key, state) in body.states.iter() {
        checks.push(ensure(state_ids.insert(key), || {
            ValidationIssue::DuplicateState { id: key.to_string() }
        }));
        checks.push(ensure(state.id.is_empty() || state.id == key, || {
            ValidationIssue::StateKeyMismatch {
                key: key.to_string(),
                id: state.id.clone(),
            }
        }));
        checks.push(ensure(key != ERROR_STATE, || ValidationIssue::ReservedStateId {
            id: key.to_string(),
        }));

        let declarations = state
            .variables
            .iter()
            .chain(&state.inputs)
            .chain(&state.outputs);
        for declaration in declarations {
            checks.push(ensure(VariableDecl::parse(declaration).is_some(), || {
                ValidationIssue::InvalidDeclaration {
                    state: key.to_string(),
                    declaration: declaration.clone(),
                }
            }));
        }
    }

    checks.push(ensure(state_ids.contains(body.initial_state.as_str()), || {
        ValidationIssue::MissingInitialState {
            id: body.initial_state.clone(),
        }
    }));

    let mut transition_ids: HashSet<&str> = HashSet::new();
    for (key, transition) in body.transitions.iter() {
        checks.push(ensure(transition_ids.insert(key), || {
            ValidationIssue::DuplicateTransition { id: key.to_string() }
        }));
        checks.push(ensure(transition.id.is_empty() || transition.id == key, || {
            ValidationIssue::TransitionKeyMismatch {
                key: key.to_string(),
                id: transition.id.clone(),
            }
        }));
        checks.push(ensure(state_ids.contains(transition.from.as_str()), || {
            ValidationIssue::DanglingFrom {
                transition: key.to_string(),
                state: transition.from.clone(),
            }
        }));
        checks.push(ensure(state_ids.contains(transition.to.as_str()), || {
            ValidationIssue::DanglingTo {
                transition: key.to_string(),
                state: transition.to.clone(),
            }
        }));

        let weight = transition.effective_weight();
        checks.push(ensure(weight.is_finite() && weight > 0.0, || {
            ValidationIssue::InvalidWeight {
                transition: key.to_string(),
                weight,
            }
        }));
    }

    Validation::all_vec(checks).map(|_| ())
}

/// Validate and convert the accumulated issues into a [`ValidationError`].
pub fn check(definition: &AutomataDefinition) -> Result<(), ValidationError> {
    match validate(definition) {
        Validation::Success(_) => Ok(()),
        Validation::Failure(issues) => Err(ValidationError {
            issues: issues.iter().cloned().collect(),
        }),
    }
}
