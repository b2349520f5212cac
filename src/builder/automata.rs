//! Builder for constructing automata.

use crate::builder::error::BuildError;
use crate::builder::transition::{StateBuilder, TransitionBuilder};
use crate::model::{
    Automata, AutomataBody, AutomataConfig, AutomataDefinition, AutomataKind, Entries, State,
    Transition,
};
use std::collections::BTreeSet;

/// Builder for constructing automata with a fluent API.
///
/// The builder produces an [`AutomataDefinition`] and runs it through the
/// same validation as a loaded document.
pub struct AutomataBuilder {
    name: String,
    version: String,
    language: String,
    description: String,
    tags: Vec<String>,
    initial: Option<String>,
    states: Entries<State>,
    transitions: Entries<Transition>,
    inputs: BTreeSet<String>,
    outputs: BTreeSet<String>,
}

impl AutomataBuilder {
    /// Create a new builder for an automata with this id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1".to_string(),
            language: "lua".to_string(),
            description: String::new(),
            tags: Vec::new(),
            initial: None,
            states: Entries::new(),
            transitions: Entries::new(),
            inputs: BTreeSet::new(),
            outputs: BTreeSet::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the initial state (required).
    pub fn initial(mut self, state: impl Into<String>) -> Self {
        self.initial = Some(state.into());
        self
    }

    pub fn state(mut self, builder: StateBuilder) -> Self {
        let state = builder.build();
        self.states.push(state.id.clone(), state);
        self
    }

    /// Shorthand for a state with no bodies or declarations.
    pub fn plain_state(self, id: impl Into<String>) -> Self {
        self.state(StateBuilder::new(id))
    }

    /// Add a transition using a builder.
    /// Returns an error if the builder is missing its endpoints.
    pub fn transition(mut self, builder: TransitionBuilder) -> Result<Self, BuildError> {
        let transition = builder.build()?;
        self.transitions.push(transition.id.clone(), transition);
        Ok(self)
    }

    /// Declare an automata-level input channel.
    pub fn input(mut self, channel: impl Into<String>) -> Self {
        self.inputs.insert(channel.into());
        self
    }

    /// Declare an automata-level output channel.
    pub fn output(mut self, channel: impl Into<String>) -> Self {
        self.outputs.insert(channel.into());
        self
    }

    /// Produce the definition document without validating it.
    pub fn definition(self) -> Result<AutomataDefinition, BuildError> {
        let initial_state = self.initial.ok_or(BuildError::MissingInitialState)?;

        Ok(AutomataDefinition {
            version: self.version,
            config: AutomataConfig {
                name: self.name,
                kind: AutomataKind::Inline,
                language: self.language,
                description: self.description,
                tags: self.tags,
                location: None,
            },
            automata: AutomataBody {
                initial_state,
                states: self.states,
                transitions: self.transitions,
                inputs: self.inputs,
                outputs: self.outputs,
            },
        })
    }

    /// Build and validate the automata.
    pub fn build(self) -> Result<Automata, BuildError> {
        let definition = self.definition()?;
        Ok(Automata::load(&definition)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValidationIssue;

    #[test]
    fn builder_validates_required_fields() {
        let result = AutomataBuilder::new("m").plain_state("A").build();

        assert!(matches!(result, Err(BuildError::MissingInitialState)));
    }

    #[test]
    fn fluent_api_builds_automata() {
        let automata = AutomataBuilder::new("blinker")
            .initial("Off")
            .plain_state("Off")
            .plain_state("On")
            .transition(TransitionBuilder::new("on").from("Off").to("On"))
            .unwrap()
            .transition(TransitionBuilder::new("off").from("On").to("Off"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(automata.id(), "blinker");
        assert_eq!(automata.initial_state(), "Off");
        assert_eq!(automata.transitions().count(), 2);
    }

    #[test]
    fn build_runs_validation() {
        let result = AutomataBuilder::new("broken")
            .initial("A")
            .plain_state("A")
            .transition(TransitionBuilder::new("t").from("A").to("B"))
            .unwrap()
            .build();

        match result {
            Err(BuildError::Invalid(err)) => assert_eq!(
                err.issues,
                vec![ValidationIssue::DanglingTo {
                    transition: "t".into(),
                    state: "B".into(),
                }]
            ),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
