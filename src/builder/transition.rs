//! Builders for states and transitions.

use crate::builder::error::BuildError;
use crate::model::{FuzzyGuard, Position, Probabilistic, State, Transition};

/// Builder for a single state.
pub struct StateBuilder {
    state: State,
}

impl StateBuilder {
    /// Create a builder for the state with this id. The name defaults to the id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            state: State {
                name: id.clone(),
                id,
                ..State::default()
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.state.name = name.into();
        self
    }

    /// Declare an input, optionally typed (`flag:bool`).
    pub fn input(mut self, declaration: impl Into<String>) -> Self {
        self.state.inputs.insert(declaration.into());
        self
    }

    pub fn output(mut self, declaration: impl Into<String>) -> Self {
        self.state.outputs.insert(declaration.into());
        self
    }

    pub fn variable(mut self, declaration: impl Into<String>) -> Self {
        self.state.variables.insert(declaration.into());
        self
    }

    /// Action body run every cycle while resident.
    pub fn code(mut self, body: impl Into<String>) -> Self {
        self.state.code = body.into();
        self
    }

    pub fn on_enter(mut self, body: impl Into<String>) -> Self {
        self.state.on_enter = Some(body.into());
        self
    }

    pub fn on_exit(mut self, body: impl Into<String>) -> Self {
        self.state.on_exit = Some(body.into());
        self
    }

    pub fn composite(mut self) -> Self {
        self.state.is_composite = true;
        self
    }

    pub fn position(mut self, x: f64, y: f64) -> Self {
        self.state.position = Some(Position { x, y });
        self
    }

    pub fn build(self) -> State {
        self.state
    }
}

/// Builder for constructing transitions with a fluent API.
pub struct TransitionBuilder {
    id: String,
    from: Option<String>,
    to: Option<String>,
    condition: Option<String>,
    body: Option<String>,
    priority: i32,
    weight: f64,
    probabilistic: Option<Probabilistic>,
    fuzzy_guard: Option<FuzzyGuard>,
}

impl TransitionBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from: None,
            to: None,
            condition: None,
            body: None,
            priority: 0,
            weight: 1.0,
            probabilistic: None,
            fuzzy_guard: None,
        }
    }

    /// Set the source state (required).
    pub fn from(mut self, state: impl Into<String>) -> Self {
        self.from = Some(state.into());
        self
    }

    /// Set the target state (required).
    pub fn to(mut self, state: impl Into<String>) -> Self {
        self.to = Some(state.into());
        self
    }

    /// Guard predicate body. Unconditional when never called.
    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Effect body run when the transition fires.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Enable probabilistic firing with its own weight.
    pub fn probabilistic(mut self, weight: f64) -> Self {
        self.probabilistic = Some(Probabilistic {
            enabled: true,
            weight,
            condition: None,
        });
        self
    }

    /// Enable probabilistic firing gated by an extra predicate.
    pub fn probabilistic_when(mut self, weight: f64, condition: impl Into<String>) -> Self {
        self.probabilistic = Some(Probabilistic {
            enabled: true,
            weight,
            condition: Some(condition.into()),
        });
        self
    }

    pub fn fuzzy(mut self, expression: impl Into<String>, threshold: f64) -> Self {
        self.fuzzy_guard = Some(FuzzyGuard {
            enabled: true,
            expression: expression.into(),
            threshold,
        });
        self
    }

    /// Build the transition.
    pub fn build(self) -> Result<Transition, BuildError> {
        let from = self
            .from
            .ok_or_else(|| BuildError::MissingFromState(self.id.clone()))?;
        let to = self
            .to
            .ok_or_else(|| BuildError::MissingToState(self.id.clone()))?;

        Ok(Transition {
            id: self.id,
            from,
            to,
            condition: self.condition,
            body: self.body,
            priority: self.priority,
            weight: self.weight,
            probabilistic: self.probabilistic,
            fuzzy_guard: self.fuzzy_guard,
        })
    }
}
