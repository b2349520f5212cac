//! Guard/action host boundary.
//!
//! Guard conditions and action bodies are opaque scripts. The engine never
//! interprets them; it hands them to a [`GuardActionHost`] together with a
//! read-only [`HostContext`] and applies the returned [`Effects`].

use crate::model::TypedValue;
use std::collections::BTreeMap;
use thiserror::Error;

/// Error raised by a host while evaluating or executing a script body.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("script '{body}' failed: {message}")]
pub struct ScriptError {
    pub body: String,
    pub message: String,
}

impl ScriptError {
    pub fn new(body: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            message: message.into(),
        }
    }
}

/// Read access to an instance's inputs and variables during one call.
#[derive(Clone, Copy, Debug)]
pub struct HostContext<'a> {
    pub automata_id: &'a str,
    pub state_id: &'a str,
    pub cycle: u64,
    pub inputs: &'a BTreeMap<String, TypedValue>,
    pub variables: &'a BTreeMap<String, TypedValue>,
}

impl<'a> HostContext<'a> {
    pub fn input(&self, name: &str) -> Option<&'a TypedValue> {
        self.inputs.get(name)
    }

    pub fn variable(&self, name: &str) -> Option<&'a TypedValue> {
        self.variables.get(name)
    }
}

/// Writes requested by an action body.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Effects {
    pub outputs: BTreeMap<String, TypedValue>,
    pub variables: BTreeMap<String, TypedValue>,
}

impl Effects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(mut self, output: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.outputs.insert(output.into(), value.into());
        self
    }

    pub fn set(mut self, variable: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.variables.insert(variable.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty() && self.variables.is_empty()
    }
}

/// Evaluator for opaque guard and action bodies.
///
/// Any embedded interpreter can sit behind this trait without the engine
/// changing.
pub trait GuardActionHost: Send + Sync {
    /// Evaluate a guard predicate body.
    fn evaluate(&self, condition: &str, context: &HostContext<'_>) -> Result<bool, ScriptError>;

    /// Execute an action body and return the writes it requests.
    fn execute(&self, action: &str, context: &HostContext<'_>) -> Result<Effects, ScriptError>;
}

type EvaluateFn = Box<dyn Fn(&str, &HostContext<'_>) -> Result<bool, ScriptError> + Send + Sync>;
type ExecuteFn = Box<dyn Fn(&str, &HostContext<'_>) -> Result<Effects, ScriptError> + Send + Sync>;

/// Host built from two closures.
///
/// # Example
///
/// ```rust
/// use aetherium::engine::{Effects, FnHost, GuardActionHost, HostContext};
/// use std::collections::BTreeMap;
///
/// let host = FnHost::new(
///     |condition, ctx| Ok(ctx.input(condition).is_some_and(|v| v.is_truthy())),
///     |_action, _ctx| Ok(Effects::none()),
/// );
///
/// let mut inputs = BTreeMap::new();
/// inputs.insert("door".to_string(), true.into());
/// let variables = BTreeMap::new();
/// let ctx = HostContext {
///     automata_id: "m",
///     state_id: "Idle",
///     cycle: 0,
///     inputs: &inputs,
///     variables: &variables,
/// };
///
/// assert!(host.evaluate("door", &ctx).unwrap());
/// assert!(!host.evaluate("window", &ctx).unwrap());
/// ```
pub struct FnHost {
    evaluate: EvaluateFn,
    execute: ExecuteFn,
}

impl FnHost {
    pub fn new<E, X>(evaluate: E, execute: X) -> Self
    where
        E: Fn(&str, &HostContext<'_>) -> Result<bool, ScriptError> + Send + Sync + 'static,
        X: Fn(&str, &HostContext<'_>) -> Result<Effects, ScriptError> + Send + Sync + 'static,
    {
        Self {
            evaluate: Box::new(evaluate),
            execute: Box::new(execute),
        }
    }
}

impl GuardActionHost for FnHost {
    fn evaluate(&self, condition: &str, context: &HostContext<'_>) -> Result<bool, ScriptError> {
        (self.evaluate)(condition, context)
    }

    fn execute(&self, action: &str, context: &HostContext<'_>) -> Result<Effects, ScriptError> {
        (self.execute)(action, context)
    }
}

/// Host used when no interpreter is attached.
///
/// Understands `true`, `false`, a bare name (truthiness of that input or
/// variable, missing is false) and `!name`. Anything else is a script error.
/// Actions produce no effects.
#[derive(Clone, Copy, Debug, Default)]
pub struct LiteralHost;

impl LiteralHost {
    fn is_name(text: &str) -> bool {
        let mut chars = text.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    fn lookup(name: &str, context: &HostContext<'_>) -> bool {
        context
            .input(name)
            .or_else(|| context.variable(name))
            .is_some_and(TypedValue::is_truthy)
    }
}

impl GuardActionHost for LiteralHost {
    fn evaluate(&self, condition: &str, context: &HostContext<'_>) -> Result<bool, ScriptError> {
        let text = condition.trim();
        match text {
            "" | "true" => Ok(true),
            "false" => Ok(false),
            _ => {
                if let Some(name) = text.strip_prefix('!').map(str::trim) {
                    if Self::is_name(name) {
                        return Ok(!Self::lookup(name, context));
                    }
                } else if Self::is_name(text) {
                    return Ok(Self::lookup(text, context));
                }
                Err(ScriptError::new(condition, "unsupported expression"))
            }
        }
    }

    fn execute(&self, _action: &str, _context: &HostContext<'_>) -> Result<Effects, ScriptError> {
        Ok(Effects::none())
    }
}
