//! Serializable automata definition records.
//!
//! The definition is the wire shape consumed by [`Automata::load`](super::Automata::load):
//!
//! ```json
//! {
//!   "version": "1",
//!   "config": { "name": "door", "type": "inline", "language": "lua", "description": "", "tags": [] },
//!   "automata": { "initialState": "Idle", "states": { ... }, "transitions": { ... } }
//! }
//! ```

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;

pub type StateId = String;
pub type TransitionId = String;

/// Complete automata definition document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomataDefinition {
    pub version: String,
    pub config: AutomataConfig,
    pub automata: AutomataBody,
}

/// Where the automata's scripts live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomataKind {
    /// Scripts are embedded in the definition.
    #[default]
    Inline,
    /// Scripts live in a folder referenced by `location`.
    Folder,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomataConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: AutomataKind,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomataBody {
    pub initial_state: StateId,
    #[serde(default)]
    pub states: Entries<State>,
    #[serde(default)]
    pub transitions: Entries<Transition>,
    /// Automata-level input channels.
    #[serde(default)]
    pub inputs: BTreeSet<String>,
    /// Automata-level output channels.
    #[serde(default)]
    pub outputs: BTreeSet<String>,
}

/// Editor canvas position. Carried through, never read by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One state of an automata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// Unique within the automata. Empty in a raw definition means "use the map key".
    #[serde(default)]
    pub id: StateId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inputs: BTreeSet<String>,
    #[serde(default)]
    pub outputs: BTreeSet<String>,
    /// Declared variable names, optionally typed (`count:int`).
    #[serde(default)]
    pub variables: BTreeSet<String>,
    /// Action body run on every cycle while resident.
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_enter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_exit: Option<String>,
    #[serde(default)]
    pub is_composite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// Explicit probabilistic firing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Probabilistic {
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Extra predicate that must also hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Fuzzy guard variant. The expression is opaque to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuzzyGuard {
    pub enabled: bool,
    #[serde(default)]
    pub expression: String,
    #[serde(default)]
    pub threshold: f64,
}

/// A directed edge between two states.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    #[serde(default)]
    pub id: TransitionId,
    pub from: StateId,
    pub to: StateId,
    /// Guard predicate body; `None` is always true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Lower fires first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilistic: Option<Probabilistic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy_guard: Option<FuzzyGuard>,
}

fn default_weight() -> f64 {
    1.0
}

impl Transition {
    pub fn is_probabilistic(&self) -> bool {
        self.probabilistic.as_ref().is_some_and(|p| p.enabled)
    }

    /// Weight used for random selection among same-priority siblings.
    pub fn effective_weight(&self) -> f64 {
        match &self.probabilistic {
            Some(p) if p.enabled => p.weight,
            _ => self.weight,
        }
    }

    pub(crate) fn set_effective_weight(&mut self, weight: f64) {
        match &mut self.probabilistic {
            Some(p) if p.enabled => p.weight = weight,
            _ => self.weight = weight,
        }
    }

    /// Every predicate body that must hold for this transition to be a candidate.
    ///
    /// Empty when the transition is unconditional.
    pub fn guard_bodies(&self) -> Vec<&str> {
        let mut bodies = Vec::new();
        if let Some(condition) = self.condition.as_deref() {
            bodies.push(condition);
        }
        if let Some(Probabilistic {
            enabled: true,
            condition: Some(condition),
            ..
        }) = &self.probabilistic
        {
            bodies.push(condition.as_str());
        }
        if let Some(fuzzy) = self.fuzzy_guard.as_ref().filter(|f| f.enabled) {
            bodies.push(fuzzy.expression.as_str());
        }
        bodies
    }
}

/// Map-shaped collection that keeps duplicate keys.
///
/// JSON objects with repeated keys are legal input; collecting them into a
/// map would silently keep the last one. Entries keeps every pair in document
/// order so validation can report the duplicates.
#[derive(Clone, Debug, PartialEq)]
pub struct Entries<T>(pub Vec<(String, T)>);

impl<T> Entries<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<String>, value: T) {
        self.0.push((key.into(), value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(String, T)> for Entries<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Serialize> Serialize for Entries<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Entries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Entries<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of id to definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}
