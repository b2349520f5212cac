//! The validated, loaded automata.

use super::definition::{
    AutomataBody, AutomataConfig, AutomataDefinition, State, StateId, Transition, TransitionId,
};
use super::error::{DefinitionError, ValidationError};
use super::validation;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A validated state machine.
///
/// Construction goes through [`Automata::load`], so every transition's
/// `from`/`to` and the initial state are guaranteed to exist.
///
/// # Example
///
/// ```rust
/// use aetherium::model::Automata;
///
/// let json = r#"{
///     "version": "1",
///     "config": { "name": "door", "type": "inline", "language": "lua", "description": "", "tags": [] },
///     "automata": {
///         "initialState": "Closed",
///         "states": { "Closed": {}, "Open": {} },
///         "transitions": { "open": { "from": "Closed", "to": "Open" } }
///     }
/// }"#;
///
/// let automata = Automata::from_json(json).unwrap();
/// assert_eq!(automata.id(), "door");
/// assert_eq!(automata.transitions_from("Closed").count(), 1);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Automata {
    version: String,
    config: AutomataConfig,
    initial_state: StateId,
    states: BTreeMap<StateId, State>,
    transitions: BTreeMap<TransitionId, Transition>,
    outgoing: BTreeMap<StateId, Vec<TransitionId>>,
    inputs: BTreeSet<String>,
    outputs: BTreeSet<String>,
    is_dirty: bool,
}

impl Automata {
    /// Validate a raw definition and build the automata. All-or-nothing.
    pub fn load(definition: &AutomataDefinition) -> Result<Self, ValidationError> {
        validation::check(definition)?;

        let body = &definition.automata;
        let states: BTreeMap<StateId, State> = body
            .states
            .iter()
            .map(|(key, state)| {
                let mut state = state.clone();
                state.id = key.to_string();
                (key.to_string(), state)
            })
            .collect();

        let transitions: BTreeMap<TransitionId, Transition> = body
            .transitions
            .iter()
            .map(|(key, transition)| {
                let mut transition = transition.clone();
                transition.id = key.to_string();
                (key.to_string(), transition)
            })
            .collect();

        let mut outgoing: BTreeMap<StateId, Vec<TransitionId>> = BTreeMap::new();
        for transition in transitions.values() {
            outgoing
                .entry(transition.from.clone())
                .or_default()
                .push(transition.id.clone());
        }

        Ok(Self {
            version: definition.version.clone(),
            config: definition.config.clone(),
            initial_state: body.initial_state.clone(),
            states,
            transitions,
            outgoing,
            inputs: body.inputs.clone(),
            outputs: body.outputs.clone(),
            is_dirty: false,
        })
    }

    /// Parse and load a JSON definition document.
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        let definition: AutomataDefinition = serde_json::from_str(json)?;
        Ok(Self::load(&definition)?)
    }

    /// Parse and load a YAML definition document.
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        let definition: AutomataDefinition = serde_yaml::from_str(yaml)?;
        Ok(Self::load(&definition)?)
    }

    /// Read, parse and load a definition file.
    ///
    /// `.yaml` and `.yml` files are read as YAML, everything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DefinitionError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if is_yaml(path) {
            Self::from_yaml(&text)
        } else {
            Self::from_json(&text)
        }
    }

    /// Serialize back into the definition shape. Lossless with respect to [`Automata::load`].
    pub fn to_definition(&self) -> AutomataDefinition {
        AutomataDefinition {
            version: self.version.clone(),
            config: self.config.clone(),
            automata: AutomataBody {
                initial_state: self.initial_state.clone(),
                states: self
                    .states
                    .iter()
                    .map(|(id, state)| (id.clone(), state.clone()))
                    .collect(),
                transitions: self
                    .transitions
                    .iter()
                    .map(|(id, transition)| (id.clone(), transition.clone()))
                    .collect(),
                inputs: self.inputs.clone(),
                outputs: self.outputs.clone(),
            },
        }
    }

    /// Pretty-printed JSON definition.
    pub fn to_json(&self) -> Result<String, DefinitionError> {
        Ok(serde_json::to_string_pretty(&self.to_definition())?)
    }

    /// YAML definition, loadable with [`Automata::from_yaml`].
    pub fn to_yaml(&self) -> Result<String, DefinitionError> {
        Ok(serde_yaml::to_string(&self.to_definition())?)
    }

    /// The automata id, taken from the definition's configured name.
    pub fn id(&self) -> &str {
        &self.config.name
    }

    /// Definition format version, carried through unchanged.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Name, script kind, language and tags from the definition header.
    pub fn config(&self) -> &AutomataConfig {
        &self.config
    }

    /// State every new or reset instance starts in.
    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    /// Look up a state by id.
    pub fn state_by_id(&self, id: &str) -> Option<&State> {
        self.states.get(id)
    }

    /// Look up a transition by id.
    pub fn transition(&self, id: &str) -> Option<&Transition> {
        self.transitions.get(id)
    }

    /// Outgoing transitions of a state, ordered by transition id.
    pub fn transitions_from<'a>(&'a self, state: &str) -> impl Iterator<Item = &'a Transition> + 'a {
        self.outgoing
            .get(state)
            .into_iter()
            .flatten()
            .filter_map(|id| self.transitions.get(id))
    }

    /// All states in id order.
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.values()
    }

    /// All transitions in id order.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.values()
    }

    /// Automata-level input channels.
    pub fn inputs(&self) -> &BTreeSet<String> {
        &self.inputs
    }

    /// Automata-level output channels.
    pub fn outputs(&self) -> &BTreeSet<String> {
        &self.outputs
    }

    /// Unsaved editor changes. Never serialized.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Clear the dirty flag after the caller has persisted the edit.
    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub(crate) fn transition_mut(&mut self, id: &str) -> Option<&mut Transition> {
        self.is_dirty = true;
        self.transitions.get_mut(id)
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOOR: &str = r#"{
        "version": "1",
        "config": { "name": "door", "type": "inline", "language": "lua", "description": "A door", "tags": ["demo"] },
        "automata": {
            "initialState": "Closed",
            "states": {
                "Closed": { "name": "Closed", "inputs": ["push:bool"], "code": "tick()" },
                "Open": { "name": "Open", "onEnter": "log('open')", "position": { "x": 10.5, "y": 3.0 } }
            },
            "transitions": {
                "open": { "from": "Closed", "to": "Open", "condition": "check('push')", "priority": 1 },
                "close": { "from": "Open", "to": "Closed", "weight": 2.5 }
            },
            "outputs": ["door_state"]
        }
    }"#;

    #[test]
    fn load_assigns_ids_from_keys() {
        let automata = Automata::from_json(DOOR).unwrap();

        assert_eq!(automata.state_by_id("Open").unwrap().id, "Open");
        assert_eq!(automata.transition("close").unwrap().id, "close");
        assert_eq!(automata.initial_state(), "Closed");
        assert!(!automata.is_dirty());
    }

    const DOOR_YAML: &str = "
version: '1'
config:
  name: door
  type: inline
  language: lua
  description: A door
  tags: [demo]
automata:
  initialState: Closed
  states:
    Closed:
      inputs: ['push:bool']
      code: tick()
    Open:
      onEnter: log('open')
  transitions:
    open:
      from: Closed
      to: Open
      condition: push
      priority: 1
    close:
      from: Open
      to: Closed
      weight: 2.5
";

    #[test]
    fn yaml_definition_loads_and_round_trips() {
        let automata = Automata::from_yaml(DOOR_YAML).unwrap();

        assert_eq!(automata.initial_state(), "Closed");
        assert_eq!(automata.transition("close").unwrap().weight, 2.5);
        assert_eq!(automata.transition("open").unwrap().priority, 1);

        let reloaded = Automata::from_yaml(&automata.to_yaml().unwrap()).unwrap();
        assert_eq!(reloaded, automata);
    }

    #[test]
    fn from_path_picks_format_by_extension() {
        let dir = std::env::temp_dir().join(format!("aetherium-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let yaml = dir.join("door.yml");
        let json = dir.join("door.json");
        std::fs::write(&yaml, DOOR_YAML).unwrap();
        std::fs::write(&json, DOOR).unwrap();

        let from_yaml = Automata::from_path(&yaml).unwrap();
        let from_json = Automata::from_path(&json).unwrap();
        assert_eq!(from_yaml.id(), from_json.id());
        assert!(matches!(
            Automata::from_path(dir.join("door.txt")),
            Err(DefinitionError::NotFound(_))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn transitions_from_only_returns_outgoing() {
        let automata = Automata::from_json(DOOR).unwrap();

        let from_closed: Vec<_> = automata
            .transitions_from("Closed")
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(from_closed, vec!["open"]);
        assert_eq!(automata.transitions_from("Nowhere").count(), 0);
    }

    #[test]
    fn round_trip_is_lossless() {
        let automata = Automata::from_json(DOOR).unwrap();
        let json = automata.to_json().unwrap();
        let reloaded = Automata::from_json(&json).unwrap();

        assert_eq!(automata, reloaded);
    }

    #[test]
    fn invalid_definition_loads_nothing() {
        let json = DOOR.replace(r#""to": "Closed""#, r#""to": "Ajar""#);
        let err = Automata::from_json(&json).unwrap_err();

        match err {
            DefinitionError::Invalid(e) => assert_eq!(e.issues.len(), 1),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Automata::from_path("does/not/exist.json").unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
