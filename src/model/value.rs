//! Typed values and variable declarations.
//!
//! Declarations may carry a type suffix (`count:int`). The model only stores
//! declared names; the engine uses [`VariableDecl`] to seed execution state
//! with the zero value of each declared type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value held by an input, output or variable at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypedValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Void,
}

impl TypedValue {
    /// Truthiness used by hosts that treat inputs as flags.
    ///
    /// `Void`, `false`, `0` and the empty string are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Str(s) => !s.is_empty(),
            Self::Void => false,
        }
    }

    pub fn value_type(&self) -> VariableType {
        match self {
            Self::Bool(_) => VariableType::Bool,
            Self::Int(_) => VariableType::Int,
            Self::Str(_) => VariableType::String,
            Self::Void => VariableType::Void,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Void => f.write_str("void"),
        }
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Declared type of a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Bool,
    Int,
    String,
    Void,
}

impl VariableType {
    /// The value a freshly declared variable of this type starts with.
    pub fn zero_value(self) -> TypedValue {
        match self {
            Self::Bool => TypedValue::Bool(false),
            Self::Int => TypedValue::Int(0),
            Self::String => TypedValue::Str(String::new()),
            Self::Void => TypedValue::Void,
        }
    }
}

/// A parsed `name[:type]` declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableDecl {
    pub name: String,
    pub var_type: VariableType,
}

impl VariableDecl {
    /// Parse a declaration. Untyped names are strings.
    ///
    /// Returns `None` when the suffix names an unknown type or the name is empty.
    ///
    /// # Example
    ///
    /// ```rust
    /// use aetherium::model::{VariableDecl, VariableType};
    ///
    /// let decl = VariableDecl::parse("count:int").unwrap();
    /// assert_eq!(decl.name, "count");
    /// assert_eq!(decl.var_type, VariableType::Int);
    ///
    /// assert_eq!(VariableDecl::parse("label").unwrap().var_type, VariableType::String);
    /// assert!(VariableDecl::parse("x:float").is_none());
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let (name, var_type) = match raw.split_once(':') {
            Some((name, ty)) => {
                let var_type = match ty.trim() {
                    "int" => VariableType::Int,
                    "bool" => VariableType::Bool,
                    "string" => VariableType::String,
                    _ => return None,
                };
                (name.trim(), var_type)
            }
            None => (raw.trim(), VariableType::String),
        };

        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            var_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_declarations() {
        assert_eq!(
            VariableDecl::parse("ready:bool"),
            Some(VariableDecl {
                name: "ready".to_string(),
                var_type: VariableType::Bool,
            })
        );
        assert_eq!(
            VariableDecl::parse("label:string").map(|d| d.var_type),
            Some(VariableType::String)
        );
    }

    #[test]
    fn rejects_empty_name_and_unknown_type() {
        assert!(VariableDecl::parse(":int").is_none());
        assert!(VariableDecl::parse("").is_none());
        assert!(VariableDecl::parse("x:double").is_none());
    }

    #[test]
    fn zero_values_match_type() {
        assert_eq!(VariableType::Int.zero_value(), TypedValue::Int(0));
        assert_eq!(VariableType::Bool.zero_value(), TypedValue::Bool(false));
        assert_eq!(
            VariableType::String.zero_value(),
            TypedValue::Str(String::new())
        );
    }

    #[test]
    fn truthiness() {
        assert!(TypedValue::Bool(true).is_truthy());
        assert!(TypedValue::Int(-1).is_truthy());
        assert!(!TypedValue::Int(0).is_truthy());
        assert!(!TypedValue::Str(String::new()).is_truthy());
        assert!(!TypedValue::Void.is_truthy());
    }

    #[test]
    fn value_serializes_tagged() {
        let json = serde_json::to_string(&TypedValue::Int(3)).unwrap();
        assert_eq!(json, r#"{"int":3}"#);
        let back: TypedValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TypedValue::Int(3));
    }
}
