//! Input values and references between resources

use crate::error::DeclarationError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reserved reference target for derived outputs (`derived.<name>`)
pub const DERIVED_TARGET: &str = "derived";

/// An input value as written in a declaration.
///
/// In YAML a reference is written `{ ref: "bucket.name" }` and a variable
/// `{ var: "accountId" }`. Lists and maps may nest either form; anything else
/// is a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Literal(serde_json::Value),
    Reference(Reference),
    Var(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        Value::Literal(value.into())
    }

    pub fn reference(target: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::Reference(Reference::new(target, attribute))
    }

    pub fn var(name: impl Into<String>) -> Self {
        Value::Var(name.into())
    }

    /// All references contained in this value, depth first
    pub fn references(&self) -> Vec<&Reference> {
        let mut found = Vec::new();
        self.collect_references(&mut found);
        found
    }

    fn collect_references<'a>(&'a self, found: &mut Vec<&'a Reference>) {
        match self {
            Value::Reference(r) => found.push(r),
            Value::List(items) => items.iter().for_each(|v| v.collect_references(found)),
            Value::Map(entries) => entries.values().for_each(|v| v.collect_references(found)),
            Value::Literal(_) | Value::Var(_) => {}
        }
    }

    /// All variable names used by this value
    pub fn variables(&self) -> Vec<&str> {
        match self {
            Value::Var(name) => vec![name.as_str()],
            Value::List(items) => items.iter().flat_map(|v| v.variables()).collect(),
            Value::Map(entries) => entries.values().flat_map(|v| v.variables()).collect(),
            Value::Literal(_) | Value::Reference(_) => Vec::new(),
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = DeclarationError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(serde_json::Value::String(s)) = map.get("ref") {
                        return Ok(Value::Reference(s.parse()?));
                    }
                    if let Some(serde_json::Value::String(s)) = map.get("var") {
                        return Ok(Value::Var(s.clone()));
                    }
                }
                Ok(Value::Map(
                    map.into_iter()
                        .map(|(k, v)| Ok((k, Value::try_from(v)?)))
                        .collect::<Result<_, DeclarationError>>()?,
                ))
            }
            serde_json::Value::Array(items) => Ok(Value::List(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            )),
            other => Ok(Value::Literal(other)),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Literal(v) => v,
            Value::Reference(r) => serde_json::json!({ "ref": r.to_string() }),
            Value::Var(name) => serde_json::json!({ "var": name }),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

/// A pointer by name to an attribute of another resource's live state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Logical name of the referenced resource (or `derived`)
    pub target: String,

    /// Attribute path inside the live state, outermost first
    pub path: Vec<String>,
}

impl Reference {
    pub fn new(target: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            path: vec![attribute.into()],
        }
    }

    pub fn is_derived(&self) -> bool {
        self.target == DERIVED_TARGET
    }

    /// Dotted form of the attribute path
    pub fn path_string(&self) -> String {
        self.path.join(".")
    }
}

impl FromStr for Reference {
    type Err = DeclarationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let target = parts.next().unwrap_or_default();
        let path: Vec<String> = parts.map(str::to_string).collect();

        if target.is_empty() || path.is_empty() || path.iter().any(|p| p.is_empty()) {
            return Err(DeclarationError::InvalidReference(s.to_string()));
        }

        Ok(Self {
            target: target.to_string(),
            path,
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.path_string())
    }
}
