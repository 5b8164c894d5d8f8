//! Live state of an applied resource

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Attributes reported by a backend for one resource.
///
/// Attributes listed in `secrets` carry sensitive values (tokens, keys);
/// anything computed from them is classified secret as well.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveState {
    /// Backend identifier of the resource
    pub id: String,

    /// Attributes as reported by the backend
    #[serde(default)]
    pub attributes: IndexMap<String, serde_json::Value>,

    /// Names of secret-bearing attributes
    #[serde(default)]
    pub secrets: BTreeSet<String>,
}

impl LiveState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: IndexMap::new(),
            secrets: BTreeSet::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_secret_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let key = key.into();
        self.secrets.insert(key.clone());
        self.attributes.insert(key, value);
        self
    }

    pub fn is_secret(&self, attribute: &str) -> bool {
        self.secrets.contains(attribute)
    }

    /// Look up a (possibly nested) attribute.
    ///
    /// `id` falls back to the backend identifier when no attribute of that
    /// name exists. The returned flag is true when the top-level attribute is
    /// secret.
    pub fn lookup(&self, path: &[String]) -> Option<(serde_json::Value, bool)> {
        let (head, rest) = path.split_first()?;

        let root = match self.attributes.get(head) {
            Some(v) => v.clone(),
            None if head == "id" => serde_json::Value::String(self.id.clone()),
            None => return None,
        };

        let mut current = &root;
        for segment in rest {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some((current.clone(), self.is_secret(head)))
    }
}

impl fmt::Debug for LiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted: IndexMap<&str, &dyn fmt::Debug> = self
            .attributes
            .iter()
            .map(|(k, v)| {
                let shown: &dyn fmt::Debug = if self.is_secret(k) { &"[secret]" } else { v };
                (k.as_str(), shown)
            })
            .collect();

        f.debug_struct("LiveState")
            .field("id", &self.id)
            .field("attributes", &redacted)
            .field("secrets", &self.secrets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_lookup_id_fallback() {
        let live = LiveState::new("abc");
        assert_eq!(live.lookup(&path("id")), Some((json!("abc"), false)));
        assert_eq!(live.lookup(&path("name")), None);
    }

    #[test]
    fn test_lookup_nested_and_secret() {
        let live = LiveState::new("db-1")
            .with_attribute("read_replication", json!({ "mode": "disabled" }))
            .with_attribute("tags", json!(["a", "b"]))
            .with_secret_attribute("value", json!("t0ken"));

        assert_eq!(
            live.lookup(&path("read_replication.mode")),
            Some((json!("disabled"), false))
        );
        assert_eq!(live.lookup(&path("tags.1")), Some((json!("b"), false)));
        assert_eq!(live.lookup(&path("value")), Some((json!("t0ken"), true)));
        assert_eq!(live.lookup(&path("read_replication.missing")), None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let live = LiveState::new("tok-1").with_secret_attribute("value", json!("t0ken"));
        let printed = format!("{:?}", live);
        assert!(!printed.contains("t0ken"));
        assert!(printed.contains("[secret]"));
    }
}
