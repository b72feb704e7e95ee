//! Core data types returned by the registry

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A flat record as returned by the registry (field name -> JSON value)
pub type Row = Map<String, Value>;

/// Opaque identifier of a builder or umbrella organization
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Which kind of registry entity an ID refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Builder,
    Umbrella,
}

impl EntityKind {
    /// Label used in master artifact names and the tracking table
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Builder => "builder",
            EntityKind::Umbrella => "umbrella",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Body of one sub-resource response
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `null`, empty body, `{}` or `[]`
    Empty,
    /// A single object
    Record(Row),
    /// A list; elements are normally objects but the registry does not promise it
    List(Vec<Value>),
}

impl Payload {
    /// Classify a decoded JSON body. Scalars at the top level are rejected.
    pub fn from_json(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(Payload::Empty),
            Value::Object(map) if map.is_empty() => Ok(Payload::Empty),
            Value::Object(map) => Ok(Payload::Record(map)),
            Value::Array(items) if items.is_empty() => Ok(Payload::Empty),
            Value::Array(items) => Ok(Payload::List(items)),
            other => Err(format!(
                "expected a JSON object or array, got {}",
                json_type_name(&other)
            )),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Empty => true,
            Payload::Record(row) => row.is_empty(),
            Payload::List(items) => items.is_empty(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Payload::Empty => Value::Null,
            Payload::Record(row) => Value::Object(row.clone()),
            Payload::List(items) => Value::Array(items.clone()),
        }
    }

    /// Number of rows this payload contributes to a table
    pub fn row_count(&self) -> usize {
        match self {
            Payload::Empty => 0,
            Payload::Record(_) => 1,
            Payload::List(items) => items.len(),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// All sub-resources fetched for one entity, in endpoint order
#[derive(Debug, Clone, PartialEq)]
pub struct DetailBundle {
    pub entity_id: EntityId,
    pub kind: EntityKind,
    entries: Vec<(String, Payload)>,
}

impl DetailBundle {
    pub fn new(entity_id: EntityId, kind: EntityKind) -> Self {
        Self {
            entity_id,
            kind,
            entries: Vec::new(),
        }
    }

    /// Insert or replace the payload for a key, keeping first insertion order
    pub fn insert(&mut self, key: impl Into<String>, payload: Payload) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = payload,
            None => self.entries.push((key, payload)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Payload> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, payload)| payload)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Payload)> {
        self.entries.iter().map(|(k, p)| (k.as_str(), p))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, Payload)> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_classification() {
        assert_eq!(Payload::from_json(Value::Null).unwrap(), Payload::Empty);
        assert_eq!(Payload::from_json(json!([])).unwrap(), Payload::Empty);
        assert_eq!(Payload::from_json(json!({})).unwrap(), Payload::Empty);

        match Payload::from_json(json!({"name": "Acme"})).unwrap() {
            Payload::Record(row) => assert_eq!(row["name"], "Acme"),
            other => panic!("expected record, got {:?}", other),
        }

        match Payload::from_json(json!([{"a": 1}, {"a": 2}])).unwrap() {
            Payload::List(items) => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_rejects_scalars() {
        let err = Payload::from_json(json!("oops")).unwrap_err();
        assert!(err.contains("string"));
        assert!(Payload::from_json(json!(42)).is_err());
    }

    #[test]
    fn test_bundle_keeps_insertion_order() {
        let mut bundle = DetailBundle::new("B1".into(), EntityKind::Builder);
        bundle.insert("summary", Payload::Empty);
        bundle.insert("members", Payload::List(vec![json!({"n": 1})]));
        bundle.insert("summary", Payload::Record(Row::new()));

        let keys: Vec<&str> = bundle.keys().collect();
        assert_eq!(keys, vec!["summary", "members"]);
        assert_eq!(bundle.get("summary"), Some(&Payload::Record(Row::new())));
    }

    #[test]
    fn test_entity_kind_labels() {
        assert_eq!(EntityKind::Builder.label(), "builder");
        assert_eq!(EntityKind::Umbrella.to_string(), "umbrella");
    }
}
