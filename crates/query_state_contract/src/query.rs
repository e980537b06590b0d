//! Query-string wire types exchanged with router adapters and schemas.

use std::collections::{btree_map, BTreeMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
/// One query-string value as a router reports it.
pub enum QueryValue {
    /// A key repeated zero or more times, e.g. `?tag=a&tag=b`.
    Multiple(Vec<String>),
    /// A key present once.
    Single(String),
    /// A key that carries no value (undefined/null on the wire).
    Absent,
}

impl QueryValue {
    /// Returns `true` for absent values, empty strings, and empty sequences.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Self::Absent => true,
            Self::Single(value) => value.is_empty(),
            Self::Multiple(values) => values.is_empty(),
        }
    }

    /// Returns the first string carried by this value.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Absent => None,
            Self::Single(value) => Some(value.as_str()),
            Self::Multiple(values) => values.first().map(String::as_str),
        }
    }

    /// Returns every string carried by this value in wire order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Absent => Vec::new(),
            Self::Single(value) => vec![value.as_str()],
            Self::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Absent => Value::Null,
            Self::Single(value) => Value::String(value.clone()),
            Self::Multiple(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

impl From<Vec<&str>> for QueryValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Multiple(values.into_iter().map(str::to_string).collect())
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Failure converting a typed value into a [`QueryMap`].
pub enum QueryEncodeError {
    /// The value could not be serialized at all.
    #[error("query value serialization failed: {0}")]
    Serialize(String),
    /// The value serialized to something other than a flat object.
    #[error("query value must serialize to an object, got {0}")]
    NotAnObject(&'static str),
    /// A field nested an object or a sequence of non-scalars.
    #[error("query field `{0}` is not a scalar or a sequence of scalars")]
    Nested(String),
}

/// String-keyed query mapping with structural equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryMap(BTreeMap<String, QueryValue>);

impl QueryMap {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mapping from key/value pairs; later duplicates win.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<QueryValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        pairs.into_iter().collect()
    }

    /// Converts a serializable flat value into its wire mapping.
    ///
    /// Strings are kept verbatim, numbers and booleans are stringified, sequences become
    /// [`QueryValue::Multiple`] and `null` becomes [`QueryValue::Absent`].
    ///
    /// # Errors
    ///
    /// Returns an error when the value does not serialize to a flat object.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self, QueryEncodeError> {
        let json =
            serde_json::to_value(value).map_err(|err| QueryEncodeError::Serialize(err.to_string()))?;
        let object = match json {
            Value::Object(object) => object,
            Value::Null => return Ok(Self::new()),
            other => return Err(QueryEncodeError::NotAnObject(json_kind(&other))),
        };

        let mut query = Self::new();
        for (key, field) in object {
            let value = encode_field(&key, field)?;
            query.insert(key, value);
        }
        Ok(query)
    }

    /// Returns the JSON object view used by schema decoding.
    pub fn to_json_object(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.0.get(key)
    }

    /// Returns the first string stored under `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(QueryValue::first)
    }

    /// Inserts or replaces a value, returning the previous one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<QueryValue>,
    ) -> Option<QueryValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
        self.0.remove(key)
    }

    /// Returns `true` when `key` is present, including absent-valued entries.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, QueryValue> {
        self.0.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &QueryValue) -> bool) {
        self.0.retain(|key, value| keep(key, value));
    }

    /// Overlays `other` on top of `self`; keys in `other` win.
    pub fn extend_from(&mut self, other: &QueryMap) {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Returns a new mapping with `other` layered on top of `self`.
    pub fn merged(&self, other: &QueryMap) -> QueryMap {
        let mut merged = self.clone();
        merged.extend_from(other);
        merged
    }
}

impl<K: Into<String>, V: Into<QueryValue>> FromIterator<(K, V)> for QueryMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl IntoIterator for QueryMap {
    type Item = (String, QueryValue);
    type IntoIter = btree_map::IntoIter<String, QueryValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryMap {
    type Item = (&'a String, &'a QueryValue);
    type IntoIter = btree_map::Iter<'a, String, QueryValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn encode_field(key: &str, field: Value) -> Result<QueryValue, QueryEncodeError> {
    match field {
        Value::Null => Ok(QueryValue::Absent),
        Value::Array(items) => items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(|item| scalar_to_string(item).ok_or_else(|| QueryEncodeError::Nested(key.to_string())))
            .collect::<Result<Vec<_>, _>>()
            .map(QueryValue::Multiple),
        other => scalar_to_string(other)
            .map(QueryValue::Single)
            .ok_or_else(|| QueryEncodeError::Nested(key.to_string())),
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(value) => Some(value),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
