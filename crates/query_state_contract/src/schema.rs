//! Schema contract and a declarative object schema decoded through serde.

use std::{fmt, marker::PhantomData};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::query::{QueryMap, QueryValue};

#[derive(Debug, Clone, PartialEq, Eq)]
/// One failed check inside a [`ValidationError`].
pub struct ValidationIssue {
    /// Query key the issue is attached to; empty for object-level issues.
    pub path: String,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationIssue {
    /// Creates an issue for `path`.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", format_issues(.issues))]
/// Structured schema failure.
pub struct ValidationError {
    /// Every issue found, in field declaration order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// Creates an error with a single issue.
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue::new(path, message)],
        }
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validates query mappings into a typed value.
///
/// Implementations must be deterministic: validating the same mapping twice yields equal values.
pub trait QuerySchema {
    /// Typed result of a successful validation.
    type Value: Clone + PartialEq + Default + Serialize + 'static;

    /// Validates `input`, ignoring keys the schema does not declare.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when `input` does not satisfy the schema.
    fn validate(&self, input: &QueryMap) -> Result<Self::Value, ValidationError>;

    /// Keys declared by the schema. Empty when the schema cannot enumerate them.
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Schema defaults, derived by validating an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the schema has required fields without defaults.
    fn defaults(&self) -> Result<Self::Value, ValidationError> {
        self.validate(&QueryMap::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Scalar or sequence shape expected for one query field.
pub enum FieldKind {
    /// Any single string.
    String,
    /// Signed integer, coerced from its decimal string.
    Integer,
    /// Floating point number, coerced from its string form.
    Number,
    /// `true` or `false`.
    Boolean,
    /// One of a fixed set of strings.
    Enum(Vec<String>),
    /// Zero or more strings; a single value is promoted to a one-element list.
    StringList,
}

impl FieldKind {
    fn label(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Enum(_) => "enum",
            Self::StringList => "string list",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Declaration of one query field.
pub struct FieldSchema {
    kind: FieldKind,
    optional: bool,
    default: Option<Value>,
}

impl FieldSchema {
    /// Creates a required field of `kind`.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            optional: false,
            default: None,
        }
    }

    /// Required string field.
    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    /// Required integer field.
    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    /// Required number field.
    pub fn number() -> Self {
        Self::new(FieldKind::Number)
    }

    /// Required boolean field.
    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    /// Required string list field.
    pub fn string_list() -> Self {
        Self::new(FieldKind::StringList)
    }

    /// Required enum field accepting `variants`.
    pub fn one_of<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(FieldKind::Enum(
            variants.into_iter().map(Into::into).collect(),
        ))
    }

    /// Marks the field optional; a missing value decodes as `null`.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Supplies the value used when the field is missing.
    ///
    /// A default value that fails to serialize is ignored.
    pub fn default_value<T: Serialize>(mut self, value: T) -> Self {
        self.default = serde_json::to_value(value).ok();
        self
    }

    /// Kind of the field.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    fn coerce(&self, value: &QueryValue) -> Result<Value, String> {
        match (&self.kind, value) {
            (FieldKind::StringList, QueryValue::Single(raw)) => {
                Ok(Value::Array(vec![Value::String(raw.clone())]))
            }
            (FieldKind::StringList, QueryValue::Multiple(values)) => Ok(Value::Array(
                values.iter().cloned().map(Value::String).collect(),
            )),
            (kind, QueryValue::Multiple(_)) => {
                Err(format!("expected {}, received array", kind.label()))
            }
            (FieldKind::String, QueryValue::Single(raw)) => Ok(Value::String(raw.clone())),
            (FieldKind::Integer, QueryValue::Single(raw)) => raw
                .trim()
                .parse::<i64>()
                .map(|parsed| Value::Number(parsed.into()))
                .map_err(|_| format!("expected integer, received {raw:?}")),
            (FieldKind::Number, QueryValue::Single(raw)) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("expected number, received {raw:?}")),
            (FieldKind::Boolean, QueryValue::Single(raw)) => match raw.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("expected boolean, received {raw:?}")),
            },
            (FieldKind::Enum(variants), QueryValue::Single(raw)) => {
                if variants.iter().any(|variant| variant == raw) {
                    Ok(Value::String(raw.clone()))
                } else {
                    Err(format!(
                        "expected one of [{}], received {raw:?}",
                        variants.join(", ")
                    ))
                }
            }
            (_, QueryValue::Absent) => Err("required".to_string()),
        }
    }
}

/// Declarative object schema: coerces query strings per field, then deserializes `T`.
///
/// Keys not declared with [`ObjectSchema::field`] are stripped before decoding.
pub struct ObjectSchema<T> {
    fields: Vec<(String, FieldSchema)>,
    marker: PhantomData<fn() -> T>,
}

impl<T> Default for ObjectSchema<T> {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            marker: PhantomData,
        }
    }
}

impl<T> Clone for ObjectSchema<T> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ObjectSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSchema")
            .field("fields", &self.fields)
            .finish()
    }
}

impl<T> ObjectSchema<T> {
    /// Creates a schema with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a field. Redeclaring a key replaces the earlier declaration.
    pub fn field(mut self, key: impl Into<String>, field: FieldSchema) -> Self {
        let key = key.into();
        self.fields.retain(|(existing, _)| *existing != key);
        self.fields.push((key, field));
        self
    }

    /// Returns the declaration for `key`.
    pub fn field_schema(&self, key: &str) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, field)| field)
    }

    fn coerce_object(&self, input: &QueryMap) -> Result<Map<String, Value>, ValidationError> {
        let mut object = Map::new();
        let mut issues = Vec::new();

        for (key, field) in &self.fields {
            let raw = input.get(key).filter(|value| **value != QueryValue::Absent);
            let coerced = match raw {
                Some(value) => field.coerce(value),
                None => match (&field.default, field.optional) {
                    (Some(default), _) => Ok(default.clone()),
                    (None, true) => Ok(Value::Null),
                    (None, false) => Err("required".to_string()),
                },
            };
            match coerced {
                Ok(value) => {
                    object.insert(key.clone(), value);
                }
                Err(message) => issues.push(ValidationIssue::new(key.clone(), message)),
            }
        }

        if issues.is_empty() {
            Ok(object)
        } else {
            Err(ValidationError { issues })
        }
    }
}

impl<T> QuerySchema for ObjectSchema<T>
where
    T: Clone + PartialEq + Default + Serialize + DeserializeOwned + 'static,
{
    type Value = T;

    fn validate(&self, input: &QueryMap) -> Result<T, ValidationError> {
        let object = self.coerce_object(input)?;
        serde_json::from_value(Value::Object(object))
            .map_err(|err| ValidationError::single("", err.to_string()))
    }

    fn keys(&self) -> Vec<String> {
        self.fields.iter().map(|(key, _)| key.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Listing {
        search: Option<String>,
        page: i64,
        tags: Option<Vec<String>>,
        status: String,
    }

    fn listing_schema() -> ObjectSchema<Listing> {
        ObjectSchema::new()
            .field("search", FieldSchema::string().optional())
            .field("page", FieldSchema::integer().default_value(1))
            .field("tags", FieldSchema::string_list().optional())
            .field(
                "status",
                FieldSchema::one_of(["active", "inactive"]).default_value("active"),
            )
    }

    #[test]
    fn coerces_strings_and_strips_unknown_keys() {
        let input = QueryMap::from_pairs([
            ("search", QueryValue::from("test")),
            ("page", QueryValue::from("2")),
            ("tags", QueryValue::from("solo")),
            ("invalidParam", QueryValue::from("value")),
        ]);

        assert_eq!(
            listing_schema().validate(&input).expect("valid"),
            Listing {
                search: Some("test".into()),
                page: 2,
                tags: Some(vec!["solo".into()]),
                status: "active".into(),
            }
        );
    }

    #[test]
    fn empty_input_yields_defaults() {
        assert_eq!(
            listing_schema().defaults().expect("defaults"),
            Listing {
                search: None,
                page: 1,
                tags: None,
                status: "active".into(),
            }
        );
    }

    #[test]
    fn reports_every_failing_field() {
        let input = QueryMap::from_pairs([("page", "two"), ("status", "archived")]);
        let err = listing_schema().validate(&input).expect_err("invalid");
        let paths = err
            .issues
            .iter()
            .map(|issue| issue.path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["page", "status"]);
        assert!(err.to_string().starts_with("page: expected integer"));
    }

    #[test]
    fn required_field_without_default_rejects_absent_values() {
        let schema = ObjectSchema::<Listing>::new().field("status", FieldSchema::string());
        let input = QueryMap::from_pairs([("status", QueryValue::Absent)]);
        assert_eq!(
            schema.validate(&input),
            Err(ValidationError::single("status", "required"))
        );
    }

    #[test]
    fn scalar_fields_reject_repeated_keys() {
        let input = QueryMap::from_pairs([("search", vec!["a", "b"])]);
        let err = listing_schema().validate(&input).expect_err("array");
        assert_eq!(err.issues[0].message, "expected string, received array");
    }
}
