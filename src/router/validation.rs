//! Schema-driven validation of request data.
//!
//! A [`Schema`] maps field names to [`FieldSchema`] descriptors. Validation
//! returns a new object holding only the schema's fields, coercing string
//! inputs to numbers or booleans where the descriptor asks for them, or a
//! [`ValidationError`] listing every field that failed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    File,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "a string",
            FieldType::Number => "a number",
            FieldType::Boolean => "a boolean",
            FieldType::Object => "an object",
            FieldType::Array => "an array",
            FieldType::File => "a file",
        };
        f.write_str(name)
    }
}

/// Descriptor for one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// Message reported instead of the generated one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    /// Form input hint for documentation consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_type: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_schema: Option<Schema>,
}

impl FieldSchema {
    /// A typed field. Required unless marked [`optional`](Self::optional).
    pub fn new(kind: FieldType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// An unconstrained, optional field.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }

    pub fn err(mut self, message: impl Into<String>) -> Self {
        self.err = Some(message.into());
        self
    }

    pub fn input_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = Some(input_type.into());
        self
    }

    pub fn array_of(mut self, kind: FieldType) -> Self {
        self.array_type = Some(kind);
        self
    }

    pub fn object_schema(mut self, schema: Schema) -> Self {
        self.object_schema = Some(schema);
        self
    }

    /// Untyped descriptors are optional; typed ones default to required.
    pub fn is_required(&self) -> bool {
        self.kind.is_some() && self.required.unwrap_or(true)
    }
}

/// One failing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

/// Every field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", summarize(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

fn summarize(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    /// Whether `field` is among the failures.
    pub fn has_field(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

/// Field name to descriptor mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: BTreeMap<String, FieldSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field descriptor.
    pub fn field(mut self, name: impl Into<String>, field: FieldSchema) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldSchema)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate `data` and return the coerced object.
    pub fn validate(&self, data: &Value) -> Result<Value, ValidationError> {
        self.validate_at("", data).map(Value::Object)
    }

    fn validate_at(&self, prefix: &str, data: &Value) -> Result<Map<String, Value>, ValidationError> {
        let Value::Object(input) = data else {
            let at = if prefix.is_empty() { "body" } else { prefix };
            return Err(ValidationError::single(at, format!("{} must be an object", at)));
        };

        let mut output = Map::new();
        let mut issues = Vec::new();

        for (name, field) in &self.fields {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };

            let value = match input.get(name) {
                Some(Value::Null) | None => {
                    if field.is_required() {
                        issues.push(FieldIssue {
                            message: field
                                .err
                                .clone()
                                .unwrap_or_else(|| format!("{} is required", path)),
                            field: path,
                        });
                    }
                    continue;
                }
                Some(value) => value,
            };

            match check(&path, field, value) {
                Ok(value) => {
                    output.insert(name.clone(), value);
                }
                Err(mut nested) => {
                    if let Some(message) = &field.err {
                        for issue in &mut nested.issues {
                            issue.message = message.clone();
                        }
                    }
                    issues.extend(nested.issues);
                }
            }
        }

        if issues.is_empty() {
            Ok(output)
        } else {
            Err(ValidationError { issues })
        }
    }
}

fn check(path: &str, field: &FieldSchema, value: &Value) -> Result<Value, ValidationError> {
    let Some(kind) = field.kind else {
        return Ok(value.clone());
    };
    match kind {
        FieldType::Array => {
            let Value::Array(items) = value else {
                return Err(mismatch(path, kind));
            };
            let Some(item_kind) = field.array_type else {
                return Ok(value.clone());
            };
            let item_field = FieldSchema {
                kind: Some(item_kind),
                object_schema: field.object_schema.clone(),
                ..FieldSchema::default()
            };
            let mut out = Vec::with_capacity(items.len());
            let mut issues = Vec::new();
            for (index, item) in items.iter().enumerate() {
                match check(&format!("{}[{}]", path, index), &item_field, item) {
                    Ok(item) => out.push(item),
                    Err(err) => issues.extend(err.issues),
                }
            }
            if issues.is_empty() {
                Ok(Value::Array(out))
            } else {
                Err(ValidationError { issues })
            }
        }
        FieldType::Object => match &field.object_schema {
            Some(schema) => schema.validate_at(path, value).map(Value::Object),
            None if value.is_object() => Ok(value.clone()),
            None => Err(mismatch(path, kind)),
        },
        _ => coerce(kind, value).ok_or_else(|| mismatch(path, kind)),
    }
}

fn coerce(kind: FieldType, value: &Value) -> Option<Value> {
    match (kind, value) {
        (FieldType::String, Value::String(_))
        | (FieldType::Number, Value::Number(_))
        | (FieldType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (FieldType::Number, Value::String(text)) => {
            let text = text.trim();
            if let Ok(int) = text.parse::<i64>() {
                return Some(Value::Number(int.into()));
            }
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }
        (FieldType::Boolean, Value::String(text)) => match text.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (FieldType::File, Value::String(_) | Value::Object(_)) => Some(value.clone()),
        _ => None,
    }
}

fn mismatch(path: &str, kind: FieldType) -> ValidationError {
    ValidationError::single(path, format!("{} must be {}", path, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pet_schema() -> Schema {
        Schema::new()
            .field(
                "name",
                FieldSchema::new(FieldType::String).err("please provide dog name"),
            )
            .field("age", FieldSchema::new(FieldType::Number).optional().input_type("number"))
            .field("id", FieldSchema::any())
    }

    #[test]
    fn test_valid_input_returned_unchanged() {
        let schema = Schema::new().field("name", FieldSchema::new(FieldType::String));
        let value = schema.validate(&json!({"name": "Rex"})).unwrap();
        assert_eq!(value, json!({"name": "Rex"}));
    }

    #[test]
    fn test_missing_required_field_is_reported() {
        let schema = Schema::new().field("name", FieldSchema::new(FieldType::String));
        let err = schema.validate(&json!({})).unwrap_err();
        assert!(err.has_field("name"));
        assert_eq!(err.to_string(), "name is required");
    }

    #[test]
    fn test_custom_message_and_untyped_fields() {
        let err = pet_schema().validate(&json!({"id": 3})).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.to_string(), "please provide dog name");
    }

    #[test]
    fn test_coercion_and_unknown_keys_dropped() {
        let value = pet_schema()
            .validate(&json!({"name": "Rex", "age": "4", "colour": "brown"}))
            .unwrap();
        assert_eq!(value, json!({"name": "Rex", "age": 4}));
    }

    #[test]
    fn test_type_mismatch() {
        let err = pet_schema()
            .validate(&json!({"name": "Rex", "age": "old"}))
            .unwrap_err();
        assert_eq!(err.issues[0].message, "age must be a number");
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let location = Schema::new()
            .field("name", FieldSchema::new(FieldType::String))
            .field("location", FieldSchema::new(FieldType::String));
        let schema = Schema::new()
            .field("tags", FieldSchema::new(FieldType::Array).array_of(FieldType::String))
            .field(
                "suppliers",
                FieldSchema::new(FieldType::Array)
                    .array_of(FieldType::Object)
                    .object_schema(location.clone()),
            )
            .field(
                "metadata",
                FieldSchema::new(FieldType::Object).object_schema(location),
            );

        let err = schema
            .validate(&json!({
                "tags": ["a", 1],
                "suppliers": [{"name": "acme"}],
                "metadata": {"name": "x", "location": "y"}
            }))
            .unwrap_err();
        assert!(err.has_field("tags[1]"));
        assert!(err.has_field("suppliers[0].location"));
        assert!(!err.has_field("metadata"));
    }

    #[test]
    fn test_non_object_input() {
        let err = pet_schema().validate(&json!([1, 2])).unwrap_err();
        assert!(err.has_field("body"));
    }

    #[test]
    fn test_schema_deserializes_from_descriptor_map() {
        let schema: Schema = serde_json::from_value(json!({
            "name": {"err": "please provide dog name", "type": "string"},
            "image": {"type": "string", "required": false, "inputType": "file"},
            "id": {}
        }))
        .unwrap();
        assert!(schema.get("name").unwrap().is_required());
        assert!(!schema.get("image").unwrap().is_required());
        assert!(!schema.get("id").unwrap().is_required());
    }
}
