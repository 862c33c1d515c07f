//! Typed view of a structurally valid call.
//!
//! Upstream parameters are loose JSON. Once a call has passed structural
//! validation it is converted here, and everything downstream (policy,
//! grounding) works on [`TypedCall`] only.

use crate::schema::{ParamType, ToolSchema};
use indexmap::IndexMap;
use serde_json::Value;
use toolguard_core::{ToolCall, ToolCallId};

/// Normalization error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    /// Value does not have the declared type
    SchemaMismatch {
        /// Parameter name
        field: String,
        /// Declared type
        expected: ParamType,
    },
}

impl std::fmt::Display for NormalizationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SchemaMismatch { field, expected } => {
                write!(f, "Schema mismatch: {} is not {}", field, expected)
            }
        }
    }
}

impl std::error::Error for NormalizationError {}

/// A typed parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Text
    Str(String),
    /// Integer
    Int(i64),
    /// Floating point number
    Num(f64),
    /// Boolean
    Bool(bool),
    /// Ordered list
    List(Vec<ParamValue>),
    /// Nested object
    Map(IndexMap<String, ParamValue>),
    /// `null` inside a list or object
    Null,
}

impl ParamValue {
    /// Convert a JSON value by its own shape
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Self::Int(i),
                (None, Some(f)) => Self::Num(f),
                (None, None) => Self::Null,
            },
            Value::String(s) => Self::Str(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Back to JSON
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Int(i) => Value::from(*i),
            Self::Num(n) => Value::from(*n),
            Self::Bool(b) => Value::Bool(*b),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Null => Value::Null,
        }
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric reading of the value
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Render a scalar as text, the way it would be written in a message
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Num(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::List(_) | Self::Map(_) | Self::Null => None,
        }
    }
}

/// A typed parameter with the entity kind its schema assigns
#[derive(Debug, Clone, PartialEq)]
pub struct TypedParam {
    /// The value
    pub value: ParamValue,
    /// Entity kind, when the schema annotates one
    pub entity: Option<String>,
}

/// A structurally valid call with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TypedCall {
    /// Call identifier
    pub id: ToolCallId,
    /// Tool name
    pub name: String,
    /// Parameters in call order; top-level nulls are dropped
    pub params: IndexMap<String, TypedParam>,
}

impl TypedCall {
    /// Convert a call that already passed structural validation.
    ///
    /// # Errors
    ///
    /// Returns error if a value does not have its declared type
    pub fn from_validated(call: &ToolCall, schema: &ToolSchema) -> Result<Self, NormalizationError> {
        let mut params = IndexMap::with_capacity(call.parameters.len());

        for (field, raw) in &call.parameters {
            if raw.is_null() {
                continue;
            }
            let declared = schema.parameters.get(field);
            let value = match declared.map(|p| p.param_type) {
                Some(expected @ ParamType::Integer) => raw
                    .as_i64()
                    .map(ParamValue::Int)
                    .ok_or_else(|| NormalizationError::SchemaMismatch {
                        field: field.clone(),
                        expected,
                    })?,
                Some(expected @ ParamType::Number) => raw
                    .as_f64()
                    .map(ParamValue::Num)
                    .ok_or_else(|| NormalizationError::SchemaMismatch {
                        field: field.clone(),
                        expected,
                    })?,
                _ => ParamValue::from_json(raw),
            };

            params.insert(
                field.clone(),
                TypedParam {
                    value,
                    entity: declared.and_then(|p| p.entity.clone()),
                },
            );
        }

        Ok(Self {
            id: call.id.clone(),
            name: call.name.clone(),
            params,
        })
    }

    /// Get a parameter value
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&ParamValue> {
        self.params.get(field).map(|p| &p.value)
    }

    /// Parameters annotated with an entity kind, in call order
    pub fn entity_fields(&self) -> impl Iterator<Item = (&str, &str, &ParamValue)> {
        self.params.iter().filter_map(|(field, p)| {
            p.entity
                .as_deref()
                .map(|kind| (field.as_str(), kind, &p.value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParameterSchema;
    use serde_json::json;

    fn transfer() -> ToolSchema {
        ToolSchema::new("transfer_money")
            .with_parameter("from", ParameterSchema::string().required().entity("account"))
            .with_parameter("amount", ParameterSchema::number().required())
            .with_parameter("count", ParameterSchema::new(ParamType::Integer))
    }

    #[test]
    fn test_from_validated_follows_schema_types() {
        let call = ToolCall::new("c1", "transfer_money")
            .with_parameter("from", json!("savings"))
            .with_parameter("amount", json!(500))
            .with_parameter("count", json!(2))
            .with_parameter("memo", json!(["a", 1]));
        let typed = TypedCall::from_validated(&call, &transfer()).unwrap();

        assert_eq!(typed.get("from"), Some(&ParamValue::Str("savings".to_string())));
        assert_eq!(typed.get("amount"), Some(&ParamValue::Num(500.0)));
        assert_eq!(typed.get("count"), Some(&ParamValue::Int(2)));
        assert_eq!(
            typed.get("memo"),
            Some(&ParamValue::List(vec![
                ParamValue::Str("a".to_string()),
                ParamValue::Int(1)
            ]))
        );
    }

    #[test]
    fn test_entity_fields() {
        let call = ToolCall::new("c1", "transfer_money")
            .with_parameter("from", json!("savings"))
            .with_parameter("amount", json!(5));
        let typed = TypedCall::from_validated(&call, &transfer()).unwrap();
        let entities: Vec<_> = typed.entity_fields().map(|(f, k, _)| (f, k)).collect();
        assert_eq!(entities, vec![("from", "account")]);
    }

    #[test]
    fn test_top_level_nulls_dropped() {
        let call = ToolCall::new("c1", "transfer_money")
            .with_parameter("from", json!("savings"))
            .with_parameter("count", json!(null));
        let typed = TypedCall::from_validated(&call, &transfer()).unwrap();
        assert!(typed.get("count").is_none());
    }

    #[test]
    fn test_nested_nulls_kept() {
        let schema = transfer().with_parameter("options", ParameterSchema::new(ParamType::Object));
        let call = ToolCall::new("c1", "transfer_money")
            .with_parameter("from", json!("savings"))
            .with_parameter("options", json!({"unit": null}))
            .with_parameter("memo", json!([null, "x"]))
            .with_parameter("extra", json!({"a": null}));
        let typed = TypedCall::from_validated(&call, &schema).unwrap();

        let options = typed.get("options").unwrap();
        assert!(matches!(options, ParamValue::Map(map) if map["unit"] == ParamValue::Null));
        assert_eq!(
            typed.get("memo"),
            Some(&ParamValue::List(vec![ParamValue::Null, ParamValue::Str("x".to_string())]))
        );
        assert_eq!(typed.get("extra").unwrap().to_json(), json!({"a": null}));
    }

    #[test]
    fn test_to_text_and_json() {
        assert_eq!(ParamValue::Int(42).to_text().as_deref(), Some("42"));
        assert_eq!(ParamValue::Num(2.5).to_text().as_deref(), Some("2.5"));
        assert_eq!(ParamValue::Bool(true).to_json(), json!(true));
        assert!(ParamValue::List(vec![]).to_text().is_none());
    }
}
