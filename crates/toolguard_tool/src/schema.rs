//! Tool schemas for parameter validation.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::path::Path;

/// Error raised while loading or checking schemas
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Schema file could not be read
    #[error("cannot read schema file {path}: {reason}")]
    Io {
        /// File path
        path: String,
        /// OS error
        reason: String,
    },
    /// Schema document is not valid YAML for this format
    #[error("invalid schema document: {0}")]
    Parse(String),
    /// Tool name breaks the naming convention
    #[error("invalid tool name: {name:?}")]
    InvalidName {
        /// Offending name
        name: String,
    },
    /// Parameter definition is inconsistent
    #[error("invalid parameter {tool}.{field}: {reason}")]
    InvalidParameter {
        /// Tool name
        tool: String,
        /// Parameter name
        field: String,
        /// What is wrong
        reason: String,
    },
}

/// Declared type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// JSON string
    String,
    /// Any JSON number
    Number,
    /// JSON number without fractional part
    Integer,
    /// JSON boolean
    Boolean,
    /// JSON array
    Array,
    /// JSON object
    Object,
}

impl ParamType {
    /// Check whether a JSON value has this type
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    /// Schema name of the type
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Name of the JSON type a value actually has
    #[must_use]
    pub fn describe(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_f64() => "number",
            Value::Number(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled regular expression that serializes as its source
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile a pattern
    ///
    /// # Errors
    ///
    /// Returns error if the expression is not a valid regex
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Self)
    }

    /// Source text
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Check whether the pattern matches anywhere in `text`
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::new(&source).map_err(serde::de::Error::custom)
    }
}

/// Schema of one parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Expected type
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Whether the parameter must be present
    #[serde(default)]
    pub required: bool,
    /// Allowed values for string parameters
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    /// Regex a string value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Maximum string length in chars
    #[serde(default, alias = "maxlength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Real-world entity kind the value denotes (city, account, symbol, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterSchema {
    /// Create an optional parameter of the given type
    #[must_use]
    pub fn new(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: false,
            allowed: Vec::new(),
            pattern: None,
            max_length: None,
            entity: None,
            description: None,
        }
    }

    /// Create an optional string parameter
    #[must_use]
    pub fn string() -> Self {
        Self::new(ParamType::String)
    }

    /// Create an optional number parameter
    #[must_use]
    pub fn number() -> Self {
        Self::new(ParamType::Number)
    }

    /// Mark as required
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict to an enumeration
    #[must_use]
    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = values.into_iter().map(Into::into).collect();
        self
    }

    /// Set maximum length
    #[must_use]
    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Set a pattern
    #[must_use]
    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Mark the value as denoting an entity of `kind`
    #[must_use]
    pub fn entity(mut self, kind: impl Into<String>) -> Self {
        self.entity = Some(kind.into());
        self
    }

    /// Check whether the parameter is an enumeration
    #[must_use]
    pub fn is_enum(&self) -> bool {
        !self.allowed.is_empty()
    }
}

fn default_allow_additional() -> bool {
    true
}

/// Schema for a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name
    pub name: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameters in declaration order
    #[serde(default)]
    pub parameters: IndexMap<String, ParameterSchema>,
    /// Whether parameters not declared here are tolerated
    #[serde(default = "default_allow_additional")]
    pub allow_additional: bool,
}

impl ToolSchema {
    /// Create a new tool schema
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: IndexMap::new(),
            allow_additional: true,
        }
    }

    /// Add a parameter
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, schema: ParameterSchema) -> Self {
        self.parameters.insert(name.into(), schema);
        self
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Reject parameters that are not declared
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.allow_additional = false;
        self
    }

    /// Names of required parameters
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|(_, p)| p.required)
            .map(|(name, _)| name.as_str())
    }

    /// Check the schema itself for consistency
    ///
    /// # Errors
    ///
    /// Returns error if the name breaks convention or a parameter is
    /// inconsistent
    pub fn check(&self) -> Result<(), SchemaError> {
        check_name(&self.name)?;

        for (field, param) in &self.parameters {
            let invalid = |reason: &str| SchemaError::InvalidParameter {
                tool: self.name.clone(),
                field: field.clone(),
                reason: reason.to_string(),
            };
            if field.trim().is_empty() {
                return Err(invalid("empty parameter name"));
            }
            if param.param_type != ParamType::String {
                if param.is_enum() {
                    return Err(invalid("enum is only supported on string parameters"));
                }
                if param.pattern.is_some() || param.max_length.is_some() {
                    return Err(invalid("pattern and max_length need a string parameter"));
                }
            }
            if param.allowed.iter().any(|v| v.is_empty()) {
                return Err(invalid("enum contains an empty value"));
            }
        }

        Ok(())
    }
}

/// Tool name must be lowercase alphanumeric with single underscores
fn check_name(name: &str) -> Result<(), SchemaError> {
    let invalid = || SchemaError::InvalidName {
        name: name.to_string(),
    };

    if name.is_empty() {
        return Err(invalid());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(invalid());
    }
    if name.starts_with('_') || name.ends_with('_') || name.contains("__") {
        return Err(invalid());
    }

    Ok(())
}

/// A YAML document holding tool schemas
///
/// ```yaml
/// schemas:
///   - name: get_weather
///     parameters:
///       location: { type: string, required: true, entity: city }
///       units: { type: string, enum: [celsius, fahrenheit] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Schemas in file order
    #[serde(default)]
    pub schemas: Vec<ToolSchema>,
}

impl SchemaDocument {
    /// Parse a document from YAML text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid schema document
    pub fn from_yaml_str(text: &str) -> Result<Self, SchemaError> {
        serde_yaml::from_str(text).map_err(|e| SchemaError::Parse(e.to_string()))
    }

    /// Read and parse a document from disk
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|e| SchemaError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_schema_new() {
        let schema = ToolSchema::new("get_weather")
            .with_parameter("location", ParameterSchema::string().required())
            .with_parameter("units", ParameterSchema::string());
        assert_eq!(schema.name, "get_weather");
        assert_eq!(schema.required_fields().collect::<Vec<_>>(), vec!["location"]);
        assert!(schema.allow_additional);
    }

    #[test]
    fn test_param_type_matches() {
        assert!(ParamType::Number.matches(&json!(500)));
        assert!(ParamType::Number.matches(&json!(12.5)));
        assert!(ParamType::Integer.matches(&json!(7)));
        assert!(!ParamType::Integer.matches(&json!(7.5)));
        assert!(!ParamType::String.matches(&json!(7)));
        assert_eq!(ParamType::describe(&json!(7.5)), "number");
        assert_eq!(ParamType::describe(&json!(null)), "null");
    }

    #[test]
    fn test_check_name() {
        assert!(check_name("get_weather").is_ok());
        assert!(check_name("lookup2").is_ok());
        assert!(check_name("").is_err());
        assert!(check_name("GetWeather").is_err());
        assert!(check_name("_private").is_err());
        assert!(check_name("trailing_").is_err());
        assert!(check_name("double__underscore").is_err());
    }

    #[test]
    fn test_check_rejects_enum_on_number() {
        let schema = ToolSchema::new("transfer_money")
            .with_parameter("amount", ParameterSchema::number().with_enum(["1", "2"]));
        assert!(matches!(
            schema.check(),
            Err(SchemaError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_document_from_yaml() {
        let doc = SchemaDocument::from_yaml_str(
            r#"
schemas:
  - name: get_weather
    parameters:
      location: { type: string, required: true, maxlength: 100, entity: city }
      units: { type: string, enum: [celsius, fahrenheit] }
  - name: get_stock_price
    allow_additional: false
    parameters:
      symbol: { type: string, required: true, pattern: "^[A-Z.]{1,6}$", entity: symbol }
"#,
        )
        .unwrap();

        assert_eq!(doc.schemas.len(), 2);
        let weather = &doc.schemas[0];
        assert_eq!(weather.parameters["location"].max_length, Some(100));
        assert_eq!(weather.parameters["location"].entity.as_deref(), Some("city"));
        assert_eq!(weather.parameters["units"].allowed, vec!["celsius", "fahrenheit"]);
        let stock = &doc.schemas[1];
        assert!(!stock.allow_additional);
        assert!(stock.parameters["symbol"].pattern.as_ref().unwrap().is_match("AAPL"));
    }

    #[test]
    fn test_document_rejects_bad_pattern() {
        let result = SchemaDocument::from_yaml_str(
            r#"
schemas:
  - name: broken
    parameters:
      x: { type: string, pattern: "([" }
"#,
        );
        assert!(matches!(result, Err(SchemaError::Parse(_))));
    }

    #[test]
    fn test_document_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemas.yaml");
        std::fs::write(
            &path,
            "schemas:\n  - name: get_time\n    parameters:\n      zone: { type: string }\n",
        )
        .unwrap();

        let doc = SchemaDocument::from_path(&path).unwrap();
        assert_eq!(doc.schemas.len(), 1);
        assert_eq!(doc.schemas[0].name, "get_time");
        assert_eq!(doc.schemas[0].parameters["zone"].param_type, ParamType::String);
    }

    #[test]
    fn test_document_from_missing_file() {
        let result = SchemaDocument::from_path(Path::new("/nonexistent/schemas.yaml"));
        assert!(matches!(result, Err(SchemaError::Io { .. })));
    }
}
