//! Masking of sensitive parameter values before they reach logs.

use serde_json::{Map, Value};
use std::collections::HashSet;
use toolguard_core::ToolCall;

/// Replacement for masked values
pub const REDACTED: &str = "***REDACTED***";

const SENSITIVE_MARKERS: [&str; 5] = ["password", "secret", "token", "key", "account"];

/// Masks sensitive parameters in tool calls
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    /// Fields to always redact, compared case-insensitively
    sensitive_fields: HashSet<String>,
}

impl Redactor {
    /// Create a redactor with only the built-in markers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sensitive field name
    #[must_use]
    pub fn with_sensitive_field(mut self, field: impl Into<String>) -> Self {
        self.sensitive_fields.insert(field.into().to_lowercase());
        self
    }

    /// Add several sensitive field names
    #[must_use]
    pub fn with_sensitive_fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fields
            .into_iter()
            .fold(self, |redactor, field| redactor.with_sensitive_field(field))
    }

    /// Check if a field is sensitive
    #[must_use]
    pub fn is_sensitive(&self, field_name: &str) -> bool {
        let lower = field_name.to_lowercase();
        self.sensitive_fields.contains(&lower)
            || SENSITIVE_MARKERS.iter().any(|marker| lower.contains(marker))
    }

    /// Copy of the parameters with sensitive values masked, nested objects
    /// included
    #[must_use]
    pub fn redact_params(&self, params: &Map<String, Value>) -> Map<String, Value> {
        params
            .iter()
            .map(|(key, value)| {
                let masked = if self.is_sensitive(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    self.redact_value(value)
                };
                (key.clone(), masked)
            })
            .collect()
    }

    fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.redact_params(map)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            other => other.clone(),
        }
    }

    /// Copy of a call safe to log
    #[must_use]
    pub fn redact_call(&self, call: &ToolCall) -> ToolCall {
        ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            parameters: self.redact_params(&call.parameters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_markers() {
        let redactor = Redactor::new();
        assert!(redactor.is_sensitive("password"));
        assert!(redactor.is_sensitive("api_key"));
        assert!(redactor.is_sensitive("from_account"));
        assert!(redactor.is_sensitive("AuthToken"));
        assert!(!redactor.is_sensitive("location"));
    }

    #[test]
    fn test_configured_fields() {
        let redactor = Redactor::new().with_sensitive_fields(["IBAN", "ssn"]);
        assert!(redactor.is_sensitive("iban"));
        assert!(redactor.is_sensitive("SSN"));
        assert!(!redactor.is_sensitive("amount"));
    }

    #[test]
    fn test_redact_call_masks_nested_values() {
        let redactor = Redactor::new().with_sensitive_field("to");
        let call = ToolCall::new("c1", "transfer_money")
            .with_parameter("to", json!("acct-99"))
            .with_parameter("amount", json!(500))
            .with_parameter("auth", json!({"token": "abc", "scheme": "bearer"}));

        let redacted = redactor.redact_call(&call);
        assert_eq!(redacted.parameters["to"], json!(REDACTED));
        assert_eq!(redacted.parameters["amount"], json!(500));
        assert_eq!(redacted.parameters["auth"], json!({"token": REDACTED, "scheme": "bearer"}));
        assert_eq!(call.parameters["to"], json!("acct-99"));
    }
}
