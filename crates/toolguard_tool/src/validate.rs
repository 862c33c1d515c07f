//! Structural validation of proposed calls against their schema.

use crate::schema::{ParamType, ToolSchema};
use serde_json::Value;
use toolguard_core::ToolCall;

/// One structural problem with a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Required parameter absent or null
    MissingField {
        /// Parameter name
        field: String,
    },
    /// Value has the wrong JSON type
    TypeMismatch {
        /// Parameter name
        field: String,
        /// Declared type
        expected: ParamType,
        /// Type actually received
        actual: String,
    },
    /// String value outside the declared enumeration
    NotInEnum {
        /// Parameter name
        field: String,
        /// Value received
        value: String,
        /// Allowed values
        allowed: Vec<String>,
    },
    /// String longer than `max_length`
    TooLong {
        /// Parameter name
        field: String,
        /// Declared maximum
        max: usize,
        /// Length received
        actual: usize,
    },
    /// String does not match the declared pattern
    PatternMismatch {
        /// Parameter name
        field: String,
        /// Pattern source
        pattern: String,
    },
    /// Parameter not declared by a strict schema
    UnexpectedField {
        /// Parameter name
        field: String,
    },
}

impl Violation {
    /// Parameter the violation is about
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field }
            | Self::TypeMismatch { field, .. }
            | Self::NotInEnum { field, .. }
            | Self::TooLong { field, .. }
            | Self::PatternMismatch { field, .. }
            | Self::UnexpectedField { field } => field,
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "missing required parameter '{}'", field),
            Self::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(f, "parameter '{}' must be {}, got {}", field, expected, actual),
            Self::NotInEnum {
                field,
                value,
                allowed,
            } => write!(
                f,
                "parameter '{}' value '{}' is not one of [{}]",
                field,
                value,
                allowed.join(", ")
            ),
            Self::TooLong { field, max, actual } => write!(
                f,
                "parameter '{}' is {} characters, limit is {}",
                field, actual, max
            ),
            Self::PatternMismatch { field, pattern } => {
                write!(f, "parameter '{}' does not match /{}/", field, pattern)
            }
            Self::UnexpectedField { field } => write!(f, "unexpected parameter '{}'", field),
        }
    }
}

/// Summarize violations as one line
#[must_use]
pub fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRule {
    /// Required parameters must be present and non-null
    RequiredFields,
    /// Present parameters must have the declared type
    Types,
    /// String parameters must be inside their enumeration
    Enumerations,
    /// String parameters must respect `max_length` and `pattern`
    StringLimits,
    /// Strict schemas reject undeclared parameters
    AdditionalFields,
}

/// Checks a call's parameters against its schema
#[derive(Debug, Clone)]
pub struct StructuralValidator {
    /// Enabled validation rules
    rules: Vec<ValidationRule>,
}

impl StructuralValidator {
    /// Create a validator with every rule enabled
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: vec![
                ValidationRule::RequiredFields,
                ValidationRule::Types,
                ValidationRule::Enumerations,
                ValidationRule::StringLimits,
                ValidationRule::AdditionalFields,
            ],
        }
    }

    /// Create a validator with only specific rules
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<ValidationRule>) -> Self {
        self.rules = rules;
        self
    }

    fn enabled(&self, rule: ValidationRule) -> bool {
        self.rules.contains(&rule)
    }

    /// Validate a call against its schema.
    ///
    /// Violations come in schema declaration order, then undeclared
    /// parameters in call order. An empty vector means the call is
    /// structurally valid.
    #[must_use]
    pub fn validate(&self, call: &ToolCall, schema: &ToolSchema) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (field, param) in &schema.parameters {
            let value = match call.parameters.get(field) {
                None | Some(Value::Null) => {
                    if param.required && self.enabled(ValidationRule::RequiredFields) {
                        violations.push(Violation::MissingField {
                            field: field.clone(),
                        });
                    }
                    continue;
                }
                Some(value) => value,
            };

            if self.enabled(ValidationRule::Types) && !param.param_type.matches(value) {
                violations.push(Violation::TypeMismatch {
                    field: field.clone(),
                    expected: param.param_type,
                    actual: ParamType::describe(value).to_string(),
                });
                continue;
            }

            let Some(text) = value.as_str() else {
                continue;
            };

            if self.enabled(ValidationRule::Enumerations)
                && param.is_enum()
                && !param.allowed.iter().any(|a| a == text)
            {
                violations.push(Violation::NotInEnum {
                    field: field.clone(),
                    value: text.to_string(),
                    allowed: param.allowed.clone(),
                });
            }

            if self.enabled(ValidationRule::StringLimits) {
                if let Some(max) = param.max_length {
                    let actual = text.chars().count();
                    if actual > max {
                        violations.push(Violation::TooLong {
                            field: field.clone(),
                            max,
                            actual,
                        });
                    }
                }
                if let Some(pattern) = &param.pattern {
                    if !pattern.is_match(text) {
                        violations.push(Violation::PatternMismatch {
                            field: field.clone(),
                            pattern: pattern.as_str().to_string(),
                        });
                    }
                }
            }
        }

        if !schema.allow_additional && self.enabled(ValidationRule::AdditionalFields) {
            violations.extend(
                call.parameters
                    .keys()
                    .filter(|key| !schema.parameters.contains_key(*key))
                    .map(|key| Violation::UnexpectedField { field: key.clone() }),
            );
        }

        violations
    }
}

impl Default for StructuralValidator {
    fn default() -> Self {
        Self::new()
    }
}
