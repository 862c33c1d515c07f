//! Policy rules as data.
//!
//! ```yaml
//! policies:
//!   - id: transfer-ceiling
//!     tool: transfer_money
//!     action: reject
//!     priority: 10
//!     reason: "transfers above 100 are not allowed"
//!     max: { field: amount, value: 100 }
//!   - id: office-hours
//!     tool: "*"
//!     action: log
//!     condition: "time.hour < 9 || time.hour > 17"
//! ```

use crate::compiler::PolicyError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a triggered rule does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Reject the call
    #[serde(alias = "REJECT")]
    Reject,
    /// Pass the call, skipping lower-priority rules
    #[serde(alias = "ALLOW")]
    Allow,
    /// Record the match and keep evaluating
    #[serde(alias = "LOG")]
    Log,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Reject => "reject",
            Self::Allow => "allow",
            Self::Log => "log",
        })
    }
}

/// Numeric bound on a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    /// Parameter name
    pub field: String,
    /// Limit
    pub value: f64,
}

/// Whitelist for a parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneOf {
    /// Parameter name
    pub field: String,
    /// Permitted values
    pub values: Vec<String>,
}

/// Forbidden regex for a string parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenPattern {
    /// Parameter name
    pub field: String,
    /// Regex that must not match
    pub regex: String,
}

fn any_tool() -> String {
    "*".to_string()
}

/// One rule as written in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Rule identifier, generated from position when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name, `*`, or a glob such as `get_*`
    #[serde(default = "any_tool", alias = "tool_name")]
    pub tool: String,
    /// Action when triggered
    #[serde(alias = "type")]
    pub action: RuleAction,
    /// Higher runs first; ties keep declaration order
    #[serde(default)]
    pub priority: i32,
    /// Message reported on rejection
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Triggers when the field is greater than the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Bound>,
    /// Triggers when the field is less than the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Bound>,
    /// Triggers when the field is present and not whitelisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<OneOf>,
    /// Triggers when a string field matches the regex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<ForbiddenPattern>,
    /// Triggers when all listed fields are present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbid_together: Option<Vec<String>>,
    /// Triggers when the expression is true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl RuleSpec {
    /// Create a rule with no trigger
    #[must_use]
    pub fn new(id: impl Into<String>, tool: impl Into<String>, action: RuleAction) -> Self {
        Self {
            id: Some(id.into()),
            tool: tool.into(),
            action,
            priority: 0,
            reason: String::new(),
            max: None,
            min: None,
            one_of: None,
            pattern: None,
            forbid_together: None,
            condition: None,
        }
    }

    /// Set priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set reason
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Trigger above a ceiling
    #[must_use]
    pub fn with_max(mut self, field: impl Into<String>, value: f64) -> Self {
        self.max = Some(Bound {
            field: field.into(),
            value,
        });
        self
    }

    /// Trigger on a condition
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Number of triggers declared
    #[must_use]
    pub fn trigger_count(&self) -> usize {
        usize::from(self.max.is_some())
            + usize::from(self.min.is_some())
            + usize::from(self.one_of.is_some())
            + usize::from(self.pattern.is_some())
            + usize::from(self.forbid_together.is_some())
            + usize::from(self.condition.is_some())
    }
}

/// A YAML document holding policy rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Rules in declaration order
    #[serde(default)]
    pub policies: Vec<RuleSpec>,
}

impl PolicyDocument {
    /// Parse from YAML text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid policy document
    pub fn from_yaml_str(text: &str) -> Result<Self, PolicyError> {
        serde_yaml::from_str(text).map_err(|e| PolicyError::Document(e.to_string()))
    }

    /// Read and parse from disk
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_path(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(|e| PolicyError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let doc = PolicyDocument::from_yaml_str(
            r#"
policies:
  - id: transfer-ceiling
    tool: transfer_money
    action: reject
    priority: 10
    reason: "transfers above 100 are not allowed"
    max: { field: amount, value: 100 }
  - tool_name: "*"
    type: LOG
    condition: "time.hour < 9"
"#,
        )
        .unwrap();

        assert_eq!(doc.policies.len(), 2);
        let ceiling = &doc.policies[0];
        assert_eq!(ceiling.id.as_deref(), Some("transfer-ceiling"));
        assert_eq!(ceiling.action, RuleAction::Reject);
        assert_eq!(ceiling.max.as_ref().unwrap().value, 100.0);
        assert_eq!(ceiling.trigger_count(), 1);

        let log = &doc.policies[1];
        assert!(log.id.is_none());
        assert_eq!(log.tool, "*");
        assert_eq!(log.action, RuleAction::Log);
        assert_eq!(log.priority, 0);
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result = PolicyDocument::from_yaml_str(
            "policies:\n  - tool: x\n    action: explode\n",
        );
        assert!(matches!(result, Err(PolicyError::Document(_))));
    }

    #[test]
    fn test_default_tool_is_wildcard() {
        let doc = PolicyDocument::from_yaml_str("policies:\n  - action: allow\n").unwrap();
        assert_eq!(doc.policies[0].tool, "*");
        assert_eq!(doc.policies[0].trigger_count(), 0);
    }
}
