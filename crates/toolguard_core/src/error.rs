//! Core error types for TOOLGUARD.

use crate::verdict::RejectReason;
use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No schema registered under this tool name
    UnknownTool {
        /// Tool name as proposed
        name: String,
    },

    /// Missing, mistyped or out-of-enum parameters
    InvalidParameters {
        /// Tool name
        tool: String,
        /// Human-readable violation summary
        reason: String,
    },

    /// Business rule failure
    PolicyViolation {
        /// Rule that rejected the call
        rule: String,
        /// Rule reason
        reason: String,
    },

    /// Parameter values with no basis in the supplied context
    HallucinatedValue {
        /// Ungrounded field names
        fields: Vec<String>,
    },

    /// Validation backend unreachable or returned garbage
    ServiceUnavailable {
        /// What went wrong on the way
        reason: String,
    },

    /// Invalid configuration
    InvalidConfig {
        /// Error message
        reason: String,
    },

    /// Parse error
    ParseError {
        /// Error message
        message: String,
    },

    /// Already exists
    AlreadyExists {
        /// Kind of entity
        kind: String,
        /// Identifier
        id: String,
    },

    /// Internal error (for unexpected errors)
    Internal {
        /// Error message
        message: String,
    },
}

impl CoreError {
    /// Map an engine-level error onto the verdict reason it is reported as.
    ///
    /// Returns `None` for errors that never become verdicts (transport,
    /// configuration, internal failures).
    #[must_use]
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::UnknownTool { .. } => Some(RejectReason::UnknownTool),
            Self::InvalidParameters { .. } => Some(RejectReason::InvalidParameters),
            Self::PolicyViolation { .. } => Some(RejectReason::PolicyViolation),
            Self::HallucinatedValue { .. } => Some(RejectReason::HallucinatedValue),
            _ => None,
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTool { name } => write!(f, "Unknown tool: {}", name),
            Self::InvalidParameters { tool, reason } => {
                write!(f, "Invalid parameters for {}: {}", tool, reason)
            }
            Self::PolicyViolation { rule, reason } => {
                write!(f, "Policy {} violated: {}", rule, reason)
            }
            Self::HallucinatedValue { fields } => {
                write!(f, "Ungrounded values in: {}", fields.join(", "))
            }
            Self::ServiceUnavailable { reason } => {
                write!(f, "Validation service unavailable: {}", reason)
            }
            Self::InvalidConfig { reason } => write!(f, "Invalid configuration: {}", reason),
            Self::ParseError { message } => write!(f, "Parse error: {}", message),
            Self::AlreadyExists { kind, id } => write!(f, "{} already exists: {}", kind, id),
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::UnknownTool {
            name: "get_whether".to_string(),
        };
        assert_eq!(format!("{}", err), "Unknown tool: get_whether");

        let err = CoreError::HallucinatedValue {
            fields: vec!["from".to_string(), "to".to_string()],
        };
        assert_eq!(format!("{}", err), "Ungrounded values in: from, to");
    }

    #[test]
    fn test_reject_reason_mapping() {
        let err = CoreError::PolicyViolation {
            rule: "ceiling".to_string(),
            reason: "too much".to_string(),
        };
        assert_eq!(err.reject_reason(), Some(RejectReason::PolicyViolation));

        let err = CoreError::ServiceUnavailable {
            reason: "connection refused".to_string(),
        };
        assert_eq!(err.reject_reason(), None);
    }
}
