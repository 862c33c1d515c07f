//! Proposed tool calls and the context they are judged against.

use crate::id::ToolCallId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool invocation proposed by a language model.
///
/// The engine never mutates a received call; corrections are new calls
/// carrying the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, echoed back in the verdict
    #[serde(default)]
    pub id: ToolCallId,
    /// Tool name
    pub name: String,
    /// Loosely-typed parameters as produced upstream
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ToolCall {
    /// Create a call with no parameters
    #[must_use]
    pub fn new(id: impl Into<ToolCallId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parameters: Map::new(),
        }
    }

    /// Add a parameter
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Copy of this call under another tool name
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            name: name.into(),
            parameters: self.parameters.clone(),
        }
    }

    /// Get a parameter value
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// BLAKE3 digest of the tool name and parameters, hex encoded.
    ///
    /// Two calls share a fingerprint only when they name the same tool with
    /// the same parameters in the same order. The id is not part of it.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_bytes());
        for (key, value) in &self.parameters {
            // JSON text never holds a raw NUL
            hasher.update(&[0]);
            hasher.update(Value::String(key.clone()).to_string().as_bytes());
            hasher.update(&[0]);
            hasher.update(value.to_string().as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user
    User,
    /// The model proposing tool calls
    Assistant,
    /// System prompt
    System,
    /// Output of a previously executed tool
    Tool,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: Role,
    /// Text content
    pub content: String,
}

impl Message {
    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Server-side session knowledge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Known entities by kind, e.g. `account -> [savings, checking]`
    #[serde(default)]
    pub entities: IndexMap<String, Vec<String>>,
    /// Arbitrary resolved facts
    #[serde(default)]
    pub facts: IndexMap<String, Value>,
}

impl SessionState {
    /// Record a known entity
    #[must_use]
    pub fn with_entity(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.entry(kind.into()).or_default().push(value.into());
        self
    }

    /// Record a fact
    #[must_use]
    pub fn with_fact(mut self, key: impl Into<String>, value: Value) -> Self {
        self.facts.insert(key.into(), value);
        self
    }
}

/// Per-request context supplied alongside the tool calls
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    /// Requesting user
    #[serde(default)]
    pub user_id: String,
    /// Session the calls belong to
    #[serde(default)]
    pub session_id: String,
    /// Conversation within the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Role of the requesting user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
    /// Permissions held by the user
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_permissions: Vec<String>,
    /// Names of tools already called in this session
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_calls: Vec<String>,
    /// Conversation so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Message>>,
    /// Session-resolved entities and facts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<SessionState>,
    /// Hour of day (0-23) the request was made
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "hour_of_day"
    )]
    pub time_of_day: Option<u8>,
    /// Client address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Arbitrary caller data
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
}

impl CallContext {
    /// Create a context for a user session
    #[must_use]
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// Append a conversation message
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.history.get_or_insert_with(Vec::new).push(message);
        self
    }

    /// Set session state
    #[must_use]
    pub fn with_session_state(mut self, state: SessionState) -> Self {
        self.session_state = Some(state);
        self
    }

    /// Set the user role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.user_role = Some(role.into());
        self
    }

    /// Add a permission
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.user_permissions.push(permission.into());
        self
    }

    /// Set the hour of day; values past 23 wrap around the clock
    #[must_use]
    pub fn with_time_of_day(mut self, hour: u8) -> Self {
        self.time_of_day = Some(hour % 24);
        self
    }

    /// Conversation messages, empty when no history was supplied
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.history.as_deref().unwrap_or(&[])
    }
}

fn hour_of_day<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<u8>::deserialize(deserializer)? {
        Some(hour) if hour > 23 => Err(serde::de::Error::custom(format!(
            "time_of_day {} is outside 0-23",
            hour
        ))),
        hour => Ok(hour),
    }
}
