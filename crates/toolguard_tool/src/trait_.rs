//! Tool trait for downstream executors.

use async_trait::async_trait;
use toolguard_core::ToolCall;

/// Failure inside a tool executor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// A parameter the executor needs is absent or unusable
    #[error("bad argument {field}: {reason}")]
    BadArgument {
        /// Parameter name
        field: String,
        /// What is wrong
        reason: String,
    },
    /// The executor itself failed
    #[error("execution failed: {0}")]
    Failed(String),
}

/// An executor for one tool.
///
/// Executors only ever see calls that were approved; they may still reject
/// arguments they cannot use.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, matching its schema
    fn name(&self) -> &str;

    /// Run the call and describe the result
    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError>;
}
