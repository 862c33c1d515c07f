//! TOOLGUARD Core Types
//!
//! Pure types shared by every toolguard crate: proposed tool calls, the
//! request context they are judged against, and the verdicts the engine
//! produces. No I/O lives here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call;
pub mod error;
pub mod id;
pub mod text;
pub mod verdict;

// Re-exports
pub use call::{CallContext, Message, Role, SessionState, ToolCall};
pub use error::{CoreError, CoreResult};
pub use id::{RequestId, ToolCallId};
pub use verdict::{RejectReason, ValidationResult, Verdict, VerdictFlag, VerdictStatus};
