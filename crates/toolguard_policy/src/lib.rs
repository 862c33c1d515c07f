//! TOOLGUARD Policy System
//!
//! Business rules as data: a YAML rule document, a small condition
//! language, and the evaluator that decides whether a call passes.
//! Compilation catches every static error, so evaluation never fails
//! startup or reload.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lang;
pub mod rules;
pub mod compiler;
pub mod matcher;
pub mod redact;

pub use lang::{CompareOp, Function, Literal, ParseError, PolicyExpr, PolicyParser};
pub use rules::{Bound, ForbiddenPattern, OneOf, PolicyDocument, RuleAction, RuleSpec};
pub use compiler::{
    CompiledPolicy, CompiledRule, EvalContext, EvalError, PolicyCompiler, PolicyDecision,
    PolicyError, PolicyValue, PolicyViolation,
};
pub use matcher::ToolPattern;
pub use redact::{Redactor, REDACTED};
