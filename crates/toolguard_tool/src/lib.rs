//! TOOLGUARD Tool System
//!
//! Tool schemas and the registry that holds them, structural validation of
//! proposed calls, conversion into typed calls, and the downstream executor
//! registry. Every proposed call is treated as untrusted model output.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod trait_;
pub mod schema;
pub mod normalize;
pub mod registry;
pub mod adapter;
pub mod validate;

pub use trait_::{Tool, ToolError};
pub use schema::{ParamType, ParameterSchema, Pattern, SchemaDocument, SchemaError, ToolSchema};
pub use normalize::{NormalizationError, ParamValue, TypedCall, TypedParam};
pub use registry::{RegistryError, SchemaRegistry};
pub use adapter::{AdapterError, ToolHost};
pub use validate::{StructuralValidator, ValidationRule, Violation};
