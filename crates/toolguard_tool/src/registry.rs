//! Schema registry: the single source of truth for which tools exist.

use crate::schema::{SchemaDocument, SchemaError, ToolSchema};
use indexmap::IndexMap;
use toolguard_core::CoreError;

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A schema with this name is already registered
    AlreadyRegistered {
        /// Tool name
        name: String,
    },
    /// No schema registered under this name
    UnknownTool {
        /// Tool name as looked up
        name: String,
    },
    /// The schema itself is malformed
    InvalidSchema(SchemaError),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRegistered { name } => write!(f, "Tool already registered: {}", name),
            Self::UnknownTool { name } => write!(f, "Unknown tool: {}", name),
            Self::InvalidSchema(err) => write!(f, "Invalid schema: {}", err),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<SchemaError> for RegistryError {
    fn from(err: SchemaError) -> Self {
        Self::InvalidSchema(err)
    }
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownTool { name } => CoreError::UnknownTool { name },
            RegistryError::AlreadyRegistered { name } => CoreError::AlreadyExists {
                kind: "tool".to_string(),
                id: name,
            },
            RegistryError::InvalidSchema(err) => CoreError::InvalidConfig {
                reason: err.to_string(),
            },
        }
    }
}

/// Registry of tool schemas, keyed by exact tool name.
///
/// Immutable once handed to an engine snapshot; reloading builds a new
/// registry instead of mutating a live one.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<String, ToolSchema>,
}

impl SchemaRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of schemas
    ///
    /// # Errors
    ///
    /// Returns error on the first duplicate or malformed schema
    pub fn from_schemas<I>(schemas: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = ToolSchema>,
    {
        let mut registry = Self::new();
        for schema in schemas {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    /// Build a registry from a parsed schema document
    ///
    /// # Errors
    ///
    /// Returns error on the first duplicate or malformed schema
    pub fn from_document(document: SchemaDocument) -> Result<Self, RegistryError> {
        Self::from_schemas(document.schemas)
    }

    /// Register a schema
    ///
    /// # Errors
    ///
    /// Returns error if the schema is malformed or the name is taken
    pub fn register(&mut self, schema: ToolSchema) -> Result<(), RegistryError> {
        schema.check()?;
        if self.schemas.contains_key(&schema.name) {
            return Err(RegistryError::AlreadyRegistered { name: schema.name });
        }
        tracing::debug!(tool = %schema.name, params = schema.parameters.len(), "registered schema");
        self.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Look up a schema by exact name
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] if nothing is registered
    /// under `name`
    pub fn lookup(&self, name: &str) -> Result<&ToolSchema, RegistryError> {
        self.schemas
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// Check if a tool is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Iterate schemas in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ToolSchema> {
        self.schemas.values()
    }

    /// Number of registered schemas
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
