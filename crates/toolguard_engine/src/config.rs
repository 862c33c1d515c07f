//! Engine configuration loaded from one YAML file.
//!
//! ```yaml
//! grounding:
//!   min_score: 1.0
//!   evidence_roles: [user]
//! correction:
//!   max_name_distance: 2
//! engine:
//!   parallel_threshold: 8
//! redact_fields: [iban]
//! schema_files: [schemas.yaml]
//! policy_files: [policies.yaml]
//! schemas: []
//! policies: []
//! ```
//!
//! Referenced files are resolved relative to the config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use toolguard_core::CoreError;
use toolguard_ground::GroundingConfig;
use toolguard_policy::{PolicyDocument, PolicyError, RuleSpec};
use toolguard_tool::{RegistryError, SchemaDocument, SchemaError, ToolSchema};

/// Configuration error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config file {path}: {reason}")]
    Io {
        /// File path
        path: String,
        /// OS error
        reason: String,
    },
    /// Config file is not valid YAML for this format
    #[error("invalid config: {0}")]
    Yaml(String),
    /// A setting is out of range
    #[error("invalid setting {key}: {reason}")]
    Setting {
        /// Setting path
        key: &'static str,
        /// What is wrong
        reason: String,
    },
    /// A schema file failed to load
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Schemas could not be registered
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Policies failed to load or compile
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        CoreError::InvalidConfig {
            reason: err.to_string(),
        }
    }
}

fn default_max_name_distance() -> usize {
    2
}

fn default_max_value_distance() -> usize {
    2
}

fn default_max_field_edits() -> usize {
    1
}

/// Near-miss thresholds for the correction synthesizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Edit distance allowed between a proposed and a registered tool name
    #[serde(default = "default_max_name_distance")]
    pub max_name_distance: usize,
    /// Edit distance allowed for enum values, field names and substitutes
    #[serde(default = "default_max_value_distance")]
    pub max_value_distance: usize,
    /// Parameter edits a single correction may make
    #[serde(default = "default_max_field_edits")]
    pub max_field_edits: usize,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            max_name_distance: default_max_name_distance(),
            max_value_distance: default_max_value_distance(),
            max_field_edits: default_max_field_edits(),
        }
    }
}

fn default_parallel_threshold() -> usize {
    8
}

/// Batch execution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Batches at least this large are validated in parallel
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: default_parallel_threshold(),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Grounding settings
    #[serde(default)]
    pub grounding: GroundingConfig,
    /// Correction thresholds
    #[serde(default)]
    pub correction: CorrectionConfig,
    /// Batch execution settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Extra parameter names to mask in logs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redact_fields: Vec<String>,
    /// Inline tool schemas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemas: Vec<ToolSchema>,
    /// Schema documents to load
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_files: Vec<PathBuf>,
    /// Inline policy rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<RuleSpec>,
    /// Policy documents to load
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_files: Vec<PathBuf>,
    /// Directory referenced files are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl GuardConfig {
    /// Parse from YAML text; relative file references resolve against the
    /// working directory
    ///
    /// # Errors
    ///
    /// Returns error if the text is malformed or a setting is out of range
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Yaml(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Read and parse a config file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut config = Self::from_yaml_str(&text)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let min_score = self.grounding.min_score;
        if min_score.is_nan() || min_score <= 0.0 || min_score > 1.0 {
            return Err(ConfigError::Setting {
                key: "grounding.min_score",
                reason: format!("{} is outside (0, 1]", min_score),
            });
        }
        if self.grounding.evidence_roles.is_empty() {
            return Err(ConfigError::Setting {
                key: "grounding.evidence_roles",
                reason: "at least one role is required".to_string(),
            });
        }
        if self.engine.parallel_threshold == 0 {
            return Err(ConfigError::Setting {
                key: "engine.parallel_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Inline schemas followed by those from schema files, in order
    ///
    /// # Errors
    ///
    /// Returns error if a schema file cannot be read or parsed
    pub fn load_schemas(&self) -> Result<Vec<ToolSchema>, ConfigError> {
        let mut schemas = self.schemas.clone();
        for file in &self.schema_files {
            let path = self.resolve(file);
            tracing::debug!(path = %path.display(), "loading schema file");
            schemas.extend(SchemaDocument::from_path(&path)?.schemas);
        }
        Ok(schemas)
    }

    /// Inline rules followed by those from policy files, in order
    ///
    /// # Errors
    ///
    /// Returns error if a policy file cannot be read or parsed
    pub fn load_policies(&self) -> Result<Vec<RuleSpec>, ConfigError> {
        let mut rules = self.policies.clone();
        for file in &self.policy_files {
            let path = self.resolve(file);
            tracing::debug!(path = %path.display(), "loading policy file");
            rules.extend(PolicyDocument::from_path(&path)?.policies);
        }
        Ok(rules)
    }
}
