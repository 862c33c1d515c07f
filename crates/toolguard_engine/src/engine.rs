//! The validation engine and its hot-swappable snapshot.

use crate::aggregate::Aggregator;
use crate::config::{ConfigError, CorrectionConfig, GuardConfig};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use toolguard_core::{CallContext, ToolCall, ValidationResult, Verdict};
use toolguard_ground::{GroundingChecker, GroundingConfig};
use toolguard_policy::{CompiledPolicy, PolicyCompiler, Redactor};
use toolguard_tool::{SchemaRegistry, StructuralValidator};

/// A batch of proposed calls and the context they share
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Calls to validate, in order
    pub tool_calls: Vec<ToolCall>,
    /// Shared request context
    #[serde(default)]
    pub context: CallContext,
}

impl ValidationRequest {
    /// Create a request
    #[must_use]
    pub fn new(tool_calls: Vec<ToolCall>, context: CallContext) -> Self {
        Self {
            tool_calls,
            context,
        }
    }
}

/// Engine settings carried inside a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Grounding settings
    pub grounding: GroundingConfig,
    /// Correction thresholds
    pub correction: CorrectionConfig,
    /// Batches at least this large run in parallel
    pub parallel_threshold: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let config = GuardConfig::default();
        Self {
            grounding: config.grounding,
            correction: config.correction,
            parallel_threshold: config.engine.parallel_threshold,
        }
    }
}

/// Everything a request is judged against, immutable once built
#[derive(Debug)]
pub struct Snapshot {
    registry: SchemaRegistry,
    policy: CompiledPolicy,
    settings: Settings,
    validator: StructuralValidator,
    grounding: GroundingChecker,
    redactor: Redactor,
}

impl Snapshot {
    /// Assemble a snapshot
    #[must_use]
    pub fn new(registry: SchemaRegistry, policy: CompiledPolicy, settings: Settings) -> Self {
        Self {
            grounding: GroundingChecker::new(settings.grounding.clone()),
            validator: StructuralValidator::new(),
            redactor: Redactor::new(),
            registry,
            policy,
            settings,
        }
    }

    /// Set the log redactor
    #[must_use]
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Build a snapshot from configuration, loading every referenced file
    ///
    /// # Errors
    ///
    /// Returns error if a file fails to load, a schema is malformed or
    /// duplicated, or a rule fails to compile
    pub fn from_config(config: &GuardConfig) -> Result<Self, ConfigError> {
        let registry = SchemaRegistry::from_schemas(config.load_schemas()?)?;
        let policy = PolicyCompiler::new().compile_rules(&config.load_policies()?)?;
        let settings = Settings {
            grounding: config.grounding.clone(),
            correction: config.correction.clone(),
            parallel_threshold: config.engine.parallel_threshold,
        };

        tracing::info!(
            tools = registry.len(),
            policies = policy.len(),
            "snapshot built"
        );

        Ok(Self::new(registry, policy, settings)
            .with_redactor(Redactor::new().with_sensitive_fields(config.redact_fields.iter().cloned())))
    }

    /// Load a config file and build a snapshot from it
    ///
    /// # Errors
    ///
    /// Returns error if the config or anything it references is invalid
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::from_config(&GuardConfig::from_path(path)?)
    }

    /// Registered schemas
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Compiled rules
    #[must_use]
    pub fn policy(&self) -> &CompiledPolicy {
        &self.policy
    }

    /// Engine settings
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Structural validator
    #[must_use]
    pub fn validator(&self) -> &StructuralValidator {
        &self.validator
    }

    /// Grounding checker
    #[must_use]
    pub fn grounding(&self) -> &GroundingChecker {
        &self.grounding
    }

    /// Log redactor
    #[must_use]
    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }
}

/// Validates requests against one snapshot
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    snapshot: Arc<Snapshot>,
}

impl ValidationEngine {
    /// Create an engine over a snapshot
    #[must_use]
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }

    /// The snapshot in use
    #[must_use]
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// Validate a batch. One verdict per call, in input order.
    #[must_use]
    pub fn validate(&self, request: &ValidationRequest) -> ValidationResult {
        let snapshot = self.snapshot.as_ref();
        let index = snapshot.grounding().index(&request.context);
        let aggregator = Aggregator::new(snapshot, &request.context, &index);

        let verdicts: Vec<Verdict> = if request.tool_calls.len() >= snapshot.settings().parallel_threshold {
            request
                .tool_calls
                .par_iter()
                .map(|call| aggregator.judge(call))
                .collect()
        } else {
            request
                .tool_calls
                .iter()
                .map(|call| aggregator.judge(call))
                .collect()
        };

        for (call, verdict) in request.tool_calls.iter().zip(&verdicts) {
            if !verdict.is_approved() {
                let redacted = snapshot.redactor().redact_call(call);
                tracing::warn!(
                    call_id = %call.id,
                    tool = %call.name,
                    status = %verdict.status,
                    reason = verdict.reason.map(|r| r.as_str()).unwrap_or("-"),
                    detail = verdict.detail.as_deref().unwrap_or(""),
                    params = %serde_json::Value::Object(redacted.parameters),
                    "tool call not approved"
                );
            }
        }

        ValidationResult::new(verdicts)
    }

    /// Validate a single call
    #[must_use]
    pub fn validate_call(&self, call: &ToolCall, context: &CallContext) -> Verdict {
        let snapshot = self.snapshot.as_ref();
        let index = snapshot.grounding().index(context);
        Aggregator::new(snapshot, context, &index).judge(call)
    }
}

/// Engine whose snapshot can be replaced while requests are in flight.
///
/// A request clones the current `Arc` once and keeps it for its whole
/// lifetime; `reload` swaps in a complete new snapshot.
#[derive(Debug)]
pub struct SharedEngine {
    current: RwLock<Arc<Snapshot>>,
    config_path: Option<PathBuf>,
}

impl SharedEngine {
    /// Create over an initial snapshot
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            config_path: None,
        }
    }

    /// Load from a config file, remembering the path for reloads
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let snapshot = Snapshot::from_path(&path)?;
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            config_path: Some(path),
        })
    }

    /// Config file reloads read from
    #[must_use]
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// The current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// An engine pinned to the current snapshot
    #[must_use]
    pub fn engine(&self) -> ValidationEngine {
        ValidationEngine::new(self.snapshot())
    }

    /// Validate a batch against the current snapshot
    #[must_use]
    pub fn validate(&self, request: &ValidationRequest) -> ValidationResult {
        self.engine().validate(request)
    }

    /// Replace the snapshot
    pub fn swap(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Re-read the config file and swap in the result.
    ///
    /// On error the current snapshot stays active.
    ///
    /// # Errors
    ///
    /// Returns error if no config path is known or the new config is invalid
    pub fn reload(&self) -> Result<Arc<Snapshot>, ConfigError> {
        let path = self.config_path.as_deref().ok_or_else(|| ConfigError::Setting {
            key: "config",
            reason: "engine was not loaded from a file".to_string(),
        })?;
        let snapshot = Snapshot::from_path(path)?;
        self.swap(snapshot);
        tracing::info!(path = %path.display(), "configuration reloaded");
        Ok(self.snapshot())
    }
}
