//! Rule compilation and evaluation.

use crate::lang::{CompareOp, Function, Literal, ParseError, PolicyExpr, PolicyParser};
use crate::matcher::ToolPattern;
use crate::rules::{PolicyDocument, RuleAction, RuleSpec};
use indexmap::IndexMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;
use toolguard_core::{CallContext, CoreError};
use toolguard_tool::{ParamValue, Pattern, TypedCall};

/// Policy loading or compilation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Policy file could not be read
    #[error("cannot read policy file {path}: {reason}")]
    Io {
        /// File path
        path: String,
        /// OS error
        reason: String,
    },
    /// Policy document is malformed
    #[error("invalid policy document: {0}")]
    Document(String),
    /// Condition failed to parse
    #[error("rule {rule}: {source}")]
    Parse {
        /// Rule identifier
        rule: String,
        /// Parser error
        source: ParseError,
    },
    /// Rule is inconsistent
    #[error("rule {rule}: {reason}")]
    InvalidRule {
        /// Rule identifier
        rule: String,
        /// What is wrong
        reason: String,
    },
    /// Two rules share an identifier
    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),
}

impl From<PolicyError> for CoreError {
    fn from(err: PolicyError) -> Self {
        CoreError::InvalidConfig {
            reason: err.to_string(),
        }
    }
}

/// Failure while evaluating a compiled expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// Operator applied to values it does not support
    #[error("cannot apply {op} to {left} and {right}")]
    TypeMismatch {
        /// Operator or function
        op: String,
        /// Left operand type
        left: &'static str,
        /// Right operand type
        right: &'static str,
    },
    /// A condition produced something other than a boolean
    #[error("expected boolean, got {0}")]
    NotBoolean(&'static str),
}

/// Runtime value of a policy expression
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyValue {
    /// Missing or null
    Null,
    /// Boolean
    Bool(bool),
    /// Number
    Number(f64),
    /// String
    String(String),
    /// List
    List(Vec<PolicyValue>),
    /// Object
    Map(IndexMap<String, PolicyValue>),
}

impl PolicyValue {
    /// Type name for error messages
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    fn from_param(value: &ParamValue) -> Self {
        match value {
            ParamValue::Str(s) => Self::String(s.clone()),
            ParamValue::Int(i) => Self::Number(*i as f64),
            ParamValue::Num(n) => Self::Number(*n),
            ParamValue::Bool(b) => Self::Bool(*b),
            ParamValue::List(items) => Self::List(items.iter().map(Self::from_param).collect()),
            ParamValue::Map(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_param(v)))
                    .collect(),
            ),
            ParamValue::Null => Self::Null,
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Self::Null,
            Literal::Bool(b) => Self::Bool(*b),
            Literal::Number(n) => Self::Number(*n),
            Literal::String(s) => Self::String(s.clone()),
        }
    }

    fn optional(value: Option<&str>) -> Self {
        value.map_or(Self::Null, |s| Self::String(s.to_string()))
    }

    fn strings(values: &[String]) -> Self {
        Self::List(values.iter().cloned().map(Self::String).collect())
    }

    fn field(&self, name: &str) -> Self {
        match self {
            Self::Map(map) => map.get(name).cloned().unwrap_or(Self::Null),
            _ => Self::Null,
        }
    }

    fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => (a - b).abs() < f64::EPSILON,
            _ => self == other,
        }
    }
}

/// What an expression is evaluated against
pub struct EvalContext<'a> {
    /// The call under evaluation
    pub call: &'a TypedCall,
    /// Request context
    pub context: &'a CallContext,
}

impl<'a> EvalContext<'a> {
    /// Create a new evaluation context
    #[must_use]
    pub fn new(call: &'a TypedCall, context: &'a CallContext) -> Self {
        Self { call, context }
    }

    /// Resolve a dotted path; anything missing is null
    #[must_use]
    pub fn resolve(&self, path: &[String]) -> PolicyValue {
        let ctx = self.context;
        let (root, rest) = match path.split_first() {
            Some((root, rest)) => (root.as_str(), rest),
            None => return PolicyValue::Null,
        };

        let leaf: &[String] = &[];
        let (mut value, nested) = match (root, rest) {
            ("params", [field, nested @ ..]) => (
                self.call
                    .get(field)
                    .map_or(PolicyValue::Null, PolicyValue::from_param),
                nested,
            ),
            ("metadata", [key, nested @ ..]) => (
                ctx.metadata
                    .get(key.as_str())
                    .map_or(PolicyValue::Null, PolicyValue::from_json),
                nested,
            ),
            ("tool", [f]) if f == "name" => (PolicyValue::String(self.call.name.clone()), leaf),
            ("user", [f]) => (
                match f.as_str() {
                    "id" => PolicyValue::optional(Some(ctx.user_id.as_str()).filter(|s| !s.is_empty())),
                    "role" => PolicyValue::optional(ctx.user_role.as_deref()),
                    "permissions" => PolicyValue::strings(&ctx.user_permissions),
                    _ => PolicyValue::Null,
                },
                leaf,
            ),
            ("session", [f]) => (
                match f.as_str() {
                    "id" => PolicyValue::optional(Some(ctx.session_id.as_str()).filter(|s| !s.is_empty())),
                    "conversation_id" => PolicyValue::optional(ctx.conversation_id.as_deref()),
                    "previous_calls" => PolicyValue::strings(&ctx.previous_calls),
                    _ => PolicyValue::Null,
                },
                leaf,
            ),
            ("time", [f]) if f == "hour" => (
                ctx.time_of_day
                    .map_or(PolicyValue::Null, |h| PolicyValue::Number(f64::from(h))),
                leaf,
            ),
            ("request", [f]) if f == "ip" => (PolicyValue::optional(ctx.ip_address.as_deref()), leaf),
            _ => return PolicyValue::Null,
        };

        for segment in nested {
            value = value.field(segment);
        }
        value
    }

    /// Evaluate an expression to a value
    ///
    /// # Errors
    ///
    /// Returns error if an operator meets operands it cannot handle
    pub fn eval(&self, expr: &PolicyExpr) -> Result<PolicyValue, EvalError> {
        match expr {
            PolicyExpr::Literal(literal) => Ok(PolicyValue::from_literal(literal)),
            PolicyExpr::Path(path) => Ok(self.resolve(path)),
            PolicyExpr::List(items) => Ok(PolicyValue::List(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<_, _>>()?,
            )),
            PolicyExpr::Not(inner) => Ok(PolicyValue::Bool(!self.test(inner)?)),
            PolicyExpr::And(left, right) => {
                Ok(PolicyValue::Bool(self.test(left)? && self.test(right)?))
            }
            PolicyExpr::Or(left, right) => {
                Ok(PolicyValue::Bool(self.test(left)? || self.test(right)?))
            }
            PolicyExpr::Compare { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                compare(*op, &left, &right).map(PolicyValue::Bool)
            }
            PolicyExpr::In { item, collection } => {
                let item = self.eval(item)?;
                let collection = self.eval(collection)?;
                contains("in", &collection, &item).map(PolicyValue::Bool)
            }
            PolicyExpr::Call { func, args } => self.call(*func, args),
            PolicyExpr::Matches { subject, pattern } => {
                matches_pattern(&self.eval(subject)?, pattern).map(PolicyValue::Bool)
            }
        }
    }

    /// Evaluate an expression as a condition
    ///
    /// # Errors
    ///
    /// Returns error if evaluation fails or the result is not boolean
    pub fn test(&self, expr: &PolicyExpr) -> Result<bool, EvalError> {
        match self.eval(expr)? {
            PolicyValue::Bool(b) => Ok(b),
            PolicyValue::Null => Ok(false),
            other => Err(EvalError::NotBoolean(other.type_name())),
        }
    }

    fn call(&self, func: Function, args: &[PolicyExpr]) -> Result<PolicyValue, EvalError> {
        let values = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let first = values.first().unwrap_or(&PolicyValue::Null);
        let second = values.get(1).unwrap_or(&PolicyValue::Null);
        let mismatch = || EvalError::TypeMismatch {
            op: format!("{}()", func.name()),
            left: first.type_name(),
            right: second.type_name(),
        };

        match func {
            Function::Len => match first {
                PolicyValue::Null => Ok(PolicyValue::Number(0.0)),
                PolicyValue::String(s) => Ok(PolicyValue::Number(s.chars().count() as f64)),
                PolicyValue::List(items) => Ok(PolicyValue::Number(items.len() as f64)),
                PolicyValue::Map(map) => Ok(PolicyValue::Number(map.len() as f64)),
                _ => Err(mismatch()),
            },
            Function::Contains => contains("contains()", first, second).map(PolicyValue::Bool),
            Function::StartsWith | Function::EndsWith => match (first, second) {
                (PolicyValue::Null, _) | (_, PolicyValue::Null) => Ok(PolicyValue::Bool(false)),
                (PolicyValue::String(s), PolicyValue::String(affix)) => {
                    Ok(PolicyValue::Bool(if func == Function::StartsWith {
                        s.starts_with(affix.as_str())
                    } else {
                        s.ends_with(affix.as_str())
                    }))
                }
                _ => Err(mismatch()),
            },
            Function::Lower => match first {
                PolicyValue::Null => Ok(PolicyValue::Null),
                PolicyValue::String(s) => Ok(PolicyValue::String(s.to_lowercase())),
                _ => Err(mismatch()),
            },
            Function::Has => Ok(PolicyValue::Bool(*first != PolicyValue::Null)),
        }
    }
}

fn compare(op: CompareOp, left: &PolicyValue, right: &PolicyValue) -> Result<bool, EvalError> {
    match op {
        CompareOp::Eq => return Ok(left.loose_eq(right)),
        CompareOp::Ne => return Ok(!left.loose_eq(right)),
        _ => {}
    }

    let ordering = match (left, right) {
        (PolicyValue::Null, _) | (_, PolicyValue::Null) => return Ok(false),
        (PolicyValue::Number(a), PolicyValue::Number(b)) => a.partial_cmp(b),
        (PolicyValue::String(a), PolicyValue::String(b)) => Some(a.cmp(b)),
        _ => {
            return Err(EvalError::TypeMismatch {
                op: op.symbol().to_string(),
                left: left.type_name(),
                right: right.type_name(),
            });
        }
    };

    Ok(match ordering {
        Some(Ordering::Less) => matches!(op, CompareOp::Lt | CompareOp::Le),
        Some(Ordering::Equal) => matches!(op, CompareOp::Le | CompareOp::Ge),
        Some(Ordering::Greater) => matches!(op, CompareOp::Gt | CompareOp::Ge),
        None => false,
    })
}

fn contains(op: &str, haystack: &PolicyValue, needle: &PolicyValue) -> Result<bool, EvalError> {
    match (haystack, needle) {
        (PolicyValue::Null, _) => Ok(false),
        (PolicyValue::List(items), _) => Ok(items.iter().any(|item| item.loose_eq(needle))),
        (PolicyValue::String(s), PolicyValue::String(sub)) => Ok(s.contains(sub.as_str())),
        (PolicyValue::Map(map), PolicyValue::String(key)) => Ok(map.contains_key(key)),
        _ => Err(EvalError::TypeMismatch {
            op: op.to_string(),
            left: needle.type_name(),
            right: haystack.type_name(),
        }),
    }
}

fn matches_pattern(subject: &PolicyValue, pattern: &Pattern) -> Result<bool, EvalError> {
    match subject {
        PolicyValue::Null => Ok(false),
        PolicyValue::String(s) => Ok(pattern.is_match(s)),
        other => Err(EvalError::TypeMismatch {
            op: "matches()".to_string(),
            left: other.type_name(),
            right: "regex",
        }),
    }
}

/// A rule ready for evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    /// Rule identifier
    pub id: String,
    /// Tools the rule applies to
    pub tool: ToolPattern,
    /// What a trigger does
    pub action: RuleAction,
    /// Higher runs first
    pub priority: i32,
    /// Rejection message
    pub reason: String,
    /// Trigger expression
    pub expr: PolicyExpr,
}

/// A rule that rejected a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    /// Rule identifier
    pub rule_id: String,
    /// Rule reason
    pub reason: String,
    /// Set when the rule could not be evaluated and the call is rejected
    /// for that reason
    pub evaluation_error: Option<String>,
}

/// Policy decision for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    /// Whether the call passes policy
    pub allowed: bool,
    /// Rules that triggered, in evaluation order
    pub matched_rules: Vec<String>,
    /// The rejecting rule, when not allowed
    pub violation: Option<PolicyViolation>,
}

impl PolicyDecision {
    fn pass(matched_rules: Vec<String>) -> Self {
        Self {
            allowed: true,
            matched_rules,
            violation: None,
        }
    }
}

/// All rules, sorted by descending priority, ties in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledPolicy {
    rules: Vec<CompiledRule>,
}

impl CompiledPolicy {
    /// Compiled rules in evaluation order
    #[must_use]
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if there are no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules that apply to a tool, in evaluation order
    pub fn rules_for<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = &'a CompiledRule> + 'a {
        self.rules.iter().filter(move |rule| rule.tool.matches(tool))
    }

    /// Evaluate the rules that apply to a call
    #[must_use]
    pub fn evaluate(&self, call: &TypedCall, context: &CallContext) -> PolicyDecision {
        let ctx = EvalContext::new(call, context);
        let mut matched = Vec::new();

        for rule in self.rules_for(&call.name) {
            let triggered = match ctx.test(&rule.expr) {
                Ok(triggered) => triggered,
                Err(err) if rule.action == RuleAction::Reject => {
                    tracing::warn!(rule = %rule.id, tool = %call.name, error = %err, "reject rule failed to evaluate");
                    matched.push(rule.id.clone());
                    return PolicyDecision {
                        allowed: false,
                        matched_rules: matched,
                        violation: Some(PolicyViolation {
                            rule_id: rule.id.clone(),
                            reason: rule.reason.clone(),
                            evaluation_error: Some(err.to_string()),
                        }),
                    };
                }
                Err(err) => {
                    tracing::warn!(rule = %rule.id, tool = %call.name, error = %err, "rule failed to evaluate, skipped");
                    continue;
                }
            };

            if !triggered {
                continue;
            }
            matched.push(rule.id.clone());

            match rule.action {
                RuleAction::Allow => {
                    tracing::debug!(rule = %rule.id, tool = %call.name, "allow rule matched");
                    return PolicyDecision::pass(matched);
                }
                RuleAction::Reject => {
                    tracing::debug!(rule = %rule.id, tool = %call.name, "reject rule matched");
                    return PolicyDecision {
                        allowed: false,
                        matched_rules: matched,
                        violation: Some(PolicyViolation {
                            rule_id: rule.id.clone(),
                            reason: rule.reason.clone(),
                            evaluation_error: None,
                        }),
                    };
                }
                RuleAction::Log => {
                    tracing::info!(rule = %rule.id, tool = %call.name, call_id = %call.id, "policy log rule matched");
                }
            }
        }

        PolicyDecision::pass(matched)
    }
}

/// Compiles rule specs into a [`CompiledPolicy`]
pub struct PolicyCompiler {
    parser: PolicyParser,
}

impl PolicyCompiler {
    /// Create a new compiler
    #[must_use]
    pub fn new() -> Self {
        Self {
            parser: PolicyParser::new(),
        }
    }

    /// Compile a whole document
    ///
    /// # Errors
    ///
    /// Returns error on the first rule that fails to compile, or on
    /// duplicate ids
    pub fn compile(&self, document: &PolicyDocument) -> Result<CompiledPolicy, PolicyError> {
        self.compile_rules(&document.policies)
    }

    /// Compile a list of rules
    ///
    /// # Errors
    ///
    /// Returns error on the first rule that fails to compile, or on
    /// duplicate ids
    pub fn compile_rules(&self, specs: &[RuleSpec]) -> Result<CompiledPolicy, PolicyError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(specs.len());

        for (index, spec) in specs.iter().enumerate() {
            let rule = self.compile_rule(index, spec)?;
            if !seen.insert(rule.id.clone()) {
                return Err(PolicyError::DuplicateRule(rule.id));
            }
            rules.push(rule);
        }

        // Stable: equal priorities keep declaration order.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(CompiledPolicy { rules })
    }

    /// Compile from YAML text
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or a rule fails to compile
    pub fn compile_from_yaml(&self, text: &str) -> Result<CompiledPolicy, PolicyError> {
        self.compile(&PolicyDocument::from_yaml_str(text)?)
    }

    fn compile_rule(&self, index: usize, spec: &RuleSpec) -> Result<CompiledRule, PolicyError> {
        let id = spec
            .id
            .clone()
            .unwrap_or_else(|| format!("{}#{}", spec.tool.trim(), index + 1));
        let invalid = |reason: String| PolicyError::InvalidRule {
            rule: id.clone(),
            reason,
        };

        if spec.trigger_count() > 1 {
            return Err(invalid("declares more than one trigger".to_string()));
        }
        let tool = ToolPattern::parse(&spec.tool).map_err(&invalid)?;

        let param = |field: &str| -> Result<PolicyExpr, PolicyError> {
            if field.trim().is_empty() {
                return Err(invalid("empty field name".to_string()));
            }
            Ok(PolicyExpr::Path(vec!["params".to_string(), field.to_string()]))
        };
        let number = |n: f64| PolicyExpr::Literal(Literal::Number(n));
        let has = |path: PolicyExpr| PolicyExpr::Call {
            func: Function::Has,
            args: vec![path],
        };

        let expr = if let Some(bound) = &spec.max {
            PolicyExpr::Compare {
                op: CompareOp::Gt,
                left: Box::new(param(&bound.field)?),
                right: Box::new(number(bound.value)),
            }
        } else if let Some(bound) = &spec.min {
            PolicyExpr::Compare {
                op: CompareOp::Lt,
                left: Box::new(param(&bound.field)?),
                right: Box::new(number(bound.value)),
            }
        } else if let Some(one_of) = &spec.one_of {
            let allowed = PolicyExpr::List(
                one_of
                    .values
                    .iter()
                    .map(|v| PolicyExpr::Literal(Literal::String(v.clone())))
                    .collect(),
            );
            has(param(&one_of.field)?).and(
                PolicyExpr::In {
                    item: Box::new(param(&one_of.field)?),
                    collection: Box::new(allowed),
                }
                .negate(),
            )
        } else if let Some(forbidden) = &spec.pattern {
            let pattern = Pattern::new(&forbidden.regex)
                .map_err(|e| invalid(format!("invalid regex: {}", e)))?;
            PolicyExpr::Matches {
                subject: Box::new(param(&forbidden.field)?),
                pattern,
            }
        } else if let Some(fields) = &spec.forbid_together {
            if fields.len() < 2 {
                return Err(invalid("forbid_together needs at least two fields".to_string()));
            }
            let mut presence = fields.iter().map(|f| param(f).map(has));
            let first = presence
                .next()
                .ok_or_else(|| invalid("forbid_together is empty".to_string()))??;
            presence.try_fold(first, |acc, next| next.map(|n| acc.and(n)))?
        } else if let Some(condition) = &spec.condition {
            self.parser
                .parse(condition)
                .map_err(|source| PolicyError::Parse {
                    rule: id.clone(),
                    source,
                })?
        } else {
            PolicyExpr::Literal(Literal::Bool(true))
        };

        let reason = if spec.reason.trim().is_empty() {
            format!("rejected by policy {}", id)
        } else {
            spec.reason.clone()
        };

        Ok(CompiledRule {
            id,
            tool,
            action: spec.action,
            priority: spec.priority,
            reason,
            expr,
        })
    }
}

impl Default for PolicyCompiler {
    fn default() -> Self {
        Self::new()
    }
}
