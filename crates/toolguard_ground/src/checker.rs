//! Grounding checks for entity-annotated parameters.

use crate::evidence::{EvidenceIndex, MAX_PHRASE_WORDS};
use serde::{Deserialize, Serialize};
use toolguard_core::text::{closest, fold, parse_number, tokenize, Closest, Token};
use toolguard_core::{CallContext, Role};
use toolguard_tool::{ParamValue, TypedCall};

fn default_min_score() -> f64 {
    1.0
}

fn default_evidence_roles() -> Vec<Role> {
    vec![Role::User]
}

/// Grounding settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingConfig {
    /// Score a field needs to count as grounded
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Message authors whose text counts as evidence
    #[serde(default = "default_evidence_roles")]
    pub evidence_roles: Vec<Role>,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            evidence_roles: default_evidence_roles(),
        }
    }
}

/// A field whose value could not be traced to the context
#[derive(Debug, Clone, PartialEq)]
pub struct UngroundedField {
    /// Parameter name
    pub field: String,
    /// Entity kind from the schema
    pub kind: String,
    /// Value as text
    pub value: String,
    /// Score in `[0, 1]`
    pub score: f64,
}

/// Grounding outcome for one call
#[derive(Debug, Clone, PartialEq)]
pub enum Grounding {
    /// Every entity field is traceable
    Grounded,
    /// These fields are not
    Ungrounded(Vec<UngroundedField>),
}

impl Grounding {
    /// Check if every entity field is grounded
    #[must_use]
    pub fn is_grounded(&self) -> bool {
        matches!(self, Self::Grounded)
    }

    /// Ungrounded fields, empty when grounded
    #[must_use]
    pub fn fields(&self) -> &[UngroundedField] {
        match self {
            Self::Grounded => &[],
            Self::Ungrounded(fields) => fields,
        }
    }

    /// Check if some ungrounded field was partly mentioned
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.fields().iter().any(|f| f.score > 0.0)
    }
}

/// Result of a substitute search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    /// A single closest grounded candidate
    Found(String),
    /// Several candidates tie
    Ambiguous,
    /// Nothing close enough
    None,
}

/// Checks entity-annotated parameters against the evidence index
#[derive(Debug, Clone, Default)]
pub struct GroundingChecker {
    config: GroundingConfig,
}

impl GroundingChecker {
    /// Create a checker
    #[must_use]
    pub fn new(config: GroundingConfig) -> Self {
        Self { config }
    }

    /// Settings in use
    #[must_use]
    pub fn config(&self) -> &GroundingConfig {
        &self.config
    }

    /// Build the evidence index for a request
    #[must_use]
    pub fn index(&self, context: &CallContext) -> EvidenceIndex {
        EvidenceIndex::build(context, &self.config.evidence_roles)
    }

    /// Check every entity field of a call
    #[must_use]
    pub fn check(&self, call: &TypedCall, index: &EvidenceIndex) -> Grounding {
        let ungrounded: Vec<UngroundedField> = call
            .entity_fields()
            .filter_map(|(field, kind, value)| {
                let score = if index.is_empty() {
                    0.0
                } else {
                    score_value(index, kind, value)
                };
                tracing::trace!(call_id = %call.id, field, kind, score, "grounding score");
                (score < self.config.min_score).then(|| UngroundedField {
                    field: field.to_string(),
                    kind: kind.to_string(),
                    value: describe(value),
                    score,
                })
            })
            .collect();

        if ungrounded.is_empty() {
            Grounding::Grounded
        } else {
            Grounding::Ungrounded(ungrounded)
        }
    }

    /// Find the closest grounded candidate for an ungrounded string value.
    ///
    /// Session entities of the same kind are tried first, then word runs
    /// from evidence messages. Only a unique best candidate is returned.
    #[must_use]
    pub fn substitute(
        &self,
        index: &EvidenceIndex,
        kind: &str,
        value: &str,
        max_distance: usize,
    ) -> Substitution {
        let chars = fold(value).chars().count();
        let limit = max_distance.min(chars / 3);
        if limit == 0 || parse_number(value).is_some() {
            return Substitution::None;
        }

        match closest(value, index.entities_of(kind), limit) {
            Closest::Unique { candidate, .. } => return Substitution::Found(candidate.to_string()),
            Closest::Ambiguous(_) => return Substitution::Ambiguous,
            Closest::None => {}
        }

        let max_words = (tokenize(value).len() + 1).min(MAX_PHRASE_WORDS);
        match closest(value, index.phrases_near(chars, limit, max_words), limit) {
            Closest::Unique { candidate, .. } => Substitution::Found(candidate.to_string()),
            Closest::Ambiguous(_) => Substitution::Ambiguous,
            Closest::None => Substitution::None,
        }
    }
}

fn describe(value: &ParamValue) -> String {
    value
        .to_text()
        .unwrap_or_else(|| value.to_json().to_string())
}

fn score_value(index: &EvidenceIndex, kind: &str, value: &ParamValue) -> f64 {
    match value {
        ParamValue::List(items) => items
            .iter()
            .map(|item| score_value(index, kind, item))
            .fold(1.0, f64::min),
        ParamValue::Map(_) => 0.0,
        ParamValue::Null => 1.0,
        scalar => scalar
            .to_text()
            .map_or(0.0, |text| score_text(index, kind, &text)),
    }
}

fn score_text(index: &EvidenceIndex, kind: &str, text: &str) -> f64 {
    let folded = fold(text);
    let number = parse_number(text);
    let same = |candidate: &str| match (number, parse_number(candidate)) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => fold(candidate) == folded,
    };

    if index.entities_of(kind).any(|e| same(e)) || index.facts().any(|f| same(f)) {
        return 1.0;
    }

    let wanted = tokenize(text);
    if wanted.is_empty() {
        return 0.0;
    }

    let mut best_found = 0usize;
    for message in index.messages() {
        if contains_run(message, &wanted) {
            return 1.0;
        }
        let found = wanted
            .iter()
            .filter(|w| message.iter().any(|t| token_eq(t, w)))
            .count();
        best_found = best_found.max(found);
    }

    // A scattered mention never counts as a full one.
    let n = wanted.len() as f64;
    (best_found as f64 / n).min((n - 1.0) / n)
}

fn token_eq(a: &Token, b: &Token) -> bool {
    match (a.number(), b.number()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a.norm == b.norm,
    }
}

fn contains_run(haystack: &[Token], needle: &[Token]) -> bool {
    needle.len() <= haystack.len()
        && haystack
            .windows(needle.len())
            .any(|window| window.iter().zip(needle).all(|(a, b)| token_eq(a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolguard_core::{Message, SessionState, ToolCall};
    use toolguard_tool::{ParameterSchema, ToolSchema};

    fn weather(location: &str) -> TypedCall {
        let schema = ToolSchema::new("get_weather")
            .with_parameter("location", ParameterSchema::string().required().entity("city"))
            .with_parameter("units", ParameterSchema::string());
        let call = ToolCall::new("c1", "get_weather")
            .with_parameter("location", json!(location))
            .with_parameter("units", json!("celsius"));
        TypedCall::from_validated(&call, &schema).unwrap()
    }

    fn transfer(amount: f64) -> TypedCall {
        let schema = ToolSchema::new("transfer_money")
            .with_parameter("from", ParameterSchema::string().entity("account"))
            .with_parameter("amount", ParameterSchema::number().entity("amount"));
        let call = ToolCall::new("c2", "transfer_money")
            .with_parameter("from", json!("savings"))
            .with_parameter("amount", json!(amount));
        TypedCall::from_validated(&call, &schema).unwrap()
    }

    fn user_says(text: &str) -> CallContext {
        CallContext::default().with_message(Message::user(text))
    }

    #[test]
    fn test_mentioned_value_is_grounded() {
        let checker = GroundingChecker::default();
        let ctx = user_says("What's the weather in Paris?");
        assert!(checker.check(&weather("Paris"), &checker.index(&ctx)).is_grounded());
        assert!(checker.check(&weather("paris"), &checker.index(&ctx)).is_grounded());
    }

    #[test]
    fn test_unmentioned_value_is_ungrounded() {
        let checker = GroundingChecker::default();
        let ctx = user_says("What's the weather in Paris?");
        let grounding = checker.check(&weather("Tokyo"), &checker.index(&ctx));
        assert_eq!(grounding.fields().len(), 1);
        assert_eq!(grounding.fields()[0].field, "location");
        assert_eq!(grounding.fields()[0].score, 0.0);
        assert!(!grounding.is_partial());
    }

    #[test]
    fn test_assistant_text_is_not_evidence() {
        let checker = GroundingChecker::default();
        let ctx = user_says("what's the weather?")
            .with_message(Message::assistant("Let me check Tokyo for you"));
        assert!(!checker.check(&weather("Tokyo"), &checker.index(&ctx)).is_grounded());
    }

    #[test]
    fn test_multi_word_needs_contiguous_mention() {
        let checker = GroundingChecker::default();
        let ctx = user_says("Is it raining in New York today?");
        assert!(checker.check(&weather("New York"), &checker.index(&ctx)).is_grounded());

        let ctx = user_says("York is new to me");
        let grounding = checker.check(&weather("New York"), &checker.index(&ctx));
        assert!(!grounding.is_grounded());
        assert!(grounding.is_partial());
        assert_eq!(grounding.fields()[0].score, 0.5);
    }

    #[test]
    fn test_min_score_below_one_accepts_partial() {
        let checker = GroundingChecker::new(GroundingConfig {
            min_score: 0.5,
            ..GroundingConfig::default()
        });
        let ctx = user_says("the weather in York");
        assert!(checker.check(&weather("New York"), &checker.index(&ctx)).is_grounded());
    }

    #[test]
    fn test_numbers_match_numerically() {
        let checker = GroundingChecker::default();
        let ctx = user_says("move $1,000.00 from savings");
        let grounding = checker.check(&transfer(1000.0), &checker.index(&ctx));
        assert!(grounding.is_grounded(), "{:?}", grounding);

        let grounding = checker.check(&transfer(10_000.0), &checker.index(&ctx));
        assert_eq!(grounding.fields()[0].field, "amount");
    }

    #[test]
    fn test_session_entities_and_facts_ground() {
        let checker = GroundingChecker::default();
        let state = SessionState::default()
            .with_entity("account", "savings")
            .with_fact("approved_amount", json!(250));
        let ctx = CallContext::default().with_session_state(state);
        assert!(checker.check(&transfer(250.0), &checker.index(&ctx)).is_grounded());
    }

    #[test]
    fn test_no_evidence_is_conservative() {
        let checker = GroundingChecker::default();
        let grounding = checker.check(&weather("Paris"), &checker.index(&CallContext::default()));
        assert!(!grounding.is_grounded());
    }

    #[test]
    fn test_substitute_from_messages() {
        let checker = GroundingChecker::default();
        let index = checker.index(&user_says("What's the weather in Berlin?"));
        assert_eq!(
            checker.substitute(&index, "city", "Berlinn", 2),
            Substitution::Found("Berlin".to_string())
        );
        assert_eq!(checker.substitute(&index, "city", "Tokyo", 2), Substitution::None);
    }

    #[test]
    fn test_substitute_in_long_conversation() {
        let checker = GroundingChecker::default();
        let mut text: String = (0..20_000).map(|i| format!("w{} ", i)).collect();
        text.push_str("then Berlin");
        let index = checker.index(&user_says(&text));
        assert_eq!(
            checker.substitute(&index, "city", "Berlinn", 2),
            Substitution::Found("Berlin".to_string())
        );
        assert_eq!(
            checker.substitute(&index, "city", "Berlinz", 2),
            Substitution::Found("Berlin".to_string())
        );
    }

    #[test]
    fn test_substitute_prefers_session_entities() {
        let checker = GroundingChecker::default();
        let state = SessionState::default().with_entity("account", "checking");
        let ctx = user_says("send it to chequing").with_session_state(state);
        let index = checker.index(&ctx);
        assert_eq!(
            checker.substitute(&index, "account", "checkin", 2),
            Substitution::Found("checking".to_string())
        );
    }

    #[test]
    fn test_substitute_ambiguous() {
        let checker = GroundingChecker::default();
        let state = SessionState::default()
            .with_entity("account", "acct-101")
            .with_entity("account", "acct-102");
        let index = checker.index(&CallContext::default().with_session_state(state));
        assert_eq!(
            checker.substitute(&index, "account", "acct-103", 2),
            Substitution::Ambiguous
        );
    }
}
