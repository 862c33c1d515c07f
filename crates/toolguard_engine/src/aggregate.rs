//! Per-call decision pipeline.

use crate::correct::{Correction, CorrectionSynthesizer};
use crate::engine::Snapshot;
use toolguard_core::{CallContext, RejectReason, ToolCall, Verdict, VerdictFlag};
use toolguard_ground::{EvidenceIndex, Grounding, UngroundedField};
use toolguard_policy::PolicyViolation;
use toolguard_tool::validate::describe;

/// Progress of one call through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Call accepted for validation
    Received,
    /// Schema found and structure checked
    StructurallyChecked,
    /// Policy rules evaluated
    PolicyChecked,
    /// Grounding evaluated
    GroundingChecked,
    /// Terminal verdict produced
    Aggregated,
}

impl CallState {
    /// Get state name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::StructurallyChecked => "structurally_checked",
            Self::PolicyChecked => "policy_checked",
            Self::GroundingChecked => "grounding_checked",
            Self::Aggregated => "aggregated",
        }
    }

    /// Check if moving to `next` is allowed
    #[must_use]
    pub fn can_advance_to(&self, next: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, next),
            (Received, StructurallyChecked)
                | (Received, Aggregated)
                | (StructurallyChecked, PolicyChecked)
                | (StructurallyChecked, Aggregated)
                | (PolicyChecked, GroundingChecked)
                | (GroundingChecked, Aggregated)
        )
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct Progress<'c> {
    call: &'c ToolCall,
    state: CallState,
}

impl<'c> Progress<'c> {
    fn new(call: &'c ToolCall) -> Self {
        tracing::trace!(call_id = %call.id, tool = %call.name, state = %CallState::Received, "call state");
        Self {
            call,
            state: CallState::Received,
        }
    }

    fn advance(&mut self, next: CallState) {
        debug_assert!(self.state.can_advance_to(next), "{} -> {}", self.state, next);
        tracing::trace!(call_id = %self.call.id, from = %self.state, to = %next, "call state");
        self.state = next;
    }

    fn finish(mut self, verdict: Verdict) -> Verdict {
        self.advance(CallState::Aggregated);
        tracing::debug!(call_id = %self.call.id, status = %verdict.status, "verdict");
        verdict
    }
}

/// Produces the verdict for each call of one request
pub struct Aggregator<'a> {
    snapshot: &'a Snapshot,
    context: &'a CallContext,
    index: &'a EvidenceIndex,
}

impl<'a> Aggregator<'a> {
    /// Create an aggregator for one request
    #[must_use]
    pub fn new(snapshot: &'a Snapshot, context: &'a CallContext, index: &'a EvidenceIndex) -> Self {
        Self {
            snapshot,
            context,
            index,
        }
    }

    /// Judge one call. Never fails: every problem becomes a verdict.
    #[must_use]
    pub fn judge(&self, call: &ToolCall) -> Verdict {
        let mut progress = Progress::new(call);
        let synth = CorrectionSynthesizer::new(self.snapshot, self.context, self.index);

        let Ok(schema) = self.snapshot.registry().lookup(&call.name) else {
            let detail = format!("tool '{}' is not registered", call.name);
            let verdict = match synth.correct_name(call) {
                Correction::Offered { call: fixed, summary } => Verdict::needs_correction(fixed, summary),
                Correction::Ambiguous => Verdict::rejected(call.id.clone(), RejectReason::UnknownTool, detail)
                    .with_flags([VerdictFlag::AmbiguousMatch]),
                Correction::None => Verdict::rejected(call.id.clone(), RejectReason::UnknownTool, detail),
            };
            return progress.finish(verdict);
        };

        let violations = self.snapshot.validator().validate(call, schema);
        progress.advance(CallState::StructurallyChecked);
        if !violations.is_empty() {
            let detail = describe(&violations);
            let verdict = match synth.fix_structure(call, schema, &violations) {
                Correction::Offered { call: fixed, summary } => {
                    Verdict::needs_correction(fixed, format!("{}; suggested fix: {}", detail, summary))
                }
                Correction::Ambiguous => {
                    Verdict::rejected(call.id.clone(), RejectReason::InvalidParameters, detail)
                        .with_flags([VerdictFlag::AmbiguousMatch])
                }
                Correction::None => Verdict::rejected(call.id.clone(), RejectReason::InvalidParameters, detail),
            };
            return progress.finish(verdict);
        }

        let typed = match toolguard_tool::TypedCall::from_validated(call, schema) {
            Ok(typed) => typed,
            Err(err) => {
                let verdict = Verdict::rejected(call.id.clone(), RejectReason::InvalidParameters, err.to_string());
                return progress.finish(verdict);
            }
        };

        let decision = self.snapshot.policy().evaluate(&typed, self.context);
        progress.advance(CallState::PolicyChecked);
        let grounding = self.snapshot.grounding().check(&typed, self.index);
        progress.advance(CallState::GroundingChecked);

        if let Some(violation) = decision.violation {
            return progress.finish(policy_verdict(call, &violation));
        }

        if let Grounding::Ungrounded(fields) = &grounding {
            let detail = ungrounded_detail(fields);
            let partial = grounding.is_partial().then_some(VerdictFlag::PartialGrounding);
            let verdict = match synth.substitute_values(call, schema, fields) {
                Correction::Offered { call: fixed, summary } => {
                    Verdict::needs_correction(fixed, format!("{}; suggested fix: {}", detail, summary))
                        .with_flags(partial)
                }
                Correction::Ambiguous => {
                    Verdict::rejected(call.id.clone(), RejectReason::HallucinatedValue, detail)
                        .with_flags(partial.into_iter().chain([VerdictFlag::AmbiguousMatch]))
                }
                Correction::None => {
                    Verdict::rejected(call.id.clone(), RejectReason::HallucinatedValue, detail).with_flags(partial)
                }
            };
            return progress.finish(verdict);
        }

        progress.finish(Verdict::approved(call))
    }
}

fn policy_verdict(call: &ToolCall, violation: &PolicyViolation) -> Verdict {
    match &violation.evaluation_error {
        Some(err) => Verdict::rejected(
            call.id.clone(),
            RejectReason::PolicyViolation,
            format!("rule '{}' could not be evaluated: {}", violation.rule_id, err),
        )
        .with_flags([VerdictFlag::RuleEvaluationError]),
        None => Verdict::rejected(
            call.id.clone(),
            RejectReason::PolicyViolation,
            format!("{} (rule '{}')", violation.reason, violation.rule_id),
        ),
    }
}

fn ungrounded_detail(fields: &[UngroundedField]) -> String {
    fields
        .iter()
        .map(|f| {
            format!(
                "parameter '{}' value '{}' does not appear in the conversation",
                f.field, f.value
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use serde_json::json;
    use toolguard_core::{Message, SessionState, VerdictStatus};

    const CONFIG: &str = r#"
schemas:
  - name: get_weather
    parameters:
      location: { type: string, required: true, entity: city }
      units: { type: string, enum: [celsius, fahrenheit] }
      options: { type: object }
  - name: book_flight
    parameters:
      from: { type: string, required: true, entity: city }
      to: { type: string, required: true, entity: city }
      date: { type: string, required: true, pattern: "^\\d{4}-\\d{2}-\\d{2}$" }
policies:
  - id: night-freeze
    tool: "*"
    action: reject
    reason: "no tool calls after 23:00"
    condition: "time.hour >= 23"
  - id: vip
    tool: book_flight
    action: allow
    priority: 10
    condition: "user.role == 'vip'"
  - id: no-paris-flights
    tool: book_flight
    action: reject
    condition: "params.to == 'Paris'"
  - id: broken
    tool: get_weather
    action: reject
    condition: "params.units > 3"
"#;

    fn snapshot() -> Snapshot {
        Snapshot::from_config(&GuardConfig::from_yaml_str(CONFIG).unwrap()).unwrap()
    }

    fn judge(call: &ToolCall, context: &CallContext) -> Verdict {
        let snap = snapshot();
        let index = snap.grounding().index(context);
        Aggregator::new(&snap, context, &index).judge(call)
    }

    fn says(text: &str) -> CallContext {
        CallContext::new("u1", "s1").with_message(Message::user(text))
    }

    fn flight(to: &str) -> ToolCall {
        ToolCall::new("f1", "book_flight")
            .with_parameter("from", json!("London"))
            .with_parameter("to", json!(to))
            .with_parameter("date", json!("2026-11-02"))
    }

    #[test]
    fn test_state_transitions() {
        assert!(CallState::Received.can_advance_to(CallState::StructurallyChecked));
        assert!(CallState::Received.can_advance_to(CallState::Aggregated));
        assert!(!CallState::Received.can_advance_to(CallState::GroundingChecked));
        assert!(!CallState::Aggregated.can_advance_to(CallState::Received));
        assert_eq!(CallState::PolicyChecked.to_string(), "policy_checked");
    }

    #[test]
    fn test_policy_beats_grounding() {
        let verdict = judge(&flight("Paris"), &says("fly me somewhere"));
        assert_eq!(verdict.reason, Some(RejectReason::PolicyViolation));
        assert!(verdict.detail.unwrap().contains("no-paris-flights"));
    }

    #[test]
    fn test_nested_nulls_approved() {
        let call = ToolCall::new("w1", "get_weather")
            .with_parameter("location", json!("Paris"))
            .with_parameter("options", json!({"unit": null}))
            .with_parameter("extra", json!({"a": null}));
        let verdict = judge(&call, &says("weather in Paris please"));
        assert!(verdict.is_approved(), "{:?}", verdict);
    }

    #[test]
    fn test_allow_overrides_reject() {
        let ctx = says("fly from London to Paris").with_role("vip");
        assert!(judge(&flight("Paris"), &ctx).is_approved());
    }

    #[test]
    fn test_wildcard_rule_with_context_time() {
        let ctx = says("fly from London to Rome").with_time_of_day(23);
        let verdict = judge(&flight("Rome"), &ctx);
        assert_eq!(verdict.reason, Some(RejectReason::PolicyViolation));

        let ctx = says("fly from London to Rome").with_time_of_day(9);
        assert!(judge(&flight("Rome"), &ctx).is_approved());
    }

    #[test]
    fn test_rule_evaluation_error_flag() {
        let call = ToolCall::new("w1", "get_weather")
            .with_parameter("location", json!("Oslo"))
            .with_parameter("units", json!("celsius"));
        let verdict = judge(&call, &says("weather in Oslo"));
        assert_eq!(verdict.reason, Some(RejectReason::PolicyViolation));
        assert_eq!(verdict.flags, vec![VerdictFlag::RuleEvaluationError]);
    }

    #[test]
    fn test_pattern_violation_is_invalid_parameters() {
        let call = flight("Rome").with_parameter("date", json!("next tuesday"));
        let verdict = judge(&call, &says("fly from London to Rome"));
        assert_eq!(verdict.reason, Some(RejectReason::InvalidParameters));
        assert!(verdict.detail.unwrap().contains("date"));
    }

    #[test]
    fn test_partial_grounding_flag() {
        let call = flight("New York");
        let verdict = judge(&call, &says("fly from London to York"));
        assert_eq!(verdict.status, VerdictStatus::Rejected);
        assert_eq!(verdict.reason, Some(RejectReason::HallucinatedValue));
        assert!(verdict.flags.contains(&VerdictFlag::PartialGrounding));
    }

    #[test]
    fn test_grounded_substitute_offered() {
        let call = flight("Madird");
        let verdict = judge(&call, &says("fly from London to Madrid"));
        assert_eq!(verdict.status, VerdictStatus::NeedsCorrection);
        let fixed = verdict.suggested_correction.unwrap();
        assert_eq!(fixed.parameters["to"], json!("Madrid"));
        assert_eq!(fixed.id.as_str(), "f1");
        assert!(verdict.reason.is_none());
    }

    #[test]
    fn test_ambiguous_substitute_flagged() {
        let state = SessionState::default()
            .with_entity("city", "Rome")
            .with_entity("city", "Rima")
            .with_entity("city", "London");
        let ctx = says("book it").with_session_state(state);
        let verdict = judge(&flight("Rime"), &ctx);
        assert_eq!(verdict.reason, Some(RejectReason::HallucinatedValue));
        assert!(verdict.flags.contains(&VerdictFlag::AmbiguousMatch));
    }
}
