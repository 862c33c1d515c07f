//! Near-miss corrections.
//!
//! A correction is a minimally edited copy of the proposed call with the
//! same id. It is only offered when the edited call would itself pass
//! structural validation and policy.

use crate::engine::Snapshot;
use serde_json::{Map, Value};
use toolguard_core::text::{closest, fold, Closest};
use toolguard_core::{CallContext, ToolCall};
use toolguard_ground::{EvidenceIndex, Substitution, UngroundedField};
use toolguard_tool::{ParamType, ToolSchema, TypedCall, Violation};

/// Outcome of a correction attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    /// A corrected call and what was changed
    Offered {
        /// The corrected call, same id as the proposed one
        call: ToolCall,
        /// Human-readable list of edits
        summary: String,
    },
    /// Several fixes are equally close
    Ambiguous,
    /// Not a near miss
    None,
}

impl Correction {
    /// Check if a correction was found
    #[must_use]
    pub fn is_offered(&self) -> bool {
        matches!(self, Self::Offered { .. })
    }
}

enum Fix {
    Edit(ToolCall, String),
    Ambiguous,
    None,
}

/// Proposes corrected calls for one request
pub struct CorrectionSynthesizer<'a> {
    snapshot: &'a Snapshot,
    context: &'a CallContext,
    index: &'a EvidenceIndex,
}

impl<'a> CorrectionSynthesizer<'a> {
    /// Create a synthesizer over a snapshot and the request's evidence
    #[must_use]
    pub fn new(snapshot: &'a Snapshot, context: &'a CallContext, index: &'a EvidenceIndex) -> Self {
        Self {
            snapshot,
            context,
            index,
        }
    }

    /// Map an unregistered tool name onto the one registered tool it is
    /// closest to.
    ///
    /// The allowed distance is `max_name_distance`, capped at a third of
    /// the name length. The renamed call may receive one structural fix.
    /// Grounding is not required of a renamed call: the caller is expected
    /// to resubmit it.
    #[must_use]
    pub fn correct_name(&self, call: &ToolCall) -> Correction {
        let settings = &self.snapshot.settings().correction;
        let limit = settings
            .max_name_distance
            .min(fold(&call.name).chars().count() / 3);

        let target = match closest(&call.name, self.snapshot.registry().names(), limit) {
            Closest::Unique { candidate, .. } => candidate,
            Closest::Ambiguous(names) => {
                tracing::debug!(call_id = %call.id, tool = %call.name, candidates = ?names, "tool name is ambiguous");
                return Correction::Ambiguous;
            }
            Closest::None => return Correction::None,
        };
        let Ok(schema) = self.snapshot.registry().lookup(target) else {
            return Correction::None;
        };

        let renamed = call.renamed(target);
        let mut summary = format!("tool '{}' does not exist, use '{}'", call.name, target);
        let violations = self.snapshot.validator().validate(&renamed, schema);
        let candidate = if violations.is_empty() {
            renamed
        } else {
            match self.repair(&renamed, schema, &violations) {
                Correction::Offered { call: fixed, summary: edits } => {
                    summary = format!("{}; {}", summary, edits);
                    fixed
                }
                other => return other,
            }
        };

        if self.acceptable(&candidate, schema, false) {
            Correction::Offered {
                call: candidate,
                summary,
            }
        } else {
            Correction::None
        }
    }

    /// Fix structural violations of a call to a registered tool
    #[must_use]
    pub fn fix_structure(&self, call: &ToolCall, schema: &ToolSchema, violations: &[Violation]) -> Correction {
        match self.repair(call, schema, violations) {
            Correction::Offered { call: fixed, summary } if !self.acceptable(&fixed, schema, true) => {
                tracing::debug!(call_id = %call.id, %summary, "structural fix rejected by later checks");
                Correction::None
            }
            other => other,
        }
    }

    /// Replace ungrounded values with grounded look-alikes.
    ///
    /// Every ungrounded field must be a string with a unique substitute,
    /// and the result must pass every check including grounding.
    #[must_use]
    pub fn substitute_values(
        &self,
        call: &ToolCall,
        schema: &ToolSchema,
        ungrounded: &[UngroundedField],
    ) -> Correction {
        let settings = &self.snapshot.settings().correction;
        if ungrounded.is_empty() || ungrounded.len() > settings.max_field_edits {
            return Correction::None;
        }

        let mut fixed = call.clone();
        let mut edits = Vec::with_capacity(ungrounded.len());
        for field in ungrounded {
            let Some(Value::String(value)) = call.parameters.get(&field.field) else {
                return Correction::None;
            };
            match self.snapshot.grounding().substitute(
                self.index,
                &field.kind,
                value,
                settings.max_value_distance,
            ) {
                Substitution::Found(substitute) => {
                    edits.push(format!(
                        "replace '{}' with '{}' in '{}'",
                        value, substitute, field.field
                    ));
                    fixed
                        .parameters
                        .insert(field.field.clone(), Value::String(substitute));
                }
                Substitution::Ambiguous => return Correction::Ambiguous,
                Substitution::None => return Correction::None,
            }
        }

        if self.acceptable(&fixed, schema, true) {
            Correction::Offered {
                call: fixed,
                summary: edits.join("; "),
            }
        } else {
            Correction::None
        }
    }

    fn repair(&self, call: &ToolCall, schema: &ToolSchema, violations: &[Violation]) -> Correction {
        if violations.is_empty() || violations.len() > self.snapshot.settings().correction.max_field_edits {
            return Correction::None;
        }

        let mut fixed = call.clone();
        let mut edits = Vec::with_capacity(violations.len());
        for violation in violations {
            match self.fix_one(&fixed, schema, violation) {
                Fix::Edit(next, edit) => {
                    fixed = next;
                    edits.push(edit);
                }
                Fix::Ambiguous => return Correction::Ambiguous,
                Fix::None => return Correction::None,
            }
        }

        if self.snapshot.validator().validate(&fixed, schema).is_empty() {
            Correction::Offered {
                call: fixed,
                summary: edits.join("; "),
            }
        } else {
            Correction::None
        }
    }

    fn fix_one(&self, call: &ToolCall, schema: &ToolSchema, violation: &Violation) -> Fix {
        let max_distance = self.snapshot.settings().correction.max_value_distance;
        match violation {
            Violation::NotInEnum {
                field,
                value,
                allowed,
            } => match closest(value, allowed.iter().map(String::as_str), max_distance) {
                Closest::Unique { candidate, .. } => {
                    let mut next = call.clone();
                    next.parameters
                        .insert(field.clone(), Value::String(candidate.to_string()));
                    Fix::Edit(next, format!("use '{}' for '{}'", candidate, field))
                }
                Closest::Ambiguous(_) => Fix::Ambiguous,
                Closest::None => Fix::None,
            },
            Violation::TypeMismatch { field, expected, .. } => {
                let coerced = call
                    .parameters
                    .get(field)
                    .and_then(|value| coerce(value, *expected));
                match coerced {
                    Some(value) => {
                        let mut next = call.clone();
                        next.parameters.insert(field.clone(), value);
                        Fix::Edit(next, format!("convert '{}' to {}", field, expected))
                    }
                    None => Fix::None,
                }
            }
            Violation::UnexpectedField { field } => {
                let absent = schema
                    .parameters
                    .iter()
                    .filter(|(name, param)| !param.required && !call.parameters.contains_key(*name))
                    .map(|(name, _)| name.as_str());
                let limit = max_distance.min(fold(field).chars().count() / 3);
                match closest(field, absent, limit) {
                    Closest::Unique { candidate, .. } => Fix::Edit(
                        rename_field(call, field, candidate),
                        format!("rename '{}' to '{}'", field, candidate),
                    ),
                    Closest::Ambiguous(_) => Fix::Ambiguous,
                    Closest::None => Fix::None,
                }
            }
            Violation::MissingField { .. }
            | Violation::TooLong { .. }
            | Violation::PatternMismatch { .. } => Fix::None,
        }
    }

    fn acceptable(&self, call: &ToolCall, schema: &ToolSchema, grounded: bool) -> bool {
        if !self.snapshot.validator().validate(call, schema).is_empty() {
            return false;
        }
        let Ok(typed) = TypedCall::from_validated(call, schema) else {
            return false;
        };
        if !self.snapshot.policy().evaluate(&typed, self.context).allowed {
            return false;
        }
        !grounded
            || self
                .snapshot
                .grounding()
                .check(&typed, self.index)
                .is_grounded()
    }
}

/// Convert a value of the wrong JSON type when the conversion is lossless
fn coerce(value: &Value, expected: ParamType) -> Option<Value> {
    match (expected, value) {
        (ParamType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        (ParamType::Integer, Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| Value::from(f as i64)),
        (ParamType::Number, Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .map(Value::from)
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(Value::from))
        }
        (ParamType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (ParamType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ParamType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn rename_field(call: &ToolCall, from: &str, to: &str) -> ToolCall {
    let parameters: Map<String, Value> = call
        .parameters
        .iter()
        .map(|(key, value)| {
            let key = if key == from { to.to_string() } else { key.clone() };
            (key, value.clone())
        })
        .collect();
    ToolCall {
        parameters,
        ..call.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Settings;
    use serde_json::json;
    use std::sync::Arc;
    use toolguard_core::{Message, SessionState};
    use toolguard_policy::PolicyCompiler;
    use toolguard_tool::{ParameterSchema, SchemaRegistry};

    fn snapshot() -> Arc<Snapshot> {
        let registry = SchemaRegistry::from_schemas([
            ToolSchema::new("get_weather")
                .with_parameter("location", ParameterSchema::string().required().entity("city"))
                .with_parameter("units", ParameterSchema::string().with_enum(["celsius", "fahrenheit"])),
            ToolSchema::new("get_stock_price")
                .with_parameter("symbol", ParameterSchema::string().required())
                .with_parameter("exchange", ParameterSchema::string())
                .strict(),
            ToolSchema::new("transfer_money")
                .with_parameter("to", ParameterSchema::string().required().entity("account"))
                .with_parameter("amount", ParameterSchema::number().required()),
            ToolSchema::new("get_time"),
            ToolSchema::new("get_tide"),
        ])
        .unwrap();
        let policy = PolicyCompiler::new()
            .compile_from_yaml(
                "policies:\n  - id: ceiling\n    tool: transfer_money\n    action: reject\n    max: { field: amount, value: 100 }\n",
            )
            .unwrap();
        Arc::new(Snapshot::new(registry, policy, Settings::default()))
    }

    fn context() -> CallContext {
        CallContext::default()
            .with_message(Message::user("weather in Berlin please, and pay checking"))
            .with_session_state(SessionState::default().with_entity("account", "checking"))
    }

    fn offered(correction: Correction) -> ToolCall {
        match correction {
            Correction::Offered { call, .. } => call,
            other => panic!("expected a correction, got {:?}", other),
        }
    }

    #[test]
    fn test_correct_name_unique_match() {
        let snap = snapshot();
        let ctx = context();
        let index = snap.grounding().index(&ctx);
        let synth = CorrectionSynthesizer::new(&snap, &ctx, &index);

        let call = ToolCall::new("c1", "get_whether").with_parameter("location", json!("Berlin"));
        let fixed = offered(synth.correct_name(&call));
        assert_eq!(fixed.name, "get_weather");
        assert_eq!(fixed.id, call.id);
        assert_eq!(fixed.parameters, call.parameters);
    }

    #[test]
    fn test_correct_name_case_and_dash() {
        let snap = snapshot();
        let ctx = context();
        let index = snap.grounding().index(&ctx);
        let synth = CorrectionSynthesizer::new(&snap, &ctx, &index);

        let call = ToolCall::new("c1", "Get-Weather").with_parameter("location", json!("Berlin"));
        assert_eq!(offered(synth.correct_name(&call)).name, "get_weather");
    }

    #[test]
    fn test_correct_name_ambiguous_and_far() {
        let snap = snapshot();
        let ctx = context();
        let index = snap.grounding().index(&ctx);
        let synth = CorrectionSynthesizer::new(&snap, &ctx, &index);

        assert_eq!(synth.correct_name(&ToolCall::new("c1", "get_tine")), Correction::Ambiguous);
        assert_eq!(synth.correct_name(&ToolCall::new("c2", "delete_all")), Correction::None);
        // short names leave no room for edits
        assert_eq!(synth.correct_name(&ToolCall::new("c3", "gw")), Correction::None);
    }

    #[test]
    fn test_correct_name_then_policy_blocks() {
        let snap = snapshot();
        let ctx = context();
        let index = snap.grounding().index(&ctx);
        let synth = CorrectionSynthesizer::new(&snap, &ctx, &index);

        let call = ToolCall::new("c1", "transfer_mony")
            .with_parameter("to", json!("checking"))
            .with_parameter("amount", json!(500));
        assert_eq!(synth.correct_name(&call), Correction::None);
    }

    #[test]
    fn test_fix_enum_value() {
        let snap = snapshot();
        let ctx = context();
        let index = snap.grounding().index(&ctx);
        let synth = CorrectionSynthesizer::new(&snap, &ctx, &index);
        let schema = snap.registry().lookup("get_weather").unwrap();

        let call = ToolCall::new("c1", "get_weather")
            .with_parameter("location", json!("Berlin"))
            .with_parameter("units", json!("Celcius"));
        let violations = snap.validator().validate(&call, schema);
        let fixed = offered(synth.fix_structure(&call, schema, &violations));
        assert_eq!(fixed.parameters["units"], json!("celsius"));
    }

    #[test]
    fn test_fix_numeric_string() {
        let snap = snapshot();
        let ctx = context();
        let index = snap.grounding().index(&ctx);
        let synth = CorrectionSynthesizer::new(&snap, &ctx, &index);
        let schema = snap.registry().lookup("transfer_money").unwrap();

        let call = ToolCall::new("c1", "transfer_money")
            .with_parameter("to", json!("checking"))
            .with_parameter("amount", json!("42"));
        let violations = snap.validator().validate(&call, schema);
        let fixed = offered(synth.fix_structure(&call, schema, &violations));
        assert_eq!(fixed.parameters["amount"], json!(42));

        // a fix that would break policy is not offered
        let call = call.with_parameter("amount", json!("4200"));
        let violations = snap.validator().validate(&call, schema);
        assert_eq!(synth.fix_structure(&call, schema, &violations), Correction::None);
    }

    #[test]
    fn test_fix_misspelled_optional_field() {
        let snap = snapshot();
        let ctx = context();
        let index = snap.grounding().index(&ctx);
        let synth = CorrectionSynthesizer::new(&snap, &ctx, &index);
        let schema = snap.registry().lookup("get_stock_price").unwrap();

        let call = ToolCall::new("c1", "get_stock_price")
            .with_parameter("symbol", json!("AAPL"))
            .with_parameter("exchang", json!("NASDAQ"));
        let violations = snap.validator().validate(&call, schema);
        let fixed = offered(synth.fix_structure(&call, schema, &violations));
        let keys: Vec<_> = fixed.parameters.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["symbol", "exchange"]);
    }

    #[test]
    fn test_missing_required_is_never_fixed() {
        let snap = snapshot();
        let ctx = context();
        let index = snap.grounding().index(&ctx);
        let synth = CorrectionSynthesizer::new(&snap, &ctx, &index);
        let schema = snap.registry().lookup("get_stock_price").unwrap();

        let call = ToolCall::new("c1", "get_stock_price").with_parameter("symbl", json!("AAPL"));
        let violations = snap.validator().validate(&call, schema);
        assert_eq!(synth.fix_structure(&call, schema, &violations), Correction::None);
    }

    #[test]
    fn test_too_many_edits() {
        let snap = snapshot();
        let ctx = context();
        let index = snap.grounding().index(&ctx);
        let synth = CorrectionSynthesizer::new(&snap, &ctx, &index);
        let schema = snap.registry().lookup("get_weather").unwrap();

        let call = ToolCall::new("c1", "get_weather")
            .with_parameter("location", json!(7))
            .with_parameter("units", json!("Celcius"));
        let violations = snap.validator().validate(&call, schema);
        assert_eq!(violations.len(), 2);
        assert_eq!(synth.fix_structure(&call, schema, &violations), Correction::None);
    }

    #[test]
    fn test_substitute_grounded_value() {
        let snap = snapshot();
        let ctx = context();
        let index = snap.grounding().index(&ctx);
        let synth = CorrectionSynthesizer::new(&snap, &ctx, &index);
        let schema = snap.registry().lookup("get_weather").unwrap();

        let call = ToolCall::new("c1", "get_weather").with_parameter("location", json!("Berlinn"));
        let typed = TypedCall::from_validated(&call, schema).unwrap();
        let grounding = snap.grounding().check(&typed, &index);
        let fixed = offered(synth.substitute_values(&call, schema, grounding.fields()));
        assert_eq!(fixed.parameters["location"], json!("Berlin"));

        let call = ToolCall::new("c2", "get_weather").with_parameter("location", json!("Tokyo"));
        let typed = TypedCall::from_validated(&call, schema).unwrap();
        let grounding = snap.grounding().check(&typed, &index);
        assert_eq!(
            synth.substitute_values(&call, schema, grounding.fields()),
            Correction::None
        );
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce(&json!("12"), ParamType::Integer), Some(json!(12)));
        assert_eq!(coerce(&json!(12.0), ParamType::Integer), Some(json!(12)));
        assert_eq!(coerce(&json!(12.5), ParamType::Integer), None);
        assert_eq!(coerce(&json!("2.5"), ParamType::Number), Some(json!(2.5)));
        assert_eq!(coerce(&json!("TRUE"), ParamType::Boolean), Some(json!(true)));
        assert_eq!(coerce(&json!(3), ParamType::String), Some(json!("3")));
        assert_eq!(coerce(&json!("abc"), ParamType::Number), None);
        assert_eq!(coerce(&json!([1]), ParamType::String), None);
    }
}
