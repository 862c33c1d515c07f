//! Terminal rendering of verdicts.

use console::style;
use toolguard_core::{ToolCall, ValidationResult, Verdict, VerdictStatus};

/// One line per verdict plus details, or pretty JSON
pub fn render(calls: &[ToolCall], result: &ValidationResult, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(result).unwrap_or_default() + "\n";
    }

    let mut out = String::new();
    for (call, verdict) in calls.iter().zip(result.iter()) {
        out.push_str(&render_one(call, verdict));
        out.push('\n');
    }
    out.push_str(&format!(
        "{} approved, {} rejected, {} need correction\n",
        result.count(VerdictStatus::Approved),
        result.count(VerdictStatus::Rejected),
        result.count(VerdictStatus::NeedsCorrection),
    ));
    out
}

fn render_one(call: &ToolCall, verdict: &Verdict) -> String {
    let status = match verdict.status {
        VerdictStatus::Approved => style("APPROVED").green().bold(),
        VerdictStatus::Rejected => style("REJECTED").red().bold(),
        VerdictStatus::NeedsCorrection => style("CORRECT?").yellow().bold(),
    };
    let mut line = format!("{} {} {}", status, style(&call.id).dim(), call.name);

    if let Some(reason) = verdict.reason {
        line.push_str(&format!(" [{}]", reason));
    }
    if !verdict.flags.is_empty() {
        let flags: Vec<_> = verdict
            .flags
            .iter()
            .filter_map(|f| serde_json::to_value(f).ok())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        line.push_str(&format!(" ({})", flags.join(", ")));
    }
    if let Some(detail) = &verdict.detail {
        line.push_str(&format!("\n    {}", detail));
    }
    if let Some(fix) = &verdict.suggested_correction {
        let params = serde_json::Value::Object(fix.parameters.clone());
        line.push_str(&format!("\n    suggested: {} {}", style(&fix.name).cyan(), params));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolguard_core::{RejectReason, VerdictFlag};

    #[test]
    fn test_render_summary_and_json() {
        console::set_colors_enabled(false);
        let calls = vec![
            ToolCall::new("c1", "get_weather"),
            ToolCall::new("c2", "get_whether"),
            ToolCall::new("c3", "launch"),
        ];
        let result = ValidationResult::new(vec![
            Verdict::approved(&calls[0]),
            Verdict::needs_correction(
                ToolCall::new("c2", "get_weather").with_parameter("location", json!("Berlin")),
                "did you mean get_weather",
            ),
            Verdict::rejected("c3".into(), RejectReason::UnknownTool, "not registered")
                .with_flags([VerdictFlag::AmbiguousMatch]),
        ]);

        let text = render(&calls, &result, false);
        assert!(text.contains("APPROVED c1 get_weather"));
        assert!(text.contains("suggested: get_weather {\"location\":\"Berlin\"}"));
        assert!(text.contains("[unknown_tool] (ambiguous_match)"));
        assert!(text.ends_with("1 approved, 1 rejected, 1 need correction\n"));

        let json: serde_json::Value = serde_json::from_str(&render(&calls, &result, true)).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 3);
    }
}
