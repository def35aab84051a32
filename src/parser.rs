//! Extraction of a structured action or a completion signal from free-form
//! model output. Rules are tried in order and the first that applies wins;
//! malformed fragments are logged and treated as absence, never as errors.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::types::{ActionDirective, ActionKind, ParsedResponse};

/// Fixed textual signal that the task is finished. Checked case-insensitively
/// and with precedence over any action payload in the same turn.
pub const COMPLETION_MARKER: &str = "TASK COMPLETE";

const DEFAULT_RESULT: &str = "Task completed successfully";

static RESULT_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)Result:(.*?)(?:\n|$)").expect("static pattern"));

static FENCED_ACTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)```(?:json)?\s*(\{\s*"type".*?\})\s*```"#).expect("static pattern")
});

static LOOSE_ACTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)\{[\s\n]*"type"[\s\n]*:[\s\n]*"[^"]*"[\s\n]*,[\s\n]*"target"[\s\n]*:[\s\n]*"[^"]*".*?\}"#,
    )
    .expect("static pattern")
});

/// Parse one model turn into a completion signal, a directive, or nothing.
pub fn parse(text: &str) -> ParsedResponse {
    if text.to_uppercase().contains(COMPLETION_MARKER) {
        let result = RESULT_LABEL
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_RESULT.to_string());
        return ParsedResponse::Completed { result };
    }

    if let Some(captures) = FENCED_ACTION.captures(text) {
        if let Some(directive) = directive_from_fragment(&captures[1]) {
            return ParsedResponse::Directive(directive);
        }
    }

    if let Some(found) = LOOSE_ACTION.find(text) {
        if let Some(directive) = directive_from_fragment(found.as_str()) {
            return ParsedResponse::Directive(directive);
        }
    }

    // Last-resort heuristic: prose that clearly asks to collect page content.
    let lowered = text.to_lowercase();
    if lowered.contains("collect") && lowered.contains("content") {
        return ParsedResponse::Directive(ActionDirective::collect());
    }

    ParsedResponse::Unparsed
}

/// Decode and validate one extracted JSON fragment. Rejection falls through
/// to the next extraction rule rather than failing the turn.
fn directive_from_fragment(fragment: &str) -> Option<ActionDirective> {
    let value: serde_json::Value = match serde_json::from_str(fragment) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, fragment, "discarding malformed action fragment");
            return None;
        }
    };

    let kind = ActionKind::from_wire(value.get("type")?.as_str()?)?;
    let target = value
        .get("target")
        .and_then(|t| t.as_str())
        .map(String::from);
    if kind != ActionKind::Collect && target.is_none() {
        debug!(kind = kind.as_str(), "discarding directive without target");
        return None;
    }
    let value_field = value
        .get("value")
        .and_then(|v| v.as_str())
        .map(String::from);

    Some(ActionDirective {
        kind,
        target,
        value: value_field,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_directive(text: &str) -> ActionDirective {
        match parse(text) {
            ParsedResponse::Directive(d) => d,
            other => panic!("expected directive, got {other:?}"),
        }
    }

    #[test]
    fn fenced_click_action_parses() {
        let directive = expect_directive("```json\n{\"type\":\"click\",\"target\":\"#submit\"}\n```");
        assert_eq!(directive.kind, ActionKind::Click);
        assert_eq!(directive.target.as_deref(), Some("#submit"));
        assert_eq!(directive.value, None);
    }

    #[test]
    fn completion_marker_extracts_result_line() {
        match parse("TASK COMPLETE\nResult: Booked the flight\n") {
            ParsedResponse::Completed { result } => assert_eq!(result, "Booked the flight"),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn completion_marker_defaults_result_when_label_absent() {
        match parse("All done. task complete!") {
            ParsedResponse::Completed { result } => {
                assert_eq!(result, "Task completed successfully")
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn completion_takes_precedence_over_action_payload() {
        let text = "TASK COMPLETE\nResult: done\n```json\n{\"type\":\"click\",\"target\":\"#x\"}\n```";
        assert!(matches!(parse(text), ParsedResponse::Completed { .. }));
    }

    #[test]
    fn non_collect_directive_without_target_is_rejected() {
        let text = "```json\n{\"type\":\"click\",\"value\":\"x\"}\n```";
        assert!(matches!(parse(text), ParsedResponse::Unparsed));
    }

    #[test]
    fn collect_directive_without_target_is_accepted() {
        let directive = expect_directive("```json\n{\"type\":\"collect\"}\n```");
        assert_eq!(directive.kind, ActionKind::Collect);
        assert_eq!(directive.target, None);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let text = "```json\n{\"type\":\"hover\",\"target\":\"#x\"}\n```";
        assert!(matches!(parse(text), ParsedResponse::Unparsed));
    }

    #[test]
    fn loose_json_without_fences_parses() {
        let text = r##"I will now do this: { "type": "input", "target": "#q", "value": "rust" } and wait."##;
        let directive = expect_directive(text);
        assert_eq!(directive.kind, ActionKind::Input);
        assert_eq!(directive.value.as_deref(), Some("rust"));
    }

    #[test]
    fn malformed_fenced_fragment_falls_through_to_keyword_heuristic() {
        let text = "```json\n{\"type\": \"collect\", broken\n```\nLet me collect the page content.";
        let directive = expect_directive(text);
        assert_eq!(directive.kind, ActionKind::Collect);
    }

    #[test]
    fn collect_content_prose_synthesizes_collect() {
        let directive = expect_directive("I should collect the content of this page first.");
        assert_eq!(directive.kind, ActionKind::Collect);
    }

    #[test]
    fn noise_yields_unparsed() {
        assert!(matches!(
            parse("I'm not sure what to do next."),
            ParsedResponse::Unparsed
        ));
    }
}
