//! Structured response extraction: fence stripping, JSON parsing, schema
//! validation, and the strict/best-effort failure policy.
//!
//! Models wrap JSON in markdown code fences, truncate output, or drift from
//! the requested shape. This module is where all of that tolerance lives, in
//! a fixed order:
//!
//! 1. strip a leading/trailing ``` fence (optionally tagged `json`);
//! 2. strict `serde_json` parse;
//! 3. coerce against the [`TargetSchema`].
//!
//! The failure policy is one configurable switch, not a per-call-site habit:
//! strict mode surfaces [`ScanError::Parse`] / [`ScanError::Validation`],
//! best-effort mode logs the offending reply at `warn` and returns the
//! schema's deterministic fallback record. Either way the caller always gets
//! a fully typed record or an explicit error — never a silent partial.

use crate::error::ScanError;
use crate::schema::{StructuredResult, TargetSchema};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*\n?(.*?)\n?```\s*$").unwrap());

/// Remove a markdown code fence wrapping the whole reply, if present.
///
/// Inner fences (e.g. JSON containing a markdown string) are untouched; only
/// an outermost ```/```json pair is stripped.
pub fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    match RE_OUTER_FENCE.captures(trimmed) {
        Some(caps) => caps.get(1).map(|m| m.as_str().trim()).unwrap_or(trimmed),
        None => trimmed,
    }
}

/// Convert a raw model reply into a validated [`StructuredResult`].
///
/// `strict = false` (best-effort): parse/validation failures are downgraded
/// to `Ok(schema.fallback())` after a `warn!` log. `strict = true`: the same
/// failures are returned as errors naming the problem.
pub fn extract(
    raw: &str,
    schema: &TargetSchema,
    strict: bool,
) -> Result<StructuredResult, ScanError> {
    match extract_strict(raw, schema) {
        Ok(result) => Ok(result),
        Err(e) if !strict && e.is_recoverable() => {
            warn!(
                schema = %schema.name,
                "falling back to sentinel record: {e}; reply was: {}",
                snippet(raw)
            );
            Ok(schema.fallback())
        }
        Err(e) => Err(e),
    }
}

fn extract_strict(raw: &str, schema: &TargetSchema) -> Result<StructuredResult, ScanError> {
    let stripped = strip_code_fence(raw);
    let value: serde_json::Value =
        serde_json::from_str(stripped).map_err(|e| ScanError::Parse {
            detail: e.to_string(),
            snippet: snippet(stripped),
        })?;
    schema.validate(&value)
}

/// First few characters of the reply, for error messages and logs.
fn snippet(s: &str) -> String {
    const MAX: usize = 80;
    let mut end = s.len().min(MAX);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{security_assessment, FALLBACK_CONTEXT};

    const PARK_REPLY: &str =
        r#"{"image_context":"a park","has_weapon":false,"has_people":true,"confidence":87}"#;

    #[test]
    fn strips_json_tagged_fence() {
        let fenced = format!("```json\n{PARK_REPLY}\n```");
        assert_eq!(strip_code_fence(&fenced), PARK_REPLY);
    }

    #[test]
    fn strips_untagged_fence() {
        let fenced = format!("```\n{PARK_REPLY}\n```");
        assert_eq!(strip_code_fence(&fenced), PARK_REPLY);
    }

    #[test]
    fn unfenced_passthrough() {
        assert_eq!(strip_code_fence(PARK_REPLY), PARK_REPLY);
        assert_eq!(strip_code_fence("  hello  "), "hello");
    }

    #[test]
    fn unterminated_fence_left_alone() {
        let input = "```json\n{\"a\": 1}";
        assert_eq!(strip_code_fence(input), input);
    }

    #[test]
    fn fenced_and_unfenced_extract_identically() {
        let schema = security_assessment();
        let plain = extract(PARK_REPLY, &schema, true).unwrap();
        let fenced = extract(&format!("```json\n{PARK_REPLY}\n```"), &schema, true).unwrap();
        assert_eq!(plain, fenced);
    }

    #[test]
    fn park_scenario_fields() {
        let result = extract(PARK_REPLY, &security_assessment(), true).unwrap();
        assert_eq!(result.get_bool("has_weapon"), Some(false));
        assert_eq!(result.get_bool("has_people"), Some(true));
        assert_eq!(result.get_i64("confidence"), Some(87));
        assert_eq!(result.get_str("image_context"), Some("a park"));
    }

    #[test]
    fn alley_scenario_with_fence() {
        let reply = "```json\n{\"has_weapon\":true,\"has_people\":false,\"image_context\":\"alley\",\"confidence\":95}\n```";
        let result = extract(reply, &security_assessment(), true).unwrap();
        assert_eq!(result.get_bool("has_weapon"), Some(true));
        assert_eq!(result.get_bool("has_people"), Some(false));
        assert_eq!(result.get_i64("confidence"), Some(95));
        assert_eq!(result.get_str("image_context"), Some("alley"));
    }

    #[test]
    fn truncated_json_best_effort_falls_back() {
        let schema = security_assessment();
        let result = extract(r#"{"image_context":"a par"#, &schema, false).unwrap();
        assert_eq!(result.get_bool("has_weapon"), Some(false));
        assert_eq!(result.get_bool("has_people"), Some(false));
        assert_eq!(result.get_i64("confidence"), Some(0));
        let ctx = result.get_str("image_context").unwrap();
        assert!(!ctx.is_empty());
        assert_eq!(ctx, FALLBACK_CONTEXT);
    }

    #[test]
    fn truncated_json_strict_is_parse_error() {
        let err = extract(r#"{"image_context":"a par"#, &security_assessment(), true).unwrap_err();
        assert!(matches!(err, ScanError::Parse { .. }));
    }

    #[test]
    fn schema_violation_best_effort_falls_back() {
        let reply = r#"{"image_context":"x","has_weapon":"yes","has_people":true,"confidence":5}"#;
        let result = extract(reply, &security_assessment(), false).unwrap();
        assert_eq!(result.get_str("image_context"), Some(FALLBACK_CONTEXT));
    }

    #[test]
    fn schema_violation_strict_names_field() {
        let reply = r#"{"image_context":"x","has_weapon":"yes","has_people":true,"confidence":5}"#;
        let err = extract(reply, &security_assessment(), true).unwrap_err();
        assert!(matches!(err, ScanError::Validation { ref field, .. } if field == "has_weapon"));
    }

    #[test]
    fn prose_reply_falls_back() {
        let reply = "I can see a park with several people walking their dogs.";
        let result = extract(reply, &security_assessment(), false).unwrap();
        assert_eq!(result.get_str("image_context"), Some(FALLBACK_CONTEXT));
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let s = "é".repeat(100);
        let cut = snippet(&s);
        assert!(cut.len() <= 80);
        assert!(s.starts_with(&cut));
    }
}
