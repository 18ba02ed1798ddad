//! Cleaning of untrusted telemetry fields before persistence or comparison.
//!
//! Telemetry values end up rendered in the dashboard, so markup is stripped
//! wholesale rather than escaped.

use once_cell::sync::Lazy;
use regex::Regex;

/// Upper bound on any free-text telemetry field after sanitization.
pub const MAX_FIELD_LEN: usize = 500;

static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

/// Sanitize a single free-text field.
///
/// Strips markup tags and any leftover tag delimiters (an unterminated `<foo`
/// leaves a bare delimiter behind), removes NUL bytes and carriage returns,
/// replaces newlines with a single space, truncates to [`MAX_FIELD_LEN`]
/// characters, and trims surrounding whitespace. Never fails, whatever the
/// input.
pub fn sanitize_field(value: &str) -> String {
    let stripped = TAG_PATTERN.replace_all(value, "");

    let mut cleaned = String::with_capacity(stripped.len());
    for ch in stripped.chars() {
        match ch {
            '\0' | '\r' | '<' | '>' => {}
            '\n' => cleaned.push(' '),
            _ => cleaned.push(ch),
        }
    }

    let truncated: String = cleaned.chars().take(MAX_FIELD_LEN).collect();
    truncated.trim().to_string()
}

/// [`sanitize_field`] with `None` passing through unchanged.
pub fn sanitize_optional(value: Option<&str>) -> Option<String> {
    value.map(sanitize_field)
}

#[cfg(test)]
mod tests {
    use super::{sanitize_field, sanitize_optional, MAX_FIELD_LEN};

    #[test]
    fn strips_markup_and_attributes() {
        assert_eq!(
            sanitize_field("<script src=\"x\">alert(1)</script>payments"),
            "alert(1)payments"
        );
        assert_eq!(sanitize_field("<b>orders</b>"), "orders");
    }

    #[test]
    fn output_never_contains_tag_delimiters() {
        for input in ["<script", "a < b > c", "<<nested>>", "plain"] {
            let out = sanitize_field(input);
            assert!(!out.contains('<'), "delimiter left in {:?}", out);
            assert!(!out.contains('>'), "delimiter left in {:?}", out);
        }
    }

    #[test]
    fn removes_control_characters_and_collapses_newlines() {
        assert_eq!(sanitize_field("api\0-\rgateway"), "api-gateway");
        assert_eq!(sanitize_field("line one\nline two"), "line one line two");
    }

    #[test]
    fn truncates_to_field_limit_and_trims() {
        let long = "x".repeat(2 * MAX_FIELD_LEN);
        assert_eq!(sanitize_field(&long).chars().count(), MAX_FIELD_LEN);
        assert_eq!(sanitize_field("  padded  "), "padded");
    }

    #[test]
    fn handles_unusual_character_sets() {
        // Multi-byte characters must not split at the truncation boundary.
        let emoji = "🦀".repeat(MAX_FIELD_LEN + 10);
        let out = sanitize_field(&emoji);
        assert_eq!(out.chars().count(), MAX_FIELD_LEN);
    }

    #[test]
    fn none_passes_through() {
        assert_eq!(sanitize_optional(None), None);
        assert_eq!(
            sanitize_optional(Some("<i>eu-west</i>")),
            Some("eu-west".to_string())
        );
    }
}
