//! Dynamic parameter references between tool steps.
//!
//! A plan step may need a value that only exists once an earlier step has
//! run, e.g. "read the message found by the search". Planners express that
//! with a placeholder string; [`DynamicRef::parse_placeholder`] turns the
//! placeholder into an explicit reference and [`IdExtractor`] pulls the
//! value out of the earlier step's result text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum length of a bare identifier token accepted by the fallback scan.
pub const MIN_TOKEN_LEN: usize = 12;

static MESSAGE_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)message\s*id:\s*([A-Za-z0-9_\-]+)").ok());

static JSON_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""id"\s*:\s*"([^"\s]+)""#).ok());

static TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_\-]{12,}").ok());

static STEP_PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\$\{?step_?(\d+)(?:\.(message_id|id|token))?\}?$").ok()
});

static NAMED_PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:id_of_\w+|\w+_from_previous_step|<[^<>]+>|\{\{[^{}]+\}\})$").ok()
});

/// How to pull an identifier out of an earlier step's result text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdExtractor {
    /// Explicit `Message ID: X` markers.
    MessageId,
    /// JSON `"id": "X"` fields.
    JsonId,
    /// Long mixed alphanumeric tokens.
    Token,
    /// All of the above, most specific first.
    #[default]
    Any,
}

impl IdExtractor {
    /// Extracts the first identifier from `text`, if any.
    #[must_use]
    pub fn extract(self, text: &str) -> Option<String> {
        match self {
            Self::MessageId => capture_first(MESSAGE_ID.as_ref(), text),
            Self::JsonId => capture_first(JSON_ID.as_ref(), text),
            Self::Token => first_token(text),
            Self::Any => Self::MessageId
                .extract(text)
                .or_else(|| Self::JsonId.extract(text))
                .or_else(|| Self::Token.extract(text)),
        }
    }

    fn from_suffix(suffix: Option<&str>) -> Self {
        match suffix.map(str::to_lowercase).as_deref() {
            Some("message_id") => Self::MessageId,
            Some("id") => Self::JsonId,
            Some("token") => Self::Token,
            _ => Self::Any,
        }
    }
}

/// A parameter value to be resolved from an earlier step's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRef {
    /// Index of the step to read from. `None` scans every earlier step,
    /// most recent first.
    pub source: Option<usize>,
    /// How to pull the value out of the result text.
    pub extractor: IdExtractor,
    /// The placeholder as written by the planner. Passed through verbatim
    /// when the reference cannot be resolved.
    pub placeholder: String,
}

impl DynamicRef {
    /// Recognises the placeholder conventions:
    ///
    /// - `$stepN`, `${stepN}`, `$stepN.message_id|id|token` (bound to step `N`)
    /// - `id_of_*`, `*_from_previous_step`, `<...>`, `{{...}}` (unbound)
    #[must_use]
    pub fn parse_placeholder(value: &str) -> Option<Self> {
        let trimmed = value.trim();

        if let Some(caps) = STEP_PLACEHOLDER.as_ref().and_then(|re| re.captures(trimmed)) {
            let source = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok());
            return source.map(|idx| Self {
                source: Some(idx),
                extractor: IdExtractor::from_suffix(caps.get(2).map(|m| m.as_str())),
                placeholder: trimmed.to_string(),
            });
        }

        if NAMED_PLACEHOLDER
            .as_ref()
            .is_some_and(|re| re.is_match(trimmed))
        {
            return Some(Self {
                source: None,
                extractor: IdExtractor::Any,
                placeholder: trimmed.to_string(),
            });
        }

        None
    }
}

fn capture_first(re: Option<&Regex>, text: &str) -> Option<String> {
    re?.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn first_token(text: &str) -> Option<String> {
    TOKEN.as_ref()?.find_iter(text).find_map(|m| {
        let token = m.as_str();
        let has_digit = token.chars().any(|c| c.is_ascii_digit());
        let has_alpha = token.chars().any(|c| c.is_ascii_alphabetic());
        (token.len() >= MIN_TOKEN_LEN && has_digit && has_alpha).then(|| token.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_message_id_marker() {
        let text = "Found 1 email.\nSubject: Deadline\nMessage ID: abc123def456\n";
        assert_eq!(
            IdExtractor::Any.extract(text).as_deref(),
            Some("abc123def456")
        );
    }

    #[test]
    fn test_message_id_preferred_over_json() {
        let text = r#"{"id": "json-id-000111"} Message ID: marker999aaa"#;
        assert_eq!(
            IdExtractor::Any.extract(text).as_deref(),
            Some("marker999aaa")
        );
        assert_eq!(
            IdExtractor::JsonId.extract(text).as_deref(),
            Some("json-id-000111")
        );
    }

    #[test]
    fn test_token_fallback_requires_mixed_chars() {
        assert_eq!(
            IdExtractor::Any
                .extract("see thread 18c2f0a9b7d34e21 for details")
                .as_deref(),
            Some("18c2f0a9b7d34e21")
        );
        assert_eq!(IdExtractor::Any.extract("internationalization"), None);
        assert_eq!(IdExtractor::Any.extract("short a1b2"), None);
    }

    #[test_case("$step0", Some(0), IdExtractor::Any ; "bare step")]
    #[test_case("${step1}", Some(1), IdExtractor::Any ; "braced step")]
    #[test_case("$step2.message_id", Some(2), IdExtractor::MessageId ; "message id suffix")]
    #[test_case("$step_0.id", Some(0), IdExtractor::JsonId ; "json id suffix")]
    #[test_case("id_of_the_found_message", None, IdExtractor::Any ; "id_of convention")]
    #[test_case("message_id_from_previous_step", None, IdExtractor::Any ; "from previous step")]
    #[test_case("<message_id>", None, IdExtractor::Any ; "angle brackets")]
    #[test_case("{{ steps.0.id }}", None, IdExtractor::Any ; "mustache")]
    fn test_placeholder_parse(input: &str, source: Option<usize>, extractor: IdExtractor) {
        let parsed = DynamicRef::parse_placeholder(input);
        assert!(parsed.is_some(), "expected {input} to parse");
        let parsed = parsed.unwrap_or_else(|| unreachable!());
        assert_eq!(parsed.source, source);
        assert_eq!(parsed.extractor, extractor);
        assert_eq!(parsed.placeholder, input);
    }

    #[test_case("project deadline" ; "plain text")]
    #[test_case("$5 budget" ; "dollar amount")]
    #[test_case("identity" ; "word starting with id")]
    fn test_literals_are_not_placeholders(input: &str) {
        assert!(DynamicRef::parse_placeholder(input).is_none());
    }
}
