//! Heuristic scan of recent turns for reusable data context.
//!
//! No model call is made here. The summary tells the router whether a
//! follow-up can be answered from what the conversation already shows.

use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;

use super::message::{ChatMessage, Role};
use super::prompt::truncate_chars;
use crate::core::match_known_entities;

/// Returned by [`ContextAnalyzer::analyze`] when no earlier turn carries data.
pub const NO_RECENT_DATA_CONTEXT: &str = "No recent data context";

/// Longest excerpt of the latest data-bearing assistant turn.
const EXCERPT_CHARS: usize = 600;

static EMAIL_SIGNATURE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(e-?mails?|inbox|unread|subject:|from:|message id:|sender|gmail)").ok()
});

static DRIVE_SIGNATURE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(\.pdf\b|\.docx?\b|\.xlsx?\b|\.pptx?\b|\bgoogle drive\b|\bdrive\b|\bdocuments?\b|\bfiles?\b|\bspreadsheets?\b|\bfolders?\b)").ok()
});

static CALENDAR_SIGNATURE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(calendar|meetings?|events?|appointments?|scheduled|agenda)\b").ok()
});

static FOLLOW_UP: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:and |so |but )?(?:what|how) about\b|^(?:what|who|when|where) (?:are|were|is|was) (?:they|them|those|these|it)\b|^tell me more\b|^more (?:details|info)\b|^(?:which|what) (?:one|ones)\b").ok()
});

static ABOUT_SUBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:what|how) about\s+(.+?)[\s?.!]*$|tell me more about\s+(.+?)[\s?.!]*$").ok()
});

const PRONOUNS: [&str; 7] = ["it", "they", "them", "those", "these", "that", "this"];

fn matches(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(text))
}

/// Pure heuristic analyzer of conversation history.
#[derive(Debug, Clone)]
pub struct ContextAnalyzer {
    window: usize,
    known_entities: Vec<String>,
}

impl ContextAnalyzer {
    /// Looks at the last `window` turns and recognises `known_entities` as references.
    #[must_use]
    pub fn new(window: usize, known_entities: Vec<String>) -> Self {
        Self {
            window: window.max(1),
            known_entities,
        }
    }

    /// Summarises reusable context in `history` (current user turn included).
    ///
    /// The summary is a set of marker lines (`[email data]`, `[drive data]`,
    /// `[calendar data]`, `[follow-up] ...`, `[reference] X`) followed by an
    /// excerpt of the latest assistant turn that carried data. Returns
    /// [`NO_RECENT_DATA_CONTEXT`] when no recent assistant turn carries data.
    #[must_use]
    pub fn analyze(&self, history: &[ChatMessage]) -> String {
        let start = history.len().saturating_sub(self.window);
        let recent = &history[start..];

        let mut email = false;
        let mut drive = false;
        let mut calendar = false;
        let mut latest_data_turn: Option<&str> = None;

        for turn in recent.iter().filter(|t| t.role == Role::Assistant) {
            let has_email = matches(&EMAIL_SIGNATURE, &turn.content);
            let has_drive = matches(&DRIVE_SIGNATURE, &turn.content);
            let has_calendar = matches(&CALENDAR_SIGNATURE, &turn.content);
            email |= has_email;
            drive |= has_drive;
            calendar |= has_calendar;
            if has_email || has_drive || has_calendar {
                latest_data_turn = Some(&turn.content);
            }
        }

        let Some(excerpt) = latest_data_turn else {
            return NO_RECENT_DATA_CONTEXT.to_string();
        };

        let mut summary = String::new();
        if email {
            summary.push_str("[email data] recent turns show email content\n");
        }
        if drive {
            summary.push_str("[drive data] recent turns show files or documents\n");
        }
        if calendar {
            summary.push_str("[calendar data] recent turns show calendar events\n");
        }

        let latest_user = recent
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.trim());
        if let Some(user_turn) = latest_user {
            if matches(&FOLLOW_UP, user_turn) {
                let _ = writeln!(summary, "[follow-up] {user_turn}");
            }
            for reference in self.references(user_turn) {
                let _ = writeln!(summary, "[reference] {reference}");
            }
        }

        let _ = write!(
            summary,
            "Latest data excerpt:\n{}",
            truncate_chars(excerpt.trim(), EXCERPT_CHARS)
        );
        summary
    }

    /// Entities the user turn points at: the subject of "what about X" plus
    /// any known entity, deduplicated case-insensitively.
    fn references(&self, user_turn: &str) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();

        if let Some(caps) = ABOUT_SUBJECT.as_ref().and_then(|re| re.captures(user_turn))
            && let Some(subject) = caps.get(1).or_else(|| caps.get(2))
        {
            let subject = subject.as_str().trim().trim_matches(['"', '\'']);
            if !subject.is_empty() && !PRONOUNS.contains(&subject.to_lowercase().as_str()) {
                refs.push(subject.to_string());
            }
        }

        for entity in match_known_entities(user_turn, &self.known_entities) {
            if !refs.iter().any(|r| r.eq_ignore_ascii_case(&entity)) {
                refs.push(entity);
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{assistant_message, user_message};
    use crate::core::DEFAULT_KNOWN_ENTITIES;

    fn analyzer() -> ContextAnalyzer {
        ContextAnalyzer::new(
            6,
            DEFAULT_KNOWN_ENTITIES.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    #[test]
    fn test_email_follow_up_marks_email_and_reference() {
        let history = vec![
            user_message("check my recent emails"),
            assistant_message(
                "You have 2 recent emails:\n1. From: Iwata FC, Subject: Season tickets\n2. From: Bank, Subject: Statement",
            ),
            user_message("what about Jubilo?"),
        ];
        let summary = analyzer().analyze(&history);
        assert!(summary.contains("[email data]"));
        assert!(summary.contains("[follow-up] what about Jubilo?"));
        assert!(summary.contains("[reference] Jubilo"));
        assert!(!summary.contains("[drive data]"));
        assert!(summary.contains("Season tickets"));
    }

    #[test]
    fn test_no_data_returns_sentinel() {
        let history = vec![
            user_message("hello"),
            assistant_message("Hi! How can I help?"),
            user_message("what about them?"),
        ];
        assert_eq!(analyzer().analyze(&history), NO_RECENT_DATA_CONTEXT);
        assert_eq!(analyzer().analyze(&[]), NO_RECENT_DATA_CONTEXT);
    }

    #[test]
    fn test_pronoun_subject_is_not_a_reference() {
        let history = vec![
            assistant_message("Your meetings today: standup at 9:00, review at 14:00."),
            user_message("what about them?"),
        ];
        let summary = analyzer().analyze(&history);
        assert!(summary.contains("[calendar data]"));
        assert!(summary.contains("[follow-up]"));
        assert!(!summary.contains("[reference]"));
    }

    #[test]
    fn test_data_outside_window_is_ignored() {
        let mut history = vec![assistant_message("Found 3 files in your Drive: budget.xlsx")];
        for i in 0..6 {
            history.push(user_message(format!("chat {i}")));
        }
        assert_eq!(analyzer().analyze(&history), NO_RECENT_DATA_CONTEXT);
    }
}
