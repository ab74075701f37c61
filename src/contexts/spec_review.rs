//! Classification of reviewer feedback and parsing of review suggestions.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Any of these anywhere in the feedback (case-insensitive) approves the spec.
pub const APPROVAL_KEYWORDS: [&str; 4] = ["approve", "approved", "looks good", "lgtm"];

/// Any of these hides the review suggestions.
pub const SUPPRESS_KEYWORDS: [&str; 3] = ["ignore", "skip suggestions", "no suggestions"];

/// Literal reply the spec-update agent gives when it reads the request as an
/// approval.
pub const MODEL_APPROVAL_REPLY: &str = "APPROVED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackIntent {
    Approve,
    Suppress,
    Edit(String),
}

/// Substring match, first hit wins, approval checked before suppression.
/// "disapprove" therefore counts as approval.
pub fn classify_feedback(text: &str) -> FeedbackIntent {
    let lowered = text.to_lowercase();
    if APPROVAL_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        FeedbackIntent::Approve
    } else if SUPPRESS_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        FeedbackIntent::Suppress
    } else {
        FeedbackIntent::Edit(text.trim().to_string())
    }
}

pub fn is_model_approval(reply: &str) -> bool {
    reply
        .trim()
        .trim_end_matches('.')
        .eq_ignore_ascii_case(MODEL_APPROVAL_REPLY)
}

/// One headed group of review observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionSection {
    pub title: String,
    pub points: Vec<String>,
}

/// Splits reviewer output into sections. A `**Heading**` line (optionally
/// bulleted) opens a section, `-` lines add points, and any other line is
/// appended to the previous point. Text before the first heading and
/// sections without points are dropped.
pub fn parse_suggestions(text: &str) -> Vec<SuggestionSection> {
    let mut sections: Vec<SuggestionSection> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(caps) = heading_re().captures(line) {
            sections.push(SuggestionSection {
                title: caps[1].trim().to_string(),
                points: Vec::new(),
            });
            continue;
        }

        let Some(section) = sections.last_mut() else {
            continue;
        };
        if let Some(point) = line.strip_prefix('-').or_else(|| line.strip_prefix('*')) {
            section.points.push(point.trim().to_string());
        } else if let Some(last) = section.points.last_mut() {
            last.push(' ');
            last.push_str(line);
        }
    }

    sections.retain(|s| !s.points.is_empty());
    sections
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\s*\*\*(.+?)\*\*\s*:?\s*$").expect("valid heading regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_wins_anywhere_in_text() {
        assert_eq!(classify_feedback("looks good, approved!"), FeedbackIntent::Approve);
        assert_eq!(classify_feedback("LGTM"), FeedbackIntent::Approve);
        assert_eq!(
            classify_feedback("ignore that, I approve"),
            FeedbackIntent::Approve
        );
    }

    #[test]
    fn substring_match_is_kept() {
        assert_eq!(classify_feedback("I disapprove"), FeedbackIntent::Approve);
    }

    #[test]
    fn suppress_and_edit() {
        assert_eq!(
            classify_feedback("Please skip suggestions"),
            FeedbackIntent::Suppress
        );
        assert_eq!(
            classify_feedback("  Add a 409 response to POST /users \n"),
            FeedbackIntent::Edit("Add a 409 response to POST /users".to_string())
        );
    }

    #[test]
    fn model_approval_reply() {
        assert!(is_model_approval("APPROVED"));
        assert!(is_model_approval(" approved.\n"));
        assert!(!is_model_approval("APPROVED with changes below"));
    }

    #[test]
    fn parses_sections_points_and_continuations() {
        let text = "Here is my review.\n\n\
**Clarification Requests**\n\
- Is the email unique\n  across tenants?\n\
- What does DELETE return?\n\n\
- **Missing Info **\n\
- No 401 examples\n\n\
**UI Edge Cases**\n";
        let sections = parse_suggestions(text);
        assert_eq!(
            sections,
            vec![
                SuggestionSection {
                    title: "Clarification Requests".into(),
                    points: vec![
                        "Is the email unique across tenants?".into(),
                        "What does DELETE return?".into()
                    ],
                },
                SuggestionSection {
                    title: "Missing Info".into(),
                    points: vec!["No 401 examples".into()],
                },
            ]
        );
    }
}
