//! Pulls structured payloads out of free-form model output.
//!
//! Everything here is a pure transform; failures are returned so callers can
//! retry, surface them, or substitute a placeholder.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

use crate::data::RawTable;
use crate::error::ExtractionError;

pub const TEST_CASES_BEGIN: &str = "===BEGIN TEST CASES===";
pub const TEST_CASES_END: &str = "===END TEST CASES===";

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedFormat {
    /// Code optionally wrapped in a triple-backtick fence.
    FencedCode,
    /// CSV text between two literal marker lines.
    Delimited { begin: String, end: String },
}

impl ExpectedFormat {
    pub fn test_cases() -> Self {
        ExpectedFormat::Delimited {
            begin: TEST_CASES_BEGIN.to_string(),
            end: TEST_CASES_END.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub text: String,
    /// Whether the text was wrapped in a fence at all.
    pub fenced: bool,
    /// False when an opening fence had no closing fence and the remainder
    /// was taken verbatim.
    pub fence_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedPayload {
    Code(CodeBlock),
    Table(RawTable),
}

pub fn extract(raw: &str, format: &ExpectedFormat) -> Result<ExtractedPayload, ExtractionError> {
    match format {
        ExpectedFormat::FencedCode => Ok(ExtractedPayload::Code(extract_code(raw))),
        ExpectedFormat::Delimited { begin, end } => {
            extract_table(raw, begin, end).map(ExtractedPayload::Table)
        }
    }
}

/// Strips a leading fence (and its language tag) and the matching closing
/// fence. Output that does not start with a fence but embeds one yields the
/// first embedded block; otherwise the trimmed text is returned as is.
pub fn extract_code(raw: &str) -> CodeBlock {
    let trimmed = raw.trim();

    if let Some(rest) = trimmed.strip_prefix(FENCE) {
        let rest = rest.trim_start_matches('`');
        let body = match rest.split_once('\n') {
            Some((_language, body)) => body,
            // Single-line reply: the tag runs straight into the code, or is all there is.
            None => inline_tag_re().find(rest).map_or(rest, |tag| &rest[tag.end()..]),
        };

        let (content, closed) = if let Some(pos) = body.find("\n```") {
            (&body[..pos], true)
        } else if let Some(stripped) = body.trim_end().strip_suffix(FENCE) {
            (stripped.trim_end_matches('`'), true)
        } else {
            (body, false)
        };

        if !closed {
            warn!("code fence was not closed; using the remainder of the response");
        }

        return CodeBlock {
            text: content.trim().to_string(),
            fenced: true,
            fence_closed: closed,
        };
    }

    if let Some(captures) = embedded_block_re().captures(trimmed) {
        if let Some(code) = captures.get(1) {
            return CodeBlock {
                text: code.as_str().trim().to_string(),
                fenced: true,
                fence_closed: true,
            };
        }
    }

    CodeBlock {
        text: trimmed.to_string(),
        fenced: false,
        fence_closed: true,
    }
}

/// Parses the CSV found strictly between `begin` and the first `end` that
/// follows it.
pub fn extract_table(raw: &str, begin: &str, end: &str) -> Result<RawTable, ExtractionError> {
    let not_found = || ExtractionError::MarkersNotFound {
        begin: begin.to_string(),
        end: end.to_string(),
        raw: raw.to_string(),
    };

    let start = raw.find(begin).ok_or_else(not_found)? + begin.len();
    let stop = raw[start..].find(end).ok_or_else(not_found)? + start;

    let block = raw[start..stop].trim();
    // Some models fence the CSV inside the markers.
    if block.starts_with(FENCE) {
        return RawTable::parse_csv(&extract_code(block).text);
    }
    RawTable::parse_csv(block)
}

/// Collects `[Step N] ...` reasoning lines that precede generated test cases.
pub fn extract_reasoning_steps(raw: &str) -> Vec<String> {
    step_re()
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn embedded_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[^\n`]*\n(.*?)```").expect("valid fence regex"))
}

fn inline_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_+-]+(?:\s+|$)").expect("valid tag regex"))
}

fn step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\[Step\s*\d+\]\s*(.*)$").expect("valid step regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fence_and_language_tag() {
        let block = extract_code("```javascript\nimport http from 'k6/http';\n```");
        assert_eq!(block.text, "import http from 'k6/http';");
        assert!(block.fenced && block.fence_closed);
    }

    #[test]
    fn keeps_remainder_when_fence_is_not_closed() {
        let block = extract_code("```js\nimport { check } from 'k6';\nexport default function () {}\n");
        assert_eq!(
            block.text,
            "import { check } from 'k6';\nexport default function () {}"
        );
        assert!(!block.fence_closed);
    }

    #[test]
    fn truncated_reply_with_only_a_tag_is_empty() {
        let block = extract_code("```javascript");
        assert_eq!(block.text, "");
        assert!(block.fenced);
        assert!(!block.fence_closed);
    }

    #[test]
    fn single_line_block_drops_its_tag() {
        let block = extract_code("```js export default function () {}```");
        assert_eq!(block.text, "export default function () {}");
        assert!(block.fence_closed);
    }

    #[test]
    fn drops_prose_after_closing_fence() {
        let block = extract_code("```\nsleep(1);\n```\n\nThis script waits one second.");
        assert_eq!(block.text, "sleep(1);");
    }

    #[test]
    fn finds_block_embedded_in_prose() {
        let raw = "Here is the merged script:\n\n```javascript\nexport const options = {};\n```\nDone.";
        assert_eq!(extract_code(raw).text, "export const options = {};");
    }

    #[test]
    fn unfenced_text_is_returned_trimmed() {
        let block = extract_code("\n  const x = `${BASE_URL}/users`;\n");
        assert_eq!(block.text, "const x = `${BASE_URL}/users`;");
        assert!(!block.fenced);
    }

    #[test]
    fn extracts_table_between_markers() {
        let raw = "[Step 1] Dissecting the document specification\n\
===BEGIN TEST CASES===\n\
\"Test_Case_ID\",\"Test_Case_Description\",\"Test_Case_Category\",\"Test_Steps\"\n\
\"TC001\",\"Create user\",\"Happy Path\",\"POST /users\"\n\
\"TC002\",\"Empty body\",\"Negative Path\",\"POST /users with {}\"\n\
===END TEST CASES===\ntrailing notes";
        let table = extract_table(raw, TEST_CASES_BEGIN, TEST_CASES_END).unwrap();
        assert_eq!(
            table.headers,
            vec!["Test_Case_ID", "Test_Case_Description", "Test_Case_Category", "Test_Steps"]
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn row_count_matches_data_lines() {
        for n in 0..6 {
            let mut csv = String::from("a,b\n");
            for i in 0..n {
                csv.push_str(&format!("{i},{}\n", i * 2));
            }
            let raw = format!("{TEST_CASES_BEGIN}\n{csv}{TEST_CASES_END}");
            let table = extract_table(&raw, TEST_CASES_BEGIN, TEST_CASES_END).unwrap();
            assert_eq!(table.len(), n);
            assert_eq!(table.headers, vec!["a", "b"]);
        }
    }

    #[test]
    fn missing_marker_preserves_raw_text() {
        for raw in [
            "a,b\n1,2\n===END TEST CASES===",
            "===BEGIN TEST CASES===\na,b\n1,2\n",
            "===END TEST CASES===\n===BEGIN TEST CASES===\na,b",
        ] {
            match extract(raw, &ExpectedFormat::test_cases()) {
                Err(ExtractionError::MarkersNotFound { raw: kept, .. }) => assert_eq!(kept, raw),
                other => panic!("expected MarkersNotFound, got {other:?}"),
            }
        }
    }

    #[test]
    fn fenced_csv_inside_markers_is_unwrapped() {
        let raw = "===BEGIN TEST CASES===\n```csv\nx,y\n1,2\n```\n===END TEST CASES===";
        let table = extract_table(raw, TEST_CASES_BEGIN, TEST_CASES_END).unwrap();
        assert_eq!(table.headers, vec!["x", "y"]);
        assert_eq!(table.rows, vec![vec!["1", "2"]]);
    }

    #[test]
    fn inconsistent_columns_are_malformed() {
        let raw = "===BEGIN TEST CASES===\nx,y\n1,2,3\n===END TEST CASES===";
        assert!(matches!(
            extract_table(raw, TEST_CASES_BEGIN, TEST_CASES_END),
            Err(ExtractionError::MalformedTable { expected: 2, found: 3, .. })
        ));
    }

    #[test]
    fn collects_reasoning_steps() {
        let raw = "[Step 1] Dissecting the document specification\n  [Step 2]   Identifying form fields\nnot a step";
        assert_eq!(
            extract_reasoning_steps(raw),
            vec!["Dissecting the document specification", "Identifying form fields"]
        );
    }
}
