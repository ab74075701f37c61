use chrono::{DateTime, Utc};
use std::path::Path;

use crate::contexts::{read_artifact, write_atomic};
use crate::data::RawTable;
use crate::error::{PipelineError, StoreError, ValidationError};

pub const COL_SCRIPT: &str = "K6_Script";

/// First line of every placeholder script. Lets a reloaded batch recover
/// `extraction_ok = false` without an extra column.
pub const PLACEHOLDER_MARKER: &str = "// qaflow: script generation failed";

/// Separator placed between scripts in the merge request.
pub const SCRIPT_SEPARATOR: &str = "\n\n---\n\n";

/// Generated load-test script for one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptArtifact {
    pub test_case_id: String,
    pub description: String,
    pub script_text: String,
    pub extraction_ok: bool,
}

impl ScriptArtifact {
    /// Diagnostic stand-in for a row whose generation failed. The error is
    /// kept as commented-out script text.
    pub fn placeholder(test_case_id: &str, description: &str, error: &str) -> Self {
        let mut text = format!("{}\n// test case: {}\n", PLACEHOLDER_MARKER, test_case_id);
        for line in error.lines() {
            text.push_str("// ");
            text.push_str(line);
            text.push('\n');
        }
        Self {
            test_case_id: test_case_id.to_string(),
            description: description.to_string(),
            script_text: text.trim_end().to_string(),
            extraction_ok: false,
        }
    }
}

/// One script per approved test case, in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptBatch {
    scripts: Vec<ScriptArtifact>,
}

impl ScriptBatch {
    pub fn new(scripts: Vec<ScriptArtifact>) -> Self {
        Self { scripts }
    }

    pub fn scripts(&self) -> &[ScriptArtifact] {
        &self.scripts
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.scripts.iter().filter(|s| !s.extraction_ok).count()
    }

    /// All script bodies joined with the merge separator.
    pub fn joined_text(&self) -> String {
        self.scripts
            .iter()
            .map(|s| s.script_text.as_str())
            .collect::<Vec<_>>()
            .join(SCRIPT_SEPARATOR)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let table = RawTable {
            headers: vec![
                super::test_case::COL_ID.to_string(),
                super::test_case::COL_DESCRIPTION.to_string(),
                COL_SCRIPT.to_string(),
            ],
            rows: self
                .scripts
                .iter()
                .map(|s| {
                    vec![
                        s.test_case_id.clone(),
                        s.description.clone(),
                        s.script_text.clone(),
                    ]
                })
                .collect(),
        };
        write_atomic(path, table.to_csv()?.as_bytes())
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = read_artifact(path)?;
        let raw = RawTable::parse_csv(&text)?;

        let required = [
            super::test_case::COL_ID,
            super::test_case::COL_DESCRIPTION,
            COL_SCRIPT,
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|c| raw.column_index(c).is_none())
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingColumns {
                missing,
                expected: required.iter().map(|c| c.to_string()).collect(),
                actual: raw.headers.clone(),
            }
            .into());
        }

        let (id_i, desc_i, script_i) = (
            raw.column_index(required[0]).unwrap_or_default(),
            raw.column_index(required[1]).unwrap_or_default(),
            raw.column_index(required[2]).unwrap_or_default(),
        );
        let scripts = raw
            .rows
            .iter()
            .map(|row| ScriptArtifact {
                test_case_id: row[id_i].clone(),
                description: row[desc_i].clone(),
                script_text: row[script_i].clone(),
                extraction_ok: !row[script_i].starts_with(PLACEHOLDER_MARKER),
            })
            .collect();
        Ok(Self { scripts })
    }
}

/// Single merged script handed to the test runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedScript {
    pub script_text: String,
    pub source_count: usize,
    pub created_at: DateTime<Utc>,
}
