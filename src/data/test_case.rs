//! Generated test cases and the editable table that holds them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::contexts::{read_artifact, write_atomic};
use crate::data::RawTable;
use crate::error::{PipelineError, StoreError, ValidationError};

pub const COL_ID: &str = "Test_Case_ID";
pub const COL_DESCRIPTION: &str = "Test_Case_Description";
pub const COL_CATEGORY: &str = "Test_Case_Category";
pub const COL_STEPS: &str = "Test_Steps";

pub const REQUIRED_COLUMNS: [&str; 4] = [COL_ID, COL_DESCRIPTION, COL_CATEGORY, COL_STEPS];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestCaseCategory {
    HappyPath,
    NegativePath,
    EdgeCase,
}

impl TestCaseCategory {
    /// Accepts "Happy Path", "happy_path", "HappyPath", "edge-case" and so on.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "happypath" | "happy" | "positive" | "positivepath" => Some(Self::HappyPath),
            "negativepath" | "negative" => Some(Self::NegativePath),
            "edgecase" | "edge" | "edgecases" => Some(Self::EdgeCase),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HappyPath => "Happy Path",
            Self::NegativePath => "Negative Path",
            Self::EdgeCase => "Edge Case",
        }
    }
}

impl fmt::Display for TestCaseCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One test case. Extra columns are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseRow {
    pub id: String,
    pub description: String,
    pub category: TestCaseCategory,
    pub steps: String,
    pub extra: Vec<String>,
}

impl TestCaseRow {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        category: TestCaseCategory,
        steps: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            category,
            steps: steps.into(),
            extra: Vec::new(),
        }
    }
}

/// Validated set of test cases, editable until approved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseTable {
    extra_columns: Vec<String>,
    rows: Vec<TestCaseRow>,
    approved_path: Option<PathBuf>,
}

impl TestCaseTable {
    /// Validates an extracted table: required columns present, ids unique
    /// and non-empty, categories known, steps non-empty.
    pub fn from_extracted(raw: RawTable) -> Result<Self, ValidationError> {
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|col| raw.column_index(col).is_none())
            .map(|col| col.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingColumns {
                missing,
                expected: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
                actual: raw.headers.clone(),
            });
        }

        let idx = |name: &str| raw.column_index(name).unwrap_or_default();
        let (id_i, desc_i, cat_i, steps_i) = (
            idx(COL_ID),
            idx(COL_DESCRIPTION),
            idx(COL_CATEGORY),
            idx(COL_STEPS),
        );
        let extra_idx: Vec<usize> = (0..raw.headers.len())
            .filter(|i| ![id_i, desc_i, cat_i, steps_i].contains(i))
            .collect();
        let extra_columns = extra_idx.iter().map(|i| raw.headers[*i].clone()).collect();

        let mut rows = Vec::with_capacity(raw.rows.len());
        for (n, values) in raw.rows.iter().enumerate() {
            if values.len() != raw.headers.len() {
                return Err(ValidationError::RowWidth {
                    row: n + 1,
                    id: values.get(id_i).map(|v| v.trim().to_string()).unwrap_or_default(),
                    expected: raw.headers.len(),
                    found: values.len(),
                });
            }
            let id = values[id_i].trim().to_string();
            if id.is_empty() {
                return Err(ValidationError::EmptyId { row: n + 1 });
            }
            let category = TestCaseCategory::parse(&values[cat_i]).ok_or_else(|| {
                ValidationError::UnknownCategory {
                    id: id.clone(),
                    value: values[cat_i].clone(),
                }
            })?;
            rows.push(TestCaseRow {
                id,
                description: values[desc_i].clone(),
                category,
                steps: values[steps_i].clone(),
                extra: extra_idx.iter().map(|i| values[*i].clone()).collect(),
            });
        }

        Self::from_rows(rows, extra_columns)
    }

    /// Builds a table from already-typed rows, applying the same checks.
    /// Ids, descriptions and steps are trimmed the way a reload trims them.
    pub fn from_rows(
        rows: Vec<TestCaseRow>,
        extra_columns: Vec<String>,
    ) -> Result<Self, ValidationError> {
        let rows: Vec<TestCaseRow> = rows.into_iter().map(normalize_row).collect();
        validate_rows(&rows, extra_columns.len())?;
        Ok(Self {
            extra_columns,
            rows,
            approved_path: None,
        })
    }

    /// Reads and validates a table file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = read_artifact(path)?;
        let raw = RawTable::parse_csv(&text)?;
        Ok(Self::from_extracted(raw)?)
    }

    pub fn rows(&self) -> &[TestCaseRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    pub fn is_approved(&self) -> bool {
        self.approved_path.is_some()
    }

    /// Replaces the whole row set. Inserts, updates and deletes are all
    /// expressed as the new complete set.
    pub fn apply_edits(self, rows: Vec<TestCaseRow>) -> Result<Self, ValidationError> {
        if self.is_approved() {
            return Err(ValidationError::AlreadyApproved);
        }
        Self::from_rows(rows, self.extra_columns)
    }

    /// Replaces the draft with an edited table, taking its extra columns
    /// along with its rows.
    pub fn replace_with(self, edited: TestCaseTable) -> Result<Self, ValidationError> {
        if self.is_approved() {
            return Err(ValidationError::AlreadyApproved);
        }
        Self::from_rows(edited.rows, edited.extra_columns)
    }

    /// Persists the table as the approved copy. A second call returns the
    /// path written by the first without touching the file.
    pub fn approve(&mut self, path: &Path) -> Result<PathBuf, PipelineError> {
        if let Some(existing) = &self.approved_path {
            return Ok(existing.clone());
        }
        if self.rows.is_empty() {
            return Err(ValidationError::EmptyTable.into());
        }
        self.save(path)?;
        self.approved_path = Some(path.to_path_buf());
        Ok(path.to_path_buf())
    }

    /// Writes the table atomically, overwriting any previous copy.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let csv = self.to_raw().to_csv()?;
        write_atomic(path, csv.as_bytes())
    }

    pub fn to_raw(&self) -> RawTable {
        let mut headers: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        headers.extend(self.extra_columns.iter().cloned());
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut values = vec![
                    row.id.clone(),
                    row.description.clone(),
                    row.category.as_str().to_string(),
                    row.steps.clone(),
                ];
                values.extend(row.extra.iter().cloned());
                values
            })
            .collect();
        RawTable { headers, rows }
    }
}

fn normalize_row(row: TestCaseRow) -> TestCaseRow {
    TestCaseRow {
        id: row.id.trim().to_string(),
        description: row.description.trim().to_string(),
        steps: row.steps.trim().to_string(),
        ..row
    }
}

fn validate_rows(rows: &[TestCaseRow], extra_width: usize) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for (n, row) in rows.iter().enumerate() {
        if row.id.is_empty() {
            return Err(ValidationError::EmptyId { row: n + 1 });
        }
        if !seen.insert(row.id.as_str()) {
            return Err(ValidationError::DuplicateId { id: row.id.clone() });
        }
        if row.steps.is_empty() {
            return Err(ValidationError::EmptySteps { id: row.id.clone() });
        }
        if row.extra.len() != extra_width {
            return Err(ValidationError::RowWidth {
                row: n + 1,
                id: row.id.clone(),
                expected: REQUIRED_COLUMNS.len() + extra_width,
                found: REQUIRED_COLUMNS.len() + row.extra.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(csv: &str) -> RawTable {
        RawTable::parse_csv(csv).unwrap()
    }

    const VALID: &str = "Test_Case_ID,Test_Case_Description,Test_Case_Category,Test_Steps,Priority\n\
TC001,Create user,Happy Path,POST /users then GET /users/{id},High\n\
TC002,Blank fields,Negative Path,POST /users with empty body,Low\n";

    #[test]
    fn builds_table_and_preserves_extra_columns() {
        let table = TestCaseTable::from_extracted(raw(VALID)).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.extra_columns(), ["Priority".to_string()]);
        assert_eq!(table.rows()[0].category, TestCaseCategory::HappyPath);
        assert_eq!(table.rows()[1].extra, vec!["Low".to_string()]);

        let back = table.to_raw();
        assert_eq!(back.headers.last().unwrap(), "Priority");
        assert_eq!(back.rows[0][4], "High");
    }

    #[test]
    fn missing_id_column_is_named() {
        let csv = "Test_Case_Description,Test_Case_Category,Test_Steps\nx,Happy Path,y\n";
        let err = TestCaseTable::from_extracted(raw(csv)).unwrap_err();
        match err {
            ValidationError::MissingColumns { missing, actual, .. } => {
                assert_eq!(missing, vec!["Test_Case_ID".to_string()]);
                assert_eq!(actual.len(), 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err_display_names_column(csv));
    }

    fn err_display_names_column(csv: &str) -> bool {
        TestCaseTable::from_extracted(raw(csv))
            .unwrap_err()
            .to_string()
            .contains("Test_Case_ID")
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let csv = "Test_Case_ID,Test_Case_Description,Test_Case_Category,Test_Steps\n\
TC001,a,Happy Path,s1\nTC001,b,Edge Case,s2\n";
        assert_eq!(
            TestCaseTable::from_extracted(raw(csv)).unwrap_err(),
            ValidationError::DuplicateId { id: "TC001".into() }
        );
    }

    #[test]
    fn empty_steps_are_rejected() {
        let csv = "Test_Case_ID,Test_Case_Description,Test_Case_Category,Test_Steps\n\
TC001,a,Happy Path,\"  \"\n";
        assert_eq!(
            TestCaseTable::from_extracted(raw(csv)).unwrap_err(),
            ValidationError::EmptySteps { id: "TC001".into() }
        );
    }

    #[test]
    fn unknown_category_is_rejected() {
        let csv = "Test_Case_ID,Test_Case_Description,Test_Case_Category,Test_Steps\n\
TC001,a,Smoke,steps\n";
        assert!(matches!(
            TestCaseTable::from_extracted(raw(csv)),
            Err(ValidationError::UnknownCategory { .. })
        ));
    }

    #[test]
    fn category_parsing_is_lenient_about_spelling() {
        assert_eq!(TestCaseCategory::parse("happy_path"), Some(TestCaseCategory::HappyPath));
        assert_eq!(TestCaseCategory::parse(" NegativePath "), Some(TestCaseCategory::NegativePath));
        assert_eq!(TestCaseCategory::parse("edge-case"), Some(TestCaseCategory::EdgeCase));
        assert_eq!(TestCaseCategory::parse("smoke"), None);
    }

    #[test]
    fn edits_replace_the_full_row_set() {
        let table = TestCaseTable::from_extracted(raw(VALID)).unwrap();
        let mut row = TestCaseRow::new("TC003", "Boundary", TestCaseCategory::EdgeCase, "POST max length");
        row.extra = vec!["Medium".into()];
        let edited = table.apply_edits(vec![row]).unwrap();
        assert_eq!(edited.row_count(), 1);
        assert_eq!(edited.rows()[0].id, "TC003");
    }

    #[test]
    fn edits_with_wrong_extra_width_are_rejected() {
        let table = TestCaseTable::from_extracted(raw(VALID)).unwrap();
        let row = TestCaseRow::new("TC003", "Boundary", TestCaseCategory::EdgeCase, "steps");
        assert!(matches!(
            table.apply_edits(vec![row]),
            Err(ValidationError::RowWidth { .. })
        ));
    }

    #[test]
    fn ids_differing_only_by_whitespace_are_duplicates() {
        let table = TestCaseTable::from_extracted(raw(VALID)).unwrap();
        let mut first = TestCaseRow::new("TC001", "a", TestCaseCategory::HappyPath, "s1");
        first.extra = vec!["High".into()];
        let mut second = TestCaseRow::new("TC001 ", "b", TestCaseCategory::EdgeCase, "s2");
        second.extra = vec!["Low".into()];

        assert_eq!(
            table.apply_edits(vec![first, second]).unwrap_err(),
            ValidationError::DuplicateId { id: "TC001".into() }
        );
    }

    #[test]
    fn edited_rows_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated_test_cases.csv");
        let table = TestCaseTable::from_extracted(raw(VALID)).unwrap();
        let mut row = TestCaseRow::new(" TC009 ", " Padded ", TestCaseCategory::EdgeCase, " GET /users \n");
        row.extra = vec!["Medium".into()];

        let edited = table.apply_edits(vec![row]).unwrap();
        assert_eq!(edited.rows()[0].id, "TC009");
        edited.save(&path).unwrap();

        let reloaded = TestCaseTable::load(&path).unwrap();
        assert_eq!(reloaded.rows(), edited.rows());
    }

    #[test]
    fn replacement_keeps_its_own_extra_columns() {
        let draft = TestCaseTable::from_extracted(raw(VALID)).unwrap();
        let edited = TestCaseTable::from_extracted(raw(
            "Owner,Test_Case_ID,Test_Case_Description,Test_Case_Category,Test_Steps,Priority\n\
alice,TC001,a,Happy Path,s,High\n",
        ))
        .unwrap();

        let replaced = draft.replace_with(edited).unwrap();
        assert_eq!(
            replaced.extra_columns(),
            ["Owner".to_string(), "Priority".to_string()]
        );

        let back = replaced.to_raw();
        assert_eq!(back.headers[4..], ["Owner".to_string(), "Priority".to_string()]);
        assert_eq!(back.rows[0][4..], ["alice".to_string(), "High".to_string()]);
    }

    #[test]
    fn replacement_is_refused_after_approval() {
        let dir = tempfile::tempdir().unwrap();
        let mut draft = TestCaseTable::from_extracted(raw(VALID)).unwrap();
        draft.approve(&dir.path().join("t.csv")).unwrap();
        let edited = TestCaseTable::from_extracted(raw(VALID)).unwrap();
        assert_eq!(
            draft.replace_with(edited).unwrap_err(),
            ValidationError::AlreadyApproved
        );
    }

    #[test]
    fn ragged_raw_rows_are_a_width_error() {
        let ragged = RawTable {
            headers: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: vec![vec!["TC001".into(), "a".into()]],
        };
        assert_eq!(
            TestCaseTable::from_extracted(ragged).unwrap_err(),
            ValidationError::RowWidth {
                row: 1,
                id: "TC001".into(),
                expected: 4,
                found: 2,
            }
        );
    }

    #[test]
    fn approve_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my_test_cases.csv");
        let mut table = TestCaseTable::from_extracted(raw(VALID)).unwrap();

        let first = table.approve(&path).unwrap();
        let first_content = std::fs::read_to_string(&first).unwrap();
        let second = table.approve(&dir.path().join("elsewhere.csv")).unwrap();
        let second_content = std::fs::read_to_string(&second).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_content, second_content);
        assert!(!dir.path().join("elsewhere.csv").exists());

        let reloaded = TestCaseTable::load(&path).unwrap();
        assert_eq!(reloaded.rows(), table.rows());
    }

    #[test]
    fn approved_table_is_immutable() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = TestCaseTable::from_extracted(raw(VALID)).unwrap();
        table.approve(&dir.path().join("t.csv")).unwrap();
        let rows = table.rows().to_vec();
        assert_eq!(
            table.apply_edits(rows).unwrap_err(),
            ValidationError::AlreadyApproved
        );
    }

    #[test]
    fn empty_table_cannot_be_approved() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = TestCaseTable::from_rows(Vec::new(), Vec::new()).unwrap();
        assert!(matches!(
            table.approve(&dir.path().join("t.csv")),
            Err(PipelineError::Validation(ValidationError::EmptyTable))
        ));
    }
}
