use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::contexts::PopulateError;
use crate::data::{Action, CompletionError, ExecutionError, Stage};

/// Failures while carving structured data out of raw model output.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The begin or end marker is missing. The raw text is kept for diagnosis.
    #[error("expected markers '{begin}' and '{end}' not found in model output")]
    MarkersNotFound {
        begin: String,
        end: String,
        raw: String,
    },

    #[error("malformed table: record on line {line} has {found} column(s), header has {expected}")]
    MalformedTable {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("table could not be parsed: {0}")]
    UnreadableTable(String),

    #[error("table has no header row")]
    MissingHeader,

    #[error("model output contained no usable {0}")]
    EmptyPayload(&'static str),
}

/// Schema or content violations in a test case table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required column(s) {missing:?}: expected {expected:?}, found {actual:?}")]
    MissingColumns {
        missing: Vec<String>,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("duplicate Test_Case_ID '{id}'")]
    DuplicateId { id: String },

    #[error("row {row} has an empty Test_Case_ID")]
    EmptyId { row: usize },

    #[error("test case '{id}' has empty Test_Steps")]
    EmptySteps { id: String },

    #[error("test case '{id}' has unknown category '{value}' (expected Happy Path, Negative Path or Edge Case)")]
    UnknownCategory { id: String, value: String },

    #[error("row {row} ('{id}') has {found} value(s) but the table has {expected} column(s)")]
    RowWidth {
        row: usize,
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("test case table has no rows")]
    EmptyTable,

    #[error("test case table is already approved and can no longer be edited")]
    AlreadyApproved,
}

/// A pipeline action was invoked out of order.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot {action}: {reason}")]
pub struct PreconditionError {
    pub action: Action,
    pub required: Option<Stage>,
    pub reason: String,
}

impl PreconditionError {
    pub fn missing(action: Action, required: Stage) -> Self {
        Self {
            action,
            required: Some(required),
            reason: format!("stage '{}' has not completed", required.label()),
        }
    }

    pub fn new(action: Action, reason: impl Into<String>) -> Self {
        Self {
            action,
            required: None,
            reason: reason.into(),
        }
    }
}

/// Artifact persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error on {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Umbrella error for every coordinator action.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upstream call timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("test execution failed: {0}")]
    Execution(ExecutionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Prompt(#[from] PopulateError),

    #[error("run {0} was reset while the action was in flight; result discarded")]
    Cancelled(String),
}

impl PipelineError {
    /// Precondition errors are ordering bugs and never worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::UpstreamTimeout(_)
                | PipelineError::Upstream(_)
                | PipelineError::Extraction(_)
                | PipelineError::Execution(_)
        )
    }
}

impl From<CompletionError> for PipelineError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Timeout(after) => PipelineError::UpstreamTimeout(after),
            CompletionError::Upstream(msg) => PipelineError::Upstream(msg),
        }
    }
}

impl From<ExecutionError> for PipelineError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Timeout(after) => PipelineError::UpstreamTimeout(after),
            other => PipelineError::Execution(other),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
