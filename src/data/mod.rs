mod completion;
mod pipeline;
mod report;
mod script;
mod spec_artifact;
mod table;
mod test_case;
mod test_runner;

pub use completion::{CompletionError, CompletionService, ModelParams};
pub use pipeline::{Action, OutOfOrder, Phase, PipelineState, Stage, STAGE_COUNT};
pub use report::{CheckFailure, PerformanceReport, ResponseTimes};
pub use script::{
    CombinedScript, ScriptArtifact, ScriptBatch, COL_SCRIPT, PLACEHOLDER_MARKER, SCRIPT_SEPARATOR,
};
pub use spec_artifact::{SpecArtifact, SpecKind, SpecLineage};
pub use table::RawTable;
pub use test_case::{
    TestCaseCategory, TestCaseRow, TestCaseTable, COL_CATEGORY, COL_DESCRIPTION, COL_ID,
    COL_STEPS, REQUIRED_COLUMNS,
};
pub use test_runner::{ExecutionError, TestRunner};
