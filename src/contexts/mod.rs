mod agent_runner;
mod coordinator;
mod response_extractor;
pub mod script_batch;
mod source_bundle;
mod spec_review;
mod spec_store;

pub use agent_runner::{
    AgentModelRegistry, AgentRegistry, AgentRunner, AgentServices, AgentTemplate, PopulateError,
};
pub use coordinator::{GeneratedTestCases, PipelineCoordinator, SpecEditOutcome, SpecSeed};
pub use response_extractor::{
    extract, extract_code, extract_reasoning_steps, extract_table, CodeBlock, ExpectedFormat,
    ExtractedPayload, TEST_CASES_BEGIN, TEST_CASES_END,
};
pub use script_batch::{ScriptCombiner, ScriptGenerator};
pub use source_bundle::{collect_sources, SourceBundle};
pub use spec_review::{
    classify_feedback, is_model_approval, parse_suggestions, FeedbackIntent, SuggestionSection,
    APPROVAL_KEYWORDS, MODEL_APPROVAL_REPLY, SUPPRESS_KEYWORDS,
};
pub use spec_store::{
    ensure_dir, read_artifact, write_atomic, SpecStore, COMBINED_SCRIPT_FILE, REPORT_JSON_FILE,
    REPORT_MARKDOWN_FILE, SCRIPTS_FILE, SNAPSHOT_DIR, TEST_CASES_DRAFT_FILE, TEST_CASES_FILE,
};
