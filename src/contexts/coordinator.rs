//! The pipeline state machine.
//!
//! Every user command is one method. Each method checks its precondition,
//! talks to the boundaries, and only after the result is validated and
//! written does it flip a stage flag and commit the checkpoint. A reset
//! committed by another process in the meantime makes the result stale and
//! it is dropped with `PipelineError::Cancelled`.

use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::checkpoint::{FailureRecord, Session};
use crate::config::Settings;
use crate::contexts::script_batch::{self, AgentScriptCombiner, AgentScriptGenerator};
use crate::contexts::{
    classify_feedback, collect_sources, extract, extract_code, extract_reasoning_steps,
    is_model_approval, parse_suggestions, read_artifact, write_atomic, AgentServices,
    ExpectedFormat, ExtractedPayload, FeedbackIntent, SpecStore, SuggestionSection,
    COMBINED_SCRIPT_FILE, REPORT_JSON_FILE, REPORT_MARKDOWN_FILE, SCRIPTS_FILE,
    TEST_CASES_DRAFT_FILE, TEST_CASES_FILE,
};
use crate::data::{
    Action, CombinedScript, PerformanceReport, Phase, PipelineState, ScriptBatch, SpecKind,
    SpecLineage, Stage, TestCaseTable, TestRunner,
};
use crate::error::{ExtractionError, PipelineError, PipelineResult, PreconditionError, StoreError};
use crate::registries::{
    HUMAN_READABLE_SPEC_AGENT, OPENAPI_SPEC_AGENT, SCRIPT_COMBINE_AGENT, SCRIPT_GENERATION_AGENT,
    SPEC_SUGGESTIONS_AGENT, SPEC_UPDATE_AGENT, TEST_CASE_AGENT, UNIFY_SPEC_AGENT,
};

/// Seed for the two spec-extraction requests.
#[derive(Debug, Clone, Default)]
pub struct SpecSeed {
    pub source_dir: Option<PathBuf>,
    pub summary: Option<String>,
    /// Keep existing stage-1 documents and only re-run the merge.
    pub reuse_extracted: bool,
}

/// What an edit-spec call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecEditOutcome {
    Approved(PathBuf),
    SuggestionsHidden,
    Revised { revision: usize },
    /// Blank input; nothing happened.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct GeneratedTestCases {
    pub table: TestCaseTable,
    pub reasoning: Vec<String>,
    pub path: PathBuf,
}

#[derive(Serialize)]
struct SeedInput<'a> {
    api_source: &'a str,
    api_summary: Option<&'a str>,
}

#[derive(Serialize)]
struct UnifyInput<'a> {
    human_readable_spec: &'a str,
    openapi_spec: &'a str,
}

#[derive(Serialize)]
struct SpecInput<'a> {
    api_spec: &'a str,
}

#[derive(Serialize)]
struct SpecUpdateInput<'a> {
    current_spec: &'a str,
    user_input: &'a str,
}

#[derive(Serialize)]
struct TestCaseInput<'a> {
    api_spec: &'a str,
    current_date: String,
}

pub struct PipelineCoordinator {
    store: SpecStore,
    services: AgentServices,
    runner: Arc<dyn TestRunner>,
    settings: Settings,
    session: Session,
    in_flight: Option<Action>,
}

impl PipelineCoordinator {
    /// Opens the run recorded under `store`, or derives one from its
    /// artifacts.
    pub fn open(
        store: SpecStore,
        services: AgentServices,
        runner: Arc<dyn TestRunner>,
        settings: Settings,
    ) -> PipelineResult<Self> {
        let session = Session::open(&store)?;
        Ok(Self {
            store,
            services,
            runner,
            settings,
            session,
            in_flight: None,
        })
    }

    pub fn store(&self) -> &SpecStore {
        &self.store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> &PipelineState {
        &self.session.state
    }

    pub fn run_id(&self) -> Uuid {
        self.session.run_id
    }

    pub fn phase(&self) -> Phase {
        if let Some(action) = self.in_flight {
            return action.running_phase();
        }
        match &self.session.last_failure {
            Some(failure) => Phase::Failed {
                state: Box::new(failure.action.running_phase()),
                cause: failure.cause.clone(),
            },
            None => Phase::settled(&self.session.state),
        }
    }

    /// Current unified spec text, if one exists in this run.
    pub fn current_spec(&self) -> Option<&str> {
        self.session.spec.current().map(|rev| rev.content.as_str())
    }

    pub fn spec_lineage(&self) -> &SpecLineage {
        &self.session.spec
    }

    /// Suggestions still visible to the reviewer.
    pub fn visible_suggestions(&self) -> &[SuggestionSection] {
        if self.session.show_suggestions {
            &self.session.suggestions
        } else {
            &[]
        }
    }

    /// Starts a new run. Artifacts on disk stay where they are.
    pub fn reset(&mut self) -> PipelineResult<Uuid> {
        let previous = self.session.run_id;
        self.session = Session::new();
        self.in_flight = None;
        self.session.save(self.store.root())?;
        info!(previous = %previous, run_id = %self.session.run_id, "started new run");
        Ok(self.session.run_id)
    }

    /// Checks whether `action` may run now without running it.
    pub fn check(&self, action: Action) -> PipelineResult<()> {
        if let Some(failure) = &self.session.last_failure {
            if failure.action != action {
                return Err(PreconditionError::new(
                    action,
                    format!(
                        "the run failed during '{}' ({}); retry it or reset",
                        failure.action, failure.cause
                    ),
                )
                .into());
            }
        }

        if let Some(required) = action.requires() {
            if !self.session.state.is_complete(required) {
                return Err(PreconditionError::missing(action, required).into());
            }
        }

        let state = &self.session.state;
        let blocked_by = match action {
            Action::GenerateSpec | Action::SuggestImprovements | Action::EditSpec => {
                state.is_complete(Stage::SpecApproved).then_some("the spec is already approved")
            }
            Action::GenerateTestCases | Action::EditTestCases => state
                .is_complete(Stage::TestCasesApproved)
                .then_some("the test cases are already approved"),
            Action::GenerateScripts => state
                .is_complete(Stage::ScriptsCombined)
                .then_some("the scripts are already combined"),
            _ => None,
        };
        match blocked_by {
            Some(reason) => Err(PreconditionError::new(action, format!("{}; reset to start a new run", reason)).into()),
            None => Ok(()),
        }
    }

    /// Generate spec: two independent extraction requests, then the merge.
    pub async fn generate_spec(&mut self, seed: SpecSeed) -> PipelineResult<PathBuf> {
        self.begin(Action::GenerateSpec)?;
        let result = self.run_generate_spec(seed).await;
        self.finish(Action::GenerateSpec, result)
    }

    async fn run_generate_spec(&mut self, seed: SpecSeed) -> PipelineResult<PathBuf> {
        let run_id = self.session.run_id;
        let reuse = seed.reuse_extracted
            && self.store.exists(SpecKind::HumanReadable)
            && self.store.exists(SpecKind::OpenApiYaml);

        let (human_readable, openapi) = if reuse {
            info!("reusing extracted stage-1 documents");
            (
                self.store.load(SpecKind::HumanReadable)?,
                self.store.load(SpecKind::OpenApiYaml)?,
            )
        } else {
            let source = match &seed.source_dir {
                Some(dir) => {
                    let bundle = collect_sources(dir, self.settings.max_source_bytes)?;
                    info!(files = bundle.files.len(), truncated = bundle.truncated, "collected API sources");
                    bundle.text
                }
                None => String::new(),
            };
            let summary = seed.summary.as_deref().map(str::trim).filter(|s| !s.is_empty());
            if source.trim().is_empty() && summary.is_none() {
                return Err(PreconditionError::new(
                    Action::GenerateSpec,
                    "no API source files or summary were provided",
                )
                .into());
            }

            let input = SeedInput {
                api_source: &source,
                api_summary: summary,
            };
            let (human_readable, openapi) = tokio::join!(
                self.services.run(HUMAN_READABLE_SPEC_AGENT, &input),
                self.services.run(OPENAPI_SPEC_AGENT, &input),
            );
            let human_readable = clean_document(&human_readable?, "human-readable spec")?;
            let openapi = clean_document(&openapi?, "OpenAPI spec")?;

            self.ensure_current(run_id)?;
            self.store.save(SpecKind::HumanReadable, &human_readable)?;
            self.store.save(SpecKind::OpenApiYaml, &openapi)?;
            (human_readable, openapi)
        };

        let unified = self
            .services
            .run(
                UNIFY_SPEC_AGENT,
                UnifyInput {
                    human_readable_spec: &human_readable,
                    openapi_spec: &openapi,
                },
            )
            .await?;
        let unified = clean_document(&unified, "unified spec")?;

        self.ensure_current(run_id)?;
        let path = self.store.save(SpecKind::Unified, &unified)?;
        self.session.spec = SpecLineage::start(unified);
        self.session.suggestions.clear();
        self.session.show_suggestions = false;
        self.advance(Action::GenerateSpec, Stage::SpecGenerated)?;
        self.session.track(&path)?;
        self.commit(run_id)?;
        info!(path = %path.display(), "unified spec generated");
        Ok(path)
    }

    /// Asks the reviewer agent for observations on the current spec.
    pub async fn suggest_improvements(&mut self) -> PipelineResult<Vec<SuggestionSection>> {
        self.begin(Action::SuggestImprovements)?;
        let result = self.run_suggest_improvements().await;
        self.finish(Action::SuggestImprovements, result)
    }

    async fn run_suggest_improvements(&mut self) -> PipelineResult<Vec<SuggestionSection>> {
        let run_id = self.session.run_id;
        let spec = self.spec_text()?;
        let raw = self
            .services
            .run(SPEC_SUGGESTIONS_AGENT, SpecInput { api_spec: &spec })
            .await?;
        let sections = parse_suggestions(&raw);
        if sections.is_empty() {
            warn!("reviewer output contained no suggestion sections");
        }

        self.ensure_current(run_id)?;
        self.session.show_suggestions = !sections.is_empty();
        self.session.suggestions = sections.clone();
        self.commit(run_id)?;
        Ok(sections)
    }

    /// One turn of the review loop: approve, hide suggestions, or revise.
    pub async fn edit_spec(&mut self, feedback: &str) -> PipelineResult<SpecEditOutcome> {
        self.begin(Action::EditSpec)?;
        let result = self.run_edit_spec(feedback).await;
        self.finish(Action::EditSpec, result)
    }

    async fn run_edit_spec(&mut self, feedback: &str) -> PipelineResult<SpecEditOutcome> {
        if feedback.trim().is_empty() {
            return Ok(SpecEditOutcome::Ignored);
        }
        let run_id = self.session.run_id;

        let request = match classify_feedback(feedback) {
            FeedbackIntent::Approve => {
                return self.approve_current_spec(run_id).map(SpecEditOutcome::Approved);
            }
            FeedbackIntent::Suppress => {
                self.session.show_suggestions = false;
                self.commit(run_id)?;
                return Ok(SpecEditOutcome::SuggestionsHidden);
            }
            FeedbackIntent::Edit(request) => request,
        };

        let current = self.spec_text()?;
        let reply = self
            .services
            .run(
                SPEC_UPDATE_AGENT,
                SpecUpdateInput {
                    current_spec: &current,
                    user_input: &request,
                },
            )
            .await?;

        if is_model_approval(&reply) {
            info!("spec update agent read the request as an approval");
            return self.approve_current_spec(run_id).map(SpecEditOutcome::Approved);
        }

        let revised = clean_document(&reply, "revised spec")?;
        self.ensure_current(run_id)?;
        if self.session.spec.is_empty() {
            self.session.spec = SpecLineage::start(current);
        }
        if self.session.spec.revise(revised.clone()).is_none() {
            return Err(PreconditionError::new(Action::EditSpec, "the spec is already approved").into());
        }
        let path = self.store.save(SpecKind::Unified, &revised)?;
        self.session.track(&path)?;
        self.commit(run_id)?;

        let revision = self.session.spec.revisions().len();
        info!(revision, "spec revised");
        Ok(SpecEditOutcome::Revised { revision })
    }

    /// Approves the current spec and writes a timestamped snapshot.
    /// Approving twice returns the first snapshot.
    pub fn approve_spec(&mut self) -> PipelineResult<PathBuf> {
        self.begin(Action::ApproveSpec)?;
        let run_id = self.session.run_id;
        let result = self.approve_current_spec(run_id);
        self.finish(Action::ApproveSpec, result)
    }

    fn approve_current_spec(&mut self, run_id: Uuid) -> PipelineResult<PathBuf> {
        if self.session.state.is_complete(Stage::SpecApproved) {
            if let Some(existing) = &self.session.approved_snapshot {
                return Ok(existing.clone());
            }
        }

        let content = self.spec_text()?;
        self.ensure_current(run_id)?;
        let snapshot = self.store.snapshot(SpecKind::Unified, &content)?;
        if self.session.spec.is_empty() {
            self.session.spec = SpecLineage::start(content);
        }
        self.session.spec.approve();
        self.session.approved_snapshot = Some(snapshot.clone());
        self.session.show_suggestions = false;
        self.advance(Action::ApproveSpec, Stage::SpecApproved)?;
        self.session.track(&snapshot)?;
        self.commit(run_id)?;
        info!(snapshot = %snapshot.display(), "spec approved");
        Ok(snapshot)
    }

    /// Generate test cases from the approved spec into the draft table.
    pub async fn generate_test_cases(&mut self) -> PipelineResult<GeneratedTestCases> {
        self.begin(Action::GenerateTestCases)?;
        let result = self.run_generate_test_cases().await;
        self.finish(Action::GenerateTestCases, result)
    }

    async fn run_generate_test_cases(&mut self) -> PipelineResult<GeneratedTestCases> {
        let run_id = self.session.run_id;
        let spec = self.spec_text()?;
        let raw = self
            .services
            .run(
                TEST_CASE_AGENT,
                TestCaseInput {
                    api_spec: &spec,
                    current_date: Local::now().format("%d-%b-%Y").to_string(),
                },
            )
            .await?;

        let reasoning = extract_reasoning_steps(&raw);
        for step in &reasoning {
            info!(step = %step, "test case reasoning");
        }
        let table = match extract(&raw, &ExpectedFormat::test_cases())? {
            ExtractedPayload::Table(raw_table) => TestCaseTable::from_extracted(raw_table)?,
            ExtractedPayload::Code(_) => return Err(ExtractionError::EmptyPayload("test case table").into()),
        };

        self.ensure_current(run_id)?;
        let path = self.store.artifact_path(TEST_CASES_DRAFT_FILE);
        table.save(&path)?;
        self.advance(Action::GenerateTestCases, Stage::TestCasesGenerated)?;
        self.session.track(&path)?;
        self.commit(run_id)?;
        info!(rows = table.row_count(), path = %path.display(), "test cases generated");
        Ok(GeneratedTestCases {
            table,
            reasoning,
            path,
        })
    }

    /// Current draft table.
    pub fn draft_test_cases(&self) -> PipelineResult<TestCaseTable> {
        TestCaseTable::load(&self.store.artifact_path(TEST_CASES_DRAFT_FILE))
    }

    /// Replaces the whole draft with `edited`, extra columns included.
    pub fn edit_test_cases(&mut self, edited: TestCaseTable) -> PipelineResult<TestCaseTable> {
        self.begin(Action::EditTestCases)?;
        let result = self.run_edit_test_cases(edited);
        self.finish(Action::EditTestCases, result)
    }

    fn run_edit_test_cases(&mut self, edited: TestCaseTable) -> PipelineResult<TestCaseTable> {
        let run_id = self.session.run_id;
        let edited = self.draft_test_cases()?.replace_with(edited)?;

        self.ensure_current(run_id)?;
        let path = self.store.artifact_path(TEST_CASES_DRAFT_FILE);
        edited.save(&path)?;
        self.session.track(&path)?;
        self.commit(run_id)?;
        info!(rows = edited.row_count(), "test cases edited");
        Ok(edited)
    }

    /// Approves the draft into `my_test_cases.csv`. Approving twice returns
    /// the same path without rewriting it.
    pub fn approve_test_cases(&mut self) -> PipelineResult<PathBuf> {
        self.begin(Action::ApproveTestCases)?;
        let result = self.run_approve_test_cases();
        self.finish(Action::ApproveTestCases, result)
    }

    fn run_approve_test_cases(&mut self) -> PipelineResult<PathBuf> {
        let path = self.store.artifact_path(TEST_CASES_FILE);
        if self.session.state.is_complete(Stage::TestCasesApproved) {
            return Ok(path);
        }

        let run_id = self.session.run_id;
        let mut table = self.draft_test_cases()?;
        self.ensure_current(run_id)?;
        let path = table.approve(&path)?;
        self.advance(Action::ApproveTestCases, Stage::TestCasesApproved)?;
        self.session.track(&path)?;
        self.commit(run_id)?;
        info!(rows = table.row_count(), path = %path.display(), "test cases approved");
        Ok(path)
    }

    /// One script per approved test case.
    pub async fn generate_scripts(&mut self) -> PipelineResult<ScriptBatch> {
        self.begin(Action::GenerateScripts)?;
        let result = self.run_generate_scripts().await;
        self.finish(Action::GenerateScripts, result)
    }

    async fn run_generate_scripts(&mut self) -> PipelineResult<ScriptBatch> {
        let run_id = self.session.run_id;
        let table = TestCaseTable::load(&self.store.artifact_path(TEST_CASES_FILE))?;
        let concurrency = if self.services.can_run_parallel(SCRIPT_GENERATION_AGENT) {
            self.settings.script_concurrency
        } else {
            1
        };
        info!(rows = table.row_count(), concurrency, "generating scripts");

        let generator = Arc::new(AgentScriptGenerator::new(
            SCRIPT_GENERATION_AGENT,
            self.services.clone(),
        ));
        let batch = script_batch::generate(&table, generator, concurrency).await;

        self.ensure_current(run_id)?;
        let path = self.store.artifact_path(SCRIPTS_FILE);
        batch.save(&path)?;
        self.advance(Action::GenerateScripts, Stage::ScriptsGenerated)?;
        self.session.track(&path)?;
        self.commit(run_id)?;
        Ok(batch)
    }

    /// Scripts saved by the last generation.
    pub fn generated_scripts(&self) -> PipelineResult<ScriptBatch> {
        ScriptBatch::load(&self.store.artifact_path(SCRIPTS_FILE))
    }

    /// Merges the batch into one script. Once combined, returns the stored
    /// script without another request.
    pub async fn combine_scripts(&mut self) -> PipelineResult<CombinedScript> {
        self.begin(Action::CombineScripts)?;
        let result = self.run_combine_scripts().await;
        self.finish(Action::CombineScripts, result)
    }

    async fn run_combine_scripts(&mut self) -> PipelineResult<CombinedScript> {
        let path = self.store.artifact_path(COMBINED_SCRIPT_FILE);
        let batch = self.generated_scripts()?;

        if self.session.state.is_complete(Stage::ScriptsCombined) {
            let created_at = self
                .session
                .artifacts
                .get(COMBINED_SCRIPT_FILE)
                .map(|track| track.recorded_at)
                .unwrap_or_else(chrono::Utc::now);
            return Ok(CombinedScript {
                script_text: read_artifact(&path)?,
                source_count: batch.len(),
                created_at,
            });
        }

        let run_id = self.session.run_id;
        let combiner = AgentScriptCombiner::new(SCRIPT_COMBINE_AGENT, self.services.clone());
        let combined = script_batch::combine(&batch, &combiner).await?;

        self.ensure_current(run_id)?;
        write_atomic(&path, combined.script_text.as_bytes())?;
        self.advance(Action::CombineScripts, Stage::ScriptsCombined)?;
        self.session.track(&path)?;
        self.commit(run_id)?;
        info!(sources = combined.source_count, path = %path.display(), "scripts combined");
        Ok(combined)
    }

    /// Runs the combined script and writes the report next to it. May be
    /// repeated.
    pub async fn run_scripts(
        &mut self,
        virtual_users: Option<u32>,
        duration: Option<Duration>,
    ) -> PipelineResult<PerformanceReport> {
        self.begin(Action::RunScripts)?;
        let result = self.run_run_scripts(virtual_users, duration).await;
        self.finish(Action::RunScripts, result)
    }

    async fn run_run_scripts(
        &mut self,
        virtual_users: Option<u32>,
        duration: Option<Duration>,
    ) -> PipelineResult<PerformanceReport> {
        let run_id = self.session.run_id;
        let script = self.store.artifact_path(COMBINED_SCRIPT_FILE);
        if !script.is_file() {
            return Err(StoreError::NotFound(script).into());
        }

        let virtual_users = virtual_users.unwrap_or(self.settings.virtual_users).max(1);
        let duration = duration.unwrap_or_else(|| self.settings.test_duration());
        let limit = self.settings.run_timeout();
        info!(virtual_users, duration_secs = duration.as_secs(), "running load test");

        let report = tokio::time::timeout(limit, self.runner.execute(&script, virtual_users, duration))
            .await
            .map_err(|_| PipelineError::UpstreamTimeout(limit))??;

        self.ensure_current(run_id)?;
        let json_path = self.store.artifact_path(REPORT_JSON_FILE);
        let json = serde_json::to_string_pretty(&report).map_err(|source| StoreError::Json {
            path: json_path.clone(),
            source,
        })?;
        write_atomic(&json_path, json.as_bytes())?;
        write_atomic(
            &self.store.artifact_path(REPORT_MARKDOWN_FILE),
            report.to_markdown().as_bytes(),
        )?;
        self.advance(Action::RunScripts, Stage::ExecutionComplete)?;
        self.session.track(&json_path)?;
        self.commit(run_id)?;
        info!(
            success_rate = report.success_rate(),
            thresholds_passed = report.thresholds_passed,
            "load test finished"
        );
        Ok(report)
    }

    fn begin(&mut self, action: Action) -> PipelineResult<()> {
        self.check(action)?;
        self.in_flight = Some(action);
        Ok(())
    }

    /// Clears the in-flight marker and records failures of stage-producing
    /// actions. A cancelled action adopts the run that replaced it.
    fn finish<T>(&mut self, action: Action, result: PipelineResult<T>) -> PipelineResult<T> {
        self.in_flight = None;
        match result {
            Ok(value) => {
                if self.session.last_failure.as_ref().is_some_and(|f| f.action == action) {
                    self.session.last_failure = None;
                    self.session.save(self.store.root())?;
                }
                Ok(value)
            }
            Err(PipelineError::Cancelled(run_id)) => {
                warn!(run_id = %run_id, %action, "run was reset while in flight; result discarded");
                self.session = Session::open(&self.store)?;
                Err(PipelineError::Cancelled(run_id))
            }
            Err(err) => {
                if records_failure(action) && !matches!(err, PipelineError::Precondition(_)) {
                    warn!(%action, error = %err, "stage failed");
                    self.session.last_failure = Some(FailureRecord {
                        action,
                        cause: err.to_string(),
                        at: chrono::Utc::now(),
                    });
                    let run_id = self.session.run_id;
                    if self.ensure_current(run_id).is_ok() {
                        if let Err(save_err) = self.session.save(self.store.root()) {
                            warn!(error = %save_err, "could not record failure in checkpoint");
                        }
                    }
                }
                Err(err)
            }
        }
    }

    fn advance(&mut self, action: Action, stage: Stage) -> PipelineResult<()> {
        self.session
            .state
            .mark_complete(stage)
            .map_err(|e| PreconditionError::missing(action, e.missing).into())
    }

    /// Fails with `Cancelled` when the checkpoint on disk belongs to another
    /// run.
    fn ensure_current(&self, run_id: Uuid) -> PipelineResult<()> {
        match Session::stored_run_id(self.store.root())? {
            Some(stored) if stored != run_id => Err(PipelineError::Cancelled(run_id.to_string())),
            _ => Ok(()),
        }
    }

    fn commit(&mut self, run_id: Uuid) -> PipelineResult<()> {
        self.ensure_current(run_id)?;
        self.session.save(self.store.root())?;
        Ok(())
    }

    fn spec_text(&self) -> PipelineResult<String> {
        match self.current_spec() {
            Some(text) => Ok(text.to_string()),
            None => Ok(self.store.load(SpecKind::Unified)?),
        }
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.store.artifact_path(name)
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }
}

/// Generation, combination and execution failures move the run to `Failed`.
/// Reviews, edits and approvals only report the error.
fn records_failure(action: Action) -> bool {
    matches!(
        action,
        Action::GenerateSpec
            | Action::GenerateTestCases
            | Action::GenerateScripts
            | Action::CombineScripts
            | Action::RunScripts
    )
}

/// Markdown documents are kept as written unless the whole reply is one
/// fenced block.
fn clean_document(raw: &str, what: &'static str) -> PipelineResult<String> {
    let trimmed = raw.trim();
    let text = if trimmed.starts_with("```") {
        extract_code(trimmed).text
    } else {
        trimmed.to_string()
    };
    if text.is_empty() {
        return Err(ExtractionError::EmptyPayload(what).into());
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_document_unwraps_only_whole_reply_fences() {
        assert_eq!(
            clean_document("```markdown\n# API\n```", "spec").unwrap(),
            "# API"
        );
        let with_example = "# API\n\n```json\n{\"id\": 1}\n```\n";
        assert_eq!(
            clean_document(with_example, "spec").unwrap(),
            with_example.trim()
        );
        assert!(matches!(
            clean_document("  \n", "spec"),
            Err(PipelineError::Extraction(ExtractionError::EmptyPayload("spec")))
        ));
    }

    #[test]
    fn only_producing_actions_record_failures() {
        assert!(records_failure(Action::GenerateScripts));
        assert!(records_failure(Action::RunScripts));
        assert!(!records_failure(Action::EditSpec));
        assert!(!records_failure(Action::ApproveTestCases));
    }
}
