//! Per-test-case script generation and the merge into one script.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::contexts::{extract_code, AgentServices};
use crate::data::{
    Action, CombinedScript, ScriptArtifact, ScriptBatch, TestCaseRow, TestCaseTable,
};
use crate::error::{ExtractionError, PipelineError, PreconditionError};

/// Produces the raw model output for one test case.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate_script(&self, row: &TestCaseRow) -> Result<String, PipelineError>;
}

/// Produces the raw model output for a merge of `script_count` scripts.
#[async_trait]
pub trait ScriptCombiner: Send + Sync {
    async fn combine_scripts(
        &self,
        joined_scripts: &str,
        script_count: usize,
    ) -> Result<String, PipelineError>;
}

/// One script per row, in table order. Rows run concurrently up to
/// `concurrency`; a failed row becomes a placeholder so the batch always has
/// `table.row_count()` entries.
pub async fn generate(
    table: &TestCaseTable,
    generator: Arc<dyn ScriptGenerator>,
    concurrency: usize,
) -> ScriptBatch {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(table.row_count());

    for row in table.rows() {
        let row = row.clone();
        let generator = Arc::clone(&generator);
        let semaphore = Arc::clone(&semaphore);

        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return ScriptArtifact::placeholder(
                        &row.id,
                        &row.description,
                        "generation was cancelled",
                    );
                }
            };
            debug!(test_case = %row.id, "generating script");
            script_for_row(&row, generator.generate_script(&row).await)
        }));
    }

    let mut scripts = Vec::with_capacity(handles.len());
    for (handle, row) in handles.into_iter().zip(table.rows()) {
        let script = match handle.await {
            Ok(script) => script,
            Err(e) => ScriptArtifact::placeholder(
                &row.id,
                &row.description,
                &format!("generation task failed: {}", e),
            ),
        };
        scripts.push(script);
    }

    let batch = ScriptBatch::new(scripts);
    info!(
        scripts = batch.len(),
        failed = batch.failed_count(),
        "script generation finished"
    );
    batch
}

fn script_for_row(row: &TestCaseRow, output: Result<String, PipelineError>) -> ScriptArtifact {
    let raw = match output {
        Ok(raw) => raw,
        Err(e) => {
            warn!(test_case = %row.id, error = %e, "script generation failed");
            return ScriptArtifact::placeholder(&row.id, &row.description, &e.to_string());
        }
    };

    let code = extract_code(&raw);
    if code.text.is_empty() {
        warn!(test_case = %row.id, "model returned no script");
        return ScriptArtifact::placeholder(
            &row.id,
            &row.description,
            &ExtractionError::EmptyPayload("script").to_string(),
        );
    }

    ScriptArtifact {
        test_case_id: row.id.clone(),
        description: row.description.clone(),
        script_text: code.text,
        extraction_ok: true,
    }
}

/// Sends every script, joined by the separator, to the merge request and
/// keeps the single cleaned script it returns.
pub async fn combine(
    batch: &ScriptBatch,
    combiner: &dyn ScriptCombiner,
) -> Result<CombinedScript, PipelineError> {
    if batch.is_empty() {
        return Err(PreconditionError::new(Action::CombineScripts, "the script batch is empty").into());
    }

    let raw = combiner
        .combine_scripts(&batch.joined_text(), batch.len())
        .await?;
    let code = extract_code(&raw);
    if code.text.is_empty() {
        return Err(ExtractionError::EmptyPayload("combined script").into());
    }

    Ok(CombinedScript {
        script_text: code.text,
        source_count: batch.len(),
        created_at: Utc::now(),
    })
}

#[derive(Serialize)]
struct ScriptRequest<'a> {
    test_case_id: &'a str,
    description: &'a str,
    category: &'a str,
    steps: &'a str,
}

#[derive(Serialize)]
struct CombineRequest<'a> {
    scripts: &'a str,
    script_count: usize,
}

/// Generates scripts through a prompt agent.
pub struct AgentScriptGenerator {
    agent: String,
    services: AgentServices,
}

impl AgentScriptGenerator {
    pub fn new(agent: impl Into<String>, services: AgentServices) -> Self {
        Self {
            agent: agent.into(),
            services,
        }
    }
}

#[async_trait]
impl ScriptGenerator for AgentScriptGenerator {
    async fn generate_script(&self, row: &TestCaseRow) -> Result<String, PipelineError> {
        let request = ScriptRequest {
            test_case_id: &row.id,
            description: &row.description,
            category: row.category.as_str(),
            steps: &row.steps,
        };
        self.services.run(&self.agent, request).await
    }
}

/// Merges scripts through a prompt agent.
pub struct AgentScriptCombiner {
    agent: String,
    services: AgentServices,
}

impl AgentScriptCombiner {
    pub fn new(agent: impl Into<String>, services: AgentServices) -> Self {
        Self {
            agent: agent.into(),
            services,
        }
    }
}

#[async_trait]
impl ScriptCombiner for AgentScriptCombiner {
    async fn combine_scripts(
        &self,
        joined_scripts: &str,
        script_count: usize,
    ) -> Result<String, PipelineError> {
        let request = CombineRequest {
            scripts: joined_scripts,
            script_count,
        };
        self.services.run(&self.agent, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{TestCaseCategory, SCRIPT_SEPARATOR};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn table(ids: &[&str]) -> TestCaseTable {
        let rows = ids
            .iter()
            .map(|id| {
                TestCaseRow::new(
                    *id,
                    format!("case {id}"),
                    TestCaseCategory::HappyPath,
                    "POST /users then GET /users/{id}",
                )
            })
            .collect();
        TestCaseTable::from_rows(rows, Vec::new()).unwrap()
    }

    /// Fails every row whose id is listed, fences the rest.
    struct FlakyGenerator {
        failing: Vec<&'static str>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FlakyGenerator {
        fn new(failing: Vec<&'static str>) -> Self {
            Self {
                failing,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ScriptGenerator for FlakyGenerator {
        async fn generate_script(&self, row: &TestCaseRow) -> Result<String, PipelineError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&row.id.as_str()) {
                return Err(PipelineError::UpstreamTimeout(Duration::from_secs(60)));
            }
            Ok(format!("```javascript\n// {}\nexport default function () {{}}\n```", row.id))
        }
    }

    struct EchoCombiner {
        seen: Mutex<Option<(String, usize)>>,
    }

    #[async_trait]
    impl ScriptCombiner for EchoCombiner {
        async fn combine_scripts(
            &self,
            joined_scripts: &str,
            script_count: usize,
        ) -> Result<String, PipelineError> {
            *self.seen.lock().unwrap() = Some((joined_scripts.to_string(), script_count));
            Ok(format!("```js\n{}\n```", joined_scripts))
        }
    }

    #[tokio::test]
    async fn batch_has_one_script_per_row_even_when_rows_fail() {
        let ids = ["TC001", "TC002", "TC003", "TC004", "TC005"];
        let generator = Arc::new(FlakyGenerator::new(vec!["TC002", "TC005"]));

        let batch = generate(&table(&ids), generator, 2).await;

        assert_eq!(batch.len(), ids.len());
        let got: Vec<&str> = batch.scripts().iter().map(|s| s.test_case_id.as_str()).collect();
        assert_eq!(got, ids);
        assert_eq!(batch.failed_count(), 2);
        assert!(!batch.scripts()[1].extraction_ok);
        assert!(batch.scripts()[1].script_text.contains("timed out"));
        assert_eq!(
            batch.scripts()[0].script_text,
            "// TC001\nexport default function () {}"
        );
    }

    #[test]
    fn truncated_reply_with_only_a_tag_becomes_a_placeholder() {
        let row = TestCaseRow::new("TC007", "cut off", TestCaseCategory::EdgeCase, "GET /users");
        let script = script_for_row(&row, Ok("```javascript".to_string()));
        assert!(!script.extraction_ok);
        assert!(script.script_text.starts_with(crate::data::PLACEHOLDER_MARKER));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let ids = ["TC001", "TC002", "TC003", "TC004", "TC005", "TC006"];
        let generator = Arc::new(FlakyGenerator::new(Vec::new()));

        generate(&table(&ids), generator.clone(), 2).await;

        assert!(generator.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn single_row_generates_and_combines() {
        let generator = Arc::new(FlakyGenerator::new(Vec::new()));
        let batch = generate(&table(&["TC001"]), generator, 4).await;
        assert_eq!(batch.scripts()[0].test_case_id, "TC001");

        let combiner = EchoCombiner {
            seen: Mutex::new(None),
        };
        let combined = combine(&batch, &combiner).await.unwrap();
        assert_eq!(combined.source_count, 1);
        assert!(!combined.script_text.contains("```"));
    }

    #[tokio::test]
    async fn combine_sends_separated_scripts() {
        let generator = Arc::new(FlakyGenerator::new(vec!["TC002"]));
        let batch = generate(&table(&["TC001", "TC002"]), generator, 4).await;
        let combiner = EchoCombiner {
            seen: Mutex::new(None),
        };

        let combined = combine(&batch, &combiner).await.unwrap();

        let (joined, count) = combiner.seen.lock().unwrap().clone().unwrap();
        assert_eq!(count, 2);
        assert_eq!(joined.matches(SCRIPT_SEPARATOR).count(), 1);
        assert_eq!(combined.source_count, 2);
    }

    #[tokio::test]
    async fn combining_empty_batch_is_rejected() {
        let combiner = EchoCombiner {
            seen: Mutex::new(None),
        };
        let err = combine(&ScriptBatch::default(), &combiner).await.unwrap_err();
        assert!(matches!(err, PipelineError::Precondition(_)));
    }
}
