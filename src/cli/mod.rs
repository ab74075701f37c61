use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

mod progress;

use progress::{render_tracker, ProgressIndicator};
use qaflow::checkpoint::CHECKPOINT_DIR;
use qaflow::config::Settings;
use qaflow::contexts::{
    AgentServices, PipelineCoordinator, SpecEditOutcome, SpecSeed, SpecStore, SuggestionSection,
};
use qaflow::data::{Action, SpecKind, TestCaseTable};
use qaflow::registries::{FileAgentModelRegistry, FileAgentRegistry, MODEL_REGISTRY_FILE};
use qaflow::services::{K6Runner, OpenAiChatClient};

#[derive(Clone)]
pub struct Config {
    pub verbose: bool,
    pub dry_run: bool,
    pub config_path: Option<PathBuf>,
}

fn open_coordinator(config: &Config) -> Result<PipelineCoordinator> {
    let settings = Settings::load(config.config_path.as_deref()).context("Failed to load settings")?;
    let agents_dir = settings.agents_path();

    let services = AgentServices {
        agent_registry: Arc::new(FileAgentRegistry::new(Some(agents_dir.clone()))),
        agent_model_registry: Arc::new(FileAgentModelRegistry::new(
            Some(agents_dir.join(MODEL_REGISTRY_FILE)),
            None,
            None,
        )),
        completion: Arc::new(OpenAiChatClient::from_settings(&settings)),
        timeout: settings.request_timeout(),
    };
    let runner = Arc::new(K6Runner::new(settings.k6_binary.clone()));
    let store = SpecStore::new(settings.workspace.clone());

    if config.verbose {
        println!("Workspace: {}", store.root().display());
    }

    PipelineCoordinator::open(store, services, runner, settings)
        .context("Failed to open pipeline checkpoint")
}

/// In dry-run mode, report whether `action` could run and stop.
fn dry_run(coordinator: &PipelineCoordinator, action: Action, config: &Config) -> Result<bool> {
    if !config.dry_run {
        return Ok(false);
    }
    match coordinator.check(action) {
        Ok(()) => println!("⊚ Would {} (dry run)", action),
        Err(e) => println!("✗ Cannot {}: {}", action, e),
    }
    Ok(true)
}

pub async fn spec_generate(
    source: PathBuf,
    summary: Option<String>,
    reuse_extracted: bool,
    config: &Config,
) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if dry_run(&coordinator, Action::GenerateSpec, config)? {
        return Ok(());
    }

    println!("Generating API specification from {}", source.display());
    let seed = SpecSeed {
        source_dir: Some(source),
        summary,
        reuse_extracted,
    };
    let path = coordinator
        .generate_spec(seed)
        .await
        .context("Failed to generate API specification")?;

    println!("✓ Unified spec saved to {}", path.display());
    if config.verbose {
        for kind in [SpecKind::HumanReadable, SpecKind::OpenApiYaml] {
            println!("  {}", coordinator.store().path(kind).display());
        }
    }
    Ok(())
}

pub async fn spec_suggest(config: &Config) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if dry_run(&coordinator, Action::SuggestImprovements, config)? {
        return Ok(());
    }

    let sections = coordinator
        .suggest_improvements()
        .await
        .context("Failed to get spec suggestions")?;
    print_suggestions(&sections);
    Ok(())
}

pub async fn spec_edit(text: Vec<String>, config: &Config) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if dry_run(&coordinator, Action::EditSpec, config)? {
        return Ok(());
    }

    let feedback = text.join(" ");
    let outcome = coordinator
        .edit_spec(&feedback)
        .await
        .context("Failed to apply spec feedback")?;
    print_edit_outcome(&outcome);
    Ok(())
}

/// Interactive review: every stdin line is one piece of feedback.
pub async fn spec_chat(config: &Config) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if dry_run(&coordinator, Action::EditSpec, config)? {
        return Ok(());
    }
    coordinator.check(Action::EditSpec)?;

    print_suggestions(coordinator.visible_suggestions());
    println!("Type your feedback. Say \"approved\" to approve, \"ignore\" to hide suggestions.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        match coordinator.edit_spec(&line).await {
            Ok(SpecEditOutcome::Approved(path)) => {
                print_edit_outcome(&SpecEditOutcome::Approved(path));
                break;
            }
            Ok(outcome) => print_edit_outcome(&outcome),
            Err(e) if e.is_retryable() => eprintln!("✗ {}", e),
            Err(e) => return Err(e).context("Spec review stopped"),
        }
    }
    Ok(())
}

pub async fn spec_approve(config: &Config) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if dry_run(&coordinator, Action::ApproveSpec, config)? {
        return Ok(());
    }

    let snapshot = coordinator.approve_spec().context("Failed to approve spec")?;
    println!("✓ Spec approved, snapshot saved to {}", snapshot.display());
    Ok(())
}

pub async fn spec_show(config: &Config) -> Result<()> {
    let coordinator = open_coordinator(config)?;
    match coordinator.current_spec() {
        Some(spec) => {
            let lineage = coordinator.spec_lineage();
            println!(
                "Revision {} ({})\n",
                lineage.revisions().len(),
                if lineage.is_approved() { "approved" } else { "draft" }
            );
            println!("{}", spec);
        }
        None => println!("No API specification has been generated in this run"),
    }
    print_suggestions(coordinator.visible_suggestions());
    Ok(())
}

pub async fn cases_generate(config: &Config) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if dry_run(&coordinator, Action::GenerateTestCases, config)? {
        return Ok(());
    }

    println!("Generating test cases from the approved spec");
    let generated = coordinator
        .generate_test_cases()
        .await
        .context("Failed to generate test cases")?;

    if !generated.reasoning.is_empty() {
        println!("Reasoning:");
        for (idx, step) in generated.reasoning.iter().enumerate() {
            println!("  {}. {}", idx + 1, step);
        }
    }
    print_table(&generated.table);
    println!(
        "✓ {} test case(s) saved to {}",
        generated.table.row_count(),
        generated.path.display()
    );
    Ok(())
}

pub async fn cases_edit(file: PathBuf, config: &Config) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if dry_run(&coordinator, Action::EditTestCases, config)? {
        return Ok(());
    }

    let edited = TestCaseTable::load(&file)
        .with_context(|| format!("Failed to read edited test cases from {}", file.display()))?;
    let table = coordinator
        .edit_test_cases(edited)
        .context("Failed to apply test case edits")?;
    println!("✓ Draft updated with {} test case(s)", table.row_count());
    Ok(())
}

pub async fn cases_approve(config: &Config) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if dry_run(&coordinator, Action::ApproveTestCases, config)? {
        return Ok(());
    }

    let path = coordinator
        .approve_test_cases()
        .context("Failed to approve test cases")?;
    println!("✓ Test cases approved and saved to {}", path.display());
    Ok(())
}

pub async fn scripts_generate(config: &Config) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if dry_run(&coordinator, Action::GenerateScripts, config)? {
        return Ok(());
    }

    println!("Generating k6 scripts for the approved test cases");
    let batch = coordinator
        .generate_scripts()
        .await
        .context("Failed to generate scripts")?;

    let mut progress = ProgressIndicator::new(batch.len());
    for script in batch.scripts() {
        progress.complete_item(&script.test_case_id, script.extraction_ok, config.verbose);
    }
    progress.finish();
    Ok(())
}

pub async fn scripts_combine(config: &Config) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if dry_run(&coordinator, Action::CombineScripts, config)? {
        return Ok(());
    }

    let combined = coordinator
        .combine_scripts()
        .await
        .context("Failed to combine scripts")?;
    println!(
        "✓ Merged {} script(s) into {}",
        combined.source_count,
        coordinator
            .artifact_path(qaflow::contexts::COMBINED_SCRIPT_FILE)
            .display()
    );
    Ok(())
}

pub async fn run(vus: Option<u32>, duration: Option<u64>, config: &Config) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if dry_run(&coordinator, Action::RunScripts, config)? {
        return Ok(());
    }

    println!("Running merged k6 script");
    let report = coordinator
        .run_scripts(vus, duration.map(Duration::from_secs))
        .await
        .context("Failed to run k6 tests")?;

    println!("{}", report.to_markdown());
    if report.thresholds_passed {
        println!("✓ Load test finished");
    } else {
        println!("✗ Load test finished with crossed thresholds");
    }
    Ok(())
}

pub async fn status(config: &Config) -> Result<()> {
    let coordinator = open_coordinator(config)?;
    let session = coordinator.session();
    let phase = coordinator.phase();

    println!("Run:   {}", session.run_id);
    println!("Since: {}", session.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Phase: {}\n", phase);
    print!("{}", render_tracker(session, &phase));

    if let Some(failure) = &session.last_failure {
        println!("\nLast failure during '{}': {}", failure.action, failure.cause);
    }

    if !session.artifacts.is_empty() {
        println!("\nArtifacts:");
        for (name, track) in &session.artifacts {
            let marker = match session.is_unchanged(&track.path) {
                Ok(true) => "✓",
                _ => "✗",
            };
            println!("  {} {} {}", marker, &track.sha256[..12.min(track.sha256.len())], name);
        }
    }
    Ok(())
}

pub async fn reset(config: &Config) -> Result<()> {
    let mut coordinator = open_coordinator(config)?;
    if config.dry_run {
        println!(
            "⊚ Would start a new run, replacing {}/ checkpoint (dry run)",
            CHECKPOINT_DIR
        );
        return Ok(());
    }

    let previous = coordinator.run_id();
    let run_id = coordinator.reset().context("Failed to reset the run")?;
    println!("✓ Started run {} (previous run {})", run_id, previous);
    Ok(())
}

fn print_suggestions(sections: &[SuggestionSection]) {
    if sections.is_empty() {
        return;
    }
    println!("\nSuggestions:");
    for section in sections {
        println!("\n{}", section.title);
        for point in &section.points {
            println!("  - {}", point);
        }
    }
    println!();
}

fn print_edit_outcome(outcome: &SpecEditOutcome) {
    match outcome {
        SpecEditOutcome::Approved(path) => {
            println!("✓ Spec approved, snapshot saved to {}", path.display())
        }
        SpecEditOutcome::SuggestionsHidden => println!("⊚ Suggestions hidden"),
        SpecEditOutcome::Revised { revision } => println!("✓ Spec updated (revision {})", revision),
        SpecEditOutcome::Ignored => println!("⊚ Nothing to apply"),
    }
}

fn print_table(table: &TestCaseTable) {
    for row in table.rows() {
        println!("  {} [{}] {}", row.id, row.category.as_str(), row.description);
    }
}
