use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;

#[derive(Parser)]
#[command(name = "qaflow")]
#[command(about = "Agent-driven API QA pipeline: spec, test cases, k6 scripts, load run", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,

    #[arg(long, global = true, help = "Perform a dry run without executing actions")]
    dry_run: bool,

    #[arg(long, global = true, help = "Path to the settings file (defaults to qaflow.yml)")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Spec(SpecCommands),

    #[command(subcommand)]
    Cases(CasesCommands),

    #[command(subcommand)]
    Scripts(ScriptsCommands),

    #[command(about = "Run the merged k6 script and write the report")]
    Run {
        #[arg(long, help = "Virtual users")]
        vus: Option<u32>,

        #[arg(long, help = "Test duration in seconds")]
        duration: Option<u64>,
    },

    #[command(about = "Show pipeline progress and tracked artifacts")]
    Status,

    #[command(about = "Start a new run; artifacts on disk are kept")]
    Reset,
}

#[derive(Subcommand)]
enum SpecCommands {
    #[command(about = "Generate the unified API spec from source code")]
    Generate {
        #[arg(long, help = "API source folder")]
        source: PathBuf,

        #[arg(long, help = "Optional free-text API summary")]
        summary: Option<String>,

        #[arg(long, help = "Reuse existing extracted specs and only re-run the merge")]
        reuse_extracted: bool,
    },

    #[command(about = "Ask for review suggestions on the current spec")]
    Suggest,

    #[command(about = "Apply one piece of feedback to the spec")]
    Edit {
        #[arg(required = true, trailing_var_arg = true, help = "Feedback text")]
        text: Vec<String>,
    },

    #[command(about = "Review the spec interactively, one feedback line at a time")]
    Chat,

    #[command(about = "Approve the current spec")]
    Approve,

    #[command(about = "Print the current spec and visible suggestions")]
    Show,
}

#[derive(Subcommand)]
enum CasesCommands {
    #[command(about = "Generate test cases from the approved spec")]
    Generate,

    #[command(about = "Replace the draft rows with an edited CSV")]
    Edit {
        #[arg(long, help = "Edited test case CSV")]
        file: PathBuf,
    },

    #[command(about = "Approve the draft test cases")]
    Approve,
}

#[derive(Subcommand)]
enum ScriptsCommands {
    #[command(about = "Generate one k6 script per approved test case")]
    Generate,

    #[command(about = "Merge the generated scripts into one")]
    Combine,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qaflow=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qaflow=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli::Config {
        verbose: cli.verbose,
        dry_run: cli.dry_run,
        config_path: cli.config,
    };

    match cli.command {
        Commands::Spec(spec_cmd) => match spec_cmd {
            SpecCommands::Generate {
                source,
                summary,
                reuse_extracted,
            } => {
                cli::spec_generate(source, summary, reuse_extracted, &config).await?;
            }
            SpecCommands::Suggest => cli::spec_suggest(&config).await?,
            SpecCommands::Edit { text } => cli::spec_edit(text, &config).await?,
            SpecCommands::Chat => cli::spec_chat(&config).await?,
            SpecCommands::Approve => cli::spec_approve(&config).await?,
            SpecCommands::Show => cli::spec_show(&config).await?,
        },
        Commands::Cases(cases_cmd) => match cases_cmd {
            CasesCommands::Generate => cli::cases_generate(&config).await?,
            CasesCommands::Edit { file } => cli::cases_edit(file, &config).await?,
            CasesCommands::Approve => cli::cases_approve(&config).await?,
        },
        Commands::Scripts(scripts_cmd) => match scripts_cmd {
            ScriptsCommands::Generate => cli::scripts_generate(&config).await?,
            ScriptsCommands::Combine => cli::scripts_combine(&config).await?,
        },
        Commands::Run { vus, duration } => {
            cli::run(vus, duration, &config).await?;
        }
        Commands::Status => cli::status(&config).await?,
        Commands::Reset => cli::reset(&config).await?,
    }

    Ok(())
}
