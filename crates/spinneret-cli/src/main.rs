//! spinneret - LLM-driven scraper synthesis CLI
//!
//! ## Commands
//!
//! - `analyze`: Browse a site and print the structured analysis report
//! - `generate`: Synthesize a scraper for a site and repair it until it passes
//! - `run`: Execute an accepted scraper without a time budget

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use uuid::Uuid;

use spinneret_core::{
    init_tracing, open_accepted, FieldSpec, LlmConfig, LlmNavigator, NavigatorConfig,
    OpenRouterClient, ProcessSandbox, ReleaseRunner, RunnerConfig, ScrapeTask, SiteAnalyzer,
    TaskConfig, Verdict,
};

#[derive(Parser)]
#[command(name = "spinneret")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate, test and repair web scrapers with LLM agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse a site and print the structured analysis report
    Analyze {
        /// Target URL to analyze
        url: String,

        /// Link-following depth
        #[arg(long, default_value = "3")]
        max_depth: usize,

        /// Pages analyzed per depth level
        #[arg(long, default_value = "5")]
        max_links: usize,
    },

    /// Synthesize a scraper and drive the test-and-repair loop
    Generate {
        /// Target URL to scrape
        url: String,

        /// Field to extract, as name:kind (kinds: text, number, boolean).
        /// Repeatable. Derived from the analysis when omitted.
        #[arg(short, long = "field")]
        fields: Vec<String>,

        /// Maximum candidates tested before giving up
        #[arg(long, default_value = "10")]
        budget: u32,

        /// Per-test wall-clock budget in seconds
        #[arg(long, default_value = "120")]
        timeout: u64,

        /// Fraction of fields that must populate for acceptance
        #[arg(long, default_value = "1.0")]
        threshold: f32,

        /// Directory under which the project directory is created
        #[arg(long, default_value = "output")]
        output_root: PathBuf,
    },

    /// Execute an accepted scraper without a time budget
    Run {
        /// Project directory produced by `generate`
        project: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Analyze {
            url,
            max_depth,
            max_links,
        } => cmd_analyze(&url, max_depth, max_links).await,
        Commands::Generate {
            url,
            fields,
            budget,
            timeout,
            threshold,
            output_root,
        } => cmd_generate(&url, &fields, budget, timeout, threshold, output_root).await,
        Commands::Run { project } => cmd_run(&project).await,
    }
}

async fn cmd_analyze(url: &str, max_depth: usize, max_links: usize) -> Result<()> {
    let llm = Arc::new(OpenRouterClient::new(
        LlmConfig::from_env().context("LLM credentials missing")?,
    ));
    let navigator = LlmNavigator::new(
        llm,
        NavigatorConfig {
            max_depth,
            max_links,
        },
    );

    let report = navigator
        .analyze(url)
        .await
        .with_context(|| format!("analysis of {url} failed"))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_generate(
    url: &str,
    field_entries: &[String],
    budget: u32,
    timeout: u64,
    threshold: f32,
    output_root: PathBuf,
) -> Result<()> {
    let config = TaskConfig {
        max_iterations: budget,
        test_timeout_secs: timeout,
        threshold,
        output_root,
    };

    let mut task = ScrapeTask::new(url, config).context("failed to set up the task")?;
    task.analyze()
        .await
        .with_context(|| format!("analysis of {url} failed"))?;

    if field_entries.is_empty() {
        let derived = task.set_fields_from_analysis()?;
        let names: Vec<&str> = derived.names().collect();
        println!("Fields derived from analysis: {}", names.join(", "));
    } else {
        task.set_fields(FieldSpec::parse_entries(field_entries)?)?;
    }

    let report = task.generate().await.context("generation aborted")?;

    let project_root = task
        .project()
        .map(|p| p.root().display().to_string())
        .unwrap_or_default();

    match report.verdict {
        Verdict::Accepted => {
            println!(
                "Accepted generation {} after {} test run(s): {} record(s), {:.0}% coverage",
                report.final_program.generation,
                report.iterations_used,
                report.final_result.records,
                report.final_result.coverage * 100.0,
            );
            println!("Project: {project_root}");
            println!("Release with: spinneret run {project_root}");
            Ok(())
        }
        Verdict::Exhausted => {
            println!(
                "Budget of {} exhausted; last candidate scraped {} record(s) at {:.0}% coverage",
                report.iterations_used,
                report.final_result.records,
                report.final_result.coverage * 100.0,
            );
            println!("Logs and candidates kept under {project_root}");
            bail!("no candidate accepted within the iteration budget");
        }
    }
}

async fn cmd_run(project: &PathBuf) -> Result<()> {
    let (project, _report) =
        open_accepted(project).context("project has no accepted scraper")?;

    let sandbox = Arc::new(ProcessSandbox::new(RunnerConfig::default())?);
    let result = ReleaseRunner::new(sandbox)
        .run(Uuid::new_v4(), &project)
        .await
        .context("release run failed")?;

    println!(
        "Scraped {} record(s) in {:.1}s; output at {}",
        result.records,
        result.duration_ms as f64 / 1000.0,
        project.records_path().display(),
    );
    Ok(())
}
