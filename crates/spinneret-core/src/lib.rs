//! spinneret-core: LLM-driven scraper synthesis with bounded self-repair.
//!
//! The pipeline for one target site:
//!
//! 1. **Analyze** — a navigator agent browses the site and produces a
//!    structured [`AnalysisReport`](domain::AnalysisReport).
//! 2. **Fields** — the caller declares the fields the scraper must extract.
//! 3. **Generate** — a synthesizer agent writes a candidate spider; the
//!    repair loop tests it in a sandboxed process and, on failure, feeds
//!    diagnostics back for a corrected candidate, up to an iteration budget.
//! 4. **Run** — the accepted program executes without a time budget and the
//!    scraped records land in the project directory.
//!
//! [`task::ScrapeTask`] is the facade over the whole lifecycle; the
//! individual pieces (agents, sandbox, repair loop) are public for callers
//! that need finer control or test doubles.

pub mod agents;
pub mod config;
pub mod domain;
pub mod llm;
pub mod obs;
pub mod release;
pub mod repair;
pub mod sandbox;
pub mod task;
pub mod telemetry;
pub mod workspace;

pub use agents::{
    HeuristicAdvisor, LlmAdvisor, LlmNavigator, LlmSynthesizer, NavigatorConfig, RepairAdvisor,
    SiteAnalyzer, SpiderSynthesizer,
};
pub use config::TaskConfig;
pub use domain::{
    classify_outcome, field_coverage, spider_name_from_url, AnalysisReport, DataRegion,
    ExecutionResult, Field, FieldKind, FieldSpec, GeneratedProgram, NavigationStrategy, Outcome,
    RepairRequest, Result, SpinneretError,
};
pub use llm::{LlmConfig, LlmError, ModelRole, OpenRouterClient};
pub use release::ReleaseRunner;
pub use repair::{LoopState, RepairLoop, RepairReport, Verdict};
pub use sandbox::{ProcessSandbox, ProgramRunner, RunnerConfig, SandboxError};
pub use task::{open_accepted, ScrapeTask};
pub use telemetry::init_tracing;
pub use workspace::{ProjectWorkspace, TaskManifest};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
