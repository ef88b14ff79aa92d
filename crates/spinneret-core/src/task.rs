//! Task facade: analyze, choose fields, generate, run.
//!
//! One [`ScrapeTask`] covers the full lifecycle for one target site. The
//! phases are ordered; calling one before its prerequisites completes is a
//! [`SpinneretError::TaskNotReady`] fault, not a panic.

use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::agents::{
    LlmAdvisor, LlmNavigator, LlmSynthesizer, NavigatorConfig, RepairAdvisor, SiteAnalyzer,
    SpiderSynthesizer,
};
use crate::config::TaskConfig;
use crate::domain::{
    AnalysisReport, ExecutionResult, FieldKind, FieldSpec, Result, SpinneretError,
};
use crate::llm::{LlmConfig, OpenRouterClient};
use crate::obs;
use crate::release::ReleaseRunner;
use crate::repair::{RepairLoop, RepairReport};
use crate::sandbox::{ProcessSandbox, ProgramRunner, RunnerConfig};
use crate::workspace::ProjectWorkspace;

/// Artifact name for the persisted analysis report.
pub const ANALYSIS_FILE: &str = "analysis.json";

/// Artifact name for the persisted repair loop report.
pub const REPAIR_REPORT_FILE: &str = "repair_report.json";

/// One scraping task against one target URL.
pub struct ScrapeTask {
    target_url: String,
    config: TaskConfig,
    run_id: Uuid,

    analyzer: Arc<dyn SiteAnalyzer>,
    synthesizer: Arc<dyn SpiderSynthesizer>,
    advisor: Arc<dyn RepairAdvisor>,
    runner: Arc<dyn ProgramRunner>,

    report: Option<AnalysisReport>,
    fields: Option<FieldSpec>,
    project: Option<ProjectWorkspace>,
    accepted: bool,
}

impl ScrapeTask {
    /// Build a task wired to the OpenRouter-backed agents and the local
    /// process sandbox. Reads the API key from the environment.
    pub fn new(target_url: impl Into<String>, config: TaskConfig) -> Result<Self> {
        let llm = Arc::new(OpenRouterClient::new(LlmConfig::from_env()?));
        let runner_config = RunnerConfig {
            threshold: config.threshold,
            ..Default::default()
        };
        Self::with_agents(
            target_url,
            config,
            Arc::new(LlmNavigator::new(llm.clone(), NavigatorConfig::default())),
            Arc::new(LlmSynthesizer::new(llm.clone())),
            Arc::new(LlmAdvisor::new(llm)),
            Arc::new(ProcessSandbox::new(runner_config)?),
        )
    }

    /// Build a task with explicit agent implementations.
    pub fn with_agents(
        target_url: impl Into<String>,
        config: TaskConfig,
        analyzer: Arc<dyn SiteAnalyzer>,
        synthesizer: Arc<dyn SpiderSynthesizer>,
        advisor: Arc<dyn RepairAdvisor>,
        runner: Arc<dyn ProgramRunner>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            target_url: target_url.into(),
            config,
            run_id: Uuid::new_v4(),
            analyzer,
            synthesizer,
            advisor,
            runner,
            report: None,
            fields: None,
            project: None,
            accepted: false,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        self.report.as_ref()
    }

    pub fn project(&self) -> Option<&ProjectWorkspace> {
        self.project.as_ref()
    }

    /// Phase 1: browse the target and build the analysis report.
    pub async fn analyze(&mut self) -> Result<&AnalysisReport> {
        let report = self.analyzer.analyze(&self.target_url).await?;
        Ok(self.report.insert(report))
    }

    /// Phase 2: choose the fields the scraper must extract.
    pub fn set_fields(&mut self, fields: FieldSpec) -> Result<()> {
        if fields.is_empty() {
            return Err(SpinneretError::InvalidFieldSpec(
                "at least one field is required".to_string(),
            ));
        }
        self.fields = Some(fields);
        Ok(())
    }

    /// Phase 2 (alternative): derive fields from the analysis regions when
    /// the caller has no explicit list.
    pub fn set_fields_from_analysis(&mut self) -> Result<&FieldSpec> {
        let report = self.report.as_ref().ok_or_else(|| {
            SpinneretError::TaskNotReady("analyze() must run before deriving fields".to_string())
        })?;

        let pairs: Vec<(String, FieldKind)> = report
            .regions
            .iter()
            .take(FieldSpec::MAX_FIELDS)
            .map(|r| (r.name.clone(), FieldKind::Text))
            .collect();
        let fields = FieldSpec::new(pairs)?;
        Ok(self.fields.insert(fields))
    }

    /// Phase 3: synthesize a candidate and drive the repair loop.
    ///
    /// Returns `Ok` for both verdicts; only infrastructure faults are
    /// errors. The project directory, the analysis report and the loop
    /// report are all persisted regardless of the verdict.
    pub async fn generate(&mut self) -> Result<RepairReport> {
        let report = self.report.clone().ok_or_else(|| {
            SpinneretError::TaskNotReady("analyze() must run before generate()".to_string())
        })?;
        let fields = self.fields.clone().ok_or_else(|| {
            SpinneretError::TaskNotReady("fields must be set before generate()".to_string())
        })?;

        obs::emit_task_started(self.run_id, &self.target_url, self.config.max_iterations);

        let mut project =
            ProjectWorkspace::create(&self.config.output_root, &self.target_url, fields.clone())?;
        project.write_artifact(ANALYSIS_FILE, &report)?;

        let initial = self.synthesizer.synthesize(&report, &fields, None).await?;

        let repair_loop = RepairLoop::new(
            self.runner.clone(),
            self.synthesizer.clone(),
            self.advisor.clone(),
            self.config.clone(),
        )?;
        let loop_report = repair_loop
            .repair(self.run_id, &mut project, &report, &fields, initial)
            .await?;

        project.write_artifact(REPAIR_REPORT_FILE, &loop_report)?;
        self.accepted = loop_report.accepted();
        self.project = Some(project);
        Ok(loop_report)
    }

    /// Phase 4: production run of the accepted program, no time budget.
    pub async fn run(&self) -> Result<ExecutionResult> {
        if !self.accepted {
            return Err(SpinneretError::TaskNotReady(
                "no accepted program; generate() must finish with an accepted candidate"
                    .to_string(),
            ));
        }
        let project = self.project.as_ref().ok_or_else(|| {
            SpinneretError::TaskNotReady("generate() must run before run()".to_string())
        })?;

        ReleaseRunner::new(self.runner.clone())
            .run(self.run_id, project)
            .await
    }
}

/// Reopen a project directory for a release run, requiring that its last
/// repair loop accepted a candidate.
pub fn open_accepted(root: impl AsRef<Path>) -> Result<(ProjectWorkspace, RepairReport)> {
    let root = root.as_ref();
    let project = ProjectWorkspace::open(root)?;

    let raw = std::fs::read_to_string(root.join(REPAIR_REPORT_FILE)).map_err(|e| {
        SpinneretError::TaskNotReady(format!(
            "no repair report in {}: {e}",
            root.display()
        ))
    })?;
    let report: RepairReport = serde_json::from_str(&raw)?;

    if !report.accepted() {
        return Err(SpinneretError::TaskNotReady(format!(
            "last repair loop for {} ended exhausted; regenerate before releasing",
            project.spider_name()
        )));
    }
    Ok((project, report))
}
