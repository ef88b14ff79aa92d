//! Full task lifecycle with scripted agents: analyze, fields, generate, run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use spinneret_core::llm::LlmResult;
use spinneret_core::sandbox::SandboxResult;
use spinneret_core::task::{ANALYSIS_FILE, REPAIR_REPORT_FILE};
use spinneret_core::{
    open_accepted, AnalysisReport, DataRegion, ExecutionResult, FieldKind, FieldSpec,
    GeneratedProgram, NavigationStrategy, Outcome, ProgramRunner, ProjectWorkspace, RepairRequest,
    ScrapeTask, SiteAnalyzer, SpiderSynthesizer, SpinneretError, TaskConfig,
};

struct FixedAnalyzer;

#[async_trait]
impl SiteAnalyzer for FixedAnalyzer {
    async fn analyze(&self, start_url: &str) -> spinneret_core::Result<AnalysisReport> {
        let mut report = AnalysisReport::empty(start_url);
        report.title = "Example Catalog".to_string();
        report.regions = vec![
            DataRegion {
                name: "title".to_string(),
                selector: ".card h2".to_string(),
                sample_value: "Widget".to_string(),
                description: "Product name".to_string(),
            },
            DataRegion {
                name: "price".to_string(),
                selector: ".card .price".to_string(),
                sample_value: "9.99".to_string(),
                description: "Product price".to_string(),
            },
        ];
        report.strategy = NavigationStrategy::Paginated {
            selector: "a.next".to_string(),
        };
        Ok(report)
    }
}

struct FixedSynthesizer;

#[async_trait]
impl SpiderSynthesizer for FixedSynthesizer {
    async fn synthesize(
        &self,
        _report: &AnalysisReport,
        _fields: &FieldSpec,
        repair: Option<&RepairRequest>,
    ) -> LlmResult<GeneratedProgram> {
        Ok(match repair {
            Some(request) => request.prior.next("# fixed spider\n", ""),
            None => GeneratedProgram::initial("# fixed spider\n", ""),
        })
    }
}

/// Runner that always reports full success.
struct PassingRunner;

#[async_trait]
impl ProgramRunner for PassingRunner {
    async fn run(
        &self,
        project: &ProjectWorkspace,
        generation: u32,
        _timeout: Option<Duration>,
    ) -> SandboxResult<ExecutionResult> {
        let mut field_population = BTreeMap::new();
        for name in project.fields().names() {
            field_population.insert(name.to_string(), 3);
        }
        Ok(ExecutionResult {
            generation,
            exit_code: Some(0),
            records: 3,
            field_population,
            coverage: 1.0,
            diagnostics: vec![],
            timed_out: false,
            duration_ms: 20,
            outcome: Outcome::Success,
        })
    }
}

/// Runner that never produces a record.
struct FailingRunner;

#[async_trait]
impl ProgramRunner for FailingRunner {
    async fn run(
        &self,
        _project: &ProjectWorkspace,
        generation: u32,
        _timeout: Option<Duration>,
    ) -> SandboxResult<ExecutionResult> {
        Ok(ExecutionResult {
            generation,
            exit_code: Some(1),
            records: 0,
            field_population: BTreeMap::new(),
            coverage: 0.0,
            diagnostics: vec!["ERROR: nothing scraped".to_string()],
            timed_out: false,
            duration_ms: 20,
            outcome: Outcome::Failure,
        })
    }
}

fn task_with(runner: Arc<dyn ProgramRunner>, output_root: &std::path::Path, budget: u32) -> ScrapeTask {
    let config = TaskConfig {
        max_iterations: budget,
        output_root: output_root.to_path_buf(),
        ..Default::default()
    };
    ScrapeTask::with_agents(
        "https://example.com/catalog",
        config,
        Arc::new(FixedAnalyzer),
        Arc::new(FixedSynthesizer),
        Arc::new(spinneret_core::HeuristicAdvisor),
        runner,
    )
    .unwrap()
}

#[tokio::test]
async fn test_full_lifecycle_accepts_and_releases() {
    let dir = TempDir::new().unwrap();
    let mut task = task_with(Arc::new(PassingRunner), dir.path(), 3);

    let report = task.analyze().await.unwrap();
    assert_eq!(report.regions.len(), 2);

    task.set_fields(
        FieldSpec::new(vec![
            ("title".to_string(), FieldKind::Text),
            ("price".to_string(), FieldKind::Number),
        ])
        .unwrap(),
    )
    .unwrap();

    let loop_report = task.generate().await.unwrap();
    assert!(loop_report.accepted());
    assert_eq!(loop_report.iterations_used, 1);

    // Both artifacts land in the project directory.
    let root = task.project().unwrap().root().to_path_buf();
    assert!(root.join(ANALYSIS_FILE).exists());
    assert!(root.join(REPAIR_REPORT_FILE).exists());

    let result = task.run().await.unwrap();
    assert_eq!(result.records, 3);

    // The project reopens as accepted for later release runs.
    let (reopened, persisted) = open_accepted(&root).unwrap();
    assert_eq!(reopened.spider_name(), "example");
    assert!(persisted.accepted());
}

#[tokio::test]
async fn test_generate_before_analyze_is_not_ready() {
    let dir = TempDir::new().unwrap();
    let mut task = task_with(Arc::new(PassingRunner), dir.path(), 3);

    let err = task.generate().await.unwrap_err();
    assert!(matches!(err, SpinneretError::TaskNotReady(_)));
}

#[tokio::test]
async fn test_fields_derived_from_analysis_regions() {
    let dir = TempDir::new().unwrap();
    let mut task = task_with(Arc::new(PassingRunner), dir.path(), 3);

    task.analyze().await.unwrap();
    let derived = task.set_fields_from_analysis().unwrap();
    let names: Vec<&str> = derived.names().collect();
    assert_eq!(names, vec!["title", "price"]);
}

#[tokio::test]
async fn test_exhausted_task_cannot_release() {
    let dir = TempDir::new().unwrap();
    let mut task = task_with(Arc::new(FailingRunner), dir.path(), 2);

    task.analyze().await.unwrap();
    task.set_fields(FieldSpec::new(vec![("title".to_string(), FieldKind::Text)]).unwrap())
        .unwrap();

    let loop_report = task.generate().await.unwrap();
    assert!(!loop_report.accepted());
    assert_eq!(loop_report.iterations_used, 2);

    let err = task.run().await.unwrap_err();
    assert!(matches!(err, SpinneretError::TaskNotReady(_)));

    // Reopening for release is refused too.
    let root = task.project().unwrap().root().to_path_buf();
    let err = open_accepted(&root).unwrap_err();
    assert!(matches!(err, SpinneretError::TaskNotReady(_)));
}
