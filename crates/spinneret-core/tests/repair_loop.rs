//! Repair loop behavior against scripted agents and runners.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use spinneret_core::sandbox::SandboxResult;
use spinneret_core::{
    AnalysisReport, ExecutionResult, FieldKind, FieldSpec, GeneratedProgram, HeuristicAdvisor,
    Outcome, ProgramRunner, ProjectWorkspace, RepairLoop, RepairRequest, SandboxError,
    SpiderSynthesizer, TaskConfig, Verdict,
};

fn fields() -> FieldSpec {
    FieldSpec::new(vec![
        ("title".to_string(), FieldKind::Text),
        ("price".to_string(), FieldKind::Number),
    ])
    .unwrap()
}

fn result_for(generation: u32, outcome: Outcome) -> ExecutionResult {
    let (records, coverage) = match outcome {
        Outcome::Success => (5, 1.0),
        Outcome::Partial => (2, 0.5),
        Outcome::Failure => (0, 0.0),
    };
    let mut field_population = BTreeMap::new();
    field_population.insert("title".to_string(), records);
    field_population.insert("price".to_string(), if coverage >= 1.0 { records } else { 0 });

    ExecutionResult {
        generation,
        exit_code: Some(0),
        records,
        field_population,
        coverage,
        diagnostics: if outcome == Outcome::Failure {
            vec!["ERROR: Spider error processing <GET /items>".to_string()]
        } else {
            vec![]
        },
        timed_out: false,
        duration_ms: 10,
        outcome,
    }
}

/// Runner that replays a scripted list of outcomes, one per call.
struct ScriptedRunner {
    script: Mutex<Vec<Outcome>>,
    calls: AtomicU32,
    /// When set, the first call fails before any outcome is consumed.
    fail_first_spawn: bool,
}

impl ScriptedRunner {
    fn new(script: Vec<Outcome>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicU32::new(0),
            fail_first_spawn: false,
        }
    }

    fn failing_spawn() -> Self {
        Self {
            script: Mutex::new(vec![]),
            calls: AtomicU32::new(0),
            fail_first_spawn: true,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgramRunner for ScriptedRunner {
    async fn run(
        &self,
        _project: &ProjectWorkspace,
        generation: u32,
        timeout: Option<Duration>,
    ) -> SandboxResult<ExecutionResult> {
        assert!(timeout.is_some(), "repair loop runs must carry a timeout");
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_first_spawn && call == 0 {
            return Err(SandboxError::EnvironmentUnavailable {
                reason: "scrapy not found".to_string(),
            });
        }

        let mut script = self.script.lock().unwrap();
        assert!(!script.is_empty(), "runner called more times than scripted");
        Ok(result_for(generation, script.remove(0)))
    }
}

/// Synthesizer that returns trivially different sources each generation and
/// counts how many repair syntheses it performed.
struct CountingSynthesizer {
    repair_calls: AtomicU32,
}

impl CountingSynthesizer {
    fn new() -> Self {
        Self {
            repair_calls: AtomicU32::new(0),
        }
    }

    fn repair_calls(&self) -> u32 {
        self.repair_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpiderSynthesizer for CountingSynthesizer {
    async fn synthesize(
        &self,
        _report: &AnalysisReport,
        _fields: &FieldSpec,
        repair: Option<&RepairRequest>,
    ) -> spinneret_core::llm::LlmResult<GeneratedProgram> {
        match repair {
            Some(request) => {
                self.repair_calls.fetch_add(1, Ordering::SeqCst);
                assert!(
                    !request.directive.is_empty(),
                    "repair synthesis must carry a directive"
                );
                Ok(request.prior.next(
                    format!("# spider v{}\n", request.prior.generation + 1),
                    "",
                ))
            }
            None => Ok(GeneratedProgram::initial("# spider v1\n", "")),
        }
    }
}

fn setup(script: Vec<Outcome>, budget: u32) -> (Arc<ScriptedRunner>, Arc<CountingSynthesizer>, RepairLoop, TempDir, ProjectWorkspace)
{
    let runner = Arc::new(ScriptedRunner::new(script));
    let synthesizer = Arc::new(CountingSynthesizer::new());
    let config = TaskConfig {
        max_iterations: budget,
        ..Default::default()
    };
    let repair_loop = RepairLoop::new(
        runner.clone(),
        synthesizer.clone(),
        Arc::new(HeuristicAdvisor),
        config,
    )
    .unwrap();

    let dir = TempDir::new().unwrap();
    let project = ProjectWorkspace::create(dir.path(), "https://example.com", fields()).unwrap();
    (runner, synthesizer, repair_loop, dir, project)
}

#[tokio::test]
async fn test_first_candidate_accepted_uses_one_iteration() {
    let (runner, synthesizer, repair_loop, _dir, mut project) =
        setup(vec![Outcome::Success], 10);

    let report = repair_loop
        .repair(
            Uuid::new_v4(),
            &mut project,
            &AnalysisReport::empty("https://example.com"),
            &fields(),
            GeneratedProgram::initial("# spider v1\n", ""),
        )
        .await
        .unwrap();

    assert_eq!(report.verdict, Verdict::Accepted);
    assert_eq!(report.iterations_used, 1);
    assert_eq!(report.history.len(), 1);
    assert_eq!(runner.calls(), 1);
    assert_eq!(synthesizer.repair_calls(), 0);
}

#[tokio::test]
async fn test_two_partials_then_success_accepts_third_candidate() {
    let (runner, synthesizer, repair_loop, _dir, mut project) = setup(
        vec![Outcome::Partial, Outcome::Partial, Outcome::Success],
        3,
    );

    let report = repair_loop
        .repair(
            Uuid::new_v4(),
            &mut project,
            &AnalysisReport::empty("https://example.com"),
            &fields(),
            GeneratedProgram::initial("# spider v1\n", ""),
        )
        .await
        .unwrap();

    assert_eq!(report.verdict, Verdict::Accepted);
    assert_eq!(report.iterations_used, 3);
    assert_eq!(report.final_program.generation, 3);
    assert_eq!(runner.calls(), 3);
    // Budget of 3 tests means at most 2 repair syntheses.
    assert_eq!(synthesizer.repair_calls(), 2);

    // History is append-only and ordered by generation.
    let generations: Vec<u32> = report.history.iter().map(|r| r.generation).collect();
    assert_eq!(generations, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_budget_exhaustion_keeps_last_result() {
    let (runner, synthesizer, repair_loop, _dir, mut project) =
        setup(vec![Outcome::Failure, Outcome::Failure], 2);

    let report = repair_loop
        .repair(
            Uuid::new_v4(),
            &mut project,
            &AnalysisReport::empty("https://example.com"),
            &fields(),
            GeneratedProgram::initial("# spider v1\n", ""),
        )
        .await
        .unwrap();

    assert_eq!(report.verdict, Verdict::Exhausted);
    assert_eq!(report.iterations_used, 2);
    assert_eq!(report.final_result.outcome, Outcome::Failure);
    assert_eq!(report.final_program.generation, 2);
    assert_eq!(runner.calls(), 2);
    // No synthesis after the final test; the budget is already spent.
    assert_eq!(synthesizer.repair_calls(), 1);
}

#[tokio::test]
async fn test_sandbox_unavailable_aborts_without_consuming_budget() {
    let runner = Arc::new(ScriptedRunner::failing_spawn());
    let synthesizer = Arc::new(CountingSynthesizer::new());
    let repair_loop = RepairLoop::new(
        runner.clone(),
        synthesizer.clone(),
        Arc::new(HeuristicAdvisor),
        TaskConfig::default(),
    )
    .unwrap();

    let dir = TempDir::new().unwrap();
    let mut project =
        ProjectWorkspace::create(dir.path(), "https://example.com", fields()).unwrap();

    let err = repair_loop
        .repair(
            Uuid::new_v4(),
            &mut project,
            &AnalysisReport::empty("https://example.com"),
            &fields(),
            GeneratedProgram::initial("# spider v1\n", ""),
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("scrapy not found"));
    assert_eq!(synthesizer.repair_calls(), 0);
}

#[tokio::test]
async fn test_loop_writes_each_candidate_before_testing() {
    let (_runner, _synthesizer, repair_loop, _dir, mut project) = setup(
        vec![Outcome::Partial, Outcome::Success],
        5,
    );

    repair_loop
        .repair(
            Uuid::new_v4(),
            &mut project,
            &AnalysisReport::empty("https://example.com"),
            &fields(),
            GeneratedProgram::initial("# spider v1\n", ""),
        )
        .await
        .unwrap();

    // The accepted candidate (generation 2) is the one left on disk.
    assert_eq!(project.current_generation(), 2);
    let spider = std::fs::read_to_string(
        project.root().join("example/spiders/example.py"),
    )
    .unwrap();
    assert_eq!(spider, "# spider v2\n");
}

#[tokio::test]
async fn test_zero_budget_is_rejected_at_construction() {
    let config = TaskConfig {
        max_iterations: 0,
        ..Default::default()
    };
    let result = RepairLoop::new(
        Arc::new(ScriptedRunner::new(vec![])),
        Arc::new(CountingSynthesizer::new()),
        Arc::new(HeuristicAdvisor),
        config,
    );
    assert!(result.is_err());
}
