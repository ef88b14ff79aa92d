//! Bounded test-and-repair loop.
//!
//! Drives candidates through test runs until one is accepted or the
//! iteration budget is spent. A budget of `n` tests at most `n` candidates
//! and makes at most `n - 1` repair syntheses; the initial candidate is
//! synthesized by the caller. Infrastructure faults (sandbox unavailable,
//! model chain exhausted) abort the loop as errors; a candidate that merely
//! scrapes badly is a normal state transition, not an error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::agents::{RepairAdvisor, SpiderSynthesizer};
use crate::config::TaskConfig;
use crate::domain::{
    AnalysisReport, ExecutionResult, FieldSpec, GeneratedProgram, RepairRequest, Result,
    SpinneretError,
};
use crate::obs;
use crate::sandbox::ProgramRunner;
use crate::workspace::ProjectWorkspace;

// ---------------------------------------------------------------------------
// States and reports
// ---------------------------------------------------------------------------

/// Loop phase, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Testing,
    Evaluating,
    Repairing,
    Accepted,
    Exhausted,
    Aborted,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Testing => "testing",
            LoopState::Evaluating => "evaluating",
            LoopState::Repairing => "repairing",
            LoopState::Accepted => "accepted",
            LoopState::Exhausted => "exhausted",
            LoopState::Aborted => "aborted",
        }
    }
}

/// How the loop ended when it ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// A candidate passed its test run.
    Accepted,
    /// The budget ran out; the last candidate and its result are kept for
    /// inspection.
    Exhausted,
}

/// Full account of one loop execution, persisted as a project artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    pub run_id: Uuid,
    pub verdict: Verdict,

    /// Candidate on disk when the loop stopped. Under `Accepted` this is
    /// the passing program; under `Exhausted`, the last attempt.
    pub final_program: GeneratedProgram,
    pub final_result: ExecutionResult,

    /// Test runs consumed, in order. Append-only while the loop runs.
    pub history: Vec<ExecutionResult>,

    pub iterations_used: u32,
}

impl RepairReport {
    pub fn accepted(&self) -> bool {
        self.verdict == Verdict::Accepted
    }
}

// ---------------------------------------------------------------------------
// The loop
// ---------------------------------------------------------------------------

/// Orchestrates runner, advisor and synthesizer over one task.
pub struct RepairLoop {
    runner: Arc<dyn ProgramRunner>,
    synthesizer: Arc<dyn SpiderSynthesizer>,
    advisor: Arc<dyn RepairAdvisor>,
    config: TaskConfig,
}

impl RepairLoop {
    pub fn new(
        runner: Arc<dyn ProgramRunner>,
        synthesizer: Arc<dyn SpiderSynthesizer>,
        advisor: Arc<dyn RepairAdvisor>,
        config: TaskConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            runner,
            synthesizer,
            advisor,
            config,
        })
    }

    /// Run the loop starting from an already-synthesized `initial` candidate.
    ///
    /// Each iteration writes the current candidate into the project, tests
    /// it under the configured timeout, and either accepts, repairs, or
    /// stops. Errors abort the loop; the project directory keeps the last
    /// written candidate and its logs for post-mortem.
    pub async fn repair(
        &self,
        run_id: Uuid,
        project: &mut ProjectWorkspace,
        report: &AnalysisReport,
        fields: &FieldSpec,
        initial: GeneratedProgram,
    ) -> Result<RepairReport> {
        match self.drive(run_id, project, report, fields, initial).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                obs::emit_task_aborted(run_id, &e.to_string());
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        run_id: Uuid,
        project: &mut ProjectWorkspace,
        report: &AnalysisReport,
        fields: &FieldSpec,
        initial: GeneratedProgram,
    ) -> Result<RepairReport> {
        let mut current = initial;
        let mut history: Vec<ExecutionResult> = Vec::new();

        for iteration in 1..=self.config.max_iterations {
            obs::emit_attempt_started(run_id, iteration, current.generation);
            debug!(state = LoopState::Testing.as_str(), iteration = iteration);

            project.write_program(&current)?;
            let result = self
                .runner
                .run(project, current.generation, Some(self.config.test_timeout()))
                .await?;

            debug!(state = LoopState::Evaluating.as_str(), iteration = iteration);
            obs::emit_candidate_tested(run_id, &result);
            history.push(result.clone());

            if !result.outcome.needs_repair() {
                obs::emit_candidate_accepted(run_id, current.generation, iteration);
                return Ok(RepairReport {
                    run_id,
                    verdict: Verdict::Accepted,
                    final_program: current,
                    final_result: result,
                    history,
                    iterations_used: iteration,
                });
            }

            if iteration == self.config.max_iterations {
                obs::emit_budget_exhausted(run_id, iteration, result.outcome.as_str());
                return Ok(RepairReport {
                    run_id,
                    verdict: Verdict::Exhausted,
                    final_program: current,
                    final_result: result,
                    history,
                    iterations_used: iteration,
                });
            }

            debug!(state = LoopState::Repairing.as_str(), iteration = iteration);
            let directive = self
                .advisor
                .advise(report, fields, &current, &result, &history[..history.len() - 1])
                .await?;

            let request = RepairRequest {
                prior: current.clone(),
                result,
                directive,
            };
            let next = self
                .synthesizer
                .synthesize(report, fields, Some(&request))
                .await?;

            if next.generation != current.generation + 1 {
                return Err(SpinneretError::VersionSkew {
                    expected: current.generation + 1,
                    actual: next.generation,
                });
            }
            current = next;
        }

        // max_iterations >= 1 is enforced by config validation, so the loop
        // body always returns.
        unreachable!("repair loop exited without a verdict")
    }
}
