//! Structured event emission for the pipeline.
//!
//! Every significant transition emits one `info` event with an `event`
//! field, so a run can be reconstructed from logs alone. Field names are
//! stable; dashboards key on them.

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::ExecutionResult;

pub fn emit_task_started(run_id: Uuid, target_url: &str, budget: u32) {
    info!(
        event = "task.started",
        run_id = %run_id,
        target_url = target_url,
        budget = budget,
    );
}

pub fn emit_attempt_started(run_id: Uuid, iteration: u32, generation: u32) {
    info!(
        event = "repair.attempt_started",
        run_id = %run_id,
        iteration = iteration,
        generation = generation,
    );
}

pub fn emit_candidate_tested(run_id: Uuid, result: &ExecutionResult) {
    info!(
        event = "repair.candidate_tested",
        run_id = %run_id,
        generation = result.generation,
        outcome = result.outcome.as_str(),
        records = result.records,
        coverage = result.coverage,
        timed_out = result.timed_out,
        duration_ms = result.duration_ms,
    );
}

pub fn emit_candidate_accepted(run_id: Uuid, generation: u32, iterations_used: u32) {
    info!(
        event = "repair.candidate_accepted",
        run_id = %run_id,
        generation = generation,
        iterations_used = iterations_used,
    );
}

pub fn emit_budget_exhausted(run_id: Uuid, iterations_used: u32, last_outcome: &str) {
    warn!(
        event = "repair.budget_exhausted",
        run_id = %run_id,
        iterations_used = iterations_used,
        last_outcome = last_outcome,
    );
}

pub fn emit_task_aborted(run_id: Uuid, reason: &str) {
    error!(
        event = "task.aborted",
        run_id = %run_id,
        reason = reason,
    );
}

pub fn emit_release_finished(run_id: Uuid, result: &ExecutionResult) {
    info!(
        event = "release.finished",
        run_id = %run_id,
        records = result.records,
        coverage = result.coverage,
        duration_ms = result.duration_ms,
    );
}
