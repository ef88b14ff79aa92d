//! Execution results and outcome classification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::fields::FieldSpec;

/// Derived classification of one test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// All requested fields populated at or above the completeness
    /// threshold, zero fatal errors.
    Success,

    /// Records were produced but coverage fell short, or non-fatal
    /// diagnostics were present.
    Partial,

    /// No records at all.
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Failure => "failure",
        }
    }

    /// Whether this outcome should trigger another repair iteration.
    /// Partial runs retry exactly like failures.
    pub fn needs_repair(&self) -> bool {
        !matches!(self, Outcome::Success)
    }
}

/// Immutable record of one sandbox run of one program version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Generation index of the program this run executed (1:1).
    pub generation: u32,

    /// Child process exit code, if the process exited on its own.
    pub exit_code: Option<i32>,

    /// Number of output records produced.
    pub records: u64,

    /// Per requested field, how many records populated it.
    pub field_population: BTreeMap<String, u64>,

    /// Fraction of requested fields populated at least once (0.0..=1.0).
    pub coverage: f32,

    /// Extracted error lines and stack traces; a trailing timeout note is
    /// appended when the run was force-terminated.
    pub diagnostics: Vec<String>,

    /// Whether the run hit the wall-clock budget and was killed.
    pub timed_out: bool,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Derived classification.
    pub outcome: Outcome,
}

impl ExecutionResult {
    /// Requested fields that no record populated.
    pub fn missing_fields(&self, spec: &FieldSpec) -> Vec<String> {
        spec.names()
            .filter(|name| self.field_population.get(*name).copied().unwrap_or(0) == 0)
            .map(str::to_string)
            .collect()
    }
}

/// Coverage over a batch of scraped records.
///
/// A field counts as populated when at least one record carries a non-null,
/// non-empty value for it. Returns the per-field population counts and the
/// overall fraction; an empty spec trivially has full coverage.
pub fn field_coverage(
    records: &[serde_json::Value],
    spec: &FieldSpec,
) -> (BTreeMap<String, u64>, f32) {
    let mut population = BTreeMap::new();
    for name in spec.names() {
        population.insert(name.to_string(), 0u64);
    }

    for record in records {
        let Some(object) = record.as_object() else {
            continue;
        };
        for name in spec.names() {
            let populated = match object.get(name) {
                None => false,
                Some(serde_json::Value::Null) => false,
                Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
                Some(serde_json::Value::Array(a)) => !a.is_empty(),
                Some(_) => true,
            };
            if populated {
                if let Some(count) = population.get_mut(name) {
                    *count += 1;
                }
            }
        }
    }

    let coverage = if spec.is_empty() {
        1.0
    } else {
        let populated = population.values().filter(|&&count| count > 0).count();
        populated as f32 / spec.len() as f32
    };

    (population, coverage)
}

/// Classify a run from its observable effects.
///
/// `fatal_errors` is the count of extracted error diagnostics — a timeout
/// note is not fatal (test runs are routinely cut off mid-crawl).
pub fn classify_outcome(records: u64, coverage: f32, fatal_errors: usize, threshold: f32) -> Outcome {
    if records == 0 {
        Outcome::Failure
    } else if fatal_errors == 0 && coverage >= threshold {
        Outcome::Success
    } else {
        Outcome::Partial
    }
}
