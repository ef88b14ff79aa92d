//! Correction directive synthesis from execution diagnostics.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::domain::{AnalysisReport, ExecutionResult, FieldSpec, GeneratedProgram};
use crate::llm::{LlmResult, ModelRole, OpenRouterClient};

/// Turns a test run's diagnostics into a directive for the next candidate.
#[async_trait]
pub trait RepairAdvisor: Send + Sync {
    async fn advise(
        &self,
        report: &AnalysisReport,
        fields: &FieldSpec,
        program: &GeneratedProgram,
        result: &ExecutionResult,
        history: &[ExecutionResult],
    ) -> LlmResult<String>;
}

/// Deterministic directive built from missing fields and error lines.
///
/// No network; also used as the test-time advisor.
#[derive(Debug, Default)]
pub struct HeuristicAdvisor;

impl HeuristicAdvisor {
    /// Render the directive text for one failed run.
    pub fn directive(fields: &FieldSpec, result: &ExecutionResult) -> String {
        let mut text = String::new();
        let _ = writeln!(
            text,
            "Previous candidate (generation {}) classified as {}: {} record(s), {:.0}% field coverage.",
            result.generation,
            result.outcome.as_str(),
            result.records,
            result.coverage * 100.0,
        );

        let missing = result.missing_fields(fields);
        if !missing.is_empty() {
            let _ = writeln!(
                text,
                "Fields never populated: {}. Locate selectors for these and add them to the yielded items.",
                missing.join(", ")
            );
        }

        if result.timed_out {
            let _ = writeln!(
                text,
                "The run hit its time budget; this is normal for long crawls and is not itself an error."
            );
        }

        if !result.diagnostics.is_empty() {
            let _ = writeln!(text, "Diagnostics from the run:");
            for line in &result.diagnostics {
                let _ = writeln!(text, "  {line}");
            }
        }

        if result.records == 0 {
            let _ = writeln!(
                text,
                "No records were scraped at all; re-check the start URL, selectors, and whether the data requires following links."
            );
        }

        text
    }
}

#[async_trait]
impl RepairAdvisor for HeuristicAdvisor {
    async fn advise(
        &self,
        _report: &AnalysisReport,
        fields: &FieldSpec,
        _program: &GeneratedProgram,
        result: &ExecutionResult,
        _history: &[ExecutionResult],
    ) -> LlmResult<String> {
        Ok(Self::directive(fields, result))
    }
}

const SYSTEM_PROMPT: &str = "\
You are an expert at debugging Scrapy spiders. You are given the spider \
source, the structured website analysis, the latest test run's result, and \
results of earlier attempts. Explain what went wrong and give concrete, \
actionable instructions for the next version.

Respond with a single JSON object, no surrounding text:
{\"recommendations\": \"<your instructions>\"}";

/// Advisor backed by the debugger model chain. The deterministic summary
/// from [`HeuristicAdvisor`] is prepended so specific missing fields always
/// reach the synthesizer even when the model waffles.
pub struct LlmAdvisor {
    llm: Arc<OpenRouterClient>,
}

#[derive(Debug, Deserialize)]
struct Directive {
    recommendations: String,
}

impl LlmAdvisor {
    pub fn new(llm: Arc<OpenRouterClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl RepairAdvisor for LlmAdvisor {
    async fn advise(
        &self,
        report: &AnalysisReport,
        fields: &FieldSpec,
        program: &GeneratedProgram,
        result: &ExecutionResult,
        history: &[ExecutionResult],
    ) -> LlmResult<String> {
        let context = json!({
            "analysis": report,
            "target_fields": fields,
            "spider_source": program.spider_source,
            "latest_result": result,
            "previous_results": history,
        });

        let directive: Directive = self
            .llm
            .complete(ModelRole::Debugger, SYSTEM_PROMPT, &context.to_string())
            .await?;

        Ok(format!(
            "{}\n{}",
            HeuristicAdvisor::directive(fields, result),
            directive.recommendations
        ))
    }
}
