//! Spider code synthesis via the generator model chain.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::domain::{
    spider_name_from_url, AnalysisReport, FieldSpec, GeneratedProgram, RepairRequest,
};
use crate::llm::{LlmResult, ModelRole, OpenRouterClient};

/// Produces candidate programs, initially and on repair.
#[async_trait]
pub trait SpiderSynthesizer: Send + Sync {
    /// Synthesize a candidate. With `repair` absent this is the initial
    /// generation; with it present, the prior diagnostics must be
    /// incorporated and the generation index is prior + 1.
    async fn synthesize(
        &self,
        report: &AnalysisReport,
        fields: &FieldSpec,
        repair: Option<&RepairRequest>,
    ) -> LlmResult<GeneratedProgram>;
}

const SYSTEM_PROMPT: &str = "\
You are an expert at writing Scrapy spiders. Given a structured website \
analysis and a set of target fields, produce a complete, runnable spider.

Respond with a single JSON object, no surrounding text:
{
  \"spider_source\": \"<full content of the spider module>\",
  \"pipeline_source\": \"<full content of the pipelines module>\"
}

Requirements:
- use scrapy.Spider as the base class and implement parse()
- yield one dict per scraped item containing exactly the target fields
- handle pagination when the analysis indicates it
- when repair feedback is present, fix the reported problems; do not \
regress fields that already populate";

/// Synthesizer backed by the generator model chain.
pub struct LlmSynthesizer {
    llm: Arc<OpenRouterClient>,
}

#[derive(Debug, Deserialize)]
struct SynthesisPayload {
    spider_source: String,
    #[serde(default)]
    pipeline_source: String,
}

impl LlmSynthesizer {
    pub fn new(llm: Arc<OpenRouterClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl SpiderSynthesizer for LlmSynthesizer {
    async fn synthesize(
        &self,
        report: &AnalysisReport,
        fields: &FieldSpec,
        repair: Option<&RepairRequest>,
    ) -> LlmResult<GeneratedProgram> {
        let spider_name = spider_name_from_url(&report.target_url);

        let mut context = json!({
            "spider_name": spider_name,
            "analysis": report,
            "target_fields": fields,
        });
        if let Some(repair) = repair {
            context["repair"] = json!({
                "directive": repair.directive,
                "prior_spider_source": repair.prior.spider_source,
                "prior_result": repair.result,
            });
            info!(
                event = "synthesizer.repairing",
                prior_generation = repair.prior.generation,
            );
        } else {
            info!(event = "synthesizer.initial", spider = %spider_name);
        }

        let payload: SynthesisPayload = self
            .llm
            .complete(ModelRole::Generator, SYSTEM_PROMPT, &context.to_string())
            .await?;

        let program = match repair {
            Some(repair) => repair
                .prior
                .next(payload.spider_source, payload.pipeline_source),
            None => GeneratedProgram::initial(payload.spider_source, payload.pipeline_source),
        };

        info!(
            event = "synthesizer.candidate_ready",
            generation = program.generation,
            digest = program.short_digest(),
        );
        Ok(program)
    }
}
