//! Website analysis: bounded page walk plus LLM structure extraction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::domain::{
    AnalysisReport, DataRegion, NavigationStrategy, Result, SpinneretError,
};
use crate::llm::{ModelRole, OpenRouterClient};

/// Produces one immutable [`AnalysisReport`] per task.
#[async_trait]
pub trait SiteAnalyzer: Send + Sync {
    async fn analyze(&self, start_url: &str) -> Result<AnalysisReport>;
}

/// Bounds for the page walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigatorConfig {
    /// Link-following depth from the start page.
    pub max_depth: usize,

    /// Pages analyzed per depth level.
    pub max_links: usize,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_links: 5,
        }
    }
}

const SYSTEM_PROMPT: &str = "\
You are analyzing a web page to plan a scraper. Identify the data-bearing \
regions, the navigation strategy, and in-site links worth visiting next.

Respond with a single JSON object, no surrounding text:
{
  \"title\": \"<page title>\",
  \"regions\": [{\"name\": \"...\", \"selector\": \"<css or xpath>\", \
\"sample_value\": \"...\", \"description\": \"...\"}],
  \"strategy\": {\"kind\": \"paginated\", \"selector\": \"...\"} \
or {\"kind\": \"infinite_scroll\"} or {\"kind\": \"static\"},
  \"notes\": [\"...\"],
  \"links_to_follow\": [\"<absolute or site-relative urls>\"]
}";

#[derive(Debug, Deserialize)]
struct PageSurvey {
    #[serde(default)]
    title: String,
    regions: Vec<DataRegion>,
    strategy: NavigationStrategy,
    #[serde(default)]
    notes: Vec<String>,
    #[serde(default)]
    links_to_follow: Vec<String>,
}

/// Analyzer that fetches pages over plain HTTP and hands the condensed
/// markup to the navigator model chain.
pub struct LlmNavigator {
    http: reqwest::Client,
    llm: Arc<OpenRouterClient>,
    config: NavigatorConfig,
}

impl LlmNavigator {
    pub fn new(llm: Arc<OpenRouterClient>, config: NavigatorConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            llm,
            config,
        }
    }

    async fn fetch(&self, url: &str) -> std::result::Result<String, reqwest::Error> {
        self.http
            .get(url)
            .header("User-Agent", "spinneret-navigator")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    async fn survey_page(&self, url: &str, html: &str) -> Result<PageSurvey> {
        let context = json!({
            "url": url,
            "page_source": condense_html(html),
        });
        let survey = self
            .llm
            .complete(ModelRole::Navigator, SYSTEM_PROMPT, &context.to_string())
            .await?;
        Ok(survey)
    }
}

#[async_trait]
impl SiteAnalyzer for LlmNavigator {
    async fn analyze(&self, start_url: &str) -> Result<AnalysisReport> {
        let base = reqwest::Url::parse(start_url)
            .map_err(|e| SpinneretError::Navigation(format!("invalid start url: {e}")))?;

        let mut queue = vec![start_url.to_string()];
        let mut visited: Vec<String> = Vec::new();
        let mut surveys: Vec<PageSurvey> = Vec::new();

        for _depth in 0..self.config.max_depth {
            let mut next_queue = Vec::new();

            for url in queue.into_iter().take(self.config.max_links) {
                if visited.contains(&url) {
                    continue;
                }

                info!(event = "navigator.visiting", url = %url);
                let html = match self.fetch(&url).await {
                    Ok(html) => html,
                    Err(e) => {
                        warn!(event = "navigator.fetch_failed", url = %url, error = %e);
                        continue;
                    }
                };

                let survey = self.survey_page(&url, &html).await?;
                visited.push(url);

                for link in &survey.links_to_follow {
                    if let Some(resolved) = resolve_in_site(&base, link) {
                        next_queue.push(resolved);
                    }
                }
                surveys.push(survey);
            }

            if next_queue.is_empty() {
                break;
            }
            queue = next_queue;
        }

        if surveys.is_empty() {
            return Err(SpinneretError::Navigation(format!(
                "no pages could be analyzed starting from {start_url}"
            )));
        }

        info!(event = "navigator.done", pages = surveys.len());
        Ok(merge_surveys(start_url, surveys, visited))
    }
}

/// Resolve a link against the start URL and keep it only when it stays on
/// the same host.
fn resolve_in_site(base: &reqwest::Url, link: &str) -> Option<String> {
    let resolved = base.join(link.trim()).ok()?;
    if resolved.host_str() == base.host_str() {
        Some(resolved.to_string())
    } else {
        None
    }
}

/// Fold per-page surveys into one site-level report. Regions dedupe by
/// name (first occurrence wins); the strategy is the first non-static one
/// observed.
fn merge_surveys(
    start_url: &str,
    surveys: Vec<PageSurvey>,
    visited: Vec<String>,
) -> AnalysisReport {
    let mut regions: Vec<DataRegion> = Vec::new();
    let mut notes = Vec::new();
    let mut strategy = NavigationStrategy::Static;
    let mut title = String::new();

    for survey in surveys {
        if title.is_empty() {
            title = survey.title;
        }
        if matches!(strategy, NavigationStrategy::Static) {
            strategy = survey.strategy;
        }
        for region in survey.regions {
            if !regions.iter().any(|r| r.name == region.name) {
                regions.push(region);
            }
        }
        notes.extend(survey.notes);
    }

    AnalysisReport {
        target_url: start_url.to_string(),
        title,
        regions,
        strategy,
        notes,
        visited,
        analyzed_at: Utc::now(),
    }
}

/// Drop script/style payloads and collapse blank runs so the prompt spends
/// its budget on markup that matters.
fn condense_html(html: &str) -> String {
    let stripped = strip_tag_blocks(html, "script");
    let stripped = strip_tag_blocks(&stripped, "style");

    let mut out = String::with_capacity(stripped.len());
    let mut last_blank = false;
    for line in stripped.lines() {
        let trimmed = line.trim_end();
        let blank = trimmed.trim().is_empty();
        if blank && last_blank {
            continue;
        }
        out.push_str(trimmed);
        out.push('\n');
        last_blank = blank;
    }
    out
}

fn strip_tag_blocks(html: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    loop {
        let Some(start) = find_ignore_case(rest, &open) else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..start]);
        match find_ignore_case(&rest[start..], &close) {
            Some(end) => rest = &rest[start + end + close.len()..],
            None => return out,
        }
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let haystack_lower = haystack.to_ascii_lowercase();
    haystack_lower.find(&needle.to_ascii_lowercase())
}
