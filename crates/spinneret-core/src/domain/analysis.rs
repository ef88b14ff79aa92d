//! Website analysis report produced by the navigator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A data-bearing region identified on the target site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRegion {
    /// Short name for the region (e.g. "listing_card").
    pub name: String,

    /// CSS selector or XPath locating the region.
    pub selector: String,

    /// Sample value extracted from the region, as seen in the page.
    #[serde(default)]
    pub sample_value: String,

    /// What the region represents.
    #[serde(default)]
    pub description: String,
}

/// How the site exposes more pages of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NavigationStrategy {
    /// Classic next-page links; `selector` locates the pagination control.
    Paginated { selector: String },

    /// Content loads as the viewport scrolls.
    InfiniteScroll,

    /// Everything of interest is on the pages already visited.
    Static,
}

/// Structured analysis of a target website.
///
/// Produced once per task by the navigator and immutable afterwards; the
/// synthesizer consumes it on every generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// URL the analysis started from.
    pub target_url: String,

    /// Title of the start page, when one could be extracted.
    #[serde(default)]
    pub title: String,

    /// Data regions found across the visited pages.
    pub regions: Vec<DataRegion>,

    /// Site-wide navigation strategy.
    pub strategy: NavigationStrategy,

    /// Free-form observations from the analysis.
    #[serde(default)]
    pub notes: Vec<String>,

    /// Pages actually visited while building this report.
    #[serde(default)]
    pub visited: Vec<String>,

    /// When the report was produced.
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisReport {
    /// Report with no regions, used as a placeholder for sites the
    /// navigator could not decompose.
    pub fn empty(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            title: String::new(),
            regions: Vec::new(),
            strategy: NavigationStrategy::Static,
            notes: Vec::new(),
            visited: Vec::new(),
            analyzed_at: Utc::now(),
        }
    }
}
