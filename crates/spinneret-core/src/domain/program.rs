//! Generated program versions and repair requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::outcome::ExecutionResult;

/// A single generated-program version (one candidate).
///
/// Immutable: each repair iteration produces a fresh value with the
/// generation index bumped by exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedProgram {
    /// 1-based generation index, strictly increasing within a task.
    pub generation: u32,

    /// Spider source text.
    pub spider_source: String,

    /// Item pipeline / settings source text accompanying the spider.
    #[serde(default)]
    pub pipeline_source: String,

    /// Hex-encoded SHA-256 of both sources.
    pub digest: String,

    /// When this version was produced.
    pub created_at: DateTime<Utc>,
}

impl GeneratedProgram {
    /// First candidate for a task.
    pub fn initial(spider_source: impl Into<String>, pipeline_source: impl Into<String>) -> Self {
        Self::with_generation(1, spider_source, pipeline_source)
    }

    /// Candidate at an explicit generation index.
    pub fn with_generation(
        generation: u32,
        spider_source: impl Into<String>,
        pipeline_source: impl Into<String>,
    ) -> Self {
        let spider_source = spider_source.into();
        let pipeline_source = pipeline_source.into();
        let digest = source_digest(&spider_source, &pipeline_source);
        Self {
            generation,
            spider_source,
            pipeline_source,
            digest,
            created_at: Utc::now(),
        }
    }

    /// Successor version carrying new sources.
    pub fn next(&self, spider_source: impl Into<String>, pipeline_source: impl Into<String>) -> Self {
        Self::with_generation(self.generation + 1, spider_source, pipeline_source)
    }

    /// Short digest prefix for log lines.
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

fn source_digest(spider: &str, pipeline: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(spider.as_bytes());
    hasher.update([0u8]);
    hasher.update(pipeline.as_bytes());
    hex::encode(hasher.finalize())
}

/// Everything the synthesizer needs to produce a corrected candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRequest {
    /// The candidate that was just tested.
    pub prior: GeneratedProgram,

    /// Its execution result, diagnostics included.
    pub result: ExecutionResult,

    /// Correction directive derived from the diagnostics.
    pub directive: String,
}

/// Derive a spider name from a target URL.
///
/// Takes the second-to-last host label (drops the TLD), lowercases it and
/// replaces anything non-alphanumeric with underscores. Falls back to
/// `"spider"` when the URL has no usable host.
pub fn spider_name_from_url(url: &str) -> String {
    let host = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));

    let Some(host) = host else {
        return "spider".to_string();
    };

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let core = match labels.len() {
        0 => return "spider".to_string(),
        1 => labels[0],
        n => labels[n - 2],
    };

    let name: String = core
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if name.chars().all(|c| c == '_') {
        "spider".to_string()
    } else {
        name
    }
}
