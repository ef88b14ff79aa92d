//! OpenRouter chat-completion client with per-role model fallback.
//!
//! Each agent role carries an ordered model chain; the client walks the
//! chain in order, retrying each model a bounded number of times with
//! exponential backoff before falling through to the next. Responses are
//! expected to be JSON (code fences tolerated) and are deserialized into
//! the caller's type.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Errors produced by the LLM layer. All are infrastructure faults.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("empty completion from {model}")]
    EmptyCompletion { model: String },

    #[error("malformed completion payload: {0}")]
    MalformedResponse(String),

    #[error("all models failed for role {role} after {attempts} attempt(s)")]
    AllModelsFailed { role: &'static str, attempts: u32 },
}

/// Result type for LLM operations.
pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Which agent is asking. Routes to a role-specific model chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Navigator,
    Generator,
    Debugger,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Navigator => "navigator",
            ModelRole::Generator => "generator",
            ModelRole::Debugger => "debugger",
        }
    }
}

/// One model in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Provider-qualified model id (e.g. `openai/gpt-4o-mini`).
    pub id: String,

    /// Context window in tokens; user content is truncated to fit.
    pub context_length: usize,

    /// Attempts per model before falling through to the next.
    pub max_retries: u32,
}

impl ModelProfile {
    pub fn new(id: impl Into<String>, context_length: usize, max_retries: u32) -> Self {
        Self {
            id: id.into(),
            context_length,
            max_retries,
        }
    }
}

/// Client configuration: endpoint, credentials, and per-role model chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,

    /// Sent as `HTTP-Referer` (OpenRouter attribution).
    pub referer: String,

    /// Sent as `X-Title`.
    pub title: String,

    pub navigator_models: Vec<ModelProfile>,
    pub generator_models: Vec<ModelProfile>,
    pub debugger_models: Vec<ModelProfile>,

    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl LlmConfig {
    /// Config with default model chains and the key taken from
    /// [`API_KEY_ENV`].
    pub fn from_env() -> LlmResult<Self> {
        let api_key =
            std::env::var(API_KEY_ENV).map_err(|_| LlmError::MissingApiKey(API_KEY_ENV))?;
        Ok(Self::with_api_key(api_key))
    }

    /// Config with default model chains and an explicit key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            referer: "https://github.com/spinneret-dev/spinneret".to_string(),
            title: "spinneret".to_string(),
            navigator_models: vec![
                ModelProfile::new("google/gemini-2.0-flash-exp:free", 1_000_000, 5),
                ModelProfile::new("openai/gpt-4o-mini", 128_000, 3),
                ModelProfile::new("meta-llama/llama-3.3-70b-instruct", 131_000, 3),
            ],
            generator_models: vec![
                ModelProfile::new("deepseek/deepseek-chat", 64_000, 3),
                ModelProfile::new("anthropic/claude-3.5-sonnet:beta", 200_000, 3),
                ModelProfile::new("openai/gpt-4o-2024-11-20", 128_000, 3),
            ],
            debugger_models: vec![
                ModelProfile::new("anthropic/claude-3.5-sonnet:beta", 200_000, 3),
                ModelProfile::new("openai/gpt-4o-mini", 128_000, 3),
            ],
            backoff_base_ms: 500,
        }
    }

    fn chain(&self, role: ModelRole) -> &[ModelProfile] {
        match role {
            ModelRole::Navigator => &self.navigator_models,
            ModelRole::Generator => &self.generator_models,
            ModelRole::Debugger => &self.debugger_models,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// OpenRouter chat-completion client.
pub struct OpenRouterClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl OpenRouterClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Ask the role's model chain for a JSON completion deserialized as `T`.
    ///
    /// Walks the chain in order; each model gets `max_retries` attempts with
    /// exponential backoff. Transport errors and malformed payloads are both
    /// retried. Errors only after the whole chain is exhausted.
    pub async fn complete<T: DeserializeOwned>(
        &self,
        role: ModelRole,
        system_prompt: &str,
        user_content: &str,
    ) -> LlmResult<T> {
        let mut total_attempts = 0u32;

        for model in self.config.chain(role) {
            let budget = char_budget(model.context_length, system_prompt);
            let content = truncate_to_budget(user_content, budget);

            for attempt in 1..=model.max_retries {
                total_attempts += 1;
                debug!(
                    event = "llm.request",
                    role = role.as_str(),
                    model = %model.id,
                    attempt = attempt,
                );

                match self.request_once::<T>(&model.id, system_prompt, &content).await {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        warn!(
                            event = "llm.attempt_failed",
                            role = role.as_str(),
                            model = %model.id,
                            attempt = attempt,
                            error = %err,
                        );
                        if attempt < model.max_retries {
                            let delay = self.config.backoff_base_ms * 2u64.pow(attempt - 1);
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                        }
                    }
                }
            }
        }

        Err(LlmError::AllModelsFailed {
            role: role.as_str(),
            attempts: total_attempts,
        })
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
    ) -> LlmResult<T> {
        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_content},
            ],
            "response_format": {"type": "json_object"},
        });

        let response: ChatResponse = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyCompletion {
                model: model.to_string(),
            })?;

        let cleaned = strip_code_fences(&content);
        serde_json::from_str(cleaned).map_err(|e| {
            LlmError::MalformedResponse(format!("{e} in completion from {model}"))
        })
    }
}

/// Approximate character budget for user content: ~4 chars per token, with
/// 20% of the window reserved for the system prompt and the response.
fn char_budget(context_length: usize, system_prompt: &str) -> usize {
    let window_chars = context_length.saturating_mul(4);
    let usable = window_chars.saturating_mul(4) / 5;
    usable.saturating_sub(system_prompt.len())
}

/// Truncate oversized content keeping the head and the tail, which is where
/// page structure and trailing data usually live.
fn truncate_to_budget(content: &str, budget: usize) -> String {
    if content.len() <= budget || budget == 0 {
        return content.to_string();
    }

    let marker = "\n...[truncated]...\n";
    let keep = budget.saturating_sub(marker.len());
    let head = keep * 3 / 4;
    let tail = keep - head;

    let head_end = floor_char_boundary(content, head);
    let tail_start = ceil_char_boundary(content, content.len() - tail);

    format!("{}{marker}{}", &content[..head_end], &content[tail_start..])
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Strip a surrounding markdown code fence, if present.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
