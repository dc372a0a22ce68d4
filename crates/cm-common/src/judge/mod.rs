pub mod llm_judge;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use llm_judge::LlmJudge;

#[derive(Debug, Error)]
pub enum JudgeFailure {
    #[error("judge request failed: {0}")]
    Transport(String),
    #[error("judge endpoint returned status {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error("judge response was not a score: {0}")]
    Malformed(String),
}

/// Scores how well one candidate snippet matches a job description text.
///
/// Results are bounded to [0, 1] by the caller via `clamp_score`; a failure
/// for one candidate degrades that candidate to 0.0 and never aborts the
/// surrounding ranking run.
#[async_trait]
pub trait SemanticJudge: Send + Sync {
    /// Implementation name ("llm", "disabled").
    fn name(&self) -> &'static str;

    async fn score(&self, job_text: &str, snippet: &str) -> Result<f64, JudgeFailure>;
}

/// Out-of-range and non-finite judge responses count as 0.0, not as the
/// nearest bound.
pub fn clamp_score(raw: f64) -> f64 {
    if raw.is_finite() && (0.0..=1.0).contains(&raw) {
        raw
    } else {
        0.0
    }
}

/// Judge that always scores 0.0. Used when `JUDGE_ENABLED` is off, which
/// makes the ranking purely vector-driven.
pub struct DisabledJudge;

#[async_trait]
impl SemanticJudge for DisabledJudge {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn score(&self, _job_text: &str, _snippet: &str) -> Result<f64, JudgeFailure> {
        Ok(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub enabled: bool,
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_secs: u64,
    pub concurrency: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            api_key: String::new(),
            timeout_secs: 30,
            max_retries: 3,
            retry_backoff_secs: 5,
            concurrency: 4,
        }
    }
}

impl JudgeConfig {
    /// Upper bound on one fully-retried scoring call: every attempt at the
    /// request timeout plus the backoff pauses between them. The pipeline
    /// uses this as its per-candidate deadline.
    pub fn call_budget_secs(&self) -> u64 {
        let attempts = u64::from(self.max_retries) + 1;
        let backoff: u64 = (1..=u64::from(self.max_retries))
            .map(|n| self.retry_backoff_secs.saturating_mul(n))
            .sum();
        self.timeout_secs
            .saturating_mul(attempts)
            .saturating_add(backoff)
    }

    pub fn from_env() -> Self {
        fn provider_defaults(provider: &str) -> (String, String) {
            match provider.to_ascii_lowercase().as_str() {
                "anthropic" => (
                    "claude-3-5-sonnet-20240620".into(),
                    "https://api.anthropic.com/v1/messages".into(),
                ),
                "mistral" => (
                    "mistral-large-latest".into(),
                    "https://api.mistral.ai/v1/chat/completions".into(),
                ),
                "xai" => (
                    "grok-2-latest".into(),
                    "https://api.x.ai/v1/chat/completions".into(),
                ),
                _ => (
                    "gpt-4o-mini".into(),
                    "https://api.openai.com/v1/chat/completions".into(),
                ),
            }
        }

        fn provider_api_key(provider: &str) -> Option<String> {
            match provider.to_ascii_lowercase().as_str() {
                "openai" => std::env::var("OPENAI_API_KEY").ok(),
                "anthropic" => std::env::var("ANTHROPIC_API_KEY").ok(),
                "mistral" => std::env::var("MISTRAL_API_KEY").ok(),
                "xai" => std::env::var("XAI_API_KEY").ok(),
                _ => None,
            }
        }

        fn parse_bool(key: &str, default: bool) -> bool {
            match std::env::var(key) {
                Ok(val) => matches!(val.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
                Err(_) => default,
            }
        }

        fn parse_u64(key: &str, default: u64) -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(default)
        }

        fn parse_u32(key: &str, default: u32) -> u32 {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse::<u32>().ok())
                .unwrap_or(default)
        }

        fn parse_usize(key: &str, default: usize) -> usize {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse::<usize>().ok())
                .unwrap_or(default)
        }

        let provider = std::env::var("JUDGE_PROVIDER").unwrap_or_else(|_| "openai".into());
        let (default_model, default_endpoint) = provider_defaults(&provider);

        let api_key = std::env::var("JUDGE_API_KEY")
            .ok()
            .or_else(|| provider_api_key(&provider))
            .unwrap_or_default();

        Self {
            enabled: parse_bool("JUDGE_ENABLED", true),
            provider,
            model: std::env::var("JUDGE_MODEL").unwrap_or(default_model),
            endpoint: std::env::var("JUDGE_ENDPOINT").unwrap_or(default_endpoint),
            api_key,
            timeout_secs: parse_u64("JUDGE_TIMEOUT_SECONDS", 30),
            max_retries: parse_u32("JUDGE_MAX_RETRIES", 3),
            retry_backoff_secs: parse_u64("JUDGE_RETRY_BACKOFF_SECONDS", 5),
            concurrency: parse_usize("JUDGE_CONCURRENCY", 4).max(1),
        }
    }
}

/// Judge factory. A disabled config or an unbuildable HTTP client yields the
/// 0.0-scoring judge instead of an error.
pub fn create_judge(config: JudgeConfig) -> Arc<dyn SemanticJudge> {
    if !config.enabled {
        return Arc::new(DisabledJudge);
    }

    match LlmJudge::new(config) {
        Ok(judge) => Arc::new(judge),
        Err(_) => Arc::new(DisabledJudge),
    }
}

pub fn judge_from_env() -> Arc<dyn SemanticJudge> {
    create_judge(JudgeConfig::from_env())
}
