use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::{JudgeConfig, JudgeFailure, SemanticJudge};

const SYSTEM_PROMPT: &str =
    "You are an AI assistant that evaluates how well a resume matches a job description.";

const PROMPT_TEMPLATE: &str = "Rate the match between the following job description and the resume on a scale of 0 to 1:
Job Description:
{job_description}

Resume:
{resume}

Match Score (0-1):";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

fn build_user_prompt(job_text: &str, snippet: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{job_description}", job_text)
        .replace("{resume}", snippet)
}

/// Pull the score out of a completion body. The model is asked for a bare
/// number, so the first whitespace-separated token must parse as a float.
fn parse_score_body(body: &str) -> Result<f64, JudgeFailure> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| JudgeFailure::Malformed(e.to_string()))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| JudgeFailure::Malformed("empty choices array".into()))?;

    content
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .ok_or_else(|| JudgeFailure::Malformed(format!("not a number: {content:?}")))
}

fn is_retryable(failure: &JudgeFailure) -> bool {
    match failure {
        JudgeFailure::Transport(_) => true,
        JudgeFailure::Endpoint { status, .. } => *status == 429 || *status >= 500,
        JudgeFailure::Malformed(_) => false,
    }
}

/// Chat-completions backed judge. One invocation per candidate; invocations
/// are independent and bounded by the pipeline's concurrency limit.
pub struct LlmJudge {
    client: Client,
    config: JudgeConfig,
}

impl LlmJudge {
    pub fn new(config: JudgeConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    async fn request_once(&self, job_text: &str, snippet: &str) -> Result<f64, JudgeFailure> {
        let user_prompt = build_user_prompt(job_text, snippet);
        let payload = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: 0.2,
        };

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .json(&payload);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| JudgeFailure::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| JudgeFailure::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(JudgeFailure::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        parse_score_body(&body)
    }
}

#[async_trait]
impl SemanticJudge for LlmJudge {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn score(&self, job_text: &str, snippet: &str) -> Result<f64, JudgeFailure> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.request_once(job_text, snippet).await {
                Ok(score) => return Ok(score),
                Err(failure) => {
                    if attempt > self.config.max_retries || !is_retryable(&failure) {
                        return Err(failure);
                    }

                    let backoff = Duration::from_secs(
                        self.config.retry_backoff_secs.saturating_mul(attempt as u64),
                    );
                    warn!(
                        attempt,
                        error = %failure,
                        backoff_secs = backoff.as_secs(),
                        "judge request failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_body(content: &str) -> String {
        format!(r#"{{"choices":[{{"message":{{"role":"assistant","content":"{content}"}}}}]}}"#)
    }

    #[test]
    fn parses_bare_number_reply() {
        let score = parse_score_body(&chat_body("0.85")).expect("valid score");
        assert!((score - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_number_with_trailing_prose() {
        let score = parse_score_body(&chat_body("0.4 because the skills overlap")).unwrap();
        assert!((score - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn non_numeric_reply_is_malformed() {
        let err = parse_score_body(&chat_body("excellent match")).unwrap_err();
        assert!(matches!(err, JudgeFailure::Malformed(_)));
    }

    #[test]
    fn empty_choices_is_malformed() {
        let err = parse_score_body(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, JudgeFailure::Malformed(_)));
    }

    #[test]
    fn prompt_embeds_both_texts() {
        let prompt = build_user_prompt("rust engineer", "Dana, Skills: Rust");
        assert!(prompt.contains("Job Description:\nrust engineer"));
        assert!(prompt.contains("Resume:\nDana, Skills: Rust"));
        assert!(prompt.ends_with("Match Score (0-1):"));
    }

    #[test]
    fn malformed_responses_are_not_retried() {
        assert!(!is_retryable(&JudgeFailure::Malformed("nope".into())));
        assert!(is_retryable(&JudgeFailure::Transport("reset".into())));
        assert!(is_retryable(&JudgeFailure::Endpoint {
            status: 500,
            body: String::new()
        }));
        assert!(!is_retryable(&JudgeFailure::Endpoint {
            status: 400,
            body: String::new()
        }));
    }
}
