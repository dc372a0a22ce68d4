use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::matching::ranker::RankedCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(NotificationStatus::Pending),
            "sent" => Some(NotificationStatus::Sent),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }
}

/// Summary text persisted with the notification row. Scores are formatted to
/// two decimals; an empty top list produces the manual-review message.
pub fn build_notification_content(job_description_id: i64, top: &[RankedCandidate]) -> String {
    if top.is_empty() {
        return format!(
            "No suitable matches found for Job ID: {job_description_id}. Please review manually."
        );
    }

    let mut content = format!(
        "Top {} Matches for Job ID: {}\n\n",
        top.len(),
        job_description_id
    );
    for candidate in top {
        content.push_str(&format!(
            "{}. {} | Score: {:.2}\n",
            candidate.rank, candidate.profile.name, candidate.hybrid_score
        ));
    }
    content
}

pub fn notification_subject(job_description_id: i64) -> String {
    format!("Match results for job {job_description_id}")
}

#[derive(Debug, Error)]
pub enum DeliveryFailure {
    #[error("delivery request failed: {0}")]
    Transport(String),
    #[error("delivery endpoint returned status {status}")]
    Endpoint { status: u16 },
}

/// Outbound delivery of a persisted notification. Delivery is best-effort:
/// the pipeline logs failures and never rolls anything back over them.
#[async_trait]
pub trait NotificationDelivery: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, recipient: &str, subject: &str, body: &str)
        -> Result<(), DeliveryFailure>;
}

/// Delivery that only writes a log line. Default when no webhook is
/// configured; keeps the persisted notification authoritative.
pub struct LogDelivery;

#[async_trait]
impl NotificationDelivery for LogDelivery {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), DeliveryFailure> {
        info!(recipient, subject, "notification delivery (log only)");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    recipient: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Delivery via an HTTP webhook (e.g. a mail relay).
pub struct WebhookDelivery {
    client: Client,
    url: String,
}

impl WebhookDelivery {
    pub fn new(url: String, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationDelivery for WebhookDelivery {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryFailure> {
        let payload = WebhookPayload {
            recipient,
            subject,
            body,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryFailure::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryFailure::Endpoint {
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
    pub default_recipient: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
            default_recipient: "recipient@example.com".into(),
        }
    }
}

impl NotifyConfig {
    pub fn from_env() -> Self {
        fn parse_u64(key: &str, default: u64) -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            timeout_secs: parse_u64("NOTIFY_TIMEOUT_SECONDS", defaults.timeout_secs),
            default_recipient: std::env::var("NOTIFY_DEFAULT_RECIPIENT")
                .unwrap_or(defaults.default_recipient),
        }
    }
}

/// Build the configured delivery backend. No webhook URL means log-only.
pub fn delivery_from_config(config: &NotifyConfig) -> Arc<dyn NotificationDelivery> {
    match &config.webhook_url {
        Some(url) => match WebhookDelivery::new(url.clone(), config.timeout_secs) {
            Ok(delivery) => Arc::new(delivery),
            Err(_) => Arc::new(LogDelivery),
        },
        None => Arc::new(LogDelivery),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConsultantProfile;

    fn ranked(rank: u32, name: &str, score: f64) -> RankedCandidate {
        RankedCandidate {
            profile: ConsultantProfile {
                id: rank as i64,
                name: name.into(),
                ..ConsultantProfile::default()
            },
            vector_score: score,
            judge_score: score,
            hybrid_score: score,
            rank,
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            NotificationStatus::Pending,
            NotificationStatus::Sent,
            NotificationStatus::Failed,
        ] {
            assert_eq!(NotificationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(NotificationStatus::parse("queued"), None);
    }

    #[test]
    fn content_lists_top_matches_with_two_decimal_scores() {
        let top = vec![
            ranked(1, "Dana", 0.91234),
            ranked(2, "Maya", 0.75),
            ranked(3, "Ravi", 0.705),
        ];

        let content = build_notification_content(17, &top);
        assert!(content.starts_with("Top 3 Matches for Job ID: 17\n\n"));
        assert!(content.contains("1. Dana | Score: 0.91\n"));
        assert!(content.contains("2. Maya | Score: 0.75\n"));
        assert!(content.contains("3. Ravi | Score: 0.70\n"));
    }

    #[test]
    fn content_header_counts_actual_entries() {
        let top = vec![ranked(1, "Dana", 0.9), ranked(2, "Maya", 0.8)];
        let content = build_notification_content(3, &top);
        assert!(content.starts_with("Top 2 Matches for Job ID: 3"));
    }

    #[test]
    fn empty_top_list_produces_manual_review_message() {
        let content = build_notification_content(99, &[]);
        assert_eq!(
            content,
            "No suitable matches found for Job ID: 99. Please review manually."
        );
    }

    #[tokio::test]
    async fn log_delivery_always_succeeds() {
        let delivery = LogDelivery;
        assert!(delivery.send("a@b.c", "subject", "body").await.is_ok());
    }

    #[test]
    fn missing_webhook_url_selects_log_delivery() {
        let config = NotifyConfig::default();
        assert_eq!(delivery_from_config(&config).name(), "log");

        let config = NotifyConfig {
            webhook_url: Some("http://localhost:9999/notify".into()),
            ..NotifyConfig::default()
        };
        assert_eq!(delivery_from_config(&config).name(), "webhook");
    }
}
