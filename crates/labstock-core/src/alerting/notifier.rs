//! Notification delivery for low-stock alerts

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{Alert, NotificationChannel, Part};

/// Result of sending a notification
#[derive(Debug, Clone)]
pub struct NotificationResult {
    /// `slack` or `webhook`
    pub channel_type: String,
    /// Whether the channel accepted the message
    pub success: bool,
    /// Delivery error, if any
    pub error: Option<String>,
    /// When delivery was attempted
    pub sent_at: DateTime<Utc>,
}

/// Sends notifications through the configured channels.
///
/// Delivery failures are reported in the results and never bubble up as
/// errors; alert state does not depend on them.
pub struct NotificationSender {
    client: Client,
    channels: Vec<NotificationChannel>,
}

impl NotificationSender {
    /// Create a new notification sender
    pub fn new(channels: Vec<NotificationChannel>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, channels })
    }

    /// Whether any channel is configured
    pub fn is_enabled(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Notify every channel that a part has gone low
    pub async fn send_low_stock(&self, part: &Part, alert: &Alert) -> Vec<NotificationResult> {
        let message = Message {
            title: format!("Low Stock Alert: {}", part.name),
            text: alert.message.clone(),
            kind: "low_stock",
            parts: vec![PartLine::from(part)],
        };
        self.send_all(&message).await
    }

    /// Notify every channel with the list of parts currently low
    pub async fn send_summary(&self, parts: &[Part]) -> Vec<NotificationResult> {
        if parts.is_empty() {
            info!("No low stock parts, summary notification skipped");
            return Vec::new();
        }

        let text = parts
            .iter()
            .map(|p| {
                format!(
                    "{} (Part #{}) - In Stock: {}, Minimum Threshold: {}",
                    p.name, p.part_number, p.quantity_in_stock, p.minimum_stock_level
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let message = Message {
            title: "Inventory Alert Summary".to_string(),
            text,
            kind: "summary",
            parts: parts.iter().map(PartLine::from).collect(),
        };
        self.send_all(&message).await
    }

    async fn send_all(&self, message: &Message) -> Vec<NotificationResult> {
        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let sent_at = Utc::now();
            let result = match channel {
                NotificationChannel::Slack {
                    webhook_url,
                    channel: slack_channel,
                } => self.send_slack(webhook_url, slack_channel.as_deref(), message).await,
                NotificationChannel::Webhook { url, headers } => {
                    self.send_webhook(url, headers, message).await
                }
            };

            if let Err(e) = &result {
                warn!(channel = channel.kind(), error = %e, "Notification failed");
            }

            results.push(NotificationResult {
                channel_type: channel.kind().to_string(),
                success: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
                sent_at,
            });
        }

        results
    }

    /// Send Slack notification
    async fn send_slack(
        &self,
        webhook_url: &str,
        channel: Option<&str>,
        message: &Message,
    ) -> std::result::Result<(), NotificationError> {
        let payload = SlackPayload {
            channel: channel.map(String::from),
            username: Some("LabStock".to_string()),
            attachments: vec![SlackAttachment {
                color: "#ffc107".to_string(),
                title: message.title.clone(),
                text: message.text.clone(),
                footer: Some("LabStock Alerting".to_string()),
                ts: Some(Utc::now().timestamp()),
            }],
        };

        let response = self
            .client
            .post(webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::HttpError(format!(
                "Slack returned {}: {}",
                status, body
            )));
        }

        info!(kind = message.kind, "Slack notification sent");
        Ok(())
    }

    /// Send generic webhook notification
    async fn send_webhook(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        message: &Message,
    ) -> std::result::Result<(), NotificationError> {
        let payload = WebhookPayload {
            kind: message.kind,
            title: &message.title,
            message: &message.text,
            parts: &message.parts,
            sent_at: Utc::now(),
        };

        let mut request = self.client.post(url).json(&payload);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::HttpError(format!(
                "Webhook returned {}: {}",
                status, body
            )));
        }

        info!(kind = message.kind, url = %url, "Webhook notification sent");
        Ok(())
    }
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Request failed or the endpoint answered with a non-2xx status
    #[error("HTTP error: {0}")]
    HttpError(String),
}

struct Message {
    title: String,
    text: String,
    kind: &'static str,
    parts: Vec<PartLine>,
}

#[derive(Debug, Serialize)]
struct PartLine {
    part_number: String,
    name: String,
    quantity_in_stock: i32,
    minimum_stock_level: i32,
}

impl From<&Part> for PartLine {
    fn from(part: &Part) -> Self {
        Self {
            part_number: part.part_number.clone(),
            name: part.name.clone(),
            quantity_in_stock: part.quantity_in_stock,
            minimum_stock_level: part.minimum_stock_level,
        }
    }
}

// Slack payload types
#[derive(Debug, Serialize)]
struct SlackPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<i64>,
}

// Generic webhook payload
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    kind: &'static str,
    title: &'a str,
    message: &'a str,
    parts: &'a [PartLine],
    sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewAlert, NewPart};
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn low_part() -> Part {
        NewPart::new("FL-2", "Fluorescent filter", 1, 3).into_part(Uuid::new_v4(), Utc::now())
    }

    #[tokio::test]
    async fn test_webhook_receives_low_stock_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/stock"))
            .and(header("x-lab", "farlab"))
            .and(body_partial_json(serde_json::json!({
                "kind": "low_stock",
                "title": "Low Stock Alert: Fluorescent filter",
                "parts": [{"part_number": "FL-2", "quantity_in_stock": 1}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = NotificationSender::new(vec![NotificationChannel::Webhook {
            url: format!("{}/hooks/stock", server.uri()),
            headers: HashMap::from([("x-lab".to_string(), "farlab".to_string())]),
        }])
        .unwrap();

        let part = low_part();
        let alert = NewAlert::for_part(&part).into_alert(Uuid::new_v4(), Utc::now());
        let results = sender.send_low_stock(&part, &alert).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].success, "{:?}", results[0].error);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sender = NotificationSender::new(vec![NotificationChannel::Slack {
            webhook_url: server.uri(),
            channel: Some("#lab-ops".to_string()),
        }])
        .unwrap();

        let results = sender.send_summary(&[low_part()]).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].channel_type, "slack");
    }

    #[tokio::test]
    async fn test_empty_summary_sends_nothing() {
        let sender = NotificationSender::new(vec![NotificationChannel::Webhook {
            url: "http://127.0.0.1:9/unused".to_string(),
            headers: HashMap::new(),
        }])
        .unwrap();
        assert!(sender.send_summary(&[]).await.is_empty());
    }
}
