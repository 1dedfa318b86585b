//! Webhook notifications for bid outcomes
//!
//! Display boundary: each submission outcome is handed here. Delivery is
//! fire-and-forget; failures are logged and never affect the bid.

use crate::types::BidOutcome;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info};

#[derive(Clone)]
pub struct Notifier {
    client: Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    /// Emit one bid outcome. Logs always; posts the webhook when configured.
    pub async fn notify(&self, outcome: &BidOutcome) {
        info!("{}", outcome);

        let Some(url) = &self.webhook_url else {
            return;
        };

        let color = if outcome.accepted { 0x00FF00 } else { 0xFF0000 };
        let embed = json!({
            "embeds": [{
                "title": if outcome.accepted { "Bid placed" } else { "Bid failed" },
                "description": outcome.title,
                "color": color,
                "fields": [
                    {
                        "name": "Project",
                        "value": outcome.project_id.to_string(),
                        "inline": true
                    },
                    {
                        "name": "Amount",
                        "value": format!("{}", outcome.amount),
                        "inline": true
                    },
                    {
                        "name": "Period",
                        "value": format!("{}d", outcome.period),
                        "inline": true
                    },
                    {
                        "name": "Result",
                        "value": outcome.message.clone().unwrap_or_else(|| "accepted".to_string()),
                        "inline": false
                    }
                ],
                "timestamp": chrono::Utc::now().to_rfc3339()
            }]
        });

        match self.client.post(url).json(&embed).send().await {
            Ok(response) => {
                if !response.status().is_success() {
                    error!("Outcome webhook failed: {}", response.status());
                }
            }
            Err(e) => {
                error!("Failed to send outcome webhook: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn outcome(accepted: bool) -> BidOutcome {
        BidOutcome {
            project_id: 12,
            title: "Build a thing".to_string(),
            amount: dec!(150),
            period: 7,
            accepted,
            message: if accepted { None } else { Some("nope".to_string()) },
        }
    }

    #[tokio::test]
    async fn test_posts_embed_when_configured() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"embeds":[{"title":"Bid placed"}]}"#.to_string(),
            ))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let notifier = Notifier::new(Some(format!("{}/hook", server.url())));
        notifier.notify(&outcome(true)).await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_silent_without_webhook() {
        // Log-only path must not panic or block
        let notifier = Notifier::new(None);
        notifier.notify(&outcome(false)).await;
    }
}
