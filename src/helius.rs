//! Upstream webhook provisioning client
//!
//! Thin typed client for the enhanced-transaction provider's webhook admin
//! API: which wallet addresses it watches and where it POSTs the batches.
//! Used only by the admin endpoints; the runtime pipeline never touches it.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::HeliusConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    #[serde(rename = "webhookID")]
    pub webhook_id: String,
    #[serde(rename = "webhookURL")]
    pub webhook_url: String,
    #[serde(rename = "transactionTypes", default)]
    pub transaction_types: Vec<String>,
    #[serde(rename = "accountAddresses", default)]
    pub account_addresses: Vec<String>,
    #[serde(rename = "webhookType", default)]
    pub webhook_type: String,
}

#[derive(Debug, Serialize)]
struct WebhookRequest {
    #[serde(rename = "webhookURL")]
    webhook_url: String,
    #[serde(rename = "transactionTypes")]
    transaction_types: Vec<String>,
    #[serde(rename = "accountAddresses")]
    account_addresses: Vec<String>,
    #[serde(rename = "webhookType")]
    webhook_type: String,
}

pub struct HeliusClient {
    client: Client,
    api_key: String,
    api_base: String,
    callback_url: String,
}

impl HeliusClient {
    pub fn new(config: &HeliusConfig) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            callback_url: config.webhook_callback_url.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<String> {
        anyhow::ensure!(!self.api_key.is_empty(), "HELIUS_API_KEY is not set");
        Ok(format!(
            "{}/v0/{}?api-key={}",
            self.api_base, path, self.api_key
        ))
    }

    pub async fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        let response = self
            .client
            .get(self.url("webhooks")?)
            .send()
            .await
            .context("Webhook list request failed")?;
        anyhow::ensure!(
            response.status().is_success(),
            "Provider returned {}",
            response.status()
        );
        Ok(response.json().await.context("Malformed webhook list")?)
    }

    pub async fn get_webhook(&self, id: &str) -> Result<Webhook> {
        let response = self
            .client
            .get(self.url(&format!("webhooks/{}", id))?)
            .send()
            .await
            .context("Webhook get request failed")?;
        anyhow::ensure!(
            response.status().is_success(),
            "Provider returned {}",
            response.status()
        );
        Ok(response.json().await.context("Malformed webhook")?)
    }

    /// Create the webhook for our callback URL, or replace the address list of
    /// the existing one.
    pub async fn create_or_update(&self, addresses: Vec<String>) -> Result<Webhook> {
        anyhow::ensure!(
            !self.callback_url.is_empty(),
            "WEBHOOK_CALLBACK_URL is not set"
        );

        let existing = self
            .list_webhooks()
            .await?
            .into_iter()
            .find(|w| w.webhook_url == self.callback_url);

        let request = WebhookRequest {
            webhook_url: self.callback_url.clone(),
            transaction_types: vec!["ANY".to_string()],
            account_addresses: addresses,
            webhook_type: "enhanced".to_string(),
        };

        match existing {
            Some(webhook) => self.edit(&webhook.webhook_id, &request).await,
            None => {
                let response = self
                    .client
                    .post(self.url("webhooks")?)
                    .json(&request)
                    .send()
                    .await
                    .context("Webhook create request failed")?;
                anyhow::ensure!(
                    response.status().is_success(),
                    "Provider returned {}",
                    response.status()
                );
                Ok(response.json().await.context("Malformed webhook")?)
            }
        }
    }

    /// Append addresses to a webhook's watch list (deduplicated).
    pub async fn add_addresses(&self, id: &str, addresses: &[String]) -> Result<Webhook> {
        let webhook = self.get_webhook(id).await?;
        let mut merged = webhook.account_addresses.clone();
        for addr in addresses {
            if !merged.iter().any(|a| a.eq_ignore_ascii_case(addr)) {
                merged.push(addr.clone());
            }
        }
        let request = WebhookRequest {
            webhook_url: webhook.webhook_url,
            transaction_types: webhook.transaction_types,
            account_addresses: merged,
            webhook_type: webhook.webhook_type,
        };
        self.edit(id, &request).await
    }

    /// Drop addresses from a webhook's watch list.
    pub async fn remove_addresses(&self, id: &str, addresses: &[String]) -> Result<Webhook> {
        let webhook = self.get_webhook(id).await?;
        let remaining = webhook
            .account_addresses
            .into_iter()
            .filter(|a| !addresses.iter().any(|r| r.eq_ignore_ascii_case(a)))
            .collect();
        let request = WebhookRequest {
            webhook_url: webhook.webhook_url,
            transaction_types: webhook.transaction_types,
            account_addresses: remaining,
            webhook_type: webhook.webhook_type,
        };
        self.edit(id, &request).await
    }

    pub async fn delete_webhook(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("webhooks/{}", id))?)
            .send()
            .await
            .context("Webhook delete request failed")?;
        anyhow::ensure!(
            response.status().is_success(),
            "Provider returned {}",
            response.status()
        );
        Ok(())
    }

    async fn edit(&self, id: &str, request: &WebhookRequest) -> Result<Webhook> {
        let response = self
            .client
            .put(self.url(&format!("webhooks/{}", id))?)
            .json(request)
            .send()
            .await
            .context("Webhook edit request failed")?;
        anyhow::ensure!(
            response.status().is_success(),
            "Provider returned {}",
            response.status()
        );
        Ok(response.json().await.context("Malformed webhook")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_wire_shape() {
        let raw = r#"{
            "webhookID": "id-1",
            "webhookURL": "https://example.com/webhook",
            "transactionTypes": ["ANY"],
            "accountAddresses": ["W1", "W2"],
            "webhookType": "enhanced"
        }"#;
        let webhook: Webhook = serde_json::from_str(raw).unwrap();
        assert_eq!(webhook.webhook_id, "id-1");
        assert_eq!(webhook.account_addresses, vec!["W1", "W2"]);
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let client = HeliusClient::new(&HeliusConfig {
            api_key: String::new(),
            webhook_callback_url: "https://example.com/webhook".to_string(),
            api_base: "https://api.helius.xyz".to_string(),
        })
        .unwrap();
        assert!(client.url("webhooks").is_err());
    }
}
