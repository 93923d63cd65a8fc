//! 📲 Pushover client
//!
//! Delivers one message to one user's push credential. Fan-out across
//! subscribers happens in the dispatcher; this client is deliberately dumb.

use anyhow::Result;
use reqwest::Client;
use std::time::Duration;

use crate::config::PushoverConfig;

const PUSHOVER_API: &str = "https://api.pushover.net/1/messages.json";

/// High priority, bypasses quiet hours on the device.
const PUSH_PRIORITY: &str = "1";

/// Distinctive sound so trade alerts stand out from ordinary notifications.
const PUSH_SOUND: &str = "cashregister";

pub struct PushoverClient {
    client: Client,
    app_token: String,
}

impl PushoverClient {
    pub fn new(config: &PushoverConfig) -> Result<Self> {
        Ok(PushoverClient {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            app_token: config.app_token.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.app_token.is_empty()
    }

    pub async fn send(&self, user_key: &str, title: &str, message: &str) -> Result<()> {
        let params = [
            ("token", self.app_token.as_str()),
            ("user", user_key),
            ("title", title),
            ("message", message),
            ("priority", PUSH_PRIORITY),
            ("sound", PUSH_SOUND),
        ];

        let response = self.client.post(PUSHOVER_API).form(&params).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Pushover API error: {}", error_text);
        }

        Ok(())
    }
}
