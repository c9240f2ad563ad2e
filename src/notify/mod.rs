//! Outbound, best-effort notifications. Delivery failures are logged and
//! swallowed; nothing here may abort a trading cycle.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Telegram Bot API `sendMessage`.
pub struct TelegramNotifier {
    token: String,
    chat_id: String,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: String) -> Self {
        Self {
            token,
            chat_id,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
        });

        let result = self
            .client
            .post(&url)
            .timeout(SEND_TIMEOUT)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        if let Err(e) = result {
            warn!("Telegram notification error: {e}");
        }
    }
}

/// Stand-in when no channel is configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, message: &str) {
        debug!("notification suppressed: {message}");
    }
}
