use crate::delivery::ChatNotifier;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde_json::json;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: bot_token.into(),
        }
    }
}

#[async_trait]
impl ChatNotifier for TelegramNotifier {
    async fn notify(&self, target: &str, text: &str) -> AppResult<()> {
        if self.bot_token.is_empty() {
            return Err(AppError::Delivery("chat bot token not configured".to_string()));
        }
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.bot_token);
        let payload = json!({
            "chat_id": target,
            "text": text,
            "parse_mode": "Markdown",
        });
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| AppError::Delivery(error.to_string()))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|error| AppError::Delivery(error.to_string()))?;
        if body.get("ok").and_then(serde_json::Value::as_bool) == Some(true) {
            Ok(())
        } else {
            Err(AppError::Delivery(
                "chat api did not acknowledge the message".to_string(),
            ))
        }
    }
}
