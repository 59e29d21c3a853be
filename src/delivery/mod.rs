pub mod chat;
pub mod email;

use crate::errors::AppResult;
use async_trait::async_trait;

/// Email transport used for the report payload.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// Chat channel for the short execution alert.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn notify(&self, target: &str, text: &str) -> AppResult<()>;
}
