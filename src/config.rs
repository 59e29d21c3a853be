use crate::errors::{AppError, AppResult};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub send_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub smtp: SmtpConfig,
    pub telegram_bot_token: Option<String>,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let port_raw = env::var("SMTP_PORT").unwrap_or_else(|_| DEFAULT_SMTP_PORT.to_string());
        let port: u16 = port_raw
            .parse()
            .map_err(|_| AppError::Internal(format!("invalid SMTP_PORT '{}'", port_raw)))?;

        let timeout_raw = env::var("SMTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_SEND_TIMEOUT_SECS.to_string());
        let timeout_secs: u64 = timeout_raw
            .parse()
            .map_err(|_| AppError::Internal(format!("invalid SMTP_TIMEOUT_SECS '{}'", timeout_raw)))?;

        let username = env::var("EMAIL_USER").unwrap_or_default();
        // App passwords are often pasted with grouping spaces.
        let password = env::var("EMAIL_PASS").unwrap_or_default().replace(' ', "");
        let from = env::var("EMAIL_FROM").unwrap_or_else(|_| username.clone());

        Ok(Self {
            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("sheetwatch.db")),
            log_dir: env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),
            smtp: SmtpConfig {
                host: env::var("SMTP_SERVER").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
                port,
                username,
                password,
                from,
                send_timeout: Duration::from_secs(timeout_secs),
            },
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
        })
    }
}
