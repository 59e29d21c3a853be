use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("SOURCE_UNREADABLE: {0}")]
    SourceUnreadable(String),
    #[error("QUOTA_EXCEEDED: {0}")]
    QuotaExceeded(String),
    #[error("DELIVERY_FAILED: {0}")]
    Delivery(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<calamine::XlsxError> for AppError {
    fn from(value: calamine::XlsxError) -> Self {
        Self::SourceUnreadable(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
