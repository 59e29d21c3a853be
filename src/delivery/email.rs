use crate::config::SmtpConfig;
use crate::delivery::Mailer;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> AppResult<Self> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|error| AppError::Delivery(error.to_string()))?
            .credentials(credentials)
            .port(config.port)
            .build();
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|error| AppError::Delivery(format!("invalid sender address: {}", error)))?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let recipient: Mailbox = to
            .parse()
            .map_err(|error| AppError::Delivery(format!("invalid recipient '{}': {}", to, error)))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .body(body.to_string())
            .map_err(|error| AppError::Delivery(error.to_string()))?;
        self.transport
            .send(message)
            .await
            .map_err(|error| AppError::Delivery(error.to_string()))?;
        Ok(())
    }
}
