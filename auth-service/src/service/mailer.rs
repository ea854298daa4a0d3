//! # Email Delivery Collaborator
//!
//! The platform's only outbound channel, abstracted to a single
//! `send(message)` interface. Transport (SMTP, provider API, queue) is a
//! deployment concern behind the trait; the credential flows only care
//! that a message was accepted.

use async_trait::async_trait;
use shared::errors::ApiError;
use tracing::info;

/// An outbound email message.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery interface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), ApiError>;
}

/// Development mailer: logs the delivery instead of sending.
///
/// Never logs the body - reset links are secrets.
#[derive(Debug, Default)]
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), ApiError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "Email delivery (tracing mailer, not sent)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracing_mailer_accepts_messages() {
        let mailer = TracingMailer;
        let result = mailer
            .send(EmailMessage {
                to: "alice@t1.example".to_string(),
                subject: "Password reset".to_string(),
                body: "token".to_string(),
            })
            .await;
        assert!(result.is_ok());
    }
}
