use async_trait::async_trait;
use uuid::Uuid;

use super::Email;
use super::Mailer;
use super::Result;

/// Mailer that writes messages to the log instead of sending them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<String> {
        let message_id = Uuid::new_v4().to_string();

        tracing::info!(
            %message_id,
            to = %email.to,
            subject = %email.subject,
            "Not sending mail, no mail API configured"
        );
        tracing::debug!("{}", email.text);

        Ok(message_id)
    }
}
