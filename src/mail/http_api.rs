use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::config::MailConfig;

use super::Email;
use super::Error;
use super::Mailer;
use super::Result;

/// Give up on a single send after this long
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Mailer posting messages to a transactional email HTTP API
///
/// The API receives `{ from, to, subject, html, text }` as JSON with a bearer token and answers
/// with `{ id }`
pub struct HttpMailer {
    client: Client,
    api_url: Url,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

impl HttpMailer {
    /// Create the mailer, building the HTTP client up front
    pub fn new(config: &MailConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(transport_error)?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<String> {
        tracing::debug!("Sending \"{}\" to {}", email.subject, email.to);

        let response = self
            .client
            .post(self.api_url.clone())
            .bearer_auth(&self.api_key)
            .json(&SendRequest {
                from: &self.from,
                to: &email.to,
                subject: &email.subject,
                html: &email.html,
                text: &email.text,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Mail API refused message ({status}): {body}");

            return Err(Error::Rejected { status, body });
        }

        let SendResponse { id } = response.json().await.map_err(transport_error)?;

        Ok(id)
    }
}

/// Convert `reqwest` to mail transport error
fn transport_error(err: reqwest::Error) -> Error {
    Error::Transport(err.to_string())
}
