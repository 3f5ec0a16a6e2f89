//! Outgoing email
//!
//! The transport is picked once at startup and handed to whoever needs to send mail

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

pub use http_api::HttpMailer;
pub use logging::LogMailer;

use crate::config::MailConfig;

mod http_api;
mod logging;

/// Mail errors
#[derive(Debug, Error)]
pub enum Error {
    /// The mail API could not be reached or answered garbage
    #[error("Mail transport error: {0}")]
    Transport(String),

    /// The mail API refused the message
    #[error("Mail rejected with status {status}: {body}")]
    Rejected {
        /// Status code returned by the mail API
        status: StatusCode,

        /// Response body returned by the mail API
        body: String,
    },
}

/// Result type for all mail interactions
pub type Result<T> = core::result::Result<T, Error>;

/// A single outgoing email
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Anything that can deliver an [`Email`]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the email, returns the message ID given by the transport
    async fn send(&self, email: &Email) -> Result<String>;
}

/// Mailer shared between requests
pub type SharedMailer = Arc<dyn Mailer>;

/// Setup the mailer
///
/// Without a mail API configured messages are only logged
pub fn setup(config: Option<&MailConfig>) -> Result<SharedMailer> {
    if let Some(config) = config {
        tracing::info!("Sending mail through {}", config.api_url);

        Ok(Arc::new(HttpMailer::new(config)?))
    } else {
        tracing::warn!("`MAIL_API_URL` is not set, mail will only be logged");

        Ok(Arc::new(LogMailer))
    }
}
