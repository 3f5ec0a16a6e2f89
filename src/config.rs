//! Configuration
//!
//! Everything is read from the environment once, at startup

use std::net::SocketAddr;

use anyhow::Result;
use anyhow::bail;
use url::Url;

use crate::password::generate;
use crate::reminders::ReminderMode;
use crate::utils::env_var;
use crate::utils::env_var_or_else;
use crate::utils::parse_env_var;

const DEFAULT_ADDRESS: &str = "0.0.0.0:6000";
const DEFAULT_INITIAL_EMAIL: &str = "admin@localhost";
const DEFAULT_MAIL_FROM: &str = "Appointly <noreply@localhost>";
const DEFAULT_TEST_CRON_INTERVAL_MINUTES: i64 = 5;
const MAX_TEST_CRON_INTERVAL_MINUTES: i64 = 24 * 60;

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to listen on
    pub address: SocketAddr,

    /// Postgres connection string, memory storage is used without it
    pub database_url: Option<String>,

    /// Secret to sign access tokens with
    pub jwt_secret: String,

    /// Email of the admin created when there are no users
    pub initial_email: String,

    /// Password of the admin created when there are no users
    pub initial_password: String,

    /// Mail API settings, mail is only logged without it
    pub mail: Option<MailConfig>,

    /// Reminder job settings
    pub reminders: ReminderSettings,
}

/// Settings of the transactional email API
#[derive(Clone, Debug)]
pub struct MailConfig {
    /// Endpoint receiving the messages
    pub api_url: Url,

    /// Bearer token for the endpoint
    pub api_key: String,

    /// Sender address
    pub from: String,
}

/// Settings of the reminder job endpoint
#[derive(Clone, Debug)]
pub struct ReminderSettings {
    /// Normal or test invocation
    pub mode: ReminderMode,

    /// Shared secret the trigger has to present, no check without it
    pub cron_secret: Option<String>,
}

impl Config {
    /// Gather the configuration from the environment
    ///
    /// # Errors
    ///
    /// Will return `Err` when a variable is set to a value that does not parse
    pub fn from_env() -> Result<Self> {
        let mut address = env_var_or_else("ADDRESS", || DEFAULT_ADDRESS.to_string())
            .parse::<SocketAddr>()?;

        // optional override of just the port
        if let Some(port) = parse_env_var::<u16>("PORT")? {
            address.set_port(port);
        }

        let jwt_secret = env_var_or_else("JWT_SECRET", || {
            let jwt_secret = generate();
            tracing::info!("`JWT_SECRET` is not set, generating temporary one: {jwt_secret}");
            jwt_secret
        });

        let initial_email =
            env_var_or_else("INITIAL_EMAIL", || DEFAULT_INITIAL_EMAIL.to_string());

        let initial_password = env_var_or_else("INITIAL_PASSWORD", || {
            let initial_password = generate();
            tracing::info!(
                "`INITIAL_PASSWORD` not set, generating new password: {initial_password}"
            );
            initial_password
        });

        Ok(Self {
            address,
            database_url: env_var("DATABASE_URL"),
            jwt_secret,
            initial_email,
            initial_password,
            mail: MailConfig::from_env()?,
            reminders: ReminderSettings::from_env()?,
        })
    }
}

impl MailConfig {
    fn from_env() -> Result<Option<Self>> {
        let Some(api_url) = parse_env_var::<Url>("MAIL_API_URL")? else {
            return Ok(None);
        };

        let api_key = env_var("MAIL_API_KEY").unwrap_or_else(|| {
            tracing::warn!("`MAIL_API_KEY` not set, using empty value");
            String::new()
        });

        Ok(Some(Self {
            api_url,
            api_key,
            from: env_var_or_else("MAIL_FROM", || DEFAULT_MAIL_FROM.to_string()),
        }))
    }
}

impl ReminderSettings {
    fn from_env() -> Result<Self> {
        let mode = if let Some(recipient) = env_var("TEST_SEND_TO_MAIL") {
            let interval_minutes = check_test_interval(
                parse_env_var::<i64>("TEST_CRON_INTERVAL_MINUTES")?
                    .unwrap_or(DEFAULT_TEST_CRON_INTERVAL_MINUTES),
            )?;

            tracing::warn!(
                "Reminder job in test mode: {interval_minutes} minute window, all mail to {recipient}"
            );

            ReminderMode::Test {
                interval_minutes,
                recipient,
            }
        } else {
            ReminderMode::Normal
        };

        let check_enabled = parse_env_var::<bool>("ENABLE_CRON_SECRET_CHECK")?.unwrap_or(true);

        let cron_secret = if check_enabled {
            env_var("CRON_SECRET")
        } else {
            tracing::warn!("`ENABLE_CRON_SECRET_CHECK` is false, reminder job is open");
            None
        };

        Ok(Self { mode, cron_secret })
    }
}

/// Test windows span at least a minute and at most a day
fn check_test_interval(interval_minutes: i64) -> Result<i64> {
    if !(1..=MAX_TEST_CRON_INTERVAL_MINUTES).contains(&interval_minutes) {
        bail!(
            "`TEST_CRON_INTERVAL_MINUTES` must be between 1 and {MAX_TEST_CRON_INTERVAL_MINUTES}, got {interval_minutes}"
        );
    }

    Ok(interval_minutes)
}
