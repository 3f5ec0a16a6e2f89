#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
// easier to use when using the functions as callback of foreign functions
#![allow(clippy::needless_pass_by_value)]

use anyhow::Result;
use axum::Extension;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use crate::api::JwtKeys;
use crate::api::router;
use crate::config::Config;
use crate::mail::SharedMailer;
use crate::storage::Memory;
use crate::storage::Postgres;
use crate::storage::Storage;
use crate::users::ensure_initial_user;

mod api;
mod appointments;
mod config;
mod graceful_shutdown;
mod mail;
mod notifications;
mod password;
mod preferences;
mod reminders;
mod storage;
#[cfg(test)]
mod tests;
mod users;
mod utils;

const DEFAULT_RUST_LOG: &str = "appointly=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    setup_environment();
    setup_tracing();

    let config = Config::from_env()?;
    let mailer = mail::setup(config.mail.as_ref())?;

    let app = if let Some(database_url) = &config.database_url {
        tracing::info!("Using Postgres storage");

        setup_app(Postgres::connect(database_url).await?, &config, mailer).await?
    } else {
        tracing::warn!("`DATABASE_URL` is not set, using memory storage");

        setup_app(Memory::new(), &config, mailer).await?
    };

    let listener = TcpListener::bind(config.address).await?;
    tracing::info!("Listening on {}", config.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(graceful_shutdown::handler())
        .await?;

    Ok(())
}

/// Create and setup the app with its dependencies
///
/// # Errors
///
/// Will return `Err` when the initial user can not be created
pub async fn setup_app<S: Storage>(
    storage: S,
    config: &Config,
    mailer: SharedMailer,
) -> Result<Router> {
    ensure_initial_user(&storage, config).await?;

    Ok(create_router(storage, config, mailer))
}

/// Create the router for Appointly
fn create_router<S: Storage>(storage: S, config: &Config, mailer: SharedMailer) -> Router {
    let jwt_keys = JwtKeys::new(config.jwt_secret.as_bytes());

    Router::new()
        .nest("/api", router::<S>())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(storage))
        .layer(Extension(jwt_keys))
        .layer(Extension(mailer))
        .layer(Extension(config.reminders.clone()))
}

fn setup_environment() {
    dotenvy::dotenv().ok();
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.into()),
        ))
        .with(fmt::layer())
        .init();
}
