//! All API endpoint setup

use axum::Router;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;

use crate::storage::Storage;

pub use current_user::CurrentUser;
pub use current_user::JwtKeys;
pub use request::Form;
pub use request::PathParameters;
pub use request::QueryParameters;
pub use response::Error;
pub use response::Success;

mod appointments;
mod cron;
mod current_user;
mod notifications;
mod preferences;
mod request;
mod response;
mod users;

/// Get the Axum router for all API routes
pub fn router<S: Storage>() -> Router {
    let users = Router::new()
        .route("/token", post(users::token::<S>))
        .route("/", get(users::list::<S>).post(users::create::<S>))
        .route("/me", get(users::me::<S>))
        .route("/me/password", put(users::change_own_password::<S>))
        .route(
            "/me/preferences",
            get(preferences::single::<S>).put(preferences::update::<S>),
        )
        .route(
            "/{user}",
            get(users::single::<S>)
                .patch(users::update::<S>)
                .delete(users::delete::<S>),
        )
        .route("/{user}/password", put(users::change_password::<S>));

    let appointments = Router::new()
        .route(
            "/",
            get(appointments::list::<S>).post(appointments::create::<S>),
        )
        .route("/stats", get(appointments::stats::<S>))
        .route(
            "/{appointment}",
            get(appointments::single::<S>)
                .patch(appointments::update::<S>)
                .delete(appointments::delete::<S>),
        )
        .route(
            "/{appointment}/status",
            put(appointments::change_status::<S>),
        );

    let notifications = Router::new()
        .route("/", get(notifications::list::<S>))
        .route("/unread-count", get(notifications::unread_count::<S>))
        .route("/read-all", post(notifications::mark_all_read::<S>))
        .route("/{notification}/read", post(notifications::mark_read::<S>));

    let cron = Router::new().route(
        "/reminders",
        get(cron::reminders::<S>).post(cron::reminders::<S>),
    );

    Router::new()
        .nest("/users", users)
        .nest("/appointments", appointments)
        .nest("/notifications", notifications)
        .nest("/cron", cron)
}
