//! Preferences of the current user

use std::ops::RangeInclusive;

use axum::Extension;
use serde::Deserialize;

use crate::preferences::ResolvedPreferences;
use crate::storage::Storage;
use crate::storage::UpdatePreferencesValues;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::Success;

const REMINDER_HOURS_BEFORE_RANGE: RangeInclusive<i32> = 1..=168;
const DEFAULT_APPOINTMENT_DURATION_RANGE: RangeInclusive<i32> = 5..=1440;
const BUFFER_TIME_RANGE: RangeInclusive<i32> = 0..=240;

/// Get the preferences of the current user, defaults filled in
pub async fn single<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
) -> Result<Success<ResolvedPreferences>, Error> {
    let preferences = storage
        .find_preferences(&current_user.id)
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::ok(ResolvedPreferences::resolve(
        preferences.as_ref(),
    )))
}

/// Update preferences form, every field is optional
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesForm {
    reminder_enabled: Option<bool>,
    reminder_hours_before: Option<i32>,
    email_reminders: Option<bool>,
    in_app_reminders: Option<bool>,
    default_appointment_duration: Option<i32>,
    buffer_time: Option<i32>,
}

/// Update the preferences of the current user
///
/// Request:
/// ```sh
/// curl -v -XPUT -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "reminderHoursBefore": 2, "emailReminders": false }' \
///     http://localhost:6000/api/users/me/preferences
/// ```
pub async fn update<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    Form(form): Form<UpdatePreferencesForm>,
) -> Result<Success<ResolvedPreferences>, Error> {
    let values = UpdatePreferencesValues {
        reminder_enabled: form.reminder_enabled,
        reminder_hours_before: check_range(
            "reminderHoursBefore",
            form.reminder_hours_before,
            &REMINDER_HOURS_BEFORE_RANGE,
        )?,
        email_reminders: form.email_reminders,
        in_app_reminders: form.in_app_reminders,
        default_appointment_duration: check_range(
            "defaultAppointmentDuration",
            form.default_appointment_duration,
            &DEFAULT_APPOINTMENT_DURATION_RANGE,
        )?,
        buffer_time: check_range("bufferTime", form.buffer_time, &BUFFER_TIME_RANGE)?,
    };

    let preferences = storage
        .upsert_preferences(&current_user.id, &values)
        .await
        .map_err(Error::internal_server_error)?;

    tracing::debug!("Preferences of user {} updated: {values:?}", current_user.id);

    Ok(Success::ok(ResolvedPreferences::resolve(Some(
        &preferences,
    ))))
}

fn check_range(
    field: &str,
    value: Option<i32>,
    range: &RangeInclusive<i32>,
) -> Result<Option<i32>, Error> {
    match value {
        Some(value) if !range.contains(&value) => Err(Error::bad_request(format!(
            "`{field}` must be between {} and {}",
            range.start(),
            range.end()
        ))),
        value => Ok(value),
    }
}
