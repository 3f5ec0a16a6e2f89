//! Appointment API management

use axum::Extension;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::appointments::Appointment;
use crate::appointments::AppointmentStats;
use crate::appointments::AppointmentStatus;
use crate::appointments::Schedule;
use crate::notifications::ENTITY_TYPE_APPOINTMENT;
use crate::notifications::NotificationType;
use crate::preferences::ResolvedPreferences;
use crate::storage::AppointmentFilter;
use crate::storage::CreateAppointmentValues;
use crate::storage::CreateNotificationValues;
use crate::storage::Storage;
use crate::storage::UpdateAppointmentValues;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::PathParameters;
use super::QueryParameters;
use super::Success;
use super::request::nullable;
use super::request::parse_optional_text;
use super::request::parse_text;

const MAX_TITLE_LENGTH: usize = 255;
const MAX_LOCATION_LENGTH: usize = 255;
const MAX_DESCRIPTION_LENGTH: usize = 5000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    pub duration: i32,
    pub status: AppointmentStatus,
    pub reminder_sent: bool,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentResponse {
    fn from_appointment(appointment: Appointment) -> Self {
        Self {
            id: appointment.id,
            user_id: appointment.user_id,
            title: appointment.title,
            description: appointment.description,
            location: appointment.location,
            start_date_time: appointment.start_date_time,
            end_date_time: appointment.end_date_time,
            duration: appointment.duration,
            status: appointment.status,
            reminder_sent: appointment.reminder_sent,
            reminder_sent_at: appointment.reminder_sent_at,
            created_at: appointment.created_at,
            updated_at: appointment.updated_at,
        }
    }
}

/// Filters to list appointments
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Owner of the appointments, admins only
    user_id: Option<Uuid>,
    status: Option<AppointmentStatus>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// List appointments, ordered by start
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' \
///     'http://localhost:6000/api/appointments?status=SCHEDULED&from=2026-05-01T00:00:00Z'
/// ```
pub async fn list<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    QueryParameters(query): QueryParameters<ListQuery>,
) -> Result<Success<Vec<AppointmentResponse>>, Error> {
    let user_id = match query.user_id {
        Some(user_id) if user_id != current_user.id => {
            current_user.require_admin()?;
            user_id
        }
        _ => current_user.id,
    };

    let filter = AppointmentFilter {
        user_id,
        status: query.status,
        from: query.from,
        to: query.to,
    };

    let appointments = storage
        .find_appointments(&filter)
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::ok(
        appointments
            .into_iter()
            .map(AppointmentResponse::from_appointment)
            .collect(),
    ))
}

/// Appointment counts of the current user
pub async fn stats<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
) -> Result<Success<AppointmentStats>, Error> {
    let counts = storage
        .count_appointments_by_status(&current_user.id)
        .await
        .map_err(Error::internal_server_error)?;

    let upcoming = storage
        .count_upcoming_appointments(&current_user.id, Utc::now())
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::ok(AppointmentStats::from_counts(&counts, upcoming)))
}

pub async fn single<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    PathParameters(appointment_id): PathParameters<Uuid>,
) -> Result<Success<AppointmentResponse>, Error> {
    let appointment = fetch_appointment(&storage, &current_user, &appointment_id).await?;

    Ok(Success::ok(AppointmentResponse::from_appointment(
        appointment,
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentForm {
    title: String,
    description: Option<String>,
    location: Option<String>,
    start_date_time: DateTime<Utc>,

    /// Without an end (or duration) the default duration of the owner is used
    end_date_time: Option<DateTime<Utc>>,

    /// Minutes
    duration: Option<i32>,
}

/// Create an appointment for the current user
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "title": "Dentist", "startDateTime": "2026-05-05T14:30:00Z" }' \
///     http://localhost:6000/api/appointments
/// ```
pub async fn create<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    Form(form): Form<CreateAppointmentForm>,
) -> Result<Success<AppointmentResponse>, Error> {
    let title = parse_text("title", &form.title, MAX_TITLE_LENGTH)?;
    let description = parse_optional_text(
        "description",
        form.description.as_deref(),
        MAX_DESCRIPTION_LENGTH,
    )?;
    let location =
        parse_optional_text("location", form.location.as_deref(), MAX_LOCATION_LENGTH)?;

    let preferences = storage
        .find_preferences(&current_user.id)
        .await
        .map_err(Error::internal_server_error)?;
    let preferences = ResolvedPreferences::resolve(preferences.as_ref());

    let schedule = Schedule::resolve(
        form.start_date_time,
        form.end_date_time,
        form.duration,
        preferences.default_appointment_duration,
    )
    .map_err(Error::bad_request)?;

    let values = CreateAppointmentValues {
        user_id: &current_user.id,
        title: &title,
        description: description.as_deref(),
        location: location.as_deref(),
        schedule: &schedule,
    };

    let appointment = storage
        .create_appointment(&values)
        .await
        .map_err(Error::internal_server_error)?;

    tracing::debug!(
        "Appointment {} created for user {}",
        appointment.id,
        current_user.id
    );

    Ok(Success::created(AppointmentResponse::from_appointment(
        appointment,
    )))
}

/// Update appointment form
///
/// `description` and `location` can be cleared with `null`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppointmentForm {
    title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    location: Option<Option<String>>,
    start_date_time: Option<DateTime<Utc>>,
    end_date_time: Option<DateTime<Utc>>,
    duration: Option<i32>,
}

impl UpdateAppointmentForm {
    fn changes_schedule(&self) -> bool {
        self.start_date_time.is_some() || self.end_date_time.is_some() || self.duration.is_some()
    }
}

/// Update a scheduled appointment
///
/// Moving the start or end resets the reminder, the appointment will be reminded again
pub async fn update<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    PathParameters(appointment_id): PathParameters<Uuid>,
    Form(form): Form<UpdateAppointmentForm>,
) -> Result<Success<AppointmentResponse>, Error> {
    let appointment = fetch_appointment(&storage, &current_user, &appointment_id).await?;

    if appointment.status != AppointmentStatus::Scheduled {
        return Err(Error::bad_request(
            "Only scheduled appointments can be updated",
        ));
    }

    let title = form
        .title
        .as_deref()
        .map(|title| parse_text("title", title, MAX_TITLE_LENGTH))
        .transpose()?;
    let description = form
        .description
        .as_ref()
        .map(|description| {
            parse_optional_text("description", description.as_deref(), MAX_DESCRIPTION_LENGTH)
        })
        .transpose()?;
    let location = form
        .location
        .as_ref()
        .map(|location| parse_optional_text("location", location.as_deref(), MAX_LOCATION_LENGTH))
        .transpose()?;

    let schedule = if form.changes_schedule() {
        let current = appointment.schedule();

        // a new start without an end or duration keeps the current length
        let schedule = Schedule::resolve(
            form.start_date_time.unwrap_or(current.start),
            form.end_date_time,
            form.duration,
            appointment.duration,
        )
        .map_err(Error::bad_request)?;

        (schedule != current).then_some(schedule)
    } else {
        None
    };

    let values = UpdateAppointmentValues {
        title: title.as_deref(),
        description: description.as_ref().map(Option::as_deref),
        location: location.as_ref().map(Option::as_deref),
        schedule: schedule.as_ref(),
    };

    let updated_appointment = storage
        .update_appointment(&appointment, &values)
        .await
        .map_err(Error::internal_server_error)?;

    if schedule.is_some() {
        tracing::debug!(
            "Appointment {} rescheduled, reminder reset",
            appointment.id
        );
    }

    Ok(Success::ok(AppointmentResponse::from_appointment(
        updated_appointment,
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStatusForm {
    status: AppointmentStatus,
}

/// Move an appointment through its lifecycle
///
/// Cancelling notifies the owner in-app
///
/// Request:
/// ```sh
/// curl -v -XPUT -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "status": "CANCELLED" }' \
///     http://localhost:6000/api/appointments/<uuid>/status
/// ```
pub async fn change_status<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    PathParameters(appointment_id): PathParameters<Uuid>,
    Form(form): Form<ChangeStatusForm>,
) -> Result<Success<AppointmentResponse>, Error> {
    let appointment = fetch_appointment(&storage, &current_user, &appointment_id).await?;

    if appointment.status == form.status {
        return Ok(Success::ok(AppointmentResponse::from_appointment(
            appointment,
        )));
    }

    if !appointment.status.can_transition_to(form.status) {
        return Err(Error::bad_request(format!(
            "Can not change status from {:?} to {:?}",
            appointment.status, form.status
        )));
    }

    let updated_appointment = storage
        .change_appointment_status(&appointment, form.status)
        .await
        .map_err(Error::internal_server_error)?;

    if form.status == AppointmentStatus::Cancelled {
        let description = format!(
            "{} on {} has been cancelled",
            appointment.title,
            appointment.start_date_time.format("%A %-d %B %Y, %H:%M UTC")
        );

        let values = CreateNotificationValues {
            user_id: &appointment.user_id,
            title: "Appointment cancelled",
            description: &description,
            notification_type: NotificationType::AppointmentCancelled,
            entity: Some((ENTITY_TYPE_APPOINTMENT, &appointment.id)),
        };

        storage
            .create_notification(&values)
            .await
            .map_err(Error::internal_server_error)?;
    }

    tracing::debug!(
        "Appointment {} moved from {:?} to {:?}",
        appointment.id,
        appointment.status,
        updated_appointment.status
    );

    Ok(Success::ok(AppointmentResponse::from_appointment(
        updated_appointment,
    )))
}

pub async fn delete<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    PathParameters(appointment_id): PathParameters<Uuid>,
) -> Result<Success<()>, Error> {
    let appointment = fetch_appointment(&storage, &current_user, &appointment_id).await?;

    storage
        .delete_appointment(&appointment)
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::no_content())
}

/// Fetch an appointment the current user is allowed to see
async fn fetch_appointment<S: Storage>(
    storage: &S,
    current_user: &CurrentUser<S>,
    appointment_id: &Uuid,
) -> Result<Appointment, Error> {
    let appointment = storage
        .find_single_appointment_by_id(appointment_id)
        .await
        .map_err(Error::internal_server_error)?
        .ok_or_else(|| Error::not_found("Appointment not found"))?;

    current_user.require_owner_or_admin(&appointment.user_id)?;

    Ok(appointment)
}
