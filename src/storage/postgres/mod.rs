//! Postgres storage

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::appointments::Appointment;
use crate::appointments::AppointmentStatus;
use crate::appointments::REMINDER_SUPPRESSION_HOURS;
use crate::notifications::Notification;
use crate::preferences::Preferences;
use crate::reminders::ReminderWindow;
use crate::users::User;
use types::AppointmentStatusType;
use types::MIGRATOR;
use types::NotificationTypeType;
use types::SqlxAppointment;
use types::SqlxNotification;
use types::SqlxPreferences;
use types::SqlxUser;
use types::UserRoleType;

use super::AppointmentFilter;
use super::ChangePasswordValues;
use super::CreateAppointmentValues;
use super::CreateNotificationValues;
use super::CreateUserValues;
use super::Error;
use super::Result;
use super::Storage;
use super::UpdateAppointmentValues;
use super::UpdatePreferencesValues;
use super::UpdateUserValues;

mod types;

const USER_COLUMNS: &str = r"
    id,
    session_id,
    email,
    name,
    hashed_password,
    role,
    created_at,
    updated_at,
    deleted_at
";

const PREFERENCES_COLUMNS: &str = r"
    user_id,
    reminder_enabled,
    reminder_hours_before,
    email_reminders,
    in_app_reminders,
    default_appointment_duration,
    buffer_time,
    created_at,
    updated_at
";

const APPOINTMENT_COLUMNS: &str = r"
    id,
    user_id,
    title,
    description,
    location,
    start_date_time,
    end_date_time,
    duration,
    status,
    reminder_sent,
    reminder_sent_at,
    created_at,
    updated_at,
    deleted_at
";

const NOTIFICATION_COLUMNS: &str = r"
    id,
    user_id,
    title,
    description,
    type AS notification_type,
    entity_type,
    entity_id,
    read,
    read_at,
    created_at
";

/// Postgres storage
#[derive(Clone)]
pub struct Postgres {
    /// Pool of connections
    connection_pool: PgPool,
}

impl Postgres {
    /// Connect to Postgres and run the migrations
    ///
    /// # Errors
    ///
    /// Will return `Err` when the database can not be reached or a migration fails
    pub async fn connect(database_url: &str) -> Result<Self> {
        let connection_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
            .map_err(connection_error)?;

        Self::new_with_pool(connection_pool).await
    }

    /// Create Postgres storage with existing pool
    ///
    /// Migrations will be run
    ///
    /// # Errors
    ///
    /// Will return `Err` when a migration fails
    pub async fn new_with_pool(connection_pool: PgPool) -> Result<Self> {
        MIGRATOR
            .run(&connection_pool)
            .await
            .map_err(connection_error)?;

        Ok(Self { connection_pool })
    }

    async fn fetch_optional_user(&self, condition: &str, value: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, SqlxUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {condition} LIMIT 1"
        ))
        .bind(value)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(user.map(User::from_sqlx_user))
    }
}

#[async_trait]
impl Storage for Postgres {
    async fn find_any_single_user(&self) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, SqlxUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL LIMIT 1"
        ))
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(user.map(User::from_sqlx_user))
    }

    async fn find_all_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, SqlxUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at"
        ))
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(users.into_iter().map(User::from_sqlx_user).collect())
    }

    async fn find_single_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_optional_user("email = $1", email).await
    }

    async fn find_single_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, SqlxUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL AND id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(user.map(User::from_sqlx_user))
    }

    async fn create_user(&self, values: &CreateUserValues<'_>) -> Result<User> {
        let user = sqlx::query_as::<_, SqlxUser>(&format!(
            r"
            INSERT INTO users (id, session_id, email, name, hashed_password, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(Uuid::new_v4())
        .bind(values.session_id)
        .bind(values.email)
        .bind(values.name)
        .bind(values.hashed_password)
        .bind(UserRoleType::from_role(values.role))
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(User::from_sqlx_user(user))
    }

    async fn update_user(&self, user: &User, values: &UpdateUserValues<'_>) -> Result<User> {
        let user = sqlx::query_as::<_, SqlxUser>(&format!(
            r"
            UPDATE users
            SET name = $1, role = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(values.name.unwrap_or(&user.name))
        .bind(UserRoleType::from_role(values.role.unwrap_or(user.role)))
        .bind(user.id)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(User::from_sqlx_user(user))
    }

    async fn change_password(
        &self,
        user: &User,
        values: &ChangePasswordValues<'_>,
    ) -> Result<User> {
        let user = sqlx::query_as::<_, SqlxUser>(&format!(
            r"
            UPDATE users
            SET session_id = $1, hashed_password = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(values.session_id)
        .bind(values.hashed_password)
        .bind(user.id)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(User::from_sqlx_user(user))
    }

    async fn delete_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r"
            UPDATE users
            SET deleted_at = CURRENT_TIMESTAMP
            WHERE id = $1
            ",
        )
        .bind(user.id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn find_preferences(&self, user_id: &Uuid) -> Result<Option<Preferences>> {
        let preferences = sqlx::query_as::<_, SqlxPreferences>(&format!(
            "SELECT {PREFERENCES_COLUMNS} FROM user_preferences WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(preferences.map(Preferences::from_sqlx_preferences))
    }

    async fn upsert_preferences(
        &self,
        user_id: &Uuid,
        values: &UpdatePreferencesValues,
    ) -> Result<Preferences> {
        let preferences = sqlx::query_as::<_, SqlxPreferences>(&format!(
            r"
            INSERT INTO user_preferences (
                user_id,
                reminder_enabled,
                reminder_hours_before,
                email_reminders,
                in_app_reminders,
                default_appointment_duration,
                buffer_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                reminder_enabled = COALESCE(EXCLUDED.reminder_enabled, user_preferences.reminder_enabled),
                reminder_hours_before = COALESCE(EXCLUDED.reminder_hours_before, user_preferences.reminder_hours_before),
                email_reminders = COALESCE(EXCLUDED.email_reminders, user_preferences.email_reminders),
                in_app_reminders = COALESCE(EXCLUDED.in_app_reminders, user_preferences.in_app_reminders),
                default_appointment_duration = COALESCE(EXCLUDED.default_appointment_duration, user_preferences.default_appointment_duration),
                buffer_time = COALESCE(EXCLUDED.buffer_time, user_preferences.buffer_time),
                updated_at = CURRENT_TIMESTAMP
            RETURNING {PREFERENCES_COLUMNS}
            "
        ))
        .bind(user_id)
        .bind(values.reminder_enabled)
        .bind(values.reminder_hours_before)
        .bind(values.email_reminders)
        .bind(values.in_app_reminders)
        .bind(values.default_appointment_duration)
        .bind(values.buffer_time)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(Preferences::from_sqlx_preferences(preferences))
    }

    async fn find_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>> {
        let appointments = sqlx::query_as::<_, SqlxAppointment>(&format!(
            r"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointments
            WHERE deleted_at IS NULL
                AND user_id = $1
                AND ($2::appointment_status_type IS NULL OR status = $2)
                AND ($3::timestamptz IS NULL OR start_date_time >= $3)
                AND ($4::timestamptz IS NULL OR start_date_time < $4)
            ORDER BY start_date_time
            "
        ))
        .bind(filter.user_id)
        .bind(filter.status.map(AppointmentStatusType::from_status))
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(appointments
            .into_iter()
            .map(Appointment::from_sqlx_appointment)
            .collect())
    }

    async fn find_single_appointment_by_id(&self, id: &Uuid) -> Result<Option<Appointment>> {
        let appointment = sqlx::query_as::<_, SqlxAppointment>(&format!(
            r"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointments
            WHERE deleted_at IS NULL AND id = $1
            LIMIT 1
            "
        ))
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(appointment.map(Appointment::from_sqlx_appointment))
    }

    async fn create_appointment(
        &self,
        values: &CreateAppointmentValues<'_>,
    ) -> Result<Appointment> {
        let appointment = sqlx::query_as::<_, SqlxAppointment>(&format!(
            r"
            INSERT INTO appointments (
                id,
                user_id,
                title,
                description,
                location,
                start_date_time,
                end_date_time,
                duration
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {APPOINTMENT_COLUMNS}
            "
        ))
        .bind(Uuid::new_v4())
        .bind(values.user_id)
        .bind(values.title)
        .bind(values.description)
        .bind(values.location)
        .bind(values.schedule.start)
        .bind(values.schedule.end)
        .bind(values.schedule.duration_minutes())
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(Appointment::from_sqlx_appointment(appointment))
    }

    async fn update_appointment(
        &self,
        appointment: &Appointment,
        values: &UpdateAppointmentValues<'_>,
    ) -> Result<Appointment> {
        let schedule = values.schedule.copied().unwrap_or(appointment.schedule());
        let reschedule = values.schedule.is_some();

        let updated_appointment = sqlx::query_as::<_, SqlxAppointment>(&format!(
            r"
            UPDATE appointments
            SET title = $1,
                description = $2,
                location = $3,
                start_date_time = $4,
                end_date_time = $5,
                duration = $6,
                reminder_sent = CASE WHEN $7 THEN FALSE ELSE reminder_sent END,
                reminder_sent_at = CASE WHEN $7 THEN NULL ELSE reminder_sent_at END,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $8
            RETURNING {APPOINTMENT_COLUMNS}
            "
        ))
        .bind(values.title.unwrap_or(&appointment.title))
        .bind(
            values
                .description
                .unwrap_or(appointment.description.as_deref()),
        )
        .bind(values.location.unwrap_or(appointment.location.as_deref()))
        .bind(schedule.start)
        .bind(schedule.end)
        .bind(schedule.duration_minutes())
        .bind(reschedule)
        .bind(appointment.id)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(Appointment::from_sqlx_appointment(updated_appointment))
    }

    async fn change_appointment_status(
        &self,
        appointment: &Appointment,
        status: AppointmentStatus,
    ) -> Result<Appointment> {
        let updated_appointment = sqlx::query_as::<_, SqlxAppointment>(&format!(
            r"
            UPDATE appointments
            SET status = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2
            RETURNING {APPOINTMENT_COLUMNS}
            "
        ))
        .bind(AppointmentStatusType::from_status(status))
        .bind(appointment.id)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(Appointment::from_sqlx_appointment(updated_appointment))
    }

    async fn delete_appointment(&self, appointment: &Appointment) -> Result<()> {
        sqlx::query(
            r"
            UPDATE appointments
            SET deleted_at = CURRENT_TIMESTAMP
            WHERE id = $1
            ",
        )
        .bind(appointment.id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn count_appointments_by_status(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<(AppointmentStatus, i64)>> {
        let counts = sqlx::query_as::<_, (AppointmentStatusType, i64)>(
            r"
            SELECT status, COUNT(*)
            FROM appointments
            WHERE deleted_at IS NULL AND user_id = $1
            GROUP BY status
            ",
        )
        .bind(user_id)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(counts
            .into_iter()
            .map(|(status, count)| (status.to_status(), count))
            .collect())
    }

    async fn count_upcoming_appointments(
        &self,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r"
            SELECT COUNT(*)
            FROM appointments
            WHERE deleted_at IS NULL
                AND user_id = $1
                AND status = 'scheduled'
                AND start_date_time > $2
            ",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(count)
    }

    async fn find_reminder_candidates(
        &self,
        window: &ReminderWindow,
        include_reminded: bool,
    ) -> Result<Vec<Appointment>> {
        let appointments = sqlx::query_as::<_, SqlxAppointment>(&format!(
            r"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointments
            WHERE deleted_at IS NULL
                AND status = 'scheduled'
                AND start_date_time >= $1
                AND start_date_time < $2
                AND ($3 OR reminder_sent = FALSE)
            ORDER BY start_date_time
            "
        ))
        .bind(window.start)
        .bind(window.end)
        .bind(include_reminded)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(appointments
            .into_iter()
            .map(Appointment::from_sqlx_appointment)
            .collect())
    }

    async fn claim_reminder(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<bool> {
        let stale_before = now - chrono::Duration::hours(REMINDER_SUPPRESSION_HOURS);

        let result = sqlx::query(
            r"
            UPDATE appointments
            SET reminder_sent = TRUE, reminder_sent_at = $1
            WHERE id = $2
                AND deleted_at IS NULL
                AND status = 'scheduled'
                AND start_date_time = $4
                AND (reminder_sent = FALSE OR reminder_sent_at < $3)
            ",
        )
        .bind(now)
        .bind(appointment.id)
        .bind(stale_before)
        .bind(appointment.start_date_time)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_reminder(&self, appointment: &Appointment) -> Result<()> {
        sqlx::query(
            r"
            UPDATE appointments
            SET reminder_sent = FALSE, reminder_sent_at = NULL
            WHERE id = $1
            ",
        )
        .bind(appointment.id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn create_notification(
        &self,
        values: &CreateNotificationValues<'_>,
    ) -> Result<Notification> {
        let notification = sqlx::query_as::<_, SqlxNotification>(&format!(
            r"
            INSERT INTO notifications (id, user_id, title, description, type, entity_type, entity_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {NOTIFICATION_COLUMNS}
            "
        ))
        .bind(Uuid::new_v4())
        .bind(values.user_id)
        .bind(values.title)
        .bind(values.description)
        .bind(NotificationTypeType::from_notification_type(
            values.notification_type,
        ))
        .bind(values.entity.map(|(entity_type, _)| entity_type))
        .bind(values.entity.map(|(_, entity_id)| *entity_id))
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(Notification::from_sqlx_notification(notification))
    }

    async fn find_notifications(
        &self,
        user_id: &Uuid,
        only_unread: bool,
    ) -> Result<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, SqlxNotification>(&format!(
            r"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR read = FALSE)
            ORDER BY created_at DESC
            "
        ))
        .bind(user_id)
        .bind(only_unread)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(notifications
            .into_iter()
            .map(Notification::from_sqlx_notification)
            .collect())
    }

    async fn find_single_notification_by_id(
        &self,
        user_id: &Uuid,
        id: &Uuid,
    ) -> Result<Option<Notification>> {
        let notification = sqlx::query_as::<_, SqlxNotification>(&format!(
            r"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1 AND id = $2
            LIMIT 1
            "
        ))
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(notification.map(Notification::from_sqlx_notification))
    }

    async fn mark_notification_read(
        &self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Result<Notification> {
        let updated_notification = sqlx::query_as::<_, SqlxNotification>(&format!(
            r"
            UPDATE notifications
            SET read = TRUE, read_at = $1
            WHERE id = $2 AND read = FALSE
            RETURNING {NOTIFICATION_COLUMNS}
            "
        ))
        .bind(now)
        .bind(notification.id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        if let Some(updated_notification) = updated_notification {
            return Ok(Notification::from_sqlx_notification(updated_notification));
        }

        // already read, possibly by a concurrent request
        self.find_single_notification_by_id(&notification.user_id, &notification.id)
            .await?
            .ok_or_else(|| Error::Connection("Notification disappeared".to_string()))
    }

    async fn mark_all_notifications_read(
        &self,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE notifications
            SET read = TRUE, read_at = $1
            WHERE user_id = $2 AND read = FALSE
            ",
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(result.rows_affected())
    }

    async fn count_unread_notifications(&self, user_id: &Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r"
            SELECT COUNT(*)
            FROM notifications
            WHERE user_id = $1 AND read = FALSE
            ",
        )
        .bind(user_id)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(count)
    }
}

/// Convert `SQLx` to storage connection error
fn connection_error<E>(err: E) -> Error
where
    E: std::error::Error,
{
    Error::Connection(err.to_string())
}
