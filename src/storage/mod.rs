//! All things related to the storage of users, appointments and notifications

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::appointments::Appointment;
use crate::appointments::AppointmentStatus;
use crate::appointments::Schedule;
use crate::notifications::Notification;
use crate::notifications::NotificationType;
use crate::preferences::Preferences;
use crate::reminders::ReminderWindow;
use crate::users::Role;
use crate::users::User;

pub use memory::Memory;
pub use postgres::Postgres;

mod memory;
mod postgres;

/// Storage errors
#[derive(Debug, Error)]
pub enum Error {
    /// A connection error with the storage
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for all storage interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Values to create a User
pub struct CreateUserValues<'a> {
    /// The initial session ID for the user
    pub session_id: &'a Uuid,

    /// The role of the user
    pub role: Role,

    /// Email address, also used to log in
    pub email: &'a str,

    /// Display name
    pub name: &'a str,

    /// The hashed password
    pub hashed_password: &'a str,
}

/// Values to update a User
pub struct UpdateUserValues<'a> {
    /// New (optional) display name
    pub name: Option<&'a str>,

    /// New (optional) role
    pub role: Option<Role>,
}

/// Values to change a password of a user
pub struct ChangePasswordValues<'a> {
    /// New session ID to invalidate current tokens
    pub session_id: &'a Uuid,

    /// The new hashed password
    pub hashed_password: &'a str,
}

/// Values to create or change the preferences of a user
///
/// Fields left at `None` keep their stored value
#[derive(Debug, Default)]
pub struct UpdatePreferencesValues {
    pub reminder_enabled: Option<bool>,
    pub reminder_hours_before: Option<i32>,
    pub email_reminders: Option<bool>,
    pub in_app_reminders: Option<bool>,
    pub default_appointment_duration: Option<i32>,
    pub buffer_time: Option<i32>,
}

/// Values to create an Appointment
pub struct CreateAppointmentValues<'a> {
    /// Owner of the appointment
    pub user_id: &'a Uuid,

    pub title: &'a str,

    pub description: Option<&'a str>,

    pub location: Option<&'a str>,

    /// Validated start and end
    pub schedule: &'a Schedule,
}

/// Values to update an Appointment
pub struct UpdateAppointmentValues<'a> {
    pub title: Option<&'a str>,

    /// `Some(None)` clears the description
    pub description: Option<Option<&'a str>>,

    /// `Some(None)` clears the location
    pub location: Option<Option<&'a str>>,

    /// A new schedule resets the reminder bookkeeping
    pub schedule: Option<&'a Schedule>,
}

/// Filter to list appointments of a user
#[derive(Debug)]
pub struct AppointmentFilter {
    /// Owner of the appointments
    pub user_id: Uuid,

    pub status: Option<AppointmentStatus>,

    /// Inclusive lower bound on the start
    pub from: Option<DateTime<Utc>>,

    /// Exclusive upper bound on the start
    pub to: Option<DateTime<Utc>>,
}

/// Values to create a Notification
pub struct CreateNotificationValues<'a> {
    pub user_id: &'a Uuid,

    pub title: &'a str,

    pub description: &'a str,

    pub notification_type: NotificationType,

    /// Entity the notification refers to, as `(type, id)`
    pub entity: Option<(&'a str, &'a Uuid)>,
}

/// Storage with all supported operations
#[async_trait]
pub trait Storage: Clone + Send + Sync + 'static {
    /// Find any single user
    ///
    /// Respects the soft-delete
    async fn find_any_single_user(&self) -> Result<Option<User>>;

    /// Finds all users
    ///
    /// Respects the soft-delete
    async fn find_all_users(&self) -> Result<Vec<User>>;

    /// Finds a single user by its email address
    ///
    /// DOES NOT respect the soft-delete, handle with care
    async fn find_single_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Finds a single user by its ID
    ///
    /// Respects the soft-delete
    async fn find_single_user_by_id(&self, id: &Uuid) -> Result<Option<User>>;

    /// Create a single user
    async fn create_user(&self, values: &CreateUserValues<'_>) -> Result<User>;

    /// Update the name and/or role of a user
    async fn update_user(&self, user: &User, values: &UpdateUserValues<'_>) -> Result<User>;

    /// Change the password of a user
    async fn change_password(
        &self,
        user: &User,
        values: &ChangePasswordValues<'_>,
    ) -> Result<User>;

    /// Soft-delete a user
    async fn delete_user(&self, user: &User) -> Result<()>;

    /// Find the stored preferences of a user, if any were ever saved
    async fn find_preferences(&self, user_id: &Uuid) -> Result<Option<Preferences>>;

    /// Create or update the preferences of a user
    async fn upsert_preferences(
        &self,
        user_id: &Uuid,
        values: &UpdatePreferencesValues,
    ) -> Result<Preferences>;

    /// Find appointments of a user, ordered by start
    ///
    /// Respects the soft-delete
    async fn find_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>>;

    /// Find a single appointment by ID
    ///
    /// Respects the soft-delete
    async fn find_single_appointment_by_id(&self, id: &Uuid) -> Result<Option<Appointment>>;

    /// Create an appointment in the `Scheduled` status
    async fn create_appointment(&self, values: &CreateAppointmentValues<'_>)
    -> Result<Appointment>;

    /// Update an appointment
    async fn update_appointment(
        &self,
        appointment: &Appointment,
        values: &UpdateAppointmentValues<'_>,
    ) -> Result<Appointment>;

    /// Change the status of an appointment
    async fn change_appointment_status(
        &self,
        appointment: &Appointment,
        status: AppointmentStatus,
    ) -> Result<Appointment>;

    /// Soft-delete an appointment
    async fn delete_appointment(&self, appointment: &Appointment) -> Result<()>;

    /// Count the appointments of a user per status
    ///
    /// Respects the soft-delete
    async fn count_appointments_by_status(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<(AppointmentStatus, i64)>>;

    /// Count the scheduled appointments of a user starting after `now`
    ///
    /// Respects the soft-delete
    async fn count_upcoming_appointments(&self, user_id: &Uuid, now: DateTime<Utc>)
    -> Result<i64>;

    /// Find scheduled appointments starting inside the window, ordered by start
    ///
    /// Already reminded appointments are only included with `include_reminded`
    ///
    /// Respects the soft-delete
    async fn find_reminder_candidates(
        &self,
        window: &ReminderWindow,
        include_reminded: bool,
    ) -> Result<Vec<Appointment>>;

    /// Atomically mark an appointment as reminded at `now`
    ///
    /// Only succeeds when the appointment is still scheduled at the same start, and no reminder
    /// was sent or the last one is older than the suppression threshold; returns `false` when
    /// another run got there first or the appointment changed since it was selected
    async fn claim_reminder(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<bool>;

    /// Undo a claim, making the appointment eligible for a reminder again
    async fn release_reminder(&self, appointment: &Appointment) -> Result<()>;

    /// Create a notification
    async fn create_notification(
        &self,
        values: &CreateNotificationValues<'_>,
    ) -> Result<Notification>;

    /// Find the notifications of a user, newest first
    async fn find_notifications(&self, user_id: &Uuid, only_unread: bool)
    -> Result<Vec<Notification>>;

    /// Find a single notification of a user
    async fn find_single_notification_by_id(
        &self,
        user_id: &Uuid,
        id: &Uuid,
    ) -> Result<Option<Notification>>;

    /// Mark a notification as read
    ///
    /// An already read notification is returned as is
    async fn mark_notification_read(
        &self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Result<Notification>;

    /// Mark all unread notifications of a user as read, returns how many changed
    async fn mark_all_notifications_read(&self, user_id: &Uuid, now: DateTime<Utc>)
    -> Result<u64>;

    /// Count the unread notifications of a user
    async fn count_unread_notifications(&self, user_id: &Uuid) -> Result<i64>;
}
