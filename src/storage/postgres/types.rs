//! Database storage types and functions

use chrono::DateTime;
use chrono::Utc;
use sqlx::migrate::Migrator;
use uuid::Uuid;

use crate::appointments::Appointment;
use crate::appointments::AppointmentStatus;
use crate::notifications::Notification;
use crate::notifications::NotificationType;
use crate::preferences::Preferences;
use crate::users::Role;
use crate::users::User;

/// Migrator to run migrations on startup
pub static MIGRATOR: Migrator = sqlx::migrate!();

/// `SQLx` type for user role
#[derive(Clone, Copy, PartialEq, Debug, sqlx::Type)]
#[sqlx(type_name = "user_role_type")]
#[sqlx(rename_all = "kebab-case")]
pub enum UserRoleType {
    /// Admin
    Admin,

    /// Regular user
    User,
}

impl UserRoleType {
    /// Create user role type from role
    pub fn from_role(role: Role) -> Self {
        match role {
            Role::Admin => UserRoleType::Admin,
            Role::User => UserRoleType::User,
        }
    }

    /// Create role from user role type
    pub fn to_role(self) -> Role {
        match self {
            UserRoleType::Admin => Role::Admin,
            UserRoleType::User => Role::User,
        }
    }
}

/// `SQLx` type for appointment status
#[derive(Clone, Copy, PartialEq, Debug, sqlx::Type)]
#[sqlx(type_name = "appointment_status_type")]
#[sqlx(rename_all = "kebab-case")]
pub enum AppointmentStatusType {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatusType {
    /// Create appointment status type from status
    pub fn from_status(status: AppointmentStatus) -> Self {
        match status {
            AppointmentStatus::Scheduled => Self::Scheduled,
            AppointmentStatus::InProgress => Self::InProgress,
            AppointmentStatus::Completed => Self::Completed,
            AppointmentStatus::Cancelled => Self::Cancelled,
            AppointmentStatus::NoShow => Self::NoShow,
        }
    }

    /// Create status from appointment status type
    pub fn to_status(self) -> AppointmentStatus {
        match self {
            Self::Scheduled => AppointmentStatus::Scheduled,
            Self::InProgress => AppointmentStatus::InProgress,
            Self::Completed => AppointmentStatus::Completed,
            Self::Cancelled => AppointmentStatus::Cancelled,
            Self::NoShow => AppointmentStatus::NoShow,
        }
    }
}

/// `SQLx` type for notification type
#[derive(Clone, Copy, PartialEq, Debug, sqlx::Type)]
#[sqlx(type_name = "notification_type")]
#[sqlx(rename_all = "kebab-case")]
pub enum NotificationTypeType {
    AppointmentReminder,
    AppointmentCancelled,
    System,
}

impl NotificationTypeType {
    /// Create notification type type from notification type
    pub fn from_notification_type(notification_type: NotificationType) -> Self {
        match notification_type {
            NotificationType::AppointmentReminder => Self::AppointmentReminder,
            NotificationType::AppointmentCancelled => Self::AppointmentCancelled,
            NotificationType::System => Self::System,
        }
    }

    /// Create notification type from notification type type
    pub fn to_notification_type(self) -> NotificationType {
        match self {
            Self::AppointmentReminder => NotificationType::AppointmentReminder,
            Self::AppointmentCancelled => NotificationType::AppointmentCancelled,
            Self::System => NotificationType::System,
        }
    }
}

/// `SQLx` version of user
#[derive(sqlx::FromRow)]
pub struct SqlxUser {
    pub id: Uuid,
    pub session_id: Uuid,
    pub email: String,
    pub name: String,
    pub hashed_password: String,
    pub role: UserRoleType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create user from `SQLx` version
    pub fn from_sqlx_user(user: SqlxUser) -> Self {
        Self {
            id: user.id,
            session_id: user.session_id,
            email: user.email,
            name: user.name,
            hashed_password: user.hashed_password,
            role: user.role.to_role(),
            created_at: user.created_at,
            updated_at: user.updated_at,
            deleted_at: user.deleted_at,
        }
    }
}

/// `SQLx` version of preferences
#[derive(sqlx::FromRow)]
pub struct SqlxPreferences {
    pub user_id: Uuid,
    pub reminder_enabled: Option<bool>,
    pub reminder_hours_before: Option<i32>,
    pub email_reminders: Option<bool>,
    pub in_app_reminders: Option<bool>,
    pub default_appointment_duration: Option<i32>,
    pub buffer_time: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Preferences {
    /// Create preferences from `SQLx` version
    pub fn from_sqlx_preferences(preferences: SqlxPreferences) -> Self {
        Self {
            user_id: preferences.user_id,
            reminder_enabled: preferences.reminder_enabled,
            reminder_hours_before: preferences.reminder_hours_before,
            email_reminders: preferences.email_reminders,
            in_app_reminders: preferences.in_app_reminders,
            default_appointment_duration: preferences.default_appointment_duration,
            buffer_time: preferences.buffer_time,
            created_at: Some(preferences.created_at),
            updated_at: Some(preferences.updated_at),
        }
    }
}

/// `SQLx` version of appointment
#[derive(sqlx::FromRow)]
pub struct SqlxAppointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    pub duration: i32,
    pub status: AppointmentStatusType,
    pub reminder_sent: bool,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Appointment {
    /// Create appointment from `SQLx` version
    pub fn from_sqlx_appointment(appointment: SqlxAppointment) -> Self {
        Self {
            id: appointment.id,
            user_id: appointment.user_id,
            title: appointment.title,
            description: appointment.description,
            location: appointment.location,
            start_date_time: appointment.start_date_time,
            end_date_time: appointment.end_date_time,
            duration: appointment.duration,
            status: appointment.status.to_status(),
            reminder_sent: appointment.reminder_sent,
            reminder_sent_at: appointment.reminder_sent_at,
            created_at: appointment.created_at,
            updated_at: appointment.updated_at,
            deleted_at: appointment.deleted_at,
        }
    }
}

/// `SQLx` version of notification
#[derive(sqlx::FromRow)]
pub struct SqlxNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub notification_type: NotificationTypeType,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create notification from `SQLx` version
    pub fn from_sqlx_notification(notification: SqlxNotification) -> Self {
        Self {
            id: notification.id,
            user_id: notification.user_id,
            title: notification.title,
            description: notification.description,
            notification_type: notification.notification_type.to_notification_type(),
            entity_type: notification.entity_type,
            entity_id: notification.entity_id,
            read: notification.read,
            read_at: notification.read_at,
            created_at: notification.created_at,
        }
    }
}
