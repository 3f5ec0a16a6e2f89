//! In-app notifications

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Kind of notification
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// Upcoming appointment
    AppointmentReminder,
    /// Appointment was cancelled
    AppointmentCancelled,
    /// Anything else
    System,
}

/// Kind of entity a notification points at
pub const ENTITY_TYPE_APPOINTMENT: &str = "appointment";

#[derive(Clone, Debug)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub notification_type: NotificationType,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub read: bool,
    /// Set if and only if `read` is true
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
