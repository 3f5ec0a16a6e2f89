//! User preferences
//!
//! Stored lazily, every missing field falls back to its default

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

pub const DEFAULT_REMINDER_ENABLED: bool = true;
pub const DEFAULT_REMINDER_HOURS_BEFORE: i32 = 24;
pub const DEFAULT_EMAIL_REMINDERS: bool = true;
pub const DEFAULT_IN_APP_REMINDERS: bool = true;
pub const DEFAULT_APPOINTMENT_DURATION: i32 = 60;
pub const DEFAULT_BUFFER_TIME: i32 = 0;

/// Preferences as stored, `None` means "not chosen"
#[derive(Clone, Debug, Default)]
pub struct Preferences {
    pub user_id: Uuid,
    pub reminder_enabled: Option<bool>,
    pub reminder_hours_before: Option<i32>,
    pub email_reminders: Option<bool>,
    pub in_app_reminders: Option<bool>,
    pub default_appointment_duration: Option<i32>,
    pub buffer_time: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Preferences with the defaults filled in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPreferences {
    pub reminder_enabled: bool,
    pub reminder_hours_before: i32,
    pub email_reminders: bool,
    pub in_app_reminders: bool,
    pub default_appointment_duration: i32,
    pub buffer_time: i32,
}

impl Default for ResolvedPreferences {
    fn default() -> Self {
        Self {
            reminder_enabled: DEFAULT_REMINDER_ENABLED,
            reminder_hours_before: DEFAULT_REMINDER_HOURS_BEFORE,
            email_reminders: DEFAULT_EMAIL_REMINDERS,
            in_app_reminders: DEFAULT_IN_APP_REMINDERS,
            default_appointment_duration: DEFAULT_APPOINTMENT_DURATION,
            buffer_time: DEFAULT_BUFFER_TIME,
        }
    }
}

impl ResolvedPreferences {
    /// Merge stored preferences (if any) with the defaults
    pub fn resolve(preferences: Option<&Preferences>) -> Self {
        let defaults = Self::default();

        let Some(preferences) = preferences else {
            return defaults;
        };

        Self {
            reminder_enabled: preferences
                .reminder_enabled
                .unwrap_or(defaults.reminder_enabled),
            reminder_hours_before: preferences
                .reminder_hours_before
                .unwrap_or(defaults.reminder_hours_before),
            email_reminders: preferences
                .email_reminders
                .unwrap_or(defaults.email_reminders),
            in_app_reminders: preferences
                .in_app_reminders
                .unwrap_or(defaults.in_app_reminders),
            default_appointment_duration: preferences
                .default_appointment_duration
                .unwrap_or(defaults.default_appointment_duration),
            buffer_time: preferences.buffer_time.unwrap_or(defaults.buffer_time),
        }
    }

    /// How long before the start a reminder should go out
    pub fn lead_time(&self) -> Duration {
        Duration::hours(i64::from(self.reminder_hours_before))
    }
}
