//! Appointments
//!
//! The record itself, its lifecycle rules and the schedule validation shared by the API

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Hours a sent reminder blocks a resend
pub const REMINDER_SUPPRESSION_HOURS: i64 = 1;

/// Lifecycle status of an appointment
///
/// Once an appointment leaves `Scheduled` it never returns to it
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Is the status final?
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Can an appointment move from this status to `target`?
    ///
    /// Staying in the same status is always allowed
    pub fn can_transition_to(self, target: Self) -> bool {
        if self == target {
            return true;
        }

        if self.is_terminal() || target == Self::Scheduled {
            return false;
        }

        self != Self::InProgress || matches!(target, Self::Completed | Self::Cancelled)
    }
}

#[derive(Clone, Debug)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    /// Minutes, always equal to `end_date_time - start_date_time`
    pub duration: i32,
    pub status: AppointmentStatus,
    pub reminder_sent: bool,
    /// Set if and only if `reminder_sent` is true
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Appointment {
    /// Is the appointment soft-deleted?
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Was a reminder sent less than [`REMINDER_SUPPRESSION_HOURS`] ago?
    pub fn was_recently_reminded(&self, now: DateTime<Utc>) -> bool {
        self.reminder_sent
            && self.reminder_sent_at.is_some_and(|sent_at| {
                now - sent_at < Duration::hours(REMINDER_SUPPRESSION_HOURS)
            })
    }

    /// Current schedule of the appointment
    pub fn schedule(&self) -> Schedule {
        Schedule {
            start: self.start_date_time,
            end: self.end_date_time,
        }
    }
}

/// Problems with a requested schedule
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// End lies on or before the start
    #[error("End date time must be after the start date time")]
    EndNotAfterStart,

    /// Duration does not match the given start and end
    #[error("Duration does not match the start and end date time")]
    DurationMismatch,

    /// Duration is not a positive amount of minutes
    #[error("Duration must be a positive number of minutes")]
    InvalidDuration,
}

/// Validated start and end of an appointment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Schedule {
    /// Build a schedule from a start and an optional end and/or duration
    ///
    /// Without both, `default_duration` minutes are used
    pub fn resolve(
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        duration: Option<i32>,
        default_duration: i32,
    ) -> Result<Self, ScheduleError> {
        let end = match (end, duration) {
            (Some(end), Some(duration)) => {
                if end - start != Duration::minutes(i64::from(duration)) {
                    return Err(ScheduleError::DurationMismatch);
                }

                end
            }
            (Some(end), None) => end,
            (None, Some(duration)) => start + positive_minutes(duration)?,
            (None, None) => start + positive_minutes(default_duration)?,
        };

        if end <= start {
            return Err(ScheduleError::EndNotAfterStart);
        }

        Ok(Self { start, end })
    }

    /// Length of the schedule in whole minutes
    pub fn duration_minutes(&self) -> i32 {
        i32::try_from((self.end - self.start).num_minutes()).unwrap_or(i32::MAX)
    }
}

fn positive_minutes(minutes: i32) -> Result<Duration, ScheduleError> {
    if minutes > 0 {
        Ok(Duration::minutes(i64::from(minutes)))
    } else {
        Err(ScheduleError::InvalidDuration)
    }
}

/// Appointment counts of a single user
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentStats {
    pub total: i64,
    pub scheduled: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub no_show: i64,
    /// Scheduled appointments that have not started yet
    pub upcoming: i64,
}

impl AppointmentStats {
    /// Build the stats from per-status counts
    pub fn from_counts(counts: &[(AppointmentStatus, i64)], upcoming: i64) -> Self {
        let mut stats = Self {
            upcoming,
            ..Self::default()
        };

        for (status, count) in counts {
            stats.total += count;

            match status {
                AppointmentStatus::Scheduled => stats.scheduled += count,
                AppointmentStatus::InProgress => stats.in_progress += count,
                AppointmentStatus::Completed => stats.completed += count,
                AppointmentStatus::Cancelled => stats.cancelled += count,
                AppointmentStatus::NoShow => stats.no_show += count,
            }
        }

        stats
    }
}
