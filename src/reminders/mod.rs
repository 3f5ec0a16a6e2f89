//! Appointment reminders
//!
//! A run selects the scheduled appointments inside a lookahead window and reminds their owners
//! by email and/or in-app notification, one appointment at a time

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub use dispatch::ReminderDispatcher;
pub use window::ReminderWindow;

mod content;
mod dispatch;
mod window;

/// How the reminder job is invoked
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReminderMode {
    /// Regular, at least hourly, invocation
    Normal,

    /// Short window, no bookkeeping, all email to a single address
    Test {
        /// Size of the window in minutes
        interval_minutes: i64,

        /// Address receiving every email
        recipient: String,
    },
}

impl ReminderMode {
    pub fn is_test(&self) -> bool {
        matches!(self, Self::Test { .. })
    }

    /// Address overriding the owner's address, test mode only
    pub fn recipient_override(&self) -> Option<&str> {
        match self {
            Self::Normal => None,
            Self::Test { recipient, .. } => Some(recipient),
        }
    }
}

/// Reminder errors
#[derive(Debug, Error)]
pub enum Error {
    /// Storage failed
    #[error(transparent)]
    Storage(#[from] crate::storage::Error),

    /// Email could not be sent
    #[error(transparent)]
    Mail(#[from] crate::mail::Error),

    /// The owner of the appointment is gone
    #[error("Owner {0} of the appointment not found")]
    OwnerNotFound(Uuid),
}

/// Counters of a single reminder run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderReport {
    /// Candidates found in the window
    pub total: usize,

    /// Candidates reminded without errors
    pub sent: usize,

    /// Candidates that ran into an error
    pub failed: usize,

    /// Candidates left alone because of preferences, timing or an earlier reminder
    pub skipped: usize,

    pub emails_sent: usize,

    pub in_app_sent: usize,
}
