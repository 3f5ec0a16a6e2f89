use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use super::ReminderMode;

/// Coarse reminder horizon in hours used to size the normal window
///
/// Each user's own lead time is applied per appointment afterwards
const REMINDER_HORIZON_HOURS: i64 = 24;

/// Time range `[start, end)` of appointment starts considered by a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReminderWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReminderWindow {
    /// Window for a run at `now`
    ///
    /// Normal runs look at `[now + 23h, now + 47h)`, the hour of overlap covers at most hourly
    /// invocations. Test runs look at the next `interval_minutes`.
    pub fn for_mode(now: DateTime<Utc>, mode: &ReminderMode) -> Self {
        match mode {
            ReminderMode::Normal => Self {
                start: now + Duration::hours(REMINDER_HORIZON_HOURS - 1),
                end: now + Duration::hours(2 * REMINDER_HORIZON_HOURS - 1),
            },
            ReminderMode::Test {
                interval_minutes, ..
            } => Self {
                start: now,
                end: now + Duration::minutes(*interval_minutes),
            },
        }
    }

    /// Does the window contain the given moment?
    pub fn contains(&self, moment: DateTime<Utc>) -> bool {
        self.start <= moment && moment < self.end
    }
}
