use chrono::DateTime;
use chrono::Utc;

use crate::appointments::Appointment;
use crate::mail::Mailer;
use crate::notifications::ENTITY_TYPE_APPOINTMENT;
use crate::notifications::NotificationType;
use crate::preferences::ResolvedPreferences;
use crate::storage::CreateNotificationValues;
use crate::storage::Storage;
use crate::users::User;

use super::Error;
use super::ReminderMode;
use super::ReminderReport;
use super::ReminderWindow;
use super::content::ReminderContent;

/// Why a candidate was left alone
#[derive(Debug, PartialEq, Eq)]
enum SkipReason {
    /// Owner turned reminders off
    Disabled,

    /// Start is still further away than the owner's lead time
    NotDue,

    /// A reminder went out less than an hour ago
    RecentlyReminded,

    /// A concurrent run claimed the appointment first, or it changed after selection
    Claimed,
}

/// Result of a single candidate that did not fail
#[derive(Debug)]
enum Outcome {
    Sent,
    Skipped(SkipReason),
}

/// Error of a single candidate, remembering if anything reached the owner
struct Failure {
    error: Error,
    delivered: bool,
}

/// Sends the reminders of a single run
///
/// Candidates are handled one by one, a failing candidate never stops the run
pub struct ReminderDispatcher<'a, S: Storage> {
    storage: &'a S,
    mailer: &'a dyn Mailer,
    mode: &'a ReminderMode,
}

impl<'a, S: Storage> ReminderDispatcher<'a, S> {
    pub fn new(storage: &'a S, mailer: &'a dyn Mailer, mode: &'a ReminderMode) -> Self {
        Self {
            storage,
            mailer,
            mode,
        }
    }

    /// Run the reminder job at `now`
    ///
    /// # Errors
    ///
    /// Will return `Err` only when the candidates could not be selected
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ReminderReport, Error> {
        let window = ReminderWindow::for_mode(now, self.mode);

        let candidates = self
            .storage
            .find_reminder_candidates(&window, self.mode.is_test())
            .await?;

        tracing::info!(
            "Reminder run at {now}: {} candidate(s) starting between {} and {}",
            candidates.len(),
            window.start,
            window.end
        );

        let mut report = ReminderReport {
            total: candidates.len(),
            ..ReminderReport::default()
        };

        for appointment in &candidates {
            match self.remind(appointment, now, &mut report).await {
                Ok(Outcome::Sent) => report.sent += 1,
                Ok(Outcome::Skipped(reason)) => {
                    tracing::debug!("Skipping appointment {}: {reason:?}", appointment.id);
                    report.skipped += 1;
                }
                Err(err) => {
                    tracing::error!("Could not remind appointment {}: {err}", appointment.id);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Reminder run done: {} sent, {} failed, {} skipped ({} email, {} in-app)",
            report.sent,
            report.failed,
            report.skipped,
            report.emails_sent,
            report.in_app_sent
        );

        Ok(report)
    }

    /// Remind the owner of a single appointment, if due
    async fn remind(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
        report: &mut ReminderReport,
    ) -> Result<Outcome, Error> {
        let preferences = self
            .storage
            .find_preferences(&appointment.user_id)
            .await?;
        let preferences = ResolvedPreferences::resolve(preferences.as_ref());

        if !preferences.reminder_enabled {
            return Ok(Outcome::Skipped(SkipReason::Disabled));
        }

        if appointment.start_date_time - now >= preferences.lead_time() {
            return Ok(Outcome::Skipped(SkipReason::NotDue));
        }

        if appointment.was_recently_reminded(now) {
            return Ok(Outcome::Skipped(SkipReason::RecentlyReminded));
        }

        let owner = self
            .storage
            .find_single_user_by_id(&appointment.user_id)
            .await?
            .ok_or(Error::OwnerNotFound(appointment.user_id))?;

        let content = ReminderContent::new(appointment, &owner);

        // test runs leave the bookkeeping alone so they can be repeated
        let claimed = !self.mode.is_test();
        if claimed && !self.storage.claim_reminder(appointment, now).await? {
            return Ok(Outcome::Skipped(SkipReason::Claimed));
        }

        match self
            .deliver(appointment, &owner, &preferences, &content, report)
            .await
        {
            Ok(()) => Ok(Outcome::Sent),
            Err(Failure { error, delivered }) => {
                // nothing reached the owner, let a later run try again
                if claimed && !delivered {
                    if let Err(err) = self.storage.release_reminder(appointment).await {
                        tracing::error!(
                            "Could not release reminder claim of appointment {}: {err}",
                            appointment.id
                        );
                    }
                }

                Err(error)
            }
        }
    }

    /// Send the reminder through every channel the owner enabled
    async fn deliver(
        &self,
        appointment: &Appointment,
        owner: &User,
        preferences: &ResolvedPreferences,
        content: &ReminderContent,
        report: &mut ReminderReport,
    ) -> Result<(), Failure> {
        let mut delivered = false;

        if preferences.email_reminders {
            let to = self.mode.recipient_override().unwrap_or(&owner.email);

            let message_id = self
                .mailer
                .send(&content.to_email(to))
                .await
                .map_err(|err| Failure {
                    error: err.into(),
                    delivered,
                })?;

            tracing::debug!(
                "Reminder for appointment {} mailed to {to} ({message_id})",
                appointment.id
            );

            report.emails_sent += 1;
            delivered = true;
        }

        if preferences.in_app_reminders {
            let values = CreateNotificationValues {
                user_id: &appointment.user_id,
                title: &content.subject,
                description: &content.summary,
                notification_type: NotificationType::AppointmentReminder,
                entity: Some((ENTITY_TYPE_APPOINTMENT, &appointment.id)),
            };

            self.storage
                .create_notification(&values)
                .await
                .map_err(|err| Failure {
                    error: err.into(),
                    delivered,
                })?;

            report.in_app_sent += 1;
        }

        Ok(())
    }
}
