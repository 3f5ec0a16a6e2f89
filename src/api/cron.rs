//! Scheduled jobs, triggered from the outside

use axum::Extension;
use axum::RequestPartsExt;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::config::ReminderSettings;
use crate::mail::SharedMailer;
use crate::reminders::ReminderDispatcher;
use crate::reminders::ReminderReport;
use crate::storage::Storage;

use super::Error;
use super::Success;

/// Proof the request comes from the scheduler
///
/// Without a configured cron secret every request passes
pub struct CronAuthorization;

impl<S> FromRequestParts<S> for CronAuthorization
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(settings) = parts
            .extract::<Extension<ReminderSettings>>()
            .await
            .map_err(|_| Error::internal_server_error("Could not get reminder settings"))?;

        let Some(cron_secret) = settings.cron_secret else {
            return Ok(Self);
        };

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| Error::unauthorized("Missing cron secret"))?;

        if bearer.token() == cron_secret {
            Ok(Self)
        } else {
            tracing::warn!("Reminder job triggered with an invalid cron secret");

            Err(Error::unauthorized("Invalid cron secret"))
        }
    }
}

/// Outcome of a reminder run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderJobResponse {
    total_appointments_found: usize,
    reminders_sent: usize,
    reminders_failed: usize,
    reminders_skipped: usize,
    emails_sent: usize,
    in_app_sent: usize,
    test_mode: bool,
    timestamp: DateTime<Utc>,
}

impl ReminderJobResponse {
    fn new(report: ReminderReport, test_mode: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            total_appointments_found: report.total,
            reminders_sent: report.sent,
            reminders_failed: report.failed,
            reminders_skipped: report.skipped,
            emails_sent: report.emails_sent,
            in_app_sent: report.in_app_sent,
            test_mode,
            timestamp,
        }
    }
}

/// Send the reminders of the upcoming appointments
///
/// Meant to be triggered at least hourly
///
/// Request:
/// ```sh
/// curl -v -XPOST -H 'Authorization: Bearer croncroncron' \
///     http://localhost:6000/api/cron/reminders
/// ```
///
/// Response:
/// ```json
/// { "success": true, "data": { "totalAppointmentsFound": 3, "remindersSent": 2, ... } }
/// ```
pub async fn reminders<S: Storage>(
    _authorization: CronAuthorization,
    Extension(storage): Extension<S>,
    Extension(mailer): Extension<SharedMailer>,
    Extension(settings): Extension<ReminderSettings>,
) -> Result<Success<ReminderJobResponse>, Error> {
    let now = Utc::now();

    let report = ReminderDispatcher::new(&storage, mailer.as_ref(), &settings.mode)
        .run(now)
        .await
        .map_err(|err| Error::internal_server_error("Reminder job failed").with_details(err))?;

    Ok(Success::ok(ReminderJobResponse::new(
        report,
        settings.mode.is_test(),
        now,
    )))
}
