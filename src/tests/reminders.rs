use std::sync::atomic::Ordering;

use chrono::Duration;
use chrono::Utc;

use crate::appointments::AppointmentStatus;
use crate::appointments::Schedule;
use crate::reminders::ReminderDispatcher;
use crate::reminders::ReminderMode;
use crate::reminders::ReminderReport;
use crate::reminders::ReminderWindow;
use crate::storage::Memory;
use crate::storage::Storage;
use crate::storage::UpdateAppointmentValues;
use crate::storage::UpdatePreferencesValues;
use crate::tests::helper;
use crate::tests::helper::FaultyStorage;
use crate::tests::helper::RecordingMailer;

fn email_only() -> UpdatePreferencesValues {
    UpdatePreferencesValues {
        reminder_hours_before: Some(24),
        email_reminders: Some(true),
        in_app_reminders: Some(false),
        ..UpdatePreferencesValues::default()
    }
}

#[tokio::test]
async fn test_window_selects_only_scheduled_appointments_inside() {
    let storage = Memory::new();
    let now = Utc::now();
    let user = helper::insert_user(&storage, "jane@example.com").await;

    let too_early =
        helper::insert_appointment(&storage, &user, "Too early", now + Duration::minutes(22 * 60 + 59))
            .await;
    let first = helper::insert_appointment(&storage, &user, "First", now + Duration::hours(23)).await;
    let last = helper::insert_appointment(
        &storage,
        &user,
        "Last",
        now + Duration::hours(47) - Duration::seconds(1),
    )
    .await;
    let too_late =
        helper::insert_appointment(&storage, &user, "Too late", now + Duration::hours(47)).await;

    let cancelled =
        helper::insert_appointment(&storage, &user, "Cancelled", now + Duration::hours(30)).await;
    storage
        .change_appointment_status(&cancelled, AppointmentStatus::Cancelled)
        .await
        .unwrap();

    let deleted =
        helper::insert_appointment(&storage, &user, "Deleted", now + Duration::hours(30)).await;
    storage.delete_appointment(&deleted).await.unwrap();

    let window = ReminderWindow::for_mode(now, &ReminderMode::Normal);
    let candidates = storage
        .find_reminder_candidates(&window, false)
        .await
        .unwrap();

    let ids: Vec<_> = candidates.iter().map(|appointment| appointment.id).collect();
    assert_eq!(vec![first.id, last.id], ids);

    for excluded in [&too_early, &too_late, &cancelled, &deleted] {
        assert!(!ids.contains(&excluded.id), "{} selected", excluded.title);
    }
}

#[tokio::test]
async fn test_reminder_sent_by_email_only() {
    let storage = Memory::new();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let user = helper::insert_user(&storage, "jane@example.com").await;
    helper::set_preferences(&storage, &user, email_only()).await;

    let appointment = helper::insert_appointment(
        &storage,
        &user,
        "Dentist",
        now + Duration::minutes(23 * 60 + 30),
    )
    .await;

    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now)
        .await
        .unwrap();

    assert_eq!(
        ReminderReport {
            total: 1,
            sent: 1,
            failed: 0,
            skipped: 0,
            emails_sent: 1,
            in_app_sent: 0,
        },
        report
    );

    let sent = mailer.sent();
    assert_eq!(1, sent.len());
    assert_eq!("jane@example.com", sent[0].to);
    assert!(sent[0].subject.starts_with("Reminder: Dentist on "));

    let notifications = storage.find_notifications(&user.id, false).await.unwrap();
    assert!(notifications.is_empty());

    let appointment = helper::reload(&storage, &appointment).await;
    assert!(appointment.reminder_sent);
    assert_eq!(Some(now), appointment.reminder_sent_at);
}

#[tokio::test]
async fn test_reminder_disabled_is_skipped() {
    let storage = Memory::new();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let user = helper::insert_user(&storage, "jane@example.com").await;
    helper::set_preferences(
        &storage,
        &user,
        UpdatePreferencesValues {
            reminder_enabled: Some(false),
            ..email_only()
        },
    )
    .await;

    let appointment = helper::insert_appointment(
        &storage,
        &user,
        "Dentist",
        now + Duration::minutes(23 * 60 + 30),
    )
    .await;

    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now)
        .await
        .unwrap();

    assert_eq!(1, report.total);
    assert_eq!(0, report.sent);
    assert_eq!(0, report.failed);
    assert_eq!(1, report.skipped);
    assert_eq!(0, report.emails_sent);
    assert_eq!(0, report.in_app_sent);

    assert!(mailer.sent().is_empty());
    assert!(!helper::reload(&storage, &appointment).await.reminder_sent);
}

#[tokio::test]
async fn test_cancelled_appointment_is_not_a_candidate() {
    let storage = Memory::new();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let user = helper::insert_user(&storage, "jane@example.com").await;
    let appointment = helper::insert_appointment(
        &storage,
        &user,
        "Dentist",
        now + Duration::minutes(23 * 60 + 30),
    )
    .await;
    storage
        .change_appointment_status(&appointment, AppointmentStatus::Cancelled)
        .await
        .unwrap();

    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now)
        .await
        .unwrap();

    assert_eq!(ReminderReport::default(), report);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_reminder_waits_for_lead_time() {
    let storage = Memory::new();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let user = helper::insert_user(&storage, "jane@example.com").await;
    helper::set_preferences(
        &storage,
        &user,
        UpdatePreferencesValues {
            reminder_hours_before: Some(2),
            ..UpdatePreferencesValues::default()
        },
    )
    .await;

    let appointment =
        helper::insert_appointment(&storage, &user, "Dentist", now + Duration::hours(30)).await;

    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now)
        .await
        .unwrap();

    assert_eq!(1, report.total);
    assert_eq!(1, report.skipped);
    assert_eq!(0, report.sent);

    // no side effects
    assert!(mailer.sent().is_empty());
    assert!(
        storage
            .find_notifications(&user.id, false)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(!helper::reload(&storage, &appointment).await.reminder_sent);
}

#[tokio::test]
async fn test_reminder_sent_once() {
    let storage = Memory::new();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let user = helper::insert_user(&storage, "jane@example.com").await;
    helper::insert_appointment(
        &storage,
        &user,
        "Dentist",
        now + Duration::minutes(23 * 60 + 30),
    )
    .await;

    let dispatcher = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal);

    let first = dispatcher.run(now).await.unwrap();
    assert_eq!(1, first.sent);
    assert_eq!(1, first.emails_sent);
    assert_eq!(1, first.in_app_sent);

    let second = dispatcher.run(now + Duration::seconds(5)).await.unwrap();
    assert_eq!(0, second.sent);
    assert_eq!(0, second.emails_sent);
    assert_eq!(0, second.in_app_sent);

    assert_eq!(1, mailer.sent().len());

    let notifications = storage.find_notifications(&user.id, false).await.unwrap();
    assert_eq!(1, notifications.len());
    assert_eq!(
        crate::notifications::NotificationType::AppointmentReminder,
        notifications[0].notification_type
    );
}

#[tokio::test]
async fn test_failing_candidate_does_not_stop_the_run() {
    let storage = Memory::new();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let failing_user = helper::insert_user(&storage, "broken@example.com").await;
    let user = helper::insert_user(&storage, "jane@example.com").await;

    mailer.fail_for("broken@example.com");

    // the failing one comes first
    let failing_appointment = helper::insert_appointment(
        &storage,
        &failing_user,
        "Broken",
        now + Duration::minutes(23 * 60 + 10),
    )
    .await;
    let appointment = helper::insert_appointment(
        &storage,
        &user,
        "Dentist",
        now + Duration::minutes(23 * 60 + 30),
    )
    .await;

    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now)
        .await
        .unwrap();

    assert_eq!(2, report.total);
    assert_eq!(1, report.sent);
    assert_eq!(1, report.failed);
    assert_eq!(1, report.emails_sent);
    assert_eq!(1, report.in_app_sent);

    assert!(helper::reload(&storage, &appointment).await.reminder_sent);

    // nothing reached the owner, so the claim is released
    let failing_appointment = helper::reload(&storage, &failing_appointment).await;
    assert!(!failing_appointment.reminder_sent);
    assert_eq!(None, failing_appointment.reminder_sent_at);
    assert!(
        storage
            .find_notifications(&failing_user.id, false)
            .await
            .unwrap()
            .is_empty()
    );

    // and picked up again by the next run
    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(1, report.total);
    assert_eq!(1, report.failed);
}

#[tokio::test]
async fn test_without_channels_the_reminder_is_still_marked() {
    let storage = Memory::new();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let user = helper::insert_user(&storage, "jane@example.com").await;
    helper::set_preferences(
        &storage,
        &user,
        UpdatePreferencesValues {
            email_reminders: Some(false),
            in_app_reminders: Some(false),
            ..UpdatePreferencesValues::default()
        },
    )
    .await;

    let appointment =
        helper::insert_appointment(&storage, &user, "Dentist", now + Duration::hours(23)).await;

    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now)
        .await
        .unwrap();

    assert_eq!(1, report.sent);
    assert_eq!(0, report.emails_sent);
    assert_eq!(0, report.in_app_sent);
    assert!(helper::reload(&storage, &appointment).await.reminder_sent);
}

#[tokio::test]
async fn test_test_mode_leaves_bookkeeping_alone() {
    let storage = Memory::new();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let mode = ReminderMode::Test {
        interval_minutes: 60,
        recipient: helper::TEST_RECIPIENT.to_string(),
    };

    let user = helper::insert_user(&storage, "jane@example.com").await;
    helper::set_preferences(&storage, &user, email_only()).await;

    let fresh =
        helper::insert_appointment(&storage, &user, "Fresh", now + Duration::minutes(30)).await;

    // reminded two hours ago, outside the suppression threshold
    let reminded =
        helper::insert_appointment(&storage, &user, "Reminded", now + Duration::minutes(45)).await;
    let reminded_at = now - Duration::hours(2);
    assert!(storage.claim_reminder(&reminded, reminded_at).await.unwrap());

    // outside the test window
    helper::insert_appointment(&storage, &user, "Tomorrow", now + Duration::hours(23)).await;

    let dispatcher = ReminderDispatcher::new(&storage, &mailer, &mode);

    for _ in 0..2 {
        let report = dispatcher.run(now).await.unwrap();

        assert_eq!(2, report.total);
        assert_eq!(2, report.sent);
        assert_eq!(2, report.emails_sent);
    }

    let sent = mailer.sent();
    assert_eq!(4, sent.len());
    assert!(sent.iter().all(|email| email.to == helper::TEST_RECIPIENT));

    let fresh = helper::reload(&storage, &fresh).await;
    assert!(!fresh.reminder_sent);
    assert_eq!(None, fresh.reminder_sent_at);

    let reminded = helper::reload(&storage, &reminded).await;
    assert!(reminded.reminder_sent);
    assert_eq!(Some(reminded_at), reminded.reminder_sent_at);
}

#[tokio::test]
async fn test_claim_blocks_for_an_hour() {
    let storage = Memory::new();
    let now = Utc::now();

    let user = helper::insert_user(&storage, "jane@example.com").await;
    let appointment =
        helper::insert_appointment(&storage, &user, "Dentist", now + Duration::hours(23)).await;

    assert!(storage.claim_reminder(&appointment, now).await.unwrap());
    assert!(
        !storage
            .claim_reminder(&appointment, now + Duration::minutes(30))
            .await
            .unwrap()
    );
    assert!(
        storage
            .claim_reminder(&appointment, now + Duration::minutes(61))
            .await
            .unwrap()
    );

    storage.release_reminder(&appointment).await.unwrap();

    let appointment = helper::reload(&storage, &appointment).await;
    assert!(!appointment.reminder_sent);
    assert_eq!(None, appointment.reminder_sent_at);
}

#[tokio::test]
async fn test_claim_fails_once_the_appointment_changed() {
    let storage = Memory::new();
    let now = Utc::now();

    let user = helper::insert_user(&storage, "jane@example.com").await;

    // cancelled after it was selected
    let cancelled =
        helper::insert_appointment(&storage, &user, "Dentist", now + Duration::hours(23)).await;
    storage
        .change_appointment_status(&cancelled, AppointmentStatus::Cancelled)
        .await
        .unwrap();

    assert!(!storage.claim_reminder(&cancelled, now).await.unwrap());
    assert!(!helper::reload(&storage, &cancelled).await.reminder_sent);

    // moved a week ahead after it was selected
    let moved =
        helper::insert_appointment(&storage, &user, "Checkup", now + Duration::hours(23)).await;
    let schedule = Schedule::resolve(now + Duration::days(7), None, None, 60).unwrap();
    storage
        .update_appointment(
            &moved,
            &UpdateAppointmentValues {
                title: None,
                description: None,
                location: None,
                schedule: Some(&schedule),
            },
        )
        .await
        .unwrap();

    assert!(!storage.claim_reminder(&moved, now).await.unwrap());

    let reloaded = helper::reload(&storage, &moved).await;
    assert!(!reloaded.reminder_sent);
    assert_eq!(None, reloaded.reminder_sent_at);

    // the fresh record can be claimed
    assert!(storage.claim_reminder(&reloaded, now).await.unwrap());
}

#[tokio::test]
async fn test_lost_claim_is_skipped() {
    let storage = FaultyStorage::default();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let user = helper::insert_user(&storage.inner, "jane@example.com").await;
    helper::insert_appointment(
        &storage.inner,
        &user,
        "Dentist",
        now + Duration::minutes(23 * 60 + 30),
    )
    .await;

    storage.steal_claims.store(true, Ordering::SeqCst);

    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now)
        .await
        .unwrap();

    assert_eq!(
        ReminderReport {
            total: 1,
            skipped: 1,
            ..ReminderReport::default()
        },
        report
    );
    assert!(mailer.sent().is_empty());
    assert!(
        storage
            .find_notifications(&user.id, false)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_failed_notification_after_email_keeps_the_claim() {
    let storage = FaultyStorage::default();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let user = helper::insert_user(&storage.inner, "jane@example.com").await;
    let appointment = helper::insert_appointment(
        &storage.inner,
        &user,
        "Dentist",
        now + Duration::minutes(23 * 60 + 30),
    )
    .await;

    storage.fail_notifications.store(true, Ordering::SeqCst);

    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now)
        .await
        .unwrap();

    assert_eq!(
        ReminderReport {
            total: 1,
            failed: 1,
            emails_sent: 1,
            ..ReminderReport::default()
        },
        report
    );
    assert_eq!(1, mailer.sent().len());

    // the email reached the owner, no second one
    let appointment = helper::reload(&storage.inner, &appointment).await;
    assert!(appointment.reminder_sent);
    assert_eq!(Some(now), appointment.reminder_sent_at);

    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(0, report.total);
    assert_eq!(1, mailer.sent().len());
}

#[tokio::test]
async fn test_missing_owner_is_a_failure() {
    let storage = Memory::new();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let user = helper::insert_user(&storage, "jane@example.com").await;
    let appointment = helper::insert_appointment(
        &storage,
        &user,
        "Dentist",
        now + Duration::minutes(23 * 60 + 30),
    )
    .await;

    storage.delete_user(&user).await.unwrap();

    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now)
        .await
        .unwrap();

    assert_eq!(
        ReminderReport {
            total: 1,
            failed: 1,
            ..ReminderReport::default()
        },
        report
    );
    assert!(mailer.sent().is_empty());
    assert!(!helper::reload(&storage, &appointment).await.reminder_sent);
}

#[tokio::test]
async fn test_failed_release_does_not_stop_the_run() {
    let storage = FaultyStorage::default();
    let mailer = RecordingMailer::default();
    let now = Utc::now();

    let failing_user = helper::insert_user(&storage.inner, "broken@example.com").await;
    let user = helper::insert_user(&storage.inner, "jane@example.com").await;

    mailer.fail_for("broken@example.com");
    storage.fail_releases.store(true, Ordering::SeqCst);

    let failing_appointment = helper::insert_appointment(
        &storage.inner,
        &failing_user,
        "Broken",
        now + Duration::minutes(23 * 60 + 10),
    )
    .await;
    helper::insert_appointment(
        &storage.inner,
        &user,
        "Dentist",
        now + Duration::minutes(23 * 60 + 30),
    )
    .await;

    let report = ReminderDispatcher::new(&storage, &mailer, &ReminderMode::Normal)
        .run(now)
        .await
        .unwrap();

    assert_eq!(2, report.total);
    assert_eq!(1, report.sent);
    assert_eq!(1, report.failed);
    assert_eq!(1, report.emails_sent);

    // the claim could not be undone
    assert!(
        helper::reload(&storage.inner, &failing_appointment)
            .await
            .reminder_sent
    );
}
