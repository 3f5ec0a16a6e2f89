//! Memory storage
//!
//! Will be destroyed on system shutdown

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::appointments::Appointment;
use crate::appointments::AppointmentStatus;
use crate::appointments::REMINDER_SUPPRESSION_HOURS;
use crate::notifications::Notification;
use crate::preferences::Preferences;
use crate::reminders::ReminderWindow;
use crate::users::User;

use super::AppointmentFilter;
use super::ChangePasswordValues;
use super::CreateAppointmentValues;
use super::CreateNotificationValues;
use super::CreateUserValues;
use super::Result;
use super::Storage;
use super::UpdateAppointmentValues;
use super::UpdatePreferencesValues;
use super::UpdateUserValues;

/// An in-memory storage
///
/// Will be destroyed on system shutdown
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// All users in storage
    users: Arc<Mutex<HashMap<Uuid, User>>>,

    /// Preferences by user ID
    preferences: Arc<Mutex<HashMap<Uuid, Preferences>>>,

    /// All appointments in storage
    appointments: Arc<Mutex<HashMap<Uuid, Appointment>>>,

    /// All notifications in storage
    notifications: Arc<Mutex<HashMap<Uuid, Notification>>>,
}

impl Memory {
    /// Create a new empty Memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sort appointments by their start
fn by_start(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments.sort_by_key(|appointment| appointment.start_date_time);
    appointments
}

#[async_trait]
impl Storage for Memory {
    async fn find_any_single_user(&self) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|user| !user.is_deleted())
            .cloned())
    }

    async fn find_all_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .lock()
            .await
            .values()
            .filter(|user| !user.is_deleted())
            .cloned()
            .collect();

        users.sort_by_key(|user| user.created_at);

        Ok(users)
    }

    async fn find_single_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_single_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .await
            .get(id)
            .filter(|user| !user.is_deleted())
            .cloned())
    }

    async fn create_user(&self, values: &CreateUserValues<'_>) -> Result<User> {
        let now = Utc::now();

        let user = User {
            id: Uuid::new_v4(),
            session_id: *values.session_id,
            email: values.email.to_string(),
            name: values.name.to_string(),
            hashed_password: values.hashed_password.to_string(),
            role: values.role,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.users.lock().await.insert(user.id, user.clone());

        Ok(user)
    }

    async fn update_user(&self, user: &User, values: &UpdateUserValues<'_>) -> Result<User> {
        let mut users = self.users.lock().await;
        let user = users.entry(user.id).or_insert_with(|| user.clone());

        if let Some(name) = values.name {
            user.name = name.to_string();
        }

        if let Some(role) = values.role {
            user.role = role;
        }

        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn change_password(
        &self,
        user: &User,
        values: &ChangePasswordValues<'_>,
    ) -> Result<User> {
        let mut users = self.users.lock().await;
        let user = users.entry(user.id).or_insert_with(|| user.clone());

        user.session_id = *values.session_id;
        user.hashed_password = values.hashed_password.to_string();
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn delete_user(&self, user: &User) -> Result<()> {
        if let Some(user) = self.users.lock().await.get_mut(&user.id) {
            user.deleted_at = Some(Utc::now());
        }

        Ok(())
    }

    async fn find_preferences(&self, user_id: &Uuid) -> Result<Option<Preferences>> {
        Ok(self.preferences.lock().await.get(user_id).cloned())
    }

    async fn upsert_preferences(
        &self,
        user_id: &Uuid,
        values: &UpdatePreferencesValues,
    ) -> Result<Preferences> {
        let now = Utc::now();

        let mut preferences = self.preferences.lock().await;
        let preferences = preferences.entry(*user_id).or_insert_with(|| Preferences {
            user_id: *user_id,
            created_at: Some(now),
            ..Preferences::default()
        });

        preferences.reminder_enabled = values.reminder_enabled.or(preferences.reminder_enabled);
        preferences.reminder_hours_before = values
            .reminder_hours_before
            .or(preferences.reminder_hours_before);
        preferences.email_reminders = values.email_reminders.or(preferences.email_reminders);
        preferences.in_app_reminders = values.in_app_reminders.or(preferences.in_app_reminders);
        preferences.default_appointment_duration = values
            .default_appointment_duration
            .or(preferences.default_appointment_duration);
        preferences.buffer_time = values.buffer_time.or(preferences.buffer_time);
        preferences.updated_at = Some(now);

        Ok(preferences.clone())
    }

    async fn find_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>> {
        let appointments = self
            .appointments
            .lock()
            .await
            .values()
            .filter(|appointment| {
                appointment.user_id == filter.user_id
                    && !appointment.is_deleted()
                    && filter
                        .status
                        .is_none_or(|status| appointment.status == status)
                    && filter
                        .from
                        .is_none_or(|from| appointment.start_date_time >= from)
                    && filter.to.is_none_or(|to| appointment.start_date_time < to)
            })
            .cloned()
            .collect();

        Ok(by_start(appointments))
    }

    async fn find_single_appointment_by_id(&self, id: &Uuid) -> Result<Option<Appointment>> {
        Ok(self
            .appointments
            .lock()
            .await
            .get(id)
            .filter(|appointment| !appointment.is_deleted())
            .cloned())
    }

    async fn create_appointment(
        &self,
        values: &CreateAppointmentValues<'_>,
    ) -> Result<Appointment> {
        let now = Utc::now();

        let appointment = Appointment {
            id: Uuid::new_v4(),
            user_id: *values.user_id,
            title: values.title.to_string(),
            description: values.description.map(ToString::to_string),
            location: values.location.map(ToString::to_string),
            start_date_time: values.schedule.start,
            end_date_time: values.schedule.end,
            duration: values.schedule.duration_minutes(),
            status: AppointmentStatus::Scheduled,
            reminder_sent: false,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.appointments
            .lock()
            .await
            .insert(appointment.id, appointment.clone());

        Ok(appointment)
    }

    async fn update_appointment(
        &self,
        appointment: &Appointment,
        values: &UpdateAppointmentValues<'_>,
    ) -> Result<Appointment> {
        let mut appointments = self.appointments.lock().await;
        let appointment = appointments
            .entry(appointment.id)
            .or_insert_with(|| appointment.clone());

        if let Some(title) = values.title {
            appointment.title = title.to_string();
        }

        if let Some(description) = values.description {
            appointment.description = description.map(ToString::to_string);
        }

        if let Some(location) = values.location {
            appointment.location = location.map(ToString::to_string);
        }

        if let Some(schedule) = values.schedule {
            appointment.start_date_time = schedule.start;
            appointment.end_date_time = schedule.end;
            appointment.duration = schedule.duration_minutes();
            appointment.reminder_sent = false;
            appointment.reminder_sent_at = None;
        }

        appointment.updated_at = Utc::now();

        Ok(appointment.clone())
    }

    async fn change_appointment_status(
        &self,
        appointment: &Appointment,
        status: AppointmentStatus,
    ) -> Result<Appointment> {
        let mut appointments = self.appointments.lock().await;
        let appointment = appointments
            .entry(appointment.id)
            .or_insert_with(|| appointment.clone());

        appointment.status = status;
        appointment.updated_at = Utc::now();

        Ok(appointment.clone())
    }

    async fn delete_appointment(&self, appointment: &Appointment) -> Result<()> {
        if let Some(appointment) = self.appointments.lock().await.get_mut(&appointment.id) {
            appointment.deleted_at = Some(Utc::now());
        }

        Ok(())
    }

    async fn count_appointments_by_status(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<(AppointmentStatus, i64)>> {
        let mut counts: HashMap<AppointmentStatus, i64> = HashMap::new();

        for appointment in self.appointments.lock().await.values() {
            if &appointment.user_id == user_id && !appointment.is_deleted() {
                *counts.entry(appointment.status).or_default() += 1;
            }
        }

        Ok(counts.into_iter().collect())
    }

    async fn count_upcoming_appointments(
        &self,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let count = self
            .appointments
            .lock()
            .await
            .values()
            .filter(|appointment| {
                &appointment.user_id == user_id
                    && !appointment.is_deleted()
                    && appointment.status == AppointmentStatus::Scheduled
                    && appointment.start_date_time > now
            })
            .count();

        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn find_reminder_candidates(
        &self,
        window: &ReminderWindow,
        include_reminded: bool,
    ) -> Result<Vec<Appointment>> {
        let appointments = self
            .appointments
            .lock()
            .await
            .values()
            .filter(|appointment| {
                appointment.status == AppointmentStatus::Scheduled
                    && !appointment.is_deleted()
                    && window.contains(appointment.start_date_time)
                    && (include_reminded || !appointment.reminder_sent)
            })
            .cloned()
            .collect();

        Ok(by_start(appointments))
    }

    async fn claim_reminder(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<bool> {
        let stale_before = now - Duration::hours(REMINDER_SUPPRESSION_HOURS);

        let mut appointments = self.appointments.lock().await;

        // cancelled or moved since it was selected
        let Some(stored) = appointments.get_mut(&appointment.id).filter(|stored| {
            !stored.is_deleted()
                && stored.status == AppointmentStatus::Scheduled
                && stored.start_date_time == appointment.start_date_time
        }) else {
            return Ok(false);
        };

        let claimable = !stored.reminder_sent
            || stored
                .reminder_sent_at
                .is_none_or(|sent_at| sent_at < stale_before);

        if claimable {
            stored.reminder_sent = true;
            stored.reminder_sent_at = Some(now);
        }

        Ok(claimable)
    }

    async fn release_reminder(&self, appointment: &Appointment) -> Result<()> {
        if let Some(appointment) = self.appointments.lock().await.get_mut(&appointment.id) {
            appointment.reminder_sent = false;
            appointment.reminder_sent_at = None;
        }

        Ok(())
    }

    async fn create_notification(
        &self,
        values: &CreateNotificationValues<'_>,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: *values.user_id,
            title: values.title.to_string(),
            description: values.description.to_string(),
            notification_type: values.notification_type,
            entity_type: values.entity.map(|(entity_type, _)| entity_type.to_string()),
            entity_id: values.entity.map(|(_, entity_id)| *entity_id),
            read: false,
            read_at: None,
            created_at: Utc::now(),
        };

        self.notifications
            .lock()
            .await
            .insert(notification.id, notification.clone());

        Ok(notification)
    }

    async fn find_notifications(
        &self,
        user_id: &Uuid,
        only_unread: bool,
    ) -> Result<Vec<Notification>> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .lock()
            .await
            .values()
            .filter(|notification| {
                &notification.user_id == user_id && (!only_unread || !notification.read)
            })
            .cloned()
            .collect();

        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(notifications)
    }

    async fn find_single_notification_by_id(
        &self,
        user_id: &Uuid,
        id: &Uuid,
    ) -> Result<Option<Notification>> {
        Ok(self
            .notifications
            .lock()
            .await
            .get(id)
            .filter(|notification| &notification.user_id == user_id)
            .cloned())
    }

    async fn mark_notification_read(
        &self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Result<Notification> {
        let mut notifications = self.notifications.lock().await;
        let notification = notifications
            .entry(notification.id)
            .or_insert_with(|| notification.clone());

        if !notification.read {
            notification.read = true;
            notification.read_at = Some(now);
        }

        Ok(notification.clone())
    }

    async fn mark_all_notifications_read(
        &self,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut changed = 0;

        for notification in self.notifications.lock().await.values_mut() {
            if &notification.user_id == user_id && !notification.read {
                notification.read = true;
                notification.read_at = Some(now);
                changed += 1;
            }
        }

        Ok(changed)
    }

    async fn count_unread_notifications(&self, user_id: &Uuid) -> Result<i64> {
        let count = self
            .notifications
            .lock()
            .await
            .values()
            .filter(|notification| &notification.user_id == user_id && !notification.read)
            .count();

        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}
