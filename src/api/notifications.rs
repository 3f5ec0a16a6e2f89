//! In-app notifications of the current user

use axum::Extension;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::notifications::Notification;
use crate::notifications::NotificationType;
use crate::storage::Storage;

use super::CurrentUser;
use super::Error;
use super::PathParameters;
use super::QueryParameters;
use super::Success;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NotificationResponse {
    fn from_notification(notification: Notification) -> Self {
        Self {
            id: notification.id,
            title: notification.title,
            description: notification.description,
            notification_type: notification.notification_type,
            entity_type: notification.entity_type,
            entity_id: notification.entity_id,
            read: notification.read,
            read_at: notification.read_at,
            created_at: notification.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Only list unread notifications
    #[serde(default)]
    unread: bool,
}

/// List the notifications of the current user, newest first
pub async fn list<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    QueryParameters(query): QueryParameters<ListQuery>,
) -> Result<Success<Vec<NotificationResponse>>, Error> {
    let notifications = storage
        .find_notifications(&current_user.id, query.unread)
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::ok(
        notifications
            .into_iter()
            .map(NotificationResponse::from_notification)
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    count: i64,
}

pub async fn unread_count<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
) -> Result<Success<CountResponse>, Error> {
    let count = storage
        .count_unread_notifications(&current_user.id)
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::ok(CountResponse { count }))
}

/// Mark a single notification as read
///
/// Marking it again changes nothing
pub async fn mark_read<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    PathParameters(notification_id): PathParameters<Uuid>,
) -> Result<Success<NotificationResponse>, Error> {
    let notification = storage
        .find_single_notification_by_id(&current_user.id, &notification_id)
        .await
        .map_err(Error::internal_server_error)?
        .ok_or_else(|| Error::not_found("Notification not found"))?;

    let notification = if notification.read {
        notification
    } else {
        storage
            .mark_notification_read(&notification, Utc::now())
            .await
            .map_err(Error::internal_server_error)?
    };

    Ok(Success::ok(NotificationResponse::from_notification(
        notification,
    )))
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    updated: u64,
}

/// Mark all notifications of the current user as read
pub async fn mark_all_read<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
) -> Result<Success<MarkAllReadResponse>, Error> {
    let updated = storage
        .mark_all_notifications_read(&current_user.id, Utc::now())
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::ok(MarkAllReadResponse { updated }))
}
