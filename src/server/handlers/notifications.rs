use std::sync::Arc;

use axum::extract::State;
use serde::Serialize;
use uuid::Uuid;

use super::common::{ok, require_admin, ApiJson, ApiPath, ApiQuery, ApiResponse};
use crate::auth::Session;
use crate::models::{NewNotification, Notification, NotificationPage, NotificationQuery};
use crate::server::state::AppState;

/// The caller's own notifications.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> ApiResponse<NotificationPage> {
    ok(state
        .storage
        .list_notifications(session.employee_id, &query)
        .await?)
}

/// Rate limited separately by the admission middleware.
pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiJson(input): ApiJson<NewNotification>,
) -> ApiResponse<Notification> {
    ok(state.storage.create_notification(&input).await?)
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResponse<&'static str> {
    state
        .storage
        .mark_notification_read(session.employee_id, id)
        .await?;
    ok("Notification marked as read")
}

#[derive(Debug, Serialize)]
pub struct Affected {
    pub count: u64,
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> ApiResponse<Affected> {
    let count = state
        .storage
        .mark_all_notifications_read(session.employee_id)
        .await?;
    ok(Affected { count })
}

pub async fn cleanup_expired(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> ApiResponse<Affected> {
    require_admin(&session)?;
    let count = state.storage.cleanup_expired_notifications().await?;
    ok(Affected { count })
}
