use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::future::join_all;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use campusnest_db::Database;
use campusnest_db::models::{NewNotification, NotificationSettingsRow};
use campusnest_gateway::ConnectionRegistry;
use campusnest_types::api::{
    Claims, CountResponse, DeletedResponse, NotificationResponse, NotificationSettings,
    UpdatedResponse,
};
use campusnest_types::events::LiveEvent;
use campusnest_types::models::NotificationKind;

use crate::error::ApiError;
use crate::state::AppState;
use crate::{blocking, convert};

/// Persists notifications and pushes them to connected users.
#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
    registry: ConnectionRegistry,
}

/// Everything needed to create one notification.
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub related_id: Option<String>,
    pub action_url: Option<String>,
}

impl Notifier {
    pub fn new(db: Arc<Database>, registry: ConnectionRegistry) -> Self {
        Self { db, registry }
    }

    /// Always persists. The live push is skipped when the user turned it off
    /// for the notice's category.
    pub async fn notify(&self, user_id: Uuid, notice: Notice) -> Result<NotificationResponse, ApiError> {
        let uid = user_id.to_string();
        let (row, push) = blocking(&self.db, move |db| {
            let row = db.insert_notification(&NewNotification {
                user_id: &uid,
                kind: notice.kind.as_str(),
                title: &notice.title,
                body: &notice.body,
                related_id: notice.related_id.as_deref(),
                action_url: notice.action_url.as_deref(),
            })?;
            let settings = db.notification_settings(&uid)?;
            Ok((row, push_enabled(&settings, notice.kind)))
        })
        .await?;

        let notification = convert::notification(row)?;
        if !push {
            debug!("notification {} -> {}: push disabled", notification.id, user_id);
            return Ok(notification);
        }

        let outcome = self
            .registry
            .dispatch(
                user_id,
                LiveEvent::Notification {
                    id: notification.id,
                    kind: notification.kind,
                    title: notification.title.clone(),
                    body: notification.body.clone(),
                    related_id: notification.related_id.clone(),
                },
            )
            .await;
        debug!("notification {} -> {}: {:?}", notification.id, user_id, outcome);

        Ok(notification)
    }

    /// Fan one notice out to several users on a background task. The
    /// dispatches run concurrently, so a stalled peer delays nobody else.
    pub fn notify_all(&self, user_ids: Vec<Uuid>, notice: Notice) -> tokio::task::JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            let sends = user_ids.into_iter().map(|user_id| {
                let notifier = &notifier;
                let notice = notice.clone();
                async move {
                    if let Err(e) = notifier.notify(user_id, notice).await {
                        warn!("Failed to notify {}: {}", user_id, e);
                    }
                }
            });
            join_all(sends).await;
        })
    }
}

fn push_enabled(settings: &NotificationSettingsRow, kind: NotificationKind) -> bool {
    match kind {
        NotificationKind::RentalApproved => settings.push_rentals,
        NotificationKind::NewRating => settings.push_ratings,
        NotificationKind::FavoriteUpdated | NotificationKind::NewReport => true,
    }
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0);

    let rows = blocking(&state.db, move |db| {
        Ok(db.list_notifications(&uid, query.unread_only, limit, offset)?)
    })
    .await?;

    let notifications = rows
        .into_iter()
        .map(convert::notification)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(notifications))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let count = blocking(&state.db, move |db| Ok(db.count_unread_notifications(&uid)?)).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let found = blocking(&state.db, move |db| Ok(db.mark_notification_read(id, &uid)?)).await?;

    if !found {
        return Err(ApiError::not_found("notification not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let updated = blocking(&state.db, move |db| Ok(db.mark_all_notifications_read(&uid)?)).await?;
    Ok(Json(UpdatedResponse {
        updated: updated as u64,
    }))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let deleted = blocking(&state.db, move |db| Ok(db.delete_notification(id, &uid)?)).await?;

    if !deleted {
        return Err(ApiError::not_found("notification not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let deleted = blocking(&state.db, move |db| Ok(db.delete_all_notifications(&uid)?)).await?;
    Ok(Json(DeletedResponse {
        deleted: deleted as u64,
    }))
}

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let row = blocking(&state.db, move |db| Ok(db.notification_settings(&uid)?)).await?;
    Ok(Json(convert::settings(row)))
}

/// Replaces the settings; flags missing from the body reset to enabled.
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NotificationSettings>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let row = NotificationSettingsRow {
        email_rentals: req.email_rentals,
        email_ratings: req.email_ratings,
        push_rentals: req.push_rentals,
        push_ratings: req.push_ratings,
    };
    blocking(&state.db, move |db| Ok(db.save_notification_settings(&uid, &row)?)).await?;
    Ok(Json(req))
}
