mod service;

pub use service::MessageService;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use campusnest_types::api::{Claims, SendMessageRequest, UpdatedResponse};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.messages.send(claims.sub, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.messages.list_conversations(claims.sub).await?))
}

pub async fn get_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(counterpart_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state
        .messages
        .get_history(claims.sub, counterpart_id, query.limit, query.offset)
        .await?;
    Ok(Json(history))
}

pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(counterpart_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .messages
        .mark_conversation_read(claims.sub, counterpart_id)
        .await?;
    Ok(Json(UpdatedResponse {
        updated: updated as u64,
    }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.messages.mark_read(claims.sub, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.messages.delete(claims.sub, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
