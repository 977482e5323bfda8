use axum::{
    Json,
    extract::{Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use campusnest_gateway::handle_connection;

use crate::error::ApiError;
use crate::middleware::authenticate;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    pub token: Option<String>,
}

/// `GET /ws?token=<jwt>`. The token is checked before the upgrade, so a
/// socket is only ever opened for an authenticated, active user.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<LiveQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .ok_or_else(|| ApiError::Unauthorized("missing token".into()))?;
    let claims = authenticate(&state, &token).await?;

    let registry = state.registry.clone();
    let handler = state.messages.clone();

    Ok(ws
        .on_upgrade(move |socket| {
            handle_connection(socket, registry, handler, claims.sub, claims.name)
        })
        .into_response())
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connections": state.registry.len(),
    }))
}
