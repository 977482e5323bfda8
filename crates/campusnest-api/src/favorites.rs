use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use campusnest_types::api::{Claims, FavoriteStatus};

use crate::error::ApiError;
use crate::state::AppState;
use crate::{blocking, convert};

pub async fn add_favorite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(property_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let pid = property_id.to_string();

    blocking(&state.db, move |db| {
        if db.get_property(&pid)?.is_none() {
            return Err(ApiError::not_found("property not found"));
        }
        if !db.add_favorite(&uid, &pid)? {
            return Err(ApiError::Conflict("property is already a favorite".into()));
        }
        Ok(())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(FavoriteStatus { is_favorite: true })))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(property_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let pid = property_id.to_string();
    let removed = blocking(&state.db, move |db| Ok(db.remove_favorite(&uid, &pid)?)).await?;

    if !removed {
        return Err(ApiError::not_found("property is not a favorite"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let rows = blocking(&state.db, move |db| Ok(db.favorite_properties(&uid)?)).await?;

    let properties = rows
        .into_iter()
        .map(|row| convert::property(row, None))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(properties))
}

pub async fn check_favorite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(property_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let pid = property_id.to_string();
    let is_favorite = blocking(&state.db, move |db| Ok(db.is_favorite(&uid, &pid)?)).await?;

    Ok(Json(FavoriteStatus { is_favorite }))
}
