use axum::{Extension, Json, extract::State, response::IntoResponse};

use campusnest_db::Database;
use campusnest_types::api::{Claims, UpdateProfileRequest};
use campusnest_types::models::UserKind;

use crate::error::ApiError;
use crate::state::AppState;
use crate::{blocking, convert};

/// Role of a stored user; a missing user is 404.
pub(crate) fn user_kind(db: &Database, id: &str) -> Result<UserKind, ApiError> {
    let user = db
        .get_user_by_id(id)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(user.kind.parse().map_err(anyhow::Error::from)?)
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let row = blocking(&state.db, move |db| Ok(db.get_user_by_id(&uid)?))
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    Ok(Json(convert::user_profile(row)?))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let full_name = req.full_name.map(|n| n.trim().to_string());
    if full_name
        .as_ref()
        .is_some_and(|n| !(3..=255).contains(&n.chars().count()))
    {
        return Err(ApiError::validation("full name must be 3 to 255 characters"));
    }
    if req.phone.as_ref().is_some_and(|p| p.chars().count() > 20) {
        return Err(ApiError::validation("phone must be at most 20 characters"));
    }

    let uid = claims.sub.to_string();
    let row = blocking(&state.db, move |db| {
        Ok(db.update_profile(
            &uid,
            full_name.as_deref(),
            req.phone.as_deref(),
            req.photo_url.as_deref(),
        )?)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("user not found"))?;

    Ok(Json(convert::user_profile(row)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use axum::body::to_bytes;
    use campusnest_types::api::UserProfile;

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let state = test_support::state();
        let uid = test_support::user(&state, "Ana", "student");
        let claims = Claims {
            sub: uid,
            name: "Ana".into(),
            exp: usize::MAX,
        };

        let resp = update_me(
            State(state.clone()),
            Extension(claims.clone()),
            Json(UpdateProfileRequest {
                phone: Some("2221234567".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap()
        .into_response();

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let profile: UserProfile = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(profile.full_name, "Ana");
        assert_eq!(profile.phone.as_deref(), Some("2221234567"));

        let short = update_me(
            State(state),
            Extension(claims),
            Json(UpdateProfileRequest {
                full_name: Some(" A ".into()),
                ..Default::default()
            }),
        )
        .await;
        assert!(matches!(short, Err(ApiError::Validation(_))));
    }
}
