use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};

use campusnest_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;
use crate::blocking;

/// Validate an HS256 token and return its claims.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| ApiError::Unauthorized(format!("invalid token: {}", e)))
}

/// Resolve the token to an existing, active account.
pub async fn authenticate(state: &AppState, token: &str) -> Result<Claims, ApiError> {
    let claims = decode_token(&state.jwt_secret, token)?;

    let uid = claims.sub.to_string();
    let user = blocking(&state.db, move |db| Ok(db.get_user_by_id(&uid)?)).await?;

    match user {
        None => Err(ApiError::Unauthorized("account no longer exists".into())),
        Some(u) if !u.active => Err(ApiError::forbidden("account is inactive")),
        Some(_) => Ok(claims),
    }
}

/// Extract and validate the bearer token, then expose its claims to handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

    let claims = authenticate(&state, bearer.token()).await?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
