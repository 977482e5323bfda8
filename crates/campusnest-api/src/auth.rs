use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use uuid::Uuid;

use campusnest_db::models::NewUser;
use campusnest_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::error::ApiError;
use crate::state::AppState;
use crate::{blocking, convert};

/// Argon2id with a fresh OS-random salt.
fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let full_name = req.full_name.trim().to_string();

    // Validate input
    if !email.contains('@') {
        return Err(ApiError::validation("email must contain '@'"));
    }
    if !(8..=100).contains(&req.password.chars().count()) {
        return Err(ApiError::validation("password must be 8 to 100 characters"));
    }
    if !(3..=255).contains(&full_name.chars().count()) {
        return Err(ApiError::validation("full name must be 3 to 255 characters"));
    }
    if req.phone.as_ref().is_some_and(|p| p.chars().count() > 20) {
        return Err(ApiError::validation("phone must be at most 20 characters"));
    }

    let password_hash = hash_password(&req.password)?;

    let user_id = Uuid::new_v4();
    let new_user = NewUser {
        id: user_id.to_string(),
        email,
        password_hash,
        kind: req.kind.to_string(),
        full_name,
        phone: req.phone,
    };

    let row = blocking(&state.db, move |db| {
        if !db.create_user(&new_user)? {
            return Err(ApiError::Conflict("email already registered".into()));
        }
        db.get_user_by_id(&new_user.id)?
            .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", new_user.id).into())
    })
    .await?;

    let user = convert::user_profile(row)?;
    let access_token = create_token(&state.jwt_secret, user_id, &user.full_name, state.token_ttl)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token,
            token_type: "bearer",
            user,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let user = blocking(&state.db, move |db| Ok(db.get_user_by_email(&email)?))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid email or password".into()))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("corrupt password hash for {}: {}", user.id, e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized("invalid email or password".into()))?;

    if !user.active {
        return Err(ApiError::forbidden("account is inactive"));
    }

    let user = convert::user_profile(user)?;
    let access_token = create_token(&state.jwt_secret, user.id, &user.full_name, state.token_ttl)?;

    Ok(Json(AuthResponse {
        access_token,
        token_type: "bearer",
        user,
    }))
}

pub fn create_token(
    secret: &str,
    user_id: Uuid,
    name: &str,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
