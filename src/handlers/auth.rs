use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::error::ScopeError;
use crate::middleware::auth::{CurrentUser, hash_token, new_session_token};
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct CredentialsBody {
    pub email: String,
    pub password: String,
}

pub fn hash_password(password: &str) -> Result<String, ScopeError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ScopeError::Internal(format!("password hash: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
        .is_ok()
}

/// POST /api/auth/register: open registration; the very first account
/// becomes the admin.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> Result<Json<Value>, ScopeError> {
    let email = body.email.trim().to_ascii_lowercase();
    if email.is_empty() || body.password.len() < 8 {
        return Err(ScopeError::Validation(
            "email and a password of at least 8 characters are required".to_string(),
        ));
    }
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ScopeError::Validation("email already registered".to_string()));
    }
    let is_admin = state.store.count_users().await? == 0;
    let password_hash = hash_password(&body.password)?;
    let user = state
        .store
        .create_user(&email, &password_hash, is_admin, state.clock.now())
        .await?;
    info!(user = %user.id, admin = is_admin, "user registered");
    Ok(Json(json!({"id": user.id, "email": user.email, "isAdmin": user.is_admin})))
}

/// POST /api/auth/login: verify the password and mint a session token.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> Result<Json<Value>, ScopeError> {
    let email = body.email.trim().to_ascii_lowercase();
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or(ScopeError::Unauthorized)?;
    if !verify_password(&body.password, &user.password_hash) {
        return Err(ScopeError::Unauthorized);
    }

    let token = new_session_token();
    let expires_at = state.clock.now() + Duration::hours(state.config.session_ttl_hours);
    state
        .store
        .insert_session(&hash_token(&token), &user.id, expires_at)
        .await?;
    info!(user = %user.id, "session created");
    Ok(Json(json!({"token": token, "expiresAt": expires_at})))
}

/// POST /api/auth/logout: drop the presented session.
pub async fn logout_handler(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Value>, ScopeError> {
    state.store.delete_session(&current.token_hash).await?;
    Ok(Json(json!({"ok": true})))
}
