use axum::RequestPartsExt;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::db::models::{SiteRow, UserRow};
use crate::error::ScopeError;
use crate::router::AppState;

/// Mint an opaque session token. Only its hash is persisted.
pub fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// The authenticated caller, resolved from the bearer session token.
/// Rejection carries no detail about why the session was invalid.
pub struct CurrentUser {
    pub user: UserRow,
    pub token_hash: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ScopeError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ScopeError::Unauthorized)?;

        let token_hash = hash_token(bearer.token());
        let Some((session, user)) = state.store.session_with_user(&token_hash).await? else {
            return Err(ScopeError::Unauthorized);
        };
        if state.clock.now() >= session.expires_at {
            state.store.delete_session(&token_hash).await?;
            return Err(ScopeError::Unauthorized);
        }
        Ok(CurrentUser { user, token_hash })
    }
}

/// Caller with admin rights; everything the operator-settings surface
/// requires.
pub struct AdminUser(pub UserRow);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ScopeError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let current = CurrentUser::from_request_parts(parts, state).await?;
        if !current.user.is_admin {
            return Err(ScopeError::Forbidden);
        }
        Ok(AdminUser(current.user))
    }
}

/// Ownership guard: every gateway call is preceded by this check. The
/// gateway itself does not re-verify.
pub async fn require_owned_site(
    state: &AppState,
    user: &UserRow,
    site_id: &str,
) -> Result<SiteRow, ScopeError> {
    let site = state
        .store
        .get_site(site_id)
        .await?
        .ok_or(ScopeError::NotFound)?;
    if site.owner_user_id != user.id {
        return Err(ScopeError::Forbidden);
    }
    Ok(site)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_stable_hex() {
        let a = hash_token("abc");
        let b = hash_token("abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_token("abd"));
    }

    #[test]
    fn session_tokens_are_unique() {
        assert_ne!(new_session_token(), new_session_token());
    }
}
