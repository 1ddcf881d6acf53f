use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use tracing::info;

use crate::error::ScopeError;
use crate::middleware::auth::AdminUser;
use crate::oauth::endpoints::OauthClientSettings;
use crate::oauth::gateway::GOOGLE_OAUTH_SETTINGS_KEY;
use crate::router::AppState;

pub const ADS_DEVELOPER_TOKEN_KEY: &str = "ads_developer_token";
pub const RANK_API_KEY: &str = "rank_api_key";
pub const PAGESPEED_API_KEY: &str = "pagespeed_api_key";

const STRING_KEYS: &[&str] = &[ADS_DEVELOPER_TOKEN_KEY, RANK_API_KEY, PAGESPEED_API_KEY];

/// PUT /api/admin/settings/{key}: operator credentials. Validated against
/// the expected shape per key before storage.
pub async fn put_setting_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, ScopeError> {
    if key == GOOGLE_OAUTH_SETTINGS_KEY {
        let settings: OauthClientSettings = serde_json::from_value(value)?;
        state.store.put_setting(&key, &settings).await?;
    } else if STRING_KEYS.contains(&key.as_str()) {
        let secret = value
            .as_str()
            .ok_or_else(|| ScopeError::Validation(format!("{key} must be a string")))?;
        state.store.put_setting(&key, &secret.to_string()).await?;
    } else {
        return Err(ScopeError::NotFound);
    }
    info!(key = %key, "operator setting updated");
    Ok(Json(json!({"ok": true})))
}

/// GET /api/admin/settings/{key}: presence check only; secrets are never
/// echoed back.
pub async fn get_setting_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(key): Path<String>,
) -> Result<Json<Value>, ScopeError> {
    if key != GOOGLE_OAUTH_SETTINGS_KEY && !STRING_KEYS.contains(&key.as_str()) {
        return Err(ScopeError::NotFound);
    }
    let configured = state.store.get_setting::<Value>(&key).await?.is_some();
    Ok(Json(json!({"key": key, "configured": configured})))
}
