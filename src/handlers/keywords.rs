use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ScopeError;
use crate::handlers::admin::RANK_API_KEY;
use crate::middleware::auth::{CurrentUser, require_owned_site};
use crate::providers::rank::{RankConfig, refresh_site_keywords};
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct AddKeywordBody {
    pub phrase: String,
}

/// GET /api/sites/{id}/keywords
pub async fn list_keywords_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<String>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let keywords = state.store.list_keywords(&site.id).await?;
    Ok(Json(json!({"keywords": keywords})))
}

/// POST /api/sites/{id}/keywords
pub async fn add_keyword_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<String>,
    Json(body): Json<AddKeywordBody>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let phrase = body.phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return Err(ScopeError::Validation("phrase is required".to_string()));
    }
    let existing = state.store.list_keywords(&site.id).await?;
    if existing.iter().any(|k| k.phrase == phrase) {
        return Err(ScopeError::Validation(format!("already tracking \"{phrase}\"")));
    }
    let keyword = state
        .store
        .add_keyword(&site.id, &phrase, state.clock.now())
        .await?;
    Ok(Json(json!(keyword)))
}

/// POST /api/sites/{id}/keywords/refresh: run the sequential rank fetch
/// loop for every tracked keyword. Runs within this request; the response
/// carries the per-keyword outcomes.
pub async fn refresh_keywords_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<String>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let api_key: String = state
        .store
        .get_setting(RANK_API_KEY)
        .await?
        .ok_or(ScopeError::CredentialsMissing("rank tracker API key"))?;
    let cfg = RankConfig {
        api_base: &state.config.rank_api_base,
        api_key: &api_key,
        delay_ms: state.config.rank_delay_ms,
    };
    let summary =
        refresh_site_keywords(&state.store, &state.http, &cfg, &site, state.clock.as_ref()).await?;
    Ok(Json(summary))
}
