use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ScopeError;
use crate::handlers::sites::normalize_domain;
use crate::middleware::auth::CurrentUser;
use crate::providers::whois;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct WhoisQuery {
    pub domain: String,
}

/// GET /api/tools/whois: one-shot whois/DNS lookup, explicitly timed out.
pub async fn whois_handler(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(query): Query<WhoisQuery>,
) -> Result<Json<Value>, ScopeError> {
    let domain = normalize_domain(&query.domain)?;
    let data = whois::lookup(
        &state.http,
        &state.config.whois_api_base,
        &domain,
        state.config.lookup_timeout_secs,
    )
    .await?;
    Ok(Json(data))
}
