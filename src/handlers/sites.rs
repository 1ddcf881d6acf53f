use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use url::Url;

use crate::error::ScopeError;
use crate::middleware::auth::{CurrentUser, require_owned_site};
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSiteBody {
    pub name: String,
    pub domain: String,
}

/// Lower-case and strip scheme/path so the domain is usable as a lookup key
/// elsewhere (rank tracking, PageSpeed, whois).
pub fn normalize_domain(input: &str) -> Result<String, ScopeError> {
    let trimmed = input.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return Err(ScopeError::Validation("domain is required".to_string()));
    }
    let candidate = if trimmed.contains("://") {
        trimmed
    } else {
        format!("https://{trimmed}")
    };
    let host = Url::parse(&candidate)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .ok_or_else(|| ScopeError::Validation(format!("not a valid domain: {input}")))?;
    Ok(host)
}

pub async fn create_site_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(body): Json<CreateSiteBody>,
) -> Result<Json<Value>, ScopeError> {
    let domain = normalize_domain(&body.domain)?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ScopeError::Validation("name is required".to_string()));
    }
    let site = state
        .store
        .create_site(&current.user.id, name, &domain, state.clock.now())
        .await?;
    info!(site = %site.id, domain = %site.domain, "site registered");
    Ok(Json(json!(site)))
}

pub async fn list_sites_handler(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Value>, ScopeError> {
    let sites = state.store.list_sites(&current.user.id).await?;
    Ok(Json(json!({"sites": sites})))
}

pub async fn get_site_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<String>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let integrations = state.store.list_integrations(&site.id).await?;
    let statuses: Vec<Value> = integrations
        .iter()
        .map(|row| {
            json!({
                "provider": row.provider,
                "status": row.status,
                "connectedAt": row.connected_at,
            })
        })
        .collect();
    Ok(Json(json!({"site": site, "integrations": statuses})))
}

pub async fn delete_site_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<String>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    state.store.delete_site(&site.id).await?;
    state.cache.invalidate_site(&site.id);
    info!(site = %site.id, "site deleted");
    Ok(Json(json!({"ok": true})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_are_lowercased_and_stripped() {
        assert_eq!(
            normalize_domain("HTTPS://Example.COM/path?q=1").expect("ok"),
            "example.com"
        );
        assert_eq!(
            normalize_domain("  shop.example.org  ").expect("ok"),
            "shop.example.org"
        );
        assert_eq!(
            normalize_domain("www.example.com/landing").expect("ok"),
            "www.example.com"
        );
        assert!(normalize_domain("   ").is_err());
    }
}
