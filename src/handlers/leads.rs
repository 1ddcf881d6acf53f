use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::error::ScopeError;
use crate::middleware::auth::{CurrentUser, require_owned_site};
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateFormBody {
    pub name: String,
}

/// POST /api/sites/{id}/forms
pub async fn create_form_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<String>,
    Json(body): Json<CreateFormBody>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ScopeError::Validation("name is required".to_string()));
    }
    let form = state.store.create_form(&site.id, name).await?;
    Ok(Json(json!(form)))
}

/// POST /api/public/forms/{form_id}/submissions: unauthenticated intake.
///
/// Two classes of spam are dropped with a success-shaped response so bots
/// get no signal: a filled honeypot field, and a submit arriving sooner
/// after the form render than a human plausibly types. Everything else is
/// rate limited per `(client ip, form)`.
pub async fn submit_lead_handler(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ScopeError> {
    let form = state
        .store
        .get_form(&form_id)
        .await?
        .ok_or(ScopeError::NotFound)?;

    let honeypot = body.get("_hp").and_then(|v| v.as_str()).unwrap_or("");
    if !honeypot.is_empty() {
        info!(form = %form.id, "honeypot tripped; submission dropped");
        return Ok(Json(json!({"ok": true})));
    }

    if let Some(started_at) = body.get("_startedAt").and_then(|v| v.as_i64()) {
        let elapsed = state.clock.now().timestamp_millis() - started_at;
        if elapsed < state.config.lead_min_elapsed_ms {
            info!(form = %form.id, elapsed, "submission faster than form fill; dropped");
            return Ok(Json(json!({"ok": true})));
        }
    }

    let ip = client_ip(&headers);
    if !state.throttle.allow(&ip, &form.id) {
        return Err(ScopeError::RateLimited);
    }

    let mut data = body;
    if let Some(obj) = data.as_object_mut() {
        obj.remove("_hp");
        obj.remove("_startedAt");
    }
    let id = state
        .store
        .insert_submission(&form.id, &data, &ip, state.clock.now())
        .await?;
    info!(form = %form.id, submission = %id, "lead stored");
    Ok(Json(json!({"ok": true, "id": id})))
}

/// GET /api/sites/{id}/forms/{form_id}/submissions
pub async fn list_submissions_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((site_id, form_id)): Path<(String, String)>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let form = state
        .store
        .get_form(&form_id)
        .await?
        .filter(|f| f.site_id == site.id)
        .ok_or(ScopeError::NotFound)?;
    let submissions = state.store.list_submissions(&form.id).await?;
    Ok(Json(json!({"submissions": submissions})))
}

fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().expect("header"));
        assert_eq!(client_ip(&headers), "203.0.113.7");
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }
}
