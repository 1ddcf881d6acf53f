use axum::{
    Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use chrono::Duration;
use oauth2::{AuthorizationCode, PkceCodeChallenge, PkceCodeVerifier};
use serde::Deserialize;
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use time::Duration as CookieDuration;
use tracing::info;

use crate::db::models::{IntegrationRow, IntegrationStatus};
use crate::error::ScopeError;
use crate::middleware::auth::{CurrentUser, require_owned_site};
use crate::oauth::credential::{Credential, DEFAULT_EXPIRES_SECS, TokenSet};
use crate::oauth::endpoints::OauthEndpoints;
use crate::providers::{Provider, woocommerce::WooCredentials};
use crate::router::AppState;

const CSRF_COOKIE: &str = "oauth_csrf_token";
const PKCE_COOKIE: &str = "oauth_pkce_verifier";
const SITE_COOKIE: &str = "oauth_site";

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectResourceBody {
    #[serde(rename = "resourceId")]
    pub resource_id: String,
}

/// GET /api/sites/{id}/integrations
pub async fn list_integrations_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<String>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let rows = state.store.list_integrations(&site.id).await?;
    let summaries: Vec<Value> = rows.iter().map(summarize_row).collect();
    Ok(Json(json!({"integrations": summaries})))
}

fn summarize_row(row: &IntegrationRow) -> Value {
    let (email, last_error, linked_to) = match row.credential() {
        Some(Credential::Owned { token_set }) => (token_set.email, token_set.last_error, None),
        Some(Credential::Linked { anchor }) => (None, None, Some(anchor)),
        None => (None, None, None),
    };
    json!({
        "provider": row.provider,
        "status": row.status,
        "connectedAt": row.connected_at,
        "email": email,
        "lastError": last_error,
        "linkedTo": linked_to,
        "propertyId": row.config_str("property_id"),
        "adsCustomerId": row.config_str("ads_customer_id"),
        "locationId": row.config_str("location_id"),
        "siteUrl": row.config_str("site_url"),
    })
}

/// POST /api/sites/{id}/integrations/{provider}/connect
///
/// The anchor provider starts the OAuth consent dance; linked siblings only
/// record the back-reference; key-based providers store their credential or
/// nothing at all.
pub async fn connect_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((site_id, provider)): Path<(String, String)>,
    jar: PrivateCookieJar,
    body: Option<Json<Value>>,
) -> Result<Response, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let provider = parse_provider(&provider)?;
    let body = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));

    match provider {
        Provider::GoogleAnalytics => start_oauth_connect(state, site.id, jar).await,
        Provider::SearchConsole | Provider::GoogleAds | Provider::BusinessProfile => {
            connect_linked(state, site.id, provider).await
        }
        Provider::Woocommerce => connect_woocommerce(state, site.id, body).await,
        Provider::RankTracker | Provider::Pagespeed => connect_keyless(state, site.id, provider).await,
    }
}

fn parse_provider(raw: &str) -> Result<Provider, ScopeError> {
    raw.parse()
        .map_err(|_| ScopeError::Validation(format!("unknown provider: {raw}")))
}

async fn start_oauth_connect(
    state: AppState,
    site_id: String,
    jar: PrivateCookieJar,
) -> Result<Response, ScopeError> {
    let settings = state.gateway.oauth_settings().await?;
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let (auth_url, csrf) = OauthEndpoints::build_authorize_url(
        &settings,
        &state.config.google_auth_uri,
        &state.config.google_token_uri,
        challenge,
    )?;

    // Keep whatever config the row already carries (a previously selected
    // property survives a reconnect).
    let existing = state
        .store
        .get_integration(&site_id, Provider::GoogleAnalytics)
        .await?;
    let config = existing.map(|row| row.config).unwrap_or_else(|| json!({}));
    state
        .store
        .upsert_integration(
            &site_id,
            Provider::GoogleAnalytics,
            IntegrationStatus::Pending,
            &config,
            None,
        )
        .await?;

    let jar = jar
        .add(build_cookie(CSRF_COOKIE, csrf.secret().to_string()))
        .add(build_cookie(PKCE_COOKIE, verifier.secret().to_string()))
        .add(build_cookie(SITE_COOKIE, site_id));

    info!("dispatching OAuth consent redirect");
    Ok((jar, Json(json!({"authorizeUrl": auth_url.to_string()}))).into_response())
}

async fn connect_linked(
    state: AppState,
    site_id: String,
    provider: Provider,
) -> Result<Response, ScopeError> {
    let anchor = provider
        .anchor()
        .ok_or_else(|| ScopeError::Internal(format!("{provider} has no anchor")))?;
    let anchor_connected = state
        .store
        .get_integration(&site_id, anchor)
        .await?
        .map(|row| row.status == IntegrationStatus::Connected)
        .unwrap_or(false);
    if !anchor_connected {
        return Err(ScopeError::NotConnected(anchor));
    }

    let existing = state.store.get_integration(&site_id, provider).await?;
    let mut config = existing.map(|row| row.config).unwrap_or_else(|| json!({}));
    config["credential"] = serde_json::to_value(Credential::Linked { anchor })?;
    let row = state
        .store
        .upsert_integration(
            &site_id,
            provider,
            IntegrationStatus::Connected,
            &config,
            Some(state.clock.now()),
        )
        .await?;
    state.cache.invalidate_site(&site_id);
    info!(site = %site_id, provider = %provider, "linked integration connected");
    Ok(Json(summarize_row(&row)).into_response())
}

async fn connect_woocommerce(
    state: AppState,
    site_id: String,
    body: Value,
) -> Result<Response, ScopeError> {
    let creds: WooCredentials = serde_json::from_value(body)
        .map_err(|_| ScopeError::Validation(
            "store_url, consumer_key and consumer_secret are required".to_string(),
        ))?;
    let config = json!({"woocommerce": creds});
    let row = state
        .store
        .upsert_integration(
            &site_id,
            Provider::Woocommerce,
            IntegrationStatus::Connected,
            &config,
            Some(state.clock.now()),
        )
        .await?;
    state.cache.invalidate_site(&site_id);
    Ok(Json(summarize_row(&row)).into_response())
}

async fn connect_keyless(
    state: AppState,
    site_id: String,
    provider: Provider,
) -> Result<Response, ScopeError> {
    let row = state
        .store
        .upsert_integration(
            &site_id,
            provider,
            IntegrationStatus::Connected,
            &json!({}),
            Some(state.clock.now()),
        )
        .await?;
    Ok(Json(summarize_row(&row)).into_response())
}

/// GET /api/oauth/google/callback: exchanges the auth code for tokens and
/// anchors them on the analytics integration. The site binding comes from
/// the private cookie written at connect time, so no bearer session is
/// needed on the redirect back.
pub async fn oauth_callback_handler(
    State(state): State<AppState>,
    Query(query): Query<AuthCallbackQuery>,
    jar: PrivateCookieJar,
) -> Result<Response, ScopeError> {
    let csrf_cookie = jar
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_owned())
        .ok_or_else(|| ScopeError::Validation("missing CSRF token cookie".to_string()))?;
    let pkce_cookie = jar
        .get(PKCE_COOKIE)
        .map(|c| c.value().to_owned())
        .ok_or_else(|| ScopeError::Validation("missing PKCE verifier cookie".to_string()))?;
    let site_id = jar
        .get(SITE_COOKIE)
        .map(|c| c.value().to_owned())
        .ok_or_else(|| ScopeError::Validation("missing site binding cookie".to_string()))?;
    let jar = clear_oauth_cookies(jar);

    let state_param = query
        .state
        .as_deref()
        .ok_or_else(|| ScopeError::Validation("missing `state` in callback".to_string()))?;
    if !bool::from(state_param.as_bytes().ct_eq(csrf_cookie.as_bytes())) {
        return Err(ScopeError::Validation("CSRF token mismatch".to_string()));
    }
    let code = query
        .code
        .as_deref()
        .ok_or_else(|| ScopeError::Validation("missing `code` in callback".to_string()))?;

    let settings = state.gateway.oauth_settings().await?;
    let exchange = OauthEndpoints::exchange_authorization_code(
        &settings,
        &state.config.google_auth_uri,
        &state.config.google_token_uri,
        AuthorizationCode::new(code.to_owned()),
        PkceCodeVerifier::new(pkce_cookie),
        &state.http,
    )
    .await?;

    if exchange.refresh_token.is_none() {
        return Err(ScopeError::Validation(
            "OAuth response missing refresh_token; ensure access_type=offline and prompt=consent are allowed for this client/user"
                .to_string(),
        ));
    }
    if exchange.access_token.is_empty() {
        return Err(ScopeError::TokenMissing);
    }

    let now = state.clock.now();
    let lifetime = exchange
        .expires_in
        .map(|d| Duration::seconds(d.as_secs() as i64))
        .unwrap_or_else(|| Duration::seconds(DEFAULT_EXPIRES_SECS));
    let token_set = TokenSet {
        access_token: exchange.access_token,
        refresh_token: exchange.refresh_token,
        expires_at: now + lifetime,
        scope: exchange.scope,
        email: exchange.email.clone(),
        last_error: None,
    };

    let existing = state
        .store
        .get_integration(&site_id, Provider::GoogleAnalytics)
        .await?;
    let mut config = existing.map(|row| row.config).unwrap_or_else(|| json!({}));
    config["credential"] = serde_json::to_value(Credential::Owned { token_set })?;
    state
        .store
        .upsert_integration(
            &site_id,
            Provider::GoogleAnalytics,
            IntegrationStatus::Connected,
            &config,
            Some(now),
        )
        .await?;
    // A reconnect may be against a different account; drop cached reports.
    state.cache.invalidate_site(&site_id);

    info!(site = %site_id, "OAuth callback stored credential");
    Ok((
        jar,
        Json(json!({"connected": true, "email": exchange.email})),
    )
        .into_response())
}

/// POST /api/sites/{id}/integrations/{provider}/disconnect
///
/// Clears the credential but keeps the row (and its selectors) so a
/// reconnect lands on familiar configuration.
pub async fn disconnect_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((site_id, provider)): Path<(String, String)>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let provider = parse_provider(&provider)?;

    if let Some(row) = state.store.get_integration(&site.id, provider).await? {
        let mut config = row.config;
        if let Some(obj) = config.as_object_mut() {
            obj.remove("credential");
            obj.remove("woocommerce");
        }
        state
            .store
            .update_integration(&site.id, provider, IntegrationStatus::Disconnected, &config)
            .await?;
    }
    state.cache.invalidate_site(&site.id);
    info!(site = %site.id, provider = %provider, "integration disconnected");
    Ok(Json(json!({"ok": true})))
}

/// POST /api/sites/{id}/integrations/{provider}/select: record the
/// provider-specific resource selector the user picked.
pub async fn select_resource_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((site_id, provider)): Path<(String, String)>,
    Json(body): Json<SelectResourceBody>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let provider = parse_provider(&provider)?;
    let field = match provider {
        Provider::GoogleAnalytics => "property_id",
        Provider::GoogleAds => "ads_customer_id",
        Provider::BusinessProfile => "location_id",
        Provider::SearchConsole => "site_url",
        _ => {
            return Err(ScopeError::Validation(format!(
                "{provider} has no selectable resource"
            )));
        }
    };

    let row = state
        .store
        .get_integration(&site.id, provider)
        .await?
        .ok_or(ScopeError::NotConnected(provider))?;
    let mut config = row.config;
    config[field] = json!(body.resource_id);
    state
        .store
        .update_integration(&site.id, provider, row.status, &config)
        .await?;
    // Reports fetched under the old selector must not survive the switch.
    state.cache.invalidate_site(&site.id);
    info!(site = %site.id, provider = %provider, "resource selector updated");
    Ok(Json(json!({"ok": true})))
}

/// GET /api/sites/{id}/integrations/business_profile/locations: the
/// selector list, cached like a report.
pub async fn list_locations_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<String>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let key = crate::cache::TtlCache::key(&site.id, "gbp-locations", &[]);
    if let Some(hit) = state.cache.get(&key) {
        return Ok(Json(hit));
    }
    let grant = state
        .gateway
        .access(&site.id, Provider::BusinessProfile)
        .await?;
    let data = crate::providers::business_profile::list_locations(
        &state.http,
        &state.config.business_profile_api_base,
        &grant.access_token,
    )
    .await?;
    state.cache.put(key, data.clone());
    Ok(Json(data))
}

fn clear_oauth_cookies(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(clear_cookie(CSRF_COOKIE))
        .remove(clear_cookie(PKCE_COOKIE))
        .remove(clear_cookie(SITE_COOKIE))
}

fn build_cookie(name: &str, value: String) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::minutes(15))
        .build()
}

fn clear_cookie(name: &str) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}
