use axum::{
    Json, Router,
    extract::FromRef,
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Clock, SubmissionThrottle, TtlCache};
use crate::config::Config;
use crate::db::store::Storage;
use crate::handlers::{admin, auth, export, integrations, keywords, leads, lookup, reports, sites};
use crate::oauth::gateway::TokenGateway;

/// Shared application state. Everything mutable is behind its own
/// constructor-injected component; handlers never touch module globals.
#[derive(Clone)]
pub struct AppState {
    pub store: Storage,
    pub http: reqwest::Client,
    pub gateway: Arc<TokenGateway>,
    pub cache: Arc<TtlCache>,
    pub throttle: Arc<SubmissionThrottle>,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Storage, clock: Arc<dyn Clock>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("seoscope/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("FATAL: initialize shared HTTP client failed");
        let gateway = Arc::new(TokenGateway::new(
            store.clone(),
            http.clone(),
            config.clone(),
            clock.clone(),
        ));
        let cache = Arc::new(TtlCache::new(config.cache_ttl_ms, clock.clone()));
        let throttle = Arc::new(SubmissionThrottle::new(
            config.lead_rate_limit,
            config.lead_rate_window_secs,
            clock.clone(),
        ));
        Self {
            store,
            http,
            gateway,
            cache,
            throttle,
            config,
            clock,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        Key::derive_from(state.config.session_secret.as_bytes())
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route(
            "/api/sites",
            post(sites::create_site_handler).get(sites::list_sites_handler),
        )
        .route(
            "/api/sites/{id}",
            get(sites::get_site_handler).delete(sites::delete_site_handler),
        )
        .route(
            "/api/sites/{id}/integrations",
            get(integrations::list_integrations_handler),
        )
        .route(
            "/api/sites/{id}/integrations/business_profile/locations",
            get(integrations::list_locations_handler),
        )
        .route(
            "/api/sites/{id}/integrations/{provider}/connect",
            post(integrations::connect_handler),
        )
        .route(
            "/api/sites/{id}/integrations/{provider}/disconnect",
            post(integrations::disconnect_handler),
        )
        .route(
            "/api/sites/{id}/integrations/{provider}/select",
            post(integrations::select_resource_handler),
        )
        .route(
            "/api/oauth/google/callback",
            get(integrations::oauth_callback_handler),
        )
        .route(
            "/api/sites/{id}/reports/{kind}",
            get(reports::site_report_handler),
        )
        .route(
            "/api/sites/{id}/keywords",
            get(keywords::list_keywords_handler).post(keywords::add_keyword_handler),
        )
        .route(
            "/api/sites/{id}/keywords/refresh",
            post(keywords::refresh_keywords_handler),
        )
        .route("/api/sites/{id}/forms", post(leads::create_form_handler))
        .route(
            "/api/sites/{id}/forms/{form_id}/submissions",
            get(leads::list_submissions_handler),
        )
        .route(
            "/api/public/forms/{form_id}/submissions",
            post(leads::submit_lead_handler),
        )
        .route("/api/sites/{id}/export", get(export::export_report_handler))
        .route("/api/tools/whois", get(lookup::whois_handler))
        .route(
            "/api/admin/settings/{key}",
            get(admin::get_setting_handler).put(admin::put_setting_handler),
        )
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
