use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;
use tracing::debug;

use crate::cache::TtlCache;
use crate::db::models::{IntegrationStatus, SiteRow};
use crate::error::ScopeError;
use crate::handlers::admin::{ADS_DEVELOPER_TOKEN_KEY, PAGESPEED_API_KEY};
use crate::middleware::auth::{CurrentUser, require_owned_site};
use crate::providers::{
    Provider, ReportRange, ads, analytics, business_profile, pagespeed, search_console,
    woocommerce,
};
use crate::router::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Analytics,
    SearchConsole,
    Ads,
    BusinessProfile,
    Pagespeed,
    Woocommerce,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Analytics => "analytics",
            ReportKind::SearchConsole => "search-console",
            ReportKind::Ads => "ads",
            ReportKind::BusinessProfile => "business-profile",
            ReportKind::Pagespeed => "pagespeed",
            ReportKind::Woocommerce => "woocommerce",
        }
    }
}

impl FromStr for ReportKind {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analytics" => Ok(ReportKind::Analytics),
            "search-console" => Ok(ReportKind::SearchConsole),
            "ads" => Ok(ReportKind::Ads),
            "business-profile" => Ok(ReportKind::BusinessProfile),
            "pagespeed" => Ok(ReportKind::Pagespeed),
            "woocommerce" => Ok(ReportKind::Woocommerce),
            _ => Err(ScopeError::Validation(format!("unknown report kind: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportQuery {
    pub days: Option<i64>,
    pub dimension: Option<String>,
    pub limit: Option<u32>,
    pub strategy: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReportParams {
    pub days: i64,
    pub dimension: String,
    pub limit: u32,
    pub strategy: String,
}

impl ReportParams {
    pub fn resolve(kind: ReportKind, query: &ReportQuery) -> Self {
        let default_dimension = match kind {
            ReportKind::Analytics => "sessionDefaultChannelGroup",
            ReportKind::SearchConsole => "query",
            _ => "",
        };
        Self {
            days: query.days.unwrap_or(28).clamp(1, 365),
            dimension: query
                .dimension
                .clone()
                .unwrap_or_else(|| default_dimension.to_string()),
            limit: query.limit.unwrap_or(25).clamp(1, 250),
            strategy: query
                .strategy
                .clone()
                .unwrap_or_else(|| "mobile".to_string()),
        }
    }

    fn cache_params(&self, kind: ReportKind) -> Vec<(&'static str, String)> {
        let days = self.days.to_string();
        match kind {
            ReportKind::Analytics | ReportKind::SearchConsole => vec![
                ("days", days),
                ("dimension", self.dimension.clone()),
                ("limit", self.limit.to_string()),
            ],
            ReportKind::Pagespeed => vec![("strategy", self.strategy.clone())],
            _ => vec![("days", days)],
        }
    }
}

/// GET /api/sites/{id}/reports/{kind}
pub async fn site_report_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((site_id, kind)): Path<(String, String)>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Value>, ScopeError> {
    let site = require_owned_site(&state, &current.user, &site_id).await?;
    let kind: ReportKind = kind.parse()?;
    let params = ReportParams::resolve(kind, &query);
    let data = cached_report(&state, &site, kind, &params).await?;
    Ok(Json(data))
}

/// Cache-through report fetch shared by the report route and the export
/// gate. On an upstream 429 with a previously cached (possibly expired)
/// payload, the stale copy is served flagged `rateLimited` instead of
/// failing the request.
pub(crate) async fn cached_report(
    state: &AppState,
    site: &SiteRow,
    kind: ReportKind,
    params: &ReportParams,
) -> Result<Value, ScopeError> {
    let cache_params = params.cache_params(kind);
    let borrowed: Vec<(&str, &str)> = cache_params
        .iter()
        .map(|(k, v)| (*k, v.as_str()))
        .collect();
    let key = TtlCache::key(&site.id, kind.as_str(), &borrowed);

    if let Some(hit) = state.cache.get(&key) {
        debug!(key = %key, "report cache hit");
        return Ok(hit);
    }

    match fetch_report(state, site, kind, params).await {
        Ok(data) => {
            state.cache.put(key, data.clone());
            Ok(data)
        }
        Err(ScopeError::RateLimited) => match state.cache.get_stale(&key) {
            Some(mut stale) => {
                if let Some(obj) = stale.as_object_mut() {
                    obj.insert("rateLimited".to_string(), json!(true));
                }
                Ok(stale)
            }
            None => Err(ScopeError::RateLimited),
        },
        Err(e) => Err(e),
    }
}

async fn fetch_report(
    state: &AppState,
    site: &SiteRow,
    kind: ReportKind,
    params: &ReportParams,
) -> Result<Value, ScopeError> {
    let range = ReportRange::trailing_days(state.clock.now().date_naive(), params.days);

    match kind {
        ReportKind::Analytics => {
            let grant = state.gateway.access(&site.id, Provider::GoogleAnalytics).await?;
            let property_id = grant
                .integration
                .config_str("property_id")
                .ok_or_else(|| ScopeError::ResourceNotSelected {
                    provider: Provider::GoogleAnalytics,
                    hint: "choose a property on the Analytics settings page first".to_string(),
                })?;
            analytics::run_report(
                &state.http,
                &state.config.analytics_api_base,
                &grant.access_token,
                &property_id,
                &range,
                &params.dimension,
                params.limit,
            )
            .await
        }
        ReportKind::SearchConsole => {
            let grant = state.gateway.access(&site.id, Provider::SearchConsole).await?;
            let site_url = grant
                .integration
                .config_str("site_url")
                .ok_or_else(|| ScopeError::ResourceNotSelected {
                    provider: Provider::SearchConsole,
                    hint: "choose a Search Console property first".to_string(),
                })?;
            search_console::query_report(
                &state.http,
                &state.config.search_console_api_base,
                &grant.access_token,
                &site_url,
                &range,
                &params.dimension,
                params.limit,
            )
            .await
        }
        ReportKind::Ads => {
            // Selector and operator credential are checked before the
            // gateway so an unselected account never costs an upstream
            // call, refresh included.
            let row = state
                .store
                .get_integration(&site.id, Provider::GoogleAds)
                .await?
                .ok_or(ScopeError::NotConnected(Provider::GoogleAds))?;
            let customer_id = row
                .config_str("ads_customer_id")
                .ok_or_else(|| ScopeError::ResourceNotSelected {
                    provider: Provider::GoogleAds,
                    hint: "choose a client account on the Ads settings page first".to_string(),
                })?;
            let developer_token: String = state
                .store
                .get_setting(ADS_DEVELOPER_TOKEN_KEY)
                .await?
                .ok_or(ScopeError::CredentialsMissing("Google Ads developer token"))?;
            let grant = state.gateway.access(&site.id, Provider::GoogleAds).await?;
            ads::campaign_report(
                &state.http,
                &state.config.ads_api_base,
                &grant.access_token,
                &developer_token,
                &customer_id.replace('-', ""),
                &range,
            )
            .await
        }
        ReportKind::BusinessProfile => {
            let grant = state
                .gateway
                .access(&site.id, Provider::BusinessProfile)
                .await?;
            let location_id = grant
                .integration
                .config_str("location_id")
                .ok_or_else(|| ScopeError::ResourceNotSelected {
                    provider: Provider::BusinessProfile,
                    hint: "choose a business location first".to_string(),
                })?;
            business_profile::location_metrics(
                &state.http,
                &state.config.business_profile_api_base,
                &grant.access_token,
                &location_id,
                &range,
            )
            .await
        }
        ReportKind::Pagespeed => {
            let connected = state
                .store
                .get_integration(&site.id, Provider::Pagespeed)
                .await?
                .map(|row| row.status == IntegrationStatus::Connected)
                .unwrap_or(false);
            if !connected {
                return Err(ScopeError::NotConnected(Provider::Pagespeed));
            }
            let api_key: String = state
                .store
                .get_setting(PAGESPEED_API_KEY)
                .await?
                .ok_or(ScopeError::CredentialsMissing("PageSpeed API key"))?;
            pagespeed::run_audit(
                &state.http,
                &state.config.pagespeed_api_base,
                &api_key,
                &site.domain,
                &params.strategy,
            )
            .await
        }
        ReportKind::Woocommerce => {
            let row = state
                .store
                .get_integration(&site.id, Provider::Woocommerce)
                .await?
                .ok_or(ScopeError::NotConnected(Provider::Woocommerce))?;
            let creds: woocommerce::WooCredentials = row
                .config
                .get("woocommerce")
                .cloned()
                .and_then(|raw| serde_json::from_value(raw).ok())
                .ok_or(ScopeError::NotConnected(Provider::Woocommerce))?;
            woocommerce::sales_report(&state.http, &creds, &range).await
        }
    }
}
