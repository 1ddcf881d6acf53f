use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

use crate::error::ScopeError;

/// Runtime configuration, loaded from `SEOSCOPE_`-prefixed environment
/// variables on top of the defaults below. Operator credentials (OAuth
/// client, provider API keys) live in the settings table, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub loglevel: String,
    /// Secret the private cookie jar and session layer derive keys from.
    /// Must be at least 32 bytes.
    pub session_secret: String,
    pub session_ttl_hours: i64,

    // Upstream endpoints. Overridable so tests can point them at a stub server.
    pub google_auth_uri: String,
    pub google_token_uri: String,
    pub analytics_api_base: String,
    pub search_console_api_base: String,
    pub ads_api_base: String,
    pub business_profile_api_base: String,
    pub pagespeed_api_base: String,
    pub rank_api_base: String,
    pub whois_api_base: String,

    // Tunables. Defaults are the product contract; tests shrink them.
    pub cache_ttl_ms: u64,
    pub rank_delay_ms: u64,
    pub lead_min_elapsed_ms: i64,
    pub lead_rate_limit: u32,
    pub lead_rate_window_secs: i64,
    pub export_budget_secs: u64,
    pub request_timeout_secs: u64,
    /// Explicit timeout for one-shot lookups (whois) that would otherwise
    /// hold the request open for the full client default.
    pub lookup_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            database_url: "sqlite:seoscope.sqlite".to_string(),
            loglevel: "info".to_string(),
            session_secret: "insecure-dev-secret-change-me-0123456789abcdef".to_string(),
            session_ttl_hours: 24 * 14,
            google_auth_uri: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            google_token_uri: "https://oauth2.googleapis.com/token".to_string(),
            analytics_api_base: "https://analyticsdata.googleapis.com/v1beta".to_string(),
            search_console_api_base: "https://www.googleapis.com/webmasters/v3".to_string(),
            ads_api_base: "https://googleads.googleapis.com/v17".to_string(),
            business_profile_api_base: "https://businessprofileperformance.googleapis.com/v1"
                .to_string(),
            pagespeed_api_base: "https://www.googleapis.com/pagespeedonline/v5".to_string(),
            rank_api_base: "https://api.rankprovider.io".to_string(),
            whois_api_base: "https://api.whoislookup.io".to_string(),
            cache_ttl_ms: 300_000,
            rank_delay_ms: 500,
            lead_min_elapsed_ms: 1500,
            lead_rate_limit: 10,
            lead_rate_window_secs: 60,
            export_budget_secs: 20,
            request_timeout_secs: 15,
            lookup_timeout_secs: 8,
        }
    }
}

impl Config {
    /// Merge defaults with `SEOSCOPE_*` environment variables.
    pub fn load() -> Result<Self, ScopeError> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("SEOSCOPE_"))
            .extract()
            .map_err(|e| ScopeError::Internal(format!("config: {e}")))
    }
}
