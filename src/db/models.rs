use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::oauth::credential::Credential;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub token_hash: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteRow {
    pub id: String,
    pub owner_user_id: String,
    pub name: String,
    pub domain: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Disconnected,
    Pending,
    Connected,
    Error,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Disconnected => "disconnected",
            IntegrationStatus::Pending => "pending",
            IntegrationStatus::Connected => "connected",
            IntegrationStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => IntegrationStatus::Pending,
            "connected" => IntegrationStatus::Connected,
            "error" => IntegrationStatus::Error,
            _ => IntegrationStatus::Disconnected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationRow {
    pub id: String,
    pub site_id: String,
    pub provider: String,
    pub status: IntegrationStatus,
    pub connected_at: Option<DateTime<Utc>>,
    /// Opaque provider-specific JSON: the credential, resource selectors
    /// (`property_id`, `ads_customer_id`, `location_id`, `site_url`), and
    /// whatever else the provider module stashes.
    pub config: Value,
}

impl IntegrationRow {
    /// Parse the typed credential out of the config blob, if present.
    pub fn credential(&self) -> Option<Credential> {
        let raw = self.config.get("credential")?;
        serde_json::from_value(raw.clone()).ok()
    }

    pub fn config_str(&self, key: &str) -> Option<String> {
        self.config
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordRow {
    pub id: String,
    pub site_id: String,
    pub phrase: String,
    pub created_at: DateTime<Utc>,
    pub last_result: Option<RankResult>,
}

/// Last-known ranking state for one keyword. Overwritten on every fetch;
/// on failure the numeric fields are zeroed and `error` is set, so the UI
/// never shows silently stale data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankResult {
    pub position: i64,
    pub rank_absolute: i64,
    pub url: String,
    pub title: String,
    pub description: String,
    pub domain: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RankResult {
    pub fn failed(domain: &str, fetched_at: DateTime<Utc>, error: String) -> Self {
        Self {
            position: 0,
            rank_absolute: 0,
            url: String::new(),
            title: String::new(),
            description: String::new(),
            domain: domain.to_string(),
            fetched_at,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadFormRow {
    pub id: String,
    pub site_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadSubmissionRow {
    pub id: String,
    pub form_id: String,
    pub data: Value,
    pub client_ip: String,
    pub submitted_at: DateTime<Utc>,
}
