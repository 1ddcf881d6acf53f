use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::Provider;

/// Refresh this long before the recorded expiry. Absorbs clock skew and
/// request latency so a token is never used known-to-be-expired.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Fallback token lifetime when the provider omits `expires_in`.
pub const DEFAULT_EXPIRES_SECS: i64 = 3600;

/// How an integration authenticates against its upstream.
///
/// One provider per consent (the anchor) physically stores the token set;
/// siblings sharing the same grant store only the back-reference and borrow
/// the anchor's token at call time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
    Owned { token_set: TokenSet },
    Linked { anchor: Provider },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TokenSet {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.refresh_token.is_some()
            && now >= self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS)
    }
}
