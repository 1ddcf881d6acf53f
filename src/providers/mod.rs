//! Upstream callers and response shapers. Each provider module translates
//! one internal report request into one or more upstream HTTP calls and
//! folds the provider's payload into a small stable shape for the UI.

pub mod ads;
pub mod analytics;
pub mod business_profile;
pub mod pagespeed;
pub mod rank;
pub mod search_console;
pub mod whois;
pub mod woocommerce;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ScopeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    GoogleAnalytics,
    SearchConsole,
    GoogleAds,
    BusinessProfile,
    RankTracker,
    Pagespeed,
    Woocommerce,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GoogleAnalytics => "google_analytics",
            Provider::SearchConsole => "search_console",
            Provider::GoogleAds => "google_ads",
            Provider::BusinessProfile => "business_profile",
            Provider::RankTracker => "rank_tracker",
            Provider::Pagespeed => "pagespeed",
            Provider::Woocommerce => "woocommerce",
        }
    }

    /// The provider whose OAuth grant this one borrows, if any. Siblings of
    /// one consent all anchor on the analytics integration.
    pub fn anchor(&self) -> Option<Provider> {
        match self {
            Provider::SearchConsole | Provider::GoogleAds | Provider::BusinessProfile => {
                Some(Provider::GoogleAnalytics)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_analytics" => Ok(Provider::GoogleAnalytics),
            "search_console" => Ok(Provider::SearchConsole),
            "google_ads" => Ok(Provider::GoogleAds),
            "business_profile" => Ok(Provider::BusinessProfile),
            "rank_tracker" => Ok(Provider::RankTracker),
            "pagespeed" => Ok(Provider::Pagespeed),
            "woocommerce" => Ok(Provider::Woocommerce),
            _ => Err(ScopeError::NotFound),
        }
    }
}

/// Current reporting period plus the immediately preceding one of equal
/// length, for period-over-period deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub prev_start: NaiveDate,
    pub prev_end: NaiveDate,
}

impl ReportRange {
    pub fn trailing_days(end: NaiveDate, days: i64) -> Self {
        let days = days.max(1);
        let start = end - Duration::days(days - 1);
        let prev_end = start - Duration::days(1);
        let prev_start = prev_end - Duration::days(days - 1);
        Self {
            start,
            end,
            prev_start,
            prev_end,
        }
    }
}

/// Fold an upstream response into the shared error taxonomy, or hand back
/// the parsed JSON body on success.
///
/// `permission_hint` tells the user what to fix on a 403: which API to
/// enable, or "reconnect and approve all permissions".
pub(crate) async fn read_upstream_json(
    resp: reqwest::Response,
    permission_hint: &str,
) -> Result<Value, ScopeError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_failure(status.as_u16(), &body, permission_hint))
}

/// Non-2xx taxonomy shared by every provider module.
pub(crate) fn classify_failure(status: u16, body: &str, permission_hint: &str) -> ScopeError {
    match status {
        403 => ScopeError::PermissionDenied {
            hint: permission_hint.to_string(),
        },
        429 => ScopeError::RateLimited,
        code => ScopeError::Upstream {
            status: code,
            message: upstream_message(body),
        },
    }
}

/// Pull the provider's own error text out of the body, truncated so a
/// misbehaving upstream can't flood our responses.
pub(crate) fn upstream_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or(body);
    truncate(message, 200)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

/// Monetary "micros" fields are exposed in whole currency units.
pub fn micros_to_units(v: f64) -> f64 {
    v / 1_000_000.0
}

/// Providers returning 0–1 fractions are exposed as display percentages.
pub fn fraction_to_percent(v: f64) -> f64 {
    v * 100.0
}

/// Period-over-period delta, one decimal place. A previous value of zero
/// yields 0 when current is also zero, else 100: growth from nothing shows
/// as +100% rather than dividing by zero.
pub fn percent_delta(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current == 0.0 { 0.0 } else { 100.0 }
    } else {
        ((current - previous) / previous * 1000.0).round() / 10.0
    }
}

/// Read a metric that may be absent, a string, or a number; absent and
/// unparsable values become 0 so downstream arithmetic never sees NaN.
pub(crate) fn metric_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delta_math_matches_product_convention() {
        assert_eq!(percent_delta(0.0, 0.0), 0.0);
        assert_eq!(percent_delta(50.0, 0.0), 100.0);
        assert_eq!(percent_delta(150.0, 100.0), 50.0);
        assert_eq!(percent_delta(100.0, 150.0), -33.3);
        assert_eq!(percent_delta(101.0, 100.0), 1.0);
    }

    #[test]
    fn micros_and_fractions_convert_for_display() {
        assert_eq!(micros_to_units(12_340_000.0), 12.34);
        assert_eq!(fraction_to_percent(0.4321), 43.21);
    }

    #[test]
    fn metric_parsing_zero_fills_missing_values() {
        let row = json!({"a": "12.5", "b": 3, "c": null, "d": "junk"});
        assert_eq!(metric_f64(row.get("a")), 12.5);
        assert_eq!(metric_f64(row.get("b")), 3.0);
        assert_eq!(metric_f64(row.get("c")), 0.0);
        assert_eq!(metric_f64(row.get("d")), 0.0);
        assert_eq!(metric_f64(row.get("missing")), 0.0);
    }

    #[test]
    fn upstream_message_prefers_structured_error() {
        let body = r#"{"error":{"code":400,"message":"bad property","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(upstream_message(body), "bad property");
        assert_eq!(upstream_message("plain text failure"), "plain text failure");
        let long = "x".repeat(500);
        assert_eq!(upstream_message(&long).chars().count(), 201);
    }

    #[test]
    fn provider_names_round_trip() {
        for p in [
            Provider::GoogleAnalytics,
            Provider::SearchConsole,
            Provider::GoogleAds,
            Provider::BusinessProfile,
            Provider::RankTracker,
            Provider::Pagespeed,
            Provider::Woocommerce,
        ] {
            assert_eq!(p.as_str().parse::<Provider>().expect("parse"), p);
        }
    }

    #[test]
    fn google_siblings_anchor_on_analytics() {
        assert_eq!(
            Provider::SearchConsole.anchor(),
            Some(Provider::GoogleAnalytics)
        );
        assert_eq!(Provider::GoogleAds.anchor(), Some(Provider::GoogleAnalytics));
        assert_eq!(
            Provider::BusinessProfile.anchor(),
            Some(Provider::GoogleAnalytics)
        );
        assert!(Provider::GoogleAnalytics.anchor().is_none());
        assert!(Provider::RankTracker.anchor().is_none());
    }

    #[test]
    fn trailing_range_periods_are_adjacent_and_equal_length() {
        let end = NaiveDate::from_ymd_opt(2026, 3, 28).expect("date");
        let range = ReportRange::trailing_days(end, 28);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"));
        assert_eq!(range.prev_end, NaiveDate::from_ymd_opt(2026, 2, 28).expect("date"));
        assert_eq!(range.prev_start, NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"));
        assert_eq!(range.end - range.start, range.prev_end - range.prev_start);
    }
}
