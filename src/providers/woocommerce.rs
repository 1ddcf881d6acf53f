use reqwest::Client;
use serde_json::{Value, json};

use super::{ReportRange, metric_f64, read_upstream_json};
use crate::error::ScopeError;

const PERMISSION_HINT: &str =
    "WooCommerce rejected the stored consumer key. Regenerate the key in the store's REST API settings and reconnect.";

/// Store-level credential, kept per site in the integration config (the one
/// non-OAuth, per-site credential in the system).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct WooCredentials {
    pub store_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
}

/// Fetch the sales report for the date range from the store's REST API.
pub async fn sales_report(
    http: &Client,
    creds: &WooCredentials,
    range: &ReportRange,
) -> Result<Value, ScopeError> {
    let url = format!(
        "{}/wp-json/wc/v3/reports/sales",
        creds.store_url.trim_end_matches('/')
    );
    let resp = http
        .get(&url)
        .basic_auth(&creds.consumer_key, Some(&creds.consumer_secret))
        .query(&[
            ("date_min", range.start.to_string()),
            ("date_max", range.end.to_string()),
        ])
        .send()
        .await?;
    let payload = read_upstream_json(resp, PERMISSION_HINT).await?;
    Ok(shape_sales(&payload))
}

/// The endpoint returns a single-element array; money fields arrive as
/// strings.
fn shape_sales(payload: &Value) -> Value {
    let report = payload
        .as_array()
        .and_then(|arr| arr.first())
        .cloned()
        .unwrap_or(json!({}));
    json!({
        "summary": {
            "revenue": metric_f64(report.get("total_sales")),
            "netRevenue": metric_f64(report.get("net_sales")),
            "orders": metric_f64(report.get("total_orders")),
            "items": metric_f64(report.get("total_items")),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sales_report_parses_string_money_fields() {
        let payload = json!([{
            "total_sales": "1234.56",
            "net_sales": "1100.00",
            "total_orders": 42,
            "total_items": 77
        }]);
        let shaped = shape_sales(&payload);
        assert_eq!(shaped["summary"]["revenue"], 1234.56);
        assert_eq!(shaped["summary"]["orders"], 42.0);
    }

    #[test]
    fn empty_report_zero_fills() {
        let shaped = shape_sales(&json!([]));
        assert_eq!(shaped["summary"]["revenue"], 0.0);
    }
}
