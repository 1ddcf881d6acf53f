use reqwest::Client;
use serde_json::{Value, json};

use super::{ReportRange, metric_f64, read_upstream_json};
use crate::error::ScopeError;

const PERMISSION_HINT: &str =
    "Business Profile access denied. Enable the Business Profile Performance API, or reconnect and approve all permissions.";

/// List the locations visible to the connected account, for the resource
/// selector. Results are cached by the caller.
pub async fn list_locations(
    http: &Client,
    api_base: &str,
    access_token: &str,
) -> Result<Value, ScopeError> {
    let url = format!("{api_base}/locations");
    let resp = http
        .get(&url)
        .query(&[("readMask", "name,title")])
        .bearer_auth(access_token)
        .send()
        .await?;
    let payload = read_upstream_json(resp, PERMISSION_HINT).await?;

    let empty = Vec::new();
    let locations: Vec<Value> = payload
        .get("locations")
        .and_then(|l| l.as_array())
        .unwrap_or(&empty)
        .iter()
        .map(|loc| {
            json!({
                "id": loc.get("name").and_then(|n| n.as_str()).unwrap_or(""),
                "title": loc.get("title").and_then(|t| t.as_str()).unwrap_or(""),
            })
        })
        .collect();
    Ok(json!({"locations": locations}))
}

/// Fetch performance metrics for the selected location.
pub async fn location_metrics(
    http: &Client,
    api_base: &str,
    access_token: &str,
    location_id: &str,
    range: &ReportRange,
) -> Result<Value, ScopeError> {
    let url = format!("{api_base}/{location_id}:fetchMetrics");
    let resp = http
        .get(&url)
        .query(&[
            ("startDate", range.start.to_string()),
            ("endDate", range.end.to_string()),
        ])
        .bearer_auth(access_token)
        .send()
        .await?;
    let payload = read_upstream_json(resp, PERMISSION_HINT).await?;
    Ok(shape_metrics(&payload))
}

fn shape_metrics(payload: &Value) -> Value {
    let empty = Vec::new();
    let metrics = payload
        .get("metrics")
        .and_then(|m| m.as_array())
        .unwrap_or(&empty);

    let mut total = 0.0;
    let rows: Vec<Value> = metrics
        .iter()
        .map(|entry| {
            let name = entry
                .get("metric")
                .and_then(|m| m.as_str())
                .unwrap_or("")
                .to_string();
            let value = metric_f64(entry.get("total"));
            total += value;
            json!({"dimensionKey": name, "value": value})
        })
        .collect();

    json!({"rows": rows, "summary": {"total": total}})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_shape_into_rows_with_total() {
        let payload = json!({
            "metrics": [
                {"metric": "CALL_CLICKS", "total": 12},
                {"metric": "WEBSITE_CLICKS", "total": "30"},
                {"metric": "DIRECTION_REQUESTS"},
            ]
        });
        let shaped = shape_metrics(&payload);
        assert_eq!(shaped["rows"][0]["dimensionKey"], "CALL_CLICKS");
        assert_eq!(shaped["rows"][1]["value"], 30.0);
        assert_eq!(shaped["rows"][2]["value"], 0.0);
        assert_eq!(shaped["summary"]["total"], 42.0);
    }
}
