use reqwest::Client;
use serde_json::{Value, json};

use super::{ReportRange, fraction_to_percent, metric_f64, read_upstream_json};
use crate::error::ScopeError;

const PERMISSION_HINT: &str =
    "Search Console access denied. Verify the property is shared with the connected account, or reconnect and approve all permissions.";

/// Query search analytics for the selected property. `dimension` is
/// typically `query` or `page`.
pub async fn query_report(
    http: &Client,
    api_base: &str,
    access_token: &str,
    site_url: &str,
    range: &ReportRange,
    dimension: &str,
    limit: u32,
) -> Result<Value, ScopeError> {
    let encoded: String = url::form_urlencoded::byte_serialize(site_url.as_bytes()).collect();
    let url = format!("{api_base}/sites/{encoded}/searchAnalytics/query");
    let body = json!({
        "startDate": range.start.to_string(),
        "endDate": range.end.to_string(),
        "dimensions": [dimension],
        "rowLimit": limit,
    });

    let resp = http
        .post(&url)
        .bearer_auth(access_token)
        .json(&body)
        .send()
        .await?;
    let payload = read_upstream_json(resp, PERMISSION_HINT).await?;
    Ok(shape_report(&payload))
}

fn shape_report(payload: &Value) -> Value {
    let empty = Vec::new();
    let raw_rows = payload
        .get("rows")
        .and_then(|r| r.as_array())
        .unwrap_or(&empty);

    let mut total_clicks = 0.0;
    let mut total_impressions = 0.0;
    let mut position_sum = 0.0;

    let rows: Vec<Value> = raw_rows
        .iter()
        .map(|raw| {
            let key = raw
                .get("keys")
                .and_then(|k| k.as_array())
                .and_then(|k| k.first())
                .and_then(|k| k.as_str())
                .unwrap_or("")
                .to_string();
            let clicks = metric_f64(raw.get("clicks"));
            let impressions = metric_f64(raw.get("impressions"));
            let ctr = fraction_to_percent(metric_f64(raw.get("ctr")));
            let position = metric_f64(raw.get("position"));
            total_clicks += clicks;
            total_impressions += impressions;
            position_sum += position;
            json!({
                "dimensionKey": key,
                "clicks": clicks,
                "impressions": impressions,
                "ctr": ctr,
                "position": position,
            })
        })
        .collect();

    let avg_position = if rows.is_empty() {
        0.0
    } else {
        position_sum / rows.len() as f64
    };
    let overall_ctr = if total_impressions == 0.0 {
        0.0
    } else {
        fraction_to_percent(total_clicks / total_impressions)
    };

    json!({
        "rows": rows,
        "summary": {
            "clicks": total_clicks,
            "impressions": total_impressions,
            "ctr": overall_ctr,
            "avgPosition": avg_position,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_rows_and_overall_ctr() {
        let payload = json!({
            "rows": [
                {"keys": ["seo tools"], "clicks": 30, "impressions": 600, "ctr": 0.05, "position": 4.2},
                {"keys": ["rank checker"], "clicks": 10, "impressions": 400, "ctr": 0.025, "position": 8.8},
            ]
        });
        let shaped = shape_report(&payload);
        assert_eq!(shaped["rows"][0]["dimensionKey"], "seo tools");
        assert_eq!(shaped["rows"][0]["ctr"], 5.0);
        assert_eq!(shaped["summary"]["clicks"], 40.0);
        assert_eq!(shaped["summary"]["ctr"], 4.0);
        assert_eq!(shaped["summary"]["avgPosition"], 6.5);
    }

    #[test]
    fn missing_rows_mean_zeroed_summary() {
        let shaped = shape_report(&json!({}));
        assert_eq!(shaped["rows"], json!([]));
        assert_eq!(shaped["summary"]["ctr"], 0.0);
        assert_eq!(shaped["summary"]["avgPosition"], 0.0);
    }
}
