use reqwest::Client;
use serde_json::{Value, json};

use super::{ReportRange, fraction_to_percent, metric_f64, percent_delta, read_upstream_json};
use crate::error::ScopeError;

const PERMISSION_HINT: &str =
    "Analytics Data API access denied. Enable the API for your project or reconnect and approve all permissions.";

/// `(API metric name, output key, is 0-1 fraction)`
const METRICS: &[(&str, &str, bool)] = &[
    ("sessions", "sessions", false),
    ("activeUsers", "users", false),
    ("engagementRate", "engagementRate", true),
    ("conversions", "conversions", false),
];

/// Run one report against the analytics property: a single upstream call
/// carrying both the current and the previous date range, folded into rows
/// for the current period plus period-over-period summary deltas.
pub async fn run_report(
    http: &Client,
    api_base: &str,
    access_token: &str,
    property_id: &str,
    range: &ReportRange,
    dimension: &str,
    limit: u32,
) -> Result<Value, ScopeError> {
    let url = format!("{api_base}/properties/{property_id}:runReport");
    let body = json!({
        "dateRanges": [
            {"startDate": range.start.to_string(), "endDate": range.end.to_string(), "name": "current"},
            {"startDate": range.prev_start.to_string(), "endDate": range.prev_end.to_string(), "name": "previous"},
        ],
        "dimensions": [{"name": dimension}],
        "metrics": METRICS.iter().map(|(api, _, _)| json!({"name": api})).collect::<Vec<_>>(),
        "limit": limit,
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

/// With two date ranges the API appends the range name as the last
/// dimension value of every row.
fn shape_report(payload: &Value) -> Value {
    let empty = Vec::new();
    let raw_rows = payload
        .get("rows")
        .and_then(|r| r.as_array())
        .unwrap_or(&empty);

    let mut rows = Vec::new();
    let mut current_totals = vec![0.0; METRICS.len()];
    let mut previous_totals = vec![0.0; METRICS.len()];

    for raw in raw_rows {
        let dims = raw
            .get("dimensionValues")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();
        let range_name = dims
            .last()
            .and_then(|d| d.get("value"))
            .and_then(|v| v.as_str())
            .unwrap_or("current");
        let dimension_key = dims
            .first()
            .and_then(|d| d.get("value"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let metric_values = raw.get("metricValues").and_then(|m| m.as_array());
        let mut shaped = json!({"dimensionKey": dimension_key});
        for (i, (_, out_key, is_fraction)) in METRICS.iter().enumerate() {
            let raw_value = metric_values
                .and_then(|vals| vals.get(i))
                .and_then(|v| v.get("value"));
            let mut value = metric_f64(raw_value);
            if *is_fraction {
                value = fraction_to_percent(value);
            }
            if range_name == "previous" {
                previous_totals[i] += value;
            } else {
                current_totals[i] += value;
                shaped[*out_key] = json!(value);
            }
        }
        if range_name != "previous" {
            rows.push(shaped);
        }
    }

    let mut summary = serde_json::Map::new();
    for (i, (_, out_key, _)) in METRICS.iter().enumerate() {
        summary.insert(
            (*out_key).to_string(),
            json!({
                "current": current_totals[i],
                "previous": previous_totals[i],
                "delta": percent_delta(current_totals[i], previous_totals[i]),
            }),
        );
    }

    json!({"rows": rows, "summary": summary})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_zero_fill_and_summary_computes_deltas() {
        let payload = json!({
            "rows": [
                {
                    "dimensionValues": [{"value": "google"}, {"value": "current"}],
                    "metricValues": [{"value": "150"}, {"value": "100"}, {"value": "0.5"}]
                    // conversions metric missing entirely
                },
                {
                    "dimensionValues": [{"value": "google"}, {"value": "previous"}],
                    "metricValues": [{"value": "100"}, {"value": "80"}, {"value": "0.25"}, {"value": "0"}]
                }
            ]
        });
        let shaped = shape_report(&payload);

        let rows = shaped["rows"].as_array().expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["dimensionKey"], "google");
        assert_eq!(rows[0]["sessions"], 150.0);
        assert_eq!(rows[0]["engagementRate"], 50.0);
        assert_eq!(rows[0]["conversions"], 0.0);

        assert_eq!(shaped["summary"]["sessions"]["delta"], 50.0);
        // Growth from zero shows as +100, not a division error.
        assert_eq!(shaped["summary"]["conversions"]["delta"], 0.0);
    }

    #[test]
    fn empty_payload_shapes_to_empty_report() {
        let shaped = shape_report(&json!({}));
        assert_eq!(shaped["rows"], json!([]));
        assert_eq!(shaped["summary"]["sessions"]["current"], 0.0);
        assert_eq!(shaped["summary"]["sessions"]["delta"], 0.0);
    }
}
