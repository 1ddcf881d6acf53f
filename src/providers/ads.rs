use reqwest::Client;
use serde_json::{Value, json};

use super::{ReportRange, classify_failure, metric_f64, micros_to_units, percent_delta};
use crate::error::ScopeError;
use crate::providers::Provider;

const PERMISSION_HINT: &str =
    "Google Ads API access denied. Check that the developer token is approved and the connected account can access this customer.";

/// Fetch campaign performance for the selected customer account.
pub async fn campaign_report(
    http: &Client,
    api_base: &str,
    access_token: &str,
    developer_token: &str,
    customer_id: &str,
    range: &ReportRange,
) -> Result<Value, ScopeError> {
    let current = search(
        http,
        api_base,
        access_token,
        developer_token,
        customer_id,
        &range.start.to_string(),
        &range.end.to_string(),
    )
    .await?;
    let previous = search(
        http,
        api_base,
        access_token,
        developer_token,
        customer_id,
        &range.prev_start.to_string(),
        &range.prev_end.to_string(),
    )
    .await?;
    Ok(shape_report(&current, &previous))
}

async fn search(
    http: &Client,
    api_base: &str,
    access_token: &str,
    developer_token: &str,
    customer_id: &str,
    start: &str,
    end: &str,
) -> Result<Value, ScopeError> {
    let url = format!("{api_base}/customers/{customer_id}/googleAds:search");
    let query = format!(
        "SELECT campaign.name, metrics.cost_micros, metrics.clicks, metrics.impressions, \
         metrics.conversions FROM campaign WHERE segments.date BETWEEN '{start}' AND '{end}'"
    );

    let resp = http
        .post(&url)
        .bearer_auth(access_token)
        .header("developer-token", developer_token)
        .json(&json!({"query": query}))
        .send()
        .await?;

    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let body = resp.text().await.unwrap_or_default();
    if is_manager_account_error(&body) {
        return Err(ScopeError::ResourceNotSelected {
            provider: Provider::GoogleAds,
            hint: "the selected account is a manager account; choose a client account instead"
                .to_string(),
        });
    }
    Err(classify_failure(status.as_u16(), &body, PERMISSION_HINT))
}

/// Prefer the structured error code; the API reports metrics queries
/// against manager accounts as a QueryError. The message-text fallback is
/// fragile (wording can change between API versions) and only used when the
/// upstream gives nothing structured.
fn is_manager_account_error(body: &str) -> bool {
    let Some(parsed) = serde_json::from_str::<Value>(body).ok() else {
        return body.to_ascii_lowercase().contains("manager account");
    };
    let structured = parsed
        .get("error")
        .and_then(|e| e.get("details"))
        .and_then(|d| d.as_array())
        .map(|details| {
            details.iter().any(|detail| {
                detail
                    .get("errors")
                    .and_then(|errs| errs.as_array())
                    .map(|errs| {
                        errs.iter().any(|err| {
                            err.get("errorCode")
                                .and_then(|c| c.get("queryError"))
                                .and_then(|q| q.as_str())
                                == Some("REQUESTED_METRICS_FOR_MANAGER")
                        })
                    })
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);
    if structured {
        return true;
    }
    parsed
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(|m| m.to_ascii_lowercase().contains("manager account"))
        .unwrap_or(false)
}

fn shape_report(current: &Value, previous: &Value) -> Value {
    let (rows, current_totals) = shape_period(current, true);
    let (_, previous_totals) = shape_period(previous, false);

    json!({
        "rows": rows,
        "summary": {
            "cost": {
                "current": current_totals.0,
                "previous": previous_totals.0,
                "delta": percent_delta(current_totals.0, previous_totals.0),
            },
            "clicks": {
                "current": current_totals.1,
                "previous": previous_totals.1,
                "delta": percent_delta(current_totals.1, previous_totals.1),
            },
            "impressions": {
                "current": current_totals.2,
                "previous": previous_totals.2,
                "delta": percent_delta(current_totals.2, previous_totals.2),
            },
            "conversions": {
                "current": current_totals.3,
                "previous": previous_totals.3,
                "delta": percent_delta(current_totals.3, previous_totals.3),
            },
        }
    })
}

fn shape_period(payload: &Value, keep_rows: bool) -> (Vec<Value>, (f64, f64, f64, f64)) {
    let empty = Vec::new();
    let results = payload
        .get("results")
        .and_then(|r| r.as_array())
        .unwrap_or(&empty);

    let mut rows = Vec::new();
    let mut totals = (0.0, 0.0, 0.0, 0.0);
    for result in results {
        let name = result
            .get("campaign")
            .and_then(|c| c.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("")
            .to_string();
        let metrics = result.get("metrics");
        let cost = micros_to_units(metric_f64(metrics.and_then(|m| m.get("costMicros"))));
        let clicks = metric_f64(metrics.and_then(|m| m.get("clicks")));
        let impressions = metric_f64(metrics.and_then(|m| m.get("impressions")));
        let conversions = metric_f64(metrics.and_then(|m| m.get("conversions")));
        totals.0 += cost;
        totals.1 += clicks;
        totals.2 += impressions;
        totals.3 += conversions;
        if keep_rows {
            rows.push(json!({
                "dimensionKey": name,
                "cost": cost,
                "clicks": clicks,
                "impressions": impressions,
                "conversions": conversions,
            }));
        }
    }
    (rows, totals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_micros_convert_and_deltas_compute() {
        let current = json!({
            "results": [
                {"campaign": {"name": "Brand"}, "metrics": {"costMicros": "12500000", "clicks": "50", "impressions": "1000", "conversions": 5.0}},
            ]
        });
        let previous = json!({
            "results": [
                {"campaign": {"name": "Brand"}, "metrics": {"costMicros": "10000000", "clicks": "40", "impressions": "800"}},
            ]
        });
        let shaped = shape_report(&current, &previous);
        assert_eq!(shaped["rows"][0]["cost"], 12.5);
        assert_eq!(shaped["summary"]["cost"]["delta"], 25.0);
        assert_eq!(shaped["summary"]["clicks"]["delta"], 25.0);
        // Previous period had no conversions recorded: growth from zero.
        assert_eq!(shaped["summary"]["conversions"]["delta"], 100.0);
    }

    #[test]
    fn manager_account_detected_from_structured_code() {
        let body = r#"{"error":{"message":"whatever","details":[{"errors":[{"errorCode":{"queryError":"REQUESTED_METRICS_FOR_MANAGER"}}]}]}}"#;
        assert!(is_manager_account_error(body));
    }

    #[test]
    fn manager_account_detected_from_text_fallback() {
        assert!(is_manager_account_error(
            r#"{"error":{"message":"Metrics cannot be requested for a manager account."}}"#
        ));
        assert!(is_manager_account_error(
            "plain: this is a manager account"
        ));
        assert!(!is_manager_account_error(
            r#"{"error":{"message":"quota exceeded"}}"#
        ));
    }
}
