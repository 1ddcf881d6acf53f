use reqwest::Client;
use serde_json::{Value, json};

use super::{fraction_to_percent, metric_f64, read_upstream_json};
use crate::error::ScopeError;

const PERMISSION_HINT: &str =
    "PageSpeed API access denied. Check the configured API key and its quota.";

const AUDITS: &[&str] = &[
    "first-contentful-paint",
    "largest-contentful-paint",
    "cumulative-layout-shift",
    "total-blocking-time",
];

/// Run a PageSpeed audit for the site, one strategy per call
/// (`mobile` or `desktop`).
pub async fn run_audit(
    http: &Client,
    api_base: &str,
    api_key: &str,
    domain: &str,
    strategy: &str,
) -> Result<Value, ScopeError> {
    let url = format!("{api_base}/runPagespeed");
    let resp = http
        .get(&url)
        .query(&[
            ("url", format!("https://{domain}/")),
            ("strategy", strategy.to_string()),
            ("key", api_key.to_string()),
            ("category", "PERFORMANCE".to_string()),
            ("category", "SEO".to_string()),
        ])
        .send()
        .await?;
    let payload = read_upstream_json(resp, PERMISSION_HINT).await?;
    Ok(shape_audit(&payload, strategy))
}

fn shape_audit(payload: &Value, strategy: &str) -> Value {
    let categories = payload
        .get("lighthouseResult")
        .and_then(|r| r.get("categories"));
    let score = |name: &str| {
        fraction_to_percent(metric_f64(
            categories.and_then(|c| c.get(name)).and_then(|c| c.get("score")),
        ))
    };

    let audits = payload
        .get("lighthouseResult")
        .and_then(|r| r.get("audits"));
    let mut audit_values = serde_json::Map::new();
    for key in AUDITS {
        let display = audits
            .and_then(|a| a.get(*key))
            .and_then(|a| a.get("displayValue"))
            .and_then(|d| d.as_str())
            .unwrap_or("");
        audit_values.insert((*key).to_string(), json!(display));
    }

    json!({
        "strategy": strategy,
        "scores": {
            "performance": score("performance"),
            "seo": score("seo"),
        },
        "audits": audit_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_scale_to_percent_and_missing_audits_are_blank() {
        let payload = json!({
            "lighthouseResult": {
                "categories": {
                    "performance": {"score": 0.93},
                    "seo": {"score": 0.85}
                },
                "audits": {
                    "first-contentful-paint": {"displayValue": "1.2 s"}
                }
            }
        });
        let shaped = shape_audit(&payload, "mobile");
        assert_eq!(shaped["scores"]["performance"], 93.0);
        assert_eq!(shaped["scores"]["seo"], 85.0);
        assert_eq!(shaped["audits"]["first-contentful-paint"], "1.2 s");
        assert_eq!(shaped["audits"]["cumulative-layout-shift"], "");
        assert_eq!(shaped["strategy"], "mobile");
    }
}
