use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

use super::read_upstream_json;
use crate::error::ScopeError;

const PERMISSION_HINT: &str = "Whois provider rejected the request.";

/// Look up whois/DNS data for a domain. No stored credential; the per-call
/// timeout bounds worst-case request latency instead of holding the inbound
/// request open for the client default.
pub async fn lookup(
    http: &Client,
    api_base: &str,
    domain: &str,
    timeout_secs: u64,
) -> Result<Value, ScopeError> {
    let url = format!("{api_base}/v1/whois");
    let resp = http
        .get(&url)
        .query(&[("domain", domain)])
        .timeout(Duration::from_secs(timeout_secs))
        .send()
        .await?;
    let payload = read_upstream_json(resp, PERMISSION_HINT).await?;
    Ok(shape_lookup(domain, &payload))
}

fn shape_lookup(domain: &str, payload: &Value) -> Value {
    let text = |key: &str| {
        payload
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    json!({
        "domain": domain,
        "registrar": text("registrar"),
        "createdAt": text("created"),
        "expiresAt": text("expires"),
        "nameservers": payload.get("nameservers").cloned().unwrap_or(json!([])),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_shape_fills_missing_fields() {
        let payload = json!({
            "registrar": "Example Registrar",
            "nameservers": ["ns1.example.net", "ns2.example.net"],
        });
        let shaped = shape_lookup("example.com", &payload);
        assert_eq!(shaped["registrar"], "Example Registrar");
        assert_eq!(shaped["createdAt"], "");
        assert_eq!(shaped["nameservers"][1], "ns2.example.net");
    }
}
