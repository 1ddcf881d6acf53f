use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{info, warn};

use super::read_upstream_json;
use crate::cache::Clock;
use crate::db::models::{RankResult, SiteRow};
use crate::db::store::Storage;
use crate::error::ScopeError;

const PERMISSION_HINT: &str = "Ranking provider rejected the API key.";

pub struct RankConfig<'a> {
    pub api_base: &'a str,
    pub api_key: &'a str,
    pub delay_ms: u64,
}

/// Fetch the current SERP position for every tracked keyword of a site and
/// persist the outcome per keyword.
///
/// Sequential by design: upstream rate limits are generous, but a fixed
/// inter-request delay keeps us well under them. A failing keyword is
/// recorded (zeroed numerics plus the error string) and never aborts the
/// loop, so the UI always reflects "we tried and here's what happened".
pub async fn refresh_site_keywords(
    store: &Storage,
    http: &Client,
    cfg: &RankConfig<'_>,
    site: &SiteRow,
    clock: &dyn Clock,
) -> Result<Value, ScopeError> {
    let keywords = store.list_keywords(&site.id).await?;
    let mut outcomes = Vec::with_capacity(keywords.len());

    for (i, keyword) in keywords.iter().enumerate() {
        if i > 0 && cfg.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(cfg.delay_ms)).await;
        }

        let result = match fetch_position(http, cfg, &keyword.phrase, &site.domain).await {
            Ok(mut result) => {
                result.fetched_at = clock.now();
                result
            }
            Err(e) => {
                warn!(site = %site.id, phrase = %keyword.phrase, error = %e, "rank fetch failed");
                RankResult::failed(&site.domain, clock.now(), e.to_string())
            }
        };

        store.save_keyword_result(&keyword.id, &result).await?;
        outcomes.push(json!({
            "keywordId": keyword.id,
            "phrase": keyword.phrase,
            "position": result.position,
            "error": result.error,
        }));
    }

    info!(site = %site.id, processed = outcomes.len(), "rank refresh finished");
    Ok(json!({"processed": outcomes.len(), "outcomes": outcomes}))
}

/// One SERP lookup. A domain that simply isn't ranked comes back as
/// position 0 with no error.
async fn fetch_position(
    http: &Client,
    cfg: &RankConfig<'_>,
    phrase: &str,
    domain: &str,
) -> Result<RankResult, ScopeError> {
    let url = format!("{}/v1/serp", cfg.api_base);
    let resp = http
        .get(&url)
        .query(&[("keyword", phrase), ("domain", domain), ("key", cfg.api_key)])
        .send()
        .await?;
    let payload = read_upstream_json(resp, PERMISSION_HINT).await?;

    let hit = payload
        .get("items")
        .and_then(|items| items.as_array())
        .and_then(|items| {
            items
                .iter()
                .find(|item| {
                    item.get("domain").and_then(|d| d.as_str()) == Some(domain)
                })
                .cloned()
        });

    let fetched_at = chrono::DateTime::<chrono::Utc>::MIN_UTC; // caller stamps
    let Some(hit) = hit else {
        return Ok(RankResult {
            position: 0,
            rank_absolute: 0,
            url: String::new(),
            title: String::new(),
            description: String::new(),
            domain: domain.to_string(),
            fetched_at,
            error: None,
        });
    };

    let text = |key: &str| {
        hit.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    Ok(RankResult {
        position: hit.get("position").and_then(|v| v.as_i64()).unwrap_or(0),
        rank_absolute: hit
            .get("rank_absolute")
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
        url: text("url"),
        title: text("title"),
        description: text("description"),
        domain: domain.to_string(),
        fetched_at,
        error: None,
    })
}
