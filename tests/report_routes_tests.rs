mod common;

use chrono::{Duration, Utc};
use serde_json::json;

use common::{SESSION_TOKEN, api_request, spawn_app};
use seoscope::Provider;
use seoscope::cache::{Clock, TtlCache};
use seoscope::config::Config;
use seoscope::db::{IntegrationStatus, SiteRow};
use seoscope::oauth::credential::{Credential, TokenSet};
use seoscope::oauth::endpoints::OauthClientSettings;
use seoscope::oauth::gateway::GOOGLE_OAUTH_SETTINGS_KEY;

async fn seed_oauth_settings(state: &seoscope::router::AppState) {
    state
        .store
        .put_setting(
            GOOGLE_OAUTH_SETTINGS_KEY,
            &OauthClientSettings {
                client_id: "client-1".to_string(),
                client_secret: "secret-1".to_string(),
                redirect_uri: "http://localhost/api/oauth/google/callback".to_string(),
            },
        )
        .await
        .expect("seed oauth settings");
}

async fn seed_site(t: &common::TestApp) -> SiteRow {
    t.state
        .store
        .create_site(&t.user_id, "Example", "example.com", t.clock.now())
        .await
        .expect("seed site")
}

async fn seed_analytics(
    t: &common::TestApp,
    site_id: &str,
    expires_at: chrono::DateTime<Utc>,
    property_id: Option<&str>,
) {
    let mut config = json!({
        "credential": Credential::Owned {
            token_set: TokenSet {
                access_token: "stored-token".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_at,
                scope: None,
                email: Some("owner@example.com".to_string()),
                last_error: None,
            }
        }
    });
    if let Some(property_id) = property_id {
        config["property_id"] = json!(property_id);
    }
    t.state
        .store
        .upsert_integration(
            site_id,
            Provider::GoogleAnalytics,
            IntegrationStatus::Connected,
            &config,
            Some(t.clock.now()),
        )
        .await
        .expect("seed integration");
}

#[tokio::test]
async fn expired_token_triggers_one_refresh_then_one_report_call() {
    let mut server = mockito::Server::new_async().await;
    let refresh_mock = server
        .mock("POST", "/token")
        .expect(1)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"fresh-token","token_type":"Bearer","expires_in":3600}"#)
        .create_async()
        .await;
    let report_mock = server
        .mock("POST", "/properties/123456:runReport")
        .expect(1)
        .match_header("authorization", "Bearer fresh-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "rows": [{
                    "dimensionValues": [{"value": "Organic Search"}, {"value": "current"}],
                    "metricValues": [{"value": "120"}, {"value": "90"}]
                    // engagementRate and conversions missing upstream
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut config = Config::default();
    config.google_token_uri = format!("{}/token", server.url());
    config.analytics_api_base = server.url();
    let t = spawn_app(config).await;
    seed_oauth_settings(&t.state).await;
    let site = seed_site(&t).await;
    seed_analytics(&t, &site.id, t.clock.now() - Duration::seconds(10), Some("123456")).await;

    let (status, body) = api_request(
        &t.app,
        "GET",
        &format!("/api/sites/{}/reports/analytics", site.id),
        Some(SESSION_TOKEN),
        None,
    )
    .await;

    assert_eq!(status, 200);
    let rows = body["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["dimensionKey"], "Organic Search");
    assert_eq!(rows[0]["sessions"], 120.0);
    // Metrics the upstream omitted come back zero-filled, never null.
    assert_eq!(rows[0]["engagementRate"], 0.0);
    assert_eq!(rows[0]["conversions"], 0.0);

    refresh_mock.assert_async().await;
    report_mock.assert_async().await;
}

#[tokio::test]
async fn missing_ads_customer_fails_before_any_upstream_call() {
    let mut server = mockito::Server::new_async().await;
    let upstream = server
        .mock("POST", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let mut config = Config::default();
    config.google_token_uri = format!("{}/token", server.url());
    config.ads_api_base = server.url();
    let t = spawn_app(config).await;
    seed_oauth_settings(&t.state).await;
    let site = seed_site(&t).await;
    // Anchor token is deliberately expired: were the gateway consulted
    // first, it would hit the token endpoint.
    seed_analytics(&t, &site.id, t.clock.now() - Duration::seconds(10), None).await;
    t.state
        .store
        .upsert_integration(
            &site.id,
            Provider::GoogleAds,
            IntegrationStatus::Connected,
            &json!({
                "credential": Credential::Linked { anchor: Provider::GoogleAnalytics },
            }),
            Some(t.clock.now()),
        )
        .await
        .expect("seed ads integration");

    let (status, body) = api_request(
        &t.app,
        "GET",
        &format!("/api/sites/{}/reports/ads", site.id),
        Some(SESSION_TOKEN),
        None,
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "RESOURCE_NOT_SELECTED");
    upstream.assert_async().await;
}

#[tokio::test]
async fn disconnect_clears_cached_reports_for_the_site() {
    let mut server = mockito::Server::new_async().await;
    let report_mock = server
        .mock("POST", "/properties/123456:runReport")
        .expect(1)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "rows": [{
                    "dimensionValues": [{"value": "Direct"}, {"value": "current"}],
                    "metricValues": [{"value": "5"}, {"value": "4"}, {"value": "0.1"}, {"value": "1"}]
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut config = Config::default();
    config.analytics_api_base = server.url();
    let t = spawn_app(config).await;
    seed_oauth_settings(&t.state).await;
    let site = seed_site(&t).await;
    seed_analytics(&t, &site.id, t.clock.now() + Duration::hours(2), Some("123456")).await;

    let report_uri = format!("/api/sites/{}/reports/analytics", site.id);
    let (status, first) = api_request(&t.app, "GET", &report_uri, Some(SESSION_TOKEN), None).await;
    assert_eq!(status, 200);
    assert_eq!(first["rows"][0]["dimensionKey"], "Direct");

    let cache_key = TtlCache::key(
        &site.id,
        "analytics",
        &[
            ("days", "28"),
            ("dimension", "sessionDefaultChannelGroup"),
            ("limit", "25"),
        ],
    );
    assert!(t.state.cache.get(&cache_key).is_some());

    let (status, _) = api_request(
        &t.app,
        "POST",
        &format!("/api/sites/{}/integrations/google_analytics/disconnect", site.id),
        Some(SESSION_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert!(t.state.cache.get(&cache_key).is_none());

    // Well inside the TTL window, yet the pre-disconnect payload is gone:
    // the integration now reports not-connected instead of serving a hit.
    let (status, body) = api_request(&t.app, "GET", &report_uri, Some(SESSION_TOKEN), None).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "NOT_CONNECTED");

    report_mock.assert_async().await;
}

#[tokio::test]
async fn rate_limited_upstream_degrades_to_stale_cache() {
    let mut server = mockito::Server::new_async().await;
    let report_ok = server
        .mock("POST", "/properties/123456:runReport")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "rows": [{
                    "dimensionValues": [{"value": "Direct"}, {"value": "current"}],
                    "metricValues": [{"value": "5"}, {"value": "4"}, {"value": "0.1"}, {"value": "1"}]
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut config = Config::default();
    config.analytics_api_base = server.url();
    let t = spawn_app(config).await;
    seed_oauth_settings(&t.state).await;
    let site = seed_site(&t).await;
    seed_analytics(&t, &site.id, t.clock.now() + Duration::hours(12), Some("123456")).await;

    let report_uri = format!("/api/sites/{}/reports/analytics", site.id);
    let (status, _) = api_request(&t.app, "GET", &report_uri, Some(SESSION_TOKEN), None).await;
    assert_eq!(status, 200);

    // Expire the cache, then make the upstream rate limit the recompute.
    t.clock.advance(Duration::seconds(301));
    report_ok.remove_async().await;
    server
        .mock("POST", "/properties/123456:runReport")
        .with_status(429)
        .with_body(r#"{"error":{"message":"quota"}}"#)
        .create_async()
        .await;

    let (status, body) = api_request(&t.app, "GET", &report_uri, Some(SESSION_TOKEN), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["rateLimited"], true);
    assert_eq!(body["rows"][0]["dimensionKey"], "Direct");
}

#[tokio::test]
async fn ownership_is_enforced_before_any_report_work() {
    let t = spawn_app(Config::default()).await;
    let site = seed_site(&t).await;

    // Second user with their own session.
    let intruder = t
        .state
        .store
        .create_user(
            "intruder@example.com",
            &seoscope::handlers::auth::hash_password("password123").expect("hash"),
            false,
            t.clock.now(),
        )
        .await
        .expect("user");
    t.state
        .store
        .insert_session(
            &seoscope::middleware::auth::hash_token("intruder-token"),
            &intruder.id,
            t.clock.now() + Duration::hours(1),
        )
        .await
        .expect("session");

    let uri = format!("/api/sites/{}/reports/analytics", site.id);
    let (status, _) = api_request(&t.app, "GET", &uri, Some("intruder-token"), None).await;
    assert_eq!(status, 403);

    let (status, _) = api_request(&t.app, "GET", &uri, None, None).await;
    assert_eq!(status, 401);
}
