mod common;

use axum::body::Body;
use axum::http::Request;
use chrono::Duration;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::spawn_app;
use seoscope::cache::Clock;
use seoscope::config::Config;

async fn submit(
    app: &axum::Router,
    form_id: &str,
    ip: &str,
    body: Value,
) -> (axum::http::StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/public/forms/{form_id}/submissions"))
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

#[tokio::test]
async fn honeypot_and_too_fast_submissions_fake_success_without_writes() {
    let t = spawn_app(Config::default()).await;
    let site = t
        .state
        .store
        .create_site(&t.user_id, "Example", "example.com", t.clock.now())
        .await
        .expect("site");
    let form = t
        .state
        .store
        .create_form(&site.id, "Contact")
        .await
        .expect("form");

    let now_ms = t.clock.now().timestamp_millis();

    // Honeypot filled: success-shaped response, nothing stored.
    let (status, body) = submit(
        &t.app,
        &form.id,
        "198.51.100.1",
        json!({"name": "Bot", "_hp": "gotcha", "_startedAt": now_ms - 60_000}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
    assert!(body.get("id").is_none());

    // Submitted 400ms after render: same silent drop.
    let (status, body) = submit(
        &t.app,
        &form.id,
        "198.51.100.1",
        json!({"name": "Fast Bot", "_startedAt": now_ms - 400}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);

    assert_eq!(
        t.state
            .store
            .count_submissions(&form.id)
            .await
            .expect("count"),
        0
    );

    // A human-speed submission does persist, with meta fields stripped.
    let (status, body) = submit(
        &t.app,
        &form.id,
        "198.51.100.1",
        json!({"name": "Alice", "_startedAt": now_ms - 30_000}),
    )
    .await;
    assert_eq!(status, 200);
    assert!(body["id"].as_str().is_some());
    let stored = t
        .state
        .store
        .list_submissions(&form.id)
        .await
        .expect("list");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].data["name"], "Alice");
    assert!(stored[0].data.get("_startedAt").is_none());
}

#[tokio::test]
async fn eleventh_submission_per_window_is_rejected_then_window_resets() {
    let t = spawn_app(Config::default()).await;
    let site = t
        .state
        .store
        .create_site(&t.user_id, "Example", "example.com", t.clock.now())
        .await
        .expect("site");
    let form = t
        .state
        .store
        .create_form(&site.id, "Contact")
        .await
        .expect("form");

    let payload = |t: &common::TestApp| {
        json!({"name": "Visitor", "_startedAt": t.clock.now().timestamp_millis() - 10_000})
    };

    for i in 0..10 {
        let (status, _) = submit(&t.app, &form.id, "203.0.113.9", payload(&t)).await;
        assert_eq!(status, 200, "submission {i} should pass");
    }
    let (status, _) = submit(&t.app, &form.id, "203.0.113.9", payload(&t)).await;
    assert_eq!(status, 429);

    // A different client is unaffected.
    let (status, _) = submit(&t.app, &form.id, "203.0.113.10", payload(&t)).await;
    assert_eq!(status, 200);

    // First submission of the next window goes through again.
    t.clock.advance(Duration::seconds(60));
    let (status, _) = submit(&t.app, &form.id, "203.0.113.9", payload(&t)).await;
    assert_eq!(status, 200);

    assert_eq!(
        t.state
            .store
            .count_submissions(&form.id)
            .await
            .expect("count"),
        12
    );
}
