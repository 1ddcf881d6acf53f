// Shared by the integration test binaries; not every binary uses every
// helper.
#![allow(dead_code)]

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::ServiceExt;

use seoscope::cache::{Clock, ManualClock};
use seoscope::config::Config;
use seoscope::db::Storage;
use seoscope::handlers::auth::hash_password;
use seoscope::middleware::auth::hash_token;
use seoscope::router::{AppState, app_router};

pub const SESSION_TOKEN: &str = "test-session-token";

pub struct TestApp {
    pub app: axum::Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub user_id: String,
}

/// In-memory app with a hand-driven clock and one seeded admin user whose
/// session token is [`SESSION_TOKEN`].
pub async fn spawn_app(mut config: Config) -> TestApp {
    config.rank_delay_ms = 0;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect memory sqlite");
    let store = Storage::new(pool);
    store.init_schema().await.expect("init schema");

    let clock = Arc::new(ManualClock::starting_at(Utc::now()));
    let state = AppState::new(Arc::new(config), store.clone(), clock.clone());
    let app = app_router(state.clone());

    let user = store
        .create_user(
            "owner@example.com",
            &hash_password("password123").expect("hash password"),
            true,
            clock.now(),
        )
        .await
        .expect("seed user");
    store
        .insert_session(
            &hash_token(SESSION_TOKEN),
            &user.id,
            clock.now() + Duration::hours(24),
        )
        .await
        .expect("seed session");

    TestApp {
        app,
        state,
        clock,
        user_id: user.id,
    }
}

pub async fn api_request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request failed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response was not JSON")
    };
    (status, value)
}
