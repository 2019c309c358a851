//! Integration tests for the pastebin HTTP API.

mod support;

use axum::http::StatusCode;
use chrono::Duration as ChronoDuration;
use pastebin_core::kv::{paste_key, KvStore};
use pastebin_core::test_support::TEST_EPOCH_MS;
use serde_json::{json, Value};
use support::{setup_test_app, test_app_for_config, test_config, TestApp, BASE_URL};

async fn create(app: &TestApp, body: Value) -> String {
    let response = app.server.post("/api/pastes").json(&body).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let created: Value = response.json();
    created["id"].as_str().expect("id").to_string()
}

#[tokio::test]
async fn create_then_read_round_trip() {
    let app = setup_test_app();

    let response = app
        .server
        .post("/api/pastes")
        .json(&json!({ "content": "Hello, World!" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let created: Value = response.json();
    let id = created["id"].as_str().unwrap();
    assert_eq!(created["url"], format!("{}/p/{}", BASE_URL, id));

    let response = app.server.get(&format!("/api/pastes/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let view: Value = response.json();
    assert_eq!(
        view,
        json!({ "content": "Hello, World!", "remaining_views": null, "expires_at": null })
    );
}

#[tokio::test]
async fn routes_are_served_at_root_and_under_api() {
    let app = setup_test_app();

    let response = app
        .server
        .post("/pastes")
        .json(&json!({ "content": "root" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let id = response.json::<Value>()["id"].as_str().unwrap().to_string();

    assert_eq!(
        app.server.get(&format!("/pastes/{}", id)).await.status_code(),
        StatusCode::OK
    );
    assert_eq!(
        app.server
            .get(&format!("/api/pastes/{}", id))
            .await
            .status_code(),
        StatusCode::OK
    );
    assert_eq!(app.server.get("/healthz").await.status_code(), StatusCode::OK);
    assert_eq!(
        app.server.get("/api/healthz").await.status_code(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn single_view_paste_scenario() {
    let app = setup_test_app();
    let id = create(&app, json!({ "content": "hello", "max_views": 1 })).await;

    let response = app.server.get(&format!("/api/pastes/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let view: Value = response.json();
    assert_eq!(view["content"], "hello");
    assert_eq!(view["remaining_views"], 0);

    let response = app.server.get(&format!("/api/pastes/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>(), json!({ "error": "Paste not found" }));
}

#[tokio::test]
async fn ttl_paste_expires_with_the_clock() {
    let app = setup_test_app();
    let id = create(&app, json!({ "content": "x", "ttl_seconds": 1 })).await;

    let response = app.server.get(&format!("/api/pastes/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["expires_at"], "2024-01-01T00:00:01.000Z");

    app.clock.advance(ChronoDuration::seconds(2));
    let response = app.server.get(&format!("/api/pastes/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mode_header_overrides_now() {
    let mut config = test_config();
    config.test_mode = true;
    let app = test_app_for_config(config);
    let id = create(&app, json!({ "content": "x", "ttl_seconds": 60 })).await;

    let before_expiry = (TEST_EPOCH_MS + 59_999).to_string();
    let response = app
        .server
        .get(&format!("/api/pastes/{}", id))
        .add_header("x-test-now-ms", before_expiry.as_str())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let at_expiry = (TEST_EPOCH_MS + 60_000).to_string();
    let response = app
        .server
        .get(&format!("/api/pastes/{}", id))
        .add_header("x-test-now-ms", at_expiry.as_str())
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    // Unparsable values fall back to the service clock.
    let response = app
        .server
        .get(&format!("/api/pastes/{}", id))
        .add_header("x-test-now-ms", "soon")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_mode_header_is_ignored_outside_test_mode() {
    let app = setup_test_app();
    let id = create(&app, json!({ "content": "x", "ttl_seconds": 60 })).await;

    let far_future = (TEST_EPOCH_MS + 3_600_000).to_string();
    let response = app
        .server
        .get(&format!("/api/pastes/{}", id))
        .add_header("x-test-now-ms", far_future.as_str())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn create_with_test_mode_header_sets_created_at() {
    let mut config = test_config();
    config.test_mode = true;
    let app = test_app_for_config(config);

    let response = app
        .server
        .post("/api/pastes")
        .add_header("x-test-now-ms", "1704070800000")
        .json(&json!({ "content": "x", "ttl_seconds": 10 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let id = response.json::<Value>()["id"].as_str().unwrap().to_string();

    let raw = app.store.get(&paste_key(&id)).await.unwrap().expect("record");
    let record: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(record["createdAt"], 1_704_070_800_000i64);
    assert_eq!(record["expiresAt"], "2024-01-01T01:00:10.000Z");
}

#[tokio::test]
async fn validation_failures_return_400_with_field() {
    let app = setup_test_app();
    let cases = [
        (json!({ "content": "" }), "content: Content must be a non-empty string"),
        (json!({}), "content: Required"),
        (json!({ "content": 5 }), "content: Expected string, received number"),
        (
            json!({ "content": "x", "ttl_seconds": 0 }),
            "ttl_seconds: Number must be greater than or equal to 1",
        ),
        (
            json!({ "content": "x", "ttl_seconds": 1.5 }),
            "ttl_seconds: Expected integer, received float",
        ),
        (
            json!({ "content": "x", "max_views": 1_000_001 }),
            "max_views: Number must be less than or equal to 1000000",
        ),
        (
            json!({ "content": "x", "max_views": null }),
            "max_views: Expected number, received null",
        ),
    ];

    for (body, expected) in cases {
        let response = app.server.post("/api/pastes").json(&body).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(response.json::<Value>()["error"], expected);
    }
    assert_eq!(app.store.count_prefix("paste:"), 0);
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let app = setup_test_app();
    for body in ["{\"content\": ", "not json", ""] {
        let response = app.server.post("/api/pastes").text(body).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>(),
            json!({ "error": "Invalid JSON in request body" })
        );
    }
}

#[tokio::test]
async fn oversized_body_is_rejected_before_parsing() {
    let app = setup_test_app();
    let content = "a".repeat(11 * 1024 * 1024);
    let body = json!({ "content": content }).to_string();

    let response = app.server.post("/api/pastes").text(body).await;
    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(response.json::<Value>()["error"].is_string());
    assert_eq!(app.store.count_prefix("paste:"), 0);
}

#[tokio::test]
async fn content_at_the_limit_is_accepted_with_any_content_type() {
    let app = setup_test_app();
    let content = "b".repeat(10 * 1024 * 1024);
    let body = json!({ "content": content }).to_string();

    let response = app.server.post("/api/pastes").text(body).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn unknown_and_garbage_ids_are_404() {
    let app = setup_test_app();
    for id in ["does-not-exist", "00000000-0000-4000-8000-000000000000"] {
        let response = app.server.get(&format!("/api/pastes/{}", id)).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn store_outage_maps_to_503_without_details() {
    let app = setup_test_app();
    let id = create(&app, json!({ "content": "x" })).await;
    app.faulty.fail_all(true);

    let response = app
        .server
        .post("/api/pastes")
        .json(&json!({ "content": "y" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let error = response.json::<Value>()["error"].as_str().unwrap().to_string();
    assert!(!error.contains("injected"), "{}", error);

    let response = app.server.get(&format!("/api/pastes/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn healthz_reports_store_state_with_200() {
    let app = setup_test_app();

    let response = app.server.get("/healthz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "ok": true }));

    app.faulty.fail_all(true);
    let response = app.server.get("/healthz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "ok": false }));
}

#[tokio::test]
async fn rendered_page_escapes_and_counts_views() {
    let app = setup_test_app();
    let id = create(
        &app,
        json!({ "content": "<script>alert('x')</script>", "max_views": 2 }),
    )
    .await;

    let response = app.server.get(&format!("/p/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.assert_header("content-type", "text/html; charset=utf-8");
    let html = response.text();
    assert!(html.contains("&lt;script&gt;"));
    assert!(!html.contains("<script>"));
    assert!(html.contains("1 views remaining"));

    let response = app.server.get(&format!("/api/pastes/{}", id)).await;
    assert_eq!(response.json::<Value>()["remaining_views"], 0);

    let response = app.server.get(&format!("/p/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert!(response.text().contains("404 - Paste Not Found"));
}

#[tokio::test]
async fn rate_limit_applies_to_paste_api_only() {
    let mut config = test_config();
    config.rate_limit_max_requests = 2;
    config.trust_proxy_headers = true;
    let app = test_app_for_config(config);

    for remaining in ["1", "0"] {
        let response = app
            .server
            .post("/api/pastes")
            .add_header("x-forwarded-for", "203.0.113.7")
            .json(&json!({ "content": "x" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        response.assert_header("x-ratelimit-limit", "2");
        response.assert_header("x-ratelimit-remaining", remaining);
        response.assert_contains_header("x-ratelimit-reset");
    }

    let response = app
        .server
        .get("/api/pastes/00000000-0000-4000-8000-000000000000")
        .add_header("x-forwarded-for", "203.0.113.7")
        .await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    response.assert_header("retry-after", "60");
    response.assert_header("x-ratelimit-remaining", "0");
    assert!(response.json::<Value>()["error"].is_string());

    // Other clients and unmetered routes are unaffected.
    let response = app
        .server
        .post("/api/pastes")
        .add_header("x-forwarded-for", "198.51.100.2")
        .json(&json!({ "content": "x" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let response = app
        .server
        .get("/api/healthz")
        .add_header("x-forwarded-for", "203.0.113.7")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(!response.contains_header("x-ratelimit-limit"));

    // A new window resets the count.
    app.clock.advance(ChronoDuration::seconds(60));
    let response = app
        .server
        .post("/api/pastes")
        .add_header("x-forwarded-for", "203.0.113.7")
        .json(&json!({ "content": "x" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn forged_forwarded_for_does_not_escape_the_limit() {
    let mut config = test_config();
    config.rate_limit_max_requests = 2;
    let app = test_app_for_config(config);

    for (attempt, forged) in ["203.0.113.1", "203.0.113.2", "203.0.113.3"]
        .into_iter()
        .enumerate()
    {
        let response = app
            .server
            .post("/api/pastes")
            .add_header("x-forwarded-for", forged)
            .add_header("x-real-ip", forged)
            .json(&json!({ "content": "x" }))
            .await;
        let expected = if attempt < 2 {
            StatusCode::CREATED
        } else {
            StatusCode::TOO_MANY_REQUESTS
        };
        assert_eq!(response.status_code(), expected, "attempt {}", attempt);
    }
}

#[tokio::test]
async fn rate_limiter_fails_open_when_store_counter_fails() {
    let mut config = test_config();
    config.rate_limit_max_requests = 1;
    let app = test_app_for_config(config);
    let id = create(&app, json!({ "content": "x" })).await;

    app.faulty.fail_incr(true);
    for _ in 0..3 {
        let response = app.server.get(&format!("/api/pastes/{}", id)).await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }
}

#[tokio::test]
async fn security_headers_are_set() {
    let app = setup_test_app();
    let response = app.server.get("/healthz").await;
    response.assert_header("x-content-type-options", "nosniff");
    response.assert_header("x-frame-options", "DENY");
    response.assert_contains_header("content-security-policy");
}

#[tokio::test]
async fn strict_cors_allows_loopback_origins_only() {
    let app = setup_test_app();

    let response = app
        .server
        .get("/healthz")
        .add_header("origin", "http://localhost:3000")
        .await;
    response.assert_header("access-control-allow-origin", "http://localhost:3000");

    let response = app
        .server
        .get("/healthz")
        .add_header("origin", "http://example.com:3000")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(!response.contains_header("access-control-allow-origin"));
}

#[tokio::test]
async fn public_access_allows_any_origin() {
    let mut config = test_config();
    config.allow_public_access = true;
    let app = test_app_for_config(config);

    let response = app
        .server
        .get("/healthz")
        .add_header("origin", "http://example.com")
        .await;
    response.assert_header("access-control-allow-origin", "*");
}

#[tokio::test]
async fn stored_record_is_compatible_with_existing_format() {
    let app = setup_test_app();
    let id = create(&app, json!({ "content": "x", "ttl_seconds": 30, "max_views": 3 })).await;
    app.server.get(&format!("/api/pastes/{}", id)).await;

    let raw = app.store.get(&paste_key(&id)).await.unwrap().expect("record");
    let record: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        record,
        json!({
            "id": id,
            "content": "x",
            "createdAt": TEST_EPOCH_MS,
            "ttlSeconds": 30,
            "maxViews": 3,
            "viewCount": 1,
            "expiresAt": "2024-01-01T00:00:30.000Z",
        })
    );
}
