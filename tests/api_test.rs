//! Integration tests for the HTTP API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{
    press, setup_db, status, test_service, text, FakeChatBot, FakeLlm, FakeSocial,
    FIRST_MESSAGE_ID, REVIEWER, REVIEW_CHAT,
};
use serde_json::{json, Value};
use sundai_bot::approval::{ApprovalGate, FeedbackLog, GateSettings, APPROVE_DATA, REJECT_DATA};
use sundai_bot::config::Config;
use sundai_bot::service::ContentService;
use sundai_bot::web::{self, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

const API_KEY: &str = "test-key";

struct TestApp {
    router: Router,
    social: Arc<FakeSocial>,
    feedback: Arc<FeedbackLog>,
    _temp_dir: TempDir,
}

async fn build_app(llm: FakeLlm, social: FakeSocial) -> TestApp {
    build_app_with(llm, social, |service| service).await
}

async fn build_app_with(
    llm: FakeLlm,
    social: FakeSocial,
    customize: impl FnOnce(ContentService) -> ContentService,
) -> TestApp {
    let (db, temp_dir) = setup_db().await;
    let feedback = Arc::new(FeedbackLog::new(temp_dir.path().join("feedback.json")));
    let social = Arc::new(social);
    let service = customize(test_service(db, llm, social.clone(), feedback.clone()));

    let state = AppState::new(Config::for_testing(), service);
    TestApp {
        router: web::app(state),
        social,
        feedback,
        _temp_dir: temp_dir,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", API_KEY);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// POST a raw body, with or without a content type.
async fn send_raw(router: &Router, uri: &str, body: &str, content_type: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-api-key", API_KEY);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    let response = router
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn generate_post(router: &Router) -> i64 {
    let (status, post) = send(
        router,
        "POST",
        "/api/v1/posts/generate",
        Some(json!({ "post_type": "thought_leadership", "platform": "mastodon" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    post["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_needs_no_key() {
    let app = build_app(FakeLlm::default(), FakeSocial::default()).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_missing_and_wrong_api_key() {
    let app = build_app(FakeLlm::default(), FakeSocial::default()).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/api/v1/posts").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/posts")
                .header("x-api-key", "nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Invalid API key");
    assert_eq!(body["status_code"], 403);
}

#[tokio::test]
async fn test_generate_approve_publish() {
    let app = build_app(FakeLlm::default(), FakeSocial::default()).await;
    let id = generate_post(&app.router).await;

    let (status, post) = send(&app.router, "GET", &format!("/api/v1/posts/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["status"], "pending");
    assert!(post["content"].as_str().unwrap().contains("#retail"));

    let (status, post) = send(
        &app.router,
        "POST",
        &format!("/api/v1/posts/{id}/approve"),
        Some(json!({ "approved": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["status"], "approved");

    let (status, post) = send(
        &app.router,
        "POST",
        &format!("/api/v1/posts/{id}/publish"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["status"], "published");
    assert_eq!(app.social.published().len(), 1);

    let (_, posts) = send(&app.router, "GET", "/api/v1/posts?status=published", None).await;
    let posts = posts.as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert!(posts[0]["external_url"].as_str().is_some());
}

#[tokio::test]
async fn test_reject_with_reason_logs_feedback() {
    let app = build_app(FakeLlm::default(), FakeSocial::default()).await;
    let id = generate_post(&app.router).await;

    let (status, post) = send(
        &app.router,
        "POST",
        &format!("/api/v1/posts/{id}/approve"),
        Some(json!({ "approved": false, "rejection_reason": "too promotional" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["status"], "rejected");
    assert_eq!(post["rejection_reason"], "too promotional");

    let entries = app.feedback.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].rejection_reason.as_deref(), Some("too promotional"));
    assert!(!entries[0].content_preview.is_empty());

    let (_, summary) = send(&app.router, "GET", "/api/v1/approvals/stats/summary", None).await;
    assert_eq!(summary["rejected"], 1);

    // Already decided.
    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/api/v1/posts/{id}/approve"),
        Some(json!({ "approved": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status_code"], 400);
}

#[tokio::test]
async fn test_publish_requires_approval() {
    let app = build_app(FakeLlm::default(), FakeSocial::default()).await;
    let id = generate_post(&app.router).await;

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/api/v1/posts/{id}/publish"),
        Some(json!({ "post_to_network": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.social.published().is_empty());
}

#[tokio::test]
async fn test_publish_body_is_honoured_or_rejected() {
    let app = build_app(FakeLlm::default(), FakeSocial::default()).await;
    let approve = |id: i64| {
        let router = app.router.clone();
        async move {
            send(
                &router,
                "POST",
                &format!("/api/v1/posts/{id}/approve"),
                Some(json!({ "approved": true })),
            )
            .await
        }
    };

    // A body that does not parse never falls back to posting publicly.
    let first = generate_post(&app.router).await;
    approve(first).await;
    let uri = format!("/api/v1/posts/{first}/publish");
    for (body, content_type) in [
        (r#"{"post_to_network": "false"}"#, Some("application/json")),
        ("post_to_network=false", Some("application/x-www-form-urlencoded")),
        (r#"{"post_to_network": false"#, None),
    ] {
        let (status, error) = send_raw(&app.router, &uri, body, content_type).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(error["status_code"], 400);
    }
    let (_, post) = send(&app.router, "GET", &format!("/api/v1/posts/{first}"), None).await;
    assert_eq!(post["status"], "approved");
    assert!(app.social.published().is_empty());

    // Valid JSON without a content type is still read.
    let (status, post) = send_raw(&app.router, &uri, r#"{"post_to_network": false}"#, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["status"], "published");
    assert!(post["external_url"].is_null());
    assert!(app.social.published().is_empty());

    // An empty body keeps the default of posting to the network.
    let second = generate_post(&app.router).await;
    approve(second).await;
    let (status, _) = send_raw(&app.router, &format!("/api/v1/posts/{second}/publish"), "", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.social.published().len(), 1);
}

#[tokio::test]
async fn test_reply_publish_rejects_malformed_body() {
    let app = build_app(FakeLlm::default(), FakeSocial::with_statuses(vec![status("111", "2", "alice")])).await;
    let (status, reply) = send(
        &app.router,
        "POST",
        "/api/v1/replies/generate",
        Some(json!({ "post_id": "111" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = reply["id"].as_i64().unwrap();
    send(
        &app.router,
        "POST",
        &format!("/api/v1/replies/{id}/approve"),
        Some(json!({ "approved": true })),
    )
    .await;

    let uri = format!("/api/v1/replies/{id}/publish");
    let (status, _) = send_raw(&app.router, &uri, r#"{"post_to_network": 0}"#, Some("application/json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.social.published().is_empty());

    let (status, reply) = send_raw(&app.router, &uri, r#"{"post_to_network": false}"#, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "published");
    assert!(app.social.published().is_empty());
}

#[tokio::test]
async fn test_failed_publish_leaves_post_approved() {
    let social = FakeSocial {
        fail_publish: true,
        ..FakeSocial::default()
    };
    let app = build_app(FakeLlm::default(), social).await;
    let id = generate_post(&app.router).await;
    send(
        &app.router,
        "POST",
        &format!("/api/v1/posts/{id}/approve"),
        Some(json!({ "approved": true })),
    )
    .await;

    let (status, _) = send(&app.router, "POST", &format!("/api/v1/posts/{id}/publish"), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (_, post) = send(&app.router, "GET", &format!("/api/v1/posts/{id}"), None).await;
    assert_eq!(post["status"], "approved");
}

#[tokio::test]
async fn test_unknown_post_and_bad_pagination() {
    let app = build_app(FakeLlm::default(), FakeSocial::default()).await;

    let (status, body) = send(&app.router, "GET", "/api/v1/posts/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status_code"], 404);

    let (status, _) = send(&app.router, "GET", "/api/v1/posts?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, "GET", "/api/v1/posts?limit=101", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, "GET", "/api/v1/posts?offset=-1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, "GET", "/api/v1/posts?status=lost", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reply_flow_and_threshold() {
    let social = FakeSocial::with_statuses(vec![status("111", "2", "alice@example.social")]);
    let app = build_app(FakeLlm::default(), social).await;

    let (status, found) = send(
        &app.router,
        "POST",
        "/api/v1/replies/search",
        Some(json!({ "hashtag": "inventory", "limit": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found[0]["id"], "111");
    assert_eq!(found[0]["content"], "Inventory tracking is hard #111");

    let (status, reply) = send(
        &app.router,
        "POST",
        "/api/v1/replies/generate",
        Some(json!({ "post_id": "111" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["relevance_score"], 8);
    let id = reply["id"].as_i64().unwrap();

    send(
        &app.router,
        "POST",
        &format!("/api/v1/replies/{id}/approve"),
        Some(json!({ "approved": true })),
    )
    .await;
    let (status, reply) = send(
        &app.router,
        "POST",
        &format!("/api/v1/replies/{id}/publish"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "published");
    assert_eq!(app.social.published()[0].0.as_deref(), Some("111"));

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/v1/replies/generate",
        Some(json!({ "post_id": "does-not-exist" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_low_relevance_reply_is_unprocessable() {
    let social = FakeSocial::with_statuses(vec![status("111", "2", "alice")]);
    let llm = FakeLlm {
        reply_score: 3,
        should_reply: false,
    };
    let app = build_app(llm, social).await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/replies/generate",
        Some(json!({ "post_id": "111" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status_code"], 422);

    let (_, replies) = send(&app.router, "GET", "/api/v1/replies", None).await;
    assert!(replies.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_image_generation_not_configured() {
    let app = build_app(FakeLlm::default(), FakeSocial::default()).await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/images/generate",
        Some(json!({ "prompt": "a robot", "aspect_ratio": "1:1" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status_code"], 503);

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/v1/images/generate",
        Some(json!({ "prompt": "a robot", "aspect_ratio": "7:3" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analytics_and_usage() {
    let app = build_app(FakeLlm::default(), FakeSocial::default()).await;
    let a = generate_post(&app.router).await;
    let _b = generate_post(&app.router).await;
    send(
        &app.router,
        "POST",
        &format!("/api/v1/posts/{a}/approve"),
        Some(json!({ "approved": false })),
    )
    .await;

    let (status, analytics) = send(&app.router, "GET", "/api/v1/analytics/posts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analytics["total"], 2);
    assert_eq!(analytics["pending"], 1);
    assert_eq!(analytics["rejected"], 1);
    assert_eq!(analytics["approval_rate"], 50.0);

    let (_, usage) = send(&app.router, "GET", "/api/v1/analytics/api-usage", None).await;
    let endpoints = usage["endpoints"].as_array().unwrap();
    assert!(endpoints
        .iter()
        .any(|e| e["endpoint"] == "/api/v1/posts/generate" && e["requests"] == 2));
    assert!(endpoints
        .iter()
        .any(|e| e["endpoint"] == "/api/v1/posts/:id/approve"));
}

#[tokio::test]
async fn test_review_without_gate_is_unavailable() {
    let app = build_app(FakeLlm::default(), FakeSocial::default()).await;
    let id = generate_post(&app.router).await;

    let (status, _) = send(&app.router, "POST", &format!("/api/v1/posts/{id}/review"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

async fn wait_for_status(router: &Router, uri: &str, expected: &str) -> Value {
    for _ in 0..200 {
        let (_, body) = send(router, "GET", uri, None).await;
        if body["status"] == expected {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{uri} never reached {expected}");
}

fn gate_with(bot: Arc<FakeChatBot>) -> Arc<ApprovalGate> {
    let settings = GateSettings {
        chat_id: REVIEW_CHAT,
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(5),
        collect_feedback: true,
    };
    Arc::new(ApprovalGate::new(bot, settings))
}

#[tokio::test]
async fn test_chat_review_approves_and_publishes() {
    let bot = FakeChatBot::scripted(vec![vec![press(1, FIRST_MESSAGE_ID, APPROVE_DATA)]]);
    let gate_bot = bot.clone();
    let app = build_app_with(FakeLlm::default(), FakeSocial::default(), move |service| {
        service.with_gate(gate_with(gate_bot))
    })
    .await;
    let id = generate_post(&app.router).await;

    let (status, body) = send(&app.router, "POST", &format!("/api/v1/posts/{id}/review"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["id"], id);

    let post = wait_for_status(&app.router, &format!("/api/v1/posts/{id}"), "published").await;
    assert!(post["external_url"].as_str().is_some());

    // Approval request, then the publish notification.
    let sent = bot.sent();
    assert!(sent[0].text.contains("Approval Request: POST"));
    assert!(sent.last().unwrap().text.starts_with("✅ Published post"));
}

#[tokio::test]
async fn test_chat_review_rejection_with_reason() {
    let bot = FakeChatBot::scripted(vec![
        vec![press(1, FIRST_MESSAGE_ID, REJECT_DATA)],
        vec![text(2, REVIEWER, "  too promotional \n")],
    ]);
    let gate_bot = bot.clone();
    let app = build_app_with(FakeLlm::default(), FakeSocial::default(), move |service| {
        service.with_gate(gate_with(gate_bot))
    })
    .await;
    let id = generate_post(&app.router).await;

    let (status, _) = send(&app.router, "POST", &format!("/api/v1/posts/{id}/review"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let post = wait_for_status(&app.router, &format!("/api/v1/posts/{id}"), "rejected").await;
    assert_eq!(post["rejection_reason"], "too promotional");

    // Stored once, trimmed the same way as the decision.
    let entries = app.feedback.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].rejection_reason.as_deref(), Some("too promotional"));
    assert!(app.social.published().is_empty());
}

#[tokio::test]
async fn test_duplicate_review_runs_one_session() {
    // The reviewer takes a few polls to answer the first request.
    let mut script = vec![Vec::new(); 10];
    script.push(vec![press(1, FIRST_MESSAGE_ID, REJECT_DATA)]);
    script.push(vec![text(2, REVIEWER, "too promotional")]);
    script.push(vec![press(3, FIRST_MESSAGE_ID + 1, REJECT_DATA)]);
    script.push(vec![text(4, REVIEWER, "still too promotional")]);
    let bot = FakeChatBot::scripted(script);
    let gate_bot = bot.clone();
    let app = build_app_with(FakeLlm::default(), FakeSocial::default(), move |service| {
        service.with_gate(gate_with(gate_bot))
    })
    .await;
    let id = generate_post(&app.router).await;
    let uri = format!("/api/v1/posts/{id}/review");

    let (first, _) = send(&app.router, "POST", &uri, None).await;
    let (second, _) = send(&app.router, "POST", &uri, None).await;
    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(second, StatusCode::ACCEPTED);

    let post = wait_for_status(&app.router, &format!("/api/v1/posts/{id}"), "rejected").await;
    assert_eq!(post["rejection_reason"], "too promotional");

    // Give the queued review its turn; it finds the post decided and stops.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bot.sent().len(), 1);
    assert_eq!(app.feedback.entries().await.unwrap().len(), 1);
    let (_, approvals) = send(&app.router, "GET", "/api/v1/approvals", None).await;
    assert_eq!(approvals["total"], 1);
}
