//! HTTP client tests against mock servers.

use std::time::Duration;

use serde_json::json;
use sundai_bot::chat::{Button, ChatBot, OutgoingMessage, TelegramClient, UpdateKind};
use sundai_bot::config::ReplicateConfig;
use sundai_bot::docs::{DocumentSource, FallbackDocuments, LocalDocuments, NotionDocuments};
use sundai_bot::generate::{ImageGenerator, ReplicateClient};
use sundai_bot::llm::{LanguageModel, OpenAiClient, ResponseSchema};
use sundai_bot::social::{MastodonClient, SocialClient};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn status_json(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "url": format!("https://mastodon.example/@sundai/{id}"),
        "content": "<p>hello</p>",
        "created_at": "2026-01-01T00:00:00Z",
        "account": { "id": "1", "acct": "sundai" }
    })
}

// ========== Language model ==========

#[tokio::test]
async fn test_openai_structured_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "response_format": { "type": "json_schema", "json_schema": { "name": "answer", "strict": true } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "{\"answer\": 42}", "refusal": null } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new("sk-test", "gpt-test", server.uri()).unwrap();
    let schema = ResponseSchema {
        name: "answer",
        schema: json!({ "type": "object" }),
    };
    let value = client.complete("system", "user", &schema).await.unwrap();
    assert_eq!(value["answer"], 42);
}

#[tokio::test]
async fn test_openai_error_status_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let client = OpenAiClient::new("sk-test", "gpt-test", server.uri()).unwrap();
    let schema = ResponseSchema {
        name: "answer",
        schema: json!({ "type": "object" }),
    };
    let err = client.complete("s", "u", &schema).await.unwrap_err();
    assert!(err.to_string().contains("429"));
}

// ========== Mastodon ==========

#[tokio::test]
async fn test_mastodon_publish_reply_and_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .and(header("authorization", "Bearer masto"))
        .and(body_partial_json(json!({ "in_reply_to_id": "55", "visibility": "public" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json("77")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/statuses/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/search"))
        .and(query_param("q", "#retail"))
        .and(query_param("type", "statuses"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "statuses": [status_json("1"), status_json("2")] })),
        )
        .mount(&server)
        .await;

    let client = MastodonClient::new("masto", server.uri()).unwrap();

    let published = client.reply("55", "Thanks for sharing").await.unwrap();
    assert_eq!(published.id, "77");
    assert_eq!(
        published.url.as_deref(),
        Some("https://mastodon.example/@sundai/77")
    );

    assert!(client.get_status("missing").await.unwrap().is_none());

    let found = client.search("#retail", 10).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].favourites_count, 0);
}

#[tokio::test]
async fn test_mastodon_publish_with_image_uploads_media_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/media"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .and(body_partial_json(json!({ "media_ids": ["m1"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json("80")))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("robot.png");
    std::fs::write(&image, b"\x89PNG fake").unwrap();

    let client = MastodonClient::new("masto", server.uri()).unwrap();
    let published = client.publish("Look!", Some(&image)).await.unwrap();
    assert_eq!(published.id, "80");
}

// ========== Telegram ==========

#[tokio::test]
async fn test_telegram_send_and_updates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": 42,
            "reply_markup": { "inline_keyboard": [[{ "text": "✅ Approve", "callback_data": "approve" }]] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 5, "chat": { "id": 42 } }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/getUpdates"))
        .and(body_partial_json(json!({ "offset": 10 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [
                {
                    "update_id": 10,
                    "callback_query": {
                        "id": "cb",
                        "from": { "id": 7 },
                        "message": { "message_id": 5, "chat": { "id": 42 } },
                        "data": "approve"
                    }
                },
                {
                    "update_id": 11,
                    "message": { "message_id": 6, "chat": { "id": 42 }, "from": { "id": 7 }, "text": "hi" }
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = TelegramClient::new("TOKEN", server.uri()).unwrap();
    let message = OutgoingMessage {
        text: "Approve?".to_string(),
        photo: None,
        buttons: vec![Button::new("✅ Approve", "approve")],
    };
    let handle = client.send(42, &message).await.unwrap();
    assert_eq!(handle.message_id, 5);
    assert!(!handle.has_photo);

    let updates = client.get_updates(Some(10), Duration::ZERO).await.unwrap();
    assert_eq!(updates.len(), 2);
    assert_eq!(
        updates[0].kind,
        UpdateKind::Callback {
            id: "cb".to_string(),
            from: 7,
            chat_id: Some(42),
            message_id: Some(5),
            data: Some("approve".to_string()),
        }
    );
    assert!(matches!(updates[1].kind, UpdateKind::Text { from: 7, .. }));
}

#[tokio::test]
async fn test_telegram_api_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let client = TelegramClient::new("TOKEN", server.uri()).unwrap();
    let err = client
        .send(1, &OutgoingMessage::default())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("chat not found"));
}

// ========== Replicate ==========

#[tokio::test]
async fn test_replicate_polls_and_downloads() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/models/owner/flux/predictions"))
        .and(header("prefer", "wait"))
        .and(body_partial_json(json!({ "input": { "prompt": "TOK robot", "aspect_ratio": "16:9" } })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p1",
            "status": "processing",
            "urls": { "get": format!("{}/v1/predictions/p1", server.uri()) }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "p1",
            "status": "succeeded",
            "output": [format!("{}/files/out.png", server.uri())]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/out.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config = ReplicateConfig {
        api_token: "r8".to_string(),
        model: "owner/flux".to_string(),
        trigger_word: Some("TOK".to_string()),
        api_base_url: server.uri(),
    };
    let client = ReplicateClient::new(&config, temp_dir.path())
        .unwrap()
        .with_poll_interval(Duration::from_millis(1));

    let image = client.generate("robot", "16:9").await.unwrap();
    assert_eq!(image.model, "owner/flux");
    assert!(image
        .path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("robot_"));
    assert_eq!(std::fs::read(&image.path).unwrap(), b"png-bytes");
}

#[tokio::test]
async fn test_replicate_failed_prediction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/predictions"))
        .and(body_partial_json(json!({ "version": "abc123" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p2",
            "status": "failed",
            "error": "NSFW content detected"
        })))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config = ReplicateConfig {
        api_token: "r8".to_string(),
        model: "owner/flux:abc123".to_string(),
        trigger_word: None,
        api_base_url: server.uri(),
    };
    let client = ReplicateClient::new(&config, temp_dir.path()).unwrap();

    let err = client.generate("robot", "1:1").await.unwrap_err();
    assert!(err.to_string().contains("failed"));
}

// ========== Notion ==========

#[tokio::test]
async fn test_notion_pages_become_documents() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .and(header("notion-version", "2022-06-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "id": "page-1",
                "properties": {
                    "Name": { "type": "title", "title": [{ "plain_text": "Company Overview" }] }
                }
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/blocks/page-1/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "type": "paragraph", "paragraph": { "rich_text": [{ "plain_text": "We count shelves." }] } },
                { "type": "divider", "divider": {} }
            ]
        })))
        .mount(&server)
        .await;

    let notion = NotionDocuments::new("secret", server.uri()).unwrap();
    let docs = notion.load_documents().await.unwrap();
    assert_eq!(docs.get("company_overview"), Some("We count shelves."));
}

#[tokio::test]
async fn test_notion_failure_falls_back_to_local_docs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("voice.md"), "Friendly.").unwrap();

    let source = FallbackDocuments::new(
        Box::new(NotionDocuments::new("bad", server.uri()).unwrap()),
        Box::new(LocalDocuments::new(temp_dir.path())),
    );
    let docs = source.load_documents().await.unwrap();
    assert_eq!(docs.get("voice"), Some("Friendly."));
}
