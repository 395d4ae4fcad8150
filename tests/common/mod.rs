//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use sundai_bot::approval::FeedbackLog;
use sundai_bot::chat::{ChatBot, MessageHandle, OutgoingMessage, Update, UpdateKind};
use sundai_bot::db::Database;
use sundai_bot::docs::{DocumentSource, Documents};
use sundai_bot::llm::{LanguageModel, ResponseSchema};
use sundai_bot::service::{ContentService, ServiceSettings};
use sundai_bot::social::{Account, Published, SocialClient, Status};

pub const REVIEW_CHAT: i64 = 42;
pub const REVIEWER: i64 = 7;

pub async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

// ========== Documents ==========

pub struct StaticDocs;

#[async_trait]
impl DocumentSource for StaticDocs {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn load_documents(&self) -> Result<Documents> {
        Ok([(
            "company_overview".to_string(),
            "InventoryVision AI counts shelf stock from camera feeds.".to_string(),
        )]
        .into_iter()
        .collect())
    }
}

// ========== Language model ==========

/// Answers post requests with a fixed post and scores every status in a
/// reply request with `reply_score`.
pub struct FakeLlm {
    pub reply_score: u8,
    pub should_reply: bool,
}

impl Default for FakeLlm {
    fn default() -> Self {
        Self {
            reply_score: 8,
            should_reply: true,
        }
    }
}

#[async_trait]
impl LanguageModel for FakeLlm {
    fn model_name(&self) -> &str {
        "fake-model"
    }

    async fn complete(&self, _system: &str, user: &str, schema: &ResponseSchema) -> Result<Value> {
        match schema.name {
            "social_media_post" => Ok(json!({
                "content": "Shelf gaps cost retailers more than they think.",
                "hashtags": ["retail", "ai"],
                "platform": "mastodon",
                "post_type": "thought_leadership",
                "call_to_action": null,
                "image_prompt": "a robot scanning shelves"
            })),
            "batch_replies" => {
                let replies: Vec<Value> = user
                    .lines()
                    .filter_map(|line| line.strip_prefix("POST ID: "))
                    .map(|id| {
                        json!({
                            "post_id": id.trim(),
                            "reply_content": "Great point about stock accuracy!",
                            "should_reply": self.should_reply,
                            "reasoning": "Talks about inventory",
                            "relevance_score": self.reply_score,
                        })
                    })
                    .collect();
                Ok(json!({ "replies": replies }))
            }
            other => bail!("unexpected schema {other}"),
        }
    }
}

// ========== Social network ==========

pub const OWN_ACCOUNT_ID: &str = "1";

pub fn status(id: &str, account_id: &str, acct: &str) -> Status {
    Status {
        id: id.to_string(),
        url: Some(format!("https://mastodon.example/@{acct}/{id}")),
        content: format!("<p>Inventory tracking is hard #{id}</p>"),
        created_at: "2026-01-01T00:00:00Z".to_string(),
        account: Account {
            id: account_id.to_string(),
            acct: acct.to_string(),
        },
        replies_count: 1,
        reblogs_count: 2,
        favourites_count: 3,
    }
}

#[derive(Default)]
pub struct FakeSocial {
    pub statuses: Mutex<Vec<Status>>,
    pub published: Mutex<Vec<(Option<String>, String)>>,
    pub fail_publish: bool,
}

impl FakeSocial {
    pub fn with_statuses(statuses: Vec<Status>) -> Self {
        Self {
            statuses: Mutex::new(statuses),
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<(Option<String>, String)> {
        self.published.lock().unwrap().clone()
    }

    fn record(&self, in_reply_to: Option<&str>, text: &str) -> Result<Published> {
        if self.fail_publish {
            bail!("network unavailable");
        }
        let mut published = self.published.lock().unwrap();
        published.push((in_reply_to.map(ToString::to_string), text.to_string()));
        let id = format!("9{}", published.len());
        let url = Some(format!("https://mastodon.example/@sundai/{id}"));
        self.statuses
            .lock()
            .unwrap()
            .push(status(&id, OWN_ACCOUNT_ID, "sundai"));
        Ok(Published { id, url })
    }
}

#[async_trait]
impl SocialClient for FakeSocial {
    async fn publish(&self, text: &str, _image: Option<&Path>) -> Result<Published> {
        self.record(None, text)
    }

    async fn reply(&self, in_reply_to: &str, text: &str) -> Result<Published> {
        self.record(Some(in_reply_to), text)
    }

    async fn search(&self, _query: &str, limit: u32) -> Result<Vec<Status>> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_status(&self, id: &str) -> Result<Option<Status>> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn me(&self) -> Result<Account> {
        Ok(Account {
            id: OWN_ACCOUNT_ID.to_string(),
            acct: "sundai".to_string(),
        })
    }
}

// ========== Chat bot ==========

/// Hands out scripted update batches, one batch per poll.
#[derive(Default)]
pub struct FakeChatBot {
    pub batches: Mutex<VecDeque<Vec<Update>>>,
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub edits: Mutex<Vec<String>>,
    pub answered: Mutex<Vec<String>>,
    pub offsets: Mutex<Vec<Option<i64>>>,
    pub fail_send: bool,
}

impl FakeChatBot {
    pub fn scripted(batches: Vec<Vec<Update>>) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(batches.into()),
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<String> {
        self.edits.lock().unwrap().clone()
    }

    pub fn answered(&self) -> Vec<String> {
        self.answered.lock().unwrap().clone()
    }
}

/// Message ids start at 100 and increase per sent message.
pub const FIRST_MESSAGE_ID: i64 = 100;

#[async_trait]
impl ChatBot for FakeChatBot {
    async fn send(&self, chat_id: i64, message: &OutgoingMessage) -> Result<MessageHandle> {
        if self.fail_send {
            bail!("chat unreachable");
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(MessageHandle {
            chat_id,
            message_id: FIRST_MESSAGE_ID + sent.len() as i64 - 1,
            has_photo: message.photo.is_some(),
        })
    }

    async fn edit(&self, _handle: &MessageHandle, text: &str) -> Result<()> {
        self.edits.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.answered.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }

    async fn get_updates(&self, offset: Option<i64>, _timeout: Duration) -> Result<Vec<Update>> {
        self.offsets.lock().unwrap().push(offset);
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

pub fn press(update_id: i64, message_id: i64, data: &str) -> Update {
    Update {
        update_id,
        kind: UpdateKind::Callback {
            id: format!("cb-{update_id}"),
            from: REVIEWER,
            chat_id: Some(REVIEW_CHAT),
            message_id: Some(message_id),
            data: Some(data.to_string()),
        },
    }
}

pub fn text(update_id: i64, from: i64, body: &str) -> Update {
    Update {
        update_id,
        kind: UpdateKind::Text {
            from,
            chat_id: REVIEW_CHAT,
            text: body.to_string(),
        },
    }
}

// ========== Service ==========

pub fn test_settings() -> ServiceSettings {
    ServiceSettings {
        company_name: "InventoryVision AI".to_string(),
        min_relevance: 5,
        feedback_context_entries: 5,
    }
}

pub fn test_service(
    db: Database,
    llm: FakeLlm,
    social: Arc<FakeSocial>,
    feedback: Arc<FeedbackLog>,
) -> ContentService {
    ContentService::new(
        db,
        Arc::new(llm),
        Arc::new(StaticDocs),
        social,
        feedback,
        test_settings(),
    )
}
