//! Chat bot client used to reach the human reviewer (Telegram Bot API).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::TelegramConfig;
use crate::constants::{TELEGRAM_CAPTION_LIMIT, USER_AGENT};

/// An inline button and the data delivered when it is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    #[must_use]
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// A message to deliver. With a photo, `text` becomes the caption.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub text: String,
    pub photo: Option<PathBuf>,
    pub buttons: Vec<Button>,
}

/// A delivered message that can later be edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
    pub has_photo: bool,
}

/// One incoming event from the bot's update stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    /// An inline button press.
    Callback {
        id: String,
        from: i64,
        /// Chat and id of the message carrying the button, when Telegram still has it.
        chat_id: Option<i64>,
        message_id: Option<i64>,
        data: Option<String>,
    },
    /// A plain text message.
    Text { from: i64, chat_id: i64, text: String },
    Other,
}

#[async_trait]
pub trait ChatBot: Send + Sync {
    async fn send(&self, chat_id: i64, message: &OutgoingMessage) -> Result<MessageHandle>;

    /// Replace the text (or caption) of a delivered message and drop its buttons.
    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str) -> Result<()>;

    /// Long-poll for updates with id `>= offset`.
    async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>>;
}

pub struct TelegramClient {
    client: Client,
    token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    from: Option<TgUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    message: Option<TgMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
}

impl From<TgUpdate> for Update {
    fn from(update: TgUpdate) -> Self {
        let kind = if let Some(query) = update.callback_query {
            UpdateKind::Callback {
                id: query.id,
                from: query.from.id,
                chat_id: query.message.as_ref().map(|m| m.chat.id),
                message_id: query.message.map(|m| m.message_id),
                data: query.data,
            }
        } else if let Some(TgMessage {
            chat,
            from: Some(from),
            text: Some(text),
            ..
        }) = update.message
        {
            UpdateKind::Text {
                from: from.id,
                chat_id: chat.id,
                text,
            }
        } else {
            UpdateKind::Other
        };

        Self {
            update_id: update.update_id,
            kind,
        }
    }
}

impl TelegramClient {
    /// Create a Bot API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        Self::new(&config.bot_token, &config.api_base_url)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Telegram {method} request failed"))?;
        Self::parse(method, response).await
    }

    async fn parse<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram {method} response ({status})"))?;

        if !parsed.ok {
            bail!(
                "Telegram {method} failed: {}",
                parsed.description.unwrap_or_else(|| status.to_string())
            );
        }
        parsed
            .result
            .ok_or_else(|| anyhow!("Telegram {method} returned no result"))
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &std::path::Path,
        caption: &str,
        markup: Option<&Value>,
    ) -> Result<TgMessage> {
        let bytes = tokio::fs::read(photo)
            .await
            .with_context(|| format!("Failed to read photo {}", photo.display()))?;
        let file_name = photo
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.png")
            .to_string();
        let mime = mime_guess::from_path(photo).first_or_octet_stream();
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.as_ref())
            .context("Invalid photo MIME type")?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", truncate_caption(caption))
            .part("photo", part);
        if let Some(markup) = markup {
            form = form.text("reply_markup", markup.to_string());
        }

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .context("Telegram sendPhoto request failed")?;
        Self::parse("sendPhoto", response).await
    }
}

#[async_trait]
impl ChatBot for TelegramClient {
    async fn send(&self, chat_id: i64, message: &OutgoingMessage) -> Result<MessageHandle> {
        let markup = inline_keyboard(&message.buttons);

        let sent: TgMessage = match &message.photo {
            Some(photo) => {
                self.send_photo(chat_id, photo, &message.text, markup.as_ref())
                    .await?
            }
            None => {
                let mut body = json!({ "chat_id": chat_id, "text": message.text });
                if let Some(markup) = markup {
                    body["reply_markup"] = markup;
                }
                self.call("sendMessage", &body).await?
            }
        };

        debug!(chat_id, message_id = sent.message_id, "Telegram message sent");
        Ok(MessageHandle {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
            has_photo: message.photo.is_some(),
        })
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<()> {
        let (method, body) = if handle.has_photo {
            (
                "editMessageCaption",
                json!({
                    "chat_id": handle.chat_id,
                    "message_id": handle.message_id,
                    "caption": truncate_caption(text),
                }),
            )
        } else {
            (
                "editMessageText",
                json!({
                    "chat_id": handle.chat_id,
                    "message_id": handle.message_id,
                    "text": text,
                }),
            )
        };
        // Both methods return the edited message (or `true` for inline messages).
        let _: Value = self.call(method, &body).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let _: Value = self
            .call(
                "answerCallbackQuery",
                &json!({ "callback_query_id": callback_id }),
            )
            .await?;
        Ok(())
    }

    async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>> {
        let mut body = json!({
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = offset.into();
        }
        let updates: Vec<TgUpdate> = self.call("getUpdates", &body).await?;
        Ok(updates.into_iter().map(Update::from).collect())
    }
}

fn inline_keyboard(buttons: &[Button]) -> Option<Value> {
    if buttons.is_empty() {
        return None;
    }
    let row: Vec<Value> = buttons
        .iter()
        .map(|b| json!({ "text": b.label, "callback_data": b.data }))
        .collect();
    Some(json!({ "inline_keyboard": [row] }))
}

fn truncate_caption(text: &str) -> String {
    if text.chars().count() <= TELEGRAM_CAPTION_LIMIT {
        return text.to_string();
    }
    let mut caption: String = text.chars().take(TELEGRAM_CAPTION_LIMIT - 3).collect();
    caption.push_str("...");
    caption
}
