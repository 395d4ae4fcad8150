use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::session::{Effect, GateOutcome, Session, APPROVE_DATA, REJECT_DATA};
use crate::chat::{Button, ChatBot, MessageHandle, OutgoingMessage};
use crate::db::ContentType;

/// Content to put in front of the reviewer.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub content_type: ContentType,
    pub content: String,
    pub image: Option<PathBuf>,
    /// Character limit of the target platform, shown next to the count.
    pub char_limit: usize,
}

impl ApprovalRequest {
    fn message_text(&self) -> String {
        let icon = match self.content_type {
            ContentType::Post => "📝",
            ContentType::Reply => "💬",
        };
        format!(
            "{icon} Approval Request: {kind}\n\nContent:\n{content}\n\n\
             Character count: {count}/{limit}\n\nApprove this {lower}?",
            kind = self.content_type.as_str().to_uppercase(),
            content = self.content,
            count = self.content.chars().count(),
            limit = self.char_limit,
            lower = self.content_type,
        )
    }
}

#[derive(Debug, Clone)]
pub struct GateSettings {
    pub chat_id: i64,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub collect_feedback: bool,
}

/// Position in the bot's update stream, shared by all sessions.
#[derive(Debug, Default)]
struct UpdateCursor {
    offset: Option<i64>,
}

/// Human approval through a chat bot.
///
/// One request is live at a time; concurrent callers queue on the cursor lock.
pub struct ApprovalGate {
    bot: Arc<dyn ChatBot>,
    settings: GateSettings,
    cursor: Mutex<UpdateCursor>,
}

impl ApprovalGate {
    #[must_use]
    pub fn new(bot: Arc<dyn ChatBot>, settings: GateSettings) -> Self {
        Self {
            bot,
            settings,
            cursor: Mutex::new(UpdateCursor::default()),
        }
    }

    /// Present `request` to the reviewer and wait for a decision or the timeout.
    ///
    /// # Errors
    ///
    /// Returns an error only if the request cannot be delivered. Failures
    /// after delivery are logged and the wait continues.
    pub async fn request(&self, request: &ApprovalRequest) -> Result<GateOutcome> {
        let mut cursor = self.cursor.lock().await;

        let message = OutgoingMessage {
            text: request.message_text(),
            photo: request.image.clone(),
            buttons: vec![
                Button::new("✅ Approve", APPROVE_DATA),
                Button::new("❌ Reject", REJECT_DATA),
            ],
        };
        let handle = self
            .bot
            .send(self.settings.chat_id, &message)
            .await
            .context("Failed to deliver approval request")?;
        info!(
            content_type = %request.content_type,
            message_id = handle.message_id,
            timeout_secs = self.settings.timeout.as_secs(),
            "Approval request sent, waiting for reviewer"
        );

        let mut session = Session::new(
            handle.chat_id,
            handle.message_id,
            self.settings.collect_feedback,
        );
        let deadline = Instant::now() + self.settings.timeout;

        while !session.is_finished() {
            if Instant::now() >= deadline {
                let effects = session.time_out();
                self.apply(&handle, effects).await;
                break;
            }

            match self.bot.get_updates(cursor.offset, Duration::ZERO).await {
                Ok(updates) => {
                    for update in updates {
                        cursor.offset = Some(update.update_id + 1);
                        let effects = session.handle(&update);
                        self.apply(&handle, effects).await;
                        if session.is_finished() {
                            break;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Failed to poll chat updates"),
            }

            if !session.is_finished() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                tokio::time::sleep(self.settings.poll_interval.min(remaining)).await;
            }
        }

        let outcome = session.outcome().unwrap_or(GateOutcome::TimedOut);
        match &outcome {
            GateOutcome::Decided(decision) => {
                info!(content_type = %request.content_type, decision = ?decision, "Reviewer decided");
            }
            GateOutcome::TimedOut => {
                warn!(content_type = %request.content_type, "Approval request timed out");
            }
        }
        Ok(outcome)
    }

    /// Send a plain status message to the reviewer chat.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be delivered.
    pub async fn notify(&self, text: &str) -> Result<()> {
        let message = OutgoingMessage {
            text: text.to_string(),
            ..OutgoingMessage::default()
        };
        self.bot
            .send(self.settings.chat_id, &message)
            .await
            .context("Failed to send notification")?;
        Ok(())
    }

    async fn apply(&self, handle: &MessageHandle, effects: Vec<Effect>) {
        for effect in effects {
            let result = match &effect {
                Effect::AnswerCallback(id) => self.bot.answer_callback(id).await,
                Effect::EditMessage(text) => self.bot.edit(handle, text).await,
            };
            match result {
                Ok(()) => debug!(effect = ?effect, "Applied gate effect"),
                Err(e) => warn!(effect = ?effect, error = %e, "Chat bot call failed"),
            }
        }
    }
}
