//! Human-in-the-loop approval over a chat bot.

mod feedback;
mod gate;
mod session;

pub use feedback::{FeedbackEntry, FeedbackLog};
pub use gate::{ApprovalGate, ApprovalRequest, GateSettings};
pub use session::{Decision, Effect, GateOutcome, GateState, Session, APPROVE_DATA, REJECT_DATA};

use std::sync::Arc;

use anyhow::Result;

use crate::chat::TelegramClient;
use crate::config::Config;

/// Build the Telegram-backed gate, or `None` when Telegram is not configured.
///
/// # Errors
///
/// Returns an error if the Telegram client cannot be built.
pub fn gate_from_config(config: &Config) -> Result<Option<ApprovalGate>> {
    let Some(telegram) = &config.telegram else {
        return Ok(None);
    };
    let bot = TelegramClient::from_config(telegram)?;
    let settings = GateSettings {
        chat_id: telegram.chat_id,
        timeout: config.approval_timeout,
        poll_interval: config.approval_poll_interval,
        collect_feedback: config.approval_collect_feedback,
    };
    Ok(Some(ApprovalGate::new(Arc::new(bot), settings)))
}
