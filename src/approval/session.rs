//! State machine for one approval request.
//!
//! The session never talks to the chat bot itself: `handle` consumes an
//! update and returns the effects the gate should apply.

use serde::Serialize;

use crate::chat::{Update, UpdateKind};

pub const APPROVE_DATA: &str = "approve";
pub const REJECT_DATA: &str = "reject";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected { reason: Option<String> },
}

/// Terminal result of an approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Decided(Decision),
    /// Nobody answered in time; callers treat this as a rejection without reason.
    TimedOut,
}

impl GateOutcome {
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Decided(Decision::Approved))
    }

    #[must_use]
    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Self::Decided(Decision::Rejected { reason }) => reason.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    AwaitingDecision,
    /// Rejected; waiting for the reviewer to type a reason.
    AwaitingFeedback { reviewer: i64 },
    Decided(Decision),
    TimedOut,
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AnswerCallback(String),
    EditMessage(String),
}

#[derive(Debug, Clone)]
pub struct Session {
    chat_id: i64,
    message_id: i64,
    collect_feedback: bool,
    state: GateState,
}

impl Session {
    /// Session for the request delivered as `message_id` in `chat_id`.
    #[must_use]
    pub fn new(chat_id: i64, message_id: i64, collect_feedback: bool) -> Self {
        Self {
            chat_id,
            message_id,
            collect_feedback,
            state: GateState::AwaitingDecision,
        }
    }

    #[must_use]
    pub fn state(&self) -> &GateState {
        &self.state
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, GateState::Decided(_) | GateState::TimedOut)
    }

    /// The terminal outcome, once finished.
    #[must_use]
    pub fn outcome(&self) -> Option<GateOutcome> {
        match &self.state {
            GateState::Decided(decision) => Some(GateOutcome::Decided(decision.clone())),
            GateState::TimedOut => Some(GateOutcome::TimedOut),
            _ => None,
        }
    }

    pub fn handle(&mut self, update: &Update) -> Vec<Effect> {
        match &update.kind {
            UpdateKind::Callback {
                id,
                from,
                chat_id,
                message_id,
                data,
            } => self.handle_press(id, *from, *chat_id, *message_id, data.as_deref()),
            UpdateKind::Text {
                from,
                chat_id,
                text,
            } => self.handle_text(*from, *chat_id, text),
            UpdateKind::Other => Vec::new(),
        }
    }

    /// Deadline passed. No-op once finished.
    pub fn time_out(&mut self) -> Vec<Effect> {
        if self.is_finished() {
            return Vec::new();
        }
        self.state = GateState::TimedOut;
        vec![Effect::EditMessage(
            "⏱️ TIMED OUT\n\nNo response received; treated as rejected.".to_string(),
        )]
    }

    fn handle_press(
        &mut self,
        callback_id: &str,
        from: i64,
        chat_id: Option<i64>,
        message_id: Option<i64>,
        data: Option<&str>,
    ) -> Vec<Effect> {
        let answer = Effect::AnswerCallback(callback_id.to_string());

        // Message ids are per chat. Buttons on other requests are acknowledged and otherwise ignored.
        let ours = chat_id == Some(self.chat_id) && message_id == Some(self.message_id);
        if !ours || self.state != GateState::AwaitingDecision {
            return vec![answer];
        }

        match data {
            Some(APPROVE_DATA) => {
                self.state = GateState::Decided(Decision::Approved);
                vec![
                    answer,
                    Effect::EditMessage("✅ APPROVED\n\nPublishing...".to_string()),
                ]
            }
            Some(REJECT_DATA) if self.collect_feedback => {
                self.state = GateState::AwaitingFeedback { reviewer: from };
                vec![
                    answer,
                    Effect::EditMessage(
                        "❌ REJECTED\n\nReply with a short reason so future content can improve."
                            .to_string(),
                    ),
                ]
            }
            Some(REJECT_DATA) => {
                self.state = GateState::Decided(Decision::Rejected { reason: None });
                vec![
                    answer,
                    Effect::EditMessage("❌ REJECTED\n\nCancelled.".to_string()),
                ]
            }
            _ => vec![answer],
        }
    }

    fn handle_text(&mut self, from: i64, chat_id: i64, text: &str) -> Vec<Effect> {
        let GateState::AwaitingFeedback { reviewer } = self.state else {
            return Vec::new();
        };
        if from != reviewer || chat_id != self.chat_id || text.trim().is_empty() {
            return Vec::new();
        }

        self.state = GateState::Decided(Decision::Rejected {
            reason: Some(text.to_string()),
        });
        vec![Effect::EditMessage(format!(
            "❌ REJECTED\n\nFeedback recorded: {text}"
        ))]
    }
}
