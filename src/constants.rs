//! Shared constants used across the application.

/// User agent sent to every external API.
pub const USER_AGENT: &str = concat!("sundai-bot/", env!("CARGO_PKG_VERSION"));

/// Maximum characters of rejected content kept as a feedback preview.
pub const FEEDBACK_PREVIEW_CHARS: usize = 200;

/// Company documents are truncated to this many characters of prompt context.
pub const MAX_DOCUMENT_CONTEXT_CHARS: usize = 15_000;

/// Characters of the overview document used as company summary for replies.
pub const COMPANY_SUMMARY_CHARS: usize = 800;

/// Characters of each candidate status shown to the reply generator.
pub const STATUS_EXCERPT_CHARS: usize = 500;

/// Telegram limit for photo captions.
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;
