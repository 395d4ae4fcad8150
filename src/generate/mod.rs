//! Content generation: original posts, replies and images.

pub mod image;
pub mod post;
pub mod reply;

pub use image::{
    image_prompt_for, is_supported_aspect_ratio, GeneratedImage, ImageGenerator, ReplicateClient,
    SUPPORTED_ASPECT_RATIOS,
};
pub use post::{format_for_platform, generate_post, GeneratedPost, Platform, PostRequest, PostType};
pub use reply::{filter_by_relevance, generate_replies, ReplyCandidate};

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use crate::approval::FeedbackEntry;

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static PARAGRAPH_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</p\s*>").expect("valid regex"));
static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));

/// Plain text of a status body: paragraphs and line breaks become newlines,
/// tags are dropped and entities decoded.
#[must_use]
pub fn clean_html(html: &str) -> String {
    let with_breaks = LINE_BREAK.replace_all(html, "\n");
    let with_paragraphs = PARAGRAPH_END.replace_all(&with_breaks, "\n\n");
    let fragment = Html::parse_fragment(&with_paragraphs);
    let text: String = fragment.root_element().text().collect();
    BLANK_RUNS.replace_all(&text, "\n\n").trim().to_string()
}

/// First `max` characters of `text`.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Prompt section listing previously rejected content, empty when there is none.
#[must_use]
pub fn feedback_section(entries: &[FeedbackEntry]) -> String {
    let lines: Vec<String> = entries
        .iter()
        .filter_map(|entry| {
            let reason = entry.rejection_reason.as_deref()?;
            Some(format!(
                "- \"{}\" was rejected because: {reason}",
                entry.content_preview
            ))
        })
        .collect();

    if lines.is_empty() {
        return String::new();
    }

    format!(
        "\n\nAvoid these previously rejected patterns:\n{}",
        lines.join("\n")
    )
}
