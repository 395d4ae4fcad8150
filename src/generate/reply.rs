use std::collections::HashSet;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{clean_html, feedback_section, truncate_chars};
use crate::approval::FeedbackEntry;
use crate::constants::{COMPANY_SUMMARY_CHARS, STATUS_EXCERPT_CHARS};
use crate::docs::Documents;
use crate::llm::{complete_as, LanguageModel, ResponseSchema};
use crate::social::Status;

/// A proposed reply to one status, scored for relevance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyCandidate {
    pub post_id: String,
    pub reply_content: String,
    pub should_reply: bool,
    pub reasoning: String,
    pub relevance_score: u8,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    post_id: String,
    reply_content: String,
    should_reply: bool,
    reasoning: String,
    relevance_score: i64,
}

#[derive(Debug, Deserialize)]
struct BatchReplies {
    replies: Vec<RawReply>,
}

fn reply_schema() -> ResponseSchema {
    ResponseSchema {
        name: "batch_replies",
        schema: json!({
            "type": "object",
            "properties": {
                "replies": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "post_id": { "type": "string", "description": "ID of the post to reply to" },
                            "reply_content": { "type": "string", "description": "Brief reply, 1-3 sentences" },
                            "should_reply": { "type": "boolean" },
                            "reasoning": { "type": "string" },
                            "relevance_score": {
                                "type": "integer",
                                "description": "How relevant this post is to our company (1-10)"
                            }
                        },
                        "required": ["post_id", "reply_content", "should_reply", "reasoning", "relevance_score"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["replies"],
            "additionalProperties": false
        }),
    }
}

fn system_prompt(company: &str) -> String {
    format!(
        "You are a social media engagement specialist for {company}.\n\
         Your job is to identify relevant posts and generate thoughtful, valuable replies.\n\n\
         Guidelines for replies:\n\
         1. ONLY reply if we can add genuine value to the conversation\n\
         2. Don't be salesy or promotional - be helpful and authentic\n\
         3. Share relevant insights or ask thoughtful questions\n\
         4. Keep replies brief (1-3 sentences)\n\
         5. Be professional but friendly\n\
         6. If the post is not relevant or we can't add value, set should_reply=false\n\n\
         Don't reply when the post is off-topic, spam, too casual or personal, \
         or when we would only be promoting ourselves."
    )
}

fn render_statuses(statuses: &[Status]) -> String {
    statuses
        .iter()
        .map(|status| {
            let text = clean_html(&status.content);
            format!(
                "---\nPOST ID: {}\nAuthor: @{}\nCreated: {}\nContent:\n{}\n---",
                status.id,
                status.account.acct,
                status.created_at,
                truncate_chars(&text, STATUS_EXCERPT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn user_prompt(
    company: &str,
    docs: &Documents,
    statuses: &[Status],
    feedback: &[FeedbackEntry],
) -> String {
    let overview = truncate_chars(docs.overview().unwrap_or_default(), COMPANY_SUMMARY_CHARS);
    format!(
        "Company Context:\nCompany: {company}\n\nOverview: {overview}\n\n\
         Brand Voice: Professional but approachable. We are experts in our field, \
         but humble, and focus on providing genuine value. We don't spam or oversell.\n\n\
         Analyze these posts and generate appropriate replies:\n{posts}\n\n\
         For each post:\n\
         1. Assess its relevance to our company and expertise (1-10 score)\n\
         2. Determine if we should reply (only if we can add genuine value)\n\
         3. If yes, write a brief, helpful reply (1-3 sentences)\n\
         4. Explain your reasoning{feedback}",
        posts = render_statuses(statuses),
        feedback = feedback_section(feedback),
    )
}

/// Keep candidates scoring at least `threshold` (inclusive).
#[must_use]
pub fn filter_by_relevance(candidates: Vec<ReplyCandidate>, threshold: u8) -> Vec<ReplyCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.relevance_score >= threshold)
        .collect()
}

/// Score `statuses` for relevance and draft replies for those at or above
/// `min_relevance`.
///
/// # Errors
///
/// Returns an error if the model call fails. Candidates scored outside
/// 1..=10 or naming a post that was not offered are dropped.
pub async fn generate_replies(
    llm: &dyn LanguageModel,
    docs: &Documents,
    company: &str,
    statuses: &[Status],
    min_relevance: u8,
    feedback: &[FeedbackEntry],
) -> Result<Vec<ReplyCandidate>> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    let system = system_prompt(company);
    let user = user_prompt(company, docs, statuses, feedback);
    let batch: BatchReplies = complete_as(llm, &system, &user, &reply_schema()).await?;

    let known: HashSet<&str> = statuses.iter().map(|s| s.id.as_str()).collect();
    let mut candidates = Vec::with_capacity(batch.replies.len());
    for raw in batch.replies {
        let score = match u8::try_from(raw.relevance_score) {
            Ok(score) if (1..=10).contains(&score) => score,
            _ => {
                warn!(
                    post_id = %raw.post_id,
                    score = raw.relevance_score,
                    "Relevance score outside 1..=10, dropping"
                );
                continue;
            }
        };
        if !known.contains(raw.post_id.as_str()) {
            warn!(post_id = %raw.post_id, "Model replied to a post that was not offered, dropping");
            continue;
        }
        candidates.push(ReplyCandidate {
            post_id: raw.post_id,
            reply_content: raw.reply_content.trim().to_string(),
            should_reply: raw.should_reply,
            reasoning: raw.reasoning,
            relevance_score: score,
        });
    }

    let total = candidates.len();
    let relevant = filter_by_relevance(candidates, min_relevance);
    info!(
        analyzed = statuses.len(),
        generated = total,
        relevant = relevant.len(),
        recommended = relevant.iter().filter(|c| c.should_reply).count(),
        min_relevance,
        "Generated reply candidates"
    );
    Ok(relevant)
}
