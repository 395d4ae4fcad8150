//! One-shot automation cycles run from the command line.
//!
//! With a chat gate configured, each draft is sent for review and published
//! on approval. Without one, drafts stay pending for the HTTP API.

use anyhow::Result;
use tracing::{info, warn};

use crate::approval::GateOutcome;
use crate::db::{ContentType, Post, Reply};
use crate::generate::{Platform, PostType};
use crate::service::ContentService;

/// What happened to one draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleResult {
    /// No gate configured; the draft stays pending.
    Drafted,
    Published,
    Rejected(Option<String>),
    TimedOut,
}

impl From<&GateOutcome> for CycleResult {
    fn from(outcome: &GateOutcome) -> Self {
        match outcome {
            GateOutcome::TimedOut => Self::TimedOut,
            o if o.is_approved() => Self::Published,
            o => Self::Rejected(o.rejection_reason().map(ToString::to_string)),
        }
    }
}

/// Generate one post and route it through review.
///
/// # Errors
///
/// Returns an error if generation, review or publishing fails.
pub async fn run_post_cycle(
    service: &ContentService,
    post_type: PostType,
    platform: Platform,
    with_image: bool,
) -> Result<(Post, CycleResult)> {
    let post = service.generate_post(post_type, platform, with_image).await?;
    info!(post_id = post.id, post_type = %post_type, platform = %platform, "Generated post");

    if service.gate().is_none() {
        return Ok((post, CycleResult::Drafted));
    }

    let outcome = service.review(ContentType::Post, post.id).await?;
    let post = service.get_post(post.id).await?;
    Ok((post, CycleResult::from(&outcome)))
}

/// Search for conversations, draft replies and route each through review.
///
/// A failed review is logged and the cycle moves on to the next reply.
///
/// # Errors
///
/// Returns an error if search or reply generation fails.
pub async fn run_engagement_cycle(
    service: &ContentService,
    query: &str,
    limit: u32,
    min_relevance: u8,
) -> Result<Vec<(Reply, CycleResult)>> {
    let drafts = service.draft_replies(query, limit, min_relevance).await?;
    if service.gate().is_none() {
        return Ok(drafts
            .into_iter()
            .map(|r| (r, CycleResult::Drafted))
            .collect());
    }

    let mut results = Vec::with_capacity(drafts.len());
    for reply in drafts {
        match service.review(ContentType::Reply, reply.id).await {
            Ok(outcome) => {
                let reply = service.get_reply(reply.id).await?;
                results.push((reply, CycleResult::from(&outcome)));
            }
            Err(e) => warn!(reply_id = reply.id, error = %e, "Reply review failed"),
        }
    }
    Ok(results)
}
