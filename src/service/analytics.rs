use serde::Serialize;
use tracing::warn;

use super::{ContentService, ServiceResult};
use crate::db::{self, ApprovalRecord, ApprovalFilter, ContentType, EndpointUsage, RejectionFeedback};

/// Status counts for posts or replies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentAnalytics {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub published: i64,
    /// Share of content that has been reviewed to a terminal state, in percent.
    pub approval_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalSummary {
    pub total_approvals: i64,
    pub approved: i64,
    pub rejected: i64,
    pub approval_rate: f64,
}

/// Interaction totals across published posts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementSummary {
    pub published_posts: i64,
    /// Published posts whose statuses could be fetched.
    pub measured_posts: i64,
    pub total_engagements: u64,
    pub total_replies: u64,
    pub total_likes: u64,
    pub total_shares: u64,
    pub avg_engagement_per_post: f64,
    pub top_post_id: Option<i64>,
    pub top_post_engagement: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub total_requests: i64,
    pub endpoints: Vec<EndpointUsage>,
}

/// `part / total` as a percentage rounded to two decimals; 0 for an empty total.
fn percentage(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

impl ContentService {
    /// Status counts for one content type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn content_analytics(&self, content_type: ContentType) -> ServiceResult<ContentAnalytics> {
        let counts = db::count_by_status(self.db.pool(), content_type).await?;
        let total = counts.total();
        Ok(ContentAnalytics {
            total,
            pending: counts.pending,
            approved: counts.approved,
            rejected: counts.rejected,
            published: counts.published,
            approval_rate: percentage(counts.published + counts.rejected, total),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_approvals(
        &self,
        filter: &ApprovalFilter,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<Vec<ApprovalRecord>> {
        Ok(db::list_approvals(self.db.pool(), filter, limit, offset).await?)
    }

    /// Totals over every approval record.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn approval_summary(&self) -> ServiceResult<ApprovalSummary> {
        let (approved, rejected) = db::count_approvals(self.db.pool()).await?;
        let total = approved + rejected;
        Ok(ApprovalSummary {
            total_approvals: total,
            approved,
            rejected,
            approval_rate: percentage(approved, total),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn rejection_feedback(&self, limit: i64) -> ServiceResult<Vec<RejectionFeedback>> {
        Ok(db::recent_rejection_feedback(self.db.pool(), limit).await?)
    }

    /// Sum favourites, boosts and replies over published posts.
    ///
    /// Statuses that cannot be fetched are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the published posts cannot be read.
    pub async fn engagement(&self) -> ServiceResult<EngagementSummary> {
        let posts = db::get_published_posts(self.db.pool()).await?;

        let mut summary = EngagementSummary {
            published_posts: posts.len() as i64,
            measured_posts: 0,
            total_engagements: 0,
            total_replies: 0,
            total_likes: 0,
            total_shares: 0,
            avg_engagement_per_post: 0.0,
            top_post_id: None,
            top_post_engagement: 0,
        };

        for post in &posts {
            let Some(external_id) = post.external_id.as_deref() else {
                continue;
            };
            let status = match self.social.get_status(external_id).await {
                Ok(Some(status)) => status,
                Ok(None) => {
                    warn!(post_id = post.id, external_id, "Published status no longer exists");
                    continue;
                }
                Err(e) => {
                    warn!(post_id = post.id, external_id, error = %e, "Failed to fetch status engagement");
                    continue;
                }
            };

            let engagement = status.favourites_count + status.reblogs_count + status.replies_count;
            summary.measured_posts += 1;
            summary.total_likes += status.favourites_count;
            summary.total_shares += status.reblogs_count;
            summary.total_replies += status.replies_count;
            summary.total_engagements += engagement;
            if summary.top_post_id.is_none() || engagement > summary.top_post_engagement {
                summary.top_post_id = Some(post.id);
                summary.top_post_engagement = engagement;
            }
        }

        if summary.measured_posts > 0 {
            summary.avg_engagement_per_post =
                summary.total_engagements as f64 / summary.measured_posts as f64;
        }
        Ok(summary)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn api_usage(&self) -> ServiceResult<UsageReport> {
        let endpoints = db::api_usage_stats(self.db.pool()).await?;
        Ok(UsageReport {
            total_requests: endpoints.iter().map(|e| e.requests).sum(),
            endpoints,
        })
    }
}
