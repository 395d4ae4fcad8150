use serde::{Deserialize, Serialize};

/// Kind of content that goes through approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Reply,
}

impl ContentType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Reply => "reply",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Self::Post),
            "reply" => Some(Self::Reply),
            _ => None,
        }
    }

    /// Table holding rows of this content type.
    #[must_use]
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Self::Post => "posts",
            Self::Reply => "replies",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status shared by posts and replies.
///
/// `pending -> approved -> published`, or `pending -> rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Pending,
    Approved,
    Rejected,
    Published,
}

impl ContentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Published => "published",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "published" => Some(Self::Published),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Published)
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated original post.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub content: String,
    pub image_prompt: Option<String>,
    pub image_path: Option<String>,
    pub post_type: String,
    pub platform: String,
    pub status: String,
    pub character_count: i64,
    pub created_at: String,
    pub approved_at: Option<String>,
    pub published_at: Option<String>,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub rejection_reason: Option<String>,
}

impl Post {
    #[must_use]
    pub fn status_enum(&self) -> Option<ContentStatus> {
        ContentStatus::from_str(&self.status)
    }
}

/// A generated reply to someone else's status.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reply {
    pub id: i64,
    pub target_post_id: String,
    pub content: String,
    pub should_reply: bool,
    pub reasoning: Option<String>,
    pub relevance_score: i64,
    pub status: String,
    pub created_at: String,
    pub approved_at: Option<String>,
    pub published_at: Option<String>,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub rejection_reason: Option<String>,
}

impl Reply {
    #[must_use]
    pub fn status_enum(&self) -> Option<ContentStatus> {
        ContentStatus::from_str(&self.status)
    }
}

/// A generated image on local disk.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub id: i64,
    pub prompt: String,
    pub file_path: String,
    pub model: Option<String>,
    pub aspect_ratio: Option<String>,
    pub created_at: String,
    pub post_id: Option<i64>,
}

/// One approve/reject decision. Rows are never updated.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApprovalRecord {
    pub id: i64,
    pub content_type: String,
    pub content_id: i64,
    pub approved: bool,
    pub rejection_reason: Option<String>,
    pub created_at: String,
}

/// Preview of rejected content kept to steer later generation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RejectionFeedback {
    pub id: i64,
    pub content_type: String,
    pub content_preview: String,
    pub rejection_reason: Option<String>,
    pub created_at: String,
}

/// Data for inserting a new post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub content: String,
    pub image_prompt: Option<String>,
    pub image_path: Option<String>,
    pub post_type: String,
    pub platform: String,
}

/// Data for inserting a new reply.
#[derive(Debug, Clone)]
pub struct NewReply {
    pub target_post_id: String,
    pub content: String,
    pub should_reply: bool,
    pub reasoning: Option<String>,
    pub relevance_score: i64,
}

/// Data for inserting a new image.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub prompt: String,
    pub file_path: String,
    pub model: Option<String>,
    pub aspect_ratio: Option<String>,
    pub post_id: Option<i64>,
}

/// An approve/reject decision to persist.
#[derive(Debug, Clone)]
pub struct NewDecision {
    pub content_type: ContentType,
    pub content_id: i64,
    pub approved: bool,
    pub rejection_reason: Option<String>,
}

/// Result of a conditional status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    NotFound,
    /// The row exists but was not in the required status; nothing changed.
    WrongStatus(String),
}

/// Filters for listing approval records.
#[derive(Debug, Clone, Default)]
pub struct ApprovalFilter {
    pub content_type: Option<ContentType>,
    pub approved: Option<bool>,
}

/// Row counts per lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub published: i64,
}

impl StatusCounts {
    #[must_use]
    pub fn total(&self) -> i64 {
        self.pending + self.approved + self.rejected + self.published
    }
}

/// Aggregate request statistics for one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EndpointUsage {
    pub endpoint: String,
    pub method: String,
    pub requests: i64,
    pub avg_response_time: f64,
    pub max_response_time: i64,
}
