use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::feedback_section;
use crate::approval::FeedbackEntry;
use crate::constants::MAX_DOCUMENT_CONTEXT_CHARS;
use crate::docs::Documents;
use crate::llm::{complete_as, LanguageModel, ResponseSchema};

/// Kind of original post to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    ThoughtLeadership,
    CompanyUpdate,
    ProductAnnouncement,
    IndustryInsight,
    CustomerStory,
    ProductUpdate,
}

impl PostType {
    pub const ALL: [Self; 6] = [
        Self::ThoughtLeadership,
        Self::CompanyUpdate,
        Self::ProductAnnouncement,
        Self::IndustryInsight,
        Self::CustomerStory,
        Self::ProductUpdate,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThoughtLeadership => "thought_leadership",
            Self::CompanyUpdate => "company_update",
            Self::ProductAnnouncement => "product_announcement",
            Self::IndustryInsight => "industry_insight",
            Self::CustomerStory => "customer_story",
            Self::ProductUpdate => "product_update",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    fn focus(self) -> &'static str {
        match self {
            Self::ThoughtLeadership => "Share insights about technology trends in our industry",
            Self::CompanyUpdate => "Share news about the company, team or milestones",
            Self::ProductAnnouncement => "Announce a new product or capability and why it matters",
            Self::IndustryInsight => "Comment on industry trends or news",
            Self::CustomerStory => "Highlight potential customer benefits (use hypothetical examples)",
            Self::ProductUpdate => "Explain a specific feature or capability",
        }
    }
}

impl std::fmt::Display for PostType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network a post is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Mastodon,
    Linkedin,
    Twitter,
}

impl Platform {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mastodon => "mastodon",
            Self::Linkedin => "linkedin",
            Self::Twitter => "twitter",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mastodon" => Some(Self::Mastodon),
            "linkedin" => Some(Self::Linkedin),
            "twitter" => Some(Self::Twitter),
            _ => None,
        }
    }

    /// Maximum characters of a published status.
    #[must_use]
    pub fn char_limit(&self) -> usize {
        match self {
            Self::Mastodon => 500,
            Self::Linkedin => 3000,
            Self::Twitter => 280,
        }
    }

    fn guidelines(self) -> &'static str {
        match self {
            Self::Linkedin => "Professional tone, 150-250 words, focus on business value and ROI",
            Self::Twitter => "Concise and punchy, under 280 characters, engaging hook",
            Self::Mastodon => {
                "Authentic and community-focused. CRITICAL: Content MAXIMUM 350 characters. \
                 Skip call_to_action field. Use 3-4 SHORT hashtags only."
            }
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PostRequest<'a> {
    pub company_name: &'a str,
    pub post_type: PostType,
    pub platform: Platform,
}

/// Structured post as returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPost {
    pub content: String,
    pub hashtags: Vec<String>,
    pub platform: Platform,
    pub post_type: String,
    pub call_to_action: Option<String>,
    pub image_prompt: Option<String>,
}

fn post_schema() -> ResponseSchema {
    ResponseSchema {
        name: "social_media_post",
        schema: json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The main post content. For Mastodon, at most 350 characters."
                },
                "hashtags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "3-4 relevant hashtags without the # symbol. Keep tags short."
                },
                "platform": { "type": "string", "enum": ["linkedin", "twitter", "mastodon"] },
                "post_type": { "type": "string" },
                "call_to_action": {
                    "type": ["string", "null"],
                    "description": "Optional call-to-action. Null for Mastodon."
                },
                "image_prompt": {
                    "type": ["string", "null"],
                    "description": "Short visual scene that would illustrate the post."
                }
            },
            "required": ["content", "hashtags", "platform", "post_type", "call_to_action", "image_prompt"],
            "additionalProperties": false
        }),
    }
}

fn system_prompt(company: &str) -> String {
    format!(
        "You are a social media expert creating posts for {company}. Your posts should:\n\n\
         - Be engaging and provide genuine value to professionals in our industry\n\
         - Demonstrate expertise without being overly salesy\n\
         - Use a confident but humble tone (technical but accessible)\n\
         - Include concrete examples or data points when possible\n\
         - Be authentic and align with the brand voice\n\
         - End with a subtle call-to-action when appropriate\n\n\
         Focus on educating, inspiring, and building community rather than just promoting."
    )
}

fn user_prompt(context: &str, request: &PostRequest<'_>, feedback: &[FeedbackEntry]) -> String {
    let platform = request.platform;
    let mastodon_limits = if platform == Platform::Mastodon {
        "\n\nCRITICAL MASTODON LIMITS:\n\
         - Content field: MAXIMUM 350 characters\n\
         - Hashtags: Use 3-4 SHORT tags\n\
         - call_to_action: MUST be null\n\
         - Total post with hashtags must be under 500 characters"
    } else {
        ""
    };

    format!(
        "Based on this company documentation:\n\n{context}\n\n\
         Create a {post_type} social media post for {platform} that:\n\
         - Follows the {platform} style: {guidelines}\n\
         - Is engaging and valuable to our audience\n\
         - Includes 3-5 relevant hashtags\n\
         - Follows our brand voice (confident but humble, technical but accessible)\n\
         - Provides actionable insights or thought-provoking ideas\n\n\
         Post type focus: {focus}{mastodon_limits}{feedback}",
        post_type = request.post_type,
        guidelines = platform.guidelines(),
        focus = request.post_type.focus(),
        feedback = feedback_section(feedback),
    )
}

/// Ask the model for one post grounded in the company documents.
///
/// # Errors
///
/// Returns an error if the model call fails or the post has no content.
pub async fn generate_post(
    llm: &dyn LanguageModel,
    docs: &Documents,
    request: &PostRequest<'_>,
    feedback: &[FeedbackEntry],
) -> Result<GeneratedPost> {
    let context = docs.combined_context(MAX_DOCUMENT_CONTEXT_CHARS);
    let system = system_prompt(request.company_name);
    let user = user_prompt(&context, request, feedback);

    let mut post: GeneratedPost = complete_as(llm, &system, &user, &post_schema()).await?;

    post.content = post.content.trim().to_string();
    if post.content.is_empty() {
        bail!("Model returned an empty post");
    }
    post.hashtags = post
        .hashtags
        .iter()
        .map(|t| t.trim().trim_start_matches('#').replace(char::is_whitespace, ""))
        .filter(|t| !t.is_empty())
        .collect();
    post.call_to_action = post.call_to_action.filter(|c| !c.trim().is_empty());
    post.image_prompt = post.image_prompt.filter(|p| !p.trim().is_empty());
    // Requested platform wins over whatever the model echoed back.
    post.platform = request.platform;

    info!(
        post_type = %request.post_type,
        platform = %request.platform,
        chars = post.content.chars().count(),
        model = llm.model_name(),
        "Generated post"
    );
    Ok(post)
}

/// Render a post for publishing, fitted to the platform's character limit.
///
/// Trailing hashtags are dropped first; if the text still does not fit the
/// body is cut and ends with an ellipsis.
#[must_use]
pub fn format_for_platform(post: &GeneratedPost, platform: Platform) -> String {
    let limit = platform.char_limit();
    let body = match &post.call_to_action {
        Some(cta) => format!("{}\n\n{cta}", post.content),
        None => post.content.clone(),
    };

    let mut tags: Vec<String> = post.hashtags.iter().map(|t| format!("#{t}")).collect();
    loop {
        let rendered = if tags.is_empty() {
            body.clone()
        } else {
            format!("{body}\n\n{}", tags.join(" "))
        };
        if rendered.chars().count() <= limit {
            return rendered;
        }
        if tags.pop().is_none() {
            break;
        }
    }

    let mut cut: String = body.chars().take(limit.saturating_sub(1)).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}
