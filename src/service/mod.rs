//! Content lifecycle: generate, decide, publish and review.
//!
//! Both the HTTP API and the command line drive content through this
//! service, so state transitions and feedback recording happen in one place.

mod analytics;

pub use analytics::{ApprovalSummary, ContentAnalytics, EngagementSummary, UsageReport};

use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::approval::{
    gate_from_config, ApprovalGate, ApprovalRequest, FeedbackEntry, FeedbackLog, GateOutcome,
};
use crate::config::Config;
use crate::db::{
    self, ContentStatus, ContentType, Database, Image, NewDecision, NewImage, NewPost, NewReply,
    Post, Reply, TransitionOutcome,
};
use crate::docs::{self, DocumentSource, Documents};
use crate::generate::{
    self, clean_html, format_for_platform, image_prompt_for, is_supported_aspect_ratio,
    truncate_chars, ImageGenerator, Platform, PostRequest, PostType, ReplicateClient,
};
use crate::llm::{LanguageModel, OpenAiClient};
use crate::social::{MastodonClient, SocialClient};

const DEFAULT_IMAGE_ASPECT_RATIO: &str = "1:1";
const OPPORTUNITY_PREVIEW_CHARS: usize = 200;
const MAX_SEARCH_LIMIT: u32 = 40;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Invalid(String),
    #[error("relevance score {score} is below the threshold of {threshold}")]
    BelowThreshold { score: u8, threshold: u8 },
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub company_name: String,
    pub min_relevance: u8,
    pub feedback_context_entries: usize,
}

impl ServiceSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            company_name: config.company_name.clone(),
            min_relevance: config.min_relevance,
            feedback_context_entries: config.feedback_context_entries,
        }
    }
}

/// A status found by search that could be replied to.
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub id: String,
    pub account: String,
    pub content: String,
    pub created_at: String,
    pub url: Option<String>,
}

pub struct ContentService {
    db: Database,
    llm: Arc<dyn LanguageModel>,
    docs: Arc<dyn DocumentSource>,
    social: Arc<dyn SocialClient>,
    images: Option<Arc<dyn ImageGenerator>>,
    gate: Option<Arc<ApprovalGate>>,
    feedback: Arc<FeedbackLog>,
    settings: ServiceSettings,
    /// Held across a whole chat review so each item gets one live session.
    review_lock: Mutex<()>,
}

impl ContentService {
    #[must_use]
    pub fn new(
        db: Database,
        llm: Arc<dyn LanguageModel>,
        docs: Arc<dyn DocumentSource>,
        social: Arc<dyn SocialClient>,
        feedback: Arc<FeedbackLog>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            db,
            llm,
            docs,
            social,
            images: None,
            gate: None,
            feedback,
            settings,
            review_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_images(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    #[must_use]
    pub fn with_gate(mut self, gate: Arc<ApprovalGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Wire up the production collaborators described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if any client cannot be built.
    pub fn from_config(config: &Config, db: Database) -> anyhow::Result<Self> {
        let feedback = Arc::new(FeedbackLog::new(&config.feedback_log_path));
        let llm = Arc::new(OpenAiClient::from_config(config)?);
        let docs: Arc<dyn DocumentSource> = Arc::from(docs::source_from_config(config)?);
        let social = Arc::new(MastodonClient::from_config(config)?);

        let mut service = Self::new(
            db,
            llm,
            docs,
            social,
            feedback,
            ServiceSettings::from_config(config),
        );
        if let Some(replicate) = &config.replicate {
            service = service.with_images(Arc::new(ReplicateClient::new(
                replicate,
                &config.image_output_dir,
            )?));
        }
        if let Some(gate) = gate_from_config(config)? {
            service = service.with_gate(Arc::new(gate));
        }
        Ok(service)
    }

    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    #[must_use]
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    #[must_use]
    pub fn gate(&self) -> Option<&ApprovalGate> {
        self.gate.as_deref()
    }

    #[must_use]
    pub fn feedback_log(&self) -> &FeedbackLog {
        &self.feedback
    }

    /// Load company documents from the configured source.
    ///
    /// # Errors
    ///
    /// Returns an error if no documents can be loaded.
    pub async fn documents(&self) -> ServiceResult<Documents> {
        Ok(self.docs.load_documents().await?)
    }

    /// Recent rejection feedback for prompts. Failures only cost context.
    async fn prompt_feedback(&self) -> Vec<FeedbackEntry> {
        match self
            .feedback
            .recent(self.settings.feedback_context_entries)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not read feedback log, generating without it");
                Vec::new()
            }
        }
    }

    // ========== Posts ==========

    /// Generate a pending post, optionally with an illustration.
    ///
    /// # Errors
    ///
    /// Fails if generation fails, or an image is requested without an image generator.
    pub async fn generate_post(
        &self,
        post_type: PostType,
        platform: Platform,
        with_image: bool,
    ) -> ServiceResult<Post> {
        if with_image && self.images.is_none() {
            return Err(ServiceError::NotConfigured("image generation"));
        }

        let documents = self.documents().await?;
        let feedback = self.prompt_feedback().await;
        let request = PostRequest {
            company_name: &self.settings.company_name,
            post_type,
            platform,
        };
        let generated =
            generate::generate_post(self.llm.as_ref(), &documents, &request, &feedback).await?;
        let content = format_for_platform(&generated, platform);
        let image_prompt = generated
            .image_prompt
            .clone()
            .unwrap_or_else(|| image_prompt_for(&generated.content));

        let image = match (&self.images, with_image) {
            (Some(images), true) => Some(
                images
                    .generate(&image_prompt, DEFAULT_IMAGE_ASPECT_RATIO)
                    .await?,
            ),
            _ => None,
        };

        let pool = self.db.pool();
        let post_id = db::insert_post(
            pool,
            &NewPost {
                content,
                image_prompt: Some(image_prompt.clone()),
                image_path: image.as_ref().map(|i| i.path.display().to_string()),
                post_type: post_type.as_str().to_string(),
                platform: platform.as_str().to_string(),
            },
        )
        .await?;

        if let Some(image) = &image {
            db::insert_image(
                pool,
                &NewImage {
                    prompt: image_prompt,
                    file_path: image.path.display().to_string(),
                    model: Some(image.model.clone()),
                    aspect_ratio: Some(DEFAULT_IMAGE_ASPECT_RATIO.to_string()),
                    post_id: Some(post_id),
                },
            )
            .await?;
        }

        info!(post_id, post_type = %post_type, platform = %platform, "Stored generated post");
        self.get_post(post_id).await
    }

    /// # Errors
    ///
    /// `NotFound` if there is no such post.
    pub async fn get_post(&self, id: i64) -> ServiceResult<Post> {
        db::get_post(self.db.pool(), id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("post {id}")))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_posts(
        &self,
        status: Option<ContentStatus>,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<Vec<Post>> {
        Ok(db::list_posts(self.db.pool(), status, limit, offset).await?)
    }

    /// Approve or reject a pending post.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `InvalidState` unless the post is pending.
    pub async fn decide_post(
        &self,
        id: i64,
        approved: bool,
        rejection_reason: Option<String>,
    ) -> ServiceResult<Post> {
        let post = self.get_post(id).await?;
        self.decide(ContentType::Post, id, &post.content, approved, rejection_reason)
            .await?;
        self.get_post(id).await
    }

    /// Publish an approved post, to the network unless `to_network` is false.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the post is approved; network errors are `Internal`.
    pub async fn publish_post(&self, id: i64, to_network: bool) -> ServiceResult<Post> {
        let post = self.get_post(id).await?;
        require_status(ContentType::Post, id, &post.status, ContentStatus::Approved)?;

        let published = if to_network {
            let image = post.image_path.as_deref().map(Path::new);
            Some(self.social.publish(&post.content, image).await?)
        } else {
            None
        };

        let outcome = db::mark_published(
            self.db.pool(),
            ContentType::Post,
            id,
            published.as_ref().map(|p| p.id.as_str()),
            published.as_ref().and_then(|p| p.url.as_deref()),
        )
        .await?;
        transition_result(ContentType::Post, id, outcome, "approved")?;

        info!(post_id = id, url = ?published.as_ref().and_then(|p| p.url.as_deref()), "Post published");
        self.get_post(id).await
    }

    // ========== Replies ==========

    /// Search the network for statuses worth replying to.
    ///
    /// # Errors
    ///
    /// `Invalid` for an empty query or a limit outside 1..=40.
    pub async fn search_opportunities(
        &self,
        query: &str,
        limit: u32,
    ) -> ServiceResult<Vec<Opportunity>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::Invalid("search query cannot be empty".to_string()));
        }
        if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
            return Err(ServiceError::Invalid(format!(
                "limit must be between 1 and {MAX_SEARCH_LIMIT}"
            )));
        }

        let statuses = self.social.search(query, limit).await?;
        info!(query, found = statuses.len(), "Searched for reply opportunities");
        Ok(statuses
            .into_iter()
            .map(|status| Opportunity {
                content: truncate_chars(&clean_html(&status.content), OPPORTUNITY_PREVIEW_CHARS)
                    .to_string(),
                id: status.id,
                account: status.account.acct,
                created_at: status.created_at,
                url: status.url,
            })
            .collect())
    }

    /// Draft a pending reply to one status.
    ///
    /// # Errors
    ///
    /// `NotFound` if the status does not exist, `BelowThreshold` if the
    /// status scores under the configured relevance threshold.
    pub async fn generate_reply(&self, target_post_id: &str) -> ServiceResult<Reply> {
        let status = self
            .social
            .get_status(target_post_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("status {target_post_id}")))?;

        let documents = self.documents().await?;
        let feedback = self.prompt_feedback().await;
        // Score everything so a low score can be reported back.
        let candidates = generate::generate_replies(
            self.llm.as_ref(),
            &documents,
            &self.settings.company_name,
            std::slice::from_ref(&status),
            1,
            &feedback,
        )
        .await?;

        let candidate = candidates
            .into_iter()
            .find(|c| c.post_id == status.id)
            .ok_or_else(|| anyhow!("Model returned no reply for status {}", status.id))?;

        let threshold = self.settings.min_relevance;
        if candidate.relevance_score < threshold {
            return Err(ServiceError::BelowThreshold {
                score: candidate.relevance_score,
                threshold,
            });
        }

        let reply_id = db::insert_reply(
            self.db.pool(),
            &NewReply {
                target_post_id: candidate.post_id,
                content: candidate.reply_content,
                should_reply: candidate.should_reply,
                reasoning: Some(candidate.reasoning),
                relevance_score: i64::from(candidate.relevance_score),
            },
        )
        .await?;

        info!(reply_id, target = %target_post_id, score = candidate.relevance_score, "Stored generated reply");
        self.get_reply(reply_id).await
    }

    /// Search, score and store pending replies for every status worth answering.
    ///
    /// Our own statuses are skipped; only candidates at or above
    /// `min_relevance` that the model recommends answering are stored.
    ///
    /// # Errors
    ///
    /// `Invalid` for a bad query or limit; client and model errors are `Internal`.
    pub async fn draft_replies(
        &self,
        query: &str,
        limit: u32,
        min_relevance: u8,
    ) -> ServiceResult<Vec<Reply>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::Invalid("search query cannot be empty".to_string()));
        }
        if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
            return Err(ServiceError::Invalid(format!(
                "limit must be between 1 and {MAX_SEARCH_LIMIT}"
            )));
        }

        let me = self.social.me().await?;
        let statuses: Vec<_> = self
            .social
            .search(query, limit)
            .await?
            .into_iter()
            .filter(|s| s.account.id != me.id)
            .collect();
        if statuses.is_empty() {
            info!(query, "No statuses to reply to");
            return Ok(Vec::new());
        }

        let documents = self.documents().await?;
        let feedback = self.prompt_feedback().await;
        let candidates = generate::generate_replies(
            self.llm.as_ref(),
            &documents,
            &self.settings.company_name,
            &statuses,
            min_relevance,
            &feedback,
        )
        .await?;

        let mut drafted = Vec::new();
        for candidate in candidates.into_iter().filter(|c| c.should_reply) {
            let reply_id = db::insert_reply(
                self.db.pool(),
                &NewReply {
                    target_post_id: candidate.post_id,
                    content: candidate.reply_content,
                    should_reply: true,
                    reasoning: Some(candidate.reasoning),
                    relevance_score: i64::from(candidate.relevance_score),
                },
            )
            .await?;
            drafted.push(self.get_reply(reply_id).await?);
        }

        info!(query, searched = statuses.len(), drafted = drafted.len(), "Drafted replies");
        Ok(drafted)
    }

    /// # Errors
    ///
    /// `NotFound` if there is no such reply.
    pub async fn get_reply(&self, id: i64) -> ServiceResult<Reply> {
        db::get_reply(self.db.pool(), id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("reply {id}")))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_replies(
        &self,
        status: Option<ContentStatus>,
        target_post_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<Vec<Reply>> {
        Ok(db::list_replies(self.db.pool(), status, target_post_id, limit, offset).await?)
    }

    /// Approve or reject a pending reply.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `InvalidState` unless the reply is pending.
    pub async fn decide_reply(
        &self,
        id: i64,
        approved: bool,
        rejection_reason: Option<String>,
    ) -> ServiceResult<Reply> {
        let reply = self.get_reply(id).await?;
        self.decide(ContentType::Reply, id, &reply.content, approved, rejection_reason)
            .await?;
        self.get_reply(id).await
    }

    /// Publish an approved reply under its target status.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the reply is approved; network errors are `Internal`.
    pub async fn publish_reply(&self, id: i64, to_network: bool) -> ServiceResult<Reply> {
        let reply = self.get_reply(id).await?;
        require_status(ContentType::Reply, id, &reply.status, ContentStatus::Approved)?;

        let published = if to_network {
            Some(self.social.reply(&reply.target_post_id, &reply.content).await?)
        } else {
            None
        };

        let outcome = db::mark_published(
            self.db.pool(),
            ContentType::Reply,
            id,
            published.as_ref().map(|p| p.id.as_str()),
            published.as_ref().and_then(|p| p.url.as_deref()),
        )
        .await?;
        transition_result(ContentType::Reply, id, outcome, "approved")?;

        info!(reply_id = id, target = %reply.target_post_id, "Reply published");
        self.get_reply(id).await
    }

    // ========== Chat review ==========

    /// Check that `id` can be reviewed, then review it in the background.
    ///
    /// # Errors
    ///
    /// `NotConfigured` without a chat gate; `NotFound`/`InvalidState` if the
    /// content is missing or not pending.
    pub async fn start_review(
        self: Arc<Self>,
        content_type: ContentType,
        id: i64,
    ) -> ServiceResult<()> {
        self.review_request(content_type, id).await?;

        tokio::spawn(async move {
            match self.review(content_type, id).await {
                Ok(_) => {}
                Err(ServiceError::InvalidState(reason)) => {
                    info!(content_type = %content_type, id, %reason, "Chat review skipped");
                }
                Err(e) => {
                    error!(content_type = %content_type, id, error = %e, "Chat review failed");
                }
            }
        });
        Ok(())
    }

    /// Send content to the reviewer, persist the decision and publish on approval.
    ///
    /// A timeout is stored as a rejection without reason. Reviews run one at
    /// a time and the content must still be pending once this one's turn comes.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the content was decided while queued; otherwise an
    /// error if the request cannot be delivered, the decision cannot be
    /// stored, or publishing fails.
    pub async fn review(&self, content_type: ContentType, id: i64) -> ServiceResult<GateOutcome> {
        let gate = self
            .gate
            .as_ref()
            .ok_or(ServiceError::NotConfigured("chat approval"))?;
        let _turn = self.review_lock.lock().await;
        let request = self.review_request(content_type, id).await?;

        let outcome = gate.request(&request).await?;
        let approved = outcome.is_approved();
        let reason = outcome.rejection_reason().map(ToString::to_string);

        self.decide(content_type, id, &request.content, approved, reason)
            .await?;

        if approved {
            let url = match content_type {
                ContentType::Post => self.publish_post(id, true).await?.external_url,
                ContentType::Reply => self.publish_reply(id, true).await?.external_url,
            };
            let note = format!(
                "✅ Published {content_type} {id}: {}",
                url.as_deref().unwrap_or("(no URL)")
            );
            if let Err(e) = gate.notify(&note).await {
                warn!(error = %e, "Failed to send publish notification");
            }
        }
        Ok(outcome)
    }

    async fn review_request(
        &self,
        content_type: ContentType,
        id: i64,
    ) -> ServiceResult<ApprovalRequest> {
        if self.gate.is_none() {
            return Err(ServiceError::NotConfigured("chat approval"));
        }

        let request = match content_type {
            ContentType::Post => {
                let post = self.get_post(id).await?;
                require_status(content_type, id, &post.status, ContentStatus::Pending)?;
                let platform = Platform::from_str(&post.platform).unwrap_or_default();
                ApprovalRequest {
                    content_type,
                    content: post.content,
                    image: post.image_path.map(Into::into),
                    char_limit: platform.char_limit(),
                }
            }
            ContentType::Reply => {
                let reply = self.get_reply(id).await?;
                require_status(content_type, id, &reply.status, ContentStatus::Pending)?;
                if !reply.should_reply {
                    return Err(ServiceError::InvalidState(format!(
                        "reply {id} is not recommended for posting (should_reply is false)"
                    )));
                }
                ApprovalRequest {
                    content_type,
                    content: reply.content,
                    image: None,
                    char_limit: Platform::Mastodon.char_limit(),
                }
            }
        };
        Ok(request)
    }

    async fn decide(
        &self,
        content_type: ContentType,
        id: i64,
        content: &str,
        approved: bool,
        rejection_reason: Option<String>,
    ) -> ServiceResult<()> {
        let rejection_reason = if approved {
            None
        } else {
            rejection_reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
        };

        let outcome = db::record_decision(
            self.db.pool(),
            &NewDecision {
                content_type,
                content_id: id,
                approved,
                rejection_reason: rejection_reason.clone(),
            },
        )
        .await?;
        transition_result(content_type, id, outcome, "pending")?;

        info!(content_type = %content_type, id, approved, reason = ?rejection_reason, "Decision recorded");

        // Only a decision that was actually stored reaches the feedback log.
        if let Some(reason) = rejection_reason {
            let entry = FeedbackEntry::new(content_type, content, Some(reason));
            if let Err(e) = self.feedback.append(entry).await {
                warn!(error = %e, "Failed to record rejection feedback");
            }
        }
        Ok(())
    }

    // ========== Images ==========

    /// Generate and store a standalone image, optionally attached to a post.
    ///
    /// # Errors
    ///
    /// `Invalid` for an empty prompt or unsupported aspect ratio,
    /// `NotConfigured` without an image generator.
    pub async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: &str,
        post_id: Option<i64>,
    ) -> ServiceResult<Image> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ServiceError::Invalid("prompt cannot be empty".to_string()));
        }
        if !is_supported_aspect_ratio(aspect_ratio) {
            return Err(ServiceError::Invalid(format!(
                "unsupported aspect ratio {aspect_ratio}"
            )));
        }
        let images = self
            .images
            .as_ref()
            .ok_or(ServiceError::NotConfigured("image generation"))?;
        if let Some(post_id) = post_id {
            self.get_post(post_id).await?;
        }

        let generated = images.generate(prompt, aspect_ratio).await?;
        let image_id = db::insert_image(
            self.db.pool(),
            &NewImage {
                prompt: prompt.to_string(),
                file_path: generated.path.display().to_string(),
                model: Some(generated.model),
                aspect_ratio: Some(aspect_ratio.to_string()),
                post_id,
            },
        )
        .await?;
        self.get_image(image_id).await
    }

    /// # Errors
    ///
    /// `NotFound` if there is no such image.
    pub async fn get_image(&self, id: i64) -> ServiceResult<Image> {
        db::get_image(self.db.pool(), id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("image {id}")))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_images(
        &self,
        post_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<Vec<Image>> {
        Ok(db::list_images(self.db.pool(), post_id, limit, offset).await?)
    }
}

fn require_status(
    content_type: ContentType,
    id: i64,
    actual: &str,
    required: ContentStatus,
) -> ServiceResult<()> {
    if actual == required.as_str() {
        Ok(())
    } else {
        Err(ServiceError::InvalidState(format!(
            "{content_type} {id} is {actual}, expected {required}"
        )))
    }
}

fn transition_result(
    content_type: ContentType,
    id: i64,
    outcome: TransitionOutcome,
    required: &str,
) -> ServiceResult<()> {
    match outcome {
        TransitionOutcome::Applied => Ok(()),
        TransitionOutcome::NotFound => Err(ServiceError::NotFound(format!("{content_type} {id}"))),
        TransitionOutcome::WrongStatus(actual) => Err(ServiceError::InvalidState(format!(
            "{content_type} {id} is {actual}, expected {required}"
        ))),
    }
}
