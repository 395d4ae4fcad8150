//! Social network publishing and search (Mastodon REST API).

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::constants::USER_AGENT;

/// A status created on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub id: String,
    pub url: Option<String>,
}

/// The account that owns a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub acct: String,
}

/// A status as returned by the network. `content` is HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub url: Option<String>,
    pub content: String,
    pub created_at: String,
    pub account: Account,
    #[serde(default)]
    pub replies_count: u64,
    #[serde(default)]
    pub reblogs_count: u64,
    #[serde(default)]
    pub favourites_count: u64,
}

#[async_trait]
pub trait SocialClient: Send + Sync {
    /// Post a new public status, optionally with one image attached.
    async fn publish(&self, text: &str, image: Option<&Path>) -> Result<Published>;

    /// Reply to an existing status.
    async fn reply(&self, in_reply_to: &str, text: &str) -> Result<Published>;

    /// Search statuses matching `query`, at most `limit` results.
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<Status>>;

    /// Fetch one status; `None` if it does not exist.
    async fn get_status(&self, id: &str) -> Result<Option<Status>>;

    /// The authenticated account.
    async fn me(&self) -> Result<Account>;
}

pub struct MastodonClient {
    client: Client,
    access_token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MediaAttachment {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    statuses: Vec<Status>,
}

impl MastodonClient {
    /// Create a client for an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(access_token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            access_token: access_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.mastodon_access_token, &config.mastodon_api_base_url)
    }

    async fn upload_media(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read media file {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.png")
            .to_string();
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.as_ref())
            .context("Invalid media MIME type")?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/api/v2/media", self.base_url))
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await
            .context("Failed to upload media to Mastodon")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Mastodon media upload failed");
            bail!("Mastodon media upload failed with status {status}: {body}");
        }

        let media: MediaAttachment = response
            .json()
            .await
            .context("Failed to parse Mastodon media response")?;
        debug!(media_id = %media.id, path = %path.display(), "Uploaded media");
        Ok(media.id)
    }

    async fn post_status(
        &self,
        text: &str,
        in_reply_to: Option<&str>,
        media_ids: &[String],
    ) -> Result<Published> {
        let mut body = serde_json::json!({
            "status": text,
            "visibility": "public",
        });
        if let Some(parent) = in_reply_to {
            body["in_reply_to_id"] = parent.into();
        }
        if !media_ids.is_empty() {
            body["media_ids"] = media_ids.into();
        }

        let response = self
            .client
            .post(format!("{}/api/v1/statuses", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("Failed to post status to Mastodon")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Mastodon rejected status");
            bail!("Mastodon status post failed with status {status}: {text}");
        }

        let created: Status = response
            .json()
            .await
            .context("Failed to parse Mastodon status response")?;

        Ok(Published {
            id: created.id,
            url: created.url,
        })
    }
}

#[async_trait]
impl SocialClient for MastodonClient {
    async fn publish(&self, text: &str, image: Option<&Path>) -> Result<Published> {
        let media_ids = match image {
            Some(path) => vec![self.upload_media(path).await?],
            None => Vec::new(),
        };
        let published = self.post_status(text, None, &media_ids).await?;
        info!(id = %published.id, url = ?published.url, "Posted to Mastodon");
        Ok(published)
    }

    async fn reply(&self, in_reply_to: &str, text: &str) -> Result<Published> {
        let published = self.post_status(text, Some(in_reply_to), &[]).await?;
        info!(parent = %in_reply_to, id = %published.id, "Replied on Mastodon");
        Ok(published)
    }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<Status>> {
        let limit_param = limit.to_string();
        let response = self
            .client
            .get(format!("{}/api/v2/search", self.base_url))
            .bearer_auth(&self.access_token)
            .query(&[
                ("q", query),
                ("type", "statuses"),
                ("resolve", "true"),
                ("limit", limit_param.as_str()),
            ])
            .send()
            .await
            .context("Failed to search Mastodon")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Mastodon search failed with status {status}");
        }

        let results: SearchResults = response
            .json()
            .await
            .context("Failed to parse Mastodon search response")?;

        let mut statuses = results.statuses;
        statuses.truncate(limit as usize);
        debug!(query = %query, count = statuses.len(), "Mastodon search complete");
        Ok(statuses)
    }

    async fn get_status(&self, id: &str) -> Result<Option<Status>> {
        let response = self
            .client
            .get(format!("{}/api/v1/statuses/{id}", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("Failed to fetch Mastodon status {id}"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            bail!("Mastodon status {id} request failed with status {status}");
        }

        response
            .json()
            .await
            .map(Some)
            .context("Failed to parse Mastodon status")
    }

    async fn me(&self) -> Result<Account> {
        let response = self
            .client
            .get(format!("{}/api/v1/accounts/verify_credentials", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Failed to verify Mastodon credentials")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Mastodon credentials rejected with status {status}");
        }

        response
            .json()
            .await
            .context("Failed to parse Mastodon account")
    }
}
