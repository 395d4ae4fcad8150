//! Company documents that ground generated content.
//!
//! Documents come from a Notion workspace when an integration token is
//! configured, otherwise (or when Notion fails) from `*.md` files in a local
//! directory.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::USER_AGENT;

const NOTION_VERSION: &str = "2022-06-28";

/// Named company documents, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Documents(BTreeMap<String, String>);

impl Documents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.0.insert(name.into(), content.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All documents as one prompt context, cut at `max_chars`.
    #[must_use]
    pub fn combined_context(&self, max_chars: usize) -> String {
        let context = self
            .iter()
            .map(|(name, content)| format!("# Document: {name}\n{content}"))
            .collect::<Vec<_>>()
            .join("\n\n");

        if context.chars().count() > max_chars {
            let truncated: String = context.chars().take(max_chars).collect();
            format!("{truncated}\n\n[... additional context truncated ...]")
        } else {
            context
        }
    }

    /// The company overview document: the first whose name mentions
    /// "overview", else the first document.
    #[must_use]
    pub fn overview(&self) -> Option<&str> {
        self.iter()
            .find(|(name, _)| name.contains("overview"))
            .or_else(|| self.iter().next())
            .map(|(_, content)| content)
    }
}

impl FromIterator<(String, String)> for Documents {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Somewhere company documents can be loaded from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Load every available document.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is unreachable or holds no documents.
    async fn load_documents(&self) -> Result<Documents>;
}

/// Markdown files in a local directory, keyed by file stem.
pub struct LocalDocuments {
    dir: PathBuf,
}

impl LocalDocuments {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DocumentSource for LocalDocuments {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn load_documents(&self) -> Result<Documents> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.with_context(|| {
            format!(
                "Company docs directory not found: {}",
                self.dir.display()
            )
        })?;

        let mut docs = Documents::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("Failed to read company docs directory")?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            docs.insert(stem, content);
        }

        if docs.is_empty() {
            bail!("No markdown files found in {}", self.dir.display());
        }

        info!(count = docs.len(), dir = %self.dir.display(), "Loaded company documents from local files");
        Ok(docs)
    }
}

/// Pages shared with a Notion integration.
pub struct NotionDocuments {
    client: Client,
    token: String,
    base_url: String,
}

impl NotionDocuments {
    /// Create a Notion loader.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn search_pages(&self) -> Result<Vec<Value>> {
        let url = format!("{}/v1/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&json!({ "filter": { "property": "object", "value": "page" } }))
            .send()
            .await
            .context("Failed to search Notion pages")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Notion search failed with status {status}: {body}");
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse Notion search response")?;

        Ok(body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn page_text(&self, page_id: &str) -> Result<String> {
        let url = format!("{}/v1/blocks/{page_id}/children", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .with_context(|| format!("Failed to fetch Notion blocks for {page_id}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Notion blocks request for {page_id} failed with status {status}");
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse Notion blocks response")?;

        Ok(blocks_text(&body))
    }
}

#[async_trait]
impl DocumentSource for NotionDocuments {
    fn name(&self) -> &'static str {
        "notion"
    }

    async fn load_documents(&self) -> Result<Documents> {
        let pages = self.search_pages().await?;
        debug!(count = pages.len(), "Found accessible Notion pages");

        let mut docs = Documents::new();
        for page in &pages {
            let Some(page_id) = page.get("id").and_then(Value::as_str) else {
                continue;
            };
            let title = page_title(page);
            let content = self.page_text(page_id).await?;
            if content.is_empty() {
                continue;
            }
            debug!(title = %title, "Loaded Notion page");
            docs.insert(document_key(&title), content);
        }

        if docs.is_empty() {
            bail!("No documents found in Notion; share the company pages with the integration");
        }

        info!(count = docs.len(), "Loaded company documents from Notion");
        Ok(docs)
    }
}

/// Tries `primary`, falling back to `fallback` on any error.
pub struct FallbackDocuments {
    primary: Box<dyn DocumentSource>,
    fallback: Box<dyn DocumentSource>,
}

impl FallbackDocuments {
    #[must_use]
    pub fn new(primary: Box<dyn DocumentSource>, fallback: Box<dyn DocumentSource>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl DocumentSource for FallbackDocuments {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn load_documents(&self) -> Result<Documents> {
        match self.primary.load_documents().await {
            Ok(docs) => Ok(docs),
            Err(e) => {
                warn!(
                    source = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "Could not load company documents, falling back"
                );
                self.fallback.load_documents().await
            }
        }
    }
}

/// Build the document source described by the configuration.
///
/// # Errors
///
/// Returns an error if the Notion client cannot be built.
pub fn source_from_config(config: &Config) -> Result<Box<dyn DocumentSource>> {
    let local = Box::new(LocalDocuments::new(&config.company_docs_dir));
    match &config.notion_token {
        Some(token) => {
            let notion = NotionDocuments::new(token, &config.notion_api_base_url)?;
            Ok(Box::new(FallbackDocuments::new(Box::new(notion), local)))
        }
        None => Ok(local),
    }
}

/// Document key for a page title: lowercase, spaces to underscores, colons removed.
fn document_key(title: &str) -> String {
    title.to_lowercase().replace(' ', "_").replace(':', "")
}

fn page_title(page: &Value) -> String {
    page.get("properties")
        .and_then(Value::as_object)
        .and_then(|props| {
            props
                .values()
                .find(|p| p.get("type").and_then(Value::as_str) == Some("title"))
        })
        .and_then(|p| p.get("title"))
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(|part| part.get("plain_text"))
        .and_then(Value::as_str)
        .unwrap_or("Untitled")
        .to_string()
}

/// Join the `rich_text` of every block, one text run per line.
fn blocks_text(body: &Value) -> String {
    let mut parts = Vec::new();
    for block in body
        .get("results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(kind) = block.get("type").and_then(Value::as_str) else {
            continue;
        };
        let runs = block
            .get(kind)
            .and_then(|b| b.get("rich_text"))
            .and_then(Value::as_array);
        for run in runs.into_iter().flatten() {
            if let Some(text) = run.get("plain_text").and_then(Value::as_str) {
                parts.push(text);
            }
        }
    }
    parts.join("\n").trim().to_string()
}
