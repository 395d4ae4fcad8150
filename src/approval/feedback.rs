//! Persisted log of rejection reasons, fed back into later prompts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::constants::FEEDBACK_PREVIEW_CHARS;
use crate::db::ContentType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    /// RFC 3339 UTC time the entry was recorded.
    pub timestamp: String,
    pub content_type: ContentType,
    pub content_preview: String,
    pub rejection_reason: Option<String>,
}

impl FeedbackEntry {
    /// Entry for rejected `content`, stamped now.
    #[must_use]
    pub fn new(content_type: ContentType, content: &str, rejection_reason: Option<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            content_type,
            content_preview: preview(content),
            rejection_reason,
        }
    }
}

/// Non-empty preview of at most `FEEDBACK_PREVIEW_CHARS` characters.
fn preview(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return "(no content)".to_string();
    }
    trimmed.chars().take(FEEDBACK_PREVIEW_CHARS).collect()
}

/// JSON array of `FeedbackEntry` on disk.
///
/// Appends replace the file atomically (write a sibling temp file, then
/// rename) and are serialized within the process.
#[derive(Debug)]
pub struct FeedbackLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FeedbackLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry, oldest first. A missing file is an empty log.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn entries(&self) -> Result<Vec<FeedbackEntry>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt feedback log {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read feedback log {}", self.path.display())),
        }
    }

    /// The most recent `n` entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub async fn recent(&self, n: usize) -> Result<Vec<FeedbackEntry>> {
        let mut entries = self.entries().await?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.split_off(skip))
    }

    /// Append one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or rewritten.
    pub async fn append(&self, entry: FeedbackEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.entries().await?;
        entries.push(entry);
        let json = serde_json::to_vec_pretty(&entries).context("Failed to serialize feedback log")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), total = entries.len(), "Appended rejection feedback");
        Ok(())
    }
}
