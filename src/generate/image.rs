use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::ReplicateConfig;
use crate::constants::USER_AGENT;

/// Aspect ratios accepted by the image model.
pub const SUPPORTED_ASPECT_RATIOS: [&str; 11] = [
    "1:1", "16:9", "21:9", "3:2", "2:3", "4:5", "5:4", "3:4", "4:3", "9:16", "9:21",
];

const MAX_FILENAME_CHARS: usize = 50;
const MAX_POLLS: u32 = 120;

/// An image written to local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub path: PathBuf,
    pub model: String,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image for `prompt` and store it locally.
    async fn generate(&self, prompt: &str, aspect_ratio: &str) -> Result<GeneratedImage>;
}

#[must_use]
pub fn is_supported_aspect_ratio(ratio: &str) -> bool {
    SUPPORTED_ASPECT_RATIOS.contains(&ratio)
}

/// Replicate predictions API client.
pub struct ReplicateClient {
    client: Client,
    api_token: String,
    model: String,
    trigger_word: Option<String>,
    base_url: String,
    output_dir: PathBuf,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    output: Option<Value>,
    error: Option<Value>,
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    fn first_output_url(&self) -> Option<&str> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url),
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }
}

impl ReplicateClient {
    /// Create a client writing images into `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ReplicateConfig, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_token: config.api_token.clone(),
            model: config.model.clone(),
            trigger_word: config.trigger_word.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            output_dir: output_dir.into(),
            poll_interval: Duration::from_secs(1),
        })
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn full_prompt(&self, prompt: &str) -> String {
        match &self.trigger_word {
            Some(word) => format!("{word} {prompt}"),
            None => prompt.to_string(),
        }
    }

    async fn create_prediction(&self, prompt: &str, aspect_ratio: &str) -> Result<Prediction> {
        let input = json!({
            "prompt": prompt,
            "aspect_ratio": aspect_ratio,
            "num_inference_steps": 28,
            "guidance_scale": 3.0,
            "output_format": "png",
            "output_quality": 90,
        });

        // "owner/name:version" pins a version; "owner/name" runs the latest.
        let (url, body) = match self.model.split_once(':') {
            Some((_, version)) => (
                format!("{}/v1/predictions", self.base_url),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/v1/models/{}/predictions", self.base_url, self.model),
                json!({ "input": input }),
            ),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .context("Failed to create Replicate prediction")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Replicate prediction failed with status {status}: {text}");
        }

        response
            .json()
            .await
            .context("Failed to parse Replicate prediction")
    }

    async fn wait_for(&self, mut prediction: Prediction) -> Result<Prediction> {
        let mut polls = 0;
        while !prediction.is_terminal() {
            if polls >= MAX_POLLS {
                bail!("Replicate prediction {} did not finish in time", prediction.id);
            }
            let get_url = prediction
                .urls
                .as_ref()
                .map(|u| u.get.clone())
                .ok_or_else(|| anyhow!("Replicate prediction {} has no poll URL", prediction.id))?;

            tokio::time::sleep(self.poll_interval).await;
            polls += 1;

            debug!(id = %prediction.id, status = %prediction.status, "Polling Replicate prediction");
            prediction = self
                .client
                .get(&get_url)
                .bearer_auth(&self.api_token)
                .send()
                .await
                .context("Failed to poll Replicate prediction")?
                .error_for_status()
                .context("Replicate poll returned error status")?
                .json()
                .await
                .context("Failed to parse Replicate prediction")?;
        }

        if prediction.status != "succeeded" {
            bail!(
                "Replicate prediction {} {}: {}",
                prediction.id,
                prediction.status,
                prediction.error.as_ref().map_or_else(String::new, Value::to_string)
            );
        }
        Ok(prediction)
    }

    async fn download(&self, url: &str, path: &Path) -> Result<()> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to download generated image")?
            .error_for_status()
            .context("Image download returned error status")?
            .bytes()
            .await
            .context("Failed to read generated image")?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[async_trait]
impl ImageGenerator for ReplicateClient {
    async fn generate(&self, prompt: &str, aspect_ratio: &str) -> Result<GeneratedImage> {
        if !is_supported_aspect_ratio(aspect_ratio) {
            bail!("Unsupported aspect ratio {aspect_ratio}");
        }

        let full_prompt = self.full_prompt(prompt);
        info!(model = %self.model, prompt = %full_prompt, aspect_ratio, "Generating image");

        let prediction = self.create_prediction(&full_prompt, aspect_ratio).await?;
        let prediction = self.wait_for(prediction).await?;
        let url = prediction
            .first_output_url()
            .ok_or_else(|| anyhow!("Replicate prediction {} returned no image", prediction.id))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let path = self
            .output_dir
            .join(format!("{}_{timestamp}.png", image_file_stem(prompt)));
        self.download(url, &path).await?;

        info!(path = %path.display(), "Saved generated image");
        Ok(GeneratedImage {
            path,
            model: self.model.clone(),
        })
    }
}

/// File-name-safe stem derived from a prompt.
fn image_file_stem(prompt: &str) -> String {
    let stem: String = prompt
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect();
    if stem.is_empty() {
        "image".to_string()
    } else {
        stem
    }
}

const SCENES: [(&str, &str); 9] = [
    ("retail", "in a modern retail store with shelves"),
    ("inventory", "looking at shelves with products"),
    ("technology", "with futuristic tech elements"),
    ("ai", "with holographic displays"),
    ("automation", "in an automated warehouse"),
    ("camera", "looking at a security camera"),
    ("vision", "analyzing products with glowing eyes"),
    ("efficiency", "organizing products efficiently"),
    ("data", "surrounded by floating data visualizations"),
];

/// Keyword-based image prompt for posts where the model gave none.
#[must_use]
pub fn image_prompt_for(content: &str) -> String {
    let lower = content.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let scene = SCENES
        .iter()
        .find(|(keyword, _)| words.iter().any(|w| w.starts_with(keyword)))
        .map_or("in a modern tech environment", |(_, scene)| *scene);

    format!("character {scene}, professional lighting, detailed, high quality")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_file_stem_sanitizes_and_limits() {
        assert_eq!(image_file_stem("a cat/dog?"), "a_cat_dog_");
        assert_eq!(image_file_stem(&"z".repeat(80)).len(), MAX_FILENAME_CHARS);
        assert_eq!(image_file_stem(""), "image");
    }

    #[test]
    fn test_image_prompt_uses_first_matching_keyword() {
        let prompt = image_prompt_for("Data and AI for every retail store");
        assert_eq!(
            prompt,
            "character in a modern retail store with shelves, professional lighting, detailed, high quality"
        );
    }

    #[test]
    fn test_image_prompt_ignores_keyword_inside_words() {
        // "said" must not count as "ai"
        let prompt = image_prompt_for("She said hello");
        assert!(prompt.contains("in a modern tech environment"));
    }

    #[test]
    fn test_supported_aspect_ratios() {
        assert!(is_supported_aspect_ratio("16:9"));
        assert!(!is_supported_aspect_ratio("7:3"));
    }

    #[test]
    fn test_prediction_output_shapes() {
        let single: Prediction = serde_json::from_value(json!({
            "id": "p1", "status": "succeeded", "output": "https://img/1.png"
        }))
        .unwrap();
        assert_eq!(single.first_output_url(), Some("https://img/1.png"));

        let list: Prediction = serde_json::from_value(json!({
            "id": "p2", "status": "succeeded", "output": ["https://img/2.png", "https://img/3.png"]
        }))
        .unwrap();
        assert_eq!(list.first_output_url(), Some("https://img/2.png"));
    }
}
