//! Chat-completions client with JSON-schema structured output.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use crate::config::Config;
use crate::constants::USER_AGENT;

/// JSON schema the model's answer must conform to.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub schema: Value,
}

/// A model that answers a system + user prompt with a JSON value.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Identifier of the underlying model, for logs and stored rows.
    fn model_name(&self) -> &str;

    /// Run one completion constrained to `schema`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the model refuses, or the
    /// answer is not valid JSON.
    async fn complete(&self, system: &str, user: &str, schema: &ResponseSchema) -> Result<Value>;
}

/// Run a completion and deserialize the answer into `T`.
///
/// # Errors
///
/// Returns an error if the completion fails or the answer does not match `T`.
pub async fn complete_as<T: DeserializeOwned>(
    llm: &dyn LanguageModel,
    system: &str,
    user: &str,
    schema: &ResponseSchema,
) -> Result<T> {
    let value = llm.complete(system, user, schema).await?;
    serde_json::from_value(value)
        .with_context(|| format!("Model answer does not match the {} schema", schema.name))
}

/// OpenAI-compatible chat completions endpoint (OpenAI or OpenRouter).
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    refusal: Option<String>,
}

impl OpenAiClient {
    /// Create a client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from application configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.llm_api_key, &config.llm_model, &config.llm_base_url)
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, system, user, schema), fields(model = %self.model, schema = schema.name))]
    async fn complete(&self, system: &str, user: &str, schema: &ResponseSchema) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                },
            },
        });

        debug!("Sending chat completion request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Chat completion returned error");
            bail!("Chat completion failed with status {status}: {text}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow!("Chat completion returned no choices"))?;

        if let Some(refusal) = message.refusal {
            bail!("Model refused the request: {refusal}");
        }

        let content = message
            .content
            .ok_or_else(|| anyhow!("Chat completion returned empty content"))?;

        serde_json::from_str(&content).context("Model answer is not valid JSON")
    }
}
