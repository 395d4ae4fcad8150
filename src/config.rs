use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Which chat-completions provider the language model client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    OpenRouter,
}

impl LlmProvider {
    #[must_use]
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    #[must_use]
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::OpenRouter => "openai/gpt-4o-mini",
        }
    }
}

/// Telegram credentials for the approval gate.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
    pub api_base_url: String,
}

/// Replicate credentials for image generation.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: String,
    pub model: String,
    pub trigger_word: Option<String>,
    pub api_base_url: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // HTTP API
    pub api_key: String,
    pub web_host: String,
    pub web_port: u16,

    // Database
    pub database_path: PathBuf,

    // Language model
    pub llm_provider: LlmProvider,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_base_url: String,

    // Mastodon
    pub mastodon_access_token: String,
    pub mastodon_api_base_url: String,

    // Optional collaborators
    pub telegram: Option<TelegramConfig>,
    pub replicate: Option<ReplicateConfig>,

    // Company documents
    pub notion_token: Option<String>,
    pub notion_api_base_url: String,
    pub company_docs_dir: PathBuf,
    pub company_name: String,

    // Generation
    pub image_output_dir: PathBuf,
    pub feedback_log_path: PathBuf,
    pub feedback_context_entries: usize,
    pub min_relevance: u8,

    // Approval gate
    pub approval_timeout: Duration,
    pub approval_poll_interval: Duration,
    pub approval_collect_feedback: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm_provider = if parse_env_bool("USE_OPENROUTER", false)? {
            LlmProvider::OpenRouter
        } else {
            LlmProvider::OpenAi
        };
        let llm_api_key = match llm_provider {
            LlmProvider::OpenAi => required_env("OPENAI_API_KEY")?,
            LlmProvider::OpenRouter => required_env("OPENROUTER_API_KEY")?,
        };

        Ok(Self {
            // HTTP API
            api_key: required_env("API_KEY")?,
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8000)?,

            // Database
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/sundai.sqlite")),

            // Language model
            llm_provider,
            llm_api_key,
            llm_model: env_or_default("LLM_MODEL", llm_provider.default_model()),
            llm_base_url: env_or_default("LLM_BASE_URL", llm_provider.default_base_url()),

            // Mastodon
            mastodon_access_token: required_env("MASTODON_ACCESS_TOKEN")?,
            mastodon_api_base_url: env_or_default(
                "MASTODON_API_BASE_URL",
                "https://mastodon.social",
            ),

            // Optional collaborators
            telegram: telegram_from_env()?,
            replicate: replicate_from_env()?,

            // Company documents
            notion_token: optional_env("NOTION_INTEGRATION"),
            notion_api_base_url: env_or_default("NOTION_API_BASE_URL", "https://api.notion.com"),
            company_docs_dir: PathBuf::from(env_or_default("COMPANY_DOCS_DIR", "./company_docs")),
            company_name: env_or_default("COMPANY_NAME", "our company"),

            // Generation
            image_output_dir: PathBuf::from(env_or_default(
                "IMAGE_OUTPUT_DIR",
                "./generated_images",
            )),
            feedback_log_path: PathBuf::from(env_or_default(
                "FEEDBACK_LOG_PATH",
                "./data/rejection_feedback.json",
            )),
            feedback_context_entries: parse_env_usize("FEEDBACK_CONTEXT_ENTRIES", 5)?,
            min_relevance: parse_env_u8("MIN_RELEVANCE", 5)?,

            // Approval gate
            approval_timeout: Duration::from_secs(parse_env_u64("APPROVAL_TIMEOUT_SECS", 300)?),
            approval_poll_interval: Duration::from_secs(parse_env_u64(
                "APPROVAL_POLL_INTERVAL_SECS",
                1,
            )?),
            approval_collect_feedback: parse_env_bool("APPROVAL_COLLECT_FEEDBACK", true)?,
        })
    }

    /// Defaults suitable for tests: no optional collaborators, local paths.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            api_key: "test-key".to_string(),
            web_host: "127.0.0.1".to_string(),
            web_port: 0,
            database_path: PathBuf::from("./data/test.sqlite"),
            llm_provider: LlmProvider::OpenAi,
            llm_api_key: "test-llm-key".to_string(),
            llm_model: LlmProvider::OpenAi.default_model().to_string(),
            llm_base_url: LlmProvider::OpenAi.default_base_url().to_string(),
            mastodon_access_token: "test-mastodon-token".to_string(),
            mastodon_api_base_url: "https://mastodon.example".to_string(),
            telegram: None,
            replicate: None,
            notion_token: None,
            notion_api_base_url: "https://api.notion.com".to_string(),
            company_docs_dir: PathBuf::from("./company_docs"),
            company_name: "InventoryVision AI".to_string(),
            image_output_dir: PathBuf::from("./generated_images"),
            feedback_log_path: PathBuf::from("./data/rejection_feedback.json"),
            feedback_context_entries: 5,
            min_relevance: 5,
            approval_timeout: Duration::from_secs(300),
            approval_poll_interval: Duration::from_secs(1),
            approval_collect_feedback: true,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "API_KEY".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if !(1..=10).contains(&self.min_relevance) {
            return Err(ConfigError::InvalidValue {
                name: "MIN_RELEVANCE".to_string(),
                message: format!("must be between 1 and 10, got {}", self.min_relevance),
            });
        }
        if self.approval_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "APPROVAL_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.approval_poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "APPROVAL_POLL_INTERVAL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.approval_poll_interval > self.approval_timeout {
            return Err(ConfigError::InvalidValue {
                name: "APPROVAL_POLL_INTERVAL_SECS".to_string(),
                message: "must not exceed APPROVAL_TIMEOUT_SECS".to_string(),
            });
        }
        for (name, value) in [
            ("LLM_BASE_URL", &self.llm_base_url),
            ("MASTODON_API_BASE_URL", &self.mastodon_api_base_url),
            ("NOTION_API_BASE_URL", &self.notion_api_base_url),
        ] {
            validate_url(name, value)?;
        }
        if let Some(telegram) = &self.telegram {
            validate_url("TELEGRAM_API_BASE_URL", &telegram.api_base_url)?;
        }
        if let Some(replicate) = &self.replicate {
            validate_url("REPLICATE_API_BASE_URL", &replicate.api_base_url)?;
        }
        Ok(())
    }
}

fn telegram_from_env() -> Result<Option<TelegramConfig>, ConfigError> {
    let token = optional_env("TELEGRAM_BOT_TOKEN");
    let chat_id = optional_env("TELEGRAM_CHAT_ID");
    match (token, chat_id) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::MissingEnvVar("TELEGRAM_CHAT_ID".to_string())),
        (None, Some(_)) => Err(ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".to_string())),
        (Some(bot_token), Some(chat_id)) => {
            let chat_id = chat_id.parse().map_err(|e| ConfigError::ParseInt {
                name: "TELEGRAM_CHAT_ID".to_string(),
                source: e,
            })?;
            Ok(Some(TelegramConfig {
                bot_token,
                chat_id,
                api_base_url: env_or_default("TELEGRAM_API_BASE_URL", "https://api.telegram.org"),
            }))
        }
    }
}

fn replicate_from_env() -> Result<Option<ReplicateConfig>, ConfigError> {
    let token = optional_env("REPLICATE_API_TOKEN");
    let model = optional_env("REPLICATE_MODEL");
    match (token, model) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::MissingEnvVar("REPLICATE_MODEL".to_string())),
        (None, Some(_)) => Err(ConfigError::MissingEnvVar("REPLICATE_API_TOKEN".to_string())),
        (Some(api_token), Some(model)) => Ok(Some(ReplicateConfig {
            api_token,
            model,
            trigger_word: optional_env("REPLICATE_TRIGGER_WORD"),
            api_base_url: env_or_default("REPLICATE_API_BASE_URL", "https://api.replicate.com"),
        })),
    }
}

fn validate_url(name: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("not a valid URL ({e}): {value}"),
        })
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    optional_env(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u8(name: &str, default: u8) -> Result<u8, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_defaults() {
        assert!(parse_env_bool("SUNDAI_NONEXISTENT_VAR", true).unwrap());
        assert!(!parse_env_bool("SUNDAI_NONEXISTENT_VAR", false).unwrap());
    }

    #[test]
    fn test_testing_config_is_valid() {
        Config::for_testing().validate().unwrap();
    }

    #[test]
    fn test_relevance_out_of_range_rejected() {
        let config = Config {
            min_relevance: 11,
            ..Config::for_testing()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { name, .. }) if name == "MIN_RELEVANCE"
        ));

        let config = Config {
            min_relevance: 0,
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let config = Config {
            mastodon_api_base_url: "not a url".to_string(),
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_interval_must_fit_timeout() {
        let config = Config {
            approval_timeout: Duration::from_secs(1),
            approval_poll_interval: Duration::from_secs(5),
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = Config {
            approval_poll_interval: Duration::ZERO,
            ..Config::for_testing()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { name, .. }) if name == "APPROVAL_POLL_INTERVAL_SECS"
        ));
    }
}
