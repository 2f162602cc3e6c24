use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini endpoint, key and models
    pub gemini: GeminiConfig,
    /// Conversation database
    pub database: DatabaseConfig,
    /// Log level and format
    pub logging: LoggingConfig,
    /// Timeouts and retry policy
    pub request: RequestConfig,
}

/// Gemini API configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`
    pub api_key: String,
    /// API root, without a trailing slash
    pub base_url: String,
    /// Model used for multi-turn chat calls.
    pub chat_model: String,
    /// Model used for single-shot deep-dive analysis.
    pub deep_dive_model: String,
    /// Thinking token budget for deep-dive calls
    pub thinking_budget: u32,
    /// Attach the Google Search grounding tool to chat calls.
    pub search_grounding: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite file; parent directories are created on open
    pub path: PathBuf,
    /// Pool size
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// One JSON object per line
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Longest silence allowed between reads, headers and stream body alike.
    /// Not a total deadline: a reply may stream for as long as it keeps moving.
    pub timeout_ms: u64,
    /// Deadline for establishing the connection
    pub connect_timeout_ms: u64,
    /// Retries when opening a stream fails
    pub max_retries: u32,
    /// Base backoff delay, doubled per retry
    pub retry_delay_ms: u64,
}

/// Public Gemini API root
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Fast model for multi-turn chat
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
/// Reasoning model for deep-dive analysis
pub const DEFAULT_DEEP_DIVE_MODEL: &str = "gemini-2.5-pro";
/// Thinking budget for deep-dive analysis
pub const DEFAULT_THINKING_BUDGET: u32 = 32768;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let gemini = GeminiConfig {
            api_key: env::var("GEMINI_API_KEY")
                .or_else(|_| env::var("API_KEY"))
                .map_err(|_| AppError::Config {
                    message: "GEMINI_API_KEY is required".to_string(),
                })?,
            base_url: env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            chat_model: env::var("GEMINI_CHAT_MODEL")
                .unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string()),
            deep_dive_model: env::var("GEMINI_DEEP_DIVE_MODEL")
                .unwrap_or_else(|_| DEFAULT_DEEP_DIVE_MODEL.to_string()),
            thinking_budget: env::var("GEMINI_THINKING_BUDGET")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_THINKING_BUDGET),
            search_grounding: env::var("GEMINI_SEARCH_GROUNDING")
                .map(|s| !matches!(s.to_lowercase().as_str(), "false" | "0" | "no" | "off"))
                .unwrap_or(true),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH")
                    .unwrap_or_else(|_| "./data/inclusion-coach.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_ms),
            connect_timeout_ms: env::var("REQUEST_CONNECT_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.connect_timeout_ms),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_delay_ms),
        };

        Ok(Config {
            gemini,
            database,
            logging,
            request,
        })
    }
}

impl GeminiConfig {
    /// Configuration with default endpoint and models for the given key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            deep_dive_model: DEFAULT_DEEP_DIVE_MODEL.to_string(),
            thinking_budget: DEFAULT_THINKING_BUDGET,
            search_grounding: true,
        }
    }

    /// Point the client at a different endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            connect_timeout_ms: 10_000,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_config_default() {
        let config = RequestConfig::default();
        assert_eq!(config.timeout_ms, 120_000);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay_ms, 1000);
    }

    #[test]
    fn test_gemini_config_new_uses_defaults() {
        let config = GeminiConfig::new("key").with_base_url("http://localhost:9999");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.base_url, "http://localhost:9999");
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.deep_dive_model, DEFAULT_DEEP_DIVE_MODEL);
        assert!(config.search_grounding);
    }
}
