//! Connector configuration.
//!
//! Every field has a default, so a JSON config file only needs the keys it
//! changes:
//!
//! ```json
//! { "model": "anthropic/claude-sonnet-4", "max_tokens": 512 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use weft_rs::WeftError;

use crate::{API_KEY_ENV, DEFAULT_MODEL};

/// Settings for [`OpenRouterCompletion`](crate::OpenRouterCompletion).
///
/// Request-level options (`max_tokens`, `top_p`, `model`) set on a
/// generation take precedence over these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Use the chat endpoint (`true`) or the plain completions endpoint.
    pub chat: bool,
    /// `HTTP-Referer` header sent with every request.
    pub referer: String,
    /// `X-Title` header sent with every request.
    pub title: String,
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: Some(1024),
            temperature: None,
            top_p: None,
            chat: true,
            referer: "https://github.com/weft-rs/weft".to_string(),
            title: "weft".to_string(),
            timeout_secs: 120,
        }
    }
}

impl OpenRouterConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_chat(mut self, chat: bool) -> Self {
        self.chat = chat;
        self
    }

    pub fn with_headers(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self
    }

    /// Load a config from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, WeftError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WeftError::Config(format!("failed to read config file '{}': {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            WeftError::Config(format!("failed to parse config file '{}': {e}", path.display()))
        })
    }
}

/// Read the API key from `OPENROUTER_KEY`.
pub fn api_key_from_env() -> Result<String, WeftError> {
    std::env::var(API_KEY_ENV)
        .map_err(|_| WeftError::Config(format!("{API_KEY_ENV} environment variable is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"model": "m/x", "top_p": 0.9}}"#).unwrap();

        let config = OpenRouterConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.model, "m/x");
        assert_eq!(config.top_p, Some(0.9));
        assert_eq!(config.max_tokens, Some(1024));
        assert!(config.chat);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = OpenRouterConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, WeftError::Config(ref msg) if msg.contains("failed to parse")));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = OpenRouterConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, WeftError::Config(ref msg) if msg.contains("failed to read")));
    }

    #[test]
    fn builders_override_fields() {
        let config = OpenRouterConfig::new("a/b")
            .with_max_tokens(10)
            .with_temperature(0.2)
            .with_chat(false)
            .with_headers("https://example.com", "demo");
        assert_eq!(config.model, "a/b");
        assert_eq!(config.max_tokens, Some(10));
        assert_eq!(config.temperature, Some(0.2));
        assert!(!config.chat);
        assert_eq!(config.title, "demo");
    }
}
