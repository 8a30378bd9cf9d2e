//! [`CompletionFn`] implementation backed by OpenRouter.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use weft_rs::WeftError;
use weft_rs::completion::{CompletionFn, CompletionRequest, CompletionStream};
use weft_rs::storage::ChatMessage;

use crate::client::OpenRouterClient;
use crate::config::{OpenRouterConfig, api_key_from_env};
use crate::{OPENROUTER_CHAT_URL, OPENROUTER_COMPLETIONS_URL};

/// JSON body sent to either endpoint. Exactly one of `messages` and
/// `prompt` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestBody {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

/// Model connector for the OpenRouter API.
///
/// The stop pattern is not forwarded: it is a regex, and the engine already
/// truncates choice 0 at the first match.
#[derive(Debug, Clone)]
pub struct OpenRouterCompletion {
    client: Arc<OpenRouterClient>,
    config: OpenRouterConfig,
}

impl OpenRouterCompletion {
    pub fn new(api_key: impl Into<String>, config: OpenRouterConfig) -> Result<Self, WeftError> {
        let client = OpenRouterClient::new(api_key, &config)?;
        Ok(Self {
            client: Arc::new(client),
            config,
        })
    }

    /// Read the API key from `OPENROUTER_KEY`.
    pub fn from_env(config: OpenRouterConfig) -> Result<Self, WeftError> {
        Self::new(api_key_from_env()?, config)
    }

    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }

    /// Build the request body. Request options win over config defaults.
    pub fn build_body(&self, request: &CompletionRequest) -> RequestBody {
        let (messages, prompt) = if request.is_chat {
            (Some(request.prompt.to_chat_messages()), None)
        } else {
            (None, Some(request.prompt.to_string()))
        };
        RequestBody {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            messages,
            prompt,
            max_tokens: request.max_tokens.or(self.config.max_tokens),
            temperature: self.config.temperature,
            top_p: request.top_p.or(self.config.top_p),
            stream: request.stream,
        }
    }
}

impl CompletionFn for OpenRouterCompletion {
    fn complete(&self, request: CompletionRequest) -> CompletionStream {
        let body = self.build_body(&request);
        let url = if request.is_chat {
            OPENROUTER_CHAT_URL
        } else {
            OPENROUTER_COMPLETIONS_URL
        };
        let client = self.client.clone();

        if body.stream {
            stream::once(async move { client.stream(url, &body).await })
                .try_flatten()
                .boxed()
        } else {
            stream::once(async move { client.complete(url, &body).await })
                .map_ok(|choices| stream::iter(choices.into_iter().map(Ok)))
                .try_flatten()
                .boxed()
        }
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_rs::element::{PromptElement, Role, Source};
    use weft_rs::storage::PromptSnapshot;

    fn connector() -> OpenRouterCompletion {
        let config = OpenRouterConfig::new("base/model")
            .with_max_tokens(100)
            .with_temperature(0.5);
        OpenRouterCompletion::new("test-key", config).unwrap()
    }

    fn prompt() -> PromptSnapshot {
        PromptSnapshot::new(vec![
            PromptElement::new("Be brief.", Source::Prompt, Role::System),
            PromptElement::new("Hello ", Source::Prompt, Role::User),
            PromptElement::new("Ada", Source::Parameter, Role::User),
        ])
    }

    #[test]
    fn chat_body_groups_messages_by_role() {
        let request = CompletionRequest {
            prompt: prompt(),
            is_chat: true,
            ..Default::default()
        };
        let body = connector().build_body(&request);
        assert_eq!(body.prompt, None);
        let messages = body.messages.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "Hello Ada");
    }

    #[test]
    fn completion_body_flattens_prompt() {
        let request = CompletionRequest {
            prompt: prompt(),
            ..Default::default()
        };
        let body = connector().build_body(&request);
        assert_eq!(body.messages, None);
        assert_eq!(body.prompt.as_deref(), Some("Be brief.Hello Ada"));
    }

    #[test]
    fn request_options_override_config() {
        let request = CompletionRequest {
            max_tokens: Some(7),
            top_p: Some(0.1),
            model: Some("other/model".into()),
            stream: true,
            ..Default::default()
        };
        let body = connector().build_body(&request);
        assert_eq!(body.model, "other/model");
        assert_eq!(body.max_tokens, Some(7));
        assert_eq!(body.top_p, Some(0.1));
        assert_eq!(body.temperature, Some(0.5));
        assert!(body.stream);
    }

    #[test]
    fn serialized_body_omits_unset_fields() {
        let request = CompletionRequest {
            prompt: prompt(),
            is_chat: true,
            ..Default::default()
        };
        let json = serde_json::to_value(connector().build_body(&request)).unwrap();
        assert_eq!(json["model"], "base/model");
        assert_eq!(json["max_tokens"], 100);
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json.get("prompt").is_none());
        assert!(json.get("top_p").is_none());
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn name_is_openrouter() {
        assert_eq!(connector().name(), "openrouter");
    }
}
