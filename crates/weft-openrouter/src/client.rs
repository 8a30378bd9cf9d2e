//! HTTP client for the OpenRouter API.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream;
use serde::Deserialize;
use tracing::{debug, trace};
use weft_rs::WeftError;
use weft_rs::completion::CompletionStream;

use crate::completion::RequestBody;
use crate::config::OpenRouterConfig;
use crate::streaming::{SseDecoder, SseEvent};

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
    error: Option<ResponseError>,
}

#[derive(Deserialize)]
struct ResponseChoice {
    index: Option<usize>,
    message: Option<ResponseMessage>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ResponseError {
    message: String,
}

/// Extract `(choice_index, text)` pairs from a non-streamed response body.
/// Chat responses carry `message.content`; completion responses carry `text`.
pub fn parse_completion_response(text: &str) -> Result<Vec<(usize, String)>, WeftError> {
    let response: CompletionResponse = serde_json::from_str(text).map_err(|e| {
        WeftError::Completion(format!("failed to parse response: {e}\nBody: {text}"))
    })?;
    if let Some(err) = response.error {
        return Err(WeftError::Completion(format!("OpenRouter API error: {}", err.message)));
    }
    Ok(response
        .choices
        .into_iter()
        .enumerate()
        .map(|(position, choice)| {
            let content = choice
                .message
                .and_then(|m| m.content)
                .or(choice.text)
                .unwrap_or_default();
            (choice.index.unwrap_or(position), content)
        })
        .collect())
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter completion endpoints.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    referer: String,
    title: String,
}

impl OpenRouterClient {
    /// Create a client with the headers and timeout from `config`.
    pub fn new(api_key: impl Into<String>, config: &OpenRouterConfig) -> Result<Self, WeftError> {
        Self::with_headers(
            api_key,
            &config.referer,
            &config.title,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Create a client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, WeftError> {
        let client = reqwest::Client::builder()
            .user_agent("weft-openrouter/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| WeftError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    async fn post(&self, url: &str, body: &RequestBody) -> Result<reqwest::Response, WeftError> {
        debug!(
            "LLM request: url={}, model={}, messages={}, max_tokens={:?}, stream={}",
            url,
            body.model,
            body.messages.as_ref().map_or(0, |m| m.len()),
            body.max_tokens,
            body.stream,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| WeftError::Completion(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(WeftError::Completion(format!(
                "OpenRouter API HTTP {status}: {text}"
            )));
        }
        Ok(resp)
    }

    /// Send a non-streaming request and return every choice's text.
    pub async fn complete(
        &self,
        url: &str,
        body: &RequestBody,
    ) -> Result<Vec<(usize, String)>, WeftError> {
        let start = Instant::now();
        let resp = self.post(url, body).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| WeftError::Completion(format!("failed to read response: {e}")))?;
        debug!(
            "LLM response: {} bytes in {:.1}s",
            text.len(),
            start.elapsed().as_secs_f64()
        );
        parse_completion_response(&text)
    }

    /// Send a streaming request. Deltas are yielded as the SSE body arrives;
    /// dropping the stream drops the connection.
    pub async fn stream(&self, url: &str, body: &RequestBody) -> Result<CompletionStream, WeftError> {
        let resp = self.post(url, body).await?;
        let reader = SseReader {
            resp,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        };
        Ok(stream::unfold(reader, SseReader::step).boxed())
    }
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("referer", &self.referer)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

// ── SSE reader ─────────────────────────────────────────────────────

struct SseReader {
    resp: reqwest::Response,
    decoder: SseDecoder,
    pending: VecDeque<Result<(usize, String), WeftError>>,
    done: bool,
}

impl SseReader {
    async fn step(mut self) -> Option<(Result<(usize, String), WeftError>, Self)> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some((item, self));
            }
            if self.done {
                return None;
            }
            match self.resp.chunk().await {
                Ok(Some(chunk)) => {
                    let events = self.decoder.feed(&chunk);
                    self.absorb(events);
                }
                Ok(None) => {
                    let events = self.decoder.finish();
                    self.absorb(events);
                    self.done = true;
                }
                Err(e) => {
                    self.done = true;
                    self.pending.push_back(Err(WeftError::Completion(format!(
                        "failed to read streaming chunk: {e}"
                    ))));
                }
            }
        }
    }

    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Delta { index, text } => self.pending.push_back(Ok((index, text))),
                SseEvent::Error(message) => {
                    self.pending.push_back(Err(WeftError::Completion(format!(
                        "OpenRouter API error: {message}"
                    ))));
                    self.done = true;
                    return;
                }
                SseEvent::Done => {
                    self.done = true;
                    return;
                }
            }
        }
    }
}
