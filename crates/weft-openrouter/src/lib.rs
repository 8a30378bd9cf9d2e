//! OpenRouter connector for `weft-rs`.
//!
//! [`OpenRouterCompletion`] implements [`CompletionFn`](weft_rs::completion::CompletionFn)
//! over the OpenRouter HTTP API. Chat requests send the prompt as role-grouped
//! messages; completion requests send it as a single string. With streaming
//! enabled, deltas are read from the SSE body as they arrive and yielded per
//! choice.
//!
//! ```ignore
//! use weft_openrouter::{OpenRouterCompletion, OpenRouterConfig};
//! use weft_rs::prelude::*;
//!
//! let config = OpenRouterConfig::new("openai/gpt-4o-mini").with_max_tokens(256);
//! let completion = OpenRouterCompletion::from_env(config)?;
//! let llm = Llm::new(completion, true).with_streaming(true);
//! ```
//!
//! The crate also ships the `weft` binary (see `src/main.rs`).

pub mod client;
pub mod completion;
pub mod config;
pub mod streaming;

pub use client::OpenRouterClient;
pub use completion::{OpenRouterCompletion, RequestBody};
pub use config::OpenRouterConfig;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub const OPENROUTER_COMPLETIONS_URL: &str = "https://openrouter.ai/api/v1/completions";

/// Model used when neither the config nor the request names one.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENROUTER_KEY";
