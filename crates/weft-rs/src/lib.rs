//! Lazy prompt composition and streaming execution for LLM templates.
//!
//! `weft-rs` turns a tree of templates into one ordered, pull-driven stream
//! of typed text fragments ([`PromptElement`](element::PromptElement)s).
//! Templates mix literal text with slots holding numbers, strings, functions
//! of the current context, deferred values, nested actions and lists. Each
//! element carries its provenance (`constant`, `parameter`, `prompt`, `llm`)
//! and the role speaking it, so a consumer can render a chat transcript or a
//! completion prompt from the same stream.
//!
//! The engine performs no network I/O. Model calls go through the
//! [`CompletionFn`](completion::CompletionFn) trait; the `weft-openrouter`
//! crate provides an OpenRouter connector and the `weft` CLI.
//!
//! # Getting started
//!
//! ```
//! use futures::StreamExt;
//! use weft_rs::prelude::*;
//!
//! # futures::executor::block_on(async {
//! let name = ActionInput::func(|props| {
//!     ActionInput::from(props.param_str("name").unwrap_or("World").to_string())
//! });
//! let greeting = user().template(["Hello ", "!"], [name]);
//!
//! let llm = Llm::new(ScriptedCompletion::new(), true);
//! let elements: Vec<_> = llm
//!     .run(greeting, serde_json::json!({"name": "Ada"}))
//!     .map(|el| el.unwrap().content)
//!     .collect()
//!     .await;
//! assert_eq!(elements, ["Hello ", "Ada", "!"]);
//! # });
//! ```
//!
//! # Where to find things
//!
//! - **Compose templates:** [`create_new_context`](combinator::create_new_context)
//!   builds context-scoped [`TemplateFactory`](combinator::TemplateFactory)s;
//!   [`actions`] has the ready-made role scopes, [`generate`](actions::generate),
//!   loops and queue waits.
//! - **Write a custom action:** wrap a resolver with
//!   [`create_action`](action::create_action) and re-enter the engine through
//!   [`run_actions`](resolver::run_actions) or
//!   [`run_template_actions`](template::run_template_actions).
//! - **Run a prompt:** [`Llm::run`](runner::Llm::run) returns an
//!   [`Execution`](runner::Execution) stream with access to outputs, prompt
//!   storage and run state.
//! - **Observe a run:** implement [`EventHandler`](events::EventHandler) or use
//!   [`LoggingHandler`](events::LoggingHandler).
//! - **Print a run:** [`render`] colors elements by source and groups them by
//!   role.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`element`] | [`PromptElement`](element::PromptElement), [`Role`](element::Role), [`Source`](element::Source) |
//! | [`context`] | Immutable per-branch [`Context`](context::Context) and [`ContextPatch`](context::ContextPatch) merging |
//! | [`state`] | Run-wide loop counters and queues |
//! | [`outputs`] | Named outputs keyed by output address |
//! | [`action`] | [`Action`](action::Action), [`ActionProps`](action::ActionProps), [`ActionInput`](action::ActionInput) |
//! | [`resolver`] | [`run_actions`](resolver::run_actions): one input to one element stream |
//! | [`template`] | [`run_template_actions`](template::run_template_actions): literals zipped with slots |
//! | [`combinator`] | [`create_new_context`](combinator::create_new_context) template factories |
//! | [`actions`] | Role scopes, blocks, generation, loops, queue waits |
//! | [`completion`] | Connector seam and the in-memory [`ScriptedCompletion`](completion::ScriptedCompletion) |
//! | [`storage`] | Prompt storage and role-grouped snapshots |
//! | [`runner`] | [`Llm`](runner::Llm) and [`Execution`](runner::Execution) |
//! | [`events`] | Event handlers |
//! | [`render`] | Console rendering |
//!
//! # Guarantees
//!
//! 1. **Pull-driven.** Nothing is evaluated before the consumer asks for the
//!    next element. Functions run when their slot is reached, generations
//!    start when their first element is requested.
//!
//! 2. **Ordered.** Emission order is the depth-first order of the template
//!    tree, whatever mix of synchronous and deferred inputs it contains.
//!
//! 3. **Branch-local context.** Forks never leak into siblings or parents.
//!
//! 4. **Fail fast.** A rejected deferred value or failed nested stream is the
//!    last item of the stream.

pub mod action;
pub mod actions;
pub mod combinator;
pub mod completion;
pub mod context;
pub mod element;
pub mod error;
pub mod events;
pub mod outputs;
pub mod prelude;
pub mod render;
pub mod resolver;
pub mod runner;
pub mod state;
pub mod storage;
pub mod template;

pub use action::{Action, ActionInput, ActionProps, create_action};
pub use combinator::create_new_context;
pub use error::{Result, WeftError};
pub use resolver::run_actions;
pub use template::run_template_actions;
