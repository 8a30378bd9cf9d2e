//! Convenience re-exports for common `weft-rs` types.
//!
//! ```ignore
//! use weft_rs::prelude::*;
//! ```
//!
//! Covers what most prompt programs need: actions and inputs, the template
//! helpers, the runner and the scripted connector. Lower-level pieces
//! (stream combinators, outputs internals) stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::action::{Action, ActionInput, ActionProps, ElementStream, Slot, create_action, create_action_with};
pub use crate::context::{Context, ContextPatch, LlmContext};
pub use crate::element::{PromptElement, Role, Source};
pub use crate::error::WeftError;
pub use crate::outputs::{OutputValue, Outputs};
pub use crate::state::LoopStatus;

// ── Composition ─────────────────────────────────────────────────────
pub use crate::actions::{
    GenOptions, LoopOptions, ai, assistant, block, generate, loop_until, map, system, user, wait,
};
pub use crate::combinator::{TemplateFactory, create_new_context};
pub use crate::resolver::run_actions;
pub use crate::template::run_template_actions;

// ── Running ─────────────────────────────────────────────────────────
pub use crate::completion::{CompletionFn, CompletionRequest, CompletionStream, ScriptedCompletion};
pub use crate::events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler, PromptEvent,
};
pub use crate::render::{RenderOptions, render_stream};
pub use crate::runner::{Execution, Llm};
pub use crate::storage::{PromptSnapshot, PromptStorage, PromptStore};
