//! Running a prompt end to end.
//!
//! [`Llm`] binds a completion function to run-wide defaults. Each
//! [`Llm::run`] creates fresh state, outputs and prompt storage, and returns
//! an [`Execution`]: the element stream plus handles to that run's shared
//! data. Every element is recorded into the prompt storage as the consumer
//! pulls it, so a later generation sees exactly what was consumed before it.
//!
//! ```
//! use weft_rs::prelude::*;
//!
//! # futures::executor::block_on(async {
//! let llm = Llm::new(ScriptedCompletion::new().reply(["Paris"]), true);
//! let prompt = ActionInput::list([
//!     ActionInput::from(user().text("Capital of France?")),
//!     ActionInput::from(ai("city", GenOptions::new())),
//! ]);
//! let outputs = llm.run(prompt, serde_json::Value::Null).drain().await.unwrap();
//! assert_eq!(outputs.text("city"), Some("Paris"));
//! # });
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::action::{ActionInput, ActionProps, ElementStream};
use crate::completion::CompletionFn;
use crate::context::{Context, LlmContext};
use crate::element::{PromptElement, Role};
use crate::error::WeftError;
use crate::events::{EventHandler, NoopHandler};
use crate::outputs::{Outputs, SharedOutputs};
use crate::resolver::run_actions;
use crate::state::SharedState;
use crate::storage::{PromptStorage, PromptStore};

/// A completion function plus run-wide defaults.
#[derive(Clone)]
pub struct Llm {
    completion: Arc<dyn CompletionFn>,
    is_chat: bool,
    stream: Option<bool>,
    role: Role,
    events: Arc<dyn EventHandler>,
}

impl Llm {
    pub fn new(completion: impl CompletionFn + 'static, is_chat: bool) -> Self {
        Self::from_arc(Arc::new(completion), is_chat)
    }

    pub fn from_arc(completion: Arc<dyn CompletionFn>, is_chat: bool) -> Self {
        Self {
            completion,
            is_chat,
            stream: None,
            role: Role::default(),
            events: Arc::new(NoopHandler),
        }
    }

    pub fn with_event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.events = Arc::new(handler);
        self
    }

    /// Default streaming flag for generations that do not set their own.
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Role of elements produced outside any role scope.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// The root context every run starts from.
    pub fn context(&self) -> Context {
        let mut context = Context::new(LlmContext::from_arc(self.completion.clone(), self.is_chat));
        context.role = self.role;
        context.stream = self.stream;
        context
    }

    /// Start resolving `input` with `params`. Nothing runs until the returned
    /// execution is polled.
    pub fn run(&self, input: impl Into<ActionInput>, params: Value) -> Execution {
        let prompt = PromptStorage::new();
        let state = SharedState::new();
        let outputs = SharedOutputs::new();
        let props = ActionProps::new(self.context(), Arc::new(prompt.clone()))
            .with_params(params)
            .with_state(state.clone())
            .with_outputs(outputs.clone())
            .with_events(self.events.clone());

        debug!(
            connector = self.completion.name(),
            chat = self.is_chat,
            "Starting prompt run"
        );

        let recorder = prompt.clone();
        let elements = run_actions(input.into(), props)
            .inspect(move |item| {
                if let Ok(element) = item {
                    recorder.push(element.clone());
                }
            })
            .boxed();

        Execution {
            elements,
            outputs,
            prompt,
            state,
        }
    }
}

impl std::fmt::Debug for Llm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Llm")
            .field("completion", &self.completion.name())
            .field("is_chat", &self.is_chat)
            .field("stream", &self.stream)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// One running prompt. Poll it as a stream of elements.
pub struct Execution {
    elements: ElementStream,
    outputs: SharedOutputs,
    prompt: PromptStorage,
    state: SharedState,
}

impl Execution {
    /// Snapshot of the outputs recorded so far.
    pub fn outputs(&self) -> Outputs {
        self.outputs.snapshot()
    }

    /// Live handle to the outputs, usable after the execution is moved into
    /// another stream adapter.
    pub fn outputs_handle(&self) -> SharedOutputs {
        self.outputs.clone()
    }

    /// Everything consumed so far.
    pub fn prompt(&self) -> &PromptStorage {
        &self.prompt
    }

    /// Run state; push queue items here to feed `wait`.
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Consume the remaining elements and return the final outputs, or the
    /// first error.
    pub async fn drain(mut self) -> Result<Outputs, WeftError> {
        while let Some(item) = self.elements.next().await {
            item?;
        }
        Ok(self.outputs.snapshot())
    }
}

impl Stream for Execution {
    type Item = Result<PromptElement, WeftError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.elements.poll_next_unpin(cx)
    }
}
