//! The completion-function seam between the engine and model connectors.
//!
//! A connector implements [`CompletionFn`]: given a [`CompletionRequest`] it
//! returns a lazy stream of `(choice_index, text_delta)` pairs. The engine
//! never performs network I/O itself; see the `weft-openrouter` crate for a
//! real connector. [`ScriptedCompletion`] is an in-memory connector for
//! tests and dry runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use regex::Regex;

use crate::element::Role;
use crate::error::WeftError;
use crate::storage::PromptSnapshot;

/// Stream of `(choice_index, text_delta)` pairs.
pub type CompletionStream = BoxStream<'static, Result<(usize, String), WeftError>>;

/// Everything a connector needs to produce one completion.
#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    /// The prompt as consumed so far.
    pub prompt: PromptSnapshot,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    /// Stop pattern. Applied by the engine to choice 0; connectors may also
    /// use it to end a stream early.
    pub stop: Option<Regex>,
    pub stream: bool,
    /// Whether the prompt should be sent as chat messages.
    pub is_chat: bool,
    /// Model override; `None` uses the connector's configured model.
    pub model: Option<String>,
}

/// A model connector.
pub trait CompletionFn: Send + Sync {
    fn complete(&self, request: CompletionRequest) -> CompletionStream;

    /// Label used in logs.
    fn name(&self) -> &str {
        "completion"
    }
}

impl<F> CompletionFn for F
where
    F: Fn(CompletionRequest) -> CompletionStream + Send + Sync,
{
    fn complete(&self, request: CompletionRequest) -> CompletionStream {
        self(request)
    }
}

enum Script {
    Replies(VecDeque<Vec<(usize, String)>>),
    Echo,
}

/// In-memory connector replaying scripted replies.
///
/// Each call to [`complete`](CompletionFn::complete) consumes the next
/// scripted reply; running out of replies is a completion error. In echo
/// mode every request is answered with the last user message, one word per
/// delta. Every request is recorded for inspection.
///
/// ```
/// use weft_rs::completion::ScriptedCompletion;
///
/// let completion = ScriptedCompletion::new()
///     .reply(["Hel", "lo"])
///     .reply(["second"]);
/// assert_eq!(completion.remaining(), 2);
/// ```
pub struct ScriptedCompletion {
    script: Mutex<Script>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Default for ScriptedCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::Replies(VecDeque::new())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn echo() -> Self {
        Self {
            script: Mutex::new(Script::Echo),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply for choice 0, delivered as the given deltas.
    pub fn reply<I, S>(self, deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reply_choices(deltas.into_iter().map(|d| (0, d.into())))
    }

    /// Queue a reply made of explicit `(choice, delta)` pairs.
    pub fn reply_choices<I>(self, deltas: I) -> Self
    where
        I: IntoIterator<Item = (usize, String)>,
    {
        if let Script::Replies(replies) = &mut *self.script.lock().unwrap_or_else(|e| e.into_inner())
        {
            replies.push_back(deltas.into_iter().collect());
        }
        self
    }

    /// Number of scripted replies not yet consumed (0 in echo mode).
    pub fn remaining(&self) -> usize {
        match &*self.script.lock().unwrap_or_else(|e| e.into_inner()) {
            Script::Replies(replies) => replies.len(),
            Script::Echo => 0,
        }
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CompletionFn for ScriptedCompletion {
    fn complete(&self, request: CompletionRequest) -> CompletionStream {
        let deltas = match &mut *self.script.lock().unwrap_or_else(|e| e.into_inner()) {
            Script::Replies(replies) => replies.pop_front(),
            Script::Echo => Some(echo_deltas(&request.prompt)),
        };
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        match deltas {
            Some(deltas) => stream::iter(deltas.into_iter().map(Ok)).boxed(),
            None => stream::once(async {
                Err(WeftError::Completion("no scripted reply left".to_string()))
            })
            .boxed(),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn echo_deltas(prompt: &PromptSnapshot) -> Vec<(usize, String)> {
    let text = prompt.last_content_for(Role::User).unwrap_or_default();
    text.split_inclusive(' ')
        .map(|word| (0, word.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{PromptElement, Source};
    use futures::TryStreamExt;

    #[tokio::test]
    async fn replays_replies_in_order() {
        let completion = ScriptedCompletion::new().reply(["a", "b"]).reply(["c"]);

        let first: Vec<_> = completion
            .complete(CompletionRequest::default())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first, vec![(0, "a".to_string()), (0, "b".to_string())]);

        let second: Vec<_> = completion
            .complete(CompletionRequest::default())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(second, vec![(0, "c".to_string())]);
        assert_eq!(completion.requests().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_script_is_an_error() {
        let completion = ScriptedCompletion::new();
        let result: Result<Vec<_>, _> = completion
            .complete(CompletionRequest::default())
            .try_collect()
            .await;
        assert!(matches!(result, Err(WeftError::Completion(_))));
    }

    #[tokio::test]
    async fn echo_repeats_last_user_message() {
        let completion = ScriptedCompletion::echo();
        let request = CompletionRequest {
            prompt: PromptSnapshot::new(vec![
                PromptElement::new("sys", Source::Prompt, Role::System),
                PromptElement::new("hello there", Source::Constant, Role::User),
            ]),
            ..Default::default()
        };
        let deltas: Vec<_> = completion.complete(request).try_collect().await.unwrap();
        let text: String = deltas.into_iter().map(|(_, d)| d).collect();
        assert_eq!(text, "hello there");
    }

    #[tokio::test]
    async fn closures_are_completion_functions() {
        let completion = |_req: CompletionRequest| -> CompletionStream {
            stream::iter(vec![Ok((0, "x".to_string()))]).boxed()
        };
        let out: Vec<_> = completion
            .complete(CompletionRequest::default())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(completion.name(), "completion");
    }
}
