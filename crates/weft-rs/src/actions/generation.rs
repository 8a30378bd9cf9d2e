//! Model generation inside a template.
//!
//! [`generate`] snapshots the prompt consumed so far, calls the completion
//! function of the active context and emits choice 0 as `llm` elements while
//! it streams in. When the completion ends (or the stop pattern matches) the
//! full text is written to the outputs at `output_address + [name]`: a single
//! string, or a list of strings when the connector returned several choices.

use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt};
use regex::Regex;
use tracing::{debug, warn};

use crate::action::{Action, ActionProps, ElementStream, create_action};
use crate::actions::roles::assistant;
use crate::completion::{CompletionRequest, CompletionStream};
use crate::element::{PromptElement, Source};
use crate::error::WeftError;
use crate::events::PromptEvent;
use crate::outputs::OutputValue;

/// Options for one generation.
///
/// ```
/// use weft_rs::actions::GenOptions;
///
/// let options = GenOptions::new()
///     .with_max_tokens(256)
///     .with_stop_pattern(r"\n\n")
///     .unwrap();
/// assert_eq!(options.max_tokens, Some(256));
/// ```
#[derive(Clone, Debug, Default)]
pub struct GenOptions {
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    /// Generation stops at the first match in choice 0.
    pub stop: Option<Regex>,
    /// Overrides the context's streaming flag.
    pub stream: Option<bool>,
    /// Overrides the connector's configured model.
    pub model: Option<String>,
    /// Also stop where the template literal following this slot begins.
    pub stop_at_next_literal: bool,
}

impl GenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_stop(mut self, stop: Regex) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Compile `pattern` as the stop regex.
    pub fn with_stop_pattern(self, pattern: &str) -> Result<Self, WeftError> {
        let stop = Regex::new(pattern)
            .map_err(|e| WeftError::Config(format!("invalid stop pattern '{pattern}': {e}")))?;
        Ok(self.with_stop(stop))
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_stop_at_next_literal(mut self, enabled: bool) -> Self {
        self.stop_at_next_literal = enabled;
        self
    }

    /// The effective stop pattern given the literal that follows the slot.
    fn stop_pattern(&self, next_string: Option<&str>) -> Option<Regex> {
        let next = next_string
            .filter(|s| self.stop_at_next_literal && !s.trim().is_empty())
            .map(regex::escape);
        match (&self.stop, next) {
            (Some(stop), Some(next)) => {
                let combined = format!("(?:{})|{next}", stop.as_str());
                Some(Regex::new(&combined).unwrap_or_else(|_| stop.clone()))
            }
            (Some(stop), None) => Some(stop.clone()),
            (None, Some(next)) => Regex::new(&next).ok(),
            (None, None) => None,
        }
    }
}

/// Generate text from the active model and record it as output `name`.
pub fn generate(name: impl Into<String>, options: GenOptions) -> Action {
    let name: Arc<str> = Arc::from(name.into());
    let options = Arc::new(options);
    create_action(move |props| {
        let name = name.clone();
        let options = options.clone();
        stream::once(future::lazy(move |_| start(name, &options, props)))
            .flatten()
            .boxed()
    })
}

/// An assistant turn whose only content is [`generate`].
pub fn ai(name: impl Into<String>, options: GenOptions) -> Action {
    assistant().wrap(generate(name, options))
}

fn start(name: Arc<str>, options: &GenOptions, props: ActionProps) -> ElementStream {
    let ctx = props.context.clone();
    let stop = options.stop_pattern(props.next_string.as_deref());
    let request = CompletionRequest {
        prompt: props.current_prompt.snapshot(),
        max_tokens: options.max_tokens,
        top_p: options.top_p,
        stop: stop.clone(),
        stream: options.stream.or(ctx.stream).unwrap_or(false),
        is_chat: ctx.llm.is_chat,
        model: options.model.clone(),
    };

    debug!(
        name = %name,
        connector = ctx.llm.completion.name(),
        chat = request.is_chat,
        stream = request.stream,
        prompt_elements = request.prompt.elements().len(),
        "Starting generation"
    );
    props.events.on_event(&PromptEvent::GenerationStarted {
        name: &name,
        address: &ctx.output_address,
        role: ctx.role,
    });

    let deltas = ctx.llm.completion.complete(request);
    let generation = Generation {
        name,
        props,
        deltas,
        stop,
        texts: Vec::new(),
        emitted: 0,
        done: false,
    };
    stream::unfold(generation, Generation::step).boxed()
}

/// In-flight generation: accumulates per-choice text and emits choice 0.
struct Generation {
    name: Arc<str>,
    props: ActionProps,
    deltas: CompletionStream,
    stop: Option<Regex>,
    texts: Vec<String>,
    /// Bytes of choice 0 already emitted.
    emitted: usize,
    done: bool,
}

impl Generation {
    async fn step(mut self) -> Option<(Result<PromptElement, WeftError>, Self)> {
        while !self.done {
            match self.deltas.next().await {
                Some(Ok((choice, delta))) => {
                    if let Some(element) = self.absorb(choice, &delta) {
                        return Some((Ok(element), self));
                    }
                }
                Some(Err(e)) => {
                    warn!(name = %self.name, error = %e, "Generation failed");
                    self.done = true;
                    return Some((Err(e), self));
                }
                None => {
                    let end = self.texts.first().map_or(0, String::len);
                    let tail = self.take_fresh(end);
                    self.finish();
                    if let Some(element) = tail {
                        return Some((Ok(element), self));
                    }
                }
            }
        }
        None
    }

    /// Append a delta; returns the element to emit for choice 0, if any.
    ///
    /// While a stop pattern is active the last few bytes of choice 0 are held
    /// back, since a match may still begin there once more text arrives.
    /// Emitted text is never retracted: a match starting inside it cuts at
    /// the emitted boundary instead, so the recorded output always equals
    /// what the consumer saw.
    fn absorb(&mut self, choice: usize, delta: &str) -> Option<PromptElement> {
        if self.texts.len() <= choice {
            self.texts.resize_with(choice + 1, String::new);
        }
        self.texts[choice].push_str(delta);
        if choice != 0 {
            return None;
        }

        let Some(stop) = &self.stop else {
            let end = self.texts[0].len();
            return self.take_fresh(end);
        };
        match stop.find(&self.texts[0]).map(|m| m.start()) {
            Some(start) => {
                if start < self.emitted {
                    warn!(name = %self.name, "Stop pattern matched inside already emitted text");
                }
                let cut = start.max(self.emitted);
                self.texts[0].truncate(cut);
                debug!(name = %self.name, "Stop pattern matched");
                let fresh = self.take_fresh(cut);
                self.finish();
                fresh
            }
            None => {
                let end = self.holdback_boundary(stop.as_str().len());
                self.take_fresh(end)
            }
        }
    }

    /// Largest char boundary of choice 0 that leaves `holdback` bytes unsent.
    fn holdback_boundary(&self, holdback: usize) -> usize {
        let text = &self.texts[0];
        let mut end = text.len().saturating_sub(holdback);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        end.max(self.emitted)
    }

    /// Emit choice 0 from the last emitted byte up to `end`.
    fn take_fresh(&mut self, end: usize) -> Option<PromptElement> {
        let fresh = self
            .texts
            .first()?
            .get(self.emitted..end)
            .filter(|s| !s.is_empty())?
            .to_string();
        self.emitted = end;
        self.props.events.on_event(&PromptEvent::GenerationDelta {
            name: &self.name,
            delta: &fresh,
        });
        Some(PromptElement::new(fresh, Source::Llm, self.props.context.role))
    }

    /// Record outputs and stop pulling from the connector.
    fn finish(&mut self) {
        self.done = true;
        if let Some(stop) = &self.stop {
            for text in self.texts.iter_mut().skip(1) {
                if let Some(m) = stop.find(text) {
                    text.truncate(m.start());
                }
            }
        }

        let value = match self.texts.as_slice() {
            [] => OutputValue::Text(String::new()),
            [only] => OutputValue::Text(only.clone()),
            many => OutputValue::TextList(many.to_vec()),
        };
        let text = self.texts.first().cloned().unwrap_or_default();
        self.props
            .outputs
            .insert_at(&self.props.context.output_address, &self.name, value);

        debug!(name = %self.name, chars = text.len(), choices = self.texts.len(), "Generation finished");
        self.props.events.on_event(&PromptEvent::GenerationFinished {
            name: &self.name,
            text: &text,
            choices: self.texts.len().max(1),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionInput;
    use crate::actions::roles::user;
    use crate::completion::ScriptedCompletion;
    use crate::context::{Context, LlmContext};
    use crate::element::Role;
    use crate::events::FnEventHandler;
    use crate::storage::{PromptStorage, PromptStore};
    use std::sync::Mutex;

    fn props_with(completion: Arc<ScriptedCompletion>) -> ActionProps {
        let ctx = Context::new(LlmContext::from_arc(completion, true));
        ActionProps::new(ctx, Arc::new(PromptStorage::new()))
    }

    async fn contents(action: Action, props: ActionProps) -> Vec<String> {
        action
            .run(props)
            .map(|r| r.unwrap().content)
            .collect()
            .await
    }

    #[tokio::test]
    async fn streams_choice_zero_as_llm_elements() {
        let completion = Arc::new(ScriptedCompletion::new().reply(["Hel", "lo"]));
        let props = props_with(completion.clone());
        let out: Vec<_> = generate("answer", GenOptions::new())
            .run(props.clone())
            .collect()
            .await;
        let els: Vec<_> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(els.len(), 2);
        assert!(els.iter().all(|el| el.source == Source::Llm && el.role == Role::User));
        assert_eq!(props.outputs.snapshot().text("answer"), Some("Hello"));
    }

    #[tokio::test]
    async fn ai_speaks_as_assistant() {
        let completion = Arc::new(ScriptedCompletion::new().reply(["ok"]));
        let out: Vec<_> = ai("a", GenOptions::new())
            .run(props_with(completion))
            .collect()
            .await;
        assert_eq!(out[0].as_ref().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn stop_pattern_truncates_and_stops_pulling() {
        let completion = Arc::new(ScriptedCompletion::new().reply(["one\ntw", "o", "three"]));
        let props = props_with(completion);
        let options = GenOptions::new().with_stop_pattern("\n").unwrap();
        let out = contents(generate("x", options), props.clone()).await;
        assert_eq!(out, vec!["one"]);
        assert_eq!(props.outputs.snapshot().text("x"), Some("one"));
    }

    #[tokio::test]
    async fn stop_spanning_deltas_is_never_emitted() {
        let completion = Arc::new(ScriptedCompletion::new().reply(["a\n", "\nb"]));
        let props = props_with(completion);
        let options = GenOptions::new().with_stop_pattern("\n\n").unwrap();
        let out = contents(generate("x", options), props.clone()).await;
        assert_eq!(out.concat(), "a");
        assert_eq!(props.outputs.snapshot().text("x"), Some("a"));
    }

    #[tokio::test]
    async fn held_back_tail_is_flushed_when_no_stop_matches() {
        let completion = Arc::new(ScriptedCompletion::new().reply(["ab", "c", "dé"]));
        let props = props_with(completion);
        let options = GenOptions::new().with_stop_pattern("xyz").unwrap();
        let out = contents(generate("x", options), props.clone()).await;
        assert_eq!(out.concat(), "abcdé");
        assert_eq!(props.outputs.snapshot().text("x"), Some("abcdé"));
    }

    #[tokio::test]
    async fn next_literal_acts_as_stop_when_enabled() {
        let completion = Arc::new(ScriptedCompletion::new().reply(["Paris. Q: more"]));
        let props = props_with(completion).with_next_string(Some(" Q:".to_string()));
        let options = GenOptions::new().with_stop_at_next_literal(true);
        let out = contents(generate("city", options), props).await;
        assert_eq!(out, vec!["Paris."]);
    }

    #[tokio::test]
    async fn several_choices_are_recorded_as_a_list() {
        let completion = Arc::new(ScriptedCompletion::new().reply_choices([
            (0, "a".to_string()),
            (1, "b".to_string()),
            (0, "c".to_string()),
        ]));
        let props = props_with(completion);
        let out = contents(generate("pick", GenOptions::new()), props.clone()).await;
        assert_eq!(out, vec!["a", "c"]);
        assert_eq!(
            props.outputs.snapshot().get("pick"),
            Some(&OutputValue::TextList(vec!["ac".into(), "b".into()]))
        );
    }

    #[tokio::test]
    async fn request_reflects_prompt_and_options() {
        let completion = Arc::new(ScriptedCompletion::new().reply(["x"]));
        let props = props_with(completion.clone());
        props
            .current_prompt
            .push(PromptElement::new("Hi", Source::Prompt, Role::User));
        let options = GenOptions::new().with_max_tokens(5).with_top_p(0.5).with_stream(true);
        let _ = contents(generate("g", options), props).await;

        let requests = completion.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt.to_string(), "Hi");
        assert_eq!(requests[0].max_tokens, Some(5));
        assert_eq!(requests[0].top_p, Some(0.5));
        assert!(requests[0].stream);
        assert!(requests[0].is_chat);
    }

    #[tokio::test]
    async fn output_lands_under_block_address() {
        let completion = Arc::new(ScriptedCompletion::new().reply(["deep"]));
        let props = props_with(completion);
        let action = crate::actions::block("turn").wrap(generate("reply", GenOptions::new()));
        let _ = contents(action, props.clone()).await;
        let outputs = props.outputs.snapshot();
        assert_eq!(
            outputs.lookup(&["turn", "reply"]).and_then(OutputValue::as_text),
            Some("deep")
        );
    }

    #[tokio::test]
    async fn completion_errors_end_the_stream() {
        let completion = Arc::new(ScriptedCompletion::new());
        let props = props_with(completion);
        let template = user().template(["ask: ", "!"], [ActionInput::from(generate("g", GenOptions::new()))]);
        let out: Vec<_> = template.run(props).collect().await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(WeftError::Completion(_))));
    }

    #[tokio::test]
    async fn events_follow_the_generation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let handler = FnEventHandler::new(move |event| {
            let label = match event {
                PromptEvent::GenerationStarted { .. } => "started",
                PromptEvent::GenerationDelta { .. } => "delta",
                PromptEvent::GenerationFinished { .. } => "finished",
                _ => "other",
            };
            record.lock().unwrap().push(label);
        });
        let completion = Arc::new(ScriptedCompletion::new().reply(["a", "", "b"]));
        let props = props_with(completion).with_events(Arc::new(handler));
        let _ = contents(generate("g", GenOptions::new()), props).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["started", "delta", "delta", "finished"]
        );
    }
}
