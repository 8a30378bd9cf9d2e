//! Events emitted while a prompt is produced.
//!
//! Helpers built on the engine (generation, loops, queue waits) report what
//! they are doing through [`PromptEvent`] values delivered to the
//! [`EventHandler`] carried in [`ActionProps`](crate::action::ActionProps).
//! Handlers observe; they cannot alter the element sequence.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Default; tests and fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use tracing::{debug, info, trace};

use crate::element::Role;

/// Events emitted by helpers during a run.
#[derive(Debug)]
pub enum PromptEvent<'a> {
    /// A generation is about to call the completion function.
    GenerationStarted {
        name: &'a str,
        address: &'a [String],
        role: Role,
    },
    /// A non-empty text delta was emitted for choice 0.
    GenerationDelta { name: &'a str, delta: &'a str },
    /// A generation finished and its output was recorded.
    GenerationFinished {
        name: &'a str,
        text: &'a str,
        choices: usize,
    },
    /// A loop is starting iteration `iteration` (zero-based).
    LoopIteration { id: &'a str, iteration: usize },
    /// A loop stopped after `iterations` iterations.
    LoopFinished { id: &'a str, iterations: usize },
    /// A wait is blocked on a queue item that has not been pushed yet.
    Waiting { key: &'a str, index: usize },
    /// A queued item was emitted into the prompt.
    QueueItemConsumed { key: &'a str, index: usize },
}

/// Observer for [`PromptEvent`]s.
///
/// ```ignore
/// struct Printer;
///
/// impl EventHandler for Printer {
///     fn on_event(&self, event: &PromptEvent<'_>) {
///         if let PromptEvent::GenerationFinished { name, text, .. } = event {
///             println!("{name} = {text}");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &PromptEvent<'_>) {
        let _ = event;
    }
}

/// Handler that ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&PromptEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&PromptEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&PromptEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &PromptEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(verbose, FnEventHandler::new(|e| eprintln!("{e:?}")));
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &PromptEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &PromptEvent<'_>) {
        match event {
            PromptEvent::GenerationStarted {
                name,
                address,
                role,
            } => {
                info!("Generating '{name}' as {role} at {address:?}");
            }
            PromptEvent::GenerationDelta { name, delta } => {
                let preview: String = delta.chars().take(80).collect();
                trace!("Generation '{name}' delta: {preview}");
            }
            PromptEvent::GenerationFinished {
                name,
                text,
                choices,
            } => {
                info!(
                    "Generated '{name}': {} chars across {choices} choice(s)",
                    text.len()
                );
            }
            PromptEvent::LoopIteration { id, iteration } => {
                debug!("Loop '{id}' iteration {iteration}");
            }
            PromptEvent::LoopFinished { id, iterations } => {
                debug!("Loop '{id}' finished after {iterations} iteration(s)");
            }
            PromptEvent::Waiting { key, index } => {
                info!("Waiting for queue item '{key}'[{index}]");
            }
            PromptEvent::QueueItemConsumed { key, index } => {
                debug!("Consumed queue item '{key}'[{index}]");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn composite_dispatches_to_all_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = seen.clone();
        let b = seen.clone();
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |e| {
                if let PromptEvent::LoopIteration { iteration, .. } = e {
                    a.lock().unwrap().push(format!("a{iteration}"));
                }
            }))
            .with(FnEventHandler::new(move |e| {
                if let PromptEvent::LoopIteration { iteration, .. } = e {
                    b.lock().unwrap().push(format!("b{iteration}"));
                }
            }));

        handler.on_event(&PromptEvent::LoopIteration {
            id: "l",
            iteration: 1,
        });
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1"]);
    }

    #[test]
    fn with_if_and_with_opt_skip_when_disabled() {
        let handler = CompositeEventHandler::new()
            .with_if(false, NoopHandler)
            .with_opt(None::<NoopHandler>)
            .with(LoggingHandler);
        assert_eq!(handler.len(), 1);
    }
}
