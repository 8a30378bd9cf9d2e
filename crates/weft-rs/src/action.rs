//! Actions, their props, and the closed union of template inputs.
//!
//! An [`Action`] turns an [`ActionProps`] bundle into a lazy
//! [`ElementStream`]. [`create_action`] and [`create_action_with`] are the
//! only way to build one: a resolver plus an optional props transform that
//! runs first. Every higher-level helper (role scopes, loops, generation) is
//! an `Action` built this way.
//!
//! [`ActionInput`] is what an author may place in a template slot. It is a
//! closed enum, so the resolver in [`crate::resolver`] matches it
//! exhaustively.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;

use crate::context::{Context, ContextPatch};
use crate::element::PromptElement;
use crate::error::WeftError;
use crate::events::{EventHandler, NoopHandler};
use crate::outputs::SharedOutputs;
use crate::state::SharedState;
use crate::storage::PromptStore;

/// Lazy, finite sequence of prompt elements. A failure is the last item.
pub type ElementStream = BoxStream<'static, Result<PromptElement, WeftError>>;

/// Everything a node sees while it produces elements.
///
/// Cloning is cheap: the context is behind an `Arc` and the shared handles
/// (state, outputs, storage, events) point at the same run-wide data.
#[derive(Clone)]
pub struct ActionProps {
    pub context: Arc<Context>,
    pub state: SharedState,
    pub params: Arc<Value>,
    pub outputs: SharedOutputs,
    pub current_prompt: Arc<dyn PromptStore>,
    /// The literal that follows the slot being resolved, if any.
    pub next_string: Option<String>,
    pub events: Arc<dyn EventHandler>,
}

impl ActionProps {
    /// Props for a fresh run with empty state, outputs, and params.
    pub fn new(context: Context, current_prompt: Arc<dyn PromptStore>) -> Self {
        Self {
            context: Arc::new(context),
            state: SharedState::new(),
            params: Arc::new(Value::Null),
            outputs: SharedOutputs::new(),
            current_prompt,
            next_string: None,
            events: Arc::new(NoopHandler),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Arc::new(params);
        self
    }

    pub fn with_state(mut self, state: SharedState) -> Self {
        self.state = state;
        self
    }

    pub fn with_outputs(mut self, outputs: SharedOutputs) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventHandler>) -> Self {
        self.events = events;
        self
    }

    pub fn with_context(&self, context: Context) -> Self {
        Self {
            context: Arc::new(context),
            ..self.clone()
        }
    }

    /// Props whose context is `patch` deep-merged over the current one.
    pub fn fork(&self, patch: &ContextPatch) -> Self {
        self.with_context(self.context.fork(patch))
    }

    /// Props one list level deeper, at position `index`.
    pub fn descend(&self, index: usize) -> Self {
        self.with_context(self.context.descend(index))
    }

    pub fn with_next_string(&self, next_string: Option<String>) -> Self {
        Self {
            next_string,
            ..self.clone()
        }
    }

    /// Top-level field of the run parameters.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Top-level string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }
}

impl std::fmt::Debug for ActionProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionProps")
            .field("context", &self.context)
            .field("params", &self.params)
            .field("next_string", &self.next_string)
            .finish_non_exhaustive()
    }
}

type Resolver = dyn Fn(ActionProps) -> ElementStream + Send + Sync;
type PropsTransform = dyn Fn(ActionProps) -> ActionProps + Send + Sync;

/// A composable producer of prompt elements.
#[derive(Clone)]
pub struct Action {
    resolver: Arc<Resolver>,
    transform: Arc<PropsTransform>,
}

impl Action {
    /// Apply the props transform, then start the resolver.
    pub fn run(&self, props: ActionProps) -> ElementStream {
        (self.resolver)((self.transform)(props))
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Action")
    }
}

/// Wrap a resolver into an [`Action`] with the identity props transform.
pub fn create_action<R>(resolver: R) -> Action
where
    R: Fn(ActionProps) -> ElementStream + Send + Sync + 'static,
{
    create_action_with(resolver, |props| props)
}

/// Wrap a resolver into an [`Action`] that transforms its props first.
pub fn create_action_with<R, T>(resolver: R, transform: T) -> Action
where
    R: Fn(ActionProps) -> ElementStream + Send + Sync + 'static,
    T: Fn(ActionProps) -> ActionProps + Send + Sync + 'static,
{
    Action {
        resolver: Arc::new(resolver),
        transform: Arc::new(transform),
    }
}

/// A deferred input: a shared future that may be awaited by several slots.
pub type DeferredInput = Shared<BoxFuture<'static, Result<ActionInput, WeftError>>>;

/// A function of props producing another input.
pub type InputFn = Arc<dyn Fn(&ActionProps) -> ActionInput + Send + Sync>;

/// An externally produced element stream. It can be consumed only once;
/// later resolutions of the same input see an empty stream.
#[derive(Clone)]
pub struct SharedStream(Arc<Mutex<Option<ElementStream>>>);

impl SharedStream {
    pub fn new(stream: ElementStream) -> Self {
        Self(Arc::new(Mutex::new(Some(stream))))
    }

    /// Take the stream, leaving `None` behind.
    pub fn take(&self) -> Option<ElementStream> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Every shape an author may place in a template slot.
#[derive(Clone)]
pub enum ActionInput {
    Null,
    Number(f64),
    Text(String),
    Stream(SharedStream),
    Function(InputFn),
    Deferred(DeferredInput),
    Action(Action),
    List(Vec<ActionInput>),
}

impl ActionInput {
    /// A function of props, invoked lazily when the slot is reached.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&ActionProps) -> ActionInput + Send + Sync + 'static,
    {
        ActionInput::Function(Arc::new(f))
    }

    /// An async function of props. Each invocation yields a deferred input.
    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(ActionProps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ActionInput, WeftError>> + Send + 'static,
    {
        ActionInput::func(move |props| ActionInput::deferred(f(props.clone())))
    }

    /// A value that becomes available later.
    pub fn deferred<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<ActionInput, WeftError>> + Send + 'static,
    {
        ActionInput::Deferred(future.boxed().shared())
    }

    /// An existing element stream, forwarded unchanged.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<PromptElement, WeftError>> + Send + 'static,
    {
        ActionInput::Stream(SharedStream::new(stream.boxed()))
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ActionInput>,
    {
        ActionInput::List(items.into_iter().map(Into::into).collect())
    }

    /// Short variant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionInput::Null => "null",
            ActionInput::Number(_) => "number",
            ActionInput::Text(_) => "text",
            ActionInput::Stream(_) => "stream",
            ActionInput::Function(_) => "function",
            ActionInput::Deferred(_) => "deferred",
            ActionInput::Action(_) => "action",
            ActionInput::List(_) => "list",
        }
    }
}

impl std::fmt::Debug for ActionInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionInput::Number(n) => f.debug_tuple("Number").field(n).finish(),
            ActionInput::Text(t) => f.debug_tuple("Text").field(t).finish(),
            ActionInput::List(items) => f.debug_tuple("List").field(items).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

impl From<&str> for ActionInput {
    fn from(value: &str) -> Self {
        ActionInput::Text(value.to_string())
    }
}

impl From<String> for ActionInput {
    fn from(value: String) -> Self {
        ActionInput::Text(value)
    }
}

impl From<f64> for ActionInput {
    fn from(value: f64) -> Self {
        ActionInput::Number(value)
    }
}

impl From<i64> for ActionInput {
    fn from(value: i64) -> Self {
        ActionInput::Number(value as f64)
    }
}

impl From<i32> for ActionInput {
    fn from(value: i32) -> Self {
        ActionInput::Number(f64::from(value))
    }
}

impl From<u32> for ActionInput {
    fn from(value: u32) -> Self {
        ActionInput::Number(f64::from(value))
    }
}

impl From<usize> for ActionInput {
    fn from(value: usize) -> Self {
        ActionInput::Number(value as f64)
    }
}

impl From<Action> for ActionInput {
    fn from(value: Action) -> Self {
        ActionInput::Action(value)
    }
}

impl<T: Into<ActionInput>> From<Vec<T>> for ActionInput {
    fn from(items: Vec<T>) -> Self {
        ActionInput::list(items)
    }
}

impl<T: Into<ActionInput>> From<Option<T>> for ActionInput {
    fn from(value: Option<T>) -> Self {
        value.map_or(ActionInput::Null, Into::into)
    }
}

/// A template slot: an input, or the absence of a value.
///
/// An absent slot is skipped entirely by the binder, which is different from
/// a slot holding [`ActionInput::Null`] (resolved to nothing).
#[derive(Clone, Debug)]
pub struct Slot(Option<ActionInput>);

impl Slot {
    pub fn absent() -> Self {
        Slot(None)
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }

    pub fn input(&self) -> Option<&ActionInput> {
        self.0.as_ref()
    }
}

impl From<ActionInput> for Slot {
    fn from(input: ActionInput) -> Self {
        Slot(Some(input))
    }
}

impl From<Action> for Slot {
    fn from(action: Action) -> Self {
        Slot(Some(ActionInput::Action(action)))
    }
}

impl From<&str> for Slot {
    fn from(text: &str) -> Self {
        Slot(Some(ActionInput::from(text)))
    }
}

impl From<String> for Slot {
    fn from(text: String) -> Self {
        Slot(Some(ActionInput::Text(text)))
    }
}
