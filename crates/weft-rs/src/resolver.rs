//! The resolver: one [`ActionInput`] in, one lazy element stream out.
//!
//! Dispatch order:
//!
//! 1. `Null` → nothing.
//! 2. `List` → each item in order, with the leaf address extended by its
//!    position.
//! 3. `Number` / `Text` → one element; `parameter` when produced by a
//!    function, `constant` otherwise.
//! 4. `Function` → invoked with the current props when first pulled; its
//!    result is resolved with the same props.
//! 5. `Deferred` → awaited, then resolved with the same props. The awaited
//!    value is a plain value, so its text is `constant` even when a function
//!    returned the deferred.
//! 6. `Action` / `Stream` → forwarded unchanged.
//!
//! Children are resolved strictly one after another (`flat_map`/`flatten`),
//! so emission order always matches nesting order. Nothing is evaluated
//! until the consumer pulls.

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use tracing::trace;

use crate::action::{ActionInput, ActionProps, ElementStream};
use crate::element::{PromptElement, Source};
use crate::error::WeftError;

/// Resolve `input` into a lazy element stream.
pub fn run_actions(input: ActionInput, props: ActionProps) -> ElementStream {
    halt_on_error(resolve(input, props, false))
}

fn resolve(input: ActionInput, props: ActionProps, from_function: bool) -> ElementStream {
    trace!(
        kind = input.kind(),
        leaf = ?props.context.leaf_id,
        "resolving action input"
    );

    match input {
        ActionInput::Null => stream::empty().boxed(),
        ActionInput::List(items) => halt_on_error(
            stream::iter(items.into_iter().enumerate())
                .flat_map(move |(index, item)| resolve(item, props.descend(index), false)),
        ),
        ActionInput::Number(value) => scalar(format_number(value), &props, from_function),
        ActionInput::Text(text) => scalar(text, &props, from_function),
        ActionInput::Function(f) => stream::once(future::lazy(move |_| {
            let produced = f(&props);
            resolve(produced, props, true)
        }))
        .flatten()
        .boxed(),
        ActionInput::Deferred(deferred) => stream::once(async move {
            match deferred.await {
                Ok(value) => resolve(value, props, false),
                Err(e) => stream::once(future::ready(Err(e))).boxed(),
            }
        })
        .flatten()
        .boxed(),
        ActionInput::Action(action) => stream::once(future::lazy(move |_| action.run(props)))
            .flatten()
            .boxed(),
        ActionInput::Stream(shared) => stream::once(future::lazy(move |_| {
            shared
                .take()
                .map_or_else(|| stream::empty().boxed(), halt_on_error)
        }))
        .flatten()
        .boxed(),
    }
}

fn scalar(content: String, props: &ActionProps, from_function: bool) -> ElementStream {
    let source = if from_function {
        Source::Parameter
    } else {
        Source::Constant
    };
    let element = PromptElement::new(content, source, props.context.role);
    stream::once(future::ready(Ok(element))).boxed()
}

/// String form of a number, matching how template languages print them:
/// integral values without a fractional part, and exponent notation
/// (`1e+21`, `1e-7`) outside `[1e-6, 1e21)`.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        let formatted = format!("{value:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => formatted,
        };
    }
    value.to_string()
}

/// End the stream right after its first `Err` item.
pub fn halt_on_error<S>(stream: S) -> ElementStream
where
    S: Stream<Item = Result<PromptElement, WeftError>> + Send + 'static,
{
    stream
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        })
        .boxed()
}
