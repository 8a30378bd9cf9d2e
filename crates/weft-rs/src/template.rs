//! The template binder: literals and slots zipped into one element stream.

use std::sync::{Arc, LazyLock};

use futures::future;
use futures::stream::{self, StreamExt};
use regex::Regex;
use tracing::trace;

use crate::action::{ActionProps, ElementStream, Slot};
use crate::element::{PromptElement, Source};
use crate::resolver::{halt_on_error, run_actions};

static INDENTED_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s+").expect("Invalid indentation regex"));

/// Collapse every newline followed by whitespace into a bare newline, so
/// templates can be indented along with the surrounding code.
pub fn normalize_literal(literal: &str) -> String {
    INDENTED_NEWLINE.replace_all(literal, "\n").into_owned()
}

/// Bind `literals` and `slots` in declaration order.
///
/// Literal `i` is emitted first (skipped when empty), then slot `i` is
/// resolved with the following literal as its `next_string`. Absent slots
/// produce nothing and are not resolved. Context is never forked here.
pub fn run_template_actions(
    literals: Arc<[String]>,
    slots: Arc<[Slot]>,
    props: ActionProps,
) -> ElementStream {
    let positions = literals.len().max(slots.len());
    halt_on_error(stream::iter(0..positions).flat_map(move |i| {
        let literal = literal_stream(literals.get(i).cloned(), &props);
        let slot = match slots.get(i).and_then(Slot::input) {
            Some(input) => {
                let input = input.clone();
                let slot_props = props.with_next_string(literals.get(i + 1).cloned());
                stream::once(future::lazy(move |_| run_actions(input, slot_props)))
                    .flatten()
                    .boxed()
            }
            None => stream::empty().boxed(),
        };
        literal.chain(slot)
    }))
}

fn literal_stream(literal: Option<String>, props: &ActionProps) -> ElementStream {
    let Some(literal) = literal.filter(|l| !l.is_empty()) else {
        return stream::empty().boxed();
    };
    let store = props.current_prompt.clone();
    let role = props.context.role;
    stream::once(future::lazy(move |_| {
        trace!(len = literal.len(), %role, "emitting literal");
        Ok(store.get_element(PromptElement::new(literal, Source::Prompt, role)))
    }))
    .boxed()
}
