//! Waiting on items pushed from outside the run.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::action::{Action, create_action};
use crate::element::{PromptElement, Source};
use crate::error::WeftError;
use crate::events::PromptEvent;
use crate::outputs::OutputValue;

/// Emit the queued item for `key` at the current loop iteration.
///
/// Outside a loop the first item is used. If the item has not been pushed
/// yet the stream suspends until [`SharedState::push_queue`] supplies it.
/// The item is emitted as a `parameter` element and recorded as output
/// `key` at the current output address.
///
/// [`SharedState::push_queue`]: crate::state::SharedState::push_queue
pub fn wait(key: impl Into<String>) -> Action {
    let key: Arc<str> = Arc::from(key.into());
    create_action(move |props| {
        let key = key.clone();
        stream::once(async move {
            let index = props
                .state
                .current_iteration(props.context.current_loop_id.as_deref());
            let item = match props.state.queue_item(&key, index) {
                Some(item) => item,
                None => {
                    debug!(key = %key, index, "Waiting for queue item");
                    props.events.on_event(&PromptEvent::Waiting { key: &key, index });
                    props.state.wait_for_item(&key, index).await
                }
            };

            let content = match item {
                Value::String(text) => text,
                other => other.to_string(),
            };
            props.outputs.insert_at(
                &props.context.output_address,
                &key,
                OutputValue::Text(content.clone()),
            );
            props
                .events
                .on_event(&PromptEvent::QueueItemConsumed { key: &key, index });
            Ok::<_, WeftError>(PromptElement::new(
                content,
                Source::Parameter,
                props.context.role,
            ))
        })
        .boxed()
    })
}
