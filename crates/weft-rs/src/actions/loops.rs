//! Repeating a body with per-iteration context.
//!
//! Every iteration `i` of loop `id` runs its body with:
//!
//! | Field | Value |
//! |-------|-------|
//! | `current_loop_id` | `id` |
//! | `output_address` | parent address + `[id, i]` |
//! | `leaf_id` | parent leaf + `[i]` |
//!
//! and `State.loops[id]` holds `i` while the iteration is produced. Once the
//! loop ends the entry is set to not running. Iteration `i + 1` is only
//! started after the consumer has pulled everything iteration `i` produced,
//! so the `until` predicate sees that iteration's outputs.

use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::action::{Action, ActionInput, ActionProps, ElementStream, create_action};
use crate::context::ContextPatch;
use crate::events::PromptEvent;
use crate::resolver::{halt_on_error, run_actions};
use crate::state::LoopStatus;

/// Predicate deciding whether a loop is done, given the loop's props and the
/// index of the iteration that just finished.
pub type UntilFn = Arc<dyn Fn(&ActionProps, usize) -> bool + Send + Sync>;

/// Termination settings for [`loop_until`].
#[derive(Clone, Default)]
pub struct LoopOptions {
    /// Upper bound on iterations. `None` repeats until `until` says stop.
    pub max_iterations: Option<usize>,
    pub until: Option<UntilFn>,
}

impl LoopOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_until<F>(mut self, until: F) -> Self
    where
        F: Fn(&ActionProps, usize) -> bool + Send + Sync + 'static,
    {
        self.until = Some(Arc::new(until));
        self
    }
}

impl std::fmt::Debug for LoopOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopOptions")
            .field("max_iterations", &self.max_iterations)
            .field("until", &self.until.is_some())
            .finish()
    }
}

/// Repeat `body` until `options` say stop.
pub fn loop_until(id: impl Into<String>, body: impl Into<ActionInput>, options: LoopOptions) -> Action {
    let id: Arc<str> = Arc::from(id.into());
    let body = body.into();
    create_action(move |props| {
        let body = body.clone();
        iterate(
            id.clone(),
            props,
            options.max_iterations,
            options.until.clone(),
            move |_| body.clone(),
        )
    })
}

/// Run `f(item, i)` once per item, as iterations of loop `id`.
pub fn map<T, F>(id: impl Into<String>, items: Vec<T>, f: F) -> Action
where
    T: Send + Sync + 'static,
    F: Fn(&T, usize) -> ActionInput + Send + Sync + 'static,
{
    let id: Arc<str> = Arc::from(id.into());
    let items = Arc::new(items);
    let f = Arc::new(f);
    create_action(move |props| {
        let items = items.clone();
        let f = f.clone();
        iterate(id.clone(), props, Some(items.len()), None, move |i| {
            items.get(i).map_or(ActionInput::Null, |item| f(item, i))
        })
    })
}

fn iterate<B>(
    id: Arc<str>,
    props: ActionProps,
    max_iterations: Option<usize>,
    until: Option<UntilFn>,
    body: B,
) -> ElementStream
where
    B: Fn(usize) -> ActionInput + Send + 'static,
{
    let iterations = stream::unfold(0usize, move |i| {
        let finished = max_iterations.is_some_and(|max| i >= max)
            || (i > 0 && until.as_ref().is_some_and(|until| until(&props, i - 1)));

        if finished {
            props.state.set_loop(&id, LoopStatus::NotRunning);
            debug!(id = %id, iterations = i, "Loop finished");
            props
                .events
                .on_event(&PromptEvent::LoopFinished { id: &id, iterations: i });
            return future::ready(None);
        }

        props.state.set_loop(&id, LoopStatus::Iteration(i));
        props
            .events
            .on_event(&PromptEvent::LoopIteration { id: &id, iteration: i });

        let patch = ContextPatch::new()
            .loop_id(id.as_ref())
            .output_address(props.context.address_with([id.to_string(), i.to_string()]));
        let iteration_props = props.fork(&patch).descend(i);
        future::ready(Some((run_actions(body(i), iteration_props), i + 1)))
    });
    halt_on_error(iterations.flatten())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::generation::{GenOptions, generate};
    use crate::completion::ScriptedCompletion;
    use crate::context::{Context, LlmContext};
    use crate::outputs::OutputValue;
    use crate::storage::PromptStorage;
    use std::sync::Mutex;

    fn props() -> ActionProps {
        let ctx = Context::new(LlmContext::new(ScriptedCompletion::new(), false));
        ActionProps::new(ctx, Arc::new(PromptStorage::new()))
    }

    #[tokio::test]
    async fn runs_max_iterations_with_scoped_context() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let body = ActionInput::func(move |p| {
            record.lock().unwrap().push((
                p.context.current_loop_id.clone(),
                p.context.output_address.clone(),
                p.context.leaf_id.clone(),
                p.state.loop_status("l"),
            ));
            ActionInput::from("x")
        });
        let props = props();
        let out: Vec<_> = loop_until("l", body, LoopOptions::new().with_max_iterations(2))
            .run(props.clone())
            .collect()
            .await;
        assert_eq!(out.len(), 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0.as_deref(), Some("l"));
        assert_eq!(seen[1].1, vec!["l", "1"]);
        assert_eq!(seen[1].2, vec![1]);
        assert_eq!(seen[1].3, Some(LoopStatus::Iteration(1)));
        assert_eq!(props.state.loop_status("l"), Some(LoopStatus::NotRunning));
    }

    #[tokio::test]
    async fn until_sees_outputs_of_finished_iteration() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .reply(["go"])
                .reply(["go"])
                .reply(["stop"])
                .reply(["unused"]),
        );
        let ctx = Context::new(LlmContext::from_arc(completion.clone(), false));
        let props = ActionProps::new(ctx, Arc::new(PromptStorage::new()));
        let options = LoopOptions::new().with_until(|p: &ActionProps, i| {
            let i = i.to_string();
            p.outputs
                .snapshot()
                .lookup(&["chat", i.as_str(), "reply"])
                .and_then(OutputValue::as_text)
                == Some("stop")
        });
        let action = loop_until("chat", generate("reply", GenOptions::new()), options);
        let out: Vec<_> = action.run(props.clone()).collect().await;

        assert_eq!(out.len(), 3);
        assert_eq!(completion.remaining(), 1);
        let outputs = props.outputs.snapshot();
        assert_eq!(
            outputs.lookup(&["chat", "1", "reply"]).and_then(OutputValue::as_text),
            Some("go")
        );
    }

    #[tokio::test]
    async fn map_resolves_each_item() {
        let action = map("items", vec!["a", "b", "c"], |item, i| {
            ActionInput::from(format!("{i}:{item} "))
        });
        let out: Vec<_> = action
            .run(props())
            .map(|r| r.unwrap().content)
            .collect()
            .await;
        assert_eq!(out, vec!["0:a ", "1:b ", "2:c "]);
    }

    #[tokio::test]
    async fn empty_map_marks_loop_not_running() {
        let props = props();
        let out: Vec<_> = map("none", Vec::<String>::new(), |_, _| ActionInput::Null)
            .run(props.clone())
            .collect()
            .await;
        assert!(out.is_empty());
        assert_eq!(props.state.loop_status("none"), Some(LoopStatus::NotRunning));
    }
}
