//! Context-scoped template factories.
//!
//! [`create_new_context`] is how role scopes and blocks are built: the
//! returned [`TemplateFactory`] turns `(literals, slots)` into an [`Action`]
//! whose subtree runs in a forked context.
//!
//! ```
//! use weft_rs::prelude::*;
//!
//! let system = create_new_context(|_| ContextPatch::new().role(Role::System));
//! let action = system.template(["You are ", "."], [ActionInput::from("terse")]);
//! # let _ = action;
//! ```

use std::sync::Arc;

use crate::action::{Action, ActionProps, Slot, create_action_with};
use crate::context::{Context, ContextPatch};
use crate::template::{normalize_literal, run_template_actions};

type PatchFn = dyn Fn(&Context) -> ContextPatch + Send + Sync;

/// Builds context-scoped template actions. Cloning is cheap.
#[derive(Clone)]
pub struct TemplateFactory {
    patch: Arc<PatchFn>,
}

/// Create a template factory whose actions fork the current context with
/// the patch returned by `patch` before binding their template.
///
/// `patch` is called once per run of each built action, with the context
/// the action is entered with.
pub fn create_new_context<F>(patch: F) -> TemplateFactory
where
    F: Fn(&Context) -> ContextPatch + Send + Sync + 'static,
{
    TemplateFactory {
        patch: Arc::new(patch),
    }
}

impl TemplateFactory {
    /// Bind `literals` and `slots` into an action. Literals are normalized
    /// (indentation after newlines removed).
    pub fn template<L, S, I>(&self, literals: L, slots: S) -> Action
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        S: IntoIterator<Item = I>,
        I: Into<Slot>,
    {
        let literals: Arc<[String]> = literals
            .into_iter()
            .map(|l| normalize_literal(l.as_ref()))
            .collect();
        let slots: Arc<[Slot]> = slots.into_iter().map(Into::into).collect();
        let patch = self.patch.clone();

        create_action_with(
            move |props| run_template_actions(literals.clone(), slots.clone(), props),
            move |props: ActionProps| {
                let patch = patch(&props.context);
                props.fork(&patch)
            },
        )
    }

    /// A template made of a single literal.
    pub fn text(&self, literal: &str) -> Action {
        self.template([literal], Vec::<Slot>::new())
    }

    /// Wrap a single input without surrounding text.
    pub fn wrap(&self, input: impl Into<Slot>) -> Action {
        self.template(Vec::<&str>::new(), [input.into()])
    }
}

impl std::fmt::Debug for TemplateFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TemplateFactory")
    }
}
