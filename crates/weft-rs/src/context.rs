//! Branch-local execution context.
//!
//! A [`Context`] is never mutated in place. Children get a fresh value from
//! [`Context::fork`] (deep-merge of a [`ContextPatch`]) or
//! [`Context::descend`] (leaf address extension), so sibling branches can
//! never observe each other's overrides.
//!
//! Merge rules for [`Context::fork`]:
//!
//! | Field | Rule |
//! |-------|------|
//! | `role`, `current_loop_id`, `stream` | replaced when set in the patch |
//! | `output_address`, `leaf_id` | replaced wholesale when set |
//! | `llm` | merged key-wise: unset patch keys keep the current value |

use std::sync::Arc;

use crate::completion::CompletionFn;
use crate::element::Role;

/// The model connector active for a subtree.
#[derive(Clone)]
pub struct LlmContext {
    pub completion: Arc<dyn CompletionFn>,
    pub is_chat: bool,
}

impl LlmContext {
    pub fn new(completion: impl CompletionFn + 'static, is_chat: bool) -> Self {
        Self {
            completion: Arc::new(completion),
            is_chat,
        }
    }

    pub fn from_arc(completion: Arc<dyn CompletionFn>, is_chat: bool) -> Self {
        Self {
            completion,
            is_chat,
        }
    }
}

impl std::fmt::Debug for LlmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmContext")
            .field("completion", &self.completion.name())
            .field("is_chat", &self.is_chat)
            .finish()
    }
}

/// Immutable execution metadata threaded through every resolution step.
#[derive(Clone, Debug)]
pub struct Context {
    pub role: Role,
    pub current_loop_id: Option<String>,
    /// Key path under which generated outputs are recorded.
    pub output_address: Vec<String>,
    /// Positional path through nested lists and loop iterations.
    pub leaf_id: Vec<usize>,
    pub llm: LlmContext,
    pub stream: Option<bool>,
}

impl Context {
    /// Root context: `user` role, empty addresses, no loop.
    pub fn new(llm: LlmContext) -> Self {
        Self {
            role: Role::default(),
            current_loop_id: None,
            output_address: Vec::new(),
            leaf_id: Vec::new(),
            llm,
            stream: None,
        }
    }

    /// Produce a child context with `patch` deep-merged over `self`.
    pub fn fork(&self, patch: &ContextPatch) -> Context {
        let llm = match &patch.llm {
            Some(llm_patch) => LlmContext {
                completion: llm_patch
                    .completion
                    .clone()
                    .unwrap_or_else(|| self.llm.completion.clone()),
                is_chat: llm_patch.is_chat.unwrap_or(self.llm.is_chat),
            },
            None => self.llm.clone(),
        };

        Context {
            role: patch.role.unwrap_or(self.role),
            current_loop_id: patch
                .current_loop_id
                .clone()
                .or_else(|| self.current_loop_id.clone()),
            output_address: patch
                .output_address
                .clone()
                .unwrap_or_else(|| self.output_address.clone()),
            leaf_id: patch
                .leaf_id
                .clone()
                .unwrap_or_else(|| self.leaf_id.clone()),
            llm,
            stream: patch.stream.or(self.stream),
        }
    }

    /// Child context one list level deeper, at position `index`.
    pub fn descend(&self, index: usize) -> Context {
        let mut leaf_id = Vec::with_capacity(self.leaf_id.len() + 1);
        leaf_id.extend_from_slice(&self.leaf_id);
        leaf_id.push(index);
        Context {
            leaf_id,
            ..self.clone()
        }
    }

    /// `output_address` extended by `segments`, without modifying `self`.
    pub fn address_with<I, S>(&self, segments: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut address = self.output_address.clone();
        address.extend(segments.into_iter().map(Into::into));
        address
    }
}

/// Key-wise override for the `llm` field of a [`Context`].
#[derive(Clone, Default)]
pub struct LlmPatch {
    pub completion: Option<Arc<dyn CompletionFn>>,
    pub is_chat: Option<bool>,
}

impl std::fmt::Debug for LlmPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmPatch")
            .field("completion", &self.completion.as_ref().map(|c| c.name()))
            .field("is_chat", &self.is_chat)
            .finish()
    }
}

/// Partial context used by [`Context::fork`]. Unset fields inherit.
#[derive(Clone, Debug, Default)]
pub struct ContextPatch {
    pub role: Option<Role>,
    pub current_loop_id: Option<String>,
    pub output_address: Option<Vec<String>>,
    pub leaf_id: Option<Vec<usize>>,
    pub llm: Option<LlmPatch>,
    pub stream: Option<bool>,
}

impl ContextPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn loop_id(mut self, id: impl Into<String>) -> Self {
        self.current_loop_id = Some(id.into());
        self
    }

    pub fn output_address(mut self, address: Vec<String>) -> Self {
        self.output_address = Some(address);
        self
    }

    pub fn leaf_id(mut self, leaf_id: Vec<usize>) -> Self {
        self.leaf_id = Some(leaf_id);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Override only the chat flag of the active connector.
    pub fn is_chat(mut self, is_chat: bool) -> Self {
        self.llm.get_or_insert_with(LlmPatch::default).is_chat = Some(is_chat);
        self
    }

    /// Swap the completion function for this subtree.
    pub fn completion(mut self, completion: Arc<dyn CompletionFn>) -> Self {
        self.llm.get_or_insert_with(LlmPatch::default).completion = Some(completion);
        self
    }
}
