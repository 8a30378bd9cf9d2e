//! Prompt storage: the record of every element consumed so far.
//!
//! The template binder passes literal text through
//! [`PromptStore::get_element`] before emitting it, and the run driver
//! ([`Execution`](crate::runner::Execution)) pushes each element into the
//! store as the consumer pulls it. Generation reads a [`PromptSnapshot`] of
//! the store to build its completion request.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::element::{PromptElement, Role};

/// Storage collaborator consumed by the engine.
pub trait PromptStore: Send + Sync {
    /// Normalize (or intern) an element before it is emitted.
    fn get_element(&self, element: PromptElement) -> PromptElement;

    /// Record an element that the consumer has received.
    fn push(&self, element: PromptElement);

    /// Copy of everything recorded so far.
    fn snapshot(&self) -> PromptSnapshot;
}

/// In-memory [`PromptStore`]. Clones share the same storage.
#[derive(Clone, Default)]
pub struct PromptStorage {
    elements: Arc<Mutex<Vec<PromptElement>>>,
}

impl PromptStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PromptElement>> {
        self.elements.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl PromptStore for PromptStorage {
    fn get_element(&self, mut element: PromptElement) -> PromptElement {
        if element.content.contains('\r') {
            element.content = element.content.replace("\r\n", "\n");
        }
        element
    }

    fn push(&self, element: PromptElement) {
        self.lock().push(element);
    }

    fn snapshot(&self) -> PromptSnapshot {
        PromptSnapshot {
            elements: self.lock().clone(),
        }
    }
}

/// A chat message built from one role group.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Immutable view of a prompt at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PromptSnapshot {
    elements: Vec<PromptElement>,
}

impl PromptSnapshot {
    pub fn new(elements: Vec<PromptElement>) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &[PromptElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Maximal runs of consecutive elements sharing a role.
    pub fn role_groups(&self) -> impl Iterator<Item = &[PromptElement]> {
        self.elements.chunk_by(|a, b| a.role == b.role)
    }

    /// One message per role group, contents concatenated.
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        self.role_groups()
            .filter_map(|group| {
                let role = group.first()?.role;
                let content: String = group.iter().map(|el| el.content.as_str()).collect();
                Some(ChatMessage { role, content })
            })
            .collect()
    }

    /// Concatenated content of the last role group with `role`, if any.
    pub fn last_content_for(&self, role: Role) -> Option<String> {
        self.role_groups()
            .filter(|group| group.first().is_some_and(|el| el.role == role))
            .last()
            .map(|group| group.iter().map(|el| el.content.as_str()).collect())
    }
}

impl fmt::Display for PromptSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            f.write_str(&element.content)?;
        }
        Ok(())
    }
}
