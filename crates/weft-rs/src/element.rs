//! Prompt elements: the atomic unit every action produces.

use serde::{Deserialize, Serialize};

/// Speaker role attached to every prompt element.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Provenance of a prompt element.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// A literal value placed directly in a template slot.
    Constant,
    /// A value computed from props by a function slot.
    Parameter,
    /// Literal template text.
    Prompt,
    /// Text generated by the model.
    Llm,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Constant => write!(f, "constant"),
            Source::Parameter => write!(f, "parameter"),
            Source::Prompt => write!(f, "prompt"),
            Source::Llm => write!(f, "llm"),
        }
    }
}

/// One typed text fragment of a prompt.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PromptElement {
    pub content: String,
    pub source: Source,
    pub role: Role,
}

impl PromptElement {
    pub fn new(content: impl Into<String>, source: Source, role: Role) -> Self {
        Self {
            content: content.into(),
            source,
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_lowercase_tags() {
        let el = PromptElement::new("hi", Source::Llm, Role::Assistant);
        let json = serde_json::to_value(&el).unwrap();
        assert_eq!(json["source"], "llm");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn default_role_is_user() {
        assert_eq!(Role::default(), Role::User);
        assert_eq!(Role::System.to_string(), "system");
    }
}
