use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextEntry {
    role: Role,
    content: String,
}

impl ContextEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Conversation memory: append-only, in-process, chronological.
///
/// Nothing is ever pruned. `warn_after` only makes unbounded growth visible in
/// the logs; it does not change what the model sees.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    entries: Vec<ContextEntry>,
    warn_after: Option<usize>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_growth_warning(warn_after: usize) -> Self {
        Self {
            entries: Vec::new(),
            warn_after: Some(warn_after),
        }
    }

    pub fn push(&mut self, entry: ContextEntry) {
        self.entries.push(entry);
        if let Some(limit) = self.warn_after {
            if self.entries.len() == limit + 1 {
                tracing::warn!(
                    entries = self.entries.len(),
                    limit,
                    "conversation context keeps growing; older turns are never pruned"
                );
            }
        }
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
