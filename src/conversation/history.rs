//! Conversation turn and history types.

use serde::{Deserialize, Serialize};

/// Greeting used to seed every new conversation.
pub const DEFAULT_GREETING: &str = "Hi I am food inspector, I will read and understand all food contents of the packaging, identifying if any are hazardous to health or banned in any country. Ask me anything.";

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text typed or uploaded by the person chatting
    User,
    /// Text generated by the remote model
    Assistant,
}

impl Role {
    /// The literal role tag written into formatted prompts.
    pub fn tag(&self) -> &'static str {
        match self {
            Role::User => super::format::USER_TAG,
            Role::Assistant => super::format::ASSISTANT_TAG,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A single message in the conversation.
///
/// Turns are immutable once created; the only way to remove one is to reset
/// the whole history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: Role,
    content: String,
}

impl ConversationTurn {
    /// Create a turn with an explicit role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn.
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

/// Ordered conversation owned by one chat session.
///
/// The history is never empty: it starts with an assistant greeting and
/// [`reset`](Self::reset) returns it to exactly that state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    greeting: String,
    turns: Vec<ConversationTurn>,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_GREETING)
    }
}

impl ConversationHistory {
    /// Create a history seeded with a single assistant greeting.
    pub fn new(greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        Self {
            turns: vec![ConversationTurn::assistant(greeting.clone())],
            greeting,
        }
    }

    /// Append a turn at the end of the conversation.
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Drop every turn and re-seed with the greeting ("clear chat").
    pub fn reset(&mut self) {
        self.turns.clear();
        self.turns.push(ConversationTurn::assistant(self.greeting.clone()));
    }

    /// The most recent turn.
    pub fn last(&self) -> &ConversationTurn {
        // Non-empty by construction: `new` and `reset` always seed one turn.
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }
}

impl<'a> IntoIterator for &'a ConversationHistory {
    type Item = &'a ConversationTurn;
    type IntoIter = std::slice::Iter<'a, ConversationTurn>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
