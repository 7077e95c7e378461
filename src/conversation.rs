//! Conversation store.
//!
//! An append-only, ordered list of role-tagged messages. Two projections are
//! derived from it: the flattened prompt string the generate endpoint expects,
//! and the send-view (the message list actually transmitted for a turn).

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of the hidden message that carries piped-in content.
const SEED_HEADER: &str = "Content to analyze:\n";

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    role: Role,
    content: String,
    sent_at: DateTime<Local>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            sent_at: Local::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// The hidden preamble that carries piped-in content to the model.
    pub fn seed(content: &str) -> Self {
        Self::user(format!("{}{}", SEED_HEADER, content))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Local time the message was created. Display only, never sent.
    pub fn sent_at(&self) -> DateTime<Local> {
        self.sent_at
    }
}

/// Ordered dialogue history. Grows without bound.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The messages to transmit for a turn: an optional hidden preamble
    /// followed by the visible history, in order.
    pub fn send_view(&self, preamble: Option<&Message>) -> Vec<Message> {
        preamble
            .into_iter()
            .chain(self.messages.iter())
            .cloned()
            .collect()
    }
}

/// Flatten messages into the single prompt string, one `role: content` line
/// per message.
pub fn flatten_prompt(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str(message.role.as_str());
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_prompt() {
        let messages = vec![Message::user("a"), Message::assistant("b")];
        assert_eq!(flatten_prompt(&messages), "user: a\nassistant: b\n");
    }

    #[test]
    fn test_flatten_prompt_empty() {
        assert_eq!(flatten_prompt(&[]), "");
    }

    #[test]
    fn test_flatten_prompt_keeps_multiline_content() {
        let messages = vec![Message::system("x\ny"), Message::user("z")];
        assert_eq!(flatten_prompt(&messages), "system: x\ny\nuser: z\n");
    }

    #[test]
    fn test_seed_message() {
        let seed = Message::seed("line1\nline2\n");
        assert_eq!(seed.role(), Role::User);
        assert_eq!(seed.content(), "Content to analyze:\nline1\nline2\n");
    }

    #[test]
    fn test_send_view_prepends_preamble() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("hi"));

        let preamble = Message::seed("S");
        let view = conversation.send_view(Some(&preamble));
        assert_eq!(view.len(), 2);
        assert_eq!(view[0], preamble);
        assert_eq!(view[1].content(), "hi");

        // The stored history is untouched.
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.send_view(None), conversation.messages());
    }

    #[test]
    fn test_push_preserves_order() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("one"));
        conversation.push(Message::user("one"));
        conversation.push(Message::assistant("two"));
        let contents: Vec<_> = conversation.messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, ["one", "one", "two"]);
        assert_eq!(conversation.last().map(|m| m.role()), Some(Role::Assistant));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::System.to_string(), "system");
    }
}
