//! Turn-taking over a single conversation.
//!
//! A [`Session`] owns the visible conversation and at most one
//! [`PendingRequest`]. Front-ends call [`Session::submit`] to start a turn,
//! run the backend call wherever they like, and hand the outcome back through
//! [`Session::resolve`]. Only the owner of the session mutates it.
//!
//! Piped-in seed content travels as a hidden preamble: it is prepended to the
//! messages sent for the first turn but never stored in the visible history.

use crate::conversation::{Conversation, Message};
use crate::error::{ChatError, SessionError};
use crate::llm::ChatBackend;
use chrono::{DateTime, Local};
use tracing::debug;

/// Marker for the single request in flight.
#[derive(Debug)]
pub struct PendingRequest {
    issued_at: DateTime<Local>,
    preamble: Option<Message>,
}

impl PendingRequest {
    pub fn issued_at(&self) -> DateTime<Local> {
        self.issued_at
    }
}

#[derive(Debug, Default)]
pub struct Session {
    conversation: Conversation,
    preamble: Option<Message>,
    pending: Option<PendingRequest>,
}

impl Session {
    /// Start a session, optionally seeded with content to analyze.
    pub fn new(seed: Option<&str>) -> Self {
        Self {
            conversation: Conversation::new(),
            preamble: seed.map(Message::seed),
            pending: None,
        }
    }

    /// The visible history.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether seed content is still waiting to be sent.
    pub fn has_preamble(&self) -> bool {
        self.preamble.is_some()
    }

    /// Start a turn with one line of user input.
    ///
    /// Returns the messages to send, or `None` when the input is blank and
    /// nothing should be sent. Fails with [`SessionError::Busy`] while a
    /// previous request is unresolved.
    pub fn submit(&mut self, input: &str) -> Result<Option<Vec<Message>>, SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::Busy);
        }
        let input = input.trim();
        if input.is_empty() {
            return Ok(None);
        }

        self.conversation.push(Message::user(input));
        let preamble = self.preamble.take();
        let outgoing = self.conversation.send_view(preamble.as_ref());
        self.pending = Some(PendingRequest {
            issued_at: Local::now(),
            preamble,
        });

        debug!(
            visible = self.conversation.len(),
            sent = outgoing.len(),
            "Turn submitted"
        );
        Ok(Some(outgoing))
    }

    /// Finish the pending turn.
    ///
    /// A reply is appended as an assistant message; a failure is appended as a
    /// system message and the seed preamble, if this turn carried it, is kept
    /// for the next attempt. Returns the appended message.
    pub fn resolve(&mut self, outcome: Result<String, ChatError>) -> Result<&Message, SessionError> {
        let pending = self.pending.take().ok_or(SessionError::Idle)?;
        let elapsed = Local::now() - pending.issued_at;

        let message = match outcome {
            Ok(reply) => Message::assistant(reply),
            Err(e) => {
                if pending.preamble.is_some() {
                    self.preamble = pending.preamble;
                }
                Message::system(format!("Error: {}", e))
            }
        };
        debug!(
            role = %message.role(),
            elapsed_ms = elapsed.num_milliseconds(),
            "Turn resolved"
        );

        self.conversation.push(message);
        self.conversation.last().ok_or(SessionError::Idle)
    }

    /// Run one full turn against a backend. Returns `None` for blank input.
    pub async fn turn<B>(&mut self, backend: &B, input: &str) -> Result<Option<&Message>, SessionError>
    where
        B: ChatBackend + ?Sized,
    {
        let Some(outgoing) = self.submit(input)? else {
            return Ok(None);
        };
        let outcome = backend.generate(&outgoing).await;
        self.resolve(outcome).map(Some)
    }
}

/// One request/response exchange: optional seed content, then the prompt.
pub async fn single_turn<B>(backend: &B, seed: Option<&str>, prompt: &str) -> Result<String, ChatError>
where
    B: ChatBackend + ?Sized,
{
    let mut messages: Vec<Message> = seed.map(Message::seed).into_iter().collect();
    messages.push(Message::user(prompt));
    backend.generate(&messages).await
}
