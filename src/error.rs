//! Error types shared by the request path and the session controller.

use thiserror::Error;

/// Boxed error produced by a response body stream.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single request to the model server.
///
/// None of these are retried; each aborts the current turn.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request body could not be encoded as JSON.
    #[error("error encoding request body: {0}")]
    Encode(#[from] serde_json::Error),

    /// The POST could not be issued (connection refused, DNS, ...).
    #[error("failed to send request: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server answered, but not with a success status.
    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response body failed before a final record was seen.
    #[error("error reading response stream: {0}")]
    Stream(#[source] BoxError),
}

/// Misuse of the turn state machine, or a failed turn.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A request is already in flight.
    #[error("a request is already pending")]
    Busy,

    /// A response was delivered with no request in flight.
    #[error("no request is pending")]
    Idle,

    #[error(transparent)]
    Chat(#[from] ChatError),
}
