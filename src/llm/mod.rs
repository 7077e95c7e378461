//! Model backends.
//!
//! The session controller only sees [`ChatBackend`]; the Ollama generate
//! endpoint is the one real implementation.

pub mod ollama;

use crate::conversation::Message;
use crate::error::ChatError;
use async_trait::async_trait;

pub use ollama::OllamaClient;

/// Something that turns an ordered message list into one assistant reply.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the messages and wait for the complete reply.
    async fn generate(&self, messages: &[Message]) -> Result<String, ChatError>;

    /// Model name, for display.
    fn model(&self) -> &str;
}
