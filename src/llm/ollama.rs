//! Ollama generate endpoint client.
//!
//! Flattens the conversation into one prompt, POSTs it with streaming
//! enabled, and hands the response body to the stream decoder.

use super::ChatBackend;
use crate::config::Config;
use crate::conversation::{flatten_prompt, Message};
use crate::error::ChatError;
use crate::stream;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

/// Client for a single Ollama server and model.
#[derive(Clone)]
pub struct OllamaClient {
    model: String,
    endpoint: String,
    client: Client,
}

impl OllamaClient {
    /// Create a client from configuration.
    ///
    /// No request timeout is set: a reply takes as long as the model needs.
    pub fn new(config: &Config) -> Result<Self, ChatError> {
        let client = Client::builder().build().map_err(ChatError::Transport)?;
        Ok(Self::with_client(config.model.clone(), config.endpoint(), client))
    }

    /// Create a client around an existing HTTP client.
    pub fn with_client(model: String, endpoint: String, client: Client) -> Self {
        Self {
            model,
            endpoint,
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the JSON body for a message list.
    fn encode_request(&self, messages: &[Message]) -> Result<Vec<u8>, ChatError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: flatten_prompt(messages),
            stream: true,
        };
        Ok(serde_json::to_vec(&request)?)
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn generate(&self, messages: &[Message]) -> Result<String, ChatError> {
        let body = self.encode_request(messages)?;
        debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            messages = messages.len(),
            bytes = body.len(),
            "Sending generate request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(ChatError::Transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        stream::accumulate(response.bytes_stream()).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}
