use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use haggle_core::config::LlmConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("completion request failed: {0}")]
    Http(String),
    #[error("completion endpoint returned status {0}")]
    Status(u16),
    #[error("completion request timed out")]
    Timeout,
    #[error("completion reply carried no content")]
    EmptyReply,
    #[error("could not build http client: {0}")]
    Client(String),
}

/// Seam between the negotiation loop and whatever serves completions.
/// Tests script this; production talks to a chat-completions endpoint.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        seed: u64,
    ) -> Result<String, TransportError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    seed: u64,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Client for an OpenAI-style `/v1/chat/completions` endpoint. Sampling
/// stays cool and short: farmers should haggle, not monologue.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl HttpCompletionClient {
    pub fn new(config: &LlmConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| TransportError::Client(error.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        seed: u64,
    ) -> Result<String, TransportError> {
        let payload = CompletionRequest {
            model: &self.model,
            messages,
            seed,
            temperature: 0.25,
            top_p: 0.8,
            max_tokens: 200,
        };

        let mut request = self.http.post(&self.base_url).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body: CompletionResponse = response.json().await.map_err(classify)?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(TransportError::EmptyReply)?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(TransportError::EmptyReply);
        }
        Ok(trimmed.to_string())
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Http(error.to_string())
    }
}

/// Stable per-farmer sampling seed: SHA-256 of the farmer's name folded to
/// 64 bits. The same farmer always haggles from the same seed.
pub fn farmer_seed(name: &str) -> u64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[24..32]);
    u64::from_be_bytes(tail)
}

/// Per-request seed stream for one negotiation, starting at the farmer's
/// stable seed and incrementing with wraparound on every request.
#[derive(Clone, Debug)]
pub struct SeedSequence {
    next: u64,
}

impl SeedSequence {
    pub fn for_farmer(name: &str) -> Self {
        Self { next: farmer_seed(name) }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self { next: seed }
    }

    pub fn next_seed(&mut self) -> u64 {
        let seed = self.next;
        self.next = self.next.wrapping_add(1);
        seed
    }
}
