//! LLM client for text-to-SQL completions.
//!
//! Supports GigaChat, OpenAI-compatible APIs and Ollama.

mod config;
mod gigachat;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use config::{GigaChatAuth, LlmConfig, LlmProvider};
pub use gigachat::encode_credentials;

use gigachat::TokenCache;

/// A text-completion service: one system turn, one user turn, one reply.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Failed to connect to LLM service
    #[error("Connection error: {0}")]
    Connection(String),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// API returned an error
    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
    /// Token exchange failed
    #[error("Authentication failed: {0}")]
    Auth(String),
    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),
    /// Provider needs a credential that is not configured
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),
}

fn send_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Connection(e.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI-style chat request (also spoken by GigaChat).
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Ollama chat request format.
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: ChatMessage,
}

/// LLM client for SQL generation.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
    token: Option<TokenCache>,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        let mut token = None;

        if config.provider == LlmProvider::GigaChat {
            let credentials = config
                .gigachat
                .credentials
                .as_deref()
                .ok_or(LlmError::MissingCredential("GIGACHAT_CREDENTIALS"))?;
            token = Some(TokenCache::new(
                &config.gigachat.auth_url,
                credentials,
                &config.gigachat.scope,
            ));
            builder = builder.danger_accept_invalid_certs(!config.gigachat.verify_ssl);
        }

        let client = builder
            .build()
            .map_err(|e| LlmError::Connection(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            token,
        })
    }

    fn messages(system: &str, user: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ]
    }

    fn chat_request<'a>(&'a self, system: &str, user: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: self.config.model(),
            messages: Self::messages(system, user),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        }
    }

    /// Call GigaChat, refreshing the token once if it was rejected.
    async fn call_gigachat(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let Some(token) = self.token.as_ref() else {
            return Err(LlmError::MissingCredential("GIGACHAT_CREDENTIALS"));
        };
        let url = format!("{}/chat/completions", self.config.endpoint());
        let request = self.chat_request(system, user);

        let bearer = token.bearer(&self.client).await?;
        let first = self.client.post(&url).bearer_auth(bearer).json(&request);
        match Self::send_chat(first).await {
            Err(LlmError::Api { status, .. }) if status == StatusCode::UNAUTHORIZED.as_u16() => {
                debug!("GigaChat token rejected, requesting a new one");
                token.invalidate().await;
                let bearer = token.bearer(&self.client).await?;
                Self::send_chat(self.client.post(&url).bearer_auth(bearer).json(&request)).await
            }
            other => other,
        }
    }

    /// Call an OpenAI-compatible chat completions endpoint.
    async fn call_openai(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(LlmError::MissingCredential("LLM_API_KEY"))?;
        let url = format!("{}/v1/chat/completions", self.config.endpoint());
        let request = self.chat_request(system, user);
        Self::send_chat(self.client.post(&url).bearer_auth(api_key).json(&request)).await
    }

    async fn send_chat(request: RequestBuilder) -> Result<String, LlmError> {
        let resp = request.send().await.map_err(send_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("response has no choices".to_string()))
    }

    /// Call Ollama chat API.
    async fn call_ollama(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: self.config.model(),
            messages: Self::messages(system, user),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/chat", self.config.endpoint());
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let ollama_resp: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(ollama_resp.message.content)
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        debug!(
            "Requesting completion from {:?} model {}",
            self.config.provider,
            self.config.model()
        );
        match self.config.provider {
            LlmProvider::GigaChat => self.call_gigachat(system, user).await,
            LlmProvider::OpenAI => self.call_openai(system, user).await,
            LlmProvider::Ollama => self.call_ollama(system, user).await,
        }
    }
}
