//! LLM client configuration.

use serde::{Deserialize, Serialize};

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Sber GigaChat (OAuth token exchange, OpenAI-style chat)
    #[default]
    GigaChat,
    /// OpenAI-compatible API (OpenAI, Groq, Together.ai, etc.)
    OpenAI,
    /// Ollama API (local)
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gigachat" => Some(Self::GigaChat),
            "openai" | "groq" | "together" => Some(Self::OpenAI),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::GigaChat => "https://gigachat.devices.sberbank.ru/api/v1",
            Self::OpenAI => "https://api.openai.com",
            Self::Ollama => "http://localhost:11434",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::GigaChat => "GigaChat",
            Self::OpenAI => "gpt-4o-mini",
            Self::Ollama => "qwen2.5-coder:7b",
        }
    }
}

/// GigaChat authorization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GigaChatAuth {
    /// Base64 authorization key (`client_id:client_secret`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    /// API scope
    #[serde(default = "default_scope")]
    pub scope: String,
    /// OAuth endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// Verify TLS certificates of the GigaChat endpoints
    #[serde(default)]
    pub verify_ssl: bool,
}

fn default_scope() -> String {
    "GIGACHAT_API_PERS".to_string()
}

fn default_auth_url() -> String {
    "https://ngw.devices.sberbank.ru:9443/api/v2/oauth".to_string()
}

impl Default for GigaChatAuth {
    fn default() -> Self {
        Self {
            credentials: None,
            scope: default_scope(),
            auth_url: default_auth_url(),
            verify_ssl: false,
        }
    }
}

/// Configuration for LLM client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider
    #[serde(default)]
    pub provider: LlmProvider,
    /// API endpoint (provider default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// API key for OpenAI-compatible providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model name (provider default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Maximum tokens in response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// GigaChat authorization
    #[serde(default)]
    pub gigachat: GigaChatAuth,
}

fn default_max_tokens() -> u32 {
    256
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            endpoint: None,
            api_key: None,
            model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            gigachat: GigaChatAuth::default(),
        }
    }
}

impl LlmConfig {
    /// Apply environment variable overrides, looked up through `env`.
    ///
    /// Supported env vars:
    /// - `LLM_PROVIDER`: "gigachat", "openai" (also "groq", "together") or "ollama"
    /// - `LLM_ENDPOINT`: API endpoint
    /// - `LLM_API_KEY`: API key (falls back to `OPENAI_API_KEY` for openai)
    /// - `LLM_MODEL`: Model name
    /// - `LLM_MAX_TOKENS`: Maximum tokens in response
    /// - `LLM_TEMPERATURE`: Generation temperature (0.0-1.0)
    /// - `LLM_TIMEOUT_SECS`: HTTP request timeout
    /// - `GIGACHAT_CREDENTIALS`: Base64 authorization key
    /// - `GIGACHAT_CLIENT_ID` + `GIGACHAT_CLIENT_SECRET`: used when no key is set
    /// - `GIGACHAT_SCOPE`: API scope
    /// - `GIGACHAT_AUTH_URL`: OAuth endpoint
    /// - `GIGACHAT_VERIFY_SSL`: "true" or "false"
    pub(crate) fn apply_env(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(provider) = env("LLM_PROVIDER").and_then(|v| LlmProvider::from_str(&v)) {
            self.provider = provider;
        }
        if let Some(endpoint) = env("LLM_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(key) = env("LLM_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() && self.provider == LlmProvider::OpenAI {
            self.api_key = env("OPENAI_API_KEY");
        }
        if let Some(model) = env("LLM_MODEL") {
            self.model = Some(model);
        }
        if let Some(n) = env("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.max_tokens = n;
        }
        if let Some(t) = env("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.temperature = t;
        }
        if let Some(secs) = env("LLM_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = secs;
        }

        if let Some(credentials) = env("GIGACHAT_CREDENTIALS") {
            self.gigachat.credentials = Some(credentials);
        } else if self.gigachat.credentials.is_none() {
            if let (Some(id), Some(secret)) =
                (env("GIGACHAT_CLIENT_ID"), env("GIGACHAT_CLIENT_SECRET"))
            {
                self.gigachat.credentials = Some(super::gigachat::encode_credentials(&id, &secret));
            }
        }
        if let Some(scope) = env("GIGACHAT_SCOPE") {
            self.gigachat.scope = scope;
        }
        if let Some(url) = env("GIGACHAT_AUTH_URL") {
            self.gigachat.auth_url = url;
        }
        if let Some(val) = env("GIGACHAT_VERIFY_SSL") {
            self.gigachat.verify_ssl = val.eq_ignore_ascii_case("true") || val == "1";
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    /// Endpoint in use, without a trailing slash.
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or(self.provider.default_endpoint())
            .trim_end_matches('/')
    }

    /// Model in use.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or(self.provider.default_model())
    }

    /// Name of the credential the selected provider is missing, if any.
    pub fn missing_credential(&self) -> Option<&'static str> {
        match self.provider {
            LlmProvider::GigaChat if self.gigachat.credentials.is_none() => {
                Some("GIGACHAT_CREDENTIALS")
            }
            LlmProvider::OpenAI if self.api_key.is_none() => Some("LLM_API_KEY"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.provider, LlmProvider::GigaChat);
        assert!((config.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.model(), "GigaChat");
        assert_eq!(config.gigachat.scope, "GIGACHAT_API_PERS");
        assert_eq!(config.missing_credential(), Some("GIGACHAT_CREDENTIALS"));
    }

    #[test]
    fn test_provider_defaults_follow_provider() {
        let config = LlmConfig::default().apply_env(env(&[("LLM_PROVIDER", "ollama")]));
        assert_eq!(config.endpoint(), "http://localhost:11434");
        assert_eq!(config.missing_credential(), None);

        let config = LlmConfig::default().apply_env(env(&[
            ("LLM_PROVIDER", "groq"),
            ("LLM_ENDPOINT", "https://api.groq.com/openai/"),
            ("OPENAI_API_KEY", "sk-test"),
        ]));
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.endpoint(), "https://api.groq.com/openai");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_gigachat_env() {
        let config = LlmConfig::default().apply_env(env(&[
            ("GIGACHAT_CREDENTIALS", "abc=="),
            ("GIGACHAT_SCOPE", "GIGACHAT_API_CORP"),
            ("GIGACHAT_VERIFY_SSL", "1"),
            ("LLM_TEMPERATURE", "0.2"),
        ]));
        assert_eq!(config.gigachat.credentials.as_deref(), Some("abc=="));
        assert_eq!(config.gigachat.scope, "GIGACHAT_API_CORP");
        assert!(config.gigachat.verify_ssl);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.missing_credential(), None);
    }

    #[test]
    fn test_gigachat_client_pair() {
        let config = LlmConfig::default().apply_env(env(&[
            ("GIGACHAT_CLIENT_ID", "id"),
            ("GIGACHAT_CLIENT_SECRET", "secret"),
        ]));
        assert_eq!(config.gigachat.credentials.as_deref(), Some("aWQ6c2VjcmV0"));
    }

    #[test]
    fn test_invalid_numbers_are_ignored() {
        let config = LlmConfig::default().apply_env(env(&[("LLM_MAX_TOKENS", "lots")]));
        assert_eq!(config.max_tokens, 256);
    }
}
