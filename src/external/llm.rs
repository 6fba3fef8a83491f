use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::external::error::ExternalError;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Which provider the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderPreference {
    Auto,
    OpenAi,
    Groq,
}

impl ProviderPreference {
    /// Parse the LLM_PROVIDER value; anything unrecognized means auto
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "openai" => Self::OpenAi,
            "groq" => Self::Groq,
            _ => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub openai_api_key: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub model: String,
    pub provider: ProviderPreference,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            groq_api_key: String::new(),
            groq_model: "meta-llama/llama-4-maverick-17b-128e-instruct".to_string(),
            model: "gpt-4o-mini".to_string(),
            provider: ProviderPreference::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Seam for chat-completion backends
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String>;

    /// Name of the provider that served (or will serve) requests
    fn provider(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    OpenAi,
    Groq,
}

impl Provider {
    fn name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat client speaking the OpenAI-compatible protocol to OpenAI and Groq,
/// with automatic fallback from OpenAI to Groq when the preference is auto.
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
    current: RwLock<Provider>,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let has_openai = !config.openai_api_key.is_empty();
        let has_groq = !config.groq_api_key.is_empty();

        let initial = match config.provider {
            ProviderPreference::OpenAi if has_openai => Provider::OpenAi,
            ProviderPreference::Groq if has_groq => Provider::Groq,
            ProviderPreference::Auto if has_openai => Provider::OpenAi,
            ProviderPreference::Auto if has_groq => Provider::Groq,
            _ => {
                return Err(ExternalError::ConfigError(
                    "No LLM provider available. Set OPENAI_API_KEY or GROQ_API_KEY.".to_string(),
                )
                .into())
            }
        };

        Ok(Self {
            http: Client::new(),
            config,
            current: RwLock::new(initial),
        })
    }

    fn openai_body(&self, messages: &[ChatMessage], temperature: f32, max_tokens: u32) -> Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        })
    }

    fn groq_body(&self, messages: &[ChatMessage], temperature: f32, max_tokens: u32) -> Value {
        serde_json::json!({
            "model": self.config.groq_model,
            "messages": messages,
            "temperature": temperature,
            "max_completion_tokens": max_tokens,
            "top_p": 1,
        })
    }

    async fn post_chat(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
        provider: Provider,
    ) -> Result<String> {
        let response = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExternalError::LlmError(format!(
                "{} API error {}: {}",
                provider.name(),
                status,
                detail
            ))
            .into());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::LlmError(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ExternalError::LlmError(format!("{} returned an empty response", provider.name()))
            })?;

        Ok(content.trim().to_string())
    }

    fn can_fall_back(&self) -> bool {
        self.config.provider == ProviderPreference::Auto && !self.config.groq_api_key.is_empty()
    }
}

#[async_trait]
impl ChatCompletion for LlmClient {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let active = *self.current.read().unwrap_or_else(|e| e.into_inner());

        match active {
            Provider::OpenAi => {
                let body = self.openai_body(messages, temperature, max_tokens);
                match self
                    .post_chat(OPENAI_CHAT_URL, &self.config.openai_api_key, &body, Provider::OpenAi)
                    .await
                {
                    Ok(content) => Ok(content),
                    Err(e) if self.can_fall_back() => {
                        tracing::warn!(error = %e, "OpenAI request failed, falling back to Groq");
                        *self.current.write().unwrap_or_else(|p| p.into_inner()) = Provider::Groq;
                        let body = self.groq_body(messages, temperature, max_tokens);
                        self.post_chat(GROQ_CHAT_URL, &self.config.groq_api_key, &body, Provider::Groq)
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            Provider::Groq => {
                let body = self.groq_body(messages, temperature, max_tokens);
                self.post_chat(GROQ_CHAT_URL, &self.config.groq_api_key, &body, Provider::Groq)
                    .await
            }
        }
    }

    fn provider(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .name()
            .to_string()
    }
}
