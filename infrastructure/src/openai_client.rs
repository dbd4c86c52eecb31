use async_trait::async_trait;
use domain::errors::ProviderError;
use domain::ports::GenerationProvider;
use domain::session::Message as Turn;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;

const PROVIDER: &str = "openai";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/v1/chat/completions` client, used as the fallback model.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Arc<Client>,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Arc::new(Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            system_prompt: None,
            max_tokens: 500,
            temperature: 0.2,
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.openai_api_key.clone()?;
        Some(
            Self::new(config.openai_base_url.clone(), api_key, config.openai_model.clone())
                .with_limits(config.max_tokens, config.temperature),
        )
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Sent as the leading `system` message of every request.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    fn build_messages<'a>(&'a self, prompt: &'a str, history: &'a [Turn]) -> Vec<ChatMessage<'a>> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(history.iter().map(|turn| ChatMessage {
            role: turn.role.as_str(),
            content: &turn.content,
        }));
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        messages
    }

    pub async fn chat(&self, prompt: &str, history: &[Turn]) -> Result<String, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured {
                provider: PROVIDER.to_string(),
                message: "OPENAI_API_KEY is empty".to_string(),
            });
        }
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: self.build_messages(prompt, history),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        debug!(model = %self.model, turns = history.len(), "sending openai chat completion");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(PROVIDER, e))?;
        extract_content(completion)
    }
}

fn extract_content(completion: ChatCompletionResponse) -> Result<String, ProviderError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::invalid_response(PROVIDER, "response has no choices"))?;
    Ok(choice.message.content.unwrap_or_default().trim().to_string())
}

#[async_trait]
impl GenerationProvider for OpenAiClient {
    async fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String, ProviderError> {
        self.chat(prompt, history).await
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn supports_native_history(&self) -> bool {
        true
    }

    fn sends_system_prompt(&self) -> bool {
        self.system_prompt.is_some()
    }
}
