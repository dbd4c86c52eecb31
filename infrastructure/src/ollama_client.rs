use async_trait::async_trait;
use domain::errors::ProviderError;
use domain::ports::{EmbeddingProvider, GenerationProvider};
use domain::session::Message as Turn;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;

const PROVIDER: &str = "ollama";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Message,
    #[serde(default)]
    done: bool,
}

/// Client for a local or remote Ollama server: embeddings and chat.
#[derive(Clone)]
pub struct OllamaClient {
    client: Arc<Client>,
    base_url: String,
    model: String,
    embed_model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, embed_model: impl Into<String>) -> Self {
        Self {
            client: Arc::new(Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            embed_model: embed_model.into(),
            temperature: 0.2,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.ollama_base_url.clone(),
            config.ollama_model.clone(),
            config.ollama_embed_model.clone(),
        )
        .with_temperature(config.temperature)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.embed_model,
            prompt: text,
        };
        let response = self
            .client
            .post(&url)
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
        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(PROVIDER, e))?;
        if embedding_response.embedding.is_empty() {
            return Err(ProviderError::invalid_response(
                PROVIDER,
                "empty embedding vector",
            ));
        }
        Ok(embedding_response.embedding)
    }

    pub async fn generate_response(
        &self,
        prompt: &str,
        history: &[Turn],
    ) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let mut messages: Vec<Message> = history
            .iter()
            .map(|turn| Message {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            })
            .collect();
        messages.push(Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        });
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };
        debug!(model = %self.model, turns = history.len(), "sending ollama chat request");
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, e))?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }
        parse_chat_body(&text)
    }
}

/// Accept both a single JSON object and NDJSON chunks.
fn parse_chat_body(text: &str) -> Result<String, ProviderError> {
    let mut full_content = String::new();
    let mut parsed_any = false;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(chat_resp) = serde_json::from_str::<ChatResponse>(line) {
            parsed_any = true;
            full_content.push_str(&chat_resp.message.content);
            if chat_resp.done {
                break;
            }
        }
    }
    if !parsed_any {
        if let Ok(chat_resp) = serde_json::from_str::<ChatResponse>(text) {
            return Ok(chat_resp.message.content);
        }
        return Err(ProviderError::invalid_response(
            PROVIDER,
            "no chat message in response body",
        ));
    }
    Ok(full_content)
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.generate_embedding(text).await
    }

    fn model(&self) -> &str {
        &self.embed_model
    }
}

#[async_trait]
impl GenerationProvider for OllamaClient {
    async fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String, ProviderError> {
        self.generate_response(prompt, history).await
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn supports_native_history(&self) -> bool {
        true
    }
}
