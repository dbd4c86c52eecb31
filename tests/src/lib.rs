//! Stub providers shared by the workspace integration tests.

use async_trait::async_trait;
use domain::errors::ProviderError;
use domain::ports::{EmbeddingProvider, GenerationProvider};
use domain::session::Message;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Bag-of-letters embedding: deterministic, offline, and ranks texts that
/// share vocabulary close together.
#[derive(Default)]
pub struct LetterEmbedder {
    calls: AtomicUsize,
}

impl LetterEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; 26];
        for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
            vector[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        Ok(vector)
    }

    fn model(&self) -> &str {
        "letters"
    }
}

/// Embedding provider that is always unreachable.
pub struct DownEmbedder;

#[async_trait]
impl EmbeddingProvider for DownEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::request("embeddings", "connection refused"))
    }

    fn model(&self) -> &str {
        "down"
    }
}

/// What a [`StubGenerator`] does when called.
#[derive(Clone)]
pub enum Behavior {
    /// Echo a fixed reply
    Reply(String),
    /// Reply with the question's last prompt line, i.e. `Question: ...`
    EchoQuestion,
    Fail(String),
    /// Sleep far past any test timeout
    Hang,
    /// Block until released, then reply
    WaitFor(Arc<Notify>, String),
}

pub struct StubGenerator {
    name: String,
    behavior: Behavior,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubGenerator {
    pub fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(name: &str, reply: &str) -> Arc<Self> {
        Self::new(name, Behavior::Reply(reply.to_string()))
    }

    pub fn failing(name: &str, message: &str) -> Arc<Self> {
        Self::new(name, Behavior::Fail(message.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl GenerationProvider for StubGenerator {
    async fn generate(&self, prompt: &str, _history: &[Message]) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        match &self.behavior {
            Behavior::Reply(text) => Ok(text.clone()),
            Behavior::EchoQuestion => Ok(prompt
                .lines()
                .rev()
                .find(|l| l.starts_with("Question: "))
                .unwrap_or_default()
                .trim_start_matches("Question: ")
                .to_string()),
            Behavior::Fail(message) => Err(ProviderError::request(&self.name, message)),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("late".to_string())
            }
            Behavior::WaitFor(notify, text) => {
                notify.notified().await;
                Ok(text.clone())
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
