//! Seams to the hosted services and document sources the pipeline relies on.

use async_trait::async_trait;

use crate::errors::{ProviderError, RagResult};
use crate::models::Document;
use crate::session::Message;

/// Maps text to a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Model identifier recorded alongside a persisted index.
    fn model(&self) -> &str;
}

/// Maps a prompt (plus optional prior turns) to a completion.
///
/// An empty or refusal-style completion is returned as `Ok`; judging it is
/// the caller's job.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str, history: &[Message]) -> Result<String, ProviderError>;

    /// Short name used to label answers and log lines
    fn name(&self) -> &str;

    /// Whether prior turns should be sent as chat messages rather than
    /// folded into the prompt text.
    fn supports_native_history(&self) -> bool {
        false
    }

    /// Whether the provider sends its own system message, in which case the
    /// system context is left out of the prompt text.
    fn sends_system_prompt(&self) -> bool {
        false
    }
}

/// Supplies the documents an index is built from.
pub trait DocumentSource: Send + Sync {
    fn documents(&self) -> RagResult<Vec<Document>>;
}

impl DocumentSource for Vec<Document> {
    fn documents(&self) -> RagResult<Vec<Document>> {
        Ok(self.clone())
    }
}
