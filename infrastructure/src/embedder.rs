use domain::errors::ProviderError;
use domain::models::{Chunk, Embedding};
use domain::ports::EmbeddingProvider;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::debug;

const BATCH_SIZE: usize = 32;
const CONCURRENCY: usize = 8;

/// Embeds chunks with bounded concurrency, preserving input order.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// All-or-nothing: the first provider failure aborts the whole call.
    pub async fn generate_embeddings(&self, chunks: &[Chunk]) -> Result<Vec<Embedding>, ProviderError> {
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(BATCH_SIZE) {
            debug!("Generating embeddings for {} chunks...", batch.len());
            embeddings.extend(self.generate_batch_embeddings(batch).await?);
        }
        Ok(embeddings)
    }

    async fn generate_batch_embeddings(&self, chunks: &[Chunk]) -> Result<Vec<Embedding>, ProviderError> {
        stream::iter(chunks.iter().map(|chunk| {
            let provider = &self.provider;
            async move {
                let vector = provider.embed(&chunk.text).await?;
                Ok::<_, ProviderError>(Embedding {
                    chunk: chunk.clone(),
                    vector,
                })
            }
        }))
        .buffered(CONCURRENCY)
        .try_collect()
        .await
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.provider.embed(text).await
    }
}
