use domain::errors::{RagError, RagResult};
use infrastructure::vector_index::VectorIndex;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_TOP_K: usize = 4;

/// Fixed top-k lookup over the vector index. No similarity floor: the k
/// nearest chunks are returned however weak the match.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, top_k: usize) -> RagResult<Self> {
        if top_k == 0 {
            return Err(RagError::Config("retrieval k must be at least 1".to_string()));
        }
        Ok(Self { index, top_k })
    }

    pub fn with_default_k(index: Arc<VectorIndex>) -> Self {
        Self {
            index,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn retrieve(&self, question: &str) -> RagResult<Vec<String>> {
        let chunks = self.index.search(question, self.top_k).await?;
        debug!(k = self.top_k, found = chunks.len(), "retrieved context chunks");
        Ok(chunks)
    }
}
