//! Persisted vector index over document chunks.
//!
//! The index lives in a fixed directory. If that directory exists it is
//! loaded as-is and never rebuilt from the source documents; deleting it is
//! the only way to force a rebuild. Builds are staged in a sibling
//! `<dir>.partial` directory and renamed into place once fully written, so
//! a failed build never leaves a half-populated index behind.

use domain::chunker::{chunk_documents, ChunkConfig};
use domain::errors::{ProviderError, RagError, RagResult};
use domain::models::{Chunk, Document, Embedding};
use domain::ports::{DocumentSource, EmbeddingProvider};
use shared::telemetry::Telemetry;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::embedder::Embedder;
use crate::embedding_storage::{
    EmbeddingStorage, META_DIMENSION, META_EMBEDDING_MODEL, META_SOURCE_DIGEST,
};
use crate::search::SearchEngine;

pub const INDEX_DB_FILE: &str = "index.db";

pub struct VectorIndex {
    path: PathBuf,
    embedder: Embedder,
    // Single writer; held only inside `add` while the write lock is held.
    storage: Mutex<EmbeddingStorage>,
    entries: RwLock<Vec<Embedding>>,
}

impl VectorIndex {
    /// Load the index at `path` if it exists, otherwise build it from
    /// `source` and persist it there.
    pub async fn build_or_load(
        path: impl AsRef<Path>,
        source: &dyn DocumentSource,
        chunk_config: &ChunkConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> RagResult<Self> {
        let path = path.as_ref();
        let embedder = Embedder::new(provider);
        if path.exists() {
            info!("Loading existing vector index from {}", path.display());
            return Self::load(path, source, embedder);
        }
        info!("Building vector index at {}", path.display());
        Self::build(path, source, chunk_config, embedder).await
    }

    fn load(path: &Path, source: &dyn DocumentSource, embedder: Embedder) -> RagResult<Self> {
        let storage = EmbeddingStorage::open_existing(path.join(INDEX_DB_FILE))?;
        let entries = storage.get_all_embeddings()?;

        let dimension = storage.get_meta(META_DIMENSION)?;
        if let Some(expected) = dimension.as_deref().and_then(|d| d.parse::<usize>().ok()) {
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != expected) {
                return Err(RagError::IndexCorruption {
                    path: path.to_path_buf(),
                    reason: format!(
                        "vector for {}@{} has {} dimensions, expected {}",
                        bad.chunk.source,
                        bad.chunk.offset,
                        bad.vector.len(),
                        expected
                    ),
                });
            }
        }

        warn_if_stale(&storage, source);
        info!("Loaded {} chunks from {}", entries.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            embedder,
            storage: Mutex::new(storage),
            entries: RwLock::new(entries),
        })
    }

    async fn build(
        path: &Path,
        source: &dyn DocumentSource,
        chunk_config: &ChunkConfig,
        embedder: Embedder,
    ) -> RagResult<Self> {
        let telemetry = Telemetry::new();
        let documents = source.documents()?;
        let chunks = chunk_documents(&documents, chunk_config);
        info!(
            "Embedding {} chunks from {} documents...",
            chunks.len(),
            documents.len()
        );
        let embeddings = embedder.generate_embeddings(&chunks).await?;
        ensure_uniform_dimension(&embeddings, None)?;

        let staging = staging_path(path);
        if staging.exists() {
            warn!("Removing leftover partial index at {}", staging.display());
            fs::remove_dir_all(&staging)?;
        }
        if let Err(err) = write_index(&staging, &documents, &embeddings, embedder.provider().model()) {
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }
        fs::rename(&staging, path)?;

        let storage = EmbeddingStorage::open_existing(path.join(INDEX_DB_FILE))?;
        info!(
            "Index saved to {} ({} chunks, {}ms)",
            path.display(),
            embeddings.len(),
            telemetry.elapsed_ms()
        );
        Ok(Self {
            path: path.to_path_buf(),
            embedder,
            storage: Mutex::new(storage),
            entries: RwLock::new(embeddings),
        })
    }

    /// Embed and append chunks. Embedding happens before any lock is taken,
    /// so a provider failure leaves the index untouched.
    pub async fn add(&self, chunks: Vec<Chunk>) -> RagResult<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let embeddings = self.embedder.generate_embeddings(&chunks).await?;

        let mut entries = self.entries.write().await;
        let expected = entries.first().map(|e| e.vector.len());
        ensure_uniform_dimension(&embeddings, expected)?;
        {
            let storage = self
                .storage
                .lock()
                .map_err(|_| RagError::Storage("index storage lock poisoned".to_string()))?;
            let dimension = match (expected, embeddings.first()) {
                (None, Some(first)) => Some(first.vector.len().to_string()),
                _ => None,
            };
            match &dimension {
                Some(d) => storage.insert_embeddings_with_meta(&embeddings, &[(META_DIMENSION, d.as_str())])?,
                None => storage.insert_embeddings(&embeddings)?,
            }
        }
        let added = embeddings.len();
        entries.extend(embeddings);
        debug!("Appended {} chunks to {}", added, self.path.display());
        Ok(added)
    }

    /// Texts of the `k` chunks nearest to `query`, nearest first.
    pub async fn search(&self, query: &str, k: usize) -> RagResult<Vec<String>> {
        if k == 0 {
            return Err(RagError::Config("search k must be at least 1".to_string()));
        }
        if self.entries.read().await.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed_query(query).await?;
        let entries = self.entries.read().await;
        Ok(SearchEngine::find_relevant_chunks(&query_embedding, &entries, k))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sibling directory a build is written into before being renamed.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("index"));
    name.push(".partial");
    path.with_file_name(name)
}

/// md5 over every document's source and text, in order.
pub fn source_digest(documents: &[Document]) -> String {
    let mut context = md5::Context::new();
    for doc in documents {
        context.consume(doc.source.as_bytes());
        context.consume([0u8]);
        context.consume(doc.text.as_bytes());
        context.consume([0u8]);
    }
    format!("{:x}", context.compute())
}

fn write_index(
    staging: &Path,
    documents: &[Document],
    embeddings: &[Embedding],
    model: &str,
) -> RagResult<()> {
    let storage = EmbeddingStorage::create(staging.join(INDEX_DB_FILE))?;
    let digest = source_digest(documents);
    let dimension = embeddings.first().map(|e| e.vector.len().to_string());
    let mut meta = vec![(META_SOURCE_DIGEST, digest.as_str()), (META_EMBEDDING_MODEL, model)];
    if let Some(d) = &dimension {
        meta.push((META_DIMENSION, d.as_str()));
    }
    storage.insert_embeddings_with_meta(embeddings, &meta)
}

fn ensure_uniform_dimension(embeddings: &[Embedding], expected: Option<usize>) -> RagResult<()> {
    let Some(expected) = expected.or_else(|| embeddings.first().map(|e| e.vector.len())) else {
        return Ok(());
    };
    match embeddings.iter().find(|e| e.vector.len() != expected) {
        Some(bad) => Err(RagError::Provider(ProviderError::InvalidResponse {
            provider: "embedding".to_string(),
            message: format!(
                "embedding for {}@{} has {} dimensions, expected {}",
                bad.chunk.source,
                bad.chunk.offset,
                bad.vector.len(),
                expected
            ),
        })),
        None => Ok(()),
    }
}

/// The persisted index is trusted as-is; a changed source set is only
/// reported.
fn warn_if_stale(storage: &EmbeddingStorage, source: &dyn DocumentSource) {
    let stored = match storage.get_meta(META_SOURCE_DIGEST) {
        Ok(Some(stored)) => stored,
        _ => return,
    };
    match source.documents() {
        Ok(documents) if source_digest(&documents) != stored => warn!(
            "Source documents changed since the index was built; delete {} to rebuild",
            storage.path().parent().unwrap_or(storage.path()).display()
        ),
        Ok(_) => {}
        Err(e) => debug!("Skipping staleness check: {}", e),
    }
}
