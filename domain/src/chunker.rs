use crate::errors::{RagError, RagResult};
use crate::models::{Chunk, Document};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Fixed-size character windows with a fixed overlap between neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    max_chunk_length: usize,
    overlap_length: usize,
}

impl ChunkConfig {
    pub fn new(max_chunk_length: usize, overlap_length: usize) -> RagResult<Self> {
        if max_chunk_length == 0 {
            return Err(RagError::Config(
                "max_chunk_length must be greater than zero".to_string(),
            ));
        }
        if overlap_length >= max_chunk_length {
            return Err(RagError::Config(format!(
                "overlap_length ({}) must be smaller than max_chunk_length ({})",
                overlap_length, max_chunk_length
            )));
        }
        Ok(Self {
            max_chunk_length,
            overlap_length,
        })
    }

    pub fn max_chunk_length(&self) -> usize {
        self.max_chunk_length
    }

    pub fn overlap_length(&self) -> usize {
        self.overlap_length
    }

    fn step(&self) -> usize {
        self.max_chunk_length - self.overlap_length
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: DEFAULT_CHUNK_SIZE,
            overlap_length: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Split a document into overlapping chunks in document order.
///
/// Window starts advance by `max - overlap` characters and the window that
/// reaches the end of the text is the last one, so every consecutive pair
/// shares exactly `overlap` characters. An empty document yields no chunks.
pub fn chunk_document(document: &Document, config: &ChunkConfig) -> Vec<Chunk> {
    let text = document.text.as_str();
    // Byte offset of every char, plus the end, so slicing never splits UTF-8.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;
    if char_len == 0 {
        return Vec::new();
    }

    let estimated = char_len.saturating_sub(config.overlap_length) / config.step() + 1;
    let mut chunks = Vec::with_capacity(estimated);
    let mut start = 0;
    loop {
        let end = (start + config.max_chunk_length).min(char_len);
        chunks.push(Chunk {
            source: document.source.clone(),
            offset: start,
            text: text[boundaries[start]..boundaries[end]].to_string(),
        });
        if end == char_len {
            break;
        }
        start += config.step();
    }
    chunks
}

/// Chunk every document, preserving document order.
pub fn chunk_documents(documents: &[Document], config: &ChunkConfig) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| chunk_document(doc, config))
        .collect()
}
