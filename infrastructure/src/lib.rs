pub mod config;
pub mod document_loader;
pub mod embedder;
pub mod embedding_storage;
pub mod ollama_client;
pub mod openai_client;
pub mod search;
pub mod vector_index;
