use anyhow::{ensure, Context};
use dotenvy::dotenv;
use shared::types::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SESSION_ID: &str = "sec-bot-ui";

#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_embed_model: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub data_dir: PathBuf,
    pub index_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub generation_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "qwen2.5:1.5b-instruct".to_string(),
            ollama_embed_model: "nomic-embed-text".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            data_dir: PathBuf::from("data"),
            index_dir: PathBuf::from("security_index"),
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 4,
            generation_timeout: Duration::from_secs(60),
            temperature: 0.2,
            max_tokens: 500,
        }
    }
}

impl Config {
    /// Read `.env` (if any) and the process environment.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let top_k = parse_or(&lookup, "RAG_TOP_K", defaults.top_k)?;
        ensure!(top_k >= 1, "invalid value for RAG_TOP_K: must be at least 1");
        let string_or = |key: &str, default: String| lookup(key).unwrap_or(default);

        Ok(Self {
            ollama_base_url: string_or("OLLAMA_BASE_URL", defaults.ollama_base_url),
            ollama_model: string_or("OLLAMA_MODEL", defaults.ollama_model),
            ollama_embed_model: string_or("OLLAMA_EMBED_MODEL", defaults.ollama_embed_model),
            openai_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            openai_base_url: string_or("OPENAI_BASE_URL", defaults.openai_base_url),
            openai_model: string_or("OPENAI_MODEL", defaults.openai_model),
            data_dir: lookup("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            index_dir: lookup("INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
            chunk_size: parse_or(&lookup, "CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_or(&lookup, "CHUNK_OVERLAP", defaults.chunk_overlap)?,
            top_k,
            generation_timeout: Duration::from_secs(parse_or(
                &lookup,
                "GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout.as_secs(),
            )?),
            temperature: parse_or(&lookup, "TEMPERATURE", defaults.temperature)?,
            max_tokens: parse_or(&lookup, "MAX_TOKENS", defaults.max_tokens)?,
        })
    }

    pub fn has_fallback(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
