use serde::{Deserialize, Serialize};

/// A source text loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub source: String,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// Contiguous slice of a document. `offset` counts characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source: String,
    pub offset: usize,
    pub text: String,
}

/// A chunk together with its embedding, as held by the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Which stage of the pipeline produced an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Primary { provider: String },
    Fallback { provider: String },
    Failed,
}

/// Text returned to the caller. Always present, even on total failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub outcome: Outcome,
}

impl Answer {
    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, Outcome::Fallback { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed)
    }

    /// Markdown shown to the user, labeled with the producing provider.
    pub fn render(&self) -> String {
        match &self.outcome {
            Outcome::Primary { provider } => format!("**{}:**\n\n{}", provider, self.text),
            Outcome::Fallback { provider } => {
                format!("**{} Fallback:**\n\n{}", provider, self.text)
            }
            Outcome::Failed => self.text.clone(),
        }
    }
}
