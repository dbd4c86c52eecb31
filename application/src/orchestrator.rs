//! Question answering pipeline.
//!
//! ```text
//! RETRIEVING -> COMPOSING -> GENERATING_PRIMARY -> DONE
//!                                  |
//!                       (error / degenerate answer)
//!                                  v
//!                         GENERATING_FALLBACK -> DONE | FAILED
//! ```
//!
//! `ask` always returns an [`Answer`]; failures are reported inside its
//! text and logged, never raised to the caller.

use domain::errors::ProviderError;
use domain::models::{Answer, Outcome};
use domain::ports::GenerationProvider;
use domain::session::{Message, Session};
use shared::telemetry::Telemetry;
use shared::utils::preview;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::prompt_composer::{compose, SECURITY_CONTEXT};
use crate::retriever::Retriever;
use crate::session_store::SessionStore;

/// Substring (case-insensitive) that marks a refusal from the primary model.
pub const UNABLE_TO_RESPOND_MARKER: &str = "unable to respond";

/// Heuristic refusal check used to trigger the fallback model.
///
/// Fragile by nature: a legitimate answer that happens to contain the
/// marker phrase is treated as a refusal too.
pub fn is_degenerate(text: &str) -> bool {
    text.trim().is_empty() || text.to_lowercase().contains(UNABLE_TO_RESPOND_MARKER)
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub system_context: String,
    /// Upper bound on a single provider call
    pub generation_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_context: SECURITY_CONTEXT.to_string(),
            generation_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Retrieving,
    Composing,
    GeneratingPrimary,
    GeneratingFallback,
    Done,
    Failed,
}

/// Why a single generation attempt did not produce a usable answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    Provider(ProviderError),
    Degenerate { text: String },
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Provider(e) => write!(f, "{}", e),
            AttemptError::Degenerate { text } if text.trim().is_empty() => {
                write!(f, "empty answer")
            }
            AttemptError::Degenerate { text } => {
                write!(f, "unable to respond: {:?}", preview(text.trim(), 80))
            }
        }
    }
}

pub struct Orchestrator {
    retriever: Retriever,
    sessions: Arc<SessionStore>,
    primary: Arc<dyn GenerationProvider>,
    fallback: Option<Arc<dyn GenerationProvider>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// `fallback: None` runs in single-provider mode.
    pub fn new(
        retriever: Retriever,
        sessions: Arc<SessionStore>,
        primary: Arc<dyn GenerationProvider>,
        fallback: Option<Arc<dyn GenerationProvider>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            retriever,
            sessions,
            primary,
            fallback,
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub async fn ask(&self, session_id: &str, question: &str) -> Answer {
        let telemetry = Telemetry::new();
        transition(session_id, Stage::Retrieving);
        let chunks = match self.retriever.retrieve(question).await {
            Ok(chunks) => chunks,
            Err(e) => {
                error!(session = session_id, "Retrieval failed: {}", e);
                transition(session_id, Stage::Failed);
                return Answer {
                    text: format!("Retrieval failed: {}", e),
                    outcome: Outcome::Failed,
                };
            }
        };

        // Held until the exchange is recorded: reading history and appending
        // to it form one unit per session.
        let session = self.sessions.get_or_create(session_id);
        let mut session = session.lock().await;

        transition(session_id, Stage::Composing);
        transition(session_id, Stage::GeneratingPrimary);
        let primary_error = match self
            .attempt(self.primary.as_ref(), &chunks, &session, question)
            .await
        {
            Ok(text) => {
                return self.finish(
                    &mut session,
                    question,
                    text,
                    Outcome::Primary {
                        provider: self.primary.name().to_string(),
                    },
                    &telemetry,
                );
            }
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            error!(
                session = session_id,
                provider = self.primary.name(),
                "Model failed: {}",
                primary_error
            );
            transition(session_id, Stage::Failed);
            return Answer {
                text: format!("Model failed ({}): {}", self.primary.name(), primary_error),
                outcome: Outcome::Failed,
            };
        };

        warn!(
            session = session_id,
            "[Fallback] {} failed: {}; switching to {}",
            self.primary.name(),
            primary_error,
            fallback.name()
        );
        transition(session_id, Stage::GeneratingFallback);
        match self
            .attempt(fallback.as_ref(), &chunks, &session, question)
            .await
        {
            Ok(text) => self.finish(
                &mut session,
                question,
                text,
                Outcome::Fallback {
                    provider: fallback.name().to_string(),
                },
                &telemetry,
            ),
            Err(fallback_error) => {
                error!(
                    session = session_id,
                    "Both models failed: primary: {}; fallback: {}",
                    primary_error,
                    fallback_error
                );
                transition(session_id, Stage::Failed);
                Answer {
                    text: format!(
                        "Both models failed: primary ({}): {}; fallback ({}): {}",
                        self.primary.name(),
                        primary_error,
                        fallback.name(),
                        fallback_error
                    ),
                    outcome: Outcome::Failed,
                }
            }
        }
    }

    /// One provider call, bounded by the configured timeout.
    async fn attempt(
        &self,
        provider: &dyn GenerationProvider,
        chunks: &[String],
        session: &Session,
        question: &str,
    ) -> Result<String, AttemptError> {
        let system_context = if provider.sends_system_prompt() {
            ""
        } else {
            self.config.system_context.as_str()
        };
        let (prompt, history): (String, &[Message]) = if provider.supports_native_history() {
            (
                compose(system_context, chunks, &[], question),
                session.history.as_slice(),
            )
        } else {
            (
                compose(system_context, chunks, &session.history, question),
                &[] as &[Message],
            )
        };

        let telemetry = Telemetry::new();
        let result = tokio::time::timeout(
            self.config.generation_timeout,
            provider.generate(&prompt, history),
        )
        .await;
        debug!(
            provider = provider.name(),
            elapsed_ms = telemetry.elapsed_ms(),
            "generation attempt finished"
        );

        let text = match result {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(AttemptError::Provider(e)),
            Err(_) => {
                return Err(AttemptError::Provider(ProviderError::Timeout {
                    provider: provider.name().to_string(),
                    after: self.config.generation_timeout,
                }))
            }
        };
        if is_degenerate(&text) {
            return Err(AttemptError::Degenerate { text });
        }
        Ok(text.trim().to_string())
    }

    fn finish(
        &self,
        session: &mut Session,
        question: &str,
        text: String,
        outcome: Outcome,
        telemetry: &Telemetry,
    ) -> Answer {
        session.record_exchange(question, &text);
        transition(&session.id, Stage::Done);
        info!(
            session = %session.id,
            outcome = ?outcome,
            elapsed_ms = telemetry.elapsed_ms(),
            "answered question"
        );
        Answer { text, outcome }
    }
}

fn transition(session_id: &str, stage: Stage) {
    debug!(session = session_id, stage = ?stage, "pipeline transition");
}
