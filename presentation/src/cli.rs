use application::orchestrator::{Orchestrator, OrchestratorConfig};
use application::prompt_composer::SECURITY_CONTEXT;
use application::retriever::Retriever;
use application::session_store::SessionStore;
use clap::Parser;
use colored::Colorize;
use domain::chunker::ChunkConfig;
use domain::models::Answer;
use domain::ports::GenerationProvider;
use infrastructure::config::{Config, DEFAULT_SESSION_ID};
use infrastructure::document_loader::DocumentLoader;
use infrastructure::ollama_client::OllamaClient;
use infrastructure::openai_client::OpenAiClient;
use infrastructure::vector_index::VectorIndex;
use shared::logging::init_logging;
use shared::types::Result;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "secbot")]
#[command(about = "AWS Security & Compliance chatbot with retrieval-augmented answers")]
pub struct Cli {
    /// Conversation key; turns are remembered per session for this run
    #[arg(long, default_value = DEFAULT_SESSION_ID)]
    pub session: String,

    /// Delete the persisted index and rebuild it from the data directory
    #[arg(long)]
    pub rebuild: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    pub verbose: bool,

    /// Ask a single question and exit; omit for interactive mode
    #[arg(trailing_var_arg = true)]
    pub question: Vec<String>,
}

pub struct CliApp {
    config: Config,
}

impl CliApp {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(&self, cli: Cli) -> Result<()> {
        let orchestrator = self.start(cli.rebuild).await?;
        let question = cli.question.join(" ");
        if question.trim().is_empty() {
            self.handle_chat(&orchestrator, &cli.session).await
        } else {
            let answer = orchestrator.ask(&cli.session, question.trim()).await;
            print_answer(&answer);
            Ok(())
        }
    }

    /// Everything that must succeed before the first question: documents,
    /// index and providers. Failures here abort the process.
    async fn start(&self, rebuild: bool) -> Result<Orchestrator> {
        let config = &self.config;
        let loader = DocumentLoader::new(&config.data_dir);
        loader.bootstrap_defaults()?;

        if rebuild && config.index_dir.exists() {
            info!("Removing {} for rebuild", config.index_dir.display());
            std::fs::remove_dir_all(&config.index_dir)?;
        }

        let chunk_config = ChunkConfig::new(config.chunk_size, config.chunk_overlap)?;
        let ollama = Arc::new(OllamaClient::from_config(config));
        let index = VectorIndex::build_or_load(
            &config.index_dir,
            &loader,
            &chunk_config,
            ollama.clone(),
        )
        .await?;

        let fallback = OpenAiClient::from_config(config).map(|client| {
            Arc::new(client.with_system_prompt(SECURITY_CONTEXT.trim())) as Arc<dyn GenerationProvider>
        });
        if fallback.is_none() {
            warn!("OPENAI_API_KEY is not set; answering without a fallback model");
        }

        Ok(Orchestrator::new(
            Retriever::new(Arc::new(index), config.top_k)?,
            Arc::new(SessionStore::new()),
            ollama,
            fallback,
            OrchestratorConfig {
                system_context: SECURITY_CONTEXT.to_string(),
                generation_timeout: config.generation_timeout,
            },
        ))
    }

    async fn handle_chat(&self, orchestrator: &Orchestrator, session_id: &str) -> Result<()> {
        use dialoguer::{theme::ColorfulTheme, Input};
        println!("{}", "AWS Security & Compliance Chatbot".bold());
        println!("Ask a compliance or security question. Type 'exit' to quit.");
        loop {
            let input: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Question")
                .allow_empty(true)
                .interact_text()?;
            let input = input.trim();
            if input.is_empty() {
                continue;
            }
            if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
                break;
            }
            let answer = orchestrator.ask(session_id, input).await;
            print_answer(&answer);
        }
        Ok(())
    }
}

fn print_answer(answer: &Answer) {
    let rendered = answer.render();
    if answer.is_failure() {
        println!("{}", rendered.red());
    } else if answer.is_fallback() {
        println!("{}", rendered.yellow());
    } else {
        println!("{}", rendered);
    }
}

/// Parse arguments, load configuration and run.
pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = Config::load()?;
    CliApp::new(config).run(cli).await
}
