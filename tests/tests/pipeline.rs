use application::orchestrator::{Orchestrator, OrchestratorConfig};
use application::prompt_composer::SECURITY_CONTEXT;
use application::retriever::Retriever;
use application::session_store::SessionStore;
use domain::chunker::ChunkConfig;
use domain::errors::RagError;
use domain::models::{Document, Outcome};
use domain::ports::GenerationProvider;
use domain::session::Role;
use infrastructure::document_loader::DocumentLoader;
use infrastructure::vector_index::{VectorIndex, INDEX_DB_FILE};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tests::{Behavior, DownEmbedder, LetterEmbedder, StubGenerator};
use tokio::sync::Notify;

fn compliance_docs() -> Vec<Document> {
    vec![
        Document::new("nist.txt", "AC-2 enforces least privilege via IAM."),
        Document::new("cis.txt", "Disable root SSH logins and enable auditd."),
        Document::new("cm.txt", "CM-2 baselines live in Systems Manager."),
    ]
}

async fn index_at(dir: &Path, docs: &Vec<Document>) -> Arc<VectorIndex> {
    Arc::new(
        VectorIndex::build_or_load(
            dir.join("security_index"),
            docs,
            &ChunkConfig::default(),
            LetterEmbedder::new(),
        )
        .await
        .unwrap(),
    )
}

fn bot(
    index: Arc<VectorIndex>,
    primary: Arc<StubGenerator>,
    fallback: Option<Arc<StubGenerator>>,
) -> Orchestrator {
    Orchestrator::new(
        Retriever::with_default_k(index),
        Arc::new(SessionStore::new()),
        primary,
        fallback.map(|f| f as Arc<dyn GenerationProvider>),
        OrchestratorConfig {
            system_context: SECURITY_CONTEXT.to_string(),
            generation_timeout: Duration::from_millis(250),
        },
    )
}

#[tokio::test]
async fn answers_with_retrieved_context_in_prompt() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = vec![Document::new(
        "nist.txt",
        "AC-2 enforces least privilege via IAM.",
    )];
    let primary = StubGenerator::replying("ollama", "AC-2 is account management.");
    let bot = bot(index_at(tmp.path(), &docs).await, primary.clone(), None);

    let answer = bot.ask("sec-bot-ui", "What is AC-2?").await;
    assert_eq!(answer.render(), "**ollama:**\n\nAC-2 is account management.");

    let prompt = &primary.prompts()[0];
    let system_at = prompt.find("AWS Security & Compliance expert").unwrap();
    let chunk_at = prompt.find("AC-2 enforces least privilege via IAM.").unwrap();
    let question_at = prompt.find("Question: What is AC-2?").unwrap();
    assert!(system_at < chunk_at && chunk_at < question_at);
}

#[tokio::test]
async fn retrieval_returns_at_most_k_chunks() {
    let tmp = tempfile::tempdir().unwrap();
    let docs: Vec<Document> = (0..10)
        .map(|i| Document::new(format!("doc{i}.txt"), format!("control number {i} text")))
        .collect();
    let index = index_at(tmp.path(), &docs).await;
    let retriever = Retriever::with_default_k(index.clone());
    let first = retriever.retrieve("control text").await.unwrap();
    assert_eq!(first.len(), 4);
    assert_eq!(first, retriever.retrieve("control text").await.unwrap());
}

#[tokio::test]
async fn unreachable_embeddings_fail_the_build() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("security_index");
    let result = VectorIndex::build_or_load(
        &path,
        &compliance_docs(),
        &ChunkConfig::default(),
        Arc::new(DownEmbedder),
    )
    .await;
    assert!(matches!(result, Err(RagError::Provider(_))));
    assert!(!path.exists());
}

#[tokio::test]
async fn retrieval_failure_is_reported_as_text() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("security_index");
    VectorIndex::build_or_load(&path, &compliance_docs(), &ChunkConfig::default(), LetterEmbedder::new())
        .await
        .unwrap();
    // Same persisted index, but the embedding service is now down.
    let index = VectorIndex::build_or_load(&path, &compliance_docs(), &ChunkConfig::default(), Arc::new(DownEmbedder))
        .await
        .unwrap();
    let primary = StubGenerator::replying("ollama", "unused");
    let bot = bot(Arc::new(index), primary.clone(), None);

    let answer = bot.ask("s", "AC-2?").await;
    assert!(answer.is_failure());
    assert!(answer.text.contains("connection refused"));
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn refusal_goes_to_fallback_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    let primary = StubGenerator::replying("ollama", "I'm UNABLE to respond to that.");
    let fallback = StubGenerator::replying("openai", "Map AC-2 to IAM Access Analyzer.");
    let bot = bot(
        index_at(tmp.path(), &compliance_docs()).await,
        primary.clone(),
        Some(fallback.clone()),
    );

    let answer = bot.ask("s", "AC-2?").await;
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
    assert_eq!(
        answer.outcome,
        Outcome::Fallback {
            provider: "openai".to_string()
        }
    );
    assert!(answer.render().starts_with("**openai Fallback:**"));
}

#[tokio::test]
async fn both_providers_failing_still_returns_text() {
    let tmp = tempfile::tempdir().unwrap();
    let primary = StubGenerator::failing("ollama", "quota exceeded");
    let fallback = StubGenerator::failing("openai", "invalid api key");
    let bot = bot(
        index_at(tmp.path(), &compliance_docs()).await,
        primary,
        Some(fallback),
    );

    let answer = bot.ask("s", "AC-2?").await;
    assert!(answer.is_failure());
    assert!(answer.text.contains("Both models failed"));
    assert!(answer.text.contains("quota exceeded"));
    assert!(answer.text.contains("invalid api key"));
    assert_eq!(answer.render(), answer.text);
}

#[tokio::test]
async fn fallback_timeout_fails_with_labeled_text() {
    let tmp = tempfile::tempdir().unwrap();
    let primary = StubGenerator::new("ollama", Behavior::Hang);
    let fallback = StubGenerator::new("openai", Behavior::Hang);
    let bot = bot(
        index_at(tmp.path(), &compliance_docs()).await,
        primary,
        Some(fallback),
    );

    let answer = bot.ask("s", "AC-2?").await;
    assert!(answer.is_failure());
    assert!(answer.text.contains("ollama timed out"));
    assert!(answer.text.contains("openai timed out"));
}

#[tokio::test]
async fn concurrent_questions_on_one_session_keep_every_exchange() {
    let tmp = tempfile::tempdir().unwrap();
    let primary = StubGenerator::new("ollama", Behavior::EchoQuestion);
    let bot = Arc::new(bot(index_at(tmp.path(), &compliance_docs()).await, primary, None));

    let mut handles = Vec::new();
    for i in 0..12 {
        let bot = bot.clone();
        handles.push(tokio::spawn(async move {
            bot.ask("shared", &format!("question {i}")).await
        }));
    }
    for handle in handles {
        assert!(!handle.await.unwrap().is_failure());
    }

    let history = bot.sessions().history("shared").await;
    assert_eq!(history.len(), 24);
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        // each answer sits right after its own question
        assert_eq!(pair[0].content, pair[1].content);
    }
}

#[tokio::test]
async fn slow_session_does_not_block_another() {
    let tmp = tempfile::tempdir().unwrap();
    let release = Arc::new(Notify::new());
    let primary = StubGenerator::new("ollama", Behavior::WaitFor(release.clone(), "done".to_string()));
    let orchestrator = Orchestrator::new(
        Retriever::with_default_k(index_at(tmp.path(), &compliance_docs()).await),
        Arc::new(SessionStore::new()),
        primary,
        None,
        OrchestratorConfig {
            generation_timeout: Duration::from_secs(10),
            ..OrchestratorConfig::default()
        },
    );
    let bot = Arc::new(orchestrator);

    let slow = {
        let bot = bot.clone();
        tokio::spawn(async move { bot.ask("a", "slow question").await })
    };
    // Give session "a" time to take its lock and start waiting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let b = bot.sessions().get_or_create("b");
    assert!(b.try_lock().is_ok(), "session b must not be blocked by session a");
    let a = bot.sessions().get_or_create("a");
    assert!(a.try_lock().is_err(), "session a is held while generating");

    release.notify_one();
    let answer = slow.await.unwrap();
    assert_eq!(answer.text, "done");
}

#[tokio::test]
async fn index_from_data_directory_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let loader = DocumentLoader::new(tmp.path().join("data"));
    loader.bootstrap_defaults().unwrap();
    let path = tmp.path().join("security_index");
    let config = ChunkConfig::new(60, 10).unwrap();

    let first_provider = LetterEmbedder::new();
    let first = VectorIndex::build_or_load(&path, &loader, &config, first_provider.clone())
        .await
        .unwrap();
    let count = first.len().await;
    assert_eq!(first_provider.calls(), count);
    drop(first);
    let bytes = std::fs::read(path.join(INDEX_DB_FILE)).unwrap();

    let second_provider = LetterEmbedder::new();
    let second = VectorIndex::build_or_load(&path, &loader, &config, second_provider.clone())
        .await
        .unwrap();
    assert_eq!(second.len().await, count);
    assert_eq!(second_provider.calls(), 0);
    drop(second);
    assert_eq!(std::fs::read(path.join(INDEX_DB_FILE)).unwrap(), bytes);
}

#[tokio::test]
async fn changed_sources_do_not_trigger_a_rebuild() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("security_index");
    let first = VectorIndex::build_or_load(&path, &compliance_docs(), &ChunkConfig::default(), LetterEmbedder::new())
        .await
        .unwrap();
    let count = first.len().await;
    drop(first);

    let mut more = compliance_docs();
    more.push(Document::new("fedramp.txt", "FedRAMP moderate baseline."));
    let provider = LetterEmbedder::new();
    let reloaded = VectorIndex::build_or_load(&path, &more, &ChunkConfig::default(), provider.clone())
        .await
        .unwrap();
    assert_eq!(reloaded.len().await, count);
    assert_eq!(provider.calls(), 0);
}
