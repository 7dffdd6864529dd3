//! End-to-end tests of the orchestrator with in-process fake providers.
//!
//! The fake embedder hashes words into a small bag-of-words vector, so
//! documents that share vocabulary with a query score highest under cosine.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use docqa::chunk::Chunker;
use docqa::config::Config;
use docqa::embedding::EmbeddingProvider;
use docqa::index::Metric;
use docqa::models::EmbeddingVector;
use docqa::orchestrator::{Orchestrator, OrchestratorOptions, OrchestratorState, FALLBACK_ANSWER};
use docqa::session::{Role, Session};
use docqa::store::{self, StalenessPolicy};
use docqa::synthesis::Synthesizer;
use docqa::{Error, ErrorKind};

const DIMS: usize = 32;

struct HashEmbedder {
    model: String,
    dims: usize,
    embedded: Arc<AtomicUsize>,
}

impl HashEmbedder {
    fn new(embedded: Arc<AtomicUsize>) -> Self {
        Self {
            model: "fake-hash".to_string(),
            dims: DIMS,
            embedded,
        }
    }
}

fn fnv1a(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> docqa::Result<Vec<EmbeddingVector>> {
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; self.dims];
                for word in t.split_whitespace() {
                    let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
                    if !word.is_empty() {
                        v[(fnv1a(&word) % self.dims as u64) as usize] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

/// Answers with the context it was given, so tests can see what was retrieved.
struct EchoSynthesizer;

#[async_trait]
impl Synthesizer for EchoSynthesizer {
    async fn synthesize(&self, context: &str, _question: &str) -> docqa::Result<Option<String>> {
        Ok(Some(format!("ANSWER FROM: {}", context)))
    }
}

struct BlankSynthesizer;

#[async_trait]
impl Synthesizer for BlankSynthesizer {
    async fn synthesize(&self, _context: &str, _question: &str) -> docqa::Result<Option<String>> {
        Ok(Some("   ".to_string()))
    }
}

struct DownSynthesizer;

#[async_trait]
impl Synthesizer for DownSynthesizer {
    async fn synthesize(&self, _context: &str, _question: &str) -> docqa::Result<Option<String>> {
        Err(Error::ServiceUnavailable("503 from provider".to_string()))
    }
}

/// Fails every request while `down` is set.
struct OutageEmbedder {
    inner: HashEmbedder,
    down: Arc<AtomicBool>,
}

#[async_trait]
impl EmbeddingProvider for OutageEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed_batch(&self, texts: &[String]) -> docqa::Result<Vec<EmbeddingVector>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::ServiceUnavailable("embeddings offline".to_string()));
        }
        self.inner.embed_batch(texts).await
    }
}

struct RejectingSynthesizer;

#[async_trait]
impl Synthesizer for RejectingSynthesizer {
    async fn synthesize(&self, _context: &str, _question: &str) -> docqa::Result<Option<String>> {
        Err(Error::Authentication("401 invalid api key".to_string()))
    }
}

fn options(root: &Path) -> OrchestratorOptions {
    OrchestratorOptions {
        corpus_dir: root.join("docs"),
        index_path: root.join("vectorstore").join("index.dqx"),
        staleness: StalenessPolicy::Explicit,
        metric: Metric::Cosine,
        chunker: Chunker::new(500, 100).unwrap(),
        top_k: 4,
    }
}

fn write_corpus(root: &Path) {
    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("alpha.txt"),
        "Rust programs are built with cargo and published as crates.",
    )
    .unwrap();
    fs::write(
        docs.join("beta.txt"),
        "Python notebooks train neural networks with pytorch.",
    )
    .unwrap();
}

fn orchestrator(
    opts: OrchestratorOptions,
    embedded: &Arc<AtomicUsize>,
    synthesizer: Box<dyn Synthesizer>,
) -> Orchestrator {
    Orchestrator::new(
        opts,
        Box::new(HashEmbedder::new(embedded.clone())),
        synthesizer,
    )
}

#[tokio::test]
async fn empty_corpus_reports_no_documents() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("docs")).unwrap();
    fs::write(tmp.path().join("docs").join("notes.md"), "unsupported").unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    assert_eq!(orch.state(), &OrchestratorState::Uninitialized);
    assert_eq!(orch.initialize().await, &OrchestratorState::NoDocuments);

    let err = orch.answer("anything?").await.unwrap_err();
    assert!(matches!(err, Error::NotReady(_)));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(!store::exists(&options(tmp.path()).index_path));
}

#[tokio::test]
async fn missing_corpus_dir_is_no_documents() {
    let tmp = TempDir::new().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    assert_eq!(orch.initialize().await, &OrchestratorState::NoDocuments);
}

#[tokio::test]
async fn answer_before_initialize_is_not_ready() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    assert!(matches!(
        orch.answer("cargo?").await,
        Err(Error::NotReady(_))
    ));
}

#[tokio::test]
async fn builds_persists_and_answers() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));

    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    assert!(orch.initialize().await.is_ready());
    assert_eq!(orch.index_len(), Some(2));
    assert!(store::exists(&options(tmp.path()).index_path));

    let hits = orch.search("cargo crates", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.source, "alpha.txt");

    let answer = orch.respond("How are Rust crates published with cargo?").await.unwrap();
    assert!(answer.text.starts_with("ANSWER FROM: Rust programs"));
    assert_eq!(answer.sources[0].metadata.source, "alpha.txt");
}

#[tokio::test]
async fn k_larger_than_index_returns_everything() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));

    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    orch.initialize().await;
    let hits = orch.search("pytorch", 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn second_run_loads_from_disk_with_identical_results() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());

    let first_counter = Arc::new(AtomicUsize::new(0));
    let mut first = orchestrator(options(tmp.path()), &first_counter, Box::new(EchoSynthesizer));
    first.initialize().await;
    let before = first.search("neural networks", 2).await.unwrap();

    let second_counter = Arc::new(AtomicUsize::new(0));
    let mut second =
        orchestrator(options(tmp.path()), &second_counter, Box::new(EchoSynthesizer));
    assert!(second.initialize().await.is_ready());
    assert_eq!(second_counter.load(Ordering::SeqCst), 0, "corpus was re-embedded");

    let after = second.search("neural networks", 2).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn explicit_policy_keeps_index_after_edit() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));
    orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer))
        .initialize()
        .await;

    fs::write(
        tmp.path().join("docs").join("gamma.txt"),
        "Kubernetes schedules containers.",
    )
    .unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    assert!(orch.initialize().await.is_ready());
    assert_eq!(orch.index_len(), Some(2));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn checksum_policy_rebuilds_after_edit() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let mut opts = options(tmp.path());
    opts.staleness = StalenessPolicy::Checksum;

    let counter = Arc::new(AtomicUsize::new(0));
    orchestrator(opts.clone(), &counter, Box::new(EchoSynthesizer))
        .initialize()
        .await;

    // Unchanged corpus: loaded, not rebuilt.
    let counter = Arc::new(AtomicUsize::new(0));
    orchestrator(opts.clone(), &counter, Box::new(EchoSynthesizer))
        .initialize()
        .await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    fs::write(
        tmp.path().join("docs").join("gamma.txt"),
        "Kubernetes schedules containers.",
    )
    .unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(opts, &counter, Box::new(EchoSynthesizer));
    assert!(orch.initialize().await.is_ready());
    assert_eq!(orch.index_len(), Some(3));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn invalidate_forces_rebuild() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));
    orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer))
        .initialize()
        .await;

    assert!(store::invalidate(&options(tmp.path()).index_path).unwrap());

    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    assert!(orch.initialize().await.is_ready());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rebuild_ignores_persisted_index() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    orch.initialize().await;
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    assert!(orch.rebuild().await.is_ready());
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn failed_rebuild_keeps_persisted_index() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));
    let down = Arc::new(AtomicBool::new(false));
    let mut orch = Orchestrator::new(
        options(tmp.path()),
        Box::new(OutageEmbedder {
            inner: HashEmbedder::new(counter.clone()),
            down: down.clone(),
        }),
        Box::new(EchoSynthesizer),
    );
    assert!(orch.initialize().await.is_ready());

    down.store(true, Ordering::SeqCst);
    match orch.rebuild().await {
        OrchestratorState::Failed { kind, .. } => {
            assert_eq!(*kind, ErrorKind::ServiceUnavailable)
        }
        other => panic!("expected failed rebuild, got {}", other),
    }
    assert!(store::exists(&options(tmp.path()).index_path));

    let reload_counter = Arc::new(AtomicUsize::new(0));
    let mut reloaded =
        orchestrator(options(tmp.path()), &reload_counter, Box::new(EchoSynthesizer));
    assert!(reloaded.initialize().await.is_ready());
    assert_eq!(reloaded.index_len(), Some(2));
    assert_eq!(reload_counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn model_change_triggers_rebuild() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));
    orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer))
        .initialize()
        .await;

    let counter = Arc::new(AtomicUsize::new(0));
    let mut embedder = HashEmbedder::new(counter.clone());
    embedder.model = "fake-hash-v2".to_string();
    let mut orch = Orchestrator::new(
        options(tmp.path()),
        Box::new(embedder),
        Box::new(EchoSynthesizer),
    );
    assert!(orch.initialize().await.is_ready());
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    let loaded = store::load(&options(tmp.path()).index_path, DIMS).unwrap();
    assert_eq!(loaded.info.model, "fake-hash-v2");
}

#[tokio::test]
async fn dimension_change_triggers_rebuild() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));
    orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer))
        .initialize()
        .await;

    let counter = Arc::new(AtomicUsize::new(0));
    let mut embedder = HashEmbedder::new(counter.clone());
    embedder.dims = 4;
    let mut orch = Orchestrator::new(
        options(tmp.path()),
        Box::new(embedder),
        Box::new(EchoSynthesizer),
    );
    assert!(orch.initialize().await.is_ready());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(orch.search("cargo", 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn corrupt_index_file_is_rebuilt() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let index_path = options(tmp.path()).index_path;
    fs::create_dir_all(index_path.parent().unwrap()).unwrap();
    fs::write(&index_path, b"definitely not an index").unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    assert!(orch.initialize().await.is_ready());
    assert!(store::load(&index_path, DIMS).is_ok());
}

#[tokio::test]
async fn long_document_is_split_into_overlapping_chunks() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    let text: String = (0..1200)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect();
    fs::write(docs.join("long.txt"), &text).unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    orch.initialize().await;
    assert_eq!(orch.index_len(), Some(3));
}

#[tokio::test]
async fn unreadable_document_is_skipped() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    fs::write(tmp.path().join("docs").join("broken.pdf"), b"%PDF-garbage").unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    assert!(orch.initialize().await.is_ready());
    assert_eq!(orch.index_len(), Some(2));
    assert_eq!(orch.load_failures().len(), 1);
    assert_eq!(orch.load_failures()[0].kind(), ErrorKind::UnreadableDocument);
}

#[tokio::test]
async fn corpus_with_only_unreadable_documents_fails() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("broken.docx"), b"not a zip").unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    match orch.initialize().await {
        OrchestratorState::Failed { kind, .. } => {
            assert_eq!(*kind, ErrorKind::UnreadableDocument)
        }
        other => panic!("expected failure, got {}", other),
    }
}

#[tokio::test]
async fn blank_synthesis_becomes_fallback() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(BlankSynthesizer));
    orch.initialize().await;
    assert_eq!(orch.answer("What is cargo?").await.unwrap(), FALLBACK_ANSWER);
}

#[tokio::test]
async fn ask_records_exchange_in_session() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(EchoSynthesizer));
    orch.initialize().await;

    let mut session = Session::new();
    let reply = orch.ask(&mut session, "What does cargo publish?").await;
    assert!(reply.error.is_none());
    assert!(!reply.sources.is_empty());
    assert_eq!(session.title, "What does cargo publish?");
    assert_eq!(session.history.len(), 2);
    assert_eq!(session.history[0].role, Role::User);
    assert_eq!(session.history[1].role, Role::Assistant);
    assert_eq!(session.history[1].content, reply.text);
}

#[tokio::test]
async fn ask_turns_provider_errors_into_a_reply() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(DownSynthesizer));
    orch.initialize().await;

    let mut session = Session::new();
    let reply = orch.ask(&mut session, "What does cargo publish?").await;
    assert_eq!(reply.error, Some(ErrorKind::ServiceUnavailable));
    assert!(!reply.text.is_empty());
    assert_eq!(session.history.len(), 2);

    // The orchestrator stays usable after a failed question.
    assert!(orch.state().is_ready());
    assert!(orch.search("cargo", 1).await.is_ok());
}

#[tokio::test]
async fn rejected_credentials_at_query_time_fail_the_orchestrator() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let counter = Arc::new(AtomicUsize::new(0));
    let mut orch = orchestrator(options(tmp.path()), &counter, Box::new(RejectingSynthesizer));
    assert!(orch.initialize().await.is_ready());

    let mut session = Session::new();
    let reply = orch.ask(&mut session, "What does cargo publish?").await;
    assert_eq!(reply.error, Some(ErrorKind::Authentication));
    assert!(reply.text.contains("OPENAI_API_KEY"), "reply={}", reply.text);

    match orch.state() {
        OrchestratorState::Failed { kind, message } => {
            assert_eq!(*kind, ErrorKind::Authentication);
            assert!(message.contains("OPENAI_API_KEY"));
        }
        other => panic!("expected authentication failure, got {}", other),
    }
    assert_eq!(orch.index_len(), None);
    assert!(matches!(
        orch.search("cargo", 1).await,
        Err(Error::NotReady(_))
    ));
}

#[tokio::test]
async fn missing_api_key_fails_initialization_with_authentication() {
    std::env::remove_var("OPENAI_API_KEY");
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());

    let mut config = Config::default();
    config.corpus.dir = tmp.path().join("docs");
    config.index.path = tmp.path().join("index.dqx");

    let mut orch = Orchestrator::from_config(&config).unwrap();
    match orch.initialize().await {
        OrchestratorState::Failed { kind, message } => {
            assert_eq!(*kind, ErrorKind::Authentication);
            assert!(message.contains("OPENAI_API_KEY"));
        }
        other => panic!("expected authentication failure, got {}", other),
    }
    assert!(matches!(
        orch.answer("hello").await,
        Err(Error::NotReady(_))
    ));
}

#[tokio::test]
async fn empty_corpus_wins_over_missing_api_key() {
    std::env::remove_var("OPENAI_API_KEY");
    let tmp = TempDir::new().unwrap();

    let mut config = Config::default();
    config.corpus.dir = tmp.path().join("docs");
    config.index.path = tmp.path().join("index.dqx");

    let mut orch = Orchestrator::from_config(&config).unwrap();
    assert_eq!(orch.initialize().await, &OrchestratorState::NoDocuments);
}
