//! Retrieval-augmented answering orchestrator.
//!
//! Owns the index lifecycle and the per-question answer path.
//!
//! ```text
//!                  ┌──────────────┐
//!                  │Uninitialized │
//!                  └──────┬───────┘
//!        no docs ┌────────┼─────────────┐ error
//!                ▼        ▼             ▼
//!        ┌───────────┐ ┌────────┐ ┌────────┐
//!        │NoDocuments│ │Indexing│ │ Failed │
//!        └───────────┘ └───┬────┘ └────────┘
//!                          ▼  (or index loaded from disk)
//!                      ┌───────┐
//!                      │ Ready │
//!                      └───────┘
//! ```
//!
//! Build path: list corpus → load → chunk → embed → build → save.
//! Query path: embed question → top-k search → join context → synthesize.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::chunk::Chunker;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Error, ErrorKind, Result};
use crate::index::{Metric, VectorIndex};
use crate::loader;
use crate::models::{IndexEntry, SearchHit};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress};
use crate::session::{Role, Session};
use crate::store::{self, IndexInfo, StalenessPolicy};
use crate::synthesis::{self, Synthesizer};

/// Returned in place of an empty synthesizer response.
pub const FALLBACK_ANSWER: &str =
    "I could not find an answer to that question in the provided documents.";

/// Chunks embedded per progress update during a build.
const EMBED_PROGRESS_STEP: usize = 256;

/// Lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrchestratorState {
    Uninitialized,
    Indexing,
    Ready,
    /// No supported files in the corpus directory.
    NoDocuments,
    /// Initialization failed; `kind` tells configuration and credential
    /// problems apart from everything else.
    Failed { kind: ErrorKind, message: String },
}

impl OrchestratorState {
    pub fn is_ready(&self) -> bool {
        matches!(self, OrchestratorState::Ready)
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestratorState::Uninitialized => f.write_str("uninitialized"),
            OrchestratorState::Indexing => f.write_str("indexing"),
            OrchestratorState::Ready => f.write_str("ready"),
            OrchestratorState::NoDocuments => f.write_str("no_documents"),
            OrchestratorState::Failed { kind, message } => {
                write!(f, "failed ({}): {}", kind, message)
            }
        }
    }
}

/// Everything the orchestrator needs besides its providers.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub corpus_dir: PathBuf,
    pub index_path: PathBuf,
    pub staleness: StalenessPolicy,
    pub metric: Metric,
    pub chunker: Chunker,
    pub top_k: usize,
}

impl OrchestratorOptions {
    /// Fails with [`Error::Configuration`] on invalid chunking or `top_k`.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.retrieval.top_k == 0 {
            return Err(Error::Configuration(
                "retrieval.top_k must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            corpus_dir: config.corpus.dir.clone(),
            index_path: config.index.path.clone(),
            staleness: config.index.staleness,
            metric: config.index.metric,
            chunker: config.chunking.chunker()?,
            top_k: config.retrieval.top_k,
        })
    }
}

/// An answer plus the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SearchHit>,
}

/// What [`Orchestrator::ask`] hands back to a chat front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub text: String,
    pub sources: Vec<SearchHit>,
    /// Set when the question could not be answered because of an error.
    pub error: Option<ErrorKind>,
}

struct Providers {
    embedder: Box<dyn EmbeddingProvider>,
    synthesizer: Box<dyn Synthesizer>,
}

pub struct Orchestrator {
    options: OrchestratorOptions,
    // Provider construction errors (e.g. a missing API key) are held until
    // initialize() so an empty corpus still reports NoDocuments.
    providers: std::result::Result<Providers, Error>,
    progress: Box<dyn IndexProgressReporter>,
    state: OrchestratorState,
    index: Option<VectorIndex>,
    load_failures: Vec<Error>,
}

impl Orchestrator {
    pub fn new(
        options: OrchestratorOptions,
        embedder: Box<dyn EmbeddingProvider>,
        synthesizer: Box<dyn Synthesizer>,
    ) -> Self {
        Self::with_providers(
            options,
            Ok(Providers {
                embedder,
                synthesizer,
            }),
        )
    }

    /// Build an orchestrator with the providers named in `config`.
    ///
    /// Only invalid options fail here; provider errors surface from
    /// [`initialize`](Self::initialize) as a `Failed` state.
    pub fn from_config(config: &Config) -> Result<Self> {
        let options = OrchestratorOptions::from_config(config)?;
        let providers = embedding::create_provider(&config.embedding).and_then(|embedder| {
            Ok(Providers {
                embedder,
                synthesizer: synthesis::create_synthesizer(&config.synthesis)?,
            })
        });
        Ok(Self::with_providers(options, providers))
    }

    fn with_providers(
        options: OrchestratorOptions,
        providers: std::result::Result<Providers, Error>,
    ) -> Self {
        Self {
            options,
            providers,
            progress: Box::new(NoProgress),
            state: OrchestratorState::Uninitialized,
            index: None,
            load_failures: Vec::new(),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn IndexProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Per-file errors from the most recent build.
    pub fn load_failures(&self) -> &[Error] {
        &self.load_failures
    }

    /// Number of entries in the active index, if ready.
    pub fn index_len(&self) -> Option<usize> {
        self.index.as_ref().map(|i| i.len())
    }

    /// Bring the orchestrator to `Ready`, `NoDocuments`, or `Failed`.
    ///
    /// Loads the persisted index when one exists; builds and saves a new
    /// one otherwise.
    pub async fn initialize(&mut self) -> &OrchestratorState {
        self.start(false).await
    }

    /// Build a fresh index, ignoring any persisted one.
    ///
    /// The persisted file is replaced only once the new index is saved.
    pub async fn rebuild(&mut self) -> &OrchestratorState {
        self.start(true).await
    }

    async fn start(&mut self, force: bool) -> &OrchestratorState {
        self.index = None;
        let next = match self.bring_up(force).await {
            Ok(Some(index)) => {
                info!(entries = index.len(), "index ready");
                self.index = Some(index);
                OrchestratorState::Ready
            }
            Ok(None) => {
                info!(dir = %self.options.corpus_dir.display(), "no documents in corpus");
                OrchestratorState::NoDocuments
            }
            Err(e) => {
                warn!(error = %e, "initialization failed");
                OrchestratorState::Failed {
                    kind: e.kind(),
                    message: failure_message(&e),
                }
            }
        };
        self.state = next;
        &self.state
    }

    /// `Ok(None)` means the corpus has no supported documents.
    async fn bring_up(&mut self, force: bool) -> Result<Option<VectorIndex>> {
        let files = loader::list_supported(&self.options.corpus_dir)?;
        if files.is_empty() {
            return Ok(None);
        }

        let providers = match &self.providers {
            Ok(p) => p,
            Err(e) => return Err(clone_error(e)),
        };
        let path = self.options.index_path.clone();

        // A forced rebuild leaves the old file in place until save()
        // replaces it, so a failed build keeps the previous index.
        if !force && store::exists(&path) {
            match self.load_existing(providers, &files) {
                Ok(Some(index)) => return Ok(Some(index)),
                Ok(None) => info!("persisted index is stale, rebuilding"),
                Err(e @ Error::CorruptIndex { .. }) => {
                    warn!(error = %e, "persisted index unusable, rebuilding")
                }
                Err(e) => return Err(e),
            }
        }

        self.state = OrchestratorState::Indexing;
        info!(
            files = files.len(),
            max_chars = self.options.chunker.max_chunk_size(),
            overlap_chars = self.options.chunker.overlap_size(),
            "building index"
        );
        let (index, failures) = build_index(&self.options, providers, &files, &*self.progress).await?;
        self.load_failures = failures;

        let info = IndexInfo {
            model: providers.embedder.model_name().to_string(),
            corpus_fingerprint: Some(store::corpus_fingerprint(&files)?),
        };
        self.progress.report(IndexProgressEvent::Persisting {
            entries: index.len() as u64,
        });
        store::save(&index, &path, &info)?;
        Ok(Some(index))
    }

    /// `Ok(None)` when the index is valid on disk but stale under the
    /// checksum policy.
    fn load_existing(
        &self,
        providers: &Providers,
        files: &[PathBuf],
    ) -> Result<Option<VectorIndex>> {
        let path = &self.options.index_path;
        let loaded = store::load(path, providers.embedder.dims())?;

        if loaded.info.model != providers.embedder.model_name() {
            return Err(Error::CorruptIndex {
                path: path.clone(),
                reason: format!(
                    "index was built with model {} but {} is configured",
                    loaded.info.model,
                    providers.embedder.model_name()
                ),
            });
        }

        if self.options.staleness == StalenessPolicy::Checksum {
            let current = store::corpus_fingerprint(files)?;
            if loaded.info.corpus_fingerprint.as_deref() != Some(current.as_str()) {
                return Ok(None);
            }
        }

        info!(
            entries = loaded.index.len(),
            built_at = %loaded.built_at,
            "loaded persisted index"
        );
        Ok(Some(loaded.index))
    }

    fn ready(&self) -> Result<(&VectorIndex, &Providers)> {
        match (&self.state, &self.index, &self.providers) {
            (OrchestratorState::Ready, Some(index), Ok(providers)) => Ok((index, providers)),
            _ => Err(Error::NotReady(self.state.to_string())),
        }
    }

    /// Top-`k` chunks for `query`, nearest-first.
    pub async fn search(&mut self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let result = self.nearest(query, k).await;
        self.settle(result)
    }

    /// Answer `query` from the top-k retrieved chunks, with sources.
    ///
    /// A rejected credential moves the orchestrator to `Failed`; other
    /// errors leave it `Ready`.
    pub async fn respond(&mut self, query: &str) -> Result<Answer> {
        let result = self.compose(query).await;
        self.settle(result)
    }

    /// Answer `query`. Only valid in `Ready`; never returns an empty string.
    pub async fn answer(&mut self, query: &str) -> Result<String> {
        self.respond(query).await.map(|a| a.text)
    }

    async fn nearest(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let (index, providers) = self.ready()?;
        let query_vec = providers.embedder.embed(query).await?;
        index.search(&query_vec, k)
    }

    async fn compose(&self, query: &str) -> Result<Answer> {
        let (_, providers) = self.ready()?;
        let hits = self.nearest(query, self.options.top_k).await?;
        let context = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let text = match providers.synthesizer.synthesize(&context, query).await? {
            Some(text) if !text.trim().is_empty() => text,
            _ => FALLBACK_ANSWER.to_string(),
        };
        Ok(Answer {
            text,
            sources: hits,
        })
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.kind() == ErrorKind::Authentication {
                warn!(error = %e, "credentials rejected, index unloaded");
                self.index = None;
                self.state = OrchestratorState::Failed {
                    kind: ErrorKind::Authentication,
                    message: failure_message(e),
                };
            }
        }
        result
    }

    /// Answer `query` inside a caller-owned session.
    ///
    /// Errors are turned into a user-visible reply rather than returned, so
    /// a failed question never ends the conversation.
    pub async fn ask(&mut self, session: &mut Session, query: &str) -> Reply {
        session.push(Role::User, query);
        let reply = match self.respond(query).await {
            Ok(answer) => Reply {
                text: answer.text,
                sources: answer.sources,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "question failed");
                Reply {
                    text: format!("Sorry, I couldn't answer that: {}", failure_message(&e)),
                    sources: Vec::new(),
                    error: Some(e.kind()),
                }
            }
        };
        session.push(Role::Assistant, &reply.text);
        reply
    }
}

async fn build_index(
    options: &OrchestratorOptions,
    providers: &Providers,
    files: &[PathBuf],
    progress: &dyn IndexProgressReporter,
) -> Result<(VectorIndex, Vec<Error>)> {
    progress.report(IndexProgressEvent::Loading {
        files: files.len() as u64,
    });
    let report = loader::load_documents(&options.corpus_dir)?;
    for failure in &report.failures {
        warn!(error = %failure, "document skipped");
    }

    progress.report(IndexProgressEvent::Chunking {
        records: report.records.len() as u64,
    });
    let chunks = options.chunker.chunk_records(&report.records);
    if chunks.is_empty() {
        return Err(Error::UnreadableDocument {
            source_file: options.corpus_dir.display().to_string(),
            reason: format!(
                "no readable content found in {} document(s)",
                files.len()
            ),
        });
    }

    let total = chunks.len() as u64;
    let mut entries = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(EMBED_PROGRESS_STEP) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = providers.embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(Error::ServiceUnavailable(format!(
                "embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            )));
        }
        for (chunk, vector) in batch.iter().zip(vectors) {
            entries.push(IndexEntry {
                vector,
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            });
        }
        progress.report(IndexProgressEvent::Embedding {
            n: entries.len() as u64,
            total,
        });
    }

    let index = VectorIndex::build(providers.embedder.dims(), options.metric, entries)?;
    Ok((index, report.failures))
}

/// User-facing text for a failure, with guidance for credential problems.
fn failure_message(e: &Error) -> String {
    match e {
        Error::Authentication(detail) => format!(
            "OpenAI API key required. Set {} in your environment and restart. ({})",
            crate::openai::API_KEY_ENV,
            detail
        ),
        other => other.to_string(),
    }
}

/// Provider errors are stored once and reported on every initialize call.
fn clone_error(e: &Error) -> Error {
    match e {
        Error::UnreadableDocument {
            source_file,
            reason,
        } => Error::UnreadableDocument {
            source_file: source_file.clone(),
            reason: reason.clone(),
        },
        Error::Configuration(m) => Error::Configuration(m.clone()),
        Error::RateLimit(m) => Error::RateLimit(m.clone()),
        Error::ServiceUnavailable(m) => Error::ServiceUnavailable(m.clone()),
        Error::Authentication(m) => Error::Authentication(m.clone()),
        Error::DimensionMismatch { expected, actual } => Error::DimensionMismatch {
            expected: *expected,
            actual: *actual,
        },
        Error::CorruptIndex { path, reason } => Error::CorruptIndex {
            path: path.clone(),
            reason: reason.clone(),
        },
        Error::NotReady(m) => Error::NotReady(m.clone()),
        Error::Synthesis(m) => Error::Synthesis(m.clone()),
        Error::Io(io) => Error::Io(std::io::Error::new(io.kind(), io.to_string())),
    }
}
