//! CLI command implementations.
//!
//! Each `run_*` function backs one `docqa` subcommand. Results go to stdout;
//! diagnostics and progress go to stderr.

use std::path::Path;

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::models::SearchHit;
use crate::orchestrator::{Orchestrator, OrchestratorState, Reply};
use crate::progress::ProgressMode;
use crate::relevance::RelevanceGate;
use crate::session::Session;
use crate::store;

/// Printed instead of an answer when the relevance gate rejects a question.
pub const OFF_TOPIC_REPLY: &str =
    "That question does not appear to relate to the indexed documents. Please ask about their content.";

async fn open(config: &Config, progress: ProgressMode) -> Result<Orchestrator> {
    let mut orchestrator = Orchestrator::from_config(config)?.with_progress(progress.reporter());
    orchestrator.initialize().await;
    Ok(orchestrator)
}

/// Bail unless the orchestrator reached `Ready`.
fn require_ready(orchestrator: &Orchestrator) -> Result<()> {
    match orchestrator.state() {
        OrchestratorState::Ready => Ok(()),
        OrchestratorState::NoDocuments => bail!(
            "No documents to answer from. Add .txt, .pdf, or .docx files to {}",
            orchestrator.options().corpus_dir.display()
        ),
        other => bail!("Index is not ready: {}", other),
    }
}

fn print_failures(orchestrator: &Orchestrator) {
    let failures = orchestrator.load_failures();
    if failures.is_empty() {
        return;
    }
    println!("  skipped documents: {}", failures.len());
    for failure in failures {
        println!("    - {}", failure);
    }
}

pub async fn run_status(config: &Config, progress: ProgressMode) -> Result<()> {
    let orchestrator = open(config, progress).await?;
    let options = orchestrator.options();

    println!("status");
    println!("  corpus: {}", options.corpus_dir.display());
    println!("  index: {}", options.index_path.display());
    println!("  state: {}", orchestrator.state());
    if let Some(n) = orchestrator.index_len() {
        println!("  entries: {}", n);
    }
    print_failures(&orchestrator);

    if let OrchestratorState::Failed { kind, .. } = orchestrator.state() {
        bail!("initialization failed ({})", kind);
    }
    Ok(())
}

pub async fn run_index(config: &Config, force: bool, progress: ProgressMode) -> Result<()> {
    let mut orchestrator = Orchestrator::from_config(config)?.with_progress(progress.reporter());
    if force {
        orchestrator.rebuild().await;
    } else {
        orchestrator.initialize().await;
    }

    if *orchestrator.state() == OrchestratorState::NoDocuments {
        println!("index");
        println!("  no documents in {}", config.corpus.dir.display());
        return Ok(());
    }
    require_ready(&orchestrator)?;

    println!("index");
    println!("  path: {}", config.index.path.display());
    println!("  entries: {}", orchestrator.index_len().unwrap_or(0));
    print_failures(&orchestrator);
    Ok(())
}

pub fn run_invalidate(config: &Config) -> Result<()> {
    let removed = store::invalidate(&config.index.path)?;
    println!("invalidate");
    if removed {
        println!("  removed {}", config.index.path.display());
    } else {
        println!("  no index at {}", config.index.path.display());
    }
    Ok(())
}

pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let mut orchestrator = open(config, progress).await?;
    require_ready(&orchestrator)?;

    let k = k.unwrap_or(config.retrieval.top_k);
    let hits = orchestrator.search(query, k).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_hits(&hits);
    Ok(())
}

fn print_hits(hits: &[SearchHit]) {
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, hit.score, hit.metadata);
        println!("    excerpt: \"{}\"", excerpt(&hit.text));
        println!();
    }
}

fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    let mut out: String = flat.chars().take(200).collect();
    if flat.chars().count() > 200 {
        out.push_str("...");
    }
    out
}

fn print_reply(reply: &Reply) {
    println!("{}", reply.text);
    if !reply.sources.is_empty() {
        println!();
        println!("sources:");
        for hit in &reply.sources {
            println!("  - {}", hit.metadata);
        }
    }
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    session_path: Option<&Path>,
    progress: ProgressMode,
) -> Result<()> {
    if question.trim().is_empty() {
        bail!("Question is empty");
    }

    let gate = config
        .relevance
        .enabled
        .then(|| RelevanceGate::new(&config.relevance.keywords));
    if let Some(gate) = &gate {
        if !gate.is_relevant(question) {
            println!("{}", OFF_TOPIC_REPLY);
            return Ok(());
        }
    }

    let mut orchestrator = open(config, progress).await?;
    require_ready(&orchestrator)?;

    let mut session = match session_path {
        Some(path) => Session::load_or_new(path)?,
        None => Session::new(),
    };
    let reply = orchestrator.ask(&mut session, question).await;
    print_reply(&reply);

    if let Some(path) = session_path {
        session.save(path)?;
    }
    if let Some(kind) = reply.error {
        bail!("question failed ({})", kind);
    }
    Ok(())
}

/// Interactive loop: one question per line until EOF, `exit`, or `quit`.
pub async fn run_chat(
    config: &Config,
    session_path: Option<&Path>,
    progress: ProgressMode,
) -> Result<()> {
    let mut orchestrator = open(config, progress).await?;
    require_ready(&orchestrator)?;

    let gate = config
        .relevance
        .enabled
        .then(|| RelevanceGate::new(&config.relevance.keywords));
    let mut session = match session_path {
        Some(path) => Session::load_or_new(path)?,
        None => Session::new(),
    };

    eprintln!(
        "docqa chat: {} entries indexed. Type a question, or `exit` to quit.",
        orchestrator.index_len().unwrap_or(0)
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }
        if let Some(gate) = &gate {
            if !gate.is_relevant(question) {
                println!("{}", OFF_TOPIC_REPLY);
                println!();
                continue;
            }
        }

        let reply = orchestrator.ask(&mut session, question).await;
        print_reply(&reply);
        println!();

        if let Some(path) = session_path {
            session.save(path)?;
        }
        // Rejected credentials leave nothing to answer with.
        if !orchestrator.state().is_ready() {
            bail!("chat ended: {}", orchestrator.state());
        }
    }
    Ok(())
}
