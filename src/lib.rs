//! # docqa
//!
//! Retrieval-augmented question answering over a local document corpus.
//!
//! Documents dropped into a corpus directory (`.txt`, `.pdf`, `.docx`) are
//! extracted, chunked, embedded, and stored in a persisted vector index.
//! Questions are answered by retrieving the nearest chunks and handing them
//! to a language model as grounding context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌─────────────┐   ┌────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedding │──▶│ VectorIndex │──▶│ Store  │
//! │ txt/pdf/ │   │ windows │   │  (OpenAI) │   │ exact k-NN  │   │ 1 file │
//! │   docx   │   └─────────┘   └─────┬─────┘   └──────┬──────┘   └────────┘
//! └──────────┘                       │                │
//!                                    ▼                ▼
//!                              ┌───────────────────────────┐   ┌─────────────┐
//!                              │       Orchestrator        │──▶│ Synthesizer │
//!                              │ state machine + answer()  │   │ (chat API)  │
//!                              └───────────────────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa status                      # index the corpus if needed, print state
//! docqa search "blood pressure"     # ranked chunks
//! docqa ask "What is a normal LDL?" # grounded answer
//! docqa invalidate                  # force a rebuild on next run
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction from PDF and DOCX |
//! | [`loader`] | Corpus directory loading |
//! | [`chunk`] | Overlapping character-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index and similarity search |
//! | [`store`] | Index persistence and staleness |
//! | [`synthesis`] | Answer synthesizer abstraction |
//! | [`orchestrator`] | Lifecycle state machine and answer path |
//! | [`session`] | Caller-owned chat sessions |
//! | [`relevance`] | Keyword relevance gate |
//! | [`progress`] | Index build progress reporting |
//! | [`commands`] | CLI command implementations |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod loader;
pub mod models;
pub mod openai;
pub mod orchestrator;
pub mod progress;
pub mod relevance;
pub mod session;
pub mod store;
pub mod synthesis;

pub use error::{Error, ErrorKind, Result};
