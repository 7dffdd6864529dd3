//! Core data models used throughout docqa.
//!
//! These types represent the documents, text records, chunks, index entries,
//! and search hits that flow through the indexing and retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported document formats, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// `.txt`
    Text,
    /// `.pdf`
    Pdf,
    /// `.docx`
    Word,
}

impl DocumentKind {
    /// Map a file extension (without the dot, any case) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Some(DocumentKind::Text),
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Word),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// One file from the corpus directory.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub filename: String,
    pub kind: DocumentKind,
    pub raw_content: Vec<u8>,
}

/// Where a piece of text came from. Surfaced with answers and search hits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Filename, verbatim.
    pub source: String,
    /// 1-based page number (PDF only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl SourceMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page: None,
        }
    }

    pub fn with_page(source: impl Into<String>, page: u32) -> Self {
        Self {
            source: source.into(),
            page: Some(page),
        }
    }
}

impl std::fmt::Display for SourceMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.page {
            Some(p) => write!(f, "{} (page {})", self.source, p),
            None => write!(f, "{}", self.source),
        }
    }
}

/// Normalized text extracted from a document (one per PDF page).
#[derive(Debug, Clone, PartialEq)]
pub struct TextRecord {
    pub content: String,
    pub metadata: SourceMetadata,
}

/// A bounded window of a [`TextRecord`]'s content.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// Number of leading characters shared with the previous chunk of the
    /// same record. Zero for the first chunk.
    pub overlap_with_previous: usize,
    pub metadata: SourceMetadata,
}

/// Embedding vector.
pub type EmbeddingVector = Vec<f32>;

/// A stored (vector, text, metadata) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub vector: EmbeddingVector,
    pub text: String,
    pub metadata: SourceMetadata,
}

/// A search result returned from the vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: SourceMetadata,
    /// Cosine similarity (higher is nearer) or L2 distance (lower is nearer),
    /// depending on the index metric.
    pub score: f32,
}
