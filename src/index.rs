//! Exact nearest-neighbour vector index.
//!
//! Brute-force scan over all entries; corpora here are a handful of uploaded
//! documents, so a flat index keeps results exact and deterministic.
//!
//! # Ordering
//!
//! Results are sorted nearest-first with a stable sort, so entries at equal
//! distance keep their insertion order. `search(q, k)` with `k` larger than
//! the entry count returns every entry exactly once.

use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, l2_distance};
use crate::error::{Error, Result};
use crate::models::{IndexEntry, SearchHit};

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 4;

/// Distance metric, fixed at build time and persisted with the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Score is cosine similarity; higher is nearer.
    #[default]
    Cosine,
    /// Score is Euclidean distance; lower is nearer.
    L2,
}

impl Metric {
    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::L2 => l2_distance(a, b),
        }
    }

    /// Ordering of two scores, nearest first.
    fn nearest_first(&self, a: f32, b: f32) -> std::cmp::Ordering {
        let ord = match self {
            Metric::Cosine => b.partial_cmp(&a),
            Metric::L2 => a.partial_cmp(&b),
        };
        ord.unwrap_or(std::cmp::Ordering::Equal)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Cosine => f.write_str("cosine"),
            Metric::L2 => f.write_str("l2"),
        }
    }
}

/// In-memory vector index. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dims: usize,
    metric: Metric,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from all entries at once.
    ///
    /// Fails with [`Error::DimensionMismatch`] if any vector does not have
    /// `dims` elements.
    pub fn build(dims: usize, metric: Metric, entries: Vec<IndexEntry>) -> Result<Self> {
        if dims == 0 {
            return Err(Error::Configuration(
                "index dimensionality must be > 0".to_string(),
            ));
        }
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dims) {
            return Err(Error::DimensionMismatch {
                expected: dims,
                actual: bad.vector.len(),
            });
        }
        Ok(Self {
            dims,
            metric,
            entries,
        })
    }

    /// Return up to `k` entries nearest to `query`, nearest-first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dims {
            return Err(Error::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, self.metric.score(query, &e.vector)))
            .collect();
        // sort_by is stable: equal scores stay in insertion order
        scored.sort_by(|a, b| self.metric.nearest_first(a.1, b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let entry = &self.entries[i];
                SearchHit {
                    text: entry.text.clone(),
                    metadata: entry.metadata.clone(),
                    score,
                }
            })
            .collect())
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}
