//! Fixed-window text chunker with overlap.
//!
//! Splits each [`TextRecord`] into [`Chunk`]s of at most `max_chunk_size`
//! characters. Consecutive windows start `max_chunk_size - overlap_size`
//! characters apart, so each chunk after the first repeats the last
//! `overlap_size` characters of its predecessor. Sizes are counted in
//! Unicode scalar values, never bytes, so multi-byte text is never split
//! inside a character.

use crate::error::{Error, Result};
use crate::models::{Chunk, TextRecord};

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chunk_size: usize,
    overlap_size: usize,
}

impl Chunker {
    /// Fails with [`Error::Configuration`] when the window would not advance.
    pub fn new(max_chunk_size: usize, overlap_size: usize) -> Result<Self> {
        if max_chunk_size == 0 {
            return Err(Error::Configuration(
                "max chunk size must be > 0".to_string(),
            ));
        }
        if overlap_size >= max_chunk_size {
            return Err(Error::Configuration(format!(
                "overlap ({}) must be smaller than max chunk size ({})",
                overlap_size, max_chunk_size
            )));
        }
        Ok(Self {
            max_chunk_size,
            overlap_size,
        })
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn overlap_size(&self) -> usize {
        self.overlap_size
    }

    /// Split one record. Empty content yields no chunks.
    pub fn chunk_record(&self, record: &TextRecord) -> Vec<Chunk> {
        let text = record.content.as_str();
        // Byte offset of every char boundary, plus the end of the string.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;
        let step = self.max_chunk_size - self.overlap_size;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        while start < char_count {
            let end = (start + self.max_chunk_size).min(char_count);
            chunks.push(Chunk {
                text: text[boundaries[start]..boundaries[end]].to_string(),
                overlap_with_previous: if start == 0 { 0 } else { self.overlap_size },
                metadata: record.metadata.clone(),
            });
            if end == char_count {
                break;
            }
            start += step;
        }
        chunks
    }

    /// Split all records, preserving record order.
    pub fn chunk_records(&self, records: &[TextRecord]) -> Vec<Chunk> {
        records.iter().flat_map(|r| self.chunk_record(r)).collect()
    }
}

/// Rebuild a record's content from its chunks by dropping each chunk's
/// overlapping prefix.
pub fn rejoin(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.extend(chunk.text.chars().skip(chunk.overlap_with_previous));
    }
    out
}
