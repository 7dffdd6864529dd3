//! On-disk persistence for [`VectorIndex`].
//!
//! The index is stored as a single file so that replacing it is one atomic
//! rename:
//!
//! ```text
//! ┌───────┬─────────┬──────────────┬───────────────┬──────────────────────┐
//! │ DQIX  │ version │ manifest len │ manifest JSON │ vectors (f32 LE)     │
//! │ 4 B   │ u32 LE  │ u64 LE       │               │ entry_count × dims×4 │
//! └───────┴─────────┴──────────────┴───────────────┴──────────────────────┘
//! ```
//!
//! The manifest carries the dimensionality, metric, embedding model, entry
//! texts and metadata, and a SHA-256 of the vector section. A load that
//! finds any disagreement fails with [`Error::CorruptIndex`].
//!
//! Staleness is not tracked by default: an index is valid as long as the
//! file exists, and callers delete it via [`invalidate`] to force a rebuild.
//! [`StalenessPolicy::Checksum`] opts into comparing a fingerprint of the
//! corpus files recorded at build time.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Error, Result};
use crate::index::{Metric, VectorIndex};
use crate::models::{IndexEntry, SourceMetadata};

const MAGIC: &[u8; 4] = b"DQIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8;

/// When a persisted index is considered out of date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessPolicy {
    /// Valid while the file exists. Delete it to reindex.
    #[default]
    Explicit,
    /// Rebuild when the corpus fingerprint differs from the one stored.
    Checksum,
}

/// Build-time facts stored alongside the vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub model: String,
    pub corpus_fingerprint: Option<String>,
}

/// A deserialized index plus the facts it was built with.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub index: VectorIndex,
    pub info: IndexInfo,
    pub built_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    model: String,
    dims: usize,
    metric: Metric,
    entry_count: usize,
    vectors_sha256: String,
    #[serde(default)]
    corpus_fingerprint: Option<String>,
    built_at: DateTime<Utc>,
    entries: Vec<StoredEntry>,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    text: String,
    metadata: SourceMetadata,
}

/// Whether the index file is present. Does not validate contents.
pub fn exists(path: &Path) -> bool {
    path.is_file()
}

/// Delete the persisted index. Returns `false` if there was nothing to delete.
pub fn invalidate(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Serialize `index` to `path`, replacing any previous file atomically.
///
/// Data is written to a temporary file in the same directory, synced, and
/// renamed into place, so readers see either the old index or the new one.
pub fn save(index: &VectorIndex, path: &Path, info: &IndexInfo) -> Result<()> {
    let mut vectors = Vec::with_capacity(index.len() * index.dims() * 4);
    for entry in index.entries() {
        vectors.extend_from_slice(&vec_to_blob(&entry.vector));
    }

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        model: info.model.clone(),
        dims: index.dims(),
        metric: index.metric(),
        entry_count: index.len(),
        vectors_sha256: sha256_hex(&vectors),
        corpus_fingerprint: info.corpus_fingerprint.clone(),
        built_at: Utc::now(),
        entries: index
            .entries()
            .iter()
            .map(|e| StoredEntry {
                text: e.text.clone(),
                metadata: e.metadata.clone(),
            })
            .collect(),
    };
    let manifest_json = serde_json::to_vec(&manifest)
        .map_err(|e| Error::corrupt(path, format!("failed to encode manifest: {}", e)))?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(MAGIC)?;
    tmp.write_all(&FORMAT_VERSION.to_le_bytes())?;
    tmp.write_all(&(manifest_json.len() as u64).to_le_bytes())?;
    tmp.write_all(&manifest_json)?;
    tmp.write_all(&vectors)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Deserialize the index at `path`.
///
/// Fails with [`Error::CorruptIndex`] if the file is malformed or if its
/// dimensionality differs from `expected_dims` (the configured model's).
pub fn load(path: &Path, expected_dims: usize) -> Result<LoadedIndex> {
    let bytes = std::fs::read(path)?;
    let (manifest, vectors) = decode(path, &bytes)?;

    if manifest.dims != expected_dims {
        return Err(Error::corrupt(
            path,
            format!(
                "index was built with {} dims but the configured model produces {}",
                manifest.dims, expected_dims
            ),
        ));
    }
    if manifest.entries.len() != manifest.entry_count {
        return Err(Error::corrupt(
            path,
            format!(
                "manifest lists {} entries but declares {}",
                manifest.entries.len(),
                manifest.entry_count
            ),
        ));
    }
    let expected_len = manifest.entry_count * manifest.dims * 4;
    if vectors.len() != expected_len {
        return Err(Error::corrupt(
            path,
            format!(
                "vector section is {} bytes, expected {}",
                vectors.len(),
                expected_len
            ),
        ));
    }
    if sha256_hex(vectors) != manifest.vectors_sha256 {
        return Err(Error::corrupt(path, "vector checksum mismatch"));
    }

    let floats = blob_to_vec(vectors);
    let entries: Vec<IndexEntry> = manifest
        .entries
        .into_iter()
        .zip(floats.chunks_exact(manifest.dims))
        .map(|(stored, vector)| IndexEntry {
            vector: vector.to_vec(),
            text: stored.text,
            metadata: stored.metadata,
        })
        .collect();

    let index = VectorIndex::build(manifest.dims, manifest.metric, entries)
        .map_err(|e| Error::corrupt(path, e.to_string()))?;

    Ok(LoadedIndex {
        index,
        info: IndexInfo {
            model: manifest.model,
            corpus_fingerprint: manifest.corpus_fingerprint,
        },
        built_at: manifest.built_at,
    })
}

fn decode<'a>(path: &Path, bytes: &'a [u8]) -> Result<(Manifest, &'a [u8])> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(Error::corrupt(path, "not a docqa index file"));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(Error::corrupt(
            path,
            format!("unsupported format version {}", version),
        ));
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[8..HEADER_LEN]);
    let manifest_len = u64::from_le_bytes(len_bytes);

    let manifest_end = usize::try_from(manifest_len)
        .ok()
        .and_then(|len| HEADER_LEN.checked_add(len))
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| Error::corrupt(path, "truncated manifest"))?;

    let manifest: Manifest = serde_json::from_slice(&bytes[HEADER_LEN..manifest_end])
        .map_err(|e| Error::corrupt(path, format!("unreadable manifest: {}", e)))?;
    Ok((manifest, &bytes[manifest_end..]))
}

/// SHA-256 over the names and contents of `files`, in the order given.
pub fn corpus_fingerprint(files: &[PathBuf]) -> Result<String> {
    let mut hasher = Sha256::new();
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let content = std::fs::read(path)?;
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(&content);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
