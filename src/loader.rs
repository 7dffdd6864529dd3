//! Corpus directory loader.
//!
//! Scans a flat directory for `.txt`, `.pdf`, and `.docx` files and turns
//! each into one or more [`TextRecord`]s. Files with other extensions are
//! skipped silently. A supported file that fails to parse is recorded in
//! [`LoadReport::failures`] and the scan continues with the next file.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::extract::{self, Extracted};
use crate::models::{DocumentKind, SourceDocument, SourceMetadata, TextRecord};

/// Outcome of loading a corpus directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Records in filename order, pages in page order.
    pub records: Vec<TextRecord>,
    /// Number of supported files that were read successfully.
    pub documents_loaded: usize,
    /// One `UnreadableDocument` error per file that could not be parsed.
    pub failures: Vec<Error>,
}

/// List supported files in `dir`, sorted by filename.
///
/// A missing directory is treated as empty.
pub fn list_supported(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if DocumentKind::from_path(entry.path()).is_some() {
            paths.push(entry.into_path());
        } else {
            debug!(path = %entry.path().display(), "skipping unsupported file");
        }
    }
    Ok(paths)
}

/// Read one file into a [`SourceDocument`]. Returns `None` for unsupported
/// extensions.
pub fn read_document(path: &Path) -> Result<Option<SourceDocument>> {
    let kind = match DocumentKind::from_path(path) {
        Some(k) => k,
        None => return Ok(None),
    };
    let filename = file_label(path);
    let raw_content = std::fs::read(path)?;
    Ok(Some(SourceDocument {
        filename,
        kind,
        raw_content,
    }))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// A file that could not be read, reported by filename like parse failures.
fn read_failure(path: &Path, e: Error) -> Error {
    Error::UnreadableDocument {
        source_file: file_label(path),
        reason: e.to_string(),
    }
}

/// Convert a document into normalized text records.
pub fn document_records(doc: &SourceDocument) -> Result<Vec<TextRecord>> {
    let extracted =
        extract::extract(&doc.raw_content, doc.kind).map_err(|e| Error::UnreadableDocument {
            source_file: doc.filename.clone(),
            reason: e.to_string(),
        })?;

    let records = match extracted {
        Extracted::Whole(content) => vec![TextRecord {
            content,
            metadata: SourceMetadata::new(&doc.filename),
        }],
        Extracted::Pages(pages) => pages
            .into_iter()
            .enumerate()
            .map(|(i, content)| TextRecord {
                content,
                metadata: SourceMetadata::with_page(&doc.filename, i as u32 + 1),
            })
            .collect(),
    };
    Ok(records)
}

/// Load every supported file in `dir`.
///
/// Only a failure to list the directory is returned as `Err`; per-file
/// problems land in the report.
pub fn load_documents(dir: &Path) -> Result<LoadReport> {
    let mut report = LoadReport::default();

    for path in list_supported(dir)? {
        let doc = match read_document(&path) {
            Ok(Some(doc)) => doc,
            Ok(None) => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read document");
                report.failures.push(read_failure(&path, e));
                continue;
            }
        };

        match document_records(&doc) {
            Ok(records) => {
                debug!(source = %doc.filename, records = records.len(), "loaded document");
                report.documents_loaded += 1;
                report.records.extend(records);
            }
            Err(e) => {
                warn!(source = %doc.filename, error = %e, "skipping unreadable document");
                report.failures.push(e);
            }
        }
    }

    Ok(report)
}
