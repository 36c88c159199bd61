//! Document folder enumeration.

use std::path::{Path, PathBuf};

use fieldaudit_recon::DocumentInput;

use crate::error::IoError;
use crate::xml::parse_document;

/// Files in `folder` (not recursive) whose name matches `pattern`, sorted by
/// file name.
pub fn list_documents(folder: &Path, pattern: &str) -> Result<Vec<PathBuf>, IoError> {
    let pattern = glob::Pattern::new(pattern).map_err(|e| IoError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    let match_opts = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let entries = std::fs::read_dir(folder).map_err(|e| IoError::Read {
        path: folder.display().to_string(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matched = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| pattern.matches_with(name, match_opts));
        if matched {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read and parse one document. Failures are carried in the result so the
/// run records them as a row.
pub fn load_document(path: &Path) -> DocumentInput {
    let name = document_name(path);
    let tree = std::fs::read(path)
        .map_err(|e| IoError::Read {
            path: path.display().to_string(),
            source: e,
        })
        .and_then(|bytes| parse_document(&bytes))
        .map_err(|e| e.to_string());
    DocumentInput { name, tree }
}

fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Lazily loads documents one at a time, in listing order.
pub struct DocumentSource {
    paths: std::vec::IntoIter<PathBuf>,
}

impl DocumentSource {
    pub fn open(folder: &Path, pattern: &str) -> Result<Self, IoError> {
        Ok(Self::from_paths(list_documents(folder, pattern)?))
    }

    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl Iterator for DocumentSource {
    type Item = DocumentInput;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        log::debug!("loading {}", path.display());
        Some(load_document(&path))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}
