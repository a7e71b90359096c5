//! Storage result types
//!
//! Defines result structures returned by storage operations.

use std::path::PathBuf;

/// Result of creating a folder
#[derive(Debug, Clone)]
pub struct CreateResult {
    pub real_path: PathBuf,
    pub path: String,
}

/// Result of storing an uploaded file
#[derive(Debug, Clone)]
pub struct StoreResult {
    pub file_path: PathBuf,
    pub path: String,
    pub size: u64,
}

/// Result of a file retrieval operation
#[derive(Debug, Clone)]
pub struct RetrieveResult {
    pub file_path: PathBuf,
    pub path: String,
    pub size: u64,
}

/// Result of a rename, move or copy
#[derive(Debug, Clone)]
pub struct RelocateResult {
    pub source: String,
    pub destination: String,
}

/// An entry a delete could not remove
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteFailure {
    pub path: String,
    pub reason: String,
}

/// Itemized outcome of a delete. Removals are not rolled back.
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    pub removed: Vec<String>,
    pub remaining: Vec<DeleteFailure>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Result of writing a ZIP archive
#[derive(Debug, Clone, Default)]
pub struct ArchiveResult {
    pub files: usize,
    pub directories: usize,
    pub skipped: usize,
}
