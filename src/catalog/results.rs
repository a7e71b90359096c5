//! Catalog result types
//!
//! Defines the entry record produced by directory listings.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    /// `/`-separated path from the listing directory
    pub relative_path: String,
    /// Location on disk, below the resolved listing directory
    pub path: PathBuf,
    pub is_directory: bool,
    pub is_file: bool,
    /// `None` for directories
    pub size: Option<u64>,
    pub modified: DateTime<Utc>,
    /// Separators in `relative_path`; direct children are at depth 0
    pub depth: usize,
}
