//! Confined directory traversal
//!
//! A lazy, sorted, pre-order walk that follows symlinks only while their real
//! target stays inside the user root. Symlink cycles are detected by walkdir,
//! which tracks the real directories on the current branch; a revisit ends that
//! branch without an error.

use chrono::{DateTime, Utc};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::catalog::results::DirEntry;
use crate::error::StorageError;
use crate::storage::validation::ResolvedPath;

type EntryFilter = Box<dyn FnMut(&walkdir::DirEntry) -> bool + Send>;

/// Iterator over the descendants of a resolved directory.
pub struct ConfinedWalk {
    inner: walkdir::FilterEntry<walkdir::IntoIter, EntryFilter>,
    base: PathBuf,
}

impl ConfinedWalk {
    /// Walks below `dir`; `max_depth` counts levels under it (1 = direct children).
    pub fn new(dir: &ResolvedPath, max_depth: Option<usize>) -> Self {
        let base = dir.target().to_path_buf();
        let root = dir.root().to_path_buf();

        let mut walker = WalkDir::new(&base)
            .follow_links(true)
            .sort_by_file_name()
            .min_depth(1);
        if let Some(depth) = max_depth {
            walker = walker.max_depth(depth);
        }

        let filter: EntryFilter = Box::new(move |entry| stays_inside(entry, &root));

        Self {
            inner: walker.into_iter().filter_entry(filter),
            base,
        }
    }

    /// Stops descending into the directory most recently yielded.
    pub fn skip_current_dir(&mut self) {
        self.inner.skip_current_dir();
    }
}

impl Iterator for ConfinedWalk {
    type Item = Result<DirEntry, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    if let Some(ancestor) = err.loop_ancestor() {
                        debug!(
                            "Skipping symlink cycle at {:?} (ancestor {})",
                            err.path(),
                            ancestor.display()
                        );
                        continue;
                    }
                    if err.io_error().map(|e| e.kind()) == Some(io::ErrorKind::NotFound) {
                        debug!("Skipping vanished or dangling entry {:?}", err.path());
                        continue;
                    }
                    return Some(Err(StorageError::IoError(io::Error::from(err))));
                }
            };

            match describe(&entry, &self.base) {
                Ok(described) => return Some(Ok(described)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Entry vanished during walk: {}", entry.path().display());
                    continue;
                }
                Err(e) => return Some(Err(StorageError::IoError(e))),
            }
        }
    }
}

/// Keeps regular entries; keeps a symlink only when its real target is inside `root`.
fn stays_inside(entry: &walkdir::DirEntry, root: &Path) -> bool {
    if !entry.path_is_symlink() {
        return true;
    }
    match fs::canonicalize(entry.path()) {
        Ok(real) if real.starts_with(root) => true,
        Ok(real) => {
            debug!(
                "Omitting symlink {} pointing outside the user root ({})",
                entry.path().display(),
                real.display()
            );
            false
        }
        Err(e) => {
            debug!("Omitting unresolvable symlink {}: {}", entry.path().display(), e);
            false
        }
    }
}

fn describe(entry: &walkdir::DirEntry, base: &Path) -> io::Result<DirEntry> {
    let metadata = entry.metadata().map_err(io::Error::from)?;

    let relative_path = entry
        .path()
        .strip_prefix(base)
        .unwrap_or(entry.path())
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let modified = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    Ok(DirEntry {
        name: entry.file_name().to_string_lossy().to_string(),
        relative_path,
        path: entry.path().to_path_buf(),
        is_directory: metadata.is_dir(),
        is_file: metadata.is_file(),
        size: if metadata.is_dir() {
            None
        } else {
            Some(metadata.len())
        },
        modified,
        depth: entry.depth().saturating_sub(1),
    })
}
