//! Path confinement
//!
//! Turns untrusted relative paths into locations proven to stay inside a user's
//! root. Containment is checked twice: lexically while normalizing the request,
//! and physically after every symlink on the way has been resolved. Both checks
//! run fresh on every call; nothing is cached between requests.

use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::PathError;
use crate::utils::validation::is_valid_name;

/// One user's confined subtree under the shared storage root.
#[derive(Debug, Clone)]
pub struct UserRoot {
    name: String,
    real_path: PathBuf,
}

impl UserRoot {
    /// Opens an existing user directory below `storage_root`.
    pub fn open(storage_root: &Path, name: &str) -> Result<Self, PathError> {
        if !is_valid_name(name) {
            return Err(PathError::InvalidUserRoot(name.to_string()));
        }

        let storage_real = fs::canonicalize(storage_root).map_err(|e| {
            PathError::Unresolvable(format!("storage root {}: {}", storage_root.display(), e))
        })?;

        let real_path = match fs::canonicalize(storage_real.join(name)) {
            Ok(path) => path,
            Err(e) if is_missing(&e) => return Err(PathError::UserRootNotFound(name.to_string())),
            Err(e) => return Err(PathError::Unresolvable(format!("{}: {}", name, e))),
        };

        if real_path == storage_real || !real_path.starts_with(&storage_real) {
            warn!(
                "User directory {} resolves outside the storage root (real: {})",
                name,
                real_path.display()
            );
            return Err(PathError::SymlinkEscape(name.to_string()));
        }

        if !real_path.is_dir() {
            return Err(PathError::UserRootNotFound(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            real_path,
        })
    }

    /// Creates the user directory if it does not exist yet, then opens it.
    pub fn provision(storage_root: &Path, name: &str) -> Result<Self, PathError> {
        if !is_valid_name(name) {
            return Err(PathError::InvalidUserRoot(name.to_string()));
        }

        match fs::create_dir(storage_root.join(name)) {
            Ok(()) => info!("Provisioned user directory {}", name),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(PathError::Unresolvable(format!("{}: {}", name, e))),
        }

        Self::open(storage_root, name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Real (canonical) path of the user directory as observed when it was opened.
    pub fn real_path(&self) -> &Path {
        &self.real_path
    }
}

/// A location proven to lie inside its user root.
///
/// Only [`resolve`] and [`resolve_new`] construct this type.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    root: PathBuf,
    relative: String,
    location: PathBuf,
    target: PathBuf,
}

impl ResolvedPath {
    /// Real path of the user root this path was resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalized `/`-separated remainder; empty for the root itself.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// The entry itself: its real parent joined with its final name.
    ///
    /// Operations that act on a link rather than on what it points to (delete,
    /// rename, move) use this.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// The fully resolved real path.
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.relative.rsplit('/').next().filter(|name| !name.is_empty())
    }

    /// Relative path of the containing directory; empty when the parent is the root.
    pub fn parent_relative(&self) -> &str {
        match self.relative.rfind('/') {
            Some(idx) => &self.relative[..idx],
            None => "",
        }
    }
}

/// Joins two relative path requests with a single separator.
pub fn join_relative(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Splits a request into normalized segments.
///
/// A `..` consumes the previous segment; one with nothing left to consume would
/// climb above the root and is rejected rather than clamped.
pub fn normalize(request: &str) -> Result<Vec<String>, PathError> {
    if request.contains('\0') {
        return Err(PathError::InvalidSegment(request.escape_default().to_string()));
    }
    if request.starts_with('/') || request.starts_with('\\') {
        return Err(PathError::AbsolutePath(request.to_string()));
    }
    if has_volume_prefix(request) {
        return Err(PathError::DisallowedPrefix(request.to_string()));
    }
    if request.contains('\\') {
        return Err(PathError::InvalidSegment(request.to_string()));
    }

    let mut segments: Vec<String> = Vec::new();
    for segment in request.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::EscapesRoot(request.to_string()));
                }
            }
            name if is_valid_name(name) => segments.push(name.to_string()),
            name => return Err(PathError::InvalidSegment(name.to_string())),
        }
    }

    Ok(segments)
}

/// Resolves an existing entry inside `root`.
pub fn resolve(root: &UserRoot, request: &str) -> Result<ResolvedPath, PathError> {
    let segments = normalize(request)?;
    let root_real = verify_root(root)?;
    let relative = segments.join("/");

    let (location, target) = match segments.split_last() {
        None => (root_real.clone(), root_real.clone()),
        Some((leaf, parents)) => {
            let parent_real = walk(&root_real, parents, request)?;
            let location = parent_real.join(leaf);
            let target = follow(&root_real, &location, request)?;
            (location, target)
        }
    };

    let target = recheck(&root_real, &target, request)?;
    debug!(
        "Resolved {:?} for {} to {}",
        request,
        root.name(),
        target.display()
    );

    Ok(ResolvedPath {
        root: root_real,
        relative,
        location,
        target,
    })
}

/// Resolves the destination of a create, rename, move or copy.
///
/// The parent must already exist as a directory inside the root; the final
/// segment is returned unresolved so the caller can check whether it is free.
pub fn resolve_new(root: &UserRoot, request: &str) -> Result<ResolvedPath, PathError> {
    let segments = normalize(request)?;
    let Some((leaf, parents)) = segments.split_last() else {
        return Err(PathError::InvalidSegment(format!(
            "destination must name an entry: {:?}",
            request
        )));
    };

    let root_real = verify_root(root)?;
    let parent_real = walk(&root_real, parents, request)?;
    let parent_real = recheck(&root_real, &parent_real, request)?;
    if !parent_real.is_dir() {
        return Err(PathError::NotFound(parents.join("/")));
    }

    let location = parent_real.join(leaf);
    Ok(ResolvedPath {
        root: root_real,
        relative: segments.join("/"),
        location: location.clone(),
        target: location,
    })
}

fn has_volume_prefix(request: &str) -> bool {
    let bytes = request.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn is_missing(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::NotFound || error.raw_os_error() == Some(libc::ENOTDIR)
}

/// Re-canonicalizes the user root so a directory swapped since it was opened is caught.
fn verify_root(root: &UserRoot) -> Result<PathBuf, PathError> {
    match fs::canonicalize(root.real_path()) {
        Ok(real) if real == root.real_path() => Ok(real),
        Ok(real) => {
            warn!(
                "User root {} moved from {} to {}",
                root.name(),
                root.real_path().display(),
                real.display()
            );
            Err(PathError::SymlinkEscape(root.name().to_string()))
        }
        Err(e) if is_missing(&e) => Err(PathError::UserRootNotFound(root.name().to_string())),
        Err(e) => Err(PathError::Unresolvable(format!("{}: {}", root.name(), e))),
    }
}

fn walk(root_real: &Path, segments: &[String], request: &str) -> Result<PathBuf, PathError> {
    let mut current = root_real.to_path_buf();
    for segment in segments {
        current = follow(root_real, &current.join(segment), request)?;
    }
    Ok(current)
}

/// Inspects one component without following it, then follows it only if its real
/// target stays inside the root.
fn follow(root_real: &Path, candidate: &Path, request: &str) -> Result<PathBuf, PathError> {
    let metadata = match fs::symlink_metadata(candidate) {
        Ok(metadata) => metadata,
        Err(e) if is_missing(&e) => return Err(PathError::NotFound(request.to_string())),
        Err(e) => return Err(PathError::Unresolvable(format!("{}: {}", request, e))),
    };

    if !metadata.file_type().is_symlink() {
        return Ok(candidate.to_path_buf());
    }

    let real = fs::canonicalize(candidate).map_err(|e| {
        warn!(
            "Cannot resolve symlink {} in request {:?}: {}",
            candidate.display(),
            request,
            e
        );
        PathError::Unresolvable(request.to_string())
    })?;

    if !real.starts_with(root_real) {
        warn!(
            "Symlink {} in request {:?} points outside the user root (real: {})",
            candidate.display(),
            request,
            real.display()
        );
        return Err(PathError::SymlinkEscape(request.to_string()));
    }

    Ok(real)
}

fn recheck(root_real: &Path, path: &Path, request: &str) -> Result<PathBuf, PathError> {
    let real = match fs::canonicalize(path) {
        Ok(real) => real,
        Err(e) if is_missing(&e) => return Err(PathError::NotFound(request.to_string())),
        Err(e) => return Err(PathError::Unresolvable(format!("{}: {}", request, e))),
    };

    if !real.starts_with(root_real) {
        warn!(
            "Request {:?} resolved outside the user root (real: {})",
            request,
            real.display()
        );
        return Err(PathError::EscapesRoot(request.to_string()));
    }

    Ok(real)
}
