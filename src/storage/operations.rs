//! Storage operations
//!
//! Create, delete, rename, move, copy, archive, upload and download inside a
//! user root. Every path argument is resolved before storage is touched, so a
//! failed resolution leaves the tree unchanged. Nothing here locks: concurrent
//! operations on overlapping paths race, and the last writer wins.

use log::{debug, error, info, warn};
use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::Path;
use uuid::Uuid;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::catalog::operations::open_directory;
use crate::catalog::walker::ConfinedWalk;
use crate::error::StorageError;
use crate::storage::results::{
    ArchiveResult, CreateResult, DeleteFailure, DeleteReport, RelocateResult, RetrieveResult,
    StoreResult,
};
use crate::storage::validation::{ResolvedPath, UserRoot, join_relative, resolve, resolve_new};
use crate::utils::validation::is_valid_name;

/// Creates one directory named `name` inside `parent`.
pub fn create_folder(
    root: &UserRoot,
    parent: &str,
    name: &str,
) -> Result<CreateResult, StorageError> {
    let name = checked_name(name)?;
    let dest = resolve_new(root, &join_relative(parent, name))?;
    ensure_free(&dest)?;

    fs::create_dir(dest.location()).map_err(|e| conflict_or_io(e, &dest))?;

    info!(
        "Created folder /{} (real: {})",
        dest.relative(),
        dest.location().display()
    );

    Ok(CreateResult {
        real_path: dest.location().to_path_buf(),
        path: dest.relative().to_string(),
    })
}

/// Renames an entry within its parent directory.
pub fn rename(root: &UserRoot, path: &str, new_name: &str) -> Result<RelocateResult, StorageError> {
    let new_name = checked_name(new_name)?;
    let source = resolve_entry(root, path)?;
    let dest = resolve_new(root, &join_relative(source.parent_relative(), new_name))?;
    ensure_free(&dest)?;

    fs::rename(source.location(), dest.location()).map_err(|e| {
        error!(
            "Failed to rename /{} to /{}: {}",
            source.relative(),
            dest.relative(),
            e
        );
        StorageError::from(e)
    })?;

    info!("Renamed /{} to /{}", source.relative(), dest.relative());
    Ok(RelocateResult {
        source: source.relative().to_string(),
        destination: dest.relative().to_string(),
    })
}

/// Moves an entry into an existing directory, keeping its name.
pub fn move_item(
    root: &UserRoot,
    source: &str,
    dest_dir: &str,
) -> Result<RelocateResult, StorageError> {
    let (source, dest) = plan_relocation(root, source, dest_dir, false)?;

    match fs::rename(source.location(), dest.location()) {
        Ok(()) => {}
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            info!(
                "Move of /{} crosses devices, falling back to copy and delete",
                source.relative()
            );
            copy_entry(&source, &dest)?;
            let report = remove_entry(&source)?;
            if !report.is_complete() {
                warn!(
                    "Moved /{} but {} source entries could not be removed",
                    source.relative(),
                    report.remaining.len()
                );
            }
        }
        Err(e) => {
            error!(
                "Failed to move /{} to /{}: {}",
                source.relative(),
                dest.relative(),
                e
            );
            return Err(StorageError::from(e));
        }
    }

    info!("Moved /{} to /{}", source.relative(), dest.relative());
    Ok(RelocateResult {
        source: source.relative().to_string(),
        destination: dest.relative().to_string(),
    })
}

/// Copies a file or directory tree into an existing directory.
///
/// Symlinks inside the copied tree are dereferenced; links leading outside the
/// user root are skipped.
pub fn copy_item(
    root: &UserRoot,
    source: &str,
    dest_dir: &str,
) -> Result<RelocateResult, StorageError> {
    let (source, dest) = plan_relocation(root, source, dest_dir, true)?;
    copy_entry(&source, &dest)?;

    info!("Copied /{} to /{}", source.relative(), dest.relative());
    Ok(RelocateResult {
        source: source.relative().to_string(),
        destination: dest.relative().to_string(),
    })
}

/// Deletes a file, a link or a whole directory tree.
///
/// Links are removed, never followed. Directories are emptied children-first;
/// entries that cannot be removed are listed in the report and the rest of the
/// tree is still processed.
pub fn delete(root: &UserRoot, path: &str) -> Result<DeleteReport, StorageError> {
    let target = resolve_entry(root, path)?;
    let report = remove_entry(&target)?;

    if report.is_complete() {
        info!(
            "Deleted /{} (real: {}) - {} entries",
            target.relative(),
            target.location().display(),
            report.removed.len()
        );
    } else {
        warn!(
            "Partially deleted /{}: {} removed, {} remaining",
            target.relative(),
            report.removed.len(),
            report.remaining.len()
        );
    }

    Ok(report)
}

/// Writes `path` (a directory tree or a single file) into a ZIP container.
///
/// The walk takes no lock; entries that disappear while it runs are skipped.
pub fn archive<W: Write + Seek>(
    root: &UserRoot,
    path: &str,
    writer: W,
) -> Result<ArchiveResult, StorageError> {
    let source = resolve(root, path)?;
    let mut zip = ZipWriter::new(writer);
    let options: FileOptions<'_, ()> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut result = ArchiveResult::default();

    if source.target().is_file() {
        let name = source.file_name().unwrap_or("file");
        let mut file = File::open(source.target())?;
        zip.start_file(name, options)?;
        io::copy(&mut file, &mut zip)?;
        result.files += 1;
    } else {
        for entry in ConfinedWalk::new(&source, None) {
            let entry = entry?;
            if entry.is_directory {
                zip.add_directory(format!("{}/", entry.relative_path), options)?;
                result.directories += 1;
            } else if entry.is_file {
                let mut file = match File::open(&entry.path) {
                    Ok(file) => file,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        warn!("Skipping {} (vanished during archive)", entry.relative_path);
                        result.skipped += 1;
                        continue;
                    }
                    Err(e) => return Err(StorageError::from(e)),
                };
                zip.start_file(entry.relative_path.as_str(), options)?;
                io::copy(&mut file, &mut zip)?;
                result.files += 1;
            }
        }
    }

    zip.finish()?;

    info!(
        "Archived /{} - {} files, {} directories, {} skipped",
        source.relative(),
        result.files,
        result.directories,
        result.skipped
    );

    Ok(result)
}

/// Stores `data` as a new file `name` inside directory `dir`.
///
/// The bytes land in a hidden temporary sibling first and are linked into
/// place only if the name is still free, so readers never see a partial file.
pub fn upload(
    root: &UserRoot,
    dir: &str,
    name: &str,
    data: &[u8],
) -> Result<StoreResult, StorageError> {
    let name = checked_name(name)?;
    let dest = resolve_new(root, &join_relative(dir, name))?;
    ensure_free(&dest)?;

    let parent = dest
        .location()
        .parent()
        .ok_or_else(|| StorageError::InvalidDestination(dest.relative().to_string()))?;
    let temp_path = parent.join(format!(".upload-{}.part", Uuid::new_v4()));

    let stored = write_new(&temp_path, data)
        .and_then(|()| fs::hard_link(&temp_path, dest.location()));
    if let Err(e) = fs::remove_file(&temp_path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(
                "Failed to remove temporary upload {}: {}",
                temp_path.display(),
                e
            );
        }
    }
    stored.map_err(|e| conflict_or_io(e, &dest))?;

    info!(
        "Stored /{} (real: {}) - {} bytes",
        dest.relative(),
        dest.location().display(),
        data.len()
    );

    Ok(StoreResult {
        file_path: dest.location().to_path_buf(),
        path: dest.relative().to_string(),
        size: data.len() as u64,
    })
}

/// Prepares a regular file for download.
pub fn download(root: &UserRoot, path: &str) -> Result<RetrieveResult, StorageError> {
    let file = resolve(root, path)?;
    let metadata = fs::metadata(file.target())?;
    if !metadata.is_file() {
        return Err(StorageError::NotAFile(path.to_string()));
    }

    info!(
        "Prepared /{} for download (real: {})",
        file.relative(),
        file.target().display()
    );

    Ok(RetrieveResult {
        file_path: file.target().to_path_buf(),
        path: file.relative().to_string(),
        size: metadata.len(),
    })
}

fn checked_name(name: &str) -> Result<&str, StorageError> {
    if is_valid_name(name) {
        Ok(name)
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

/// Resolves an existing entry other than the user root itself.
fn resolve_entry(root: &UserRoot, path: &str) -> Result<ResolvedPath, StorageError> {
    let entry = resolve(root, path)?;
    if entry.is_root() {
        return Err(StorageError::InvalidDestination(
            "the user directory itself cannot be modified".into(),
        ));
    }
    Ok(entry)
}

/// Resolves the source and the destination entry of a move or copy.
///
/// A move relocates a link itself, while a copy reads through it, so with
/// `follows_links` the destination must also stay clear of the link's target.
fn plan_relocation(
    root: &UserRoot,
    source: &str,
    dest_dir: &str,
    follows_links: bool,
) -> Result<(ResolvedPath, ResolvedPath), StorageError> {
    let source = resolve_entry(root, source)?;
    let name = source
        .file_name()
        .ok_or_else(|| StorageError::InvalidDestination(source.relative().to_string()))?;

    let dir = open_directory(root, dest_dir)?;
    if dir.target().starts_with(source.location())
        || (follows_links && dir.target().starts_with(source.target()))
    {
        return Err(StorageError::InvalidDestination(format!(
            "cannot place /{} inside itself",
            source.relative()
        )));
    }

    let dest = resolve_new(root, &join_relative(dir.relative(), name))?;
    ensure_free(&dest)?;
    Ok((source, dest))
}

/// Fails with `AlreadyExists` when anything, a dangling link included, occupies `dest`.
fn ensure_free(dest: &ResolvedPath) -> Result<(), StorageError> {
    match fs::symlink_metadata(dest.location()) {
        Ok(_) => Err(StorageError::AlreadyExists(dest.relative().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::from(e)),
    }
}

fn conflict_or_io(e: io::Error, dest: &ResolvedPath) -> StorageError {
    if e.kind() == io::ErrorKind::AlreadyExists {
        StorageError::AlreadyExists(dest.relative().to_string())
    } else {
        error!("Failed to write /{}: {}", dest.relative(), e);
        StorageError::from(e)
    }
}

fn write_new(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create_new(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn copy_entry(source: &ResolvedPath, dest: &ResolvedPath) -> Result<(), StorageError> {
    if !source.target().is_dir() {
        fs::copy(source.target(), dest.location())?;
        return Ok(());
    }

    fs::create_dir(dest.location()).map_err(|e| conflict_or_io(e, dest))?;
    let mut walk = ConfinedWalk::new(source, None);
    while let Some(entry) = walk.next() {
        let entry = entry?;
        let target = dest.location().join(&entry.relative_path);
        if entry.is_directory {
            // A link inside the tree may lead into the copy being written.
            if lands_in(&entry.path, dest.location()) {
                debug!(
                    "Skipping {} (resolves into the copy destination)",
                    entry.relative_path
                );
                walk.skip_current_dir();
                continue;
            }
            fs::create_dir(&target)?;
        } else if entry.is_file {
            match fs::copy(&entry.path, &target) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("Skipping {} (vanished during copy)", entry.relative_path);
                }
                Err(e) => return Err(StorageError::from(e)),
            }
        }
    }
    Ok(())
}

fn lands_in(path: &Path, dest: &Path) -> bool {
    fs::canonicalize(path)
        .map(|real| real.starts_with(dest))
        .unwrap_or(false)
}

fn remove_entry(target: &ResolvedPath) -> Result<DeleteReport, StorageError> {
    let location = target.location();
    let metadata = fs::symlink_metadata(location)?;
    let mut report = DeleteReport::default();

    if !metadata.is_dir() {
        fs::remove_file(location)?;
        report.removed.push(target.relative().to_string());
        return Ok(report);
    }

    for entry in WalkDir::new(location).follow_links(false).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .and_then(|p| p.strip_prefix(location).ok())
                    .map(|p| join_relative(target.relative(), &p.to_string_lossy()))
                    .unwrap_or_else(|| target.relative().to_string());
                report.remaining.push(DeleteFailure {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let relative = match entry.path().strip_prefix(location) {
            Ok(rest) if rest.as_os_str().is_empty() => target.relative().to_string(),
            Ok(rest) => join_relative(target.relative(), &rest.to_string_lossy()),
            Err(_) => entry.path().display().to_string(),
        };

        let removed = if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())
        } else {
            fs::remove_file(entry.path())
        };

        match removed {
            Ok(()) => report.removed.push(relative),
            Err(e) => report.remaining.push(DeleteFailure {
                path: relative,
                reason: e.to_string(),
            }),
        }
    }

    Ok(report)
}
