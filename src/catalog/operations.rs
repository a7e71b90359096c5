//! Catalog operations
//!
//! Read-only directory listings inside a user root.

use log::info;

use crate::catalog::results::DirEntry;
use crate::catalog::walker::ConfinedWalk;
use crate::error::StorageError;
use crate::storage::validation::{ResolvedPath, UserRoot, resolve};

/// Lists exactly one directory level, sorted by file name.
pub fn list(root: &UserRoot, request: &str) -> Result<Vec<DirEntry>, StorageError> {
    let dir = open_directory(root, request)?;
    let entries = ConfinedWalk::new(&dir, Some(1)).collect::<Result<Vec<_>, _>>()?;

    info!(
        "Listed directory /{} (real: {}) - {} entries",
        dir.relative(),
        dir.target().display(),
        entries.len()
    );

    Ok(entries)
}

/// Lists every descendant lazily in sorted pre-order.
///
/// Resolution failures surface immediately; per-entry I/O failures are yielded
/// as `Err` items and the walk continues.
pub fn list_recursive(root: &UserRoot, request: &str) -> Result<ConfinedWalk, StorageError> {
    let dir = open_directory(root, request)?;
    info!(
        "Walking directory /{} (real: {})",
        dir.relative(),
        dir.target().display()
    );
    Ok(ConfinedWalk::new(&dir, None))
}

pub(crate) fn open_directory(root: &UserRoot, request: &str) -> Result<ResolvedPath, StorageError> {
    let dir = resolve(root, request)?;
    if !dir.target().is_dir() {
        return Err(StorageError::NotADirectory(request.to_string()));
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn setup() -> (TempDir, UserRoot) {
        let storage = TempDir::new().unwrap();
        let root = UserRoot::provision(storage.path(), "alice").unwrap();
        (storage, root)
    }

    #[test]
    fn test_empty_root_lists_nothing() {
        let (_storage, root) = setup();
        assert!(list(&root, "").unwrap().is_empty());
        assert_eq!(list_recursive(&root, "").unwrap().count(), 0);
    }

    #[test]
    fn test_list_sorted_one_level() {
        let (_storage, root) = setup();
        let base = root.real_path();
        fs::write(base.join("b.txt"), b"bb").unwrap();
        fs::create_dir(base.join("a_dir")).unwrap();
        fs::write(base.join("a_dir/inner.txt"), b"x").unwrap();
        fs::write(base.join("c.txt"), b"").unwrap();

        let entries = list(&root, "").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a_dir", "b.txt", "c.txt"]);

        assert!(entries[0].is_directory);
        assert_eq!(entries[0].size, None);
        assert!(entries[1].is_file);
        assert_eq!(entries[1].size, Some(2));
        assert!(entries.iter().all(|e| e.depth == 0));
    }

    #[test]
    fn test_recursive_depth_matches_separators() {
        let (_storage, root) = setup();
        let base = root.real_path();
        fs::create_dir_all(base.join("a/b/c")).unwrap();
        fs::write(base.join("a/b/c/deep.txt"), b"deep").unwrap();
        fs::write(base.join("top.txt"), b"top").unwrap();

        let entries: Vec<_> = list_recursive(&root, "")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        let paths: Vec<_> = entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["a", "a/b", "a/b/c", "a/b/c/deep.txt", "top.txt"]);
        for entry in &entries {
            assert_eq!(entry.depth, entry.relative_path.matches('/').count());
        }
    }

    #[test]
    fn test_recursive_from_subdirectory() {
        let (_storage, root) = setup();
        let base = root.real_path();
        fs::create_dir_all(base.join("docs/notes")).unwrap();
        fs::write(base.join("docs/notes/n.txt"), b"n").unwrap();

        let entries: Vec<_> = list_recursive(&root, "docs")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries[0].relative_path, "notes");
        assert_eq!(entries[0].depth, 0);
        assert_eq!(entries[1].relative_path, "notes/n.txt");
        assert_eq!(entries[1].depth, 1);
    }

    #[test]
    fn test_escaping_and_dangling_links_omitted() {
        let (storage, root) = setup();
        let outside = storage.path().join("outside");
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("secret.txt"), b"secret").unwrap();

        let base = root.real_path();
        fs::create_dir(base.join("inner")).unwrap();
        fs::write(base.join("inner/ok.txt"), b"ok").unwrap();
        symlink(&outside, base.join("escape")).unwrap();
        symlink("missing", base.join("dangling")).unwrap();
        symlink("inner", base.join("alias")).unwrap();

        let names: Vec<_> = list(&root, "").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["alias", "inner"]);

        let paths: Vec<_> = list_recursive(&root, "")
            .unwrap()
            .map(|e| e.unwrap().relative_path)
            .collect();
        assert_eq!(paths, vec!["alias", "alias/ok.txt", "inner", "inner/ok.txt"]);
        assert!(paths.iter().all(|p| !p.contains("secret")));
    }

    #[test]
    fn test_cycle_terminates() {
        let (_storage, root) = setup();
        let base = root.real_path();
        fs::create_dir(base.join("loop")).unwrap();
        symlink("..", base.join("loop/up")).unwrap();

        let paths: Vec<_> = list_recursive(&root, "")
            .unwrap()
            .map(|e| e.unwrap().relative_path)
            .collect();
        assert_eq!(paths, vec!["loop"]);
    }

    #[test]
    fn test_missing_or_file_is_not_found() {
        let (_storage, root) = setup();
        fs::write(root.real_path().join("f.txt"), b"f").unwrap();

        assert_eq!(list(&root, "nope").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(list(&root, "f.txt").unwrap_err().kind(), ErrorKind::NotFound);
        assert!(matches!(
            list_recursive(&root, "f.txt"),
            Err(StorageError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_traversal_rejected() {
        let (_storage, root) = setup();
        assert_eq!(list(&root, "../").unwrap_err().kind(), ErrorKind::PathViolation);
    }
}
