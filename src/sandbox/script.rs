//! Temporary script files
//!
//! A script lives inside the user root only for the duration of one execution.

use log::{debug, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ExecError;

/// Owns one temporary script file and removes it when dropped.
#[derive(Debug)]
pub struct ScriptFile {
    path: PathBuf,
}

impl ScriptFile {
    /// Writes `code` to a fresh `.sandbox-<uuid>.<extension>` file in `dir`.
    pub fn create(dir: &Path, extension: &str, code: &str) -> Result<Self, ExecError> {
        let extension = extension.trim_start_matches('.');
        let path = dir.join(format!(".sandbox-{}.{}", Uuid::new_v4(), extension));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(ExecError::ScriptWrite)?;

        // From here on the guard owns the file, so a failed write still cleans up.
        let script = Self { path };
        file.write_all(code.as_bytes())
            .and_then(|()| file.flush())
            .map_err(ExecError::ScriptWrite)?;

        debug!("Wrote script {}", script.path.display());
        Ok(script)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed script {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove script {}: {}", self.path.display(), e),
        }
    }
}
