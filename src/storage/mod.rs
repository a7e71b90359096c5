//! File system storage management
//!
//! Handles path confinement and the file operations built on top of it.

pub mod operations;
pub mod results;
pub mod validation;

pub use operations::{archive, copy_item, create_folder, delete, download, move_item, rename, upload};
pub use results::{DeleteFailure, DeleteReport};
pub use validation::{ResolvedPath, UserRoot, resolve, resolve_new};
