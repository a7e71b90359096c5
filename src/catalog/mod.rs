//! Directory catalog
//!
//! Flat and recursive listings of a user's directories.

pub mod operations;
pub mod results;
pub mod walker;

pub use operations::{list, list_recursive};
pub use results::DirEntry;
pub use walker::ConfinedWalk;
