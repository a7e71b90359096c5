//! Server core functionality
//!
//! Binds the listener and serves the HTTP router until shutdown.

pub mod core;

pub use self::core::{Server, build_app};
