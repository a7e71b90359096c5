//! Sandboxed code execution
//!
//! Time-bounded interpreter runs confined to a user's directory.

pub mod executor;
pub mod process;
pub mod results;
pub mod script;

pub use executor::SandboxExecutor;
pub use process::{ProcessSpec, run_process};
pub use results::ExecutionResult;
pub use script::ScriptFile;
