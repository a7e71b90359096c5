//! Input validation utilities
//!
//! Provides input validation and sanitization functions.

/// Longest single path segment accepted from a caller.
pub const MAX_NAME_LENGTH: usize = 255;

/// Validate that input is not empty and doesn't contain dangerous characters
pub fn is_valid_input(input: &str, max_length: usize) -> bool {
    !input.trim().is_empty()
        && input.len() <= max_length
        && !input.contains(['\0', '\r', '\n'])
}

/// Validate a single path segment (a file, folder or user directory name).
pub fn is_valid_name(name: &str) -> bool {
    is_valid_input(name, MAX_NAME_LENGTH)
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}
