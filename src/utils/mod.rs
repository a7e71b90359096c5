//! Utility functions
//!
//! Input validation shared by the path resolver and the credential parser.

pub mod validation;
