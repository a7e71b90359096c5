//! Error types
//!
//! Defines domain-specific error types for each module of the workspace server
//! and the failure taxonomy every boundary operation reports.

use std::fmt;
use std::io;
use std::net::IpAddr;

/// The single classification every failure is reduced to before it leaves a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PathViolation,
    NotFound,
    Conflict,
    Timeout,
    AdmissionDenied,
    Unauthenticated,
    MalformedRequest,
    IoFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PathViolation => "path_violation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AdmissionDenied => "admission_denied",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::MalformedRequest => "malformed_request",
            ErrorKind::IoFailure => "io_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path confinement errors
#[derive(Debug)]
pub enum PathError {
    AbsolutePath(String),
    DisallowedPrefix(String),
    InvalidSegment(String),
    EscapesRoot(String),
    SymlinkEscape(String),
    Unresolvable(String),
    NotFound(String),
    InvalidUserRoot(String),
    UserRootNotFound(String),
}

impl PathError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PathError::NotFound(_) | PathError::UserRootNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::PathViolation,
        }
    }
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::AbsolutePath(p) => write!(f, "Absolute path not allowed: {}", p),
            PathError::DisallowedPrefix(p) => write!(f, "Disallowed path prefix: {}", p),
            PathError::InvalidSegment(p) => write!(f, "Invalid path segment: {}", p),
            PathError::EscapesRoot(p) => write!(f, "Path escapes user root: {}", p),
            PathError::SymlinkEscape(p) => write!(f, "Symlink target escapes user root: {}", p),
            PathError::Unresolvable(p) => write!(f, "Path cannot be resolved: {}", p),
            PathError::NotFound(p) => write!(f, "Path not found: {}", p),
            PathError::InvalidUserRoot(u) => write!(f, "Invalid user directory: {}", u),
            PathError::UserRootNotFound(u) => write!(f, "User directory does not exist: {}", u),
        }
    }
}

impl std::error::Error for PathError {}

/// Storage module errors
#[derive(Debug)]
pub enum StorageError {
    Path(PathError),
    NotADirectory(String),
    NotAFile(String),
    AlreadyExists(String),
    InvalidName(String),
    InvalidDestination(String),
    Archive(String),
    IoError(io::Error),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Path(e) => e.kind(),
            StorageError::NotADirectory(_) => ErrorKind::NotFound,
            StorageError::AlreadyExists(_) => ErrorKind::Conflict,
            StorageError::NotAFile(_)
            | StorageError::InvalidName(_)
            | StorageError::InvalidDestination(_) => ErrorKind::MalformedRequest,
            StorageError::Archive(_) | StorageError::IoError(_) => ErrorKind::IoFailure,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Path(e) => write!(f, "{}", e),
            StorageError::NotADirectory(p) => write!(f, "Not a directory: {}", p),
            StorageError::NotAFile(p) => write!(f, "Not a file: {}", p),
            StorageError::AlreadyExists(p) => write!(f, "Item already exists: {}", p),
            StorageError::InvalidName(n) => write!(f, "Invalid name: {}", n),
            StorageError::InvalidDestination(p) => write!(f, "Invalid destination: {}", p),
            StorageError::Archive(e) => write!(f, "Archive error: {}", e),
            StorageError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(error: io::Error) -> Self {
        StorageError::IoError(error)
    }
}

impl From<PathError> for StorageError {
    fn from(error: PathError) -> Self {
        StorageError::Path(error)
    }
}

impl From<zip::result::ZipError> for StorageError {
    fn from(error: zip::result::ZipError) -> Self {
        match error {
            zip::result::ZipError::Io(e) => StorageError::IoError(e),
            other => StorageError::Archive(other.to_string()),
        }
    }
}

/// Sandbox execution errors
#[derive(Debug)]
pub enum ExecError {
    Path(PathError),
    ScriptWrite(io::Error),
    Spawn { program: String, source: io::Error },
    Wait(io::Error),
    Unavailable,
}

impl ExecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Path(e) => e.kind(),
            _ => ErrorKind::IoFailure,
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Path(e) => write!(f, "{}", e),
            ExecError::ScriptWrite(e) => write!(f, "Failed to write script file: {}", e),
            ExecError::Spawn { program, source } => {
                write!(f, "Failed to spawn {}: {}", program, source)
            }
            ExecError::Wait(e) => write!(f, "Failed to wait for process: {}", e),
            ExecError::Unavailable => write!(f, "Executor is shutting down"),
        }
    }
}

impl std::error::Error for ExecError {}

impl From<PathError> for ExecError {
    fn from(error: PathError) -> Self {
        ExecError::Path(error)
    }
}

/// Admission gate errors
#[derive(Debug)]
pub enum AdmissionError {
    Denied(IpAddr),
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::Denied(ip) => {
                write!(f, "Address {} is not authorized to access this endpoint", ip)
            }
        }
    }
}

impl std::error::Error for AdmissionError {}

/// Authentication errors
#[derive(Debug)]
pub enum AuthError {
    MissingCredentials,
    MalformedHeader(String),
    InvalidToken,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingCredentials => write!(f, "Authentication credentials were not provided"),
            AuthError::MalformedHeader(h) => write!(f, "Malformed authorization header: {}", h),
            AuthError::InvalidToken => write!(f, "Invalid authentication token"),
        }
    }
}

impl std::error::Error for AuthError {}

/// General server error that encompasses all error types
#[derive(Debug)]
pub enum ServerError {
    Path(PathError),
    Storage(StorageError),
    Exec(ExecError),
    Admission(AdmissionError),
    Auth(AuthError),
    MalformedPayload(String),
    IoError(io::Error),
    Internal(String),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::Path(e) => e.kind(),
            ServerError::Storage(e) => e.kind(),
            ServerError::Exec(e) => e.kind(),
            ServerError::Admission(_) => ErrorKind::AdmissionDenied,
            ServerError::Auth(_) => ErrorKind::Unauthenticated,
            ServerError::MalformedPayload(_) => ErrorKind::MalformedRequest,
            ServerError::IoError(_) | ServerError::Internal(_) => ErrorKind::IoFailure,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Path(e) => write!(f, "{}", e),
            ServerError::Storage(e) => write!(f, "{}", e),
            ServerError::Exec(e) => write!(f, "{}", e),
            ServerError::Admission(e) => write!(f, "{}", e),
            ServerError::Auth(e) => write!(f, "{}", e),
            ServerError::MalformedPayload(e) => write!(f, "Malformed payload: {}", e),
            ServerError::IoError(e) => write!(f, "I/O error: {}", e),
            ServerError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<PathError> for ServerError {
    fn from(error: PathError) -> Self {
        ServerError::Path(error)
    }
}

impl From<StorageError> for ServerError {
    fn from(error: StorageError) -> Self {
        ServerError::Storage(error)
    }
}

impl From<ExecError> for ServerError {
    fn from(error: ExecError) -> Self {
        ServerError::Exec(error)
    }
}

impl From<AdmissionError> for ServerError {
    fn from(error: AdmissionError) -> Self {
        ServerError::Admission(error)
    }
}

impl From<AuthError> for ServerError {
    fn from(error: AuthError) -> Self {
        ServerError::Auth(error)
    }
}

impl From<io::Error> for ServerError {
    fn from(error: io::Error) -> Self {
        ServerError::IoError(error)
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(error: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("background task failed: {}", error))
    }
}
