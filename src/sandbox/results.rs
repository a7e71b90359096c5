//! Sandbox result types

use std::time::Duration;

use crate::error::ErrorKind;
use crate::sandbox::process::ProcessOutcome;

/// Outcome of one script execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Ran to completion with exit code 0 and was not killed
    pub success: bool,
    pub output: String,
    pub error_output: String,
    /// `None` when the process was terminated by a signal, the watchdog included
    pub return_code: Option<i32>,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn from_outcome(outcome: ProcessOutcome) -> Self {
        let return_code = outcome.status.and_then(|status| status.code());
        Self {
            success: !outcome.timed_out && return_code == Some(0),
            output: outcome.stdout,
            error_output: outcome.stderr,
            return_code,
            timed_out: outcome.timed_out,
        }
    }

    /// Failure class of a watchdog-terminated run; `None` otherwise.
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.timed_out.then_some(ErrorKind::Timeout)
    }

    pub fn timeout_message(&self, timeout: Duration) -> Option<String> {
        self.timed_out
            .then(|| format!("Execution timed out after {:.1} seconds", timeout.as_secs_f64()))
    }
}
