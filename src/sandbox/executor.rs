//! Sandbox executor
//!
//! Runs caller-supplied code with the user root as working directory under a
//! wall-clock budget. There is no CPU, memory or syscall confinement: the child
//! shares the host OS with the server.

use log::{info, warn};
use std::ffi::OsString;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::config::SandboxConfig;
use crate::error::ExecError;
use crate::sandbox::process::{DANGEROUS_ENV_VARS, ProcessSpec, run_process};
use crate::sandbox::results::ExecutionResult;
use crate::sandbox::script::ScriptFile;
use crate::storage::validation::{UserRoot, resolve};

/// Shared, cloneable handle to the execution engine
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    config: Arc<SandboxConfig>,
    permits: Arc<Semaphore>,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config: Arc::new(config),
            permits,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Runs `code` inside `root` and reports how it ended.
    ///
    /// A run killed by the watchdog is still `Ok`, with `timed_out` set. The
    /// temporary script is removed on every exit path, including when the
    /// returned future is dropped mid-run.
    pub async fn execute(&self, root: &UserRoot, code: &str) -> Result<ExecutionResult, ExecError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExecError::Unavailable)?;

        let workdir = resolve(root, "")?;
        let script = ScriptFile::create(workdir.target(), &self.config.script_extension, code)?;

        let mut args: Vec<OsString> = self
            .config
            .interpreter_args
            .iter()
            .map(OsString::from)
            .collect();
        args.push(script.path().as_os_str().to_owned());

        let spec = ProcessSpec {
            working_directory: workdir.target().to_path_buf(),
            program: self.config.interpreter.clone(),
            args,
            timeout: self.timeout(),
            env_removals: DANGEROUS_ENV_VARS.iter().map(|v| v.to_string()).collect(),
            max_output_bytes: self.config.max_output_bytes,
        };

        let started = Instant::now();
        let outcome = run_process(&spec).await?;
        drop(script);

        let result = ExecutionResult::from_outcome(outcome);
        if result.timed_out {
            warn!(
                "Execution for {} timed out after {:?}",
                root.name(),
                spec.timeout
            );
        } else {
            info!(
                "Execution for {} finished in {:?} (return code {:?})",
                root.name(),
                started.elapsed(),
                result.return_code
            );
        }

        Ok(result)
    }
}
