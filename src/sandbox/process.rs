//! Process spawning
//!
//! Runs one child in its own process group with piped output and a wall-clock
//! deadline. Once the child has exited, on expiry, or if the caller's future is
//! dropped, the whole group is killed with SIGKILL, so no descendant outlives
//! the run.

use log::{debug, warn};
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::ExecError;

/// Loader-injection variables stripped from every child environment.
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
];

/// How long output readers may keep running once the child is gone.
const READER_GRACE: Duration = Duration::from_secs(2);

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Everything needed to start a child; nothing is inherited implicitly.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub working_directory: PathBuf,
    pub program: String,
    pub args: Vec<OsString>,
    pub timeout: Duration,
    pub env_removals: Vec<String>,
    /// Cap on captured bytes per stream
    pub max_output_bytes: usize,
}

/// What a finished (or killed) child left behind
#[derive(Debug)]
pub struct ProcessOutcome {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the deadline expired before the child exited
    pub status: Option<ExitStatus>,
    pub timed_out: bool,
}

/// Kills the process group once, at the latest on drop.
struct GroupGuard {
    pgid: Option<i32>,
}

impl GroupGuard {
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
            // addresses the process group created for this child only.
            let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
            if rc != 0 {
                debug!(
                    "kill(-{}) failed: {}",
                    pgid,
                    std::io::Error::last_os_error()
                );
            }
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Spawns `spec` and waits for it, at most until its deadline.
pub async fn run_process(spec: &ProcessSpec) -> Result<ProcessOutcome, ExecError> {
    let mut std_cmd = std::process::Command::new(&spec.program);
    std_cmd
        .args(&spec.args)
        .current_dir(&spec.working_directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);
    for var in &spec.env_removals {
        std_cmd.env_remove(var);
    }

    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let mut group = GroupGuard {
        pgid: child.id().and_then(|pid| i32::try_from(pid).ok()),
    };
    debug!(
        "Spawned {} (pid {:?}) in {}",
        spec.program,
        child.id(),
        spec.working_directory.display()
    );

    let stdout = child.stdout.take().map(|s| spawn_reader(s, spec.max_output_bytes));
    let stderr = child.stderr.take().map(|s| spawn_reader(s, spec.max_output_bytes));

    let (status, timed_out) = match timeout(spec.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            // Background descendants would otherwise keep the pipes open.
            group.kill();
            (Some(status), false)
        }
        Ok(Err(e)) => return Err(ExecError::Wait(e)),
        Err(_) => {
            warn!(
                "Process {} exceeded {:?}, killing its process group",
                spec.program, spec.timeout
            );
            group.kill();
            if let Err(e) = child.kill().await {
                debug!("Child already gone after group kill: {}", e);
            }
            (None, true)
        }
    };

    Ok(ProcessOutcome {
        stdout: collect(stdout).await,
        stderr: collect(stderr).await,
        status,
        timed_out,
    })
}

/// Bytes captured from one stream so far
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

struct StreamReader {
    handle: JoinHandle<()>,
    captured: Arc<Mutex<Captured>>,
}

fn spawn_reader<R>(reader: R, limit: usize) -> StreamReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let captured = Arc::new(Mutex::new(Captured::default()));
    let handle = tokio::spawn(read_bounded(reader, limit, captured.clone()));
    StreamReader { handle, captured }
}

/// Reads until EOF, keeping at most `limit` bytes. Excess is drained and
/// discarded so the child never blocks on a full pipe.
async fn read_bounded<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
    captured: Arc<Mutex<Captured>>,
) {
    let mut chunk = vec![0u8; 16 * 1024];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let mut sink = captured.lock().unwrap_or_else(PoisonError::into_inner);
        let room = limit.saturating_sub(sink.bytes.len());
        if n > room {
            sink.bytes.extend_from_slice(&chunk[..room]);
            sink.truncated = true;
        } else {
            sink.bytes.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Waits for a reader, then returns whatever it captured, even if it had to be
/// abandoned.
async fn collect(reader: Option<StreamReader>) -> String {
    let Some(StreamReader {
        mut handle,
        captured,
    }) = reader
    else {
        return String::new();
    };

    match timeout(READER_GRACE, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Output reader failed: {}", e),
        Err(_) => {
            // A descendant that left the group still holds the pipe open.
            handle.abort();
            warn!(
                "Output reader did not finish within {:?}, keeping partial output",
                READER_GRACE
            );
        }
    }

    let Captured { bytes, truncated } =
        std::mem::take(&mut *captured.lock().unwrap_or_else(PoisonError::into_inner));
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    fn sh(dir: &TempDir, script: &str, timeout: Duration) -> ProcessSpec {
        ProcessSpec {
            working_directory: dir.path().to_path_buf(),
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            timeout,
            env_removals: DANGEROUS_ENV_VARS.iter().map(|v| v.to_string()).collect(),
            max_output_bytes: 1024,
        }
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let dir = TempDir::new().unwrap();
        let spec = sh(&dir, "echo out; echo err >&2; exit 3", Duration::from_secs(5));
        let outcome = run_process(&spec).await.unwrap();

        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
        assert_eq!(outcome.status.and_then(|s| s.code()), Some(3));
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = TempDir::new().unwrap();
        let spec = sh(&dir, "pwd -P", Duration::from_secs(5));
        let outcome = run_process(&spec).await.unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(outcome.stdout.trim_end(), expected.to_string_lossy());
    }

    #[tokio::test]
    async fn test_deadline_kills_group() {
        let dir = TempDir::new().unwrap();
        let spec = sh(
            &dir,
            "echo started; sleep 30 & while :; do :; done",
            Duration::from_millis(300),
        );

        let started = Instant::now();
        let outcome = run_process(&spec).await.unwrap();

        assert!(outcome.timed_out);
        assert!(outcome.status.is_none());
        assert_eq!(outcome.stdout, "started\n");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    /// True while `pid` names a process that has not yet exited.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            // The state field follows the parenthesised command name.
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .map(|rest| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_background_descendant_does_not_cost_output() {
        let dir = TempDir::new().unwrap();
        let spec = sh(
            &dir,
            "sleep 30 & echo $! > bg.pid; echo 2",
            Duration::from_secs(10),
        );

        let started = Instant::now();
        let outcome = run_process(&spec).await.unwrap();

        assert_eq!(outcome.stdout, "2\n");
        assert!(!outcome.timed_out);
        assert_eq!(outcome.status.and_then(|s| s.code()), Some(0));
        assert!(started.elapsed() < READER_GRACE, "took {:?}", started.elapsed());

        let pid = std::fs::read_to_string(dir.path().join("bg.pid")).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(2);
        while is_running(pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!is_running(pid), "background sleep {} survived the run", pid);
    }

    #[tokio::test]
    async fn test_abandoned_reader_keeps_partial_output() {
        use tokio::io::AsyncWriteExt;

        let (mut writer, reader) = tokio::io::duplex(1024);
        let stream = spawn_reader(reader, 1024);
        writer.write_all(b"partial").await.unwrap();

        // The writer stays open, so the reader only ends through the grace timeout.
        let text = collect(Some(stream)).await;
        assert_eq!(text, "partial");
        drop(writer);
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let dir = TempDir::new().unwrap();
        let spec = sh(
            &dir,
            "i=0; while [ $i -lt 500 ]; do echo 0123456789; i=$((i+1)); done",
            Duration::from_secs(5),
        );
        let outcome = run_process(&spec).await.unwrap();
        assert!(outcome.stdout.ends_with(TRUNCATION_MARKER));
        assert_eq!(outcome.stdout.len(), 1024 + TRUNCATION_MARKER.len());
        assert_eq!(outcome.status.and_then(|s| s.code()), Some(0));
    }

    #[tokio::test]
    async fn test_loader_variables_removed() {
        let dir = TempDir::new().unwrap();
        let mut spec = sh(&dir, "echo \"[${LD_AUDIT-unset}]\"", Duration::from_secs(5));
        spec.env_removals = vec!["LD_AUDIT".into()];
        let outcome = run_process(&spec).await.unwrap();
        assert_eq!(outcome.stdout, "[unset]\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let mut spec = sh(&dir, "true", Duration::from_secs(1));
        spec.program = "definitely-not-an-interpreter".into();
        assert!(matches!(
            run_process(&spec).await,
            Err(ExecError::Spawn { .. })
        ));
    }
}
