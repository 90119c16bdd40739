//! Helpers for running collaborator processes with timeouts and bounded output.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Last non-empty stderr line, for short failure reasons.
    pub fn stderr_tail(&self) -> String {
        String::from_utf8_lossy(&self.stderr)
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string()
    }
}

/// Why a collaborator command did not succeed.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{label} timed out after {timeout_secs}s")]
    TimedOut { label: String, timeout_secs: u64 },
    #[error("{label} exited with status {code:?}: {stderr}")]
    Exited {
        label: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Build a `Command` from an argv-style config array.
pub fn command_from_argv(argv: &[String], workdir: &Path) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("command must be a non-empty array"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(workdir);
    Ok(cmd)
}

/// Map timeouts and non-zero exits to a [`CommandError`].
pub fn ensure_success(label: &str, timeout: Duration, output: &CommandOutput) -> Result<()> {
    if output.timed_out {
        return Err(CommandError::TimedOut {
            label: label.to_string(),
            timeout_secs: timeout.as_secs(),
        }
        .into());
    }
    if !output.status.success() {
        return Err(CommandError::Exited {
            label: label.to_string(),
            code: output.status.code(),
            stderr: output.stderr_tail(),
        }
        .into());
    }
    Ok(())
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_exit_status() {
        let output =
            run_command_with_timeout(sh("echo hello; echo oops >&2; exit 3"), Duration::from_secs(5), 1024)
                .expect("run");
        assert_eq!(output.stdout_lossy(), "hello\n");
        assert_eq!(output.stderr_tail(), "oops");
        assert_eq!(output.status.code(), Some(3));
        let err = ensure_success("probe", Duration::from_secs(5), &output).expect_err("exit 3");
        assert!(matches!(
            err.downcast_ref::<CommandError>(),
            Some(CommandError::Exited { code: Some(3), .. })
        ));
    }

    #[test]
    fn kills_on_timeout() {
        let output = run_command_with_timeout(sh("exec sleep 5"), Duration::from_millis(100), 1024)
            .expect("run");
        assert!(output.timed_out);
        let err = ensure_success("slow", Duration::from_millis(100), &output).expect_err("timeout");
        assert!(matches!(
            err.downcast_ref::<CommandError>(),
            Some(CommandError::TimedOut { .. })
        ));
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let output = run_command_with_timeout(sh("printf 'abcdefghij'"), Duration::from_secs(5), 4)
            .expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 6);
    }

    #[test]
    fn argv_must_be_non_empty() {
        assert!(command_from_argv(&[], Path::new(".")).is_err());
    }
}
