//! Shell command runner with a hard deadline.
//!
//! Every command runs through `sh -c` in a fresh process group. Output from
//! stdout and stderr is captured together. The result always carries an
//! exit code, including for failures that never produced one:
//!
//! | situation              | exit code    |
//! |------------------------|--------------|
//! | success                | 0            |
//! | non-zero exit          | real status  |
//! | killed by a signal     | 128 + signal |
//! | empty command string   | 1            |
//! | deadline exceeded      | 124          |
//! | shell could not launch | 127          |
//!
//! On timeout the whole process group is killed, so descendants started by
//! the command do not outlive the run.

mod process;

use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

pub use process::terminate_process_tree;

/// Exit code reported for an empty command string.
pub const EXIT_EMPTY_COMMAND: i32 = 1;
/// Exit code reported when the deadline is exceeded (same as `timeout(1)`).
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit code reported when the command could not be launched.
pub const EXIT_LAUNCH_FAILURE: i32 = 127;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to wait for the output pipe to close after a forced kill.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Why a command run did not succeed.
#[derive(Debug)]
pub enum ExecError {
    /// Nothing to run; no process was spawned.
    EmptyCommand,
    /// The shell could not be started.
    Spawn(std::io::Error),
    /// Waiting on the child failed.
    Wait(std::io::Error),
    /// The deadline passed and the process group was killed.
    Timeout(Duration),
    /// The command exited with a non-zero status.
    NonZeroExit(i32),
    /// The command was terminated by a signal it did not get from us.
    Signaled(i32),
}

impl ExecError {
    /// Exit code this failure is reported as.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::EmptyCommand => EXIT_EMPTY_COMMAND,
            ExecError::Spawn(_) | ExecError::Wait(_) => EXIT_LAUNCH_FAILURE,
            ExecError::Timeout(_) => EXIT_TIMEOUT,
            ExecError::NonZeroExit(code) => *code,
            ExecError::Signaled(sig) => 128 + sig,
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::EmptyCommand => write!(f, "empty command"),
            ExecError::Spawn(e) => write!(f, "failed to launch command: {}", e),
            ExecError::Wait(e) => write!(f, "failed to wait for command: {}", e),
            ExecError::Timeout(d) => write!(f, "command timed out after {:?}", d),
            ExecError::NonZeroExit(code) => write!(f, "exit status {}", code),
            ExecError::Signaled(sig) => write!(f, "terminated by signal {}", sig),
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecError::Spawn(e) | ExecError::Wait(e) => Some(e),
            _ => None,
        }
    }
}

/// Outcome of one command run.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Combined stdout and stderr.
    pub output: String,
    /// Always set; see the module table for the failure conventions.
    pub exit_code: i32,
    /// Whether the process finished before the deadline.
    pub completed: bool,
    pub error: Option<ExecError>,
}

impl ExecutionResult {
    fn failed(output: String, error: ExecError) -> Self {
        Self {
            output,
            exit_code: error.exit_code(),
            completed: !matches!(error, ExecError::Timeout(_)),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs `command` through the shell, waiting at most `timeout`.
///
/// Never fails: launch problems and timeouts are reported through
/// [`ExecutionResult::error`] with the matching exit code.
pub fn run_command(command: &str, timeout: Duration) -> ExecutionResult {
    if command.is_empty() {
        return ExecutionResult::failed(String::new(), ExecError::EmptyCommand);
    }

    let started = Instant::now();
    // A timeout too large to represent as an instant means no deadline.
    let deadline = started.checked_add(timeout);

    let (mut child, capture) = match process::spawn_shell(command) {
        Ok(spawned) => spawned,
        Err(e) => return ExecutionResult::failed(String::new(), ExecError::Spawn(e)),
    };

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if deadline.is_some_and(|d| Instant::now() >= d) => {
                terminate_process_tree(&mut child);
                if let Err(e) = child.wait() {
                    debug!("wait after kill failed: {}", e);
                }
                capture.wait(DRAIN_GRACE);
                return ExecutionResult::failed(capture.take(), ExecError::Timeout(timeout));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                terminate_process_tree(&mut child);
                let _ = child.wait();
                capture.wait(DRAIN_GRACE);
                return ExecutionResult::failed(capture.take(), ExecError::Wait(e));
            }
        }
    };

    // Background descendants may still hold the pipe open.
    let remaining = deadline.map_or(Duration::MAX, |d| {
        d.saturating_duration_since(Instant::now())
    });
    if !capture.wait(remaining.max(POLL_INTERVAL)) {
        debug!("output still open after command exited, killing its process group");
        terminate_process_tree(&mut child);
        capture.wait(DRAIN_GRACE);
    }
    let output = capture.take();

    debug!(
        "command finished in {:?} with {}",
        started.elapsed(),
        status
    );

    if status.success() {
        return ExecutionResult {
            output,
            exit_code: 0,
            completed: true,
            error: None,
        };
    }

    let error = match (status.code(), process::terminating_signal(&status)) {
        (Some(code), _) => ExecError::NonZeroExit(code),
        (None, Some(sig)) => ExecError::Signaled(sig),
        (None, None) => ExecError::NonZeroExit(EXIT_LAUNCH_FAILURE),
    };
    ExecutionResult::failed(output, error)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn test_success_captures_output() {
        let result = run_command("echo hello", TIMEOUT);
        assert!(result.is_success());
        assert!(result.completed);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output, "hello\n");
    }

    #[test]
    fn test_stderr_is_combined() {
        let result = run_command("echo out; echo err 1>&2", TIMEOUT);
        assert!(result.is_success());
        assert_eq!(result.output, "out\nerr\n");
    }

    #[test]
    fn test_empty_command() {
        let result = run_command("", TIMEOUT);
        assert_eq!(result.exit_code, EXIT_EMPTY_COMMAND);
        assert!(matches!(result.error, Some(ExecError::EmptyCommand)));
        assert!(result.output.is_empty());
    }

    #[test]
    fn test_non_zero_exit_keeps_real_code() {
        for code in [1, 2, 42, 255] {
            let result = run_command(&format!("echo partial; exit {}", code), TIMEOUT);
            assert_eq!(result.exit_code, code);
            assert!(result.completed);
            assert!(matches!(result.error, Some(ExecError::NonZeroExit(c)) if c == code));
            assert_eq!(result.output, "partial\n");
        }
    }

    #[test]
    fn test_command_not_found_is_127() {
        let result = run_command("definitely-not-a-real-command-xyz", TIMEOUT);
        assert_eq!(result.exit_code, EXIT_LAUNCH_FAILURE);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_signal_exit_code() {
        let result = run_command("kill -TERM $$", TIMEOUT);
        assert_eq!(result.exit_code, 128 + 15);
        assert!(matches!(result.error, Some(ExecError::Signaled(15))));
    }

    #[test]
    fn test_timeout_reports_124() {
        let started = Instant::now();
        let result = run_command("echo before; sleep 30", Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.exit_code, EXIT_TIMEOUT);
        assert!(!result.completed);
        assert!(matches!(result.error, Some(ExecError::Timeout(_))));
        assert!(result.error.unwrap().to_string().contains("timed out"));
        assert_eq!(result.output, "before\n");
    }

    #[test]
    fn test_background_child_does_not_block_past_deadline() {
        let started = Instant::now();
        let result = run_command("sleep 30 & echo started", Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output, "started\n");
    }

    #[test]
    fn test_huge_timeout_runs_without_deadline() {
        let result = run_command("echo late", Duration::from_secs(u64::MAX));
        assert!(result.is_success());
        assert_eq!(result.output, "late\n");

        let result = run_command("exit 4", Duration::MAX);
        assert_eq!(result.exit_code, 4);
        assert!(result.completed);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_timeout_kills_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("child.pid");
        let command = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

        let result = run_command(&command, Duration::from_millis(500));
        assert_eq!(result.exit_code, EXIT_TIMEOUT);

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(wait_until_gone(pid), "descendant {} still running", pid);
    }

    /// A process counts as gone once it no longer exists or is a zombie.
    #[cfg(target_os = "linux")]
    fn wait_until_gone(pid: i32) -> bool {
        let stat_path = format!("/proc/{}/stat", pid);
        for _ in 0..200 {
            match std::fs::read_to_string(&stat_path) {
                Err(_) => return true,
                Ok(stat) => {
                    let state = stat
                        .rsplit_once(')')
                        .and_then(|(_, rest)| rest.trim_start().chars().next());
                    if state == Some('Z') || state == Some('X') {
                        return true;
                    }
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }
}
