//! Platform-specific process plumbing: shell spawn, output capture and
//! process-tree termination.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::debug;

/// Combined stdout/stderr collected by a background reader thread.
///
/// The buffer is shared so output read before a forced kill is kept even
/// when the pipe never reaches EOF.
pub(super) struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl OutputCapture {
    fn start(mut reader: io::PipeReader) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&buffer);

        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => shared
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("output pipe read failed: {}", e);
                        break;
                    }
                }
            }
            let _ = tx.send(());
        });

        Self { buffer, done }
    }

    /// Waits until every writer has closed the pipe.
    ///
    /// Returns `false` if the pipe is still open after `timeout`.
    pub(super) fn wait(&self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Takes whatever has been read so far, decoded lossily.
    pub(super) fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner));
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Spawns `command` through the platform shell in its own process group.
///
/// stdout and stderr share one pipe so their interleaving is preserved.
pub(super) fn spawn_shell(command: &str) -> io::Result<(Child, OutputCapture)> {
    let (reader, writer) = io::pipe()?;

    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    let child = cmd.spawn()?;
    // Release our copies of the write end, otherwise EOF never arrives.
    drop(cmd);

    Ok((child, OutputCapture::start(reader)))
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).process_group(0);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Forcibly kills `child` together with every process it started.
///
/// On Unix the child leads its own process group, so the whole group gets
/// SIGKILL. Elsewhere only the direct child can be reached.
#[cfg(unix)]
pub fn terminate_process_tree(child: &mut Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => {}
        // Group already empty.
        Err(Errno::ESRCH) => {}
        Err(e) => {
            debug!("killpg({}) failed: {}, killing child only", pgid, e);
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
pub fn terminate_process_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Signal number that terminated the process, if any.
#[cfg(unix)]
pub(super) fn terminating_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
pub(super) fn terminating_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
