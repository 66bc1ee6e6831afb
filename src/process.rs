#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::Stdio,
};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncReadExt, BufReader},
    process::{Child, Command},
};

/// Drop guard that terminates a spawned child process, and every process it
/// started, when the future awaiting it is dropped, e.g. because the watchdog
/// fired.
struct ChildDropGuard {
    /// The child, until it finishes normally.
    child: Option<Child>,
    /// Process group led by the child.
    group: Option<u32>,
}

impl ChildDropGuard {
    /// Wraps the provided child process with the drop guard.
    fn new(child: Child) -> Self {
        let group = child.id();
        Self {
            child: Some(child),
            group,
        }
    }

    /// Returns a mutable reference to the underlying child process.
    fn child_mut(&mut self) -> Result<&mut Child> {
        self.child
            .as_mut()
            .context("child process already taken from guard")
    }

    /// Prevents the guard from killing the process on drop.
    fn disarm(mut self) {
        self.child = None;
    }
}

/// Sends `SIGKILL` to every member of the process group `group`.
#[cfg(unix)]
fn kill_group(group: u32) {
    let Ok(pgid) = libc::pid_t::try_from(group) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

/// Without process groups only the direct child is killed.
#[cfg(not(unix))]
fn kill_group(_group: u32) {}

impl Drop for ChildDropGuard {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            tracing::debug!("killing unfinished child process");
            if let Some(group) = self.group {
                kill_group(group);
            }
            let _ = child.start_kill();
        }
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct Collected {
    /// Exit status returned by the process.
    pub status: std::process::ExitStatus,
    /// Contents written to stdout.
    pub stdout: Vec<u8>,
    /// Contents written to stderr.
    pub stderr: Vec<u8>,
}

impl Collected {
    /// Last `lines` lines of stderr, lossily decoded.
    pub fn stderr_tail(&self, lines: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let all: Vec<&str> = text.lines().collect();
        all[all.len().saturating_sub(lines)..].join("\n")
    }
}

/// Spawns a command with stdin closed and collects stdout/stderr.
///
/// On unix the child leads a new process group. Dropping the returned future
/// before it completes kills that whole group, so grandchildren such as a
/// notebook kernel go down with the launcher.
///
/// * `cwd`: working directory of the child, if any.
pub async fn run_collect(
    program: impl AsRef<OsStr>,
    args: &[OsString],
    cwd: Option<&Path>,
) -> Result<Collected> {
    let program = program.as_ref();
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let mut guard = ChildDropGuard::new(
        cmd.spawn()
            .with_context(|| format!("failed to spawn {}", program.to_string_lossy()))?,
    );

    let stdout = guard
        .child_mut()?
        .stdout
        .take()
        .context("missing stdout pipe")?;
    let stderr = guard
        .child_mut()?
        .stderr
        .take()
        .context("missing stderr pipe")?;

    let out_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .context("failed to read stdout")?;
        Ok::<Vec<u8>, anyhow::Error>(buf)
    });

    let err_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .context("failed to read stderr")?;
        Ok::<Vec<u8>, anyhow::Error>(buf)
    });

    let status = guard
        .child_mut()?
        .wait()
        .await
        .context("failed to wait on process")?;
    let stdout = out_task.await.context("stdout task join error")??;
    let stderr = err_task.await.context("stderr task join error")??;
    guard.disarm();
    Ok(Collected {
        status,
        stdout,
        stderr,
    })
}
