//! Spawning and terminating job processes.
//!
//! Runtimes never touch the OS directly: they go through a [`Launcher`],
//! which hands back a [`ProcessHandle`]. Spawn, terminate and exit polling
//! never block the tick loop.

use std::fmt::Debug;
use std::io;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::SchedulerError;
use crate::types::JobCommand;

/// A spawned job process.
pub trait ProcessHandle: Send + Debug {
    /// OS process id, while known.
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit poll.
    fn has_exited(&mut self) -> bool;

    /// Forcefully terminate the process and everything it spawned.
    fn terminate(&mut self) -> Result<(), SchedulerError>;
}

/// Starts job commands.
pub trait Launcher: Send + Sync {
    fn launch(&self, job: &str, command: &JobCommand)
    -> Result<Box<dyn ProcessHandle>, SchedulerError>;
}

/// Launches real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

impl OsLauncher {
    fn command(job: &str, command: &JobCommand) -> Result<Command, SchedulerError> {
        let mut cmd = match command {
            JobCommand::Shell(line) => {
                let mut cmd = Command::new(platform::SHELL);
                cmd.arg(platform::SHELL_FLAG).arg(line);
                cmd
            }
            JobCommand::Argv(argv) => {
                let (program, args) = argv.split_first().ok_or_else(|| SchedulerError::Spawn {
                    job: job.to_string(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
                })?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        };
        cmd.stdin(Stdio::null());
        platform::configure(&mut cmd);
        Ok(cmd)
    }
}

impl Launcher for OsLauncher {
    fn launch(
        &self,
        job: &str,
        command: &JobCommand,
    ) -> Result<Box<dyn ProcessHandle>, SchedulerError> {
        let child = Self::command(job, command)?
            .spawn()
            .map_err(|source| SchedulerError::Spawn {
                job: job.to_string(),
                source,
            })?;
        debug!(job, pid = ?child.id(), command = %command.display(), "spawned process");

        Ok(Box::new(OsProcess {
            job: job.to_string(),
            child,
        }))
    }
}

/// A child process started by [`OsLauncher`].
#[derive(Debug)]
pub struct OsProcess {
    job: String,
    child: Child,
}

impl ProcessHandle for OsProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) => true,
            Ok(None) => false,
            // Nothing left to wait on.
            Err(_) => true,
        }
    }

    fn terminate(&mut self) -> Result<(), SchedulerError> {
        // No id means the child was already reaped.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        platform::terminate_tree(pid).map_err(|source| SchedulerError::Terminate {
            job: self.job.clone(),
            source,
        })?;

        if let Err(e) = self.child.start_kill() {
            debug!(job = %self.job, pid, error = %e, "direct child already gone");
        }
        if let Err(e) = self.child.try_wait() {
            debug!(job = %self.job, pid, error = %e, "cannot reap direct child");
        }
        Ok(())
    }
}

#[cfg(unix)]
mod platform {
    use std::io;

    use tokio::process::Command;

    pub const SHELL: &str = "sh";
    pub const SHELL_FLAG: &str = "-c";

    /// Each job leads its own process group so the whole tree can be killed.
    pub fn configure(cmd: &mut Command) {
        cmd.process_group(0);
    }

    pub fn terminate_tree(pid: u32) -> io::Result<()> {
        let pgid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

        // SAFETY: killpg only sends a signal; pgid came from a child we spawned
        // as a group leader.
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(())
        } else {
            Err(err)
        }
    }
}

#[cfg(windows)]
mod platform {
    use std::io;
    use std::process::Stdio;

    use tokio::process::Command;

    pub const SHELL: &str = "cmd";
    pub const SHELL_FLAG: &str = "/C";

    pub fn configure(_cmd: &mut Command) {}

    pub fn terminate_tree(pid: u32) -> io::Result<()> {
        let status = std::process::Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        // A non-zero status means the tree is already gone.
        if !status.success() {
            tracing::debug!(pid, "taskkill found nothing to kill");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_argv_is_a_spawn_error() {
        let err = OsLauncher::command("empty", &JobCommand::Argv(vec![])).unwrap_err();
        assert!(matches!(err, SchedulerError::Spawn { ref job, .. } if job == "empty"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_command_exits() {
        let mut process = OsLauncher
            .launch("true", &JobCommand::Shell("exit 0".into()))
            .unwrap();
        assert!(process.id().is_some());

        let mut exited = false;
        for _ in 0..100 {
            if process.has_exited() {
                exited = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(exited);
        // Terminating an exited process is not an error.
        process.terminate().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_kills_process_tree() {
        let mut process = OsLauncher
            .launch("sleeper", &JobCommand::Shell("sleep 30 & sleep 30".into()))
            .unwrap();
        assert!(!process.has_exited());

        process.terminate().unwrap();

        let mut exited = false;
        for _ in 0..100 {
            if process.has_exited() {
                exited = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(exited);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_argv_spawn_failure_names_job() {
        let err = OsLauncher
            .launch(
                "missing",
                &JobCommand::Argv(vec!["/nonexistent/psd-test-binary".into()]),
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Spawn { ref job, .. } if job == "missing"));
    }
}
