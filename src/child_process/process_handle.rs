use std::process::{ExitStatus, Stdio};

use log::{debug, error, info, warn};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::error_handling::types::ChildError;

/// The running child and the command line it was started with.
pub struct ChildProcess {
    pub command: String,
    pub pid: Option<u32>,
    process: Child,
}

/// Pipes of the child, taken once after spawning.
pub struct ChildStdio {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ChildExit {
    /// Exit code the gateway should terminate with: the child's own code, 1 when it had none.
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(1)
    }

    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl ChildProcess {
    /// Runs `command` through the shell with all three standard streams piped.
    ///
    /// The child is killed when the handle is dropped.
    pub fn spawn(command: &str) -> Result<Self, ChildError> {
        let mut cmd = shell_command(command);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Spawning child with command: {:?}", command);
        let process = cmd.spawn().map_err(|e| {
            error!("Failed to spawn child `{}`: {}", command, e);
            ChildError::SpawnFailed(e)
        })?;
        let pid = process.id();
        info!("Child started (pid {:?}): {}", pid, command);

        Ok(Self {
            command: command.to_string(),
            pid,
            process,
        })
    }

    pub fn take_stdio(&mut self) -> Result<ChildStdio, ChildError> {
        let stdin = self.process.stdin.take().ok_or(ChildError::MissingPipe("stdin"))?;
        let stdout = self.process.stdout.take().ok_or(ChildError::MissingPipe("stdout"))?;
        let stderr = self.process.stderr.take().ok_or(ChildError::MissingPipe("stderr"))?;
        Ok(ChildStdio {
            stdin,
            stdout,
            stderr,
        })
    }

    /// Waits for the child to exit.
    pub async fn wait(&mut self) -> Result<ChildExit, ChildError> {
        let status = self.process.wait().await.map_err(ChildError::WaitFailed)?;
        let exit = ChildExit::from_status(status);
        info!(
            "Child exited with code {:?} and signal {:?}",
            exit.code, exit.signal
        );
        Ok(exit)
    }

    /// Best-effort termination; an already exited child is not an error.
    pub async fn kill(&mut self) {
        debug!("Terminating child (pid {:?})", self.pid);
        if let Err(e) = self.process.kill().await {
            warn!("Failed to kill child (pid {:?}): {}", self.pid, e);
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
