use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace};

use crate::error::Error;
use crate::shutdown::ShutdownHook;

/// Flag appended to every command line to keep ffmpeg's banner out of the output.
pub const HIDE_BANNER: &str = "-hide_banner";

/// Owns one ffmpeg process: its arguments, the running child and its streams.
///
/// Arguments are passed to the process one by one and are never interpreted
/// by a shell. Dropping the handle destroys the process.
#[derive(Debug)]
pub struct ProcessHandle {
    executable: PathBuf,
    args: Vec<OsString>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    shutdown_hook: Option<ShutdownHook>,
}

impl ProcessHandle {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            child: None,
            stdin: None,
            stdout: None,
            stderr: None,
            shutdown_hook: None,
        }
    }

    /// Appends one argument to the command line.
    pub fn add_argument(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// The full argument list the process is started with, banner flag included.
    pub fn command_line(&self) -> Vec<OsString> {
        let mut args = self.args.clone();
        args.push(HIDE_BANNER.into());
        args
    }

    /// Spawns the process with the accumulated arguments.
    ///
    /// With `destroy_on_shutdown` the process is entered in the
    /// [shutdown registry](crate::shutdown) and killed if the handle is dropped
    /// without being destroyed. With `open_streams` its stdin, stdout and
    /// stderr are piped and available through the `take_*` methods; otherwise
    /// they are discarded.
    ///
    /// A previously started process is destroyed first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] if the operating system cannot create the process.
    pub fn execute(&mut self, destroy_on_shutdown: bool, open_streams: bool) -> Result<(), Error> {
        self.destroy();

        let stdio = || {
            if open_streams {
                Stdio::piped()
            } else {
                Stdio::null()
            }
        };

        let mut cmd = Command::new(&self.executable);
        cmd.args(self.command_line())
            .stdin(stdio())
            .stdout(stdio())
            .stderr(stdio())
            .kill_on_drop(destroy_on_shutdown);

        debug!(executable = %self.executable.display(), args = ?self.args, "spawning ffmpeg");
        let mut child = cmd.spawn().map_err(|e| Error::Launch { source: e })?;

        if destroy_on_shutdown {
            if let Some(pid) = child.id() {
                self.shutdown_hook = Some(ShutdownHook::register(pid));
            }
        }
        if open_streams {
            self.stdin = child.stdin.take();
            self.stdout = child.stdout.take();
            self.stderr = child.stderr.take();
        }
        self.child = Some(child);
        Ok(())
    }

    /// Takes the process's standard input, if streams were opened.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Takes the process's standard output, if streams were opened.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Takes the process's standard error, if streams were opened.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Waits for the process to exit and returns its exit code.
    ///
    /// A process ended by a signal reports `128 + signal`. Any piped output
    /// must be drained concurrently, or a process blocked on a full pipe will
    /// never exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if no process is running.
    pub async fn exit_code(&mut self) -> Result<i32, Error> {
        let child = self.child.as_mut().ok_or(Error::NotStarted)?;
        let status = child.wait().await?;
        // The pid is free for reuse once reaped.
        self.shutdown_hook = None;
        Ok(exit_code_of(status))
    }

    /// Closes the streams still held by the handle, kills the process and
    /// removes its shutdown registration.
    ///
    /// Safe to call when nothing was started and safe to call repeatedly.
    pub fn destroy(&mut self) {
        if self.stdin.take().is_some() {
            trace!("closed ffmpeg stdin");
        }
        if self.stdout.take().is_some() {
            trace!("closed ffmpeg stdout");
        }
        if self.stderr.take().is_some() {
            trace!("closed ffmpeg stderr");
        }
        if let Some(mut child) = self.child.take() {
            // Fails only if the process was already reaped.
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "ffmpeg process already finished");
            }
        }
        self.shutdown_hook = None;
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// The error for a stream that should have been piped but is not held by the handle.
pub(crate) fn missing_stream(name: &str) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("ffmpeg {name} was not captured"),
    ))
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
