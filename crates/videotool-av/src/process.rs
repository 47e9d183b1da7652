//! Spawning supervised child processes.
//!
//! A [`SupervisedProcess`] owns one child whose stdout and stderr share a
//! single pipe, so everything the tool prints (progress, warnings, errors)
//! arrives in order on one stream. The read end is handed to the event loop;
//! the child itself is only ever removed through the shutdown protocol in
//! [`crate::shutdown`].

use std::collections::BTreeMap;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use tracing::{debug, warn};

use crate::shutdown::{Supervised, Terminator};
use crate::tools::resolve_program;
use crate::{Error, Result};

/// What the child's stdin is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdinMode {
    /// A pipe that stays open (and unwritten) until the process is released.
    #[default]
    Piped,
    /// `/dev/null`.
    Null,
    /// The parent's stdin.
    Inherit,
}

/// Where the child's stderr goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrMode {
    /// Into the same pipe as stdout.
    #[default]
    Merged,
    /// The parent's stderr.
    Inherit,
    /// `/dev/null`.
    Null,
}

/// Description of a process to spawn.
///
/// # Example
///
/// ```no_run
/// use videotool_av::ProcessSpec;
///
/// let spec = ProcessSpec::new("mplayer")
///     .arg("input.avi")
///     .args(["-vo", "yuv4mpeg:file=/tmp/pipe.y4m"])
///     .terminate_descendants(true);
/// let process = videotool_av::spawn(&spec)?;
/// # Ok::<(), videotool_av::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    current_dir: Option<PathBuf>,
    terminate_descendants: bool,
    stdin: StdinMode,
    stderr: StderrMode,
}

impl ProcessSpec {
    /// Create a spec for the given program name or path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, s: impl Into<String>) -> Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables for the child.
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Run the child in `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Also signal the child's own children on shutdown.
    pub fn terminate_descendants(mut self, yes: bool) -> Self {
        self.terminate_descendants = yes;
        self
    }

    pub fn stdin(mut self, mode: StdinMode) -> Self {
        self.stdin = mode;
        self
    }

    pub fn stderr(mut self, mode: StderrMode) -> Self {
        self.stderr = mode;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Short display name: the program's file name.
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }
}

/// A spawned child under supervision.
#[derive(Debug)]
pub struct SupervisedProcess {
    name: String,
    program: PathBuf,
    child: Child,
    pid: u32,
    output: Option<OwnedFd>,
    exit_status: Option<i32>,
    terminate_descendants: bool,
    released: bool,
}

/// Spawn the process described by `spec`.
///
/// The program is looked up on `PATH` (falling back to the literal name).
/// stdout is piped and, unless the spec says otherwise, stderr is merged
/// into the same pipe.
///
/// # Errors
///
/// Returns [`Error::Spawn`] if the executable is missing or the OS refuses
/// to create the process.
pub fn spawn(spec: &ProcessSpec) -> Result<SupervisedProcess> {
    let program = resolve_program(&spec.program);
    let name = spec.display_name();

    let mut cmd = Command::new(&program);
    cmd.args(&spec.args).envs(&spec.env);
    if let Some(dir) = &spec.current_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(match spec.stdin {
        StdinMode::Piped => Stdio::piped(),
        StdinMode::Null => Stdio::null(),
        StdinMode::Inherit => Stdio::inherit(),
    });

    let merged = match spec.stderr {
        StderrMode::Merged => {
            let (read, write) = output_pipe().map_err(|e| Error::spawn(&program, e))?;
            let write_err = write.try_clone().map_err(|e| Error::spawn(&program, e))?;
            cmd.stdout(Stdio::from(write));
            cmd.stderr(Stdio::from(write_err));
            Some(read)
        }
        StderrMode::Inherit => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::inherit());
            None
        }
        StderrMode::Null => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::null());
            None
        }
    };

    let spawned = cmd.spawn();
    // The command holds the parent's copies of the pipe's write end; they
    // must be closed or the reader never sees end-of-file.
    drop(cmd);
    let mut child = spawned.map_err(|e| Error::spawn(&program, e))?;

    let output = match merged {
        Some(read) => read,
        None => match child.stdout.take() {
            Some(stdout) => OwnedFd::from(stdout),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::spawn(
                    &program,
                    std::io::Error::other("stdout was not captured"),
                ));
            }
        },
    };

    let pid = child.id();
    debug!(
        pid,
        program = %program.display(),
        args = ?spec.args,
        terminate_descendants = spec.terminate_descendants,
        "spawned {name}"
    );

    Ok(SupervisedProcess {
        name,
        program,
        child,
        pid,
        output: Some(output),
        exit_status: None,
        terminate_descendants: spec.terminate_descendants,
        released: false,
    })
}

/// A pipe whose ends are not inherited by unrelated children.
fn output_pipe() -> std::io::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = nix::unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

/// Exit code, or the negated signal number for a signal death.
pub(crate) fn status_code(status: ExitStatus) -> Option<i32> {
    status.code().or_else(|| status.signal().map(|sig| -sig))
}

impl SupervisedProcess {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn terminate_descendants(&self) -> bool {
        self.terminate_descendants
    }

    /// The recorded exit status, without polling.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Take the read end of the output pipe, for registration with the
    /// event loop. Returns `None` the second time.
    pub fn take_output(&mut self) -> Option<OwnedFd> {
        self.output.take()
    }

    /// Reap the child if it has exited, without blocking.
    pub fn poll_exit(&mut self) -> Option<i32> {
        if self.exit_status.is_some() {
            return self.exit_status;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => self.record(status),
            Ok(None) => None,
            Err(e) => {
                warn!(pid = self.pid, error = %e, "failed to poll {}", self.name);
                None
            }
        }
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> Result<Option<i32>> {
        if self.exit_status.is_some() {
            return Ok(self.exit_status);
        }
        let status = self.child.wait()?;
        Ok(self.record(status))
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn mark_released(&mut self) {
        self.released = true;
        self.child.stdin.take();
        self.output.take();
    }

    fn record(&mut self, status: ExitStatus) -> Option<i32> {
        let code = status_code(status);
        debug!(pid = self.pid, status = ?code, "{} exited", self.name);
        self.exit_status = code;
        code
    }
}

impl Supervised for SupervisedProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn terminate_descendants(&self) -> bool {
        self.terminate_descendants
    }

    fn poll_exit(&mut self) -> Option<i32> {
        SupervisedProcess::poll_exit(self)
    }
}

impl Drop for SupervisedProcess {
    fn drop(&mut self) {
        if !self.released {
            Terminator::default().release(self);
        }
    }
}
