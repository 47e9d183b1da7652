//! Escalating shutdown of supervised processes.
//!
//! The protocol, in order:
//!
//! 1. if the process asked for it, SIGTERM every direct child found in a
//!    fresh [`ProcessTree`](crate::ProcessTree) snapshot;
//! 2. return if the process already exited;
//! 3. SIGTERM the process, returning if the OS refuses;
//! 4. poll for exit, sleeping `unit * i² / 100` before poll `i + 1`;
//! 5. SIGKILL if it is still alive.
//!
//! Every signal error is swallowed. Running the protocol twice is harmless:
//! the second run stops at step 2.

use std::thread;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::process::SupervisedProcess;
use crate::tree::{ProcessTreeSource, PsProcessTree};

/// Default number of polls before SIGKILL.
pub const DEFAULT_MAX_POLLS: u32 = 19;

/// What the shutdown protocol needs from a process.
pub trait Supervised {
    fn pid(&self) -> u32;
    fn terminate_descendants(&self) -> bool;
    /// Reap without blocking; `Some` once the process has exited.
    fn poll_exit(&mut self) -> Option<i32>;
}

/// Delivers signals by pid.
pub trait Signaller {
    fn signal(&self, pid: u32, signal: Signal) -> nix::Result<()>;
}

/// `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSignaller;

impl Signaller for SystemSignaller {
    fn signal(&self, pid: u32, signal: Signal) -> nix::Result<()> {
        let pid = i32::try_from(pid).map_err(|_| nix::errno::Errno::EINVAL)?;
        kill(Pid::from_raw(pid), signal)
    }
}

/// Timing of the wait between SIGTERM and SIGKILL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// Scale of the back-off. Poll `i` sleeps `unit * i² / 100`.
    pub unit: Duration,
    /// Number of sleeps before giving up.
    pub max_polls: u32,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            unit: Duration::from_secs(1),
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

impl ShutdownPolicy {
    /// The sleeps between polls, strictly increasing.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> {
        let unit = self.unit;
        (1..=self.max_polls).map(move |i| unit * (i * i) / 100)
    }

    /// Longest time a process is given between SIGTERM and SIGKILL.
    pub fn max_wait(&self) -> Duration {
        self.backoff().sum()
    }
}

/// How a run of the shutdown protocol ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The process had already exited; nothing was signalled.
    AlreadyExited(i32),
    /// SIGTERM failed, usually because the process is gone.
    Vanished,
    /// The process exited after SIGTERM.
    Exited(i32),
    /// SIGKILL was delivered.
    Killed,
    /// SIGKILL failed too.
    Unkillable,
}

/// Runs the shutdown protocol.
pub struct Terminator {
    policy: ShutdownPolicy,
    signaller: Box<dyn Signaller>,
    tree: Box<dyn ProcessTreeSource>,
}

impl Default for Terminator {
    fn default() -> Self {
        Self::new(ShutdownPolicy::default())
    }
}

impl std::fmt::Debug for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Terminator {
    pub fn new(policy: ShutdownPolicy) -> Self {
        Self {
            policy,
            signaller: Box::new(SystemSignaller),
            tree: Box::new(PsProcessTree),
        }
    }

    /// Replace how signals are delivered.
    pub fn with_signaller(mut self, signaller: impl Signaller + 'static) -> Self {
        self.signaller = Box::new(signaller);
        self
    }

    /// Replace where process tree snapshots come from.
    pub fn with_tree_source(mut self, tree: impl ProcessTreeSource + 'static) -> Self {
        self.tree = Box::new(tree);
        self
    }

    pub fn policy(&self) -> ShutdownPolicy {
        self.policy
    }

    /// Run the shutdown protocol on `process`.
    pub fn terminate<P: Supervised + ?Sized>(&self, process: &mut P) -> ShutdownOutcome {
        let pid = process.pid();

        if process.terminate_descendants() {
            self.signal_children(pid);
        }

        if let Some(status) = process.poll_exit() {
            return ShutdownOutcome::AlreadyExited(status);
        }

        debug!(pid, "sending SIGTERM");
        if let Err(e) = self.signaller.signal(pid, Signal::SIGTERM) {
            debug!(pid, error = %e, "SIGTERM failed");
            return ShutdownOutcome::Vanished;
        }

        for delay in self.policy.backoff() {
            if let Some(status) = process.poll_exit() {
                return ShutdownOutcome::Exited(status);
            }
            thread::sleep(delay);
        }
        if let Some(status) = process.poll_exit() {
            return ShutdownOutcome::Exited(status);
        }

        warn!(
            pid,
            "still running {:?} after SIGTERM, sending SIGKILL",
            self.policy.max_wait()
        );
        match self.signaller.signal(pid, Signal::SIGKILL) {
            Ok(()) => ShutdownOutcome::Killed,
            Err(e) => {
                debug!(pid, error = %e, "SIGKILL failed");
                ShutdownOutcome::Unkillable
            }
        }
    }

    /// Terminate `process`, reap it if it was killed, and mark it released
    /// so dropping it does nothing further.
    pub fn release(&self, process: &mut SupervisedProcess) -> ShutdownOutcome {
        let outcome = self.terminate(process);
        if outcome == ShutdownOutcome::Killed {
            if let Err(e) = process.wait() {
                warn!(pid = process.pid(), error = %e, "failed to reap killed process");
            }
        }
        process.mark_released();
        outcome
    }

    fn signal_children(&self, pid: u32) {
        let tree = match self.tree.snapshot() {
            Ok(tree) => tree,
            Err(e) => {
                debug!(pid, error = %e, "no process tree, skipping descendants");
                return;
            }
        };
        for child in tree.children(pid) {
            debug!(pid, child, "sending SIGTERM to child");
            if let Err(e) = self.signaller.signal(child, Signal::SIGTERM) {
                debug!(pid, child, error = %e, "SIGTERM to child failed");
            }
        }
    }
}
