//! Process tree snapshots.
//!
//! The shutdown protocol needs the direct children of a supervised process
//! (players such as mplayer fork helpers that keep the output pipe open).
//! A snapshot comes from a single `ps` invocation and is best-effort: a
//! child forked after the snapshot is simply not in it.

use std::collections::{BTreeMap, BTreeSet};
use std::process::{Command, Stdio};

use crate::tools::resolve_program;
use crate::{Error, Result};

/// Parent pid to child pids, captured at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessTree {
    children: BTreeMap<u32, BTreeSet<u32>>,
}

impl ProcessTree {
    /// Capture the current process table by running `ps ax -o pid,ppid`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if `ps` cannot be run or fails.
    pub fn snapshot() -> Result<Self> {
        let ps = resolve_program("ps");
        let output = Command::new(&ps)
            .args(["ax", "-o", "pid,ppid"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| Error::Unavailable(format!("{}: {e}", ps.display())))?;

        if !output.status.success() {
            return Err(Error::Unavailable(format!(
                "{} exited with {}",
                ps.display(),
                output.status
            )));
        }

        Ok(Self::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Parse `pid ppid` rows. The header and malformed rows are skipped.
    pub fn parse(listing: &str) -> Self {
        let mut tree = Self::default();
        for line in listing.lines() {
            let mut cols = line.split_whitespace();
            let (Some(pid), Some(ppid), None) = (cols.next(), cols.next(), cols.next()) else {
                continue;
            };
            if let (Ok(pid), Ok(ppid)) = (pid.parse::<u32>(), ppid.parse::<u32>()) {
                tree.insert(ppid, pid);
            }
        }
        tree
    }

    /// Record `child` under `parent`.
    pub fn insert(&mut self, parent: u32, child: u32) {
        self.children.entry(parent).or_default().insert(child);
    }

    /// Direct children of `pid`. Grandchildren are not included.
    pub fn children(&self, pid: u32) -> impl Iterator<Item = u32> + '_ {
        self.children
            .get(&pid)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Number of parents with at least one child.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl FromIterator<(u32, u32)> for ProcessTree {
    /// Build from `(parent, child)` pairs.
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        let mut tree = Self::default();
        for (parent, child) in iter {
            tree.insert(parent, child);
        }
        tree
    }
}

/// Where the shutdown protocol gets its process tree from.
pub trait ProcessTreeSource {
    fn snapshot(&self) -> Result<ProcessTree>;
}

/// Snapshots taken from the `ps` listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PsProcessTree;

impl ProcessTreeSource for PsProcessTree {
    fn snapshot(&self) -> Result<ProcessTree> {
        ProcessTree::snapshot()
    }
}
