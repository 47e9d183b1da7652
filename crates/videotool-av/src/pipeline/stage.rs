//! One supervised process inside a pipeline.

use std::collections::BTreeSet;

use tracing::trace;

use super::status::{parse_line, StatusFields, StatusPattern};
use super::StageId;
use crate::process::SupervisedProcess;

/// Called with a pattern label and the fields it captured.
pub type StatusCallback = Box<dyn FnMut(&str, &StatusFields)>;

/// Called once when a stage ends abnormally, with its exit status (absent
/// if it could not be determined) and every line it printed.
pub type ErrorCallback = Box<dyn FnMut(Option<i32>, &[String])>;

/// A process wired into a [`Pipeline`](super::Pipeline).
pub struct Stage {
    pub(super) process: SupervisedProcess,
    patterns: Vec<StatusPattern>,
    on_status: Option<StatusCallback>,
    on_error: Option<ErrorCallback>,
    pub(super) dependants: BTreeSet<StageId>,
    transcript: Vec<String>,
    failure_reported: bool,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("process", &self.process)
            .field("patterns", &self.patterns)
            .field("dependants", &self.dependants)
            .field("lines", &self.transcript.len())
            .finish_non_exhaustive()
    }
}

impl Stage {
    pub fn new(process: SupervisedProcess) -> Self {
        Self {
            process,
            patterns: Vec::new(),
            on_status: None,
            on_error: None,
            dependants: BTreeSet::new(),
            transcript: Vec::new(),
            failure_reported: false,
        }
    }

    /// Patterns tried, in order, against every line.
    pub fn with_patterns(mut self, patterns: Vec<StatusPattern>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn on_status(mut self, callback: impl FnMut(&str, &StatusFields) + 'static) -> Self {
        self.on_status = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnMut(Option<i32>, &[String]) + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn name(&self) -> &str {
        self.process.name()
    }

    pub fn process(&self) -> &SupervisedProcess {
        &self.process
    }

    pub fn dependants(&self) -> impl Iterator<Item = StageId> + '_ {
        self.dependants.iter().copied()
    }

    /// Every line seen so far, delimiters included.
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub(super) fn handle_line(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line).into_owned();
        trace!(stage = self.process.name(), "{}", text.trim_end());

        if let Some(callback) = self.on_status.as_mut() {
            for (label, fields) in parse_line(&self.patterns, &text) {
                callback(label, &fields);
            }
        }
        self.transcript.push(text);
    }

    /// Invoke the error callback, at most once per stage.
    pub(super) fn report_failure(&mut self, status: Option<i32>) {
        if self.failure_reported {
            return;
        }
        self.failure_reported = true;
        if let Some(callback) = self.on_error.as_mut() {
            callback(status, &self.transcript);
        }
    }
}
