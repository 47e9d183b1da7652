//! Pipelines of supervised processes with all-or-nothing failure handling.
//!
//! Every stage's output is read by one [`EventLoop`]. When a stage closes
//! its output with anything but a zero exit status, its error callback runs
//! and every dependant that is still running is shut down, so nothing is
//! left blocked on a named pipe whose other end is gone.

mod stage;
mod status;

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::event_loop::{EventLoop, EventLoopConfig, StreamHandler};
use crate::fifo::NamedPipe;
use crate::process::SupervisedProcess;
use crate::shutdown::{ShutdownOutcome, Terminator};
use crate::{Error, Result};

pub use stage::{ErrorCallback, Stage, StatusCallback};
pub use status::{parse_line, StatusFields, StatusPattern};

/// Index of a stage within its pipeline.
pub type StageId = usize;

/// How long a stage that closed its output gets to exit on its own.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(100);

/// Final state of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    pub exit_status: Option<i32>,
    pub lines: usize,
}

impl StageReport {
    pub fn succeeded(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// Returned by [`Pipeline::run`] once every output stream has closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.stages.iter().all(StageReport::succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter(|s| !s.succeeded())
    }
}

/// An arena of stages and the dependant links between them.
///
/// Stages are released (terminated if needed, then reaped) when the
/// pipeline is dropped, in reverse order of addition. An attached
/// [`NamedPipe`] is removed after that.
pub struct Pipeline {
    stages: Vec<Stage>,
    terminator: Terminator,
    event_loop: EventLoopConfig,
    close_grace: Duration,
    named_pipe: Option<NamedPipe>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .field("terminator", &self.terminator)
            .field("event_loop", &self.event_loop)
            .field("close_grace", &self.close_grace)
            .field("named_pipe", &self.named_pipe)
            .finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            terminator: Terminator::default(),
            event_loop: EventLoopConfig::default(),
            close_grace: DEFAULT_CLOSE_GRACE,
            named_pipe: None,
        }
    }

    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn with_event_loop(mut self, config: EventLoopConfig) -> Self {
        self.event_loop = config;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    /// Keep `pipe` alive until every stage has been released.
    pub fn with_named_pipe(mut self, pipe: NamedPipe) -> Self {
        self.named_pipe = Some(pipe);
        self
    }

    pub fn named_pipe(&self) -> Option<&NamedPipe> {
        self.named_pipe.as_ref()
    }

    pub fn add_stage(&mut self, stage: Stage) -> StageId {
        self.stages.push(stage);
        self.stages.len() - 1
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Replace the dependants of `id`. A stage never depends on itself.
    pub fn set_dependants(
        &mut self,
        id: StageId,
        dependants: impl IntoIterator<Item = StageId>,
    ) -> Result<()> {
        let count = self.stages.len();
        let deps: Vec<StageId> = dependants.into_iter().filter(|&d| d != id).collect();
        if let Some(&bad) = deps.iter().find(|&&d| d >= count) {
            return Err(Error::InvalidInput(format!("no stage {bad}")));
        }
        let stage = self
            .stages
            .get_mut(id)
            .ok_or_else(|| Error::InvalidInput(format!("no stage {id}")))?;
        stage.dependants = deps.into_iter().collect();
        Ok(())
    }

    /// Make every stage a dependant of every other stage.
    pub fn wire_all(&mut self) {
        let count = self.stages.len();
        for (id, stage) in self.stages.iter_mut().enumerate() {
            stage.dependants = (0..count).filter(|&other| other != id).collect();
        }
    }

    /// Read every stage's output until all streams close, then release the
    /// stages.
    ///
    /// A stage failing is not an error: it is reported through its error
    /// callback and the returned report.
    pub fn run(mut self) -> Result<PipelineReport> {
        let mut event_loop = EventLoop::new(self.event_loop);
        for (id, stage) in self.stages.iter_mut().enumerate() {
            let output = stage.process.take_output().ok_or_else(|| {
                Error::InvalidInput(format!("output of {} is already taken", stage.name()))
            })?;
            event_loop.register(id, output);
        }

        info!("running pipeline with {} stages", self.stages.len());
        event_loop.run(&mut self)?;

        self.release_all();
        Ok(self.report())
    }

    fn report(&self) -> PipelineReport {
        PipelineReport {
            stages: self
                .stages
                .iter()
                .map(|s| StageReport {
                    name: s.name().to_string(),
                    exit_status: s.process.exit_status(),
                    lines: s.transcript().len(),
                })
                .collect(),
        }
    }

    fn release_all(&mut self) {
        for stage in self.stages.iter_mut().rev() {
            if !stage.process.is_released() {
                self.terminator.release(&mut stage.process);
            }
        }
    }
}

impl StreamHandler for Pipeline {
    fn on_line(&mut self, id: usize, line: &[u8]) {
        if let Some(stage) = self.stages.get_mut(id) {
            stage.handle_line(line);
        }
    }

    fn on_close(&mut self, id: usize) {
        let Some(stage) = self.stages.get_mut(id) else {
            return;
        };

        let mut status = stage.process.poll_exit();
        if status.is_none() {
            status = wait_for_exit(&mut stage.process, self.close_grace);
        }
        if status.is_none() {
            warn!(
                pid = stage.process.pid(),
                "{} closed its output before exiting",
                stage.name()
            );
            status = stop(&self.terminator, &mut stage.process);
        }

        if status == Some(0) {
            debug!("{} finished", stage.name());
            return;
        }

        warn!(status = ?status, "{} failed", stage.name());
        stage.report_failure(status);

        let failed = stage.name().to_string();
        let dependants: Vec<StageId> = stage.dependants().collect();
        for dep in dependants {
            let dependant = &mut self.stages[dep];
            if dependant.process.poll_exit().is_none() {
                info!("terminating {} after {failed} failed", dependant.name());
                stop(&self.terminator, &mut dependant.process);
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Poll `process` for up to `grace`.
fn wait_for_exit(process: &mut SupervisedProcess, grace: Duration) -> Option<i32> {
    let deadline = Instant::now() + grace;
    loop {
        if let Some(status) = process.poll_exit() {
            return Some(status);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Run the shutdown protocol, reaping the process if it had to be killed.
fn stop(terminator: &Terminator, process: &mut SupervisedProcess) -> Option<i32> {
    if terminator.terminate(process) == ShutdownOutcome::Killed {
        if let Err(e) = process.wait() {
            warn!(pid = process.pid(), error = %e, "failed to reap killed process");
        }
    }
    process.poll_exit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{spawn, ProcessSpec};

    fn stage(script: &str) -> Stage {
        Stage::new(spawn(&ProcessSpec::new("sh").args(["-c", script])).unwrap())
    }

    #[test]
    fn wire_all_is_a_full_mesh_without_self_loops() {
        let mut pipeline = Pipeline::new();
        for _ in 0..3 {
            pipeline.add_stage(stage("exit 0"));
        }
        pipeline.wire_all();

        for id in 0..3 {
            let deps: Vec<StageId> = pipeline.stage(id).unwrap().dependants().collect();
            let expected: Vec<StageId> = (0..3).filter(|&d| d != id).collect();
            assert_eq!(deps, expected);
        }
    }

    #[test]
    fn set_dependants_drops_self_and_rejects_unknown() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_stage(stage("exit 0"));
        let b = pipeline.add_stage(stage("exit 0"));

        pipeline.set_dependants(a, [a, b]).unwrap();
        assert_eq!(pipeline.stage(a).unwrap().dependants().collect::<Vec<_>>(), vec![b]);

        assert!(pipeline.set_dependants(a, [5]).is_err());
        assert!(pipeline.set_dependants(9, [a]).is_err());
    }

    #[test]
    fn report_lists_every_stage() {
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(stage("echo one; echo two"));
        pipeline.add_stage(stage("exit 4"));

        let report = pipeline.run().unwrap();

        assert_eq!(report.stages[0].exit_status, Some(0));
        assert_eq!(report.stages[0].lines, 2);
        assert_eq!(report.stages[1].exit_status, Some(4));
        assert!(!report.succeeded());
        assert_eq!(report.failed().count(), 1);
    }
}
