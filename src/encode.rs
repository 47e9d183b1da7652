//! Decode a file into a named pipe and encode from it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use videotool_av::{
    spawn, NamedPipe, Pipeline, PipelineReport, ProcessSpec, Stage, StatusFields,
    TemplateContext, Terminator,
};

use crate::backends::StageRole;
use crate::config::{Config, StageConfig};

/// Receives status records and failures from both stages.
pub trait Progress {
    fn status(&mut self, role: StageRole, label: &str, fields: &StatusFields);
    fn error(&mut self, role: StageRole, status: Option<i32>, transcript: &[String]);
}

/// Process specs for both stages of one run.
#[derive(Debug, Clone)]
pub struct EncodePlan {
    pub decoder: ProcessSpec,
    pub encoder: ProcessSpec,
}

/// One decoder → named pipe → encoder run.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    input: PathBuf,
    output: PathBuf,
    config: Config,
    vars: BTreeMap<String, String>,
}

impl EncodeJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            config,
            vars: BTreeMap::new(),
        }
    }

    /// Set a template variable, overriding the config's `[vars]`.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build both process specs for a pipe at `pipe`.
    pub fn plan(&self, pipe: &Path) -> Result<EncodePlan> {
        Ok(EncodePlan {
            decoder: self.stage_spec(&self.config.decoder, StageRole::Decoder, pipe)?,
            encoder: self.stage_spec(&self.config.encoder, StageRole::Encoder, pipe)?,
        })
    }

    fn stage_spec(&self, stage: &StageConfig, role: StageRole, pipe: &Path) -> Result<ProcessSpec> {
        let program = stage
            .program()
            .with_context(|| format!("No program configured for the {role}"))?;

        let mut ctx = TemplateContext::new();
        for (key, value) in stage.kind.default_vars() {
            ctx.set(key, value);
        }
        let ctx = ctx
            .with_vars(&self.config.vars)
            .with_vars(&self.vars)
            .with_paths(&self.input, &self.output, pipe);

        Ok(ProcessSpec::new(program)
            .args(ctx.substitute_all(&stage.arg_templates()))
            .envs(&stage.env)
            .terminate_descendants(stage.terminate_descendants()))
    }

    /// Run the job to completion.
    ///
    /// Returns `Err` only if the job could not be started. Stage failures
    /// go to `progress` and show up in the report.
    pub fn run<P: Progress + 'static>(&self, progress: P) -> Result<PipelineReport> {
        let fifo = NamedPipe::create(&self.config.pipe_name).context("Failed to create named pipe")?;
        let pipe = fifo.path().to_path_buf();
        let plan = self.plan(&pipe)?;
        let progress = Rc::new(RefCell::new(progress));

        let mut pipeline = Pipeline::new()
            .with_terminator(Terminator::new(self.config.shutdown.policy()))
            .with_event_loop(self.config.event_loop.to_config())
            .with_close_grace(self.config.shutdown.close_grace())
            .with_named_pipe(fifo);

        // The encoder opens the pipe for reading first so the decoder never
        // writes into a pipe nobody will drain.
        for (role, stage, spec) in [
            (StageRole::Encoder, &self.config.encoder, &plan.encoder),
            (StageRole::Decoder, &self.config.decoder, &plan.decoder),
        ] {
            let process = spawn(spec).with_context(|| format!("Failed to start the {role}"))?;
            tracing::info!("Started {} ({})", role, process.name());

            let status_sink = Rc::clone(&progress);
            let error_sink = Rc::clone(&progress);
            pipeline.add_stage(
                Stage::new(process)
                    .with_patterns(stage.status_patterns()?)
                    .on_status(move |label, fields| {
                        status_sink.borrow_mut().status(role, label, fields)
                    })
                    .on_error(move |status, transcript| {
                        error_sink.borrow_mut().error(role, status, transcript)
                    }),
            );
        }
        pipeline.wire_all();

        let report = pipeline.run()?;
        if report.succeeded() {
            tracing::info!("Encoded {:?}", self.output);
        }
        Ok(report)
    }
}
