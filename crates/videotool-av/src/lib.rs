//! # videotool-av
//!
//! Supervision of external decoder and encoder processes joined by a named
//! pipe.
//!
//! This crate provides functionality for:
//! - Spawning processes with merged, line-buffered output
//! - Escalating shutdown (SIGTERM, back-off polling, SIGKILL), optionally
//!   reaching the direct children of a process
//! - A single-threaded event loop multiplexing output streams
//! - Pipelines where one stage failing tears down the others
//!
//! Unix only.
//!
//! ## Example
//!
//! ```no_run
//! use videotool_av::{spawn, NamedPipe, Pipeline, ProcessSpec, Stage, StatusPattern};
//!
//! let fifo = NamedPipe::create("video.y4m")?;
//! let pipe = fifo.path().display().to_string();
//!
//! let mut pipeline = Pipeline::new();
//! let encoder = spawn(&ProcessSpec::new("x264").args(["-o", "out.mkv", pipe.as_str()]))?;
//! pipeline.add_stage(
//!     Stage::new(encoder)
//!         .with_patterns(vec![StatusPattern::new("status", r"(?P<frame>\d+) frames")?])
//!         .on_status(|_, fields| println!("{fields:?}")),
//! );
//! let decoder = spawn(&ProcessSpec::new("ffmpeg").args(["-i", "in.avi", "-y", pipe.as_str()]))?;
//! pipeline.add_stage(Stage::new(decoder));
//! pipeline.wire_all();
//!
//! let report = pipeline.with_named_pipe(fifo).run()?;
//! assert!(report.succeeded());
//! # Ok::<(), videotool_av::Error>(())
//! ```

mod error;
pub mod event_loop;
pub mod fifo;
pub mod lines;
pub mod pipeline;
pub mod process;
pub mod shutdown;
pub mod template;
pub mod tools;
pub mod tree;

// Re-exports
pub use error::{Error, Result};
pub use event_loop::{EventLoop, EventLoopConfig, StreamHandler};
pub use fifo::NamedPipe;
pub use lines::LineReader;
pub use pipeline::{
    Pipeline, PipelineReport, Stage, StageId, StageReport, StatusFields, StatusPattern,
};
pub use process::{spawn, ProcessSpec, StderrMode, StdinMode, SupervisedProcess};
pub use shutdown::{
    ShutdownOutcome, ShutdownPolicy, Signaller, Supervised, SystemSignaller, Terminator,
};
pub use template::TemplateContext;
pub use tools::{check_tool, check_tools, resolve_program, ToolInfo};
pub use tree::{ProcessTree, ProcessTreeSource, PsProcessTree};
