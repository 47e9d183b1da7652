use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use videotool_av::{EventLoopConfig, ShutdownPolicy, StatusPattern};

use crate::backends::StageKind;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub event_loop: EventLoopSettings,

    #[serde(default = "default_decoder")]
    pub decoder: StageConfig,

    #[serde(default = "default_encoder")]
    pub encoder: StageConfig,

    /// Template variables shared by both stages
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// File name of the named pipe between decoder and encoder
    #[serde(default = "default_pipe_name")]
    pub pipe_name: String,
}

fn default_decoder() -> StageConfig {
    StageConfig::new(StageKind::Ffmpeg)
}
fn default_encoder() -> StageConfig {
    StageConfig::new(StageKind::X264)
}
fn default_pipe_name() -> String {
    "video.y4m".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shutdown: ShutdownConfig::default(),
            event_loop: EventLoopSettings::default(),
            decoder: default_decoder(),
            encoder: default_encoder(),
            vars: BTreeMap::new(),
            pipe_name: default_pipe_name(),
        }
    }
}

/// Timing of the escalating shutdown.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShutdownConfig {
    /// Back-off scale in milliseconds; poll `i` sleeps `unit * i² / 100`
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,

    /// Polls before SIGKILL
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    /// How long a stage that closed its output may take to exit
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

fn default_unit_ms() -> u64 {
    1000
}
fn default_max_polls() -> u32 {
    videotool_av::shutdown::DEFAULT_MAX_POLLS
}
fn default_close_grace_ms() -> u64 {
    100
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            unit_ms: default_unit_ms(),
            max_polls: default_max_polls(),
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

impl ShutdownConfig {
    pub fn policy(&self) -> ShutdownPolicy {
        ShutdownPolicy {
            unit: Duration::from_millis(self.unit_ms),
            max_polls: self.max_polls,
        }
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventLoopSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Largest single read from a stage's output, in bytes
    #[serde(default = "default_max_read_size")]
    pub max_read_size: usize,
}

fn default_poll_interval_ms() -> u64 {
    50
}
fn default_max_read_size() -> usize {
    4096
}

impl Default for EventLoopSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_read_size: default_max_read_size(),
        }
    }
}

impl EventLoopSettings {
    pub fn to_config(&self) -> EventLoopConfig {
        EventLoopConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_read_size: self.max_read_size,
        }
    }
}

/// One side of the pipe. Unset fields fall back to the kind's defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageConfig {
    pub kind: StageKind,

    #[serde(default)]
    pub program: Option<PathBuf>,

    /// Argument templates; `{input}`, `{output}`, `{pipe}` and `[vars]` are substituted
    #[serde(default)]
    pub args: Option<Vec<String>>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub terminate_descendants: Option<bool>,

    /// Replaces the kind's status patterns when non-empty
    #[serde(default)]
    pub patterns: Vec<PatternConfig>,
}

impl StageConfig {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            program: None,
            args: None,
            env: BTreeMap::new(),
            terminate_descendants: None,
            patterns: Vec::new(),
        }
    }

    /// Configured program, else the kind's default.
    pub fn program(&self) -> Option<PathBuf> {
        self.program
            .clone()
            .or_else(|| self.kind.default_program().map(PathBuf::from))
    }

    /// Configured argument templates, else the kind's defaults.
    pub fn arg_templates(&self) -> Vec<String> {
        self.args.clone().unwrap_or_else(|| self.kind.default_args())
    }

    pub fn terminate_descendants(&self) -> bool {
        self.terminate_descendants
            .unwrap_or_else(|| self.kind.default_terminate_descendants())
    }

    /// Compile the configured patterns, else the kind's defaults.
    pub fn status_patterns(&self) -> videotool_av::Result<Vec<StatusPattern>> {
        if self.patterns.is_empty() {
            self.kind
                .default_patterns()
                .iter()
                .map(|(label, regex)| StatusPattern::new(*label, regex))
                .collect()
        } else {
            self.patterns
                .iter()
                .map(|p| StatusPattern::new(p.label.as_str(), &p.regex))
                .collect()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternConfig {
    pub label: String,
    pub regex: String,
}
