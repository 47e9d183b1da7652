//! Decoder and encoder backends.
//!
//! A backend is data: a default program, argument templates, template
//! variable defaults and the status patterns its output is matched against.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which program a stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// `ffmpeg` decoding to YUV4MPEG
    Ffmpeg,
    /// `mplayer` decoding to YUV4MPEG
    Mplayer,
    /// `x264` encoding YUV4MPEG to H.264
    X264,
    /// Program, arguments and patterns all come from configuration
    Custom,
}

/// Which side of the named pipe a stage sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    Decoder,
    Encoder,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageRole::Decoder => f.write_str("decoder"),
            StageRole::Encoder => f.write_str("encoder"),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Ffmpeg => "ffmpeg",
            StageKind::Mplayer => "mplayer",
            StageKind::X264 => "x264",
            StageKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

const FFMPEG_STATUS: &str = r"frame=[ ]*(?P<frame>[\d.]+).*fps=[ ]*(?P<fps>[\d.]+)";

const MPLAYER_STATUS: &str =
    r"V:\s*(?P<time>\d*\.\d*).*[^0-9](?P<frame>\d+)/[^0-9]*(?P<nframes>\d+)[^0-9]";

const X264_STATUS_LONG: &str = concat!(
    r"(?P<frame>\d+)/(?P<nframes>\d+) frames.*[^0-9.](?P<fps>\d*\.?\d*) fps",
    r".*[^0-9.](?P<bitrate>\d*\.?\d*) kb/s.*eta (?P<eta>\d+:\d+:\d+)",
);

const X264_STATUS_SHORT: &str = concat!(
    r"(?P<frame>\d+) frames.*[^0-9.](?P<fps>\d*\.?\d*) fps",
    r".*[^0-9.](?P<bitrate>\d*\.?\d*) kb/s",
);

impl StageKind {
    /// Program run when the configuration names none.
    pub fn default_program(self) -> Option<&'static str> {
        match self {
            StageKind::Ffmpeg => Some("ffmpeg"),
            StageKind::Mplayer => Some("mplayer"),
            StageKind::X264 => Some("x264"),
            StageKind::Custom => None,
        }
    }

    /// Argument templates used when the configuration gives none.
    pub fn default_args(self) -> Vec<String> {
        let args: &[&str] = match self {
            StageKind::Ffmpeg => &[
                "-i", "{input}", "-f", "yuv4mpegpipe", "-pix_fmt", "yuv420p", "-y", "{pipe}",
            ],
            StageKind::Mplayer => &[
                "{input}",
                "-vf",
                "{vf}",
                "-nosound",
                "-benchmark",
                "-noquiet",
                "-lavdopts",
                "skiploopfilter=none:threads=1",
                "-noconsolecontrols",
                "-noconfig",
                "all",
                "-vo",
                "yuv4mpeg:file=\"{pipe}\"",
            ],
            StageKind::X264 => &[
                "--output",
                "{output}",
                "{pipe}",
                "--preset",
                "{preset}",
                "--profile",
                "{profile}",
                "--bframes",
                "{bframes}",
                "--ref",
                "{ref}",
                "--partitions",
                "{partitions}",
            ],
            StageKind::Custom => &[],
        };
        args.iter().map(|s| s.to_string()).collect()
    }

    /// Template variables the default arguments refer to.
    pub fn default_vars(self) -> &'static [(&'static str, &'static str)] {
        match self {
            StageKind::Mplayer => &[("vf", "scale=:::0")],
            // QuickTime-compatible H.264
            StageKind::X264 => &[
                ("preset", "veryslow"),
                ("profile", "main"),
                ("bframes", "2"),
                ("ref", "8"),
                ("partitions", "p8x8,b8x8,i4x4,p4x4"),
            ],
            StageKind::Ffmpeg | StageKind::Custom => &[],
        }
    }

    /// mplayer forks helpers that must go down with it.
    pub fn default_terminate_descendants(self) -> bool {
        matches!(self, StageKind::Mplayer)
    }

    /// `(label, regex)` pairs matched against every output line.
    pub fn default_patterns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            StageKind::Ffmpeg => &[("status", FFMPEG_STATUS)],
            StageKind::Mplayer => &[("status", MPLAYER_STATUS)],
            StageKind::X264 => &[
                ("status_long", X264_STATUS_LONG),
                ("status_short", X264_STATUS_SHORT),
            ],
            StageKind::Custom => &[],
        }
    }

    /// Whether a stage of this kind can sit on the given side of the pipe.
    pub fn fits(self, role: StageRole) -> bool {
        match self {
            StageKind::Ffmpeg | StageKind::Mplayer => role == StageRole::Decoder,
            StageKind::X264 => role == StageRole::Encoder,
            StageKind::Custom => true,
        }
    }
}
