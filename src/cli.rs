use clap::{Parser, Subcommand};
use std::path::PathBuf;

use videotool::backends::StageKind;

#[derive(Parser)]
#[command(name = "videotool")]
#[command(author, version, about = "Decode and re-encode video through a named pipe")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a file and encode it to H.264
    Encode {
        /// Input file
        #[arg(required = true)]
        input: PathBuf,

        /// Output file
        #[arg(required = true)]
        output: PathBuf,

        /// Overwrite the output if it exists
        #[arg(short, long)]
        force: bool,

        /// Decoder to use instead of the configured one
        #[arg(long, value_enum)]
        decoder: Option<StageKind>,

        /// Template variable, e.g. --var preset=slow
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Show the commands that would run without executing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}
