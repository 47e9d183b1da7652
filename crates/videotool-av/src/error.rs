//! Error types for videotool-av.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or running a process pipeline.
///
/// A child exiting with a failure status is not an error here: that is
/// reported through the stage's error callback and the pipeline report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operating system refused to create the process.
    #[error("failed to spawn {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The process listing tool could not be run.
    #[error("process listing unavailable: {0}")]
    Unavailable(String),

    /// Creating or removing the named pipe failed.
    #[error("named pipe error: {0}")]
    NamedPipe(String),

    /// A status pattern failed to compile.
    #[error("invalid status pattern {label:?}: {message}")]
    InvalidPattern { label: String, message: String },

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn error.
    pub fn spawn(program: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Create an invalid pattern error.
    pub fn invalid_pattern(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            label: label.into(),
            message: message.into(),
        }
    }
}

impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Self {
        Error::Io(std::io::Error::from(err))
    }
}
