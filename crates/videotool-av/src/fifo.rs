//! Named pipe joining two pipeline stages.

use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use tempfile::TempDir;

use crate::{Error, Result};

/// A FIFO inside a private temporary directory.
///
/// The directory and the FIFO are removed when the handle is dropped, so
/// every exit path cleans up, including a failed spawn.
///
/// # Example
///
/// ```no_run
/// use videotool_av::NamedPipe;
///
/// let pipe = NamedPipe::create("video.y4m")?;
/// // decoder writes to pipe.path(), encoder reads from it
/// # Ok::<(), videotool_av::Error>(())
/// ```
#[derive(Debug)]
pub struct NamedPipe {
    dir: TempDir,
    path: PathBuf,
}

impl NamedPipe {
    /// Create a fresh temporary directory holding a FIFO named `name`.
    pub fn create(name: &str) -> Result<Self> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidInput(format!(
                "named pipe name must be a plain file name: {name:?}"
            )));
        }

        let dir = tempfile::Builder::new()
            .prefix("videotool-")
            .tempdir()
            .map_err(|e| Error::NamedPipe(format!("failed to create temp dir: {e}")))?;
        let path = dir.path().join(name);

        nix::unistd::mkfifo(path.as_path(), Mode::S_IRUSR | Mode::S_IWUSR)
            .map_err(|e| Error::NamedPipe(format!("mkfifo {}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), "created named pipe");
        Ok(Self { dir, path })
    }

    /// Path of the FIFO.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The private directory holding the FIFO.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the FIFO and its directory now, reporting failures.
    pub fn remove(self) -> Result<()> {
        self.dir
            .close()
            .map_err(|e| Error::NamedPipe(format!("failed to remove temp dir: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::FileTypeExt;

    #[test]
    fn creates_fifo_in_private_dir() {
        let pipe = NamedPipe::create("video.y4m").unwrap();

        assert!(pipe.path().starts_with(pipe.dir()));
        assert_eq!(pipe.path().file_name().unwrap(), "video.y4m");
        let meta = std::fs::metadata(pipe.path()).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[test]
    fn drop_removes_fifo_and_dir() {
        let pipe = NamedPipe::create("video.y4m").unwrap();
        let dir = pipe.dir().to_path_buf();
        let path = pipe.path().to_path_buf();

        drop(pipe);

        assert!(!path.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn remove_reports_success() {
        let pipe = NamedPipe::create("a.y4m").unwrap();
        let dir = pipe.dir().to_path_buf();
        pipe.remove().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn rejects_paths() {
        assert!(NamedPipe::create("../escape").is_err());
        assert!(NamedPipe::create("").is_err());
    }

    #[test]
    fn separate_pipes_do_not_share_a_dir() {
        let a = NamedPipe::create("video.y4m").unwrap();
        let b = NamedPipe::create("video.y4m").unwrap();
        assert_ne!(a.dir(), b.dir());
    }
}
