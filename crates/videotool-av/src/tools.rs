//! External tool detection.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// Version string if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Resolve a program name against `PATH`.
///
/// Names containing a path separator are used as given. Unresolved names
/// fall back to the literal name so the OS gets the final say when the
/// process is spawned.
///
/// ```
/// use videotool_av::resolve_program;
///
/// let missing = resolve_program("not_existent_tool_xyz");
/// assert_eq!(missing, std::path::PathBuf::from("not_existent_tool_xyz"));
/// ```
pub fn resolve_program(name: impl AsRef<Path>) -> PathBuf {
    let name = name.as_ref();
    if name.components().count() > 1 {
        return name.to_path_buf();
    }
    which::which(name).unwrap_or_else(|_| name.to_path_buf())
}

/// Check if a tool is available and get its information.
pub fn check_tool(name: &str) -> ToolInfo {
    check_tool_with_arg(name, "--version")
}

/// Check if a tool is available using a custom version argument.
///
/// Tools such as x264 print their banner on stderr and mplayer exits
/// non-zero for unknown flags, so a found executable counts as available
/// even when the version probe is unhelpful.
pub fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    let Ok(path) = which::which(name) else {
        return ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        };
    };

    let version = Command::new(&path)
        .arg(version_arg)
        .stdin(Stdio::null())
        .output()
        .ok()
        .and_then(|output| {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            stdout
                .lines()
                .chain(stderr.lines())
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
        });

    ToolInfo {
        name: name.to_string(),
        available: true,
        version,
        path: Some(path),
    }
}

/// Check the tools a decode/encode pipeline relies on.
///
/// Returns information about ffmpeg, mplayer, x264 and ps.
pub fn check_tools() -> Vec<ToolInfo> {
    vec![
        check_tool_with_arg("ffmpeg", "-version"),
        check_tool_with_arg("mplayer", "-really-quiet"),
        check_tool("x264"),
        check_tool_with_arg("ps", "-V"),
    ]
}
