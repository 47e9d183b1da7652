//! CLI end-to-end tests
//!
//! Tests for the videotool command-line interface. Encodes run `sh` stages
//! configured as custom decoder and encoder.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the videotool binary
#[allow(deprecated)]
fn videotool_cmd() -> Command {
    Command::cargo_bin("videotool").unwrap()
}

/// Write a config whose decoder runs `decoder` and encoder runs `encoder`,
/// both as `sh -c SCRIPT sh {pipe} {output}`.
fn write_config(dir: &Path, decoder: &str, encoder: &str) -> PathBuf {
    let path = dir.join("videotool.toml");
    let stage = |script: &str| {
        format!(
            "kind = \"custom\"\nprogram = \"sh\"\nargs = [\"-c\", '{script}', \"sh\", \"{{pipe}}\", \"{{output}}\"]\n"
        )
    };
    let content = format!(
        "[shutdown]\nunit_ms = 10\n\n[decoder]\n{}\n[[decoder.patterns]]\nlabel = \"status\"\nregex = 'frame=(?P<frame>\\d+)'\n\n[encoder]\n{}",
        stage(decoder),
        stage(encoder),
    );
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = videotool_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = videotool_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("videotool"))
        .stdout(predicate::str::contains("encode"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = videotool_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = videotool_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("x264"));
}

#[test]
fn test_cli_validate_default_config() {
    let mut cmd = videotool_cmd();
    cmd.arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("24.7s"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[shutdown]\nmax_polls = 0\n").unwrap();

    let mut cmd = videotool_cmd();
    cmd.arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_polls"));
}

#[test]
fn test_cli_encode_missing_input() {
    let dir = tempdir().unwrap();

    let mut cmd = videotool_cmd();
    cmd.arg("encode")
        .arg(dir.path().join("missing.avi"))
        .arg(dir.path().join("out.mp4"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file does not exist"));
}

#[test]
fn test_cli_encode_refuses_to_overwrite() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.avi");
    let output = dir.path().join("out.mp4");
    fs::write(&input, "x").unwrap();
    fs::write(&output, "keep").unwrap();

    let mut cmd = videotool_cmd();
    cmd.arg("encode")
        .arg(&input)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    assert_eq!(fs::read_to_string(&output).unwrap(), "keep");
}

#[test]
fn test_cli_encode_dry_run() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.avi");
    fs::write(&input, "x").unwrap();

    let mut cmd = videotool_cmd();
    cmd.arg("encode")
        .arg(&input)
        .arg(dir.path().join("out.mp4"))
        .args(["--dry-run", "--var", "preset=fast"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[DRY RUN]"))
        .stdout(predicate::str::contains("--preset fast"))
        .stdout(predicate::str::contains("yuv4mpegpipe"));

    assert!(!dir.path().join("out.mp4").exists());
}

#[test]
fn test_cli_encode_through_named_pipe() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.avi");
    let output = dir.path().join("out.bin");
    fs::write(&input, "x").unwrap();
    let config = write_config(
        dir.path(),
        r#"echo "frame=7 fps=25"; printf payload > "$1""#,
        r#"cat "$1" > "$2""#,
    );

    let mut cmd = videotool_cmd();
    cmd.arg("-c")
        .arg(&config)
        .arg("encode")
        .arg(&input)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("frame=7"))
        .stdout(predicate::str::contains("Encoded"));

    assert_eq!(fs::read_to_string(&output).unwrap(), "payload");
}

#[test]
fn test_cli_encode_failing_decoder() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.avi");
    fs::write(&input, "x").unwrap();
    let config = write_config(
        dir.path(),
        r#"echo "cannot open input"; exit 2"#,
        r#"exec cat "$1""#,
    );

    let mut cmd = videotool_cmd();
    cmd.arg("-c")
        .arg(&config)
        .arg("encode")
        .arg(&input)
        .arg(dir.path().join("out.bin"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("decoder failed with status 2"))
        .stderr(predicate::str::contains("cannot open input"))
        .stderr(predicate::str::contains("Encoding failed"));
}
