mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

use crate::backends::{StageKind, StageRole};

/// Most polls the shutdown back-off may be configured with.
pub const MAX_POLLS_LIMIT: u32 = 100;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./videotool.toml",
        "~/.config/videotool/config.toml",
        "/etc/videotool/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.shutdown.max_polls == 0 || config.shutdown.max_polls > MAX_POLLS_LIMIT {
        anyhow::bail!(
            "shutdown.max_polls must be between 1 and {}, got {}",
            MAX_POLLS_LIMIT,
            config.shutdown.max_polls
        );
    }

    if config.event_loop.max_read_size == 0 {
        anyhow::bail!("event_loop.max_read_size cannot be 0");
    }

    if config.event_loop.poll_interval_ms == 0 {
        tracing::warn!("event_loop.poll_interval_ms is 0, the event loop will busy-poll");
    }

    if config.pipe_name.is_empty() || config.pipe_name.contains('/') {
        anyhow::bail!("pipe_name must be a plain file name: {:?}", config.pipe_name);
    }

    validate_stage(&config.decoder, StageRole::Decoder)?;
    validate_stage(&config.encoder, StageRole::Encoder)?;

    Ok(())
}

fn validate_stage(stage: &StageConfig, role: StageRole) -> Result<()> {
    if !stage.kind.fits(role) {
        anyhow::bail!("{} cannot be used as the {}", stage.kind, role);
    }

    if stage.kind == StageKind::Custom {
        if stage.program.is_none() {
            anyhow::bail!("Custom {} has no program", role);
        }
        if stage.args.is_none() {
            anyhow::bail!("Custom {} has no args", role);
        }
    }

    stage
        .status_patterns()
        .with_context(|| format!("Invalid status pattern for the {}", role))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.decoder.kind, StageKind::Ffmpeg);
        assert_eq!(config.encoder.kind, StageKind::X264);
        assert_eq!(config.pipe_name, "video.y4m");
        assert_eq!(config.shutdown.max_polls, 19);
        assert_eq!(
            config.shutdown.policy().max_wait(),
            std::time::Duration::from_millis(24_700)
        );
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
pipe_name = "frames.y4m"

[shutdown]
unit_ms = 200
max_polls = 10
close_grace_ms = 50

[event_loop]
poll_interval_ms = 20
max_read_size = 1024

[decoder]
kind = "mplayer"

[encoder]
kind = "custom"
program = "/usr/local/bin/x265-wrapper"
args = ["{pipe}", "-o", "{output}"]
terminate_descendants = true

[encoder.env]
LC_ALL = "C"

[[encoder.patterns]]
label = "progress"
regex = '(?P<frame>\d+) frames'

[vars]
preset = "slow"
"#,
        );

        let config = load_config(file.path()).unwrap();

        assert_eq!(config.pipe_name, "frames.y4m");
        assert_eq!(config.shutdown.policy().unit, std::time::Duration::from_millis(200));
        assert_eq!(config.event_loop.to_config().max_read_size, 1024);
        assert_eq!(config.decoder.kind, StageKind::Mplayer);
        assert!(config.decoder.terminate_descendants());
        assert_eq!(config.encoder.env["LC_ALL"], "C");
        assert!(config.encoder.terminate_descendants());
        assert_eq!(config.encoder.status_patterns().unwrap()[0].label(), "progress");
        assert_eq!(config.vars["preset"], "slow");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let file = write_config("[shutdown]\nmax_polls = 5\n");

        let config = load_config(file.path()).unwrap();

        assert_eq!(config.shutdown.max_polls, 5);
        assert_eq!(config.shutdown.unit_ms, 1000);
        assert_eq!(config.decoder.kind, StageKind::Ffmpeg);
        assert_eq!(config.event_loop.max_read_size, 4096);
    }

    #[test]
    fn test_rejects_bad_values() {
        for content in [
            "[shutdown]\nmax_polls = 0\n",
            "[shutdown]\nmax_polls = 500\n",
            "[event_loop]\nmax_read_size = 0\n",
            "pipe_name = \"a/b\"\n",
            "[decoder]\nkind = \"x264\"\n",
            "[encoder]\nkind = \"ffmpeg\"\n",
            "[decoder]\nkind = \"custom\"\nargs = []\n",
            "[encoder]\nkind = \"custom\"\nprogram = \"enc\"\n",
            "[[decoder.patterns]]\nlabel = \"x\"\nregex = \"(?P<open\"\n",
        ] {
            let file = write_config(content);
            assert!(load_config(file.path()).is_err(), "accepted: {content}");
        }
    }

    #[test]
    fn test_unparseable_config_names_the_file() {
        let file = write_config("this is not toml");
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        assert!(load_config_or_default(Some(Path::new("/nonexistent/videotool.toml"))).is_err());
    }
}
