mod cli;

use videotool::backends::{StageKind, StageRole};
use videotool::config::{self, StageConfig};
use videotool::encode::{EncodeJob, Progress};
use videotool_av::StatusFields;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::io::Write;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            // Verbose mode: every output line of every stage
            "videotool=debug,videotool_av=trace".to_string()
        } else {
            "videotool=info,videotool_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Encode {
            input,
            output,
            force,
            decoder,
            vars,
            dry_run,
        } => encode_file(
            &input,
            &output,
            cli.config.as_deref(),
            EncodeOptions {
                force,
                decoder,
                vars,
                dry_run,
            },
        ),
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("videotool {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

struct EncodeOptions {
    force: bool,
    decoder: Option<StageKind>,
    vars: Vec<(String, String)>,
    dry_run: bool,
}

fn encode_file(
    input: &Path,
    output: &Path,
    config_path: Option<&Path>,
    options: EncodeOptions,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(kind) = options.decoder {
        if !kind.fits(StageRole::Decoder) {
            anyhow::bail!("{} cannot be used as the decoder", kind);
        }
        if config.decoder.kind != kind {
            config.decoder = StageConfig::new(kind);
        }
    }

    // Verify input file exists
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }
    if output.exists() && !options.force {
        anyhow::bail!(
            "Output file already exists: {:?} (use --force to overwrite)",
            output
        );
    }

    let job = options
        .vars
        .into_iter()
        .fold(EncodeJob::new(input, output, config), |job, (k, v)| {
            job.with_var(k, v)
        });

    if options.dry_run {
        let pipe = std::env::temp_dir()
            .join("videotool-XXXXXX")
            .join(&job.config().pipe_name);
        let plan = job.plan(&pipe)?;
        println!("[DRY RUN] Named pipe: {}", pipe.display());
        println!("[DRY RUN] Encoder: {}", plan.encoder.display_name());
        println!("  {}", plan.encoder.get_args().join(" "));
        println!("[DRY RUN] Decoder: {}", plan.decoder.display_name());
        println!("  {}", plan.decoder.get_args().join(" "));
        return Ok(());
    }

    tracing::info!("Encoding {:?} to {:?}", input, output);
    let report = job.run(Console::default())?;
    println!();

    if !report.succeeded() {
        let failed: Vec<String> = report
            .failed()
            .map(|s| match s.exit_status {
                Some(code) => format!("{} (status {})", s.name, code),
                None => format!("{} (status unknown)", s.name),
            })
            .collect();
        anyhow::bail!("Encoding failed: {}", failed.join(", "));
    }

    println!("Encoded {}", output.display());
    Ok(())
}

/// Prints status records on one updating line, failures to stderr.
#[derive(Default)]
struct Console {
    last: Option<String>,
}

impl Progress for Console {
    fn status(&mut self, role: StageRole, _label: &str, fields: &StatusFields) {
        let mut line = format!("{role}:");
        for (key, value) in fields {
            line.push_str(&format!(" {key}={value}"));
        }
        if self.last.as_deref() == Some(line.as_str()) {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\r{line:<79}");
        let _ = stdout.flush();
        self.last = Some(line);
    }

    fn error(&mut self, role: StageRole, status: Option<i32>, transcript: &[String]) {
        let status = status.map_or_else(|| "unknown".to_string(), |s| s.to_string());
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "\n{role} failed with status {status}, output follows:");
        for line in transcript {
            let _ = write!(stderr, "{}", line.replace('\r', "\n"));
        }
        let _ = stderr.flush();
    }
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = videotool_av::check_tools();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all decoders and encoders.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_summary(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            print_summary(&config);
        }
    }

    Ok(())
}

fn print_summary(config: &config::Config) {
    println!("  Decoder: {}", config.decoder.kind);
    println!("  Encoder: {}", config.encoder.kind);
    println!("  Named pipe: {}", config.pipe_name);
    println!(
        "  Shutdown: up to {:.1}s before SIGKILL",
        config.shutdown.policy().max_wait().as_secs_f64()
    );
    println!("  Variables: {}", config.vars.len());
}
