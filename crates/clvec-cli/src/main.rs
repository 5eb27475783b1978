//! clvec command-line application
//!
//! Enumerates every compute platform and device, then runs an elementwise
//! vector add on each device, verifying the result against the CPU and
//! reporting device-side execution time.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing::error;

use clvec_cli::commands::Commands;
use clvec_cli::config::{CliConfig, ConfigBuilder};
use clvec_cli::exit;

/// clvec - compute device discovery and vector-add dispatch
#[derive(Parser)]
#[command(name = "clvec")]
#[command(about = "Compute device discovery and vector-add dispatch")]
#[command(long_about = r#"
clvec enumerates every compute platform and device visible to the OpenCL
runtime, runs c = a + b on each device and checks the result bit for bit
against the same computation on the host.

Running without a subcommand is the same as `clvec run`.

Examples:
  # Full report with defaults
  clvec

  # Smaller vectors, fixed seed, JSON output
  clvec --vector-length 4096 --seed 7 run --format json

  # Platform and device details
  clvec info
"#)]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ./clvec.toml if present)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<String>,

    /// Number of elements per vector
    #[arg(short = 'n', long, value_name = "N", global = true)]
    vector_length: Option<usize>,

    /// Seed for input generation
    #[arg(long, value_name = "SEED", global = true)]
    seed: Option<u64>,

    /// Do not request device profiling timestamps
    #[arg(long, global = true)]
    no_profiling: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => exit::EXIT_SUCCESS,
        Err(e) => {
            report_error(&e);
            exit::code_for(&e)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let config = load_configuration(&cli)?;
    setup_logging(&config)?;

    let command = cli.command.unwrap_or_default();
    let mut stdout = io::stdout().lock();
    execute(&command, &config, &mut stdout)
}

#[cfg(feature = "opencl")]
fn execute(command: &Commands, config: &CliConfig, out: &mut impl io::Write) -> Result<()> {
    let driver = clvec_opencl::OpenClDriver::new();
    command.execute(&driver, config, out)
}

#[cfg(not(feature = "opencl"))]
fn execute(_command: &Commands, _config: &CliConfig, _out: &mut impl io::Write) -> Result<()> {
    Err(clvec_common::ClvecError::NoPlatform)
        .context("built without OpenCL runtime support (enable the `opencl` feature)")
}

/// Load configuration from file and merge with environment and CLI arguments
fn load_configuration(cli: &Cli) -> Result<CliConfig> {
    let config = ConfigBuilder::discover(cli.config.as_deref())?
        .with_env()?
        .vector_length(cli.vector_length)
        .seed(cli.seed)
        .profiling(cli.no_profiling.then_some(false))
        .log_level(cli.log_level.clone())
        .log_format(cli.log_format.clone())
        .build()
        .context("Failed to build configuration")?;
    Ok(config)
}

/// Setup logging based on configuration
fn setup_logging(config: &CliConfig) -> Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(&config.logging.level).map_err(|e| {
            clvec_common::ClvecError::config(format!(
                "invalid log level '{}': {e}",
                config.logging.level
            ))
        })?,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);

    let installed = match config.logging.format.as_str() {
        "json" => subscriber
            .json()
            .with_timer(tracing_subscriber::fmt::time::uptime())
            .try_init(),
        "compact" => subscriber.compact().try_init(),
        _ => subscriber.pretty().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {e}"))
}

fn report_error(err: &anyhow::Error) {
    error!("Command failed: {:#}", err);
    eprintln!("{} {}", style("clvec:").red().bold(), err);
    for cause in err.chain().skip(1) {
        eprintln!("\t{cause}");
    }
}
