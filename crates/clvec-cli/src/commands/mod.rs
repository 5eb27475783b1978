//! CLI command implementations

pub mod info;
pub mod list;
pub mod run;

use std::io::Write;

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use clvec_common::ComputeDriver;

use crate::config::CliConfig;

pub use info::InfoCommand;
pub use list::ListCommand;
pub use run::RunCommand;

/// How a command prints its result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the vector-add job on every device and verify the results (default)
    Run(RunCommand),

    /// Describe every platform and its devices
    Info(InfoCommand),

    /// List enumerated devices, one per line
    #[command(alias = "ls")]
    List(ListCommand),
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run(RunCommand::default())
    }
}

impl Commands {
    pub fn execute<D: ComputeDriver, W: Write>(
        &self,
        driver: &D,
        config: &CliConfig,
        out: &mut W,
    ) -> Result<()> {
        match self {
            Commands::Run(cmd) => cmd.execute(driver, config, out).map(|_| ()),
            Commands::Info(cmd) => cmd.execute(driver, out),
            Commands::List(cmd) => cmd.execute(driver, out),
        }
    }
}
