//! Library side of the `clvec` binary: configuration, commands and
//! console rendering, generic over the compute driver so they can be
//! exercised without hardware.

pub mod commands;
pub mod config;
pub mod exit;
pub mod report;

pub use commands::{Commands, OutputFormat};
pub use config::{CliConfig, ConfigBuilder, LoggingConfig};
