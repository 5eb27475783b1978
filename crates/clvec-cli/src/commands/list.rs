//! Device listing command

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use clvec_common::ComputeDriver;
use clvec_device_probe::DeviceDirectory;

use super::OutputFormat;
use crate::report;

/// List every usable device as `platform.device: name [kind]`
#[derive(Debug, Clone, Default, Args)]
pub struct ListCommand {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl ListCommand {
    pub fn execute<D: ComputeDriver, W: Write>(&self, driver: &D, out: &mut W) -> Result<()> {
        let directory = DeviceDirectory::enumerate(driver)?.require_devices()?;
        match self.format {
            OutputFormat::Text => report::write_listing(out, &directory)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, &report::device_entries(&directory))
                    .context("Failed to serialize device list")?;
                writeln!(out)?;
            }
        }
        directory.release();
        Ok(())
    }
}
