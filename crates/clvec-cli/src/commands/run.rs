//! Vector-add dispatch command

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use clvec_common::ComputeDriver;
use clvec_device_probe::DeviceDirectory;
use clvec_opencl::{DispatchPipeline, RunSummary};
use tracing::info;

use super::OutputFormat;
use crate::config::CliConfig;
use crate::report;

/// Run `c = a + b` on every device and compare against the CPU result
#[derive(Debug, Clone, Default, Args)]
pub struct RunCommand {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl RunCommand {
    /// Enumerate, list, dispatch and report.
    ///
    /// Only enumeration failures are returned as errors; a device that
    /// fails or mismatches is recorded in the returned summary.
    pub fn execute<D: ComputeDriver, W: Write>(
        &self,
        driver: &D,
        config: &CliConfig,
        out: &mut W,
    ) -> Result<RunSummary> {
        let directory = DeviceDirectory::enumerate(driver)?.require_devices()?;
        for skip in directory.skipped() {
            info!(error = %skip, "device left out of the run");
        }
        let pipeline = DispatchPipeline::new(driver, config.dispatch.clone())?;

        if self.format == OutputFormat::Text {
            report::write_listing(out, &directory)?;
            writeln!(out)?;
        }

        let summary = pipeline.run(&directory);
        info!(passed = summary.passed(), failed = summary.failed(), "run finished");

        match self.format {
            OutputFormat::Text => report::write_run(out, &summary)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, &summary)
                    .context("Failed to serialize run summary")?;
                writeln!(out)?;
            }
        }
        directory.release();
        Ok(summary)
    }
}
