//! Platform and device information command

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use clvec_common::ComputeDriver;
use clvec_device_probe::describe_platforms;
use tracing::info;

use super::OutputFormat;
use crate::report;

/// Describe every platform: name, version, and each device's kind,
/// compute units and global memory size
#[derive(Debug, Clone, Default, Args)]
pub struct InfoCommand {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl InfoCommand {
    pub fn execute<D: ComputeDriver, W: Write>(&self, driver: &D, out: &mut W) -> Result<()> {
        let platforms = describe_platforms(driver)?;
        info!(backend = driver.name(), platforms = platforms.len(), "platform report");
        match self.format {
            OutputFormat::Text => report::write_platforms(out, &platforms)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, &platforms)
                    .context("Failed to serialize platform report")?;
                writeln!(out)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clvec_common::ClvecError;
    use clvec_common::mock::{MockDevice, MockDriver, MockPlatform};

    #[test]
    fn json_report_lists_platforms() {
        let driver = MockDriver::new(vec![
            MockPlatform::new("P").with_device(MockDevice::gpu("g").with_compute_units(4)),
        ]);
        let mut out = Vec::new();
        InfoCommand { format: OutputFormat::Json }.execute(&driver, &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json[0]["name"], "P");
        assert_eq!(json[0]["devices"][0]["kind"], "gpu");
        assert_eq!(json[0]["devices"][0]["compute_units"], 4);
    }

    #[test]
    fn no_platform_is_an_enumeration_error() {
        let err = InfoCommand::default().execute(&MockDriver::new(Vec::new()), &mut Vec::new());
        let err = err.unwrap_err();
        assert!(matches!(err.downcast_ref::<ClvecError>(), Some(ClvecError::NoPlatform)));
    }
}
