//! Console rendering of device listings, platform reports and run summaries.

use std::io::{self, Write};

use clvec_common::{ComputeDriver, DeviceKind};
use clvec_device_probe::{DeviceDirectory, PlatformSummary};
use clvec_opencl::{DeviceReport, DeviceTiming, RunSummary, Verification};
use console::style;
use serde::Serialize;

/// Serializable form of one directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    pub platform: u32,
    pub device: u32,
    pub name: String,
    pub kind: DeviceKind,
}

pub fn device_entries<D: ComputeDriver>(directory: &DeviceDirectory<D>) -> Vec<DeviceEntry> {
    directory
        .iter()
        .map(|d| DeviceEntry {
            platform: d.id.platform,
            device: d.id.device,
            name: d.name.clone(),
            kind: d.kind,
        })
        .collect()
}

/// One `p.d: name [kind]` line per device.
pub fn write_listing<D: ComputeDriver, W: Write>(
    out: &mut W,
    directory: &DeviceDirectory<D>,
) -> io::Result<()> {
    for device in directory {
        writeln!(out, "{}", device.describe())?;
    }
    Ok(())
}

pub fn write_platforms<W: Write>(out: &mut W, platforms: &[PlatformSummary]) -> io::Result<()> {
    for platform in platforms {
        writeln!(out, "{}: {}", platform.index, platform.name)?;
        if let Some(version) = &platform.version {
            writeln!(out, "   version={version}")?;
        }
        if platform.devices.is_empty() {
            writeln!(out, "   no device")?;
            writeln!(out)?;
            continue;
        }
        for device in &platform.devices {
            writeln!(out, "   {}: {} [{}]", device.index, device.name, device.kind)?;
            if let Some(units) = device.compute_units {
                writeln!(out, "      {units} compute units")?;
            }
            if let Some(memory) = device.memory_display() {
                writeln!(out, "      global memory size: {memory}")?;
            }
        }
    }
    Ok(())
}

pub fn write_run<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
    writeln!(
        out,
        "vector add: {} elements, seed {}, cpu reference {:.6} s",
        summary.vector_length, summary.seed, summary.cpu_elapsed_secs
    )?;
    for report in &summary.devices {
        write_device(out, report)?;
    }
    let passed = style(format!("{} passed", summary.passed())).green();
    let failed = if summary.failed() > 0 {
        style(format!("{} failed", summary.failed())).red()
    } else {
        style(format!("{} failed", summary.failed()))
    };
    writeln!(out, "{passed}, {failed}")
}

fn write_device<W: Write>(out: &mut W, report: &DeviceReport) -> io::Result<()> {
    writeln!(out, "{}: {} [{}]", report.id, report.name, report.kind)?;
    if let Some(failure) = &report.failure {
        writeln!(
            out,
            "   {} at {}: {} failed with {}: {}",
            style("error").red(),
            failure.stage,
            failure.operation,
            failure.code,
            failure.message.lines().next().unwrap_or_default()
        )?;
    }
    match report.timing {
        Some(DeviceTiming::Elapsed { seconds }) => writeln!(out, "   device time: {seconds:.6} s")?,
        Some(DeviceTiming::Unavailable) => writeln!(out, "   device time: unavailable")?,
        None => {}
    }
    match report.verification {
        Verification::Passed => writeln!(out, "   verification: {}", style("passed").green())?,
        Verification::Mismatch { index, a, b, expected, actual } => writeln!(
            out,
            "   verification: {} at index {index}: {a} + {b} = {expected}, device returned {actual}",
            style("failed").red()
        )?,
        Verification::NotPerformed => {
            writeln!(out, "   verification: {}", style("not performed").yellow())?
        }
    }
    Ok(())
}
