//! Human-oriented platform and device descriptions.

use clvec_common::{ComputeDriver, DeviceKind, PlatformParam, Result};
use serde::Serialize;
use tracing::debug;

use crate::directory::query_platforms;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Description of one platform and its devices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformSummary {
    pub index: u32,
    pub name: String,
    pub version: Option<String>,
    pub devices: Vec<DeviceSummary>,
}

/// Description of one device.
///
/// Attribute queries stop at the first failure, so a missing
/// `compute_units` also means a missing `global_mem_size`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub index: u32,
    pub name: String,
    pub kind: DeviceKind,
    pub compute_units: Option<u32>,
    pub global_mem_size: Option<u64>,
}

impl DeviceSummary {
    pub fn memory_display(&self) -> Option<String> {
        self.global_mem_size.map(format_memory_size)
    }
}

/// Describe every platform and its devices.
///
/// Platforms whose name cannot be fetched are left out, as are devices
/// whose name or kind cannot be fetched.
pub fn describe_platforms<D: ComputeDriver>(driver: &D) -> Result<Vec<PlatformSummary>> {
    let platforms = query_platforms(driver)?;

    let mut out = Vec::with_capacity(platforms.len());
    for (index, platform) in (0u32..).zip(platforms) {
        let name = match driver.platform_info(&platform, PlatformParam::Name) {
            Ok(name) => name,
            Err(e) => {
                debug!(platform = index, error = %e, "platform name unavailable, skipping");
                continue;
            }
        };
        let version = driver.platform_info(&platform, PlatformParam::Version).ok();
        let devices = match driver.devices(&platform) {
            Ok(handles) => describe_devices(driver, index, handles),
            Err(e) => {
                debug!(platform = index, error = %e, "device query failed");
                Vec::new()
            }
        };
        out.push(PlatformSummary { index, name, version, devices });
    }
    Ok(out)
}

fn describe_devices<D: ComputeDriver>(
    driver: &D,
    platform: u32,
    handles: Vec<D::Device>,
) -> Vec<DeviceSummary> {
    let mut out = Vec::with_capacity(handles.len());
    for (index, handle) in (0u32..).zip(handles) {
        let name = match driver.device_name(&handle) {
            Ok(name) => name,
            Err(e) => {
                debug!(platform, device = index, error = %e, "device name unavailable, skipping");
                continue;
            }
        };
        let kind = match driver.device_kind(&handle) {
            Ok(kind) => kind,
            Err(e) => {
                debug!(platform, device = index, error = %e, "device kind unavailable, skipping");
                continue;
            }
        };

        let mut summary = DeviceSummary {
            index,
            name: name.trim_end_matches('\0').to_owned(),
            kind,
            compute_units: None,
            global_mem_size: None,
        };
        match driver.device_compute_units(&handle) {
            Ok(units) => summary.compute_units = Some(units),
            Err(e) => {
                debug!(platform, device = index, error = %e, "compute units unavailable");
                out.push(summary);
                continue;
            }
        }
        match driver.device_global_mem_size(&handle) {
            Ok(bytes) => summary.global_mem_size = Some(bytes),
            Err(e) => {
                debug!(platform, device = index, error = %e, "global memory size unavailable")
            }
        }
        out.push(summary);
    }
    out
}

/// Render a byte count the way the device report prints it.
///
/// Units switch strictly above each power of 1024, so exactly 1 MiB is
/// shown as `1024.0kB`.
pub fn format_memory_size(bytes: u64) -> String {
    if bytes > GIB {
        format!("{:.1}GB", bytes as f64 / GIB as f64)
    } else if bytes > MIB {
        format!("{:.1}MB", bytes as f64 / MIB as f64)
    } else if bytes > KIB {
        format!("{:.1}kB", bytes as f64 / KIB as f64)
    } else {
        bytes.to_string()
    }
}
