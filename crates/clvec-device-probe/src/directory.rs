//! Flat, ordered directory of every device on every platform.

use std::fmt;

use clvec_common::{ClvecError, ComputeDriver, DeviceId, DeviceKind, DriverError, Result};
use tracing::{debug, info};

/// One enumerated device.
pub struct Device<D: ComputeDriver> {
    pub id: DeviceId,
    pub kind: DeviceKind,
    /// Display name as reported by the driver; never empty.
    pub name: String,
    pub platform: D::Platform,
    pub handle: D::Device,
}

impl<D: ComputeDriver> Device<D> {
    /// `"{platform}.{device}: {name} [{kind}]"`.
    pub fn describe(&self) -> String {
        format!("{}: {} [{}]", self.id, self.name, self.kind)
    }
}

impl<D: ComputeDriver> fmt::Debug for Device<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// All devices found in one enumeration pass, in platform-then-device
/// discovery order.
pub struct DeviceDirectory<D: ComputeDriver> {
    devices: Vec<Device<D>>,
    skipped: Vec<ClvecError>,
}

impl<D: ComputeDriver> DeviceDirectory<D> {
    /// Enumerate every device on every platform exposed by `driver`.
    ///
    /// Fails with [`ClvecError::NoPlatform`] when no platform is installed
    /// and with [`ClvecError::Driver`] when the platform query fails
    /// otherwise. A platform whose device query fails or returns nothing is
    /// skipped, as is any device whose kind or name cannot be fetched; those
    /// devices are kept in [`skipped`](Self::skipped). The result may
    /// therefore be empty.
    pub fn enumerate(driver: &D) -> Result<Self> {
        let platforms = query_platforms(driver)?;

        let mut devices = Vec::new();
        let mut skipped = Vec::new();
        for (pi, platform) in (0u32..).zip(platforms) {
            let handles = match driver.devices(&platform) {
                Ok(handles) if !handles.is_empty() => handles,
                Ok(_) => {
                    debug!(platform = pi, "platform has no devices");
                    continue;
                }
                Err(e) => {
                    debug!(platform = pi, error = %e, "device query failed, skipping platform");
                    continue;
                }
            };

            for (di, handle) in (0u32..).zip(handles) {
                let id = DeviceId::new(pi, di);
                let described = driver.device_kind(&handle).and_then(|kind| {
                    let name = clean_name(&driver.device_name(&handle)?);
                    if name.is_empty() {
                        return Err(DriverError::new("clGetDeviceInfo", 0, "empty device name"));
                    }
                    Ok((kind, name))
                });
                let (kind, name) = match described {
                    Ok(described) => described,
                    Err(source) => {
                        let skip = ClvecError::DeviceSkipped { device: id, source };
                        debug!(device = %id, error = %skip, "skipping device");
                        skipped.push(skip);
                        continue;
                    }
                };

                debug!(device = %id, %kind, name = %name, "found device");
                devices.push(Device { id, kind, name, platform: platform.clone(), handle });
            }
        }

        info!(
            backend = driver.name(),
            count = devices.len(),
            skipped = skipped.len(),
            "device enumeration complete"
        );
        Ok(Self { devices, skipped })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Device<D>> {
        self.devices.iter()
    }

    /// Devices left out because their kind or name could not be fetched,
    /// each as a [`ClvecError::DeviceSkipped`].
    pub fn skipped(&self) -> &[ClvecError] {
        &self.skipped
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device<D>> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Fail with [`ClvecError::NoDevice`] when nothing was found.
    pub fn require_devices(self) -> Result<Self> {
        if self.devices.is_empty() {
            return Err(ClvecError::NoDevice);
        }
        Ok(self)
    }

    /// Release every device record.
    ///
    /// Consumes the directory, so no record can be used afterwards.
    pub fn release(self) {
        debug!(count = self.devices.len(), "releasing device directory");
        drop(self.devices);
    }
}

impl<'a, D: ComputeDriver> IntoIterator for &'a DeviceDirectory<D> {
    type Item = &'a Device<D>;
    type IntoIter = std::slice::Iter<'a, Device<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

impl<D: ComputeDriver> fmt::Debug for DeviceDirectory<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.devices.iter()).finish()
    }
}

/// Query the platform list, treating the loader's "no platform installed"
/// status the same as an empty list.
pub(crate) fn query_platforms<D: ComputeDriver>(driver: &D) -> Result<Vec<D::Platform>> {
    let platforms = match driver.platforms() {
        Ok(platforms) => platforms,
        Err(e) if e.is_platform_not_found() => {
            debug!(error = %e, "platform query reports no platform");
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };
    if platforms.is_empty() {
        return Err(ClvecError::NoPlatform);
    }
    Ok(platforms)
}

/// Driver strings may carry trailing NULs and padding.
fn clean_name(raw: &str) -> String {
    raw.trim_end_matches('\0').trim().to_owned()
}
