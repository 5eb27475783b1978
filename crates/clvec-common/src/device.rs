//! Device identity and kind.
//!
//! [`DeviceKind::from_type_bits`] and [`DeviceKind::as_str`] are the only
//! place device-type codes are interpreted or rendered.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw device-type bits as reported by the platform layer.
pub const DEVICE_TYPE_DEFAULT: u64 = 1 << 0;
pub const DEVICE_TYPE_CPU: u64 = 1 << 1;
pub const DEVICE_TYPE_GPU: u64 = 1 << 2;
pub const DEVICE_TYPE_ACCELERATOR: u64 = 1 << 3;

/// The kind of a compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Accelerator,
    Unknown,
}

impl DeviceKind {
    /// Every kind, in display order.
    pub const ALL: [DeviceKind; 4] =
        [DeviceKind::Cpu, DeviceKind::Gpu, DeviceKind::Accelerator, DeviceKind::Unknown];

    /// Map a device-type bitfield to a kind.
    ///
    /// The "default device" bit is ignored; a bitfield with none of the CPU,
    /// GPU or accelerator bits maps to [`DeviceKind::Unknown`].
    pub const fn from_type_bits(bits: u64) -> Self {
        let bits = bits & !DEVICE_TYPE_DEFAULT;
        if bits & DEVICE_TYPE_GPU != 0 {
            DeviceKind::Gpu
        } else if bits & DEVICE_TYPE_CPU != 0 {
            DeviceKind::Cpu
        } else if bits & DEVICE_TYPE_ACCELERATOR != 0 {
            DeviceKind::Accelerator
        } else {
            DeviceKind::Unknown
        }
    }

    /// Short label used in every report.
    pub const fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
            DeviceKind::Accelerator => "accel",
            DeviceKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(platform index, device index)` pair, unique within one enumeration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId {
    pub platform: u32,
    pub device: u32,
}

impl DeviceId {
    pub const fn new(platform: u32, device: u32) -> Self {
        Self { platform, device }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.platform, self.device)
    }
}

/// Identity attached to out-of-band driver notifications for one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyTag {
    pub id: DeviceId,
    pub name: String,
}

impl NotifyTag {
    pub fn new<S: Into<String>>(id: DeviceId, name: S) -> Self {
        Self { id, name: name.into() }
    }
}

/// Log an asynchronous driver notification on the diagnostic stream.
///
/// Notifications are best-effort: they are never tied to a failing stage
/// and never interrupt the session that owns the context.
pub fn log_notification(tag: &NotifyTag, message: &str) {
    tracing::warn!(
        target: "clvec::notify",
        device = %tag.id,
        name = %tag.name,
        "driver notification: {}",
        message.trim_end()
    );
}
