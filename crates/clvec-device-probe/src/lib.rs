//! Platform and device discovery for clvec.
//!
//! [`DeviceDirectory::enumerate`] walks every platform a
//! [`ComputeDriver`](clvec_common::ComputeDriver) exposes and returns a flat,
//! ordered list of usable devices. [`describe_platforms`] produces the
//! richer per-platform report used by `clvec info`.

pub mod directory;
pub mod info;

pub use directory::{Device, DeviceDirectory};
pub use info::{DeviceSummary, PlatformSummary, describe_platforms, format_memory_size};
