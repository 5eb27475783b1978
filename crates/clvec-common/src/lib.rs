//! Common types for clvec.
//!
//! This crate holds the pieces every other clvec crate agrees on: the
//! error taxonomy, device identity and kind mapping, session stages, the
//! [`ComputeDriver`] seam over a compute platform runtime, and the dispatch
//! configuration. With the `mock` feature it also provides an in-memory
//! driver for hardware-free tests.

pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod stage;

#[cfg(feature = "mock")]
pub mod mock;

pub use config::DispatchConfig;
pub use device::{DeviceId, DeviceKind, NotifyTag, log_notification};
pub use driver::{BufferAccess, ComputeDriver, PlatformParam};
pub use error::{ClvecError, DriverError, DriverResult, ErrorKind, Result};
pub use stage::{Resource, Stage};
