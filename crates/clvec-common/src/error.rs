//! Error types shared by every clvec crate.
//!
//! Failures are carried in return values; there is no process-wide
//! "last error" slot. Low-level driver status codes are wrapped in
//! [`DriverError`] together with the name of the operation that produced
//! them, and higher layers attach the session stage and device identity.

use thiserror::Error;

use crate::device::DeviceId;
use crate::stage::Stage;

/// Status returned by the ICD loader when no platform is installed.
pub const CL_PLATFORM_NOT_FOUND_KHR: i32 = -1001;

/// A failing call into the platform driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed with {code}: {message}")]
pub struct DriverError {
    /// Name of the driver operation, e.g. `"clCreateContext"`.
    pub operation: String,
    /// Raw status code reported by the driver (0 when none applies).
    pub code: i32,
    /// Human-readable description of the status code.
    pub message: String,
}

impl DriverError {
    pub fn new<O: Into<String>, M: Into<String>>(operation: O, code: i32, message: M) -> Self {
        Self { operation: operation.into(), code, message: message.into() }
    }

    /// True when the loader reports that no platform is installed.
    pub fn is_platform_not_found(&self) -> bool {
        self.code == CL_PLATFORM_NOT_FOUND_KHR
    }
}

/// Convenience result alias for driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Coarse error taxonomy used for reporting and exit-code decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No platform or no device: fatal to the whole run.
    Enumeration,
    /// A platform or device that could not be described; never fatal.
    DeviceSkipped,
    /// A session stage failed; fatal to that session only.
    Stage,
    /// Invalid configuration supplied by the caller.
    Config,
}

/// Errors produced by clvec.
#[derive(Debug, Error)]
pub enum ClvecError {
    #[error("no compute platform found")]
    NoPlatform,

    #[error("no compute device found")]
    NoDevice,

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("device {device} skipped: {source}")]
    DeviceSkipped {
        device: DeviceId,
        #[source]
        source: DriverError,
    },

    #[error("device {device} failed at {stage}: {source}")]
    Stage {
        stage: Stage,
        device: DeviceId,
        #[source]
        source: DriverError,
    },

    #[error("stage {requested} requested while session is at {current}")]
    OutOfOrder { requested: Stage, current: Stage },

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClvecError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        ClvecError::Config(msg.into())
    }

    /// Classify this error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoPlatform | Self::NoDevice | Self::Driver(_) => ErrorKind::Enumeration,
            Self::DeviceSkipped { .. } => ErrorKind::DeviceSkipped,
            Self::Stage { .. } | Self::OutOfOrder { .. } => ErrorKind::Stage,
            Self::Config(_) | Self::Io(_) => ErrorKind::Config,
        }
    }

    /// The stage a session failed at, if this is a stage failure.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            Self::OutOfOrder { requested, .. } => Some(*requested),
            _ => None,
        }
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, ClvecError>;
