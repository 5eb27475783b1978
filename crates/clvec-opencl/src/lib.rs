//! Vector-add dispatch across every compute device.
//!
//! For each device in a [`DeviceDirectory`](clvec_device_probe::DeviceDirectory)
//! the [`DispatchPipeline`] opens an [`ExecutionSession`], uploads two seeded
//! input vectors, launches the `vector_add` kernel, downloads the result,
//! reads the kernel's device-side execution time and compares the output
//! bit for bit against a CPU reference.
//!
//! The real OpenCL backend lives behind the `opencl-runtime` feature so the
//! crate builds and tests without an ICD loader installed.

#[cfg(feature = "opencl-runtime")]
pub mod driver;
pub mod kernels;
pub mod pipeline;
pub mod reference;
pub mod session;
pub mod verify;

#[cfg(feature = "opencl-runtime")]
pub use driver::OpenClDriver;
pub use pipeline::{DeviceReport, DispatchPipeline, RunSummary, StageFailure};
pub use reference::{HostInputs, ReferenceRun};
pub use session::{DeviceTiming, ExecutionSession};
pub use verify::{Verification, verify};
