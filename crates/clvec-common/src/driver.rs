//! The seam between clvec and a compute platform runtime.
//!
//! A [`ComputeDriver`] exposes platform/device queries plus the handful of
//! resource operations the vector-add dispatch needs. Every handle type
//! releases its underlying driver object when dropped; callers control the
//! release order by controlling when handles are dropped.
//!
//! Abstracted so the session lifecycle can be exercised without real
//! hardware (see the `mock` feature).

use crate::device::{DeviceKind, NotifyTag};
use crate::error::DriverResult;

/// Platform attributes that can be fetched as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformParam {
    Name,
    Version,
}

/// Access mode of a device buffer, from the kernel's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    ReadOnly,
    WriteOnly,
}

/// A compute platform runtime.
pub trait ComputeDriver {
    type Platform: Clone;
    type Device: Clone;
    type Context;
    type Buffer;
    type Program;
    type Kernel;
    type Queue;
    type Event;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// All platforms visible to this process.
    fn platforms(&self) -> DriverResult<Vec<Self::Platform>>;

    fn platform_info(&self, platform: &Self::Platform, param: PlatformParam)
    -> DriverResult<String>;

    /// Devices of every kind exposed by `platform`.
    fn devices(&self, platform: &Self::Platform) -> DriverResult<Vec<Self::Device>>;

    fn device_kind(&self, device: &Self::Device) -> DriverResult<DeviceKind>;

    fn device_name(&self, device: &Self::Device) -> DriverResult<String>;

    fn device_compute_units(&self, device: &Self::Device) -> DriverResult<u32>;

    fn device_global_mem_size(&self, device: &Self::Device) -> DriverResult<u64>;

    /// Create a context bound to exactly one device.
    ///
    /// When `notify` is set the driver registers a callback that reports
    /// asynchronous messages tagged with that identity.
    fn create_context(
        &self,
        device: &Self::Device,
        notify: Option<NotifyTag>,
    ) -> DriverResult<Self::Context>;

    /// Allocate a device buffer of `len` `f32` elements.
    fn create_buffer(
        &self,
        context: &Self::Context,
        access: BufferAccess,
        len: usize,
    ) -> DriverResult<Self::Buffer>;

    /// Compile `source` for the context's device.
    fn build_program(
        &self,
        context: &Self::Context,
        source: &str,
        options: &str,
    ) -> DriverResult<Self::Program>;

    fn create_kernel(&self, program: &Self::Program, entry: &str) -> DriverResult<Self::Kernel>;

    fn set_buffer_arg(
        &self,
        kernel: &mut Self::Kernel,
        index: u32,
        buffer: &Self::Buffer,
    ) -> DriverResult<()>;

    fn set_scalar_arg(&self, kernel: &mut Self::Kernel, index: u32, value: u32)
    -> DriverResult<()>;

    /// Create an in-order command queue on the context's device.
    fn create_queue(
        &self,
        context: &Self::Context,
        device: &Self::Device,
        profiling: bool,
    ) -> DriverResult<Self::Queue>;

    /// Submit a non-blocking host-to-device copy.
    ///
    /// # Safety
    ///
    /// The transfer may still be reading `data` after this returns. The
    /// caller must keep `data` alive and unmodified until a later blocking
    /// operation or [`ComputeDriver::finish`] on the same queue completes.
    unsafe fn enqueue_write(
        &self,
        queue: &Self::Queue,
        buffer: &mut Self::Buffer,
        data: &[f32],
    ) -> DriverResult<()>;

    /// Enqueue a one-dimensional launch of `global_size` work items with a
    /// driver-chosen local size.
    fn enqueue_kernel(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        global_size: usize,
    ) -> DriverResult<Self::Event>;

    /// Blocking device-to-host copy.
    fn read_buffer(
        &self,
        queue: &Self::Queue,
        buffer: &Self::Buffer,
        out: &mut [f32],
    ) -> DriverResult<()>;

    fn wait(&self, event: &Self::Event) -> DriverResult<()>;

    /// Device-reported `(start, end)` timestamps in nanoseconds.
    fn profiling_span(&self, event: &Self::Event) -> DriverResult<(u64, u64)>;

    /// Block until every command submitted to `queue` has completed.
    fn finish(&self, queue: &Self::Queue) -> DriverResult<()>;
}
