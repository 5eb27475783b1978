//! In-memory [`ComputeDriver`] for tests.
//!
//! Platforms and devices are plain data. Every handle the driver hands out
//! writes an `acquire` entry to a shared [`Journal`] when created and a
//! `release` entry when dropped, so tests can check exactly which handles a
//! session released and in what order. Faults can be injected per device at
//! any operation; a kernel launch really performs the elementwise add.

use std::cell::Cell;
use std::sync::{Arc, Mutex};

use crate::device::{
    DEVICE_TYPE_ACCELERATOR, DEVICE_TYPE_CPU, DEVICE_TYPE_GPU, DeviceKind, NotifyTag,
};
use crate::driver::{BufferAccess, ComputeDriver, PlatformParam};
use crate::error::{CL_PLATFORM_NOT_FOUND_KHR, DriverError, DriverResult};

/// A driver operation at which a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    DeviceKind,
    DeviceName,
    ComputeUnits,
    GlobalMemSize,
    CreateContext,
    /// The n-th buffer allocation on a context (0-based).
    CreateBuffer(usize),
    BuildProgram,
    CreateKernel,
    /// Binding kernel argument `index`.
    SetArg(u32),
    CreateQueue,
    /// The n-th upload on a queue (0-based).
    Write(usize),
    EnqueueKernel,
    Read,
    Wait,
    Profiling,
    Finish,
}

impl MockOp {
    fn status(self) -> (i32, &'static str) {
        match self {
            MockOp::DeviceKind
            | MockOp::DeviceName
            | MockOp::ComputeUnits
            | MockOp::GlobalMemSize => (-30, "CL_INVALID_VALUE"),
            MockOp::CreateContext => (-2, "CL_DEVICE_NOT_AVAILABLE"),
            MockOp::CreateBuffer(_) => (-4, "CL_MEM_OBJECT_ALLOCATION_FAILURE"),
            MockOp::BuildProgram => (-11, "CL_BUILD_PROGRAM_FAILURE"),
            MockOp::CreateKernel => (-46, "CL_INVALID_KERNEL_NAME"),
            MockOp::SetArg(_) => (-50, "CL_INVALID_ARG_VALUE"),
            MockOp::CreateQueue => (-6, "CL_OUT_OF_HOST_MEMORY"),
            MockOp::Write(_) | MockOp::Read | MockOp::Finish => (-5, "CL_OUT_OF_RESOURCES"),
            MockOp::EnqueueKernel => (-54, "CL_INVALID_WORK_GROUP_SIZE"),
            MockOp::Wait => (-14, "CL_EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST"),
            MockOp::Profiling => (-7, "CL_PROFILING_INFO_NOT_AVAILABLE"),
        }
    }
}

/// Whether a journal entry records an acquisition or a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalAction {
    Acquire,
    Release,
    Finish,
}

/// One entry of the handle journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub device: String,
    pub action: JournalAction,
    pub label: String,
}

/// Shared, append-only log of handle lifecycle events.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<JournalEntry>>>);

impl Journal {
    fn push(&self, device: &str, action: JournalAction, label: &str) {
        let mut entries = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.push(JournalEntry { device: device.to_owned(), action, label: label.to_owned() });
    }

    /// Snapshot of every entry so far.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Labels recorded for `device` with `action`, in order.
    pub fn labels(&self, device: &str, action: JournalAction) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.device == device && e.action == action)
            .map(|e| e.label)
            .collect()
    }

    pub fn acquired(&self, device: &str) -> Vec<String> {
        self.labels(device, JournalAction::Acquire)
    }

    pub fn released(&self, device: &str) -> Vec<String> {
        self.labels(device, JournalAction::Release)
    }
}

/// A handle that journals its own release.
#[derive(Debug)]
struct Tracked {
    device: String,
    label: String,
    journal: Journal,
}

impl Tracked {
    fn new(journal: &Journal, device: &str, label: impl Into<String>) -> Self {
        let label = label.into();
        journal.push(device, JournalAction::Acquire, &label);
        Self { device: device.to_owned(), label, journal: journal.clone() }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.journal.push(&self.device, JournalAction::Release, &self.label);
    }
}

/// A simulated device.
#[derive(Debug, Clone, PartialEq)]
pub struct MockDevice {
    pub name: String,
    pub type_bits: u64,
    pub compute_units: u32,
    pub global_mem_size: u64,
    pub faults: Vec<MockOp>,
}

impl MockDevice {
    pub fn new<S: Into<String>>(name: S, type_bits: u64) -> Self {
        Self {
            name: name.into(),
            type_bits,
            compute_units: 8,
            global_mem_size: 4 * 1024 * 1024 * 1024,
            faults: Vec::new(),
        }
    }

    pub fn gpu<S: Into<String>>(name: S) -> Self {
        Self::new(name, DEVICE_TYPE_GPU)
    }

    pub fn cpu<S: Into<String>>(name: S) -> Self {
        Self::new(name, DEVICE_TYPE_CPU)
    }

    pub fn accelerator<S: Into<String>>(name: S) -> Self {
        Self::new(name, DEVICE_TYPE_ACCELERATOR)
    }

    /// Inject a fault at `op` for this device.
    #[must_use]
    pub fn failing(mut self, op: MockOp) -> Self {
        self.faults.push(op);
        self
    }

    #[must_use]
    pub fn with_memory(mut self, bytes: u64) -> Self {
        self.global_mem_size = bytes;
        self
    }

    #[must_use]
    pub fn with_compute_units(mut self, units: u32) -> Self {
        self.compute_units = units;
        self
    }

    fn check(&self, op: MockOp, operation: &str) -> DriverResult<()> {
        if self.faults.contains(&op) {
            let (code, message) = op.status();
            return Err(DriverError::new(operation, code, message));
        }
        Ok(())
    }
}

/// A simulated platform.
#[derive(Debug, Clone, PartialEq)]
pub struct MockPlatform {
    pub name: String,
    pub version: String,
    pub devices: Vec<MockDevice>,
    /// The device query for this platform fails.
    pub fail_device_query: bool,
    /// Platform string queries fail.
    pub fail_info_query: bool,
}

impl MockPlatform {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            version: "OpenCL 3.0 mock".to_owned(),
            devices: Vec::new(),
            fail_device_query: false,
            fail_info_query: false,
        }
    }

    #[must_use]
    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.devices.push(device);
        self
    }

    #[must_use]
    pub fn with_failing_device_query(mut self) -> Self {
        self.fail_device_query = true;
        self
    }

    #[must_use]
    pub fn with_failing_info_query(mut self) -> Self {
        self.fail_info_query = true;
        self
    }
}

/// Context handle.
#[derive(Debug)]
pub struct MockContext {
    device: MockDevice,
    buffers_created: Cell<usize>,
    pub notify: Option<NotifyTag>,
    _tracked: Tracked,
}

/// Buffer handle; the contents are shared with kernels bound to it.
#[derive(Debug)]
pub struct MockBuffer {
    pub access: BufferAccess,
    data: Arc<Mutex<Vec<f32>>>,
    _tracked: Tracked,
}

/// Program handle.
#[derive(Debug)]
pub struct MockProgram {
    device: MockDevice,
    source: String,
    _tracked: Tracked,
}

#[derive(Debug, Clone)]
enum MockArg {
    Buffer(Arc<Mutex<Vec<f32>>>),
    Scalar(u32),
}

/// Kernel handle.
#[derive(Debug)]
pub struct MockKernel {
    device: MockDevice,
    args: [Option<MockArg>; 4],
    _tracked: Tracked,
}

/// Queue handle.
#[derive(Debug)]
pub struct MockQueue {
    device: MockDevice,
    profiling: bool,
    writes: Cell<usize>,
    _tracked: Tracked,
}

/// Completion event of a kernel launch.
#[derive(Debug)]
pub struct MockEvent {
    device: MockDevice,
    profiling: bool,
    _tracked: Tracked,
}

/// In-memory driver.
#[derive(Debug, Clone)]
pub struct MockDriver {
    platforms: Vec<MockPlatform>,
    platform_query_failure: Option<(i32, &'static str)>,
    profiling_span: (u64, u64),
    corrupt_output: Option<(usize, f32)>,
    journal: Journal,
}

impl MockDriver {
    pub fn new(platforms: Vec<MockPlatform>) -> Self {
        Self {
            platforms,
            platform_query_failure: None,
            profiling_span: (1_000, 251_000),
            corrupt_output: None,
            journal: Journal::default(),
        }
    }

    /// A driver whose loader finds no platform (`CL_PLATFORM_NOT_FOUND_KHR`).
    pub fn broken() -> Self {
        Self::broken_with(CL_PLATFORM_NOT_FOUND_KHR, "CL_PLATFORM_NOT_FOUND_KHR")
    }

    /// A driver whose platform query fails with `code`.
    pub fn broken_with(code: i32, message: &'static str) -> Self {
        Self { platform_query_failure: Some((code, message)), ..Self::new(Vec::new()) }
    }

    /// Overwrite element `index` of every kernel output with `value`.
    #[must_use]
    pub fn with_corrupt_output(mut self, index: usize, value: f32) -> Self {
        self.corrupt_output = Some((index, value));
        self
    }

    /// Timestamps reported for every kernel event.
    #[must_use]
    pub fn with_profiling_span(mut self, start_ns: u64, end_ns: u64) -> Self {
        self.profiling_span = (start_ns, end_ns);
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    fn platform(&self, index: usize) -> DriverResult<&MockPlatform> {
        self.platforms
            .get(index)
            .ok_or_else(|| DriverError::new("clGetPlatformInfo", -32, "CL_INVALID_PLATFORM"))
    }
}

fn lock(data: &Mutex<Vec<f32>>) -> std::sync::MutexGuard<'_, Vec<f32>> {
    data.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl ComputeDriver for MockDriver {
    type Platform = usize;
    type Device = MockDevice;
    type Context = MockContext;
    type Buffer = MockBuffer;
    type Program = MockProgram;
    type Kernel = MockKernel;
    type Queue = MockQueue;
    type Event = MockEvent;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn platforms(&self) -> DriverResult<Vec<usize>> {
        if let Some((code, message)) = self.platform_query_failure {
            return Err(DriverError::new("clGetPlatformIDs", code, message));
        }
        Ok((0..self.platforms.len()).collect())
    }

    fn platform_info(&self, platform: &usize, param: PlatformParam) -> DriverResult<String> {
        let p = self.platform(*platform)?;
        if p.fail_info_query {
            return Err(DriverError::new("clGetPlatformInfo", -30, "CL_INVALID_VALUE"));
        }
        Ok(match param {
            PlatformParam::Name => p.name.clone(),
            PlatformParam::Version => p.version.clone(),
        })
    }

    fn devices(&self, platform: &usize) -> DriverResult<Vec<MockDevice>> {
        let p = self.platform(*platform)?;
        if p.fail_device_query {
            return Err(DriverError::new("clGetDeviceIDs", -1, "CL_DEVICE_NOT_FOUND"));
        }
        Ok(p.devices.clone())
    }

    fn device_kind(&self, device: &MockDevice) -> DriverResult<DeviceKind> {
        device.check(MockOp::DeviceKind, "clGetDeviceInfo(CL_DEVICE_TYPE)")?;
        Ok(DeviceKind::from_type_bits(device.type_bits))
    }

    fn device_name(&self, device: &MockDevice) -> DriverResult<String> {
        device.check(MockOp::DeviceName, "clGetDeviceInfo(CL_DEVICE_NAME)")?;
        Ok(device.name.clone())
    }

    fn device_compute_units(&self, device: &MockDevice) -> DriverResult<u32> {
        device.check(MockOp::ComputeUnits, "clGetDeviceInfo(CL_DEVICE_MAX_COMPUTE_UNITS)")?;
        Ok(device.compute_units)
    }

    fn device_global_mem_size(&self, device: &MockDevice) -> DriverResult<u64> {
        device.check(MockOp::GlobalMemSize, "clGetDeviceInfo(CL_DEVICE_GLOBAL_MEM_SIZE)")?;
        Ok(device.global_mem_size)
    }

    fn create_context(
        &self,
        device: &MockDevice,
        notify: Option<NotifyTag>,
    ) -> DriverResult<MockContext> {
        device.check(MockOp::CreateContext, "clCreateContext")?;
        Ok(MockContext {
            device: device.clone(),
            buffers_created: Cell::new(0),
            notify,
            _tracked: Tracked::new(&self.journal, &device.name, "context"),
        })
    }

    fn create_buffer(
        &self,
        context: &MockContext,
        access: BufferAccess,
        len: usize,
    ) -> DriverResult<MockBuffer> {
        let n = context.buffers_created.get();
        context.device.check(MockOp::CreateBuffer(n), "clCreateBuffer")?;
        context.buffers_created.set(n + 1);
        Ok(MockBuffer {
            access,
            data: Arc::new(Mutex::new(vec![0.0; len])),
            _tracked: Tracked::new(&self.journal, &context.device.name, format!("buffer{n}")),
        })
    }

    fn build_program(
        &self,
        context: &MockContext,
        source: &str,
        _options: &str,
    ) -> DriverResult<MockProgram> {
        context.device.check(MockOp::BuildProgram, "clBuildProgram")?;
        Ok(MockProgram {
            device: context.device.clone(),
            source: source.to_owned(),
            _tracked: Tracked::new(&self.journal, &context.device.name, "program"),
        })
    }

    fn create_kernel(&self, program: &MockProgram, entry: &str) -> DriverResult<MockKernel> {
        program.device.check(MockOp::CreateKernel, "clCreateKernel")?;
        if !program.source.contains(entry) {
            let (code, message) = MockOp::CreateKernel.status();
            return Err(DriverError::new("clCreateKernel", code, message));
        }
        Ok(MockKernel {
            device: program.device.clone(),
            args: [None, None, None, None],
            _tracked: Tracked::new(&self.journal, &program.device.name, "kernel"),
        })
    }

    fn set_buffer_arg(
        &self,
        kernel: &mut MockKernel,
        index: u32,
        buffer: &MockBuffer,
    ) -> DriverResult<()> {
        kernel.device.check(MockOp::SetArg(index), "clSetKernelArg")?;
        let slot = kernel
            .args
            .get_mut(index as usize)
            .ok_or_else(|| DriverError::new("clSetKernelArg", -49, "CL_INVALID_ARG_INDEX"))?;
        *slot = Some(MockArg::Buffer(Arc::clone(&buffer.data)));
        Ok(())
    }

    fn set_scalar_arg(&self, kernel: &mut MockKernel, index: u32, value: u32) -> DriverResult<()> {
        kernel.device.check(MockOp::SetArg(index), "clSetKernelArg")?;
        let slot = kernel
            .args
            .get_mut(index as usize)
            .ok_or_else(|| DriverError::new("clSetKernelArg", -49, "CL_INVALID_ARG_INDEX"))?;
        *slot = Some(MockArg::Scalar(value));
        Ok(())
    }

    fn create_queue(
        &self,
        context: &MockContext,
        _device: &MockDevice,
        profiling: bool,
    ) -> DriverResult<MockQueue> {
        context.device.check(MockOp::CreateQueue, "clCreateCommandQueue")?;
        Ok(MockQueue {
            device: context.device.clone(),
            profiling,
            writes: Cell::new(0),
            _tracked: Tracked::new(&self.journal, &context.device.name, "queue"),
        })
    }

    unsafe fn enqueue_write(
        &self,
        queue: &MockQueue,
        buffer: &mut MockBuffer,
        data: &[f32],
    ) -> DriverResult<()> {
        let n = queue.writes.get();
        queue.device.check(MockOp::Write(n), "clEnqueueWriteBuffer")?;
        queue.writes.set(n + 1);
        let mut dst = lock(&buffer.data);
        if data.len() > dst.len() {
            return Err(DriverError::new("clEnqueueWriteBuffer", -30, "CL_INVALID_VALUE"));
        }
        dst[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        queue: &MockQueue,
        kernel: &MockKernel,
        global_size: usize,
    ) -> DriverResult<MockEvent> {
        queue.device.check(MockOp::EnqueueKernel, "clEnqueueNDRangeKernel")?;
        let invalid_args = || DriverError::new("clEnqueueNDRangeKernel", -52, "CL_INVALID_KERNEL_ARGS");
        let (a, b, c, count) = match &kernel.args {
            [
                Some(MockArg::Buffer(a)),
                Some(MockArg::Buffer(b)),
                Some(MockArg::Buffer(c)),
                Some(MockArg::Scalar(count)),
            ] => (Arc::clone(a), Arc::clone(b), Arc::clone(c), *count as usize),
            _ => return Err(invalid_args()),
        };

        let a = lock(&a).clone();
        let b = lock(&b).clone();
        let mut c = lock(&c);
        let n = global_size.min(count).min(a.len()).min(b.len()).min(c.len());
        for i in 0..n {
            c[i] = a[i] + b[i];
        }
        if let Some((index, value)) = self.corrupt_output {
            if index < n {
                c[index] = value;
            }
        }

        Ok(MockEvent {
            device: queue.device.clone(),
            profiling: queue.profiling,
            _tracked: Tracked::new(&self.journal, &queue.device.name, "event"),
        })
    }

    fn read_buffer(&self, queue: &MockQueue, buffer: &MockBuffer, out: &mut [f32]) -> DriverResult<()> {
        queue.device.check(MockOp::Read, "clEnqueueReadBuffer")?;
        let src = lock(&buffer.data);
        if out.len() > src.len() {
            return Err(DriverError::new("clEnqueueReadBuffer", -30, "CL_INVALID_VALUE"));
        }
        out.copy_from_slice(&src[..out.len()]);
        Ok(())
    }

    fn wait(&self, event: &MockEvent) -> DriverResult<()> {
        event.device.check(MockOp::Wait, "clWaitForEvents")
    }

    fn profiling_span(&self, event: &MockEvent) -> DriverResult<(u64, u64)> {
        event.device.check(MockOp::Profiling, "clGetEventProfilingInfo")?;
        if !event.profiling {
            let (code, message) = MockOp::Profiling.status();
            return Err(DriverError::new("clGetEventProfilingInfo", code, message));
        }
        Ok(self.profiling_span)
    }

    fn finish(&self, queue: &MockQueue) -> DriverResult<()> {
        queue.device.check(MockOp::Finish, "clFinish")?;
        self.journal.push(&queue.device.name, JournalAction::Finish, "queue");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_gpu() -> MockDriver {
        MockDriver::new(vec![MockPlatform::new("Mock").with_device(MockDevice::gpu("gpu0"))])
    }

    #[test]
    fn handles_journal_acquire_and_release() {
        let driver = one_gpu();
        let device = driver.devices(&0).unwrap().remove(0);
        {
            let ctx = driver.create_context(&device, None).unwrap();
            let _buf = driver.create_buffer(&ctx, BufferAccess::ReadOnly, 4).unwrap();
        }
        assert_eq!(driver.journal().acquired("gpu0"), ["context", "buffer0"]);
        assert_eq!(driver.journal().released("gpu0"), ["buffer0", "context"]);
    }

    #[test]
    fn injected_fault_reports_operation_and_code() {
        let driver = MockDriver::new(vec![MockPlatform::new("Mock")
            .with_device(MockDevice::gpu("gpu0").failing(MockOp::BuildProgram))]);
        let device = driver.devices(&0).unwrap().remove(0);
        let ctx = driver.create_context(&device, None).unwrap();
        let err = driver.build_program(&ctx, "vector_add", "").unwrap_err();
        assert_eq!(err.operation, "clBuildProgram");
        assert_eq!(err.code, -11);
    }

    #[test]
    fn kernel_launch_requires_all_arguments() {
        let driver = one_gpu();
        let device = driver.devices(&0).unwrap().remove(0);
        let ctx = driver.create_context(&device, None).unwrap();
        let program = driver.build_program(&ctx, "__kernel void vector_add()", "").unwrap();
        let kernel = driver.create_kernel(&program, "vector_add").unwrap();
        let queue = driver.create_queue(&ctx, &device, false).unwrap();
        let err = driver.enqueue_kernel(&queue, &kernel, 4).unwrap_err();
        assert_eq!(err.code, -52);
    }

    #[test]
    fn profiling_unavailable_without_profiling_queue() {
        let driver = one_gpu();
        let device = driver.devices(&0).unwrap().remove(0);
        let ctx = driver.create_context(&device, None).unwrap();
        let a = driver.create_buffer(&ctx, BufferAccess::ReadOnly, 1).unwrap();
        let b = driver.create_buffer(&ctx, BufferAccess::ReadOnly, 1).unwrap();
        let c = driver.create_buffer(&ctx, BufferAccess::WriteOnly, 1).unwrap();
        let program = driver.build_program(&ctx, "vector_add", "").unwrap();
        let mut kernel = driver.create_kernel(&program, "vector_add").unwrap();
        driver.set_buffer_arg(&mut kernel, 0, &a).unwrap();
        driver.set_buffer_arg(&mut kernel, 1, &b).unwrap();
        driver.set_buffer_arg(&mut kernel, 2, &c).unwrap();
        driver.set_scalar_arg(&mut kernel, 3, 1).unwrap();
        let queue = driver.create_queue(&ctx, &device, false).unwrap();
        let event = driver.enqueue_kernel(&queue, &kernel, 1).unwrap();
        driver.wait(&event).unwrap();
        assert_eq!(driver.profiling_span(&event).unwrap_err().code, -7);
    }

    #[test]
    fn broken_driver_fails_platform_query() {
        assert!(MockDriver::broken().platforms().is_err());
    }
}
