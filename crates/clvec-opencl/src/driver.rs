//! [`ComputeDriver`] backed by the system OpenCL ICD loader via `opencl3`.

use std::ffi::{CStr, c_char, c_void};
use std::ptr;
use std::sync::{Arc, Mutex, PoisonError};

use clvec_common::{
    BufferAccess, ComputeDriver, DeviceKind, DriverError, DriverResult, NotifyTag, PlatformParam,
    log_notification,
};
use opencl3::command_queue::{CL_QUEUE_PROFILING_ENABLE, CommandQueue};
use opencl3::context::Context;
use opencl3::device::{CL_DEVICE_TYPE_ALL, Device};
use opencl3::error_codes::ClError;
use opencl3::event::Event;
use opencl3::kernel::Kernel;
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY, ClMem};
use opencl3::platform::{Platform, get_platforms};
use opencl3::program::Program;
use opencl3::types::{CL_BLOCKING, CL_NON_BLOCKING, cl_device_id, cl_float, cl_uint};
use tracing::{debug, warn};

/// Status code reported for a failed program build.
const CL_BUILD_PROGRAM_FAILURE: i32 = -11;

fn cl_err(operation: &str) -> impl FnOnce(ClError) -> DriverError + '_ {
    move |e| DriverError::new(operation, e.0, e.to_string())
}

/// A single-device context. Its notification tag, if any, is owned by the
/// driver.
pub struct OpenClContext {
    context: Context,
}

unsafe extern "C" fn notify_callback(
    errinfo: *const c_char,
    _private_info: *const c_void,
    _cb: usize,
    user_data: *mut c_void,
) {
    if errinfo.is_null() || user_data.is_null() {
        return;
    }
    // SAFETY: user_data points into an Arc<NotifyTag> retained by the
    // OpenClDriver that created the context. The runtime may deliver a
    // callback after clReleaseContext, so the tag lives as long as the
    // driver rather than the context. errinfo is a NUL-terminated string
    // owned by the runtime for the duration of the call.
    let (tag, message) = unsafe {
        (&*(user_data as *const NotifyTag), CStr::from_ptr(errinfo).to_string_lossy())
    };
    log_notification(tag, &message);
}

/// Driver over the installed OpenCL platforms.
///
/// Notification tags handed to contexts are retained here until the driver
/// is dropped, so a late callback never sees a freed tag.
#[derive(Debug, Default)]
pub struct OpenClDriver {
    notify_tags: Mutex<Vec<Arc<NotifyTag>>>,
}

impl OpenClDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `tag` alive for the driver's lifetime and return the shared handle.
    fn retain_tag(&self, tag: NotifyTag) -> Arc<NotifyTag> {
        let tag = Arc::new(tag);
        self.notify_tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&tag));
        tag
    }

    fn retained_tags(&self) -> usize {
        self.notify_tags.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl ComputeDriver for OpenClDriver {
    type Platform = Platform;
    type Device = cl_device_id;
    type Context = OpenClContext;
    type Buffer = Buffer<cl_float>;
    type Program = Program;
    type Kernel = Kernel;
    type Queue = CommandQueue;
    type Event = Event;

    fn name(&self) -> &'static str {
        "opencl"
    }

    fn platforms(&self) -> DriverResult<Vec<Platform>> {
        get_platforms().map_err(cl_err("clGetPlatformIDs"))
    }

    fn platform_info(&self, platform: &Platform, param: PlatformParam) -> DriverResult<String> {
        let value = match param {
            PlatformParam::Name => platform.name(),
            PlatformParam::Version => platform.version(),
        };
        value.map_err(cl_err("clGetPlatformInfo"))
    }

    fn devices(&self, platform: &Platform) -> DriverResult<Vec<cl_device_id>> {
        platform.get_devices(CL_DEVICE_TYPE_ALL).map_err(cl_err("clGetDeviceIDs"))
    }

    fn device_kind(&self, device: &cl_device_id) -> DriverResult<DeviceKind> {
        let bits = Device::new(*device)
            .dev_type()
            .map_err(cl_err("clGetDeviceInfo(CL_DEVICE_TYPE)"))?;
        Ok(DeviceKind::from_type_bits(bits))
    }

    fn device_name(&self, device: &cl_device_id) -> DriverResult<String> {
        Device::new(*device).name().map_err(cl_err("clGetDeviceInfo(CL_DEVICE_NAME)"))
    }

    fn device_compute_units(&self, device: &cl_device_id) -> DriverResult<u32> {
        Device::new(*device)
            .max_compute_units()
            .map_err(cl_err("clGetDeviceInfo(CL_DEVICE_MAX_COMPUTE_UNITS)"))
    }

    fn device_global_mem_size(&self, device: &cl_device_id) -> DriverResult<u64> {
        Device::new(*device)
            .global_mem_size()
            .map_err(cl_err("clGetDeviceInfo(CL_DEVICE_GLOBAL_MEM_SIZE)"))
    }

    fn create_context(
        &self,
        device: &cl_device_id,
        notify: Option<NotifyTag>,
    ) -> DriverResult<OpenClContext> {
        let notify = notify.map(|tag| self.retain_tag(tag));
        let context = match notify.as_deref() {
            Some(tag) => {
                let user_data = tag as *const NotifyTag as *mut c_void;
                Context::from_devices(&[*device], &[], Some(notify_callback), user_data)
            }
            None => Context::from_devices(&[*device], &[], None, ptr::null_mut()),
        }
        .map_err(cl_err("clCreateContext"))?;
        debug!(device = ?device, retained_tags = self.retained_tags(), "context created");
        Ok(OpenClContext { context })
    }

    fn create_buffer(
        &self,
        context: &OpenClContext,
        access: BufferAccess,
        len: usize,
    ) -> DriverResult<Buffer<cl_float>> {
        let flags = match access {
            BufferAccess::ReadOnly => CL_MEM_READ_ONLY,
            BufferAccess::WriteOnly => CL_MEM_WRITE_ONLY,
        };
        // SAFETY: no host pointer is supplied, so the driver owns the storage.
        unsafe { Buffer::<cl_float>::create(&context.context, flags, len, ptr::null_mut()) }
            .map_err(cl_err("clCreateBuffer"))
    }

    fn build_program(
        &self,
        context: &OpenClContext,
        source: &str,
        options: &str,
    ) -> DriverResult<Program> {
        Program::create_and_build_from_source(&context.context, source, options).map_err(|log| {
            warn!("program build failed:\n{log}");
            DriverError::new("clBuildProgram", CL_BUILD_PROGRAM_FAILURE, log)
        })
    }

    fn create_kernel(&self, program: &Program, entry: &str) -> DriverResult<Kernel> {
        Kernel::create(program, entry).map_err(cl_err("clCreateKernel"))
    }

    fn set_buffer_arg(
        &self,
        kernel: &mut Kernel,
        index: u32,
        buffer: &Buffer<cl_float>,
    ) -> DriverResult<()> {
        // SAFETY: the argument is a live cl_mem of the type the kernel declares.
        unsafe { kernel.set_arg(index, &buffer.get()) }.map_err(cl_err("clSetKernelArg"))
    }

    fn set_scalar_arg(&self, kernel: &mut Kernel, index: u32, value: u32) -> DriverResult<()> {
        let value: cl_uint = value;
        // SAFETY: the kernel declares this argument as `unsigned int`.
        unsafe { kernel.set_arg(index, &value) }.map_err(cl_err("clSetKernelArg"))
    }

    fn create_queue(
        &self,
        context: &OpenClContext,
        _device: &cl_device_id,
        profiling: bool,
    ) -> DriverResult<CommandQueue> {
        // The context holds exactly one device, which is its default device.
        let properties = if profiling { CL_QUEUE_PROFILING_ENABLE } else { 0 };
        CommandQueue::create_default_with_properties(&context.context, properties, 0)
            .map_err(cl_err("clCreateCommandQueue"))
    }

    unsafe fn enqueue_write(
        &self,
        queue: &CommandQueue,
        buffer: &mut Buffer<cl_float>,
        data: &[f32],
    ) -> DriverResult<()> {
        // SAFETY: forwarded to the caller, see the trait contract.
        let _event = unsafe { queue.enqueue_write_buffer(buffer, CL_NON_BLOCKING, 0, data, &[]) }
            .map_err(cl_err("clEnqueueWriteBuffer"))?;
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        queue: &CommandQueue,
        kernel: &Kernel,
        global_size: usize,
    ) -> DriverResult<Event> {
        let global = [global_size];
        // SAFETY: one work dimension; `global` outlives the call and a null
        // local size lets the driver choose.
        unsafe {
            queue.enqueue_nd_range_kernel(
                kernel.get(),
                1,
                ptr::null(),
                global.as_ptr(),
                ptr::null(),
                &[],
            )
        }
        .map_err(cl_err("clEnqueueNDRangeKernel"))
    }

    fn read_buffer(
        &self,
        queue: &CommandQueue,
        buffer: &Buffer<cl_float>,
        out: &mut [f32],
    ) -> DriverResult<()> {
        // SAFETY: the read is blocking, so `out` is not touched after return.
        unsafe { queue.enqueue_read_buffer(buffer, CL_BLOCKING, 0, out, &[]) }
            .map_err(cl_err("clEnqueueReadBuffer"))?;
        Ok(())
    }

    fn wait(&self, event: &Event) -> DriverResult<()> {
        event.wait().map_err(cl_err("clWaitForEvents"))
    }

    fn profiling_span(&self, event: &Event) -> DriverResult<(u64, u64)> {
        let start = event
            .profiling_command_start()
            .map_err(cl_err("clGetEventProfilingInfo(CL_PROFILING_COMMAND_START)"))?;
        let end = event
            .profiling_command_end()
            .map_err(cl_err("clGetEventProfilingInfo(CL_PROFILING_COMMAND_END)"))?;
        Ok((start, end))
    }

    fn finish(&self, queue: &CommandQueue) -> DriverResult<()> {
        queue.finish().map_err(cl_err("clFinish"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clvec_common::DeviceId;
    use clvec_device_probe::DeviceDirectory;

    #[test]
    fn build_failure_code_matches_cl_status() {
        assert_eq!(ClError(CL_BUILD_PROGRAM_FAILURE).0, -11);
    }

    #[test]
    fn retained_tag_outlives_the_context_handle() {
        let driver = OpenClDriver::new();
        let tag = driver.retain_tag(NotifyTag::new(DeviceId::new(0, 1), "gpu0"));
        let user_data = Arc::as_ptr(&tag);
        drop(tag);

        assert_eq!(driver.retained_tags(), 1);
        // SAFETY: the driver still holds a clone of the Arc.
        let tag = unsafe { &*user_data };
        assert_eq!(tag.id, DeviceId::new(0, 1));
        assert_eq!(tag.name, "gpu0");
    }

    #[test]
    #[ignore = "requires an installed OpenCL runtime"]
    fn enumerates_installed_devices() {
        let driver = OpenClDriver::new();
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        for device in &dir {
            assert!(!device.name.is_empty());
            println!("{}", device.describe());
        }
    }
}
