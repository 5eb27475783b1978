//! One device's vector-add job and the handles it owns.
//!
//! An [`ExecutionSession`] walks the stages in [`Stage::FORWARD`] order. Each
//! stage acquires at most a few driver handles and is only entered after
//! the previous stage succeeded. Every handle slot is either unset or live;
//! a failing stage tears the session down immediately, releasing the live
//! handles in reverse acquisition order. Teardown also runs on drop, and a
//! released slot is left unset, so no handle is ever released twice.

use clvec_common::{
    BufferAccess, ClvecError, ComputeDriver, DeviceId, DriverError, DriverResult, NotifyTag,
    Resource, Result, Stage,
};
use clvec_device_probe::Device;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::kernels::{ARG_A, ARG_B, ARG_C, ARG_COUNT};
use crate::reference::HostInputs;

/// Device-side execution time of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceTiming {
    Elapsed { seconds: f64 },
    /// Profiling was disabled or the driver could not report timestamps.
    Unavailable,
}

impl DeviceTiming {
    pub fn seconds(&self) -> Option<f64> {
        match self {
            DeviceTiming::Elapsed { seconds } => Some(*seconds),
            DeviceTiming::Unavailable => None,
        }
    }
}

/// Per-device execution session.
pub struct ExecutionSession<'d, D: ComputeDriver> {
    driver: &'d D,
    device: &'d Device<D>,

    host_a: Vec<f32>,
    host_b: Vec<f32>,
    host_c: Vec<f32>,

    context: Option<D::Context>,
    buffer_a: Option<D::Buffer>,
    buffer_b: Option<D::Buffer>,
    buffer_c: Option<D::Buffer>,
    program: Option<D::Program>,
    kernel: Option<D::Kernel>,
    queue: Option<D::Queue>,
    event: Option<D::Event>,

    stage: Stage,
    reached: Stage,
    failed_at: Option<Stage>,
    profiling: bool,
    timing: Option<DeviceTiming>,
    released: Vec<Resource>,
}

fn not_live(resource: Resource) -> DriverError {
    DriverError::new("session", 0, format!("{resource} is not live"))
}

impl<'d, D: ComputeDriver> ExecutionSession<'d, D> {
    /// Create an empty session that owns copies of `inputs`.
    pub fn new(driver: &'d D, device: &'d Device<D>, inputs: &HostInputs) -> Self {
        Self {
            driver,
            device,
            host_a: inputs.a.clone(),
            host_b: inputs.b.clone(),
            host_c: vec![0.0; inputs.len()],
            context: None,
            buffer_a: None,
            buffer_b: None,
            buffer_c: None,
            program: None,
            kernel: None,
            queue: None,
            event: None,
            stage: Stage::Empty,
            reached: Stage::Empty,
            failed_at: None,
            profiling: false,
            timing: None,
            released: Vec::new(),
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device.id
    }

    pub fn len(&self) -> usize {
        self.host_c.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host_c.is_empty()
    }

    /// Current state, [`Stage::Teardown`] once torn down.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Last forward stage that completed.
    pub fn reached(&self) -> Stage {
        self.reached
    }

    /// Stage whose failure ended the session, if any.
    pub fn failed_at(&self) -> Option<Stage> {
        self.failed_at
    }

    /// Handles released by teardown, in release order.
    pub fn released(&self) -> &[Resource] {
        &self.released
    }

    pub fn timing(&self) -> Option<DeviceTiming> {
        self.timing
    }

    /// Host copy of the output vector; meaningful after [`Stage::Downloaded`].
    pub fn output(&self) -> &[f32] {
        &self.host_c
    }

    /// Handles currently live, in acquisition order.
    pub fn live_resources(&self) -> Vec<Resource> {
        let slots = [
            (self.context.is_some(), Resource::Context),
            (self.buffer_a.is_some(), Resource::BufferA),
            (self.buffer_b.is_some(), Resource::BufferB),
            (self.buffer_c.is_some(), Resource::BufferC),
            (self.program.is_some(), Resource::Program),
            (self.kernel.is_some(), Resource::Kernel),
            (self.queue.is_some(), Resource::Queue),
            (self.event.is_some(), Resource::Event),
        ];
        slots.into_iter().filter_map(|(live, r)| live.then_some(r)).collect()
    }

    // ── Stages ───────────────────────────────────────────────────────────────

    /// Bind the device to a new context.
    pub fn create_context(&mut self, notify: bool) -> Result<()> {
        let driver = self.driver;
        self.run_stage(Stage::Context, |s| {
            let tag = notify.then(|| NotifyTag::new(s.device.id, s.device.name.clone()));
            s.context = Some(driver.create_context(&s.device.handle, tag)?);
            Ok(())
        })
    }

    /// Allocate the three device buffers: A and B read-only, C write-only.
    pub fn allocate_buffers(&mut self) -> Result<()> {
        let driver = self.driver;
        let len = self.len();
        self.run_stage(Stage::Buffers, |s| {
            let ctx = s.context.as_ref().ok_or_else(|| not_live(Resource::Context))?;
            s.buffer_a = Some(driver.create_buffer(ctx, BufferAccess::ReadOnly, len)?);
            s.buffer_b = Some(driver.create_buffer(ctx, BufferAccess::ReadOnly, len)?);
            s.buffer_c = Some(driver.create_buffer(ctx, BufferAccess::WriteOnly, len)?);
            Ok(())
        })
    }

    /// Compile the kernel program for this session's context.
    pub fn build_program(&mut self, source: &str, options: &str) -> Result<()> {
        let driver = self.driver;
        self.run_stage(Stage::ProgramBuilt, |s| {
            let ctx = s.context.as_ref().ok_or_else(|| not_live(Resource::Context))?;
            s.program = Some(driver.build_program(ctx, source, options)?);
            Ok(())
        })
    }

    /// Create the kernel and bind `(A, B, C, length)` as its arguments.
    pub fn bind_kernel(&mut self, entry: &str) -> Result<()> {
        let driver = self.driver;
        let count = u32::try_from(self.len())
            .map_err(|_| ClvecError::config("vector length does not fit the kernel count argument"))?;
        self.run_stage(Stage::KernelBound, |s| {
            let program = s.program.as_ref().ok_or_else(|| not_live(Resource::Program))?;
            let kernel = s.kernel.insert(driver.create_kernel(program, entry)?);
            let a = s.buffer_a.as_ref().ok_or_else(|| not_live(Resource::BufferA))?;
            let b = s.buffer_b.as_ref().ok_or_else(|| not_live(Resource::BufferB))?;
            let c = s.buffer_c.as_ref().ok_or_else(|| not_live(Resource::BufferC))?;
            driver.set_buffer_arg(kernel, ARG_A, a)?;
            driver.set_buffer_arg(kernel, ARG_B, b)?;
            driver.set_buffer_arg(kernel, ARG_C, c)?;
            driver.set_scalar_arg(kernel, ARG_COUNT, count)?;
            Ok(())
        })
    }

    /// Create the in-order command queue.
    pub fn create_queue(&mut self, profiling: bool) -> Result<()> {
        let driver = self.driver;
        self.run_stage(Stage::QueueReady, |s| {
            let ctx = s.context.as_ref().ok_or_else(|| not_live(Resource::Context))?;
            s.queue = Some(driver.create_queue(ctx, &s.device.handle, profiling)?);
            s.profiling = profiling;
            Ok(())
        })
    }

    /// Submit both input uploads without waiting for them.
    ///
    /// The queue executes commands in submission order, so the kernel
    /// enqueued next starts only after both transfers have landed.
    pub fn upload(&mut self) -> Result<()> {
        let driver = self.driver;
        self.run_stage(Stage::Uploaded, |s| {
            let queue = s.queue.as_ref().ok_or_else(|| not_live(Resource::Queue))?;
            let a = s.buffer_a.as_mut().ok_or_else(|| not_live(Resource::BufferA))?;
            // SAFETY: host_a and host_b are never written after construction
            // and outlive every device handle: teardown finishes the queue
            // before any handle or host vector is dropped.
            unsafe { driver.enqueue_write(queue, a, &s.host_a)? };
            let b = s.buffer_b.as_mut().ok_or_else(|| not_live(Resource::BufferB))?;
            // SAFETY: as above.
            unsafe { driver.enqueue_write(queue, b, &s.host_b)? };
            Ok(())
        })
    }

    /// Enqueue the one-dimensional kernel launch and keep its event.
    pub fn launch(&mut self) -> Result<()> {
        let driver = self.driver;
        let global = self.len();
        self.run_stage(Stage::Launched, |s| {
            let queue = s.queue.as_ref().ok_or_else(|| not_live(Resource::Queue))?;
            let kernel = s.kernel.as_ref().ok_or_else(|| not_live(Resource::Kernel))?;
            s.event = Some(driver.enqueue_kernel(queue, kernel, global)?);
            Ok(())
        })
    }

    /// Read the output buffer back, blocking until the copy completes.
    pub fn download(&mut self) -> Result<()> {
        let driver = self.driver;
        self.run_stage(Stage::Downloaded, |s| {
            let queue = s.queue.as_ref().ok_or_else(|| not_live(Resource::Queue))?;
            let c = s.buffer_c.as_ref().ok_or_else(|| not_live(Resource::BufferC))?;
            driver.read_buffer(queue, c, &mut s.host_c)
        })
    }

    /// Wait for the kernel event and read its profiling timestamps.
    ///
    /// A failing wait ends the session; missing profiling data only makes
    /// the timing [`DeviceTiming::Unavailable`].
    pub fn read_timing(&mut self) -> Result<DeviceTiming> {
        let driver = self.driver;
        self.run_stage(Stage::Timed, |s| {
            let event = s.event.as_ref().ok_or_else(|| not_live(Resource::Event))?;
            driver.wait(event)?;

            let timing = if !s.profiling {
                DeviceTiming::Unavailable
            } else {
                match driver.profiling_span(event) {
                    Ok((start, end)) if end >= start => {
                        DeviceTiming::Elapsed { seconds: (end - start) as f64 * 1e-9 }
                    }
                    Ok((start, end)) => {
                        warn!(device = %s.device.id, start, end, "profiling end precedes start");
                        DeviceTiming::Unavailable
                    }
                    Err(e) => {
                        debug!(device = %s.device.id, error = %e, "profiling data unavailable");
                        DeviceTiming::Unavailable
                    }
                }
            };
            s.timing = Some(timing);
            Ok(timing)
        })
    }

    /// Mark the job complete.
    pub fn finish(&mut self) -> Result<()> {
        self.run_stage(Stage::Done, |_| Ok(()))?;
        info!(device = %self.device.id, name = %self.device.name, "session complete");
        Ok(())
    }

    // ── Teardown ─────────────────────────────────────────────────────────────

    /// Release every live handle, newest first. Idempotent.
    ///
    /// The queue is drained before anything is released, since pending
    /// uploads may still read from this session's host vectors.
    pub fn teardown(&mut self) -> &[Resource] {
        if self.stage == Stage::Teardown {
            return &self.released;
        }
        let id = self.device.id;

        if let Some(queue) = self.queue.as_ref() {
            if let Err(e) = self.driver.finish(queue) {
                warn!(device = %id, error = %e, "failed to drain queue before teardown");
            }
        }

        let released = &mut self.released;
        release(&mut self.event, Resource::Event, released, id);
        release(&mut self.queue, Resource::Queue, released, id);
        release(&mut self.kernel, Resource::Kernel, released, id);
        release(&mut self.program, Resource::Program, released, id);
        release(&mut self.buffer_c, Resource::BufferC, released, id);
        release(&mut self.buffer_b, Resource::BufferB, released, id);
        release(&mut self.buffer_a, Resource::BufferA, released, id);
        release(&mut self.context, Resource::Context, released, id);

        self.stage = Stage::Teardown;
        &self.released
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn run_stage<T>(
        &mut self,
        stage: Stage,
        f: impl FnOnce(&mut Self) -> DriverResult<T>,
    ) -> Result<T> {
        if self.stage == Stage::Teardown || stage.predecessor() != Some(self.stage) {
            return Err(ClvecError::OutOfOrder { requested: stage, current: self.stage });
        }
        match f(self) {
            Ok(value) => {
                self.stage = stage;
                self.reached = stage;
                debug!(device = %self.device.id, %stage, "stage complete");
                Ok(value)
            }
            Err(source) => {
                warn!(
                    device = %self.device.id,
                    %stage,
                    operation = %source.operation,
                    code = source.code,
                    "stage failed: {}",
                    source.message
                );
                self.failed_at = Some(stage);
                self.teardown();
                Err(ClvecError::Stage { stage, device: self.device.id, source })
            }
        }
    }
}

fn release<T>(slot: &mut Option<T>, resource: Resource, released: &mut Vec<Resource>, id: DeviceId) {
    if let Some(handle) = slot.take() {
        drop(handle);
        debug!(device = %id, %resource, "released");
        released.push(resource);
    }
}

impl<D: ComputeDriver> Drop for ExecutionSession<'_, D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{VECTOR_ADD_ENTRY, VECTOR_ADD_SRC};
    use clvec_common::mock::{MockDevice, MockDriver, MockOp, MockPlatform};
    use clvec_device_probe::DeviceDirectory;

    fn driver_with(device: MockDevice) -> MockDriver {
        MockDriver::new(vec![MockPlatform::new("Mock").with_device(device)])
    }

    fn run_all(s: &mut ExecutionSession<'_, MockDriver>) -> Result<DeviceTiming> {
        s.create_context(true)?;
        s.allocate_buffers()?;
        s.build_program(VECTOR_ADD_SRC, "")?;
        s.bind_kernel(VECTOR_ADD_ENTRY)?;
        s.create_queue(true)?;
        s.upload()?;
        s.launch()?;
        s.download()?;
        let timing = s.read_timing()?;
        s.finish()?;
        Ok(timing)
    }

    #[test]
    fn full_run_adds_and_times() {
        let driver = driver_with(MockDevice::gpu("gpu0")).with_profiling_span(500, 2_500);
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let device = dir.iter().next().unwrap();
        let inputs = HostInputs::from_vecs(vec![1.0, 2.0], vec![3.0, 4.0]);

        let mut session = ExecutionSession::new(&driver, device, &inputs);
        let timing = run_all(&mut session).unwrap();

        assert_eq!(session.output(), [4.0, 6.0]);
        assert_eq!(session.stage(), Stage::Done);
        let secs = timing.seconds().unwrap();
        assert!((secs - 2.0e-6).abs() < 1e-12, "elapsed {secs}");
    }

    #[test]
    fn teardown_after_success_releases_everything_in_reverse() {
        let driver = driver_with(MockDevice::gpu("gpu0"));
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let inputs = HostInputs::generate(8, 1);
        let mut session = ExecutionSession::new(&driver, dir.iter().next().unwrap(), &inputs);
        run_all(&mut session).unwrap();

        let released = session.teardown().to_vec();
        assert_eq!(
            released,
            [
                Resource::Event,
                Resource::Queue,
                Resource::Kernel,
                Resource::Program,
                Resource::BufferC,
                Resource::BufferB,
                Resource::BufferA,
                Resource::Context,
            ]
        );
        assert_eq!(
            driver.journal().released("gpu0"),
            ["event", "queue", "kernel", "program", "buffer2", "buffer1", "buffer0", "context"]
        );
        assert!(session.live_resources().is_empty());
    }

    #[test]
    fn teardown_is_idempotent_and_runs_on_drop() {
        let driver = driver_with(MockDevice::gpu("gpu0"));
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let inputs = HostInputs::generate(4, 1);
        {
            let mut session = ExecutionSession::new(&driver, dir.iter().next().unwrap(), &inputs);
            session.create_context(false).unwrap();
            session.allocate_buffers().unwrap();
            assert_eq!(session.teardown().len(), 4);
            assert_eq!(session.teardown().len(), 4);
        }
        {
            let mut session = ExecutionSession::new(&driver, dir.iter().next().unwrap(), &inputs);
            session.create_context(false).unwrap();
        }
        // First session: 3 buffers + context; second: context released by drop.
        assert_eq!(driver.journal().released("gpu0").len(), 5);
    }

    #[test]
    fn second_buffer_failure_releases_first_buffer_and_context() {
        let driver = driver_with(MockDevice::gpu("gpu0").failing(MockOp::CreateBuffer(1)));
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let inputs = HostInputs::generate(4, 1);
        let mut session = ExecutionSession::new(&driver, dir.iter().next().unwrap(), &inputs);

        session.create_context(false).unwrap();
        let err = session.allocate_buffers().unwrap_err();

        assert_eq!(err.failed_stage(), Some(Stage::Buffers));
        assert_eq!(session.failed_at(), Some(Stage::Buffers));
        assert_eq!(session.reached(), Stage::Context);
        assert_eq!(session.stage(), Stage::Teardown);
        assert_eq!(session.released(), [Resource::BufferA, Resource::Context]);
        assert_eq!(driver.journal().released("gpu0"), ["buffer0", "context"]);
    }

    #[test]
    fn upload_failure_drains_queue_before_release() {
        let driver = driver_with(MockDevice::gpu("gpu0").failing(MockOp::Write(1)));
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let inputs = HostInputs::generate(4, 1);
        let mut session = ExecutionSession::new(&driver, dir.iter().next().unwrap(), &inputs);

        let err = run_all(&mut session).unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::Uploaded));

        let entries = driver.journal().entries();
        let finish_at = entries
            .iter()
            .position(|e| e.action == clvec_common::mock::JournalAction::Finish)
            .expect("queue drained");
        let first_release = entries
            .iter()
            .position(|e| e.action == clvec_common::mock::JournalAction::Release)
            .unwrap();
        assert!(finish_at < first_release);
    }

    #[test]
    fn out_of_order_stage_is_rejected_without_teardown() {
        let driver = driver_with(MockDevice::gpu("gpu0"));
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let inputs = HostInputs::generate(4, 1);
        let mut session = ExecutionSession::new(&driver, dir.iter().next().unwrap(), &inputs);

        let err = session.allocate_buffers().unwrap_err();
        assert!(matches!(
            err,
            ClvecError::OutOfOrder { requested: Stage::Buffers, current: Stage::Empty }
        ));
        assert_eq!(session.stage(), Stage::Empty);
        session.create_context(false).unwrap();
    }

    #[test]
    fn no_stage_after_teardown() {
        let driver = driver_with(MockDevice::gpu("gpu0").failing(MockOp::CreateContext));
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let inputs = HostInputs::generate(4, 1);
        let mut session = ExecutionSession::new(&driver, dir.iter().next().unwrap(), &inputs);

        assert!(session.create_context(false).is_err());
        assert!(session.released().is_empty());
        let err = session.create_context(false).unwrap_err();
        assert!(matches!(err, ClvecError::OutOfOrder { current: Stage::Teardown, .. }));
    }

    #[test]
    fn wait_failure_is_fatal_but_profiling_failure_is_not() {
        let inputs = HostInputs::generate(4, 1);

        let driver = driver_with(MockDevice::gpu("gpu0").failing(MockOp::Wait));
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let mut session = ExecutionSession::new(&driver, dir.iter().next().unwrap(), &inputs);
        assert_eq!(run_all(&mut session).unwrap_err().failed_stage(), Some(Stage::Timed));

        let driver = driver_with(MockDevice::gpu("gpu1").failing(MockOp::Profiling));
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let mut session = ExecutionSession::new(&driver, dir.iter().next().unwrap(), &inputs);
        assert_eq!(run_all(&mut session).unwrap(), DeviceTiming::Unavailable);
        assert_eq!(session.stage(), Stage::Done);
    }

    #[test]
    fn context_carries_notification_tag() {
        let driver = driver_with(MockDevice::gpu("gpu0"));
        let dir = DeviceDirectory::enumerate(&driver).unwrap();
        let inputs = HostInputs::generate(4, 1);
        let mut session = ExecutionSession::new(&driver, dir.iter().next().unwrap(), &inputs);
        session.create_context(true).unwrap();
        let tag = session.context.as_ref().unwrap().notify.clone().unwrap();
        assert_eq!(tag.id, DeviceId::new(0, 0));
        assert_eq!(tag.name, "gpu0");
    }
}
