//! Runs the vector-add job on every enumerated device.
//!
//! The inputs and the CPU reference are produced once per run. Devices are
//! then dispatched one at a time in directory order; a failure on one
//! device is recorded in its [`DeviceReport`] and never stops the next.

use clvec_common::{
    ClvecError, ComputeDriver, DeviceId, DeviceKind, DispatchConfig, Resource, Result, Stage,
};
use clvec_device_probe::{Device, DeviceDirectory};
use serde::Serialize;
use tracing::{info, warn};

use crate::kernels::{VECTOR_ADD_ENTRY, VECTOR_ADD_SRC};
use crate::reference::{HostInputs, ReferenceRun};
use crate::session::{DeviceTiming, ExecutionSession};
use crate::verify::{Verification, verify};

/// Where and why a session stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub operation: String,
    pub code: i32,
    pub message: String,
}

impl StageFailure {
    fn from_error(err: &ClvecError) -> Self {
        match err {
            ClvecError::Stage { stage, source, .. } => Self {
                stage: *stage,
                operation: source.operation.clone(),
                code: source.code,
                message: source.message.clone(),
            },
            other => Self {
                stage: other.failed_stage().unwrap_or(Stage::Empty),
                operation: "session".to_owned(),
                code: 0,
                message: other.to_string(),
            },
        }
    }
}

/// Outcome of one device's session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
    /// Last stage the session completed.
    pub reached: Stage,
    pub failure: Option<StageFailure>,
    pub timing: Option<DeviceTiming>,
    pub verification: Verification,
    /// Handles released at teardown, in release order.
    pub released: Vec<Resource>,
}

impl DeviceReport {
    /// The session completed and its output matched the reference.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.verification.passed()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub vector_length: usize,
    pub seed: u64,
    pub cpu_elapsed_secs: f64,
    pub devices: Vec<DeviceReport>,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.devices.iter().filter(|d| d.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.devices.len() - self.passed()
    }
}

/// Drives one [`ExecutionSession`] per device.
pub struct DispatchPipeline<'d, D: ComputeDriver> {
    driver: &'d D,
    config: DispatchConfig,
}

impl<'d, D: ComputeDriver> DispatchPipeline<'d, D> {
    pub fn new(driver: &'d D, config: DispatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { driver, config })
    }

    /// Generate seeded inputs and run them on every device in `directory`.
    pub fn run(&self, directory: &'d DeviceDirectory<D>) -> RunSummary {
        let inputs = HostInputs::generate(self.config.vector_length, self.config.seed);
        self.run_with_inputs(directory, &inputs)
    }

    /// Run caller-provided inputs on every device in `directory`.
    pub fn run_with_inputs(
        &self,
        directory: &'d DeviceDirectory<D>,
        inputs: &HostInputs,
    ) -> RunSummary {
        let reference = ReferenceRun::compute(inputs);
        info!(
            len = inputs.len(),
            seed = inputs.seed,
            devices = directory.len(),
            cpu_secs = reference.elapsed_secs(),
            "starting dispatch"
        );

        let devices = directory.iter().map(|d| self.dispatch(d, inputs, &reference)).collect();
        let summary = RunSummary {
            vector_length: inputs.len(),
            seed: inputs.seed,
            cpu_elapsed_secs: reference.elapsed_secs(),
            devices,
        };
        info!(passed = summary.passed(), failed = summary.failed(), "dispatch complete");
        summary
    }

    /// Run one device's session to completion or failure, then tear it down.
    pub fn dispatch(
        &self,
        device: &'d Device<D>,
        inputs: &HostInputs,
        reference: &ReferenceRun,
    ) -> DeviceReport {
        let mut session = ExecutionSession::new(self.driver, device, inputs);

        let (failure, timing, verification) = match self.drive(&mut session) {
            Ok(timing) => {
                let v = verify(&inputs.a, &inputs.b, &reference.output, session.output());
                if let Verification::Mismatch { index, expected, actual, .. } = v {
                    warn!(device = %device.id, index, expected, actual, "output mismatch");
                }
                (None, Some(timing), v)
            }
            Err(err) => (Some(StageFailure::from_error(&err)), None, Verification::NotPerformed),
        };
        session.teardown();

        DeviceReport {
            id: device.id,
            name: device.name.clone(),
            kind: device.kind,
            reached: session.reached(),
            failure,
            timing,
            verification,
            released: session.released().to_vec(),
        }
    }

    fn drive(&self, session: &mut ExecutionSession<'d, D>) -> Result<DeviceTiming> {
        session.create_context(self.config.notify)?;
        session.allocate_buffers()?;
        session.build_program(VECTOR_ADD_SRC, &self.config.build_options)?;
        session.bind_kernel(VECTOR_ADD_ENTRY)?;
        session.create_queue(self.config.profiling)?;
        session.upload()?;
        session.launch()?;
        session.download()?;
        let timing = session.read_timing()?;
        session.finish()?;
        Ok(timing)
    }
}
