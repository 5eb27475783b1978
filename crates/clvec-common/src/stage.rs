//! Session lifecycle stages and the resources acquired along the way.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an execution session.
///
/// The forward order is fixed; every stage is entered only if the previous
/// one succeeded. Any failure moves the session to [`Stage::Teardown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Empty,
    Context,
    Buffers,
    ProgramBuilt,
    KernelBound,
    QueueReady,
    Uploaded,
    Launched,
    Downloaded,
    Timed,
    Done,
    Teardown,
}

impl Stage {
    /// All forward stages, in order.
    pub const FORWARD: [Stage; 11] = [
        Stage::Empty,
        Stage::Context,
        Stage::Buffers,
        Stage::ProgramBuilt,
        Stage::KernelBound,
        Stage::QueueReady,
        Stage::Uploaded,
        Stage::Launched,
        Stage::Downloaded,
        Stage::Timed,
        Stage::Done,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Empty => "EMPTY",
            Stage::Context => "CONTEXT",
            Stage::Buffers => "BUFFERS",
            Stage::ProgramBuilt => "PROGRAM_BUILT",
            Stage::KernelBound => "KERNEL_BOUND",
            Stage::QueueReady => "QUEUE_READY",
            Stage::Uploaded => "UPLOADED",
            Stage::Launched => "LAUNCHED",
            Stage::Downloaded => "DOWNLOADED",
            Stage::Timed => "TIMED",
            Stage::Done => "DONE",
            Stage::Teardown => "TEARDOWN",
        }
    }

    /// The stage that must have completed before this one may start.
    pub const fn predecessor(self) -> Option<Stage> {
        match self {
            Stage::Empty | Stage::Teardown => None,
            Stage::Context => Some(Stage::Empty),
            Stage::Buffers => Some(Stage::Context),
            Stage::ProgramBuilt => Some(Stage::Buffers),
            Stage::KernelBound => Some(Stage::ProgramBuilt),
            Stage::QueueReady => Some(Stage::KernelBound),
            Stage::Uploaded => Some(Stage::QueueReady),
            Stage::Launched => Some(Stage::Uploaded),
            Stage::Downloaded => Some(Stage::Launched),
            Stage::Timed => Some(Stage::Downloaded),
            Stage::Done => Some(Stage::Timed),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device-side handle owned by a session.
///
/// Variants are declared in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Context,
    BufferA,
    BufferB,
    BufferC,
    Program,
    Kernel,
    Queue,
    Event,
}

impl Resource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Resource::Context => "context",
            Resource::BufferA => "buffer_a",
            Resource::BufferB => "buffer_b",
            Resource::BufferC => "buffer_c",
            Resource::Program => "program",
            Resource::Kernel => "kernel",
            Resource::Queue => "queue",
            Resource::Event => "event",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
