// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::description::BufferRef;
use crate::device::{BackendError, MatchReport};

/// The driver refused to create something.
#[derive(Debug, thiserror::Error)]
#[error("could not create {what}")]
pub struct ResourceCreationError {
    pub what: &'static str,
    pub source: BackendError,
}

impl ResourceCreationError {
    pub(crate) fn wrap(what: &'static str) -> impl FnOnce(crate::imp::Error) -> Self {
        move |e| ResourceCreationError {
            what,
            source: BackendError(e),
        }
    }
}

fn buffer_name(buffer: &Option<BufferRef>) -> String {
    match buffer {
        Some(b) => b.to_string(),
        None => "the staging buffer".to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PrepareError {
    #[error("no device at index {device}")]
    NoSuchDevice { device: usize },
    #[error("device {device} cannot satisfy the package")]
    DeviceInadequate { device: usize, report: MatchReport },
    #[error("invalid package description: {0}")]
    InvalidDescription(String),
    /// `None` names the staging buffer.
    #[error("no memory type can hold {}", buffer_name(.buffer))]
    NoMemoryType { buffer: Option<BufferRef> },
    #[error(transparent)]
    ResourceCreation(#[from] ResourceCreationError),
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SynchronizationError {
    #[error("{what} failed")]
    Backend {
        what: &'static str,
        source: BackendError,
    },
    #[error("gave up after {attempts} bounded waits")]
    TimedOut { attempts: u32 },
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BufferError {
    #[error("no buffer {0}")]
    NoSuchBuffer(BufferRef),
    #[error("{buffer}: range {offset}+{len} exceeds size {size}")]
    OutOfRange {
        buffer: BufferRef,
        offset: u64,
        len: u64,
        size: u64,
    },
    #[error("{0} is not accessible from the host")]
    NotHostAccessible(BufferRef),
    #[error("a program is running; wait for it first")]
    InFlight,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Synchronization(#[from] SynchronizationError),
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PlanError {
    #[error("step {step} names program {program}, which does not exist")]
    NoSuchProgram { step: usize, program: usize },
    #[error("step {step} binds {found} buffers; the program has {expected} interface slots")]
    BindingCount {
        step: usize,
        expected: usize,
        found: usize,
    },
    #[error("step {step} names {buffer}, which does not exist")]
    NoSuchBuffer { step: usize, buffer: BufferRef },
    #[error("program {program} needs more than its {available} descriptor sets")]
    DescriptorSetsExhausted { program: usize, available: usize },
    #[error("no step {step}")]
    NoSuchStep { step: usize },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RunError {
    #[error("plan was prepared for another package")]
    ForeignPlan,
    #[error("a program is already running; wait for it first")]
    InFlight,
    /// An earlier staged copy could not be waited out.
    #[error(transparent)]
    Transfer(#[from] SynchronizationError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
