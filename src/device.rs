// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Device discovery and capability matching.

An [Instance] lists the physical devices it can see as [DeviceDescriptor]s.  A workload
states what it needs as [ResourceRequirements]; [match_device] grades one device
against them and says which queue family and memory type serves each requirement.

```
use kernels_and_words::device::*;
let mut requirements = ResourceRequirements::new();
let compute = requirements.add_queue_requirement(QueueFlags::COMPUTE, QueueFlags::GRAPHICS);
let device = DeviceDescriptor {
    name: "laptop".to_string(),
    kind: DeviceKind::IntegratedGpu,
    features: FeatureFlags::empty(),
    queue_families: vec![QueueFamily { flags: QueueFlags::GRAPHICS | QueueFlags::COMPUTE, count: 1 }],
    memory_types: vec![],
    memory_heaps: vec![],
};
let report = match_device(&requirements, &device);
assert_eq!(report.queue_family(compute), Some(0));
assert_eq!(report.queues[compute].tier, Tier::Adequate);
```
*/

mod descriptor;
mod flags;
mod matcher;

use std::fmt::Formatter;

pub use descriptor::{DeviceDescriptor, DeviceKind, MemoryHeap, MemoryType, QueueFamily};
pub use flags::{AccessFlags, BufferUsage, FeatureFlags, Flags, MemoryFlags, QueueFlags};
pub use matcher::{
    Assignment, FeatureRequirement, FlagRequirement, MatchReport, MemoryRequirement,
    ResourceRequirements, Tier, assign_memory_type, best_device, match_device,
};

#[cfg(not(feature = "backend_vulkan"))]
pub use crate::imp::{FailurePoint, SimulatedDevice, TraceCommand, TraceEvent};

use crate::imp;

/// Settings for opening an [Instance].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub application_name: String,
    /// Request the standard validation layer.  Ignored with a warning when it is missing.
    pub validation: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        InstanceConfig {
            application_name: env!("CARGO_PKG_NAME").to_string(),
            validation: cfg!(debug_assertions),
        }
    }
}

/// An error reported by the backend.
#[derive(Debug)]
pub struct BackendError(pub(crate) imp::Error);

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}
impl std::error::Error for BackendError {}

impl From<imp::Error> for BackendError {
    fn from(value: imp::Error) -> Self {
        BackendError(value)
    }
}

/**
A connection to the driver, and the list of devices it exposes.

The instance outlives every package prepared from it.
*/
#[derive(Debug)]
pub struct Instance(pub(crate) imp::Instance);

impl Instance {
    pub fn new(config: &InstanceConfig) -> Result<Self, BackendError> {
        let instance = imp::Instance::new(config)?;
        logwise::info_sync!(
            "instance open with {count} devices",
            count = instance.devices().len()
        );
        Ok(Instance(instance))
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        self.0.devices()
    }

    /// An instance over simulated devices.  Only with the software backend.
    #[cfg(not(feature = "backend_vulkan"))]
    pub fn simulated(devices: Vec<imp::SimulatedDevice>) -> Self {
        Instance(imp::Instance::simulated(devices))
    }

    /// Everything the simulated devices were asked to do, in order.
    #[cfg(not(feature = "backend_vulkan"))]
    pub fn trace(&self) -> Vec<imp::TraceEvent> {
        self.0.trace()
    }
}
