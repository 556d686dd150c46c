// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
In-process simulated devices.

Memory, mapping and buffer-to-buffer copies behave as on hardware.  Shader code is
validated for its magic word but never executed; dispatches, barriers and fence waits
are recorded in a trace instead, which is what tests observe.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{Command, MemoryRequirements};
use crate::device::{
    AccessFlags, BufferUsage, DeviceDescriptor, DeviceKind, FeatureFlags, InstanceConfig,
    MemoryFlags, MemoryHeap, MemoryType, QueueFamily, QueueFlags,
};
use crate::shader::ShaderModule;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

static NEXT_OBJECT: AtomicU64 = AtomicU64::new(1);

fn next_object() -> u64 {
    NEXT_OBJECT.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no device at index {0}")]
    NoSuchDevice(usize),
    #[error("queue family {0} was not requested when the device was created")]
    NoSuchQueue(u32),
    #[error("device lacks features {0:?}")]
    MissingFeatures(FeatureFlags),
    #[error("no memory type {0}")]
    NoSuchMemoryType(usize),
    #[error("heap {heap} has {available} bytes left, {requested} requested")]
    OutOfMemory {
        heap: usize,
        available: u64,
        requested: u64,
    },
    #[error("module does not start with the magic word")]
    InvalidModule,
    #[error("buffer is not bound to memory")]
    Unbound,
    #[error("range {offset}+{len} exceeds size {size}")]
    OutOfRange { offset: u64, len: u64, size: u64 },
    #[error("memory type is not host visible")]
    NotHostVisible,
    #[error("allocation is not mapped")]
    NotMapped,
    #[error("binding {binding} is outside a layout of {count}")]
    NoSuchBinding { binding: u32, count: u32 },
    #[error("simulated failure creating {0}")]
    Injected(&'static str),
    #[error("the lane's last submission has not been waited for")]
    LaneBusy,
}

fn check_range(offset: u64, len: u64, size: u64) -> Result<(), Error> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::OutOfRange { offset, len, size }),
    }
}

/// A resource kind whose creation a [SimulatedDevice] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Buffer,
    Allocation,
    Program,
    DescriptorSets,
    Lane,
}

impl FailurePoint {
    fn name(self) -> &'static str {
        match self {
            FailurePoint::Buffer => "buffer",
            FailurePoint::Allocation => "allocation",
            FailurePoint::Program => "program",
            FailurePoint::DescriptorSets => "descriptor sets",
            FailurePoint::Lane => "lane",
        }
    }
}

/// A device the soft backend pretends to have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedDevice {
    pub descriptor: DeviceDescriptor,
    /// Bounded waits that come back unsignaled before each fence signals.
    pub fence_latency: u32,
    pub buffer_alignment: u64,
    pub fail_on: Option<FailurePoint>,
}

impl SimulatedDevice {
    pub fn from_descriptor(descriptor: DeviceDescriptor) -> Self {
        SimulatedDevice {
            descriptor,
            fence_latency: 0,
            buffer_alignment: 256,
            fail_on: None,
        }
    }

    /// A discrete card: dedicated compute and transfer families, separate host heap.
    pub fn discrete() -> Self {
        let local = MemoryFlags::DEVICE_LOCAL;
        let host = MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT;
        Self::from_descriptor(DeviceDescriptor {
            name: "soft discrete".to_string(),
            kind: DeviceKind::DiscreteGpu,
            features: FeatureFlags::SHADER_INT64 | FeatureFlags::SHADER_FLOAT64,
            queue_families: vec![
                QueueFamily {
                    flags: QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER,
                    count: 16,
                },
                QueueFamily {
                    flags: QueueFlags::COMPUTE | QueueFlags::TRANSFER,
                    count: 8,
                },
                QueueFamily {
                    flags: QueueFlags::TRANSFER,
                    count: 2,
                },
            ],
            memory_types: vec![
                MemoryType {
                    flags: local,
                    heap: 0,
                },
                MemoryType {
                    flags: host,
                    heap: 1,
                },
                MemoryType {
                    flags: host | MemoryFlags::HOST_CACHED,
                    heap: 1,
                },
                MemoryType {
                    flags: local | host,
                    heap: 2,
                },
            ],
            memory_heaps: vec![
                MemoryHeap {
                    size: 8 << 30,
                    device_local: true,
                },
                MemoryHeap {
                    size: 16 << 30,
                    device_local: false,
                },
                MemoryHeap {
                    size: 256 << 20,
                    device_local: true,
                },
            ],
        })
    }

    /// Unified memory, one family that does everything.
    pub fn integrated() -> Self {
        let shared = MemoryFlags::DEVICE_LOCAL | MemoryFlags::HOST_VISIBLE;
        Self::from_descriptor(DeviceDescriptor {
            name: "soft integrated".to_string(),
            kind: DeviceKind::IntegratedGpu,
            features: FeatureFlags::SHADER_INT64 | FeatureFlags::SHADER_FLOAT64,
            queue_families: vec![QueueFamily {
                flags: QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER,
                count: 1,
            }],
            memory_types: vec![
                MemoryType {
                    flags: shared | MemoryFlags::HOST_COHERENT,
                    heap: 0,
                },
                MemoryType {
                    flags: shared | MemoryFlags::HOST_CACHED,
                    heap: 0,
                },
            ],
            memory_heaps: vec![MemoryHeap {
                size: 4 << 30,
                device_local: true,
            }],
        })
    }

    pub fn with_fence_latency(mut self, waits: u32) -> Self {
        self.fence_latency = waits;
        self
    }

    pub fn with_failure(mut self, point: FailurePoint) -> Self {
        self.fail_on = Some(point);
        self
    }

    fn fail(&self, point: FailurePoint) -> Result<(), Error> {
        if self.fail_on == Some(point) {
            return Err(Error::Injected(point.name()));
        }
        Ok(())
    }
}

/// A recorded command, with objects named by their trace ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceCommand {
    Barrier {
        src: AccessFlags,
        dst: AccessFlags,
        buffers: Vec<u64>,
    },
    BindPipeline {
        program: u64,
    },
    BindDescriptorSet {
        program: u64,
        set: u64,
    },
    Dispatch([u32; 3]),
    Copy {
        src: u64,
        src_offset: u64,
        dst: u64,
        dst_offset: u64,
        size: u64,
    },
}

/// Something a simulated device was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    DeviceCreated { device: usize, families: Vec<u32> },
    Allocated { memory_type: usize, size: u64 },
    DescriptorUpdate { set: u64, binding: u32, buffer: u64 },
    Submit { family: u32, commands: Vec<TraceCommand> },
    Wait { family: u32, signaled: bool },
}

type Trace = Arc<Mutex<Vec<TraceEvent>>>;

#[derive(Debug)]
pub struct Instance {
    devices: Vec<SimulatedDevice>,
    descriptors: Vec<DeviceDescriptor>,
    trace: Trace,
}

impl Instance {
    pub fn new(config: &InstanceConfig) -> Result<Self, Error> {
        if config.validation {
            logwise::debuginternal_sync!("validation requested; simulated devices do not validate");
        }
        Ok(Self::simulated(vec![SimulatedDevice::discrete()]))
    }

    pub fn simulated(devices: Vec<SimulatedDevice>) -> Self {
        let descriptors = devices.iter().map(|d| d.descriptor.clone()).collect();
        Instance {
            devices,
            descriptors,
            trace: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.descriptors
    }

    pub fn trace(&self) -> Vec<TraceEvent> {
        lock(&self.trace).clone()
    }

    pub fn create_device(
        &self,
        index: usize,
        features: FeatureFlags,
        families: &[u32],
    ) -> Result<Device, Error> {
        let sim = self.devices.get(index).ok_or(Error::NoSuchDevice(index))?;
        let missing = features & !sim.descriptor.features;
        if !missing.is_empty() {
            return Err(Error::MissingFeatures(missing));
        }
        for family in families {
            if *family as usize >= sim.descriptor.queue_families.len() {
                return Err(Error::NoSuchQueue(*family));
            }
        }
        lock(&self.trace).push(TraceEvent::DeviceCreated {
            device: index,
            families: families.to_vec(),
        });
        Ok(Device {
            shared: Arc::new(DeviceShared {
                sim: sim.clone(),
                families: families.to_vec(),
                heap_used: Mutex::new(vec![0; sim.descriptor.memory_heaps.len()]),
                trace: self.trace.clone(),
            }),
        })
    }
}

#[derive(Debug)]
struct DeviceShared {
    sim: SimulatedDevice,
    families: Vec<u32>,
    heap_used: Mutex<Vec<u64>>,
    trace: Trace,
}

impl DeviceShared {
    fn record(&self, event: TraceEvent) {
        lock(&self.trace).push(event);
    }
}

#[derive(Debug)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

#[derive(Debug)]
pub struct Queue {
    family: u32,
    device: Arc<DeviceShared>,
}

#[derive(Debug)]
struct Memory {
    bytes: Mutex<Box<[u8]>>,
}

#[derive(Debug)]
pub struct Buffer {
    id: u64,
    size: u64,
    usage: BufferUsage,
    binding: Option<(Arc<Memory>, u64)>,
}

impl Buffer {
    pub fn trace_id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    fn bound(&self) -> Result<(&Arc<Memory>, u64), Error> {
        self.binding
            .as_ref()
            .map(|(memory, offset)| (memory, *offset))
            .ok_or(Error::Unbound)
    }
}

#[derive(Debug)]
pub struct Allocation {
    memory: Arc<Memory>,
    memory_type: usize,
    heap: usize,
    flags: MemoryFlags,
    size: u64,
    mapped: bool,
    device: Arc<DeviceShared>,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Some(used) = lock(&self.device.heap_used).get_mut(self.heap) {
            *used = used.saturating_sub(self.size);
        }
    }
}

impl Allocation {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn memory_type(&self) -> usize {
        self.memory_type
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn map(&mut self) -> Result<(), Error> {
        if !self.flags.contains(MemoryFlags::HOST_VISIBLE) {
            return Err(Error::NotHostVisible);
        }
        self.mapped = true;
        Ok(())
    }

    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), Error> {
        if !self.mapped {
            return Err(Error::NotMapped);
        }
        check_range(offset, data.len() as u64, self.size)?;
        let start = offset as usize;
        lock(&self.memory.bytes)[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn read(&self, offset: u64, out: &mut [u8]) -> Result<(), Error> {
        if !self.mapped {
            return Err(Error::NotMapped);
        }
        check_range(offset, out.len() as u64, self.size)?;
        let start = offset as usize;
        out.copy_from_slice(&lock(&self.memory.bytes)[start..start + out.len()]);
        Ok(())
    }

    /// Simulated memory is always coherent.
    pub fn flush(&self) -> Result<(), Error> {
        Ok(())
    }

    pub fn invalidate(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct Program {
    id: u64,
    bindings: u32,
}

impl Program {
    pub fn trace_id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
pub struct DescriptorSet {
    id: u64,
    bindings: Vec<Option<u64>>,
}

impl DescriptorSet {
    pub fn trace_id(&self) -> u64 {
        self.id
    }
}

/// A queue with its own command buffer and fence.
#[derive(Debug)]
pub struct Lane {
    family: u32,
    pending_waits: u32,
    device: Arc<DeviceShared>,
}

impl Device {
    pub fn queue(&self, family: u32) -> Result<Queue, Error> {
        if !self.shared.families.contains(&family) {
            return Err(Error::NoSuchQueue(family));
        }
        Ok(Queue {
            family,
            device: self.shared.clone(),
        })
    }

    pub fn create_buffer(&self, size: u64, usage: BufferUsage) -> Result<Buffer, Error> {
        self.shared.sim.fail(FailurePoint::Buffer)?;
        Ok(Buffer {
            id: next_object(),
            size,
            usage,
            binding: None,
        })
    }

    pub fn memory_requirements(&self, buffer: &Buffer) -> MemoryRequirements {
        let types = self.shared.sim.descriptor.memory_types.len().min(32);
        let type_bits = if types == 32 {
            u32::MAX
        } else {
            (1u32 << types) - 1
        };
        //storage buffers want the full alignment, transfer-only ones do not
        let alignment = if buffer.usage.contains(BufferUsage::STORAGE_BUFFER) {
            self.shared.sim.buffer_alignment
        } else {
            4
        };
        MemoryRequirements {
            size: buffer.size,
            alignment,
            type_bits,
        }
    }

    pub fn allocate(&self, memory_type: usize, size: u64) -> Result<Allocation, Error> {
        self.shared.sim.fail(FailurePoint::Allocation)?;
        let descriptor = &self.shared.sim.descriptor;
        let ty = descriptor
            .memory_types
            .get(memory_type)
            .ok_or(Error::NoSuchMemoryType(memory_type))?;
        let capacity = descriptor
            .memory_heaps
            .get(ty.heap)
            .map(|h| h.size)
            .unwrap_or(0);
        {
            let mut used = lock(&self.shared.heap_used);
            let current = used.get(ty.heap).copied().unwrap_or(0);
            let available = capacity.saturating_sub(current);
            if size > available {
                return Err(Error::OutOfMemory {
                    heap: ty.heap,
                    available,
                    requested: size,
                });
            }
            if let Some(u) = used.get_mut(ty.heap) {
                *u += size;
            }
        }
        self.shared.record(TraceEvent::Allocated { memory_type, size });
        Ok(Allocation {
            memory: Arc::new(Memory {
                bytes: Mutex::new(vec![0; size as usize].into_boxed_slice()),
            }),
            memory_type,
            heap: ty.heap,
            flags: ty.flags,
            size,
            mapped: false,
            device: self.shared.clone(),
        })
    }

    pub fn bind(&self, buffer: &mut Buffer, allocation: &Allocation, offset: u64) -> Result<(), Error> {
        check_range(offset, buffer.size, allocation.size)?;
        buffer.binding = Some((allocation.memory.clone(), offset));
        Ok(())
    }

    pub fn create_program(&self, module: &ShaderModule) -> Result<Program, Error> {
        self.shared.sim.fail(FailurePoint::Program)?;
        if !module.has_magic() {
            return Err(Error::InvalidModule);
        }
        Ok(Program {
            id: next_object(),
            bindings: module.binding_count() as u32,
        })
    }

    pub fn allocate_descriptor_sets(
        &self,
        program: &Program,
        count: usize,
    ) -> Result<Vec<DescriptorSet>, Error> {
        self.shared.sim.fail(FailurePoint::DescriptorSets)?;
        Ok((0..count)
            .map(|_| DescriptorSet {
                id: next_object(),
                bindings: vec![None; program.bindings as usize],
            })
            .collect())
    }

    pub fn update_descriptor(
        &self,
        set: &mut DescriptorSet,
        binding: u32,
        buffer: &Buffer,
    ) -> Result<(), Error> {
        let count = set.bindings.len() as u32;
        let slot = set
            .bindings
            .get_mut(binding as usize)
            .ok_or(Error::NoSuchBinding { binding, count })?;
        *slot = Some(buffer.id);
        self.shared.record(TraceEvent::DescriptorUpdate {
            set: set.id,
            binding,
            buffer: buffer.id,
        });
        Ok(())
    }

    pub fn create_lane(&self, queue: &Queue) -> Result<Lane, Error> {
        self.shared.sim.fail(FailurePoint::Lane)?;
        Ok(Lane {
            family: queue.family,
            pending_waits: 0,
            device: queue.device.clone(),
        })
    }
}

fn copy(src: &Buffer, src_offset: u64, dst: &Buffer, dst_offset: u64, size: u64) -> Result<(), Error> {
    check_range(src_offset, size, src.size)?;
    check_range(dst_offset, size, dst.size)?;
    let (src_memory, src_base) = src.bound()?;
    let (dst_memory, dst_base) = dst.bound()?;
    let from = (src_base + src_offset) as usize;
    let to = (dst_base + dst_offset) as usize;
    let len = size as usize;
    if Arc::ptr_eq(src_memory, dst_memory) {
        lock(&src_memory.bytes).copy_within(from..from + len, to);
    } else {
        let source = lock(&src_memory.bytes);
        let mut destination = lock(&dst_memory.bytes);
        destination[to..to + len].copy_from_slice(&source[from..from + len]);
    }
    Ok(())
}

impl Lane {
    /// Records and submits `commands`, resetting the fence first.  Copies take effect immediately.
    pub fn submit(&mut self, commands: &[Command<'_>]) -> Result<(), Error> {
        if self.pending_waits > 0 {
            return Err(Error::LaneBusy);
        }
        let mut recorded = Vec::with_capacity(commands.len());
        for command in commands {
            recorded.push(match command {
                Command::Barrier { src, dst, buffers } => TraceCommand::Barrier {
                    src: *src,
                    dst: *dst,
                    buffers: buffers.iter().map(|b| b.id).collect(),
                },
                Command::BindPipeline(program) => TraceCommand::BindPipeline {
                    program: program.id,
                },
                Command::BindDescriptorSet(program, set) => TraceCommand::BindDescriptorSet {
                    program: program.id,
                    set: set.id,
                },
                Command::Dispatch(groups) => TraceCommand::Dispatch(*groups),
                Command::CopyBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => {
                    copy(src, *src_offset, dst, *dst_offset, *size)?;
                    TraceCommand::Copy {
                        src: src.id,
                        src_offset: *src_offset,
                        dst: dst.id,
                        dst_offset: *dst_offset,
                        size: *size,
                    }
                }
            });
        }
        self.device.record(TraceEvent::Submit {
            family: self.family,
            commands: recorded,
        });
        self.pending_waits = self.device.sim.fence_latency;
        Ok(())
    }

    /// Waits up to `timeout` for the last submission.  Returns whether it completed.
    pub fn wait(&mut self, _timeout: Duration) -> Result<bool, Error> {
        let signaled = self.pending_waits == 0;
        if !signaled {
            self.pending_waits -= 1;
        }
        self.device.record(TraceEvent::Wait {
            family: self.family,
            signaled,
        });
        Ok(signaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_move_bytes() {
        let instance = Instance::simulated(vec![SimulatedDevice::integrated()]);
        let device = instance.create_device(0, FeatureFlags::SHADER_INT64, &[0]).unwrap();
        let usage = BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST;
        let mut a = device.create_buffer(8, usage).unwrap();
        let mut b = device.create_buffer(8, usage).unwrap();
        let mut memory = device.allocate(0, 64).unwrap();
        device.bind(&mut a, &memory, 0).unwrap();
        device.bind(&mut b, &memory, 32).unwrap();
        memory.map().unwrap();
        memory.write(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let queue = device.queue(0).unwrap();
        let mut lane = device.create_lane(&queue).unwrap();
        lane.submit(&[Command::CopyBuffer {
            src: &a,
            src_offset: 2,
            dst: &b,
            dst_offset: 0,
            size: 4,
        }])
        .unwrap();
        assert!(lane.wait(Duration::from_millis(1)).unwrap());
        let mut out = [0u8; 4];
        memory.read(32, &mut out).unwrap();
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn heaps_are_bounded_and_released() {
        let mut sim = SimulatedDevice::integrated();
        sim.descriptor.memory_heaps[0].size = 100;
        let instance = Instance::simulated(vec![sim]);
        let device = instance.create_device(0, FeatureFlags::empty(), &[0]).unwrap();
        let first = device.allocate(0, 60).unwrap();
        assert!(matches!(
            device.allocate(1, 60),
            Err(Error::OutOfMemory { available: 40, .. })
        ));
        drop(first);
        assert!(device.allocate(1, 60).is_ok());
    }

    #[test]
    fn fence_latency() {
        let instance = Instance::simulated(vec![SimulatedDevice::integrated().with_fence_latency(2)]);
        let device = instance.create_device(0, FeatureFlags::empty(), &[0]).unwrap();
        let queue = device.queue(0).unwrap();
        let mut lane = device.create_lane(&queue).unwrap();
        lane.submit(&[Command::Dispatch([1, 1, 1])]).unwrap();
        let waits: Vec<bool> = (0..3)
            .map(|_| lane.wait(Duration::from_millis(1)).unwrap())
            .collect();
        assert_eq!(waits, vec![false, false, true]);
        assert!(matches!(device.queue(1), Err(Error::NoSuchQueue(1))));
    }

    #[test]
    fn busy_lane_refuses_another_submission() {
        let instance = Instance::simulated(vec![SimulatedDevice::integrated().with_fence_latency(1)]);
        let device = instance.create_device(0, FeatureFlags::empty(), &[0]).unwrap();
        let queue = device.queue(0).unwrap();
        let mut lane = device.create_lane(&queue).unwrap();
        lane.submit(&[Command::Dispatch([1, 1, 1])]).unwrap();
        assert!(matches!(lane.submit(&[Command::Dispatch([1, 1, 1])]), Err(Error::LaneBusy)));
        assert!(!lane.wait(Duration::from_millis(1)).unwrap());
        lane.submit(&[Command::Dispatch([1, 1, 1])]).unwrap();
    }

    #[test]
    fn rejects_modules_without_magic() {
        let instance = Instance::simulated(vec![SimulatedDevice::discrete()]);
        let device = instance.create_device(0, FeatureFlags::empty(), &[0]).unwrap();
        let module = ShaderModule::from_words(vec![0, 0, 0, 0, 0], [1, 1, 1], vec![]);
        assert!(matches!(device.create_program(&module), Err(Error::InvalidModule)));
    }
}
