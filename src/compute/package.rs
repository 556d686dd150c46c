// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The execution package: one device, its buffers, programs and command lanes.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::description::{BufferRef, ExecutionPackageDescription, Sphere};
use super::error::{BufferError, PrepareError, ResourceCreationError, RunError, SynchronizationError};
use super::layout::{self, Request};
use super::plan::{Barrier, PreparedPlan, PreparedStep, ProgramSlots};
use crate::device::{
    AccessFlags, BackendError, BufferUsage, DeviceDescriptor, FeatureFlags, FlagRequirement,
    Instance, MemoryFlags, QueueFlags, ResourceRequirements, assign_memory_type, match_device,
};
use crate::imp::{self, Command};

static NEXT_PACKAGE: AtomicU64 = AtomicU64::new(1);

const REQUIRED_FEATURES: FeatureFlags = FeatureFlags::from_bits(
    FeatureFlags::SHADER_INT64.bits() | FeatureFlags::SHADER_FLOAT64.bits(),
);

fn host_memory() -> FlagRequirement<MemoryFlags> {
    FlagRequirement::new(
        MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_CACHED,
        MemoryFlags::DEVICE_LOCAL | MemoryFlags::HOST_COHERENT,
        MemoryFlags::HOST_VISIBLE,
        MemoryFlags::empty(),
    )
}

fn device_memory() -> FlagRequirement<MemoryFlags> {
    FlagRequirement::new(
        MemoryFlags::DEVICE_LOCAL,
        MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
        MemoryFlags::empty(),
        MemoryFlags::empty(),
    )
}

/// Memory preference of a buffer.  `None` is the staging buffer.
fn memory_for(buffer: Option<BufferRef>, description: &ExecutionPackageDescription) -> FlagRequirement<MemoryFlags> {
    match buffer.map(|b| b.sphere) {
        None | Some(Sphere::Input) | Some(Sphere::Output) => host_memory(),
        Some(Sphere::Data) | Some(Sphere::Side) if description.device_memory_on_host => host_memory(),
        Some(Sphere::Data) | Some(Sphere::Side) => device_memory(),
    }
}

struct Requirements {
    requirements: ResourceRequirements,
    compute: usize,
    transfer: usize,
}

fn requirements(description: &ExecutionPackageDescription) -> Requirements {
    let mut requirements = ResourceRequirements::new();
    requirements.add_features(REQUIRED_FEATURES, REQUIRED_FEATURES);
    let compute = requirements.add_queue_requirement(
        QueueFlags::COMPUTE,
        QueueFlags::GRAPHICS | QueueFlags::TRANSFER,
    );
    let transfer = requirements.add_queue_requirement(
        QueueFlags::TRANSFER,
        QueueFlags::GRAPHICS | QueueFlags::COMPUTE,
    );
    //declared in allocation order, since the matcher budgets heaps in order
    if description.needs_staging() {
        requirements.add_memory(memory_for(None, description), description.staging);
    }
    for sphere in Sphere::ALL {
        let total = description.total(sphere);
        if total > 0 {
            requirements.add_memory(memory_for(Some(BufferRef::new(sphere, 0)), description), total);
        }
    }
    Requirements {
        requirements,
        compute,
        transfer,
    }
}

/// How the host reaches a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostAccess {
    /// Directly, through a mapping.
    Mapped,
    /// Through the staging buffer, one round trip per chunk.
    Staged,
    Denied,
}

#[derive(Debug)]
struct PackageBuffer {
    buffer: imp::Buffer,
    size: u64,
    allocation: usize,
    offset: u64,
    access: HostAccess,
}

#[derive(Debug)]
struct SetSlot {
    set: imp::DescriptorSet,
    /// Package buffer index currently written to each binding.
    bound: Vec<Option<usize>>,
}

/// Maps a [BufferRef] to its position in the package's buffer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Directory {
    start: [usize; 4],
    len: [usize; 4],
}

impl Directory {
    fn locate(self, buffer: BufferRef) -> Option<usize> {
        let sphere = buffer.sphere.index();
        (buffer.index < self.len[sphere]).then(|| self.start[sphere] + buffer.index)
    }
}

fn barrier_command<'a>(buffers: &'a [PackageBuffer], directory: Directory, barrier: &Barrier) -> Command<'a> {
    Command::Barrier {
        src: barrier.src,
        dst: barrier.dst,
        buffers: barrier
            .buffers
            .iter()
            .filter_map(|b| directory.locate(*b))
            .map(|i| &buffers[i].buffer)
            .collect(),
    }
}

fn wait_lane(
    lane: &mut imp::Lane,
    slice: Duration,
    attempts: u32,
    what: &'static str,
) -> Result<(), SynchronizationError> {
    for attempt in 1..=attempts {
        match lane.wait(slice) {
            Ok(true) => return Ok(()),
            Ok(false) => {
                logwise::warn_sync!(
                    "{what}: not signaled after wait {attempt} of {attempts}",
                    what = what,
                    attempt = attempt,
                    attempts = attempts
                );
            }
            Err(e) => {
                return Err(SynchronizationError::Backend {
                    what,
                    source: BackendError(e),
                });
            }
        }
    }
    Err(SynchronizationError::TimedOut { attempts })
}

/**
Everything one workload needs on one device.

Fields drop top to bottom: lanes, then descriptor sets and programs, then buffers and their
memory, and the device last.
*/
#[derive(Debug)]
pub struct ExecutionPackage<'i> {
    compute: imp::Lane,
    transfer: imp::Lane,
    sets: Vec<Vec<SetSlot>>,
    programs: Vec<imp::Program>,
    interfaces: Vec<usize>,
    buffers: Vec<PackageBuffer>,
    allocations: Vec<imp::Allocation>,
    device: imp::Device,
    descriptor: DeviceDescriptor,
    device_index: usize,
    staging: Option<usize>,
    directory: Directory,
    id: u64,
    wait_slice: Duration,
    wait_attempts: u32,
    in_flight: bool,
    /// A staged copy was submitted and its wait gave up.
    transfer_pending: bool,
    _instance: &'i Instance,
}

impl<'i> ExecutionPackage<'i> {
    /**
    Matches device `device` against the description and creates everything on it.

    Fails without leaving anything behind: whatever was created before the failure is
    destroyed before the error is returned.
    */
    pub fn prepare(
        instance: &'i Instance,
        device: usize,
        description: &ExecutionPackageDescription,
    ) -> Result<Self, PrepareError> {
        match Self::build(instance, device, description) {
            Ok(package) => {
                logwise::info_sync!(
                    "package {id} ready on {name}: {buffers} buffers in {allocations} allocations, {programs} programs",
                    id = package.id,
                    name = logwise::privacy::LogIt(&package.descriptor.name),
                    buffers = package.buffers.len(),
                    allocations = package.allocations.len(),
                    programs = package.programs.len()
                );
                Ok(package)
            }
            Err(e) => {
                logwise::error_sync!(
                    "preparing a package on device {device} failed: {err}",
                    device = device,
                    err = logwise::privacy::LogIt(&e)
                );
                Err(e)
            }
        }
    }

    fn build(
        instance: &'i Instance,
        device_index: usize,
        description: &ExecutionPackageDescription,
    ) -> Result<Self, PrepareError> {
        description
            .validate()
            .map_err(PrepareError::InvalidDescription)?;
        let descriptor = instance
            .devices()
            .get(device_index)
            .ok_or(PrepareError::NoSuchDevice {
                device: device_index,
            })?
            .clone();

        let Requirements {
            requirements,
            compute,
            transfer,
        } = requirements(description);
        let report = match_device(&requirements, &descriptor);
        let (compute_family, transfer_family) = match (
            report.is_adequate(),
            report.queue_family(compute),
            report.queue_family(transfer),
        ) {
            (true, Some(c), Some(t)) => (c as u32, t as u32),
            _ => {
                return Err(PrepareError::DeviceInadequate {
                    device: device_index,
                    report,
                });
            }
        };
        if report.adequate > 0 {
            logwise::warn_sync!(
                "{name} is only adequate for {count} requirements",
                name = logwise::privacy::LogIt(&descriptor.name),
                count = report.adequate
            );
        }

        let device = instance
            .0
            .create_device(device_index, REQUIRED_FEATURES, &[compute_family, transfer_family])
            .map_err(ResourceCreationError::wrap("device"))?;
        let compute_queue = device
            .queue(compute_family)
            .map_err(ResourceCreationError::wrap("compute queue"))?;
        let transfer_queue = device
            .queue(transfer_family)
            .map_err(ResourceCreationError::wrap("transfer queue"))?;

        //staging first, then the spheres in order
        let mut specs: Vec<(Option<BufferRef>, u64)> = Vec::new();
        if description.needs_staging() {
            specs.push((None, description.staging));
        }
        let mut directory = Directory {
            start: [0; 4],
            len: [0; 4],
        };
        for sphere in Sphere::ALL {
            directory.start[sphere.index()] = specs.len();
            directory.len[sphere.index()] = description.sizes(sphere).len();
            for (index, size) in description.sizes(sphere).iter().enumerate() {
                specs.push((Some(BufferRef::new(sphere, index)), *size));
            }
        }

        let mut created = Vec::with_capacity(specs.len());
        let mut requests = Vec::with_capacity(specs.len());
        for (name, size) in &specs {
            let usage = match name {
                None => BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
                Some(_) => {
                    BufferUsage::STORAGE_BUFFER | BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST
                }
            };
            let buffer = device
                .create_buffer(*size, usage)
                .map_err(ResourceCreationError::wrap("buffer"))?;
            let needs = device.memory_requirements(&buffer);
            let memory_type = assign_memory_type(&memory_for(*name, description), &descriptor, needs.type_bits)
                .slot
                .ok_or(PrepareError::NoMemoryType { buffer: *name })?;
            requests.push(Request {
                memory_type,
                size: needs.size,
                alignment: needs.alignment,
            });
            created.push(buffer);
        }

        let (blocks, placements) = layout::pack(&requests, description.max_allocation_size);
        let mut allocations = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let allocation = device
                .allocate(block.memory_type, block.size)
                .map_err(ResourceCreationError::wrap("memory"))?;
            logwise::debuginternal_sync!(
                "allocated {size} bytes of memory type {memory_type}",
                size = block.size,
                memory_type = block.memory_type
            );
            allocations.push(allocation);
        }
        for allocation in &mut allocations {
            let visible = descriptor
                .memory_types
                .get(allocation.memory_type())
                .is_some_and(|t| t.flags.contains(MemoryFlags::HOST_VISIBLE));
            if visible {
                allocation
                    .map()
                    .map_err(ResourceCreationError::wrap("memory mapping"))?;
            }
        }

        let mut buffers = Vec::with_capacity(created.len());
        for ((mut buffer, (name, size)), placement) in created.into_iter().zip(&specs).zip(&placements) {
            let allocation = &allocations[placement.block];
            device
                .bind(&mut buffer, allocation, placement.offset)
                .map_err(ResourceCreationError::wrap("buffer binding"))?;
            let access = if allocation.is_mapped() {
                HostAccess::Mapped
            } else {
                match name.map(|b| b.sphere) {
                    Some(Sphere::Side) if !description.side_host_access => HostAccess::Denied,
                    None => HostAccess::Denied,
                    Some(_) => HostAccess::Staged,
                }
            };
            buffers.push(PackageBuffer {
                buffer,
                size: *size,
                allocation: placement.block,
                offset: placement.offset,
                access,
            });
        }

        let mut programs = Vec::with_capacity(description.programs.len());
        let mut sets = Vec::with_capacity(description.programs.len());
        let mut interfaces = Vec::with_capacity(description.programs.len());
        for program_description in &description.programs {
            let program = device
                .create_program(&program_description.module)
                .map_err(ResourceCreationError::wrap("program"))?;
            let bindings = program_description.module.binding_count();
            let program_sets = device
                .allocate_descriptor_sets(&program, program_description.max_concurrent)
                .map_err(ResourceCreationError::wrap("descriptor sets"))?;
            sets.push(
                program_sets
                    .into_iter()
                    .map(|set| SetSlot {
                        set,
                        bound: vec![None; bindings],
                    })
                    .collect(),
            );
            programs.push(program);
            interfaces.push(bindings);
        }

        let compute = device
            .create_lane(&compute_queue)
            .map_err(ResourceCreationError::wrap("compute lane"))?;
        let transfer = device
            .create_lane(&transfer_queue)
            .map_err(ResourceCreationError::wrap("transfer lane"))?;

        Ok(ExecutionPackage {
            compute,
            transfer,
            sets,
            programs,
            interfaces,
            buffers,
            allocations,
            device,
            descriptor,
            device_index,
            staging: description.needs_staging().then_some(0),
            directory,
            id: NEXT_PACKAGE.fetch_add(1, Ordering::Relaxed),
            wait_slice: description.wait_slice,
            wait_attempts: description.wait_attempts,
            in_flight: false,
            transfer_pending: false,
            _instance: instance,
        })
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Whether a program was submitted and not yet waited for.
    pub fn is_running(&self) -> bool {
        self.in_flight
    }

    /// Whether a staged copy timed out and has not been waited for since.
    pub fn is_transferring(&self) -> bool {
        self.transfer_pending
    }

    /// Waits out a staged copy whose wait timed out.  The staging buffer and the transfer
    /// lane are reused only once this succeeds.
    fn settle_transfer(&mut self) -> Result<(), SynchronizationError> {
        if self.transfer_pending {
            wait_lane(&mut self.transfer, self.wait_slice, self.wait_attempts, "earlier staged copy")?;
            self.transfer_pending = false;
        }
        Ok(())
    }

    fn locate(&self, buffer: BufferRef) -> Option<usize> {
        self.directory.locate(buffer)
    }

    pub fn contains(&self, buffer: BufferRef) -> bool {
        self.locate(buffer).is_some()
    }

    pub fn buffer_size(&self, buffer: BufferRef) -> Option<u64> {
        self.locate(buffer).map(|i| self.buffers[i].size)
    }

    pub fn host_access(&self, buffer: BufferRef) -> Option<HostAccess> {
        self.locate(buffer).map(|i| self.buffers[i].access)
    }

    /// Bytes moved per staged round trip, if the package has a staging buffer.
    pub fn staging_size(&self) -> Option<u64> {
        self.staging.map(|i| self.buffers[i].size)
    }

    fn check_io(&self, buffer: BufferRef, offset: u64, len: u64) -> Result<usize, BufferError> {
        if self.in_flight {
            return Err(BufferError::InFlight);
        }
        let index = self.locate(buffer).ok_or(BufferError::NoSuchBuffer(buffer))?;
        let size = self.buffers[index].size;
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(index),
            _ => Err(BufferError::OutOfRange {
                buffer,
                offset,
                len,
                size,
            }),
        }
    }

    /// Copies `data` into `buffer` at `offset`.
    pub fn write(&mut self, buffer: BufferRef, offset: u64, data: &[u8]) -> Result<(), BufferError> {
        let index = self.check_io(buffer, offset, data.len() as u64)?;
        let target = &self.buffers[index];
        match target.access {
            HostAccess::Mapped => {
                let memory = &self.allocations[target.allocation];
                memory
                    .write(target.offset + offset, data)
                    .map_err(BackendError)?;
                memory.flush().map_err(BackendError)?;
                Ok(())
            }
            HostAccess::Staged => self.staged_write(buffer, index, offset, data),
            HostAccess::Denied => Err(BufferError::NotHostAccessible(buffer)),
        }
    }

    /// Fills `out` from `buffer` starting at `offset`.
    pub fn read(&mut self, buffer: BufferRef, offset: u64, out: &mut [u8]) -> Result<(), BufferError> {
        let index = self.check_io(buffer, offset, out.len() as u64)?;
        let source = &self.buffers[index];
        match source.access {
            HostAccess::Mapped => {
                let memory = &self.allocations[source.allocation];
                memory.invalidate().map_err(BackendError)?;
                memory
                    .read(source.offset + offset, out)
                    .map_err(BackendError)?;
                Ok(())
            }
            HostAccess::Staged => self.staged_read(buffer, index, offset, out),
            HostAccess::Denied => Err(BufferError::NotHostAccessible(buffer)),
        }
    }

    fn staged_write(&mut self, name: BufferRef, index: usize, offset: u64, data: &[u8]) -> Result<(), BufferError> {
        let _perf = logwise::perfwarn_begin!("staged buffer write");
        self.settle_transfer()?;
        let staging = &self.buffers[self.staging.ok_or(BufferError::NotHostAccessible(name))?];
        let memory = &self.allocations[staging.allocation];
        let target = &self.buffers[index].buffer;
        let chunk = staging.size as usize;
        for (n, piece) in data.chunks(chunk).enumerate() {
            memory.write(staging.offset, piece).map_err(BackendError)?;
            memory.flush().map_err(BackendError)?;
            self.transfer
                .submit(&[Command::CopyBuffer {
                    src: &staging.buffer,
                    src_offset: 0,
                    dst: target,
                    dst_offset: offset + (n * chunk) as u64,
                    size: piece.len() as u64,
                }])
                .map_err(BackendError)?;
            self.transfer_pending = true;
            wait_lane(&mut self.transfer, self.wait_slice, self.wait_attempts, "staged write")?;
            self.transfer_pending = false;
        }
        Ok(())
    }

    fn staged_read(&mut self, name: BufferRef, index: usize, offset: u64, out: &mut [u8]) -> Result<(), BufferError> {
        let _perf = logwise::perfwarn_begin!("staged buffer read");
        self.settle_transfer()?;
        let staging = &self.buffers[self.staging.ok_or(BufferError::NotHostAccessible(name))?];
        let memory = &self.allocations[staging.allocation];
        let source = &self.buffers[index].buffer;
        let chunk = staging.size as usize;
        for (n, piece) in out.chunks_mut(chunk).enumerate() {
            self.transfer
                .submit(&[
                    Command::CopyBuffer {
                        src: source,
                        src_offset: offset + (n * chunk) as u64,
                        dst: &staging.buffer,
                        dst_offset: 0,
                        size: piece.len() as u64,
                    },
                    Command::Barrier {
                        src: AccessFlags::TRANSFER_WRITE,
                        dst: AccessFlags::HOST_READ,
                        buffers: vec![&staging.buffer],
                    },
                ])
                .map_err(BackendError)?;
            self.transfer_pending = true;
            wait_lane(&mut self.transfer, self.wait_slice, self.wait_attempts, "staged read")?;
            self.transfer_pending = false;
            memory.invalidate().map_err(BackendError)?;
            memory.read(staging.offset, piece).map_err(BackendError)?;
        }
        Ok(())
    }

    pub(crate) fn program_slots(&self) -> Vec<ProgramSlots> {
        self.interfaces
            .iter()
            .zip(&self.sets)
            .map(|(bindings, sets)| ProgramSlots {
                bindings: *bindings,
                sets: sets.len(),
            })
            .collect()
    }

    /// Points every binding used by `steps` at its buffer, skipping the ones already there.
    pub(crate) fn bind_descriptor_sets(&mut self, steps: &[PreparedStep]) -> Result<(), BackendError> {
        for step in steps {
            for (binding, buffer) in step.bindings().iter().enumerate() {
                let Some(index) = self.locate(*buffer) else {
                    continue;
                };
                let Some(slot) = self
                    .sets
                    .get_mut(step.program())
                    .and_then(|s| s.get_mut(step.descriptor_set()))
                else {
                    continue;
                };
                if slot.bound.get(binding) == Some(&Some(index)) {
                    continue;
                }
                self.device
                    .update_descriptor(&mut slot.set, binding as u32, &self.buffers[index].buffer)?;
                if let Some(b) = slot.bound.get_mut(binding) {
                    *b = Some(index);
                }
            }
        }
        Ok(())
    }

    /**
    Submits `plan` to the compute queue and returns without waiting.

    Descriptor sets that another plan re-pointed since `plan` was prepared are bound back first.
    */
    pub fn run(&mut self, plan: &PreparedPlan) -> Result<(), RunError> {
        if plan.package() != self.id {
            return Err(RunError::ForeignPlan);
        }
        if self.in_flight {
            return Err(RunError::InFlight);
        }
        //a timed-out staged write may still be filling a buffer this plan reads
        self.settle_transfer()?;
        self.bind_descriptor_sets(plan.steps())?;

        let directory = self.directory;
        let table = &self.buffers;
        let mut commands = Vec::with_capacity(plan.steps().len() * 4 + 2);
        if let Some(barrier) = plan.start_barrier() {
            commands.push(barrier_command(table, directory, barrier));
        }
        for step in plan.steps() {
            if let Some(barrier) = step.barrier() {
                commands.push(barrier_command(table, directory, barrier));
            }
            let program = &self.programs[step.program()];
            commands.push(Command::BindPipeline(program));
            commands.push(Command::BindDescriptorSet(
                program,
                &self.sets[step.program()][step.descriptor_set()].set,
            ));
            commands.push(Command::Dispatch(step.groups()));
        }
        if let Some(barrier) = plan.end_barrier() {
            commands.push(barrier_command(table, directory, barrier));
        }
        self.compute.submit(&commands).map_err(BackendError)?;
        self.in_flight = true;
        Ok(())
    }

    /// Blocks until the running program finishes, in bounded slices.
    pub fn wait_program(&mut self) -> Result<(), SynchronizationError> {
        if !self.in_flight {
            return Ok(());
        }
        wait_lane(&mut self.compute, self.wait_slice, self.wait_attempts, "program")?;
        self.in_flight = false;
        Ok(())
    }
}

#[cfg(not(feature = "backend_vulkan"))]
impl ExecutionPackage<'_> {
    /// The simulated device's id for `buffer`, as it appears in the trace.
    pub fn trace_id(&self, buffer: BufferRef) -> Option<u64> {
        self.locate(buffer).map(|i| self.buffers[i].buffer.trace_id())
    }

    pub fn staging_trace_id(&self) -> Option<u64> {
        self.staging.map(|i| self.buffers[i].buffer.trace_id())
    }

    pub fn descriptor_set_trace_id(&self, program: usize, set: usize) -> Option<u64> {
        self.sets.get(program)?.get(set).map(|s| s.set.trace_id())
    }

    pub fn program_trace_id(&self, program: usize) -> Option<u64> {
        self.programs.get(program).map(|p| p.trace_id())
    }
}

#[cfg(all(test, not(feature = "backend_vulkan")))]
mod tests {
    use super::*;
    use crate::device::{FailurePoint, SimulatedDevice, Tier};

    #[test]
    fn requirement_order_follows_allocation_order() {
        let mut d = ExecutionPackageDescription::default();
        d.add_input(64);
        d.add_data(128);
        let r = requirements(&d);
        let sizes: Vec<u64> = r.requirements.memory.iter().map(|m| m.size).collect();
        assert_eq!(sizes, vec![d.staging, 64, 128]);
        assert_eq!(r.requirements.queues.len(), 2);
    }

    #[test]
    fn spheres_land_in_expected_memory() {
        let instance = Instance::simulated(vec![SimulatedDevice::discrete()]);
        let mut d = ExecutionPackageDescription::default();
        let input = d.add_input(64);
        let data = d.add_data(64);
        let side = d.add_side(64);
        let package = ExecutionPackage::prepare(&instance, 0, &d).unwrap();
        assert_eq!(package.host_access(input), Some(HostAccess::Mapped));
        assert_eq!(package.host_access(data), Some(HostAccess::Staged));
        assert_eq!(package.host_access(side), Some(HostAccess::Denied));
        assert_eq!(package.host_access(BufferRef::side(1)), None);
        assert_eq!(package.staging_size(), Some(d.staging));
    }

    #[test]
    fn device_memory_on_host_maps_everything() {
        let instance = Instance::simulated(vec![SimulatedDevice::discrete()]);
        let mut d = ExecutionPackageDescription::default();
        let data = d.add_data(64);
        let side = d.add_side(64);
        d.device_memory_on_host = true;
        let mut package = ExecutionPackage::prepare(&instance, 0, &d).unwrap();
        assert_eq!(package.host_access(data), Some(HostAccess::Mapped));
        assert_eq!(package.host_access(side), Some(HostAccess::Mapped));
        assert_eq!(package.staging_size(), None);
        package.write(side, 8, &[9; 8]).unwrap();
        let mut out = [0; 16];
        package.read(side, 0, &mut out).unwrap();
        assert_eq!(&out[8..], &[9; 8]);
    }

    #[test]
    fn io_bounds() {
        let instance = Instance::simulated(vec![SimulatedDevice::integrated()]);
        let mut d = ExecutionPackageDescription::default();
        let input = d.add_input(16);
        let mut package = ExecutionPackage::prepare(&instance, 0, &d).unwrap();
        assert!(matches!(
            package.write(input, 12, &[0; 8]),
            Err(BufferError::OutOfRange {
                offset: 12,
                len: 8,
                size: 16,
                ..
            })
        ));
        assert!(matches!(
            package.read(BufferRef::output(0), 0, &mut [0; 1]),
            Err(BufferError::NoSuchBuffer(_))
        ));
    }

    #[test]
    fn inadequate_device_is_rejected() {
        let mut sim = SimulatedDevice::integrated();
        sim.descriptor.features = FeatureFlags::SHADER_FLOAT64;
        let instance = Instance::simulated(vec![sim]);
        let mut d = ExecutionPackageDescription::default();
        d.add_input(16);
        match ExecutionPackage::prepare(&instance, 0, &d) {
            Err(PrepareError::DeviceInadequate { device: 0, report }) => {
                assert_eq!(report.features, Tier::Inadequate)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            ExecutionPackage::prepare(&instance, 3, &d),
            Err(PrepareError::NoSuchDevice { device: 3 })
        ));
    }

    #[test]
    fn failures_unwind() {
        let instance = Instance::simulated(vec![
            SimulatedDevice::discrete().with_failure(FailurePoint::Lane),
        ]);
        let mut d = ExecutionPackageDescription::default();
        d.add_input(1 << 20);
        d.add_data(1 << 20);
        let result = ExecutionPackage::prepare(&instance, 0, &d);
        assert!(matches!(
            result,
            Err(PrepareError::ResourceCreation(ResourceCreationError {
                what: "compute lane",
                ..
            }))
        ));
        //the heaps were released, so a second package of the full heap size fits
        let mut sim = SimulatedDevice::integrated();
        sim.descriptor.memory_heaps[0].size = 1 << 20;
        let instance = Instance::simulated(vec![sim]);
        let mut d = ExecutionPackageDescription::default();
        d.add_input(768 << 10);
        drop(ExecutionPackage::prepare(&instance, 0, &d).unwrap());
        assert!(ExecutionPackage::prepare(&instance, 0, &d).is_ok());
    }
}
