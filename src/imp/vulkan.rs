// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The Vulkan backend.

Every resource holds an `Arc` to the object that created it and destroys its handle in
`Drop`, so teardown order follows ownership.
*/

use std::ffi::CString;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use ash::vk;

use super::{Command, MemoryRequirements};
use crate::device::{
    AccessFlags, BufferUsage, DeviceDescriptor, DeviceKind, FeatureFlags, InstanceConfig,
    MemoryFlags, MemoryHeap, MemoryType, QueueFamily, QueueFlags,
};
use crate::shader::ShaderModule;

const VALIDATION_LAYER: &std::ffi::CStr = c"VK_LAYER_KHRONOS_validation";
/// How long a dropped lane waits for its last submission.
const TEARDOWN_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("can't load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("{what} failed: {result}")]
    Vk {
        what: &'static str,
        result: vk::Result,
    },
    #[error("application name contains a NUL byte")]
    InvalidName,
    #[error("no device at index {0}")]
    NoSuchDevice(usize),
    #[error("queue family {0} was not requested when the device was created")]
    NoSuchQueue(u32),
    #[error("device lacks features {0:?}")]
    MissingFeatures(FeatureFlags),
    #[error("no memory type {0}")]
    NoSuchMemoryType(usize),
    #[error("module does not start with the magic word")]
    InvalidModule,
    #[error("range {offset}+{len} exceeds size {size}")]
    OutOfRange { offset: u64, len: u64, size: u64 },
    #[error("memory type is not host visible")]
    NotHostVisible,
    #[error("allocation is not mapped")]
    NotMapped,
    #[error("binding {binding} is outside a layout of {count}")]
    NoSuchBinding { binding: u32, count: u32 },
    #[error("the lane's last submission has not been waited for")]
    LaneBusy,
}

trait VkContext<T> {
    fn context(self, what: &'static str) -> Result<T, Error>;
}

impl<T> VkContext<T> for Result<T, vk::Result> {
    fn context(self, what: &'static str) -> Result<T, Error> {
        self.map_err(|result| Error::Vk { what, result })
    }
}

fn check_range(offset: u64, len: u64, size: u64) -> Result<(), Error> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::OutOfRange { offset, len, size }),
    }
}

struct InstanceShared {
    //keeps the library loaded for as long as the instance lives
    _entry: ash::Entry,
    instance: ash::Instance,
}

impl Debug for InstanceShared {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceShared")
            .field("instance", &self.instance.handle())
            .finish()
    }
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        unsafe { self.instance.destroy_instance(None) }
    }
}

#[derive(Debug)]
pub struct Instance {
    shared: Arc<InstanceShared>,
    physical: Vec<vk::PhysicalDevice>,
    descriptors: Vec<DeviceDescriptor>,
}

fn describe(instance: &ash::Instance, physical: vk::PhysicalDevice) -> DeviceDescriptor {
    let properties = unsafe { instance.get_physical_device_properties(physical) };
    let supported = unsafe { instance.get_physical_device_features(physical) };
    let families = unsafe { instance.get_physical_device_queue_family_properties(physical) };
    let memory = unsafe { instance.get_physical_device_memory_properties(physical) };

    let name = properties
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind = match properties.device_type {
        vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceKind::IntegratedGpu,
        vk::PhysicalDeviceType::DISCRETE_GPU => DeviceKind::DiscreteGpu,
        vk::PhysicalDeviceType::VIRTUAL_GPU => DeviceKind::VirtualGpu,
        vk::PhysicalDeviceType::CPU => DeviceKind::Cpu,
        _ => DeviceKind::Other,
    };
    let mut features = FeatureFlags::empty();
    for (enabled, flag) in [
        (supported.shader_float64, FeatureFlags::SHADER_FLOAT64),
        (supported.shader_int64, FeatureFlags::SHADER_INT64),
        (supported.shader_int16, FeatureFlags::SHADER_INT16),
        (supported.robust_buffer_access, FeatureFlags::ROBUST_BUFFER_ACCESS),
    ] {
        if enabled != vk::FALSE {
            features |= flag;
        }
    }
    DeviceDescriptor {
        name,
        kind,
        features,
        queue_families: families
            .iter()
            .map(|f| QueueFamily {
                flags: QueueFlags::from_bits(f.queue_flags.as_raw()),
                count: f.queue_count,
            })
            .collect(),
        memory_types: memory
            .memory_types_as_slice()
            .iter()
            .map(|t| MemoryType {
                flags: MemoryFlags::from_bits(t.property_flags.as_raw()),
                heap: t.heap_index as usize,
            })
            .collect(),
        memory_heaps: memory
            .memory_heaps_as_slice()
            .iter()
            .map(|h| MemoryHeap {
                size: h.size,
                device_local: h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL),
            })
            .collect(),
    }
}

fn vk_features(flags: FeatureFlags) -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures::default()
        .shader_float64(flags.contains(FeatureFlags::SHADER_FLOAT64))
        .shader_int64(flags.contains(FeatureFlags::SHADER_INT64))
        .shader_int16(flags.contains(FeatureFlags::SHADER_INT16))
        .robust_buffer_access(flags.contains(FeatureFlags::ROBUST_BUFFER_ACCESS))
}

impl Instance {
    pub fn new(config: &InstanceConfig) -> Result<Self, Error> {
        let entry = unsafe { ash::Entry::load()? };
        let application_name =
            CString::new(config.application_name.as_str()).map_err(|_| Error::InvalidName)?;
        let application = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .engine_name(c"kernels_and_words")
            .api_version(vk::API_VERSION_1_0);

        let mut layers = Vec::new();
        if config.validation {
            let available = unsafe { entry.enumerate_instance_layer_properties() }
                .context("vkEnumerateInstanceLayerProperties")?;
            if available
                .iter()
                .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER))
            {
                layers.push(VALIDATION_LAYER.as_ptr());
            } else {
                logwise::warn_sync!("validation layer is not installed; continuing without it");
            }
        }
        let info = vk::InstanceCreateInfo::default()
            .application_info(&application)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&info, None) }.context("vkCreateInstance")?;
        let shared = Arc::new(InstanceShared {
            _entry: entry,
            instance,
        });
        let physical = unsafe { shared.instance.enumerate_physical_devices() }
            .context("vkEnumeratePhysicalDevices")?;
        let descriptors = physical
            .iter()
            .map(|p| describe(&shared.instance, *p))
            .collect();
        Ok(Instance {
            shared,
            physical,
            descriptors,
        })
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.descriptors
    }

    /// Opens device `index` with one queue from each of `families`.
    pub fn create_device(
        &self,
        index: usize,
        features: FeatureFlags,
        families: &[u32],
    ) -> Result<Device, Error> {
        let physical = *self.physical.get(index).ok_or(Error::NoSuchDevice(index))?;
        let descriptor = &self.descriptors[index];
        let missing = features & !descriptor.features;
        if !missing.is_empty() {
            return Err(Error::MissingFeatures(missing));
        }
        let mut unique: Vec<u32> = families.to_vec();
        unique.sort_unstable();
        unique.dedup();
        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo<'_>> = unique
            .iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(*family)
                    .queue_priorities(&priorities)
            })
            .collect();
        let enabled = vk_features(features);
        let info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_features(&enabled);
        let device = unsafe {
            self.shared
                .instance
                .create_device(physical, &info, None)
        }
        .context("vkCreateDevice")?;
        let properties = unsafe {
            self.shared
                .instance
                .get_physical_device_properties(physical)
        };
        Ok(Device {
            shared: Arc::new(DeviceShared {
                device,
                families: unique,
                descriptor: descriptor.clone(),
                non_coherent_atom: properties.limits.non_coherent_atom_size,
                _instance: self.shared.clone(),
            }),
        })
    }
}

struct DeviceShared {
    device: ash::Device,
    families: Vec<u32>,
    descriptor: DeviceDescriptor,
    non_coherent_atom: u64,
    _instance: Arc<InstanceShared>,
}

impl Debug for DeviceShared {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceShared")
            .field("device", &self.device.handle())
            .field("families", &self.families)
            .field("name", &self.descriptor.name)
            .finish()
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                logwise::error_sync!("vkDeviceWaitIdle failed during teardown: {err}", err = logwise::privacy::LogIt(&e));
            }
            self.device.destroy_device(None);
        }
    }
}

#[derive(Debug)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

#[derive(Debug)]
pub struct Queue {
    family: u32,
    queue: vk::Queue,
}

#[derive(Debug)]
pub struct Buffer {
    buffer: vk::Buffer,
    size: u64,
    device: Arc<DeviceShared>,
}

impl Buffer {
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_buffer(self.buffer, None) }
    }
}

#[derive(Debug)]
pub struct Allocation {
    memory: vk::DeviceMemory,
    memory_type: usize,
    size: u64,
    flags: MemoryFlags,
    mapped: *mut u8,
    device: Arc<DeviceShared>,
}

// SAFETY: the mapping is owned by this allocation and only touched through &self/&mut self.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Drop for Allocation {
    fn drop(&mut self) {
        unsafe {
            if !self.mapped.is_null() {
                self.device.device.unmap_memory(self.memory);
            }
            self.device.device.free_memory(self.memory, None);
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
        !self.mapped.is_null()
    }

    /// Maps the whole allocation for the rest of its life.
    pub fn map(&mut self) -> Result<(), Error> {
        if !self.flags.contains(MemoryFlags::HOST_VISIBLE) {
            return Err(Error::NotHostVisible);
        }
        if self.mapped.is_null() {
            let ptr = unsafe {
                self.device.device.map_memory(
                    self.memory,
                    0,
                    vk::WHOLE_SIZE,
                    vk::MemoryMapFlags::empty(),
                )
            }
            .context("vkMapMemory")?;
            self.mapped = ptr.cast();
        }
        Ok(())
    }

    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), Error> {
        if self.mapped.is_null() {
            return Err(Error::NotMapped);
        }
        check_range(offset, data.len() as u64, self.size)?;
        // SAFETY: the range was checked against the mapped size.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.mapped.add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    pub fn read(&self, offset: u64, out: &mut [u8]) -> Result<(), Error> {
        if self.mapped.is_null() {
            return Err(Error::NotMapped);
        }
        check_range(offset, out.len() as u64, self.size)?;
        // SAFETY: as in write.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.mapped.add(offset as usize),
                out.as_mut_ptr(),
                out.len(),
            );
        }
        Ok(())
    }

    fn whole_range(&self) -> vk::MappedMemoryRange<'static> {
        vk::MappedMemoryRange::default()
            .memory(self.memory)
            .offset(0)
            .size(vk::WHOLE_SIZE)
    }

    fn coherent(&self) -> bool {
        self.flags.contains(MemoryFlags::HOST_COHERENT)
    }

    /// Makes host writes visible to the device.  A no-op on coherent memory.
    pub fn flush(&self) -> Result<(), Error> {
        if self.coherent() {
            return Ok(());
        }
        unsafe {
            self.device
                .device
                .flush_mapped_memory_ranges(&[self.whole_range()])
        }
        .context("vkFlushMappedMemoryRanges")
    }

    pub fn invalidate(&self) -> Result<(), Error> {
        if self.coherent() {
            return Ok(());
        }
        unsafe {
            self.device
                .device
                .invalidate_mapped_memory_ranges(&[self.whole_range()])
        }
        .context("vkInvalidateMappedMemoryRanges")
    }
}

#[derive(Debug)]
pub struct Program {
    module: vk::ShaderModule,
    set_layout: vk::DescriptorSetLayout,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    bindings: u32,
    device: Arc<DeviceShared>,
}

impl Drop for Program {
    fn drop(&mut self) {
        let d = &self.device.device;
        unsafe {
            d.destroy_pipeline(self.pipeline, None);
            d.destroy_pipeline_layout(self.layout, None);
            d.destroy_descriptor_set_layout(self.set_layout, None);
            d.destroy_shader_module(self.module, None);
        }
    }
}

#[derive(Debug)]
struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Arc<DeviceShared>,
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_descriptor_pool(self.pool, None) }
    }
}

#[derive(Debug)]
pub struct DescriptorSet {
    set: vk::DescriptorSet,
    bindings: u32,
    _pool: Arc<DescriptorPool>,
}

/// A queue with its own command buffer and fence.
#[derive(Debug)]
pub struct Lane {
    queue: vk::Queue,
    pool: vk::CommandPool,
    commands: vk::CommandBuffer,
    fence: vk::Fence,
    submitted: bool,
    device: Arc<DeviceShared>,
}

impl Drop for Lane {
    fn drop(&mut self) {
        if self.submitted {
            //an executing command buffer must not be freed; leak it instead
            match self.wait(TEARDOWN_WAIT) {
                Ok(true) => {}
                Ok(false) => {
                    logwise::error_sync!(
                        "lane still busy after {secs}s at teardown; leaking its fence and command pool",
                        secs = TEARDOWN_WAIT.as_secs()
                    );
                    return;
                }
                Err(e) => {
                    logwise::error_sync!(
                        "waiting for a lane at teardown failed, leaking its fence and command pool: {err}",
                        err = logwise::privacy::LogIt(&e)
                    );
                    return;
                }
            }
        }
        let d = &self.device.device;
        unsafe {
            d.destroy_fence(self.fence, None);
            d.destroy_command_pool(self.pool, None);
        }
    }
}

impl Device {
    pub fn queue(&self, family: u32) -> Result<Queue, Error> {
        if !self.shared.families.contains(&family) {
            return Err(Error::NoSuchQueue(family));
        }
        let queue = unsafe { self.shared.device.get_device_queue(family, 0) };
        Ok(Queue { family, queue })
    }

    pub fn create_buffer(&self, size: u64, usage: BufferUsage) -> Result<Buffer, Error> {
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::from_raw(usage.bits()))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer =
            unsafe { self.shared.device.create_buffer(&info, None) }.context("vkCreateBuffer")?;
        Ok(Buffer {
            buffer,
            size,
            device: self.shared.clone(),
        })
    }

    pub fn memory_requirements(&self, buffer: &Buffer) -> MemoryRequirements {
        let r = unsafe { self.shared.device.get_buffer_memory_requirements(buffer.buffer) };
        let mut alignment = r.alignment.max(1);
        let type_is_coherent = |t: usize| self.shared.descriptor.memory_is_coherent(t);
        //buffers in non-coherent memory are flushed in whole atoms
        if (0..self.shared.descriptor.memory_types.len()).any(|t| !type_is_coherent(t)) {
            alignment = alignment.max(self.shared.non_coherent_atom);
        }
        MemoryRequirements {
            size: r.size,
            alignment,
            type_bits: r.memory_type_bits,
        }
    }

    pub fn allocate(&self, memory_type: usize, size: u64) -> Result<Allocation, Error> {
        let ty = self
            .shared
            .descriptor
            .memory_types
            .get(memory_type)
            .ok_or(Error::NoSuchMemoryType(memory_type))?;
        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type as u32);
        let memory = unsafe { self.shared.device.allocate_memory(&info, None) }
            .context("vkAllocateMemory")?;
        Ok(Allocation {
            memory,
            memory_type,
            size,
            flags: ty.flags,
            mapped: std::ptr::null_mut(),
            device: self.shared.clone(),
        })
    }

    pub fn bind(&self, buffer: &mut Buffer, allocation: &Allocation, offset: u64) -> Result<(), Error> {
        check_range(offset, buffer.size, allocation.size)?;
        unsafe {
            self.shared
                .device
                .bind_buffer_memory(buffer.buffer, allocation.memory, offset)
        }
        .context("vkBindBufferMemory")
    }

    /// Builds the shader module, a layout with one storage buffer per interface slot, and the pipeline.
    pub fn create_program(&self, module: &ShaderModule) -> Result<Program, Error> {
        if !module.has_magic() {
            return Err(Error::InvalidModule);
        }
        let d = &self.shared.device;
        let bindings = module.binding_count() as u32;

        let shader_info = vk::ShaderModuleCreateInfo::default().code(module.words());
        let shader =
            unsafe { d.create_shader_module(&shader_info, None) }.context("vkCreateShaderModule")?;

        let layout_bindings: Vec<vk::DescriptorSetLayoutBinding<'_>> = (0..bindings)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::COMPUTE)
            })
            .collect();
        let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&layout_bindings);
        let set_layout = match unsafe { d.create_descriptor_set_layout(&set_layout_info, None) } {
            Ok(l) => l,
            Err(result) => {
                unsafe { d.destroy_shader_module(shader, None) };
                return Err(Error::Vk {
                    what: "vkCreateDescriptorSetLayout",
                    result,
                });
            }
        };
        let set_layouts = [set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let layout = match unsafe { d.create_pipeline_layout(&layout_info, None) } {
            Ok(l) => l,
            Err(result) => {
                unsafe {
                    d.destroy_descriptor_set_layout(set_layout, None);
                    d.destroy_shader_module(shader, None);
                }
                return Err(Error::Vk {
                    what: "vkCreatePipelineLayout",
                    result,
                });
            }
        };
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader)
            .name(c"main");
        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(layout);
        let pipeline = match unsafe {
            d.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        } {
            Ok(mut pipelines) => pipelines.remove(0),
            Err((_, result)) => {
                unsafe {
                    d.destroy_pipeline_layout(layout, None);
                    d.destroy_descriptor_set_layout(set_layout, None);
                    d.destroy_shader_module(shader, None);
                }
                return Err(Error::Vk {
                    what: "vkCreateComputePipelines",
                    result,
                });
            }
        };
        Ok(Program {
            module: shader,
            set_layout,
            layout,
            pipeline,
            bindings,
            device: self.shared.clone(),
        })
    }

    /// Allocates `count` sets from a pool sized for exactly them.
    pub fn allocate_descriptor_sets(
        &self,
        program: &Program,
        count: usize,
    ) -> Result<Vec<DescriptorSet>, Error> {
        let d = &self.shared.device;
        let sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count((program.bindings.max(1) as usize * count) as u32)];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(count as u32)
            .pool_sizes(&sizes);
        let pool = Arc::new(DescriptorPool {
            pool: unsafe { d.create_descriptor_pool(&pool_info, None) }
                .context("vkCreateDescriptorPool")?,
            device: self.shared.clone(),
        });
        let layouts = vec![program.set_layout; count];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool.pool)
            .set_layouts(&layouts);
        let sets = unsafe { d.allocate_descriptor_sets(&allocate_info) }
            .context("vkAllocateDescriptorSets")?;
        Ok(sets
            .into_iter()
            .map(|set| DescriptorSet {
                set,
                bindings: program.bindings,
                _pool: pool.clone(),
            })
            .collect())
    }

    pub fn update_descriptor(
        &self,
        set: &mut DescriptorSet,
        binding: u32,
        buffer: &Buffer,
    ) -> Result<(), Error> {
        if binding >= set.bindings {
            return Err(Error::NoSuchBinding {
                binding,
                count: set.bindings,
            });
        }
        let infos = [vk::DescriptorBufferInfo::default()
            .buffer(buffer.buffer)
            .offset(0)
            .range(vk::WHOLE_SIZE)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set.set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .buffer_info(&infos);
        unsafe { self.shared.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    pub fn create_lane(&self, queue: &Queue) -> Result<Lane, Error> {
        let d = &self.shared.device;
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue.family);
        let pool = unsafe { d.create_command_pool(&pool_info, None) }.context("vkCreateCommandPool")?;
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let commands = match unsafe { d.allocate_command_buffers(&allocate_info) } {
            Ok(buffers) => buffers[0],
            Err(result) => {
                unsafe { d.destroy_command_pool(pool, None) };
                return Err(Error::Vk {
                    what: "vkAllocateCommandBuffers",
                    result,
                });
            }
        };
        let fence = match unsafe { d.create_fence(&vk::FenceCreateInfo::default(), None) } {
            Ok(f) => f,
            Err(result) => {
                unsafe { d.destroy_command_pool(pool, None) };
                return Err(Error::Vk {
                    what: "vkCreateFence",
                    result,
                });
            }
        };
        Ok(Lane {
            queue: queue.queue,
            pool,
            commands,
            fence,
            submitted: false,
            device: self.shared.clone(),
        })
    }
}

fn stages(access: AccessFlags) -> vk::PipelineStageFlags {
    let mut stages = vk::PipelineStageFlags::empty();
    if access.intersects(AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE) {
        stages |= vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if access.intersects(AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE) {
        stages |= vk::PipelineStageFlags::TRANSFER;
    }
    if access.intersects(AccessFlags::HOST_READ | AccessFlags::HOST_WRITE) {
        stages |= vk::PipelineStageFlags::HOST;
    }
    if stages.is_empty() {
        vk::PipelineStageFlags::TOP_OF_PIPE
    } else {
        stages
    }
}

impl Lane {
    /// Records `commands` into the lane's command buffer and submits it, resetting the fence first.
    ///
    /// The previous submission must have completed.
    pub fn submit(&mut self, commands: &[Command<'_>]) -> Result<(), Error> {
        if self.submitted {
            return Err(Error::LaneBusy);
        }
        let d = &self.device.device;
        unsafe {
            d.reset_fences(&[self.fence]).context("vkResetFences")?;
            d.reset_command_buffer(self.commands, vk::CommandBufferResetFlags::empty())
                .context("vkResetCommandBuffer")?;
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            d.begin_command_buffer(self.commands, &begin)
                .context("vkBeginCommandBuffer")?;
            for command in commands {
                match command {
                    Command::Barrier { src, dst, buffers } => {
                        let src_access = vk::AccessFlags::from_raw(src.bits());
                        let dst_access = vk::AccessFlags::from_raw(dst.bits());
                        let barriers: Vec<vk::BufferMemoryBarrier<'_>> = buffers
                            .iter()
                            .map(|b| {
                                vk::BufferMemoryBarrier::default()
                                    .src_access_mask(src_access)
                                    .dst_access_mask(dst_access)
                                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                    .buffer(b.buffer)
                                    .offset(0)
                                    .size(vk::WHOLE_SIZE)
                            })
                            .collect();
                        let global = [vk::MemoryBarrier::default()
                            .src_access_mask(src_access)
                            .dst_access_mask(dst_access)];
                        let memory: &[vk::MemoryBarrier<'_>] =
                            if barriers.is_empty() { &global } else { &[] };
                        d.cmd_pipeline_barrier(
                            self.commands,
                            stages(*src),
                            stages(*dst),
                            vk::DependencyFlags::empty(),
                            memory,
                            &barriers,
                            &[],
                        );
                    }
                    Command::BindPipeline(program) => d.cmd_bind_pipeline(
                        self.commands,
                        vk::PipelineBindPoint::COMPUTE,
                        program.pipeline,
                    ),
                    Command::BindDescriptorSet(program, set) => d.cmd_bind_descriptor_sets(
                        self.commands,
                        vk::PipelineBindPoint::COMPUTE,
                        program.layout,
                        0,
                        &[set.set],
                        &[],
                    ),
                    Command::Dispatch([x, y, z]) => d.cmd_dispatch(self.commands, *x, *y, *z),
                    Command::CopyBuffer {
                        src,
                        src_offset,
                        dst,
                        dst_offset,
                        size,
                    } => {
                        check_range(*src_offset, *size, src.size)?;
                        check_range(*dst_offset, *size, dst.size)?;
                        let region = vk::BufferCopy::default()
                            .src_offset(*src_offset)
                            .dst_offset(*dst_offset)
                            .size(*size);
                        d.cmd_copy_buffer(self.commands, src.buffer, dst.buffer, &[region]);
                    }
                }
            }
            d.end_command_buffer(self.commands)
                .context("vkEndCommandBuffer")?;
            let buffers = [self.commands];
            let submit = vk::SubmitInfo::default().command_buffers(&buffers);
            d.queue_submit(self.queue, &[submit], self.fence)
                .context("vkQueueSubmit")?;
        }
        self.submitted = true;
        Ok(())
    }

    /// Waits up to `timeout` for the last submission.  Returns whether it completed.
    pub fn wait(&mut self, timeout: Duration) -> Result<bool, Error> {
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        match unsafe { self.device.device.wait_for_fences(&[self.fence], true, nanos) } {
            Ok(()) => {
                self.submitted = false;
                Ok(true)
            }
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(result) => Err(Error::Vk {
                what: "vkWaitForFences",
                result,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The first device with a compute family, or `None` on machines without a driver.
    fn compute_device() -> Option<(Device, u32)> {
        let config = InstanceConfig {
            validation: false,
            ..InstanceConfig::default()
        };
        let instance = Instance::new(&config).ok()?;
        let (index, family) = instance.devices().iter().enumerate().find_map(|(i, d)| {
            d.queue_families
                .iter()
                .position(|f| f.flags.contains(QueueFlags::COMPUTE))
                .map(|f| (i, f as u32))
        })?;
        let device = instance
            .create_device(index, FeatureFlags::empty(), &[family])
            .ok()?;
        Some((device, family))
    }

    #[test]
    fn dropping_a_submitted_lane() {
        let Some((device, family)) = compute_device() else {
            return;
        };
        let queue = device.queue(family).unwrap();
        let mut lane = device.create_lane(&queue).unwrap();
        lane.submit(&[]).unwrap();
        assert!(matches!(lane.submit(&[]), Err(Error::LaneBusy)));
        //teardown waits out the submission before freeing the pool
        drop(lane);

        let mut lane = device.create_lane(&queue).unwrap();
        lane.submit(&[]).unwrap();
        assert!(lane.wait(TEARDOWN_WAIT).unwrap());
        lane.submit(&[]).unwrap();
    }
}
