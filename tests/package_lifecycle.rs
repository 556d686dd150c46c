#![cfg(not(feature = "backend_vulkan"))]

use kernels_and_words::compute::{
    Access, BufferError, CallPlan, ExecutionPackage, ExecutionPackageDescription, PrepareError,
    ResourceCreationError, RunError, SynchronizationError,
};
use kernels_and_words::device::{
    FailurePoint, Instance, QueueFamily, QueueFlags, SimulatedDevice, TraceEvent,
};
use kernels_and_words::shader::{Axis, I32, ShaderBuilder, ShaderModule};

fn doubler() -> ShaderModule {
    let shader = ShaderBuilder::new([32, 1, 1], 1);
    shader.constants_done().unwrap();
    shader.register_interface::<I32>().unwrap();
    shader.begin_body().unwrap();
    let values = shader.get_interface_array::<I32>(0).unwrap();
    let i = shader.global_invocation_id(Axis::X);
    values.set(i, values.get(i) + values.get(i));
    shader.finish().unwrap()
}

#[test]
fn slow_fence_times_out_then_completes() {
    let instance = Instance::simulated(vec![SimulatedDevice::integrated().with_fence_latency(5)]);
    let mut d = ExecutionPackageDescription::default();
    let values = d.add_input(128);
    let program = d.add_program(doubler(), 1);
    d.wait_attempts = 3;
    let mut package = ExecutionPackage::prepare(&instance, 0, &d).unwrap();

    let mut plan = CallPlan::new();
    plan.add_step(program, &[(values, Access::ReadWrite)], [1, 1, 1]);
    let plan = plan.prepare(&mut package).unwrap();
    package.run(&plan).unwrap();

    assert!(matches!(
        package.wait_program(),
        Err(SynchronizationError::TimedOut { attempts: 3 })
    ));
    assert!(package.is_running());
    assert!(matches!(package.run(&plan), Err(RunError::InFlight)));
    assert!(matches!(package.write(values, 0, &[0; 4]), Err(BufferError::InFlight)));
    assert!(matches!(package.read(values, 0, &mut [0; 4]), Err(BufferError::InFlight)));

    //two more misses, then the fence signals
    package.wait_program().unwrap();
    assert!(!package.is_running());
    let waits: Vec<bool> = instance
        .trace()
        .into_iter()
        .filter_map(|e| match e {
            TraceEvent::Wait { signaled, .. } => Some(signaled),
            _ => None,
        })
        .collect();
    assert_eq!(waits, vec![false, false, false, false, false, true]);
    package.write(values, 0, &[1; 4]).unwrap();
}

#[test]
fn device_without_compute_is_inadequate() {
    let mut sim = SimulatedDevice::integrated();
    sim.descriptor.queue_families = vec![QueueFamily {
        flags: QueueFlags::TRANSFER,
        count: 1,
    }];
    let instance = Instance::simulated(vec![sim, SimulatedDevice::integrated()]);
    let mut d = ExecutionPackageDescription::default();
    d.add_input(64);

    match ExecutionPackage::prepare(&instance, 0, &d) {
        Err(PrepareError::DeviceInadequate { device: 0, report }) => assert!(!report.is_adequate()),
        other => panic!("unexpected {other:?}"),
    }
    //nothing was created on the inadequate device
    assert!(instance.trace().is_empty());
    let package = ExecutionPackage::prepare(&instance, 1, &d).unwrap();
    assert_eq!(package.device_index(), 1);
}

#[test]
fn every_creation_failure_is_reported() {
    let cases = [
        (FailurePoint::Buffer, "buffer"),
        (FailurePoint::Allocation, "memory"),
        (FailurePoint::Program, "program"),
        (FailurePoint::DescriptorSets, "descriptor sets"),
        (FailurePoint::Lane, "compute lane"),
    ];
    for (point, expected) in cases {
        let instance = Instance::simulated(vec![SimulatedDevice::discrete().with_failure(point)]);
        let mut d = ExecutionPackageDescription::default();
        d.add_input(256);
        d.add_data(256);
        d.add_program(doubler(), 2);
        match ExecutionPackage::prepare(&instance, 0, &d) {
            Err(PrepareError::ResourceCreation(ResourceCreationError { what, .. })) => {
                assert_eq!(what, expected, "failing {point:?}")
            }
            other => panic!("failing {point:?}: unexpected {other:?}"),
        }
    }
}

#[test]
fn invalid_descriptions_are_rejected_up_front() {
    let instance = Instance::simulated(vec![SimulatedDevice::integrated()]);
    let mut d = ExecutionPackageDescription::default();
    d.add_data(0);
    assert!(matches!(
        ExecutionPackage::prepare(&instance, 0, &d),
        Err(PrepareError::InvalidDescription(_))
    ));

    let mut d = ExecutionPackageDescription::default();
    d.add_input(64);
    d.add_program(doubler(), 0);
    assert!(matches!(
        ExecutionPackage::prepare(&instance, 0, &d),
        Err(PrepareError::InvalidDescription(_))
    ));
    assert!(instance.trace().is_empty());
}

#[test]
fn allocations_respect_the_size_cap() {
    let instance = Instance::simulated(vec![SimulatedDevice::discrete()]);
    let mut d = ExecutionPackageDescription::default();
    for _ in 0..4 {
        d.add_data(1024);
    }
    d.max_allocation_size = Some(2048);
    let _package = ExecutionPackage::prepare(&instance, 0, &d).unwrap();
    let sizes: Vec<u64> = instance
        .trace()
        .into_iter()
        .filter_map(|e| match e {
            TraceEvent::Allocated { size, .. } => Some(size),
            _ => None,
        })
        .collect();
    //the staging buffer gets its own host memory, the data buffers pack in pairs
    assert_eq!(sizes, vec![d.staging, 2048, 2048]);
}

#[test]
fn run_waits_out_a_timed_out_staged_write() {
    let instance = Instance::simulated(vec![SimulatedDevice::discrete().with_fence_latency(3)]);
    let mut d = ExecutionPackageDescription::default();
    let values = d.add_data(128);
    let program = d.add_program(doubler(), 1);
    d.wait_attempts = 1;
    let mut package = ExecutionPackage::prepare(&instance, 0, &d).unwrap();
    let mut plan = CallPlan::new();
    plan.add_step(program, &[(values, Access::ReadWrite)], [1, 1, 1]);
    let plan = plan.prepare(&mut package).unwrap();

    assert!(package.write(values, 0, &[1; 128]).is_err());
    //two more waits miss before the copy signals
    assert!(matches!(
        package.run(&plan),
        Err(RunError::Transfer(SynchronizationError::TimedOut { attempts: 1 }))
    ));
    assert!(!package.is_running());
    assert!(matches!(
        package.run(&plan),
        Err(RunError::Transfer(SynchronizationError::TimedOut { attempts: 1 }))
    ));
    package.run(&plan).unwrap();
    assert!(!package.is_transferring());
}
