#![cfg(not(feature = "backend_vulkan"))]

use kernels_and_words::compute::{
    Access, CallPlan, ExecutionPackage, ExecutionPackageDescription, HostAccess, Sphere,
};
use kernels_and_words::device::{AccessFlags, Instance, SimulatedDevice, TraceCommand, TraceEvent};
use kernels_and_words::shader::{I64, ShaderBuilder, ShaderError};
use kernels_and_words::sim::{Frame, GenotypeSet, Handles, SimulationParameters, SimulationShader, SimulationStep};

/// Draws one random number per invocation and adds it to a per-site accumulator.
struct Drift;

impl SimulationStep for Drift {
    fn site_buffer_count(&self) -> usize {
        1
    }

    fn site_buffer_size(&self, _buffer: usize, _parameters: &SimulationParameters) -> u64 {
        8
    }

    fn add_constants<'s>(&self, _shader: &'s ShaderBuilder, _handles: &mut Handles<'s>) -> Result<(), ShaderError> {
        Ok(())
    }

    fn add_interface(&self, shader: &ShaderBuilder) -> Result<(), ShaderError> {
        shader.register_interface::<I64>()?;
        Ok(())
    }

    fn add_variables<'s>(&self, _shader: &'s ShaderBuilder, _handles: &mut Handles<'s>) -> Result<(), ShaderError> {
        Ok(())
    }

    fn add_code<'s>(
        &self,
        shader: &'s ShaderBuilder,
        frame: &Frame<'s>,
        _handles: &Handles<'s>,
        first_buffer: usize,
    ) -> Result<(), ShaderError> {
        let drift = shader.get_interface_array::<I64>(first_buffer)?;
        drift.set(frame.site, drift.get(frame.site) + frame.next_random());
        Ok(())
    }
}

#[test]
fn simulation_runs_as_one_dispatch() {
    let parameters = SimulationParameters {
        case_fan: 4,
        alleles: 3,
        sites: 16,
        max_simultaneous_loads: 32,
    };
    let shader = SimulationShader::new(parameters, [32, 4, 1], vec![Box::new(Drift)]);
    let module = shader.build().unwrap();
    assert_eq!(module.group_size(), [32, 4, 1]);

    let instance = Instance::simulated(vec![SimulatedDevice::discrete()]);
    let mut d = ExecutionPackageDescription::default();
    let buffers = shader.add_buffers(&mut d);
    let program = d.add_program(module, 1);
    assert_eq!(d.sizes(Sphere::Input), &[32 * 3 * 8, 32 * 8, 32 * 4 * 8]);
    assert_eq!(d.sizes(Sphere::Data), &[16 * 8]);

    let mut package = ExecutionPackage::prepare(&instance, 0, &d).unwrap();
    assert_eq!(package.host_access(buffers[0]), Some(HostAccess::Mapped));
    assert_eq!(package.host_access(buffers[3]), Some(HostAccess::Staged));

    //one loading per diploid genotype, cycling
    let genotypes = GenotypeSet::new(3, 2);
    assert_eq!(genotypes.len(), 9);
    let mut loadings = Vec::new();
    for load in 0..32 {
        let genotype = genotypes.get(load % genotypes.len()).unwrap();
        for allele in 0..3u16 {
            let count = genotype.iter().filter(|a| **a == allele).count() as i64;
            loadings.extend_from_slice(&count.to_le_bytes());
        }
    }
    package.write(buffers[0], 0, &loadings).unwrap();

    let bindings: Vec<_> = buffers
        .iter()
        .map(|b| {
            let access = if b.sphere == Sphere::Input { Access::Read } else { Access::ReadWrite };
            (*b, access)
        })
        .collect();
    let mut plan = CallPlan::new();
    plan.add_step(program, &bindings, [1, 1, 1]);
    let plan = plan.prepare(&mut package).unwrap();
    package.run(&plan).unwrap();
    package.wait_program().unwrap();

    let submit = instance
        .trace()
        .into_iter()
        .rev()
        .find_map(|e| match e {
            TraceEvent::Submit { commands, .. } => Some(commands),
            _ => None,
        })
        .unwrap();
    let inputs: Vec<u64> = buffers[..3].iter().map(|b| package.trace_id(*b).unwrap()).collect();
    assert_eq!(
        submit[0],
        TraceCommand::Barrier {
            src: AccessFlags::HOST_WRITE,
            dst: AccessFlags::SHADER_READ,
            buffers: inputs,
        }
    );
    assert_eq!(submit.last(), Some(&TraceCommand::Dispatch([1, 1, 1])));
}
