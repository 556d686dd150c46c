// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Building simulation shaders out of steps.

A [SimulationShader] owns the common frame every simulation shares: one invocation per
(loading, case) pair, three input buffers (initial allele loadings, site index, random
seeds), a seed variable and one count variable per allele.  Each [SimulationStep] adds its
own constants, buffers, variables and code on top, in order.

No concrete step ships with the crate; models implement [SimulationStep] themselves.
*/

mod genotype;

pub use genotype::{GenotypeSet, MixedRadixCounter};

use crate::compute::{BufferRef, ExecutionPackageDescription};
use crate::shader::{
    Axis, F32, F64, I32, I64, ShaderBuilder, ShaderError, ShaderModule, ValD, ValF, ValI, ValL, Var,
};

/// Sizes that shape every simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimulationParameters {
    /// Simulations run for each initial loading.
    pub case_fan: u64,
    pub alleles: usize,
    pub sites: u64,
    /// Loadings run at once.
    pub max_simultaneous_loads: u64,
}

/// Constants and variables a step declared, handed back to it when it writes code.
#[derive(Debug, Default)]
pub struct Handles<'s> {
    pub ints: Vec<ValI<'s>>,
    pub longs: Vec<ValL<'s>>,
    pub floats: Vec<ValF<'s>>,
    pub doubles: Vec<ValD<'s>>,
    pub int_vars: Vec<Var<'s, I32>>,
    pub long_vars: Vec<Var<'s, I64>>,
    pub float_vars: Vec<Var<'s, F32>>,
    pub double_vars: Vec<Var<'s, F64>>,
}

/// The shared state of the frame, as seen by a step's code.
#[derive(Debug)]
pub struct Frame<'s> {
    /// The running random state.  Steps advance it with [Frame::next_random].
    pub seed: Var<'s, I64>,
    /// Allele counts, updated by each step in turn.
    pub counts: Vec<Var<'s, I64>>,
    pub site: ValL<'s>,
    pub load: ValL<'s>,
    pub case: ValL<'s>,
    pub case_fan: ValL<'s>,
    pub alleles: ValL<'s>,
    random_multiplier: ValL<'s>,
    random_increment: ValL<'s>,
}

impl<'s> Frame<'s> {
    /// Steps the 64-bit linear congruential generator and returns the new state.
    pub fn next_random(&self) -> ValL<'s> {
        let next = self.seed.get() * self.random_multiplier + self.random_increment;
        self.seed.set(next);
        next
    }
}

/**
One stage of a simulation.

Hooks run in builder phase order: every step's constants, then every step's interface,
and so on.  `add_interface` must register exactly [SimulationStep::site_buffer_count]
slots; their numbers start at the `first_buffer` later passed to `add_code`.
*/
pub trait SimulationStep {
    fn site_buffer_count(&self) -> usize;
    /// Bytes per site of the step's `buffer`th buffer.
    fn site_buffer_size(&self, buffer: usize, parameters: &SimulationParameters) -> u64;
    fn add_constants<'s>(&self, shader: &'s ShaderBuilder, handles: &mut Handles<'s>) -> Result<(), ShaderError>;
    fn add_interface(&self, shader: &ShaderBuilder) -> Result<(), ShaderError>;
    fn add_variables<'s>(&self, shader: &'s ShaderBuilder, handles: &mut Handles<'s>) -> Result<(), ShaderError>;
    fn add_code<'s>(
        &self,
        shader: &'s ShaderBuilder,
        frame: &Frame<'s>,
        handles: &Handles<'s>,
        first_buffer: usize,
    ) -> Result<(), ShaderError>;
}

//Knuth's MMIX constants
const RANDOM_MULTIPLIER: u64 = 0x5851_F42D_4C95_7F2D;
const RANDOM_INCREMENT: u64 = 0x1405_7B7E_F767_814F;

pub struct SimulationShader {
    parameters: SimulationParameters,
    group_size: [u32; 3],
    steps: Vec<Box<dyn SimulationStep>>,
}

impl std::fmt::Debug for SimulationShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationShader")
            .field("parameters", &self.parameters)
            .field("group_size", &self.group_size)
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl SimulationShader {
    /// Initial loadings, site index and seeds.
    pub const FRAME_BUFFERS: usize = 3;

    pub fn new(parameters: SimulationParameters, group_size: [u32; 3], steps: Vec<Box<dyn SimulationStep>>) -> Self {
        SimulationShader {
            parameters,
            group_size,
            steps,
        }
    }

    pub fn parameters(&self) -> &SimulationParameters {
        &self.parameters
    }

    /// First interface slot of each step.
    pub fn buffer_offsets(&self) -> Vec<usize> {
        let mut offset = Self::FRAME_BUFFERS;
        self.steps
            .iter()
            .map(|step| {
                let first = offset;
                offset += step.site_buffer_count();
                first
            })
            .collect()
    }

    pub fn buffer_count(&self) -> usize {
        Self::FRAME_BUFFERS + self.steps.iter().map(|s| s.site_buffer_count()).sum::<usize>()
    }

    /// Byte size of interface slot `buffer`.
    pub fn buffer_size(&self, buffer: usize) -> Option<u64> {
        let p = &self.parameters;
        match buffer {
            0 => Some(p.max_simultaneous_loads * p.alleles as u64 * 8),
            1 => Some(p.max_simultaneous_loads * 8),
            2 => Some(p.max_simultaneous_loads * p.case_fan * 8),
            _ => {
                let offsets = self.buffer_offsets();
                let step = offsets.iter().rposition(|first| buffer >= *first)?;
                let local = buffer - offsets[step];
                (local < self.steps[step].site_buffer_count())
                    .then(|| p.sites * self.steps[step].site_buffer_size(local, p))
            }
        }
    }

    /// Adds every buffer to `description` in slot order: frame buffers as inputs, step buffers as data.
    pub fn add_buffers(&self, description: &mut ExecutionPackageDescription) -> Vec<BufferRef> {
        (0..self.buffer_count())
            .filter_map(|slot| {
                let size = self.buffer_size(slot)?;
                Some(if slot < Self::FRAME_BUFFERS {
                    description.add_input(size)
                } else {
                    description.add_data(size)
                })
            })
            .collect()
    }

    pub fn build(&self) -> Result<ShaderModule, ShaderError> {
        let shader = ShaderBuilder::new(self.group_size, self.buffer_count());
        self.emit(&shader)?;
        shader.finish()
    }

    fn emit(&self, shader: &ShaderBuilder) -> Result<(), ShaderError> {
        let p = &self.parameters;
        let random_multiplier = shader.con_u64(RANDOM_MULTIPLIER)?;
        let random_increment = shader.con_u64(RANDOM_INCREMENT)?;
        let case_fan = shader.con_u64(p.case_fan)?;
        let alleles = shader.con_u64(p.alleles as u64)?;
        let one = shader.con_i64(1)?;
        let mut handles: Vec<Handles<'_>> = self.steps.iter().map(|_| Handles::default()).collect();
        for (step, h) in self.steps.iter().zip(&mut handles) {
            step.add_constants(shader, h)?;
        }
        shader.constants_done()?;

        for _ in 0..Self::FRAME_BUFFERS {
            shader.register_interface::<I64>()?;
        }
        for step in &self.steps {
            step.add_interface(shader)?;
        }
        shader.begin_body()?;

        let seed = shader.define_variable::<I64>()?;
        let counts = (0..p.alleles)
            .map(|_| shader.define_variable::<I64>())
            .collect::<Result<Vec<_>, _>>()?;
        for (step, h) in self.steps.iter().zip(&mut handles) {
            step.add_variables(shader, h)?;
        }

        let load = shader.global_invocation_id(Axis::X).convert_unsigned::<I64>();
        let case = shader.global_invocation_id(Axis::Y).convert_unsigned::<I64>();
        let site = shader.get_interface_array::<I64>(1)?.get(load);
        let seeds = shader.get_interface_array::<I64>(2)?;
        seed.set(seeds.get(case + load * case_fan));
        let loadings = shader.get_interface_array::<I64>(0)?;
        let mut index = alleles * load;
        for count in &counts {
            count.set(loadings.get(index));
            index = index + one;
        }

        let frame = Frame {
            seed,
            counts,
            site,
            load,
            case,
            case_fan,
            alleles,
            random_multiplier,
            random_increment,
        };
        for ((step, h), first) in self.steps.iter().zip(&handles).zip(self.buffer_offsets()) {
            step.add_code(shader, &frame, h, first)?;
        }
        shader.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::{Instructions, Op};

    /// Adds each count into a per-site tally.
    struct Tally;

    impl SimulationStep for Tally {
        fn site_buffer_count(&self) -> usize {
            1
        }
        fn site_buffer_size(&self, _buffer: usize, parameters: &SimulationParameters) -> u64 {
            parameters.alleles as u64 * 8
        }
        fn add_constants<'s>(&self, shader: &'s ShaderBuilder, handles: &mut Handles<'s>) -> Result<(), ShaderError> {
            handles.longs.push(shader.con_i64(0)?);
            Ok(())
        }
        fn add_interface(&self, shader: &ShaderBuilder) -> Result<(), ShaderError> {
            shader.register_interface::<I64>().map(|_| ())
        }
        fn add_variables<'s>(&self, shader: &'s ShaderBuilder, handles: &mut Handles<'s>) -> Result<(), ShaderError> {
            handles.long_vars.push(shader.define_variable::<I64>()?);
            Ok(())
        }
        fn add_code<'s>(
            &self,
            shader: &'s ShaderBuilder,
            frame: &Frame<'s>,
            handles: &Handles<'s>,
            first_buffer: usize,
        ) -> Result<(), ShaderError> {
            let tally = shader.get_interface_array::<I64>(first_buffer)?;
            let total = handles.long_vars[0];
            total.set(handles.longs[0]);
            for count in &frame.counts {
                total.set(total.get() + count.get());
            }
            tally.set(frame.site, total.get() + frame.next_random());
            Ok(())
        }
    }

    fn parameters() -> SimulationParameters {
        SimulationParameters {
            case_fan: 4,
            alleles: 2,
            sites: 10,
            max_simultaneous_loads: 8,
        }
    }

    #[test]
    fn buffer_layout() {
        let shader = SimulationShader::new(parameters(), [8, 4, 1], vec![Box::new(Tally), Box::new(Tally)]);
        assert_eq!(shader.buffer_offsets(), vec![3, 4]);
        assert_eq!(shader.buffer_count(), 5);
        assert_eq!(shader.buffer_size(0), Some(8 * 2 * 8));
        assert_eq!(shader.buffer_size(2), Some(8 * 4 * 8));
        assert_eq!(shader.buffer_size(4), Some(10 * 2 * 8));
        assert_eq!(shader.buffer_size(5), None);

        let mut description = ExecutionPackageDescription::default();
        let buffers = shader.add_buffers(&mut description);
        assert_eq!(buffers.len(), 5);
        assert_eq!(buffers[3], BufferRef::data(0));
        assert_eq!(description.input.len(), 3);
    }

    #[test]
    fn builds_a_module() {
        let shader = SimulationShader::new(parameters(), [8, 4, 1], vec![Box::new(Tally)]);
        let module = shader.build().unwrap();
        assert_eq!(module.binding_count(), 4);
        let words = module.words();
        let multiplies = Instructions::of_module(words)
            .filter(|i| i.is(Op::IMul))
            .count();
        //seed index, loading index, and the generator
        assert_eq!(multiplies, 3);
        let variables = Instructions::of_module(words)
            .filter(|i| i.is(Op::Variable))
            .count();
        //gid, 4 interface arrays, seed, 2 counts, the tally total
        assert_eq!(variables, 9);
    }
}
