// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! What a package should contain, before any device is involved.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::shader::ShaderModule;

/// Buffer ownership categories.
///
/// Input and output buffers live in host-visible memory.  Data buffers are device
/// memory reached through the staging buffer.  Side buffers are scratch space the
/// host normally cannot reach at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sphere {
    Input,
    Output,
    Data,
    Side,
}

impl Sphere {
    pub const ALL: [Sphere; 4] = [Sphere::Input, Sphere::Output, Sphere::Data, Sphere::Side];

    pub(crate) const fn index(self) -> usize {
        match self {
            Sphere::Input => 0,
            Sphere::Output => 1,
            Sphere::Data => 2,
            Sphere::Side => 3,
        }
    }
}

impl Display for Sphere {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Sphere::Input => "input",
            Sphere::Output => "output",
            Sphere::Data => "data",
            Sphere::Side => "side",
        })
    }
}

/// Names one buffer of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferRef {
    pub sphere: Sphere,
    pub index: usize,
}

impl BufferRef {
    pub const fn new(sphere: Sphere, index: usize) -> Self {
        BufferRef { sphere, index }
    }
    pub const fn input(index: usize) -> Self {
        Self::new(Sphere::Input, index)
    }
    pub const fn output(index: usize) -> Self {
        Self::new(Sphere::Output, index)
    }
    pub const fn data(index: usize) -> Self {
        Self::new(Sphere::Data, index)
    }
    pub const fn side(index: usize) -> Self {
        Self::new(Sphere::Side, index)
    }
}

impl Display for BufferRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.sphere, self.index)
    }
}

/// A program and how many differently-bound copies of it may appear in one plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDescription {
    pub module: ShaderModule,
    pub max_concurrent: usize,
}

/**
Sizes of every buffer, the programs, and the runtime settings of a package.

```
use kernels_and_words::compute::{BufferRef, ExecutionPackageDescription};
let mut description = ExecutionPackageDescription::default();
let sites = description.add_input(4096);
let counts = description.add_output(8 * 1024);
assert_eq!(sites, BufferRef::input(0));
assert_eq!(counts, BufferRef::output(0));
```
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPackageDescription {
    pub input: Vec<u64>,
    pub output: Vec<u64>,
    pub data: Vec<u64>,
    pub side: Vec<u64>,
    /// Bytes moved per staged round trip.  Zero means no staging buffer.
    pub staging: u64,
    pub programs: Vec<ProgramDescription>,
    /// Put data and side buffers in host-visible memory and map them.
    pub device_memory_on_host: bool,
    /// Allow staged host access to side buffers.
    pub side_host_access: bool,
    /// Largest single allocation.  Buffers of one memory type are split across
    /// several allocations to respect it.
    pub max_allocation_size: Option<u64>,
    pub wait_slice: Duration,
    pub wait_attempts: u32,
}

impl Default for ExecutionPackageDescription {
    fn default() -> Self {
        ExecutionPackageDescription {
            input: Vec::new(),
            output: Vec::new(),
            data: Vec::new(),
            side: Vec::new(),
            staging: 64 * 1024,
            programs: Vec::new(),
            device_memory_on_host: false,
            side_host_access: false,
            max_allocation_size: None,
            wait_slice: Duration::from_millis(100),
            wait_attempts: 600,
        }
    }
}

impl ExecutionPackageDescription {
    pub fn sizes(&self, sphere: Sphere) -> &[u64] {
        match sphere {
            Sphere::Input => &self.input,
            Sphere::Output => &self.output,
            Sphere::Data => &self.data,
            Sphere::Side => &self.side,
        }
    }

    fn sizes_mut(&mut self, sphere: Sphere) -> &mut Vec<u64> {
        match sphere {
            Sphere::Input => &mut self.input,
            Sphere::Output => &mut self.output,
            Sphere::Data => &mut self.data,
            Sphere::Side => &mut self.side,
        }
    }

    pub fn add_buffer(&mut self, sphere: Sphere, size: u64) -> BufferRef {
        let sizes = self.sizes_mut(sphere);
        sizes.push(size);
        BufferRef::new(sphere, sizes.len() - 1)
    }

    pub fn add_input(&mut self, size: u64) -> BufferRef {
        self.add_buffer(Sphere::Input, size)
    }
    pub fn add_output(&mut self, size: u64) -> BufferRef {
        self.add_buffer(Sphere::Output, size)
    }
    pub fn add_data(&mut self, size: u64) -> BufferRef {
        self.add_buffer(Sphere::Data, size)
    }
    pub fn add_side(&mut self, size: u64) -> BufferRef {
        self.add_buffer(Sphere::Side, size)
    }

    /// Returns the program's index.
    pub fn add_program(&mut self, module: ShaderModule, max_concurrent: usize) -> usize {
        self.programs.push(ProgramDescription {
            module,
            max_concurrent,
        });
        self.programs.len() - 1
    }

    pub fn total(&self, sphere: Sphere) -> u64 {
        self.sizes(sphere).iter().sum()
    }

    /// Whether some buffer is reached only through the staging buffer.
    pub fn needs_staging(&self) -> bool {
        !self.device_memory_on_host
            && (!self.data.is_empty() || (self.side_host_access && !self.side.is_empty()))
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        for sphere in Sphere::ALL {
            if let Some(index) = self.sizes(sphere).iter().position(|s| *s == 0) {
                return Err(format!("{} has zero size", BufferRef::new(sphere, index)));
            }
        }
        if self.needs_staging() && self.staging == 0 {
            return Err("staged buffers need a staging size".to_string());
        }
        if let Some(program) = self.programs.iter().position(|p| p.max_concurrent == 0) {
            return Err(format!("program {program} allows no concurrent bindings"));
        }
        if self.max_allocation_size == Some(0) {
            return Err("maximum allocation size is zero".to_string());
        }
        if self.wait_attempts == 0 {
            return Err("wait attempts is zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        let mut d = ExecutionPackageDescription::default();
        d.add_input(16);
        assert!(d.validate().is_ok());
        d.add_data(0);
        assert_eq!(d.validate(), Err("data[0] has zero size".to_string()));
        d.data[0] = 32;
        d.staging = 0;
        assert!(d.needs_staging());
        assert!(d.validate().is_err());
        d.device_memory_on_host = true;
        assert!(d.validate().is_ok());
    }

    #[test]
    fn side_buffers_stage_only_on_request() {
        let mut d = ExecutionPackageDescription::default();
        d.add_side(64);
        assert!(!d.needs_staging());
        d.side_host_access = true;
        assert!(d.needs_staging());
        assert_eq!(d.total(Sphere::Side), 64);
        assert_eq!(BufferRef::side(3).to_string(), "side[3]");
    }
}
