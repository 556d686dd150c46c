// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Dispatch plans.

A [CallPlan] is an ordered list of steps.  Preparing it against a package resolves
descriptor sets and barriers once, so the [PreparedPlan] can be run many times.

A step that touches a buffer some earlier step in the same plan already touched gets a
barrier, whatever the two access modes are.  The barrier's source mask is the union of
the earlier modes, its destination mask the union of this step's modes.
*/

use std::collections::HashMap;

use super::description::{BufferRef, Sphere};
use super::error::PlanError;
use super::package::ExecutionPackage;
use crate::device::AccessFlags;

/// How a step uses one of its buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn reads(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn writes(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }

    pub fn shader_flags(self) -> AccessFlags {
        let mut flags = AccessFlags::empty();
        if self.reads() {
            flags |= AccessFlags::SHADER_READ;
        }
        if self.writes() {
            flags |= AccessFlags::SHADER_WRITE;
        }
        flags
    }
}

/// A memory barrier over some buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barrier {
    pub src: AccessFlags,
    pub dst: AccessFlags,
    pub buffers: Vec<BufferRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    program: usize,
    bindings: Vec<(BufferRef, Access)>,
    groups: [u32; 3],
}

/// An unresolved list of dispatches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallPlan {
    steps: Vec<Step>,
}

/// What the planner needs to know about each program of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProgramSlots {
    pub bindings: usize,
    pub sets: usize,
}

/// One resolved dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStep {
    program: usize,
    set: usize,
    bindings: Vec<BufferRef>,
    barrier: Option<Barrier>,
    groups: [u32; 3],
}

impl PreparedStep {
    pub fn program(&self) -> usize {
        self.program
    }
    /// Which of the program's descriptor sets this step binds.
    pub fn descriptor_set(&self) -> usize {
        self.set
    }
    /// Buffers in binding order.
    pub fn bindings(&self) -> &[BufferRef] {
        &self.bindings
    }
    /// The barrier recorded before this step, if any.
    pub fn barrier(&self) -> Option<&Barrier> {
        self.barrier.as_ref()
    }
    pub fn groups(&self) -> [u32; 3] {
        self.groups
    }
}

/// A plan bound to one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPlan {
    package: u64,
    steps: Vec<PreparedStep>,
    start: Option<Barrier>,
    end: Option<Barrier>,
}

impl PreparedPlan {
    pub(crate) fn package(&self) -> u64 {
        self.package
    }

    pub fn steps(&self) -> &[PreparedStep] {
        &self.steps
    }

    /// Host writes to input buffers made visible to shaders, before the first step.
    pub fn start_barrier(&self) -> Option<&Barrier> {
        self.start.as_ref()
    }

    /// Shader writes to output buffers made visible to the host, after the last step.
    pub fn end_barrier(&self) -> Option<&Barrier> {
        self.end.as_ref()
    }

    /// Changes a step's group counts without re-planning.
    pub fn set_groups(&mut self, step: usize, groups: [u32; 3]) -> Result<(), PlanError> {
        let s = self.steps.get_mut(step).ok_or(PlanError::NoSuchStep { step })?;
        s.groups = groups;
        Ok(())
    }
}

fn boundary(buffers: Vec<BufferRef>, src: AccessFlags, dst: AccessFlags) -> Option<Barrier> {
    if buffers.is_empty() {
        None
    } else {
        Some(Barrier { src, dst, buffers })
    }
}

impl CallPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a dispatch of `program` and returns its step index.
    ///
    /// `bindings` lists one buffer per interface slot, in slot order.
    pub fn add_step(&mut self, program: usize, bindings: &[(BufferRef, Access)], groups: [u32; 3]) -> usize {
        self.steps.push(Step {
            program,
            bindings: bindings.to_vec(),
            groups,
        });
        self.steps.len() - 1
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Resolves the plan and binds the descriptor sets it uses.
    pub fn prepare(&self, package: &mut ExecutionPackage<'_>) -> Result<PreparedPlan, PlanError> {
        let programs = package.program_slots();
        let (steps, start, end) = self.resolve(&programs, |b| package.contains(b))?;
        package.bind_descriptor_sets(&steps)?;
        Ok(PreparedPlan {
            package: package.id(),
            steps,
            start,
            end,
        })
    }

    pub(crate) fn resolve(
        &self,
        programs: &[ProgramSlots],
        exists: impl Fn(BufferRef) -> bool,
    ) -> Result<(Vec<PreparedStep>, Option<Barrier>, Option<Barrier>), PlanError> {
        let mut assignments: HashMap<(usize, Vec<BufferRef>), usize> = HashMap::new();
        let mut next_set = vec![0usize; programs.len()];
        let mut last_access: HashMap<BufferRef, Access> = HashMap::new();
        let mut inputs: Vec<BufferRef> = Vec::new();
        let mut outputs: Vec<BufferRef> = Vec::new();
        let mut prepared = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let slots = programs.get(step.program).ok_or(PlanError::NoSuchProgram {
                step: index,
                program: step.program,
            })?;
            if step.bindings.len() != slots.bindings {
                return Err(PlanError::BindingCount {
                    step: index,
                    expected: slots.bindings,
                    found: step.bindings.len(),
                });
            }
            if let Some((buffer, _)) = step.bindings.iter().find(|(b, _)| !exists(*b)) {
                return Err(PlanError::NoSuchBuffer {
                    step: index,
                    buffer: *buffer,
                });
            }

            let buffers: Vec<BufferRef> = step.bindings.iter().map(|(b, _)| *b).collect();
            let key = (step.program, buffers.clone());
            let set = match assignments.get(&key) {
                Some(set) => *set,
                None => {
                    let set = next_set[step.program];
                    if set >= slots.sets {
                        return Err(PlanError::DescriptorSetsExhausted {
                            program: step.program,
                            available: slots.sets,
                        });
                    }
                    next_set[step.program] += 1;
                    assignments.insert(key, set);
                    set
                }
            };

            let mut src = AccessFlags::empty();
            let mut dst = AccessFlags::empty();
            let mut touched = Vec::new();
            for (buffer, access) in &step.bindings {
                if let Some(previous) = last_access.get(buffer) {
                    src |= previous.shader_flags();
                    dst |= access.shader_flags();
                    if !touched.contains(buffer) {
                        touched.push(*buffer);
                    }
                }
            }
            for (buffer, access) in &step.bindings {
                last_access.insert(*buffer, *access);
                let boundary_list = match buffer.sphere {
                    Sphere::Input => Some(&mut inputs),
                    Sphere::Output => Some(&mut outputs),
                    _ => None,
                };
                if let Some(list) = boundary_list
                    && !list.contains(buffer)
                {
                    list.push(*buffer);
                }
            }
            let barrier = if touched.is_empty() {
                None
            } else {
                Some(Barrier {
                    src,
                    dst,
                    buffers: touched,
                })
            };
            logwise::debuginternal_sync!(
                "step {index}: program {program} on set {set}, barrier {barrier}",
                index = index,
                program = step.program,
                set = set,
                barrier = logwise::privacy::LogIt(&barrier)
            );
            prepared.push(PreparedStep {
                program: step.program,
                set,
                bindings: buffers,
                barrier,
                groups: step.groups,
            });
        }
        Ok((
            prepared,
            boundary(inputs, AccessFlags::HOST_WRITE, AccessFlags::SHADER_READ),
            boundary(outputs, AccessFlags::SHADER_WRITE, AccessFlags::HOST_READ),
        ))
    }
}
