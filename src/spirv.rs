// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Binary module emission.

A module is a flat run of 32-bit words: a five word header followed by
instructions, each led by a `(word_count << 16) | opcode` word.  [ModuleBuilder]
appends those words and owns identifier allocation; it knows nothing about what
the program means.  [GlslStd450] adds calls into the standard extended math set.

Validation lives one layer up, in [crate::shader].
*/

mod module_builder;
mod glsl;

pub use glsl::GlslStd450;
pub use module_builder::{Id, Instruction, Instructions, ModuleBuilder};
pub use ::spirv::{
    AddressingModel, BuiltIn, Capability, Decoration, ExecutionMode, ExecutionModel,
    FunctionControl, MemoryModel, Op, StorageClass,
};

/// First word of every module.
pub const MAGIC: u32 = ::spirv::MAGIC_NUMBER;
/// Version word for 1.0 modules.  Compute kernels need nothing later.
pub const VERSION_1_0: u32 = 1 << 16;
