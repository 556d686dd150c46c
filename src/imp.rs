// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backend selection.
//!
//! Both backends expose the same set of types (`Instance`, `Device`, `Queue`, `Buffer`,
//! `Allocation`, `Program`, `DescriptorSet`, `Lane`, `Error`) with the same methods.
//! The public API wraps them.

use crate::device::AccessFlags;

/// Driver-reported placement constraints of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemoryRequirements {
    pub size: u64,
    pub alignment: u64,
    /// Bit `i` is set when memory type `i` may back the buffer.
    pub type_bits: u32,
}

/// One recorded command.  Backends translate these into their own command buffers.
#[derive(Debug)]
pub(crate) enum Command<'a> {
    Barrier {
        src: AccessFlags,
        dst: AccessFlags,
        buffers: Vec<&'a Buffer>,
    },
    BindPipeline(&'a Program),
    BindDescriptorSet(&'a Program, &'a DescriptorSet),
    Dispatch([u32; 3]),
    CopyBuffer {
        src: &'a Buffer,
        src_offset: u64,
        dst: &'a Buffer,
        dst_offset: u64,
        size: u64,
    },
}

#[cfg(not(feature = "backend_vulkan"))]
mod soft;
#[cfg(not(feature = "backend_vulkan"))]
pub use soft::*;

#[cfg(feature = "backend_vulkan")]
mod vulkan;
#[cfg(feature = "backend_vulkan")]
pub use vulkan::*;
