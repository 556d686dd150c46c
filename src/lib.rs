// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! kernels_and_words builds compute kernels as SPIR-V and runs them on a GPU.

The crate is layered bottom-up:

| Module     | Concern                                                                         |
|------------|---------------------------------------------------------------------------------|
| [spirv]    | Raw SPIR-V words: opcodes, enumerants and a module builder that tracks ids.      |
| [shader]   | Typed, phase-checked kernel construction on top of [spirv].                       |
| [device]   | Device discovery, capability flags, and matching a workload against a device.    |
| [compute]  | Execution packages: buffers, memory, programs, call plans, host I/O.             |
| [sim]      | Simulation kernels assembled from pluggable steps.                               |

# Backends

By default the crate runs against a software backend: simulated devices with configurable
queues, memory and failure points.  It records every submission so tests can check exactly
which copies and barriers were issued.  The software backend does not execute kernels.

With the `backend_vulkan` feature the same API drives a real Vulkan driver through
[ash](https://docs.rs/ash).

# Synchronization

The API is synchronous.  [compute::ExecutionPackage::run] submits and returns; the host then
polls with [compute::ExecutionPackage::wait_program], which waits in bounded slices and
gives up after a configured number of attempts.  A package refuses new work, and host
access to its buffers, while a run is in flight.
*/

pub mod spirv;
pub mod shader;
pub mod device;
pub mod compute;
pub mod sim;
mod imp;

logwise::declare_logging_domain!();
