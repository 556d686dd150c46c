// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Running compute modules on a device.

An [ExecutionPackageDescription] lists buffer sizes per [Sphere] and the programs to load.
[ExecutionPackage::prepare] picks memory and queues on one device and creates everything.
A [CallPlan] is then prepared once against the package and run as often as needed:

```
# #[cfg(not(feature = "backend_vulkan"))] {
use kernels_and_words::compute::*;
use kernels_and_words::device::{Instance, SimulatedDevice};
use kernels_and_words::shader::{Axis, ShaderBuilder, I32};

let shader = ShaderBuilder::new([64, 1, 1], 1);
shader.constants_done().unwrap();
let slot = shader.register_interface::<I32>().unwrap();
shader.begin_body().unwrap();
let values = shader.get_interface_array::<I32>(slot).unwrap();
let i = shader.global_invocation_id(Axis::X);
values.set(i, values.get(i) * values.get(i));
let module = shader.finish().unwrap();

let instance = Instance::simulated(vec![SimulatedDevice::discrete()]);
let mut description = ExecutionPackageDescription::default();
let values = description.add_input(256 * 4);
let square = description.add_program(module, 1);
let mut package = ExecutionPackage::prepare(&instance, 0, &description).unwrap();

let mut plan = CallPlan::new();
plan.add_step(square, &[(values, Access::ReadWrite)], [4, 1, 1]);
let plan = plan.prepare(&mut package).unwrap();
package.run(&plan).unwrap();
package.wait_program().unwrap();
# }
```
*/

mod description;
mod error;
mod layout;
mod package;
mod plan;
pub mod records;
mod stream;

pub use description::{BufferRef, ExecutionPackageDescription, ProgramDescription, Sphere};
pub use error::{
    BufferError, PlanError, PrepareError, ResourceCreationError, RunError, SynchronizationError,
};
pub use package::{ExecutionPackage, HostAccess};
pub use plan::{Access, Barrier, CallPlan, PreparedPlan, PreparedStep};
pub use stream::{BLOCK, BufferReader, BufferWriter};
