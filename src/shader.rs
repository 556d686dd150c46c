// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Typed compute shader construction.

[ShaderBuilder] drives a [crate::spirv::ModuleBuilder] through a fixed sequence of phases:

1. [Phase::Constants]: intern scalar constants with [ShaderBuilder::con_i32] and friends.
2. [Phase::Interface]: declare the buffers the program binds with [ShaderBuilder::register_interface].
3. [Phase::Body]: write the `main` function with typed values.
4. [Phase::Closed]: [ShaderBuilder::finish] hands back the [ShaderModule].

Capabilities, types and decorations are declared up front by [ShaderBuilder::new].

Values are [Val]s borrowing the builder.  Arithmetic uses the usual operators; anything whose
meaning depends on signedness has an explicitly named unsigned twin:

```
use kernels_and_words::shader::{ShaderBuilder, I32, I64, Axis};
let shader = ShaderBuilder::new([64, 1, 1], 2);
let one = shader.con_i32(1).unwrap();
shader.constants_done().unwrap();
let input = shader.register_interface::<I64>().unwrap();
let output = shader.register_interface::<I64>().unwrap();
shader.begin_body().unwrap();
let input = shader.get_interface_array::<I64>(input).unwrap();
let output = shader.get_interface_array::<I64>(output).unwrap();
let i = shader.global_invocation_id(Axis::X);
let wide_one = one.convert::<I64>();
output.set(i, input.get(i) + wide_one);
let module = shader.finish().unwrap();
assert_eq!(module.binding_count(), 2);
```
*/

mod scalar;
mod builder;
mod value;
mod control;
mod math;

use std::fmt::{Display, Formatter};

pub use builder::{Axis, ShaderBuilder, ShaderModule};
pub use scalar::{Bool, Element, F32, F64, Float, I32, I64, Integer, Numeric, Scalar, ScalarKind};
pub use value::{Arr, Val, ValB, ValD, ValF, ValI, ValL, Var};

/// Construction phase of a [ShaderBuilder].  Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum Phase {
    Constants,
    Interface,
    Body,
    Closed,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Constants => "declaring constants",
            Phase::Interface => "declaring interface",
            Phase::Body => "building body",
            Phase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Misuse of a [ShaderBuilder].
///
/// These are all programmer errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ShaderError {
    #[error("{operation} is not allowed while {phase}")]
    ConstructionOrder {
        operation: &'static str,
        phase: Phase,
    },
    #[error("all {reserved} interface slots are already registered")]
    InterfaceExhausted { reserved: usize },
    #[error("only {registered} of {reserved} interface slots were registered")]
    InterfaceIncomplete { registered: usize, reserved: usize },
    #[error("interface slot {slot} holds {registered}, not {requested}")]
    TypeMismatch {
        slot: usize,
        registered: ScalarKind,
        requested: ScalarKind,
    },
    #[error("interface slot {slot} was never registered")]
    NoSuchInterface { slot: usize },
    #[error("value belongs to a different shader builder")]
    CrossBuilder,
    #[error("{operation} does not match the innermost open block")]
    UnbalancedControl { operation: &'static str },
    #[error("{open} control blocks are still open")]
    UnclosedControl { open: usize },
}
