// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The `GLSL.std.450` extended instruction set.

use super::module_builder::{Id, ModuleBuilder};

use ::spirv::GLOp;

const EXP: u32 = GLOp::Exp as u32;
const LOG: u32 = GLOp::Log as u32;
const SQRT: u32 = GLOp::Sqrt as u32;

/// A handle to an imported `GLSL.std.450` set.
///
/// Import it once per module, before any function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlslStd450 {
    set: Id,
}

impl GlslStd450 {
    pub const NAME: &'static str = "GLSL.std.450";

    pub fn import(module: &mut ModuleBuilder) -> Self {
        GlslStd450 {
            set: module.emit_ext_inst_import(Self::NAME),
        }
    }

    pub fn set(&self) -> Id {
        self.set
    }

    pub fn exp(&self, module: &mut ModuleBuilder, ty: Id, x: Id) -> Id {
        module.ext_inst(ty, self.set, EXP, &[x])
    }

    /// Natural log.  Undefined for `x <= 0`; callers guard.
    pub fn log(&self, module: &mut ModuleBuilder, ty: Id, x: Id) -> Id {
        module.ext_inst(ty, self.set, LOG, &[x])
    }

    /// Undefined for `x < 0`.
    pub fn sqrt(&self, module: &mut ModuleBuilder, ty: Id, x: Id) -> Id {
        module.ext_inst(ty, self.set, SQRT, &[x])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::Op;

    #[test]
    fn calls_address_the_import() {
        let mut m = ModuleBuilder::new();
        let glsl = GlslStd450::import(&mut m);
        let f = m.define_type_float(32, None);
        let x = m.define_constant(f, 2.0f32.to_bits(), None);
        let r = glsl.sqrt(&mut m, f, x);
        let call = m.instructions().last().unwrap();
        assert!(call.is(Op::ExtInst));
        assert_eq!(call.operands, &[f.get(), r.get(), glsl.set().get(), SQRT, x.get()]);
    }
}
