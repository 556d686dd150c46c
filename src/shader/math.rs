// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Transcendental functions and float classification.
//!
//! The extended set leaves `log` and `sqrt` undefined outside their domains, so
//! results are guarded explicitly: NaN below zero, and negative infinity for `log(0)`.
//! The set only defines `exp` and `log` for 32-bit floats; 64-bit inputs are
//! narrowed, computed, and widened back.

use super::builder::{ConstantKey, State};
use super::scalar::{Float, ScalarKind};
use super::value::Val;
use crate::spirv::Id;

fn zero(st: &State, kind: ScalarKind) -> Id {
    match kind {
        ScalarKind::F64 => st.interned(ConstantKey::f64(0.0)),
        _ => st.interned(ConstantKey::f32(0.0)),
    }
}

fn nan(st: &State, kind: ScalarKind) -> Id {
    match kind {
        ScalarKind::F64 => st.interned(ConstantKey::f64(f64::NAN)),
        _ => st.interned(ConstantKey::f32(f32::NAN)),
    }
}

fn narrow(st: &mut State, x: Id) -> Id {
    let f32_type = st.scalar_type(ScalarKind::F32);
    st.module.float_convert(f32_type, x)
}

fn widen(st: &mut State, x: Id) -> Id {
    let f64_type = st.scalar_type(ScalarKind::F64);
    st.module.float_convert(f64_type, x)
}

/// 32-bit log with both guards.
fn log32(st: &mut State, x: Id) -> Id {
    let ty = st.scalar_type(ScalarKind::F32);
    let b = st.scalar_type(ScalarKind::Bool);
    let zero = zero(st, ScalarKind::F32);
    let nan = nan(st, ScalarKind::F32);
    let neg_inf = st.interned(ConstantKey::f32(f32::NEG_INFINITY));
    let glsl = st.glsl;
    let raw = glsl.log(&mut st.module, ty, x);
    let is_zero = st.module.float_equal(b, x, zero);
    let at_zero = st.module.select(ty, is_zero, neg_inf, raw);
    let negative = st.module.float_less(b, x, zero);
    st.module.select(ty, negative, nan, at_zero)
}

fn exp32(st: &mut State, x: Id) -> Id {
    let ty = st.scalar_type(ScalarKind::F32);
    let glsl = st.glsl;
    glsl.exp(&mut st.module, ty, x)
}

impl<'s, T: Float> Val<'s, T> {
    /// Natural log.  NaN for negative input, negative infinity at zero.
    pub fn log(self) -> Self {
        let x = self.id;
        let id = self.builder.emit("log", &[], |st| match T::KIND {
            ScalarKind::F64 => {
                let narrowed = narrow(st, x);
                let r = log32(st, narrowed);
                widen(st, r)
            }
            _ => log32(st, x),
        });
        Val::new(self.builder, id)
    }

    /// NaN for negative input.
    pub fn sqrt(self) -> Self {
        let x = self.id;
        let id = self.builder.emit("sqrt", &[], |st| {
            let ty = st.scalar_type(T::KIND);
            let b = st.scalar_type(ScalarKind::Bool);
            let zero = zero(st, T::KIND);
            let nan = nan(st, T::KIND);
            let glsl = st.glsl;
            let raw = glsl.sqrt(&mut st.module, ty, x);
            let negative = st.module.float_less(b, x, zero);
            st.module.select(ty, negative, nan, raw)
        });
        Val::new(self.builder, id)
    }

    pub fn exp(self) -> Self {
        let x = self.id;
        let id = self.builder.emit("exp", &[], |st| match T::KIND {
            ScalarKind::F64 => {
                let narrowed = narrow(st, x);
                let r = exp32(st, narrowed);
                widen(st, r)
            }
            _ => exp32(st, x),
        });
        Val::new(self.builder, id)
    }

    pub fn is_nan(self) -> Val<'s, super::Bool> {
        self.unary("is_nan", |m, b, a| m.float_is_nan(b, a))
    }

    /// True for either infinity.
    pub fn is_inf(self) -> Val<'s, super::Bool> {
        self.unary("is_inf", |m, b, a| m.float_is_inf(b, a))
    }
}

#[cfg(test)]
mod tests {
    use crate::shader::{F64, ShaderBuilder};
    use crate::spirv::{GlslStd450, Instructions, Op};

    #[test]
    fn log_is_guarded_by_selects() {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        let x = shader.con_f32(2.0).unwrap();
        shader.constants_done().unwrap();
        shader.begin_body().unwrap();
        let v = shader.define_variable::<crate::shader::F32>().unwrap();
        v.set(x.log());
        let module = shader.finish().unwrap();
        let body: Vec<_> = Instructions::of_module(module.words())
            .skip_while(|i| !i.is(Op::Variable) || i.operands[2] != 7)
            .skip(1)
            .map(|i| i.opcode)
            .collect();
        assert_eq!(
            &body[..6],
            &[
                Op::ExtInst as u16,
                Op::FOrdEqual as u16,
                Op::Select as u16,
                Op::FOrdLessThan as u16,
                Op::Select as u16,
                Op::Store as u16,
            ]
        );
        let neg_inf = Instructions::of_module(module.words())
            .filter(|i| i.is(Op::Constant))
            .any(|i| i.operands[2] == f32::NEG_INFINITY.to_bits());
        assert!(neg_inf);
    }

    #[test]
    fn wide_exp_goes_through_single_precision() {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        let x = shader.con_f64(1.0).unwrap();
        shader.constants_done().unwrap();
        shader.begin_body().unwrap();
        let v = shader.define_variable::<F64>().unwrap();
        v.set(x.exp());
        v.set(x.sqrt());
        let module = shader.finish().unwrap();
        let words = module.words();
        let ops: Vec<u16> = Instructions::of_module(words)
            .skip_while(|i| !i.is(Op::Variable) || i.operands[2] != 7)
            .skip(1)
            .map(|i| i.opcode)
            .collect();
        assert_eq!(
            &ops[..4],
            &[
                Op::FConvert as u16,
                Op::ExtInst as u16,
                Op::FConvert as u16,
                Op::Store as u16
            ]
        );
        //sqrt stays at 64 bits
        let f64_type = Instructions::of_module(words)
            .find(|i| i.is(Op::TypeFloat) && i.operands[1] == 64)
            .unwrap()
            .operands[0];
        let sqrt = Instructions::of_module(words)
            .filter(|i| i.is(Op::ExtInst))
            .nth(1)
            .unwrap();
        assert_eq!(sqrt.operands[0], f64_type);
        assert_eq!(sqrt.operands[3], 31);
        let import = Instructions::of_module(words)
            .find(|i| i.is(Op::ExtInstImport))
            .unwrap();
        assert_eq!(import.operands[1], u32::from_le_bytes(*b"GLSL"));
        assert_eq!(GlslStd450::NAME, "GLSL.std.450");
    }
}
