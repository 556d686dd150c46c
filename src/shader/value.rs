// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Typed values, local variables and interface arrays.

use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Neg, Not, Rem, Shl, Shr, Sub};

use super::builder::{ConstantKey, ShaderBuilder};
use super::scalar::{Bool, Element, F32, F64, I32, I64, Integer, Numeric, Scalar};
use crate::spirv::{Id, ModuleBuilder};

/**
The result of an operation, typed by its scalar.

Values are cheap handles.  They cannot be stored; write them into a [Var] instead.
*/
pub struct Val<'s, T> {
    pub(super) builder: &'s ShaderBuilder,
    pub(super) id: Id,
    scalar: PhantomData<T>,
}

pub type ValB<'s> = Val<'s, Bool>;
pub type ValI<'s> = Val<'s, I32>;
pub type ValL<'s> = Val<'s, I64>;
pub type ValF<'s> = Val<'s, F32>;
pub type ValD<'s> = Val<'s, F64>;

impl<T> Clone for Val<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Val<'_, T> {}

impl<T: Scalar> Debug for Val<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Val<{}>(%{})", T::KIND, self.id.get())
    }
}

impl<'s, T: Scalar> Val<'s, T> {
    pub(super) fn new(builder: &'s ShaderBuilder, id: Id) -> Self {
        Val {
            builder,
            id,
            scalar: PhantomData,
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub(super) fn unary<U: Scalar>(
        self,
        operation: &'static str,
        f: impl FnOnce(&mut ModuleBuilder, Id, Id) -> Id,
    ) -> Val<'s, U> {
        let a = self.id;
        let id = self.builder.emit(operation, &[], |st| {
            let ty = st.scalar_type(U::KIND);
            f(&mut st.module, ty, a)
        });
        Val::new(self.builder, id)
    }

    pub(super) fn binary<U: Scalar>(
        self,
        rhs: Val<'s, T>,
        operation: &'static str,
        f: impl FnOnce(&mut ModuleBuilder, Id, Id, Id) -> Id,
    ) -> Val<'s, U> {
        let (a, b) = (self.id, rhs.id);
        let id = self.builder.emit(operation, &[rhs.builder], |st| {
            let ty = st.scalar_type(U::KIND);
            f(&mut st.module, ty, a, b)
        });
        Val::new(self.builder, id)
    }
}

macro_rules! numeric_op {
    ($trait:ident, $method:ident, $int:ident, $float:ident) => {
        impl<'s, T: Numeric> $trait for Val<'s, T> {
            type Output = Val<'s, T>;
            fn $method(self, rhs: Self) -> Self {
                self.binary(rhs, stringify!($method), |m, ty, a, b| {
                    if T::KIND.is_float() {
                        m.$float(ty, a, b)
                    } else {
                        m.$int(ty, a, b)
                    }
                })
            }
        }
    };
}

numeric_op!(Add, add, int_add, float_add);
numeric_op!(Sub, sub, int_sub, float_sub);
numeric_op!(Mul, mul, int_mul, float_mul);

/// Signed division for integers.  See [Val::udiv].
impl<'s, T: Numeric> Div for Val<'s, T> {
    type Output = Val<'s, T>;
    fn div(self, rhs: Self) -> Self {
        self.binary(rhs, "div", |m, ty, a, b| {
            if T::KIND.is_float() {
                m.float_div(ty, a, b)
            } else {
                m.int_div(ty, a, b, true)
            }
        })
    }
}

impl<'s, T: Numeric> Neg for Val<'s, T> {
    type Output = Val<'s, T>;
    fn neg(self) -> Self {
        self.unary("neg", |m, ty, a| {
            if T::KIND.is_float() {
                m.float_negate(ty, a)
            } else {
                m.int_negate(ty, a)
            }
        })
    }
}

impl<'s, T: Numeric> Val<'s, T> {
    fn compare(
        self,
        rhs: Self,
        operation: &'static str,
        f: impl FnOnce(&mut ModuleBuilder, Id, Id, Id) -> Id,
    ) -> Val<'s, Bool> {
        self.binary(rhs, operation, f)
    }

    /// Signed for integers, ordered for floats.
    pub fn less(self, rhs: Self) -> Val<'s, Bool> {
        self.compare(rhs, "less", |m, b, x, y| {
            if T::KIND.is_float() {
                m.float_less(b, x, y)
            } else {
                m.int_less(b, x, y, true)
            }
        })
    }

    pub fn less_eq(self, rhs: Self) -> Val<'s, Bool> {
        self.compare(rhs, "less_eq", |m, b, x, y| {
            if T::KIND.is_float() {
                m.float_less_equal(b, x, y)
            } else {
                m.int_less_equal(b, x, y, true)
            }
        })
    }

    pub fn greater(self, rhs: Self) -> Val<'s, Bool> {
        self.compare(rhs, "greater", |m, b, x, y| {
            if T::KIND.is_float() {
                m.float_greater(b, x, y)
            } else {
                m.int_less(b, y, x, true)
            }
        })
    }

    pub fn greater_eq(self, rhs: Self) -> Val<'s, Bool> {
        self.compare(rhs, "greater_eq", |m, b, x, y| {
            if T::KIND.is_float() {
                m.float_greater_equal(b, x, y)
            } else {
                m.int_less_equal(b, y, x, true)
            }
        })
    }

    pub fn equal(self, rhs: Self) -> Val<'s, Bool> {
        self.compare(rhs, "equal", |m, b, x, y| {
            if T::KIND.is_float() {
                m.float_equal(b, x, y)
            } else {
                m.int_equal(b, x, y)
            }
        })
    }

    /// For floats, true when either side is NaN.
    pub fn not_equal(self, rhs: Self) -> Val<'s, Bool> {
        self.compare(rhs, "not_equal", |m, b, x, y| {
            if T::KIND.is_float() {
                m.float_not_equal(b, x, y)
            } else {
                m.int_not_equal(b, x, y)
            }
        })
    }

    /**
    Value-preserving conversion: sign-extends integers and treats them as signed
    when moving to or from floats.
    */
    pub fn convert<U: Numeric>(self) -> Val<'s, U> {
        self.conversion(true)
    }

    /// Zero-extends integers and treats them as unsigned when moving to or from floats.
    pub fn convert_unsigned<U: Numeric>(self) -> Val<'s, U> {
        self.conversion(false)
    }

    fn conversion<U: Numeric>(self, signed: bool) -> Val<'s, U> {
        let (from, to) = (T::KIND, U::KIND);
        if from == to {
            return Val::new(self.builder, self.id);
        }
        self.unary("convert", |m, ty, a| {
            match (from.is_float(), to.is_float()) {
                (false, false) => m.int_convert(ty, a, signed),
                (false, true) => m.int_to_float(ty, a, signed),
                (true, false) => m.float_to_int(ty, a, signed),
                (true, true) => m.float_convert(ty, a),
            }
        })
    }
}

/// Signed remainder.  See [Val::umod].
impl<'s, T: Integer> Rem for Val<'s, T> {
    type Output = Val<'s, T>;
    fn rem(self, rhs: Self) -> Self {
        self.binary(rhs, "rem", |m, ty, a, b| m.int_mod(ty, a, b, true))
    }
}

impl<'s, T: Integer> Shl for Val<'s, T> {
    type Output = Val<'s, T>;
    fn shl(self, rhs: Self) -> Self {
        self.binary(rhs, "shl", |m, ty, a, b| m.shift_left(ty, a, b))
    }
}

/// Arithmetic shift.  See [Val::ushr].
impl<'s, T: Integer> Shr for Val<'s, T> {
    type Output = Val<'s, T>;
    fn shr(self, rhs: Self) -> Self {
        self.binary(rhs, "shr", |m, ty, a, b| m.shift_right(ty, a, b, true))
    }
}

impl<'s, T: Integer> BitAnd for Val<'s, T> {
    type Output = Val<'s, T>;
    fn bitand(self, rhs: Self) -> Self {
        self.binary(rhs, "bitand", |m, ty, a, b| m.bitwise_and(ty, a, b))
    }
}

impl<'s, T: Integer> BitOr for Val<'s, T> {
    type Output = Val<'s, T>;
    fn bitor(self, rhs: Self) -> Self {
        self.binary(rhs, "bitor", |m, ty, a, b| m.bitwise_or(ty, a, b))
    }
}

impl<'s, T: Integer> BitXor for Val<'s, T> {
    type Output = Val<'s, T>;
    fn bitxor(self, rhs: Self) -> Self {
        self.binary(rhs, "bitxor", |m, ty, a, b| m.bitwise_xor(ty, a, b))
    }
}

impl<'s, T: Integer> Not for Val<'s, T> {
    type Output = Val<'s, T>;
    fn not(self) -> Self {
        self.unary("not", |m, ty, a| m.bitwise_not(ty, a))
    }
}

impl<'s, T: Integer> Val<'s, T> {
    pub fn udiv(self, rhs: Self) -> Self {
        self.binary(rhs, "udiv", |m, ty, a, b| m.int_div(ty, a, b, false))
    }

    pub fn umod(self, rhs: Self) -> Self {
        self.binary(rhs, "umod", |m, ty, a, b| m.int_mod(ty, a, b, false))
    }

    /// Logical shift.
    pub fn ushr(self, rhs: Self) -> Self {
        self.binary(rhs, "ushr", |m, ty, a, b| m.shift_right(ty, a, b, false))
    }

    pub fn uless(self, rhs: Self) -> Val<'s, Bool> {
        self.binary(rhs, "uless", |m, b, x, y| m.int_less(b, x, y, false))
    }

    pub fn uless_eq(self, rhs: Self) -> Val<'s, Bool> {
        self.binary(rhs, "uless_eq", |m, b, x, y| m.int_less_equal(b, x, y, false))
    }

    pub fn ugreater(self, rhs: Self) -> Val<'s, Bool> {
        self.binary(rhs, "ugreater", |m, b, x, y| m.int_less(b, y, x, false))
    }

    pub fn ugreater_eq(self, rhs: Self) -> Val<'s, Bool> {
        self.binary(rhs, "ugreater_eq", |m, b, x, y| {
            m.int_less_equal(b, y, x, false)
        })
    }
}

// Logical operators on booleans.

impl<'s> Not for Val<'s, Bool> {
    type Output = Val<'s, Bool>;
    fn not(self) -> Self {
        self.unary("not", |m, ty, a| m.logical_not(ty, a))
    }
}

impl<'s> BitAnd for Val<'s, Bool> {
    type Output = Val<'s, Bool>;
    fn bitand(self, rhs: Self) -> Self {
        self.binary(rhs, "and", |m, ty, a, b| m.logical_and(ty, a, b))
    }
}

impl<'s> BitOr for Val<'s, Bool> {
    type Output = Val<'s, Bool>;
    fn bitor(self, rhs: Self) -> Self {
        self.binary(rhs, "or", |m, ty, a, b| m.logical_or(ty, a, b))
    }
}

impl<'s> Val<'s, Bool> {
    /// `if self { if_true } else { if_false }`, without branching.
    pub fn select<T: Scalar>(self, if_true: Val<'s, T>, if_false: Val<'s, T>) -> Val<'s, T> {
        let (c, t, f) = (self.id, if_true.id, if_false.id);
        let id = self
            .builder
            .emit("select", &[if_true.builder, if_false.builder], |st| {
                let ty = st.scalar_type(T::KIND);
                st.module.select(ty, c, t, f)
            });
        Val::new(self.builder, id)
    }
}

/// A function-local variable.
pub struct Var<'s, T> {
    builder: &'s ShaderBuilder,
    pointer: Id,
    scalar: PhantomData<T>,
}

impl<T> Clone for Var<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Var<'_, T> {}

impl<T: Scalar> Debug for Var<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Var<{}>(%{})", T::KIND, self.pointer.get())
    }
}

impl<'s, T: Scalar> Var<'s, T> {
    pub(super) fn new(builder: &'s ShaderBuilder, pointer: Id) -> Self {
        Var {
            builder,
            pointer,
            scalar: PhantomData,
        }
    }

    /// Loads the current contents as a fresh value.
    pub fn get(&self) -> Val<'s, T> {
        let pointer = self.pointer;
        let id = self.builder.emit("variable get", &[], |st| {
            let ty = st.scalar_type(T::KIND);
            st.module.load(ty, pointer)
        });
        Val::new(self.builder, id)
    }

    pub fn set(&self, value: Val<'s, T>) {
        let (pointer, value_id) = (self.pointer, value.id);
        self.builder.emit("variable set", &[value.builder], |st| {
            st.module.store(pointer, value_id);
            Id::inert()
        });
    }
}

/**
An interface array: a runtime-sized array of `T` backed by the buffer bound at its slot.

Indices may be either integer width and are taken as signed.
*/
pub struct Arr<'s, T> {
    builder: &'s ShaderBuilder,
    variable: Id,
    scalar: PhantomData<T>,
}

impl<T> Clone for Arr<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Arr<'_, T> {}

impl<T: Scalar> Debug for Arr<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Arr<{}>(%{})", T::KIND, self.variable.get())
    }
}

impl<'s, T: Element> Arr<'s, T> {
    pub(super) fn new(builder: &'s ShaderBuilder, variable: Id) -> Self {
        Arr {
            builder,
            variable,
            scalar: PhantomData,
        }
    }

    fn element(st: &mut super::builder::State, variable: Id, index: Id) -> Id {
        let zero = st.interned(ConstantKey::I32(0));
        let pointer = st.types.uniform_pointers[T::KIND.index()];
        st.module.access_chain(pointer, variable, &[zero, index])
    }

    pub fn get<I: Integer>(&self, index: Val<'s, I>) -> Val<'s, T> {
        let (variable, index_id) = (self.variable, index.id);
        let id = self.builder.emit("array get", &[index.builder], |st| {
            let element = Self::element(st, variable, index_id);
            let ty = st.scalar_type(T::KIND);
            st.module.load(ty, element)
        });
        Val::new(self.builder, id)
    }

    pub fn set<I: Integer>(&self, index: Val<'s, I>, value: Val<'s, T>) {
        let (variable, index_id, value_id) = (self.variable, index.id, value.id);
        self.builder
            .emit("array set", &[index.builder, value.builder], |st| {
                let element = Self::element(st, variable, index_id);
                st.module.store(element, value_id);
                Id::inert()
            });
    }
}

#[cfg(test)]
mod tests {
    use crate::shader::{Axis, ShaderBuilder, I32, I64, F32, F64};
    use crate::spirv::{Instructions, Op};

    fn opcodes_after_label(words: &[u32]) -> Vec<u16> {
        Instructions::of_module(words)
            .skip_while(|i| !i.is(Op::Label))
            .skip(1)
            .map(|i| i.opcode)
            .collect()
    }

    #[test]
    fn signed_and_unsigned_are_distinct_opcodes() {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        let a = shader.con_i32(-7).unwrap();
        let b = shader.con_i32(2).unwrap();
        shader.constants_done().unwrap();
        shader.begin_body().unwrap();
        let _ = a / b;
        let _ = a.udiv(b);
        let _ = a % b;
        let _ = a.umod(b);
        let _ = a >> b;
        let _ = a.ushr(b);
        let _ = a.greater(b);
        let _ = a.ugreater(b);
        let module = shader.finish().unwrap();
        assert_eq!(
            opcodes_after_label(module.words()),
            vec![
                Op::SDiv as u16,
                Op::UDiv as u16,
                Op::SMod as u16,
                Op::UMod as u16,
                Op::ShiftRightArithmetic as u16,
                Op::ShiftRightLogical as u16,
                Op::SLessThan as u16,
                Op::ULessThan as u16,
                Op::Return as u16,
                Op::FunctionEnd as u16,
            ]
        );
    }

    #[test]
    fn greater_swaps_operands() {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        let a = shader.con_i64(1).unwrap();
        let b = shader.con_i64(2).unwrap();
        shader.constants_done().unwrap();
        shader.begin_body().unwrap();
        let _ = a.greater_eq(b);
        let (a, b) = (a.id().get(), b.id().get());
        let module = shader.finish().unwrap();
        let compare = Instructions::of_module(module.words())
            .find(|i| i.is(Op::SLessThanEqual))
            .unwrap();
        assert_eq!(&compare.operands[2..], &[b, a]);
    }

    #[test]
    fn conversions() {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        let i = shader.con_i32(3).unwrap();
        let f = shader.con_f32(1.5).unwrap();
        shader.constants_done().unwrap();
        shader.begin_body().unwrap();
        let same = i.convert::<I32>();
        assert_eq!(same.id(), i.id());
        let _ = i.convert::<I64>();
        let _ = i.convert_unsigned::<I64>();
        let _ = i.convert::<F64>();
        let _ = i.convert_unsigned::<F32>();
        let _ = f.convert::<I32>();
        let _ = f.convert_unsigned::<I64>();
        let _ = f.convert::<F64>();
        let module = shader.finish().unwrap();
        assert_eq!(
            opcodes_after_label(module.words()),
            vec![
                Op::SConvert as u16,
                Op::UConvert as u16,
                Op::ConvertSToF as u16,
                Op::ConvertUToF as u16,
                Op::ConvertFToS as u16,
                Op::ConvertFToU as u16,
                Op::FConvert as u16,
                Op::Return as u16,
                Op::FunctionEnd as u16,
            ]
        );
    }

    #[test]
    fn int64_array_access_uses_the_int64_pointer() {
        let shader = ShaderBuilder::new([64, 1, 1], 1);
        shader.constants_done().unwrap();
        let slot = shader.register_interface::<I64>().unwrap();
        shader.begin_body().unwrap();
        let array = shader.get_interface_array::<I64>(slot).unwrap();
        let i = shader.global_invocation_id(Axis::X);
        let value = array.get(i);
        array.set(i, value);
        let module = shader.finish().unwrap();
        let words = module.words();
        let loads: Vec<_> = Instructions::of_module(words)
            .filter(|i| i.is(Op::Load))
            .collect();
        //invocation id, then the element
        assert_eq!(loads.len(), 2);
        let int64 = Instructions::of_module(words)
            .find(|i| i.is(Op::TypeInt) && i.operands[1] == 64)
            .unwrap()
            .operands[0];
        assert_eq!(loads[1].operands[0], int64);
        let store = Instructions::of_module(words)
            .find(|i| i.is(Op::Store))
            .unwrap();
        assert_eq!(store.operands[1], loads[1].operands[1]);
    }

    #[test]
    fn logical_operators_on_bools() {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        shader.constants_done().unwrap();
        shader.begin_body().unwrap();
        let t = shader.con_bool(true);
        let f = shader.con_bool(false);
        let v = shader.define_variable::<crate::shader::Bool>().unwrap();
        v.set(!(t & f) | f);
        let module = shader.finish().unwrap();
        let ops = opcodes_after_label(module.words());
        assert_eq!(
            &ops[..5],
            &[
                Op::Variable as u16,
                Op::LogicalAnd as u16,
                Op::LogicalNot as u16,
                Op::LogicalOr as u16,
                Op::Store as u16
            ]
        );
    }
}
