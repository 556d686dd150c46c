// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0

use std::cell::{RefCell, RefMut};
use std::collections::HashMap;

use super::control::Frame;
use super::scalar::{Element, Scalar, ScalarKind};
use super::value::{Arr, Val, ValB, ValD, ValF, ValI, ValL, Var};
use super::{Phase, ShaderError};
use crate::spirv::{
    AddressingModel, BuiltIn, Capability, Decoration, ExecutionMode, ExecutionModel,
    FunctionControl, GlslStd450, Id, MAGIC, MemoryModel, ModuleBuilder, StorageClass,
};

/// A component of the global invocation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Interning key.  Floats are keyed by bit pattern, so distinct NaNs stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum ConstantKey {
    Bool(bool),
    I32(u32),
    I64(u64),
    F32(u32),
    F64(u64),
}

impl ConstantKey {
    pub(super) fn f32(value: f32) -> Self {
        ConstantKey::F32(value.to_bits())
    }
    pub(super) fn f64(value: f64) -> Self {
        ConstantKey::F64(value.to_bits())
    }
}

/// Type ids, all reserved before any instruction is emitted.
///
/// Tables with five entries are indexed by [ScalarKind::index]; the bool entry of
/// the buffer-related tables is unused.
#[derive(Debug)]
pub(super) struct Types {
    pub(super) void: Id,
    pub(super) scalars: [Id; 5],
    arrays: [Id; 5],
    pub(super) uniform_pointers: [Id; 5],
    function_pointers: [Id; 5],
    structs: [Id; 5],
    struct_pointers: [Id; 5],
    main_function: Id,
    ivec3: Id,
    input_int_pointer: Id,
    input_ivec3_pointer: Id,
}

#[derive(Debug)]
pub(super) struct State {
    pub(super) module: ModuleBuilder,
    pub(super) glsl: GlslStd450,
    pub(super) types: Types,
    pub(super) phase: Phase,
    pub(super) frames: Vec<Frame>,
    constants: HashMap<ConstantKey, Id>,
    slots: Vec<Id>,
    registered: Vec<ScalarKind>,
    main: Id,
    global_invocation_id: Id,
    code_started: bool,
    error: Option<ShaderError>,
    group_size: [u32; 3],
}

impl State {
    pub(super) fn scalar_type(&self, kind: ScalarKind) -> Id {
        self.types.scalars[kind.index()]
    }

    /// An already interned constant.  Body code only asks for constants interned by
    /// [ShaderBuilder::constants_done], so a miss means the module is already rejected.
    pub(super) fn interned(&self, key: ConstantKey) -> Id {
        self.constants.get(&key).copied().unwrap_or(Id::inert())
    }

    fn intern(&mut self, key: ConstantKey) -> Id {
        if let Some(id) = self.constants.get(&key) {
            return *id;
        }
        let scalars = self.types.scalars;
        let id = match key {
            ConstantKey::Bool(true) => self
                .module
                .define_constant_true(scalars[ScalarKind::Bool.index()], None),
            ConstantKey::Bool(false) => self
                .module
                .define_constant_false(scalars[ScalarKind::Bool.index()], None),
            ConstantKey::I32(bits) => {
                self.module
                    .define_constant(scalars[ScalarKind::I32.index()], bits, None)
            }
            ConstantKey::F32(bits) => {
                self.module
                    .define_constant(scalars[ScalarKind::F32.index()], bits, None)
            }
            ConstantKey::I64(bits) => {
                self.module
                    .define_constant_wide(scalars[ScalarKind::I64.index()], bits, None)
            }
            ConstantKey::F64(bits) => {
                self.module
                    .define_constant_wide(scalars[ScalarKind::F64.index()], bits, None)
            }
        };
        self.constants.insert(key, id);
        id
    }
}

/**
Builds one compute shader with a `main` entry point.

Methods take `&self`; the builder is interior-mutable so that [Val]s can borrow it
while new code is emitted.  Operator failures are recorded rather than returned, see
[ShaderBuilder::status].
*/
#[derive(Debug)]
pub struct ShaderBuilder {
    pub(super) state: RefCell<State>,
}

impl ShaderBuilder {
    /**
    Starts a module whose workgroups are `group_size` invocations and which binds
    exactly `interface_slots` buffers.

    Declares capabilities, every type the shader can use, and the descriptor
    decorations for each slot; the builder is left in [Phase::Constants].
    */
    pub fn new(group_size: [u32; 3], interface_slots: usize) -> Self {
        let mut m = ModuleBuilder::new();
        let void = m.allocate_id();
        let scalars: [Id; 5] = std::array::from_fn(|_| m.allocate_id());
        fn reserve_elements(m: &mut ModuleBuilder) -> [Id; 5] {
            let mut table = [Id::inert(); 5];
            for kind in ScalarKind::ELEMENTS {
                table[kind.index()] = m.allocate_id();
            }
            table
        }
        let arrays = reserve_elements(&mut m);
        let uniform_pointers = reserve_elements(&mut m);
        let function_pointers: [Id; 5] = std::array::from_fn(|_| m.allocate_id());
        let structs = reserve_elements(&mut m);
        let struct_pointers = reserve_elements(&mut m);
        let types = Types {
            void,
            scalars,
            arrays,
            uniform_pointers,
            function_pointers,
            structs,
            struct_pointers,
            main_function: m.allocate_id(),
            ivec3: m.allocate_id(),
            input_int_pointer: m.allocate_id(),
            input_ivec3_pointer: m.allocate_id(),
        };
        let main = m.allocate_id();
        let global_invocation_id = m.allocate_id();
        let slots: Vec<Id> = (0..interface_slots).map(|_| m.allocate_id()).collect();

        m.emit_capability(Capability::Shader);
        m.emit_capability(Capability::Int64);
        m.emit_capability(Capability::Float64);
        let glsl = GlslStd450::import(&mut m);
        m.emit_memory_model(AddressingModel::Logical, MemoryModel::Simple);
        m.emit_entry_point(
            ExecutionModel::GLCompute,
            main,
            "main",
            &[global_invocation_id],
        );
        m.emit_execution_mode(main, ExecutionMode::LocalSize, &group_size);

        m.emit_decoration(
            global_invocation_id,
            Decoration::BuiltIn,
            &[BuiltIn::GlobalInvocationId as u32],
        );
        for kind in ScalarKind::ELEMENTS {
            m.emit_decoration(
                types.arrays[kind.index()],
                Decoration::ArrayStride,
                &[kind.stride()],
            );
        }
        for kind in ScalarKind::ELEMENTS {
            let s = types.structs[kind.index()];
            m.emit_member_decoration(s, 0, Decoration::Offset, &[0]);
            m.emit_decoration(s, Decoration::BufferBlock, &[]);
        }
        for (binding, slot) in slots.iter().enumerate() {
            m.emit_decoration(*slot, Decoration::DescriptorSet, &[0]);
            m.emit_decoration(*slot, Decoration::Binding, &[binding as u32]);
        }

        m.define_type_void(Some(types.void));
        m.define_type_bool(Some(scalars[ScalarKind::Bool.index()]));
        m.define_type_int(32, false, Some(scalars[ScalarKind::I32.index()]));
        m.define_type_int(64, false, Some(scalars[ScalarKind::I64.index()]));
        m.define_type_float(32, Some(scalars[ScalarKind::F32.index()]));
        m.define_type_float(64, Some(scalars[ScalarKind::F64.index()]));
        for kind in ScalarKind::ELEMENTS {
            let k = kind.index();
            m.define_type_runtime_array(scalars[k], Some(types.arrays[k]));
        }
        for kind in ScalarKind::ELEMENTS {
            let k = kind.index();
            m.define_type_pointer(
                StorageClass::Uniform,
                scalars[k],
                Some(types.uniform_pointers[k]),
            );
        }
        for (k, pointer) in types.function_pointers.iter().enumerate() {
            m.define_type_pointer(StorageClass::Function, scalars[k], Some(*pointer));
        }
        for kind in ScalarKind::ELEMENTS {
            let k = kind.index();
            m.define_type_struct(&[types.arrays[k]], Some(types.structs[k]));
        }
        for kind in ScalarKind::ELEMENTS {
            let k = kind.index();
            m.define_type_pointer(
                StorageClass::Uniform,
                types.structs[k],
                Some(types.struct_pointers[k]),
            );
        }
        m.define_type_function(types.void, &[], Some(types.main_function));
        m.define_type_vector(scalars[ScalarKind::I32.index()], 3, Some(types.ivec3));
        m.define_type_pointer(
            StorageClass::Input,
            scalars[ScalarKind::I32.index()],
            Some(types.input_int_pointer),
        );
        m.define_type_pointer(
            StorageClass::Input,
            types.ivec3,
            Some(types.input_ivec3_pointer),
        );

        let mut state = State {
            module: m,
            glsl,
            types,
            phase: Phase::Constants,
            frames: Vec::new(),
            constants: HashMap::new(),
            slots,
            registered: Vec::with_capacity(interface_slots),
            main,
            global_invocation_id,
            code_started: false,
            error: None,
            group_size,
        };
        state.intern(ConstantKey::Bool(true));
        state.intern(ConstantKey::Bool(false));
        logwise::debuginternal_sync!(
            "shader builder reserved {slots} interface slots",
            slots = interface_slots
        );
        ShaderBuilder {
            state: RefCell::new(state),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    pub fn group_size(&self) -> [u32; 3] {
        self.state.borrow().group_size
    }

    /// Number of interface slots reserved by [ShaderBuilder::new].
    pub fn interface_slots(&self) -> usize {
        self.state.borrow().slots.len()
    }

    /// The first error recorded by an operator, if any.
    ///
    /// Operators cannot return errors, so a bad one (mixing builders, or emitting code
    /// outside the body) is recorded here and produces an inert value.
    pub fn status(&self) -> Result<(), ShaderError> {
        match &self.state.borrow().error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn advance(&self, operation: &'static str, from: Phase) -> Result<RefMut<'_, State>, ShaderError> {
        let st = self.state.borrow_mut();
        if st.phase != from {
            return Err(ShaderError::ConstructionOrder {
                operation,
                phase: st.phase,
            });
        }
        Ok(st)
    }

    // ── constants ───────────────────────────────────────────────────────────

    fn constant(&self, operation: &'static str, key: ConstantKey) -> Result<Id, ShaderError> {
        let mut st = self.state.borrow_mut();
        if let Some(id) = st.constants.get(&key) {
            return Ok(*id);
        }
        if st.phase != Phase::Constants {
            return Err(ShaderError::ConstructionOrder {
                operation,
                phase: st.phase,
            });
        }
        Ok(st.intern(key))
    }

    /**
    Interns a 32-bit integer constant.

    Asking twice for the same value returns the same id.  Once constants are closed,
    values that were already interned can still be looked up; new ones fail.
    */
    pub fn con_i32(&self, value: i32) -> Result<ValI<'_>, ShaderError> {
        self.con_u32(value as u32)
    }

    /// Same bit pattern as [ShaderBuilder::con_i32].
    pub fn con_u32(&self, value: u32) -> Result<ValI<'_>, ShaderError> {
        let id = self.constant("con_i32", ConstantKey::I32(value))?;
        Ok(Val::new(self, id))
    }

    pub fn con_i64(&self, value: i64) -> Result<ValL<'_>, ShaderError> {
        self.con_u64(value as u64)
    }

    pub fn con_u64(&self, value: u64) -> Result<ValL<'_>, ShaderError> {
        let id = self.constant("con_i64", ConstantKey::I64(value))?;
        Ok(Val::new(self, id))
    }

    pub fn con_f32(&self, value: f32) -> Result<ValF<'_>, ShaderError> {
        let id = self.constant("con_f32", ConstantKey::f32(value))?;
        Ok(Val::new(self, id))
    }

    pub fn con_f64(&self, value: f64) -> Result<ValD<'_>, ShaderError> {
        let id = self.constant("con_f64", ConstantKey::f64(value))?;
        Ok(Val::new(self, id))
    }

    /// `true` and `false` always exist.
    pub fn con_bool(&self, value: bool) -> ValB<'_> {
        let id = self.state.borrow().interned(ConstantKey::Bool(value));
        Val::new(self, id)
    }

    /// Closes constant declaration and moves to [Phase::Interface].
    pub fn constants_done(&self) -> Result<(), ShaderError> {
        let mut st = self.advance("constants_done", Phase::Constants)?;
        //needed by indexing and the float guards
        for i in 0..3 {
            st.intern(ConstantKey::I32(i));
        }
        st.intern(ConstantKey::f32(0.0));
        st.intern(ConstantKey::f32(f32::NEG_INFINITY));
        st.intern(ConstantKey::f32(f32::NAN));
        st.intern(ConstantKey::f64(0.0));
        st.intern(ConstantKey::f64(f64::NEG_INFINITY));
        st.intern(ConstantKey::f64(f64::NAN));
        let pointer = st.types.input_ivec3_pointer;
        let gid = st.global_invocation_id;
        st.module
            .define_variable(pointer, StorageClass::Input, Some(gid));
        st.phase = Phase::Interface;
        Ok(())
    }

    // ── interface ───────────────────────────────────────────────────────────

    /// Declares the next interface slot as an array of `T` and returns its index,
    /// which is also its binding number.
    pub fn register_interface<T: Element>(&self) -> Result<usize, ShaderError> {
        let mut st = self.advance("register_interface", Phase::Interface)?;
        let slot = st.registered.len();
        if slot >= st.slots.len() {
            return Err(ShaderError::InterfaceExhausted {
                reserved: st.slots.len(),
            });
        }
        let pointer = st.types.struct_pointers[T::KIND.index()];
        let id = st.slots[slot];
        st.module
            .define_variable(pointer, StorageClass::Uniform, Some(id));
        st.registered.push(T::KIND);
        Ok(slot)
    }

    /// Scalar type of each registered slot, by slot index.
    pub fn registered_interface(&self) -> Vec<ScalarKind> {
        self.state.borrow().registered.clone()
    }

    /// Opens `main` and moves to [Phase::Body].  Every reserved slot must be registered.
    pub fn begin_body(&self) -> Result<(), ShaderError> {
        let mut st = self.advance("begin_body", Phase::Interface)?;
        if st.registered.len() != st.slots.len() {
            return Err(ShaderError::InterfaceIncomplete {
                registered: st.registered.len(),
                reserved: st.slots.len(),
            });
        }
        let (void, function, main) = (st.types.void, st.types.main_function, st.main);
        st.module
            .begin_function(void, FunctionControl::NONE, function, Some(main));
        st.module.label(None);
        st.phase = Phase::Body;
        Ok(())
    }

    /// The array bound to `slot`, which must have been registered as `T`.
    pub fn get_interface_array<T: Element>(&self, slot: usize) -> Result<Arr<'_, T>, ShaderError> {
        let st = self.state.borrow();
        let registered = *st
            .registered
            .get(slot)
            .ok_or(ShaderError::NoSuchInterface { slot })?;
        if registered != T::KIND {
            return Err(ShaderError::TypeMismatch {
                slot,
                registered,
                requested: T::KIND,
            });
        }
        Ok(Arr::new(self, st.slots[slot]))
    }

    // ── body ────────────────────────────────────────────────────────────────

    /// Declares a function-local variable.
    ///
    /// Locals must lead the body: declaring one after any other body code fails.
    pub fn define_variable<T: Scalar>(&self) -> Result<Var<'_, T>, ShaderError> {
        let mut st = self.state.borrow_mut();
        if st.phase != Phase::Body {
            return Err(ShaderError::ConstructionOrder {
                operation: "define_variable",
                phase: st.phase,
            });
        }
        if st.code_started {
            return Err(ShaderError::ConstructionOrder {
                operation: "define_variable after body code",
                phase: st.phase,
            });
        }
        let pointer = st.types.function_pointers[T::KIND.index()];
        let id = st
            .module
            .define_variable(pointer, StorageClass::Function, None);
        Ok(Var::new(self, id))
    }

    /// One component of the invocation's global id.
    pub fn global_invocation_id(&self, axis: Axis) -> ValI<'_> {
        let id = self.emit("global_invocation_id", &[], |st| {
            let index = st.interned(ConstantKey::I32(axis as u32));
            let (pointer, int) = (
                st.types.input_int_pointer,
                st.scalar_type(ScalarKind::I32),
            );
            let gid = st.global_invocation_id;
            let element = st.module.access_chain(pointer, gid, &[index]);
            st.module.load(int, element)
        });
        Val::new(self, id)
    }

    /**
    Runs `body` against the state if an operator may emit code now.

    Otherwise records the first error and returns an inert id.
    */
    pub(super) fn emit(
        &self,
        operation: &'static str,
        operands: &[&ShaderBuilder],
        body: impl FnOnce(&mut State) -> Id,
    ) -> Id {
        let mut st = self.state.borrow_mut();
        if st.error.is_some() {
            return Id::inert();
        }
        if operands.iter().any(|b| !std::ptr::eq(*b, self)) {
            st.error = Some(ShaderError::CrossBuilder);
            return Id::inert();
        }
        if st.phase != Phase::Body {
            let phase = st.phase;
            st.error = Some(ShaderError::ConstructionOrder { operation, phase });
            return Id::inert();
        }
        st.code_started = true;
        body(&mut *st)
    }

    /// Like [ShaderBuilder::emit], but for operations that return `Result`.
    pub(super) fn body_state(
        &self,
        operation: &'static str,
        operands: &[&ShaderBuilder],
    ) -> Result<RefMut<'_, State>, ShaderError> {
        if operands.iter().any(|b| !std::ptr::eq(*b, self)) {
            return Err(ShaderError::CrossBuilder);
        }
        let mut st = self.state.borrow_mut();
        if st.phase != Phase::Body {
            return Err(ShaderError::ConstructionOrder {
                operation,
                phase: st.phase,
            });
        }
        st.code_started = true;
        Ok(st)
    }

    /// Closes `main` and returns the finished module.
    pub fn finish(self) -> Result<ShaderModule, ShaderError> {
        let mut st = self.state.into_inner();
        if let Some(e) = st.error.take() {
            return Err(e);
        }
        if st.phase != Phase::Body {
            return Err(ShaderError::ConstructionOrder {
                operation: "finish",
                phase: st.phase,
            });
        }
        if !st.frames.is_empty() {
            return Err(ShaderError::UnclosedControl {
                open: st.frames.len(),
            });
        }
        st.module.return_void();
        st.module.end_function();
        st.phase = Phase::Closed;
        logwise::debuginternal_sync!(
            "finished shader with bound {bound}",
            bound = st.module.bound()
        );
        Ok(ShaderModule {
            words: st.module.into_words(),
            group_size: st.group_size,
            interface: st.registered,
        })
    }
}

/// A finished compute module and what it binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderModule {
    words: Vec<u32>,
    group_size: [u32; 3],
    interface: Vec<ScalarKind>,
}

impl ShaderModule {
    /// Wraps words produced elsewhere.  `interface` lists the element type of each binding.
    pub fn from_words(words: Vec<u32>, group_size: [u32; 3], interface: Vec<ScalarKind>) -> Self {
        ShaderModule {
            words,
            group_size,
            interface,
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Little-endian bytes, as a driver reads them from disk.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    pub fn group_size(&self) -> [u32; 3] {
        self.group_size
    }

    pub fn interface(&self) -> &[ScalarKind] {
        &self.interface
    }

    pub fn binding_count(&self) -> usize {
        self.interface.len()
    }

    /// Whether the words start like a module.
    pub fn has_magic(&self) -> bool {
        self.words.first() == Some(&MAGIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{F32, F64, I32, I64};
    use crate::spirv::{Instruction, Instructions, Op};

    fn constant_count(words: &[u32], value: u32) -> usize {
        Instructions::of_module(words)
            .filter(|i| i.is(Op::Constant) && i.operands.get(2) == Some(&value))
            .count()
    }

    fn through_body(shader: &ShaderBuilder) {
        shader.constants_done().unwrap();
        for _ in 0..shader.interface_slots() {
            shader.register_interface::<I32>().unwrap();
        }
        shader.begin_body().unwrap();
    }

    #[test]
    fn constants_are_interned() {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        let a = shader.con_i64(5).unwrap();
        let b = shader.con_i64(5).unwrap();
        let c = shader.con_i64(7).unwrap();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        through_body(&shader);
        let module = shader.finish().unwrap();
        assert_eq!(constant_count(module.words(), 5), 1);
        assert_eq!(constant_count(module.words(), 7), 1);
    }

    #[test]
    fn nan_payloads_are_distinct() {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        let quiet = shader.con_f32(f32::from_bits(0x7fc0_0000)).unwrap();
        let other = shader.con_f32(f32::from_bits(0x7fc0_0001)).unwrap();
        assert_ne!(quiet.id(), other.id());
        let again = shader.con_f32(f32::from_bits(0x7fc0_0001)).unwrap();
        assert_eq!(other.id(), again.id());
    }

    #[test]
    fn constants_close() {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        let early = shader.con_i32(12).unwrap();
        shader.constants_done().unwrap();
        assert_eq!(shader.con_i32(12).unwrap().id(), early.id());
        //interned by constants_done
        assert!(shader.con_i32(2).is_ok());
        assert_eq!(
            shader.con_i32(13).unwrap_err(),
            ShaderError::ConstructionOrder {
                operation: "con_i32",
                phase: Phase::Interface
            }
        );
        assert!(matches!(
            shader.constants_done(),
            Err(ShaderError::ConstructionOrder { .. })
        ));
    }

    #[test]
    fn interface_slots() {
        let shader = ShaderBuilder::new([1, 1, 1], 2);
        assert!(matches!(
            shader.register_interface::<I32>(),
            Err(ShaderError::ConstructionOrder { .. })
        ));
        shader.constants_done().unwrap();
        assert_eq!(shader.register_interface::<F64>().unwrap(), 0);
        assert_eq!(
            shader.begin_body(),
            Err(ShaderError::InterfaceIncomplete {
                registered: 1,
                reserved: 2
            })
        );
        assert_eq!(shader.register_interface::<I64>().unwrap(), 1);
        assert_eq!(
            shader.register_interface::<I32>(),
            Err(ShaderError::InterfaceExhausted { reserved: 2 })
        );
        assert_eq!(
            shader.get_interface_array::<F32>(0).unwrap_err(),
            ShaderError::TypeMismatch {
                slot: 0,
                registered: ScalarKind::F64,
                requested: ScalarKind::F32
            }
        );
        assert_eq!(
            shader.get_interface_array::<I64>(2).unwrap_err(),
            ShaderError::NoSuchInterface { slot: 2 }
        );
        assert!(shader.get_interface_array::<I64>(1).is_ok());
        assert_eq!(
            shader.registered_interface(),
            vec![ScalarKind::F64, ScalarKind::I64]
        );
    }

    #[test]
    fn operators_before_body_are_recorded() {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        let a = shader.con_i32(3).unwrap();
        let _ = a + a;
        assert!(matches!(
            shader.status(),
            Err(ShaderError::ConstructionOrder {
                operation: "add",
                phase: Phase::Constants
            })
        ));
    }

    #[test]
    fn cross_builder_operands_are_rejected() {
        let left = ShaderBuilder::new([1, 1, 1], 0);
        let right = ShaderBuilder::new([1, 1, 1], 0);
        let a = left.con_i32(1).unwrap();
        let b = right.con_i32(1).unwrap();
        through_body(&left);
        through_body(&right);
        let _ = a + b;
        assert_eq!(left.status(), Err(ShaderError::CrossBuilder));
        assert!(right.status().is_ok());
        assert_eq!(left.finish().unwrap_err(), ShaderError::CrossBuilder);
    }

    #[test]
    fn locals_lead_the_body() {
        let shader = ShaderBuilder::new([1, 1, 1], 0);
        assert!(shader.define_variable::<I32>().is_err());
        through_body(&shader);
        let v = shader.define_variable::<F32>().unwrap();
        let _ = v.get();
        assert!(matches!(
            shader.define_variable::<I32>(),
            Err(ShaderError::ConstructionOrder { .. })
        ));
    }

    #[test]
    fn finished_module_shape() {
        let shader = ShaderBuilder::new([8, 4, 2], 1);
        through_body(&shader);
        let array = shader.get_interface_array::<I32>(0).unwrap();
        let i = shader.global_invocation_id(Axis::Y);
        array.set(i, array.get(i));
        let module = shader.finish().unwrap();
        assert!(module.has_magic());
        assert_eq!(module.group_size(), [8, 4, 2]);
        assert_eq!(module.binding_count(), 1);
        let words = module.words();
        let instructions: Vec<Instruction<'_>> = Instructions::of_module(words).collect();
        assert!(instructions.last().unwrap().is(Op::FunctionEnd));
        //every result id of a load is below the bound
        for load in instructions.iter().filter(|i| i.is(Op::Load)) {
            assert!(load.operands[1] < words[3]);
        }
        let mode = instructions
            .iter()
            .find(|i| i.is(Op::ExecutionMode))
            .unwrap();
        assert_eq!(&mode.operands[1..], &[17, 8, 4, 2]);
        assert_eq!(module.to_bytes().len(), words.len() * 4);
    }
}
