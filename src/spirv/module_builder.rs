// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Word-level module assembly.

use super::{
    AddressingModel, Capability, Decoration, ExecutionMode, ExecutionModel, FunctionControl,
    MAGIC, MemoryModel, Op, StorageClass, VERSION_1_0,
};

/// Index of the bound word in the header.
const BOUND_WORD: usize = 3;
const HEADER_LEN: usize = 5;
/// The word count shares the first word with the opcode, so it is 16 bits wide and counts that word too.
const MAX_OPERANDS: usize = 0xFFFF;

/// Names one entity of a module: a type, constant, variable, function, label or result.
///
/// Identifiers are dense and handed out in increasing order by a single [ModuleBuilder].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u32);

impl Id {
    /// Raw word value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// A value that no builder ever issues.  Used for results of rejected operations.
    pub(crate) const fn inert() -> Id {
        Id(0)
    }
}

/**
A linear accumulator of instruction words.

Every method appends; nothing is validated beyond word counts.  Emitting
nonsense produces a nonsense module, which is the caller's problem.

```
use kernels_and_words::spirv::{ModuleBuilder, MAGIC};
let mut m = ModuleBuilder::new();
let first = m.allocate_id();
let second = m.allocate_id();
assert!(second > first);
assert_eq!(m.words()[0], MAGIC);
assert_eq!(m.bound(), second.get() + 1);
```
*/
#[derive(Debug, Clone)]
pub struct ModuleBuilder {
    next_id: u32,
    words: Vec<u32>,
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleBuilder {
    pub fn new() -> Self {
        let next_id = 1;
        //magic, version, generator, bound, schema
        let words = vec![MAGIC, VERSION_1_0, 0, next_id, 0];
        ModuleBuilder { next_id, words }
    }

    /// Issues a fresh identifier and bumps the header bound to cover it.
    pub fn allocate_id(&mut self) -> Id {
        let id = Id(self.next_id);
        self.next_id += 1;
        self.words[BOUND_WORD] = self.next_id;
        id
    }

    /// The header bound: one past the highest identifier issued so far.
    pub fn bound(&self) -> u32 {
        self.words[BOUND_WORD]
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn into_words(self) -> Vec<u32> {
        self.words
    }

    /// Iterates the instructions after the header.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            rest: &self.words[HEADER_LEN..],
        }
    }

    fn take(&mut self, preallocated: Option<Id>) -> Id {
        match preallocated {
            Some(id) => id,
            None => self.allocate_id(),
        }
    }

    fn emit(&mut self, op: Op, operands: &[u32]) {
        debug_assert!(
            operands.len() < MAX_OPERANDS,
            "{op:?} has {} operand words, at most {} fit",
            operands.len(),
            MAX_OPERANDS - 1
        );
        let count = (operands.len() + 1) as u32;
        self.words.push((count << 16) | op as u32);
        self.words.extend_from_slice(operands);
    }

    /// `op result_type result operands...`, the shape of nearly every value-producing instruction.
    fn emit_result(&mut self, op: Op, result_type: Id, operands: &[u32]) -> Id {
        let result = self.allocate_id();
        let mut all = Vec::with_capacity(operands.len() + 2);
        all.push(result_type.0);
        all.push(result.0);
        all.extend_from_slice(operands);
        self.emit(op, &all);
        result
    }

    fn pack_string(text: &str, into: &mut Vec<u32>) {
        //nul terminated, zero padded to a word boundary
        let bytes = text.as_bytes();
        for chunk in bytes.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            into.push(u32::from_le_bytes(word));
        }
        if bytes.len() % 4 == 0 {
            into.push(0);
        }
    }

    // ── module level ───────────────────────────────────────────────────────

    pub fn emit_capability(&mut self, capability: Capability) {
        self.emit(Op::Capability, &[capability as u32]);
    }

    /// Imports an extended instruction set by name and returns the id calls address it by.
    pub fn emit_ext_inst_import(&mut self, name: &str) -> Id {
        let id = self.allocate_id();
        let mut operands = vec![id.0];
        Self::pack_string(name, &mut operands);
        self.emit(Op::ExtInstImport, &operands);
        id
    }

    pub fn emit_memory_model(&mut self, addressing: AddressingModel, memory: MemoryModel) {
        self.emit(Op::MemoryModel, &[addressing as u32, memory as u32]);
    }

    pub fn emit_entry_point(
        &mut self,
        model: ExecutionModel,
        target: Id,
        name: &str,
        interface: &[Id],
    ) {
        let mut operands = vec![model as u32, target.0];
        Self::pack_string(name, &mut operands);
        operands.extend(interface.iter().map(|id| id.0));
        self.emit(Op::EntryPoint, &operands);
    }

    pub fn emit_execution_mode(&mut self, target: Id, mode: ExecutionMode, literals: &[u32]) {
        let mut operands = vec![target.0, mode as u32];
        operands.extend_from_slice(literals);
        self.emit(Op::ExecutionMode, &operands);
    }

    pub fn emit_decoration(&mut self, target: Id, decoration: Decoration, extra: &[u32]) {
        let mut operands = vec![target.0, decoration as u32];
        operands.extend_from_slice(extra);
        self.emit(Op::Decorate, &operands);
    }

    pub fn emit_member_decoration(
        &mut self,
        target: Id,
        member: u32,
        decoration: Decoration,
        extra: &[u32],
    ) {
        let mut operands = vec![target.0, member, decoration as u32];
        operands.extend_from_slice(extra);
        self.emit(Op::MemberDecorate, &operands);
    }

    // ── types ──────────────────────────────────────────────────────────────
    //
    // Each accepts an id allocated earlier so types can be forward-declared.

    pub fn define_type_void(&mut self, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::TypeVoid, &[id.0]);
        id
    }

    pub fn define_type_bool(&mut self, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::TypeBool, &[id.0]);
        id
    }

    pub fn define_type_int(&mut self, width: u32, signed: bool, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::TypeInt, &[id.0, width, signed as u32]);
        id
    }

    pub fn define_type_float(&mut self, width: u32, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::TypeFloat, &[id.0, width]);
        id
    }

    pub fn define_type_vector(&mut self, component: Id, count: u32, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::TypeVector, &[id.0, component.0, count]);
        id
    }

    pub fn define_type_runtime_array(&mut self, element: Id, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::TypeRuntimeArray, &[id.0, element.0]);
        id
    }

    pub fn define_type_struct(&mut self, members: &[Id], id: Option<Id>) -> Id {
        let id = self.take(id);
        let mut operands = vec![id.0];
        operands.extend(members.iter().map(|m| m.0));
        self.emit(Op::TypeStruct, &operands);
        id
    }

    pub fn define_type_pointer(&mut self, storage: StorageClass, pointee: Id, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::TypePointer, &[id.0, storage as u32, pointee.0]);
        id
    }

    pub fn define_type_function(&mut self, returns: Id, parameters: &[Id], id: Option<Id>) -> Id {
        let id = self.take(id);
        let mut operands = vec![id.0, returns.0];
        operands.extend(parameters.iter().map(|p| p.0));
        self.emit(Op::TypeFunction, &operands);
        id
    }

    // ── constants and variables ────────────────────────────────────────────

    pub fn define_constant_true(&mut self, bool_type: Id, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::ConstantTrue, &[bool_type.0, id.0]);
        id
    }

    pub fn define_constant_false(&mut self, bool_type: Id, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::ConstantFalse, &[bool_type.0, id.0]);
        id
    }

    /// A one-word scalar constant (32-bit int or float bit pattern).
    pub fn define_constant(&mut self, ty: Id, value: u32, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::Constant, &[ty.0, id.0, value]);
        id
    }

    /// A two-word scalar constant, low word first.
    pub fn define_constant_wide(&mut self, ty: Id, value: u64, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::Constant, &[ty.0, id.0, value as u32, (value >> 32) as u32]);
        id
    }

    pub fn define_constant_composite(&mut self, ty: Id, parts: &[Id], id: Option<Id>) -> Id {
        let id = self.take(id);
        let mut operands = vec![ty.0, id.0];
        operands.extend(parts.iter().map(|p| p.0));
        self.emit(Op::ConstantComposite, &operands);
        id
    }

    pub fn define_variable(&mut self, pointer_type: Id, storage: StorageClass, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::Variable, &[pointer_type.0, id.0, storage as u32]);
        id
    }

    pub fn define_variable_initialized(
        &mut self,
        pointer_type: Id,
        storage: StorageClass,
        initializer: Id,
        id: Option<Id>,
    ) -> Id {
        let id = self.take(id);
        self.emit(
            Op::Variable,
            &[pointer_type.0, id.0, storage as u32, initializer.0],
        );
        id
    }

    // ── structured control ─────────────────────────────────────────────────

    pub fn begin_function(
        &mut self,
        returns: Id,
        control: FunctionControl,
        function_type: Id,
        id: Option<Id>,
    ) -> Id {
        let id = self.take(id);
        self.emit(
            Op::Function,
            &[returns.0, id.0, control.bits(), function_type.0],
        );
        id
    }

    /// Opens a block.
    pub fn label(&mut self, id: Option<Id>) -> Id {
        let id = self.take(id);
        self.emit(Op::Label, &[id.0]);
        id
    }

    pub fn jump(&mut self, target: Id) {
        self.emit(Op::Branch, &[target.0]);
    }

    pub fn conditional_jump(&mut self, condition: Id, if_true: Id, if_false: Id) {
        self.emit(Op::BranchConditional, &[condition.0, if_true.0, if_false.0]);
    }

    pub fn selection_merge(&mut self, merge: Id) {
        self.emit(Op::SelectionMerge, &[merge.0, 0]);
    }

    pub fn loop_merge(&mut self, merge: Id, continue_target: Id) {
        self.emit(Op::LoopMerge, &[merge.0, continue_target.0, 0]);
    }

    pub fn return_void(&mut self) {
        self.emit(Op::Return, &[]);
    }

    pub fn end_function(&mut self) {
        self.emit(Op::FunctionEnd, &[]);
    }

    // ── memory ─────────────────────────────────────────────────────────────

    pub fn load(&mut self, ty: Id, pointer: Id) -> Id {
        self.emit_result(Op::Load, ty, &[pointer.0])
    }

    pub fn store(&mut self, pointer: Id, value: Id) {
        self.emit(Op::Store, &[pointer.0, value.0]);
    }

    pub fn access_chain(&mut self, pointer_type: Id, base: Id, indices: &[Id]) -> Id {
        let indices: Vec<u32> = indices.iter().map(|i| i.0).collect();
        let mut operands = vec![base.0];
        operands.extend(indices);
        self.emit_result(Op::AccessChain, pointer_type, &operands)
    }

    /// Calls instruction `instruction` of the extended set imported as `set`.
    pub fn ext_inst(&mut self, ty: Id, set: Id, instruction: u32, operands: &[Id]) -> Id {
        let mut all = vec![set.0, instruction];
        all.extend(operands.iter().map(|o| o.0));
        self.emit_result(Op::ExtInst, ty, &all)
    }

    // ── logic ──────────────────────────────────────────────────────────────

    pub fn logical_and(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::LogicalAnd, ty, &[a.0, b.0])
    }

    pub fn logical_or(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::LogicalOr, ty, &[a.0, b.0])
    }

    pub fn logical_not(&mut self, ty: Id, a: Id) -> Id {
        self.emit_result(Op::LogicalNot, ty, &[a.0])
    }

    pub fn select(&mut self, ty: Id, condition: Id, if_true: Id, if_false: Id) -> Id {
        self.emit_result(Op::Select, ty, &[condition.0, if_true.0, if_false.0])
    }

    // ── integers ───────────────────────────────────────────────────────────

    /// Width change between integer types; `signed` picks sign extension.
    pub fn int_convert(&mut self, ty: Id, a: Id, signed: bool) -> Id {
        let op = if signed { Op::SConvert } else { Op::UConvert };
        self.emit_result(op, ty, &[a.0])
    }

    pub fn int_negate(&mut self, ty: Id, a: Id) -> Id {
        self.emit_result(Op::SNegate, ty, &[a.0])
    }

    pub fn int_add(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::IAdd, ty, &[a.0, b.0])
    }

    pub fn int_sub(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::ISub, ty, &[a.0, b.0])
    }

    pub fn int_mul(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::IMul, ty, &[a.0, b.0])
    }

    pub fn int_div(&mut self, ty: Id, a: Id, b: Id, signed: bool) -> Id {
        let op = if signed { Op::SDiv } else { Op::UDiv };
        self.emit_result(op, ty, &[a.0, b.0])
    }

    pub fn int_mod(&mut self, ty: Id, a: Id, b: Id, signed: bool) -> Id {
        let op = if signed { Op::SMod } else { Op::UMod };
        self.emit_result(op, ty, &[a.0, b.0])
    }

    pub fn bitwise_and(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::BitwiseAnd, ty, &[a.0, b.0])
    }

    pub fn bitwise_or(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::BitwiseOr, ty, &[a.0, b.0])
    }

    pub fn bitwise_xor(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::BitwiseXor, ty, &[a.0, b.0])
    }

    pub fn bitwise_not(&mut self, ty: Id, a: Id) -> Id {
        self.emit_result(Op::Not, ty, &[a.0])
    }

    pub fn shift_left(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::ShiftLeftLogical, ty, &[a.0, b.0])
    }

    /// `signed` selects an arithmetic shift.
    pub fn shift_right(&mut self, ty: Id, a: Id, b: Id, signed: bool) -> Id {
        let op = if signed {
            Op::ShiftRightArithmetic
        } else {
            Op::ShiftRightLogical
        };
        self.emit_result(op, ty, &[a.0, b.0])
    }

    pub fn int_equal(&mut self, bool_type: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::IEqual, bool_type, &[a.0, b.0])
    }

    pub fn int_not_equal(&mut self, bool_type: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::INotEqual, bool_type, &[a.0, b.0])
    }

    pub fn int_less(&mut self, bool_type: Id, a: Id, b: Id, signed: bool) -> Id {
        let op = if signed { Op::SLessThan } else { Op::ULessThan };
        self.emit_result(op, bool_type, &[a.0, b.0])
    }

    pub fn int_less_equal(&mut self, bool_type: Id, a: Id, b: Id, signed: bool) -> Id {
        let op = if signed {
            Op::SLessThanEqual
        } else {
            Op::ULessThanEqual
        };
        self.emit_result(op, bool_type, &[a.0, b.0])
    }

    // ── conversions ────────────────────────────────────────────────────────

    pub fn int_to_float(&mut self, ty: Id, a: Id, signed: bool) -> Id {
        let op = if signed { Op::ConvertSToF } else { Op::ConvertUToF };
        self.emit_result(op, ty, &[a.0])
    }

    pub fn float_to_int(&mut self, ty: Id, a: Id, signed: bool) -> Id {
        let op = if signed { Op::ConvertFToS } else { Op::ConvertFToU };
        self.emit_result(op, ty, &[a.0])
    }

    pub fn float_convert(&mut self, ty: Id, a: Id) -> Id {
        self.emit_result(Op::FConvert, ty, &[a.0])
    }

    // ── floats ─────────────────────────────────────────────────────────────

    pub fn float_negate(&mut self, ty: Id, a: Id) -> Id {
        self.emit_result(Op::FNegate, ty, &[a.0])
    }

    pub fn float_add(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::FAdd, ty, &[a.0, b.0])
    }

    pub fn float_sub(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::FSub, ty, &[a.0, b.0])
    }

    pub fn float_mul(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::FMul, ty, &[a.0, b.0])
    }

    pub fn float_div(&mut self, ty: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::FDiv, ty, &[a.0, b.0])
    }

    pub fn float_is_nan(&mut self, bool_type: Id, a: Id) -> Id {
        self.emit_result(Op::IsNan, bool_type, &[a.0])
    }

    pub fn float_is_inf(&mut self, bool_type: Id, a: Id) -> Id {
        self.emit_result(Op::IsInf, bool_type, &[a.0])
    }

    pub fn float_equal(&mut self, bool_type: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::FOrdEqual, bool_type, &[a.0, b.0])
    }

    /// Unordered, so NaN compares unequal to everything.
    pub fn float_not_equal(&mut self, bool_type: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::FUnordNotEqual, bool_type, &[a.0, b.0])
    }

    pub fn float_less(&mut self, bool_type: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::FOrdLessThan, bool_type, &[a.0, b.0])
    }

    pub fn float_less_equal(&mut self, bool_type: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::FOrdLessThanEqual, bool_type, &[a.0, b.0])
    }

    pub fn float_greater(&mut self, bool_type: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::FOrdGreaterThan, bool_type, &[a.0, b.0])
    }

    pub fn float_greater_equal(&mut self, bool_type: Id, a: Id, b: Id) -> Id {
        self.emit_result(Op::FOrdGreaterThanEqual, bool_type, &[a.0, b.0])
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub opcode: u16,
    pub operands: &'a [u32],
}

impl Instruction<'_> {
    pub fn is(&self, op: Op) -> bool {
        self.opcode == op as u16
    }
}

/// Walks the instructions of a module.  Stops early on a malformed length word.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    rest: &'a [u32],
}

impl<'a> Instructions<'a> {
    /// Iterates a finished module, skipping its header.
    pub fn of_module(words: &'a [u32]) -> Self {
        Instructions {
            rest: words.get(HEADER_LEN..).unwrap_or(&[]),
        }
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Instruction<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let head = *self.rest.first()?;
        let count = (head >> 16) as usize;
        if count == 0 || count > self.rest.len() {
            self.rest = &[];
            return None;
        }
        let (this, rest) = self.rest.split_at(count);
        self.rest = rest;
        Some(Instruction {
            opcode: (head & 0xFFFF) as u16,
            operands: &this[1..],
        })
    }
}
