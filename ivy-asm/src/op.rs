//! Instruction encoders.
//!
//! One constructor per opcode, producing the exact word layout the
//! interpreter decodes. The emitter and the VM's own tests assemble
//! programs from these instead of hand-writing word arrays.

use crate::{ClassId, Opcode, Word};

macro_rules! fixed_op {
    (
        $(
            $(#[$attr:meta])*
            $fname:ident($($operand:ident),*) => $opcode:ident
        );* $(;)?
    ) => {
        $(
            $(#[$attr])*
            pub fn $fname(line: Word $(, $operand: Word)*) -> [Word; 2 + fixed_op!(@count $($operand)*)] {
                [Opcode::$opcode as Word, line $(, $operand)*]
            }
        )*
    };
    (@count) => { 0 };
    (@count $head:ident $($tail:ident)*) => { 1 + fixed_op!(@count $($tail)*) };
}

fixed_op! {
    /// Copy `src` into `dst` without refcount bookkeeping.
    fast_assign(src, dst) => FastAssign;
    /// Copy `src` into `dst`.
    assign(src, dst) => Assign;
    /// Load readonly-table entry `idx` into `dst`.
    get_readonly(idx, dst) => GetReadonly;
    /// Load a boolean literal into `dst`.
    get_boolean(imm, dst) => GetBoolean;
    /// Load a byte literal into `dst`.
    get_byte(imm, dst) => GetByte;
    /// Load an empty variant of `class_id` into `dst`.
    get_empty_variant(class_id, dst) => GetEmptyVariant;
    /// Copy toplevel register `global` into `dst`.
    get_global(global, dst) => GetGlobal;
    /// Copy `src` into toplevel register `global`.
    set_global(src, global) => SetGlobal;
    /// `dst = lhs + rhs` (wrapping).
    integer_add(lhs, rhs, dst) => IntegerAdd;
    /// `dst = lhs - rhs` (wrapping).
    integer_minus(lhs, rhs, dst) => IntegerMinus;
    /// `dst = lhs * rhs` (wrapping).
    integer_mul(lhs, rhs, dst) => IntegerMul;
    /// `dst = lhs / rhs`, truncated toward zero.
    integer_div(lhs, rhs, dst) => IntegerDiv;
    /// `dst = lhs % rhs`, truncated toward zero.
    integer_modulo(lhs, rhs, dst) => IntegerModulo;
    /// `dst = lhs << rhs`.
    integer_shl(lhs, rhs, dst) => IntegerShl;
    /// `dst = lhs >> rhs`.
    integer_shr(lhs, rhs, dst) => IntegerShr;
    /// `dst = lhs & rhs`.
    integer_and(lhs, rhs, dst) => IntegerAnd;
    /// `dst = lhs | rhs`.
    integer_or(lhs, rhs, dst) => IntegerOr;
    /// `dst = lhs ^ rhs`.
    integer_xor(lhs, rhs, dst) => IntegerXor;
    /// `dst = lhs + rhs` on doubles.
    double_add(lhs, rhs, dst) => DoubleAdd;
    /// `dst = lhs - rhs` on doubles.
    double_minus(lhs, rhs, dst) => DoubleMinus;
    /// `dst = lhs * rhs` on doubles.
    double_mul(lhs, rhs, dst) => DoubleMul;
    /// `dst = lhs / rhs` on doubles.
    double_div(lhs, rhs, dst) => DoubleDiv;
    /// `dst = !src`.
    unary_not(src, dst) => UnaryNot;
    /// `dst = -src`.
    unary_minus(src, dst) => UnaryMinus;
    /// `dst = lhs < rhs`.
    less(lhs, rhs, dst) => Less;
    /// `dst = lhs <= rhs`.
    less_eq(lhs, rhs, dst) => LessEq;
    /// `dst = lhs > rhs`.
    greater(lhs, rhs, dst) => Greater;
    /// `dst = lhs >= rhs`.
    greater_eq(lhs, rhs, dst) => GreaterEq;
    /// `dst = lhs == rhs`, structural.
    is_equal(lhs, rhs, dst) => IsEqual;
    /// `dst = lhs != rhs`, structural.
    not_eq(lhs, rhs, dst) => NotEq;
    /// Read `source[index]` into `dst`.
    get_item(source, index, dst) => GetItem;
    /// Write `src` into `target[index]`.
    set_item(target, index, src) => SetItem;
    /// Read property slot `prop` of `source` into `dst`.
    get_property(prop, source, dst) => GetProperty;
    /// Write `src` into property slot `prop` of `target`.
    set_property(prop, target, src) => SetProperty;
    /// `Some(inner)` into `dst` when the Dynamic `src` holds a `class_id`.
    dynamic_cast(class_id, src, dst) => DynamicCast;
    /// Return `unit` to the caller.
    return_unit() => ReturnUnit;
    /// Return `src` to the caller.
    return_val(src) => ReturnVal;
    /// Create the bottom-level closure with `count` cells in `dst`.
    create_closure(count, dst) => CreateClosure;
    /// Fetch a class method's closure from property `prop` of `source`.
    load_class_closure(prop, source, dst) => LoadClassClosure;
    /// Copy prototype `proto_idx`, pulling cells from `closure_src`.
    create_function(closure_src, proto_idx, dst) => CreateFunction;
    /// Read upvalue `cell` into `dst`.
    get_upvalue(cell, dst) => GetUpvalue;
    /// Write `src` into upvalue `cell`.
    set_upvalue(cell, src) => SetUpvalue;
    /// Prime an integer for loop.
    for_setup(start, stop, step, loop_) => ForSetup;
    /// Leave a try block.
    pop_try() => PopTry;
    /// Raise the exception instance in `src`.
    raise(src) => Raise;
    /// Construct a plain instance of `class_id` in `dst`.
    new_instance_basic(class_id, dst) => NewInstanceBasic;
    /// Construct a speculative instance of `class_id` in `dst`.
    new_instance_speculative(class_id, dst) => NewInstanceSpeculative;
    /// Construct and gc-tag an instance of `class_id` in `dst`.
    new_instance_tagged(class_id, dst) => NewInstanceTagged;
    /// Release the current interpreter activation.
    return_from_vm() => ReturnFromVm;
}

/// Load a sign-extended integer literal into `dst`.
pub fn get_integer(line: Word, imm: i16, dst: Word) -> [Word; 4] {
    [Opcode::GetInteger as Word, line, imm as Word, dst]
}

/// Unconditional relative jump.
pub fn jump(line: Word, offset: i16) -> [Word; 3] {
    [Opcode::Jump as Word, line, offset as Word]
}

/// Jump by `offset` when the truthiness of `src` equals `sense`.
pub fn jump_if(line: Word, sense: bool, src: Word, offset: i16) -> [Word; 5] {
    [
        Opcode::JumpIf as Word,
        line,
        sense as Word,
        src,
        offset as Word,
    ]
}

/// Step an integer for loop, exiting by `offset` when the bound is crossed.
pub fn integer_for(
    line: Word,
    loop_: Word,
    stop: Word,
    step: Word,
    ext: Word,
    offset: i16,
) -> [Word; 7] {
    [
        Opcode::IntegerFor as Word,
        line,
        loop_,
        stop,
        step,
        ext,
        offset as Word,
    ]
}

/// Enter a try block whose first except instruction is at `offset`.
pub fn push_try(line: Word, offset: i16) -> [Word; 3] {
    [Opcode::PushTry as Word, line, offset as Word]
}

/// Catch clause binding the exception into `dst`.
pub fn except_catch(line: Word, class_id: ClassId, dst: Word, next_offset: i16) -> [Word; 5] {
    [
        Opcode::ExceptCatch as Word,
        line,
        class_id,
        dst,
        next_offset as Word,
    ]
}

/// Catch clause discarding the exception.
pub fn except_ignore(line: Word, class_id: ClassId, next_offset: i16) -> [Word; 5] {
    [
        Opcode::ExceptIgnore as Word,
        line,
        class_id,
        0,
        next_offset as Word,
    ]
}

fn build_with(op: Opcode, line: Word, prefix: &[Word], srcs: &[Word], dst: Word) -> Vec<Word> {
    let mut code = Vec::with_capacity(3 + prefix.len() + srcs.len() + 1);
    code.push(op as Word);
    code.push(line);
    code.extend_from_slice(prefix);
    code.push(srcs.len() as Word);
    code.extend_from_slice(srcs);
    code.push(dst);
    code
}

/// Build a List from `srcs` into `dst`.
pub fn build_list(line: Word, srcs: &[Word], dst: Word) -> Vec<Word> {
    build_with(Opcode::BuildList, line, &[], srcs, dst)
}

/// Build a Tuple from `srcs` into `dst`.
pub fn build_tuple(line: Word, srcs: &[Word], dst: Word) -> Vec<Word> {
    build_with(Opcode::BuildTuple, line, &[], srcs, dst)
}

/// Build a Hash keyed by `key_class` from alternating key/value `srcs`.
pub fn build_hash(line: Word, key_class: ClassId, srcs: &[Word], dst: Word) -> Vec<Word> {
    build_with(Opcode::BuildHash, line, &[key_class], srcs, dst)
}

/// Build a variant of `variant_class` from `srcs` into `dst`.
pub fn build_enum(line: Word, variant_class: ClassId, srcs: &[Word], dst: Word) -> Vec<Word> {
    build_with(Opcode::BuildEnum, line, &[variant_class], srcs, dst)
}

/// Stringify and concatenate `srcs` into `dst`.
pub fn interpolation(line: Word, srcs: &[Word], dst: Word) -> Vec<Word> {
    build_with(Opcode::Interpolation, line, &[], srcs, dst)
}

fn call_with(op: Opcode, line: Word, target: Word, args: &[Word], ret: Word) -> Vec<Word> {
    let mut code = Vec::with_capacity(5 + args.len());
    code.push(op as Word);
    code.push(line);
    code.push(target);
    code.push(args.len() as Word);
    code.push(ret);
    code.extend_from_slice(args);
    code
}

/// Call native function `fn_idx` of the readonly table.
pub fn native_call(line: Word, fn_idx: Word, args: &[Word], ret: Word) -> Vec<Word> {
    call_with(Opcode::NativeCall, line, fn_idx, args, ret)
}

/// Call foreign function `fn_idx` of the readonly table.
pub fn foreign_call(line: Word, fn_idx: Word, args: &[Word], ret: Word) -> Vec<Word> {
    call_with(Opcode::ForeignCall, line, fn_idx, args, ret)
}

/// Call the function value in `fn_reg`.
pub fn function_call(line: Word, fn_reg: Word, args: &[Word], ret: Word) -> Vec<Word> {
    call_with(Opcode::FunctionCall, line, fn_reg, args, ret)
}

/// Clear the listed cells and publish the executing closure into `dst`.
pub fn load_closure(line: Word, cell_idxs: &[Word], dst: Word) -> Vec<Word> {
    let mut code = Vec::with_capacity(4 + cell_idxs.len());
    code.push(Opcode::LoadClosure as Word);
    code.push(line);
    code.push(cell_idxs.len() as Word);
    code.extend_from_slice(cell_idxs);
    code.push(dst);
    code
}

/// Jump by the offset selected by `variant_class_id - base_class`.
pub fn match_dispatch(line: Word, src: Word, base_class: ClassId, offsets: &[i16]) -> Vec<Word> {
    let mut code = Vec::with_capacity(5 + offsets.len());
    code.push(Opcode::MatchDispatch as Word);
    code.push(line);
    code.push(src);
    code.push(base_class);
    code.push(offsets.len() as Word);
    code.extend(offsets.iter().map(|o| *o as Word));
    code
}

/// Extract `dsts.len()` variant fields of `src` into consecutive registers.
pub fn variant_decompose(line: Word, src: Word, dsts: &[Word]) -> Vec<Word> {
    let mut code = Vec::with_capacity(4 + dsts.len());
    code.push(Opcode::VariantDecompose as Word);
    code.push(line);
    code.push(src);
    code.push(dsts.len() as Word);
    code.extend_from_slice(dsts);
    code
}
