use core::fmt;

macro_rules! opcodes {
    (
        $(
            $(#[$attr:meta])*
            $name:ident = $value:literal
        ),* $(,)?
    ) => {
        /// Instruction representation for the interpreter.
        ///
        /// Every instruction is a run of 16-bit words laid out as
        /// `[opcode, line_number, operands…]`. Operands are unsigned
        /// register indices or immediates, except jump offsets, which are
        /// sign-extended 16-bit word counts relative to the opcode word of
        /// the jumping instruction.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
        #[repr(u16)]
        pub enum Opcode {
            $(
                $(#[$attr])*
                $name = $value,
            )*
        }

        impl TryFrom<u16> for Opcode {
            type Error = InvalidOpcode;

            fn try_from(word: u16) -> Result<Self, InvalidOpcode> {
                match word {
                    $(
                        $value => Ok(Self::$name),
                    )*
                    _ => Err(InvalidOpcode(word)),
                }
            }
        }
    };
}

opcodes! {
    /// `src, dst` — copy a register without any refcount bookkeeping. The
    /// emitter only writes this when the source is proven non-owning.
    FastAssign = 0x00,
    /// `src, dst` — copy a register; one logical ref per copy.
    Assign = 0x01,
    /// `idx, dst` — load an entry of the readonly table.
    GetReadonly = 0x02,
    /// `imm, dst` — load a sign-extended 16-bit integer literal.
    GetInteger = 0x03,
    /// `imm, dst` — load a boolean literal.
    GetBoolean = 0x04,
    /// `imm, dst` — load a byte literal.
    GetByte = 0x05,
    /// `class_id, dst` — load an empty variant of the given class.
    GetEmptyVariant = 0x06,
    /// `global, dst` — copy from a toplevel register.
    GetGlobal = 0x07,
    /// `src, global` — copy into a toplevel register.
    SetGlobal = 0x08,

    /// `lhs, rhs, dst` — wrapping 64-bit add.
    IntegerAdd = 0x10,
    /// `lhs, rhs, dst` — wrapping 64-bit subtract.
    IntegerMinus = 0x11,
    /// `lhs, rhs, dst` — wrapping 64-bit multiply.
    IntegerMul = 0x12,
    /// `lhs, rhs, dst` — truncated divide; raises `DivisionByZeroError`.
    IntegerDiv = 0x13,
    /// `lhs, rhs, dst` — truncated remainder; raises `DivisionByZeroError`.
    IntegerModulo = 0x14,
    /// `lhs, rhs, dst` — left shift.
    IntegerShl = 0x15,
    /// `lhs, rhs, dst` — arithmetic right shift.
    IntegerShr = 0x16,
    /// `lhs, rhs, dst` — bitwise and.
    IntegerAnd = 0x17,
    /// `lhs, rhs, dst` — bitwise or.
    IntegerOr = 0x18,
    /// `lhs, rhs, dst` — bitwise xor.
    IntegerXor = 0x19,
    /// `lhs, rhs, dst` — double add.
    DoubleAdd = 0x1a,
    /// `lhs, rhs, dst` — double subtract.
    DoubleMinus = 0x1b,
    /// `lhs, rhs, dst` — double multiply.
    DoubleMul = 0x1c,
    /// `lhs, rhs, dst` — double divide; raises `DivisionByZeroError` on 0.0.
    DoubleDiv = 0x1d,
    /// `src, dst` — logical not.
    UnaryNot = 0x1e,
    /// `src, dst` — integer negate.
    UnaryMinus = 0x1f,

    /// `lhs, rhs, dst` — `<` on Integer/Double/String.
    Less = 0x20,
    /// `lhs, rhs, dst` — `<=` on Integer/Double/String.
    LessEq = 0x21,
    /// `lhs, rhs, dst` — `>` on Integer/Double/String.
    Greater = 0x22,
    /// `lhs, rhs, dst` — `>=` on Integer/Double/String.
    GreaterEq = 0x23,
    /// `lhs, rhs, dst` — structural equality on same-class values.
    IsEqual = 0x24,
    /// `lhs, rhs, dst` — structural inequality.
    NotEq = 0x25,

    /// `offset` — unconditional relative jump.
    Jump = 0x30,
    /// `sense, src, offset` — jump when truthiness of `src` equals `sense`.
    JumpIf = 0x31,
    /// `start, stop, step, loop` — validate and prime an integer for loop.
    ForSetup = 0x32,
    /// `loop, stop, step, ext, offset` — step the loop counter, exiting by
    /// `offset` when the bound is crossed.
    IntegerFor = 0x33,
    /// `src, base_class, count, offsets…` — jump by the offset selected by
    /// `variant_class_id - base_class`.
    MatchDispatch = 0x34,

    /// `source, index, dst` — subscript read.
    GetItem = 0x40,
    /// `target, index, src` — subscript write.
    SetItem = 0x41,
    /// `prop, source, dst` — read an instance property slot.
    GetProperty = 0x42,
    /// `prop, target, src` — write an instance property slot.
    SetProperty = 0x43,

    /// `count, srcs…, dst` — build a List.
    BuildList = 0x50,
    /// `count, srcs…, dst` — build a Tuple.
    BuildTuple = 0x51,
    /// `key_class, count, k/v srcs…, dst` — build a Hash; `key_class`
    /// selects the string- or integer-keyed backing.
    BuildHash = 0x52,
    /// `variant_class, count, srcs…, dst` — build an enum variant.
    BuildEnum = 0x53,
    /// `src, count, dsts…` — extract variant fields into registers.
    VariantDecompose = 0x54,
    /// `count, srcs…, dst` — stringify and concatenate.
    Interpolation = 0x55,
    /// `class_id, src, dst` — `Some(inner)` when the Dynamic's content has
    /// the given class, `None` otherwise.
    DynamicCast = 0x56,

    /// `fn_idx, argc, ret, args…` — call a native function from the
    /// readonly table.
    NativeCall = 0x60,
    /// `fn_idx, argc, ret, args…` — call a foreign function from the
    /// readonly table.
    ForeignCall = 0x61,
    /// `fn_reg, argc, ret, args…` — call a function value, dispatching on
    /// whether it owns bytecode.
    FunctionCall = 0x62,
    /// Return `unit` to the caller.
    ReturnUnit = 0x63,
    /// `src` — return a value to the caller.
    ReturnVal = 0x64,

    /// `count, dst` — create the bottom-level closure with `count` cells.
    CreateClosure = 0x70,
    /// `count, cell_idxs…, dst` — clear the listed cells and publish the
    /// executing closure; written at the top of a recursive closure body.
    LoadClosure = 0x71,
    /// `prop, source, dst` — fetch a class method's stored closure and
    /// clone its cells.
    LoadClassClosure = 0x72,
    /// `closure_src, proto_idx, dst` — copy a prototype, pulling cells
    /// from an existing closure.
    CreateFunction = 0x73,
    /// `cell, dst` — read an upvalue cell.
    GetUpvalue = 0x74,
    /// `cell, src` — write an upvalue cell, creating it on first write.
    SetUpvalue = 0x75,

    /// `offset` — enter a try block; `offset` reaches the first except
    /// instruction.
    PushTry = 0x80,
    /// Leave a try block.
    PopTry = 0x81,
    /// `class_id, dst, next_offset` — catch clause that binds the
    /// exception instance.
    ExceptCatch = 0x82,
    /// `class_id, pad, next_offset` — catch clause that ignores the
    /// exception instance.
    ExceptIgnore = 0x83,
    /// `src` — raise a user exception instance.
    Raise = 0x84,

    /// `class_id, dst` — construct an instance.
    NewInstanceBasic = 0x90,
    /// `class_id, dst` — construct an instance that may hold refs to
    /// tagged values.
    NewInstanceSpeculative = 0x91,
    /// `class_id, dst` — construct an instance and tag it for the GC.
    NewInstanceTagged = 0x92,

    /// Release the current interpreter activation back to its caller.
    ReturnFromVm = 0xa0,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A code word that doesn't map to any known opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOpcode(pub u16);

impl fmt::Display for InvalidOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid opcode word {:#06x}", self.0)
    }
}

impl std::error::Error for InvalidOpcode {}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn opcode_word_round_trip() {
        for op in Opcode::iter() {
            let word = op as u16;
            assert_eq!(Opcode::try_from(word), Ok(op));
        }
    }

    #[test]
    fn unknown_words_are_rejected() {
        assert_eq!(Opcode::try_from(0x0f), Err(InvalidOpcode(0x0f)));
        assert_eq!(Opcode::try_from(0xffff), Err(InvalidOpcode(0xffff)));
    }
}
