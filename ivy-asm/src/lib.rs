//! Atomic types of the ivy VM.
//!
//! This crate owns the contract between the bytecode emitter and the
//! interpreter: the opcode set, the instruction word layouts, and the
//! reserved class-id block. It has no runtime of its own.

#![warn(missing_docs)]

mod class_id;
mod opcode;

pub mod op;

pub use class_id::{
    builtin_class_name,
    is_builtin_exception,
    ClassId,
    ASSERTION_ERROR_ID,
    BOOLEAN_ID,
    BYTESTRING_ID,
    BYTE_ID,
    DBZ_ERROR_ID,
    DOUBLE_ID,
    DYNAMIC_ID,
    EXCEPTION_ID,
    FILE_ID,
    FIRST_USER_CLASS_ID,
    FUNCTION_ID,
    HASH_ID,
    INDEX_ERROR_ID,
    INTEGER_ID,
    IO_ERROR_ID,
    KEY_ERROR_ID,
    LIST_ID,
    NONE_ID,
    OPTION_ID,
    QUESTION_ID,
    RUNTIME_ERROR_ID,
    SCOOP1_ID,
    SCOOP2_ID,
    SELF_ID,
    SOME_ID,
    STAR_ID,
    STRING_ID,
    TUPLE_ID,
    UNIT_ID,
    VALUE_ERROR_ID,
};
pub use opcode::{InvalidOpcode, Opcode};

/// A single 16-bit word of an instruction stream.
pub type Word = u16;
