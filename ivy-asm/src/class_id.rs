/// Identifier of a class in the VM's class table.
///
/// The low block is reserved for the primitive classes, the type sentinels
/// the checker uses, and the built-in exception tree. User classes are
/// assigned sequentially from [`FIRST_USER_CLASS_ID`].
pub type ClassId = u16;

/// `Integer`, a signed 64-bit value.
pub const INTEGER_ID: ClassId = 0;
/// `Double`, an IEEE-754 double.
pub const DOUBLE_ID: ClassId = 1;
/// `String`, an immutable utf-8 buffer.
pub const STRING_ID: ClassId = 2;
/// `Byte`, an unsigned 8-bit value.
pub const BYTE_ID: ClassId = 3;
/// `ByteString`, a mutable raw byte buffer.
pub const BYTESTRING_ID: ClassId = 4;
/// `Boolean`.
pub const BOOLEAN_ID: ClassId = 5;
/// `Function`, native or foreign.
pub const FUNCTION_ID: ClassId = 6;
/// `Dynamic`, a single-slot box deferring type checks to runtime.
pub const DYNAMIC_ID: ClassId = 7;
/// `List`.
pub const LIST_ID: ClassId = 8;
/// `Hash`.
pub const HASH_ID: ClassId = 9;
/// `Tuple`.
pub const TUPLE_ID: ClassId = 10;
/// `File`, a wrapped OS stream.
pub const FILE_ID: ClassId = 11;

/// `Unit`, the type of nothing.
pub const UNIT_ID: ClassId = 12;
/// `self`, the checker's self-type sentinel.
pub const SELF_ID: ClassId = 13;
/// `?`, the incomplete-type sentinel.
pub const QUESTION_ID: ClassId = 14;
/// `*`, the any-type sentinel.
pub const STAR_ID: ClassId = 15;
/// `~1`, the first variadic-match sentinel used by Tuple operations.
pub const SCOOP1_ID: ClassId = 16;
/// `~2`, the second variadic-match sentinel.
pub const SCOOP2_ID: ClassId = 17;

/// `Option`, the built-in enum.
pub const OPTION_ID: ClassId = 18;
/// `Some`, Option's one-value variant.
pub const SOME_ID: ClassId = 19;
/// `None`, Option's empty variant.
pub const NONE_ID: ClassId = 20;

/// `Exception`, the root of the raiseable tree.
pub const EXCEPTION_ID: ClassId = 21;
/// `IOError`.
pub const IO_ERROR_ID: ClassId = 22;
/// `KeyError`.
pub const KEY_ERROR_ID: ClassId = 23;
/// `RuntimeError`.
pub const RUNTIME_ERROR_ID: ClassId = 24;
/// `ValueError`.
pub const VALUE_ERROR_ID: ClassId = 25;
/// `IndexError`.
pub const INDEX_ERROR_ID: ClassId = 26;
/// `DivisionByZeroError`.
pub const DBZ_ERROR_ID: ClassId = 27;
/// `AssertionError`.
pub const ASSERTION_ERROR_ID: ClassId = 28;

/// First id handed out to a user-defined class.
pub const FIRST_USER_CLASS_ID: ClassId = 29;

/// Whether `id` is inside the built-in exception block.
pub const fn is_builtin_exception(id: ClassId) -> bool {
    EXCEPTION_ID <= id && id <= ASSERTION_ERROR_ID
}

/// Name of a reserved class id, if `id` is reserved.
pub const fn builtin_class_name(id: ClassId) -> Option<&'static str> {
    let name = match id {
        INTEGER_ID => "Integer",
        DOUBLE_ID => "Double",
        STRING_ID => "String",
        BYTE_ID => "Byte",
        BYTESTRING_ID => "ByteString",
        BOOLEAN_ID => "Boolean",
        FUNCTION_ID => "Function",
        DYNAMIC_ID => "Dynamic",
        LIST_ID => "List",
        HASH_ID => "Hash",
        TUPLE_ID => "Tuple",
        FILE_ID => "File",
        UNIT_ID => "Unit",
        SELF_ID => "self",
        QUESTION_ID => "?",
        STAR_ID => "*",
        SCOOP1_ID => "~1",
        SCOOP2_ID => "~2",
        OPTION_ID => "Option",
        SOME_ID => "Some",
        NONE_ID => "None",
        EXCEPTION_ID => "Exception",
        IO_ERROR_ID => "IOError",
        KEY_ERROR_ID => "KeyError",
        RUNTIME_ERROR_ID => "RuntimeError",
        VALUE_ERROR_ID => "ValueError",
        INDEX_ERROR_ID => "IndexError",
        DBZ_ERROR_ID => "DivisionByZeroError",
        ASSERTION_ERROR_ID => "AssertionError",
        _ => return None,
    };

    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_block_is_fully_named() {
        for id in 0..FIRST_USER_CLASS_ID {
            assert!(builtin_class_name(id).is_some(), "no name for id {id}");
        }

        assert!(builtin_class_name(FIRST_USER_CLASS_ID).is_none());
    }

    #[test]
    fn exception_block_bounds() {
        assert!(!is_builtin_exception(NONE_ID));
        assert!(is_builtin_exception(EXCEPTION_ID));
        assert!(is_builtin_exception(ASSERTION_ERROR_ID));
        assert!(!is_builtin_exception(FIRST_USER_CLASS_ID));
    }
}
