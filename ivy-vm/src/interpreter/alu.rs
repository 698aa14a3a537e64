//! Arithmetic and comparison opcodes.
//!
//! Integer semantics are two's-complement 64-bit wraparound; `/` and `%`
//! truncate toward zero. Comparison on mixed numeric classes never reaches
//! the VM — the checker forbids it — so the operand class dispatch here
//! only has to agree with the left-hand side.

use ivy_asm::{Opcode, DBZ_ERROR_ID};

use crate::error::OpResult;
use crate::interpreter::Vm;
use crate::value::Value;

const DIVIDE_BY_ZERO: &str = "Attempt to divide by zero.";

/// Read an Integer register. The emitter guarantees operand classes, so a
/// mismatch is corrupt bytecode, not a user error.
pub(crate) fn integer(value: &Value) -> i64 {
    match value {
        Value::Integer(i) => *i,
        other => panic!("expected an Integer register, found class {}", other.class_id()),
    }
}

fn double(value: &Value) -> f64 {
    match value {
        Value::Double(d) => *d,
        other => panic!("expected a Double register, found class {}", other.class_id()),
    }
}

fn ordering(lhs: &Value, rhs: &Value) -> std::cmp::Ordering {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Double(a), Value::Double(b)) => {
            a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Greater)
        }
        (Value::String(a), Value::String(b)) => a.as_bytes().cmp(b.as_bytes()),
        _ => panic!(
            "ordered comparison between classes {} and {}",
            lhs.class_id(),
            rhs.class_id()
        ),
    }
}

impl Vm {
    pub(crate) fn binary_op(&mut self, op: Opcode, a: u16, b: u16, dst: u16) -> OpResult<()> {
        use std::cmp::Ordering::*;

        let lhs = self.local_cloned(a);
        let rhs = self.local_cloned(b);

        let out = match op {
            Opcode::IntegerAdd => Value::Integer(integer(&lhs).wrapping_add(integer(&rhs))),
            Opcode::IntegerMinus => Value::Integer(integer(&lhs).wrapping_sub(integer(&rhs))),
            Opcode::IntegerMul => Value::Integer(integer(&lhs).wrapping_mul(integer(&rhs))),
            Opcode::IntegerDiv => {
                let divisor = integer(&rhs);
                if divisor == 0 {
                    return Err(self.error(DBZ_ERROR_ID, DIVIDE_BY_ZERO));
                }

                Value::Integer(integer(&lhs).wrapping_div(divisor))
            }
            Opcode::IntegerModulo => {
                let divisor = integer(&rhs);
                if divisor == 0 {
                    return Err(self.error(DBZ_ERROR_ID, DIVIDE_BY_ZERO));
                }

                Value::Integer(integer(&lhs).wrapping_rem(divisor))
            }
            Opcode::IntegerShl => Value::Integer(integer(&lhs).wrapping_shl(integer(&rhs) as u32)),
            Opcode::IntegerShr => Value::Integer(integer(&lhs).wrapping_shr(integer(&rhs) as u32)),
            Opcode::IntegerAnd => Value::Integer(integer(&lhs) & integer(&rhs)),
            Opcode::IntegerOr => Value::Integer(integer(&lhs) | integer(&rhs)),
            Opcode::IntegerXor => Value::Integer(integer(&lhs) ^ integer(&rhs)),

            Opcode::DoubleAdd => Value::Double(double(&lhs) + double(&rhs)),
            Opcode::DoubleMinus => Value::Double(double(&lhs) - double(&rhs)),
            Opcode::DoubleMul => Value::Double(double(&lhs) * double(&rhs)),
            Opcode::DoubleDiv => {
                let divisor = double(&rhs);
                if divisor == 0.0 {
                    return Err(self.error(DBZ_ERROR_ID, DIVIDE_BY_ZERO));
                }

                Value::Double(double(&lhs) / divisor)
            }

            Opcode::Less => Value::Boolean(ordering(&lhs, &rhs) == Less),
            Opcode::LessEq => Value::Boolean(ordering(&lhs, &rhs) != Greater),
            Opcode::Greater => Value::Boolean(ordering(&lhs, &rhs) == Greater),
            Opcode::GreaterEq => Value::Boolean(ordering(&lhs, &rhs) != Less),
            Opcode::IsEqual => Value::Boolean(lhs.deep_eq(&rhs)),
            Opcode::NotEq => Value::Boolean(!lhs.deep_eq(&rhs)),

            other => unreachable!("{other} is not a binary operation"),
        };

        self.set_local(dst, out);
        Ok(())
    }

    pub(crate) fn unary_op(&mut self, op: Opcode, src: u16, dst: u16) {
        let value = self.local_cloned(src);

        let out = match op {
            Opcode::UnaryNot => match value {
                Value::Boolean(b) => Value::Boolean(!b),
                other => Value::Integer((integer(&other) == 0) as i64),
            },
            Opcode::UnaryMinus => Value::Integer(integer(&value).wrapping_neg()),
            other => unreachable!("{other} is not a unary operation"),
        };

        self.set_local(dst, out);
    }
}
