//! The ivy VM: a register-based bytecode interpreter for a small
//! embeddable dynamic language.
//!
//! The compiler front end (lexer, parser, checker, emitter) lives
//! upstream and hands the VM a finished [`Program`](program::Program):
//! a readonly table of literals and function prototypes, a class table,
//! and the `__main__` entry function. The VM owns everything from there:
//! the tagged value system, the flat register file and its call frames,
//! the cycle-collecting GC, closures with shared upvalue cells, the
//! structured exception machinery, and the foreign-call bridge native
//! code uses to re-enter the interpreter.
//!
//! ```
//! use ivy_asm::op;
//! use ivy_vm::prelude::*;
//!
//! let mut code = Vec::new();
//! code.extend(op::get_integer(1, 40, 0));
//! code.extend(op::get_integer(1, 2, 1));
//! code.extend(op::integer_add(1, 0, 1, 2));
//! code.extend(op::return_from_vm(2));
//!
//! let program = Program::new(FunctionBody::native("__main__", "demo", code, 3));
//! let mut vm = Vm::new(program);
//! vm.run().expect("execution");
//!
//! assert!(vm.register(2).deep_eq(&Value::Integer(42)));
//! ```

#![warn(missing_docs)]

pub mod builtin;
pub mod call;
pub mod consts;
pub mod error;
pub mod hash;
pub mod program;
pub mod unicode;
pub mod value;

mod ffi;
mod gc;
mod interpreter;
mod raiser;

#[cfg(test)]
mod tests;

pub use interpreter::Vm;

/// The commonly used surface in one import.
pub mod prelude {
    pub use crate::error::{OpResult, Raise, UncaughtError};
    pub use crate::hash::{HashBody, HashKey};
    pub use crate::program::{ClassDef, Program};
    pub use crate::value::{
        ContainerBody, ContainerKind, FileBody, FunctionBody, UpvalueCell, Value, ValueFlags,
    };
    pub use crate::Vm;
}
