use std::rc::Rc;

use crate::builtin;
use crate::error::UncaughtError;
use crate::prelude::*;

pub const TEST_PATH: &str = "test";

/// A program that only runs `code` as `__main__`.
pub fn main_program(code: Vec<u16>, reg_count: u16) -> Program {
    Program::new(FunctionBody::native("__main__", TEST_PATH, code, reg_count))
}

/// Run `code` as `__main__`, expecting clean completion.
pub fn run_main(code: Vec<u16>, reg_count: u16) -> Vm {
    run_program(main_program(code, reg_count))
}

/// Run a program, expecting clean completion.
pub fn run_program(program: Program) -> Vm {
    let mut vm = Vm::new(program);
    if let Err(error) = vm.run() {
        panic!("unexpected uncaught exception: {error}");
    }

    vm
}

/// Run a program, expecting an exception to escape.
pub fn run_expect_uncaught(program: Program) -> UncaughtError {
    let mut vm = Vm::new(program);
    vm.run().expect_err("expected an uncaught exception")
}

/// A built-in foreign function as a readonly-table value.
pub fn builtin_value(name: &str) -> Value {
    let body = builtin::function(name)
        .unwrap_or_else(|| panic!("no builtin named {name}"));

    Value::Function(Rc::new(body))
}

/// A native function as a readonly-table value.
pub fn native_value(name: &str, code: Vec<u16>, reg_count: u16) -> Value {
    Value::Function(Rc::new(FunctionBody::native(
        name, TEST_PATH, code, reg_count,
    )))
}

/// A VM that has already run an empty `__main__`, for host-side calls.
pub fn booted_vm() -> Vm {
    run_main(ivy_asm::op::return_from_vm(1).to_vec(), 1)
}

/// Unwrap a Function register value.
pub fn as_function(value: &Value) -> Rc<FunctionBody> {
    match value {
        Value::Function(body) => body.clone(),
        other => panic!("expected a function, found class {}", other.class_id()),
    }
}

/// Unwrap a Container register value.
pub fn as_container(value: &Value) -> Rc<ContainerBody> {
    match value {
        Value::Container(body) => body.clone(),
        other => panic!("expected a container, found class {}", other.class_id()),
    }
}

/// Collect the strings of a `List[String]` value.
pub fn string_list(value: &Value) -> Vec<String> {
    as_container(value)
        .values
        .borrow()
        .iter()
        .map(|element| match element {
            Value::String(s) => s.to_string(),
            other => panic!("expected a string, found class {}", other.class_id()),
        })
        .collect()
}
