//! The embedding surface: foreign calls into the VM from host code.

use std::rc::Rc;

use ivy_asm::{op, NONE_ID, SOME_ID};

use crate::prelude::*;
use crate::tests::test_helpers::*;

#[test]
fn call_simple_runs_a_native_function() {
    let mut add = Vec::new();
    add.extend(op::integer_add(1, 0, 1, 2));
    add.extend(op::return_val(2, 2));

    let mut vm = booted_vm();
    let add = as_function(&native_value("add", add, 3));

    vm.call_prepare(&add);
    vm.push_integer(19);
    vm.push_integer(23);
    vm.call_exec_prepared(2).expect("add cannot raise");

    assert!(vm.call_result().deep_eq(&Value::Integer(42)));
}

#[test]
fn prepared_calls_can_be_repeated() {
    let mut double = Vec::new();
    double.extend(op::integer_add(1, 0, 0, 1));
    double.extend(op::return_val(2, 1));

    let mut vm = booted_vm();
    let double = as_function(&native_value("double", double, 2));

    for i in 1..=3 {
        vm.call_prepare(&double);
        vm.push_integer(i);
        vm.call_exec_prepared(1).expect("double cannot raise");
        assert!(vm.call_result().deep_eq(&Value::Integer(i * 2)));
    }
}

#[test]
fn push_then_take_round_trips() {
    let mut vm = booted_vm();

    vm.push_string("scratch".to_string());
    vm.push_integer(5);

    assert!(vm.take_value().deep_eq(&Value::Integer(5)));
    assert!(vm.take_value().deep_eq(&Value::string("scratch")));
}

fn wrap_some(vm: &mut Vm) -> OpResult<()> {
    let inner = vm.arg(0).clone();
    vm.return_variant(SOME_ID, vec![inner]);
    Ok(())
}

#[test]
fn foreign_functions_can_return_variants() {
    let mut vm = booted_vm();
    let wrapper = Rc::new(FunctionBody::foreign("wrap_some", wrap_some));

    vm.call_prepare(&wrapper);
    vm.push_integer(11);
    vm.call_exec_prepared(1).expect("wrap cannot raise");

    let result = vm.call_result();
    let variant = as_container(&result);
    assert_eq!(variant.class_id(), SOME_ID);
    assert!(variant.get(0).deep_eq(&Value::Integer(11)));
}

fn move_first_out(vm: &mut Vm) -> OpResult<()> {
    let list = vm.arg_container(0);
    let first = list.values.borrow_mut().remove(0);

    // Ownership transfer: the value leaves the list without a ref bump.
    vm.return_moved(first);
    Ok(())
}

#[test]
fn return_moved_transfers_ownership() {
    let mut vm = booted_vm();
    let mover = Rc::new(FunctionBody::foreign("move_first_out", move_first_out));

    let payload = Value::string("only");
    let list = Value::list(vec![payload.clone()]);

    vm.call_prepare(&mover);
    vm.push_value(list.clone());
    vm.call_exec_prepared(1).expect("move cannot raise");

    assert!(vm.call_result().deep_eq(&payload));
    assert!(as_container(&list).is_empty());
}

fn raising_bridge(vm: &mut Vm) -> OpResult<()> {
    vm.raise_key_error("lost")
}

#[test]
fn foreign_raises_surface_as_uncaught_errors() {
    let mut code = Vec::new();
    code.extend(op::foreign_call(1, 0, &[], 0));
    code.extend(op::return_from_vm(2));

    let mut program = main_program(code, 1);
    program.add_readonly(Value::Function(Rc::new(FunctionBody::foreign(
        "bridge",
        raising_bridge,
    ))));

    let error = run_expect_uncaught(program);

    assert_eq!(error.class_name, "KeyError");
    assert_eq!(error.message, "lost");
    assert_eq!(error.traceback.last().unwrap(), "[C]: from bridge");
}

fn chain_reporter(vm: &mut Vm) -> OpResult<()> {
    let trace = vm.traceback();
    vm.return_integer(trace.len() as i64);
    Ok(())
}

#[test]
fn the_traceback_accessor_sees_the_whole_chain() {
    // main -> f -> reporter: three frames.
    let mut f = Vec::new();
    f.extend(op::foreign_call(1, 1, &[], 0));
    f.extend(op::return_val(2, 0));

    let mut code = Vec::new();
    code.extend(op::native_call(1, 0, &[], 0));
    code.extend(op::return_from_vm(2));

    let mut program = main_program(code, 1);
    program.add_readonly(native_value("f", f, 1));
    program.add_readonly(Value::Function(Rc::new(FunctionBody::foreign(
        "reporter",
        chain_reporter,
    ))));

    let vm = run_program(program);
    assert!(vm.register(0).deep_eq(&Value::Integer(3)));
}

#[test]
fn class_table_management_is_exposed() {
    let mut vm = booted_vm();

    vm.ensure_class_table(64);
    vm.add_class(ClassDef::new(40, "Late", 3));

    assert_eq!(vm.class_name(40), "Late");
    assert_eq!(vm.class_name(NONE_ID), "None");
}

#[test]
fn readonly_reload_is_respected() {
    let mut get = Vec::new();
    get.extend(op::get_readonly(1, 0, 0));
    get.extend(op::return_val(2, 0));

    let mut vm = booted_vm();
    let get = as_function(&native_value("get", get, 1));

    vm.reload_readonly(vec![Value::Integer(1)]);
    vm.call_simple(&get, 0).expect("get cannot raise");
    assert!(vm.call_result().deep_eq(&Value::Integer(1)));

    // The emitter grew the table behind the VM's back; the VM reads the
    // refreshed copy.
    vm.reload_readonly(vec![Value::Integer(2)]);
    vm.call_simple(&get, 0).expect("get cannot raise");
    assert!(vm.call_result().deep_eq(&Value::Integer(2)));
}

#[test]
fn files_round_trip_through_the_builtins() {
    let path = std::env::temp_dir().join(format!("ivy-vm-file-{}", std::process::id()));
    let path_value = Value::string(path.display().to_string());

    let mut vm = booted_vm();

    let open = as_function(&builtin_value("File.open"));
    let write = as_function(&builtin_value("File.write"));
    let read = as_function(&builtin_value("File.read"));
    let close = as_function(&builtin_value("File.close"));

    vm.call_prepare(&open);
    vm.push_value(path_value.clone());
    vm.push_string("w".to_string());
    vm.call_exec_prepared(2).expect("open for write");
    let writable = vm.call_result();

    vm.call_prepare(&write);
    vm.push_value(writable.clone());
    vm.push_string("payload".to_string());
    vm.call_exec_prepared(2).expect("write");

    vm.call_prepare(&close);
    vm.push_value(writable.clone());
    vm.call_exec_prepared(1).expect("close");

    vm.call_prepare(&open);
    vm.push_value(path_value.clone());
    vm.push_string("r".to_string());
    vm.call_exec_prepared(2).expect("open for read");
    let readable = vm.call_result();

    vm.call_prepare(&read);
    vm.push_value(readable.clone());
    vm.push_integer(-1);
    vm.call_exec_prepared(2).expect("read");

    match vm.call_result() {
        Value::Bytes(bytes) => assert_eq!(*bytes.borrow(), b"payload".to_vec()),
        other => panic!("expected bytes, found class {}", other.class_id()),
    }

    // Writing through the closed handle raises ValueError.
    vm.call_prepare(&write);
    vm.push_value(writable);
    vm.push_string("again".to_string());
    assert!(vm.call_exec_prepared(2).is_err());
    assert_eq!(vm.uncaught_error().class_name, "ValueError");

    let _ = std::fs::remove_file(path);
}

#[test]
fn builtin_streams_refuse_to_close() {
    let stdout = FileBody::stdout();
    stdout.close();
    assert!(!stdout.is_closed());
}
