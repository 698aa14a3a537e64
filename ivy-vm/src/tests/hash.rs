//! Hash iteration guards and helpers.

use ivy_asm::{op, STRING_ID};

use crate::hash::HashKey;
use crate::prelude::*;
use crate::tests::test_helpers::*;

/// `{"a" => 1, "b" => 2}` in global 0, then `each_pair` with a callback
/// that calls the builtin at `readonly[1]` on (global hash, "a").
fn mutate_during_iteration_program(target: &str) -> Program {
    // cb(key, value): regs r2 = hash, r3 = "a", r4 = result.
    let mut cb = Vec::new();
    cb.extend(op::get_global(1, 0, 2));
    cb.extend(op::get_readonly(1, 2, 3));
    cb.extend(op::foreign_call(2, 1, &[2, 3], 4));
    cb.extend(op::return_unit(3));

    let mut code = Vec::new();
    code.extend(op::get_readonly(1, 2, 0)); // r0 = "a"
    code.extend(op::get_integer(1, 1, 1)); // r1 = 1
    code.extend(op::get_readonly(1, 3, 2)); // r2 = "b"
    code.extend(op::get_integer(1, 2, 3)); // r3 = 2
    code.extend(op::build_hash(2, STRING_ID, &[0, 1, 2, 3], 4));
    code.extend(op::set_global(2, 4, 0));
    code.extend(op::get_readonly(3, 4, 5)); // r5 = cb
    code.extend(op::foreign_call(4, 0, &[4, 5], 6));
    code.extend(op::return_from_vm(5));

    let mut program = main_program(code, 7);
    program.global_count = 1;
    program.add_readonly(builtin_value("Hash.each_pair")); // 0
    program.add_readonly(builtin_value(target)); // 1
    program.add_readonly(Value::string("a")); // 2
    program.add_readonly(Value::string("b")); // 3
    program.add_readonly(native_value("cb", cb, 5)); // 4

    program
}

#[test]
fn deleting_a_key_during_iteration_raises() {
    let error = run_expect_uncaught(mutate_during_iteration_program("Hash.delete"));

    assert_eq!(error.class_name, "RuntimeError");
    assert_eq!(
        error.message,
        "Cannot remove key from hash during iteration."
    );
}

#[test]
fn clearing_during_iteration_raises() {
    let error = run_expect_uncaught(mutate_during_iteration_program("Hash.clear"));

    assert_eq!(error.class_name, "RuntimeError");
}

#[test]
fn the_iteration_guard_drops_even_after_a_raise() {
    let mut vm = Vm::new(mutate_during_iteration_program("Hash.delete"));
    vm.run().expect_err("the delete must raise");

    // Global 0 holds the hash; its guard must be back to zero.
    let Value::Hash(hash) = vm.regs[0].clone() else {
        panic!("global 0 should hold the hash");
    };

    assert_eq!(hash.iter_count.get(), 0);
    assert_eq!(hash.len(), 2);
}

#[test]
fn delete_works_outside_iteration() {
    let mut code = Vec::new();
    code.extend(op::get_readonly(1, 1, 0));
    code.extend(op::get_integer(1, 1, 1));
    code.extend(op::build_hash(2, STRING_ID, &[0, 1], 2));
    code.extend(op::foreign_call(3, 0, &[2, 0], 3));
    code.extend(op::return_from_vm(4));

    let mut program = main_program(code, 4);
    program.add_readonly(builtin_value("Hash.delete"));
    program.add_readonly(Value::string("a"));

    let vm = run_program(program);

    let Value::Hash(hash) = vm.register(2) else {
        panic!("expected a hash");
    };
    assert!(hash.is_empty());
}

#[test]
fn each_pair_visits_every_pair() {
    // cb(key, value): acc = acc + value, via global 1.
    let mut cb = Vec::new();
    cb.extend(op::get_global(1, 1, 2));
    cb.extend(op::integer_add(1, 2, 1, 2));
    cb.extend(op::set_global(1, 2, 1));
    cb.extend(op::return_unit(2));

    let mut code = Vec::new();
    code.extend(op::get_integer(1, 1, 0));
    code.extend(op::get_integer(1, 10, 1));
    code.extend(op::get_integer(1, 2, 2));
    code.extend(op::get_integer(1, 20, 3));
    code.extend(op::build_hash(2, ivy_asm::INTEGER_ID, &[0, 1, 2, 3], 4));
    code.extend(op::set_global(2, 4, 0));
    code.extend(op::get_integer(3, 0, 5));
    code.extend(op::set_global(3, 5, 1)); // acc = 0
    code.extend(op::get_readonly(4, 1, 5));
    code.extend(op::foreign_call(5, 0, &[4, 5], 6));
    code.extend(op::get_global(6, 1, 6)); // r6 = acc
    code.extend(op::return_from_vm(7));

    let mut program = main_program(code, 7);
    program.global_count = 2;
    program.add_readonly(builtin_value("Hash.each_pair"));
    program.add_readonly(native_value("cb", cb, 3));

    let vm = run_program(program);
    assert!(vm.register(6).deep_eq(&Value::Integer(30)));
}

#[test]
fn map_values_builds_a_parallel_hash() {
    // cb(value) = value * 2
    let mut cb = Vec::new();
    cb.extend(op::get_integer(1, 2, 1));
    cb.extend(op::integer_mul(1, 0, 1, 0));
    cb.extend(op::return_val(2, 0));

    let mut code = Vec::new();
    code.extend(op::get_integer(1, 1, 0));
    code.extend(op::get_integer(1, 10, 1));
    code.extend(op::build_hash(2, ivy_asm::INTEGER_ID, &[0, 1], 2));
    code.extend(op::get_readonly(3, 1, 3));
    code.extend(op::foreign_call(4, 0, &[2, 3], 4));
    code.extend(op::return_from_vm(5));

    let mut program = main_program(code, 5);
    program.add_readonly(builtin_value("Hash.map_values"));
    program.add_readonly(native_value("cb", cb, 2));

    let vm = run_program(program);

    let Value::Hash(mapped) = vm.register(4) else {
        panic!("expected a hash");
    };
    assert!(mapped
        .find(&HashKey::Int(1))
        .unwrap()
        .deep_eq(&Value::Integer(20)));
}

#[test]
fn select_keeps_only_approved_pairs() {
    // cb(key, value) = value > 5
    let mut cb = Vec::new();
    cb.extend(op::get_integer(1, 5, 2));
    cb.extend(op::greater(1, 1, 2, 3));
    cb.extend(op::return_val(2, 3));

    let mut code = Vec::new();
    code.extend(op::get_integer(1, 1, 0));
    code.extend(op::get_integer(1, 3, 1));
    code.extend(op::get_integer(1, 2, 2));
    code.extend(op::get_integer(1, 30, 3));
    code.extend(op::build_hash(2, ivy_asm::INTEGER_ID, &[0, 1, 2, 3], 4));
    code.extend(op::get_readonly(3, 1, 5));
    code.extend(op::foreign_call(4, 0, &[4, 5], 6)); // r6 = select(...)
    code.extend(op::return_from_vm(5));

    let mut program = main_program(code, 7);
    program.add_readonly(builtin_value("Hash.select"));
    program.add_readonly(native_value("cb", cb, 4));

    let vm = run_program(program);

    let Value::Hash(kept) = vm.register(6) else {
        panic!("expected a hash");
    };
    assert_eq!(kept.len(), 1);
    assert!(kept
        .find(&HashKey::Int(2))
        .unwrap()
        .deep_eq(&Value::Integer(30)));
}
