//! Tagging, cycle collection, and threshold behavior.

use std::rc::Rc;

use ivy_asm::op;

use crate::consts::{GC_DEFAULT_MULTIPLIER, GC_INITIAL_THRESHOLD};
use crate::prelude::*;
use crate::tests::test_helpers::*;
use crate::value::DynamicBody;

#[test]
fn acyclic_values_never_enter_the_live_list() {
    let mut code = Vec::new();
    code.extend(op::get_integer(1, 1, 0));
    code.extend(op::build_list(1, &[0], 1));
    code.extend(op::build_tuple(2, &[0, 1], 2));
    code.extend(op::return_from_vm(3));

    let vm = run_main(code, 3);
    assert_eq!(vm.gc_live_count(), 0);
}

#[test]
fn pushing_a_container_into_itself_tags_it() {
    let mut code = Vec::new();
    code.extend(op::build_list(1, &[], 0));
    code.extend(op::foreign_call(2, 0, &[0, 0], 1)); // a.push(a)
    code.extend(op::return_from_vm(3));

    let mut program = main_program(code, 2);
    program.add_readonly(builtin_value("List.push"));

    let vm = run_program(program);
    assert_eq!(vm.gc_live_count(), 1);
}

#[test]
fn a_dropped_cycle_is_collected() {
    let mut code = Vec::new();
    code.extend(op::build_list(1, &[], 0)); // a = []
    code.extend(op::foreign_call(2, 0, &[0, 0], 1)); // a.push(a)
    code.extend(op::build_list(3, &[], 0)); // drop the only outside ref
    code.extend(op::return_from_vm(4));

    let mut program = main_program(code, 2);
    program.add_readonly(builtin_value("List.push"));

    let mut vm = run_program(program);
    assert_eq!(vm.gc_live_count(), 1);

    vm.invoke_gc();

    // The cycle's entry is gone from the live list and the payload freed.
    assert_eq!(vm.gc_live_count(), 0);
}

#[test]
fn a_live_cycle_survives_the_sweep() {
    let mut code = Vec::new();
    code.extend(op::build_list(1, &[], 0));
    code.extend(op::foreign_call(2, 0, &[0, 0], 1));
    code.extend(op::return_from_vm(3));

    let mut program = main_program(code, 2);
    program.add_readonly(builtin_value("List.push"));

    let mut vm = run_program(program);
    vm.invoke_gc();

    // Still rooted in a register, so the entry stays.
    assert_eq!(vm.gc_live_count(), 1);

    let list = as_container(&vm.register(0));
    assert_eq!(list.len(), 1);
}

#[test]
fn the_threshold_grows_when_nothing_is_reclaimed() {
    let mut code = Vec::new();
    code.extend(op::build_list(1, &[], 0));
    code.extend(op::return_from_vm(2));

    let mut vm = run_main(code, 1);
    assert_eq!(vm.gc_threshold(), GC_INITIAL_THRESHOLD);

    // Root one more Dynamic than the threshold admits, tagging each one.
    // Every tag past the hundredth sweeps first, reclaims nothing, and
    // the threshold is raised instead.
    let list = as_container(&vm.register(0));
    for i in 0..=GC_INITIAL_THRESHOLD {
        let boxed = Value::Dynamic(Rc::new(DynamicBody::new(Value::Integer(i as i64))));
        list.values.borrow_mut().push(boxed.clone());
        vm.tag_value(&boxed);
    }

    assert_eq!(vm.gc_live_count(), GC_INITIAL_THRESHOLD + 1);
    assert_eq!(
        vm.gc_threshold(),
        GC_INITIAL_THRESHOLD * GC_DEFAULT_MULTIPLIER
    );
}

#[test]
fn tagging_twice_records_one_entry() {
    let mut code = Vec::new();
    code.extend(op::build_list(1, &[], 0));
    code.extend(op::return_from_vm(2));

    let mut vm = run_main(code, 1);

    let value = vm.register(0);
    vm.tag_value(&value);
    vm.tag_value(&value);

    assert_eq!(vm.gc_live_count(), 1);
}

#[test]
fn registers_beyond_the_live_window_are_cleared_of_dead_values() {
    // Leave a tagged cyclic list in a register beyond the final window by
    // parking it in a callee register that the caller never reuses.
    let mut f = Vec::new();
    f.extend(op::build_list(1, &[], 0));
    f.extend(op::foreign_call(2, 0, &[0, 0], 1)); // cycle in callee r0
    f.extend(op::return_unit(3));

    let mut code = Vec::new();
    code.extend(op::native_call(1, 1, &[], 0));
    code.extend(op::return_from_vm(2));

    let mut program = main_program(code, 1);
    program.add_readonly(builtin_value("List.push"));
    program.add_readonly(native_value("f", f, 2));

    let mut vm = run_program(program);
    assert_eq!(vm.gc_live_count(), 1);

    let total = vm.frames[vm.frame].top;
    let beyond: Vec<usize> = (total..vm.regs.len())
        .filter(|slot| !matches!(vm.regs[*slot], Value::Unit))
        .collect();
    assert!(!beyond.is_empty(), "the cycle should linger past the window");

    vm.invoke_gc();

    assert_eq!(vm.gc_live_count(), 0);
    for slot in beyond {
        assert!(matches!(vm.regs[slot], Value::Unit));
    }
}

#[test]
fn hollowed_payloads_break_cycles_without_dangling() {
    // Two lists referencing each other, both dropped.
    let mut code = Vec::new();
    code.extend(op::build_list(1, &[], 0));
    code.extend(op::build_list(1, &[], 1));
    code.extend(op::foreign_call(2, 0, &[0, 1], 2)); // a.push(b)
    code.extend(op::foreign_call(3, 0, &[1, 0], 2)); // b.push(a)
    code.extend(op::get_integer(4, 0, 0));
    code.extend(op::get_integer(4, 0, 1));
    code.extend(op::return_from_vm(5));

    let mut program = main_program(code, 3);
    program.add_readonly(builtin_value("List.push"));

    let mut vm = run_program(program);
    assert_eq!(vm.gc_live_count(), 2);

    vm.invoke_gc();
    assert_eq!(vm.gc_live_count(), 0);
}
