//! Closure creation, shared cells, and the recursion-safety clear.

use ivy_asm::op;

use crate::prelude::*;
use crate::tests::test_helpers::*;

/// `make_counter` returns a closure over a fresh `n = 0`; each call of the
/// closure bumps and returns it.
fn counter_program() -> Program {
    // counter body, readonly[1]: reg 0 scratch, reg 1 one, reg 2 self.
    let mut counter = Vec::new();
    counter.extend(op::load_closure(1, &[], 2));
    counter.extend(op::get_upvalue(2, 0, 0));
    counter.extend(op::get_integer(2, 1, 1));
    counter.extend(op::integer_add(2, 0, 1, 0));
    counter.extend(op::set_upvalue(2, 0, 0));
    counter.extend(op::return_val(3, 0));

    // make_counter, readonly[0]: builds the cell then copies the proto.
    let mut make_counter = Vec::new();
    make_counter.extend(op::create_closure(1, 1, 0));
    make_counter.extend(op::get_integer(2, 0, 1));
    make_counter.extend(op::set_upvalue(2, 0, 1));
    make_counter.extend(op::create_function(3, 0, 1, 1));
    make_counter.extend(op::return_val(4, 1));

    let mut code = Vec::new();
    code.extend(op::native_call(1, 0, &[], 0)); // r0 = make_counter()
    code.extend(op::function_call(2, 0, &[], 1)); // r1 = f() -> 1
    code.extend(op::function_call(3, 0, &[], 1)); // r1 = f() -> 2
    code.extend(op::function_call(4, 0, &[], 2)); // r2 = f() -> 3
    code.extend(op::native_call(5, 0, &[], 3)); // r3 = make_counter()
    code.extend(op::function_call(6, 3, &[], 4)); // r4 = g() -> 1
    code.extend(op::return_from_vm(7));

    let mut program = main_program(code, 5);
    program.add_readonly(native_value("make_counter", make_counter, 2));
    program.add_readonly(native_value("counter", counter, 3));
    program
}

#[test]
fn closures_capture_independently() {
    let vm = run_program(counter_program());

    assert!(vm.register(2).deep_eq(&Value::Integer(3)));
    assert!(vm.register(4).deep_eq(&Value::Integer(1)));
}

#[test]
fn closures_are_tagged_for_the_gc() {
    let vm = run_program(counter_program());

    // Two create_closure calls plus two create_function copies.
    assert_eq!(vm.gc_live_count(), 4);
}

#[test]
fn sibling_closures_share_cells() {
    // inc() bumps the cell, read() observes the bump: both closures are
    // created from the same cells.
    let mut inc = Vec::new();
    inc.extend(op::load_closure(1, &[], 2));
    inc.extend(op::get_upvalue(2, 0, 0));
    inc.extend(op::get_integer(2, 1, 1));
    inc.extend(op::integer_add(2, 0, 1, 0));
    inc.extend(op::set_upvalue(2, 0, 0));
    inc.extend(op::return_unit(3));

    let mut read = Vec::new();
    read.extend(op::load_closure(1, &[], 1));
    read.extend(op::get_upvalue(2, 0, 0));
    read.extend(op::return_val(3, 0));

    // make_pair returns [inc, read] as a list.
    let mut make_pair = Vec::new();
    make_pair.extend(op::create_closure(1, 1, 0));
    make_pair.extend(op::get_integer(2, 0, 1));
    make_pair.extend(op::set_upvalue(2, 0, 1));
    make_pair.extend(op::create_function(3, 0, 1, 1));
    make_pair.extend(op::create_function(3, 0, 2, 2));
    make_pair.extend(op::build_list(4, &[1, 2], 3));
    make_pair.extend(op::return_val(5, 3));

    let mut code = Vec::new();
    code.extend(op::native_call(1, 0, &[], 0)); // r0 = [inc, read]
    code.extend(op::get_integer(2, 0, 1));
    code.extend(op::get_item(2, 0, 1, 2)); // r2 = inc
    code.extend(op::get_integer(3, 1, 1));
    code.extend(op::get_item(3, 0, 1, 3)); // r3 = read
    code.extend(op::function_call(4, 2, &[], 4)); // inc()
    code.extend(op::function_call(5, 2, &[], 4)); // inc()
    code.extend(op::function_call(6, 3, &[], 4)); // r4 = read() -> 2
    code.extend(op::return_from_vm(7));

    let mut program = main_program(code, 5);
    program.add_readonly(native_value("make_pair", make_pair, 4));
    program.add_readonly(native_value("inc", inc, 3));
    program.add_readonly(native_value("read", read, 2));

    let vm = run_program(program);
    assert!(vm.register(4).deep_eq(&Value::Integer(2)));
}

#[test]
fn load_closure_clears_cells_against_recursive_clobbering() {
    // g(depth) stores depth in its cell, makes a reader closure over that
    // cell, then recurses once. The recursive activation's load_closure
    // clears the cell spot, so its set_upvalue makes a *fresh* cell
    // instead of assigning through the parent's. The parent's reader must
    // therefore still see the parent's depth after the recursion.
    //
    // g registers: r0 = depth, r1 = reader, r2 = self, r3 = limit,
    // r4 = condition, r5 = scratch.
    let mut g = Vec::new();
    g.extend(op::load_closure(1, &[0], 2)); // 0..5
    g.extend(op::set_upvalue(2, 0, 0)); // 5..9, cell = depth
    g.extend(op::create_function(3, 2, 1, 1)); // 9..14, r1 = reader
    g.extend(op::get_integer(4, 1, 3)); // 14..18
    g.extend(op::less(4, 0, 3, 4)); // 18..23, r4 = depth < 1
    g.extend(op::jump_if(4, false, 4, 20)); // 23..28, to 43
    g.extend(op::get_integer(5, 1, 5)); // 28..32
    g.extend(op::integer_add(5, 0, 5, 5)); // 32..37, r5 = depth + 1
    g.extend(op::function_call(6, 2, &[5], 5)); // 37..43, g(depth + 1)
    g.extend(op::return_val(7, 1)); // 43..46, this activation's reader

    let mut reader = Vec::new();
    reader.extend(op::load_closure(1, &[], 1));
    reader.extend(op::get_upvalue(2, 0, 0));
    reader.extend(op::return_val(3, 0));

    let mut code = Vec::new();
    code.extend(op::create_closure(1, 1, 0)); // 0..4, cell storage host
    code.extend(op::create_function(2, 0, 0, 1)); // 4..9, r1 = g
    code.extend(op::get_integer(3, 0, 2)); // 9..13
    code.extend(op::function_call(4, 1, &[2], 3)); // 13..19, r3 = g(0)
    code.extend(op::function_call(5, 3, &[], 4)); // 19..24, r4 = reader()
    code.extend(op::return_from_vm(6)); // 24..26

    let mut program = main_program(code, 5);
    program.add_readonly(native_value("g", g, 6));
    program.add_readonly(native_value("reader", reader, 2));

    let vm = run_program(program);

    // The parent activation captured 0; the recursive call captured 1 in
    // a fresh cell and must not have clobbered the parent's.
    assert!(vm.register(4).deep_eq(&Value::Integer(0)));
}
