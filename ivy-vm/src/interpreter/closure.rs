//! Closure creation, loading, and upvalue cells.
//!
//! A closure is a shallow copy of a function value with its own cells
//! array; the cells are shared with every closure descended from the same
//! creation, so sibling closures observe each other's writes. A cell dies
//! with its last holder.

use std::cell::RefCell;
use std::rc::Rc;

use crate::interpreter::Vm;
use crate::value::{FunctionBody, UpvalueCell, Value};

fn function(value: &Value) -> Rc<FunctionBody> {
    match value {
        Value::Function(body) => body.clone(),
        other => panic!("closure operation on class {}", other.class_id()),
    }
}

/// Clone a cells array, bumping each existing cell's holder count. Cells
/// not yet created stay empty.
fn copy_upvalues(source: &FunctionBody) -> Vec<Option<UpvalueCell>> {
    source
        .upvalues
        .borrow()
        .as_ref()
        .map(|cells| cells.clone())
        .unwrap_or_default()
}

impl Vm {
    /// `create_closure count, dst`: the bottom level of closure creation.
    /// Cells start empty so `set_upvalue` knows to make them.
    pub(crate) fn op_create_closure(&mut self, code: &[u16]) {
        let count = code[2] as usize;

        let copy = self.cur().function.shallow_copy();
        *copy.upvalues.borrow_mut() = Some(vec![None; count]);

        let closure = Rc::new(copy);
        let value = Value::Function(closure.clone());

        self.set_local(code[3], value.clone());
        // Closures are unconditionally cyclic-suspect.
        self.tag_value(&value);

        self.cur_mut().closure = Some(closure);
    }

    /// `load_closure count, idxs…, dst`: runs at the top of a recursive
    /// closure body. The listed cells belong to this activation; dropping
    /// them keeps a recursive call from clobbering the parent
    /// activation's captures. The executing closure is then published
    /// without making a new copy.
    pub(crate) fn op_load_closure(&mut self, code: &[u16]) {
        let closure = self.cur().function.clone();
        let count = code[2] as usize;

        {
            let mut cells = closure.upvalues.borrow_mut();
            let cells = cells.as_mut().expect("load_closure on a plain function");

            for idx in &code[3..3 + count] {
                cells[*idx as usize] = None;
            }
        }

        self.set_local(code[3 + count], Value::Function(closure.clone()));
        self.cur_mut().closure = Some(closure);
    }

    /// `load_class_closure prop, source, dst`: class methods pull their
    /// closure out of a hidden instance slot, then clone its cells exactly
    /// like a nested define.
    pub(crate) fn op_load_class_closure(&mut self, code: &[u16]) {
        self.op_get_property(code);

        let stored = function(self.local(code[4]));

        let copy = stored.shallow_copy();
        *copy.upvalues.borrow_mut() = Some(copy_upvalues(&stored));

        let closure = Rc::new(copy);
        self.set_local(code[4], Value::Function(closure.clone()));
        self.cur_mut().closure = Some(closure);
    }

    /// `create_function closure_src, proto_idx, dst`: copy a prototype
    /// from the readonly table, pulling cells from an existing closure.
    pub(crate) fn op_create_function(&mut self, code: &[u16]) {
        let source = function(self.local(code[2]));
        let proto = match &self.readonly[code[3] as usize] {
            Value::Function(body) => body.clone(),
            other => panic!("create_function on class {}", other.class_id()),
        };

        let copy = proto.shallow_copy();
        *copy.upvalues.borrow_mut() = Some(copy_upvalues(&source));

        let value = Value::Function(Rc::new(copy));
        self.set_local(code[4], value.clone());
        self.tag_value(&value);
    }

    /// Read cell `index` of the active closure.
    pub(crate) fn upvalue_get(&self, index: u16) -> Value {
        let closure = self
            .cur()
            .closure
            .as_ref()
            .expect("get_upvalue outside a closure body");

        let cells = closure.upvalues.borrow();
        let cell = cells
            .as_ref()
            .and_then(|cells| cells[index as usize].as_ref())
            .expect("get_upvalue on an unset cell");

        let value = cell.borrow().clone();
        value
    }

    /// Write cell `index` of the active closure, creating the cell on
    /// first write so later closures share it.
    pub(crate) fn upvalue_set(&mut self, index: u16, value: Value) {
        let closure = self
            .cur()
            .closure
            .as_ref()
            .expect("set_upvalue outside a closure body")
            .clone();

        let mut cells = closure.upvalues.borrow_mut();
        let cells = cells.as_mut().expect("set_upvalue on a plain function");

        match &cells[index as usize] {
            Some(cell) => *cell.borrow_mut() = value,
            None => cells[index as usize] = Some(Rc::new(RefCell::new(value))),
        }
    }
}
