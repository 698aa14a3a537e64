//! The foreign-call API.
//!
//! Foreign functions receive `&mut Vm` and manipulate it through this
//! surface: read arguments by index and type, push values into the
//! caller-side scratch region, invoke interpreted functions, and write a
//! typed result into the frame's return target. Nothing here hands out a
//! register reference that outlives the call.

use std::rc::Rc;

use ivy_asm::ClassId;

use crate::call::CallFrame;
use crate::error::OpResult;
use crate::hash::HashBody;
use crate::value::{ContainerBody, FileBody, FunctionBody, FunctionKind, Value};

use crate::interpreter::Vm;

impl Vm {
    /// Stage a call to `func`.
    ///
    /// The caller's code pointer is parked on a `return_from_vm` sentinel
    /// so that the callee's return lands back here, and the target frame
    /// is described but not yet entered: the call chain only advances in
    /// [`call_exec_prepared`](Self::call_exec_prepared). The return target
    /// is the first register past the caller's declared window.
    pub fn call_prepare(&mut self, func: &Rc<FunctionBody>) {
        let caller = self.frame;

        {
            let sentinel = self.foreign_code.clone();
            let frame = &mut self.frames[caller];
            frame.code = sentinel;
            frame.pc = 0;
        }

        let return_target = {
            let frame = &self.frames[caller];
            frame.base + frame.regs_used
        };

        let next = caller + 1;
        if next == self.frames.len() {
            self.frames
                .push(CallFrame::new(func.clone(), 0, func.reg_count()));
        }

        let code = func.code().unwrap_or_else(|| Vec::new().into());
        let target = &mut self.frames[next];
        target.function = func.clone();
        target.code = code;
        target.pc = 0;
        target.line = 0;
        target.regs_used = func.reg_count();
        target.return_target = Some(return_target);
        target.closure = None;
    }

    /// Execute the call staged by [`call_prepare`](Self::call_prepare),
    /// consuming the top `argc` pushed values as arguments.
    pub fn call_exec_prepared(&mut self, argc: usize) -> OpResult<()> {
        let caller = self.frame;

        // The pushed argument registers belong to the target now.
        self.frames[caller].top -= argc;
        let base = self.frames[caller].top;

        let next = caller + 1;
        let target_fn = self.frames[next].function.clone();

        match &target_fn.kind {
            FunctionKind::Foreign(func) => {
                let func = *func;

                {
                    let target = &mut self.frames[next];
                    target.base = base;
                    target.regs_used = argc;
                    target.top = base + argc;
                }

                self.frame = next;
                func(self)?;
                self.frame = caller;
            }
            FunctionKind::Native(native) => {
                let regs_used = native.reg_count as usize;
                let top = base + regs_used;

                if top > self.regs.len() {
                    self.grow_registers(top + 1);
                }

                {
                    let target = &mut self.frames[next];
                    target.base = base;
                    target.regs_used = regs_used;
                    target.top = top;
                }

                // Arguments were pushed in place; clear the rest of the
                // callee's window.
                for slot in &mut self.regs[base + argc..top] {
                    *slot = Value::Unit;
                }

                self.frame = next;
                self.execute()?;
                // The dispatch loop popped back to the caller on return.
            }
        }

        Ok(())
    }

    /// [`call_prepare`](Self::call_prepare) plus
    /// [`call_exec_prepared`](Self::call_exec_prepared).
    pub fn call_simple(&mut self, func: &Rc<FunctionBody>, argc: usize) -> OpResult<()> {
        self.call_prepare(func);
        self.call_exec_prepared(argc)
    }

    /// The result of the last prepared call.
    pub fn call_result(&self) -> Value {
        let frame = self.cur();
        self.regs[frame.base + frame.regs_used].clone()
    }

    /// Number of arguments the current foreign call received.
    pub fn arg_count(&self) -> usize {
        self.cur().regs_used
    }

    /// Argument `n` of the current foreign call.
    pub fn arg(&self, n: usize) -> &Value {
        &self.regs[self.cur().base + n]
    }

    /// Map `n` through the executing function's cid table.
    pub fn cid_at(&self, n: usize) -> ClassId {
        match &self.cur().function.kind {
            FunctionKind::Native(native) => native.cid_table[n],
            FunctionKind::Foreign(_) => panic!("cid_at inside a foreign function"),
        }
    }

    /// Push `value` onto the caller-side scratch region, growing the
    /// register file when at capacity.
    pub fn push_value(&mut self, value: Value) {
        let top = self.cur().top;

        if top == self.regs.len() {
            self.grow_registers(top + 1);
        }

        self.regs[top] = value;
        self.cur_mut().top = top + 1;
    }

    /// Pop the most recently pushed value.
    pub fn take_value(&mut self) -> Value {
        let frame = self.cur_mut();
        frame.top -= 1;
        let top = frame.top;

        std::mem::take(&mut self.regs[top])
    }

    /// Write `value` into the current frame's return target by move,
    /// transferring ownership without a ref bump. Used when moving a value
    /// out of a container.
    pub fn return_moved(&mut self, value: Value) {
        if let Some(target) = self.cur().return_target {
            self.regs[target] = value;
        }
    }

    /// Copy `value` into the current frame's return target.
    pub fn return_value(&mut self, value: &Value) {
        self.return_moved(value.clone());
    }

    /// Return a freshly built enum variant.
    pub fn return_variant(&mut self, class_id: ClassId, values: Vec<Value>) {
        self.return_moved(Value::Container(Rc::new(ContainerBody::variant(
            class_id, values,
        ))));
    }
}

macro_rules! typed_args {
    ($($(#[$attr:meta])* $fname:ident -> $ty:ty { $pat:pat => $out:expr });* $(;)?) => {
        impl Vm {
            $(
                $(#[$attr])*
                pub fn $fname(&self, n: usize) -> $ty {
                    match self.arg(n) {
                        $pat => $out,
                        other => panic!(
                            "argument {n} has class {}, not the expected one",
                            other.class_id()
                        ),
                    }
                }
            )*
        }
    };
}

typed_args! {
    /// Argument `n` as an Integer.
    arg_integer -> i64 { Value::Integer(i) => *i };
    /// Argument `n` as a Double.
    arg_double -> f64 { Value::Double(d) => *d };
    /// Argument `n` as a Boolean.
    arg_boolean -> bool { Value::Boolean(b) => *b };
    /// Argument `n` as a Byte.
    arg_byte -> u8 { Value::Byte(b) => *b };
    /// Argument `n` as a String payload.
    arg_string -> Rc<str> { Value::String(s) => s.clone() };
    /// Argument `n` as a ByteString payload.
    arg_bytes -> Rc<std::cell::RefCell<Vec<u8>>> { Value::Bytes(b) => b.clone() };
    /// Argument `n` as a container payload.
    arg_container -> Rc<ContainerBody> { Value::Container(c) => c.clone() };
    /// Argument `n` as a Hash payload.
    arg_hash -> Rc<HashBody> { Value::Hash(h) => h.clone() };
    /// Argument `n` as a Function payload.
    arg_function -> Rc<FunctionBody> { Value::Function(f) => f.clone() };
    /// Argument `n` as a File payload.
    arg_file -> Rc<FileBody> { Value::File(f) => f.clone() };
}

macro_rules! typed_returns {
    ($($(#[$attr:meta])* $fname:ident($arg:ident: $ty:ty) => $value:expr);* $(;)?) => {
        impl Vm {
            $(
                $(#[$attr])*
                pub fn $fname(&mut self, $arg: $ty) {
                    self.return_moved($value);
                }
            )*
        }
    };
}

typed_returns! {
    /// Return an Integer.
    return_integer(value: i64) => Value::Integer(value);
    /// Return a Double.
    return_double(value: f64) => Value::Double(value);
    /// Return a Boolean.
    return_boolean(value: bool) => Value::Boolean(value);
    /// Return a Byte.
    return_byte(value: u8) => Value::Byte(value);
    /// Return a String built from host text.
    return_string(value: String) => Value::string(value);
    /// Return a ByteString built from host bytes.
    return_bytes(value: Vec<u8>) => Value::bytes(value);
    /// Return a List built from host values.
    return_list(values: Vec<Value>) => Value::list(values);
}

macro_rules! typed_pushes {
    ($($(#[$attr:meta])* $fname:ident($arg:ident: $ty:ty) => $value:expr);* $(;)?) => {
        impl Vm {
            $(
                $(#[$attr])*
                pub fn $fname(&mut self, $arg: $ty) {
                    self.push_value($value);
                }
            )*
        }
    };
}

typed_pushes! {
    /// Push an Integer argument.
    push_integer(value: i64) => Value::Integer(value);
    /// Push a Double argument.
    push_double(value: f64) => Value::Double(value);
    /// Push a Boolean argument.
    push_boolean(value: bool) => Value::Boolean(value);
    /// Push a Byte argument.
    push_byte(value: u8) => Value::Byte(value);
    /// Push a String argument built from host text.
    push_string(value: String) => Value::string(value);
    /// Push a ByteString argument built from host bytes.
    push_bytes(value: Vec<u8>) => Value::bytes(value);
}

impl Vm {
    /// Push `unit`.
    pub fn push_unit(&mut self) {
        self.push_value(Value::Unit);
    }

    /// Return `unit`.
    pub fn return_unit(&mut self) {
        self.return_moved(Value::Unit);
    }

    /// Format the current call chain, oldest frame first.
    pub fn traceback(&mut self) -> Vec<String> {
        self.build_traceback()
    }
}
