//! [`Vm`] implementation.

use std::rc::Rc;

use ivy_asm::{builtin_class_name, Opcode, FIRST_USER_CLASS_ID};

use crate::call::CallFrame;
use crate::consts::*;
use crate::error::UncaughtError;
use crate::gc::GcEntry;
use crate::program::{ClassDef, Program};
use crate::raiser::Raiser;
use crate::value::{ContainerKind, FileBody, FunctionBody, Value};

mod alu;
mod closure;
mod container;
mod executors;
mod flow;

/// The VM state: one register file, one call chain, one catch chain, one
/// gc, driven by a single synchronous interpreter. Foreign functions
/// re-enter it through the foreign-call API; nothing here is shared with
/// any other executor.
#[derive(Debug)]
pub struct Vm {
    /// The flat register file every frame windows into.
    pub(crate) regs: Vec<Value>,
    /// Frame storage indexed by call depth; frames are reused.
    pub(crate) frames: Vec<CallFrame>,
    /// Index of the executing frame.
    pub(crate) frame: usize,
    /// Literals and prototypes installed by boot, refreshed on dynaload.
    pub(crate) readonly: Vec<Value>,
    /// Class table; empty slots are classes not yet dynaloaded.
    pub(crate) classes: Vec<Option<ClassDef>>,
    pub(crate) raiser: Raiser,
    pub(crate) gc_live: Vec<GcEntry>,
    pub(crate) gc_pass: u32,
    pub(crate) gc_threshold: usize,
    pub(crate) gc_multiplier: usize,
    /// Scratch buffer shared by interpolation and value rendering.
    pub(crate) buffer: String,
    /// Cleared by `calltrace` and `assert` so they don't appear in their
    /// own trace; traceback building resets it.
    pub(crate) include_last_frame_in_trace: bool,
    /// The VM's stdout, as a File payload `print` writes through.
    pub(crate) stdout_file: Rc<FileBody>,
    /// Sentinel code installed on a caller frame by `call_prepare` so the
    /// callee's return lands back in the foreign caller.
    pub(crate) foreign_code: Rc<[u16]>,
}

impl Vm {
    /// Boot a VM around `program`: install the readonly table and class
    /// table, then build the toplevel frame (where globals live) and the
    /// `__main__` frame.
    pub fn new(program: Program) -> Self {
        let Program {
            readonly,
            classes,
            main,
            global_count,
        } = program;

        let global_count = global_count as usize;
        let main_regs = main.reg_count();

        let mut register_need = INITIAL_REGISTER_COUNT;
        while register_need < global_count + main_regs {
            register_need *= 2;
        }

        let mut class_table: Vec<Option<ClassDef>> = Vec::new();
        class_table.resize(FIRST_USER_CLASS_ID as usize, None);

        // Primitive classes get real entries up front so rendering and
        // cast checks always have names. The built-in exception block
        // stays empty until an error dynaloads it.
        for id in 0..FIRST_USER_CLASS_ID {
            if !ivy_asm::is_builtin_exception(id) {
                let name = builtin_class_name(id).unwrap_or("?");
                class_table[id as usize] = Some(ClassDef::new(id, name, 0));
            }
        }

        for class in classes {
            let slot = class.id as usize;
            if class_table.len() <= slot {
                class_table.resize(slot + 1, None);
            }

            class_table[slot] = Some(class);
        }

        let toplevel = Rc::new(FunctionBody::native("__toplevel__", "[builtin]", vec![], 0));
        let toplevel_frame = CallFrame::new(toplevel, 0, global_count);
        let main_frame = CallFrame::new(main, global_count, main_regs);

        Self {
            regs: vec![Value::Unit; register_need],
            frames: vec![toplevel_frame, main_frame],
            frame: 1,
            readonly,
            classes: class_table,
            raiser: Raiser::default(),
            gc_live: Vec::new(),
            gc_pass: 0,
            gc_threshold: GC_INITIAL_THRESHOLD,
            gc_multiplier: GC_DEFAULT_MULTIPLIER,
            buffer: String::new(),
            include_last_frame_in_trace: true,
            stdout_file: Rc::new(FileBody::stdout()),
            foreign_code: vec![Opcode::ReturnFromVm as u16, 0].into(),
        }
    }

    /// Execute `__main__` to completion.
    pub fn run(&mut self) -> Result<(), UncaughtError> {
        self.execute().map_err(|_raise| self.uncaught_error())
    }

    /// Swap stdout for an in-memory buffer, returning the file payload so
    /// the embedder can read back what the program printed.
    pub fn capture_stdout(&mut self) -> Rc<FileBody> {
        let buffer = Rc::new(FileBody::buffer());
        self.stdout_file = buffer.clone();
        buffer
    }

    /// The current call depth; `__main__` is depth one.
    pub fn call_depth(&self) -> usize {
        self.frame
    }

    /// Copy of register `index` of the current frame.
    pub fn register(&self, index: u16) -> Value {
        self.local(index).clone()
    }

    /// Grow the class table so `size` ids fit.
    pub fn ensure_class_table(&mut self, size: usize) {
        if self.classes.len() < size {
            self.classes.resize(size, None);
        }
    }

    /// Install (or replace) a class descriptor.
    pub fn add_class(&mut self, class: ClassDef) {
        self.ensure_class_table(class.id as usize + 1);
        let slot = class.id as usize;
        self.classes[slot] = Some(class);
    }

    /// Replace the readonly table, as the emitter does after a dynaload
    /// grows it.
    pub fn reload_readonly(&mut self, readonly: Vec<Value>) {
        self.readonly = readonly;
    }

    pub(crate) fn cur(&self) -> &CallFrame {
        &self.frames[self.frame]
    }

    pub(crate) fn cur_mut(&mut self) -> &mut CallFrame {
        &mut self.frames[self.frame]
    }

    /// Register `index` of the current frame's window.
    pub(crate) fn local(&self, index: u16) -> &Value {
        &self.regs[self.cur().base + index as usize]
    }

    /// Copy of register `index`.
    pub(crate) fn local_cloned(&self, index: u16) -> Value {
        self.local(index).clone()
    }

    /// Assign into register `index`; the old value drops.
    pub(crate) fn set_local(&mut self, index: u16, value: Value) {
        let slot = self.cur().base + index as usize;
        self.regs[slot] = value;
    }

    /// Double the register file until `need` registers exist. Frames hold
    /// offsets, so nothing needs repointing.
    pub(crate) fn grow_registers(&mut self, need: usize) {
        let mut size = self.regs.len().max(1);

        while size < need {
            size *= 2;
        }

        self.regs.resize(size, Value::Unit);
    }

    /// Render `value` into `out` the way interpolation and `print` do.
    /// `nested` quotes strings, as container elements are shown.
    pub(crate) fn render_value(&self, value: &Value, out: &mut String, nested: bool) {
        use std::fmt::Write;

        match value {
            Value::Unit => out.push_str("unit"),
            Value::Boolean(true) => out.push_str("true"),
            Value::Boolean(false) => out.push_str("false"),
            Value::Integer(i) => {
                let _ = write!(out, "{i}");
            }
            Value::Double(d) => {
                let _ = write!(out, "{d:?}");
            }
            Value::Byte(b) => {
                let _ = write!(out, "{b}");
            }
            Value::String(s) => {
                if nested {
                    let _ = write!(out, "{:?}", s.as_ref());
                } else {
                    out.push_str(s);
                }
            }
            Value::Bytes(bytes) => {
                let _ = write!(out, "<ByteString of {} bytes>", bytes.borrow().len());
            }
            Value::Container(body) => match body.kind() {
                ContainerKind::List => self.render_elements(&body.values.borrow(), "[", "]", out),
                ContainerKind::Tuple => {
                    self.render_elements(&body.values.borrow(), "<[", "]>", out)
                }
                ContainerKind::Instance => {
                    let _ = write!(out, "<{}>", self.class_name(body.class_id()));
                }
                ContainerKind::Variant => {
                    out.push_str(&self.class_name(body.class_id()));
                    self.render_elements(&body.values.borrow(), "(", ")", out);
                }
            },
            Value::Hash(body) => {
                out.push('[');
                for (i, (key, record)) in body.map.borrow().iter().enumerate() {
                    if i != 0 {
                        out.push_str(", ");
                    }

                    out.push_str(&key.to_string());
                    out.push_str(" => ");
                    self.render_value(record, out, true);
                }
                out.push(']');
            }
            Value::Function(body) => {
                let _ = write!(out, "<function {}>", body.trace_name);
            }
            Value::File(_) => out.push_str("<File>"),
            Value::Dynamic(body) => {
                out.push_str("Dynamic(");
                self.render_value(&body.slot.borrow(), out, true);
                out.push(')');
            }
            Value::EmptyVariant(class_id) => out.push_str(&self.class_name(*class_id)),
        }
    }

    fn render_elements(&self, values: &[Value], open: &str, close: &str, out: &mut String) {
        out.push_str(open);

        for (i, value) in values.iter().enumerate() {
            if i != 0 {
                out.push_str(", ");
            }

            self.render_value(value, out, true);
        }

        out.push_str(close);
    }

    /// Render `value` to a fresh string.
    pub fn render_to_string(&self, value: &Value) -> String {
        let mut out = String::new();
        self.render_value(value, &mut out, false);
        out
    }
}
