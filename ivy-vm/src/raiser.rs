//! Exception raising, unwinding, catch matching, and traceback capture.
//!
//! The original long-jump design maps onto `Result` propagation: an opcode
//! that faults records the exception here and returns [`Raise`], which `?`
//! carries up to the dispatch loop's trampoline. Each interpreter
//! activation owns a jump link (a fresh id); try blocks remember the link
//! that was current when they were entered, so a raise inside a
//! foreign-invoked sub-interpreter can only be caught by try blocks of
//! that same activation and otherwise escapes to the foreign caller.

use ivy_asm::{is_builtin_exception, ClassId, Opcode};

use crate::error::{OpResult, Raise, UncaughtError};
use crate::interpreter::Vm;
use crate::program::ClassDef;
use crate::value::{ContainerBody, Value};

use std::rc::Rc;

/// An exception in flight.
#[derive(Debug)]
pub(crate) struct RaisedException {
    /// Class of the raised value.
    pub class: ClassId,
    /// The message; for user raises, a copy of the instance's first field.
    pub message: String,
    /// The user instance behind a `raise`, absent for opcode faults.
    pub value: Option<Value>,
}

/// A try block on the catch chain.
#[derive(Debug, Clone)]
pub(crate) struct CatchEntry {
    /// Frame that entered the try block.
    pub frame: usize,
    /// Jump link current at entry.
    pub link: usize,
    /// Code position of the first except instruction in that frame's
    /// function.
    pub except_pos: usize,
}

/// Non-local exit bookkeeping: the jump-link stack, the catch chain, and
/// the exception in flight.
#[derive(Debug, Default)]
pub(crate) struct Raiser {
    links: Vec<usize>,
    next_link: usize,
    pub(crate) catches: Vec<CatchEntry>,
    pub(crate) raised: Option<RaisedException>,
}

impl Raiser {
    /// Install a fresh jump link for an interpreter activation.
    pub fn enter_link(&mut self) -> usize {
        self.next_link += 1;
        self.links.push(self.next_link);
        self.next_link
    }

    /// Release the activation's link.
    pub fn leave_link(&mut self, link: usize) {
        debug_assert_eq!(self.links.last(), Some(&link));
        self.links.pop();
    }

    /// The innermost live link.
    pub fn current_link(&self) -> usize {
        self.links.last().copied().unwrap_or(0)
    }
}

impl Vm {
    /// Record a built-in exception of `class` and begin unwinding. The
    /// class is dynaloaded into the table if this is its first use.
    pub(crate) fn error(&mut self, class: ClassId, message: impl Into<String>) -> Raise {
        self.ensure_exception_class(class);
        self.raiser.raised = Some(RaisedException {
            class,
            message: message.into(),
            value: None,
        });

        Raise(())
    }

    /// Deliver a user `raise` of an exception instance.
    pub(crate) fn raise_value(&mut self, exception: Value) -> Raise {
        let class = exception.class_id();
        let message = match &exception {
            Value::Container(body) => match body.get(0) {
                Value::String(s) => s.to_string(),
                _ => String::new(),
            },
            _ => String::new(),
        };

        self.raiser.raised = Some(RaisedException {
            class,
            message,
            value: Some(exception),
        });

        Raise(())
    }

    /// Install the descriptor of a built-in exception class the first time
    /// it is needed. The slots are reserved but empty until then.
    pub(crate) fn ensure_exception_class(&mut self, class: ClassId) {
        if !is_builtin_exception(class) {
            return;
        }

        let slot = class as usize;
        if self.classes.len() <= slot {
            self.classes.resize(slot + 1, None);
        }

        if self.classes[slot].is_none() {
            self.classes[slot] = Some(ClassDef::builtin_exception(class));
        }
    }

    /// Whether `catch_class` is `raised_class` or one of its ancestors.
    pub(crate) fn class_matches(&self, catch_class: ClassId, raised_class: ClassId) -> bool {
        let mut current = Some(raised_class);

        while let Some(id) = current {
            if id == catch_class {
                return true;
            }

            current = self
                .classes
                .get(id as usize)
                .and_then(|slot| slot.as_ref())
                .and_then(|class| class.parent);
        }

        false
    }

    /// Try to catch the exception in flight.
    ///
    /// Walks the catch chain backwards, refusing entries recorded under a
    /// different jump link, and scans each entry's chained
    /// `except_catch`/`except_ignore` instructions for an ancestor of the
    /// raised class. On a match the VM is rewound to the handler and the
    /// exception is delivered; otherwise the raise keeps unwinding.
    pub(crate) fn catch_exception(&mut self) -> bool {
        let link = self.raiser.current_link();

        let Some(raised_class) = self.raiser.raised.as_ref().map(|r| r.class) else {
            return false;
        };

        while let Some(entry) = self.raiser.catches.last().cloned() {
            if entry.link != link {
                // The remaining entries belong to an outer activation;
                // this raise has to escape the current one to reach them.
                return false;
            }

            let code = self.frames[entry.frame].code.clone();
            let mut pos = entry.except_pos;

            loop {
                let class = code[pos + 2];
                self.ensure_exception_class(class);

                if self.class_matches(class, raised_class) {
                    let unbox = code[pos] == Opcode::ExceptCatch as u16;
                    let target = entry.frame;
                    let dst = code[pos + 3];

                    self.deliver_exception(target, unbox.then_some(dst));

                    self.raiser.catches.pop();
                    self.frame = target;
                    self.frames[target].pc = pos + 5;
                    return true;
                }

                let next = code[pos + 4] as i16;
                if next == 0 {
                    break;
                }

                pos = pos.wrapping_add_signed(next as isize);
            }

            // No clause matched; this try block is spent.
            self.raiser.catches.pop();
        }

        false
    }

    /// Build the exception instance and write it into the handler's
    /// register, if the matching clause asked for one.
    fn deliver_exception(&mut self, target_frame: usize, dst: Option<u16>) {
        let Some(raised) = self.raiser.raised.take() else {
            return;
        };

        let Some(dst) = dst else {
            return;
        };

        let traceback = self.traceback_value();

        let instance = match raised.value {
            // A user-raised instance is reused; only its traceback field
            // is replaced.
            Some(instance) => {
                if let Value::Container(body) = &instance {
                    body.set(1, traceback);
                }

                instance
            }
            // Opcode faults get a freshly constructed instance around the
            // built-in message.
            None => {
                let prop_count = self
                    .classes
                    .get(raised.class as usize)
                    .and_then(|slot| slot.as_ref())
                    .map(|class| class.prop_count as usize)
                    .unwrap_or(2);

                let body = ContainerBody::instance(raised.class, prop_count.max(2));
                body.set(0, Value::string(&raised.message));
                body.set(1, traceback);
                Value::Container(Rc::new(body))
            }
        };

        let slot = self.frames[target_frame].base + dst as usize;
        self.regs[slot] = instance;
    }

    /// Format the call chain, oldest frame first.
    pub(crate) fn build_traceback(&mut self) -> Vec<String> {
        let mut last = self.frame;

        if !self.include_last_frame_in_trace {
            last = last.saturating_sub(1);
            self.include_last_frame_in_trace = true;
        }

        let mut trace = Vec::with_capacity(last);

        // Frame zero is the toplevel holding globals; it never appears.
        for frame in &self.frames[1..=last] {
            let function = &frame.function;
            let (class_name, separator) = match &function.class_name {
                Some(class_name) => (class_name.as_ref(), "."),
                None => ("", ""),
            };

            let line = if function.code().is_some() {
                let path = function.module_path.as_ref();
                format!("{path}:{}:", frame.line)
            } else {
                "[C]:".to_string()
            };

            trace.push(format!(
                "{line} from {class_name}{separator}{}",
                function.trace_name
            ));
        }

        trace
    }

    /// The traceback as a `List[String]` value.
    pub(crate) fn traceback_value(&mut self) -> Value {
        let trace = self
            .build_traceback()
            .into_iter()
            .map(Value::string)
            .collect();

        Value::list(trace)
    }

    /// Convert the exception in flight into the host-facing error. Called
    /// after a raise escaped the outermost activation.
    pub(crate) fn uncaught_error(&mut self) -> UncaughtError {
        let traceback = self.build_traceback();

        let (class_name, message) = match self.raiser.raised.take() {
            Some(raised) => (self.class_name(raised.class), raised.message),
            None => ("Exception".to_string(), String::new()),
        };

        UncaughtError {
            class_name,
            message,
            traceback,
        }
    }

    /// Name of `class`, falling back to the reserved-block names for
    /// classes that were never dynaloaded.
    pub(crate) fn class_name(&self, class: ClassId) -> String {
        self.classes
            .get(class as usize)
            .and_then(|slot| slot.as_ref())
            .map(|def| def.name.to_string())
            .or_else(|| ivy_asm::builtin_class_name(class).map(str::to_string))
            .unwrap_or_else(|| format!("class#{class}"))
    }
}

/// Raise helpers for foreign code, one per built-in exception class.
macro_rules! raise_helpers {
    ($($(#[$attr:meta])* $fname:ident => $id:expr);* $(;)?) => {
        impl Vm {
            $(
                $(#[$attr])*
                pub fn $fname<T>(&mut self, message: impl Into<String>) -> OpResult<T> {
                    Err(self.error($id, message))
                }
            )*
        }
    };
}

raise_helpers! {
    /// Raise `IOError` out of a foreign function.
    raise_io_error => ivy_asm::IO_ERROR_ID;
    /// Raise `KeyError` out of a foreign function.
    raise_key_error => ivy_asm::KEY_ERROR_ID;
    /// Raise `RuntimeError` out of a foreign function.
    raise_runtime_error => ivy_asm::RUNTIME_ERROR_ID;
    /// Raise `ValueError` out of a foreign function.
    raise_value_error => ivy_asm::VALUE_ERROR_ID;
    /// Raise `IndexError` out of a foreign function.
    raise_index_error => ivy_asm::INDEX_ERROR_ID;
    /// Raise `DivisionByZeroError` out of a foreign function.
    raise_dbz_error => ivy_asm::DBZ_ERROR_ID;
    /// Raise `AssertionError` out of a foreign function.
    raise_assertion_error => ivy_asm::ASSERTION_ERROR_ID;
}
