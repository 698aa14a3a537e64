//! Tagged value representation and its reference rules.
//!
//! A register holds a [`Value`]. Primitives live inline; everything else is
//! a shared, reference-counted payload body. A logical copy is `Clone` (one
//! strong-count bump per copy), a logical drop is `Drop`, and ownership
//! transfers move. The cyclic-capable bodies additionally carry [`GcState`]
//! so the collector can find and hollow them; see the gc module.

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;

use ivy_asm::{
    ClassId, BOOLEAN_ID, BYTESTRING_ID, BYTE_ID, DOUBLE_ID, DYNAMIC_ID, FILE_ID, FUNCTION_ID,
    HASH_ID, INTEGER_ID, LIST_ID, STRING_ID, TUPLE_ID, UNIT_ID,
};

use crate::error::OpResult;
use crate::hash::HashBody;
use crate::interpreter::Vm;

bitflags::bitflags! {
    /// Kind and gc bits of a value, mirroring the flag word the opcodes
    /// dispatch on.
    pub struct ValueFlags: u16 {
        /// The value owns a refcounted payload.
        const DEREFABLE = 1 << 0;
        /// The payload is tracked by the gc live list.
        const GC_TAGGED = 1 << 1;
        /// The payload may hold references to tagged values and must be
        /// scanned transitively, but is not itself tagged.
        const GC_SPECULATIVE = 1 << 2;
        /// Union of the two gc bits; anything the marker must visit.
        const GC_SWEEPABLE = Self::GC_TAGGED.bits | Self::GC_SPECULATIVE.bits;
        /// The payload is an enum variant container.
        const ENUM = 1 << 3;
        /// The payload is a class instance container.
        const INSTANCE = 1 << 4;
        /// The payload is a container header.
        const CONTAINER = 1 << 5;
    }
}

/// A closure cell, shared by every closure descended from one creation.
/// The cell refcount of the original design is the `Rc` strong count.
pub type UpvalueCell = Rc<RefCell<Value>>;

/// Shared gc bookkeeping embedded in every cyclic-capable payload body.
#[derive(Debug, Default)]
pub struct GcState {
    /// Whether the body has an entry on the live list.
    pub(crate) tagged: Cell<bool>,
    /// Mark-pass stamp; visited when equal to the collector's current pass.
    pub(crate) pass: Cell<u32>,
    /// Set once the collector has emptied the body. Stands in for the
    /// stopper sentinel: repeat visits and late register clears check it.
    pub(crate) hollow: Cell<bool>,
}

/// What a [`ContainerBody`] is being used as. List/Tuple share layout;
/// Instance and Variant add class identity on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// A resizable list.
    List,
    /// A fixed tuple.
    Tuple,
    /// A class instance; `values` are its property slots.
    Instance,
    /// An enum variant carrying values.
    Variant,
}

/// Header of a List/Tuple/Instance/Variant payload.
#[derive(Debug)]
pub struct ContainerBody {
    class_id: ClassId,
    kind: ContainerKind,
    /// The element slots.
    pub values: RefCell<Vec<Value>>,
    /// Remaining superclass constructors that will reuse this instance
    /// instead of building a fresh one.
    pub ctor_need: Cell<u16>,
    pub(crate) gc: GcState,
}

impl ContainerBody {
    /// A list with `values` as its elements.
    pub fn list(values: Vec<Value>) -> Self {
        Self::with_kind(LIST_ID, ContainerKind::List, values)
    }

    /// A tuple with `values` as its elements.
    pub fn tuple(values: Vec<Value>) -> Self {
        Self::with_kind(TUPLE_ID, ContainerKind::Tuple, values)
    }

    /// An instance of `class_id` with `prop_count` unit-initialized slots.
    pub fn instance(class_id: ClassId, prop_count: usize) -> Self {
        Self::with_kind(
            class_id,
            ContainerKind::Instance,
            vec![Value::Unit; prop_count],
        )
    }

    /// A variant of class `class_id` carrying `values`.
    pub fn variant(class_id: ClassId, values: Vec<Value>) -> Self {
        Self::with_kind(class_id, ContainerKind::Variant, values)
    }

    fn with_kind(class_id: ClassId, kind: ContainerKind, values: Vec<Value>) -> Self {
        Self {
            class_id,
            kind,
            values: RefCell::new(values),
            ctor_need: Cell::new(0),
            gc: GcState::default(),
        }
    }

    /// Class id of the container.
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// What the container is being used as.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Number of element slots.
    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    /// Whether there are no element slots.
    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }

    /// Copy of slot `index`.
    pub fn get(&self, index: usize) -> Value {
        self.values.borrow()[index].clone()
    }

    /// Assign `value` into slot `index`.
    pub fn set(&self, index: usize, value: Value) {
        self.values.borrow_mut()[index] = value;
    }
}

/// The single-slot box behind `Dynamic`.
#[derive(Debug)]
pub struct DynamicBody {
    /// The deferred value.
    pub slot: RefCell<Value>,
    pub(crate) gc: GcState,
}

impl DynamicBody {
    /// Box `value`.
    pub fn new(value: Value) -> Self {
        Self {
            slot: RefCell::new(value),
            gc: GcState::default(),
        }
    }
}

/// A foreign function: host code manipulating the VM through the
/// foreign-call contract. Control does not return to it after a raise.
pub type ForeignFn = fn(&mut Vm) -> OpResult<()>;

/// Bytecode and register needs of a native function.
#[derive(Debug, Clone)]
pub struct NativeCode {
    /// The 16-bit code words.
    pub code: Rc<[u16]>,
    /// Registers the function wants on entry.
    pub reg_count: u16,
    /// Mapping from local class-id slots to absolute class ids, for code
    /// emitted before its classes were assigned absolute ids.
    pub cid_table: Rc<[ClassId]>,
}

/// What a function executes as.
pub enum FunctionKind {
    /// Owns bytecode; runs on the dispatch loop.
    Native(NativeCode),
    /// Owns a host function pointer.
    Foreign(ForeignFn),
}

impl std::fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native(native) => f.debug_tuple("Native").field(&native.reg_count).finish(),
            Self::Foreign(_) => f.debug_tuple("Foreign").finish(),
        }
    }
}

/// Payload of a `Function` value. A closure is a shallow copy of one of
/// these with its own cells array; the cells themselves are shared.
#[derive(Debug)]
pub struct FunctionBody {
    /// Name used in tracebacks.
    pub trace_name: Rc<str>,
    /// Owning class, when the function is a method.
    pub class_name: Option<Rc<str>>,
    /// Module path used in tracebacks; `[C]` stands in for foreign code.
    pub module_path: Rc<str>,
    /// Documentation attached by the emitter.
    pub docstring: Option<Rc<str>>,
    /// Native or foreign behavior.
    pub kind: FunctionKind,
    /// Closure cells; `None` until the function becomes a closure.
    pub upvalues: RefCell<Option<Vec<Option<UpvalueCell>>>>,
    pub(crate) gc: GcState,
}

impl FunctionBody {
    /// A native function of `reg_count` registers running `code`.
    pub fn native(trace_name: &str, module_path: &str, code: Vec<u16>, reg_count: u16) -> Self {
        Self {
            trace_name: trace_name.into(),
            class_name: None,
            module_path: module_path.into(),
            docstring: None,
            kind: FunctionKind::Native(NativeCode {
                code: code.into(),
                reg_count,
                cid_table: Vec::new().into(),
            }),
            upvalues: RefCell::new(None),
            gc: GcState::default(),
        }
    }

    /// A foreign function.
    pub fn foreign(trace_name: &str, func: ForeignFn) -> Self {
        Self {
            trace_name: trace_name.into(),
            class_name: None,
            module_path: "[C]".into(),
            docstring: None,
            kind: FunctionKind::Foreign(func),
            upvalues: RefCell::new(None),
            gc: GcState::default(),
        }
    }

    /// A foreign method of `class_name`.
    pub fn foreign_method(class_name: &str, trace_name: &str, func: ForeignFn) -> Self {
        Self {
            class_name: Some(class_name.into()),
            ..Self::foreign(trace_name, func)
        }
    }

    /// The bytecode, when native.
    pub fn code(&self) -> Option<Rc<[u16]>> {
        match &self.kind {
            FunctionKind::Native(native) => Some(native.code.clone()),
            FunctionKind::Foreign(_) => None,
        }
    }

    /// Registers wanted on entry; foreign functions want none of their own.
    pub fn reg_count(&self) -> usize {
        match &self.kind {
            FunctionKind::Native(native) => native.reg_count as usize,
            FunctionKind::Foreign(_) => 0,
        }
    }

    /// Whether this is a closure (owns a cells array).
    pub fn is_closure(&self) -> bool {
        self.upvalues.borrow().is_some()
    }

    /// Shallow copy sharing code and identity but not cells.
    ///
    /// The copy starts with no cells; closure creation fills them in.
    pub fn shallow_copy(&self) -> Self {
        Self {
            trace_name: self.trace_name.clone(),
            class_name: self.class_name.clone(),
            module_path: self.module_path.clone(),
            docstring: self.docstring.clone(),
            kind: match &self.kind {
                FunctionKind::Native(native) => FunctionKind::Native(native.clone()),
                FunctionKind::Foreign(func) => FunctionKind::Foreign(*func),
            },
            upvalues: RefCell::new(None),
            gc: GcState::default(),
        }
    }
}

/// The stream behind a `File` value.
pub enum FileStream {
    /// Closed; every operation raises.
    Closed,
    /// The process stdin.
    Stdin,
    /// The process stdout.
    Stdout,
    /// The process stderr.
    Stderr,
    /// An OS file handle.
    Handle(fs::File),
    /// An in-memory stream, used by embedders and tests to capture output.
    Buffer(Cursor<Vec<u8>>),
}

impl std::fmt::Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Closed => "Closed",
            Self::Stdin => "Stdin",
            Self::Stdout => "Stdout",
            Self::Stderr => "Stderr",
            Self::Handle(_) => "Handle",
            Self::Buffer(_) => "Buffer",
        };

        f.write_str(name)
    }
}

/// Payload of a `File` value.
#[derive(Debug)]
pub struct FileBody {
    /// The wrapped stream.
    pub stream: RefCell<FileStream>,
    /// Whether reads are allowed.
    pub readable: bool,
    /// Whether writes are allowed.
    pub writable: bool,
    /// Builtin streams ignore `close` so user code cannot shut down the
    /// process's standard streams.
    pub builtin: bool,
}

impl FileBody {
    /// Wrap an OS file handle.
    pub fn from_handle(handle: fs::File, readable: bool, writable: bool) -> Self {
        Self {
            stream: RefCell::new(FileStream::Handle(handle)),
            readable,
            writable,
            builtin: false,
        }
    }

    /// The process stdout, guarded against `close`.
    pub fn stdout() -> Self {
        Self {
            stream: RefCell::new(FileStream::Stdout),
            readable: false,
            writable: true,
            builtin: true,
        }
    }

    /// The process stderr, guarded against `close`.
    pub fn stderr() -> Self {
        Self {
            stream: RefCell::new(FileStream::Stderr),
            readable: false,
            writable: true,
            builtin: true,
        }
    }

    /// The process stdin, guarded against `close`.
    pub fn stdin() -> Self {
        Self {
            stream: RefCell::new(FileStream::Stdin),
            readable: true,
            writable: false,
            builtin: true,
        }
    }

    /// A writable in-memory stream.
    pub fn buffer() -> Self {
        Self {
            stream: RefCell::new(FileStream::Buffer(Cursor::new(Vec::new()))),
            readable: true,
            writable: true,
            builtin: false,
        }
    }

    /// Whether the stream has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(*self.stream.borrow(), FileStream::Closed)
    }

    /// Drop the stream. Builtin streams are left untouched.
    pub fn close(&self) {
        if !self.builtin {
            *self.stream.borrow_mut() = FileStream::Closed;
        }
    }

    /// Write `data` to the stream.
    pub fn write_all(&self, data: &[u8]) -> io::Result<()> {
        match &mut *self.stream.borrow_mut() {
            FileStream::Closed | FileStream::Stdin => Err(io::ErrorKind::BrokenPipe.into()),
            FileStream::Stdout => io::stdout().write_all(data),
            FileStream::Stderr => io::stderr().write_all(data),
            FileStream::Handle(handle) => handle.write_all(data),
            FileStream::Buffer(buffer) => buffer.write_all(data),
        }
    }

    /// Read up to `want` bytes, or to end-of-stream when `want` is `None`.
    /// Stops early when the underlying stream reports no more data.
    pub fn read(&self, want: Option<usize>) -> io::Result<Vec<u8>> {
        let mut stream = self.stream.borrow_mut();
        let reader: &mut dyn Read = match &mut *stream {
            FileStream::Closed | FileStream::Stdout | FileStream::Stderr => {
                return Err(io::ErrorKind::BrokenPipe.into())
            }
            FileStream::Stdin => return read_budget(&mut io::stdin().lock(), want),
            FileStream::Handle(handle) => handle,
            FileStream::Buffer(buffer) => buffer,
        };

        read_budget(reader, want)
    }

    /// Bytes captured so far, for [`FileStream::Buffer`] streams.
    pub fn buffered(&self) -> Vec<u8> {
        match &*self.stream.borrow() {
            FileStream::Buffer(buffer) => buffer.get_ref().clone(),
            _ => Vec::new(),
        }
    }
}

fn read_budget(reader: &mut dyn Read, want: Option<usize>) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();

    match want {
        None => {
            reader.read_to_end(&mut out)?;
        }
        Some(budget) => {
            out.resize(budget, 0);
            let mut filled = 0;

            // Keep pulling until the budget is spent or the stream is dry.
            while filled < budget {
                let nread = reader.read(&mut out[filled..])?;
                if nread == 0 {
                    break;
                }

                filled += nread;
            }

            out.truncate(filled);
        }
    }

    Ok(out)
}

/// A tagged register cell.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The unit value.
    #[default]
    Unit,
    /// A boolean.
    Boolean(bool),
    /// A signed 64-bit integer.
    Integer(i64),
    /// An IEEE-754 double.
    Double(f64),
    /// An unsigned byte.
    Byte(u8),
    /// An immutable utf-8 string.
    String(Rc<str>),
    /// A mutable raw byte buffer.
    Bytes(Rc<RefCell<Vec<u8>>>),
    /// A List/Tuple/Instance/Variant container.
    Container(Rc<ContainerBody>),
    /// A hash table.
    Hash(Rc<HashBody>),
    /// A native or foreign function, possibly a closure.
    Function(Rc<FunctionBody>),
    /// A wrapped OS stream.
    File(Rc<FileBody>),
    /// A single-slot box deferring type checks.
    Dynamic(Rc<DynamicBody>),
    /// A variant that carries no values; only the class id is stored.
    EmptyVariant(ClassId),
}

impl Value {
    /// Build a `String` value from anything string-ish.
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Rc::from(s.as_ref()))
    }

    /// Build a `Bytes` value.
    pub fn bytes(data: Vec<u8>) -> Self {
        Self::Bytes(Rc::new(RefCell::new(data)))
    }

    /// Build a `List` value.
    pub fn list(values: Vec<Value>) -> Self {
        Self::Container(Rc::new(ContainerBody::list(values)))
    }

    /// Build a `Tuple` value.
    pub fn tuple(values: Vec<Value>) -> Self {
        Self::Container(Rc::new(ContainerBody::tuple(values)))
    }

    /// Class id the opcodes dispatch on.
    pub fn class_id(&self) -> ClassId {
        match self {
            Self::Unit => UNIT_ID,
            Self::Boolean(_) => BOOLEAN_ID,
            Self::Integer(_) => INTEGER_ID,
            Self::Double(_) => DOUBLE_ID,
            Self::Byte(_) => BYTE_ID,
            Self::String(_) => STRING_ID,
            Self::Bytes(_) => BYTESTRING_ID,
            Self::Container(body) => body.class_id(),
            Self::Hash(_) => HASH_ID,
            Self::Function(_) => FUNCTION_ID,
            Self::File(_) => FILE_ID,
            Self::Dynamic(_) => DYNAMIC_ID,
            Self::EmptyVariant(class_id) => *class_id,
        }
    }

    /// The flag word of the value.
    pub fn flags(&self) -> ValueFlags {
        let mut flags = ValueFlags::empty();

        match self {
            Self::Unit | Self::Boolean(_) | Self::Integer(_) | Self::Double(_) | Self::Byte(_) => {
            }
            Self::EmptyVariant(_) => {
                flags |= ValueFlags::ENUM;
            }
            Self::String(_) | Self::Bytes(_) | Self::File(_) => {
                flags |= ValueFlags::DEREFABLE;
            }
            Self::Container(body) => {
                flags |= ValueFlags::DEREFABLE | ValueFlags::CONTAINER;
                flags |= match body.kind() {
                    ContainerKind::Instance => ValueFlags::INSTANCE,
                    ContainerKind::Variant => ValueFlags::ENUM,
                    ContainerKind::List | ContainerKind::Tuple => ValueFlags::empty(),
                };
                flags |= gc_bits(&body.gc);
            }
            Self::Hash(body) => {
                flags |= ValueFlags::DEREFABLE | gc_bits(&body.gc);
            }
            Self::Dynamic(body) => {
                flags |= ValueFlags::DEREFABLE;
                flags |= gc_bits(&body.gc);
            }
            Self::Function(body) => {
                flags |= ValueFlags::DEREFABLE;
                if body.is_closure() {
                    flags |= gc_bits(&body.gc) | ValueFlags::GC_SPECULATIVE;
                }
            }
        }

        flags
    }

    /// Whether the marker must visit this value.
    pub fn is_sweepable(&self) -> bool {
        self.flags().intersects(ValueFlags::GC_SWEEPABLE)
    }

    /// Truthiness used by conditional jumps: zero integers/booleans/bytes,
    /// empty strings, and empty lists are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Integer(i) => *i != 0,
            Self::Boolean(b) => *b,
            Self::Byte(b) => *b != 0,
            Self::String(s) => !s.is_empty(),
            Self::Container(body) if body.kind() == ContainerKind::List => !body.is_empty(),
            _ => true,
        }
    }

    /// Structural equality over two values of the same class. Containers
    /// compare element-wise, hashes by key set and per-key values,
    /// functions by payload identity.
    pub fn deep_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Self::Container(a), Self::Container(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }

                if a.class_id() != b.class_id() || a.len() != b.len() {
                    return false;
                }

                let (lhs, rhs) = (a.values.borrow(), b.values.borrow());
                lhs.iter().zip(rhs.iter()).all(|(x, y)| x.deep_eq(y))
            }
            (Self::Hash(a), Self::Hash(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }

                let (lhs, rhs) = (a.map.borrow(), b.map.borrow());
                lhs.len() == rhs.len()
                    && lhs
                        .iter()
                        .all(|(k, v)| rhs.get(k).is_some_and(|w| v.deep_eq(w)))
            }
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::File(a), Self::File(b)) => Rc::ptr_eq(a, b),
            (Self::Dynamic(a), Self::Dynamic(b)) => {
                Rc::ptr_eq(a, b) || a.slot.borrow().deep_eq(&b.slot.borrow())
            }
            (Self::EmptyVariant(a), Self::EmptyVariant(b)) => a == b,
            (Self::EmptyVariant(a), Self::Container(b)) | (Self::Container(b), Self::EmptyVariant(a)) => {
                // An empty variant never equals a value-carrying one, but
                // the ids must still be comparable within one enum.
                *a == b.class_id() && b.is_empty()
            }
            _ => false,
        }
    }
}

fn gc_bits(gc: &GcState) -> ValueFlags {
    if gc.tagged.get() {
        ValueFlags::GC_TAGGED
    } else {
        ValueFlags::GC_SPECULATIVE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_ids() {
        assert_eq!(Value::Unit.class_id(), UNIT_ID);
        assert_eq!(Value::Integer(3).class_id(), INTEGER_ID);
        assert_eq!(Value::string("x").class_id(), STRING_ID);
        assert_eq!(Value::list(vec![]).class_id(), LIST_ID);
        assert_eq!(Value::EmptyVariant(20).class_id(), 20);
    }

    #[test]
    fn primitive_flags_are_empty() {
        assert!(Value::Integer(1).flags().is_empty());
        assert!(Value::Boolean(true).flags().is_empty());
        assert!(!Value::Integer(1).is_sweepable());
    }

    #[test]
    fn container_flags() {
        let list = Value::list(vec![Value::Integer(1)]);
        let flags = list.flags();

        assert!(flags.contains(ValueFlags::DEREFABLE | ValueFlags::CONTAINER));
        assert!(flags.contains(ValueFlags::GC_SPECULATIVE));
        assert!(!flags.contains(ValueFlags::GC_TAGGED));
        assert!(list.is_sweepable());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Integer(0).is_truthy());
        assert!(Value::Integer(-1).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("x").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::list(vec![Value::Unit]).is_truthy());
        assert!(Value::Unit.is_truthy());
        assert!(Value::Double(0.0).is_truthy());
    }

    #[test]
    fn structural_equality() {
        let a = Value::list(vec![Value::Integer(1), Value::string("two")]);
        let b = Value::list(vec![Value::Integer(1), Value::string("two")]);
        let c = Value::list(vec![Value::Integer(1)]);

        assert!(a.deep_eq(&b));
        assert!(!a.deep_eq(&c));
        assert!(a.deep_eq(&a));
    }

    #[test]
    fn clone_is_one_ref_bump() {
        let list = Value::list(vec![]);
        let Value::Container(body) = &list else {
            unreachable!()
        };

        assert_eq!(Rc::strong_count(body), 1);
        let copy = list.clone();
        assert_eq!(Rc::strong_count(body), 2);
        drop(copy);
        assert_eq!(Rc::strong_count(body), 1);
    }

    #[test]
    fn buffer_file_read_budget() {
        let file = FileBody::buffer();
        file.write_all(b"hello world").unwrap();

        // Rewind by replacing the cursor position through a fresh read.
        if let FileStream::Buffer(buffer) = &mut *file.stream.borrow_mut() {
            buffer.set_position(0);
        }

        assert_eq!(file.read(Some(5)).unwrap(), b"hello");
        assert_eq!(file.read(None).unwrap(), b" world");
    }
}
