//! The emitter-facing program format.
//!
//! The lexer, parser, checker, and emitter live upstream; what reaches the
//! VM is a finished [`Program`]: a readonly table of prebuilt values
//! (literals and function prototypes), the class table entries for every
//! user class, the `__main__` entry function, and the number of toplevel
//! globals. The readonly table may grow while the VM runs (dynaload), so
//! the VM treats its copy as refreshable rather than fixed.

use std::rc::Rc;

use ivy_asm::{builtin_class_name, ClassId, EXCEPTION_ID, FIRST_USER_CLASS_ID};

use crate::value::{FunctionBody, Value};

/// A class table entry.
#[derive(Debug, Clone)]
pub struct ClassDef {
    /// Absolute class id.
    pub id: ClassId,
    /// Source name, used in rendering and uncaught-error reports.
    pub name: Rc<str>,
    /// Superclass, when the class inherits.
    pub parent: Option<ClassId>,
    /// Number of property slots an instance carries.
    pub prop_count: u16,
    /// Distance from the inheritance root; a subclass constructor chain
    /// reuses the instance this many times.
    pub inherit_depth: u16,
}

impl ClassDef {
    /// A root class with `prop_count` properties.
    pub fn new(id: ClassId, name: &str, prop_count: u16) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            prop_count,
            inherit_depth: 0,
        }
    }

    /// A subclass of `parent`.
    pub fn subclass(id: ClassId, name: &str, parent: &ClassDef, prop_count: u16) -> Self {
        Self {
            id,
            name: name.into(),
            parent: Some(parent.id),
            prop_count,
            inherit_depth: parent.inherit_depth + 1,
        }
    }

    /// The descriptor of a built-in exception class. They all carry a
    /// message and a traceback and inherit `Exception`.
    pub fn builtin_exception(id: ClassId) -> Self {
        let name = builtin_class_name(id).unwrap_or("Exception");
        let parent = (id != EXCEPTION_ID).then_some(EXCEPTION_ID);

        Self {
            id,
            name: name.into(),
            parent,
            prop_count: 2,
            inherit_depth: u16::from(id != EXCEPTION_ID),
        }
    }

    /// A user exception subclass of `parent` with no extra properties.
    pub fn user_exception(id: ClassId, name: &str, parent: &ClassDef) -> Self {
        Self::subclass(id, name, parent, parent.prop_count)
    }
}

/// What boot installs into a fresh VM.
#[derive(Debug)]
pub struct Program {
    /// Literals and function prototypes, addressed by index.
    pub readonly: Vec<Value>,
    /// User classes, ids at or past [`FIRST_USER_CLASS_ID`].
    pub classes: Vec<ClassDef>,
    /// The entry function.
    pub main: Rc<FunctionBody>,
    /// Toplevel registers reserved for globals.
    pub global_count: u16,
}

impl Program {
    /// A program with only an entry function.
    pub fn new(main: FunctionBody) -> Self {
        Self {
            readonly: Vec::new(),
            classes: Vec::new(),
            main: Rc::new(main),
            global_count: 0,
        }
    }

    /// Append a readonly value, returning its table index.
    pub fn add_readonly(&mut self, value: Value) -> u16 {
        self.readonly.push(value);
        (self.readonly.len() - 1) as u16
    }

    /// Register a user class, returning its id.
    pub fn add_class(&mut self, mut class: ClassDef) -> ClassId {
        let id = FIRST_USER_CLASS_ID + self.classes.len() as ClassId;
        class.id = id;
        self.classes.push(class);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_exception_shape() {
        let root = ClassDef::builtin_exception(EXCEPTION_ID);
        assert_eq!(root.parent, None);
        assert_eq!(root.inherit_depth, 0);
        assert_eq!(root.prop_count, 2);

        let dbz = ClassDef::builtin_exception(ivy_asm::DBZ_ERROR_ID);
        assert_eq!(dbz.parent, Some(EXCEPTION_ID));
        assert_eq!(dbz.inherit_depth, 1);
        assert_eq!(&*dbz.name, "DivisionByZeroError");
    }

    #[test]
    fn user_class_ids_are_sequential() {
        let main = FunctionBody::native("__main__", "test", vec![], 0);
        let mut program = Program::new(main);

        let parent = ClassDef::builtin_exception(EXCEPTION_ID);
        let first = program.add_class(ClassDef::user_exception(0, "E", &parent));
        let second = program.add_class(ClassDef::new(0, "Point", 2));

        assert_eq!(first, FIRST_USER_CLASS_ID);
        assert_eq!(second, FIRST_USER_CLASS_ID + 1);
    }
}
