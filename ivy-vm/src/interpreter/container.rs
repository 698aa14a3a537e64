//! Subscripts, properties, builders, variants, and instances.

use std::rc::Rc;

use ivy_asm::{Opcode, INDEX_ERROR_ID, KEY_ERROR_ID, NONE_ID, SOME_ID};

use crate::error::{OpResult, Raise};
use crate::hash::{HashBody, HashKey};
use crate::interpreter::Vm;
use crate::unicode::wrap_index;
use crate::value::{ContainerBody, ContainerKind, Value};

impl Vm {
    fn boundary_error(&mut self, bad_index: i64) -> Raise {
        self.error(
            INDEX_ERROR_ID,
            format!("Subscript index {bad_index} is out of range."),
        )
    }

    pub(crate) fn key_error(&mut self, key: &HashKey) -> Raise {
        self.error(KEY_ERROR_ID, key.to_string())
    }

    /// `get_item source, index, dst`. Lists and tuples share subscript
    /// behavior; bytestrings read single bytes; hashes look keys up by
    /// equality and a miss raises `KeyError` carrying the key.
    pub(crate) fn op_get_item(&mut self, code: &[u16]) -> OpResult<()> {
        let source = self.local_cloned(code[2]);
        let index = self.local_cloned(code[3]);

        let out = match &source {
            Value::Hash(body) => {
                let key = hash_key(&index);
                match body.find(&key) {
                    Some(value) => value,
                    None => return Err(self.key_error(&key)),
                }
            }
            Value::Bytes(bytes) => {
                let raw = bytes.borrow();
                let wanted = subscript(&index);
                match wrap_index(wanted, raw.len()) {
                    Some(at) => Value::Byte(raw[at]),
                    None => return Err(self.boundary_error(wanted)),
                }
            }
            Value::Container(body) => {
                let wanted = subscript(&index);
                match wrap_index(wanted, body.len()) {
                    Some(at) => body.get(at),
                    None => return Err(self.boundary_error(wanted)),
                }
            }
            other => panic!("subscript read on class {}", other.class_id()),
        };

        self.set_local(code[4], out);
        Ok(())
    }

    /// `set_item target, index, src`.
    pub(crate) fn op_set_item(&mut self, code: &[u16]) -> OpResult<()> {
        let target = self.local_cloned(code[2]);
        let index = self.local_cloned(code[3]);
        let value = self.local_cloned(code[4]);

        match &target {
            Value::Hash(body) => {
                body.insert(hash_key(&index), value);
            }
            Value::Bytes(bytes) => {
                let wanted = subscript(&index);
                let len = bytes.borrow().len();
                match wrap_index(wanted, len) {
                    Some(at) => {
                        bytes.borrow_mut()[at] = match value {
                            Value::Byte(b) => b,
                            Value::Integer(i) => i as u8,
                            other => panic!("byte write of class {}", other.class_id()),
                        };
                    }
                    None => return Err(self.boundary_error(wanted)),
                }
            }
            Value::Container(body) => {
                let wanted = subscript(&index);
                match wrap_index(wanted, body.len()) {
                    Some(at) => body.set(at, value),
                    None => return Err(self.boundary_error(wanted)),
                }
            }
            other => panic!("subscript write on class {}", other.class_id()),
        }

        Ok(())
    }

    /// `get_property prop, source, dst`. Instances are containers, so a
    /// property read is a subscript with a bytecode-fixed index.
    pub(crate) fn op_get_property(&mut self, code: &[u16]) {
        let source = container(self.local(code[3]));
        let value = source.get(code[2] as usize);
        self.set_local(code[4], value);
    }

    /// `set_property prop, target, src`.
    pub(crate) fn op_set_property(&mut self, code: &[u16]) {
        let target = container(self.local(code[3]));
        let value = self.local_cloned(code[4]);
        target.set(code[2] as usize, value);
    }

    /// `build_list`/`build_tuple count, srcs…, dst`.
    pub(crate) fn op_build_list_tuple(&mut self, op: Opcode, code: &[u16]) {
        let count = code[2] as usize;
        let values: Vec<Value> = (0..count)
            .map(|i| self.local_cloned(code[3 + i]))
            .collect();

        let body = if op == Opcode::BuildList {
            ContainerBody::list(values)
        } else {
            ContainerBody::tuple(values)
        };

        self.set_local(code[3 + count], Value::Container(Rc::new(body)));
    }

    /// `build_hash key_class, count, k/v srcs…, dst`. The key class picked
    /// the backing table in the original; here both key classes share one
    /// table and the operand is kept for the encoding contract.
    pub(crate) fn op_build_hash(&mut self, code: &[u16]) {
        let count = code[3] as usize;
        let body = HashBody::new();

        for i in (0..count).step_by(2) {
            let key = hash_key(&self.local_cloned(code[4 + i]));
            let value = self.local_cloned(code[4 + i + 1]);
            body.insert(key, value);
        }

        self.set_local(code[4 + count], Value::Hash(Rc::new(body)));
    }

    /// `build_enum variant_class, count, srcs…, dst`.
    pub(crate) fn op_build_enum(&mut self, code: &[u16]) {
        let count = code[3] as usize;
        let values: Vec<Value> = (0..count)
            .map(|i| self.local_cloned(code[4 + i]))
            .collect();

        let body = ContainerBody::variant(code[2], values);
        self.set_local(code[4 + count], Value::Container(Rc::new(body)));
    }

    /// `variant_decompose src, count, dsts…`: map each variant field away
    /// to a register. The emitter never decomposes past the field count.
    pub(crate) fn op_variant_decompose(&mut self, code: &[u16]) {
        let source = container(self.local(code[2]));
        let count = code[3] as usize;

        for i in 0..count {
            let value = source.get(i);
            self.set_local(code[4 + i], value);
        }
    }

    /// `interpolation count, srcs…, dst`: stringify every source into the
    /// shared scratch buffer and store the concatenation.
    pub(crate) fn op_interpolation(&mut self, code: &[u16]) {
        let count = code[2] as usize;
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();

        for i in 0..count {
            let value = self.local_cloned(code[3 + i]);
            self.render_value(&value, &mut buffer, false);
        }

        self.set_local(code[3 + count], Value::string(&buffer));
        self.buffer = buffer;
    }

    /// `dynamic_cast class, src, dst`: `Some(inner)` when the boxed
    /// value's class matches, `None` otherwise.
    pub(crate) fn op_dynamic_cast(&mut self, code: &[u16]) {
        let inner = match self.local(code[3]) {
            Value::Dynamic(body) => body.slot.borrow().clone(),
            other => panic!("dynamic_cast on class {}", other.class_id()),
        };

        let out = if inner.class_id() == code[2] {
            Value::Container(Rc::new(ContainerBody::variant(SOME_ID, vec![inner])))
        } else {
            Value::EmptyVariant(NONE_ID)
        };

        self.set_local(code[4], out);
    }

    /// `new_instance_* class, dst`: construct an instance, or reuse the
    /// one a subclass constructor lower on the chain is already building.
    pub(crate) fn op_new_instance(&mut self, op: Opcode, code: &[u16]) {
        // Is the caller a superclass building an instance already?
        let pending = self
            .cur()
            .return_target
            .map(|target| self.regs[target].clone());

        if let Some(Value::Container(body)) = pending {
            if body.kind() == ContainerKind::Instance && body.ctor_need.get() > 0 {
                body.ctor_need.set(body.ctor_need.get() - 1);
                self.set_local(code[3], Value::Container(body));
                return;
            }
        }

        let class_id = code[2];
        self.ensure_exception_class(class_id);

        let class = self
            .classes
            .get(class_id as usize)
            .and_then(|slot| slot.as_ref())
            .expect("instance class missing from the class table");

        let body = ContainerBody::instance(class_id, class.prop_count as usize);
        body.ctor_need.set(class.inherit_depth);

        let value = Value::Container(Rc::new(body));
        self.set_local(code[3], value.clone());

        if op == Opcode::NewInstanceTagged {
            self.tag_value(&value);
        }
    }
}

fn subscript(index: &Value) -> i64 {
    match index {
        Value::Integer(i) => *i,
        other => panic!("subscript index of class {}", other.class_id()),
    }
}

fn hash_key(value: &Value) -> HashKey {
    HashKey::from_value(value)
        .unwrap_or_else(|| panic!("hash key of class {}", value.class_id()))
}

fn container(value: &Value) -> Rc<ContainerBody> {
    match value {
        Value::Container(body) => body.clone(),
        other => panic!("container operation on class {}", other.class_id()),
    }
}
