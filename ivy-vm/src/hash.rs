//! Hash table payloads.
//!
//! Hashes are keyed by Integer or String; the emitter guarantees one key
//! class per hash. Structural mutation is guarded against live iteration
//! with `iter_count`: the iteration helpers bump it, run their callbacks,
//! and decrement it on every exit, so any key removal attempted inside a
//! callback observes a nonzero count and raises.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use hashbrown::HashMap;

use crate::value::{GcState, Value};

/// A hash key; equality and hashing follow the payload, not the handle.
///
/// The display form is what `KeyError` messages carry: strings are
/// escaped and quoted, integers print bare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum HashKey {
    /// An integer key.
    #[display(fmt = "{}", _0)]
    Int(i64),
    /// A string key.
    #[display(fmt = "{:?}", _0)]
    Str(Rc<str>),
}

impl HashKey {
    /// View a value as a key. Only Integer and String values key hashes.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(Self::Int(*i)),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    /// The key as a register value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::Integer(*i),
            Self::Str(s) => Value::String(s.clone()),
        }
    }

}

/// Payload of a `Hash` value.
#[derive(Debug, Default)]
pub struct HashBody {
    /// The backing table.
    pub map: RefCell<HashMap<HashKey, Value>>,
    /// Live iterations over this hash. Nonzero rejects key removal.
    pub iter_count: Cell<u32>,
    pub(crate) gc: GcState,
}

impl HashBody {
    /// An empty hash.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    /// Whether the hash has no entries.
    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }

    /// Copy of the value stored under `key`.
    pub fn find(&self, key: &HashKey) -> Option<Value> {
        self.map.borrow().get(key).cloned()
    }

    /// Insert or overwrite `key`.
    pub fn insert(&self, key: HashKey, value: Value) {
        self.map.borrow_mut().insert(key, value);
    }

    /// Whether removal is currently forbidden.
    pub fn iterating(&self) -> bool {
        self.iter_count.get() > 0
    }

    /// Remove `key`, returning whether it was present. The caller must
    /// have checked [`iterating`](Self::iterating) first.
    pub fn remove(&self, key: &HashKey) -> bool {
        self.map.borrow_mut().remove(key).is_some()
    }

    /// Drop every entry. The caller must have checked
    /// [`iterating`](Self::iterating) first.
    pub fn clear(&self) {
        self.map.borrow_mut().clear();
    }

    /// Snapshot of the entries, used by the iteration helpers so callbacks
    /// can insert without invalidating the walk.
    pub fn pairs(&self) -> Vec<(HashKey, Value)> {
        self.map
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_by_content() {
        let a = HashKey::from_value(&Value::string("k")).unwrap();
        let b = HashKey::from_value(&Value::string("k")).unwrap();
        assert_eq!(a, b);

        let body = HashBody::new();
        body.insert(a, Value::Integer(1));
        assert_eq!(body.len(), 1);
        assert!(body.find(&b).is_some());
    }

    #[test]
    fn only_integers_and_strings_key_hashes() {
        assert!(HashKey::from_value(&Value::Integer(1)).is_some());
        assert!(HashKey::from_value(&Value::string("x")).is_some());
        assert!(HashKey::from_value(&Value::Unit).is_none());
        assert!(HashKey::from_value(&Value::list(vec![])).is_none());
    }

    #[test]
    fn key_rendering() {
        assert_eq!(HashKey::Int(-3).to_string(), "-3");
        assert_eq!(HashKey::Str("a\nb".into()).to_string(), "\"a\\nb\"");
    }
}
