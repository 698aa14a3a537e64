//! Built-in foreign functions.
//!
//! These are ordinary foreign functions: they read arguments, may re-enter
//! the interpreter through the foreign-call API, and write a typed result
//! into their return target. [`function`] resolves them by the dotted
//! names the emitter uses in its readonly table.

use std::fs::OpenOptions;
use std::rc::Rc;

use ivy_asm::{IO_ERROR_ID, RUNTIME_ERROR_ID, VALUE_ERROR_ID};

use crate::error::OpResult;
use crate::hash::{HashBody, HashKey};
use crate::interpreter::Vm;
use crate::unicode::{self, StripSide};
use crate::value::{DynamicBody, FileBody, FunctionBody, Value};

const CLOSED_FILE: &str = "IO operation on closed file.";
const MUTATION_DURING_ITERATION: &str = "Cannot remove key from hash during iteration.";

/// Resolve a built-in by the name the emitter stores it under.
pub fn function(name: &str) -> Option<FunctionBody> {
    let body = match name {
        "print" => FunctionBody::foreign("print", print),
        "calltrace" => FunctionBody::foreign("calltrace", calltrace),
        "assert" => FunctionBody::foreign("assert", assert),
        "Dynamic.new" => FunctionBody::foreign_method("Dynamic", "new", dynamic_new),
        "List.push" => FunctionBody::foreign_method("List", "push", list_push),
        "List.size" => FunctionBody::foreign_method("List", "size", list_size),
        "List.join" => FunctionBody::foreign_method("List", "join", list_join),
        "Hash.size" => FunctionBody::foreign_method("Hash", "size", hash_size),
        "Hash.delete" => FunctionBody::foreign_method("Hash", "delete", hash_delete),
        "Hash.clear" => FunctionBody::foreign_method("Hash", "clear", hash_clear),
        "Hash.each_pair" => FunctionBody::foreign_method("Hash", "each_pair", hash_each_pair),
        "Hash.map_values" => FunctionBody::foreign_method("Hash", "map_values", hash_map_values),
        "Hash.select" => FunctionBody::foreign_method("Hash", "select", hash_select),
        "Hash.reject" => FunctionBody::foreign_method("Hash", "reject", hash_reject),
        "String.size" => FunctionBody::foreign_method("String", "size", string_size),
        "String.split" => FunctionBody::foreign_method("String", "split", string_split),
        "String.slice" => FunctionBody::foreign_method("String", "slice", string_slice),
        "String.strip" => FunctionBody::foreign_method("String", "strip", string_strip),
        "String.lstrip" => FunctionBody::foreign_method("String", "lstrip", string_lstrip),
        "String.rstrip" => FunctionBody::foreign_method("String", "rstrip", string_rstrip),
        "ByteString.size" => FunctionBody::foreign_method("ByteString", "size", bytes_size),
        "ByteString.slice" => FunctionBody::foreign_method("ByteString", "slice", bytes_slice),
        "File.open" => FunctionBody::foreign_method("File", "open", file_open),
        "File.read" => FunctionBody::foreign_method("File", "read", file_read),
        "File.write" => FunctionBody::foreign_method("File", "write", file_write),
        "File.close" => FunctionBody::foreign_method("File", "close", file_close),
        _ => return None,
    };

    Some(body)
}

fn print(vm: &mut Vm) -> OpResult<()> {
    let stdout = vm.stdout_file.clone();
    if stdout.is_closed() {
        return vm.raise_value_error(CLOSED_FILE);
    }

    let text = match vm.arg(0) {
        Value::String(s) => s.to_string(),
        other => vm.render_to_string(&other.clone()),
    };

    if let Err(error) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.write_all(b"\n")) {
        return vm.raise_io_error(format!("Could not write to stdout ({error})."));
    }

    vm.return_unit();
    Ok(())
}

fn calltrace(vm: &mut Vm) -> OpResult<()> {
    // `calltrace` itself is the current frame; it has no place in its own
    // output.
    vm.include_last_frame_in_trace = false;
    let trace = vm.traceback_value();

    vm.return_moved(trace);
    Ok(())
}

fn assert(vm: &mut Vm) -> OpResult<()> {
    if vm.arg_boolean(0) {
        vm.return_unit();
        return Ok(());
    }

    let message = if vm.arg_count() == 2 {
        vm.arg_string(1).to_string()
    } else {
        String::new()
    };

    vm.include_last_frame_in_trace = false;
    vm.raise_assertion_error(message)
}

fn dynamic_new(vm: &mut Vm) -> OpResult<()> {
    let inner = vm.arg(0).clone();

    let value = Value::Dynamic(Rc::new(DynamicBody::new(inner)));
    vm.return_value(&value);
    vm.tag_value(&value);

    Ok(())
}

fn list_push(vm: &mut Vm) -> OpResult<()> {
    let list = vm.arg_container(0);
    let value = vm.arg(1).clone();

    // Pushing a sweepable value is how a list can close a cycle over
    // itself, so that is the moment it starts being tracked.
    if value.is_sweepable() {
        vm.tag_value(&Value::Container(list.clone()));
    }

    list.values.borrow_mut().push(value);
    vm.return_unit();
    Ok(())
}

fn list_size(vm: &mut Vm) -> OpResult<()> {
    let list = vm.arg_container(0);
    vm.return_integer(list.len() as i64);
    Ok(())
}

fn list_join(vm: &mut Vm) -> OpResult<()> {
    let list = vm.arg_container(0);
    let separator = vm.arg_string(1);

    let mut out = String::new();
    for (i, value) in list.values.borrow().iter().enumerate() {
        if i != 0 {
            out.push_str(&separator);
        }

        match value {
            Value::String(s) => out.push_str(s),
            other => vm.render_value(other, &mut out, false),
        }
    }

    vm.return_string(out);
    Ok(())
}

fn hash_size(vm: &mut Vm) -> OpResult<()> {
    let hash = vm.arg_hash(0);
    vm.return_integer(hash.len() as i64);
    Ok(())
}

fn hash_delete(vm: &mut Vm) -> OpResult<()> {
    let hash = vm.arg_hash(0);
    if hash.iterating() {
        return Err(vm.error(RUNTIME_ERROR_ID, MUTATION_DURING_ITERATION));
    }

    let key = HashKey::from_value(vm.arg(1)).expect("hash key class");
    hash.remove(&key);

    vm.return_unit();
    Ok(())
}

fn hash_clear(vm: &mut Vm) -> OpResult<()> {
    let hash = vm.arg_hash(0);
    if hash.iterating() {
        return Err(vm.error(RUNTIME_ERROR_ID, MUTATION_DURING_ITERATION));
    }

    hash.clear();
    vm.return_unit();
    Ok(())
}

/// Run `per_pair` over a snapshot of the hash with the iteration guard
/// held. The guard always drops, raise or no raise.
fn hash_iterate<F>(vm: &mut Vm, hash: &Rc<HashBody>, mut per_pair: F) -> OpResult<()>
where
    F: FnMut(&mut Vm, HashKey, Value) -> OpResult<()>,
{
    hash.iter_count.set(hash.iter_count.get() + 1);

    let mut outcome = Ok(());
    for (key, value) in hash.pairs() {
        outcome = per_pair(vm, key, value);
        if outcome.is_err() {
            break;
        }
    }

    hash.iter_count.set(hash.iter_count.get() - 1);
    outcome
}

fn hash_each_pair(vm: &mut Vm) -> OpResult<()> {
    let hash = vm.arg_hash(0);
    let callback = vm.arg_function(1);

    hash_iterate(vm, &hash, |vm, key, value| {
        vm.call_prepare(&callback);
        vm.push_value(key.to_value());
        vm.push_value(value);
        vm.call_exec_prepared(2)
    })?;

    vm.return_unit();
    Ok(())
}

fn hash_map_values(vm: &mut Vm) -> OpResult<()> {
    let hash = vm.arg_hash(0);
    let callback = vm.arg_function(1);
    let mapped = HashBody::new();

    hash_iterate(vm, &hash, |vm, key, value| {
        vm.call_prepare(&callback);
        vm.push_value(value);
        vm.call_exec_prepared(1)?;
        mapped.insert(key, vm.call_result());
        Ok(())
    })?;

    vm.return_moved(Value::Hash(Rc::new(mapped)));
    Ok(())
}

fn hash_filter(vm: &mut Vm, keep_on: bool) -> OpResult<()> {
    let hash = vm.arg_hash(0);
    let callback = vm.arg_function(1);
    let kept = HashBody::new();

    hash_iterate(vm, &hash, |vm, key, value| {
        vm.call_prepare(&callback);
        vm.push_value(key.to_value());
        vm.push_value(value.clone());
        vm.call_exec_prepared(2)?;

        if let Value::Boolean(verdict) = vm.call_result() {
            if verdict == keep_on {
                kept.insert(key, value);
            }
        }

        Ok(())
    })?;

    vm.return_moved(Value::Hash(Rc::new(kept)));
    Ok(())
}

fn hash_select(vm: &mut Vm) -> OpResult<()> {
    hash_filter(vm, true)
}

fn hash_reject(vm: &mut Vm) -> OpResult<()> {
    hash_filter(vm, false)
}

fn string_size(vm: &mut Vm) -> OpResult<()> {
    let s = vm.arg_string(0);
    vm.return_integer(s.len() as i64);
    Ok(())
}

fn string_split(vm: &mut Vm) -> OpResult<()> {
    let source = vm.arg_string(0);
    let separator = vm.arg_string(1);

    if separator.is_empty() {
        return Err(vm.error(VALUE_ERROR_ID, "Cannot split by empty string."));
    }

    let parts = source
        .split(separator.as_ref())
        .map(Value::string)
        .collect();

    vm.return_list(parts);
    Ok(())
}

fn string_slice(vm: &mut Vm) -> OpResult<()> {
    let source = vm.arg_string(0);
    let start = vm.arg_integer(1);
    let stop = vm.arg_integer(2);

    let sliced = unicode::str_slice(&source, start, stop).unwrap_or("");
    vm.return_string(sliced.to_string());
    Ok(())
}

fn string_strip_side(vm: &mut Vm, side: StripSide) -> OpResult<()> {
    let source = vm.arg_string(0);
    let strip_set = vm.arg_string(1);

    vm.return_string(unicode::strip(&source, &strip_set, side));
    Ok(())
}

fn string_strip(vm: &mut Vm) -> OpResult<()> {
    string_strip_side(vm, StripSide::Both)
}

fn string_lstrip(vm: &mut Vm) -> OpResult<()> {
    string_strip_side(vm, StripSide::Left)
}

fn string_rstrip(vm: &mut Vm) -> OpResult<()> {
    string_strip_side(vm, StripSide::Right)
}

fn bytes_size(vm: &mut Vm) -> OpResult<()> {
    let bytes = vm.arg_bytes(0);
    let len = bytes.borrow().len();
    vm.return_integer(len as i64);
    Ok(())
}

fn bytes_slice(vm: &mut Vm) -> OpResult<()> {
    let bytes = vm.arg_bytes(0);
    let start = vm.arg_integer(1);
    let stop = vm.arg_integer(2);

    let raw = bytes.borrow();
    let sliced = unicode::bytes_slice(&raw, start, stop)
        .unwrap_or(&[])
        .to_vec();
    drop(raw);

    vm.return_bytes(sliced);
    Ok(())
}

fn file_open(vm: &mut Vm) -> OpResult<()> {
    let path = vm.arg_string(0);
    let mode = vm.arg_string(1);

    let (readable, writable, options) = match mode.as_ref() {
        "r" => (true, false, OpenOptions::new().read(true).clone()),
        "w" => (
            false,
            true,
            OpenOptions::new().write(true).create(true).truncate(true).clone(),
        ),
        "a" => (
            false,
            true,
            OpenOptions::new().append(true).create(true).clone(),
        ),
        other => {
            return Err(vm.error(IO_ERROR_ID, format!("Invalid mode '{other}' given.")));
        }
    };

    match options.open(path.as_ref()) {
        Ok(handle) => {
            let file = FileBody::from_handle(handle, readable, writable);
            vm.return_moved(Value::File(Rc::new(file)));
            Ok(())
        }
        Err(error) => vm.raise_io_error(format!("Could not open '{path}' ({error}).")),
    }
}

fn file_read(vm: &mut Vm) -> OpResult<()> {
    let file = vm.arg_file(0);
    let want = vm.arg_integer(1);

    if file.is_closed() {
        return vm.raise_value_error(CLOSED_FILE);
    }

    if !file.readable {
        return vm.raise_io_error("File not open for reading.");
    }

    // A negative byte count reads to end-of-stream; anything else is the
    // budget, with the read stopping early when the stream runs dry.
    let budget = (want >= 0).then_some(want as usize);

    match file.read(budget) {
        Ok(data) => {
            vm.return_bytes(data);
            Ok(())
        }
        Err(error) => vm.raise_io_error(format!("Read failed ({error}).")),
    }
}

fn file_write(vm: &mut Vm) -> OpResult<()> {
    let file = vm.arg_file(0);

    if file.is_closed() {
        return vm.raise_value_error(CLOSED_FILE);
    }

    if !file.writable {
        return vm.raise_io_error("File not open for writing.");
    }

    let data = match vm.arg(1) {
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Bytes(b) => b.borrow().clone(),
        other => panic!("File.write of class {}", other.class_id()),
    };

    match file.write_all(&data) {
        Ok(()) => {
            vm.return_unit();
            Ok(())
        }
        Err(error) => vm.raise_io_error(format!("Write failed ({error}).")),
    }
}

fn file_close(vm: &mut Vm) -> OpResult<()> {
    let file = vm.arg_file(0);
    file.close();
    vm.return_unit();
    Ok(())
}
