// File: src/builtins.rs
//
// Host-function bridge. Every builtin is an `ExtendFunction`-style native
// closure — a Rust `Fn` wrapped in a `ClosureData` with no Lucy-level body —
// reachable either through the bare `builtin_namespace` (`type`, `assert`)
// or through an importable library table (`stdio`, `convert`, `table`).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use crate::errors::{ErrorKind, LucyError, SourceLocation};
use crate::value::{Key, NativeFn, Table, Value};

fn native(name: &str, params_num: usize, call: impl Fn(&[Value]) -> Result<Value, LucyError> + 'static) -> Value {
    Value::native_closure(name, params_num, call)
}

/// Where `stdio.print`/`println` write. Defaults to the real process stdout;
/// `lucy test` substitutes a capture buffer so a script's output can be
/// diffed against a golden file — the same role `ruff`'s
/// `Interpreter::set_output` plays for its own test runner, minus the
/// thread-safety that engine's async runtime needed and this one has no use
/// for (everything here is single-threaded, so `Rc<RefCell<_>>` suffices).
#[derive(Clone)]
pub enum OutputSink {
    Stdout,
    Capture(Rc<RefCell<String>>),
}

impl Default for OutputSink {
    fn default() -> Self {
        OutputSink::Stdout
    }
}

impl OutputSink {
    fn write(&self, text: &str) {
        match self {
            OutputSink::Stdout => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            OutputSink::Capture(buffer) => buffer.borrow_mut().push_str(text),
        }
    }
}

fn want_arity(name: &str, args: &[Value], expected: usize) -> Result<(), LucyError> {
    if args.len() != expected {
        return Err(LucyError::call_error(
            format!("'{name}' requires {expected} arguments, but {} was given", args.len()),
            SourceLocation::unknown(),
        ));
    }
    Ok(())
}

fn lucy_type(args: &[Value]) -> Result<Value, LucyError> {
    want_arity("type", args, 1)?;
    Ok(Value::string(args[0].type_name()))
}

fn lucy_assert(args: &[Value]) -> Result<Value, LucyError> {
    want_arity("assert", args, 1)?;
    match &args[0] {
        Value::Null | Value::Bool(false) => {
            Err(LucyError::new(ErrorKind::AssertError, "assertion failed".to_string(), SourceLocation::unknown()))
        }
        other => Ok(other.clone()),
    }
}

/// The always-present bare namespace consulted last in name resolution.
pub fn builtin_namespace() -> HashMap<String, Value> {
    let mut map = HashMap::new();
    map.insert("type".to_string(), native("type", 1, lucy_type));
    map.insert("assert".to_string(), native("assert", 1, lucy_assert));
    map
}

fn stdio_table(output: &OutputSink) -> Value {
    let table = Table::new();
    let value = Value::Table(Rc::new(std::cell::RefCell::new(table)));
    let Value::Table(rc) = &value else { unreachable!() };

    let print_sink = output.clone();
    rc.borrow_mut().raw_set(
        Key::String("print".to_string()),
        native("print", 1, move |args| {
            want_arity("print", args, 1)?;
            print_sink.write(&args[0].to_string());
            Ok(Value::Null)
        }),
    );
    let println_sink = output.clone();
    rc.borrow_mut().raw_set(
        Key::String("println".to_string()),
        native("println", 1, move |args| {
            want_arity("println", args, 1)?;
            println_sink.write(&format!("{}\n", args[0]));
            Ok(Value::Null)
        }),
    );
    rc.borrow_mut().raw_set(
        Key::String("input".to_string()),
        native("input", 0, |args| {
            want_arity("input", args, 0)?;
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .map_err(|e| LucyError::call_error(format!("input failed: {e}"), SourceLocation::unknown()))?;
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            Ok(Value::string(line))
        }),
    );
    value
}

fn convert_table() -> Value {
    let table = Table::new();
    let value = Value::Table(Rc::new(std::cell::RefCell::new(table)));
    let Value::Table(rc) = &value else { unreachable!() };

    rc.borrow_mut().raw_set(
        Key::String("boolean".to_string()),
        native("boolean", 1, |args| {
            want_arity("boolean", args, 1)?;
            Ok(Value::Bool(as_bool(&args[0])))
        }),
    );
    rc.borrow_mut().raw_set(
        Key::String("integer".to_string()),
        native("integer", 1, |args| {
            want_arity("integer", args, 1)?;
            as_int(&args[0]).map(Value::Int)
        }),
    );
    rc.borrow_mut().raw_set(
        Key::String("float".to_string()),
        native("float", 1, |args| {
            want_arity("float", args, 1)?;
            as_float(&args[0]).map(Value::Float)
        }),
    );
    rc.borrow_mut().raw_set(
        Key::String("string".to_string()),
        native("string", 1, |args| {
            want_arity("string", args, 1)?;
            Ok(Value::string(args[0].to_string()))
        }),
    );
    value
}

fn as_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Table(_) | Value::Closure(_) => true,
    }
}

fn as_int(value: &Value) -> Result<i64, LucyError> {
    match value {
        Value::Bool(b) => Ok(if *b { 1 } else { 0 }),
        Value::Int(i) => Ok(*i),
        Value::Float(f) => Ok(*f as i64),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| LucyError::type_error(format!("cannot convert '{s}' to int"), SourceLocation::unknown())),
        other => {
            Err(LucyError::type_error(format!("cannot convert {} to int", other.type_name()), SourceLocation::unknown()))
        }
    }
}

fn as_float(value: &Value) -> Result<f64, LucyError> {
    match value {
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| LucyError::type_error(format!("cannot convert '{s}' to float"), SourceLocation::unknown())),
        other => Err(LucyError::type_error(
            format!("cannot convert {} to float", other.type_name()),
            SourceLocation::unknown(),
        )),
    }
}

fn table_lib_table() -> Value {
    let table = Table::new();
    let value = Value::Table(Rc::new(std::cell::RefCell::new(table)));
    let Value::Table(rc) = &value else { unreachable!() };

    rc.borrow_mut().raw_set(
        Key::String("keys".to_string()),
        native("keys", 1, |args| {
            want_arity("keys", args, 1)?;
            let Value::Table(t) = &args[0] else {
                return Err(LucyError::type_error("keys() requires a table".to_string(), SourceLocation::unknown()));
            };
            let snapshot = t.borrow().keys();
            let cursor = Rc::new(Cell::new(0usize));
            Ok(native("keys_iterator", 0, move |inner_args| {
                want_arity("keys_iterator", inner_args, 0)?;
                let i = cursor.get();
                if i >= snapshot.len() {
                    return Ok(Value::Null);
                }
                cursor.set(i + 1);
                Ok(snapshot[i].to_value())
            }))
        }),
    );
    rc.borrow_mut().raw_set(
        Key::String("values".to_string()),
        native("values", 1, |args| {
            want_arity("values", args, 1)?;
            let Value::Table(t) = &args[0] else {
                return Err(LucyError::type_error("values() requires a table".to_string(), SourceLocation::unknown()));
            };
            let borrowed = t.borrow();
            let snapshot: Vec<Value> = borrowed.keys().iter().map(|k| borrowed.raw_get(k)).collect();
            drop(borrowed);
            let cursor = Rc::new(Cell::new(0usize));
            Ok(native("values_iterator", 0, move |inner_args| {
                want_arity("values_iterator", inner_args, 0)?;
                let i = cursor.get();
                if i >= snapshot.len() {
                    return Ok(Value::Null);
                }
                cursor.set(i + 1);
                Ok(snapshot[i].clone())
            }))
        }),
    );
    rc.borrow_mut().raw_set(
        Key::String("raw_len".to_string()),
        native("raw_len", 1, |args| {
            want_arity("raw_len", args, 1)?;
            let Value::Table(t) = &args[0] else {
                return Err(LucyError::type_error("raw_len() requires a table".to_string(), SourceLocation::unknown()));
            };
            Ok(Value::Int(t.borrow().len() as i64))
        }),
    );
    rc.borrow_mut().raw_set(
        Key::String("raw_get".to_string()),
        native("raw_get", 2, |args| {
            want_arity("raw_get", args, 2)?;
            let Value::Table(t) = &args[0] else {
                return Err(LucyError::type_error("raw_get() requires a table".to_string(), SourceLocation::unknown()));
            };
            let Some(key) = Key::from_value(&args[1]) else {
                return Err(LucyError::type_error("raw_get() key is not hashable".to_string(), SourceLocation::unknown()));
            };
            Ok(crate::value::table_lookup(t, &key))
        }),
    );
    rc.borrow_mut().raw_set(
        Key::String("raw_set".to_string()),
        native("raw_set", 3, |args| {
            want_arity("raw_set", args, 3)?;
            let Value::Table(t) = &args[0] else {
                return Err(LucyError::type_error("raw_set() requires a table".to_string(), SourceLocation::unknown()));
            };
            let Some(key) = Key::from_value(&args[1]) else {
                return Err(LucyError::type_error("raw_set() key is not hashable".to_string(), SourceLocation::unknown()));
            };
            t.borrow_mut().raw_set(key, args[2].clone());
            Ok(Value::Null)
        }),
    );
    value
}

/// Resolves the first (leftmost) segment of an import path to a builtin
/// library table, if one by that name exists.
pub fn library_table(name: &str, output: &OutputSink) -> Option<Value> {
    match name {
        "stdio" => Some(stdio_table(output)),
        "convert" => Some(convert_table()),
        "table" => Some(table_lib_table()),
        _ => None,
    }
}
