// File: src/value.rs
//
// The runtime value universe: tagged scalars plus reference-semantics
// tables and closures. Grounded on the reference implementation's
// `TableData`/`ClosureData` (missing-key-is-null, assign-null-deletes,
// `__base__` prototype chain, lazily-created closure variable maps).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::bytecode::{CodeProgram, FunctionConst};
use crate::errors::LucyError;

/// A hashable table key. Floats are keyed by bit pattern so the type can
/// implement `Eq`/`Hash` without pretending NaN-equality makes sense.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    String(String),
}

impl Key {
    pub fn from_value(value: &Value) -> Option<Key> {
        Some(match value {
            Value::Null => Key::Null,
            Value::Bool(b) => Key::Bool(*b),
            Value::Int(i) => Key::Int(*i),
            Value::Float(f) => Key::Float(f.to_bits()),
            Value::String(s) => Key::String(s.to_string()),
            Value::Table(_) | Value::Closure(_) => return None,
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Null => Value::Null,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Key::String(s) => Value::String(Rc::from(s.as_str())),
        }
    }
}

/// A host callable: exact arity plus a native closure over `Value` slices.
/// `name` is the binding the neutral serialization form refers to (§6.4).
pub struct NativeFn {
    pub name: String,
    pub call: Box<dyn Fn(&[Value]) -> Result<Value, LucyError>>,
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({})", self.name)
    }
}

/// Where a function's body lives: bytecode at an absolute offset inside a
/// specific module's code (kept alive by `Rc<CodeProgram>` so a closure can
/// outlive the `Vm` that compiled it — it may be called from an importer's
/// own `Vm` instance long after its defining module finished running), or a
/// host (`ExtendFunction`) callable.
#[derive(Debug)]
pub enum FunctionBody {
    Bytecode { program: Rc<CodeProgram>, address: usize },
    Native(Rc<NativeFn>),
}

/// A function descriptor. Function values are immutable (I5); calling one
/// allocates a fresh `ClosureData` sharing this descriptor and the capturing
/// `base_closure`.
#[derive(Debug)]
pub struct Function {
    pub params_num: usize,
    pub is_closure: bool,
    pub body: FunctionBody,
}

/// A local binding: an ordinary value, or a sentinel marking that loads and
/// stores of this name should redirect to the global frame (§4.4, §9).
#[derive(Debug, Clone)]
pub enum Binding {
    Value(Value),
    GlobalRef,
}

/// One closure activation's captured state: the function it runs, the
/// lexically enclosing activation it captured (`base_closure`, set only when
/// `is_closure`), the module-level activation its free names fall back to
/// (`global_closure`), and its own local variable map (created empty, grown
/// on first write — I3).
#[derive(Debug)]
pub struct ClosureData {
    pub function: Rc<Function>,
    pub base_closure: Option<Rc<ClosureData>>,
    pub global_closure: Option<Rc<ClosureData>>,
    pub variables: RefCell<HashMap<String, Binding>>,
}

impl ClosureData {
    pub fn new(
        function: Rc<Function>,
        base_closure: Option<Rc<ClosureData>>,
        global_closure: Option<Rc<ClosureData>>,
    ) -> Self {
        ClosureData { function, base_closure, global_closure, variables: RefCell::new(HashMap::new()) }
    }
}

/// A keyed container with reference semantics. Insertion order is tracked
/// separately from the lookup map so `table.keys`/`table.values` iterate in
/// a stable, predictable order.
#[derive(Debug, Default)]
pub struct Table {
    order: Vec<Key>,
    map: HashMap<Key, Value>,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    /// I1: missing key reads as `Null`; bypasses metamethods and the
    /// prototype chain (direct lookup only).
    pub fn raw_get(&self, key: &Key) -> Value {
        self.map.get(key).cloned().unwrap_or(Value::Null)
    }

    /// I1: assigning `Null` deletes the binding (P3).
    pub fn raw_set(&mut self, key: Key, value: Value) {
        if matches!(value, Value::Null) {
            if self.map.remove(&key).is_some() {
                self.order.retain(|existing| existing != &key);
            }
            return;
        }
        if !self.map.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.map.insert(key, value);
    }

    pub fn contains_direct(&self, key: &Key) -> bool {
        self.map.contains_key(key)
    }

    pub fn keys(&self) -> Vec<Key> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// The runtime value universe (§3.4).
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Table(Rc<RefCell<Table>>),
    Closure(Rc<ClosureData>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn new_table() -> Value {
        Value::Table(Rc::new(RefCell::new(Table::new())))
    }

    /// Wraps a Rust closure as a host (`ExtendFunction`) callable: a
    /// `ClosureData` whose body is `FunctionBody::Native` and which therefore
    /// never pushes a new bytecode frame when called (§6.2, §9.7).
    pub fn native_closure(
        name: &str,
        params_num: usize,
        call: impl Fn(&[Value]) -> Result<Value, LucyError> + 'static,
    ) -> Value {
        let function = Rc::new(Function {
            params_num,
            is_closure: false,
            body: FunctionBody::Native(Rc::new(NativeFn { name: name.to_string(), call: Box::new(call) })),
        });
        Value::Closure(Rc::new(ClosureData::new(function, None, None)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Closure(_) => "function",
        }
    }

    /// Strict boolean truthiness used by `JUMP_IF_*`/`NOT` (§9 open question:
    /// this language treats non-bool values in boolean-only positions as a
    /// `TYPE_ERROR`, never as implicit truthiness).
    pub fn as_strict_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_))
    }
}

/// Key-insensitive structural/reference equality used by `==`/`!=`, `IS`,
/// and table-key comparisons. Scalars compare by value; tables and closures
/// compare by reference identity (their reference semantics, §3.4).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Table(x), Value::Table(y)) => Rc::ptr_eq(x, y),
        (Value::Closure(x), Value::Closure(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// `Table.lookup` (I2, P4): the direct mapping, else a recursive walk of
/// `__base__`. Assumes a cycle-free prototype chain.
pub fn table_lookup(table: &Rc<RefCell<Table>>, key: &Key) -> Value {
    let direct = table.borrow().raw_get(key);
    if !matches!(direct, Value::Null) {
        return direct;
    }
    if matches!(key, Key::String(s) if s == "__base__") {
        return Value::Null;
    }
    let base = table.borrow().raw_get(&Key::String("__base__".to_string()));
    if let Value::Table(base_table) = base {
        return table_lookup(&base_table, key);
    }
    Value::Null
}

/// The metamethod lookup used by operator/indexing dispatch (§4.5, §4.7): the
/// *direct* mapping only, never inherited through `__base__` — a prototype's
/// metamethod does not fire for its children unless the child also carries
/// the key itself.
pub fn lookup_metamethod(table: &Rc<RefCell<Table>>, name: &str) -> Option<Value> {
    match table.borrow().raw_get(&Key::String(name.to_string())) {
        Value::Closure(c) => Some(Value::Closure(c)),
        _ => None,
    }
}

/// Wraps a compiled `Const::Function` as a runtime closure captured in
/// `frame` (the activation currently executing `LOAD_CONST`): `base_closure`
/// is set only when the function is marked closure (§9's capture-propagation
/// rule), `global_closure` is always the defining module's global frame so
/// the function resolves free names correctly even when called from a
/// different module's `Vm` after being exported (§6.3).
pub fn closure_from_const(
    program: Rc<CodeProgram>,
    fc: &FunctionConst,
    enclosing: Rc<ClosureData>,
    global: Rc<ClosureData>,
) -> Value {
    let function = Rc::new(Function {
        params_num: fc.params_num,
        is_closure: fc.is_closure,
        body: FunctionBody::Bytecode { program, address: fc.address },
    });
    let base_closure = if fc.is_closure { Some(enclosing) } else { None };
    Value::Closure(Rc::new(ClosureData::new(function, base_closure, Some(global))))
}

/// Converts a finished module's global activation into the `Table` value an
/// importer sees (§6.3): every live `Binding::Value` entry. `Binding::GlobalRef`
/// entries (from a top-level `global x;`, itself a no-op) are skipped — they
/// alias, they don't hold a value.
pub fn export_table(global: &Rc<ClosureData>) -> Value {
    let table = Rc::new(RefCell::new(Table::new()));
    for (name, binding) in global.variables.borrow().iter() {
        if let Binding::Value(value) = binding {
            table.borrow_mut().raw_set(Key::String(name.clone()), value.clone());
        }
    }
    Value::Table(table)
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Table(t) => write!(f, "Table(<{} entries>)", t.borrow().len()),
            Value::Closure(c) => match &c.function.body {
                FunctionBody::Bytecode { address, .. } => {
                    write!(f, "Closure(params={}, addr={})", c.function.params_num, address)
                }
                FunctionBody::Native(n) => write!(f, "Closure(native={})", n.name),
            },
        }
    }
}

/// Rendering used by `stdio.print`/`println` and table-key display.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Table(_) => write!(f, "<table>"),
            Value::Closure(_) => write!(f, "<function>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_null_assignment_deletes() {
        let table = Rc::new(RefCell::new(Table::new()));
        table.borrow_mut().raw_set(Key::String("a".into()), Value::Int(1));
        assert!(values_equal(&table.borrow().raw_get(&Key::String("a".into())), &Value::Int(1)));
        table.borrow_mut().raw_set(Key::String("a".into()), Value::Null);
        assert!(values_equal(&table.borrow().raw_get(&Key::String("a".into())), &Value::Null));
        assert!(!table.borrow().contains_direct(&Key::String("a".into())));
    }

    #[test]
    fn prototype_lookup_walks_base() {
        let base = Rc::new(RefCell::new(Table::new()));
        base.borrow_mut().raw_set(Key::String("greet".into()), Value::string("hi"));
        let child = Rc::new(RefCell::new(Table::new()));
        child.borrow_mut().raw_set(Key::String("__base__".into()), Value::Table(base.clone()));

        let looked_up = table_lookup(&child, &Key::String("greet".into()));
        assert!(values_equal(&looked_up, &Value::string("hi")));
    }
}
