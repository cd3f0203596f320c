// File: src/vm.rs
//
// The bytecode VM. One `Vm` runs one module's `CodeProgram` to completion;
// importing another `.lucy` file spawns a fresh `Vm` over its own program
// rather than multiplexing several programs through one shared machine —
// imports always run to completion before the importer resumes, so nothing
// is lost by giving each module its own tiny interpreter (see DESIGN.md).
//
// Calls recurse through ordinary Rust function calls instead of the
// resumable-by-flag call machinery a flat bytecode loop needs in languages
// without a usable native stack: `CALL`, `GOTO`, the iterator protocol, and
// every metamethod dispatch all funnel through `Vm::call`, which either
// invokes a host closure directly or pushes a fresh `Frame` and recurses
// into `run_frame`. `GOTO` is simply a call whose result is returned as the
// current frame's own result — true tail-call elimination at the Lucy
// level, though not at the Rust call-stack level (bounded by `MAX_DEPTH`).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::{CodeProgram, Const, OpCode};
use crate::errors::{ErrorKind, LucyError, SourceLocation};
use crate::module::ModuleLoader;
use crate::value::{
    closure_from_const, export_table as value_export_table, lookup_metamethod, table_lookup, Binding, ClosureData,
    FunctionBody, Key, Table, Value,
};

/// Recursion guard for `Vm::call`. Lucy has no tail-call-at-the-host-stack
/// guarantee (see module docs); this bounds how deep nested/recursive Lucy
/// calls may go before we raise a catchable error instead of aborting.
const MAX_CALL_DEPTH: usize = 2000;

fn type_error(message: impl Into<String>) -> LucyError {
    LucyError::new(ErrorKind::TypeError, message.into(), SourceLocation::unknown())
}

fn call_error(message: impl Into<String>) -> LucyError {
    LucyError::new(ErrorKind::CallError, message.into(), SourceLocation::unknown())
}

/// One function activation: its own operand stack, program counter into the
/// owning module's flat `code[]`, the closure it runs as, and that closure's
/// module-global frame (used for `GLOBAL`/free-name fallback, §4.4).
struct Frame {
    closure: Rc<ClosureData>,
    global: Rc<ClosureData>,
    program: Rc<CodeProgram>,
    pc: usize,
    stack: Vec<Value>,
}

pub struct Vm<'a> {
    builtins: &'a HashMap<String, Value>,
    loader: &'a mut ModuleLoader,
    depth: usize,
}

impl<'a> Vm<'a> {
    /// Runs `program` as a module from its top level, returning the finished
    /// global activation (an importer converts this to a table with
    /// `value::export_table`).
    pub fn run_program(
        program: Rc<CodeProgram>,
        builtins: &'a HashMap<String, Value>,
        loader: &'a mut ModuleLoader,
    ) -> Result<Rc<ClosureData>, LucyError> {
        let global_function = Rc::new(crate::value::Function {
            params_num: 0,
            is_closure: false,
            body: FunctionBody::Bytecode { program: program.clone(), address: 0 },
        });
        let global = Rc::new(ClosureData::new(global_function, None, None));

        let mut vm = Vm { builtins, loader, depth: 0 };
        let frame = Frame { closure: global.clone(), global: global.clone(), program, pc: 0, stack: Vec::new() };
        vm.run_frame(frame)?;
        Ok(global)
    }

    /// Parses, compiles, and runs a whole program from source, returning its
    /// exported table. The entry point `main.rs`/`repl.rs` drive scripts with.
    pub fn run_source(source: &str, loader: &mut ModuleLoader) -> Result<Value, LucyError> {
        let body = crate::parser::parse(source)?;
        let program = Rc::new(crate::compiler::compile(&body)?);
        let builtins = crate::builtins::builtin_namespace();
        let global = Vm::run_program(program, &builtins, loader)?;
        Ok(value_export_table(&global))
    }

    /// Runs one already-compiled REPL line against a carried-over global
    /// variable map (no module/caching semantics apply — a REPL session is
    /// one long-lived top-level scope, not a module), returning its trailing
    /// value plus the updated map for the next line.
    pub fn run_repl_line(
        program: Rc<CodeProgram>,
        globals: HashMap<String, Binding>,
        builtins: &'a HashMap<String, Value>,
        loader: &'a mut ModuleLoader,
    ) -> Result<(Value, HashMap<String, Binding>), LucyError> {
        let global_function = Rc::new(crate::value::Function {
            params_num: 0,
            is_closure: false,
            body: FunctionBody::Bytecode { program: program.clone(), address: 0 },
        });
        let global = Rc::new(ClosureData::new(global_function, None, None));
        *global.variables.borrow_mut() = globals;

        let mut vm = Vm { builtins, loader, depth: 0 };
        let frame = Frame { closure: global.clone(), global: global.clone(), program, pc: 0, stack: Vec::new() };
        let result = vm.run_frame(frame)?;
        let updated = global.variables.borrow().clone();
        Ok((result, updated))
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, LucyError> {
        match callee {
            Value::Closure(closure) => self.call_closure(closure, args),
            Value::Table(ref table) => match lookup_metamethod(table, "__call__") {
                Some(Value::Closure(mm)) => {
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(callee.clone());
                    full.extend(args);
                    self.call_closure(mm, full)
                }
                _ => Err(type_error("table value is not callable")),
            },
            other => Err(type_error(format!("{} value is not callable", other.type_name()))),
        }
    }

    fn call_closure(&mut self, closure: Rc<ClosureData>, args: Vec<Value>) -> Result<Value, LucyError> {
        if args.len() != closure.function.params_num {
            return Err(call_error(format!(
                "expected {} argument(s), got {}",
                closure.function.params_num,
                args.len()
            )));
        }
        match &closure.function.body {
            FunctionBody::Native(native) => (native.call)(&args),
            FunctionBody::Bytecode { program, address } => {
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(call_error("call stack exceeded maximum depth"));
                }
                let global = closure
                    .global_closure
                    .clone()
                    .expect("bytecode closures always capture their defining module's global frame");
                let activation =
                    Rc::new(ClosureData::new(closure.function.clone(), closure.base_closure.clone(), Some(global.clone())));
                let frame =
                    Frame { closure: activation, global, program: program.clone(), pc: *address, stack: args };
                self.depth += 1;
                let result = self.run_frame(frame);
                self.depth -= 1;
                result
            }
        }
    }

    fn run_frame(&mut self, mut frame: Frame) -> Result<Value, LucyError> {
        loop {
            let op = frame.program.code[frame.pc];
            frame.pc += 1;

            match op {
                OpCode::Pop => {
                    frame.stack.pop();
                }
                OpCode::Dup => {
                    let top = frame.stack.last().cloned().expect("operand stack invariant violated");
                    frame.stack.push(top);
                }
                OpCode::DupTwo => {
                    let len = frame.stack.len();
                    let a = frame.stack[len - 2].clone();
                    let b = frame.stack[len - 1].clone();
                    frame.stack.push(a);
                    frame.stack.push(b);
                }
                OpCode::RotTwo => {
                    let len = frame.stack.len();
                    frame.stack.swap(len - 1, len - 2);
                }

                OpCode::LoadConst(idx) => {
                    let value = self.load_const(&frame, idx);
                    frame.stack.push(value);
                }
                OpCode::LoadName(idx) => {
                    let name = &frame.program.name_pool[idx];
                    let value = load_name(&frame, self.builtins, name);
                    frame.stack.push(value);
                }
                OpCode::Store(idx) => {
                    let name = frame.program.name_pool[idx].clone();
                    let value = frame.stack.pop().expect("operand stack invariant violated");
                    store_name(&frame, &name, value);
                }
                OpCode::Global(idx) => {
                    let name = frame.program.name_pool[idx].clone();
                    frame.closure.variables.borrow_mut().insert(name, Binding::GlobalRef);
                }

                OpCode::BuildTable(n) => self.op_build_table(&mut frame, n)?,
                OpCode::GetAttr => self.op_get(&mut frame, "__getattr__")?,
                OpCode::GetItem => self.op_get(&mut frame, "__getitem__")?,
                OpCode::SetAttr => self.op_set(&mut frame, "__setattr__")?,
                OpCode::SetItem => self.op_set(&mut frame, "__setitem__")?,

                OpCode::For(target) => {
                    let iterator = frame.stack.last().cloned().expect("operand stack invariant violated");
                    let next = self.call(iterator, Vec::new())?;
                    if matches!(next, Value::Null) {
                        frame.pc = target;
                    } else {
                        frame.stack.push(next);
                    }
                }

                OpCode::Neg => self.op_neg(&mut frame)?,
                OpCode::Not => self.op_not(&mut frame)?,
                OpCode::GetLen => self.op_len(&mut frame)?,
                OpCode::Add => self.op_binary(&mut frame, "__add__")?,
                OpCode::Sub => self.op_binary(&mut frame, "__sub__")?,
                OpCode::Mul => self.op_binary(&mut frame, "__mul__")?,
                OpCode::Div => self.op_binary(&mut frame, "__div__")?,
                OpCode::Mod => self.op_binary(&mut frame, "__mod__")?,
                OpCode::Is => {
                    let right = frame.stack.pop().expect("operand stack invariant violated");
                    let left = frame.stack.pop().expect("operand stack invariant violated");
                    frame.stack.push(Value::Bool(crate::value::values_equal(&left, &right)));
                }
                OpCode::CompareOp(code) => self.op_compare(&mut frame, code)?,

                OpCode::Jump(target) => frame.pc = target,
                OpCode::JumpIfTrue(target) => {
                    let value = frame.stack.pop().expect("operand stack invariant violated");
                    let Some(b) = value.as_strict_bool() else {
                        return Err(type_error("expected a bool in a boolean-only position"));
                    };
                    if b {
                        frame.pc = target;
                    }
                }
                OpCode::JumpIfFalse(target) => {
                    let value = frame.stack.pop().expect("operand stack invariant violated");
                    let Some(b) = value.as_strict_bool() else {
                        return Err(type_error("expected a bool in a boolean-only position"));
                    };
                    if !b {
                        frame.pc = target;
                    }
                }
                OpCode::JumpIfTrueOrPop(target) => {
                    let value = frame.stack.last().expect("operand stack invariant violated");
                    let Some(b) = value.as_strict_bool() else {
                        return Err(type_error("expected a bool in a boolean-only position"));
                    };
                    if b {
                        frame.pc = target;
                    } else {
                        frame.stack.pop();
                    }
                }
                OpCode::JumpIfFalseOrPop(target) => {
                    let value = frame.stack.last().expect("operand stack invariant violated");
                    let Some(b) = value.as_strict_bool() else {
                        return Err(type_error("expected a bool in a boolean-only position"));
                    };
                    if !b {
                        frame.pc = target;
                    } else {
                        frame.stack.pop();
                    }
                }

                OpCode::Call(k) => {
                    let (callee, args) = pop_call_args(&mut frame, k);
                    let result = self.call(callee, args)?;
                    frame.stack.push(result);
                }
                OpCode::Goto(k) => {
                    let (callee, args) = pop_call_args(&mut frame, k);
                    return self.call(callee, args);
                }
                OpCode::Return => {
                    return Ok(frame.stack.pop().expect("operand stack invariant violated"));
                }

                OpCode::Import(c) => {
                    let Const::String(path) = &frame.program.const_pool[c] else {
                        unreachable!("compiler only emits IMPORT with a string constant")
                    };
                    let table = self.loader.resolve(path, self.builtins)?;
                    frame.stack.push(table);
                }
                OpCode::ImportFrom(n) => {
                    let name = &frame.program.name_pool[n];
                    let table_value = frame.stack.last().expect("operand stack invariant violated");
                    let Value::Table(table) = table_value else {
                        return Err(type_error("import source is not a table"));
                    };
                    let looked_up = table_lookup(table, &Key::String(name.clone()));
                    frame.stack.push(looked_up);
                }
                OpCode::ImportStar => {
                    let table_value = frame.stack.pop().expect("operand stack invariant violated");
                    let Value::Table(table) = &table_value else {
                        return Err(type_error("import source is not a table"));
                    };
                    let entries: Vec<(Key, Value)> = {
                        let borrowed = table.borrow();
                        borrowed.keys().into_iter().map(|k| (k.clone(), borrowed.raw_get(&k))).collect()
                    };
                    for (key, value) in entries {
                        if let Key::String(name) = key {
                            set_binding(&frame.closure, &name, value);
                        }
                    }
                }
            }
        }
    }

    fn load_const(&self, frame: &Frame, idx: usize) -> Value {
        match &frame.program.const_pool[idx] {
            Const::Null => Value::Null,
            Const::Bool(b) => Value::Bool(*b),
            Const::Int(i) => Value::Int(*i),
            Const::Float(f) => Value::Float(*f),
            Const::String(s) => Value::string(s.clone()),
            Const::Function(fc) => {
                closure_from_const(frame.program.clone(), fc, frame.closure.clone(), frame.global.clone())
            }
            Const::GlobalReference => Value::Null,
        }
    }

    fn op_build_table(&mut self, frame: &mut Frame, n: usize) -> Result<(), LucyError> {
        let mut pairs = Vec::with_capacity(n);
        for _ in 0..n {
            let value = frame.stack.pop().expect("operand stack invariant violated");
            let key = frame.stack.pop().expect("operand stack invariant violated");
            pairs.push((key, value));
        }
        pairs.reverse();

        let table = Rc::new(RefCell::new(Table::new()));
        for (key, value) in pairs {
            let Some(key) = Key::from_value(&key) else {
                return Err(type_error("table key is not hashable"));
            };
            table.borrow_mut().raw_set(key, value);
        }
        frame.stack.push(Value::Table(table));
        Ok(())
    }

    fn op_get(&mut self, frame: &mut Frame, metamethod: &str) -> Result<(), LucyError> {
        let key = frame.stack.pop().expect("operand stack invariant violated");
        let object = frame.stack.pop().expect("operand stack invariant violated");
        let result = match &object {
            Value::Table(table) => match lookup_metamethod(table, metamethod) {
                Some(Value::Closure(mm)) => self.call_closure(mm, vec![object.clone(), key])?,
                _ => {
                    let Some(key) = Key::from_value(&key) else {
                        return Err(type_error("table key is not hashable"));
                    };
                    table_lookup(table, &key)
                }
            },
            other => return Err(type_error(format!("cannot index into a {} value", other.type_name()))),
        };
        frame.stack.push(result);
        Ok(())
    }

    fn op_set(&mut self, frame: &mut Frame, metamethod: &str) -> Result<(), LucyError> {
        let value = frame.stack.pop().expect("operand stack invariant violated");
        let key = frame.stack.pop().expect("operand stack invariant violated");
        let object = frame.stack.pop().expect("operand stack invariant violated");
        match &object {
            Value::Table(table) => match lookup_metamethod(table, metamethod) {
                Some(Value::Closure(mm)) => {
                    self.call_closure(mm, vec![object.clone(), key, value.clone()])?;
                }
                _ => {
                    let Some(key) = Key::from_value(&key) else {
                        return Err(type_error("table key is not hashable"));
                    };
                    table.borrow_mut().raw_set(key, value.clone());
                }
            },
            other => return Err(type_error(format!("cannot index into a {} value", other.type_name()))),
        }
        // assignment is itself an expression: its value is the assigned value (§4.3)
        frame.stack.push(value);
        Ok(())
    }

    fn op_neg(&mut self, frame: &mut Frame) -> Result<(), LucyError> {
        let value = frame.stack.pop().expect("operand stack invariant violated");
        let result = match &value {
            Value::Int(i) => Value::Int(i.wrapping_neg()),
            Value::Float(f) => Value::Float(-f),
            Value::Table(table) => match lookup_metamethod(table, "__neg__") {
                Some(Value::Closure(mm)) => self.call_closure(mm, vec![value.clone()])?,
                _ => return Err(type_error(format!("unsupported operand type for unary '-': '{}'", value.type_name()))),
            },
            other => return Err(type_error(format!("unsupported operand type for unary '-': '{}'", other.type_name()))),
        };
        frame.stack.push(result);
        Ok(())
    }

    fn op_not(&mut self, frame: &mut Frame) -> Result<(), LucyError> {
        let value = frame.stack.pop().expect("operand stack invariant violated");
        let Some(b) = value.as_strict_bool() else {
            return Err(type_error("expected a bool in a boolean-only position"));
        };
        frame.stack.push(Value::Bool(!b));
        Ok(())
    }

    fn op_len(&mut self, frame: &mut Frame) -> Result<(), LucyError> {
        let value = frame.stack.pop().expect("operand stack invariant violated");
        let result = match &value {
            Value::String(s) => Value::Int(s.chars().count() as i64),
            Value::Table(table) => match lookup_metamethod(table, "__len__") {
                Some(Value::Closure(mm)) => self.call_closure(mm, vec![value.clone()])?,
                _ => Value::Int(table.borrow().len() as i64),
            },
            other => return Err(type_error(format!("'{}' has no length", other.type_name()))),
        };
        frame.stack.push(result);
        Ok(())
    }

    fn op_binary(&mut self, frame: &mut Frame, name: &'static str) -> Result<(), LucyError> {
        let right = frame.stack.pop().expect("operand stack invariant violated");
        let left = frame.stack.pop().expect("operand stack invariant violated");
        let result = match self.table_metamethod_binary(name, &left, &right)? {
            Some(value) => value,
            None => arith_primitive(name, &left, &right)?,
        };
        frame.stack.push(result);
        Ok(())
    }

    fn op_compare(&mut self, frame: &mut Frame, code: u8) -> Result<(), LucyError> {
        let right = frame.stack.pop().expect("operand stack invariant violated");
        let left = frame.stack.pop().expect("operand stack invariant violated");
        let result = match code {
            0 => self.ordering_op("__lt__", &left, &right)?,
            1 => self.ordering_op("__le__", &left, &right)?,
            2 => self.equality_op(&left, &right, false)?,
            3 => self.equality_op(&left, &right, true)?,
            4 => self.ordering_op("__gt__", &left, &right)?,
            5 => self.ordering_op("__ge__", &left, &right)?,
            other => unreachable!("compiler only emits COMPARE_OP codes 0-5, got {other}"),
        };
        frame.stack.push(result);
        Ok(())
    }

    fn ordering_op(&mut self, name: &'static str, left: &Value, right: &Value) -> Result<Value, LucyError> {
        match self.table_metamethod_binary(name, left, right)? {
            Some(value) => Ok(value),
            None => compare_primitive(name, left, right),
        }
    }

    fn equality_op(&mut self, left: &Value, right: &Value, negate: bool) -> Result<Value, LucyError> {
        let equal = match self.table_metamethod_binary("__eq__", left, right)? {
            Some(Value::Bool(b)) => b,
            Some(_) => return Err(type_error("'__eq__' must return a bool")),
            None => crate::value::values_equal(left, right),
        };
        Ok(Value::Bool(equal != negate))
    }

    /// Checks the direct metamethod mapping (§4.7) on `left`, then on
    /// `right`, calling whichever is found first with `(left, right)`.
    fn table_metamethod_binary(&mut self, name: &str, left: &Value, right: &Value) -> Result<Option<Value>, LucyError> {
        if let Value::Table(table) = left {
            if let Some(Value::Closure(mm)) = lookup_metamethod(table, name) {
                return Ok(Some(self.call_closure(mm, vec![left.clone(), right.clone()])?));
            }
        }
        if let Value::Table(table) = right {
            if let Some(Value::Closure(mm)) = lookup_metamethod(table, name) {
                return Ok(Some(self.call_closure(mm, vec![left.clone(), right.clone()])?));
            }
        }
        Ok(None)
    }
}

fn pop_call_args(frame: &mut Frame, k: usize) -> (Value, Vec<Value>) {
    let mut args = Vec::with_capacity(k);
    for _ in 0..k {
        args.push(frame.stack.pop().expect("operand stack invariant violated"));
    }
    args.reverse();
    let callee = frame.stack.pop().expect("operand stack invariant violated");
    (callee, args)
}

/// §4.4's four-tier name resolution: the current activation's own bindings
/// (redirecting through `GlobalRef`), then the `base_closure` chain, then the
/// module global frame, then the bare builtin namespace. A name that is
/// nowhere to be found simply reads as `Null` (I1 extended to variables) —
/// `LOAD_NAME` never errors.
fn load_name(frame: &Frame, builtins: &HashMap<String, Value>, name: &str) -> Value {
    match frame.closure.variables.borrow().get(name) {
        Some(Binding::GlobalRef) => {
            if let Some(Binding::Value(v)) = frame.global.variables.borrow().get(name) {
                return v.clone();
            }
            return Value::Null;
        }
        Some(Binding::Value(v)) => return v.clone(),
        None => {}
    }

    let mut ancestor = frame.closure.base_closure.clone();
    while let Some(closure) = ancestor {
        if let Some(Binding::Value(v)) = closure.variables.borrow().get(name) {
            return v.clone();
        }
        ancestor = closure.base_closure.clone();
    }

    if let Some(Binding::Value(v)) = frame.global.variables.borrow().get(name) {
        return v.clone();
    }

    builtins.get(name).cloned().unwrap_or(Value::Null)
}

/// §4.4's write-through-walk: a `global x;`-marked name always writes the
/// module global; otherwise the first enclosing activation (walking
/// `base_closure`) that already holds a live binding for this name is
/// mutated in place, so assigning inside a closure updates the captured
/// variable rather than shadowing it; failing that, the write lands in the
/// current activation. Assigning `Null` deletes the binding (P3).
fn store_name(frame: &Frame, name: &str, value: Value) {
    let redirects_global = matches!(frame.closure.variables.borrow().get(name), Some(Binding::GlobalRef));
    if redirects_global {
        set_binding(&frame.global, name, value);
        return;
    }

    let mut ancestor = frame.closure.base_closure.clone();
    while let Some(closure) = ancestor {
        if matches!(closure.variables.borrow().get(name), Some(Binding::Value(_))) {
            set_binding(&closure, name, value);
            return;
        }
        ancestor = closure.base_closure.clone();
    }

    set_binding(&frame.closure, name, value);
}

fn set_binding(closure: &Rc<ClosureData>, name: &str, value: Value) {
    let mut vars = closure.variables.borrow_mut();
    if matches!(value, Value::Null) {
        vars.remove(name);
    } else {
        vars.insert(name.to_string(), Binding::Value(value));
    }
}

fn arith_primitive(op: &str, left: &Value, right: &Value) -> Result<Value, LucyError> {
    use Value::{Float, Int, String as Str};
    let value = match (op, left, right) {
        ("__add__", Int(x), Int(y)) => Int(x.wrapping_add(*y)),
        ("__add__", Int(x), Float(y)) => Float(*x as f64 + y),
        ("__add__", Float(x), Int(y)) => Float(x + *y as f64),
        ("__add__", Float(x), Float(y)) => Float(x + y),
        ("__add__", Str(x), Str(y)) => return Ok(Value::string(format!("{x}{y}"))),

        ("__sub__", Int(x), Int(y)) => Int(x.wrapping_sub(*y)),
        ("__sub__", Int(x), Float(y)) => Float(*x as f64 - y),
        ("__sub__", Float(x), Int(y)) => Float(x - *y as f64),
        ("__sub__", Float(x), Float(y)) => Float(x - y),

        ("__mul__", Int(x), Int(y)) => Int(x.wrapping_mul(*y)),
        ("__mul__", Int(x), Float(y)) => Float(*x as f64 * y),
        ("__mul__", Float(x), Int(y)) => Float(x * *y as f64),
        ("__mul__", Float(x), Float(y)) => Float(x * y),

        ("__div__", Int(_), Int(0)) => return Err(type_error("division by zero")),
        ("__div__", Int(x), Int(y)) => Int(x.wrapping_div(*y)),
        ("__div__", Int(x), Float(y)) => Float(*x as f64 / y),
        ("__div__", Float(x), Int(y)) => Float(x / *y as f64),
        ("__div__", Float(x), Float(y)) => Float(x / y),

        ("__mod__", Int(_), Int(0)) => return Err(type_error("division by zero")),
        ("__mod__", Int(x), Int(y)) => Int(x.wrapping_rem(*y)),
        ("__mod__", Int(x), Float(y)) => Float(*x as f64 % y),
        ("__mod__", Float(x), Int(y)) => Float(x % *y as f64),
        ("__mod__", Float(x), Float(y)) => Float(x % y),

        _ => {
            return Err(type_error(format!(
                "unsupported operand types for '{op}': '{}' and '{}'",
                left.type_name(),
                right.type_name()
            )));
        }
    };
    Ok(value)
}

fn compare_primitive(op: &str, left: &Value, right: &Value) -> Result<Value, LucyError> {
    use Value::{Float, Int, String as Str};
    let ordering = match (left, right) {
        (Int(x), Int(y)) => x.partial_cmp(y),
        (Int(x), Float(y)) => (*x as f64).partial_cmp(y),
        (Float(x), Int(y)) => x.partial_cmp(&(*y as f64)),
        (Float(x), Float(y)) => x.partial_cmp(y),
        (Str(x), Str(y)) => x.partial_cmp(y),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Err(type_error(format!(
            "unsupported operand types for '{op}': '{}' and '{}'",
            left.type_name(),
            right.type_name()
        )));
    };
    let result = match op {
        "__lt__" => ordering.is_lt(),
        "__le__" => ordering.is_le(),
        "__gt__" => ordering.is_gt(),
        "__ge__" => ordering.is_ge(),
        _ => unreachable!("ordering_op only calls with the four ordering metamethod names"),
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Value {
        let mut loader = ModuleLoader::default();
        Vm::run_source(source, &mut loader).unwrap()
    }

    fn field(exports: &Value, name: &str) -> Value {
        let Value::Table(table) = exports else { panic!("expected exported table") };
        table_lookup(table, &Key::String(name.to_string()))
    }

    #[test]
    fn runs_scenario_one_accumulator_loop() {
        let exports = run("a = 0; i = 0; while i < 10 { a = a + i; i = i + 1; }");
        assert!(matches!(field(&exports, "a"), Value::Int(45)));
    }

    #[test]
    fn closures_capture_and_mutate_enclosing_locals() {
        let exports = run(
            "make_counter = func() { c = 0; return |step| { c = c + step; return c; }; }; \
             counter = make_counter(); \
             first = counter(1); \
             second = counter(2);",
        );
        assert!(matches!(field(&exports, "first"), Value::Int(1)));
        assert!(matches!(field(&exports, "second"), Value::Int(3)));
    }

    #[test]
    fn overloaded_add_dispatches_on_a_directly_carried_metamethod() {
        // Metamethod lookup only ever checks a table's own direct key, never
        // something reached through `__base__` — each instance carries its
        // own `__add__`, copied off a shared one if it wants to share it.
        let exports = run(
            "v1 = { \"x\": 3, \"__add__\": func(a, b) { return a.x + b.x; } }; \
             v2 = { \"x\": 4, \"__add__\": v1.__add__ }; \
             total = v1 + v2;",
        );
        assert!(matches!(field(&exports, "total"), Value::Int(7)));
    }

    #[test]
    fn attribute_reads_walk_the_base_chain_but_metamethods_do_not() {
        let exports = run(
            "Vec = { \"__add__\": func(a, b) { return a.x + b.x; }, \"origin\": 0 }; \
             v1 = { \"__base__\": Vec, \"x\": 3 }; \
             inherited = v1.origin; \
             sum_or_error = 0; \
             sum_or_error = v1.__add__;",
        );
        assert!(matches!(field(&exports, "inherited"), Value::Int(0)));
        assert!(!matches!(field(&exports, "sum_or_error"), Value::Null));
    }

    #[test]
    fn for_loop_drains_a_native_iterator() {
        let exports = run(
            "t = { \"a\": 1, \"b\": 2 }; \
             count = 0; \
             for k in table.keys(t) { count = count + 1; }",
        );
        assert!(matches!(field(&exports, "count"), Value::Int(2)));
    }

    #[test]
    fn division_by_zero_is_a_type_error() {
        let mut loader = ModuleLoader::default();
        let err = Vm::run_source("x = 1 / 0;", &mut loader).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn goto_tail_calls_without_growing_the_logical_stack() {
        let exports = run(
            "count_down = func(n, acc) { \
                 if n <= 0 { return acc; } \
                 goto count_down(n - 1, acc + 1); \
             }; \
             result = count_down(50, 0);",
        );
        assert!(matches!(field(&exports, "result"), Value::Int(50)));
    }
}
