// Integration tests for Lucy's compile-and-run pipeline: source text in,
// exported bindings (or an error) out, exercising the lexer, parser,
// compiler, and VM together the way a script actually runs.

use lucy::errors::ErrorKind;
use lucy::value::{Key, Value};

fn run(source: &str) -> Value {
    lucy::run_source(source).expect("program should run without error")
}

fn field(exports: &Value, name: &str) -> Value {
    let Value::Table(table) = exports else { panic!("expected an exported table") };
    lucy::value::table_lookup(table, &Key::String(name.to_string()))
}

#[test]
fn arithmetic_and_control_flow() {
    let exports = run(
        "total = 0; \
         i = 1; \
         while i <= 5 { total = total + i; i = i + 1; }",
    );
    assert!(matches!(field(&exports, "total"), Value::Int(15)));
}

#[test]
fn functions_and_recursion() {
    let exports = run(
        "fib = func(n) { \
             if n < 2 { return n; } \
             return fib(n - 1) + fib(n - 2); \
         }; \
         result = fib(10);",
    );
    assert!(matches!(field(&exports, "result"), Value::Int(55)));
}

#[test]
fn closures_share_mutable_state() {
    let exports = run(
        "make_account = func(balance) { \
             return { \
                 \"deposit\": |amount| { balance = balance + amount; return balance; }, \
                 \"balance\": |_| { return balance; }, \
             }; \
         }; \
         account = make_account(100); \
         after_deposit = account.deposit(50); \
         current = account.balance(0);",
    );
    assert!(matches!(field(&exports, "after_deposit"), Value::Int(150)));
    assert!(matches!(field(&exports, "current"), Value::Int(150)));
}

#[test]
fn prototype_chain_and_operator_overload() {
    // Metamethod dispatch only ever looks at a table's own direct key, never
    // something reached by walking `__base__` — so overloaded operators are
    // carried on each instance directly, the way §6 of the language spec's
    // own running example copies `__add__` off of `v` onto `w`.
    let exports = run(
        "v = { \"x\": 3, \"__add__\": func(a, b) { return { \"x\": a.x + b.x, \"__add__\": a.__add__ }; } }; \
         w = { \"x\": 4, \"__add__\": v.__add__ }; \
         sum = v + w; \
         same = ({ \"x\": 1, \"__eq__\": func(a, b) { return a.x == b.x; } }); \
         other = { \"x\": 1, \"__eq__\": same.__eq__ }; \
         is_equal = same == other;",
    );
    let Value::Table(sum_table) = field(&exports, "sum") else { panic!("expected table") };
    assert!(matches!(lucy::value::table_lookup(&sum_table, &Key::String("x".to_string())), Value::Int(7)));
    assert!(matches!(field(&exports, "is_equal"), Value::Bool(true)));
}

#[test]
fn attribute_reads_walk_the_base_prototype_chain() {
    // Ordinary attribute access (unlike metamethod dispatch) does walk
    // `__base__`, so instances can share plain data/methods through a
    // prototype without copying them onto every instance.
    let exports = run(
        "Shape = { \"kind\": \"shape\", \"describe\": func(self) { return self.kind; } }; \
         circle = { \"__base__\": Shape, \"radius\": 2 }; \
         kind = circle.kind; \
         description = circle.describe(circle);",
    );
    let Value::String(kind) = field(&exports, "kind") else { panic!("expected string") };
    assert_eq!(kind, "shape");
    let Value::String(description) = field(&exports, "description") else { panic!("expected string") };
    assert_eq!(description, "shape");
}

#[test]
fn for_loop_over_table_keys_iterator() {
    let exports = run(
        "t = { \"a\": 1, \"b\": 2, \"c\": 3 }; \
         total = 0; \
         for k in table.keys(t) { total = total + table.raw_get(t, k); }",
    );
    assert!(matches!(field(&exports, "total"), Value::Int(6)));
}

#[test]
fn missing_table_key_reads_as_null_and_assigning_null_deletes() {
    let exports = run(
        "t = { \"a\": 1 }; \
         missing = t.b; \
         t.a = null; \
         still_there = table.raw_len(t);",
    );
    assert!(matches!(field(&exports, "missing"), Value::Null));
    assert!(matches!(field(&exports, "still_there"), Value::Int(0)));
}

#[test]
fn non_bool_in_condition_is_a_type_error() {
    let err = lucy::run_source("if 1 { }").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn calling_a_non_callable_is_a_type_error() {
    let err = lucy::run_source("x = 5; x();").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn wrong_argument_count_is_a_call_error() {
    let err = lucy::run_source("f = func(a, b) { return a + b; }; f(1);").unwrap_err();
    assert_eq!(err.kind, ErrorKind::CallError);
}

#[test]
fn assert_failure_is_an_assert_error() {
    let err = lucy::run_source("assert(1 == 2);").unwrap_err();
    assert_eq!(err.kind, ErrorKind::AssertError);
}

#[test]
fn stdlib_convert_round_trips_through_string() {
    let exports = run("n = convert.integer(convert.string(41)) + 1;");
    assert!(matches!(field(&exports, "n"), Value::Int(42)));
}

#[test]
fn bytecode_dump_and_load_round_trips_behavior() {
    let program = lucy::compile("a = 1; b = 2; c = a + b;").unwrap();
    let text = lucy::dump::dump_to_string(&program);
    let loaded = lucy::dump::load_from_str(&text).unwrap();
    assert_eq!(loaded.code.len(), program.code.len());
}
