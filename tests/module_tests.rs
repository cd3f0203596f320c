// Integration tests for file-based `import`, exercising `ModuleLoader`'s
// search-path resolution, re-import caching, and circular-import guard end
// to end (as opposed to src/module.rs's unit tests, which only cover the
// builtin-library and missing-module branches of `resolve`).

use std::path::Path;

use lucy::errors::ErrorKind;
use lucy::value::{Key, Value};

fn field(exports: &Value, name: &str) -> Value {
    let Value::Table(table) = exports else { panic!("expected an exported table") };
    lucy::value::table_lookup(table, &Key::String(name.to_string()))
}

#[test]
fn imports_a_sibling_file_by_dotted_path() {
    let exports = lucy::run_file(Path::new("tests/fixtures/uses_greeter.lucy")).unwrap();
    let Value::String(message) = field(&exports, "message") else { panic!("expected string") };
    assert_eq!(message, "hello, world");
}

#[test]
fn re_importing_the_same_module_reuses_its_exports() {
    // Both `import` statements resolve to the same cached export table, so
    // the module body runs exactly once and both bindings see the same
    // mutable `count` — not a fresh 0 each time.
    let exports = lucy::run_file(Path::new("tests/fixtures/import_once.lucy")).unwrap();
    assert!(matches!(field(&exports, "first"), Value::Int(1)));
    assert!(matches!(field(&exports, "second"), Value::Int(2)));
}

#[test]
fn a_circular_import_pair_is_rejected() {
    let err = lucy::run_file(Path::new("tests/fixtures/cycle_a.lucy")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ImportError);
}
