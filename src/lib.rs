// File: src/lib.rs
//
// Library interface for Lucy. Exposes modules for integration testing and
// external embedding, plus the handful of top-level entry points a host
// (the CLI, the REPL, an embedder) drives a script with.

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod dump;
pub mod errors;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod repl;
pub mod test_runner;
pub mod value;
pub mod vm;

use std::path::Path;

use errors::LucyError;
use module::ModuleLoader;
use value::Value;

/// Parses and compiles `source` without running it.
pub fn compile(source: &str) -> Result<bytecode::CodeProgram, LucyError> {
    let body = parser::parse(source)?;
    compiler::compile(&body)
}

/// Runs `source` as a standalone program and returns its exported bindings.
pub fn run_source(source: &str) -> Result<Value, LucyError> {
    let mut loader = ModuleLoader::default();
    vm::Vm::run_source(source, &mut loader)
}

/// Reads and runs a `.lucy` file from disk, resolving `import`s relative to
/// its parent directory.
pub fn run_file(path: &Path) -> Result<Value, LucyError> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        LucyError::new(
            errors::ErrorKind::ImportError,
            format!("failed to read '{}': {e}", path.display()),
            errors::SourceLocation::unknown(),
        )
    })?;
    let mut loader = ModuleLoader::default();
    if let Some(parent) = path.parent() {
        loader.add_search_path(parent.to_path_buf());
    }
    vm::Vm::run_source(&source, &mut loader)
}

/// Parses, compiles, and runs `program`, discarding any Lucy-level return
/// value but surfacing a `LucyError`. The synchronous one-shot entry point a
/// host embedding Lucy as a config/extension language reaches for.
pub fn execute(source: &str) -> Result<(), LucyError> {
    run_source(source).map(|_| ())
}
