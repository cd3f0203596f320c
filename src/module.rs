// File: src/module.rs
//
// Import resolution. A dotted path (`import a.b;`) either names a builtin
// library (`stdio`, `convert`, `table` — no dots) or a `.lucy` file on the
// search path, addressed by joining its segments into a relative path. Each
// resolved module is executed exactly once to completion in its own `Vm`
// instance (§9: imports never interleave with the importer) and its result
// cached, so a second `import` of the same path is free and circular imports
// are caught rather than recursing forever.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use crate::builtins;
use crate::builtins::OutputSink;
use crate::errors::{ErrorKind, LucyError, SourceLocation};
use crate::value::Value;
use crate::vm;

/// Resolves import paths and caches the result of running each module.
pub struct ModuleLoader {
    search_paths: Vec<PathBuf>,
    cache: HashMap<String, Value>,
    loading_stack: Vec<String>,
    output: OutputSink,
}

impl ModuleLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        ModuleLoader { search_paths, cache: HashMap::new(), loading_stack: Vec::new(), output: OutputSink::default() }
    }

    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    /// Redirects `stdio.print`/`println` for every module this loader resolves
    /// from here on (already-cached `stdio` tables keep their old sink).
    pub fn set_output(&mut self, output: OutputSink) {
        self.output = output;
        self.cache.remove("stdio");
    }

    fn find_file(&self, dotted_path: &str) -> Option<PathBuf> {
        let relative: PathBuf = dotted_path.split('.').collect();
        for root in &self.search_paths {
            let candidate = root.join(&relative).with_extension("lucy");
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Resolves one `import`/`from ... import` path to its exported table.
    pub fn resolve(&mut self, dotted_path: &str, builtins: &HashMap<String, Value>) -> Result<Value, LucyError> {
        if let Some(cached) = self.cache.get(dotted_path) {
            return Ok(cached.clone());
        }

        if !dotted_path.contains('.') {
            if let Some(table) = builtins::library_table(dotted_path, &self.output) {
                self.cache.insert(dotted_path.to_string(), table.clone());
                return Ok(table);
            }
        }

        if self.loading_stack.iter().any(|p| p == dotted_path) {
            return Err(LucyError::new(
                ErrorKind::ImportError,
                format!("circular import: '{dotted_path}'"),
                SourceLocation::unknown(),
            ));
        }

        let Some(path) = self.find_file(dotted_path) else {
            return Err(LucyError::new(
                ErrorKind::ImportError,
                format!("no module named '{dotted_path}'"),
                SourceLocation::unknown(),
            ));
        };

        let source = fs::read_to_string(&path).map_err(|e| {
            LucyError::new(
                ErrorKind::ImportError,
                format!("failed to read module '{dotted_path}': {e}"),
                SourceLocation::unknown(),
            )
        })?;

        self.loading_stack.push(dotted_path.to_string());
        let result = (|| {
            let body = crate::parser::parse(&source)?;
            let program = Rc::new(crate::compiler::compile(&body)?);
            let global = vm::Vm::run_program(program, builtins, self)?;
            Ok(crate::value::export_table(&global))
        })();
        self.loading_stack.pop();

        let exports = result?;
        self.cache.insert(dotted_path.to_string(), exports.clone());
        Ok(exports)
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        ModuleLoader::new(vec![PathBuf::from(".")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_module_is_an_import_error() {
        let mut loader = ModuleLoader::new(vec![PathBuf::from("/nonexistent")]);
        let builtins = builtins::builtin_namespace();
        let err = loader.resolve("no_such_module", &builtins).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ImportError);
    }

    #[test]
    fn resolves_builtin_library_without_touching_disk() {
        let mut loader = ModuleLoader::new(vec![PathBuf::from("/nonexistent")]);
        let builtins = builtins::builtin_namespace();
        let table = loader.resolve("stdio", &builtins).unwrap();
        assert!(matches!(table, Value::Table(_)));
    }

    #[test]
    fn set_output_redirects_a_freshly_resolved_stdio_table() {
        use crate::value::{FunctionBody, Key};
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut loader = ModuleLoader::new(vec![PathBuf::from("/nonexistent")]);
        let buffer = Rc::new(RefCell::new(String::new()));
        loader.set_output(OutputSink::Capture(buffer.clone()));

        let builtins = builtins::builtin_namespace();
        let stdio = loader.resolve("stdio", &builtins).unwrap();
        let Value::Table(rc) = &stdio else { panic!("expected table") };
        let println = rc.borrow().raw_get(&Key::String("println".to_string()));
        let Value::Closure(closure) = println else { panic!("expected closure") };
        let FunctionBody::Native(native) = &closure.function.body else { panic!("expected native function") };
        (native.call)(&[Value::string("hi")]).unwrap();

        assert_eq!(buffer.borrow().as_str(), "hi\n");
    }
}
