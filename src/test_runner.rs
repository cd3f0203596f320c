// File: src/test_runner.rs
//
// `lucy test <dir>`: runs every `*.lucy` file under a directory through the
// VM pipeline and diffs its captured `stdio` output against a sibling
// `<name>.out` golden file — the same file-discovery/capture-and-diff/
// `--update` shape as `ruff`'s `Parser::run_all_tests`, adapted to run
// through the compile-and-run VM pipeline rather than the tree-walking
// interpreter and to capture output via `ModuleLoader::set_output` rather
// than `Interpreter::set_output`.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use colored::Colorize;

use crate::builtins::OutputSink;
use crate::module::ModuleLoader;
use crate::vm::Vm;

pub struct TestResult {
    pub path: PathBuf,
    pub passed: bool,
    pub message: Option<String>,
}

pub struct TestReport {
    pub results: Vec<TestResult>,
}

impl TestReport {
    pub fn print(&self, verbose: bool) {
        for result in &self.results {
            if result.passed {
                println!("{} {}", "ok".green(), result.path.display());
            } else {
                println!("{} {}", "FAIL".red().bold(), result.path.display());
                if verbose {
                    if let Some(message) = &result.message {
                        println!("    {message}");
                    }
                }
            }
        }
        let passed = self.results.iter().filter(|r| r.passed).count();
        let total = self.results.len();
        println!();
        println!("{passed}/{total} passed");
    }

    pub fn exit_code(&self) -> i32 {
        if self.results.iter().all(|r| r.passed) {
            0
        } else {
            1
        }
    }
}

fn discover_scripts(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            discover_scripts(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("lucy") {
            out.push(path);
        }
    }
}

fn run_one(path: PathBuf, update: bool) -> TestResult {
    let source = match fs::read_to_string(&path) {
        Ok(source) => source,
        Err(e) => return TestResult { path, passed: false, message: Some(format!("failed to read file: {e}")) },
    };

    let buffer = Rc::new(RefCell::new(String::new()));
    let mut loader = ModuleLoader::default();
    loader.set_output(OutputSink::Capture(buffer.clone()));
    if let Some(parent) = path.parent() {
        loader.add_search_path(parent.to_path_buf());
    }

    let run_result = Vm::run_source(&source, &mut loader);
    let actual = buffer.borrow().trim().to_string();

    if let Err(err) = run_result {
        return TestResult { path, passed: false, message: Some(err.to_string()) };
    }

    let golden_path = path.with_extension("out");
    if update || !golden_path.is_file() {
        return match fs::write(&golden_path, &actual) {
            Ok(()) => TestResult { path, passed: true, message: None },
            Err(e) => TestResult { path, passed: false, message: Some(format!("failed to write golden file: {e}")) },
        };
    }

    let expected = fs::read_to_string(&golden_path).unwrap_or_default().trim().to_string();
    if actual == expected {
        TestResult { path, passed: true, message: None }
    } else {
        TestResult { path, passed: false, message: Some(format!("expected:\n{expected}\ngot:\n{actual}")) }
    }
}

/// Runs every `*.lucy` file found under `dir` (recursively) and diffs its
/// captured output against `<name>.out`. `update` regenerates the golden file
/// instead of diffing against it; a script with no golden file yet gets one
/// written the first time it runs, `--update` or not.
pub fn run_directory(dir: &Path, update: bool) -> TestReport {
    let mut scripts = Vec::new();
    discover_scripts(dir, &mut scripts);
    scripts.sort();

    let results = scripts.into_iter().map(|path| run_one(path, update)).collect();

    TestReport { results }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("lucy_test_runner_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn first_run_with_no_golden_file_creates_one_and_passes() {
        let dir = scratch_dir("create_golden");
        fs::write(dir.join("hello.lucy"), "stdio.println(\"hi\");").unwrap();

        let report = run_directory(&dir, false);
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].passed);
        assert_eq!(fs::read_to_string(dir.join("hello.out")).unwrap().trim(), "hi");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn mismatched_output_fails_without_update() {
        let dir = scratch_dir("mismatch");
        fs::write(dir.join("hello.lucy"), "stdio.println(\"hi\");").unwrap();
        fs::write(dir.join("hello.out"), "bye").unwrap();

        let report = run_directory(&dir, false);
        assert!(!report.results[0].passed);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn update_rewrites_a_stale_golden_file() {
        let dir = scratch_dir("update");
        fs::write(dir.join("hello.lucy"), "stdio.println(\"hi\");").unwrap();
        fs::write(dir.join("hello.out"), "stale").unwrap();

        let report = run_directory(&dir, true);
        assert!(report.results[0].passed);
        assert_eq!(fs::read_to_string(dir.join("hello.out")).unwrap().trim(), "hi");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn a_runtime_error_is_reported_as_a_failure() {
        let dir = scratch_dir("error");
        fs::write(dir.join("broken.lucy"), "x();").unwrap();

        let report = run_directory(&dir, false);
        assert!(!report.results[0].passed);
        assert!(report.results[0].message.is_some());

        let _ = fs::remove_dir_all(&dir);
    }
}
