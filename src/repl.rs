// File: src/repl.rs
//
// Interactive REPL for Lucy. Each line is parsed and compiled as its own
// tiny program and run against a variable map carried over from the
// previous line, so bindings persist across inputs the way a script's
// top level would see them within a single run.

use std::collections::HashMap;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::ast::Statement;
use crate::module::ModuleLoader;
use crate::value::{Binding, Value};
use crate::vm::Vm;

pub struct Repl {
    globals: HashMap<String, Binding>,
    builtins: HashMap<String, Value>,
    loader: ModuleLoader,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        Ok(Repl {
            globals: HashMap::new(),
            builtins: crate::builtins::builtin_namespace(),
            loader: ModuleLoader::default(),
            editor,
        })
    }

    fn show_banner(&self) {
        println!("{}", "╔══════════════════════════════════════════════════════╗".bright_cyan());
        println!("{}", "║               Lucy REPL - Interactive Shell           ║".bright_cyan());
        println!("{}", "╚══════════════════════════════════════════════════════╝".bright_cyan());
        println!();
        println!(
            "  {} Use {}{}{}{}",
            "Welcome!".bright_green(),
            ":".bright_blue(),
            "help".bright_yellow(),
            " for commands or ".bright_blue(),
            ":quit".bright_yellow()
        );
        println!("  {} Multi-line input: End with unclosed braces", "Tip:".bright_magenta());
        println!();
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();

        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() {
                "lucy> ".bright_green().to_string()
            } else {
                "....> ".bright_blue().to_string()
            };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    if buffer.is_empty() && line.trim().starts_with(':') {
                        if self.handle_command(line.trim()) {
                            continue;
                        } else {
                            break;
                        }
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');

                    if is_input_complete(&buffer) {
                        self.eval_input(&buffer);
                        buffer.clear();
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (Ctrl+C to interrupt, :quit to exit)".bright_yellow());
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "\nGoodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Returns true to continue the REPL, false to quit.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":help" | ":h" => {
                self.show_help();
                true
            }
            ":quit" | ":q" | ":exit" => {
                println!("{}", "Goodbye!".bright_cyan());
                false
            }
            ":clear" | ":c" => {
                print!("\x1B[2J\x1B[1;1H");
                self.show_banner();
                true
            }
            ":vars" | ":v" => {
                self.show_variables();
                true
            }
            ":reset" | ":r" => {
                self.globals.clear();
                self.loader = ModuleLoader::default();
                println!("{}", "Environment reset".bright_green());
                true
            }
            _ => {
                println!(
                    "{} Unknown command: {}. Type {}{}{}",
                    "Error:".bright_red(),
                    cmd.bright_yellow(),
                    ":".bright_blue(),
                    "help".bright_yellow(),
                    " for available commands.".bright_blue()
                );
                true
            }
        }
    }

    fn show_help(&self) {
        println!();
        println!("{}", "REPL Commands:".bright_cyan().bold());
        println!();
        println!("  {}{}  Display this help message", ":help".bright_yellow(), " or :h     ".dimmed());
        println!("  {}{}  Exit the REPL", ":quit".bright_yellow(), " or :q     ".dimmed());
        println!("  {}{}  Clear the screen", ":clear".bright_yellow(), " or :c    ".dimmed());
        println!("  {}{}  Show defined variables", ":vars".bright_yellow(), " or :v    ".dimmed());
        println!("  {}{}  Reset environment", ":reset".bright_yellow(), " or :r   ".dimmed());
        println!();
        println!("{}", "Navigation:".bright_cyan().bold());
        println!();
        println!("  {}  Navigate command history", "↑/↓ arrows".bright_blue());
        println!("  {}  Interrupt current input", "Ctrl+C    ".bright_blue());
        println!("  {}  Exit REPL", "Ctrl+D    ".bright_blue());
        println!();
        println!("{}", "Multi-line Input:".bright_cyan().bold());
        println!();
        println!("  Leave braces, brackets, or parentheses unclosed to continue");
        println!("  on the next line. Close them to execute the statement.");
        println!();
        println!("{}", "Examples:".bright_cyan().bold());
        println!();
        println!("  {}", "lucy> x = 42".dimmed());
        println!("  {}", "lucy> greet = func(name) {".dimmed());
        println!("  {}", "....>     stdio.println(\"Hello, \" + name);".dimmed());
        println!("  {}", "....> };".dimmed());
        println!("  {}", "lucy> greet(\"World\")".dimmed());
        println!();
    }

    fn show_variables(&self) {
        println!();
        println!("{}", "Defined Variables:".bright_cyan().bold());
        println!();
        if self.globals.is_empty() {
            println!("  {}", "(none yet)".dimmed());
        }
        let mut names: Vec<&String> = self.globals.keys().collect();
        names.sort();
        for name in names {
            if let Some(Binding::Value(value)) = self.globals.get(name) {
                println!("  {} {} {}", name.bright_yellow(), "=".dimmed(), format!("{value}").bright_white());
            }
        }
        println!();
    }

    fn eval_input(&mut self, input: &str) {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return;
        }

        let body = match crate::parser::parse(input) {
            Ok(body) => body,
            Err(err) => {
                self.print_error(&err);
                return;
            }
        };

        let body = echo_trailing_expression(body);

        let program = match crate::compiler::compile(&body) {
            Ok(program) => program,
            Err(err) => {
                self.print_error(&err);
                return;
            }
        };

        let globals = std::mem::take(&mut self.globals);
        match Vm::run_repl_line(std::rc::Rc::new(program), globals, &self.builtins, &mut self.loader) {
            Ok((value, updated)) => {
                self.globals = updated;
                if !matches!(value, Value::Null) {
                    println!("{} {}", "=>".bright_blue(), format!("{value}").bright_white());
                }
            }
            Err(err) => {
                self.print_error(&err);
            }
        }
    }

    fn print_error(&self, err: &crate::errors::LucyError) {
        println!("{err}");
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new().expect("failed to create REPL")
    }
}

/// If the input parses as a single bare expression statement, rewrites it to
/// an explicit `return`, so the REPL can show its value (an ordinary
/// expression statement's value is otherwise always discarded, see §4.3).
fn echo_trailing_expression(mut body: Vec<Statement>) -> Vec<Statement> {
    if body.len() == 1 {
        if let Statement::Expr { expr, span } = body.remove(0) {
            return vec![Statement::Return { value: Some(expr), span }];
        }
    }
    body
}

/// Whether `input`'s brackets/braces/parens are balanced outside of strings
/// and line comments, i.e. whether the REPL should submit it yet.
fn is_input_complete(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return true;
    }

    let mut brace_count = 0i32;
    let mut bracket_count = 0i32;
    let mut paren_count = 0i32;
    let mut in_string = false;
    let mut escape_next = false;
    let mut in_comment = false;
    let mut prev = '\0';

    for ch in trimmed.chars() {
        if in_comment {
            if ch == '\n' {
                in_comment = false;
            }
            prev = ch;
            continue;
        }
        if escape_next {
            escape_next = false;
            prev = ch;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '/' if !in_string && prev == '/' => in_comment = true,
            '{' if !in_string => brace_count += 1,
            '}' if !in_string => brace_count -= 1,
            '[' if !in_string => bracket_count += 1,
            ']' if !in_string => bracket_count -= 1,
            '(' if !in_string => paren_count += 1,
            ')' if !in_string => paren_count -= 1,
            _ => {}
        }
        prev = ch;
    }

    !in_string && brace_count <= 0 && bracket_count <= 0 && paren_count <= 0
}
