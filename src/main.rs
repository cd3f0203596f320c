// File: src/main.rs
//
// CLI entry point: parses arguments and dispatches to the appropriate
// subcommand (run, repl, test, dump).

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser as ClapParser, Subcommand};

#[derive(ClapParser)]
#[command(
    name = "lucy",
    about = "Lucy: a small dynamic scripting language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Run a Lucy script file
    Run {
        /// Path to the .lucy file
        file: PathBuf,
    },

    /// Launch the interactive Lucy REPL
    Repl,

    /// Run every .lucy file under a directory
    Test {
        /// Directory to search (default: tests)
        #[arg(default_value = "tests")]
        dir: PathBuf,

        /// Regenerate each script's golden `.out` file instead of diffing against it
        #[arg(long)]
        update: bool,

        /// Print each failing test's error message
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compile a script and print its bytecode as neutral JSON
    Dump {
        /// Path to the .lucy file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file } => match lucy::run_file(&file) {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{err}");
                ExitCode::FAILURE
            }
        },

        Commands::Repl => match lucy::repl::Repl::new() {
            Ok(mut repl) => match repl.run() {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("REPL error: {e}");
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                eprintln!("failed to start REPL: {e}");
                ExitCode::FAILURE
            }
        },

        Commands::Test { dir, update, verbose } => {
            let report = lucy::test_runner::run_directory(&dir, update);
            report.print(verbose);
            if report.exit_code() == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }

        Commands::Dump { file } => {
            let source = match fs::read_to_string(&file) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("failed to read '{}': {e}", file.display());
                    return ExitCode::FAILURE;
                }
            };
            match lucy::compile(&source) {
                Ok(program) => {
                    println!("{}", lucy::dump::dump_to_string(&program));
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("{err}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
