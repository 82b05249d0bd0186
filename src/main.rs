use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lal::builtins::StdoutSink;

/// Interpreter for LAL, a small Lisp-like expression language
#[derive(Parser, Debug)]
#[command(name = "lal")]
#[command(about = "An interpreter for LAL, a small Lisp-like expression language")]
struct CliArgs {
    /// Script file to execute
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Smoke-test mode: exit 0 immediately when FILE is omitted
    #[arg(long = "test")]
    test: bool,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let path = match args.file {
        Some(path) => path,
        None => {
            if args.test {
                return ExitCode::SUCCESS;
            }
            eprintln!("Filename is required if not running tests.");
            return ExitCode::FAILURE;
        }
    };

    let source = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Cannot read script file {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut sink = StdoutSink;
    match lal::run_source(&source, &mut sink) {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
