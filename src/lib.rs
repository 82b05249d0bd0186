// ABOUTME: Library module exposing internal components for testing

pub mod ast;
pub mod builtins;
pub mod env;
pub mod error;
pub mod eval;
pub mod function;
pub mod parser;
pub mod value;

use error::LalError;
use value::Value;

/// Runs a complete program from source: fresh global scope, builtins seeded,
/// a fresh function table, and the real filesystem loader for `import`.
pub fn run_source(text: &str, sink: &mut dyn builtins::LineSink) -> Result<Value, LalError> {
    let global = env::new_global_scope();
    env::seed_builtins(&global);
    let mut functions = function::FunctionTable::new();
    let loader = eval::FsLoader;
    eval::run_program(text, &global, &mut functions, sink, &loader)
}
