// ABOUTME: User-defined function records, installed into global scope by defun/lambda

use crate::ast::CallNode;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// An index into the interpreter's function table. Stable for the lifetime
/// of a `run_source` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub usize);

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub variadic: bool,
    pub body: Rc<CallNode>,
    pub captures: HashMap<String, Value>,
}

impl FunctionDef {
    /// Number of required fixed-position parameters (excludes the trailing `*`).
    pub fn fixed_arity(&self) -> usize {
        if self.variadic {
            self.params.len() - 1
        } else {
            self.params.len()
        }
    }
}

/// Append-only table of function definitions, shared across the whole
/// program run (including through `import`).
#[derive(Debug, Default)]
pub struct FunctionTable {
    defs: Vec<FunctionDef>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self { defs: Vec::new() }
    }

    pub fn push(&mut self, def: FunctionDef) -> FunctionId {
        let id = FunctionId(self.defs.len());
        self.defs.push(def);
        id
    }

    pub fn get(&self, id: FunctionId) -> &FunctionDef {
        &self.defs[id.0]
    }
}
