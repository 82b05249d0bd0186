// ABOUTME: The Call-tree AST produced by the parser and consumed by the evaluator

use crate::value::FnId;
use std::fmt;

/// One of the special forms that drive the evaluation protocol directly
/// (as opposed to a named callable looked up in global scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    Let,
    If,
    Cond,
    Defun,
    Lambda,
    Import,
}

impl SpecialKind {
    pub fn name(self) -> &'static str {
        match self {
            SpecialKind::Let => "let",
            SpecialKind::If => "if",
            SpecialKind::Cond => "cond",
            SpecialKind::Defun => "defun",
            SpecialKind::Lambda => "lambda",
            SpecialKind::Import => "import",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "let" => SpecialKind::Let,
            "if" => SpecialKind::If,
            "cond" => SpecialKind::Cond,
            "defun" => SpecialKind::Defun,
            "lambda" => SpecialKind::Lambda,
            "import" => SpecialKind::Import,
            _ => return None,
        })
    }
}

/// What a Call node's head resolves to.
///
/// A selector already bound in
/// `global` at the moment its enclosing node is *constructed* (i.e. at parse
/// time) is resolved then and pinned for the node's lifetime — `Pinned`
/// carries that resolved identity directly so evaluation never re-looks it
/// up. Forward references and self-references, which cannot be resolved at
/// parse time, fall back to `MaybeCall` and are looked up fresh on every
/// evaluation through ordinary scope resolution.
#[derive(Debug, Clone)]
pub enum FormKind {
    Special(SpecialKind),
    /// `name` is kept only for `head_name`/error-message purposes; `id` is
    /// the resolved callable.
    Pinned { name: String, id: FnId },
    /// The selector could not be resolved at parse time (forward reference,
    /// or the selector is itself a parenthesized subexpression). `args[0]`
    /// holds the deferred selector node; `args[1..]` are the real call's
    /// arguments.
    MaybeCall,
}

/// An argument node: a raw symbol token, a string literal, a nested Call, or
/// (only in a `lambda` call's capture-list position) a flat list of literal
/// names the parser extracted directly rather than treating as a callable
/// sub-expression.
#[derive(Debug, Clone)]
pub enum Arg {
    Symbol(String),
    Str(String),
    Call(CallNode),
    NameList(Vec<String>),
}

/// A parsed Call node. Immutable once built: all per-evaluation protocol
/// state (resolved/prepared flags, in-flight arg buffer) lives on the
/// evaluator's `Frame`, never here.
#[derive(Debug, Clone)]
pub struct CallNode {
    pub form: FormKind,
    pub args: Vec<Arg>,
}

impl CallNode {
    /// The source-like head name used in error messages and `NotCallable`
    /// context (`(name arg1 arg2)`).
    pub fn head_name(&self) -> &str {
        match &self.form {
            FormKind::Special(kind) => kind.name(),
            FormKind::Pinned { name, .. } => name.as_str(),
            FormKind::MaybeCall => "?",
        }
    }
}

impl fmt::Display for CallNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if matches!(self.form, FormKind::MaybeCall) {
            // args[0] is the deferred selector; print it as the head.
            write!(f, "(")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{arg}")?;
            }
            return write!(f, ")");
        }
        write!(f, "({}", self.head_name())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Symbol(s) => write!(f, "{s}"),
            Arg::Str(s) => write!(f, "\"{s}\""),
            Arg::Call(c) => write!(f, "{c}"),
            Arg::NameList(names) => write!(f, "({})", names.join(" ")),
        }
    }
}
