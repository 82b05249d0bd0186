// ABOUTME: Built-in forms registry — the static table of named callables

use crate::error::EvalError;
use crate::value::Value;

/// Arity requirement for a built-in, used by `validate_args`.
#[derive(Debug, Clone, Copy)]
pub struct Arity {
    pub exact: bool,
    pub num_args: usize,
}

impl Arity {
    pub const fn exact(n: usize) -> Self {
        Arity {
            exact: true,
            num_args: n,
        }
    }

    pub const fn at_least(n: usize) -> Self {
        Arity {
            exact: false,
            num_args: n,
        }
    }

    pub fn check(&self, name: &str, got: usize) -> Result<(), EvalError> {
        let ok = if self.exact {
            got == self.num_args
        } else {
            got >= self.num_args
        };
        if ok {
            Ok(())
        } else {
            Err(EvalError::ArityError {
                name: name.to_string(),
                got,
                expected: self.num_args.to_string(),
                exact: self.exact,
            })
        }
    }
}

/// A stable identity for every built-in form. Seeded into the global scope
/// at startup as `Value::FnRef(FnId::Builtin(id))` so built-ins can be
/// passed around as ordinary values (the `(+ +)` selector-is-expression
/// scenario relies on this).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinId {
    Add,
    Sub,
    Mod,
    Sqrt,
    Eq,
    Lt,
    Not,
    NoneFn,
    TrueFn,
    Print,
    Len,
    Nth,
    Flatten,
    CharToInt,
    IntToChar,
}

pub const ALL_BUILTINS: &[BuiltinId] = &[
    BuiltinId::Add,
    BuiltinId::Sub,
    BuiltinId::Mod,
    BuiltinId::Sqrt,
    BuiltinId::Eq,
    BuiltinId::Lt,
    BuiltinId::Not,
    BuiltinId::NoneFn,
    BuiltinId::TrueFn,
    BuiltinId::Print,
    BuiltinId::Len,
    BuiltinId::Nth,
    BuiltinId::Flatten,
    BuiltinId::CharToInt,
    BuiltinId::IntToChar,
];

impl BuiltinId {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinId::Add => "+",
            BuiltinId::Sub => "-",
            BuiltinId::Mod => "%",
            BuiltinId::Sqrt => "sqrt",
            BuiltinId::Eq => "eq",
            BuiltinId::Lt => "<",
            BuiltinId::Not => "not",
            BuiltinId::NoneFn => "none",
            BuiltinId::TrueFn => "true",
            BuiltinId::Print => "print",
            BuiltinId::Len => "len",
            BuiltinId::Nth => "nth",
            BuiltinId::Flatten => "flatten",
            BuiltinId::CharToInt => "chartoint",
            BuiltinId::IntToChar => "inttochar",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_BUILTINS.iter().copied().find(|b| b.name() == name)
    }

    pub fn arity(self) -> Arity {
        match self {
            BuiltinId::Add => Arity::at_least(1),
            BuiltinId::Sub => Arity::at_least(1),
            BuiltinId::Mod => Arity::exact(2),
            BuiltinId::Sqrt => Arity::exact(1),
            BuiltinId::Eq => Arity::at_least(2),
            BuiltinId::Lt => Arity::exact(2),
            BuiltinId::Not => Arity::exact(1),
            BuiltinId::NoneFn => Arity::at_least(0),
            BuiltinId::TrueFn => Arity::at_least(0),
            BuiltinId::Print => Arity::at_least(0),
            BuiltinId::Len => Arity::exact(1),
            BuiltinId::Nth => Arity::exact(2),
            BuiltinId::Flatten => Arity::exact(1),
            BuiltinId::CharToInt => Arity::exact(1),
            BuiltinId::IntToChar => Arity::exact(1),
        }
    }

    /// Built-ins never rewrite their own argument list in `prepare` (they
    /// have none), so validating after full evaluation or after resolve
    /// makes no observable difference; all built-ins use the simpler
    /// post-evaluation path.
    pub fn validate_on_resolve(self) -> bool {
        false
    }
}

/// Anything `print` can write a line to. Production code writes to stdout;
/// tests substitute an in-memory sink to assert on output.
pub trait LineSink {
    fn write_line(&mut self, line: &str);
}

pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn write_line(&mut self, line: &str) {
        println!("{line}");
    }
}

#[derive(Debug, Default)]
pub struct CapturingSink {
    pub lines: Vec<String>,
}

impl LineSink for CapturingSink {
    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

fn add(a: &Value, b: &Value, in_call: &str) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x + y)),
        (Value::Str(x), Value::Str(y)) => Ok(Value::Str(format!("{x}{y}"))),
        (x, y) if x.as_f64().is_some() && y.as_f64().is_some() => {
            Ok(Value::Float(x.as_f64().unwrap() + y.as_f64().unwrap()))
        }
        (x, y) => Err(EvalError::TypeError {
            message: format!(
                "cannot add {} and {}",
                x.type_name(),
                y.type_name()
            ),
            in_call: in_call.to_string(),
        }),
    }
}

fn sub(a: &Value, b: &Value, in_call: &str) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x - y)),
        (x, y) if x.as_f64().is_some() && y.as_f64().is_some() => {
            Ok(Value::Float(x.as_f64().unwrap() - y.as_f64().unwrap()))
        }
        (x, y) => Err(EvalError::TypeError {
            message: format!(
                "cannot subtract {} from {}",
                y.type_name(),
                x.type_name()
            ),
            in_call: in_call.to_string(),
        }),
    }
}

fn negate(a: &Value, in_call: &str) -> Result<Value, EvalError> {
    match a {
        Value::Int(x) => Ok(Value::Int(-x)),
        Value::Float(x) => Ok(Value::Float(-x)),
        x => Err(EvalError::TypeError {
            message: format!("cannot negate {}", x.type_name()),
            in_call: in_call.to_string(),
        }),
    }
}

fn flatten_into(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::List(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other.clone()),
    }
}

/// Apply a fully-evaluated built-in call. `in_call` is the printed Lisp-style
/// form of the enclosing call, used for error context.
pub fn apply(
    id: BuiltinId,
    args: &[Value],
    in_call: &str,
    sink: &mut dyn LineSink,
) -> Result<Value, EvalError> {
    match id {
        BuiltinId::Add => {
            // With a single argument, `+` is identity regardless of type —
            // load-bearing for selector-is-expression forms like `(+ +)`.
            let mut it = args.iter();
            let mut acc = it.next().unwrap().clone();
            for v in it {
                acc = add(&acc, v, in_call)?;
            }
            Ok(acc)
        }
        BuiltinId::Sub => {
            if args.len() == 1 {
                negate(&args[0], in_call)
            } else {
                let mut it = args.iter();
                let mut acc = it.next().unwrap().clone();
                for v in it {
                    acc = sub(&acc, v, in_call)?;
                }
                Ok(acc)
            }
        }
        BuiltinId::Mod => match (&args[0], &args[1]) {
            // Floored modulus (result takes the divisor's sign), matching the
            // historical reference's `a % b` over Python ints rather than
            // Rust's truncated remainder.
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(((a % b) + b) % b)),
            _ => Err(EvalError::TypeError {
                message: "\"%\" requires two Int arguments".to_string(),
                in_call: in_call.to_string(),
            }),
        },
        BuiltinId::Sqrt => {
            let f = args[0].as_f64().ok_or_else(|| EvalError::TypeError {
                message: format!("\"sqrt\" requires a numeric argument, got {}", args[0].type_name()),
                in_call: in_call.to_string(),
            })?;
            Ok(Value::Float(f.sqrt()))
        }
        BuiltinId::Eq => {
            let first = &args[0];
            Ok(Value::Bool(args[1..].iter().all(|v| v == first)))
        }
        BuiltinId::Lt => match (&args[0], &args[1]) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a < b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a < b)),
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                Ok(Value::Bool(a.as_f64().unwrap() < b.as_f64().unwrap()))
            }
            (a, b) => Err(EvalError::TypeError {
                message: format!("cannot compare {} and {}", a.type_name(), b.type_name()),
                in_call: in_call.to_string(),
            }),
        },
        BuiltinId::Not => Ok(Value::Bool(!args[0].is_truthy())),
        BuiltinId::NoneFn => Ok(Value::Unit),
        BuiltinId::TrueFn => Ok(Value::Bool(true)),
        BuiltinId::Print => {
            let line = args
                .iter()
                .map(|v| match v {
                    Value::Str(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ");
            sink.write_line(&line);
            Ok(Value::Unit)
        }
        BuiltinId::Len => match &args[0] {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            other => Err(EvalError::TypeError {
                message: format!("\"len\" requires a Str or List, got {}", other.type_name()),
                in_call: in_call.to_string(),
            }),
        },
        BuiltinId::Nth => {
            let idx = match &args[0] {
                Value::Int(i) => *i,
                other => {
                    return Err(EvalError::TypeError {
                        message: format!("\"nth\" requires an Int index, got {}", other.type_name()),
                        in_call: in_call.to_string(),
                    })
                }
            };
            match &args[1] {
                Value::List(items) => {
                    // Negative indices count back from the end, same as
                    // indexing a Python list.
                    let wrapped = if idx < 0 { idx + items.len() as i64 } else { idx };
                    let i = usize::try_from(wrapped).map_err(|_| EvalError::TypeError {
                        message: format!("index {idx} out of range for \"nth\""),
                        in_call: in_call.to_string(),
                    })?;
                    items.get(i).cloned().ok_or_else(|| EvalError::TypeError {
                        message: format!("index {idx} out of range for \"nth\""),
                        in_call: in_call.to_string(),
                    })
                }
                other => Err(EvalError::TypeError {
                    message: format!("\"nth\" requires a List, got {}", other.type_name()),
                    in_call: in_call.to_string(),
                }),
            }
        }
        BuiltinId::Flatten => match &args[0] {
            Value::List(_) => {
                let mut out = Vec::new();
                flatten_into(&args[0], &mut out);
                Ok(Value::List(out))
            }
            Value::Str(s) => Ok(Value::List(s.chars().map(|c| Value::Str(c.to_string())).collect())),
            _ => Err(EvalError::FlattenNotIterableError {
                in_call: in_call.to_string(),
            }),
        },
        BuiltinId::CharToInt => match &args[0] {
            Value::Str(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Int(c as i64)),
                    _ => Err(EvalError::TypeError {
                        message: format!(
                            "\"chartoint\" requires a single-character Str, got {s:?}"
                        ),
                        in_call: in_call.to_string(),
                    }),
                }
            }
            other => Err(EvalError::TypeError {
                message: format!("\"chartoint\" requires a Str, got {}", other.type_name()),
                in_call: in_call.to_string(),
            }),
        },
        BuiltinId::IntToChar => match &args[0] {
            Value::Int(n) => {
                let code = u32::try_from(*n).ok();
                let c = code.and_then(char::from_u32);
                c.map(|c| Value::Str(c.to_string())).ok_or_else(|| EvalError::TypeError {
                    message: format!("{n} is not a valid character code for \"inttochar\""),
                    in_call: in_call.to_string(),
                })
            }
            other => Err(EvalError::TypeError {
                message: format!("\"inttochar\" requires an Int, got {}", other.type_name()),
                in_call: in_call.to_string(),
            }),
        },
    }
}
