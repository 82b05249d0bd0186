// ABOUTME: The explicit-stack evaluator — drives the resolve/prepare/apply protocol

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Arg, CallNode, FormKind, SpecialKind};
use crate::builtins::{self, Arity};
use crate::env::{GlobalScope, Scope};
use crate::error::{EvalError, LalError};
use crate::function::{FunctionDef, FunctionId, FunctionTable};
use crate::value::{FnId, Value};

/// Source loader used by `import` — kept as a narrow trait so tests can
/// substitute an in-memory map instead of touching the filesystem.
pub trait SourceLoader {
    fn read_source(&self, path: &str) -> std::io::Result<String>;
}

pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn read_source(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

#[derive(Debug, Default)]
pub struct MapLoader(pub HashMap<String, String>);

impl SourceLoader for MapLoader {
    fn read_source(&self, path: &str) -> std::io::Result<String> {
        self.0.get(path).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no such import: {path}"))
        })
    }
}

/// One argument slot during evaluation: either still an unevaluated
/// sub-expression, a fully resolved value, or a placeholder awaiting a
/// result from a frame that was pushed out of the normal arg-walk (only
/// used by `maybe-call`'s synthetic child — see `prepare` below).
#[derive(Debug)]
enum Slot {
    Val(Value),
    Node(Rc<CallNode>),
    Pending,
}

impl Slot {
    fn as_value(&self) -> Option<&Value> {
        match self {
            Slot::Val(v) => Some(v),
            _ => None,
        }
    }
}

/// Per-call evaluation state. Nothing here lives on the `CallNode` itself —
/// a fresh `Frame` is built for every evaluation of a node, including every
/// invocation of a shared, `Rc`-held function body.
struct Frame {
    node: Rc<CallNode>,
    scope: Scope,
    slots: Vec<Slot>,
    idx: usize,
    resolved: bool,
    prepared: bool,
    /// Set while resolving a `maybe-call`'s selector position, so `prepare`
    /// knows whether a resolved `Str` came from a raw symbol token (the only
    /// case the textual string-as-name path applies to) or not.
    selector_was_symbol: bool,
    /// `defun`/`lambda` stash their body here once popped off the arg list,
    /// unevaluated, during `prepare`.
    stash: Option<Rc<CallNode>>,
    captures: HashMap<String, Value>,
}

impl Frame {
    fn new(node: Rc<CallNode>, scope: Scope) -> Self {
        Frame {
            node,
            scope,
            slots: Vec::new(),
            idx: 0,
            resolved: false,
            prepared: false,
            selector_was_symbol: false,
            stash: None,
            captures: HashMap::new(),
        }
    }

    /// Builds a frame whose slots are already resolved — used for
    /// `maybe-call`'s synthetic child, whose arguments were moved directly
    /// out of the parent's already-resolved slots rather than re-derived
    /// from raw tokens.
    fn pre_resolved(node: Rc<CallNode>, scope: Scope, slots: Vec<Slot>) -> Self {
        Frame {
            node,
            scope,
            slots,
            idx: 0,
            resolved: true,
            prepared: false,
            selector_was_symbol: false,
            stash: None,
            captures: HashMap::new(),
        }
    }

    fn resolve(&mut self) -> Result<(), EvalError> {
        let in_call = self.node.to_string();
        let mut slots = Vec::with_capacity(self.node.args.len());
        for (i, arg) in self.node.args.iter().enumerate() {
            match arg {
                Arg::Symbol(name) => {
                    if i == 0 && matches!(self.node.form, FormKind::MaybeCall) {
                        self.selector_was_symbol = true;
                    }
                    for v in resolve_symbol(name, &self.scope, &in_call)? {
                        slots.push(Slot::Val(v));
                    }
                }
                Arg::Str(s) => slots.push(Slot::Val(Value::Str(s.clone()))),
                Arg::Call(c) => slots.push(Slot::Node(Rc::new(c.clone()))),
                Arg::NameList(names) => slots.push(Slot::Val(Value::List(
                    names.iter().map(|n| Value::Str(n.clone())).collect(),
                ))),
            }
        }
        self.slots = slots;
        Ok(())
    }

    /// `cond`'s `sort_args`: reinterleaved `(c1 a1 c2 a2 …)` becomes
    /// `(c1 c2 … a1 a2 …)` so the evaluator can evaluate every condition
    /// before any action. Identity for every other form.
    fn sort_args(&mut self) {
        if let FormKind::Special(SpecialKind::Cond) = self.node.form {
            let mut conds = Vec::with_capacity(self.slots.len() / 2 + 1);
            let mut actions = Vec::with_capacity(self.slots.len() / 2 + 1);
            for (i, slot) in std::mem::take(&mut self.slots).into_iter().enumerate() {
                if i % 2 == 0 {
                    conds.push(slot);
                } else {
                    actions.push(slot);
                }
            }
            conds.extend(actions);
            self.slots = conds;
        }
    }
}

/// Resolver: literal-symbol escape, integer literals, expansion prefix, then
/// local-then-global lookup.
fn resolve_symbol(token: &str, scope: &Scope, in_call: &str) -> Result<Vec<Value>, EvalError> {
    if let Some(rest) = token.strip_prefix('\'') {
        return Ok(vec![Value::Str(rest.to_string())]);
    }
    if let Ok(n) = token.parse::<i64>() {
        return Ok(vec![Value::Int(n)]);
    }
    let (expand, name) = match token.len() > 1 {
        true => match token.strip_prefix('*') {
            Some(rest) => (true, rest),
            None => (false, token),
        },
        false => (false, token),
    };
    let value = scope.get(name).ok_or_else(|| EvalError::UnknownSymbol {
        name: name.to_string(),
        in_call: in_call.to_string(),
    })?;
    if expand {
        match value {
            Value::List(items) => Ok(items),
            other => Err(EvalError::TypeError {
                message: format!(
                    "cannot expand non-list value with \"*\" (got {})",
                    other.type_name()
                ),
                in_call: in_call.to_string(),
            }),
        }
    } else {
        Ok(vec![value])
    }
}

fn validate_on_resolve(form: &FormKind) -> bool {
    matches!(
        form,
        FormKind::Special(
            SpecialKind::Let | SpecialKind::If | SpecialKind::Cond | SpecialKind::Defun | SpecialKind::Lambda
        )
    )
}

fn can_prepare(frame: &Frame) -> bool {
    match &frame.node.form {
        FormKind::Special(SpecialKind::Let)
        | FormKind::Special(SpecialKind::Defun)
        | FormKind::Special(SpecialKind::Lambda) => frame.idx == frame.slots.len().saturating_sub(1),
        FormKind::Special(SpecialKind::If) => {
            frame.idx == 0 && matches!(frame.slots.first(), Some(Slot::Val(_)))
        }
        FormKind::Special(SpecialKind::Cond) => {
            let mid = frame.slots.len() / 2;
            mid > 0 && frame.idx == mid - 1 && matches!(frame.slots.get(mid - 1), Some(Slot::Val(_)))
        }
        FormKind::Special(SpecialKind::Import) => false,
        FormKind::Pinned { .. } => false,
        FormKind::MaybeCall => frame.idx == 0 && matches!(frame.slots.first(), Some(Slot::Val(_))),
    }
}

fn as_name(slot: &Slot, in_call: &str) -> Result<String, EvalError> {
    match slot.as_value() {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Err(EvalError::TypeError {
            message: format!("expected a name, got {}", other.type_name()),
            in_call: in_call.to_string(),
        }),
        None => Err(EvalError::TypeError {
            message: "expected a resolved name".to_string(),
            in_call: in_call.to_string(),
        }),
    }
}

fn check_star_last(param_slots: &[Slot], in_call: &str) -> Result<(), EvalError> {
    let star_pos = param_slots
        .iter()
        .position(|s| matches!(s.as_value(), Some(Value::Str(s)) if s == "*"));
    if let Some(pos) = star_pos {
        if pos != param_slots.len() - 1 {
            return Err(EvalError::ParamStarNotLastError {
                in_call: in_call.to_string(),
            });
        }
    }
    Ok(())
}

fn build_params(slots: &[Slot], in_call: &str) -> Result<Vec<String>, EvalError> {
    slots.iter().map(|s| as_name(s, in_call)).collect()
}

fn validate_args(frame: &Frame, functions: &FunctionTable) -> Result<(), EvalError> {
    let in_call = frame.node.to_string();
    match &frame.node.form {
        FormKind::Special(SpecialKind::Let) => {
            let n = frame.slots.len();
            if n < 3 || n % 2 == 0 {
                return Err(EvalError::LetArityError { in_call });
            }
        }
        FormKind::Special(SpecialKind::If) => {
            let n = frame.slots.len();
            if n < 2 {
                return Err(EvalError::ArityError {
                    name: "if".to_string(),
                    got: n,
                    expected: "2".to_string(),
                    exact: false,
                });
            }
            if n > 3 {
                return Err(EvalError::ArityError {
                    name: "if".to_string(),
                    got: n,
                    expected: "3".to_string(),
                    exact: true,
                });
            }
        }
        FormKind::Special(SpecialKind::Cond) => {
            let n = frame.slots.len();
            if n < 2 || n % 2 != 0 {
                return Err(EvalError::CondArityError { in_call });
            }
        }
        FormKind::Special(SpecialKind::Defun) => {
            if frame.slots.len() < 2 {
                return Err(EvalError::ArityError {
                    name: "defun".to_string(),
                    got: frame.slots.len(),
                    expected: "2".to_string(),
                    exact: false,
                });
            }
            check_star_last(&frame.slots[1..frame.slots.len() - 1], &in_call)?;
        }
        FormKind::Special(SpecialKind::Lambda) => {
            if frame.slots.len() < 2 {
                return Err(EvalError::ArityError {
                    name: "lambda".to_string(),
                    got: frame.slots.len(),
                    expected: "2".to_string(),
                    exact: false,
                });
            }
            check_star_last(&frame.slots[1..frame.slots.len() - 1], &in_call)?;
        }
        FormKind::Special(SpecialKind::Import) => {
            Arity::exact(1).check("import", frame.slots.len())?;
        }
        FormKind::Pinned { id, name } => match id {
            FnId::Builtin(bid) => bid.arity().check(name, frame.slots.len())?,
            FnId::User(fid) => {
                let def = functions.get(*fid);
                let arity = if def.variadic {
                    Arity::at_least(def.fixed_arity())
                } else {
                    Arity::exact(def.fixed_arity())
                };
                arity.check(name, frame.slots.len())?;
            }
        },
        FormKind::MaybeCall => {}
    }
    Ok(())
}

enum PrepareOutcome {
    Done,
    Spawn(Frame),
}

/// Implements each special form's `prepare` hook.
fn prepare(frame: &mut Frame, _functions: &mut FunctionTable) -> Result<PrepareOutcome, EvalError> {
    let in_call = frame.node.to_string();
    match &frame.node.form {
        FormKind::Special(SpecialKind::Let) => {
            let body = frame.slots.pop().expect("let body slot present");
            let pairs = std::mem::take(&mut frame.slots);
            let mut new_scope = frame.scope.clone();
            for pair in pairs.chunks(2) {
                let name = as_name(&pair[0], &in_call)?;
                let value = pair[1].as_value().cloned().expect("let value already resolved");
                new_scope.define_local(name, value);
            }
            frame.scope = new_scope;
            frame.slots = vec![body];
            frame.idx = 0;
        }
        FormKind::Special(SpecialKind::If) => {
            let truthy = frame.slots[0].as_value().expect("if cond resolved").is_truthy();
            let mut new_slots = vec![std::mem::replace(&mut frame.slots[0], Slot::Pending)];
            if truthy {
                if frame.slots.len() > 1 {
                    new_slots.push(std::mem::replace(&mut frame.slots[1], Slot::Pending));
                }
            } else if frame.slots.len() > 2 {
                new_slots.push(std::mem::replace(&mut frame.slots[2], Slot::Pending));
            }
            frame.slots = new_slots;
            frame.idx = 0;
        }
        FormKind::Special(SpecialKind::Cond) => {
            let mid = frame.slots.len() / 2;
            let mut chosen = None;
            for i in 0..mid {
                if frame.slots[i].as_value().expect("cond value resolved").is_truthy() {
                    chosen = Some(mid + i);
                    break;
                }
            }
            frame.slots = match chosen {
                Some(action_idx) => vec![std::mem::replace(&mut frame.slots[action_idx], Slot::Pending)],
                None => Vec::new(),
            };
            frame.idx = 0;
        }
        FormKind::Special(SpecialKind::Defun) => {
            let body = match frame.slots.pop().expect("defun body slot present") {
                Slot::Node(c) => c,
                _ => {
                    return Err(EvalError::TypeError {
                        message: "\"defun\" body must be a call expression".to_string(),
                        in_call,
                    })
                }
            };
            frame.stash = Some(body);
        }
        FormKind::Special(SpecialKind::Lambda) => {
            let body = match frame.slots.pop().expect("lambda body slot present") {
                Slot::Node(c) => c,
                _ => {
                    return Err(EvalError::TypeError {
                        message: "\"lambda\" body must be a call expression".to_string(),
                        in_call,
                    })
                }
            };
            let names = match frame.slots.first().and_then(Slot::as_value) {
                Some(Value::List(items)) => items.clone(),
                _ => Vec::new(),
            };
            let mut captures = HashMap::new();
            for item in names {
                if let Value::Str(name) = item {
                    let value = frame.scope.get(&name).ok_or_else(|| EvalError::UnknownSymbol {
                        name: name.clone(),
                        in_call: in_call.clone(),
                    })?;
                    captures.insert(name, value);
                }
            }
            frame.captures = captures;
            frame.stash = Some(body);
        }
        FormKind::Special(SpecialKind::Import) => unreachable!("import never prepares"),
        FormKind::Pinned { .. } => unreachable!("built-ins and user calls never prepare"),
        FormKind::MaybeCall => {
            let selector_text = frame.node.args[0].to_string();
            let selector_value = frame.slots[0].as_value().expect("selector resolved").clone();
            let fid = match selector_value {
                Value::FnRef(id) => id,
                Value::Str(s) if frame.selector_was_symbol => match frame.scope.get(&s) {
                    Some(Value::FnRef(id)) => id,
                    _ => {
                        return Err(EvalError::NotCallable {
                            name: s,
                            actual: "Str".to_string(),
                            in_call,
                        })
                    }
                },
                other => {
                    return Err(EvalError::NotCallable {
                        name: selector_text,
                        actual: other.type_name().to_string(),
                        in_call,
                    })
                }
            };
            let rest_slots: Vec<Slot> = frame.slots.drain(1..).collect();
            let synthetic_name = match fid {
                FnId::Builtin(b) => b.name().to_string(),
                FnId::User(_) => selector_text,
            };
            let synthetic_node = Rc::new(CallNode {
                form: FormKind::Pinned { name: synthetic_name, id: fid },
                args: Vec::new(),
            });
            frame.slots.push(Slot::Pending);
            frame.idx = 1;
            let synthetic = Frame::pre_resolved(synthetic_node, frame.scope.clone(), rest_slots);
            return Ok(PrepareOutcome::Spawn(synthetic));
        }
    }
    Ok(PrepareOutcome::Done)
}

fn last_value(slots: &[Slot]) -> Value {
    slots.last().and_then(Slot::as_value).cloned().unwrap_or(Value::Unit)
}

fn call_user_function(
    fid: FunctionId,
    args: Vec<Value>,
    functions: &mut FunctionTable,
    global: GlobalScope,
    sink: &mut dyn builtins::LineSink,
    loader: &dyn SourceLoader,
) -> Result<Value, EvalError> {
    let def = functions.get(fid).clone();
    let mut scope = Scope::new(global);
    for (name, value) in &def.captures {
        scope.define_local(name.clone(), value.clone());
    }
    let fixed = def.fixed_arity();
    for i in 0..fixed {
        scope.define_local(def.params[i].clone(), args[i].clone());
    }
    if def.variadic {
        let rest = args[fixed..].to_vec();
        scope.define_local("*".to_string(), Value::List(rest));
    }
    execute(def.body.clone(), scope, functions, sink, loader)
}

fn apply(
    frame: &mut Frame,
    functions: &mut FunctionTable,
    sink: &mut dyn builtins::LineSink,
    loader: &dyn SourceLoader,
) -> Result<Value, EvalError> {
    let in_call = frame.node.to_string();
    match &frame.node.form {
        FormKind::Special(SpecialKind::Let) => Ok(last_value(&frame.slots)),
        FormKind::Special(SpecialKind::If) => Ok(if frame.slots.len() > 1 {
            last_value(&frame.slots)
        } else {
            Value::Unit
        }),
        FormKind::Special(SpecialKind::Cond) => Ok(if frame.slots.is_empty() {
            Value::Unit
        } else {
            last_value(&frame.slots)
        }),
        FormKind::Special(SpecialKind::Defun) => {
            let name = as_name(&frame.slots[0], &in_call)?;
            let params = build_params(&frame.slots[1..], &in_call)?;
            let variadic = params.last().map(|p| p == "*").unwrap_or(false);
            let body = frame.stash.take().expect("defun body stashed in prepare");
            let def = FunctionDef {
                name: name.clone(),
                params,
                variadic,
                body,
                captures: HashMap::new(),
            };
            let id = functions.push(def);
            frame.scope.define_global(name, Value::FnRef(FnId::User(id)));
            Ok(Value::FnRef(FnId::User(id)))
        }
        FormKind::Special(SpecialKind::Lambda) => {
            let params = build_params(&frame.slots[1..], &in_call)?;
            let variadic = params.last().map(|p| p == "*").unwrap_or(false);
            let body = frame.stash.take().expect("lambda body stashed in prepare");
            let def = FunctionDef {
                name: String::new(),
                params,
                variadic,
                body,
                captures: std::mem::take(&mut frame.captures),
            };
            let id = functions.push(def);
            Ok(Value::FnRef(FnId::User(id)))
        }
        FormKind::Special(SpecialKind::Import) => {
            let path = match frame.slots[0].as_value() {
                Some(Value::Str(p)) => p.clone(),
                _ => {
                    return Err(EvalError::TypeError {
                        message: "\"import\" requires a Str path".to_string(),
                        in_call,
                    })
                }
            };
            let text = loader
                .read_source(&path)
                .map_err(|e| EvalError::IoError { path: path.clone(), message: e.to_string() })?;
            match run_program(&text, &frame.scope.global, functions, sink, loader) {
                Ok(_) => Ok(Value::Unit),
                Err(LalError::Eval(e)) => Err(e),
                Err(LalError::Parse(e)) => Err(EvalError::IoError { path, message: e.to_string() }),
            }
        }
        FormKind::Pinned { id, .. } => {
            let values: Vec<Value> = frame
                .slots
                .iter()
                .map(|s| s.as_value().expect("arg fully resolved").clone())
                .collect();
            match id {
                FnId::Builtin(bid) => builtins::apply(*bid, &values, &in_call, sink),
                FnId::User(fid) => {
                    call_user_function(*fid, values, functions, frame.scope.global.clone(), sink, loader)
                }
            }
        }
        FormKind::MaybeCall => Ok(last_value(&frame.slots)),
    }
}

/// Drives one Call tree to completion without host recursion for flat
/// argument chains. Host recursion still occurs for user-function
/// invocation, since `apply` calls `execute` again for the callee's body.
pub fn execute(
    root: Rc<CallNode>,
    scope: Scope,
    functions: &mut FunctionTable,
    sink: &mut dyn builtins::LineSink,
    loader: &dyn SourceLoader,
) -> Result<Value, EvalError> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut current = Frame::new(root, scope);

    'outer: loop {
        if !current.resolved {
            current.resolve()?;
            current.sort_args();
            if validate_on_resolve(&current.node.form) {
                validate_args(&current, functions)?;
            }
            current.resolved = true;
        }

        loop {
            if current.idx >= current.slots.len() {
                break;
            }
            if !current.prepared && can_prepare(&current) {
                match prepare(&mut current, functions)? {
                    PrepareOutcome::Done => {
                        current.prepared = true;
                        continue;
                    }
                    PrepareOutcome::Spawn(child) => {
                        current.prepared = true;
                        stack.push(current);
                        current = child;
                        continue 'outer;
                    }
                }
            }
            if matches!(current.slots[current.idx], Slot::Node(_)) {
                let child = match std::mem::replace(&mut current.slots[current.idx], Slot::Pending) {
                    Slot::Node(c) => c,
                    _ => unreachable!(),
                };
                let child_scope = current.scope.clone();
                stack.push(current);
                current = Frame::new(child, child_scope);
                continue 'outer;
            }
            current.idx += 1;
        }

        if !validate_on_resolve(&current.node.form) {
            validate_args(&current, functions)?;
        }
        let value = apply(&mut current, functions, sink, loader)?;
        match stack.pop() {
            Some(mut parent) => {
                parent.slots[parent.idx] = Slot::Val(value);
                current = parent;
            }
            None => return Ok(value),
        }
    }
}

/// Top-level driver: normalizes `text`, then parses and executes one
/// top-level block at a time against a shared `global`, so a `defun` in
/// block *i* is visible to block *j > i*. Also used by `import` to run a
/// loaded file's blocks into the current `global`.
pub fn run_program(
    text: &str,
    global: &GlobalScope,
    functions: &mut FunctionTable,
    sink: &mut dyn builtins::LineSink,
    loader: &dyn SourceLoader,
) -> Result<Value, LalError> {
    let normalized = crate::parser::normalize(text);
    let mut rest: &str = &normalized;
    let mut last = Value::Unit;
    loop {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        let (node, after) = crate::parser::parse_top_level(trimmed, global)?;
        rest = after;
        let scope = Scope::new(global.clone());
        last = execute(Rc::new(node), scope, functions, sink, loader)?;
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::CapturingSink;
    use crate::env::{new_global_scope, seed_builtins};

    fn eval_str(src: &str) -> Result<Value, LalError> {
        let global = new_global_scope();
        seed_builtins(&global);
        let mut functions = FunctionTable::new();
        let mut sink = CapturingSink::default();
        let loader = MapLoader::default();
        run_program(src, &global, &mut functions, &mut sink, &loader)
    }

    fn eval_with_sink(src: &str) -> (Result<Value, LalError>, Vec<String>) {
        let global = new_global_scope();
        seed_builtins(&global);
        let mut functions = FunctionTable::new();
        let mut sink = CapturingSink::default();
        let loader = MapLoader::default();
        let result = run_program(src, &global, &mut functions, &mut sink, &loader);
        (result, sink.lines)
    }

    #[test]
    fn scenario_1_simple_add() {
        assert_eq!(eval_str("(+ 1 2)").unwrap(), Value::Int(3));
    }

    #[test]
    fn scenario_2_sqrt_of_sum() {
        assert_eq!(eval_str("(sqrt (+ 2 2))").unwrap(), Value::Float(2.0));
    }

    #[test]
    fn scenario_3_let_binds_two_names() {
        assert_eq!(eval_str("(let 'x 1 'y 2 (+ x y))").unwrap(), Value::Int(3));
    }

    #[test]
    fn scenario_4_inner_let_does_not_leak() {
        let err = eval_str("(let 'x (let 'y 1 (+ y 0)) (+ x y))").unwrap_err();
        match err {
            LalError::Eval(EvalError::UnknownSymbol { name, .. }) => assert_eq!(name, "y"),
            other => panic!("expected UnknownSymbol, got {other:?}"),
        }
    }

    #[test]
    fn scenario_5_user_functions_compose() {
        let src = "(defun 'B 'y (+ y 10)) (defun 'A 'x (+ (B x) 1)) (A 24)";
        assert_eq!(eval_str(src).unwrap(), Value::Int(35));
    }

    #[test]
    fn scenario_6_untaken_branch_does_not_define() {
        let src = "(if (+ 1) (defun 'foo 'x (+ x)) (defun 'bar 'x (+ x))) (foo 1) (bar 2)";
        let err = eval_str(src).unwrap_err();
        match err {
            LalError::Eval(EvalError::UnknownSymbol { name, .. }) => assert_eq!(name, "bar"),
            other => panic!("expected UnknownSymbol, got {other:?}"),
        }
    }

    #[test]
    fn scenario_7_cond_first_truthy_wins() {
        let src = "(cond (eq 1 2) (+ 1) (eq 2 2) (+ 2))";
        assert_eq!(eval_str(src).unwrap(), Value::Int(2));
    }

    #[test]
    fn scenario_8_print_then_return() {
        let (result, lines) = eval_with_sink("(print \"The result is:\") (+ 1 2)");
        assert_eq!(result.unwrap(), Value::Int(3));
        assert_eq!(lines, vec!["The result is:".to_string()]);
    }

    #[test]
    fn scenario_9_user_functions_do_not_inherit_caller_scope() {
        let src = "(let 'x 99 (defun 'y 'a (+ a x))) (let 'x 1 (y 10))";
        let err = eval_str(src).unwrap_err();
        match err {
            LalError::Eval(EvalError::UnknownSymbol { name, .. }) => assert_eq!(name, "x"),
            other => panic!("expected UnknownSymbol, got {other:?}"),
        }
    }

    #[test]
    fn scenario_10_variadic_definition_and_use() {
        let src = "(defun 'f 'a '* (+ a (nth 0 *))) (f 1 2 3)";
        assert_eq!(eval_str(src).unwrap(), Value::Int(3));
    }

    #[test]
    fn scenario_10_star_not_last_is_an_error() {
        let src = "(defun 'f '* 'a (+ a 1))";
        let err = eval_str(src).unwrap_err();
        assert!(matches!(err, LalError::Eval(EvalError::ParamStarNotLastError { .. })));
    }

    #[test]
    fn scenario_11_selector_is_expression() {
        let src = "((+ (defun ' 'x (print x))) 2)";
        let (result, lines) = eval_with_sink(src);
        assert_eq!(result.unwrap(), Value::Unit);
        assert_eq!(lines, vec!["2".to_string()]);
    }

    #[test]
    fn scenario_11_non_fnref_selector_is_not_callable() {
        let err = eval_str("((+ 2) 1)").unwrap_err();
        assert!(matches!(err, LalError::Eval(EvalError::NotCallable { .. })));
    }

    #[test]
    fn scenario_12_blocks_run_strictly_in_order() {
        let (result, lines) = eval_with_sink("(print \"a\") (print \"b\") (print \"c\")");
        assert!(result.is_ok());
        assert_eq!(lines, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn let_shadow_is_restored_on_exit() {
        let src = "(let 'x 1 (let 'x 2 x))";
        assert_eq!(eval_str(src).unwrap(), Value::Int(2));
    }

    #[test]
    fn lambda_captures_snapshot_value_at_definition() {
        let src = "(let 'n 1 (lambda ('n) 'x (+ x n)))";
        let result = eval_str(src).unwrap();
        assert!(matches!(result, Value::FnRef(FnId::User(_))));
    }

    #[test]
    fn lambda_capture_is_unaffected_by_later_rebinding() {
        let src = "
            (defun 'make (+ (let 'n 1 (lambda ('n) 'x (+ x n)))))
            (defun 'call_it 'f (f 10))
            (let 'f (make) (call_it f))
        ";
        assert_eq!(eval_str(src).unwrap(), Value::Int(11));
    }

    #[test]
    fn deep_flat_chain_does_not_overflow_host_stack() {
        let mut src = String::from("1");
        for _ in 0..20_000 {
            src = format!("(+ {src} 1)");
        }
        assert_eq!(eval_str(&src).unwrap(), Value::Int(20_001));
    }

    #[test]
    fn round_trip_printed_call_reparses_to_equivalent_ast() {
        let global = new_global_scope();
        seed_builtins(&global);
        let (node, _) = crate::parser::parse_top_level("(+ 1 2)", &global).unwrap();
        let printed = node.to_string();
        assert_eq!(printed, "(+ 1 2)");
        let (reparsed, _) = crate::parser::parse_top_level(&printed, &global).unwrap();
        assert_eq!(reparsed.to_string(), printed);
    }

    #[test]
    fn import_runs_blocks_into_current_global() {
        let global = new_global_scope();
        seed_builtins(&global);
        let mut functions = FunctionTable::new();
        let mut sink = CapturingSink::default();
        let mut map = HashMap::new();
        map.insert("lib.lal".to_string(), "(defun 'double 'x (+ x x))".to_string());
        let loader = MapLoader(map);
        let result = run_program(
            "(import \"lib.lal\") (double 21)",
            &global,
            &mut functions,
            &mut sink,
            &loader,
        );
        assert_eq!(result.unwrap(), Value::Int(42));
    }

    #[test]
    fn unknown_symbol_errors_with_call_context() {
        let err = eval_str("(+ unknown_name 1)").unwrap_err();
        match err {
            LalError::Eval(EvalError::UnknownSymbol { name, in_call }) => {
                assert_eq!(name, "unknown_name");
                assert!(in_call.contains("unknown_name"));
            }
            other => panic!("expected UnknownSymbol, got {other:?}"),
        }
    }
}
