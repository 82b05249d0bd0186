// ABOUTME: Scope module — layered local/global name-to-value mapping

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins::ALL_BUILTINS;
use crate::value::{FnId, Value};

/// Shared, growable global bindings: built-ins seeded at startup, plus every
/// `defun`/`lambda` installation and everything `import` brings in. One
/// instance is shared across every top-level block and every nested
/// `import` within a single `run_source` invocation.
pub type GlobalScope = Rc<RefCell<HashMap<String, Value>>>;

pub fn new_global_scope() -> GlobalScope {
    Rc::new(RefCell::new(HashMap::new()))
}

/// Seeds every built-in under its name as `Value::FnRef(FnId::Builtin(..))`,
/// so `+`, `print`, etc. are ordinary global bindings from the start — this
/// is what lets a built-in be passed around as a value.
pub fn seed_builtins(global: &GlobalScope) {
    let mut map = global.borrow_mut();
    for &id in ALL_BUILTINS {
        map.insert(id.name().to_string(), Value::FnRef(FnId::Builtin(id)));
    }
}

/// `local` + `global` lookup. `local` is a plain `HashMap` cloned on entry to
/// any scope-introducing form (`let`, user-call binding) — cheap for the
/// small binding sets this language's programs produce, without pulling in a
/// persistent-map crate the rest of the stack has no other use for.
#[derive(Debug, Clone)]
pub struct Scope {
    pub local: HashMap<String, Value>,
    pub global: GlobalScope,
}

impl Scope {
    pub fn new(global: GlobalScope) -> Self {
        Scope {
            local: HashMap::new(),
            global,
        }
    }

    /// Look up `name` in `local` first, then `global`.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.local.get(name) {
            return Some(v.clone());
        }
        self.global.borrow().get(name).cloned()
    }

    /// Bind `name` in this scope's `local` layer. Never touches `global` or
    /// the caller's scope (copy-on-write happens by cloning a `Scope` before
    /// calling this, e.g. in `let`'s `prepare`).
    pub fn define_local(&mut self, name: String, value: Value) {
        self.local.insert(name, value);
    }

    /// Install a binding into the shared `global` layer (used by `defun`).
    pub fn define_global(&self, name: String, value: Value) {
        self.global.borrow_mut().insert(name, value);
    }

    pub fn global_contains(&self, name: &str) -> bool {
        self.global.borrow().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_shadows_global() {
        let global = new_global_scope();
        let mut scope = Scope::new(global);
        scope.define_global("x".to_string(), Value::Int(1));
        scope.define_local("x".to_string(), Value::Int(2));
        assert_eq!(scope.get("x"), Some(Value::Int(2)));
    }

    #[test]
    fn global_lookup_falls_through() {
        let global = new_global_scope();
        let mut scope = Scope::new(global.clone());
        scope.define_global("y".to_string(), Value::Int(7));
        let other = Scope::new(global);
        assert_eq!(other.get("y"), Some(Value::Int(7)));
        let _ = &mut scope;
    }

    #[test]
    fn cloning_local_does_not_leak_mutations_to_caller() {
        let global = new_global_scope();
        let mut outer = Scope::new(global);
        outer.define_local("x".to_string(), Value::Int(1));

        let mut inner = outer.clone();
        inner.define_local("x".to_string(), Value::Int(99));

        assert_eq!(outer.get("x"), Some(Value::Int(1)));
        assert_eq!(inner.get("x"), Some(Value::Int(99)));
    }

    #[test]
    fn undefined_name_is_none() {
        let scope = Scope::new(new_global_scope());
        assert_eq!(scope.get("undefined"), None);
    }
}
