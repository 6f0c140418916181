// Lexical scope chain. Direct translation of
// original_source/src/interpreter/environment.hpp's enclosing_/values_,
// mirrored by emdash-udashboard/src/env.rs's Env<T>{scope, parent}.

use std::rc::Rc;
use std::cell::RefCell;

use indexmap::IndexMap;

use crate::error::RuntimeError;
use crate::value::Value;

pub struct EnvironmentData {
    vars: RefCell<IndexMap<String, Value>>,
    parent: Option<Environment>,
}

/// Shared handle to a scope frame. Cloning an `Environment` clones the
/// handle, not the frame — this is how closures capture a scope (invariant
/// I3) and how child blocks chain to their parent (invariant I2).
#[derive(Clone)]
pub struct Environment(Rc<EnvironmentData>);

impl Environment {
    pub fn root() -> Self {
        Environment(Rc::new(EnvironmentData {
            vars: RefCell::new(IndexMap::new()),
            parent: None,
        }))
    }

    /// A new child frame chained to `self`, per spec.md's "child scopes are
    /// created by chaining" — used for blocks, function calls, and
    /// namespace bodies alike.
    pub fn chain(&self) -> Self {
        Environment(Rc::new(EnvironmentData {
            vars: RefCell::new(IndexMap::new()),
            parent: Some(self.clone()),
        }))
    }

    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.vars.borrow_mut().insert(name.into(), value);
    }

    pub fn assign(&self, name: &str, value: Value, line: u32) -> Result<(), RuntimeError> {
        if self.0.vars.borrow().contains_key(name) {
            self.0.vars.borrow_mut().insert(name.to_string(), value);
            return Ok(());
        }
        match &self.0.parent {
            Some(parent) => parent.assign(name, value, line),
            None => Err(RuntimeError::new(format!("undefined variable '{}'", name), line)),
        }
    }

    pub fn get(&self, name: &str, line: u32) -> Result<Value, RuntimeError> {
        if let Some(v) = self.0.vars.borrow().get(name) {
            return Ok(v.clone());
        }
        match &self.0.parent {
            Some(parent) => parent.get(name, line),
            None => Err(RuntimeError::new(format!("undefined variable '{}'", name), line)),
        }
    }

    /// Snapshot of this frame's own bindings (not the parent chain), used
    /// by NamespaceDecl to fold a child scope into a CustomObject's field
    /// map.
    pub fn own_bindings(&self) -> IndexMap<String, Value> {
        self.0.vars.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get() {
        let env = Environment::root();
        env.define("x", Value::Integer(1));
        assert!(matches!(env.get("x", 1).unwrap(), Value::Integer(1)));
    }

    #[test]
    fn child_sees_parent() {
        let parent = Environment::root();
        parent.define("x", Value::Integer(1));
        let child = parent.chain();
        assert!(matches!(child.get("x", 1).unwrap(), Value::Integer(1)));
    }

    #[test]
    fn assign_walks_to_defining_frame() {
        let parent = Environment::root();
        parent.define("x", Value::Integer(1));
        let child = parent.chain();
        child.assign("x", Value::Integer(2), 1).unwrap();
        assert!(matches!(parent.get("x", 1).unwrap(), Value::Integer(2)));
    }

    #[test]
    fn assign_undefined_errors() {
        let env = Environment::root();
        assert!(env.assign("missing", Value::Null, 7).is_err());
    }

    #[test]
    fn get_undefined_errors() {
        let env = Environment::root();
        assert!(env.get("missing", 3).is_err());
    }
}
