//! Variable scopes.
//!
//! A scope maps `$name` to a binding. Plain bindings hold the value inline;
//! slot bindings hold an `Rc<RefCell<Value>>` shared with whatever aliases
//! the variable (`&$x` references, `global` imports, static locals, by-ref
//! closure captures). Reads and writes see through slots transparently, so
//! reference semantics fall out of the binding representation.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;

use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Binding {
    Val(Value),
    Slot(Rc<RefCell<Value>>),
}

#[derive(Debug, Default)]
pub struct Scope {
    vars: AHashMap<String, Binding>,
}

impl Scope {
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.vars.get(name)? {
            Binding::Val(value) => Some(value.clone()),
            Binding::Slot(slot) => Some(slot.borrow().clone()),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Writes a value, through the slot if the binding is aliased.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.vars.get_mut(name) {
            Some(Binding::Slot(slot)) => {
                *slot.borrow_mut() = value;
            }
            Some(Binding::Val(existing)) => {
                *existing = value;
            }
            None => {
                self.vars.insert(name.to_owned(), Binding::Val(value));
            }
        }
    }

    /// Returns the variable's aliasing slot, promoting a plain binding (or
    /// creating a null one) as needed.
    pub fn slot(&mut self, name: &str) -> Rc<RefCell<Value>> {
        match self.vars.get(name) {
            Some(Binding::Slot(slot)) => return Rc::clone(slot),
            Some(Binding::Val(value)) => {
                let slot = Rc::new(RefCell::new(value.clone()));
                self.vars.insert(name.to_owned(), Binding::Slot(Rc::clone(&slot)));
                return slot;
            }
            None => {}
        }
        let slot = Rc::new(RefCell::new(Value::Null));
        self.vars.insert(name.to_owned(), Binding::Slot(Rc::clone(&slot)));
        slot
    }

    /// Binds a name to an existing slot (reference assignment target side).
    pub fn bind_slot(&mut self, name: &str, slot: Rc<RefCell<Value>>) {
        self.vars.insert(name.to_owned(), Binding::Slot(slot));
    }

    pub fn unset(&mut self, name: &str) {
        self.vars.remove(name);
    }

    /// Apply a mutation to the value in place, through slots.
    pub fn with_mut<R>(&mut self, name: &str, f: impl FnOnce(&mut Value) -> R) -> R {
        match self.vars.entry(name.to_owned()).or_insert(Binding::Val(Value::Null)) {
            Binding::Val(value) => f(value),
            Binding::Slot(slot) => f(&mut slot.borrow_mut()),
        }
    }

    /// Variable names and their current values, for `get_defined_vars` and
    /// arrow-function capture.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.vars
            .iter()
            .map(|(name, binding)| {
                let value = match binding {
                    Binding::Val(value) => value.clone(),
                    Binding::Slot(slot) => slot.borrow().clone(),
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// Raw binding access, used by closures capturing by reference.
    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.vars.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_promotion_aliases_reads_and_writes() {
        let mut scope = Scope::default();
        scope.set("a", Value::Int(1));
        let slot = scope.slot("a");
        *slot.borrow_mut() = Value::Int(2);
        assert!(matches!(scope.get("a"), Some(Value::Int(2))));
        scope.set("a", Value::Int(3));
        assert!(matches!(&*slot.borrow(), Value::Int(3)));
    }

    #[test]
    fn unset_breaks_the_alias() {
        let mut scope = Scope::default();
        let slot = scope.slot("a");
        scope.unset("a");
        scope.set("a", Value::Int(9));
        assert!(matches!(&*slot.borrow(), Value::Null));
    }
}
