//! Composite runtime types referenced by [`Value`](crate::value::Value).

pub mod array;
pub mod class;
pub mod closure;
pub mod generator;

use std::rc::Rc;

pub use array::{ArrayKey, PhpArray};
pub use class::{ClassDef, ConstDef, EnumCase, MethodDef, PropDef};
pub use closure::{Closure, UserFunc};
pub use generator::Generator;

use crate::{exception::RunResult, interp::Interpreter, value::Value};

/// Host function signature for the builtin registry: ordered argument
/// values in, one value (or a signal) out.
pub type BuiltinFn = Rc<dyn Fn(&mut Interpreter, Vec<Value>) -> RunResult<Value>>;

/// A registered builtin. Builtins are first-class: they can be stored in
/// variables, passed around and called like any other callable value.
#[derive(Clone)]
pub struct Builtin {
    pub name: String,
    pub func: BuiltinFn,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Opaque handle produced by resource-returning builtins.
#[derive(Debug)]
pub struct ResourceHandle {
    pub kind: String,
    pub id: i64,
}
