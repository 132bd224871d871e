//! User function, method and closure payloads.

use std::rc::Rc;

use crate::{
    ast::{Param, Stmt, TypeExpr},
    globals::NsContext,
    heap::ObjectId,
    scope::Binding,
    types::ClassDef,
};

/// The shared body of a named function, method or closure.
///
/// Bodies are behind `Rc` so recursive calls and first-class callables
/// share one copy. `strict_types` records the declaring file's mode, and
/// `ns` the namespace context names inside the body resolve against.
#[derive(Debug)]
pub struct UserFunc {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Rc<Vec<Stmt>>,
    pub is_generator: bool,
    pub by_ref_return: bool,
    pub strict_types: bool,
    pub ns: Rc<NsContext>,
}

/// A closure value: a function plus its captured environment and, when
/// created inside a method, the object and class scope it is bound to.
#[derive(Debug)]
pub struct Closure {
    pub func: Rc<UserFunc>,
    /// Captured variables. By-value captures hold `Binding::Val`; by-ref
    /// captures share the originating slot.
    pub captures: Vec<(String, Binding)>,
    pub this: Option<ObjectId>,
    pub scope_class: Option<Rc<ClassDef>>,
}
