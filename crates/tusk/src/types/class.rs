//! Runtime class, interface, trait and enum data.
//!
//! A class's method table is flattened at declaration time: parent methods
//! first, then trait methods after `insteadof`/`as` adaptation, then the
//! class's own methods, each entry recording its declaring class for
//! `self::` resolution and visibility checks. `instanceof` therefore only
//! walks the parent chain and a precomputed set of implemented interfaces.

use std::{cell::RefCell, rc::Rc};

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::{
    ast::{AttributeSpec, ClassKind, Expr, PropHook, Visibility},
    heap::ObjectId,
    types::UserFunc,
    value::Value,
};

/// An instance property definition carried by the class.
#[derive(Debug, Clone)]
pub struct PropDef {
    pub name: String,
    /// Default expression, re-evaluated for every new instance.
    pub default: Option<Expr>,
    pub ty: Option<crate::ast::TypeExpr>,
    pub visibility: Visibility,
    /// Asymmetric write visibility when declared `…(set)`.
    pub set_visibility: Option<Visibility>,
    pub is_readonly: bool,
    pub declaring_class: String,
    pub hooks: Vec<PropHook>,
    pub attrs: Vec<AttributeSpec>,
}

/// One entry of the flattened method table.
#[derive(Debug)]
pub struct MethodDef {
    pub name: String,
    pub func: Rc<UserFunc>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    pub declaring_class: String,
}

/// A class constant with its evaluated value.
#[derive(Debug, Clone)]
pub struct ConstDef {
    pub value: Value,
    pub visibility: Visibility,
    pub declaring_class: String,
}

/// A declared enum case: its backing value (for backed enums) and the case
/// singleton object.
#[derive(Debug, Clone)]
pub struct EnumCase {
    pub backing: Option<Value>,
    pub object: ObjectId,
}

#[derive(Debug)]
pub struct ClassDef {
    /// Fully qualified name as declared (no leading backslash).
    pub name: String,
    pub kind: ClassKind,
    pub parent: Option<Rc<ClassDef>>,
    /// Every interface this class implements, directly or transitively,
    /// lowercased for `instanceof` and catch matching.
    pub interfaces: AHashSet<String>,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_readonly: bool,
    /// Instance properties in declaration order, parents first.
    pub props: IndexMap<String, PropDef>,
    /// Static property slots; `Rc<RefCell<…>>` so `&Class::$x` can alias.
    pub static_props: RefCell<AHashMap<String, std::rc::Rc<std::cell::RefCell<Value>>>>,
    /// Flattened method table keyed by lowercased name.
    pub methods: AHashMap<String, Rc<MethodDef>>,
    /// Constants, filled while the declaration evaluates (later constants
    /// may refer to earlier ones via `self::`).
    pub consts: RefCell<IndexMap<String, ConstDef>>,
    /// `"int"` / `"string"` for backed enums.
    pub enum_backing: Option<String>,
    pub enum_cases: RefCell<IndexMap<String, EnumCase>>,
    pub attrs: Vec<AttributeSpec>,
}

impl ClassDef {
    /// Method lookup by case-insensitive name against the flattened table.
    pub fn find_method(&self, name: &str) -> Option<Rc<MethodDef>> {
        self.methods.get(&name.to_ascii_lowercase()).map(Rc::clone)
    }

    /// Walks the parent chain looking for `name`, case-insensitively.
    pub fn is_subclass_of(&self, name: &str) -> bool {
        let target = name.to_ascii_lowercase();
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name.to_ascii_lowercase() == target {
                return true;
            }
            current = class.parent.as_deref();
        }
        false
    }

    /// `instanceof`: the class itself, an ancestor, or an implemented
    /// interface.
    pub fn instance_of(&self, name: &str) -> bool {
        let target = name.trim_start_matches('\\').to_ascii_lowercase();
        self.is_subclass_of(&target) || self.interfaces.contains(&target)
    }

    /// Constant lookup through the class and its ancestors.
    pub fn find_const(&self, name: &str) -> Option<ConstDef> {
        if let Some(def) = self.consts.borrow().get(name) {
            return Some(def.clone());
        }
        self.parent.as_ref().and_then(|p| p.find_const(name))
    }

    /// The slot for a static property, searching ancestors.
    pub fn find_static_slot(&self, name: &str) -> Option<Rc<RefCell<Value>>> {
        if let Some(slot) = self.static_props.borrow().get(name) {
            return Some(Rc::clone(slot));
        }
        self.parent.as_ref().and_then(|p| p.find_static_slot(name))
    }

    /// Property definition lookup (instance properties only).
    pub fn find_prop(&self, name: &str) -> Option<&PropDef> {
        self.props.get(name)
    }
}
