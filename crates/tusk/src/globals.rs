//! Per-interpreter registries and name resolution.
//!
//! Functions, classes, traits and constants live only on the interpreter
//! instance; two instances share nothing. Function and class keys are
//! lowercased (PHP treats those names case-insensitively); constants and
//! variables are case-sensitive.
//!
//! [`NsContext`] carries the current namespace prefix and the per-file `use`
//! alias tables. Every declared function and class captures the context it
//! was declared under so names in its body resolve against the right
//! namespace later.

use std::{cell::RefCell, path::PathBuf, rc::Rc};

use ahash::{AHashMap, AHashSet};

use crate::{
    ast::ClassDecl,
    scope::Scope,
    types::{ClassDef, UserFunc},
    value::Value,
};

/// Namespace context: the active prefix plus alias maps from `use`
/// declarations, per kind.
#[derive(Debug, Clone, Default)]
pub struct NsContext {
    /// `""` for the global namespace, else e.g. `"App\Models"`.
    pub prefix: String,
    /// Lowercased alias → fully qualified name.
    pub class_aliases: AHashMap<String, String>,
    pub func_aliases: AHashMap<String, String>,
    /// Constant aliases are case-sensitive like the constants themselves.
    pub const_aliases: AHashMap<String, String>,
}

impl NsContext {
    /// Resolves a class-position name to its fully qualified form.
    pub fn resolve_class(&self, name: &str) -> String {
        if let Some(rest) = name.strip_prefix('\\') {
            return rest.to_owned();
        }
        let lowered_head = head_segment(name).to_ascii_lowercase();
        if lowered_head == "namespace" {
            return self.join(name.splitn(2, '\\').nth(1).unwrap_or(""));
        }
        if let Some(target) = self.class_aliases.get(&lowered_head) {
            return match name.split_once('\\') {
                Some((_, rest)) => format!("{target}\\{rest}"),
                None => target.clone(),
            };
        }
        self.join(name)
    }

    /// Function-position names additionally fall back to the global space;
    /// this returns the namespaced candidate, the caller tries the global
    /// name second.
    pub fn resolve_function(&self, name: &str) -> String {
        if let Some(rest) = name.strip_prefix('\\') {
            return rest.to_owned();
        }
        if !name.contains('\\') {
            if let Some(target) = self.func_aliases.get(&name.to_ascii_lowercase()) {
                return target.clone();
            }
            return self.join(name);
        }
        self.resolve_class(name)
    }

    /// Constant-position resolution; same shape as functions but aliases
    /// match case-sensitively.
    pub fn resolve_const(&self, name: &str) -> String {
        if let Some(rest) = name.strip_prefix('\\') {
            return rest.to_owned();
        }
        if !name.contains('\\') {
            if let Some(target) = self.const_aliases.get(name) {
                return target.clone();
            }
            return self.join(name);
        }
        self.resolve_class(name)
    }

    fn join(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_owned()
        } else if name.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}\\{name}", self.prefix)
        }
    }
}

fn head_segment(name: &str) -> &str {
    name.split('\\').next().unwrap_or(name)
}

/// The interpreter-wide mutable registries.
#[derive(Debug, Default)]
pub struct Globals {
    /// Global variable scope; `global $x` aliases slots out of it.
    pub vars: Scope,
    /// Lowercased fully qualified name → function.
    pub functions: AHashMap<String, Rc<UserFunc>>,
    /// Lowercased fully qualified name → class/interface/enum.
    pub classes: AHashMap<String, Rc<ClassDef>>,
    /// Trait declarations are kept as syntax for flattening at `use` sites.
    pub traits: AHashMap<String, Rc<ClassDecl>>,
    /// Case-sensitive constant table.
    pub constants: AHashMap<String, Value>,
    /// Canonicalized paths already pulled in by `include_once`/`require_once`.
    pub included: AHashSet<PathBuf>,
    /// `static` function locals keyed by `"function::variable"`.
    pub statics: AHashMap<String, Rc<RefCell<Value>>>,
}

impl Globals {
    pub fn lookup_class(&self, fq_name: &str) -> Option<Rc<ClassDef>> {
        self.classes.get(&fq_name.to_ascii_lowercase()).map(Rc::clone)
    }

    pub fn lookup_function(&self, fq_name: &str) -> Option<Rc<UserFunc>> {
        self.functions.get(&fq_name.to_ascii_lowercase()).map(Rc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(prefix: &str) -> NsContext {
        NsContext { prefix: prefix.to_owned(), ..NsContext::default() }
    }

    #[test]
    fn fully_qualified_names_ignore_the_prefix() {
        assert_eq!(ctx("App").resolve_class("\\Other\\Thing"), "Other\\Thing");
    }

    #[test]
    fn unqualified_names_join_the_prefix() {
        assert_eq!(ctx("App").resolve_class("Thing"), "App\\Thing");
        assert_eq!(ctx("").resolve_class("Thing"), "Thing");
    }

    #[test]
    fn aliases_apply_to_the_head_segment() {
        let mut context = ctx("App");
        context.class_aliases.insert("db".to_owned(), "Vendor\\Database".to_owned());
        assert_eq!(context.resolve_class("Db"), "Vendor\\Database");
        assert_eq!(context.resolve_class("Db\\Conn"), "Vendor\\Database\\Conn");
    }

    #[test]
    fn relative_names_resolve_against_the_prefix() {
        assert_eq!(ctx("App").resolve_class("namespace\\Util"), "App\\Util");
    }
}
