//! Class, interface, trait and enum declaration.
//!
//! Declaration assembles the flattened runtime [`ClassDef`]: parent members
//! first, then trait members after `insteadof`/`as` adaptation, then the
//! class's own members, which override. Constants and static property
//! defaults evaluate once at declaration time in the class's own context;
//! instance property defaults stay as expressions and re-evaluate per
//! instance. Enum cases become singleton objects immediately.

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::{
    ast::{
        ClassDecl, ClassKind, ClassMember, Expr, ExprKind, FuncDecl, MemberModifiers,
        TraitAdaptation, TypeKind, Visibility,
    },
    exception::{ErrorKind, RunResult},
    globals::NsContext,
    interp::{Frame, Interpreter},
    scope::Scope,
    types::{ClassDef, ConstDef, EnumCase, MethodDef, PropDef, UserFunc},
    value::Value,
};

impl Interpreter {
    pub(crate) fn declare_function(&mut self, decl: &FuncDecl) {
        let fq = self.qualify(&decl.name);
        let key = fq.to_ascii_lowercase();
        if self.globals.functions.contains_key(&key) {
            return;
        }
        let func = Rc::new(UserFunc {
            name: fq,
            params: decl.params.clone(),
            return_type: decl.return_type.clone(),
            body: Rc::new(decl.body.clone().unwrap_or_default()),
            is_generator: decl.is_generator,
            by_ref_return: decl.by_ref_return,
            strict_types: self.strict_types,
            ns: Rc::clone(&self.ns),
        });
        self.globals.functions.insert(key, func);
    }

    fn qualify(&self, name: &str) -> String {
        if self.ns.prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{}\\{name}", self.ns.prefix)
        }
    }

    pub(crate) fn declare_class_like(&mut self, decl: &ClassDecl) -> RunResult<()> {
        let fq = self.qualify(&decl.name);
        let key = fq.to_ascii_lowercase();
        if decl.kind == ClassKind::Trait {
            self.globals.traits.entry(key).or_insert_with(|| Rc::new(decl.clone()));
            return Ok(());
        }
        if self.globals.classes.contains_key(&key) {
            return Ok(());
        }

        // Parent and implemented interfaces resolve against the registry;
        // PHP requires them declared first.
        let mut parent = None;
        let mut interfaces: AHashSet<String> = AHashSet::new();
        if decl.kind == ClassKind::Class {
            if let Some(parent_name) = decl.extends.first() {
                let resolved = self.ns.resolve_class(parent_name);
                let parent_def = self.globals.lookup_class(&resolved).ok_or_else(|| {
                    self.error(ErrorKind::Error, format!("Class \"{resolved}\" not found"))
                })?;
                if parent_def.is_final {
                    return Err(self.error(
                        ErrorKind::Error,
                        format!("Class {fq} cannot extend final class {}", parent_def.name),
                    ));
                }
                interfaces.extend(parent_def.interfaces.iter().cloned());
                parent = Some(parent_def);
            }
        }
        let implemented: Vec<&String> = if decl.kind == ClassKind::Interface {
            decl.extends.iter().collect()
        } else {
            decl.implements.iter().collect()
        };
        for interface_name in implemented {
            let resolved = self.ns.resolve_class(interface_name);
            interfaces.insert(resolved.to_ascii_lowercase());
            if let Some(interface_def) = self.globals.lookup_class(&resolved) {
                interfaces.extend(interface_def.interfaces.iter().cloned());
            }
        }
        if decl.kind == ClassKind::Enum {
            interfaces.insert("unitenum".to_owned());
            if decl.enum_backing.is_some() {
                interfaces.insert("backedenum".to_owned());
            }
        }

        // Member accumulation: parent, traits, own.
        let mut props: IndexMap<String, PropDef> = parent
            .as_ref()
            .map(|p| p.props.clone())
            .unwrap_or_default();
        let mut methods: AHashMap<String, Rc<MethodDef>> = parent
            .as_ref()
            .map(|p| p.methods.clone())
            .unwrap_or_default();
        let mut pending_consts: Vec<(String, Visibility, Expr)> = Vec::new();
        let mut pending_statics: Vec<(String, Option<Expr>)> = Vec::new();
        let mut pending_cases: Vec<(String, Option<Expr>)> = Vec::new();

        // Interface constants are inherited into the implementing class.
        let mut inherited_consts: IndexMap<String, ConstDef> = IndexMap::new();
        for interface_key in &interfaces {
            if let Some(interface_def) = self.globals.lookup_class(interface_key) {
                for (name, def) in interface_def.consts.borrow().iter() {
                    inherited_consts.entry(name.clone()).or_insert_with(|| def.clone());
                }
            }
        }

        for member in &decl.members {
            if let ClassMember::TraitUse { traits, adaptations } = member {
                self.flatten_traits(&fq, traits, adaptations, &mut methods, &mut props, &mut pending_statics)?;
            }
        }

        for member in &decl.members {
            match member {
                ClassMember::TraitUse { .. } => {}
                ClassMember::Method { modifiers, func } => {
                    // Promoted constructor parameters double as property
                    // declarations.
                    if func.name.eq_ignore_ascii_case("__construct") {
                        for param in &func.params {
                            if let Some(promotion) = &param.promotion {
                                props.insert(
                                    param.name.clone(),
                                    PropDef {
                                        name: param.name.clone(),
                                        default: None,
                                        ty: param.ty.clone(),
                                        visibility: promotion.visibility_or_public(),
                                        set_visibility: promotion.set_visibility,
                                        is_readonly: promotion.is_readonly || decl.is_readonly,
                                        declaring_class: fq.clone(),
                                        hooks: Vec::new(),
                                        attrs: param.attrs.clone(),
                                    },
                                );
                            }
                        }
                    }
                    let method = self.build_method(&fq, modifiers, func, decl.kind);
                    methods.insert(func.name.to_ascii_lowercase(), Rc::new(method));
                }
                ClassMember::Const { modifiers, entries, .. } => {
                    for (name, expr) in entries {
                        pending_consts.push((
                            name.clone(),
                            modifiers.visibility_or_public(),
                            expr.clone(),
                        ));
                    }
                }
                ClassMember::Property { modifiers, ty, entries, hooks, attrs } => {
                    for (name, default) in entries {
                        if modifiers.is_static {
                            pending_statics.push((name.clone(), default.clone()));
                        } else {
                            props.insert(
                                name.clone(),
                                PropDef {
                                    name: name.clone(),
                                    default: default.clone(),
                                    ty: ty.clone(),
                                    visibility: modifiers.visibility_or_public(),
                                    set_visibility: modifiers.set_visibility,
                                    is_readonly: modifiers.is_readonly || decl.is_readonly,
                                    declaring_class: fq.clone(),
                                    hooks: hooks.clone(),
                                    attrs: attrs.clone(),
                                },
                            );
                        }
                    }
                }
                ClassMember::EnumCase { name, value, .. } => {
                    pending_cases.push((name.clone(), value.clone()));
                }
            }
        }

        if decl.kind == ClassKind::Class && !decl.is_abstract {
            if let Some(missing) = methods.values().find(|m| m.is_abstract) {
                return Err(self.error(
                    ErrorKind::Error,
                    format!(
                        "Class {fq} contains abstract method {} and must therefore be declared abstract",
                        missing.name
                    ),
                ));
            }
        }

        let enum_backing = decl.enum_backing.as_ref().and_then(|ty| match &ty.kind {
            TypeKind::Simple(name) => Some(name.clone()),
            _ => None,
        });

        let class = Rc::new(ClassDef {
            name: fq.clone(),
            kind: decl.kind,
            parent,
            interfaces,
            is_abstract: decl.is_abstract,
            is_final: decl.is_final || decl.kind == ClassKind::Enum,
            is_readonly: decl.is_readonly,
            props,
            static_props: std::cell::RefCell::new(AHashMap::new()),
            methods,
            consts: std::cell::RefCell::new(inherited_consts),
            enum_backing,
            enum_cases: std::cell::RefCell::new(IndexMap::new()),
            attrs: decl.attrs.clone(),
        });
        self.globals.classes.insert(key, Rc::clone(&class));

        // Constants, static property defaults and enum cases evaluate in
        // the class's own context so `self::` references work.
        for (name, visibility, expr) in pending_consts {
            let value = self.eval_in_class_context(&class, &expr)?;
            class.consts.borrow_mut().insert(
                name,
                ConstDef { value, visibility, declaring_class: fq.clone() },
            );
        }
        for (name, default) in pending_statics {
            let value = match default {
                Some(expr) => self.eval_in_class_context(&class, &expr)?,
                None => Value::Null,
            };
            class
                .static_props
                .borrow_mut()
                .insert(name, Rc::new(std::cell::RefCell::new(value)));
        }
        for (name, backing_expr) in pending_cases {
            let backing = match backing_expr {
                Some(expr) => Some(self.eval_in_class_context(&class, &expr)?),
                None => None,
            };
            let id = self.heap.alloc(Rc::clone(&class));
            if let Some(obj) = self.heap.get_mut(id) {
                obj.props.insert("name".to_owned(), Value::string(name.clone()));
                if let Some(backing_value) = &backing {
                    obj.props.insert("value".to_owned(), backing_value.clone());
                }
            }
            class.enum_cases.borrow_mut().insert(name, EnumCase { backing, object: id });
        }
        Ok(())
    }

    fn eval_in_class_context(&mut self, class: &Rc<ClassDef>, expr: &Expr) -> RunResult<Value> {
        let frame = Frame {
            scope: Scope::default(),
            this: None,
            class: Some(Rc::clone(class)),
            static_class: Some(Rc::clone(class)),
            func_name: String::new(),
            args: Vec::new(),
        };
        self.frames.push(frame);
        let result = self.eval_expr(expr);
        self.frames.pop();
        result.map(Value::deref)
    }

    fn build_method(
        &self,
        class_name: &str,
        modifiers: &MemberModifiers,
        func: &FuncDecl,
        kind: ClassKind,
    ) -> MethodDef {
        let is_abstract = modifiers.is_abstract || (kind == ClassKind::Interface && func.body.is_none());
        MethodDef {
            name: func.name.clone(),
            func: Rc::new(UserFunc {
                name: func.name.clone(),
                params: func.params.clone(),
                return_type: func.return_type.clone(),
                body: Rc::new(func.body.clone().unwrap_or_default()),
                is_generator: func.is_generator,
                by_ref_return: func.by_ref_return,
                strict_types: self.strict_types,
                ns: Rc::clone(&self.ns),
            }),
            visibility: modifiers.visibility_or_public(),
            is_static: modifiers.is_static,
            is_abstract,
            is_final: modifiers.is_final,
            declaring_class: class_name.to_owned(),
        }
    }

    /// Trait flattening with `insteadof` exclusion and `as` aliasing,
    /// resolved once here.
    fn flatten_traits(
        &mut self,
        class_name: &str,
        traits: &[String],
        adaptations: &[TraitAdaptation],
        methods: &mut AHashMap<String, Rc<MethodDef>>,
        props: &mut IndexMap<String, PropDef>,
        pending_statics: &mut Vec<(String, Option<Expr>)>,
    ) -> RunResult<()> {
        let mut from_traits: AHashMap<String, (String, Rc<MethodDef>)> = AHashMap::new();
        let mut trait_decls: Vec<(String, Rc<ClassDecl>)> = Vec::new();
        for trait_name in traits {
            let resolved = self.ns.resolve_class(trait_name);
            let trait_decl = self
                .globals
                .traits
                .get(&resolved.to_ascii_lowercase())
                .map(Rc::clone)
                .ok_or_else(|| {
                    self.error(ErrorKind::Error, format!("Trait \"{resolved}\" not found"))
                })?;
            trait_decls.push((resolved, trait_decl));
        }

        for (trait_fq, trait_decl) in &trait_decls {
            for member in &trait_decl.members {
                match member {
                    ClassMember::Method { modifiers, func } => {
                        let lowered = func.name.to_ascii_lowercase();
                        let excluded = adaptations.iter().any(|a| match a {
                            TraitAdaptation::InsteadOf { trait_name, method, excluded } => {
                                method.eq_ignore_ascii_case(&func.name)
                                    && !self.ns.resolve_class(trait_name).eq_ignore_ascii_case(trait_fq)
                                    && excluded
                                        .iter()
                                        .any(|e| self.ns.resolve_class(e).eq_ignore_ascii_case(trait_fq))
                            }
                            TraitAdaptation::As { .. } => false,
                        });
                        if excluded {
                            continue;
                        }
                        if let Some((other_trait, _)) = from_traits.get(&lowered) {
                            return Err(self.error(
                                ErrorKind::Error,
                                format!(
                                    "Trait method {}::{}  collides with {other_trait}::{} in {class_name}",
                                    trait_fq, func.name, func.name
                                ),
                            ));
                        }
                        let method = self.build_method(class_name, modifiers, func, ClassKind::Class);
                        from_traits.insert(lowered, (trait_fq.clone(), Rc::new(method)));
                    }
                    ClassMember::Property { modifiers, ty, entries, hooks, attrs } => {
                        for (name, default) in entries {
                            if modifiers.is_static {
                                pending_statics.push((name.clone(), default.clone()));
                            } else {
                                props.entry(name.clone()).or_insert_with(|| PropDef {
                                    name: name.clone(),
                                    default: default.clone(),
                                    ty: ty.clone(),
                                    visibility: modifiers.visibility_or_public(),
                                    set_visibility: modifiers.set_visibility,
                                    is_readonly: modifiers.is_readonly,
                                    declaring_class: class_name.to_owned(),
                                    hooks: hooks.clone(),
                                    attrs: attrs.clone(),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        // Aliases add entries under new names (or visibilities).
        for adaptation in adaptations {
            if let TraitAdaptation::As { trait_name, method, visibility, alias } = adaptation {
                let source = match trait_name {
                    Some(t) => {
                        let resolved = self.ns.resolve_class(t);
                        trait_decls
                            .iter()
                            .find(|(fq, _)| fq.eq_ignore_ascii_case(&resolved))
                            .and_then(|(fq, decl)| self.trait_method(fq, decl, method))
                    }
                    None => trait_decls
                        .iter()
                        .find_map(|(fq, decl)| self.trait_method(fq, decl, method)),
                };
                let Some(source) = source else {
                    return Err(self.error(
                        ErrorKind::Error,
                        format!("Could not find trait method {method} to alias in {class_name}"),
                    ));
                };
                let renamed = MethodDef {
                    name: alias.clone().unwrap_or_else(|| source.name.clone()),
                    func: Rc::clone(&source.func),
                    visibility: visibility.unwrap_or(source.visibility),
                    is_static: source.is_static,
                    is_abstract: source.is_abstract,
                    is_final: source.is_final,
                    declaring_class: class_name.to_owned(),
                };
                let target = alias
                    .clone()
                    .unwrap_or_else(|| method.clone())
                    .to_ascii_lowercase();
                from_traits.insert(target, (class_name.to_owned(), Rc::new(renamed)));
            }
        }

        for (name, (_, method)) in from_traits {
            methods.insert(name, method);
        }
        Ok(())
    }

    fn trait_method(&self, trait_fq: &str, decl: &ClassDecl, method: &str) -> Option<Rc<MethodDef>> {
        decl.members.iter().find_map(|member| match member {
            ClassMember::Method { modifiers, func } if func.name.eq_ignore_ascii_case(method) => {
                Some(Rc::new(self.build_method(trait_fq, modifiers, func, ClassKind::Class)))
            }
            _ => None,
        })
    }

    // --- class constant / enum case fetch ---

    pub(crate) fn eval_class_const(&mut self, class: &Expr, name: &str) -> RunResult<Value> {
        if name == "class" {
            let resolved = match &class.kind {
                ExprKind::Ident(class_name) => self.resolve_class_position_name(class_name),
                _ => match self.eval_expr(class)?.deref() {
                    Value::Object(id) => self
                        .heap
                        .get(id)
                        .map(|obj| obj.class.name.clone())
                        .unwrap_or_default(),
                    other => other.display_lossy(),
                },
            };
            return Ok(Value::string(resolved));
        }
        let class_def = self.resolve_class_expr(class)?;
        if class_def.kind == ClassKind::Enum {
            if let Some(case) = class_def.enum_cases.borrow().get(name) {
                return Ok(Value::Object(case.object));
            }
        }
        match class_def.find_const(name) {
            Some(def) => Ok(def.value),
            None => Err(self.error(
                ErrorKind::Error,
                format!("Undefined constant {}::{name}", class_def.name),
            )),
        }
    }

    /// Native `cases`/`from`/`tryFrom` on enums.
    pub(crate) fn enum_static_native(
        &mut self,
        class: &Rc<ClassDef>,
        method: &str,
        args: &[Value],
    ) -> Option<RunResult<Value>> {
        if class.kind != ClassKind::Enum {
            return None;
        }
        match method.to_ascii_lowercase().as_str() {
            "cases" => {
                let mut array = crate::types::PhpArray::default();
                for case in class.enum_cases.borrow().values() {
                    array.push(Value::Object(case.object));
                }
                Some(Ok(Value::array(array)))
            }
            "from" | "tryfrom" => {
                let target = args.first().cloned().unwrap_or(Value::Null);
                let found = class.enum_cases.borrow().values().find_map(|case| {
                    case.backing
                        .as_ref()
                        .filter(|b| crate::value::loose_eq(b, &target, &self.heap))
                        .map(|_| case.object)
                });
                match found {
                    Some(id) => Some(Ok(Value::Object(id))),
                    None if method.eq_ignore_ascii_case("tryfrom") => Some(Ok(Value::Null)),
                    None => Some(Err(self.error(
                        ErrorKind::ValueError,
                        format!(
                            "{} is not a valid backing value for enum {}",
                            target.display_lossy(),
                            class.name
                        ),
                    ))),
                }
            }
            _ => None,
        }
    }

    // --- bootstrap ---

    pub(crate) fn bootstrap_classes(&mut self) {
        let (program, errors) = crate::parse::parse(PRELUDE);
        debug_assert!(errors.is_empty(), "prelude must parse: {errors:?}");
        self.hoist_declarations(&program.stmts);
        if self.exec_stmts(&program.stmts).is_err() {
            debug_assert!(false, "prelude must execute cleanly");
        }
        self.ns = Rc::new(NsContext::default());
    }

    pub(crate) fn define_core_constants(&mut self) {
        let constants: &[(&str, Value)] = &[
            ("PHP_EOL", Value::string("\n")),
            ("PHP_INT_MAX", Value::Int(i64::MAX)),
            ("PHP_INT_MIN", Value::Int(i64::MIN)),
            ("PHP_INT_SIZE", Value::Int(8)),
            ("PHP_FLOAT_EPSILON", Value::Float(f64::EPSILON)),
            ("PHP_FLOAT_MAX", Value::Float(f64::MAX)),
            ("PHP_FLOAT_MIN", Value::Float(f64::MIN_POSITIVE)),
            ("PHP_FLOAT_DIG", Value::Int(15)),
            ("PHP_VERSION", Value::string("8.3.0")),
            ("PHP_MAJOR_VERSION", Value::Int(8)),
            ("PHP_MINOR_VERSION", Value::Int(3)),
            ("PHP_OS", Value::string(std::env::consts::OS)),
            ("PHP_OS_FAMILY", Value::string(std::env::consts::FAMILY)),
            ("DIRECTORY_SEPARATOR", Value::string(std::path::MAIN_SEPARATOR.to_string())),
            ("PATH_SEPARATOR", Value::string(":")),
            ("M_PI", Value::Float(std::f64::consts::PI)),
            ("M_E", Value::Float(std::f64::consts::E)),
            ("NAN", Value::Float(f64::NAN)),
            ("INF", Value::Float(f64::INFINITY)),
            ("E_ERROR", Value::Int(1)),
            ("E_WARNING", Value::Int(2)),
            ("E_NOTICE", Value::Int(8)),
            ("E_DEPRECATED", Value::Int(8192)),
            ("E_ALL", Value::Int(32767)),
            ("SORT_REGULAR", Value::Int(0)),
            ("SORT_NUMERIC", Value::Int(1)),
            ("SORT_STRING", Value::Int(2)),
            ("COUNT_NORMAL", Value::Int(0)),
            ("COUNT_RECURSIVE", Value::Int(1)),
            ("STR_PAD_RIGHT", Value::Int(1)),
            ("STR_PAD_LEFT", Value::Int(0)),
            ("STR_PAD_BOTH", Value::Int(2)),
            ("JSON_PRETTY_PRINT", Value::Int(128)),
            ("JSON_UNESCAPED_SLASHES", Value::Int(64)),
            ("JSON_UNESCAPED_UNICODE", Value::Int(256)),
            ("JSON_THROW_ON_ERROR", Value::Int(4194304)),
        ];
        for (name, value) in constants {
            self.globals.constants.insert((*name).to_owned(), value.clone());
        }
    }
}

/// Native class hierarchy, written in the language itself: throwables,
/// SPL-style exception subclasses and the marker interfaces. Engine-raised
/// errors instantiate these classes; `file`/`line` are filled in natively
/// at construction and throw sites.
const PRELUDE: &str = r##"<?php

interface Traversable {}
interface Stringable { public function __toString(): string; }
interface Countable { public function count(): int; }
interface UnitEnum {}
interface BackedEnum {}

interface Throwable extends Stringable {
    public function getMessage(): string;
    public function getCode();
    public function getFile(): string;
    public function getLine(): int;
    public function getPrevious(): ?Throwable;
}

class stdClass {}

class Exception implements Throwable {
    protected $message = "";
    protected $code = 0;
    protected $file = "";
    protected $line = 0;
    protected $previous = null;

    public function __construct($message = "", $code = 0, $previous = null) {
        $this->message = $message;
        $this->code = $code;
        $this->previous = $previous;
    }

    public function getMessage(): string { return $this->message; }
    public function getCode() { return $this->code; }
    public function getFile(): string { return $this->file; }
    public function getLine(): int { return $this->line; }
    public function getPrevious(): ?Throwable { return $this->previous; }
    public function getTrace(): array { return []; }
    public function getTraceAsString(): string { return "#0 {main}"; }
    public function __toString(): string {
        return get_class($this) . ": " . $this->message;
    }
}

class Error implements Throwable {
    protected $message = "";
    protected $code = 0;
    protected $file = "";
    protected $line = 0;
    protected $previous = null;

    public function __construct($message = "", $code = 0, $previous = null) {
        $this->message = $message;
        $this->code = $code;
        $this->previous = $previous;
    }

    public function getMessage(): string { return $this->message; }
    public function getCode() { return $this->code; }
    public function getFile(): string { return $this->file; }
    public function getLine(): int { return $this->line; }
    public function getPrevious(): ?Throwable { return $this->previous; }
    public function getTrace(): array { return []; }
    public function getTraceAsString(): string { return "#0 {main}"; }
    public function __toString(): string {
        return get_class($this) . ": " . $this->message;
    }
}

class TypeError extends Error {}
class ValueError extends Error {}
class ArithmeticError extends Error {}
class DivisionByZeroError extends ArithmeticError {}
class ArgumentCountError extends TypeError {}
class UnhandledMatchError extends Error {}
class ParseError extends Error {}

class ErrorException extends Exception {}
class RuntimeException extends Exception {}
class LogicException extends Exception {}
class InvalidArgumentException extends LogicException {}
class DomainException extends LogicException {}
class LengthException extends LogicException {}
class OutOfRangeException extends LogicException {}
class OutOfBoundsException extends RuntimeException {}
class RangeException extends RuntimeException {}
class OverflowException extends RuntimeException {}
class UnderflowException extends RuntimeException {}
class UnexpectedValueException extends RuntimeException {}
class JsonException extends Exception {}
"##;
