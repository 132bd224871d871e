//! Calls: argument binding, user/builtin dispatch, method resolution,
//! instantiation and the property access protocol.
//!
//! Binding follows the declaration: positional arguments first, then named
//! arguments against declared parameter names, variadics collecting the
//! rest. Scalar parameter types coerce in weak mode and are enforced
//! without coercion when the call site's file declared
//! `strict_types=1`; the lone strict-mode exception is int→float widening.

use std::{cell::RefCell, rc::Rc};

use crate::{
    ast::{Arg, Expr, ExprKind, MemberName, Param, TypeExpr, Visibility},
    exception::{ErrorKind, RunResult, Signal},
    heap::ObjectId,
    interp::{Frame, Interpreter},
    scope::{Binding, Scope},
    types::{ArrayKey, Builtin, ClassDef, Closure, PhpArray, UserFunc},
    value::{Num, Value, parse_full_numeric},
};

/// Builtins whose first parameter is by-reference in the reference library;
/// the call site passes a slot so mutations land in the caller.
const BYREF_FIRST_ARG: &[&str] = &[
    "sort", "rsort", "usort", "uasort", "uksort", "ksort", "krsort", "array_push", "array_pop",
    "array_shift", "array_unshift", "shuffle", "array_splice",
];

/// One evaluated call argument.
pub(crate) struct CallArg {
    pub name: Option<String>,
    pub val: ArgVal,
}

pub(crate) enum ArgVal {
    Val(Value),
    /// By-ref argument: the caller's slot.
    Slot(Rc<RefCell<Value>>),
}

impl ArgVal {
    fn value(&self) -> Value {
        match self {
            Self::Val(value) => value.clone(),
            Self::Slot(slot) => slot.borrow().clone(),
        }
    }
}

impl Interpreter {
    // --- call expressions ---

    pub(crate) fn eval_call(&mut self, callee: &Expr, args: &[Arg]) -> RunResult<Value> {
        if let ExprKind::Ident(name) = &callee.kind {
            return self.call_named_function(name, args);
        }
        let callable = self.eval_expr(callee)?.deref();
        let bound = self.eval_args(args, None)?;
        self.call_callable_value(callable, bound)
    }

    fn call_named_function(&mut self, name: &str, args: &[Arg]) -> RunResult<Value> {
        let resolved = self.ns.resolve_function(name);
        let func = self.globals.lookup_function(&resolved).or_else(|| {
            let bare = name.trim_start_matches('\\');
            if resolved == bare { None } else { self.globals.lookup_function(bare) }
        });
        if let Some(func) = func {
            let bound = self.eval_args(args, Some(&func.params.clone()))?;
            return self.call_user(func, None, None, None, &[], bound);
        }
        let bare = name.rsplit('\\').next().unwrap_or(name).to_ascii_lowercase();
        if let Some(builtin) = self.builtins.get(&bare).map(Rc::clone) {
            return self.call_builtin_with_exprs(&builtin, args);
        }
        Err(self.error(ErrorKind::Error, format!("Call to undefined function {name}()")))
    }

    fn call_builtin_with_exprs(&mut self, builtin: &Rc<Builtin>, args: &[Arg]) -> RunResult<Value> {
        let byref_first = BYREF_FIRST_ARG.contains(&builtin.name.as_str());
        let mut values = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            if arg.unpack {
                if let Value::Array(array) = self.eval_expr(&arg.value)?.deref() {
                    for (_, element) in array.iter() {
                        values.push(element.clone().deref());
                    }
                }
                continue;
            }
            if index == 0 && byref_first && is_lvalue(&arg.value) {
                values.push(Value::Ref(self.ref_slot(&arg.value)?));
            } else {
                values.push(self.eval_expr(&arg.value)?.deref());
            }
        }
        self.tracer.on_call(&builtin.name);
        (builtin.func.clone())(self, values)
    }

    /// Calls any callable value with already-evaluated arguments: the
    /// dispatch behind `call_user_func`, `array_map` and friends.
    pub(crate) fn call_value(&mut self, callable: Value, args: Vec<Value>) -> RunResult<Value> {
        let bound = args.into_iter().map(|v| CallArg { name: None, val: ArgVal::Val(v) }).collect();
        self.call_callable_value(callable.deref(), bound)
    }

    fn call_callable_value(&mut self, callable: Value, args: Vec<CallArg>) -> RunResult<Value> {
        match callable {
            Value::Closure(closure) => {
                let Closure { func, captures, this, scope_class } = &*closure;
                self.call_user(
                    Rc::clone(func),
                    *this,
                    scope_class.clone(),
                    scope_class.clone(),
                    captures,
                    args,
                )
            }
            Value::Builtin(builtin) => {
                let values = args.into_iter().map(|a| a.val.value()).collect();
                self.tracer.on_call(&builtin.name);
                (builtin.func.clone())(self, values)
            }
            Value::Str(name) => {
                let name = String::from_utf8_lossy(&name).into_owned();
                if let Some((class_name, method)) = name.split_once("::") {
                    let class = self.lookup_class_or_fail(class_name)?;
                    return self.dispatch_static(&class, method, args, None);
                }
                if let Some(func) = self.globals.lookup_function(&name) {
                    return self.call_user(func, None, None, None, &[], args);
                }
                if let Some(builtin) = self.builtins.get(&name.to_ascii_lowercase()).map(Rc::clone) {
                    let values = args.into_iter().map(|a| a.val.value()).collect();
                    self.tracer.on_call(&builtin.name);
                    return (builtin.func.clone())(self, values);
                }
                Err(self.error(ErrorKind::Error, format!("Call to undefined function {name}()")))
            }
            Value::Array(pair) if pair.len() == 2 => {
                let target = pair.get(&ArrayKey::Int(0)).cloned().unwrap_or(Value::Null).deref();
                let method = pair
                    .get(&ArrayKey::Int(1))
                    .cloned()
                    .unwrap_or(Value::Null)
                    .display_lossy();
                match target {
                    Value::Object(id) => self.dispatch_method(id, &method, args, false),
                    Value::Str(class_name) => {
                        let name = String::from_utf8_lossy(&class_name).into_owned();
                        let class = self.lookup_class_or_fail(&name)?;
                        self.dispatch_static(&class, &method, args, None)
                    }
                    _ => Err(self.error(ErrorKind::TypeError, "Array callback must be [object|class, method]")),
                }
            }
            Value::Object(id) => {
                let has_invoke = self
                    .heap
                    .get(id)
                    .is_some_and(|obj| obj.class.find_method("__invoke").is_some());
                if has_invoke {
                    self.dispatch_method(id, "__invoke", args, false)
                } else {
                    let class = self
                        .heap
                        .get(id)
                        .map_or_else(|| "object".to_owned(), |obj| obj.class.name.clone());
                    Err(self.error(
                        ErrorKind::Error,
                        format!("Object of class {class} is not callable"),
                    ))
                }
            }
            other => Err(self.error(
                ErrorKind::TypeError,
                format!("Value of type {} is not callable", other.type_display()),
            )),
        }
    }

    // --- method calls ---

    pub(crate) fn eval_method_call(
        &mut self,
        object: &Expr,
        method: &MemberName,
        args: &[Arg],
        nullsafe: bool,
    ) -> RunResult<Value> {
        let receiver = self.eval_expr(object)?.deref();
        if nullsafe && matches!(receiver, Value::Null) {
            return Ok(Value::Null);
        }
        let method_name = self.member_name_string(method)?;
        match receiver {
            Value::Object(id) => {
                let bound = self.eval_args_for_method(id, &method_name, args)?;
                self.dispatch_method(id, &method_name, bound, false)
            }
            Value::Generator(gen) => self.generator_method(&gen, &method_name, args),
            Value::Closure(_) | Value::Builtin(_) => {
                if method_name.eq_ignore_ascii_case("__invoke")
                    || method_name.eq_ignore_ascii_case("call")
                {
                    let bound = self.eval_args(args, None)?;
                    self.call_callable_value(receiver, bound)
                } else {
                    Err(self.error(
                        ErrorKind::Error,
                        format!("Call to undefined method Closure::{method_name}()"),
                    ))
                }
            }
            Value::Null => Err(self.error(
                ErrorKind::Error,
                format!("Call to a member function {method_name}() on null"),
            )),
            other => Err(self.error(
                ErrorKind::Error,
                format!(
                    "Call to a member function {method_name}() on {}",
                    other.type_display()
                ),
            )),
        }
    }

    fn eval_args_for_method(
        &mut self,
        id: ObjectId,
        method_name: &str,
        args: &[Arg],
    ) -> RunResult<Vec<CallArg>> {
        let params = self
            .heap
            .get(id)
            .and_then(|obj| obj.class.find_method(method_name))
            .map(|m| m.func.params.clone());
        self.eval_args(args, params.as_deref())
    }

    pub(crate) fn dispatch_method(
        &mut self,
        id: ObjectId,
        method_name: &str,
        args: Vec<CallArg>,
        constructing: bool,
    ) -> RunResult<Value> {
        let class = match self.heap.get(id) {
            Some(obj) => Rc::clone(&obj.class),
            None => return Err(self.error(ErrorKind::Error, "stale object handle")),
        };
        match class.find_method(method_name) {
            Some(method) => {
                if method.is_abstract {
                    return Err(self.error(
                        ErrorKind::Error,
                        format!("Cannot call abstract method {}::{method_name}()", class.name),
                    ));
                }
                if !self.can_access_member(method.visibility, &method.declaring_class) {
                    return self.magic_call_fallback(id, &class, method_name, args);
                }
                let declaring = self.globals.lookup_class(&method.declaring_class);
                let this = if method.is_static { None } else { Some(id) };
                self.call_user(
                    Rc::clone(&method.func),
                    this,
                    declaring,
                    Some(Rc::clone(&class)),
                    &[],
                    args,
                )
            }
            None if constructing => Ok(Value::Null),
            None => self.magic_call_fallback(id, &class, method_name, args),
        }
    }

    fn magic_call_fallback(
        &mut self,
        id: ObjectId,
        class: &Rc<ClassDef>,
        method_name: &str,
        args: Vec<CallArg>,
    ) -> RunResult<Value> {
        if let Some(magic) = class.find_method("__call") {
            let declaring = self.globals.lookup_class(&magic.declaring_class);
            let packed = self.pack_args_array(args);
            let magic_args = vec![
                CallArg { name: None, val: ArgVal::Val(Value::string(method_name)) },
                CallArg { name: None, val: ArgVal::Val(packed) },
            ];
            return self.call_user(
                Rc::clone(&magic.func),
                Some(id),
                declaring,
                Some(Rc::clone(class)),
                &[],
                magic_args,
            );
        }
        Err(self.error(
            ErrorKind::Error,
            format!("Call to undefined method {}::{method_name}()", class.name),
        ))
    }

    fn pack_args_array(&self, args: Vec<CallArg>) -> Value {
        let mut array = PhpArray::default();
        for arg in args {
            match arg.name {
                Some(name) => array.insert(ArrayKey::str(name), arg.val.value()),
                None => {
                    array.push(arg.val.value());
                }
            }
        }
        Value::array(array)
    }

    /// Internal method invocation with plain values (`__toString`,
    /// `__clone`, destructors, hooks).
    pub(crate) fn call_method_by_name(
        &mut self,
        id: ObjectId,
        method_name: &str,
        args: Vec<Value>,
    ) -> RunResult<Value> {
        let bound = args.into_iter().map(|v| CallArg { name: None, val: ArgVal::Val(v) }).collect();
        self.dispatch_method(id, method_name, bound, false)
    }

    // --- static calls ---

    pub(crate) fn eval_static_call(
        &mut self,
        class: &Expr,
        method: &MemberName,
        args: &[Arg],
    ) -> RunResult<Value> {
        let keyword = match &class.kind {
            ExprKind::Ident(name) => Some(name.to_ascii_lowercase()),
            _ => None,
        };
        let class_def = self.resolve_class_expr(class)?;
        let method_name = self.member_name_string(method)?;
        let params = class_def.find_method(&method_name).map(|m| m.func.params.clone());
        let bound = self.eval_args(args, params.as_deref())?;
        // `self::`, `parent::` and `static::` forward the caller's
        // late-static-binding class; an explicit name rebinds it.
        let lsb = match keyword.as_deref() {
            Some("self" | "parent" | "static") => self.static_class(),
            _ => None,
        };
        self.dispatch_static(&class_def, &method_name, bound, lsb)
    }

    pub(crate) fn dispatch_static(
        &mut self,
        class: &Rc<ClassDef>,
        method_name: &str,
        args: Vec<CallArg>,
        lsb_override: Option<Rc<ClassDef>>,
    ) -> RunResult<Value> {
        let arg_values: Vec<Value> = args.iter().map(|a| a.val.value()).collect();
        if let Some(result) = self.enum_static_native(class, method_name, &arg_values) {
            return result;
        }
        let Some(method) = class.find_method(method_name) else {
            if let Some(magic) = class.find_method("__callstatic") {
                let declaring = self.globals.lookup_class(&magic.declaring_class);
                let packed = self.pack_args_array(args);
                let magic_args = vec![
                    CallArg { name: None, val: ArgVal::Val(Value::string(method_name)) },
                    CallArg { name: None, val: ArgVal::Val(packed) },
                ];
                return self.call_user(
                    Rc::clone(&magic.func),
                    None,
                    declaring,
                    Some(Rc::clone(class)),
                    &[],
                    magic_args,
                );
            }
            return Err(self.error(
                ErrorKind::Error,
                format!("Call to undefined method {}::{method_name}()", class.name),
            ));
        };
        if method.is_abstract {
            return Err(self.error(
                ErrorKind::Error,
                format!("Cannot call abstract method {}::{method_name}()", class.name),
            ));
        }
        if !self.can_access_member(method.visibility, &method.declaring_class) {
            return Err(self.error(
                ErrorKind::Error,
                format!(
                    "Call to {} method {}::{method_name}() from global scope",
                    method.visibility, class.name
                ),
            ));
        }
        let declaring = self.globals.lookup_class(&method.declaring_class);
        // A non-static method invoked through `Class::` keeps `$this` when
        // the current object is an instance of that class (`parent::f()`).
        let this = if method.is_static {
            None
        } else {
            match self.current_this() {
                Some(id)
                    if self
                        .heap
                        .get(id)
                        .is_some_and(|obj| obj.class.instance_of(&class.name)) =>
                {
                    Some(id)
                }
                _ => {
                    return Err(self.error(
                        ErrorKind::Error,
                        format!(
                            "Non-static method {}::{method_name}() cannot be called statically",
                            class.name
                        ),
                    ));
                }
            }
        };
        let static_class = lsb_override.or_else(|| {
            this.and_then(|id| self.heap.get(id).map(|obj| Rc::clone(&obj.class)))
        });
        self.call_user(
            Rc::clone(&method.func),
            this,
            declaring,
            static_class.or_else(|| Some(Rc::clone(class))),
            &[],
            args,
        )
    }

    // --- argument evaluation ---

    pub(crate) fn eval_args(
        &mut self,
        args: &[Arg],
        params: Option<&[Param]>,
    ) -> RunResult<Vec<CallArg>> {
        let mut bound = Vec::with_capacity(args.len());
        let mut positional = 0usize;
        for arg in args {
            if arg.unpack {
                match self.eval_expr(&arg.value)?.deref() {
                    Value::Array(array) => {
                        for (key, element) in array.iter() {
                            match key {
                                ArrayKey::Int(_) => {
                                    bound.push(CallArg {
                                        name: None,
                                        val: ArgVal::Val(element.clone().deref()),
                                    });
                                    positional += 1;
                                }
                                ArrayKey::Str(s) => bound.push(CallArg {
                                    name: Some(String::from_utf8_lossy(s).into_owned()),
                                    val: ArgVal::Val(element.clone().deref()),
                                }),
                            }
                        }
                    }
                    Value::Generator(gen) => {
                        let pairs = gen.borrow().pairs.clone();
                        for (_, element) in pairs {
                            bound.push(CallArg { name: None, val: ArgVal::Val(element) });
                            positional += 1;
                        }
                    }
                    other => {
                        return Err(self.error(
                            ErrorKind::TypeError,
                            format!("Only arrays and Traversables can be unpacked, {} given", other.type_display()),
                        ));
                    }
                }
                continue;
            }
            let param = match (&arg.name, params) {
                (Some(name), Some(params)) => params.iter().find(|p| p.name == *name),
                (None, Some(params)) => {
                    params.get(positional).or_else(|| params.last().filter(|p| p.variadic))
                }
                _ => None,
            };
            let by_ref = param.is_some_and(|p| p.by_ref);
            let val = if by_ref && is_lvalue(&arg.value) {
                ArgVal::Slot(self.ref_slot(&arg.value)?)
            } else {
                ArgVal::Val(self.eval_expr(&arg.value)?.deref())
            };
            if arg.name.is_none() {
                positional += 1;
            }
            bound.push(CallArg { name: arg.name.clone(), val });
        }
        Ok(bound)
    }

    // --- the call core ---

    pub(crate) fn call_user(
        &mut self,
        func: Rc<UserFunc>,
        this: Option<ObjectId>,
        class: Option<Rc<ClassDef>>,
        static_class: Option<Rc<ClassDef>>,
        captures: &[(String, Binding)],
        args: Vec<CallArg>,
    ) -> RunResult<Value> {
        self.tracer.on_call(&func.name);
        let caller_strict = self.strict_types;

        // Split arguments.
        let mut positional: Vec<ArgVal> = Vec::new();
        let mut named: Vec<(String, ArgVal)> = Vec::new();
        for arg in args {
            match arg.name {
                Some(name) => named.push((name, arg.val)),
                None => positional.push(arg.val),
            }
        }
        for (name, _) in &named {
            if !func.params.iter().any(|p| p.name == *name)
                && !func.params.last().is_some_and(|p| p.variadic)
            {
                return Err(self.error(
                    ErrorKind::Error,
                    format!("Unknown named parameter ${name}"),
                ));
            }
        }

        let mut scope = Scope::default();
        for (name, binding) in captures {
            match binding {
                Binding::Val(value) => scope.set(name, value.clone()),
                Binding::Slot(slot) => scope.bind_slot(name, Rc::clone(slot)),
            }
        }
        if let Some(id) = this {
            scope.set("this", Value::Object(id));
        }
        let frame_args: Vec<Value> = positional.iter().map(ArgVal::value).collect();

        let frame = Frame {
            scope,
            this,
            class: class.clone(),
            static_class: static_class.or(class),
            func_name: func.name.clone(),
            args: frame_args,
        };
        self.frames.push(frame);
        let saved_ns = std::mem::replace(&mut self.ns, Rc::clone(&func.ns));
        let saved_strict = std::mem::replace(&mut self.strict_types, func.strict_types);

        let result = self.bind_and_run(&func, this, &mut positional, &named, caller_strict);

        self.frames.pop();
        self.ns = saved_ns;
        self.strict_types = saved_strict;
        result
    }

    fn bind_and_run(
        &mut self,
        func: &Rc<UserFunc>,
        this: Option<ObjectId>,
        positional: &mut Vec<ArgVal>,
        named: &[(String, ArgVal)],
        caller_strict: bool,
    ) -> RunResult<Value> {
        let param_count = func.params.len();
        for (index, param) in func.params.iter().enumerate() {
            if param.variadic {
                let mut rest = PhpArray::default();
                for val in positional.drain(index.min(positional.len())..) {
                    match val {
                        ArgVal::Slot(slot) => {
                            rest.push(Value::Ref(slot));
                        }
                        ArgVal::Val(value) => {
                            rest.push(value);
                        }
                    }
                }
                for (name, val) in named {
                    rest.insert(ArrayKey::str(name.clone()), val.value());
                }
                self.scope_mut().set(&param.name, Value::array(rest));
                break;
            }
            let supplied = positional.get(index).map(|v| match v {
                ArgVal::Val(value) => ArgVal::Val(value.clone()),
                ArgVal::Slot(slot) => ArgVal::Slot(Rc::clone(slot)),
            });
            let supplied = supplied.or_else(|| {
                named
                    .iter()
                    .find(|(name, _)| *name == param.name)
                    .map(|(_, val)| match val {
                        ArgVal::Val(value) => ArgVal::Val(value.clone()),
                        ArgVal::Slot(slot) => ArgVal::Slot(Rc::clone(slot)),
                    })
            });
            match supplied {
                Some(ArgVal::Slot(slot)) if param.by_ref => {
                    self.scope_mut().bind_slot(&param.name, slot);
                }
                Some(val) => {
                    let mut value = val.value().deref();
                    if let Some(ty) = &param.ty {
                        value = self.coerce_to_type(
                            value,
                            ty,
                            caller_strict,
                            &format!(
                                "{}(): Argument #{} (${})",
                                func.name,
                                index + 1,
                                param.name
                            ),
                        )?;
                    }
                    self.scope_mut().set(&param.name, value);
                }
                None => match &param.default {
                    Some(default) => {
                        let value = self.eval_expr(default)?.deref();
                        self.scope_mut().set(&param.name, value);
                    }
                    None => {
                        let required = func
                            .params
                            .iter()
                            .filter(|p| p.default.is_none() && !p.variadic)
                            .count();
                        return Err(self.error(
                            ErrorKind::ArgumentCountError,
                            format!(
                                "Too few arguments to function {}(), {} passed and at least {} expected",
                                func.name,
                                positional.len(),
                                required.min(param_count)
                            ),
                        ));
                    }
                },
            }
        }

        // Constructor property promotion: promoted parameters land on the
        // instance right after binding.
        if let Some(id) = this {
            for param in &func.params {
                if param.promotion.is_some() {
                    let value = self.scope().get(&param.name).unwrap_or(Value::Null);
                    if let Some(obj) = self.heap.get_mut(id) {
                        obj.props.insert(param.name.clone(), value.deref());
                    }
                }
            }
        }

        let body = Rc::clone(&func.body);
        let run = |interp: &mut Self| -> RunResult<Value> {
            match interp.exec_stmts(&body) {
                Ok(()) => Ok(Value::Null),
                Err(Signal::Return(value)) => Ok(value),
                Err(signal) => Err(signal),
            }
        };

        let mut result = if func.is_generator {
            self.materialize_generator(run)?
        } else {
            run(self)?
        };

        if let Some(ty) = &func.return_type {
            if !func.is_generator {
                result = self.check_return_type(result, ty, &func.name)?;
            }
        }
        Ok(result)
    }

    // --- type declarations ---

    fn check_return_type(&mut self, value: Value, ty: &TypeExpr, func: &str) -> RunResult<Value> {
        let names = ty.names();
        if names.iter().any(|n| {
            matches!(n.to_ascii_lowercase().as_str(), "void" | "never" | "mixed" | "static")
        }) {
            return Ok(value);
        }
        self.coerce_to_type(value, ty, self.strict_types, &format!("{func}(): Return value"))
    }

    /// Type declaration check + weak-mode coercion.
    pub(crate) fn coerce_to_type(
        &mut self,
        value: Value,
        ty: &TypeExpr,
        strict: bool,
        what: &str,
    ) -> RunResult<Value> {
        if ty.nullable && matches!(value, Value::Null) {
            return Ok(value);
        }
        let names = ty.names();
        // Exact (or subtype) match against any member first.
        for name in &names {
            if self.type_matches(&value, name) {
                // int → float widening is always applied.
                if name.eq_ignore_ascii_case("float") {
                    if let Value::Int(i) = value {
                        return Ok(Value::Float(i as f64));
                    }
                }
                return Ok(value);
            }
        }
        if names.iter().any(|n| n.eq_ignore_ascii_case("null")) && matches!(value, Value::Null) {
            return Ok(value);
        }
        if !strict {
            for name in &names {
                if let Some(coerced) = self.weak_coerce(&value, name)? {
                    return Ok(coerced);
                }
            }
        }
        let expected = names.join("|");
        Err(self.error(
            ErrorKind::TypeError,
            format!(
                "{what} must be of type {expected}, {} given",
                value.type_display()
            ),
        ))
    }

    fn type_matches(&self, value: &Value, name: &str) -> bool {
        match name.to_ascii_lowercase().as_str() {
            "mixed" => true,
            "null" => matches!(value, Value::Null),
            "bool" | "false" | "true" => matches!(value, Value::Bool(_)),
            "int" => matches!(value, Value::Int(_)),
            "float" => matches!(value, Value::Int(_) | Value::Float(_)),
            "string" => matches!(value, Value::Str(_)),
            "array" => matches!(value, Value::Array(_)),
            "object" => matches!(
                value,
                Value::Object(_) | Value::Closure(_) | Value::Generator(_)
            ),
            "callable" => matches!(
                value,
                Value::Closure(_) | Value::Builtin(_) | Value::Str(_) | Value::Array(_)
            ),
            "iterable" => matches!(value, Value::Array(_) | Value::Generator(_)),
            "self" => self.value_instance_of_current(value, false),
            "static" => self.value_instance_of_current(value, true),
            class_name => match value {
                Value::Object(id) => self
                    .heap
                    .get(*id)
                    .is_some_and(|obj| obj.class.instance_of(&self.ns.resolve_class(class_name))),
                Value::Closure(_) => class_name == "closure",
                Value::Generator(_) => class_name == "generator" || class_name == "traversable",
                _ => false,
            },
        }
    }

    fn value_instance_of_current(&self, value: &Value, late: bool) -> bool {
        let target = if late { self.static_class() } else { self.current_class() };
        match (value, target) {
            (Value::Object(id), Some(class)) => self
                .heap
                .get(*id)
                .is_some_and(|obj| obj.class.instance_of(&class.name)),
            _ => false,
        }
    }

    fn weak_coerce(&mut self, value: &Value, name: &str) -> RunResult<Option<Value>> {
        let coerced = match name.to_ascii_lowercase().as_str() {
            "int" => match value {
                Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(Value::Int(*f as i64)),
                Value::Float(f) => {
                    self.diag(
                        crate::exception::DiagLevel::Deprecated,
                        &format!("Implicit conversion from float {f} to int loses precision"),
                    );
                    Some(Value::Int(f.trunc() as i64))
                }
                Value::Bool(b) => Some(Value::Int(i64::from(*b))),
                Value::Str(s) => parse_full_numeric(s).map(|num| match num {
                    Num::Int(i) => Value::Int(i),
                    Num::Float(f) => Value::Int(f.trunc() as i64),
                }),
                _ => None,
            },
            "float" => match value {
                Value::Int(i) => Some(Value::Float(*i as f64)),
                Value::Bool(b) => Some(Value::Float(f64::from(u8::from(*b)))),
                Value::Str(s) => parse_full_numeric(s).map(|num| Value::Float(num.to_f64())),
                _ => None,
            },
            "string" => match value {
                Value::Int(_) | Value::Float(_) | Value::Bool(_) => {
                    Some(Value::str(value.to_bytes_lossy()))
                }
                Value::Object(id) => {
                    let has = self
                        .heap
                        .get(*id)
                        .is_some_and(|obj| obj.class.find_method("__tostring").is_some());
                    if has {
                        let bytes = self.coerce_to_string(Value::Object(*id))?;
                        Some(Value::str(bytes))
                    } else {
                        None
                    }
                }
                _ => None,
            },
            "bool" => match value {
                Value::Int(_) | Value::Float(_) | Value::Str(_) => Some(Value::Bool(value.truthy())),
                _ => None,
            },
            _ => None,
        };
        Ok(coerced)
    }

    // --- class resolution & instantiation ---

    pub(crate) fn lookup_class_or_fail(&mut self, name: &str) -> RunResult<Rc<ClassDef>> {
        let resolved = self.resolve_class_position_name(name);
        self.globals
            .lookup_class(&resolved)
            .ok_or_else(|| self.error(ErrorKind::Error, format!("Class \"{resolved}\" not found")))
    }

    pub(crate) fn resolve_class_expr(&mut self, class: &Expr) -> RunResult<Rc<ClassDef>> {
        match &class.kind {
            ExprKind::Ident(name) => self.lookup_class_or_fail(name),
            _ => match self.eval_expr(class)?.deref() {
                Value::Object(id) => self
                    .heap
                    .get(id)
                    .map(|obj| Rc::clone(&obj.class))
                    .ok_or_else(|| self.error(ErrorKind::Error, "stale object handle")),
                Value::Str(s) => {
                    let name = String::from_utf8_lossy(&s).into_owned();
                    self.lookup_class_or_fail(&name)
                }
                other => Err(self.error(
                    ErrorKind::TypeError,
                    format!("Cannot use value of type {} as class name", other.type_display()),
                )),
            },
        }
    }

    pub(crate) fn eval_new(&mut self, class: &Expr, args: &[Arg]) -> RunResult<Value> {
        let class_def = self.resolve_class_expr(class)?;
        self.instantiate(&class_def, args)
    }

    pub(crate) fn instantiate(&mut self, class: &Rc<ClassDef>, args: &[Arg]) -> RunResult<Value> {
        match class.kind {
            crate::ast::ClassKind::Interface => {
                return Err(self.error(
                    ErrorKind::Error,
                    format!("Cannot instantiate interface {}", class.name),
                ));
            }
            crate::ast::ClassKind::Trait => {
                return Err(self.error(
                    ErrorKind::Error,
                    format!("Cannot instantiate trait {}", class.name),
                ));
            }
            crate::ast::ClassKind::Enum => {
                return Err(self.error(
                    ErrorKind::Error,
                    format!("Cannot instantiate enum {}", class.name),
                ));
            }
            crate::ast::ClassKind::Class if class.is_abstract => {
                return Err(self.error(
                    ErrorKind::Error,
                    format!("Cannot instantiate abstract class {}", class.name),
                ));
            }
            crate::ast::ClassKind::Class => {}
        }
        let id = self.heap.alloc(Rc::clone(class));
        self.init_default_props(id, class)?;
        // Throwables record their creation site.
        if class.instance_of("throwable") {
            let file = self.current_file.display().to_string();
            let line = i64::from(self.cur_line);
            if let Some(obj) = self.heap.get_mut(id) {
                obj.props.insert("file".to_owned(), Value::string(file));
                obj.props.insert("line".to_owned(), Value::Int(line));
            }
        }
        let params = class.find_method("__construct").map(|m| m.func.params.clone());
        let bound = self.eval_args(args, params.as_deref())?;
        self.dispatch_method(id, "__construct", bound, true)?;
        Ok(Value::Object(id))
    }

    /// Default property values are expressions re-evaluated per instance,
    /// in the defining class's context so `self::` constants resolve.
    pub(crate) fn init_default_props(&mut self, id: ObjectId, class: &Rc<ClassDef>) -> RunResult<()> {
        let defaults: Vec<(String, Option<Expr>, bool)> = class
            .props
            .iter()
            .map(|(name, def)| (name.clone(), def.default.clone(), def.ty.is_some()))
            .collect();
        for (name, default, typed) in defaults {
            let value = match default {
                Some(expr) => {
                    let frame = Frame {
                        scope: Scope::default(),
                        this: None,
                        class: Some(Rc::clone(class)),
                        static_class: Some(Rc::clone(class)),
                        func_name: String::new(),
                        args: Vec::new(),
                    };
                    self.frames.push(frame);
                    let result = self.eval_expr(&expr);
                    self.frames.pop();
                    result?.deref()
                }
                // Untyped properties default to null; typed ones without a
                // default stay uninitialized.
                None if typed => continue,
                None => Value::Null,
            };
            if let Some(obj) = self.heap.get_mut(id) {
                obj.props.insert(name, value);
            }
        }
        Ok(())
    }

    // --- property protocol ---

    pub(crate) fn can_access_member(&self, visibility: Visibility, declaring: &str) -> bool {
        match visibility {
            Visibility::Public => true,
            Visibility::Protected => self.current_class().is_some_and(|ctx| {
                ctx.is_subclass_of(declaring)
                    || self
                        .globals
                        .lookup_class(declaring)
                        .is_some_and(|d| d.is_subclass_of(&ctx.name))
            }),
            Visibility::Private => self
                .current_class()
                .is_some_and(|ctx| ctx.name.eq_ignore_ascii_case(declaring)),
        }
    }

    pub(crate) fn get_property(&mut self, id: ObjectId, name: &str) -> RunResult<Value> {
        let class = match self.heap.get(id) {
            Some(obj) => Rc::clone(&obj.class),
            None => return Err(self.error(ErrorKind::Error, "stale object handle")),
        };
        if let Some(def) = class.find_prop(name) {
            let accessible = self.can_access_member(def.visibility, &def.declaring_class);
            let get_hook = def.hooks.iter().find(|h| h.is_get).cloned();
            if accessible {
                if let Some(hook) = get_hook {
                    return self.run_hook(id, &class, &hook.body, None);
                }
                let stored = self.heap.get(id).and_then(|obj| obj.props.get(name).cloned());
                return match stored {
                    Some(value) => Ok(value.deref()),
                    None => {
                        if def.ty.is_some() {
                            Err(self.error(
                                ErrorKind::Error,
                                format!(
                                    "Typed property {}::${name} must not be accessed before initialization",
                                    class.name
                                ),
                            ))
                        } else {
                            self.warning(&format!("Undefined property: {}::${name}", class.name));
                            Ok(Value::Null)
                        }
                    }
                };
            }
            // Inaccessible: try __get, else fail.
            if class.find_method("__get").is_some() {
                return self.call_method_by_name(id, "__get", vec![Value::string(name)]);
            }
            return Err(self.error(
                ErrorKind::Error,
                format!("Cannot access {} property {}::${name}", def.visibility, class.name),
            ));
        }
        let stored = self.heap.get(id).and_then(|obj| obj.props.get(name).cloned());
        if let Some(value) = stored {
            return Ok(value.deref());
        }
        if class.find_method("__get").is_some() {
            return self.call_method_by_name(id, "__get", vec![Value::string(name)]);
        }
        self.warning(&format!("Undefined property: {}::${name}", class.name));
        Ok(Value::Null)
    }

    pub(crate) fn set_property(&mut self, id: ObjectId, name: &str, value: Value) -> RunResult<()> {
        let class = match self.heap.get(id) {
            Some(obj) => Rc::clone(&obj.class),
            None => return Err(self.error(ErrorKind::Error, "stale object handle")),
        };
        if let Some(def) = class.find_prop(name) {
            let def = def.clone();
            let write_visibility = def.set_visibility.unwrap_or(def.visibility);
            let accessible = self.can_access_member(write_visibility, &def.declaring_class);
            if accessible {
                if def.is_readonly {
                    let initialized = self
                        .heap
                        .get(id)
                        .is_some_and(|obj| obj.props.contains_key(name));
                    let in_declaring = self
                        .current_class()
                        .is_some_and(|c| c.name.eq_ignore_ascii_case(&def.declaring_class));
                    if initialized || !in_declaring {
                        return Err(self.error(
                            ErrorKind::Error,
                            format!("Cannot modify readonly property {}::${name}", class.name),
                        ));
                    }
                }
                if let Some(hook) = def.hooks.iter().find(|h| !h.is_get).cloned() {
                    self.run_hook(id, &class, &hook.body, Some(value))?;
                    return Ok(());
                }
                let value = match &def.ty {
                    Some(ty) => {
                        let what = format!("Cannot assign to property {}::${name}: value", class.name);
                        self.coerce_to_type(value, ty, self.strict_types, &what)?
                    }
                    None => value,
                };
                // Write through an aliasing cell when the property holds one.
                if let Some(obj) = self.heap.get_mut(id) {
                    match obj.props.get(name) {
                        Some(Value::Ref(slot)) => *slot.borrow_mut() = value,
                        _ => {
                            obj.props.insert(name.to_owned(), value);
                        }
                    }
                }
                return Ok(());
            }
            if class.find_method("__set").is_some() {
                self.call_method_by_name(id, "__set", vec![Value::string(name), value])?;
                return Ok(());
            }
            return Err(self.error(
                ErrorKind::Error,
                format!("Cannot access {write_visibility} property {}::${name}", class.name),
            ));
        }
        let exists = self.heap.get(id).is_some_and(|obj| obj.props.contains_key(name));
        if !exists && class.find_method("__set").is_some() {
            self.call_method_by_name(id, "__set", vec![Value::string(name), value])?;
            return Ok(());
        }
        // Dynamic property creation.
        if let Some(obj) = self.heap.get_mut(id) {
            match obj.props.get(name) {
                Some(Value::Ref(slot)) => *slot.borrow_mut() = value,
                _ => {
                    obj.props.insert(name.to_owned(), value);
                }
            }
        }
        Ok(())
    }

    /// Runs a property hook body; set hooks receive the incoming value as
    /// `$value`.
    fn run_hook(
        &mut self,
        id: ObjectId,
        class: &Rc<ClassDef>,
        body: &[crate::ast::Stmt],
        set_value: Option<Value>,
    ) -> RunResult<Value> {
        let mut scope = Scope::default();
        scope.set("this", Value::Object(id));
        if let Some(value) = set_value {
            scope.set("value", value);
        }
        let frame = Frame {
            scope,
            this: Some(id),
            class: Some(Rc::clone(class)),
            static_class: Some(Rc::clone(class)),
            func_name: "{hook}".to_owned(),
            args: Vec::new(),
        };
        self.frames.push(frame);
        let result = match self.exec_stmts(body) {
            Ok(()) => Ok(Value::Null),
            Err(Signal::Return(value)) => Ok(value),
            Err(signal) => Err(signal),
        };
        self.frames.pop();
        result
    }

    // --- first-class callables & generator methods ---

    pub(crate) fn make_first_class_callable(&mut self, inner: &Expr) -> RunResult<Value> {
        match &inner.kind {
            ExprKind::Call { callee, .. } => match &callee.kind {
                ExprKind::Ident(name) => {
                    let resolved = self.ns.resolve_function(name);
                    if let Some(func) = self
                        .globals
                        .lookup_function(&resolved)
                        .or_else(|| self.globals.lookup_function(name.trim_start_matches('\\')))
                    {
                        return Ok(Value::Closure(Rc::new(Closure {
                            func,
                            captures: Vec::new(),
                            this: None,
                            scope_class: None,
                        })));
                    }
                    let bare = name.rsplit('\\').next().unwrap_or(name).to_ascii_lowercase();
                    if let Some(builtin) = self.builtins.get(&bare) {
                        return Ok(Value::Builtin(Rc::clone(builtin)));
                    }
                    Err(self.error(ErrorKind::Error, format!("Call to undefined function {name}()")))
                }
                _ => {
                    let value = self.eval_expr(callee)?.deref();
                    match value {
                        Value::Closure(_) | Value::Builtin(_) => Ok(value),
                        other => Err(self.error(
                            ErrorKind::TypeError,
                            format!("Value of type {} is not callable", other.type_display()),
                        )),
                    }
                }
            },
            ExprKind::MethodCall { object, method, .. } => {
                let receiver = self.eval_expr(object)?.deref();
                let Value::Object(id) = receiver else {
                    return Err(self.error(ErrorKind::Error, "Cannot create callable on non-object"));
                };
                let method_name = self.member_name_string(method)?;
                let class = self
                    .heap
                    .get(id)
                    .map(|obj| Rc::clone(&obj.class))
                    .ok_or_else(|| self.error(ErrorKind::Error, "stale object handle"))?;
                let def = class.find_method(&method_name).ok_or_else(|| {
                    self.error(
                        ErrorKind::Error,
                        format!("Call to undefined method {}::{method_name}()", class.name),
                    )
                })?;
                let scope_class = self.globals.lookup_class(&def.declaring_class);
                Ok(Value::Closure(Rc::new(Closure {
                    func: Rc::clone(&def.func),
                    captures: Vec::new(),
                    this: Some(id),
                    scope_class,
                })))
            }
            ExprKind::StaticCall { class, method, .. } => {
                let class_def = self.resolve_class_expr(class)?;
                let method_name = self.member_name_string(method)?;
                let def = class_def.find_method(&method_name).ok_or_else(|| {
                    self.error(
                        ErrorKind::Error,
                        format!("Call to undefined method {}::{method_name}()", class_def.name),
                    )
                })?;
                let scope_class = self.globals.lookup_class(&def.declaring_class);
                Ok(Value::Closure(Rc::new(Closure {
                    func: Rc::clone(&def.func),
                    captures: Vec::new(),
                    this: None,
                    scope_class,
                })))
            }
            _ => Err(self.error(ErrorKind::Error, "Invalid first-class callable")),
        }
    }

    fn generator_method(
        &mut self,
        gen: &Rc<RefCell<crate::types::Generator>>,
        method: &str,
        args: &[Arg],
    ) -> RunResult<Value> {
        let mut arg_values = Vec::new();
        for arg in args {
            arg_values.push(self.eval_expr(&arg.value)?.deref());
        }
        let mut g = gen.borrow_mut();
        match method.to_ascii_lowercase().as_str() {
            "current" => Ok(g.current()),
            "key" => Ok(g.key()),
            "valid" => Ok(Value::Bool(g.valid())),
            "next" => {
                g.advance();
                Ok(Value::Null)
            }
            "rewind" => {
                g.rewind();
                Ok(Value::Null)
            }
            "send" => Ok(g.send(arg_values.into_iter().next().unwrap_or(Value::Null))),
            "getreturn" => Ok(g.return_value.clone()),
            other => {
                drop(g);
                Err(self.error(
                    ErrorKind::Error,
                    format!("Call to undefined method Generator::{other}()"),
                ))
            }
        }
    }
}

/// True when an expression can act as a write target, which is what by-ref
/// parameters require.
fn is_lvalue(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Variable(_)
            | ExprKind::VarVar(_)
            | ExprKind::Index { .. }
            | ExprKind::Prop { .. }
            | ExprKind::StaticProp { .. }
    )
}
