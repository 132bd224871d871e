//! Write targets: assignment, reference creation, unset and destructuring.
//!
//! A target expression is first resolved into an [`LPath`]: a root (variable
//! binding, static-property slot or object) plus a list of segments whose
//! index expressions are evaluated exactly once, left to right. Navigation
//! then walks pure values, hopping through the heap at object-property
//! segments so borrows never span a hop. Missing intermediate entries
//! auto-vivify into arrays on write.

use std::{cell::RefCell, rc::Rc};

use crate::{
    ast::{Expr, ExprKind, MemberName},
    exception::{ErrorKind, RunResult},
    heap::ObjectId,
    interp::Interpreter,
    types::ArrayKey,
    value::Value,
};

#[derive(Debug)]
pub(crate) enum LRoot {
    Var(String),
    Slot(Rc<RefCell<Value>>),
    Obj(ObjectId),
}

#[derive(Debug)]
pub(crate) enum LSeg {
    Key(ArrayKey),
    Append,
    Prop(String),
}

#[derive(Debug)]
pub(crate) struct LPath {
    pub root: LRoot,
    pub segs: Vec<LSeg>,
}

enum MutOp<'a> {
    Write(&'a mut Option<Value>),
    Slot(&'a mut Option<Rc<RefCell<Value>>>),
    Unset,
}

enum MutOutcome {
    Done,
    /// Continue from `segs[index]`, a `Prop` segment, inside the object.
    Hop(ObjectId, usize),
    /// A TypeError-grade misuse; aborts with a throw.
    Fail(String),
    /// A warning-grade misuse; aborts silently after the diagnostic.
    Warn(String),
}

impl Interpreter {
    // --- public-ish entry points used by the evaluator ---

    /// Assigns `value` to `target` and returns the value, which is the
    /// result of an assignment expression.
    pub(crate) fn assign_to(&mut self, target: &Expr, value: Value) -> RunResult<Value> {
        match &target.kind {
            ExprKind::Variable(name) if name == "this" => {
                Err(self.error(ErrorKind::Error, "Cannot re-assign $this"))
            }
            ExprKind::List(items) => {
                self.destructure(items, &value)?;
                Ok(value)
            }
            // A bare property write goes through the full property protocol
            // (visibility, readonly, hooks, `__set`).
            ExprKind::Prop { object, name, nullsafe: false } => {
                let id = match self.eval_expr(object)?.deref() {
                    Value::Object(id) => id,
                    Value::Null => {
                        return Err(self.error(
                            ErrorKind::Error,
                            format!("Attempt to assign property \"{}\" on null", member_label(name)),
                        ));
                    }
                    other => {
                        return Err(self.error(
                            ErrorKind::Error,
                            format!(
                                "Attempt to assign property \"{}\" on {}",
                                member_label(name),
                                other.type_display()
                            ),
                        ));
                    }
                };
                let prop = self.member_name_string(name)?;
                self.set_property(id, &prop, value.clone())?;
                Ok(value)
            }
            _ => {
                let path = self.resolve_lpath(target)?;
                self.write_lpath(&path, value.clone())?;
                Ok(value)
            }
        }
    }

    /// `$target = &$source`: binds the target to the source's slot.
    pub(crate) fn assign_ref(&mut self, target: &Expr, source: &Expr) -> RunResult<Value> {
        let slot = self.ref_slot(source)?;
        match &target.kind {
            ExprKind::Variable(name) => {
                if Self::is_superglobal(name) {
                    self.globals.vars.bind_slot(name, Rc::clone(&slot));
                } else {
                    self.scope_mut().bind_slot(name, Rc::clone(&slot));
                }
            }
            _ => {
                let path = self.resolve_lpath(target)?;
                self.write_lpath(&path, Value::Ref(Rc::clone(&slot)))?;
            }
        }
        let value = slot.borrow().clone();
        Ok(value)
    }

    /// Produces the aliasing slot for an expression, promoting plain
    /// bindings and array cells as needed.
    pub(crate) fn ref_slot(&mut self, expr: &Expr) -> RunResult<Rc<RefCell<Value>>> {
        match &expr.kind {
            ExprKind::Variable(name) => {
                if Self::is_superglobal(name) {
                    Ok(self.globals.vars.slot(name))
                } else {
                    Ok(self.scope_mut().slot(name))
                }
            }
            ExprKind::StaticProp { .. } | ExprKind::Index { .. } | ExprKind::Prop { .. } => {
                let path = self.resolve_lpath(expr)?;
                if path.segs.is_empty() {
                    if let LRoot::Slot(slot) = path.root {
                        return Ok(slot);
                    }
                }
                let mut result = None;
                self.run_mut(&path, MutOp::Slot(&mut result))?;
                result.ok_or_else(|| {
                    self.error(ErrorKind::Error, "Cannot create reference to this expression")
                })
            }
            _ => Err(self.error(ErrorKind::Error, "Cannot create reference to this expression")),
        }
    }

    /// Slot for one array cell of a writable subject, used by by-ref
    /// `foreach`.
    pub(crate) fn ref_into_index(
        &mut self,
        subject: &Expr,
        key: &ArrayKey,
    ) -> RunResult<Rc<RefCell<Value>>> {
        let mut path = self.resolve_lpath(subject)?;
        path.segs.push(LSeg::Key(key.clone()));
        let mut result = None;
        self.run_mut(&path, MutOp::Slot(&mut result))?;
        result.ok_or_else(|| self.error(ErrorKind::Error, "Cannot iterate by reference"))
    }

    pub(crate) fn unset_target(&mut self, target: &Expr) -> RunResult<()> {
        match &target.kind {
            ExprKind::Variable(name) => {
                if Self::is_superglobal(name) {
                    self.globals.vars.unset(name);
                } else {
                    self.scope_mut().unset(name);
                }
                Ok(())
            }
            ExprKind::Prop { object, name, .. } => {
                if let Value::Object(id) = self.eval_expr(object)?.deref() {
                    let prop = self.member_name_string(name)?;
                    let exists = self
                        .heap
                        .get(id)
                        .is_some_and(|obj| obj.props.contains_key(&prop));
                    if exists {
                        if let Some(obj) = self.heap.get_mut(id) {
                            obj.props.shift_remove(&prop);
                        }
                    } else {
                        let has_magic = self
                            .heap
                            .get(id)
                            .is_some_and(|obj| obj.class.find_method("__unset").is_some());
                        if has_magic {
                            self.call_method_by_name(id, "__unset", vec![Value::string(prop)])?;
                        }
                    }
                }
                Ok(())
            }
            ExprKind::Index { .. } => {
                let path = self.resolve_lpath(target)?;
                self.run_mut(&path, MutOp::Unset)?;
                Ok(())
            }
            _ => {
                self.warning("Cannot unset this expression");
                Ok(())
            }
        }
    }

    /// Array destructuring for `list()`, `[...] =` and foreach targets.
    pub(crate) fn destructure(
        &mut self,
        items: &[Option<crate::ast::ArrayItem>],
        value: &Value,
    ) -> RunResult<()> {
        let array = match value.clone().deref() {
            Value::Array(array) => array,
            Value::Null => {
                return Ok(());
            }
            _ => {
                self.warning("Cannot unpack non-array value");
                return Ok(());
            }
        };
        let mut position: i64 = 0;
        for slot in items {
            let Some(item) = slot else {
                // A skipped slot still consumes its positional index.
                position += 1;
                continue;
            };
            let key = match &item.key {
                Some(key_expr) => {
                    let key_value = self.eval_expr(key_expr)?;
                    match ArrayKey::from_value(&key_value) {
                        Some(key) => key,
                        None => return Err(self.error(ErrorKind::TypeError, "Illegal offset type")),
                    }
                }
                None => {
                    let key = ArrayKey::Int(position);
                    position += 1;
                    key
                }
            };
            let element = match array.get(&key) {
                Some(element) => element.clone().deref(),
                None => {
                    self.warning(&format!("Undefined array key {}", key.display()));
                    Value::Null
                }
            };
            match &item.value.kind {
                ExprKind::List(nested) => self.destructure(nested, &element)?,
                _ => {
                    self.assign_to(&item.value, element)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn member_name_string(&mut self, name: &MemberName) -> RunResult<String> {
        match name {
            MemberName::Name(n) => Ok(n.clone()),
            MemberName::Expr(e) => {
                let value = self.eval_expr(e)?;
                let bytes = self.coerce_to_string(value)?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }

    // --- path resolution ---

    pub(crate) fn resolve_lpath(&mut self, expr: &Expr) -> RunResult<LPath> {
        match &expr.kind {
            ExprKind::Variable(name) => {
                Ok(LPath { root: LRoot::Var(name.clone()), segs: Vec::new() })
            }
            ExprKind::VarVar(inner) => {
                let value = self.eval_expr(inner)?;
                let bytes = self.coerce_to_string(value)?;
                let name = String::from_utf8_lossy(&bytes).into_owned();
                Ok(LPath { root: LRoot::Var(name), segs: Vec::new() })
            }
            ExprKind::Index { base, index } => {
                let mut path = self.resolve_lpath(base)?;
                let seg = match index {
                    Some(index_expr) => {
                        let key_value = self.eval_expr(index_expr)?;
                        match ArrayKey::from_value(&key_value) {
                            Some(key) => LSeg::Key(key),
                            None => {
                                return Err(self.error(
                                    ErrorKind::TypeError,
                                    format!(
                                        "Cannot access offset of type {} on array",
                                        key_value.type_display()
                                    ),
                                ));
                            }
                        }
                    }
                    None => LSeg::Append,
                };
                path.segs.push(seg);
                Ok(path)
            }
            ExprKind::Prop { object, name, .. } => {
                let prop = self.member_name_string(name)?;
                let mut path = match &object.kind {
                    ExprKind::Variable(_)
                    | ExprKind::VarVar(_)
                    | ExprKind::Index { .. }
                    | ExprKind::Prop { .. }
                    | ExprKind::StaticProp { .. } => self.resolve_lpath(object)?,
                    _ => match self.eval_expr(object)?.deref() {
                        Value::Object(id) => LPath { root: LRoot::Obj(id), segs: Vec::new() },
                        other => {
                            return Err(self.error(
                                ErrorKind::Error,
                                format!(
                                    "Attempt to assign property \"{prop}\" on {}",
                                    other.type_display()
                                ),
                            ));
                        }
                    },
                };
                path.segs.push(LSeg::Prop(prop));
                Ok(path)
            }
            ExprKind::StaticProp { class, name } => {
                let class_def = self.resolve_class_expr(class)?;
                let slot = class_def.find_static_slot(name).ok_or_else(|| {
                    self.error(
                        ErrorKind::Error,
                        format!("Access to undeclared static property {}::${name}", class_def.name),
                    )
                })?;
                Ok(LPath { root: LRoot::Slot(slot), segs: Vec::new() })
            }
            _ => Err(self.error(ErrorKind::Error, "Cannot use this expression as a write target")),
        }
    }

    // --- mutation driver ---

    pub(crate) fn write_lpath(&mut self, path: &LPath, value: Value) -> RunResult<()> {
        let mut pending = Some(value);
        self.run_mut(path, MutOp::Write(&mut pending))
    }

    fn run_mut(&mut self, path: &LPath, mut op: MutOp<'_>) -> RunResult<()> {
        let mut outcome = match &path.root {
            LRoot::Var(name) => {
                let segs = &path.segs;
                if Self::is_superglobal(name) {
                    self.globals.vars.with_mut(name, |cell| nav_mut(cell, segs, 0, &mut op))
                } else {
                    match self.frames.last_mut() {
                        Some(frame) => {
                            frame.scope.with_mut(name, |cell| nav_mut(cell, segs, 0, &mut op))
                        }
                        None => {
                            self.globals.vars.with_mut(name, |cell| nav_mut(cell, segs, 0, &mut op))
                        }
                    }
                }
            }
            LRoot::Slot(slot) => nav_mut(&mut slot.borrow_mut(), &path.segs, 0, &mut op),
            LRoot::Obj(id) => MutOutcome::Hop(*id, 0),
        };
        loop {
            match outcome {
                MutOutcome::Done => return Ok(()),
                MutOutcome::Warn(message) => {
                    self.warning(&message);
                    return Ok(());
                }
                MutOutcome::Fail(message) => return Err(self.error(ErrorKind::Error, message)),
                MutOutcome::Hop(id, seg_index) => {
                    let LSeg::Prop(prop) = &path.segs[seg_index] else {
                        return Err(self.error(ErrorKind::Error, "malformed write path"));
                    };
                    let last = seg_index + 1 == path.segs.len();
                    if last && matches!(op, MutOp::Unset) {
                        if let Some(obj) = self.heap.get_mut(id) {
                            obj.props.shift_remove(prop);
                        }
                        return Ok(());
                    }
                    let Some(obj) = self.heap.get_mut(id) else {
                        return Err(self.error(ErrorKind::Error, "stale object handle"));
                    };
                    let cell = obj.props.entry(prop.clone()).or_insert(Value::Null);
                    outcome = nav_mut(cell, &path.segs, seg_index + 1, &mut op);
                }
            }
        }
    }

    /// Non-mutating path read. `None` marks a missing variable, key or
    /// property anywhere along the way; the caller decides between a notice
    /// (plain read) and silence (`isset`, `??`).
    pub(crate) fn read_lpath(&self, path: &LPath) -> Option<Value> {
        let mut current = match &path.root {
            LRoot::Var(name) => {
                if Self::is_superglobal(name) {
                    self.globals.vars.get(name)?
                } else {
                    self.scope().get(name)?
                }
            }
            LRoot::Slot(slot) => slot.borrow().clone(),
            LRoot::Obj(id) => Value::Object(*id),
        };
        for seg in &path.segs {
            current = current.deref();
            match seg {
                LSeg::Append => return None,
                LSeg::Key(key) => match &current {
                    Value::Array(array) => {
                        current = array.get(key)?.clone();
                    }
                    Value::Str(bytes) => {
                        let ArrayKey::Int(raw) = key else { return None };
                        let index = resolve_str_offset(*raw, bytes.len())?;
                        current = Value::str(vec![bytes[index]]);
                    }
                    _ => return None,
                },
                LSeg::Prop(name) => match &current {
                    Value::Object(id) => {
                        current = self.heap.get(*id)?.props.get(name)?.clone();
                    }
                    _ => return None,
                },
            }
        }
        Some(current.deref())
    }
}

fn member_label(name: &MemberName) -> String {
    match name {
        MemberName::Name(n) => n.clone(),
        MemberName::Expr(_) => "{expression}".to_owned(),
    }
}

pub(crate) fn resolve_str_offset(raw: i64, len: usize) -> Option<usize> {
    let index = if raw < 0 { raw + len as i64 } else { raw };
    (index >= 0 && (index as usize) < len).then_some(index as usize)
}

/// Navigates `cell` through `segs[i..]`, applying `op` at the end.
/// Object-property segments return `Hop` so the caller re-enters through
/// the heap without a live borrow.
fn nav_mut(cell: &mut Value, segs: &[LSeg], i: usize, op: &mut MutOp<'_>) -> MutOutcome {
    // See through reference cells; a Slot op at the end wants the reference
    // itself rather than the value inside it.
    if let Value::Ref(slot) = cell {
        if i == segs.len() {
            if let MutOp::Slot(result) = op {
                **result = Some(Rc::clone(slot));
                return MutOutcome::Done;
            }
        }
        let slot = Rc::clone(slot);
        let mut inner = slot.borrow_mut();
        return nav_mut(&mut inner, segs, i, op);
    }

    if i == segs.len() {
        match op {
            MutOp::Write(pending) => {
                if let Some(value) = pending.take() {
                    *cell = value;
                }
                return MutOutcome::Done;
            }
            MutOp::Slot(result) => {
                let slot = Rc::new(RefCell::new(std::mem::take(cell)));
                *cell = Value::Ref(Rc::clone(&slot));
                **result = Some(slot);
                return MutOutcome::Done;
            }
            MutOp::Unset => return MutOutcome::Done,
        }
    }

    let last = i + 1 == segs.len();
    match &segs[i] {
        LSeg::Prop(_) => match cell {
            Value::Object(id) => MutOutcome::Hop(*id, i),
            Value::Null => MutOutcome::Fail("Attempt to assign property on null".to_owned()),
            other => MutOutcome::Fail(format!(
                "Attempt to assign property on {}",
                other.type_display()
            )),
        },
        LSeg::Key(key) => {
            if matches!(op, MutOp::Unset) && last {
                if let Value::Array(array) = cell {
                    Rc::make_mut(array).remove(key);
                }
                return MutOutcome::Done;
            }
            match cell {
                Value::Null | Value::Bool(false) => {
                    *cell = Value::empty_array();
                    nav_mut(cell, segs, i, op)
                }
                Value::Array(array) => {
                    let entry = Rc::make_mut(array).entry_or_null(key.clone());
                    nav_mut(entry, segs, i + 1, op)
                }
                Value::Str(bytes) if last => {
                    let MutOp::Write(pending) = op else {
                        return MutOutcome::Fail("Cannot create references to string offsets".to_owned());
                    };
                    let ArrayKey::Int(raw) = key else {
                        return MutOutcome::Warn("Illegal string offset".to_owned());
                    };
                    let Some(value) = pending.take() else { return MutOutcome::Done };
                    let replacement = value.to_bytes_lossy();
                    let Some(&byte) = replacement.first() else {
                        return MutOutcome::Fail("Cannot assign an empty string to a string offset".to_owned());
                    };
                    let mut owned = bytes.to_vec();
                    let index = if *raw < 0 { *raw + owned.len() as i64 } else { *raw };
                    if index < 0 {
                        return MutOutcome::Warn("Illegal string offset".to_owned());
                    }
                    let index = index as usize;
                    if index >= owned.len() {
                        owned.resize(index + 1, b' ');
                    }
                    owned[index] = byte;
                    *cell = Value::str(owned);
                    MutOutcome::Done
                }
                Value::Object(_) => {
                    MutOutcome::Fail("Cannot use object as array".to_owned())
                }
                _ => MutOutcome::Warn("Cannot use a scalar value as an array".to_owned()),
            }
        }
        LSeg::Append => match cell {
            Value::Null | Value::Bool(false) => {
                *cell = Value::empty_array();
                nav_mut(cell, segs, i, op)
            }
            Value::Array(array) => {
                if matches!(op, MutOp::Unset) {
                    return MutOutcome::Done;
                }
                let array = Rc::make_mut(array);
                let key = array.push(Value::Null);
                let entry = array.get_mut(&key).expect("key was just inserted");
                nav_mut(entry, segs, i + 1, op)
            }
            Value::Str(_) => {
                MutOutcome::Fail("[] operator not supported for strings".to_owned())
            }
            other => MutOutcome::Warn(format!(
                "Cannot use a scalar value as an array ({})",
                other.type_display()
            )),
        },
    }
}
