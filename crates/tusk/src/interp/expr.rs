//! Expression evaluation.
//!
//! `eval` dispatches on the expression tag and returns through the
//! `RunResult` channel. Arithmetic follows the PHP 8 rules: integer
//! arithmetic overflows to float, `/` divides exactly or produces float,
//! non-numeric string operands raise TypeError while leading-numeric ones
//! warn and use their prefix.

use std::rc::Rc;

use crate::{
    ast::{
        ArrayItem, BinaryOp, CastKind, ClosureExpr, Expr, ExprKind, IncludeKind, InterpPart,
        MagicConst, MatchArm, UnaryOp,
    },
    exception::{ErrorKind, RunResult, Signal},
    interp::Interpreter,
    scope::Binding,
    types::{ArrayKey, Closure, Generator, PhpArray},
    value::{Num, Value, compare, loose_eq, parse_full_numeric, strict_eq},
};

impl Interpreter {
    pub(crate) fn eval_expr(&mut self, expr: &Expr) -> RunResult<Value> {
        if expr.pos.line > 0 {
            self.cur_line = expr.pos.line;
        }
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(i) => Ok(Value::Int(*i)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Str(bytes) => Ok(Value::str(bytes.clone())),
            ExprKind::Interp(parts) => {
                let bytes = self.interp_bytes(parts)?;
                Ok(Value::str(bytes))
            }
            ExprKind::ShellExec(parts) => {
                let command = self.interp_bytes(parts)?;
                match self.builtins.get("shell_exec").map(Rc::clone) {
                    Some(builtin) => (builtin.func.clone())(self, vec![Value::str(command)]),
                    None => {
                        self.warning("shell_exec() has been disabled");
                        Ok(Value::Null)
                    }
                }
            }
            ExprKind::Variable(name) => self.read_variable(name),
            ExprKind::VarVar(inner) => {
                let value = self.eval_expr(inner)?;
                let bytes = self.coerce_to_string(value)?;
                let name = String::from_utf8_lossy(&bytes).into_owned();
                self.read_variable(&name)
            }
            ExprKind::Ident(name) => self.read_constant(name),
            ExprKind::Array(items) => self.build_array(items),
            ExprKind::List(_) => {
                Err(self.error(ErrorKind::Error, "Cannot use list() outside of an assignment"))
            }
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            ExprKind::Unary { op, operand } => {
                let value = self.eval_expr(operand)?;
                self.apply_unary(*op, value)
            }
            ExprKind::PreIncDec { inc, target } => self.inc_dec(target, *inc, true),
            ExprKind::PostIncDec { inc, target } => self.inc_dec(target, *inc, false),
            ExprKind::Ternary { cond, then, else_ } => {
                let cond_value = self.eval_expr(cond)?;
                if cond_value.truthy() {
                    match then {
                        Some(then) => self.eval_expr(then),
                        None => Ok(cond_value),
                    }
                } else {
                    self.eval_expr(else_)
                }
            }
            ExprKind::Coalesce { lhs, rhs } => {
                match self.quiet_read(lhs)? {
                    Some(value) if !matches!(value, Value::Null) => Ok(value),
                    _ => self.eval_expr(rhs),
                }
            }
            ExprKind::Instanceof { expr: lhs, class } => {
                let value = self.eval_expr(lhs)?.deref();
                let Value::Object(id) = value else { return Ok(Value::Bool(false)) };
                let Some(obj) = self.heap.get(id) else { return Ok(Value::Bool(false)) };
                let obj_class = Rc::clone(&obj.class);
                let target = match &class.kind {
                    ExprKind::Ident(name) => self.resolve_class_position_name(name),
                    _ => match self.eval_expr(class)?.deref() {
                        Value::Object(other) => match self.heap.get(other) {
                            Some(data) => data.class.name.clone(),
                            None => return Ok(Value::Bool(false)),
                        },
                        Value::Str(s) => String::from_utf8_lossy(&s).into_owned(),
                        _ => return Ok(Value::Bool(false)),
                    },
                };
                Ok(Value::Bool(obj_class.instance_of(&target)))
            }
            ExprKind::Cast { kind, expr: operand } => {
                let value = self.eval_expr(operand)?;
                self.apply_cast(*kind, value)
            }
            ExprKind::Clone(operand) => {
                let value = self.eval_expr(operand)?.deref();
                match value {
                    Value::Object(id) => {
                        let new_id = self
                            .heap
                            .clone_object(id)
                            .ok_or_else(|| self.error(ErrorKind::Error, "stale object handle"))?;
                        let has_magic = self
                            .heap
                            .get(new_id)
                            .is_some_and(|obj| obj.class.find_method("__clone").is_some());
                        if has_magic {
                            self.call_method_by_name(new_id, "__clone", Vec::new())?;
                        }
                        Ok(Value::Object(new_id))
                    }
                    other => Err(self.error(
                        ErrorKind::Error,
                        format!("__clone method called on non-object ({})", other.type_display()),
                    )),
                }
            }
            ExprKind::New { class, args } => self.eval_new(class, args),
            ExprKind::Call { callee, args } => self.eval_call(callee, args),
            ExprKind::MethodCall { object, method, args, nullsafe } => {
                self.eval_method_call(object, method, args, *nullsafe)
            }
            ExprKind::StaticCall { class, method, args } => {
                self.eval_static_call(class, method, args)
            }
            ExprKind::Prop { object, name, nullsafe } => {
                let value = self.eval_expr(object)?.deref();
                if *nullsafe && matches!(value, Value::Null) {
                    return Ok(Value::Null);
                }
                match value {
                    Value::Object(id) => {
                        let prop = self.member_name_string(name)?;
                        self.get_property(id, &prop)
                    }
                    Value::Null => {
                        self.warning("Attempt to read property on null");
                        Ok(Value::Null)
                    }
                    other => {
                        self.warning(&format!(
                            "Attempt to read property on {}",
                            other.type_display()
                        ));
                        Ok(Value::Null)
                    }
                }
            }
            ExprKind::StaticProp { class, name } => {
                let class_def = self.resolve_class_expr(class)?;
                let slot = class_def.find_static_slot(name).ok_or_else(|| {
                    self.error(
                        ErrorKind::Error,
                        format!("Access to undeclared static property {}::${name}", class_def.name),
                    )
                })?;
                let value = slot.borrow().clone();
                Ok(value)
            }
            ExprKind::ClassConst { class, name } => self.eval_class_const(class, name),
            ExprKind::Index { base, index } => self.eval_index(base, index.as_deref()),
            ExprKind::Closure(closure) => self.make_closure(closure),
            ExprKind::FirstClassCallable(inner) => self.make_first_class_callable(inner),
            ExprKind::Yield { key, value } => self.eval_yield(key.as_deref(), value.as_deref()),
            ExprKind::YieldFrom(operand) => self.eval_yield_from(operand),
            ExprKind::Throw(operand) => {
                let value = self.eval_expr(operand)?;
                Err(self.throw_value(value))
            }
            ExprKind::Print(operand) => {
                let value = self.eval_expr(operand)?;
                self.echo_value(value)?;
                Ok(Value::Int(1))
            }
            ExprKind::Include { kind, expr: operand } => self.eval_include(*kind, operand),
            ExprKind::Isset(targets) => {
                for target in targets {
                    if !self.isset_expr(target)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            ExprKind::Empty(operand) => {
                let value = self.quiet_read(operand)?.unwrap_or(Value::Null);
                Ok(Value::Bool(!value.truthy()))
            }
            ExprKind::Eval(operand) => {
                let value = self.eval_expr(operand)?;
                let source = value.display_lossy();
                self.eval_inline_code(&source)
            }
            ExprKind::Exit(arg) => {
                let status = match arg {
                    Some(arg) => match self.eval_expr(arg)?.deref() {
                        Value::Int(code) => i32::try_from(code).unwrap_or(255),
                        other => {
                            // A string argument prints before exiting.
                            self.echo_value(other)?;
                            0
                        }
                    },
                    None => 0,
                };
                Err(Signal::Exit(status))
            }
            ExprKind::Match { subject, arms } => self.eval_match(subject, arms),
            ExprKind::Assign { target, value } => {
                let value = self.eval_expr(value)?.deref();
                self.assign_to(target, value)
            }
            ExprKind::CompoundAssign { op, target, value } => {
                let path = self.resolve_lpath(target)?;
                let current = self.read_lpath(&path).unwrap_or(Value::Null);
                let rhs = self.eval_expr(value)?.deref();
                let result = self.apply_binary(*op, current, rhs)?;
                self.write_lpath(&path, result.clone())?;
                Ok(result)
            }
            ExprKind::CoalesceAssign { target, value } => {
                let path = self.resolve_lpath(target)?;
                match self.read_lpath(&path) {
                    Some(current) if !matches!(current, Value::Null) => Ok(current),
                    _ => {
                        let value = self.eval_expr(value)?.deref();
                        self.write_lpath(&path, value.clone())?;
                        Ok(value)
                    }
                }
            }
            ExprKind::AssignRef { target, value } => self.assign_ref(target, value),
            ExprKind::ErrorSuppress(operand) => {
                self.suppress += 1;
                let result = self.eval_expr(operand);
                self.suppress -= 1;
                result
            }
            ExprKind::MagicConst(constant) => Ok(self.magic_const(*constant, expr.pos.line)),
            ExprKind::Bad => Err(self.error(ErrorKind::Error, "cannot evaluate malformed expression")),
        }
    }

    // --- variables & constants ---

    fn read_variable(&mut self, name: &str) -> RunResult<Value> {
        if name == "this" {
            return match self.current_this() {
                Some(id) => Ok(Value::Object(id)),
                None => Ok(Value::Null),
            };
        }
        if name == "GLOBALS" {
            let mut array = PhpArray::default();
            for (var, value) in self.globals.vars.snapshot() {
                array.insert(ArrayKey::str(var), value);
            }
            return Ok(Value::array(array));
        }
        let read = if Self::is_superglobal(name) {
            self.globals.vars.get(name)
        } else {
            self.scope().get(name)
        };
        match read {
            Some(value) => Ok(value.deref()),
            None => {
                self.warning(&format!("Undefined variable ${name}"));
                Ok(Value::Null)
            }
        }
    }

    fn read_constant(&mut self, name: &str) -> RunResult<Value> {
        let resolved = self.ns.resolve_const(name);
        if let Some(value) = self.globals.constants.get(&resolved) {
            return Ok(value.clone());
        }
        // Unqualified constants fall back to the global space.
        if !name.starts_with('\\') && !name.contains('\\') {
            if let Some(value) = self.globals.constants.get(name) {
                return Ok(value.clone());
            }
        }
        Err(self.error(ErrorKind::Error, format!("Undefined constant \"{name}\"")))
    }

    /// Resolves a name in class position, honoring `self`/`parent`/`static`.
    pub(crate) fn resolve_class_position_name(&self, name: &str) -> String {
        match name.to_ascii_lowercase().as_str() {
            "self" => self
                .current_class()
                .map_or_else(|| name.to_owned(), |c| c.name.clone()),
            "static" => self
                .static_class()
                .or_else(|| self.current_class())
                .map_or_else(|| name.to_owned(), |c| c.name.clone()),
            "parent" => self
                .current_class()
                .and_then(|c| c.parent.clone())
                .map_or_else(|| name.to_owned(), |c| c.name.clone()),
            _ => self.ns.resolve_class(name),
        }
    }

    // --- array literals ---

    fn build_array(&mut self, items: &[ArrayItem]) -> RunResult<Value> {
        let mut array = PhpArray::default();
        for item in items {
            if item.unpack {
                match self.eval_expr(&item.value)?.deref() {
                    Value::Array(source) => {
                        for (key, value) in source.iter() {
                            match key {
                                ArrayKey::Int(_) => {
                                    array.push(value.clone());
                                }
                                ArrayKey::Str(_) => array.insert(key.clone(), value.clone()),
                            }
                        }
                    }
                    Value::Generator(gen) => {
                        let pairs = gen.borrow().pairs.clone();
                        for (_, value) in pairs {
                            array.push(value);
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
            let value = if item.by_ref {
                Value::Ref(self.ref_slot(&item.value)?)
            } else {
                self.eval_expr(&item.value)?.deref()
            };
            match &item.key {
                Some(key_expr) => {
                    let key_value = self.eval_expr(key_expr)?;
                    let Some(key) = ArrayKey::from_value(&key_value) else {
                        return Err(self.error(ErrorKind::TypeError, "Illegal offset type"));
                    };
                    array.insert(key, value);
                }
                None => {
                    array.push(value);
                }
            }
        }
        Ok(Value::array(array))
    }

    // --- reads that stay silent on missing data ---

    /// `??`, `isset`, `empty` read path: `None` for anything missing, no
    /// diagnostics.
    fn quiet_read(&mut self, expr: &Expr) -> RunResult<Option<Value>> {
        match &expr.kind {
            ExprKind::Variable(name) => {
                if name == "this" {
                    return Ok(self.current_this().map(Value::Object));
                }
                let read = if Self::is_superglobal(name) {
                    self.globals.vars.get(name)
                } else {
                    self.scope().get(name)
                };
                Ok(read.map(Value::deref))
            }
            ExprKind::Index { .. } | ExprKind::Prop { .. } | ExprKind::StaticProp { .. } => {
                let path = self.resolve_lpath(expr)?;
                Ok(self.read_lpath(&path))
            }
            _ => self.eval_expr(expr).map(Some),
        }
    }

    fn isset_expr(&mut self, expr: &Expr) -> RunResult<bool> {
        // `__isset` fires when a bare property read misses.
        if let ExprKind::Prop { object, name, .. } = &expr.kind {
            if let Value::Object(id) = self.eval_expr(object)?.deref() {
                let prop = self.member_name_string(name)?;
                let (present, has_magic) = match self.heap.get(id) {
                    Some(obj) => (
                        obj.props.get(&prop).is_some(),
                        obj.class.find_method("__isset").is_some(),
                    ),
                    None => (false, false),
                };
                if present {
                    let value = self
                        .heap
                        .get(id)
                        .and_then(|obj| obj.props.get(&prop).cloned())
                        .unwrap_or(Value::Null);
                    return Ok(!matches!(value.deref(), Value::Null));
                }
                if has_magic {
                    let result =
                        self.call_method_by_name(id, "__isset", vec![Value::string(prop)])?;
                    return Ok(result.truthy());
                }
                return Ok(false);
            }
            return Ok(false);
        }
        let value = self.quiet_read(expr)?;
        Ok(!matches!(value, None | Some(Value::Null)))
    }

    // --- binary / unary ---

    fn eval_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> RunResult<Value> {
        // Short-circuiting first.
        match op {
            BinaryOp::And => {
                let left = self.eval_expr(lhs)?;
                if !left.truthy() {
                    return Ok(Value::Bool(false));
                }
                let right = self.eval_expr(rhs)?;
                return Ok(Value::Bool(right.truthy()));
            }
            BinaryOp::Or => {
                let left = self.eval_expr(lhs)?;
                if left.truthy() {
                    return Ok(Value::Bool(true));
                }
                let right = self.eval_expr(rhs)?;
                return Ok(Value::Bool(right.truthy()));
            }
            _ => {}
        }
        let left = self.eval_expr(lhs)?.deref();
        let right = self.eval_expr(rhs)?.deref();
        self.apply_binary(op, left, right)
    }

    pub(crate) fn apply_binary(&mut self, op: BinaryOp, left: Value, right: Value) -> RunResult<Value> {
        use BinaryOp::*;
        match op {
            Concat => {
                let mut bytes = self.coerce_to_string(left)?;
                bytes.extend_from_slice(&self.coerce_to_string(right)?);
                Ok(Value::str(bytes))
            }
            Add => {
                if let (Value::Array(a), Value::Array(b)) = (&left, &right) {
                    // Array union: left operand wins on key conflicts.
                    let mut union = (**a).clone();
                    for (key, value) in b.iter() {
                        if !union.contains_key(key) {
                            union.insert(key.clone(), value.clone());
                        }
                    }
                    return Ok(Value::array(union));
                }
                self.arith(op, left, right)
            }
            Sub | Mul | Div | Mod | Pow => self.arith(op, left, right),
            Shl | Shr => {
                let (l, r) = self.arith_num_pair(op, &left, &right)?;
                let (l, r) = (num_to_i64(l), num_to_i64(r));
                if r < 0 {
                    return Err(self.error(ErrorKind::ArithmeticError, "Bit shift by negative number"));
                }
                let result = if r >= 64 {
                    match op {
                        Shl => 0,
                        _ => {
                            if l < 0 {
                                -1
                            } else {
                                0
                            }
                        }
                    }
                } else if op == Shl {
                    l.wrapping_shl(r as u32)
                } else {
                    l >> r
                };
                Ok(Value::Int(result))
            }
            BitAnd | BitOr | BitXor => self.bitwise(op, left, right),
            Eq => Ok(Value::Bool(loose_eq(&left, &right, &self.heap))),
            NotEq => Ok(Value::Bool(!loose_eq(&left, &right, &self.heap))),
            Identical => Ok(Value::Bool(strict_eq(&left, &right, &self.heap))),
            NotIdentical => Ok(Value::Bool(!strict_eq(&left, &right, &self.heap))),
            Lt => Ok(Value::Bool(matches!(
                compare(&left, &right, &self.heap),
                Some(std::cmp::Ordering::Less)
            ))),
            Le => Ok(Value::Bool(matches!(
                compare(&left, &right, &self.heap),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ))),
            Gt => Ok(Value::Bool(matches!(
                compare(&left, &right, &self.heap),
                Some(std::cmp::Ordering::Greater)
            ))),
            Ge => Ok(Value::Bool(matches!(
                compare(&left, &right, &self.heap),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ))),
            Spaceship => {
                let ordering = compare(&left, &right, &self.heap);
                Ok(Value::Int(match ordering {
                    Some(std::cmp::Ordering::Less) => -1,
                    Some(std::cmp::Ordering::Equal) => 0,
                    _ => 1,
                }))
            }
            Xor => Ok(Value::Bool(left.truthy() != right.truthy())),
            And | Or => unreachable!("short-circuit ops are handled by eval_binary"),
        }
    }

    /// Numeric conversion for one arithmetic operand. Wholly non-numeric
    /// values come back as `None` and the caller raises the TypeError naming
    /// both operands; leading-numeric strings warn and use their prefix.
    fn arith_num(&mut self, value: &Value) -> RunResult<Option<Num>> {
        Ok(match value {
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Null => Some(Num::Int(0)),
            Value::Str(s) => {
                if let Some(num) = parse_full_numeric(s) {
                    return Ok(Some(num));
                }
                let prefix = crate::value::numeric_prefix(s);
                let has_prefix = !matches!(prefix, Num::Int(0))
                    || s.first().is_some_and(|b| b.is_ascii_digit() || *b == b'+' || *b == b'-');
                if has_prefix {
                    self.warning("A non-numeric value encountered");
                    Some(prefix)
                } else {
                    None
                }
            }
            _ => None,
        })
    }

    /// The TypeError arithmetic and bitwise operators raise, naming the
    /// operands in source order.
    fn unsupported_operands(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Signal {
        self.error(
            ErrorKind::TypeError,
            format!(
                "Unsupported operand types: {} {op} {}",
                left.type_display(),
                right.type_display()
            ),
        )
    }

    /// Converts both operands, bailing on the left one first so its
    /// diagnostic ordering matches evaluation order.
    fn arith_num_pair(&mut self, op: BinaryOp, left: &Value, right: &Value) -> RunResult<(Num, Num)> {
        let Some(l) = self.arith_num(left)? else {
            return Err(self.unsupported_operands(op, left, right));
        };
        let Some(r) = self.arith_num(right)? else {
            return Err(self.unsupported_operands(op, left, right));
        };
        Ok((l, r))
    }

    fn arith(&mut self, op: BinaryOp, left: Value, right: Value) -> RunResult<Value> {
        use BinaryOp::*;
        let (l, r) = self.arith_num_pair(op, &left, &right)?;
        match op {
            Mod => {
                let (li, ri) = (num_to_i64(l), num_to_i64(r));
                if ri == 0 {
                    return Err(self.error(ErrorKind::DivisionByZeroError, "Modulo by zero"));
                }
                Ok(Value::Int(li.wrapping_rem(ri)))
            }
            Div => {
                if num_is_zero(r) {
                    return Err(self.error(ErrorKind::DivisionByZeroError, "Division by zero"));
                }
                match (l, r) {
                    // i64::MIN / -1 overflows the integer range; it becomes
                    // a float like any other non-exact division.
                    (Num::Int(a), Num::Int(b)) if !(a == i64::MIN && b == -1) && a % b == 0 => {
                        Ok(Value::Int(a / b))
                    }
                    _ => Ok(Value::Float(l.to_f64() / r.to_f64())),
                }
            }
            Pow => match (l, r) {
                (Num::Int(base), Num::Int(exp)) if exp >= 0 => {
                    match u32::try_from(exp).ok().and_then(|e| base.checked_pow(e)) {
                        Some(result) => Ok(Value::Int(result)),
                        None => Ok(Value::Float((base as f64).powf(exp as f64))),
                    }
                }
                _ => Ok(Value::Float(l.to_f64().powf(r.to_f64()))),
            },
            _ => match (l, r) {
                (Num::Int(a), Num::Int(b)) => {
                    let checked = match op {
                        Add => a.checked_add(b),
                        Sub => a.checked_sub(b),
                        _ => a.checked_mul(b),
                    };
                    match checked {
                        Some(result) => Ok(Value::Int(result)),
                        // Integer overflow promotes to float.
                        None => {
                            let (fa, fb) = (a as f64, b as f64);
                            Ok(Value::Float(match op {
                                Add => fa + fb,
                                Sub => fa - fb,
                                _ => fa * fb,
                            }))
                        }
                    }
                }
                _ => {
                    let (fa, fb) = (l.to_f64(), r.to_f64());
                    Ok(Value::Float(match op {
                        Add => fa + fb,
                        Sub => fa - fb,
                        _ => fa * fb,
                    }))
                }
            },
        }
    }

    fn bitwise(&mut self, op: BinaryOp, left: Value, right: Value) -> RunResult<Value> {
        // Two strings operate bytewise; anything else goes through integers.
        if let (Value::Str(a), Value::Str(b)) = (&left, &right) {
            let out: Vec<u8> = match op {
                BinaryOp::BitAnd => a.iter().zip(b.iter()).map(|(x, y)| x & y).collect(),
                BinaryOp::BitXor => a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect(),
                _ => {
                    let (longer, shorter) = if a.len() >= b.len() { (a, b) } else { (b, a) };
                    longer
                        .iter()
                        .enumerate()
                        .map(|(i, x)| x | shorter.get(i).copied().unwrap_or(0))
                        .collect()
                }
            };
            return Ok(Value::str(out));
        }
        let (l, r) = self.arith_num_pair(op, &left, &right)?;
        let (l, r) = (num_to_i64(l), num_to_i64(r));
        Ok(Value::Int(match op {
            BinaryOp::BitAnd => l & r,
            BinaryOp::BitOr => l | r,
            _ => l ^ r,
        }))
    }

    fn apply_unary(&mut self, op: UnaryOp, value: Value) -> RunResult<Value> {
        let value = value.deref();
        match op {
            UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
            UnaryOp::BitNot => match value {
                Value::Int(i) => Ok(Value::Int(!i)),
                Value::Float(f) => Ok(Value::Int(!(f.trunc() as i64))),
                Value::Str(s) => Ok(Value::str(s.iter().map(|b| !b).collect::<Vec<u8>>())),
                other => Err(self.error(
                    ErrorKind::TypeError,
                    format!("Cannot perform bitwise not on {}", other.type_display()),
                )),
            },
            UnaryOp::Neg | UnaryOp::Plus => {
                // Unary minus behaves as multiplication by -1, which is the
                // operation its type error reports.
                let Some(num) = self.arith_num(&value)? else {
                    return Err(self.error(
                        ErrorKind::TypeError,
                        format!("Unsupported operand types: {} * int", value.type_display()),
                    ));
                };
                if op == UnaryOp::Plus {
                    return Ok(match num {
                        Num::Int(i) => Value::Int(i),
                        Num::Float(f) => Value::Float(f),
                    });
                }
                Ok(match num {
                    Num::Int(i) => match i.checked_neg() {
                        Some(n) => Value::Int(n),
                        None => Value::Float(-(i as f64)),
                    },
                    Num::Float(f) => Value::Float(-f),
                })
            }
        }
    }

    fn inc_dec(&mut self, target: &Expr, inc: bool, pre: bool) -> RunResult<Value> {
        let path = self.resolve_lpath(target)?;
        let current = self.read_lpath(&path).unwrap_or(Value::Null);
        let updated = match (&current, inc) {
            (Value::Null, true) => Value::Int(1),
            // Decrementing null leaves it null.
            (Value::Null, false) => Value::Null,
            (Value::Int(i), true) => match i.checked_add(1) {
                Some(n) => Value::Int(n),
                None => Value::Float(*i as f64 + 1.0),
            },
            (Value::Int(i), false) => match i.checked_sub(1) {
                Some(n) => Value::Int(n),
                None => Value::Float(*i as f64 - 1.0),
            },
            (Value::Float(f), true) => Value::Float(f + 1.0),
            (Value::Float(f), false) => Value::Float(f - 1.0),
            (Value::Str(s), _) => match parse_full_numeric(s) {
                Some(Num::Int(i)) => {
                    if inc {
                        Value::Int(i + 1)
                    } else {
                        Value::Int(i - 1)
                    }
                }
                Some(Num::Float(f)) => Value::Float(if inc { f + 1.0 } else { f - 1.0 }),
                // Non-numeric strings do not change; the alphanumeric
                // increment of the reference implementation is not carried.
                None => current.clone(),
            },
            (other, _) => (*other).clone(),
        };
        self.write_lpath(&path, updated.clone())?;
        Ok(if pre { updated } else { current })
    }

    fn apply_cast(&mut self, kind: CastKind, value: Value) -> RunResult<Value> {
        let value = value.deref();
        match kind {
            CastKind::Unset => Ok(Value::Null),
            CastKind::Bool => Ok(Value::Bool(value.truthy())),
            CastKind::Int => match &value {
                Value::Object(_) => {
                    self.warning("Object could not be converted to int");
                    Ok(Value::Int(1))
                }
                other => Ok(Value::Int(other.to_int_lossy())),
            },
            CastKind::Float => match &value {
                Value::Object(_) => {
                    self.warning("Object could not be converted to float");
                    Ok(Value::Float(1.0))
                }
                other => Ok(Value::Float(other.to_float_lossy())),
            },
            CastKind::String => {
                let bytes = self.coerce_to_string(value)?;
                Ok(Value::str(bytes))
            }
            CastKind::Array => match value {
                Value::Null => Ok(Value::empty_array()),
                Value::Array(_) => Ok(value),
                Value::Object(id) => {
                    let mut array = PhpArray::default();
                    if let Some(obj) = self.heap.get(id) {
                        for (name, prop_value) in &obj.props {
                            array.insert(ArrayKey::str(name.clone()), prop_value.clone());
                        }
                    }
                    Ok(Value::array(array))
                }
                scalar => {
                    let mut array = PhpArray::default();
                    array.push(scalar);
                    Ok(Value::array(array))
                }
            },
            CastKind::Object => match value {
                Value::Object(_) => Ok(value),
                Value::Array(array) => {
                    let id = self.new_stdclass();
                    if let Some(obj) = self.heap.get_mut(id) {
                        for (key, element) in array.iter() {
                            let name = match key {
                                ArrayKey::Int(i) => i.to_string(),
                                ArrayKey::Str(s) => String::from_utf8_lossy(s).into_owned(),
                            };
                            obj.props.insert(name, element.clone());
                        }
                    }
                    Ok(Value::Object(id))
                }
                Value::Null => Ok(Value::Object(self.new_stdclass())),
                scalar => {
                    let id = self.new_stdclass();
                    if let Some(obj) = self.heap.get_mut(id) {
                        obj.props.insert("scalar".to_owned(), scalar);
                    }
                    Ok(Value::Object(id))
                }
            },
        }
    }

    pub(crate) fn new_stdclass(&mut self) -> crate::heap::ObjectId {
        let class = self.globals.lookup_class("stdclass").expect("stdClass is bootstrapped");
        self.heap.alloc(class)
    }

    // --- indexing ---

    fn eval_index(&mut self, base: &Expr, index: Option<&Expr>) -> RunResult<Value> {
        let Some(index) = index else {
            return Err(self.error(ErrorKind::Error, "Cannot use [] for reading"));
        };
        let base_value = self.eval_expr(base)?.deref();
        let index_value = self.eval_expr(index)?.deref();
        match base_value {
            Value::Array(array) => {
                let Some(key) = ArrayKey::from_value(&index_value) else {
                    return Err(self.error(
                        ErrorKind::TypeError,
                        format!("Cannot access offset of type {} on array", index_value.type_display()),
                    ));
                };
                match array.get(&key) {
                    Some(value) => Ok(value.clone().deref()),
                    None => {
                        self.warning(&format!("Undefined array key {}", key.display()));
                        Ok(Value::Null)
                    }
                }
            }
            Value::Str(bytes) => {
                let raw = index_value.to_int_lossy();
                match crate::interp::lvalue::resolve_str_offset(raw, bytes.len()) {
                    Some(at) => Ok(Value::str(vec![bytes[at]])),
                    None => {
                        self.warning(&format!("Uninitialized string offset {raw}"));
                        Ok(Value::str(""))
                    }
                }
            }
            Value::Null => {
                self.warning("Trying to access array offset on value of type null");
                Ok(Value::Null)
            }
            Value::Object(id) => {
                let class_name = self
                    .heap
                    .get(id)
                    .map_or_else(|| "object".to_owned(), |obj| obj.class.name.clone());
                Err(self.error(
                    ErrorKind::Error,
                    format!("Cannot use object of type {class_name} as array"),
                ))
            }
            other => {
                self.warning(&format!(
                    "Trying to access array offset on value of type {}",
                    other.type_display()
                ));
                Ok(Value::Null)
            }
        }
    }

    // --- closures ---

    fn make_closure(&mut self, decl: &ClosureExpr) -> RunResult<Value> {
        let mut captures: Vec<(String, Binding)> = Vec::new();
        if decl.is_arrow {
            // Arrow functions capture the whole enclosing scope by value;
            // the body only reads what it reads.
            for (name, value) in self.scope().snapshot() {
                captures.push((name, Binding::Val(value)));
            }
        } else {
            for use_item in &decl.uses {
                if use_item.by_ref {
                    let slot = self.scope_mut().slot(&use_item.name);
                    captures.push((use_item.name.clone(), Binding::Slot(slot)));
                } else {
                    let value = self.scope().get(&use_item.name).unwrap_or(Value::Null);
                    captures.push((use_item.name.clone(), Binding::Val(value.deref())));
                }
            }
        }
        let func = Rc::new(crate::types::UserFunc {
            name: "{closure}".to_owned(),
            params: decl.params.clone(),
            return_type: decl.return_type.clone(),
            body: Rc::new(decl.body.clone()),
            is_generator: decl.is_generator,
            by_ref_return: decl.by_ref_return,
            strict_types: self.strict_types,
            ns: Rc::clone(&self.ns),
        });
        let closure = Closure {
            func,
            captures,
            this: if decl.is_static { None } else { self.current_this() },
            scope_class: self.current_class(),
        };
        Ok(Value::Closure(Rc::new(closure)))
    }

    // --- yields ---

    fn eval_yield(&mut self, key: Option<&Expr>, value: Option<&Expr>) -> RunResult<Value> {
        let value = match value {
            Some(expr) => self.eval_expr(expr)?.deref(),
            None => Value::Null,
        };
        let key = match key {
            Some(expr) => Some(self.eval_expr(expr)?.deref()),
            None => None,
        };
        let Some(sink) = self.gen_sink.last_mut() else {
            return Err(self.error(ErrorKind::Error, "Cannot yield outside of a generator"));
        };
        let key = key.unwrap_or_else(|| {
            // Auto keys continue from the highest integer key so far, the
            // same law arrays use.
            let next = sink
                .iter()
                .filter_map(|(k, _)| match k {
                    Value::Int(i) => Some(*i + 1),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            Value::Int(next)
        });
        sink.push((key, value));
        Ok(Value::Null)
    }

    fn eval_yield_from(&mut self, operand: &Expr) -> RunResult<Value> {
        let source = self.eval_expr(operand)?.deref();
        if self.gen_sink.is_empty() {
            return Err(self.error(ErrorKind::Error, "Cannot yield outside of a generator"));
        }
        match source {
            Value::Array(array) => {
                let pairs: Vec<(Value, Value)> =
                    array.iter().map(|(k, v)| (k.to_value(), v.clone().deref())).collect();
                let sink = self.gen_sink.last_mut().expect("checked above");
                sink.extend(pairs);
                Ok(Value::Null)
            }
            Value::Generator(gen) => {
                let (pairs, return_value) = {
                    let g = gen.borrow();
                    (g.pairs.clone(), g.return_value.clone())
                };
                let sink = self.gen_sink.last_mut().expect("checked above");
                sink.extend(pairs);
                Ok(return_value)
            }
            other => Err(self.error(
                ErrorKind::TypeError,
                format!("Can use \"yield from\" only with arrays and Traversables, {} given", other.type_display()),
            )),
        }
    }

    /// Runs a generator function body, materializing its pairs.
    pub(crate) fn materialize_generator(
        &mut self,
        run: impl FnOnce(&mut Self) -> RunResult<Value>,
    ) -> RunResult<Value> {
        self.gen_sink.push(Vec::new());
        let result = run(self);
        let pairs = self.gen_sink.pop().expect("pushed above");
        let return_value = match result {
            Ok(value) => value,
            Err(signal) => return Err(signal),
        };
        let generator = Generator::new(pairs, return_value);
        Ok(Value::Generator(Rc::new(std::cell::RefCell::new(generator))))
    }

    // --- match ---

    fn eval_match(&mut self, subject: &Expr, arms: &[MatchArm]) -> RunResult<Value> {
        let value = self.eval_expr(subject)?.deref();
        let mut default: Option<&MatchArm> = None;
        for arm in arms {
            match &arm.conds {
                None => default = Some(arm),
                Some(conds) => {
                    for cond in conds {
                        let cond_value = self.eval_expr(cond)?.deref();
                        if strict_eq(&value, &cond_value, &self.heap) {
                            return self.eval_expr(&arm.body);
                        }
                    }
                }
            }
        }
        if let Some(arm) = default {
            return self.eval_expr(&arm.body);
        }
        let rendered = match &value {
            Value::Str(s) => format!("\"{}\"", String::from_utf8_lossy(s)),
            other => other.display_lossy(),
        };
        Err(self.error(
            ErrorKind::UnhandledMatchError,
            format!("Unhandled match case {rendered}"),
        ))
    }

    // --- includes & eval() ---

    fn eval_include(&mut self, kind: IncludeKind, operand: &Expr) -> RunResult<Value> {
        let raw = self.eval_expr(operand)?;
        let rel = raw.display_lossy();
        let required = matches!(kind, IncludeKind::Require | IncludeKind::RequireOnce);
        let once = matches!(kind, IncludeKind::IncludeOnce | IncludeKind::RequireOnce);

        let candidate = std::path::Path::new(&rel);
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.current_file
                .parent()
                .map_or_else(|| candidate.to_path_buf(), |dir| dir.join(candidate))
        };
        let canonical = resolved.canonicalize().unwrap_or(resolved);

        if once && self.globals.included.contains(&canonical) {
            return Ok(Value::Bool(true));
        }
        let source = match std::fs::read_to_string(&canonical) {
            Ok(source) => source,
            Err(_) => {
                if required {
                    return Err(self.error(
                        ErrorKind::Error,
                        format!("Failed opening required '{rel}'"),
                    ));
                }
                self.warning(&format!("{kind}({rel}): Failed to open stream: No such file or directory"));
                return Ok(Value::Bool(false));
            }
        };
        self.globals.included.insert(canonical.clone());
        self.tracer.on_include(&canonical.display().to_string());

        let (program, errors) = crate::parse::parse(&source);
        if let Some(first) = errors.into_iter().next() {
            return Err(self.error(
                ErrorKind::Error,
                format!("syntax error in {}: {}", canonical.display(), first.message),
            ));
        }

        let saved_file = std::mem::replace(&mut self.current_file, canonical);
        let saved_ns = std::mem::replace(&mut self.ns, Rc::new(crate::globals::NsContext::default()));
        let saved_strict = self.strict_types;
        self.strict_types = program.strict_types;
        self.hoist_declarations(&program.stmts);
        let result = self.exec_stmts(&program.stmts);
        self.current_file = saved_file;
        self.ns = saved_ns;
        self.strict_types = saved_strict;

        match result {
            Ok(()) => Ok(Value::Int(1)),
            Err(Signal::Return(value)) => Ok(value),
            Err(signal) => Err(signal),
        }
    }

    fn eval_inline_code(&mut self, source: &str) -> RunResult<Value> {
        let wrapped = format!("<?php {source}");
        let (program, errors) = crate::parse::parse(&wrapped);
        if let Some(first) = errors.into_iter().next() {
            return Err(self.error(ErrorKind::Error, format!("syntax error: {}", first.message)));
        }
        self.hoist_declarations(&program.stmts);
        match self.exec_stmts(&program.stmts) {
            Ok(()) => Ok(Value::Null),
            Err(Signal::Return(value)) => Ok(value),
            Err(signal) => Err(signal),
        }
    }

    // --- strings & misc ---

    fn interp_bytes(&mut self, parts: &[InterpPart]) -> RunResult<Vec<u8>> {
        let mut bytes = Vec::new();
        for part in parts {
            match part {
                InterpPart::Lit(lit) => bytes.extend_from_slice(lit),
                InterpPart::Expr(expr) => {
                    let value = self.eval_expr(expr)?;
                    bytes.extend_from_slice(&self.coerce_to_string(value)?);
                }
            }
        }
        Ok(bytes)
    }

    fn magic_const(&self, constant: MagicConst, line: u32) -> Value {
        match constant {
            MagicConst::Line => Value::Int(i64::from(line)),
            MagicConst::File => Value::string(self.current_file.display().to_string()),
            MagicConst::Dir => Value::string(
                self.current_file
                    .parent()
                    .map_or_else(String::new, |d| d.display().to_string()),
            ),
            MagicConst::Function => {
                Value::string(self.frame().map_or_else(String::new, |f| f.func_name.clone()))
            }
            MagicConst::Class | MagicConst::Trait => Value::string(
                self.current_class().map_or_else(String::new, |c| c.name.clone()),
            ),
            MagicConst::Method => {
                let class = self.current_class().map(|c| c.name.clone());
                let func = self.frame().map(|f| f.func_name.clone()).unwrap_or_default();
                match class {
                    Some(class) if !func.is_empty() => Value::string(format!("{class}::{func}")),
                    _ => Value::string(func),
                }
            }
            MagicConst::Namespace => Value::string(self.ns.prefix.clone()),
        }
    }
}

fn num_to_i64(num: Num) -> i64 {
    match num {
        Num::Int(i) => i,
        Num::Float(f) => f.trunc() as i64,
    }
}

fn num_is_zero(num: Num) -> bool {
    match num {
        Num::Int(i) => i == 0,
        Num::Float(f) => f == 0.0,
    }
}
