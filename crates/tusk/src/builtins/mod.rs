//! Interpreter-native builtin functions.
//!
//! Each submodule registers one family through the same host contract the
//! embedding API exposes: a name and a `Fn(&mut Interpreter, Vec<Value>) ->
//! RunResult<Value>`. Builtins whose reference signature takes the first
//! parameter by reference (`sort`, `array_push`, …) receive a `Value::Ref`
//! slot from the call site and write through it.

mod array_fns;
mod math_fns;
mod misc_fns;
mod output_fns;
mod string_fns;

use std::rc::Rc;

use crate::{interp::Interpreter, types::PhpArray, value::Value};

pub(crate) fn install(interp: &mut Interpreter) {
    string_fns::register(interp);
    array_fns::register(interp);
    math_fns::register(interp);
    output_fns::register(interp);
    misc_fns::register(interp);
}

// --- shared argument helpers ---

pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null).deref()
}

pub(crate) fn opt_arg(args: &[Value], index: usize) -> Option<Value> {
    args.get(index).cloned().map(Value::deref)
}

pub(crate) fn arg_int(args: &[Value], index: usize) -> i64 {
    arg(args, index).to_int_lossy()
}

pub(crate) fn arg_bytes(
    interp: &mut Interpreter,
    args: &[Value],
    index: usize,
) -> crate::exception::RunResult<Vec<u8>> {
    let value = arg(args, index);
    interp.coerce_to_string(value)
}

pub(crate) fn arg_array(args: &[Value], index: usize) -> PhpArray {
    match arg(args, index) {
        Value::Array(array) => (*array).clone(),
        _ => PhpArray::default(),
    }
}

/// Applies `f` to a by-ref array argument, writing changes back through the
/// caller's slot. Falls back to a scratch copy when the argument was not a
/// reference (a literal at the call site).
pub(crate) fn mutate_array_arg<R>(args: &[Value], f: impl FnOnce(&mut PhpArray) -> R) -> Option<R> {
    match args.first() {
        Some(Value::Ref(slot)) => {
            let mut guard = slot.borrow_mut();
            if matches!(&*guard, Value::Null) {
                *guard = Value::empty_array();
            }
            match &mut *guard {
                Value::Array(rc) => Some(f(Rc::make_mut(rc))),
                _ => None,
            }
        }
        Some(Value::Array(rc)) => {
            let mut copy = (**rc).clone();
            Some(f(&mut copy))
        }
        _ => None,
    }
}
