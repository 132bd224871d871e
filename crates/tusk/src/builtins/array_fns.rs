//! Array builtins. The mutating family (`sort`, `array_push`, …) receives
//! its first argument as a reference slot and writes back through it.

use crate::{
    builtins::{arg, arg_array, arg_int, mutate_array_arg, opt_arg},
    exception::{ErrorKind, RunResult},
    interp::Interpreter,
    types::{ArrayKey, PhpArray},
    value::{Value, compare, loose_eq, strict_eq},
};

pub(crate) fn register(interp: &mut Interpreter) {
    interp.register_builtin("count", |interp, args| {
        match arg(&args, 0) {
            Value::Array(array) => Ok(Value::Int(array.len() as i64)),
            Value::Object(id) => {
                let countable = interp
                    .heap
                    .get(id)
                    .is_some_and(|obj| obj.class.find_method("count").is_some());
                if countable {
                    let result = interp.call_method_by_name(id, "count", Vec::new())?;
                    Ok(Value::Int(result.to_int_lossy()))
                } else {
                    Ok(Value::Int(1))
                }
            }
            Value::Null => {
                interp.warning("count(): Argument #1 ($value) must be of type Countable|array, null given");
                Ok(Value::Int(0))
            }
            _ => Ok(Value::Int(1)),
        }
    });
    interp.register_builtin("sizeof", |interp, args| {
        let builtin = interp.builtins.get("count").cloned().expect("count registered");
        (builtin.func.clone())(interp, args)
    });

    interp.register_builtin("in_array", |interp, args| {
        let needle = arg(&args, 0);
        let haystack = arg_array(&args, 1);
        let strict = arg(&args, 2).truthy();
        let found = haystack.values().any(|v| {
            if strict {
                strict_eq(&needle, v, &interp.heap)
            } else {
                loose_eq(&needle, v, &interp.heap)
            }
        });
        Ok(Value::Bool(found))
    });

    interp.register_builtin("array_search", |interp, args| {
        let needle = arg(&args, 0);
        let haystack = arg_array(&args, 1);
        let strict = arg(&args, 2).truthy();
        for (key, value) in haystack.iter() {
            let hit = if strict {
                strict_eq(&needle, value, &interp.heap)
            } else {
                loose_eq(&needle, value, &interp.heap)
            };
            if hit {
                return Ok(key.to_value());
            }
        }
        Ok(Value::Bool(false))
    });

    interp.register_builtin("array_keys", |interp, args| {
        let array = arg_array(&args, 0);
        let mut keys = PhpArray::default();
        match opt_arg(&args, 1) {
            Some(search) => {
                let strict = arg(&args, 2).truthy();
                for (key, value) in array.iter() {
                    let hit = if strict {
                        strict_eq(&search, value, &interp.heap)
                    } else {
                        loose_eq(&search, value, &interp.heap)
                    };
                    if hit {
                        keys.push(key.to_value());
                    }
                }
            }
            None => {
                for key in array.keys() {
                    keys.push(key.to_value());
                }
            }
        }
        Ok(Value::array(keys))
    });

    interp.register_builtin("array_values", |_, args| {
        let array = arg_array(&args, 0);
        Ok(Value::array(PhpArray::from_values(array.values().cloned())))
    });

    interp.register_builtin("array_key_exists", |_, args| {
        let key = ArrayKey::from_value(&arg(&args, 0));
        let array = arg_array(&args, 1);
        Ok(Value::Bool(key.is_some_and(|k| array.contains_key(&k))))
    });
    interp.register_builtin("key_exists", |interp, args| {
        let builtin = interp.builtins.get("array_key_exists").cloned().expect("registered");
        (builtin.func.clone())(interp, args)
    });

    interp.register_builtin("array_key_first", |_, args| {
        let array = arg_array(&args, 0);
        Ok(array.first().map_or(Value::Null, |(k, _)| k.to_value()))
    });

    interp.register_builtin("array_key_last", |_, args| {
        let array = arg_array(&args, 0);
        Ok(array.last().map_or(Value::Null, |(k, _)| k.to_value()))
    });

    interp.register_builtin("array_push", |_, args| {
        let values: Vec<Value> =
            args.get(1..).unwrap_or(&[]).iter().map(|v| v.clone().deref()).collect();
        let len = mutate_array_arg(&args, |array| {
            for value in values {
                array.push(value);
            }
            array.len() as i64
        });
        Ok(Value::Int(len.unwrap_or(0)))
    });

    interp.register_builtin("array_pop", |_, args| {
        Ok(mutate_array_arg(&args, |array| {
            array.pop_last().map_or(Value::Null, |(_, v)| v)
        })
        .unwrap_or(Value::Null))
    });

    interp.register_builtin("array_shift", |_, args| {
        Ok(mutate_array_arg(&args, |array| {
            let Some((first_key, _)) = array.first().map(|(k, v)| (k.clone(), v.clone())) else {
                return Value::Null;
            };
            let removed = array.remove(&first_key).unwrap_or(Value::Null);
            *array = array.reindexed();
            removed
        })
        .unwrap_or(Value::Null))
    });

    interp.register_builtin("array_unshift", |_, args| {
        let values: Vec<Value> =
            args.get(1..).unwrap_or(&[]).iter().map(|v| v.clone().deref()).collect();
        let len = mutate_array_arg(&args, |array| {
            let mut rebuilt = PhpArray::from_values(values);
            for (key, value) in array.iter() {
                match key {
                    ArrayKey::Int(_) => {
                        rebuilt.push(value.clone());
                    }
                    ArrayKey::Str(_) => rebuilt.insert(key.clone(), value.clone()),
                }
            }
            *array = rebuilt;
            array.len() as i64
        });
        Ok(Value::Int(len.unwrap_or(0)))
    });

    interp.register_builtin("array_merge", |_, args| {
        let mut merged = PhpArray::default();
        for value in &args {
            if let Value::Array(array) = value.clone().deref() {
                for (key, element) in array.iter() {
                    match key {
                        ArrayKey::Int(_) => {
                            merged.push(element.clone());
                        }
                        ArrayKey::Str(_) => merged.insert(key.clone(), element.clone()),
                    }
                }
            }
        }
        Ok(Value::array(merged))
    });

    interp.register_builtin("array_combine", |interp, args| {
        let keys = arg_array(&args, 0);
        let values = arg_array(&args, 1);
        if keys.len() != values.len() {
            return Err(interp.error(
                ErrorKind::ValueError,
                "array_combine(): Argument #1 ($keys) and argument #2 ($values) must have the same number of elements",
            ));
        }
        let mut combined = PhpArray::default();
        for (key_value, value) in keys.values().zip(values.values()) {
            if let Some(key) = ArrayKey::from_value(key_value) {
                combined.insert(key, value.clone());
            }
        }
        Ok(Value::array(combined))
    });

    interp.register_builtin("array_flip", |interp, args| {
        let array = arg_array(&args, 0);
        let mut flipped = PhpArray::default();
        for (key, value) in array.iter() {
            match ArrayKey::from_value(value) {
                Some(new_key) => flipped.insert(new_key, key.to_value()),
                None => {
                    interp.warning("array_flip(): Can only flip string and integer values");
                }
            }
        }
        Ok(Value::array(flipped))
    });

    interp.register_builtin("array_unique", |interp, args| {
        let array = arg_array(&args, 0);
        let mut unique = PhpArray::default();
        for (key, value) in array.iter() {
            let seen = unique.values().any(|v| loose_eq(v, value, &interp.heap));
            if !seen {
                unique.insert(key.clone(), value.clone());
            }
        }
        Ok(Value::array(unique))
    });

    interp.register_builtin("array_reverse", |_, args| {
        let array = arg_array(&args, 0);
        let preserve_keys = arg(&args, 1).truthy();
        let mut reversed = PhpArray::default();
        let pairs: Vec<(ArrayKey, Value)> =
            array.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (key, value) in pairs.into_iter().rev() {
            match key {
                ArrayKey::Int(_) if !preserve_keys => {
                    reversed.push(value);
                }
                key => reversed.insert(key, value),
            }
        }
        Ok(Value::array(reversed))
    });

    interp.register_builtin("array_slice", |_, args| {
        let array = arg_array(&args, 0);
        let offset = arg_int(&args, 1);
        let length = opt_arg(&args, 2)
            .filter(|v| !matches!(v, Value::Null))
            .map(|v| v.to_int_lossy());
        let preserve_keys = arg(&args, 3).truthy();
        let len = array.len() as i64;
        let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
        let take = match length {
            None => len - start,
            Some(n) if n < 0 => (len - start + n).max(0),
            Some(n) => n.min(len - start),
        };
        let mut sliced = PhpArray::default();
        for (key, value) in array.iter().skip(start as usize).take(take as usize) {
            match key {
                ArrayKey::Int(_) if !preserve_keys => {
                    sliced.push(value.clone());
                }
                key => sliced.insert(key.clone(), value.clone()),
            }
        }
        Ok(Value::array(sliced))
    });

    interp.register_builtin("array_splice", |_, args| {
        let offset = arg_int(&args, 1);
        let length = opt_arg(&args, 2)
            .filter(|v| !matches!(v, Value::Null))
            .map(|v| v.to_int_lossy());
        let replacement: Vec<Value> = match opt_arg(&args, 3) {
            Some(Value::Array(array)) => array.values().cloned().collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };
        let removed = mutate_array_arg(&args, |array| {
            let values: Vec<(ArrayKey, Value)> =
                array.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let len = values.len() as i64;
            let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) } as usize;
            let take = match length {
                None => values.len() - start,
                Some(n) if n < 0 => ((len - start as i64 + n).max(0)) as usize,
                Some(n) => (n.max(0) as usize).min(values.len() - start),
            };
            let mut removed = PhpArray::default();
            let mut rebuilt = PhpArray::default();
            for (index, (key, value)) in values.into_iter().enumerate() {
                if index == start {
                    for rep in &replacement {
                        rebuilt.push(rep.clone());
                    }
                }
                if index >= start && index < start + take {
                    removed.push(value);
                    continue;
                }
                match key {
                    ArrayKey::Int(_) => {
                        rebuilt.push(value);
                    }
                    key => rebuilt.insert(key, value),
                }
            }
            if start >= rebuilt.len() {
                for rep in &replacement {
                    rebuilt.push(rep.clone());
                }
            }
            *array = rebuilt;
            Value::array(removed)
        });
        Ok(removed.unwrap_or_else(Value::empty_array))
    });

    interp.register_builtin("array_sum", |_, args| {
        let array = arg_array(&args, 0);
        let mut int_sum: i64 = 0;
        let mut float_sum = 0.0;
        let mut is_float = false;
        for value in array.values() {
            match value.clone().deref() {
                Value::Float(f) => {
                    is_float = true;
                    float_sum += f;
                }
                other => match int_sum.checked_add(other.to_int_lossy()) {
                    Some(sum) if !is_float => int_sum = sum,
                    _ => {
                        is_float = true;
                        float_sum += other.to_float_lossy();
                    }
                },
            }
        }
        Ok(if is_float {
            Value::Float(float_sum + int_sum as f64)
        } else {
            Value::Int(int_sum)
        })
    });

    interp.register_builtin("array_fill", |_, args| {
        let start = arg_int(&args, 0);
        let count = arg_int(&args, 1).max(0);
        let value = arg(&args, 2);
        let mut array = PhpArray::default();
        for i in 0..count {
            array.insert(ArrayKey::Int(start + i), value.clone());
        }
        Ok(Value::array(array))
    });

    interp.register_builtin("range", |interp, args| {
        let start = arg(&args, 0);
        let end = arg(&args, 1);
        let step = opt_arg(&args, 2).map_or(1.0, |v| v.to_float_lossy().abs());
        if step == 0.0 {
            return Err(interp.error(ErrorKind::ValueError, "range(): Argument #3 ($step) cannot be 0"));
        }
        // Single-letter strings range over bytes.
        if let (Some(a), Some(b)) = (start.as_bytes(), end.as_bytes()) {
            if a.len() == 1 && b.len() == 1 && !a[0].is_ascii_digit() && !b[0].is_ascii_digit() {
                let (from, to) = (a[0], b[0]);
                let values: Vec<Value> = if from <= to {
                    (from..=to).step_by(step as usize).map(|c| Value::str(vec![c])).collect()
                } else {
                    (to..=from).rev().step_by(step as usize).map(|c| Value::str(vec![c])).collect()
                };
                return Ok(Value::array(PhpArray::from_values(values)));
            }
        }
        let use_float = matches!(start, Value::Float(_))
            || matches!(end, Value::Float(_))
            || step.fract() != 0.0;
        let mut values = Vec::new();
        if use_float {
            let (from, to) = (start.to_float_lossy(), end.to_float_lossy());
            let mut current = from;
            if from <= to {
                while current <= to + f64::EPSILON {
                    values.push(Value::Float(current));
                    current += step;
                }
            } else {
                while current >= to - f64::EPSILON {
                    values.push(Value::Float(current));
                    current -= step;
                }
            }
        } else {
            let (from, to) = (start.to_int_lossy(), end.to_int_lossy());
            let step = step as i64;
            let mut current = from;
            if from <= to {
                while current <= to {
                    values.push(Value::Int(current));
                    current += step;
                }
            } else {
                while current >= to {
                    values.push(Value::Int(current));
                    current -= step;
                }
            }
        }
        Ok(Value::array(PhpArray::from_values(values)))
    });

    interp.register_builtin("array_map", |interp, args| {
        let callback = arg(&args, 0);
        let array = arg_array(&args, 1);
        let mut mapped = PhpArray::default();
        if matches!(callback, Value::Null) {
            return Ok(Value::array(array));
        }
        for (key, value) in array.iter() {
            let result = interp.call_value(callback.clone(), vec![value.clone().deref()])?;
            mapped.insert(key.clone(), result);
        }
        Ok(Value::array(mapped))
    });

    interp.register_builtin("array_filter", |interp, args| {
        let array = arg_array(&args, 0);
        let callback = opt_arg(&args, 1);
        let mut kept = PhpArray::default();
        for (key, value) in array.iter() {
            let keep = match &callback {
                Some(callback) if !matches!(callback, Value::Null) => interp
                    .call_value(callback.clone(), vec![value.clone().deref()])?
                    .truthy(),
                _ => value.truthy(),
            };
            if keep {
                kept.insert(key.clone(), value.clone());
            }
        }
        Ok(Value::array(kept))
    });

    interp.register_builtin("array_reduce", |interp, args| {
        let array = arg_array(&args, 0);
        let callback = arg(&args, 1);
        let mut carry = opt_arg(&args, 2).unwrap_or(Value::Null);
        for value in array.values() {
            carry = interp.call_value(callback.clone(), vec![carry, value.clone().deref()])?;
        }
        Ok(carry)
    });

    interp.register_builtin("sort", |interp, args| sort_impl(interp, &args, SortBy::Value, false, false));
    interp.register_builtin("rsort", |interp, args| sort_impl(interp, &args, SortBy::Value, true, false));
    interp.register_builtin("ksort", |interp, args| sort_impl(interp, &args, SortBy::Key, false, true));
    interp.register_builtin("krsort", |interp, args| sort_impl(interp, &args, SortBy::Key, true, true));
    interp.register_builtin("asort", |interp, args| sort_impl(interp, &args, SortBy::Value, false, true));
    interp.register_builtin("arsort", |interp, args| sort_impl(interp, &args, SortBy::Value, true, true));

    interp.register_builtin("usort", |interp, args| user_sort(interp, &args, SortBy::Value, false));
    interp.register_builtin("uasort", |interp, args| user_sort(interp, &args, SortBy::Value, true));
    interp.register_builtin("uksort", |interp, args| user_sort(interp, &args, SortBy::Key, true));
}

#[derive(Clone, Copy, PartialEq)]
enum SortBy {
    Value,
    Key,
}

fn sort_impl(
    interp: &mut Interpreter,
    args: &[Value],
    by: SortBy,
    descending: bool,
    preserve_keys: bool,
) -> RunResult<Value> {
    let mut pairs: Vec<(ArrayKey, Value)> = match args.first().map(|v| v.clone().deref()) {
        Some(Value::Array(array)) => array.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => return Ok(Value::Bool(false)),
    };
    pairs.sort_by(|a, b| {
        let ordering = match by {
            SortBy::Value => compare(&a.1, &b.1, &interp.heap),
            SortBy::Key => compare(&a.0.to_value(), &b.0.to_value(), &interp.heap),
        }
        .unwrap_or(std::cmp::Ordering::Equal);
        if descending { ordering.reverse() } else { ordering }
    });
    let rebuilt = if preserve_keys {
        PhpArray::from_pairs(pairs)
    } else {
        PhpArray::from_values(pairs.into_iter().map(|(_, v)| v))
    };
    mutate_array_arg(args, |array| *array = rebuilt);
    Ok(Value::Bool(true))
}

fn user_sort(
    interp: &mut Interpreter,
    args: &[Value],
    by: SortBy,
    preserve_keys: bool,
) -> RunResult<Value> {
    let callback = arg(args, 1);
    let mut pairs: Vec<(ArrayKey, Value)> = match args.first().map(|v| v.clone().deref()) {
        Some(Value::Array(array)) => array.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => return Ok(Value::Bool(false)),
    };
    // Insertion sort so the user comparator can propagate errors.
    let mut sorted: Vec<(ArrayKey, Value)> = Vec::with_capacity(pairs.len());
    for pair in pairs.drain(..) {
        let mut at = sorted.len();
        for (index, existing) in sorted.iter().enumerate() {
            let (left, right) = match by {
                SortBy::Value => (pair.1.clone(), existing.1.clone()),
                SortBy::Key => (pair.0.to_value(), existing.0.to_value()),
            };
            let ordering = interp.call_value(callback.clone(), vec![left, right])?.to_int_lossy();
            if ordering < 0 {
                at = index;
                break;
            }
        }
        sorted.insert(at, pair);
    }
    let rebuilt = if preserve_keys {
        PhpArray::from_pairs(sorted)
    } else {
        PhpArray::from_values(sorted.into_iter().map(|(_, v)| v))
    };
    mutate_array_arg(args, |array| *array = rebuilt);
    Ok(Value::Bool(true))
}
