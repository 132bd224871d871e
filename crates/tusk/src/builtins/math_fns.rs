//! Numeric builtins.

use crate::{
    builtins::{arg, arg_int, opt_arg},
    exception::ErrorKind,
    interp::Interpreter,
    value::{Num, Value, compare, parse_full_numeric},
};

pub(crate) fn register(interp: &mut Interpreter) {
    interp.register_builtin("abs", |_, args| {
        Ok(match arg(&args, 0) {
            Value::Int(i) => match i.checked_abs() {
                Some(n) => Value::Int(n),
                None => Value::Float((i as f64).abs()),
            },
            other => Value::Float(other.to_float_lossy().abs()),
        })
    });

    interp.register_builtin("floor", |_, args| {
        Ok(Value::Float(arg(&args, 0).to_float_lossy().floor()))
    });

    interp.register_builtin("ceil", |_, args| {
        Ok(Value::Float(arg(&args, 0).to_float_lossy().ceil()))
    });

    interp.register_builtin("round", |_, args| {
        let value = arg(&args, 0).to_float_lossy();
        let precision = arg_int(&args, 1);
        let factor = 10f64.powi(precision as i32);
        // Round half away from zero, the language default.
        let rounded = (value * factor).abs().round() * value.signum() / factor;
        Ok(Value::Float(rounded))
    });

    interp.register_builtin("sqrt", |_, args| {
        Ok(Value::Float(arg(&args, 0).to_float_lossy().sqrt()))
    });

    interp.register_builtin("pow", |_, args| {
        let base = arg(&args, 0);
        let exp = arg(&args, 1);
        if let (Value::Int(b), Value::Int(e)) = (&base, &exp) {
            if *e >= 0 {
                if let Some(result) = u32::try_from(*e).ok().and_then(|e| b.checked_pow(e)) {
                    return Ok(Value::Int(result));
                }
            }
        }
        Ok(Value::Float(base.to_float_lossy().powf(exp.to_float_lossy())))
    });

    interp.register_builtin("intdiv", |interp, args| {
        let a = arg_int(&args, 0);
        let b = arg_int(&args, 1);
        if b == 0 {
            return Err(interp.error(ErrorKind::DivisionByZeroError, "Division by zero"));
        }
        if a == i64::MIN && b == -1 {
            return Err(interp.error(
                ErrorKind::ArithmeticError,
                "Division of PHP_INT_MIN by -1 is not an integer",
            ));
        }
        Ok(Value::Int(a / b))
    });

    interp.register_builtin("fmod", |_, args| {
        let a = arg(&args, 0).to_float_lossy();
        let b = arg(&args, 1).to_float_lossy();
        Ok(Value::Float(a % b))
    });

    interp.register_builtin("max", |interp, args| Ok(pick_extreme(interp, &args, true)));
    interp.register_builtin("min", |interp, args| Ok(pick_extreme(interp, &args, false)));

    interp.register_builtin("pi", |_, _| Ok(Value::Float(std::f64::consts::PI)));

    interp.register_builtin("is_nan", |_, args| {
        Ok(Value::Bool(arg(&args, 0).to_float_lossy().is_nan()))
    });

    interp.register_builtin("is_finite", |_, args| {
        Ok(Value::Bool(arg(&args, 0).to_float_lossy().is_finite()))
    });

    interp.register_builtin("is_infinite", |_, args| {
        Ok(Value::Bool(arg(&args, 0).to_float_lossy().is_infinite()))
    });

    interp.register_builtin("intval", |_, args| {
        let value = arg(&args, 0);
        let base = opt_arg(&args, 1).map_or(10, |v| v.to_int_lossy());
        if base != 10 {
            if let Value::Str(s) = &value {
                let text = String::from_utf8_lossy(s);
                let trimmed = text.trim();
                let cleaned = match base {
                    16 => trimmed.trim_start_matches("0x").trim_start_matches("0X"),
                    8 => trimmed.trim_start_matches("0o").trim_start_matches("0O"),
                    2 => trimmed.trim_start_matches("0b").trim_start_matches("0B"),
                    _ => trimmed,
                };
                let parsed = i64::from_str_radix(cleaned, base.clamp(2, 36) as u32).unwrap_or(0);
                return Ok(Value::Int(parsed));
            }
        }
        Ok(Value::Int(value.to_int_lossy()))
    });

    interp.register_builtin("floatval", |_, args| {
        Ok(Value::Float(arg(&args, 0).to_float_lossy()))
    });
    interp.register_builtin("doubleval", |_, args| {
        Ok(Value::Float(arg(&args, 0).to_float_lossy()))
    });

    interp.register_builtin("boolval", |_, args| Ok(Value::Bool(arg(&args, 0).truthy())));

    interp.register_builtin("strval", |interp, args| {
        let value = arg(&args, 0);
        let bytes = interp.coerce_to_string(value)?;
        Ok(Value::str(bytes))
    });

    interp.register_builtin("is_numeric", |_, args| {
        Ok(Value::Bool(match arg(&args, 0) {
            Value::Int(_) | Value::Float(_) => true,
            Value::Str(s) => parse_full_numeric(&s).is_some(),
            _ => false,
        }))
    });

    interp.register_builtin("hexdec", |_, args| {
        let text = arg(&args, 0).display_lossy();
        let digits: String = text.chars().filter(char::is_ascii_hexdigit).collect();
        Ok(Value::Int(i64::from_str_radix(&digits, 16).unwrap_or(0)))
    });

    interp.register_builtin("dechex", |_, args| {
        Ok(Value::string(format!("{:x}", arg_int(&args, 0))))
    });

    interp.register_builtin("decbin", |_, args| {
        Ok(Value::string(format!("{:b}", arg_int(&args, 0))))
    });

    interp.register_builtin("bindec", |_, args| {
        let text = arg(&args, 0).display_lossy();
        let digits: String = text.chars().filter(|c| *c == '0' || *c == '1').collect();
        Ok(Value::Int(i64::from_str_radix(&digits, 2).unwrap_or(0)))
    });

    interp.register_builtin("number_parse", |_, args| {
        // Convenience wrapper exposing the numeric-string scanner.
        Ok(match arg(&args, 0) {
            Value::Str(s) => match parse_full_numeric(&s) {
                Some(Num::Int(i)) => Value::Int(i),
                Some(Num::Float(f)) => Value::Float(f),
                None => Value::Bool(false),
            },
            other => other,
        })
    });
}

fn pick_extreme(interp: &Interpreter, args: &[Value], want_max: bool) -> Value {
    let candidates: Vec<Value> = if args.len() == 1 {
        match arg(args, 0) {
            Value::Array(array) => array.values().map(|v| v.clone().deref()).collect(),
            other => vec![other],
        }
    } else {
        args.iter().map(|v| v.clone().deref()).collect()
    };
    let mut best: Option<Value> = None;
    for candidate in candidates {
        let replace = match &best {
            None => true,
            Some(current) => {
                let ordering = compare(&candidate, current, &interp.heap);
                matches!(
                    (want_max, ordering),
                    (true, Some(std::cmp::Ordering::Greater)) | (false, Some(std::cmp::Ordering::Less))
                )
            }
        };
        if replace {
            best = Some(candidate);
        }
    }
    best.unwrap_or(Value::Bool(false))
}
