//! Type predicates, definitions, callable plumbing and reflection-lite.

use std::rc::Rc;

use crate::{
    builtins::{arg, opt_arg},
    exception::ErrorKind,
    interp::Interpreter,
    types::{ArrayKey, PhpArray},
    value::Value,
};

pub(crate) fn register(interp: &mut Interpreter) {
    // --- type predicates ---
    register_predicate(interp, "is_int", |v| matches!(v, Value::Int(_)));
    register_predicate(interp, "is_integer", |v| matches!(v, Value::Int(_)));
    register_predicate(interp, "is_long", |v| matches!(v, Value::Int(_)));
    register_predicate(interp, "is_float", |v| matches!(v, Value::Float(_)));
    register_predicate(interp, "is_double", |v| matches!(v, Value::Float(_)));
    register_predicate(interp, "is_string", |v| matches!(v, Value::Str(_)));
    register_predicate(interp, "is_bool", |v| matches!(v, Value::Bool(_)));
    register_predicate(interp, "is_array", |v| matches!(v, Value::Array(_)));
    register_predicate(interp, "is_null", |v| matches!(v, Value::Null));
    register_predicate(interp, "is_object", |v| {
        matches!(v, Value::Object(_) | Value::Closure(_) | Value::Generator(_))
    });
    register_predicate(interp, "is_scalar", |v| {
        matches!(v, Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Bool(_))
    });
    register_predicate(interp, "is_iterable", |v| {
        matches!(v, Value::Array(_) | Value::Generator(_))
    });
    register_predicate(interp, "is_resource", |v| matches!(v, Value::Resource(_)));

    interp.register_builtin("is_callable", |interp, args| {
        Ok(Value::Bool(match arg(&args, 0) {
            Value::Closure(_) | Value::Builtin(_) => true,
            Value::Str(name) => {
                let name = String::from_utf8_lossy(&name).to_ascii_lowercase();
                interp.globals.functions.contains_key(&name) || interp.builtins.contains_key(&name)
            }
            Value::Array(pair) => pair.len() == 2,
            Value::Object(id) => interp
                .heap
                .get(id)
                .is_some_and(|obj| obj.class.find_method("__invoke").is_some()),
            _ => false,
        }))
    });

    interp.register_builtin("gettype", |_, args| {
        Ok(Value::string(arg(&args, 0).gettype_name()))
    });

    interp.register_builtin("get_debug_type", |interp, args| {
        Ok(Value::string(match arg(&args, 0) {
            Value::Object(id) => interp
                .heap
                .get(id)
                .map_or_else(|| "object".to_owned(), |obj| obj.class.name.clone()),
            Value::Closure(_) => "Closure".to_owned(),
            Value::Generator(_) => "Generator".to_owned(),
            other => other.type_display().to_owned(),
        }))
    });

    // --- classes & functions ---

    interp.register_builtin("get_class", |interp, args| {
        match opt_arg(&args, 0) {
            Some(Value::Object(id)) => Ok(Value::string(
                interp
                    .heap
                    .get(id)
                    .map_or_else(String::new, |obj| obj.class.name.clone()),
            )),
            Some(Value::Closure(_)) => Ok(Value::string("Closure")),
            Some(Value::Generator(_)) => Ok(Value::string("Generator")),
            None => match interp.current_class() {
                Some(class) => Ok(Value::string(class.name.clone())),
                None => Ok(Value::Bool(false)),
            },
            Some(other) => Err(interp.error(
                ErrorKind::TypeError,
                format!(
                    "get_class(): Argument #1 ($object) must be of type object, {} given",
                    other.type_display()
                ),
            )),
        }
    });

    interp.register_builtin("get_parent_class", |interp, args| {
        let class = match opt_arg(&args, 0) {
            Some(Value::Object(id)) => interp.heap.get(id).map(|obj| Rc::clone(&obj.class)),
            Some(Value::Str(name)) => {
                let name = String::from_utf8_lossy(&name).into_owned();
                interp.globals.lookup_class(&name)
            }
            _ => interp.current_class(),
        };
        Ok(match class.and_then(|c| c.parent.clone()) {
            Some(parent) => Value::string(parent.name.clone()),
            None => Value::Bool(false),
        })
    });

    interp.register_builtin("get_object_vars", |interp, args| {
        match arg(&args, 0) {
            Value::Object(id) => {
                let mut vars = PhpArray::default();
                if let Some(obj) = interp.heap.get(id) {
                    for (name, value) in &obj.props {
                        vars.insert(ArrayKey::str(name.clone()), value.clone());
                    }
                }
                Ok(Value::array(vars))
            }
            _ => Ok(Value::Bool(false)),
        }
    });

    interp.register_builtin("function_exists", |interp, args| {
        let name = arg(&args, 0).display_lossy().to_ascii_lowercase();
        Ok(Value::Bool(
            interp.globals.functions.contains_key(&name) || interp.builtins.contains_key(&name),
        ))
    });

    interp.register_builtin("class_exists", |interp, args| {
        let name = arg(&args, 0).display_lossy();
        Ok(Value::Bool(matches!(
            interp.globals.lookup_class(&name).map(|c| c.kind),
            Some(crate::ast::ClassKind::Class)
        )))
    });

    interp.register_builtin("interface_exists", |interp, args| {
        let name = arg(&args, 0).display_lossy();
        Ok(Value::Bool(matches!(
            interp.globals.lookup_class(&name).map(|c| c.kind),
            Some(crate::ast::ClassKind::Interface)
        )))
    });

    interp.register_builtin("enum_exists", |interp, args| {
        let name = arg(&args, 0).display_lossy();
        Ok(Value::Bool(matches!(
            interp.globals.lookup_class(&name).map(|c| c.kind),
            Some(crate::ast::ClassKind::Enum)
        )))
    });

    interp.register_builtin("trait_exists", |interp, args| {
        let name = arg(&args, 0).display_lossy().to_ascii_lowercase();
        Ok(Value::Bool(interp.globals.traits.contains_key(&name)))
    });

    interp.register_builtin("method_exists", |interp, args| {
        let class = match arg(&args, 0) {
            Value::Object(id) => interp.heap.get(id).map(|obj| Rc::clone(&obj.class)),
            Value::Str(name) => {
                let name = String::from_utf8_lossy(&name).into_owned();
                interp.globals.lookup_class(&name)
            }
            _ => None,
        };
        let method = arg(&args, 1).display_lossy();
        Ok(Value::Bool(class.is_some_and(|c| c.find_method(&method).is_some())))
    });

    interp.register_builtin("property_exists", |interp, args| {
        let method = arg(&args, 1).display_lossy();
        Ok(Value::Bool(match arg(&args, 0) {
            Value::Object(id) => interp.heap.get(id).is_some_and(|obj| {
                obj.props.contains_key(&method) || obj.class.find_prop(&method).is_some()
            }),
            Value::Str(name) => {
                let name = String::from_utf8_lossy(&name).into_owned();
                interp
                    .globals
                    .lookup_class(&name)
                    .is_some_and(|c| c.find_prop(&method).is_some())
            }
            _ => false,
        }))
    });

    interp.register_builtin("is_a", |interp, args| {
        let class_name = arg(&args, 1).display_lossy();
        Ok(Value::Bool(match arg(&args, 0) {
            Value::Object(id) => interp
                .heap
                .get(id)
                .is_some_and(|obj| obj.class.instance_of(&class_name)),
            Value::Str(name) if arg(&args, 2).truthy() => {
                let name = String::from_utf8_lossy(&name).into_owned();
                interp
                    .globals
                    .lookup_class(&name)
                    .is_some_and(|c| c.instance_of(&class_name))
            }
            _ => false,
        }))
    });
    interp.register_builtin("is_subclass_of", |interp, args| {
        let class_name = arg(&args, 1).display_lossy();
        Ok(Value::Bool(match arg(&args, 0) {
            Value::Object(id) => interp.heap.get(id).is_some_and(|obj| {
                obj.class.instance_of(&class_name)
                    && !obj.class.name.eq_ignore_ascii_case(&class_name)
            }),
            Value::Str(name) => {
                let name = String::from_utf8_lossy(&name).into_owned();
                interp.globals.lookup_class(&name).is_some_and(|c| {
                    c.instance_of(&class_name) && !c.name.eq_ignore_ascii_case(&class_name)
                })
            }
            _ => false,
        }))
    });

    // --- constants ---

    interp.register_builtin("define", |interp, args| {
        let name = arg(&args, 0).display_lossy();
        let value = arg(&args, 1);
        if interp.globals.constants.contains_key(&name) {
            interp.warning(&format!("Constant {name} already defined"));
            return Ok(Value::Bool(false));
        }
        interp.globals.constants.insert(name, value);
        Ok(Value::Bool(true))
    });

    interp.register_builtin("defined", |interp, args| {
        let name = arg(&args, 0).display_lossy();
        Ok(Value::Bool(interp.globals.constants.contains_key(&name)))
    });

    interp.register_builtin("constant", |interp, args| {
        let name = arg(&args, 0).display_lossy();
        match interp.globals.constants.get(&name) {
            Some(value) => Ok(value.clone()),
            None => Err(interp.error(ErrorKind::Error, format!("Undefined constant \"{name}\""))),
        }
    });

    // --- callable plumbing ---

    interp.register_builtin("call_user_func", |interp, mut args| {
        if args.is_empty() {
            return Err(interp.error(ErrorKind::ArgumentCountError, "call_user_func() expects at least 1 argument"));
        }
        let callable = args.remove(0);
        interp.call_value(callable, args)
    });

    interp.register_builtin("call_user_func_array", |interp, args| {
        let callable = arg(&args, 0);
        let packed = match arg(&args, 1) {
            Value::Array(array) => array.values().map(|v| v.clone().deref()).collect(),
            _ => Vec::new(),
        };
        interp.call_value(callable, packed)
    });

    interp.register_builtin("func_get_args", |interp, _| {
        let values = interp.frame().map(|f| f.args.clone()).unwrap_or_default();
        Ok(Value::array(PhpArray::from_values(values)))
    });

    interp.register_builtin("func_num_args", |interp, _| {
        Ok(Value::Int(interp.frame().map_or(0, |f| f.args.len() as i64)))
    });

    interp.register_builtin("iterator_to_array", |_, args| {
        Ok(match arg(&args, 0) {
            Value::Generator(gen) => {
                let preserve_keys = opt_arg(&args, 1).is_none_or(|v| v.truthy());
                let pairs = gen.borrow().pairs.clone();
                let mut array = PhpArray::default();
                for (key, value) in pairs {
                    if preserve_keys {
                        if let Some(k) = ArrayKey::from_value(&key) {
                            array.insert(k, value);
                            continue;
                        }
                    }
                    array.push(value);
                }
                Value::array(array)
            }
            Value::Array(array) => Value::Array(array),
            _ => Value::empty_array(),
        })
    });

    // --- environment-ish leaves ---

    interp.register_builtin("php_sapi_name", |_, _| Ok(Value::string("cli")));
    interp.register_builtin("phpversion", |interp, _| {
        Ok(interp.globals.constants.get("PHP_VERSION").cloned().unwrap_or(Value::Bool(false)))
    });
    interp.register_builtin("error_reporting", |_, _| Ok(Value::Int(32767)));
    interp.register_builtin("ini_set", |_, _| Ok(Value::Bool(false)));
    interp.register_builtin("ini_get", |_, _| Ok(Value::Bool(false)));
    interp.register_builtin("set_error_handler", |_, _| Ok(Value::Null));
    interp.register_builtin("gc_collect_cycles", |_, _| Ok(Value::Int(0)));
    interp.register_builtin("usleep", |_, _| Ok(Value::Null));
    interp.register_builtin("microtime", |_, args| {
        let as_float = arg(&args, 0).truthy();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        if as_float {
            Ok(Value::Float(now.as_secs_f64()))
        } else {
            Ok(Value::string(format!("{} {}", now.subsec_micros() as f64 / 1e6, now.as_secs())))
        }
    });
    interp.register_builtin("time", |_, _| {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Value::Int(now.as_secs() as i64))
    });

    interp.register_builtin("json_encode", |interp, args| {
        let value = arg(&args, 0);
        let flags = arg(&args, 1).to_int_lossy();
        let mut out = Vec::new();
        json_encode_value(interp, &value, flags, 0, &mut out);
        Ok(Value::str(out))
    });

    interp.register_builtin("spl_object_id", |_, args| {
        Ok(match arg(&args, 0) {
            Value::Object(id) => Value::Int(id.index() as i64 + 1),
            _ => Value::Int(0),
        })
    });
}

fn register_predicate(interp: &mut Interpreter, name: &str, pred: fn(&Value) -> bool) {
    interp.register_builtin(name, move |_, args| Ok(Value::Bool(pred(&arg(&args, 0)))));
}

const JSON_PRETTY_PRINT: i64 = 128;
const JSON_UNESCAPED_SLASHES: i64 = 64;
const JSON_UNESCAPED_UNICODE: i64 = 256;

fn json_encode_value(interp: &Interpreter, value: &Value, flags: i64, depth: usize, out: &mut Vec<u8>) {
    let pretty = flags & JSON_PRETTY_PRINT != 0;
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Value::Float(f) => {
            if f.is_finite() {
                let mut buffer = ryu::Buffer::new();
                out.extend_from_slice(buffer.format(*f).as_bytes());
            } else {
                out.push(b'0');
            }
        }
        Value::Str(s) => json_encode_string(s, flags, out),
        Value::Array(array) => {
            let is_list = array
                .keys()
                .enumerate()
                .all(|(i, k)| matches!(k, ArrayKey::Int(n) if *n == i as i64));
            let (open, close): (u8, u8) = if is_list { (b'[', b']') } else { (b'{', b'}') };
            out.push(open);
            for (index, (key, element)) in array.iter().enumerate() {
                if index > 0 {
                    out.push(b',');
                }
                if pretty {
                    out.push(b'\n');
                    for _ in 0..=depth {
                        out.extend_from_slice(b"    ");
                    }
                }
                if !is_list {
                    let key_bytes = match key {
                        ArrayKey::Int(i) => i.to_string().into_bytes(),
                        ArrayKey::Str(s) => s.to_vec(),
                    };
                    json_encode_string(&key_bytes, flags, out);
                    out.push(b':');
                    if pretty {
                        out.push(b' ');
                    }
                }
                json_encode_value(interp, &element.clone().deref(), flags, depth + 1, out);
            }
            if pretty && !array.is_empty() {
                out.push(b'\n');
                for _ in 0..depth {
                    out.extend_from_slice(b"    ");
                }
            }
            out.push(close);
        }
        Value::Object(id) => {
            out.push(b'{');
            if let Some(obj) = interp.heap.get(*id) {
                for (index, (name, element)) in obj.props.iter().enumerate() {
                    if index > 0 {
                        out.push(b',');
                    }
                    json_encode_string(name.as_bytes(), flags, out);
                    out.push(b':');
                    json_encode_value(interp, &element.clone().deref(), flags, depth + 1, out);
                }
            }
            out.push(b'}');
        }
        Value::Ref(slot) => json_encode_value(interp, &slot.borrow().clone(), flags, depth, out),
        _ => out.extend_from_slice(b"null"),
    }
}

fn json_encode_string(bytes: &[u8], flags: i64, out: &mut Vec<u8>) {
    out.push(b'"');
    let text = String::from_utf8_lossy(bytes);
    for c in text.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '/' if flags & JSON_UNESCAPED_SLASHES == 0 => out.extend_from_slice(b"\\/"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c if c.is_ascii() => out.push(c as u8),
            c if flags & JSON_UNESCAPED_UNICODE != 0 => {
                let mut buffer = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
            }
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.extend_from_slice(format!("\\u{unit:04x}").as_bytes());
                }
            }
        }
    }
    out.push(b'"');
}
