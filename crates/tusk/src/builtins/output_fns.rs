//! Output buffering controls and value dumping.

use crate::{
    builtins::arg,
    interp::Interpreter,
    types::ArrayKey,
    value::Value,
};

pub(crate) fn register(interp: &mut Interpreter) {
    interp.register_builtin("ob_start", |interp, _| {
        interp.output.push_buffer();
        Ok(Value::Bool(true))
    });

    interp.register_builtin("ob_get_level", |interp, _| {
        Ok(Value::Int(interp.output.level() as i64))
    });

    interp.register_builtin("ob_get_contents", |interp, _| {
        Ok(match interp.output.top_contents() {
            Some(bytes) => Value::str(bytes.to_vec()),
            None => Value::Bool(false),
        })
    });

    interp.register_builtin("ob_get_clean", |interp, _| {
        Ok(match interp.output.pop_discard() {
            Some(bytes) => Value::str(bytes),
            None => Value::Bool(false),
        })
    });

    interp.register_builtin("ob_end_clean", |interp, _| {
        Ok(Value::Bool(interp.output.pop_discard().is_some()))
    });

    interp.register_builtin("ob_end_flush", |interp, _| {
        Ok(Value::Bool(interp.output.pop_flush()))
    });

    interp.register_builtin("ob_get_flush", |interp, _| {
        let contents = interp.output.top_contents().map(<[u8]>::to_vec);
        match contents {
            Some(bytes) => {
                interp.output.pop_flush();
                Ok(Value::str(bytes))
            }
            None => Ok(Value::Bool(false)),
        }
    });

    interp.register_builtin("flush", |_, _| Ok(Value::Null));

    interp.register_builtin("var_dump", |interp, args| {
        let mut out = Vec::new();
        for value in &args {
            // `__debugInfo` replaces an object's property table in dumps.
            let value = value.clone().deref();
            let dumped = match &value {
                Value::Object(id) => {
                    let has_debug_info = interp
                        .heap
                        .get(*id)
                        .is_some_and(|obj| obj.class.find_method("__debuginfo").is_some());
                    if has_debug_info {
                        let class_name = interp
                            .heap
                            .get(*id)
                            .map_or_else(String::new, |obj| obj.class.name.clone());
                        let info = interp
                            .call_method_by_name(*id, "__debugInfo", Vec::new())?
                            .deref();
                        if let Value::Array(array) = info {
                            out.extend_from_slice(
                                format!("object({class_name}){id} ({}) {{\n", array.len()).as_bytes(),
                            );
                            for (key, element) in array.iter() {
                                pad(&mut out, 1);
                                out.extend_from_slice(format!("[{}]=>\n", key.display()).as_bytes());
                                pad(&mut out, 1);
                                dump_value(interp, &element.clone().deref(), 1, &mut out);
                            }
                            out.extend_from_slice(b"}\n");
                            true
                        } else {
                            false
                        }
                    } else {
                        false
                    }
                }
                _ => false,
            };
            if !dumped {
                dump_value(interp, &value, 0, &mut out);
            }
        }
        interp.output.write(&out);
        Ok(Value::Null)
    });

    interp.register_builtin("print_r", |interp, args| {
        let mut out = Vec::new();
        print_r_value(interp, &arg(&args, 0), 0, &mut out);
        if arg(&args, 1).truthy() {
            Ok(Value::str(out))
        } else {
            interp.output.write(&out);
            Ok(Value::Bool(true))
        }
    });

    interp.register_builtin("var_export", |interp, args| {
        let mut out = Vec::new();
        export_value(interp, &arg(&args, 0), 0, &mut out);
        if arg(&args, 1).truthy() {
            Ok(Value::str(out))
        } else {
            interp.output.write(&out);
            Ok(Value::Null)
        }
    });
}

/// Shortest-roundtrip float rendering used by dumps (the language prints
/// floats at full precision there, unlike string coercion).
fn dump_float(f: f64) -> String {
    if f.is_nan() {
        return "NAN".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF".to_owned() } else { "-INF".to_owned() };
    }
    let mut buffer = ryu::Buffer::new();
    let text = buffer.format(f);
    text.strip_suffix(".0").unwrap_or(text).to_owned()
}

fn pad(out: &mut Vec<u8>, depth: usize) {
    for _ in 0..depth {
        out.extend_from_slice(b"  ");
    }
}

fn dump_value(interp: &Interpreter, value: &Value, depth: usize, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"NULL\n"),
        Value::Bool(b) => {
            out.extend_from_slice(format!("bool({})\n", if *b { "true" } else { "false" }).as_bytes());
        }
        Value::Int(i) => out.extend_from_slice(format!("int({i})\n").as_bytes()),
        Value::Float(f) => out.extend_from_slice(format!("float({})\n", dump_float(*f)).as_bytes()),
        Value::Str(s) => {
            out.extend_from_slice(format!("string({}) \"", s.len()).as_bytes());
            out.extend_from_slice(s);
            out.extend_from_slice(b"\"\n");
        }
        Value::Array(array) => {
            out.extend_from_slice(format!("array({}) {{\n", array.len()).as_bytes());
            for (key, element) in array.iter() {
                pad(out, depth + 1);
                match key {
                    ArrayKey::Int(i) => out.extend_from_slice(format!("[{i}]=>\n").as_bytes()),
                    ArrayKey::Str(s) => {
                        out.extend_from_slice(b"[\"");
                        out.extend_from_slice(s);
                        out.extend_from_slice(b"\"]=>\n");
                    }
                }
                pad(out, depth + 1);
                dump_value(interp, &element.clone().deref(), depth + 1, out);
            }
            pad(out, depth);
            out.extend_from_slice(b"}\n");
        }
        Value::Object(id) => match interp.heap.get(*id) {
            Some(obj) => {
                out.extend_from_slice(
                    format!("object({}){} ({}) {{\n", obj.class.name, id, obj.props.len()).as_bytes(),
                );
                for (name, element) in &obj.props {
                    pad(out, depth + 1);
                    out.extend_from_slice(format!("[\"{name}\"]=>\n").as_bytes());
                    pad(out, depth + 1);
                    dump_value(interp, &element.clone().deref(), depth + 1, out);
                }
                pad(out, depth);
                out.extend_from_slice(b"}\n");
            }
            None => out.extend_from_slice(b"NULL\n"),
        },
        Value::Closure(_) => out.extend_from_slice(b"object(Closure)#0 (0) {\n}\n"),
        Value::Builtin(b) => {
            out.extend_from_slice(format!("object(Closure)#0 (1) {{ [\"function\"]=> \"{}\" }}\n", b.name).as_bytes());
        }
        Value::Generator(_) => out.extend_from_slice(b"object(Generator)#0 (0) {\n}\n"),
        Value::Resource(r) => {
            out.extend_from_slice(format!("resource({}) of type ({})\n", r.id, r.kind).as_bytes());
        }
        Value::Ref(slot) => dump_value(interp, &slot.borrow().clone(), depth, out),
    }
}

fn print_r_value(interp: &Interpreter, value: &Value, depth: usize, out: &mut Vec<u8>) {
    match value {
        Value::Array(array) => {
            out.extend_from_slice(b"Array\n");
            pad(out, depth);
            out.extend_from_slice(b"(\n");
            for (key, element) in array.iter() {
                pad(out, depth + 1);
                out.extend_from_slice(b"  [");
                match key {
                    ArrayKey::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
                    ArrayKey::Str(s) => out.extend_from_slice(s),
                }
                out.extend_from_slice(b"] => ");
                print_r_value(interp, &element.clone().deref(), depth + 2, out);
                out.push(b'\n');
            }
            pad(out, depth);
            out.extend_from_slice(b")\n");
        }
        Value::Object(id) => match interp.heap.get(*id) {
            Some(obj) => {
                out.extend_from_slice(format!("{} Object\n", obj.class.name).as_bytes());
                pad(out, depth);
                out.extend_from_slice(b"(\n");
                for (name, element) in &obj.props {
                    pad(out, depth + 1);
                    out.extend_from_slice(format!("  [{name}] => ").as_bytes());
                    print_r_value(interp, &element.clone().deref(), depth + 2, out);
                    out.push(b'\n');
                }
                pad(out, depth);
                out.extend_from_slice(b")\n");
            }
            None => {}
        },
        Value::Float(f) => out.extend_from_slice(dump_float(*f).as_bytes()),
        Value::Ref(slot) => print_r_value(interp, &slot.borrow().clone(), depth, out),
        other => out.extend_from_slice(&other.to_bytes_lossy()),
    }
}

fn export_value(interp: &Interpreter, value: &Value, depth: usize, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"NULL"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Value::Float(f) => out.extend_from_slice(dump_float(*f).as_bytes()),
        Value::Str(s) => {
            out.push(b'\'');
            for &byte in s.iter() {
                if byte == b'\'' || byte == b'\\' {
                    out.push(b'\\');
                }
                out.push(byte);
            }
            out.push(b'\'');
        }
        Value::Array(array) => {
            out.extend_from_slice(b"array (\n");
            for (key, element) in array.iter() {
                pad(out, depth + 1);
                match key {
                    ArrayKey::Int(i) => out.extend_from_slice(format!("{i} => ").as_bytes()),
                    ArrayKey::Str(s) => {
                        out.push(b'\'');
                        out.extend_from_slice(s);
                        out.extend_from_slice(b"' => ");
                    }
                }
                export_value(interp, &element.clone().deref(), depth + 1, out);
                out.extend_from_slice(b",\n");
            }
            pad(out, depth);
            out.push(b')');
        }
        Value::Ref(slot) => export_value(interp, &slot.borrow().clone(), depth, out),
        other => out.extend_from_slice(&other.to_bytes_lossy()),
    }
}
