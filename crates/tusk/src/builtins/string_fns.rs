//! String builtins, byte-oriented like the language's own.

use crate::{
    builtins::{arg, arg_bytes, arg_int, opt_arg},
    exception::{ErrorKind, RunResult},
    interp::Interpreter,
    types::PhpArray,
    value::{Value, php_float_to_string},
};

pub(crate) fn register(interp: &mut Interpreter) {
    interp.register_builtin("strlen", |interp, args| {
        let bytes = arg_bytes(interp, &args, 0)?;
        Ok(Value::Int(bytes.len() as i64))
    });

    interp.register_builtin("strtoupper", |interp, args| {
        let mut bytes = arg_bytes(interp, &args, 0)?;
        bytes.make_ascii_uppercase();
        Ok(Value::str(bytes))
    });

    interp.register_builtin("strtolower", |interp, args| {
        let mut bytes = arg_bytes(interp, &args, 0)?;
        bytes.make_ascii_lowercase();
        Ok(Value::str(bytes))
    });

    interp.register_builtin("ucfirst", |interp, args| {
        let mut bytes = arg_bytes(interp, &args, 0)?;
        if let Some(first) = bytes.first_mut() {
            first.make_ascii_uppercase();
        }
        Ok(Value::str(bytes))
    });

    interp.register_builtin("lcfirst", |interp, args| {
        let mut bytes = arg_bytes(interp, &args, 0)?;
        if let Some(first) = bytes.first_mut() {
            first.make_ascii_lowercase();
        }
        Ok(Value::str(bytes))
    });

    interp.register_builtin("ucwords", |interp, args| {
        let mut bytes = arg_bytes(interp, &args, 0)?;
        let mut at_word_start = true;
        for byte in &mut bytes {
            if at_word_start {
                byte.make_ascii_uppercase();
            }
            at_word_start = matches!(byte, b' ' | b'\t' | b'\r' | b'\n');
        }
        Ok(Value::str(bytes))
    });

    interp.register_builtin("strrev", |interp, args| {
        let mut bytes = arg_bytes(interp, &args, 0)?;
        bytes.reverse();
        Ok(Value::str(bytes))
    });

    interp.register_builtin("substr", |interp, args| {
        let bytes = arg_bytes(interp, &args, 0)?;
        let (start, len) = clamp_range(
            bytes.len(),
            arg_int(&args, 1),
            opt_arg(&args, 2).filter(|v| !matches!(v, Value::Null)).map(|v| v.to_int_lossy()),
        );
        Ok(Value::str(bytes[start..start + len].to_vec()))
    });

    interp.register_builtin("strpos", |interp, args| {
        let haystack = arg_bytes(interp, &args, 0)?;
        let needle = arg_bytes(interp, &args, 1)?;
        let offset = arg_int(&args, 2).max(0) as usize;
        Ok(match find_bytes(&haystack, &needle, offset) {
            Some(at) => Value::Int(at as i64),
            None => Value::Bool(false),
        })
    });

    interp.register_builtin("strrpos", |interp, args| {
        let haystack = arg_bytes(interp, &args, 0)?;
        let needle = arg_bytes(interp, &args, 1)?;
        if needle.is_empty() || needle.len() > haystack.len() {
            return Ok(Value::Bool(false));
        }
        let found = (0..=haystack.len() - needle.len())
            .rev()
            .find(|&i| haystack[i..].starts_with(&needle));
        Ok(match found {
            Some(at) => Value::Int(at as i64),
            None => Value::Bool(false),
        })
    });

    interp.register_builtin("str_contains", |interp, args| {
        let haystack = arg_bytes(interp, &args, 0)?;
        let needle = arg_bytes(interp, &args, 1)?;
        Ok(Value::Bool(needle.is_empty() || find_bytes(&haystack, &needle, 0).is_some()))
    });

    interp.register_builtin("str_starts_with", |interp, args| {
        let haystack = arg_bytes(interp, &args, 0)?;
        let needle = arg_bytes(interp, &args, 1)?;
        Ok(Value::Bool(haystack.starts_with(&needle)))
    });

    interp.register_builtin("str_ends_with", |interp, args| {
        let haystack = arg_bytes(interp, &args, 0)?;
        let needle = arg_bytes(interp, &args, 1)?;
        Ok(Value::Bool(haystack.ends_with(&needle)))
    });

    interp.register_builtin("str_replace", |interp, args| {
        let subject = arg_bytes(interp, &args, 2)?;
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = match (arg(&args, 0), arg(&args, 1)) {
            (Value::Array(searches), Value::Array(replacements)) => {
                let replacement_values: Vec<Value> =
                    replacements.values().cloned().collect();
                searches
                    .values()
                    .enumerate()
                    .map(|(i, search)| {
                        let replacement = replacement_values
                            .get(i)
                            .cloned()
                            .unwrap_or_else(|| Value::str(""));
                        (search.to_bytes_lossy(), replacement.to_bytes_lossy())
                    })
                    .collect()
            }
            (Value::Array(searches), replacement) => {
                let replacement = replacement.to_bytes_lossy();
                searches
                    .values()
                    .map(|search| (search.to_bytes_lossy(), replacement.clone()))
                    .collect()
            }
            (search, replacement) => {
                vec![(search.to_bytes_lossy(), replacement.to_bytes_lossy())]
            }
        };
        let mut result = subject;
        for (search, replacement) in pairs {
            if search.is_empty() {
                continue;
            }
            result = replace_bytes(&result, &search, &replacement);
        }
        Ok(Value::str(result))
    });

    interp.register_builtin("str_repeat", |interp, args| {
        let bytes = arg_bytes(interp, &args, 0)?;
        let times = arg_int(&args, 1).max(0) as usize;
        Ok(Value::str(bytes.repeat(times)))
    });

    interp.register_builtin("str_pad", |interp, args| {
        let input = arg_bytes(interp, &args, 0)?;
        let target = arg_int(&args, 1).max(0) as usize;
        let pad = match opt_arg(&args, 2) {
            Some(value) => value.to_bytes_lossy(),
            None => b" ".to_vec(),
        };
        let mode = if args.len() > 3 { arg_int(&args, 3) } else { 1 };
        if target <= input.len() || pad.is_empty() {
            return Ok(Value::str(input));
        }
        let needed = target - input.len();
        let fill = |n: usize| -> Vec<u8> {
            pad.iter().copied().cycle().take(n).collect()
        };
        let out = match mode {
            0 => {
                let mut v = fill(needed);
                v.extend_from_slice(&input);
                v
            }
            2 => {
                let left = needed / 2;
                let mut v = fill(left);
                v.extend_from_slice(&input);
                v.extend(fill(needed - left));
                v
            }
            _ => {
                let mut v = input.clone();
                v.extend(fill(needed));
                v
            }
        };
        Ok(Value::str(out))
    });

    interp.register_builtin("trim", |interp, args| trim_impl(interp, &args, true, true));
    interp.register_builtin("ltrim", |interp, args| trim_impl(interp, &args, true, false));
    interp.register_builtin("rtrim", |interp, args| trim_impl(interp, &args, false, true));
    interp.register_builtin("chop", |interp, args| trim_impl(interp, &args, false, true));

    interp.register_builtin("implode", |interp, args| {
        // Both implode($glue, $array) and implode($array) are accepted.
        let (glue, array) = match (arg(&args, 0), arg(&args, 1)) {
            (Value::Array(array), _) => (Vec::new(), array),
            (glue, Value::Array(array)) => (glue.to_bytes_lossy(), array),
            _ => {
                return Err(interp.error(ErrorKind::TypeError, "implode(): Argument must be an array"));
            }
        };
        let mut out: Vec<u8> = Vec::new();
        for (index, value) in array.values().enumerate() {
            if index > 0 {
                out.extend_from_slice(&glue);
            }
            let bytes = interp.coerce_to_string(value.clone())?;
            out.extend_from_slice(&bytes);
        }
        Ok(Value::str(out))
    });
    interp.register_builtin("join", |interp, args| {
        let builtin = interp.builtins.get("implode").cloned().expect("implode registered");
        (builtin.func.clone())(interp, args)
    });

    interp.register_builtin("explode", |interp, args| {
        let delimiter = arg_bytes(interp, &args, 0)?;
        let subject = arg_bytes(interp, &args, 1)?;
        if delimiter.is_empty() {
            return Err(interp.error(ErrorKind::ValueError, "explode(): Argument #1 ($separator) cannot be empty"));
        }
        let limit = opt_arg(&args, 2).map_or(i64::MAX, |v| v.to_int_lossy());
        let mut parts: Vec<Vec<u8>> = Vec::new();
        let mut rest = &subject[..];
        loop {
            match find_bytes(rest, &delimiter, 0) {
                Some(at) if (parts.len() as i64) < limit - 1 || limit <= 0 => {
                    parts.push(rest[..at].to_vec());
                    rest = &rest[at + delimiter.len()..];
                }
                _ => {
                    parts.push(rest.to_vec());
                    break;
                }
            }
        }
        if limit < 0 {
            let keep = (parts.len() as i64 + limit).max(0) as usize;
            parts.truncate(keep);
        }
        Ok(Value::array(PhpArray::from_values(parts.into_iter().map(Value::str))))
    });

    interp.register_builtin("str_split", |interp, args| {
        let bytes = arg_bytes(interp, &args, 0)?;
        let size = opt_arg(&args, 1).map_or(1, |v| v.to_int_lossy());
        if size < 1 {
            return Err(interp.error(ErrorKind::ValueError, "str_split(): Argument #2 ($length) must be greater than 0"));
        }
        let chunks = bytes
            .chunks(size as usize)
            .map(|chunk| Value::str(chunk.to_vec()));
        Ok(Value::array(PhpArray::from_values(chunks)))
    });

    interp.register_builtin("ord", |interp, args| {
        let bytes = arg_bytes(interp, &args, 0)?;
        Ok(Value::Int(i64::from(bytes.first().copied().unwrap_or(0))))
    });

    interp.register_builtin("chr", |_, args| {
        let code = arg_int(&args, 0).rem_euclid(256);
        Ok(Value::str(vec![code as u8]))
    });

    interp.register_builtin("number_format", |interp, args| {
        let number = arg(&args, 0).to_float_lossy();
        let decimals = if args.len() > 1 { arg_int(&args, 1).max(0) as usize } else { 0 };
        let dec_point = match opt_arg(&args, 2) {
            Some(v) => v.to_bytes_lossy(),
            None => b".".to_vec(),
        };
        let thousands_sep = match opt_arg(&args, 3) {
            Some(v) => v.to_bytes_lossy(),
            None => b",".to_vec(),
        };
        let formatted = format!("{number:.decimals$}");
        let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), ""));
        let (sign, digits) = match int_part.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", int_part),
        };
        let mut grouped: Vec<u8> = Vec::new();
        for (i, byte) in digits.bytes().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.extend_from_slice(&thousands_sep);
            }
            grouped.push(byte);
        }
        let mut out = sign.as_bytes().to_vec();
        out.extend_from_slice(&grouped);
        if decimals > 0 {
            out.extend_from_slice(&dec_point);
            out.extend_from_slice(frac_part.as_bytes());
        }
        Ok(Value::str(out))
    });

    interp.register_builtin("sprintf", |interp, args| {
        let format = arg_bytes(interp, &args, 0)?;
        let rendered = format_string(interp, &format, &args[1.min(args.len())..])?;
        Ok(Value::str(rendered))
    });

    interp.register_builtin("printf", |interp, args| {
        let format = arg_bytes(interp, &args, 0)?;
        let rendered = format_string(interp, &format, &args[1.min(args.len())..])?;
        let len = rendered.len() as i64;
        interp.output.write(&rendered);
        Ok(Value::Int(len))
    });

    interp.register_builtin("strcmp", |interp, args| {
        let a = arg_bytes(interp, &args, 0)?;
        let b = arg_bytes(interp, &args, 1)?;
        Ok(Value::Int(match a.cmp(&b) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }))
    });

    interp.register_builtin("strcasecmp", |interp, args| {
        let a = arg_bytes(interp, &args, 0)?.to_ascii_lowercase();
        let b = arg_bytes(interp, &args, 1)?.to_ascii_lowercase();
        Ok(Value::Int(match a.cmp(&b) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }))
    });
}

fn trim_impl(interp: &mut Interpreter, args: &[Value], left: bool, right: bool) -> RunResult<Value> {
    let bytes = arg_bytes(interp, args, 0)?;
    let charlist = match opt_arg(args, 1) {
        Some(v) => v.to_bytes_lossy(),
        None => b" \t\n\r\0\x0B".to_vec(),
    };
    let is_trim = |b: &u8| charlist.contains(b);
    let start = if left { bytes.iter().take_while(|b| is_trim(b)).count() } else { 0 };
    let end = if right {
        bytes.len() - bytes[start..].iter().rev().take_while(|b| is_trim(b)).count()
    } else {
        bytes.len()
    };
    Ok(Value::str(bytes[start..end.max(start)].to_vec()))
}

fn clamp_range(len: usize, start: i64, length: Option<i64>) -> (usize, usize) {
    let len_i = len as i64;
    let mut start = if start < 0 { (len_i + start).max(0) } else { start.min(len_i) };
    start = start.clamp(0, len_i);
    let available = len_i - start;
    let take = match length {
        None => available,
        Some(n) if n < 0 => (available + n).max(0),
        Some(n) => n.min(available),
    };
    (start as usize, take as usize)
}

pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() || needle.len() > haystack.len() - from {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..].starts_with(needle))
}

fn replace_bytes(subject: &[u8], search: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(subject.len());
    let mut at = 0;
    while let Some(found) = find_bytes(subject, search, at) {
        out.extend_from_slice(&subject[at..found]);
        out.extend_from_slice(replacement);
        at = found + search.len();
    }
    out.extend_from_slice(&subject[at..]);
    out
}

/// `sprintf`-style formatting: `%[argnum$][flags][width][.precision]spec`.
fn format_string(
    interp: &mut Interpreter,
    format: &[u8],
    args: &[Value],
) -> RunResult<Vec<u8>> {
    let mut out = Vec::with_capacity(format.len());
    let mut next_arg = 0usize;
    let mut i = 0;
    while i < format.len() {
        if format[i] != b'%' {
            out.push(format[i]);
            i += 1;
            continue;
        }
        i += 1;
        if i >= format.len() {
            break;
        }
        if format[i] == b'%' {
            out.push(b'%');
            i += 1;
            continue;
        }
        // argnum$
        let mut arg_index = None;
        let digits_start = i;
        while i < format.len() && format[i].is_ascii_digit() {
            i += 1;
        }
        if i < format.len() && format[i] == b'$' && i > digits_start {
            let text = std::str::from_utf8(&format[digits_start..i]).unwrap_or("0");
            arg_index = text.parse::<usize>().ok().map(|n| n.saturating_sub(1));
            i += 1;
        } else {
            i = digits_start;
        }
        // flags
        let mut left_align = false;
        let mut zero_pad = false;
        let mut plus_sign = false;
        let mut pad_char = b' ';
        loop {
            match format.get(i) {
                Some(b'-') => left_align = true,
                Some(b'0') => zero_pad = true,
                Some(b'+') => plus_sign = true,
                Some(b' ') => pad_char = b' ',
                Some(b'\'') => {
                    i += 1;
                    pad_char = format.get(i).copied().unwrap_or(b' ');
                }
                _ => break,
            }
            i += 1;
        }
        if zero_pad {
            pad_char = b'0';
        }
        // width
        let width_start = i;
        while i < format.len() && format[i].is_ascii_digit() {
            i += 1;
        }
        let width: usize = std::str::from_utf8(&format[width_start..i])
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        // precision
        let mut precision = None;
        if format.get(i) == Some(&b'.') {
            i += 1;
            let prec_start = i;
            while i < format.len() && format[i].is_ascii_digit() {
                i += 1;
            }
            precision = std::str::from_utf8(&format[prec_start..i]).ok().and_then(|s| s.parse().ok());
        }
        let Some(&spec) = format.get(i) else { break };
        i += 1;

        let index = arg_index.unwrap_or_else(|| {
            let current = next_arg;
            next_arg += 1;
            current
        });
        let value = args.get(index).cloned().unwrap_or(Value::Null).deref();

        let mut rendered: Vec<u8> = match spec {
            b's' => {
                let mut bytes = interp.coerce_to_string(value)?;
                if let Some(p) = precision {
                    bytes.truncate(p);
                }
                bytes
            }
            b'd' | b'i' => {
                let n = value.to_int_lossy();
                let mut text = n.to_string();
                if plus_sign && n >= 0 {
                    text.insert(0, '+');
                }
                text.into_bytes()
            }
            b'u' => (value.to_int_lossy() as u64).to_string().into_bytes(),
            b'f' | b'F' => {
                let p = precision.unwrap_or(6);
                format!("{:.*}", p, value.to_float_lossy()).into_bytes()
            }
            b'e' | b'E' => {
                let p = precision.unwrap_or(6);
                let text = format!("{:.*e}", p, value.to_float_lossy());
                let text = if spec == b'E' { text.to_uppercase() } else { text };
                text.into_bytes()
            }
            b'g' | b'G' => php_float_to_string(value.to_float_lossy()).into_bytes(),
            b'x' => format!("{:x}", value.to_int_lossy()).into_bytes(),
            b'X' => format!("{:X}", value.to_int_lossy()).into_bytes(),
            b'o' => format!("{:o}", value.to_int_lossy()).into_bytes(),
            b'b' => format!("{:b}", value.to_int_lossy()).into_bytes(),
            b'c' => vec![value.to_int_lossy().rem_euclid(256) as u8],
            other => {
                return Err(interp.error(
                    ErrorKind::ValueError,
                    format!("Unknown format specifier \"{}\"", other as char),
                ));
            }
        };
        if rendered.len() < width {
            let padding = vec![pad_char; width - rendered.len()];
            if left_align {
                rendered.extend_from_slice(&padding);
            } else {
                let mut padded = padding;
                padded.extend_from_slice(&rendered);
                rendered = padded;
            }
        }
        out.extend_from_slice(&rendered);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_search() {
        assert_eq!(find_bytes(b"hello world", b"world", 0), Some(6));
        assert_eq!(find_bytes(b"hello", b"world", 0), None);
        assert_eq!(find_bytes(b"aaa", b"a", 1), Some(1));
    }

    #[test]
    fn substr_ranges() {
        assert_eq!(clamp_range(5, 1, None), (1, 4));
        assert_eq!(clamp_range(5, -2, None), (3, 2));
        assert_eq!(clamp_range(5, 0, Some(-1)), (0, 4));
        assert_eq!(clamp_range(5, 10, None), (5, 0));
    }
}
