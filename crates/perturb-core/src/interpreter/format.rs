//! `str()` / `repr()` of runtime values and the format mini-language used by
//! f-strings, `format()`, `str.format` and `%` interpolation.

use std::rc::Rc;

use num_traits::{Signed, ToPrimitive};

use super::errors::{ExceptionKind, PyException};
use super::ops::{int_from_float, to_float};
use super::value::Value;
use crate::ast::literal::{float_repr, str_repr};

pub fn repr(value: &Value) -> String {
    let mut out = String::new();
    write_repr(value, &mut out, &mut Vec::new());
    out
}

pub fn to_str(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        Value::Exception(e) => exception_message(e.kind, &e.args),
        other => repr(other),
    }
}

/// `str(e)` for an exception built from `args`
pub fn exception_message(kind: ExceptionKind, args: &[Value]) -> String {
    match args {
        [] => String::new(),
        [single] if kind == ExceptionKind::KeyError => repr(single),
        [single] => to_str(single),
        many => repr(&Value::tuple(many.to_vec())),
    }
}

fn container_id<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

fn write_items(items: &[Value], out: &mut String, seen: &mut Vec<usize>) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_repr(item, out, seen);
    }
}

fn write_repr(value: &Value, out: &mut String, seen: &mut Vec<usize>) {
    match value {
        Value::None => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Long(n) => out.push_str(&n.to_string()),
        Value::Float(f) => out.push_str(&float_repr(*f)),
        Value::Str(s) => out.push_str(&str_repr(s)),
        Value::List(items) => {
            let id = container_id(items);
            if seen.contains(&id) {
                out.push_str("[...]");
                return;
            }
            seen.push(id);
            out.push('[');
            write_items(&items.borrow(), out, seen);
            out.push(']');
            seen.pop();
        }
        Value::Tuple(items) => {
            out.push('(');
            write_items(items, out, seen);
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Value::Dict(dict) => {
            let id = container_id(dict);
            if seen.contains(&id) {
                out.push_str("{...}");
                return;
            }
            seen.push(id);
            out.push('{');
            for (i, (key, value)) in dict.borrow().items().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(key, out, seen);
                out.push_str(": ");
                write_repr(value, out, seen);
            }
            out.push('}');
            seen.pop();
        }
        Value::Set(set) => {
            let values = set.borrow().values();
            if values.is_empty() {
                out.push_str("set()");
            } else {
                out.push('{');
                write_items(&values, out, seen);
                out.push('}');
            }
        }
        Value::DictView(view) => {
            out.push_str(view.kind.type_name());
            let id = container_id(&view.dict);
            if seen.contains(&id) {
                out.push_str("(...)");
                return;
            }
            seen.push(id);
            out.push_str("([");
            write_items(&view.items(), out, seen);
            out.push_str("])");
            seen.pop();
        }
        Value::Range(range) => {
            if range.step == 1 {
                out.push_str(&format!("range({}, {})", range.start, range.stop));
            } else {
                out.push_str(&format!(
                    "range({}, {}, {})",
                    range.start, range.stop, range.step
                ));
            }
        }
        Value::Iterator(state) => {
            out.push_str(&format!("<{} object>", state.borrow().label));
        }
        Value::Function(f) => out.push_str(&format!("<function {}>", f.name)),
        Value::Builtin(name) => {
            let short = name.rsplit('.').next().unwrap_or(name);
            out.push_str(&format!("<built-in function {short}>"));
        }
        Value::BoundMethod(method) => out.push_str(&format!(
            "<built-in method {} of {} object>",
            method.name,
            method.receiver.type_name()
        )),
        Value::MethodDescriptor(owner, name) => out.push_str(&format!(
            "<method '{}' of '{}' objects>",
            name,
            owner.name()
        )),
        Value::Type(kind) => out.push_str(&format!("<class '{}'>", kind.name())),
        Value::ExceptionType(kind) => out.push_str(&format!("<class '{}'>", kind.name())),
        Value::Exception(e) => {
            out.push_str(e.kind.name());
            out.push('(');
            write_items(&e.args, out, seen);
            out.push(')');
        }
        Value::Module(module) => out.push_str(&format!("<module '{}' (built-in)>", module.name)),
    }
}

/// Parsed `[[fill]align][sign][#][0][width][,|_][.precision][type]`
#[derive(Debug, Default, Clone, PartialEq)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn bad_spec(spec: &str) -> PyException {
    PyException::value_error(format!("Invalid format specifier '{spec}'"))
}

fn parse_spec(spec: &str) -> Result<FormatSpec, PyException> {
    let chars: Vec<char> = spec.chars().collect();
    let mut parsed = FormatSpec::default();
    let mut i = 0;

    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        parsed.fill = Some(chars[0]);
        parsed.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        parsed.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c @ ('+' | '-' | ' ')) = chars.get(i) {
        parsed.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'#') {
        parsed.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        parsed.zero = true;
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > start {
        let digits: String = chars[start..i].iter().collect();
        parsed.width = digits.parse().map_err(|_| bad_spec(spec))?;
    }
    if let Some(&c @ (',' | '_')) = chars.get(i) {
        parsed.grouping = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(bad_spec(spec));
        }
        let digits: String = chars[start..i].iter().collect();
        parsed.precision = Some(digits.parse().map_err(|_| bad_spec(spec))?);
    }
    if let Some(&c) = chars.get(i) {
        parsed.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(bad_spec(spec));
    }
    Ok(parsed)
}

fn group_digits(digits: &str, separator: char) -> String {
    let (int_part, rest) = match digits.find('.') {
        Some(pos) => digits.split_at(pos),
        None => (digits, ""),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(c);
    }
    grouped.push_str(rest);
    grouped
}

/// `%e`-style exponent with at least two digits
fn exponent_form(value: f64, precision: usize, upper: bool) -> String {
    let formatted = format!("{:.*e}", precision, value);
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{sign}{:02}", exponent.abs())
}

fn general_form(value: f64, precision: usize, alternate: bool) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let precision = precision.max(1);
    let exponent = value.abs().log10().floor() as i32;
    let formatted = if exponent >= -4 && exponent < precision as i32 {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        format!("{:.*}", decimals, value)
    } else {
        exponent_form(value, precision - 1, false)
    };
    if alternate {
        return formatted;
    }
    match formatted.split_once('e') {
        Some((mantissa, exp)) => {
            let mantissa = strip_fraction_zeros(mantissa);
            format!("{mantissa}e{exp}")
        }
        None => strip_fraction_zeros(&formatted),
    }
}

fn strip_fraction_zeros(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

fn float_body(value: f64, spec: &FormatSpec, kind: Option<char>) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return "inf".to_string();
    }
    let value = value.abs();
    match kind {
        Some('f' | 'F') => format!("{:.*}", spec.precision.unwrap_or(6), value),
        Some('e' | 'E') => exponent_form(value, spec.precision.unwrap_or(6), kind == Some('E')),
        Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), value * 100.0),
        Some('g' | 'G') => general_form(value, spec.precision.unwrap_or(6), spec.alternate),
        _ => match spec.precision {
            Some(precision) => general_form(value, precision, spec.alternate),
            None => float_repr(value),
        },
    }
}

fn pad(body: String, sign: &str, spec: &FormatSpec, default_align: char) -> String {
    let len = body.chars().count() + sign.chars().count();
    let (fill, align) = if spec.zero && spec.align.is_none() {
        ('0', '=')
    } else {
        (spec.fill.unwrap_or(' '), spec.align.unwrap_or(default_align))
    };
    if len >= spec.width {
        return format!("{sign}{body}");
    }
    let padding = spec.width - len;
    let fill_str = |n: usize| fill.to_string().repeat(n);
    match align {
        '<' => format!("{sign}{body}{}", fill_str(padding)),
        '^' => format!(
            "{}{sign}{body}{}",
            fill_str(padding / 2),
            fill_str(padding - padding / 2)
        ),
        '=' => format!("{sign}{}{body}", fill_str(padding)),
        _ => format!("{}{sign}{body}", fill_str(padding)),
    }
}

/// `format(value, spec)`
pub fn format_value(value: &Value, spec: &str) -> Result<String, PyException> {
    if spec.is_empty() {
        return Ok(to_str(value));
    }
    let parsed = parse_spec(spec)?;

    let number_sign = |negative: bool| -> String {
        match (negative, parsed.sign) {
            (true, _) => "-".to_string(),
            (false, Some('+')) => "+".to_string(),
            (false, Some(' ')) => " ".to_string(),
            _ => String::new(),
        }
    };

    match value {
        Value::Int(_) | Value::Bool(_) | Value::Long(_)
            if !matches!(
                parsed.kind,
                Some('f' | 'F' | 'e' | 'E' | 'g' | 'G' | '%')
            ) =>
        {
            let number = value.as_bigint().unwrap_or_default();
            if matches!(value, Value::Bool(_)) && parsed.kind.is_none() {
                return Ok(pad(to_str(value), "", &parsed, '<'));
            }
            let magnitude = number.magnitude();
            let mut body = match parsed.kind {
                None | Some('d' | 'n') => magnitude.to_string(),
                Some('b') => magnitude.to_str_radix(2),
                Some('o') => magnitude.to_str_radix(8),
                Some('x') => magnitude.to_str_radix(16),
                Some('X') => magnitude.to_str_radix(16).to_uppercase(),
                Some('c') => {
                    let c = number
                        .to_u32()
                        .and_then(char::from_u32)
                        .ok_or_else(|| PyException::new(ExceptionKind::OverflowError, "%c arg not in range(0x110000)"))?;
                    return Ok(pad(c.to_string(), "", &parsed, '<'));
                }
                Some(_) => return Err(unknown_format(parsed.kind, value)),
            };
            if let Some(separator) = parsed.grouping {
                body = group_digits(&body, separator);
            }
            let mut sign = number_sign(number.is_negative());
            if parsed.alternate {
                match parsed.kind {
                    Some('b') => sign.push_str("0b"),
                    Some('o') => sign.push_str("0o"),
                    Some('x') => sign.push_str("0x"),
                    Some('X') => sign.push_str("0X"),
                    _ => {}
                }
            }
            Ok(pad(body, &sign, &parsed, '>'))
        }
        Value::Int(_) | Value::Bool(_) | Value::Long(_) | Value::Float(_) => {
            let number = to_float(value)?.unwrap_or(0.0);
            if !matches!(
                parsed.kind,
                None | Some('f' | 'F' | 'e' | 'E' | 'g' | 'G' | '%' | 'n')
            ) {
                return Err(unknown_format(parsed.kind, value));
            }
            let kind = if parsed.kind == Some('n') {
                Some('g')
            } else {
                parsed.kind
            };
            let mut body = float_body(number, &parsed, kind);
            if kind == Some('F') || kind == Some('G') || kind == Some('E') {
                body = body.to_uppercase();
            }
            if let Some(separator) = parsed.grouping {
                body = group_digits(&body, separator);
            }
            let sign = number_sign(number.is_sign_negative() && !number.is_nan());
            Ok(pad(body, &sign, &parsed, '>'))
        }
        Value::Str(s) => {
            if !matches!(parsed.kind, None | Some('s')) {
                return Err(unknown_format(parsed.kind, value));
            }
            let mut body = s.to_string();
            if let Some(precision) = parsed.precision {
                body = body.chars().take(precision).collect();
            }
            Ok(pad(body, "", &parsed, '<'))
        }
        other => {
            if parsed.kind.is_some() {
                return Err(unknown_format(parsed.kind, other));
            }
            Ok(pad(to_str(other), "", &parsed, '<'))
        }
    }
}

fn unknown_format(kind: Option<char>, value: &Value) -> PyException {
    PyException::value_error(format!(
        "Unknown format code '{}' for object of type '{}'",
        kind.unwrap_or(' '),
        value.type_name()
    ))
}

/// `template.format(*args, **kwargs)`
pub fn str_format(
    template: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<String, PyException> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto_index = 0;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(PyException::value_error(
                    "Single '}' encountered in format string",
                ))
            }
            '{' => {
                let mut field = String::new();
                let mut depth = 1;
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    field.push(c);
                }
                if depth != 0 {
                    return Err(PyException::value_error(
                        "expected '}' before end of string",
                    ));
                }

                let (name_and_conversion, spec) = match field.split_once(':') {
                    Some((head, spec)) => (head, spec),
                    None => (field.as_str(), ""),
                };
                let (name, conversion) = match name_and_conversion.split_once('!') {
                    Some((name, conversion)) => (name, conversion.chars().next()),
                    None => (name_and_conversion, None),
                };

                let value = if name.is_empty() {
                    let value = args.get(auto_index).cloned();
                    auto_index += 1;
                    value.ok_or_else(|| {
                        PyException::index_error(format!(
                            "Replacement index {} out of range for positional args tuple",
                            auto_index - 1
                        ))
                    })?
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).cloned().ok_or_else(|| {
                        PyException::index_error(format!(
                            "Replacement index {index} out of range for positional args tuple"
                        ))
                    })?
                } else {
                    kwargs
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| PyException::key_error(Value::str(name)))?
                };

                let converted = match conversion {
                    Some('r') => Value::str(repr(&value)),
                    Some('s') => Value::str(to_str(&value)),
                    _ => value,
                };
                out.push_str(&format_value(&converted, spec)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// `template % values`
pub fn percent_format(template: &str, values: &Value) -> Result<String, PyException> {
    let args: Vec<Value> = match values {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mut args = args.into_iter();
    let mut out = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = String::new();
        let mut kind = None;
        for c in chars.by_ref() {
            if c.is_ascii_alphabetic() || c == '%' {
                kind = Some(c);
                break;
            }
            spec.push(c);
        }
        let kind = kind.ok_or_else(|| PyException::value_error("incomplete format"))?;
        if kind == '%' {
            out.push('%');
            continue;
        }
        let value = args.next().ok_or_else(|| {
            PyException::type_error("not enough arguments for format string")
        })?;

        // printf flags map onto the format mini-language
        let mut mini = String::new();
        let mut rest = spec.as_str();
        if let Some(stripped) = rest.strip_prefix('-') {
            mini.push('<');
            rest = stripped;
        }
        mini.push_str(rest);
        let rendered = match kind {
            's' => format_value(&Value::str(to_str(&value)), &mini)?,
            'r' => format_value(&Value::str(repr(&value)), &mini)?,
            'd' | 'i' | 'u' => {
                let number = match &value {
                    Value::Float(f) => int_from_float(*f)?,
                    other => other.clone(),
                };
                format_value(&number, &format!("{mini}d"))?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x' | 'X' | 'o' | 'c' => {
                format_value(&value, &format!("{mini}{kind}"))?
            }
            other => {
                return Err(PyException::value_error(format!(
                    "unsupported format character '{other}'"
                )))
            }
        };
        out.push_str(&rendered);
    }

    if args.next().is_some() && matches!(values, Value::Tuple(_)) {
        return Err(PyException::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_containers() {
        let nested = Value::list(vec![
            Value::Int(1),
            Value::str("a"),
            Value::tuple(vec![Value::Float(2.0)]),
            Value::None,
        ]);
        assert_eq!(repr(&nested), "[1, 'a', (2.0,), None]");
        assert_eq!(repr(&Value::tuple(vec![])), "()");
        assert_eq!(
            repr(&Value::set(super::super::value::Set::new())),
            "set()"
        );
    }

    #[test]
    fn test_format_spec() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&Value::Int(42), "05d").unwrap(), "00042");
        assert_eq!(format_value(&Value::Int(-42), "5").unwrap(), "  -42");
        assert_eq!(format_value(&Value::str("ab"), ">4").unwrap(), "  ab");
        assert_eq!(format_value(&Value::str("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_value(&Value::Int(255), "#x").unwrap(), "0xff");
        assert_eq!(format_value(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::Float(0.5), ".1%").unwrap(), "50.0%");
        assert_eq!(format_value(&Value::Float(1234.5), "e").unwrap(), "1.234500e+03");
        assert_eq!(format_value(&Value::Int(10), "b").unwrap(), "1010");
        let big = Value::from_bigint(num_bigint::BigInt::from(1) << 64);
        assert_eq!(format_value(&big, "x").unwrap(), "10000000000000000");
        assert_eq!(format_value(&big, ",").unwrap(), "18,446,744,073,709,551,616");
    }

    #[test]
    fn test_str_format_and_percent() {
        let args = [Value::Int(1), Value::str("x")];
        assert_eq!(str_format("{} and {}", &args, &[]).unwrap(), "1 and x");
        assert_eq!(str_format("{1}{0}{{}}", &args, &[]).unwrap(), "x1{}");
        assert_eq!(
            str_format("{name!r:>5}", &[], &[("name".to_string(), Value::str("a"))]).unwrap(),
            "  'a'"
        );
        assert_eq!(
            percent_format("%d-%s-%.2f", &Value::tuple(vec![Value::Int(3), Value::str("b"), Value::Float(1.0)])).unwrap(),
            "3-b-1.00"
        );
        assert_eq!(percent_format("%5.1f%%", &Value::Float(2.25)).unwrap(), "  2.2%");
    }
}
