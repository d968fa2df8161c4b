//! Attribute lookup and the methods of the built-in value types.

use std::rc::Rc;

use super::builtins::{arity, expect_int, Keywords};
use super::errors::{ExceptionKind, PyException};
use super::format::{repr, str_format};
use super::ops::{
    iterate, set_difference, set_difference_update, set_from, set_intersection,
    set_symmetric_difference_update, set_update, values_equal, SliceBounds,
};
use super::value::{BoundMethod, Dict, DictView, Set, TypeKind, Value, ViewKind};
use super::Interpreter;

const STR_METHODS: &[&str] = &[
    "capitalize", "casefold", "center", "count", "endswith", "find", "format", "index",
    "isalnum", "isalpha", "isdecimal", "isdigit", "islower", "isnumeric", "isspace", "isupper",
    "join", "ljust", "lower", "lstrip", "partition", "removeprefix", "removesuffix", "replace",
    "rfind", "rindex", "rjust", "rpartition", "rsplit", "rstrip", "split", "splitlines",
    "startswith", "strip", "swapcase", "title", "upper", "zfill",
];

const LIST_METHODS: &[&str] = &[
    "append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove", "reverse",
    "sort",
];

const TUPLE_METHODS: &[&str] = &["count", "index"];

const DICT_METHODS: &[&str] = &[
    "clear", "copy", "get", "items", "keys", "pop", "popitem", "setdefault", "update", "values",
];

const SET_METHODS: &[&str] = &[
    "add", "clear", "copy", "difference", "difference_update", "discard", "intersection",
    "intersection_update", "isdisjoint", "issubset", "issuperset", "pop", "remove",
    "symmetric_difference", "symmetric_difference_update", "union", "update",
];

pub fn has_method(kind: TypeKind, name: &str) -> bool {
    let methods: &[&str] = match kind {
        TypeKind::Str => STR_METHODS,
        TypeKind::List => LIST_METHODS,
        TypeKind::Tuple => TUPLE_METHODS,
        TypeKind::Dict => DICT_METHODS,
        TypeKind::Set => SET_METHODS,
        TypeKind::Float => &["is_integer"],
        TypeKind::Int | TypeKind::Bool => &["bit_length"],
        _ => &[],
    };
    methods.contains(&name)
}

fn expect_str<'v>(method: &str, value: &'v Value) -> Result<&'v str, PyException> {
    value.as_str().ok_or_else(|| {
        PyException::type_error(format!(
            "{method}() argument must be str, not {}",
            value.type_name()
        ))
    })
}

/// Optional `[start[, end]]` arguments of the search methods as a char range
fn search_window(args: &[Value], first: usize, len: usize) -> Result<(usize, usize), PyException> {
    let bounds =
        SliceBounds::from_values(args.get(first).cloned(), args.get(first + 1).cloned(), None)?;
    let (start, stop, _) = bounds.adjust(len)?;
    Ok((start.max(0) as usize, stop.max(0) as usize))
}

fn find_chars(haystack: &[char], needle: &[char], start: usize, end: usize, last: bool) -> Option<usize> {
    if start > haystack.len() || end < start || end - start < needle.len() {
        return None;
    }
    let candidates = start..=end - needle.len();
    let matches_at = |i: &usize| haystack[*i..*i + needle.len()] == *needle;
    if last {
        candidates.rev().find(matches_at)
    } else {
        candidates.into_iter().find(matches_at)
    }
}

fn count_chars(haystack: &[char], needle: &[char], start: usize, end: usize) -> usize {
    if needle.is_empty() {
        return if start <= end.min(haystack.len()) {
            end.min(haystack.len()) - start + 1
        } else {
            0
        };
    }
    let mut count = 0;
    let mut i = start;
    while i + needle.len() <= end {
        if haystack[i..i + needle.len()] == *needle {
            count += 1;
            i += needle.len();
        } else {
            i += 1;
        }
    }
    count
}

fn is_cased(c: char) -> bool {
    c.is_uppercase() || c.is_lowercase()
}

fn swap_case(c: char, out: &mut String) {
    if c.is_uppercase() {
        out.extend(c.to_lowercase());
    } else if c.is_lowercase() {
        out.extend(c.to_uppercase());
    } else {
        out.push(c);
    }
}

fn split_whitespace(text: &str, maxsplit: i64) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        if maxsplit >= 0 && parts.len() as i64 >= maxsplit {
            parts.push(Value::str(rest));
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        parts.push(Value::str(&rest[..end]));
        rest = rest[end..].trim_start();
    }
    parts
}

fn rsplit_whitespace(text: &str, maxsplit: i64) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = text.trim_end();
    while !rest.is_empty() {
        if maxsplit >= 0 && parts.len() as i64 >= maxsplit {
            parts.push(Value::str(rest));
            break;
        }
        let start = rest
            .rfind(char::is_whitespace)
            .map(|i| i + rest[i..].chars().next().map_or(1, char::len_utf8))
            .unwrap_or(0);
        parts.push(Value::str(&rest[start..]));
        rest = rest[..start].trim_end();
    }
    parts.reverse();
    parts
}

fn split_lines(text: &str, keepends: bool) -> Vec<Value> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}'
            | '\u{2029}' => {
                let mut ending = c.to_string();
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                    ending.push('\n');
                }
                if keepends {
                    current.push_str(&ending);
                }
                lines.push(Value::str(std::mem::take(&mut current)));
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        lines.push(Value::str(current));
    }
    lines
}

fn pad_text(method: &str, text: &str, args: &[Value]) -> Result<String, PyException> {
    arity(method, args, 1, 2)?;
    let width = expect_int(&args[0])?.max(0) as usize;
    let fill = match args.get(1) {
        None => ' ',
        Some(value) => {
            let fill = expect_str(method, value)?;
            let mut chars = fill.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(PyException::type_error(
                        "The fill character must be exactly one character long",
                    ))
                }
            }
        }
    };
    let len = text.chars().count();
    if len >= width {
        return Ok(text.to_string());
    }
    let margin = width - len;
    let (left, right) = match method {
        "ljust" => (0, margin),
        "rjust" => (margin, 0),
        _ => {
            let left = margin / 2 + (margin & width & 1);
            (left, margin - left)
        }
    };
    let fill = |n: usize| fill.to_string().repeat(n);
    Ok(format!("{}{text}{}", fill(left), fill(right)))
}

fn prefix_matches(
    method: &str,
    chars: &[char],
    pattern: &Value,
    at_end: bool,
) -> Result<bool, PyException> {
    match pattern {
        Value::Str(prefix) => {
            let prefix: Vec<char> = prefix.chars().collect();
            Ok(if at_end {
                chars.ends_with(&prefix)
            } else {
                chars.starts_with(&prefix)
            })
        }
        Value::Tuple(options) => {
            for option in options.iter() {
                if prefix_matches(method, chars, option, at_end)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(PyException::type_error(format!(
            "{method} first arg must be str or a tuple of str, not {}",
            other.type_name()
        ))),
    }
}

fn str_method(
    text: &Rc<str>,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, PyException> {
    let mut keywords = Keywords::new(name, kwargs);
    let value = match name {
        "upper" | "lower" | "casefold" | "swapcase" | "capitalize" | "title" => {
            keywords.finish()?;
            arity(name, &args, 0, 0)?;
            let converted = match name {
                "upper" => text.to_uppercase(),
                "lower" | "casefold" => text.to_lowercase(),
                "swapcase" => {
                    let mut out = String::with_capacity(text.len());
                    text.chars().for_each(|c| swap_case(c, &mut out));
                    out
                }
                "capitalize" => {
                    let mut chars = text.chars();
                    match chars.next() {
                        Some(first) => first
                            .to_uppercase()
                            .chain(chars.flat_map(char::to_lowercase))
                            .collect(),
                        None => String::new(),
                    }
                }
                _ => {
                    let mut out = String::with_capacity(text.len());
                    let mut previous_cased = false;
                    for c in text.chars() {
                        if previous_cased {
                            out.extend(c.to_lowercase());
                        } else {
                            out.extend(c.to_uppercase());
                        }
                        previous_cased = is_cased(c);
                    }
                    out
                }
            };
            Value::str(converted)
        }
        "strip" | "lstrip" | "rstrip" => {
            keywords.finish()?;
            arity(name, &args, 0, 1)?;
            let stripped = match args.first() {
                None | Some(Value::None) => match name {
                    "strip" => text.trim(),
                    "lstrip" => text.trim_start(),
                    _ => text.trim_end(),
                },
                Some(chars) => {
                    let chars: Vec<char> = expect_str(name, chars)?.chars().collect();
                    let strip = |c: char| chars.contains(&c);
                    match name {
                        "strip" => text.trim_matches(strip),
                        "lstrip" => text.trim_start_matches(strip),
                        _ => text.trim_end_matches(strip),
                    }
                }
            };
            Value::str(stripped)
        }
        "split" | "rsplit" => {
            let sep = keywords.take("sep");
            let maxsplit = keywords.take("maxsplit");
            keywords.finish()?;
            arity(name, &args, 0, 2)?;
            let sep = args.first().cloned().or(sep);
            let maxsplit = match args.get(1).cloned().or(maxsplit) {
                Some(value) => expect_int(&value)?,
                None => -1,
            };
            let parts = match sep {
                None | Some(Value::None) => {
                    if name == "split" {
                        split_whitespace(text, maxsplit)
                    } else {
                        rsplit_whitespace(text, maxsplit)
                    }
                }
                Some(sep) => {
                    let sep = expect_str(name, &sep)?;
                    if sep.is_empty() {
                        return Err(PyException::value_error("empty separator"));
                    }
                    match (name, maxsplit) {
                        (_, m) if m < 0 => text.split(sep).map(Value::str).collect(),
                        ("split", m) => text.splitn(m as usize + 1, sep).map(Value::str).collect(),
                        (_, m) => {
                            let mut parts: Vec<Value> =
                                text.rsplitn(m as usize + 1, sep).map(Value::str).collect();
                            parts.reverse();
                            parts
                        }
                    }
                }
            };
            Value::list(parts)
        }
        "splitlines" => {
            let keepends = keywords.take("keepends");
            keywords.finish()?;
            arity(name, &args, 0, 1)?;
            let keepends = args
                .first()
                .cloned()
                .or(keepends)
                .is_some_and(|flag| flag.is_truthy());
            Value::list(split_lines(text, keepends))
        }
        "join" => {
            keywords.finish()?;
            arity(name, &args, 1, 1)?;
            let items = iterate(&args[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return Err(PyException::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            Value::str(parts.join(text))
        }
        "replace" => {
            keywords.finish()?;
            arity(name, &args, 2, 3)?;
            let old = expect_str(name, &args[0])?;
            let new = expect_str(name, &args[1])?;
            let count = match args.get(2) {
                Some(count) => expect_int(count)?,
                None => -1,
            };
            if count < 0 {
                Value::str(text.replace(old, new))
            } else {
                Value::str(text.replacen(old, new, count as usize))
            }
        }
        "startswith" | "endswith" => {
            keywords.finish()?;
            arity(name, &args, 1, 3)?;
            let chars: Vec<char> = text.chars().collect();
            let (start, end) = search_window(&args, 1, chars.len())?;
            let window = if start <= end { &chars[start..end] } else { &chars[0..0] };
            Value::Bool(prefix_matches(name, window, &args[0], name == "endswith")?)
        }
        "find" | "rfind" | "index" | "rindex" | "count" => {
            keywords.finish()?;
            arity(name, &args, 1, 3)?;
            let needle: Vec<char> = expect_str(name, &args[0])?.chars().collect();
            let chars: Vec<char> = text.chars().collect();
            let (start, end) = search_window(&args, 1, chars.len())?;
            if name == "count" {
                return Ok(Value::Int(count_chars(&chars, &needle, start, end) as i64));
            }
            let last = name.starts_with('r');
            match find_chars(&chars, &needle, start, end, last) {
                Some(position) => Value::Int(position as i64),
                None if name.ends_with("find") => Value::Int(-1),
                None => return Err(PyException::value_error("substring not found")),
            }
        }
        "isdigit" | "isdecimal" | "isnumeric" | "isalpha" | "isalnum" | "isspace" => {
            keywords.finish()?;
            arity(name, &args, 0, 0)?;
            let test: fn(char) -> bool = match name {
                "isdigit" | "isdecimal" => |c| c.is_ascii_digit(),
                "isnumeric" => char::is_numeric,
                "isalpha" => char::is_alphabetic,
                "isalnum" => char::is_alphanumeric,
                _ => char::is_whitespace,
            };
            Value::Bool(!text.is_empty() && text.chars().all(test))
        }
        "isupper" | "islower" => {
            keywords.finish()?;
            arity(name, &args, 0, 0)?;
            let has_cased = text.chars().any(is_cased);
            let all_match = if name == "isupper" {
                !text.chars().any(char::is_lowercase)
            } else {
                !text.chars().any(char::is_uppercase)
            };
            Value::Bool(has_cased && all_match)
        }
        "zfill" => {
            keywords.finish()?;
            arity(name, &args, 1, 1)?;
            let width = expect_int(&args[0])?.max(0) as usize;
            let len = text.chars().count();
            if len >= width {
                Value::Str(text.clone())
            } else {
                let zeros = "0".repeat(width - len);
                let (sign, digits) = match text.chars().next() {
                    Some(c @ ('+' | '-')) => (c.to_string(), &text[1..]),
                    _ => (String::new(), &text[..]),
                };
                Value::str(format!("{sign}{zeros}{digits}"))
            }
        }
        "center" | "ljust" | "rjust" => {
            keywords.finish()?;
            Value::str(pad_text(name, text, &args)?)
        }
        "format" => Value::str(str_format(text, &args, &keywords.drain())?),
        "partition" | "rpartition" => {
            keywords.finish()?;
            arity(name, &args, 1, 1)?;
            let sep = expect_str(name, &args[0])?;
            if sep.is_empty() {
                return Err(PyException::value_error("empty separator"));
            }
            let found = if name == "partition" {
                text.find(sep)
            } else {
                text.rfind(sep)
            };
            let parts = match found {
                Some(at) => [&text[..at], sep, &text[at + sep.len()..]],
                None if name == "partition" => [&text[..], "", ""],
                None => ["", "", &text[..]],
            };
            Value::tuple(parts.into_iter().map(Value::str).collect())
        }
        "removeprefix" | "removesuffix" => {
            keywords.finish()?;
            arity(name, &args, 1, 1)?;
            let affix = expect_str(name, &args[0])?;
            let trimmed = if name == "removeprefix" {
                text.strip_prefix(affix)
            } else {
                text.strip_suffix(affix)
            };
            Value::str(trimmed.unwrap_or(&text[..]))
        }
        other => return Err(PyException::attribute_error("str", other)),
    };
    Ok(value)
}

impl Interpreter {
    pub(crate) fn get_attribute(&self, receiver: &Value, attr: &str) -> Result<Value, PyException> {
        let value = match (receiver, attr) {
            (Value::Module(module), _) => {
                return module.attrs.get(attr).cloned().ok_or_else(|| {
                    PyException::new(
                        ExceptionKind::AttributeError,
                        format!("module '{}' has no attribute '{attr}'", module.name),
                    )
                })
            }
            (Value::Exception(object), "args") => Value::tuple(object.args.clone()),
            (Value::Int(_) | Value::Bool(_) | Value::Long(_), "real") => {
                Value::from_bigint(receiver.as_bigint().unwrap_or_default())
            }
            (Value::Int(_) | Value::Bool(_) | Value::Long(_), "imag") => Value::Int(0),
            (Value::Float(f), "real") => Value::Float(*f),
            (Value::Float(_), "imag") => Value::Float(0.0),
            (Value::Function(function), "__name__") => Value::str(function.name.as_str()),
            (Value::Type(kind), "__name__") => Value::str(kind.name()),
            (Value::ExceptionType(kind), "__name__") => Value::str(kind.name()),
            (Value::Type(kind), _) if has_method(*kind, attr) => {
                Value::MethodDescriptor(*kind, Rc::from(attr))
            }
            (Value::Type(kind), _) => {
                return Err(PyException::new(
                    ExceptionKind::AttributeError,
                    format!("type object '{}' has no attribute '{attr}'", kind.name()),
                ))
            }
            (other, _) if has_method(other.type_kind(), attr) => {
                Value::BoundMethod(Rc::new(BoundMethod {
                    receiver: other.clone(),
                    name: attr.to_string(),
                }))
            }
            (other, _) => return Err(PyException::attribute_error(other.type_name(), attr)),
        };
        Ok(value)
    }

    pub(crate) fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, PyException> {
        match receiver {
            Value::Str(text) => str_method(text, name, args, kwargs),
            Value::List(_) => self.list_method(receiver, name, args, kwargs),
            Value::Tuple(items) => {
                Keywords::new(name, kwargs).finish()?;
                sequence_search(name, "tuple", items, &args)
            }
            Value::Dict(_) => dict_method(receiver, name, args, kwargs),
            Value::Set(_) => set_method(receiver, name, args, kwargs),
            Value::Float(f) if name == "is_integer" => {
                arity(name, &args, 0, 0)?;
                Ok(Value::Bool(f.is_finite() && f.fract() == 0.0))
            }
            Value::Int(_) | Value::Bool(_) | Value::Long(_) if name == "bit_length" => {
                arity(name, &args, 0, 0)?;
                let bits = receiver.as_bigint().map_or(0, |number| number.bits());
                Ok(Value::Int(bits as i64))
            }
            other => Err(PyException::attribute_error(other.type_name(), name)),
        }
    }

    fn list_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, PyException> {
        let Value::List(items) = receiver else {
            return Err(PyException::attribute_error(receiver.type_name(), name));
        };
        let mut keywords = Keywords::new(name, kwargs);
        if name == "sort" {
            let key = keywords.take("key");
            let reverse = keywords.take("reverse");
            keywords.finish()?;
            if !args.is_empty() {
                return Err(PyException::type_error(
                    "sort() takes no positional arguments",
                ));
            }
            let current = items.borrow().clone();
            let reverse = reverse.is_some_and(|flag| flag.is_truthy());
            let sorted = self.sort_values(current, key, reverse)?;
            *items.borrow_mut() = sorted;
            return Ok(Value::None);
        }
        keywords.finish()?;

        let value = match name {
            "append" => {
                arity(name, &args, 1, 1)?;
                let mut args = args;
                items.borrow_mut().extend(args.pop());
                Value::None
            }
            "extend" => {
                arity(name, &args, 1, 1)?;
                let extra = iterate(&args[0])?;
                items.borrow_mut().extend(extra);
                Value::None
            }
            "insert" => {
                arity(name, &args, 2, 2)?;
                let index = expect_int(&args[0])?;
                let mut items = items.borrow_mut();
                let len = items.len() as i64;
                let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
                items.insert(at as usize, args[1].clone());
                Value::None
            }
            "pop" => {
                arity(name, &args, 0, 1)?;
                let index = match args.first() {
                    Some(index) => expect_int(index)?,
                    None => -1,
                };
                let mut items = items.borrow_mut();
                if items.is_empty() {
                    return Err(PyException::index_error("pop from empty list"));
                }
                let len = items.len() as i64;
                let at = if index < 0 { index + len } else { index };
                if at < 0 || at >= len {
                    return Err(PyException::index_error("pop index out of range"));
                }
                items.remove(at as usize)
            }
            "remove" => {
                arity(name, &args, 1, 1)?;
                let position = items.borrow().iter().position(|x| values_equal(x, &args[0]));
                match position {
                    Some(at) => {
                        items.borrow_mut().remove(at);
                    }
                    None => {
                        return Err(PyException::value_error("list.remove(x): x not in list"))
                    }
                }
                Value::None
            }
            "index" | "count" => {
                let snapshot = items.borrow().clone();
                return sequence_search(name, "list", &snapshot, &args);
            }
            "reverse" => {
                arity(name, &args, 0, 0)?;
                items.borrow_mut().reverse();
                Value::None
            }
            "clear" => {
                arity(name, &args, 0, 0)?;
                items.borrow_mut().clear();
                Value::None
            }
            "copy" => {
                arity(name, &args, 0, 0)?;
                Value::list(items.borrow().clone())
            }
            other => return Err(PyException::attribute_error("list", other)),
        };
        Ok(value)
    }
}

/// `index` and `count` shared by lists and tuples
fn sequence_search(
    name: &str,
    type_name: &str,
    items: &[Value],
    args: &[Value],
) -> Result<Value, PyException> {
    match name {
        "count" => {
            arity(name, args, 1, 1)?;
            let count = items.iter().filter(|x| values_equal(x, &args[0])).count();
            Ok(Value::Int(count as i64))
        }
        "index" => {
            arity(name, args, 1, 3)?;
            let (start, end) = search_window(args, 1, items.len())?;
            let end = end.min(items.len());
            let found = (start..end).find(|&i| values_equal(&items[i], &args[0]));
            match found {
                Some(position) => Ok(Value::Int(position as i64)),
                None if type_name == "list" => Err(PyException::value_error(format!(
                    "{} is not in list",
                    repr(&args[0])
                ))),
                None => Err(PyException::value_error(
                    "tuple.index(x): x not in tuple",
                )),
            }
        }
        other => Err(PyException::attribute_error(type_name, other)),
    }
}

fn dict_method(
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, PyException> {
    let Value::Dict(dict) = receiver else {
        return Err(PyException::attribute_error(receiver.type_name(), name));
    };
    let mut keywords = Keywords::new(name, kwargs);
    if name == "update" {
        arity(name, &args, 0, 1)?;
        let mut additions = match args.first() {
            Some(Value::Dict(other)) => other.borrow().items(),
            Some(pairs) => super::ops::dict_from_pairs(iterate(pairs)?)?.items(),
            None => Vec::new(),
        };
        for (key, value) in keywords.drain() {
            additions.push((Value::str(key), value));
        }
        let mut dict = dict.borrow_mut();
        for (key, value) in additions {
            dict.insert(key, value)?;
        }
        return Ok(Value::None);
    }
    keywords.finish()?;

    let value = match name {
        "get" => {
            arity(name, &args, 1, 2)?;
            let found = dict.borrow().get(&args[0])?;
            found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None))
        }
        "keys" | "values" | "items" => {
            arity(name, &args, 0, 0)?;
            let kind = match name {
                "keys" => ViewKind::Keys,
                "values" => ViewKind::Values,
                _ => ViewKind::Items,
            };
            Value::DictView(Rc::new(DictView {
                kind,
                dict: dict.clone(),
            }))
        }
        "pop" => {
            arity(name, &args, 1, 2)?;
            let removed = dict.borrow_mut().remove(&args[0])?;
            match (removed, args.get(1)) {
                (Some(value), _) => value,
                (None, Some(default)) => default.clone(),
                (None, None) => return Err(PyException::key_error(args[0].clone())),
            }
        }
        "setdefault" => {
            arity(name, &args, 1, 2)?;
            let existing = dict.borrow().get(&args[0])?;
            match existing {
                Some(value) => value,
                None => {
                    let default = args.get(1).cloned().unwrap_or(Value::None);
                    dict.borrow_mut().insert(args[0].clone(), default.clone())?;
                    default
                }
            }
        }
        "popitem" => {
            arity(name, &args, 0, 0)?;
            let last = dict.borrow_mut().pop_last();
            match last {
                Some((key, value)) => Value::tuple(vec![key, value]),
                None => {
                    return Err(PyException::key_error(Value::str(
                        "popitem(): dictionary is empty",
                    )))
                }
            }
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            dict.borrow_mut().clear();
            Value::None
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            let copied: Dict = dict.borrow().clone();
            Value::dict(copied)
        }
        other => return Err(PyException::attribute_error("dict", other)),
    };
    Ok(value)
}

fn set_method(
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, PyException> {
    let Value::Set(set) = receiver else {
        return Err(PyException::attribute_error(receiver.type_name(), name));
    };
    Keywords::new(name, kwargs).finish()?;
    let is_receiver = |arg: &Value| matches!(arg, Value::Set(other) if Rc::ptr_eq(other, set));

    let value = match name {
        "add" => {
            arity(name, &args, 1, 1)?;
            set.borrow_mut().add(args[0].clone())?;
            Value::None
        }
        "remove" => {
            arity(name, &args, 1, 1)?;
            if !set.borrow_mut().remove(&args[0])? {
                return Err(PyException::key_error(args[0].clone()));
            }
            Value::None
        }
        "discard" => {
            arity(name, &args, 1, 1)?;
            set.borrow_mut().remove(&args[0])?;
            Value::None
        }
        "pop" => {
            arity(name, &args, 0, 0)?;
            let popped = set.borrow_mut().pop();
            popped.ok_or_else(|| PyException::key_error(Value::str("pop from an empty set")))?
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            set.borrow_mut().clear();
            Value::None
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Value::set(set.borrow().copy())
        }
        "update" => {
            for arg in args.iter().filter(|&arg| !is_receiver(arg)) {
                set_update(&mut set.borrow_mut(), arg)?;
            }
            Value::None
        }
        "union" => {
            let mut result = set.borrow().copy();
            for arg in &args {
                set_update(&mut result, arg)?;
            }
            Value::set(result)
        }
        "intersection" | "intersection_update" => {
            let mut result: Option<Set> = None;
            for arg in &args {
                let next = match &result {
                    None if is_receiver(arg) => set.borrow().copy(),
                    None => set_intersection(&set.borrow(), arg)?,
                    Some(partial) => set_intersection(partial, arg)?,
                };
                result = Some(next);
            }
            let result = result.unwrap_or_else(|| set.borrow().copy());
            if name == "intersection" {
                Value::set(result)
            } else {
                set.borrow_mut().replace_entries(result);
                Value::None
            }
        }
        "difference" => {
            let mut result = match args.first() {
                Some(first) => set_difference(&set.borrow(), first)?,
                None => set.borrow().copy(),
            };
            for arg in args.iter().skip(1) {
                set_difference_update(&mut result, arg)?;
            }
            Value::set(result)
        }
        "difference_update" => {
            for arg in &args {
                if is_receiver(arg) {
                    set.borrow_mut().clear();
                } else {
                    set_difference_update(&mut set.borrow_mut(), arg)?;
                }
            }
            Value::None
        }
        "symmetric_difference" => {
            arity(name, &args, 1, 1)?;
            let mut result = set_from(&args[0])?;
            result.symmetric_difference_update(&set.borrow());
            Value::set(result)
        }
        "symmetric_difference_update" => {
            arity(name, &args, 1, 1)?;
            if is_receiver(&args[0]) {
                set.borrow_mut().clear();
            } else {
                set_symmetric_difference_update(&mut set.borrow_mut(), &args[0])?;
            }
            Value::None
        }
        "issubset" | "issuperset" | "isdisjoint" => {
            arity(name, &args, 1, 1)?;
            let other = set_from(&args[0])?;
            let mine = set.borrow();
            let result = match name {
                "issubset" => mine.is_subset(&other),
                "issuperset" => other.is_subset(&mine),
                _ => mine.intersection(&other).is_empty(),
            };
            Value::Bool(result)
        }
        other => return Err(PyException::attribute_error("set", other)),
    };
    Ok(value)
}
