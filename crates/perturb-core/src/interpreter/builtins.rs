//! Built-in functions, type constructors and importable modules.

use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, Zero};

use super::errors::{ExceptionKind, PyException};
use super::format::{format_value, repr, to_str};
use super::ops::{self, binary_op, dict_from_pairs, iterate, less_than};
use super::value::{Dict, HashKey, ModuleObject, Range, Set, TypeKind, Value};
use super::Interpreter;
use crate::ast::Operator;

pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "abs", "all", "any", "bin", "callable", "chr", "divmod", "enumerate", "filter", "format",
    "hash", "hex", "isinstance", "iter", "len", "map", "max", "min", "next", "oct", "ord",
    "pow", "print", "repr", "reversed", "round", "sorted", "sum", "zip",
];

const MATH_FUNCTIONS: &[&str] = &[
    "math.ceil", "math.comb", "math.exp", "math.fabs", "math.factorial", "math.floor",
    "math.gcd", "math.hypot", "math.isqrt", "math.lcm", "math.log", "math.log10", "math.log2",
    "math.pow", "math.prod", "math.sqrt", "math.trunc",
];

const FUNCTOOLS_FUNCTIONS: &[&str] = &["functools.reduce"];

/// Value of a name no program scope binds
pub fn builtin_value(name: &str) -> Option<Value> {
    if let Some(kind) = TypeKind::from_builtin_name(name) {
        return Some(Value::Type(kind));
    }
    if let Some(kind) = ExceptionKind::from_name(name) {
        return Some(Value::ExceptionType(kind));
    }
    BUILTIN_FUNCTIONS
        .iter()
        .find(|builtin| **builtin == name)
        .copied()
        .map(Value::Builtin)
}

pub fn builtins_module() -> Value {
    let mut attrs = IndexMap::new();
    for name in BUILTIN_FUNCTIONS.iter().copied() {
        attrs.insert(name.to_string(), Value::Builtin(name));
    }
    Value::Module(Rc::new(ModuleObject {
        name: "builtins".to_string(),
        attrs,
    }))
}

fn qualified_functions(functions: &'static [&'static str]) -> impl Iterator<Item = (String, Value)> {
    functions.iter().copied().map(|qualified| {
        let short = qualified.rsplit('.').next().unwrap_or(qualified);
        (short.to_string(), Value::Builtin(qualified))
    })
}

/// `import name`; only the modules benchmark solutions reach for exist
pub fn import_module(name: &str) -> Result<Value, PyException> {
    let mut attrs: IndexMap<String, Value> = IndexMap::new();
    match name {
        "math" => {
            attrs.extend(qualified_functions(MATH_FUNCTIONS));
            attrs.insert("pi".to_string(), Value::Float(std::f64::consts::PI));
            attrs.insert("e".to_string(), Value::Float(std::f64::consts::E));
            attrs.insert("tau".to_string(), Value::Float(std::f64::consts::TAU));
            attrs.insert("inf".to_string(), Value::Float(f64::INFINITY));
            attrs.insert("nan".to_string(), Value::Float(f64::NAN));
        }
        "functools" => attrs.extend(qualified_functions(FUNCTOOLS_FUNCTIONS)),
        "string" => {
            let lowercase = "abcdefghijklmnopqrstuvwxyz";
            let uppercase = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
            attrs.insert("ascii_lowercase".to_string(), Value::str(lowercase));
            attrs.insert("ascii_uppercase".to_string(), Value::str(uppercase));
            attrs.insert(
                "ascii_letters".to_string(),
                Value::str(format!("{lowercase}{uppercase}")),
            );
            attrs.insert("digits".to_string(), Value::str("0123456789"));
            attrs.insert(
                "punctuation".to_string(),
                Value::str("!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~"),
            );
        }
        // annotations only; generic aliases subscript to themselves
        "typing" => {
            for (alias, kind) in [
                ("List", TypeKind::List),
                ("Dict", TypeKind::Dict),
                ("Tuple", TypeKind::Tuple),
                ("Set", TypeKind::Set),
            ] {
                attrs.insert(alias.to_string(), Value::Type(kind));
            }
            for alias in [
                "Any", "Callable", "Iterable", "Iterator", "Optional", "Sequence", "Union",
                "FrozenSet", "Mapping",
            ] {
                attrs.insert(alias.to_string(), Value::Type(TypeKind::Object));
            }
        }
        "builtins" => return Ok(builtins_module()),
        other => {
            let top = other.split('.').next().unwrap_or(other);
            return Err(PyException::new(
                ExceptionKind::ModuleNotFoundError,
                format!("No module named '{top}'"),
            ));
        }
    }
    Ok(Value::Module(Rc::new(ModuleObject {
        name: name.to_string(),
        attrs,
    })))
}

/// Keyword arguments a builtin has not consumed yet
pub(crate) struct Keywords {
    function: String,
    entries: Vec<(String, Value)>,
}

impl Keywords {
    pub(crate) fn new(function: &str, entries: Vec<(String, Value)>) -> Self {
        Self {
            function: function.to_string(),
            entries,
        }
    }

    pub(crate) fn take(&mut self, key: &str) -> Option<Value> {
        let position = self.entries.iter().position(|(name, _)| name == key)?;
        Some(self.entries.remove(position).1)
    }

    pub(crate) fn drain(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.entries)
    }

    /// Fails on any keyword nobody asked for
    pub(crate) fn finish(self) -> Result<(), PyException> {
        match self.entries.first() {
            None => Ok(()),
            Some((key, _)) => Err(PyException::type_error(format!(
                "'{key}' is an invalid keyword argument for {}()",
                self.function
            ))),
        }
    }
}

pub(crate) fn arity(
    function: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), PyException> {
    let given = args.len();
    if given >= min && given <= max {
        return Ok(());
    }
    let message = if min == max {
        match min {
            0 => format!("{function}() takes no arguments ({given} given)"),
            1 => format!("{function}() takes exactly one argument ({given} given)"),
            n => format!("{function}() takes exactly {n} arguments ({given} given)"),
        }
    } else if given < min {
        let noun = if min == 1 { "argument" } else { "arguments" };
        format!("{function} expected at least {min} {noun}, got {given}")
    } else {
        let noun = if max == 1 { "argument" } else { "arguments" };
        format!("{function} expected at most {max} {noun}, got {given}")
    };
    Err(PyException::type_error(message))
}

fn not_an_integer(value: &Value) -> PyException {
    PyException::type_error(format!(
        "'{}' object cannot be interpreted as an integer",
        value.type_name()
    ))
}

pub(crate) fn expect_int(value: &Value) -> Result<i64, PyException> {
    if let Value::Long(_) = value {
        return Err(PyException::overflow(
            "Python int too large to convert to C ssize_t",
        ));
    }
    value.as_int().ok_or_else(|| not_an_integer(value))
}

fn expect_bigint(value: &Value) -> Result<BigInt, PyException> {
    value.as_bigint().ok_or_else(|| not_an_integer(value))
}

fn expect_float(function: &str, value: &Value) -> Result<f64, PyException> {
    ops::to_float(value)?.ok_or_else(|| {
        PyException::type_error(format!(
            "{function}() argument must be a real number, not '{}'",
            value.type_name()
        ))
    })
}

fn round_half_even(value: f64) -> f64 {
    let rounded = value.round();
    if (value - value.trunc()).abs() == 0.5 {
        2.0 * (value / 2.0).round()
    } else {
        rounded
    }
}

fn radix_string(value: &BigInt, prefix: &str, radix: u32) -> String {
    let sign = if value.is_negative() { "-" } else { "" };
    format!("{sign}{prefix}{}", value.magnitude().to_str_radix(radix))
}

/// `int(text, base)`
pub(crate) fn parse_int(text: &str, base: u32) -> Result<Value, PyException> {
    let invalid = || {
        PyException::value_error(format!(
            "invalid literal for int() with base {base}: {}",
            repr(&Value::str(text))
        ))
    };
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = match base {
        0 => {
            if let Some(rest) = lower.strip_prefix("0x") {
                (16, rest.to_string())
            } else if let Some(rest) = lower.strip_prefix("0o") {
                (8, rest.to_string())
            } else if let Some(rest) = lower.strip_prefix("0b") {
                (2, rest.to_string())
            } else {
                (10, lower.clone())
            }
        }
        16 => (16, lower.strip_prefix("0x").unwrap_or(&lower).to_string()),
        8 => (8, lower.strip_prefix("0o").unwrap_or(&lower).to_string()),
        2 => (2, lower.strip_prefix("0b").unwrap_or(&lower).to_string()),
        other => (other, lower.clone()),
    };
    if body.is_empty()
        || body.starts_with('_')
        || body.ends_with('_')
        || body.contains("__")
        || !body.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(invalid());
    }
    let cleaned: String = body.chars().filter(|c| *c != '_').collect();
    let magnitude = BigInt::parse_bytes(cleaned.as_bytes(), radix).ok_or_else(invalid)?;
    Ok(Value::from_bigint(if negative { -magnitude } else { magnitude }))
}

fn parse_float(text: &str) -> Result<f64, PyException> {
    let trimmed = text.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let unsigned = lowered.trim_start_matches(['+', '-']);
    let special = matches!(unsigned, "inf" | "infinity" | "nan");
    let plain = !unsigned.is_empty()
        && unsigned
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | '+' | '-' | '_'));
    if special || plain {
        if let Ok(value) = lowered.replace('_', "").parse::<f64>() {
            return Ok(value);
        }
    }
    Err(PyException::value_error(format!(
        "could not convert string to float: {}",
        repr(&Value::str(text))
    )))
}

fn sequence_len(value: &Value) -> Result<usize, PyException> {
    let len = match value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(dict) => dict.borrow().len(),
        Value::Set(set) => set.borrow().len(),
        Value::DictView(view) => view.len(),
        Value::Range(range) => range.len(),
        other => {
            return Err(PyException::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(len)
}

fn isinstance(value: &Value, class: &Value) -> Result<bool, PyException> {
    match class {
        Value::Type(kind) => Ok(value.is_instance_of(*kind)),
        Value::ExceptionType(kind) => Ok(matches!(
            value,
            Value::Exception(object) if object.kind.is_subclass_of(*kind)
        )),
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if isinstance(value, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(PyException::type_error(
            "isinstance() arg 2 must be a type, a tuple of types, or a union",
        )),
    }
}

/// Exact `type(x)` result
fn type_of(value: &Value) -> Value {
    match value {
        Value::Exception(object) => Value::ExceptionType(object.kind),
        other => Value::Type(other.type_kind()),
    }
}

fn math_domain_error() -> PyException {
    PyException::value_error("math domain error")
}

/// Three-argument `pow`; a negative exponent goes through the modular inverse
fn mod_pow(base: &BigInt, exponent: &BigInt, modulus: &BigInt) -> Result<Value, PyException> {
    if modulus.is_zero() {
        return Err(PyException::value_error("pow() 3rd argument cannot be 0"));
    }
    let (base, exponent) = if exponent.is_negative() {
        let magnitude = modulus.abs();
        let inverse = base.mod_floor(&magnitude).extended_gcd(&magnitude);
        if !inverse.gcd.is_one() {
            return Err(PyException::value_error(
                "base is not invertible for the given modulus",
            ));
        }
        (inverse.x.mod_floor(&magnitude), -exponent)
    } else {
        (base.clone(), exponent.clone())
    };
    Ok(Value::from_bigint(base.modpow(&exponent, modulus)))
}

impl Interpreter {
    pub(crate) fn call_builtin(
        &mut self,
        name: &'static str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, PyException> {
        if let Some(function) = name.strip_prefix("math.") {
            return self.call_math(function, args, kwargs);
        }
        let mut keywords = Keywords::new(name, kwargs);
        let value = match name {
            "print" => {
                let sep = keywords.take("sep");
                let end = keywords.take("end");
                keywords.take("flush");
                keywords.finish()?;
                let separator = optional_text("sep", sep, " ")?;
                let terminator = optional_text("end", end, "\n")?;
                let parts: Vec<String> = args.iter().map(to_str).collect();
                let mut line = parts.join(&separator);
                line.push_str(&terminator);
                self.write_output(&line);
                Value::None
            }
            "len" => {
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                Value::Int(sequence_len(&args[0])? as i64)
            }
            "abs" => {
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Value::Float(f) => Value::Float(f.abs()),
                    other => {
                        let number = other.as_bigint().ok_or_else(|| {
                            PyException::type_error(format!(
                                "bad operand type for abs(): '{}'",
                                other.type_name()
                            ))
                        })?;
                        Value::from_bigint(number.abs())
                    }
                }
            }
            "all" | "any" => {
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                let items = iterate(&args[0])?;
                let result = if name == "all" {
                    items.iter().all(Value::is_truthy)
                } else {
                    items.iter().any(Value::is_truthy)
                };
                Value::Bool(result)
            }
            "bin" | "hex" | "oct" => {
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                let number = expect_bigint(&args[0])?;
                let text = match name {
                    "bin" => radix_string(&number, "0b", 2),
                    "oct" => radix_string(&number, "0o", 8),
                    _ => radix_string(&number, "0x", 16),
                };
                Value::str(text)
            }
            "callable" => {
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                Value::Bool(matches!(
                    args[0],
                    Value::Function(_)
                        | Value::Builtin(_)
                        | Value::BoundMethod(_)
                        | Value::MethodDescriptor(..)
                        | Value::Type(_)
                        | Value::ExceptionType(_)
                ))
            }
            "chr" => {
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                let code = expect_int(&args[0])?;
                let c = u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| PyException::value_error("chr() arg not in range(0x110000)"))?;
                Value::str(c.to_string())
            }
            "ord" => {
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                let Value::Str(text) = &args[0] else {
                    return Err(PyException::type_error(format!(
                        "ord() expected string of length 1, but {} found",
                        args[0].type_name()
                    )));
                };
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Int(c as i64),
                    _ => {
                        return Err(PyException::type_error(format!(
                            "ord() expected a character, but string of length {} found",
                            text.chars().count()
                        )))
                    }
                }
            }
            "divmod" => {
                keywords.finish()?;
                arity(name, &args, 2, 2)?;
                let quotient = binary_op(Operator::FloorDiv, &args[0], &args[1])?;
                let remainder = binary_op(Operator::Mod, &args[0], &args[1])?;
                Value::tuple(vec![quotient, remainder])
            }
            "pow" => {
                let modulus = keywords.take("mod");
                keywords.finish()?;
                arity(name, &args, 2, 3)?;
                match args.get(2).cloned().or(modulus) {
                    Some(Value::None) | None => binary_op(Operator::Pow, &args[0], &args[1])?,
                    Some(modulus) => mod_pow(
                        &expect_bigint(&args[0])?,
                        &expect_bigint(&args[1])?,
                        &expect_bigint(&modulus)?,
                    )?,
                }
            }
            "round" => {
                let ndigits = keywords.take("ndigits");
                keywords.finish()?;
                arity(name, &args, 1, 2)?;
                let ndigits = match args.get(1).cloned().or(ndigits) {
                    None | Some(Value::None) => None,
                    Some(value) => Some(expect_int(&value)?),
                };
                round_value(&args[0], ndigits)?
            }
            "repr" => {
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                Value::str(repr(&args[0]))
            }
            "format" => {
                keywords.finish()?;
                arity(name, &args, 1, 2)?;
                let spec = match args.get(1) {
                    Some(Value::Str(spec)) => spec.to_string(),
                    Some(other) => {
                        return Err(PyException::type_error(format!(
                            "format() argument 2 must be str, not {}",
                            other.type_name()
                        )))
                    }
                    None => String::new(),
                };
                Value::str(format_value(&args[0], &spec)?)
            }
            "hash" => {
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                Value::Int(HashKey::from_value(&args[0])?.py_hash())
            }
            "isinstance" => {
                keywords.finish()?;
                arity(name, &args, 2, 2)?;
                Value::Bool(isinstance(&args[0], &args[1])?)
            }
            "iter" => {
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    iterator @ Value::Iterator(_) => iterator.clone(),
                    other => {
                        let label = match other {
                            Value::List(_) => "list_iterator",
                            Value::Tuple(_) => "tuple_iterator",
                            Value::Str(_) => "str_iterator",
                            Value::Range(_) => "range_iterator",
                            Value::Set(_) => "set_iterator",
                            Value::Dict(_) => "dict_keyiterator",
                            Value::DictView(view) => view.kind.iterator_name(),
                            _ => "iterator",
                        };
                        Value::iterator(label, iterate(other)?)
                    }
                }
            }
            "next" => {
                keywords.finish()?;
                arity(name, &args, 1, 2)?;
                let Value::Iterator(state) = &args[0] else {
                    return Err(PyException::type_error(format!(
                        "'{}' object is not an iterator",
                        args[0].type_name()
                    )));
                };
                let item = state.borrow_mut().items.pop_front();
                match (item, args.get(1)) {
                    (Some(item), _) => item,
                    (None, Some(default)) => default.clone(),
                    (None, None) => return Err(PyException::new(ExceptionKind::StopIteration, "")),
                }
            }
            "enumerate" => {
                let start = keywords.take("start");
                keywords.finish()?;
                arity(name, &args, 1, 2)?;
                let start = match args.get(1).cloned().or(start) {
                    Some(start) if start.is_int() => start,
                    Some(other) => return Err(not_an_integer(&other)),
                    None => Value::Int(0),
                };
                let items = iterate(&args[0])?;
                let mut pairs = Vec::with_capacity(items.len());
                for (offset, item) in items.into_iter().enumerate() {
                    let index = binary_op(Operator::Add, &start, &Value::Int(offset as i64))?;
                    pairs.push(Value::tuple(vec![index, item]));
                }
                Value::iterator("enumerate", pairs)
            }
            "zip" => {
                keywords.take("strict");
                keywords.finish()?;
                let columns = args
                    .iter()
                    .map(iterate)
                    .collect::<Result<Vec<_>, _>>()?;
                let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
                let rows = (0..shortest)
                    .map(|row| Value::tuple(columns.iter().map(|column| column[row].clone()).collect()))
                    .collect();
                Value::iterator("zip", rows)
            }
            "map" => {
                keywords.finish()?;
                arity(name, &args, 2, usize::MAX)?;
                let columns = args[1..]
                    .iter()
                    .map(iterate)
                    .collect::<Result<Vec<_>, _>>()?;
                let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
                let mut mapped = Vec::with_capacity(shortest);
                for row in 0..shortest {
                    let call_args = columns.iter().map(|column| column[row].clone()).collect();
                    mapped.push(self.call_value(&args[0], call_args, Vec::new())?);
                }
                Value::iterator("map", mapped)
            }
            "filter" => {
                keywords.finish()?;
                arity(name, &args, 2, 2)?;
                let mut kept = Vec::new();
                for item in iterate(&args[1])? {
                    let keep = match &args[0] {
                        Value::None => item.is_truthy(),
                        predicate => self
                            .call_value(predicate, vec![item.clone()], Vec::new())?
                            .is_truthy(),
                    };
                    if keep {
                        kept.push(item);
                    }
                }
                Value::iterator("filter", kept)
            }
            "reversed" => {
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                let mut items = match &args[0] {
                    Value::List(_)
                    | Value::Tuple(_)
                    | Value::Str(_)
                    | Value::Range(_)
                    | Value::Dict(_)
                    | Value::DictView(_) => iterate(&args[0])?,
                    other => {
                        return Err(PyException::type_error(format!(
                            "'{}' object is not reversible",
                            other.type_name()
                        )))
                    }
                };
                items.reverse();
                Value::iterator("reversed", items)
            }
            "sorted" => {
                let key = keywords.take("key");
                let reverse = keywords.take("reverse");
                keywords.finish()?;
                arity(name, &args, 1, 1)?;
                let items = iterate(&args[0])?;
                let reverse = reverse.is_some_and(|flag| flag.is_truthy());
                Value::list(self.sort_values(items, key, reverse)?)
            }
            "sum" => {
                let start = keywords.take("start");
                keywords.finish()?;
                arity(name, &args, 1, 2)?;
                let mut total = args.get(1).cloned().or(start).unwrap_or(Value::Int(0));
                if matches!(total, Value::Str(_)) {
                    return Err(PyException::type_error(
                        "sum() can't sum strings [use ''.join(seq) instead]",
                    ));
                }
                for item in iterate(&args[0])? {
                    total = binary_op(Operator::Add, &total, &item)?;
                }
                total
            }
            "min" | "max" => {
                let key = keywords.take("key");
                let default = keywords.take("default");
                keywords.finish()?;
                arity(name, &args, 1, usize::MAX)?;
                let items = if args.len() == 1 {
                    iterate(&args[0])?
                } else {
                    args
                };
                self.extreme(name, items, key, default)?
            }
            other => {
                if let Some(function) = other.strip_prefix("functools.") {
                    keywords.finish()?;
                    return self.call_functools(function, args);
                }
                return Err(PyException::name_error(other));
            }
        };
        Ok(value)
    }

    /// Stable sort using only `<`, like `list.sort`
    pub(crate) fn sort_values(
        &mut self,
        items: Vec<Value>,
        key: Option<Value>,
        reverse: bool,
    ) -> Result<Vec<Value>, PyException> {
        let keys = match key {
            Some(Value::None) | None => items.clone(),
            Some(key) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in &items {
                    keys.push(self.call_value(&key, vec![item.clone()], Vec::new())?);
                }
                keys
            }
        };
        let mut order: Vec<usize> = (0..items.len()).collect();
        let mut failure = None;
        order.sort_by(|&a, &b| {
            if failure.is_some() {
                return std::cmp::Ordering::Equal;
            }
            let (left, right) = if reverse { (b, a) } else { (a, b) };
            let ordering = less_than(&keys[left], &keys[right]).and_then(|less| {
                if less {
                    Ok(std::cmp::Ordering::Less)
                } else if less_than(&keys[right], &keys[left])? {
                    Ok(std::cmp::Ordering::Greater)
                } else {
                    Ok(std::cmp::Ordering::Equal)
                }
            });
            ordering.unwrap_or_else(|error| {
                failure = Some(error);
                std::cmp::Ordering::Equal
            })
        });
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(order.into_iter().map(|i| items[i].clone()).collect())
    }

    fn extreme(
        &mut self,
        name: &str,
        items: Vec<Value>,
        key: Option<Value>,
        default: Option<Value>,
    ) -> Result<Value, PyException> {
        let mut best: Option<(Value, Value)> = None;
        for item in items {
            let rank = match &key {
                Some(Value::None) | None => item.clone(),
                Some(key) => self.call_value(key, vec![item.clone()], Vec::new())?,
            };
            let replace = match &best {
                None => true,
                Some((_, best_rank)) if name == "min" => less_than(&rank, best_rank)?,
                Some((_, best_rank)) => less_than(best_rank, &rank)?,
            };
            if replace {
                best = Some((item, rank));
            }
        }
        match (best, default) {
            (Some((item, _)), _) => Ok(item),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(PyException::value_error(format!(
                "{name}() arg is an empty sequence"
            ))),
        }
    }

    fn call_math(
        &mut self,
        function: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, PyException> {
        let mut keywords = Keywords::new(function, kwargs);
        let start = keywords.take("start");
        keywords.finish()?;
        let float_arg = |i: usize| -> Result<f64, PyException> {
            let value = args.get(i).ok_or_else(|| {
                PyException::type_error(format!("{function}() missing required argument"))
            })?;
            expect_float(function, value)
        };
        let value = match function {
            "sqrt" => {
                arity(function, &args, 1, 1)?;
                let x = float_arg(0)?;
                if x < 0.0 {
                    return Err(math_domain_error());
                }
                Value::Float(x.sqrt())
            }
            "floor" | "ceil" | "trunc" => {
                arity(function, &args, 1, 1)?;
                if let Some(number) = args[0].as_bigint() {
                    return Ok(Value::from_bigint(number));
                }
                let x = float_arg(0)?;
                let rounded = match function {
                    "floor" => x.floor(),
                    "ceil" => x.ceil(),
                    _ => x.trunc(),
                };
                ops::int_from_float(rounded)?
            }
            "fabs" => {
                arity(function, &args, 1, 1)?;
                Value::Float(float_arg(0)?.abs())
            }
            "exp" => {
                arity(function, &args, 1, 1)?;
                Value::Float(float_arg(0)?.exp())
            }
            "pow" => {
                arity(function, &args, 2, 2)?;
                Value::Float(float_arg(0)?.powf(float_arg(1)?))
            }
            "hypot" => {
                let mut total = 0.0;
                for i in 0..args.len() {
                    let x = float_arg(i)?;
                    total += x * x;
                }
                Value::Float(total.sqrt())
            }
            "log" | "log2" | "log10" => {
                arity(function, &args, 1, if function == "log" { 2 } else { 1 })?;
                let x = float_arg(0)?;
                if x <= 0.0 {
                    return Err(math_domain_error());
                }
                let result = match function {
                    "log2" => x.log2(),
                    "log10" => x.log10(),
                    _ => match args.get(1) {
                        Some(_) => {
                            let base = float_arg(1)?;
                            if base <= 0.0 {
                                return Err(math_domain_error());
                            }
                            if base == 1.0 {
                                return Err(PyException::zero_division("float division by zero"));
                            }
                            x.ln() / base.ln()
                        }
                        None => x.ln(),
                    },
                };
                Value::Float(result)
            }
            "gcd" | "lcm" => {
                let mut result = if function == "gcd" {
                    BigInt::zero()
                } else {
                    BigInt::one()
                };
                for value in &args {
                    let n = expect_bigint(value)?;
                    result = if function == "gcd" {
                        result.gcd(&n)
                    } else {
                        result.lcm(&n)
                    };
                }
                Value::from_bigint(result.abs())
            }
            "factorial" => {
                arity(function, &args, 1, 1)?;
                let n = expect_int(&args[0])?;
                if n < 0 {
                    return Err(PyException::value_error(
                        "factorial() not defined for negative values",
                    ));
                }
                let mut result = BigInt::one();
                for k in 2..=n {
                    result *= k;
                }
                Value::from_bigint(result)
            }
            "isqrt" => {
                arity(function, &args, 1, 1)?;
                let n = expect_bigint(&args[0])?;
                if n.is_negative() {
                    return Err(PyException::value_error(
                        "isqrt() argument must be nonnegative",
                    ));
                }
                Value::from_bigint(n.sqrt())
            }
            "comb" => {
                arity(function, &args, 2, 2)?;
                let n = expect_int(&args[0])?;
                let k = expect_int(&args[1])?;
                if n < 0 || k < 0 {
                    return Err(PyException::value_error(
                        "n must be a non-negative integer",
                    ));
                }
                if k > n {
                    return Ok(Value::Int(0));
                }
                let k = k.min(n - k);
                let mut result = BigInt::one();
                for i in 0..k {
                    result = result * (n - i) / (i + 1);
                }
                Value::from_bigint(result)
            }
            "prod" => {
                arity(function, &args, 1, 1)?;
                let mut total = start.unwrap_or(Value::Int(1));
                for item in iterate(&args[0])? {
                    total = binary_op(Operator::Mult, &total, &item)?;
                }
                total
            }
            other => {
                return Err(PyException::attribute_error("module", other));
            }
        };
        Ok(value)
    }

    fn call_functools(&mut self, function: &str, args: Vec<Value>) -> Result<Value, PyException> {
        match function {
            "reduce" => {
                arity("reduce", &args, 2, 3)?;
                let mut items = iterate(&args[1])?.into_iter();
                let mut accumulator = match args.get(2) {
                    Some(initial) => initial.clone(),
                    None => items.next().ok_or_else(|| {
                        PyException::type_error("reduce() of empty iterable with no initial value")
                    })?,
                };
                for item in items {
                    accumulator = self.call_value(&args[0], vec![accumulator, item], Vec::new())?;
                }
                Ok(accumulator)
            }
            other => Err(PyException::attribute_error("module", other)),
        }
    }

    /// Calling a built-in class
    pub(crate) fn construct(
        &mut self,
        kind: TypeKind,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, PyException> {
        let name = kind.name();
        let mut keywords = Keywords::new(name, kwargs);
        let value = match kind {
            TypeKind::Int => {
                let base = keywords.take("base");
                keywords.finish()?;
                arity(name, &args, 0, 2)?;
                let base = args.get(1).cloned().or(base);
                match (args.first(), base) {
                    (None, _) => Value::Int(0),
                    (Some(Value::Str(text)), Some(base)) => {
                        let base = expect_int(&base)?;
                        if base != 0 && !(2..=36).contains(&base) {
                            return Err(PyException::value_error(
                                "int() base must be >= 2 and <= 36, or 0",
                            ));
                        }
                        parse_int(text, base as u32)?
                    }
                    (Some(_), Some(_)) => {
                        return Err(PyException::type_error(
                            "int() can't convert non-string with explicit base",
                        ))
                    }
                    (Some(Value::Str(text)), None) => parse_int(text, 10)?,
                    (Some(Value::Float(f)), None) => ops::int_from_float(f.trunc())?,
                    (Some(other), None) => Value::from_bigint(other.as_bigint().ok_or_else(|| {
                        PyException::type_error(format!(
                            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                            other.type_name()
                        ))
                    })?),
                }
            }
            TypeKind::Float => {
                keywords.finish()?;
                arity(name, &args, 0, 1)?;
                match args.first() {
                    None => Value::Float(0.0),
                    Some(Value::Str(text)) => Value::Float(parse_float(text)?),
                    Some(other) => Value::Float(ops::to_float(other)?.ok_or_else(|| {
                        PyException::type_error(format!(
                            "float() argument must be a string or a real number, not '{}'",
                            other.type_name()
                        ))
                    })?),
                }
            }
            TypeKind::Str => {
                keywords.finish()?;
                arity(name, &args, 0, 1)?;
                Value::str(args.first().map(to_str).unwrap_or_default())
            }
            TypeKind::Bool => {
                keywords.finish()?;
                arity(name, &args, 0, 1)?;
                Value::Bool(args.first().is_some_and(Value::is_truthy))
            }
            TypeKind::List => {
                keywords.finish()?;
                arity(name, &args, 0, 1)?;
                match args.first() {
                    Some(iterable) => Value::list(iterate(iterable)?),
                    None => Value::list(Vec::new()),
                }
            }
            TypeKind::Tuple => {
                keywords.finish()?;
                arity(name, &args, 0, 1)?;
                match args.first() {
                    Some(Value::Tuple(items)) => Value::Tuple(items.clone()),
                    Some(iterable) => Value::tuple(iterate(iterable)?),
                    None => Value::tuple(Vec::new()),
                }
            }
            TypeKind::Set => {
                keywords.finish()?;
                arity(name, &args, 0, 1)?;
                match args.first() {
                    Some(iterable) => Value::set(ops::set_from(iterable)?),
                    None => Value::set(Set::new()),
                }
            }
            TypeKind::Dict => {
                arity(name, &args, 0, 1)?;
                let mut dict = match args.first() {
                    Some(Value::Dict(other)) => other.borrow().clone(),
                    Some(pairs) => dict_from_pairs(iterate(pairs)?)?,
                    None => Dict::new(),
                };
                for (key, value) in keywords.entries.drain(..) {
                    dict.insert(Value::str(key), value)?;
                }
                Value::dict(dict)
            }
            TypeKind::Range => {
                keywords.finish()?;
                arity("range", &args, 1, 3)?;
                let bounds = args.iter().map(expect_int).collect::<Result<Vec<_>, _>>()?;
                let range = match bounds.as_slice() {
                    [stop] => Range { start: 0, stop: *stop, step: 1 },
                    [start, stop] => Range { start: *start, stop: *stop, step: 1 },
                    [start, stop, step] => {
                        if *step == 0 {
                            return Err(PyException::value_error("range() arg 3 must not be zero"));
                        }
                        Range { start: *start, stop: *stop, step: *step }
                    }
                    _ => {
                        return Err(PyException::type_error(format!(
                            "range expected at most 3 arguments, got {}",
                            bounds.len()
                        )))
                    }
                };
                Value::Range(range)
            }
            TypeKind::Type => {
                keywords.finish()?;
                arity("type", &args, 1, 1)?;
                type_of(&args[0])
            }
            TypeKind::NoneType => {
                keywords.finish()?;
                arity("NoneType", &args, 0, 0)?;
                Value::None
            }
            TypeKind::Function | TypeKind::Object => {
                return Err(PyException::type_error(format!(
                    "cannot create '{name}' instances"
                )))
            }
        };
        Ok(value)
    }
}

fn optional_text(name: &str, value: Option<Value>, default: &str) -> Result<String, PyException> {
    match value {
        None | Some(Value::None) => Ok(default.to_string()),
        Some(Value::Str(text)) => Ok(text.to_string()),
        Some(other) => Err(PyException::type_error(format!(
            "{name} must be None or a string, not {}",
            other.type_name()
        ))),
    }
}

fn round_value(value: &Value, ndigits: Option<i64>) -> Result<Value, PyException> {
    match (value, ndigits) {
        (Value::Float(f), None) => ops::int_from_float(round_half_even(*f)),
        (Value::Float(f), Some(digits)) if digits >= 0 => {
            if !f.is_finite() {
                return Ok(Value::Float(*f));
            }
            let digits = digits.min(300) as usize;
            let text = format!("{:.*}", digits, f);
            Ok(Value::Float(text.parse().unwrap_or(*f)))
        }
        (Value::Float(f), Some(digits)) => {
            let scale = 10f64.powi((-digits).min(308) as i32);
            Ok(Value::Float(round_half_even(f / scale) * scale))
        }
        (other, digits) => {
            let number = other.as_bigint().ok_or_else(|| {
                PyException::type_error(format!(
                    "type {} doesn't define __round__ method",
                    other.type_name()
                ))
            })?;
            match digits {
                Some(digits) if digits < 0 => {
                    let exponent = u32::try_from(digits.unsigned_abs()).unwrap_or(u32::MAX);
                    // 10**exponent exceeds twice the magnitude, so it rounds to zero
                    if u64::from(exponent) >= number.bits().max(1) {
                        return Ok(Value::Int(0));
                    }
                    let scale = BigInt::from(10).pow(exponent);
                    let (quotient, remainder) = number.div_mod_floor(&scale);
                    let doubled = remainder * 2;
                    let rounded = if doubled > scale || (doubled == scale && quotient.is_odd()) {
                        quotient + 1
                    } else {
                        quotient
                    };
                    Ok(Value::from_bigint(rounded * scale))
                }
                _ => Ok(Value::from_bigint(number)),
            }
        }
    }
}
