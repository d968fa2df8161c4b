//! Operator semantics: arithmetic, comparison, membership, subscripting.

use std::{cmp::Ordering, rc::Rc};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};

use super::errors::{ExceptionKind, PyException};
use super::format::percent_format;
use super::value::{Dict, DictView, Range, Set, Value, ViewKind};
use crate::ast::{CmpOp, Operator, UnaryOp};

/// Largest sequence `*` repetition will build
const MAX_REPEAT_LEN: usize = 1 << 24;
/// Largest integer `**` and `<<` will build, in bits
const MAX_INT_BITS: u64 = 1 << 26;

/// Resolved `lower:upper:step` with each bound already an integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceBounds {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub step: Option<i64>,
}

impl SliceBounds {
    pub fn from_values(
        lower: Option<Value>,
        upper: Option<Value>,
        step: Option<Value>,
    ) -> Result<Self, PyException> {
        fn bound(value: Option<Value>) -> Result<Option<i64>, PyException> {
            match value {
                None | Some(Value::None) => Ok(None),
                // out-of-range bounds clamp like any other large index
                Some(Value::Long(n)) => Ok(Some(if n.is_negative() { i64::MIN } else { i64::MAX })),
                Some(value) => value.as_int().map(Some).ok_or_else(|| {
                    PyException::type_error(
                        "slice indices must be integers or None or have an __index__ method",
                    )
                }),
            }
        }
        Ok(Self {
            lower: bound(lower)?,
            upper: bound(upper)?,
            step: bound(step)?,
        })
    }

    /// Clamped `(start, stop, step)` for a sequence of `len` items
    pub fn adjust(&self, len: usize) -> Result<(i64, i64, i64), PyException> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(PyException::value_error("slice step cannot be zero"));
        }
        let len = len as i64;
        let clamp = |bound: i64| -> i64 {
            if bound < 0 {
                let shifted = bound + len;
                if shifted < 0 {
                    if step < 0 {
                        -1
                    } else {
                        0
                    }
                } else {
                    shifted
                }
            } else if bound >= len {
                if step < 0 {
                    len - 1
                } else {
                    len
                }
            } else {
                bound
            }
        };
        let start = match self.lower {
            Some(lower) => clamp(lower),
            None if step < 0 => len - 1,
            None => 0,
        };
        let stop = match self.upper {
            Some(upper) => clamp(upper),
            None if step < 0 => -1,
            None => len,
        };
        Ok((start, stop, step))
    }

    pub fn indices(&self, len: usize) -> Result<Vec<usize>, PyException> {
        let (start, stop, step) = self.adjust(len)?;
        let mut indices = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            indices.push(i as usize);
            i += step;
        }
        Ok(indices)
    }
}

/// The evaluated contents of a subscript's brackets
#[derive(Debug, Clone)]
pub enum Index {
    Item(Value),
    Slice(SliceBounds),
}

fn unsupported_operand(op: &str, left: &Value, right: &Value) -> PyException {
    PyException::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

fn is_number(value: &Value) -> bool {
    value.is_int() || matches!(value, Value::Float(_))
}

fn too_large() -> PyException {
    PyException::overflow("integer result too large")
}

fn index_overflow() -> PyException {
    PyException::overflow("cannot fit 'int' into an index-sized integer")
}

/// Float view of a number; ints beyond the float range raise
pub fn to_float(value: &Value) -> Result<Option<f64>, PyException> {
    match value {
        Value::Long(n) => match n.to_f64() {
            Some(f) if f.is_finite() => Ok(Some(f)),
            _ => Err(PyException::overflow("int too large to convert to float")),
        },
        other => Ok(other.as_float()),
    }
}

/// `int(x)` for a float: truncate toward zero
pub fn int_from_float(value: f64) -> Result<Value, PyException> {
    if value.is_nan() {
        return Err(PyException::value_error("cannot convert float NaN to integer"));
    }
    if value.is_infinite() {
        return Err(PyException::overflow("cannot convert float infinity to integer"));
    }
    let truncated = value.trunc();
    if truncated.abs() < 9.0e18 {
        return Ok(Value::Int(truncated as i64));
    }
    BigInt::from_f64(truncated)
        .map(Value::from_bigint)
        .ok_or_else(|| PyException::overflow("cannot convert float infinity to integer"))
}

/// Exact ordering of two numbers; `None` when a NaN is involved
pub fn number_ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Float(f), int) => int_float_ordering(int, *f).map(Ordering::reverse),
        (int, Value::Float(f)) => int_float_ordering(int, *f),
        _ => match (left.as_int(), right.as_int()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => Some(left.as_bigint()?.cmp(&right.as_bigint()?)),
        },
    }
}

/// Compare an int with a float without rounding the int
fn int_float_ordering(int: &Value, float: f64) -> Option<Ordering> {
    if float.is_nan() {
        return None;
    }
    if let Some(i) = int.as_int() {
        if i.unsigned_abs() <= 1 << 53 {
            return (i as f64).partial_cmp(&float);
        }
    }
    if float.is_infinite() {
        return Some(if float > 0.0 {
            Ordering::Less
        } else {
            Ordering::Greater
        });
    }
    let floor = float.floor();
    let whole = BigInt::from_f64(floor)?;
    let fraction = if floor < float {
        Ordering::Less
    } else {
        Ordering::Equal
    };
    Some(int.as_bigint()?.cmp(&whole).then(fraction))
}

fn repeat<T: Clone>(items: &[T], count: i64) -> Result<Vec<T>, PyException> {
    let count = count.max(0) as usize;
    if items.len().saturating_mul(count) > MAX_REPEAT_LEN {
        return Err(PyException::new(
            ExceptionKind::OverflowError,
            "repeated sequence is too long",
        ));
    }
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn repeat_sequence(sequence: &Value, count: i64) -> Result<Value, PyException> {
    let value = match sequence {
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Value::str(repeat(&chars, count)?.into_iter().collect::<String>())
        }
        Value::List(items) => Value::list(repeat(&items.borrow(), count)?),
        Value::Tuple(items) => Value::tuple(repeat(items, count)?),
        _ => return Err(PyException::type_error("can't multiply sequence by non-int")),
    };
    Ok(value)
}

fn zero_divisor() -> PyException {
    PyException::zero_division("integer division or modulo by zero")
}

/// `None` for the one quotient that overflows, `i64::MIN // -1`
fn int_floor_div(a: i64, b: i64) -> Result<Option<i64>, PyException> {
    if b == 0 {
        return Err(zero_divisor());
    }
    let Some(quotient) = a.checked_div(b) else {
        return Ok(None);
    };
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        Ok(Some(quotient - 1))
    } else {
        Ok(Some(quotient))
    }
}

fn int_mod(a: i64, b: i64) -> Result<i64, PyException> {
    if b == 0 {
        return Err(zero_divisor());
    }
    let remainder = a.checked_rem(b).unwrap_or(0);
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        Ok(remainder + b)
    } else {
        Ok(remainder)
    }
}

fn float_mod(a: f64, b: f64) -> Result<f64, PyException> {
    if b == 0.0 {
        return Err(PyException::zero_division("float modulo"));
    }
    let remainder = a % b;
    if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
        Ok(remainder + b)
    } else {
        Ok(remainder)
    }
}

fn int_pow(base: i64, exponent: i64) -> Result<Option<Value>, PyException> {
    if exponent < 0 {
        return float_pow(base as f64, exponent as f64).map(|f| Some(Value::Float(f)));
    }
    Ok(u32::try_from(exponent)
        .ok()
        .and_then(|exponent| base.checked_pow(exponent))
        .map(Value::Int))
}

fn float_pow(base: f64, exponent: f64) -> Result<f64, PyException> {
    if base == 0.0 && exponent < 0.0 {
        return Err(PyException::zero_division(
            "0.0 cannot be raised to a negative power",
        ));
    }
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(PyException::value_error("math domain error"));
    }
    let result = base.powf(exponent);
    if result.is_infinite() && base.is_finite() && exponent.is_finite() {
        return Err(PyException::new(
            ExceptionKind::OverflowError,
            "(34, 'Numerical result out of range')",
        ));
    }
    Ok(result)
}

fn int_arithmetic(op: Operator, left: &Value, right: &Value) -> Result<Value, PyException> {
    if let (Value::Bool(a), Value::Bool(b)) = (left, right) {
        match op {
            Operator::BitOr => return Ok(Value::Bool(a | b)),
            Operator::BitAnd => return Ok(Value::Bool(a & b)),
            Operator::BitXor => return Ok(Value::Bool(a ^ b)),
            _ => {}
        }
    }
    if op == Operator::MatMult {
        return Err(unsupported_operand(op.symbol(), left, right));
    }
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        if let Some(value) = small_int_arithmetic(op, a, b)? {
            return Ok(value);
        }
    }
    let (Some(a), Some(b)) = (left.as_bigint(), right.as_bigint()) else {
        return Err(unsupported_operand(op.symbol(), left, right));
    };
    big_int_arithmetic(op, &a, &b)
}

/// The `i64` fast path; `None` when the result needs a big integer
fn small_int_arithmetic(op: Operator, a: i64, b: i64) -> Result<Option<Value>, PyException> {
    let value = match op {
        Operator::Add => a.checked_add(b),
        Operator::Sub => a.checked_sub(b),
        Operator::Mult => a.checked_mul(b),
        Operator::Div => {
            if b == 0 {
                return Err(PyException::zero_division("division by zero"));
            }
            return Ok(Some(Value::Float(a as f64 / b as f64)));
        }
        Operator::FloorDiv => int_floor_div(a, b)?,
        Operator::Mod => Some(int_mod(a, b)?),
        Operator::Pow => return int_pow(a, b),
        Operator::LShift | Operator::RShift if b < 0 => {
            return Err(PyException::value_error("negative shift count"))
        }
        Operator::LShift => u32::try_from(b)
            .ok()
            .and_then(|shift| a.checked_shl(shift))
            .filter(|shifted| (*shifted >> b) == a),
        Operator::RShift => Some(if b >= 64 {
            if a < 0 {
                -1
            } else {
                0
            }
        } else {
            a >> b
        }),
        Operator::BitOr => Some(a | b),
        Operator::BitAnd => Some(a & b),
        Operator::BitXor => Some(a ^ b),
        Operator::MatMult => None,
    };
    Ok(value.map(Value::Int))
}

fn big_int_arithmetic(op: Operator, a: &BigInt, b: &BigInt) -> Result<Value, PyException> {
    let value = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mult => a * b,
        Operator::Div => return big_true_div(a, b).map(Value::Float),
        Operator::FloorDiv | Operator::Mod if b.is_zero() => return Err(zero_divisor()),
        Operator::FloorDiv => a.div_floor(b),
        Operator::Mod => a.mod_floor(b),
        Operator::Pow => return big_pow(a, b),
        Operator::LShift | Operator::RShift if b.is_negative() => {
            return Err(PyException::value_error("negative shift count"))
        }
        Operator::LShift if a.is_zero() => BigInt::zero(),
        Operator::LShift => {
            let shift = b
                .to_u64()
                .filter(|shift| a.bits().saturating_add(*shift) <= MAX_INT_BITS)
                .ok_or_else(too_large)?;
            a << shift
        }
        Operator::RShift => match b.to_u64() {
            Some(shift) if shift < a.bits() => a >> shift,
            _ if a.is_negative() => BigInt::from(-1),
            _ => BigInt::zero(),
        },
        Operator::BitOr => a | b,
        Operator::BitAnd => a & b,
        Operator::BitXor => a ^ b,
        Operator::MatMult => {
            return Err(PyException::type_error(
                "unsupported operand type(s) for @: 'int' and 'int'",
            ))
        }
    };
    Ok(Value::from_bigint(value))
}

/// `a / b` rounded to a float, scaling both operands into float range first
fn big_true_div(a: &BigInt, b: &BigInt) -> Result<f64, PyException> {
    if b.is_zero() {
        return Err(PyException::zero_division("division by zero"));
    }
    let excess = a.bits().max(b.bits()).saturating_sub(1000);
    let numerator = (a.magnitude() >> excess).to_f64().unwrap_or(f64::INFINITY);
    let denominator = (b.magnitude() >> excess).to_f64().unwrap_or(f64::INFINITY);
    let quotient = numerator / denominator;
    if !quotient.is_finite() {
        return Err(PyException::overflow(
            "integer division result too large for a float",
        ));
    }
    Ok(if a.is_negative() != b.is_negative() {
        -quotient
    } else {
        quotient
    })
}

fn big_pow(base: &BigInt, exponent: &BigInt) -> Result<Value, PyException> {
    if exponent.is_negative() {
        let base = to_float(&Value::from_bigint(base.clone()))?.unwrap_or(0.0);
        let exponent = exponent.to_f64().unwrap_or(f64::NEG_INFINITY);
        return float_pow(base, exponent).map(Value::Float);
    }
    if exponent.is_zero() {
        return Ok(Value::Int(1));
    }
    if base.is_zero() || base.is_one() {
        return Ok(Value::from_bigint(base.clone()));
    }
    if *base == BigInt::from(-1) {
        return Ok(Value::Int(if exponent.is_odd() { -1 } else { 1 }));
    }
    let exponent = exponent
        .to_u32()
        .filter(|exponent| base.bits().saturating_mul(u64::from(*exponent)) <= MAX_INT_BITS)
        .ok_or_else(too_large)?;
    Ok(Value::from_bigint(base.pow(exponent)))
}

fn arithmetic(op: Operator, left: &Value, right: &Value) -> Result<Value, PyException> {
    if left.is_int() && right.is_int() {
        return int_arithmetic(op, left, right);
    }

    let (Some(a), Some(b)) = (to_float(left)?, to_float(right)?) else {
        return Err(unsupported_operand(op.symbol(), left, right));
    };
    let value = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mult => a * b,
        Operator::Div => {
            if b == 0.0 {
                return Err(PyException::zero_division("float division by zero"));
            }
            a / b
        }
        Operator::FloorDiv => {
            if b == 0.0 {
                return Err(PyException::zero_division(
                    "float floor division by zero",
                ));
            }
            (a / b).floor()
        }
        Operator::Mod => float_mod(a, b)?,
        Operator::Pow => float_pow(a, b)?,
        _ => return Err(unsupported_operand(op.symbol(), left, right)),
    };
    Ok(Value::Float(value))
}

fn set_operation(op: Operator, left: &Set, right: &Set) -> Set {
    match op {
        Operator::BitOr => left.union(right),
        Operator::BitAnd => left.intersection(right),
        Operator::Sub => left.difference(right),
        _ => left.symmetric_difference(right),
    }
}

/// `set(iterable)`
pub fn set_from(iterable: &Value) -> Result<Set, PyException> {
    let mut set = Set::new();
    set_update(&mut set, iterable)?;
    Ok(set)
}

/// `set.update(iterable)`; `iterable` must not be the set being updated
pub fn set_update(set: &mut Set, iterable: &Value) -> Result<(), PyException> {
    match iterable {
        Value::Set(other) => set.merge(&other.borrow()),
        Value::Dict(dict) => {
            let dict = dict.borrow();
            set.reserve(dict.len());
            for key in dict.keys() {
                set.add(key)?;
            }
        }
        other => {
            for item in iterate(other)? {
                set.add(item)?;
            }
        }
    }
    Ok(())
}

pub fn set_intersection(set: &Set, other: &Value) -> Result<Set, PyException> {
    if let Value::Set(other) = other {
        return Ok(set.intersection(&other.borrow()));
    }
    let mut result = Set::new();
    for item in iterate(other)? {
        if set.contains(&item)? {
            result.add(item)?;
        }
    }
    Ok(result)
}

pub fn set_difference(set: &Set, other: &Value) -> Result<Set, PyException> {
    match other {
        Value::Set(other) => Ok(set.difference(&other.borrow())),
        Value::Dict(dict) if (set.len() >> 2) <= dict.borrow().len() => {
            let dict = dict.borrow();
            Ok(set.filtered(|value| !dict.contains(value).unwrap_or(false)))
        }
        other => {
            let mut result = set.copy();
            set_difference_update(&mut result, other)?;
            Ok(result)
        }
    }
}

pub fn set_difference_update(set: &mut Set, other: &Value) -> Result<(), PyException> {
    match other {
        Value::Set(other) => set.difference_update(&other.borrow()),
        other => {
            for item in iterate(other)? {
                set.remove(&item)?;
            }
            set.shrink_dummies();
        }
    }
    Ok(())
}

pub fn set_symmetric_difference_update(set: &mut Set, other: &Value) -> Result<(), PyException> {
    match other {
        Value::Set(other) => set.symmetric_difference_update(&other.borrow()),
        Value::Dict(dict) => {
            for key in dict.borrow().keys() {
                if !set.remove(&key)? {
                    set.add(key)?;
                }
            }
        }
        other => set.symmetric_difference_update(&set_from(other)?),
    }
    Ok(())
}

fn is_set_view(value: &Value) -> bool {
    matches!(value, Value::DictView(view) if view.is_set_like())
}

/// A keys view converts through its dict, anything else by iteration
fn view_to_set(value: &Value) -> Result<Set, PyException> {
    match value {
        Value::DictView(view) if view.kind == ViewKind::Keys => {
            set_from(&Value::Dict(view.dict.clone()))
        }
        other => set_from(other),
    }
}

/// `|`, `-` and `^` with a keys or items view on either side
fn view_operation(op: Operator, left: &Value, right: &Value) -> Result<Value, PyException> {
    if op == Operator::BitAnd {
        return view_intersection(left, right);
    }
    let mut result = view_to_set(left)?;
    match op {
        Operator::BitOr => set_update(&mut result, right)?,
        Operator::Sub => set_difference_update(&mut result, right)?,
        _ => set_symmetric_difference_update(&mut result, right)?,
    }
    Ok(Value::set(result))
}

fn view_intersection(left: &Value, right: &Value) -> Result<Value, PyException> {
    let (view, other) = match (left, right) {
        (Value::DictView(view), other) if view.is_set_like() => (view, other),
        (other, Value::DictView(view)) => (view, other),
        _ => return Err(unsupported_operand("&", left, right)),
    };
    if let Value::Set(set) = other {
        let set = set.borrow();
        if view.len() <= set.len() {
            return Ok(Value::set(set_intersection(&set, &Value::DictView(view.clone()))?));
        }
    }
    // walk the smaller operand, testing membership in the larger view
    let (view, other) = match other {
        Value::DictView(other_view)
            if other_view.is_set_like() && other_view.len() > view.len() =>
        {
            (other_view.clone(), Value::DictView(view.clone()))
        }
        _ => (view.clone(), other.clone()),
    };
    let mut result = Set::new();
    for item in iterate(&other)? {
        if view_contains(&view, &item)? {
            result.add(item)?;
        }
    }
    Ok(Value::set(result))
}

pub fn view_contains(view: &DictView, item: &Value) -> Result<bool, PyException> {
    let dict = view.dict.borrow();
    match view.kind {
        ViewKind::Keys => dict.contains(item),
        ViewKind::Values => Ok(dict.values().iter().any(|value| values_equal(value, item))),
        ViewKind::Items => {
            let Value::Tuple(pair) = item else {
                return Ok(false);
            };
            let [key, value] = pair.as_slice() else {
                return Ok(false);
            };
            Ok(matches!(dict.get(key)?, Some(found) if values_equal(&found, value)))
        }
    }
}

/// Size of a set or set-like view
fn set_like_len(value: &Value) -> Option<usize> {
    match value {
        Value::Set(set) => Some(set.borrow().len()),
        Value::DictView(view) if view.is_set_like() => Some(view.len()),
        _ => None,
    }
}

fn all_contained(items: &Value, container: &Value) -> bool {
    iterate(items).is_ok_and(|items| {
        items
            .iter()
            .all(|item| contains(container, item).unwrap_or(false))
    })
}

pub fn binary_op(op: Operator, left: &Value, right: &Value) -> Result<Value, PyException> {
    match (op, left, right) {
        (_, l, r) if is_number(l) && is_number(r) => arithmetic(op, l, r),
        (Operator::Add, Value::Str(a), Value::Str(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::str(joined))
        }
        (Operator::Add, Value::Str(_), other) => Err(PyException::type_error(format!(
            "can only concatenate str (not \"{}\") to str",
            other.type_name()
        ))),
        (Operator::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (Operator::Add, Value::List(_), other) => Err(PyException::type_error(format!(
            "can only concatenate list (not \"{}\") to list",
            other.type_name()
        ))),
        (Operator::Add, Value::Tuple(a), Value::Tuple(b)) => {
            let mut items = a.to_vec();
            items.extend(b.iter().cloned());
            Ok(Value::tuple(items))
        }
        (Operator::Add, Value::Tuple(_), other) => Err(PyException::type_error(format!(
            "can only concatenate tuple (not \"{}\") to tuple",
            other.type_name()
        ))),
        (Operator::Mult, seq @ (Value::Str(_) | Value::List(_) | Value::Tuple(_)), count)
        | (Operator::Mult, count, seq @ (Value::Str(_) | Value::List(_) | Value::Tuple(_))) => {
            match count {
                Value::Long(n) if n.is_negative() => repeat_sequence(seq, 0),
                Value::Long(_) => Err(index_overflow()),
                _ => match count.as_int() {
                    Some(n) => repeat_sequence(seq, n),
                None => Err(PyException::type_error(format!(
                    "can't multiply sequence by non-int of type '{}'",
                        count.type_name()
                    ))),
                },
            }
        }
        (Operator::Mod, Value::Str(template), values) => {
            Ok(Value::str(percent_format(template, values)?))
        }
        (
            Operator::BitOr | Operator::BitAnd | Operator::BitXor | Operator::Sub,
            Value::Set(a),
            Value::Set(b),
        ) => {
            let result = if op == Operator::BitAnd && Rc::ptr_eq(a, b) {
                a.borrow().copy()
            } else {
                set_operation(op, &a.borrow(), &b.borrow())
            };
            Ok(Value::set(result))
        }
        (Operator::BitOr | Operator::BitAnd | Operator::BitXor | Operator::Sub, l, r)
            if is_set_view(l) || is_set_view(r) =>
        {
            view_operation(op, l, r)
        }
        (Operator::BitOr, Value::Dict(a), Value::Dict(b)) => {
            let mut merged = a.borrow().clone();
            for (key, value) in b.borrow().items() {
                merged.insert(key, value)?;
            }
            Ok(Value::dict(merged))
        }
        _ => Err(unsupported_operand(op.symbol(), left, right)),
    }
}

pub fn unary_op(op: UnaryOp, operand: &Value) -> Result<Value, PyException> {
    let bad = || {
        PyException::type_error(format!(
            "bad operand type for unary {}: '{}'",
            op.symbol(),
            operand.type_name()
        ))
    };
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::USub => match operand {
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Long(n) => Ok(Value::from_bigint(-&**n)),
            other => {
                let i = other.as_int().ok_or_else(bad)?;
                Ok(match i.checked_neg() {
                    Some(negated) => Value::Int(negated),
                    None => Value::from_bigint(-BigInt::from(i)),
                })
            }
        },
        UnaryOp::UAdd => match operand {
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Long(_) => Ok(operand.clone()),
            other => other.as_int().map(Value::Int).ok_or_else(bad),
        },
        UnaryOp::Invert => match operand {
            Value::Long(n) => Ok(Value::from_bigint(-((**n).clone() + 1u32))),
            other => other.as_int().map(|i| Value::Int(!i)).ok_or_else(bad),
        },
    }
}

/// `a == b`
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (l, r) if is_number(l) && is_number(r) => number_ordering(l, r) == Some(Ordering::Equal),
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            Rc::ptr_eq(a, b) || sequences_equal(&a.borrow(), &b.borrow())
        }
        (Value::Tuple(a), Value::Tuple(b)) => sequences_equal(a, b),
        (Value::Dict(a), Value::Dict(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len()
                && a.items().iter().all(|(key, value)| {
                    matches!(b.get(key), Ok(Some(other)) if values_equal(value, &other))
                })
        }
        (Value::Set(a), Value::Set(b)) if Rc::ptr_eq(a, b) => true,
        // sets and keys/items views compare as sets; values views only by identity
        (l, r) if set_like_len(l).is_some() && set_like_len(r).is_some() => {
            set_like_len(l) == set_like_len(r) && all_contained(l, r)
        }
        (Value::Range(a), Value::Range(b)) => {
            a.len() == b.len() && (a.is_empty() || (a.start == b.start && (a.len() == 1 || a.step == b.step)))
        }
        (Value::Type(a), Value::Type(b)) => a == b,
        (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        _ => is_same(left, right),
    }
}

fn sequences_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

/// `a is b`
pub fn is_same(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Long(a), Value::Long(b)) => Rc::ptr_eq(a, b),
        (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
        (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
        (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
        (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
        (Value::DictView(a), Value::DictView(b)) => Rc::ptr_eq(a, b),
        (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
        (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
        (Value::Type(a), Value::Type(b)) => a == b,
        (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        _ => false,
    }
}

fn order_error(op: CmpOp, left: &Value, right: &Value) -> PyException {
    PyException::type_error(format!(
        "'{}' not supported between instances of '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn ordering_holds(op: CmpOp, ordering: Ordering) -> bool {
    match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::LtE => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::GtE => ordering != Ordering::Less,
        _ => false,
    }
}

fn sequence_order(op: CmpOp, a: &[Value], b: &[Value]) -> Result<bool, PyException> {
    for (x, y) in a.iter().zip(b) {
        if !values_equal(x, y) {
            return ordered(op, x, y);
        }
    }
    Ok(ordering_holds(op, a.len().cmp(&b.len())))
}

fn ordered(op: CmpOp, left: &Value, right: &Value) -> Result<bool, PyException> {
    match (left, right) {
        (l, r) if is_number(l) && is_number(r) => {
            Ok(number_ordering(l, r).is_some_and(|ordering| ordering_holds(op, ordering)))
        }
        (Value::Str(a), Value::Str(b)) => Ok(ordering_holds(op, a.cmp(b))),
        (Value::List(a), Value::List(b)) => sequence_order(op, &a.borrow(), &b.borrow()),
        (Value::Tuple(a), Value::Tuple(b)) => sequence_order(op, a, b),
        (l, r) if set_like_len(l).is_some() && set_like_len(r).is_some() => {
            let (a, b) = (set_like_len(l), set_like_len(r));
            Ok(match op {
                CmpOp::LtE => a <= b && all_contained(l, r),
                CmpOp::Lt => a < b && all_contained(l, r),
                CmpOp::GtE => a >= b && all_contained(r, l),
                _ => a > b && all_contained(r, l),
            })
        }
        _ => Err(order_error(op, left, right)),
    }
}

/// `x in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool, PyException> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(&**needle)),
            other => Err(PyException::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|x| values_equal(x, item))),
        Value::Tuple(items) => Ok(items.iter().any(|x| values_equal(x, item))),
        Value::Dict(dict) => dict.borrow().contains(item),
        Value::Set(set) => set.borrow().contains(item),
        Value::DictView(view) => view_contains(view, item),
        Value::Range(range) => Ok(match item {
            Value::Float(f) if f.fract() == 0.0 => range.contains(*f as i64),
            other => other.as_int().is_some_and(|i| range.contains(i)),
        }),
        Value::Iterator(state) => {
            let mut state = state.borrow_mut();
            while let Some(next) = state.items.pop_front() {
                if values_equal(&next, item) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(PyException::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, PyException> {
    match op {
        CmpOp::Eq => Ok(values_equal(left, right)),
        CmpOp::NotEq => Ok(!values_equal(left, right)),
        CmpOp::Is => Ok(is_same(left, right)),
        CmpOp::IsNot => Ok(!is_same(left, right)),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => Ok(!contains(right, left)?),
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => ordered(op, left, right),
    }
}

/// `left < right`, the ordering `sorted`, `min` and `max` use
pub fn less_than(left: &Value, right: &Value) -> Result<bool, PyException> {
    ordered(CmpOp::Lt, left, right)
}

/// Materialize everything `for x in value` would produce
pub fn iterate(value: &Value) -> Result<Vec<Value>, PyException> {
    let items = match value {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
        Value::Dict(dict) => dict.borrow().keys(),
        Value::Set(set) => set.borrow().values(),
        Value::DictView(view) => view.items(),
        Value::Range(range) => range.values().map(Value::Int).collect(),
        Value::Iterator(state) => state.borrow_mut().items.drain(..).collect(),
        other => {
            return Err(PyException::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )))
        }
    };
    Ok(items)
}

fn normalize_index(index: i64, len: usize, message: &str) -> Result<usize, PyException> {
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    if resolved < 0 || resolved >= len {
        return Err(PyException::index_error(message));
    }
    Ok(resolved as usize)
}

fn sequence_index(container: &Value, index: &Value) -> Result<i64, PyException> {
    if let Value::Long(_) = index {
        return Err(PyException::index_error(
            "cannot fit 'int' into an index-sized integer",
        ));
    }
    index.as_int().ok_or_else(|| {
        let message = match container {
            Value::Str(_) => format!("string indices must be integers, not '{}'", index.type_name()),
            other => format!(
                "{} indices must be integers or slices, not {}",
                other.type_name(),
                index.type_name()
            ),
        };
        PyException::type_error(message)
    })
}

pub fn get_item(container: &Value, index: &Index) -> Result<Value, PyException> {
    match (container, index) {
        (Value::List(items), Index::Item(i)) => {
            let i = sequence_index(container, i)?;
            let items = items.borrow();
            let at = normalize_index(i, items.len(), "list index out of range")?;
            Ok(items[at].clone())
        }
        (Value::List(items), Index::Slice(bounds)) => {
            let items = items.borrow();
            let picked = bounds.indices(items.len())?;
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        (Value::Tuple(items), Index::Item(i)) => {
            let i = sequence_index(container, i)?;
            let at = normalize_index(i, items.len(), "tuple index out of range")?;
            Ok(items[at].clone())
        }
        (Value::Tuple(items), Index::Slice(bounds)) => {
            let picked = bounds.indices(items.len())?;
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        (Value::Str(s), Index::Item(i)) => {
            let i = sequence_index(container, i)?;
            let chars: Vec<char> = s.chars().collect();
            let at = normalize_index(i, chars.len(), "string index out of range")?;
            Ok(Value::str(chars[at].to_string()))
        }
        (Value::Str(s), Index::Slice(bounds)) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = bounds.indices(chars.len())?;
            Ok(Value::str(picked.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        (Value::Range(range), Index::Item(i)) => {
            let i = sequence_index(container, i)?;
            let at = normalize_index(i, range.len(), "range object index out of range")?;
            Ok(Value::Int(range.get(at)))
        }
        (Value::Range(range), Index::Slice(bounds)) => {
            let (start, stop, step) = bounds.adjust(range.len())?;
            Ok(Value::Range(Range {
                start: range.start + start * range.step,
                stop: range.start + stop * range.step,
                step: range.step * step,
            }))
        }
        (Value::Dict(dict), Index::Item(key)) => dict
            .borrow()
            .get(key)?
            .ok_or_else(|| PyException::key_error(key.clone())),
        (Value::Dict(_), Index::Slice(_)) => {
            Err(PyException::type_error("unhashable type: 'slice'"))
        }
        // `list[int]` style generic aliases
        (Value::Type(_), _) => Ok(container.clone()),
        (other, _) => Err(PyException::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub fn set_item(container: &Value, index: &Index, value: Value) -> Result<(), PyException> {
    match (container, index) {
        (Value::List(items), Index::Item(i)) => {
            let i = sequence_index(container, i)?;
            let mut items = items.borrow_mut();
            let at = normalize_index(i, items.len(), "list assignment index out of range")?;
            items[at] = value;
            Ok(())
        }
        (Value::List(items), Index::Slice(bounds)) => {
            let replacement = iterate(&value)?;
            let mut items = items.borrow_mut();
            let (start, stop, step) = bounds.adjust(items.len())?;
            if step == 1 {
                let start = start.max(0) as usize;
                let stop = (stop.max(0) as usize).max(start);
                items.splice(start..stop, replacement);
                return Ok(());
            }
            let picked = bounds.indices(items.len())?;
            if picked.len() != replacement.len() {
                return Err(PyException::value_error(format!(
                    "attempt to assign sequence of size {} to extended slice of size {}",
                    replacement.len(),
                    picked.len()
                )));
            }
            for (at, item) in picked.into_iter().zip(replacement) {
                items[at] = item;
            }
            Ok(())
        }
        (Value::Dict(dict), Index::Item(key)) => dict.borrow_mut().insert(key.clone(), value),
        (Value::Dict(_), Index::Slice(_)) => {
            Err(PyException::type_error("unhashable type: 'slice'"))
        }
        (other, _) => Err(PyException::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

pub fn del_item(container: &Value, index: &Index) -> Result<(), PyException> {
    match (container, index) {
        (Value::List(items), Index::Item(i)) => {
            let i = sequence_index(container, i)?;
            let mut items = items.borrow_mut();
            let at = normalize_index(i, items.len(), "list assignment index out of range")?;
            items.remove(at);
            Ok(())
        }
        (Value::List(items), Index::Slice(bounds)) => {
            let mut items = items.borrow_mut();
            let mut picked = bounds.indices(items.len())?;
            picked.sort_unstable();
            for at in picked.into_iter().rev() {
                items.remove(at);
            }
            Ok(())
        }
        (Value::Dict(dict), Index::Item(key)) => match dict.borrow_mut().remove(key)? {
            Some(_) => Ok(()),
            None => Err(PyException::key_error(key.clone())),
        },
        (other, _) => Err(PyException::type_error(format!(
            "'{}' object doesn't support item deletion",
            other.type_name()
        ))),
    }
}

/// Build a dict from `(key, value)` pairs
pub fn dict_from_pairs(pairs: Vec<Value>) -> Result<Dict, PyException> {
    let mut dict = Dict::new();
    for (position, pair) in pairs.into_iter().enumerate() {
        let items = iterate(&pair).map_err(|_| {
            PyException::type_error(format!(
                "cannot convert dictionary update sequence element #{position} to a sequence"
            ))
        })?;
        match <[Value; 2]>::try_from(items) {
            Ok([key, value]) => dict.insert(key, value)?,
            Err(items) => {
                return Err(PyException::value_error(format!(
                    "dictionary update sequence element #{position} has length {}; 2 is required",
                    items.len()
                )))
            }
        }
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::format::repr;

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_floor_division_and_modulo_round_down() {
        let result = binary_op(Operator::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap();
        assert_eq!(repr(&result), "-4");
        let result = binary_op(Operator::Mod, &Value::Int(-7), &Value::Int(2)).unwrap();
        assert_eq!(repr(&result), "1");
        let result = binary_op(Operator::Mod, &Value::Float(-7.0), &Value::Int(2)).unwrap();
        assert_eq!(repr(&result), "1.0");
    }

    #[test]
    fn test_division_by_zero_messages() {
        let err = binary_op(Operator::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::ZeroDivisionError);
        assert_eq!(err.message, "division by zero");
        let err = binary_op(Operator::FloorDiv, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.message, "integer division or modulo by zero");
    }

    #[test]
    fn test_mixed_operand_errors() {
        let err = binary_op(Operator::Add, &Value::Int(1), &Value::str("a")).unwrap_err();
        assert_eq!(
            err.message,
            "unsupported operand type(s) for +: 'int' and 'str'"
        );
        let err = binary_op(Operator::Add, &Value::str("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(err.message, "can only concatenate str (not \"int\") to str");
    }

    #[test]
    fn test_int_overflow_promotes_to_big_int() {
        let doubled = binary_op(Operator::Mult, &Value::Int(i64::MAX), &Value::Int(2)).unwrap();
        assert_eq!(repr(&doubled), "18446744073709551614");
        let power = binary_op(Operator::Pow, &Value::Int(2), &Value::Int(64)).unwrap();
        assert_eq!(repr(&power), "18446744073709551616");
        let back = binary_op(Operator::FloorDiv, &power, &Value::Int(1 << 32)).unwrap();
        assert!(matches!(back, Value::Int(4_294_967_296)));
        let negated = unary_op(UnaryOp::USub, &Value::Int(i64::MIN)).unwrap();
        assert_eq!(repr(&negated), "9223372036854775808");
        let remainder = binary_op(Operator::Mod, &unary_op(UnaryOp::USub, &power).unwrap(), &Value::Int(7)).unwrap();
        assert_eq!(repr(&remainder), "5");
    }

    #[test]
    fn test_int_float_comparisons_are_exact() {
        let big = Value::Int((1 << 53) + 1);
        assert!(!compare(CmpOp::Eq, &big, &Value::Float((1u64 << 53) as f64)).unwrap());
        assert!(compare(CmpOp::Gt, &big, &Value::Float((1u64 << 53) as f64)).unwrap());
        let huge = binary_op(Operator::Pow, &Value::Int(10), &Value::Int(400)).unwrap();
        assert!(compare(CmpOp::Gt, &huge, &Value::Float(1e300)).unwrap());
        assert!(compare(CmpOp::Lt, &huge, &Value::Float(f64::INFINITY)).unwrap());
        let err = binary_op(Operator::Add, &huge, &Value::Float(1.0)).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::OverflowError);
    }

    #[test]
    fn test_slices_follow_clamping_rules() {
        let list = ints(&[0, 1, 2, 3, 4]);
        let slice = |lower, upper, step| {
            Index::Slice(SliceBounds { lower, upper, step })
        };
        assert_eq!(repr(&get_item(&list, &slice(Some(1), None, None)).unwrap()), "[1, 2, 3, 4]");
        assert_eq!(repr(&get_item(&list, &slice(None, None, Some(-1))).unwrap()), "[4, 3, 2, 1, 0]");
        assert_eq!(repr(&get_item(&list, &slice(Some(-2), Some(100), None)).unwrap()), "[3, 4]");
        assert_eq!(repr(&get_item(&list, &slice(Some(3), Some(1), None)).unwrap()), "[]");
        let err = get_item(&list, &slice(None, None, Some(0))).unwrap_err();
        assert_eq!(err.message, "slice step cannot be zero");

        let range = Value::Range(Range { start: 0, stop: 10, step: 1 });
        assert_eq!(repr(&get_item(&range, &slice(Some(2), None, Some(3))).unwrap()), "range(2, 10, 3)");
    }

    #[test]
    fn test_index_errors() {
        let list = ints(&[1, 2]);
        let err = get_item(&list, &Index::Item(Value::Int(2))).unwrap_err();
        assert_eq!(err.message, "list index out of range");
        assert_eq!(repr(&get_item(&list, &Index::Item(Value::Int(-1))).unwrap()), "2");
        let err = get_item(&Value::str("ab"), &Index::Item(Value::Int(5))).unwrap_err();
        assert_eq!(err.message, "string index out of range");
        let err = get_item(&Value::Int(3), &Index::Item(Value::Int(0))).unwrap_err();
        assert_eq!(err.message, "'int' object is not subscriptable");
    }

    #[test]
    fn test_slice_assignment() {
        let list = ints(&[0, 1, 2, 3]);
        let bounds = Index::Slice(SliceBounds { lower: Some(1), upper: Some(3), step: None });
        set_item(&list, &bounds, ints(&[9])).unwrap();
        assert_eq!(repr(&list), "[0, 9, 3]");
        del_item(&list, &Index::Item(Value::Int(0))).unwrap();
        assert_eq!(repr(&list), "[9, 3]");
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(CmpOp::Eq, &Value::Int(1), &Value::Float(1.0)).unwrap());
        assert!(compare(CmpOp::Lt, &ints(&[1, 2]), &ints(&[1, 3])).unwrap());
        assert!(compare(CmpOp::Lt, &ints(&[1]), &ints(&[1, 0])).unwrap());
        assert!(compare(CmpOp::In, &Value::str("b"), &Value::str("abc")).unwrap());
        let err = compare(CmpOp::Lt, &Value::Int(1), &Value::str("a")).unwrap_err();
        assert_eq!(
            err.message,
            "'<' not supported between instances of 'int' and 'str'"
        );
    }
}
