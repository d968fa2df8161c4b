use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    rc::Rc,
};

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive, Zero};

use super::errors::{ExceptionKind, PyException};
use super::hash;
pub use super::set::Set;
use crate::ast::{Arguments, Expr, Stmt};

pub type ScopeRef = Rc<RefCell<Scope>>;

/// Built-in classes that can be called, compared with `type(x)` and used
/// with `isinstance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Int,
    Float,
    Str,
    Bool,
    List,
    Tuple,
    Dict,
    Set,
    Range,
    NoneType,
    Function,
    Type,
    Object,
}

impl TypeKind {
    pub fn name(self) -> &'static str {
        match self {
            TypeKind::Int => "int",
            TypeKind::Float => "float",
            TypeKind::Str => "str",
            TypeKind::Bool => "bool",
            TypeKind::List => "list",
            TypeKind::Tuple => "tuple",
            TypeKind::Dict => "dict",
            TypeKind::Set => "set",
            TypeKind::Range => "range",
            TypeKind::NoneType => "NoneType",
            TypeKind::Function => "function",
            TypeKind::Type => "type",
            TypeKind::Object => "object",
        }
    }

    /// Names bound in the builtins namespace
    pub fn from_builtin_name(name: &str) -> Option<Self> {
        let kind = match name {
            "int" => TypeKind::Int,
            "float" => TypeKind::Float,
            "str" => TypeKind::Str,
            "bool" => TypeKind::Bool,
            "list" => TypeKind::List,
            "tuple" => TypeKind::Tuple,
            "dict" => TypeKind::Dict,
            "set" => TypeKind::Set,
            "range" => TypeKind::Range,
            "type" => TypeKind::Type,
            "object" => TypeKind::Object,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            self.stop.saturating_sub(self.start)
        } else {
            self.start.saturating_sub(self.stop)
        };
        if span <= 0 {
            return 0;
        }
        let step = self.step.unsigned_abs();
        ((span as u64).div_ceil(step)) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> i64 {
        self.start + self.step * index as i64
    }

    pub fn contains(&self, value: i64) -> bool {
        let in_bounds = if self.step > 0 {
            value >= self.start && value < self.stop
        } else {
            value <= self.start && value > self.stop
        };
        in_bounds && (value - self.start) % self.step == 0
    }

    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// Hashable projection of a value; equal values hash equally the way they
/// do in Python (`1 == 1.0 == True`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    /// Integer outside the `i64` range
    Long(BigInt),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
    /// `(len, start, step)` with the parts that do not affect equality set
    /// to `None`
    Range(Vec<HashKey>),
    Type(TypeKind),
    ExceptionType(ExceptionKind),
    Builtin(&'static str),
    Identity(usize),
}

impl HashKey {
    pub fn from_value(value: &Value) -> Result<Self, PyException> {
        let key = match value {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(*b as i64),
            Value::Int(i) => HashKey::Int(*i),
            Value::Long(n) => HashKey::Long((**n).clone()),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                match BigInt::from_f64(*f) {
                    Some(n) => match n.to_i64() {
                        Some(i) => HashKey::Int(i),
                        None => HashKey::Long(n),
                    },
                    None => HashKey::Float(f.to_bits()),
                }
            }
            Value::Float(f) => HashKey::Float(f.to_bits()),
            Value::Str(s) => HashKey::Str(s.clone()),
            Value::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(HashKey::from_value)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Type(kind) => HashKey::Type(*kind),
            Value::ExceptionType(kind) => HashKey::ExceptionType(*kind),
            Value::Builtin(name) => HashKey::Builtin(name),
            Value::Function(f) => HashKey::Identity(Rc::as_ptr(f) as *const () as usize),
            Value::Exception(e) => HashKey::Identity(Rc::as_ptr(e) as *const () as usize),
            Value::Module(m) => HashKey::Identity(Rc::as_ptr(m) as *const () as usize),
            Value::Range(r) => {
                let len = r.len();
                HashKey::Range(vec![
                    HashKey::Int(len as i64),
                    if len > 0 { HashKey::Int(r.start) } else { HashKey::None },
                    if len > 1 { HashKey::Int(r.step) } else { HashKey::None },
                ])
            }
            other => {
                return Err(PyException::type_error(format!(
                    "unhashable type: '{}'",
                    other.type_name()
                )))
            }
        };
        Ok(key)
    }

    /// The value `hash()` returns for the key's object
    pub fn py_hash(&self) -> i64 {
        match self {
            HashKey::None => hash::NONE_HASH,
            HashKey::Int(i) => hash::int_hash(*i),
            HashKey::Long(n) => hash::long_hash(n),
            HashKey::Float(bits) => hash::float_hash(f64::from_bits(*bits)),
            HashKey::Str(s) => hash::str_hash(s),
            HashKey::Tuple(items) | HashKey::Range(items) => {
                hash::tuple_hash(items.iter().map(HashKey::py_hash))
            }
            HashKey::Type(kind) => hash::str_hash(kind.name()),
            HashKey::ExceptionType(kind) => hash::str_hash(kind.name()),
            HashKey::Builtin(name) => hash::str_hash(name),
            HashKey::Identity(address) => hash::pointer_hash(*address),
        }
    }
}

/// Insertion-ordered dict. Each entry keeps the original key object so that
/// iteration returns `1` rather than `True` when `True` was inserted second.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: IndexMap<HashKey, (Value, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, PyException> {
        let hash = HashKey::from_value(key)?;
        Ok(self.entries.get(&hash).map(|(_, value)| value.clone()))
    }

    pub fn contains(&self, key: &Value) -> Result<bool, PyException> {
        Ok(self.entries.contains_key(&HashKey::from_value(key)?))
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), PyException> {
        let hash = HashKey::from_value(&key)?;
        match self.entries.get_mut(&hash) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(hash, (key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, PyException> {
        let hash = HashKey::from_value(key)?;
        Ok(self.entries.shift_remove(&hash).map(|(_, value)| value))
    }

    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        self.entries.pop().map(|(_, entry)| entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.values().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.values().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Keys,
    Values,
    Items,
}

impl ViewKind {
    pub fn type_name(self) -> &'static str {
        match self {
            ViewKind::Keys => "dict_keys",
            ViewKind::Values => "dict_values",
            ViewKind::Items => "dict_items",
        }
    }

    pub fn iterator_name(self) -> &'static str {
        match self {
            ViewKind::Keys => "dict_keyiterator",
            ViewKind::Values => "dict_valueiterator",
            ViewKind::Items => "dict_itemiterator",
        }
    }
}

/// Live `keys()`/`values()`/`items()` view; later changes to the dict show
/// through.
#[derive(Debug)]
pub struct DictView {
    pub kind: ViewKind,
    pub dict: Rc<RefCell<Dict>>,
}

impl DictView {
    pub fn len(&self) -> usize {
        self.dict.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys and items views behave like sets
    pub fn is_set_like(&self) -> bool {
        self.kind != ViewKind::Values
    }

    pub fn items(&self) -> Vec<Value> {
        let dict = self.dict.borrow();
        match self.kind {
            ViewKind::Keys => dict.keys(),
            ViewKind::Values => dict.values(),
            ViewKind::Items => dict
                .items()
                .into_iter()
                .map(|(key, value)| Value::tuple(vec![key, value]))
                .collect(),
        }
    }
}

/// Remaining items of an eagerly evaluated iterator (`map`, `zip`, generator
/// expressions, `iter(...)`).
#[derive(Debug, Clone)]
pub struct IteratorState {
    pub label: &'static str,
    pub items: VecDeque<Value>,
}

pub enum FunctionBody {
    Block(Vec<Stmt>),
    Lambda(Expr),
}

/// A user-defined function or lambda closed over its defining scope.
pub struct Function {
    pub name: String,
    pub args: Arguments,
    pub defaults: Vec<Value>,
    pub kw_defaults: Vec<Option<Value>>,
    pub body: FunctionBody,
    pub closure: ScopeRef,
    /// Names assigned anywhere in the body, which Python treats as local
    pub locals: Rc<HashSet<String>>,
    pub globals: HashSet<String>,
    pub nonlocals: HashSet<String>,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ExceptionObject {
    pub kind: ExceptionKind,
    pub args: Vec<Value>,
}

#[derive(Debug)]
pub struct ModuleObject {
    pub name: String,
    pub attrs: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Comprehension,
}

pub struct Scope {
    pub kind: ScopeKind,
    pub vars: HashMap<String, Value>,
    pub parent: Option<ScopeRef>,
    pub locals: Rc<HashSet<String>>,
    pub globals: HashSet<String>,
    pub nonlocals: HashSet<String>,
}

impl Scope {
    pub fn module() -> ScopeRef {
        Rc::new(RefCell::new(Self {
            kind: ScopeKind::Module,
            vars: HashMap::new(),
            parent: None,
            locals: Rc::new(HashSet::new()),
            globals: HashSet::new(),
            nonlocals: HashSet::new(),
        }))
    }

    pub fn child(kind: ScopeKind, parent: ScopeRef, locals: Rc<HashSet<String>>) -> ScopeRef {
        Rc::new(RefCell::new(Self {
            kind,
            vars: HashMap::new(),
            parent: Some(parent),
            locals,
            globals: HashSet::new(),
            nonlocals: HashSet::new(),
        }))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.vars.keys().collect();
        names.sort();
        f.debug_struct("Scope")
            .field("kind", &self.kind)
            .field("vars", &names)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    /// Integer outside the `i64` range; see [`Value::from_bigint`]
    Long(Rc<BigInt>),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<Set>>),
    DictView(Rc<DictView>),
    Range(Range),
    Iterator(Rc<RefCell<IteratorState>>),
    Function(Rc<Function>),
    Builtin(&'static str),
    BoundMethod(Rc<BoundMethod>),
    /// `str.lower` and friends accessed on the class
    MethodDescriptor(TypeKind, Rc<str>),
    Type(TypeKind),
    ExceptionType(ExceptionKind),
    Exception(Rc<ExceptionObject>),
    Module(Rc<ModuleObject>),
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn set(set: Set) -> Self {
        Value::Set(Rc::new(RefCell::new(set)))
    }

    /// Integer value, kept in the `i64` fast path whenever it fits
    pub fn from_bigint(value: BigInt) -> Self {
        match value.to_i64() {
            Some(i) => Value::Int(i),
            None => Value::Long(Rc::new(value)),
        }
    }

    pub fn iterator(label: &'static str, items: Vec<Value>) -> Self {
        Value::Iterator(Rc::new(RefCell::new(IteratorState {
            label,
            items: items.into(),
        })))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Long(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::DictView(view) => view.kind.type_name(),
            Value::Range(_) => "range",
            Value::Iterator(state) => state.borrow().label,
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::BoundMethod(_) => "method",
            Value::MethodDescriptor(..) => "method_descriptor",
            Value::Type(_) | Value::ExceptionType(_) => "type",
            Value::Exception(e) => e.kind.name(),
            Value::Module(_) => "module",
        }
    }

    /// The class object `type(x)` returns, where the runtime models one
    pub fn type_kind(&self) -> TypeKind {
        match self {
            Value::None => TypeKind::NoneType,
            Value::Bool(_) => TypeKind::Bool,
            Value::Int(_) | Value::Long(_) => TypeKind::Int,
            Value::Float(_) => TypeKind::Float,
            Value::Str(_) => TypeKind::Str,
            Value::List(_) => TypeKind::List,
            Value::Tuple(_) => TypeKind::Tuple,
            Value::Dict(_) => TypeKind::Dict,
            Value::Set(_) => TypeKind::Set,
            Value::Range(_) => TypeKind::Range,
            Value::Function(_) => TypeKind::Function,
            Value::Type(_) | Value::ExceptionType(_) => TypeKind::Type,
            _ => TypeKind::Object,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Long(n) => !n.is_zero(),
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => !dict.borrow().is_empty(),
            Value::Set(set) => !set.borrow().is_empty(),
            Value::DictView(view) => !view.is_empty(),
            Value::Range(range) => !range.is_empty(),
            _ => true,
        }
    }

    /// Integer view used for indices and counts (`True` counts as 1)
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<BigInt> {
        match self {
            Value::Int(i) => Some(BigInt::from(*i)),
            Value::Bool(b) => Some(BigInt::from(*b as i64)),
            Value::Long(n) => Some((**n).clone()),
            _ => None,
        }
    }

    /// `int` or `bool`, of any size
    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Bool(_) | Value::Long(_))
    }

    /// Lossy float view; out-of-range ints give an infinity
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Long(n) => n.to_f64(),
            Value::Bool(b) => Some(*b as i64 as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_instance_of(&self, kind: TypeKind) -> bool {
        match (self, kind) {
            (_, TypeKind::Object) => true,
            (Value::Bool(_), TypeKind::Int) => true,
            (Value::ExceptionType(_), TypeKind::Type) => true,
            (value, kind) => value.type_kind() == kind,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::str(value)
    }
}
