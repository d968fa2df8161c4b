use std::fmt;

use thiserror::Error;

use super::value::Value;

/// The subset of CPython's built-in exception hierarchy the runtime raises
/// and `except` clauses can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    BaseException,
    Exception,
    ArithmeticError,
    ZeroDivisionError,
    OverflowError,
    LookupError,
    IndexError,
    KeyError,
    ValueError,
    TypeError,
    NameError,
    UnboundLocalError,
    AttributeError,
    AssertionError,
    RuntimeError,
    RecursionError,
    NotImplementedError,
    StopIteration,
    ImportError,
    ModuleNotFoundError,
}

impl ExceptionKind {
    pub const ALL: [ExceptionKind; 20] = [
        ExceptionKind::BaseException,
        ExceptionKind::Exception,
        ExceptionKind::ArithmeticError,
        ExceptionKind::ZeroDivisionError,
        ExceptionKind::OverflowError,
        ExceptionKind::LookupError,
        ExceptionKind::IndexError,
        ExceptionKind::KeyError,
        ExceptionKind::ValueError,
        ExceptionKind::TypeError,
        ExceptionKind::NameError,
        ExceptionKind::UnboundLocalError,
        ExceptionKind::AttributeError,
        ExceptionKind::AssertionError,
        ExceptionKind::RuntimeError,
        ExceptionKind::RecursionError,
        ExceptionKind::NotImplementedError,
        ExceptionKind::StopIteration,
        ExceptionKind::ImportError,
        ExceptionKind::ModuleNotFoundError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExceptionKind::BaseException => "BaseException",
            ExceptionKind::Exception => "Exception",
            ExceptionKind::ArithmeticError => "ArithmeticError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::OverflowError => "OverflowError",
            ExceptionKind::LookupError => "LookupError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::UnboundLocalError => "UnboundLocalError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::AssertionError => "AssertionError",
            ExceptionKind::RuntimeError => "RuntimeError",
            ExceptionKind::RecursionError => "RecursionError",
            ExceptionKind::NotImplementedError => "NotImplementedError",
            ExceptionKind::StopIteration => "StopIteration",
            ExceptionKind::ImportError => "ImportError",
            ExceptionKind::ModuleNotFoundError => "ModuleNotFoundError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn parent(self) -> Option<Self> {
        use ExceptionKind::*;
        match self {
            BaseException => None,
            Exception => Some(BaseException),
            ArithmeticError | LookupError | ValueError | TypeError | NameError
            | AttributeError | AssertionError | RuntimeError | StopIteration | ImportError => {
                Some(Exception)
            }
            ZeroDivisionError | OverflowError => Some(ArithmeticError),
            IndexError | KeyError => Some(LookupError),
            UnboundLocalError => Some(NameError),
            RecursionError | NotImplementedError => Some(RuntimeError),
            ModuleNotFoundError => Some(ImportError),
        }
    }

    /// `issubclass(self, other)`
    pub fn is_subclass_of(self, other: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Python exception propagating through the runtime.
///
/// `args` holds the constructor arguments so `except E as e` can rebind the
/// original object; `message` is `str(e)`.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct PyException {
    pub kind: ExceptionKind,
    pub message: String,
    pub args: Vec<Value>,
}

impl PyException {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let args = if message.is_empty() {
            Vec::new()
        } else {
            vec![Value::str(message.as_str())]
        };
        Self {
            kind,
            message,
            args,
        }
    }

    pub fn matches(&self, kind: ExceptionKind) -> bool {
        self.kind.is_subclass_of(kind)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ValueError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::IndexError, message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ZeroDivisionError, message)
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::OverflowError, message)
    }

    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::new(
            ExceptionKind::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    pub fn name_error(name: &str) -> Self {
        Self::new(
            ExceptionKind::NameError,
            format!("name '{name}' is not defined"),
        )
    }

    /// KeyError reports the repr of the missing key
    pub fn key_error(key: Value) -> Self {
        Self {
            kind: ExceptionKind::KeyError,
            message: super::format::repr(&key),
            args: vec![key],
        }
    }
}
