//! # Perturb Core
//!
//! Source-level perturbations of short Python benchmark programs:
//! - Syntax tree, tree-sitter front-end and CPython-style unparser
//! - Type-hint removal and the one-based indexing rewrite
//! - An in-process runtime for the Python subset the benchmarks use
//! - Harness assembly: call extraction, per-call filtering and evaluation
//!
//! The `perturb-cli` crate drives these over benchmark files.

#![warn(clippy::all)]

use std::path::Path;

use serde::{Deserialize, Serialize};

pub mod ast;
pub mod harness;
pub mod interpreter;
pub mod parser;
pub mod transform;

pub use ast::{Expr, Module, Stmt, ToSource};
pub use harness::{
    eval_program_with_calls, extract_calls, remove_docstrings, substitute_calls, AssembledProgram,
    BenchmarkRecord, CallSite, Evaluator, ProgramAssembler,
};
pub use interpreter::{ExceptionKind, Interpreter, PyException, Value};
pub use parser::{create_parser, parse_program, ParseError, Parser, PythonParser};
pub use transform::{
    remove_type_hints, rewrite_for_one_based_indexing, Perturbation, ReviewList, TransformError,
    TransformationRule,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_LOG_DIRECTIVES: &str = "perturb_core=info,perturb_cli=info";

/// Initialize tracing for the perturbation tools.
///
/// `RUST_LOG` wins when set. Calling this more than once is harmless.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_LOG_DIRECTIVES);
}

/// Initialize tracing with `directives` as the fallback filter
pub fn init_tracing_with(directives: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Runtime and harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbConfig {
    /// Maximum call depth of executed programs
    pub recursion_limit: usize,
    /// Program hashes accepted in addition to the built-in review list
    pub extra_reviewed_hashes: Vec<String>,
    /// Cross-check assembled programs against the record's own asserts
    pub verify_with_asserts: bool,
}

impl Default for PerturbConfig {
    fn default() -> Self {
        Self {
            recursion_limit: interpreter::DEFAULT_RECURSION_LIMIT,
            extra_reviewed_hashes: Vec::new(),
            verify_with_asserts: true,
        }
    }
}

impl PerturbConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PerturbError::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
            .map_err(|e| PerturbError::Config(format!("{}: {e}", path.display())))
    }

    pub fn review_list(&self) -> ReviewList {
        ReviewList::new(self.extra_reviewed_hashes.iter().cloned())
    }
}

/// Error types for perturbation operations
#[derive(thiserror::Error, Debug)]
pub enum PerturbError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The rewriter met a construct it does not handle
    #[error("Unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// A perturbed program indexed position zero
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// Any other runtime fault of the executed program
    #[error("Execution error: {kind}: {message}")]
    Execution {
        kind: ExceptionKind,
        message: String,
    },

    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// The safety valve tripped; the program must be inspected by hand
    #[error("Manual review required for program {hash}")]
    ReviewRequired { hash: String, program: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PerturbError {
    pub fn is_invalid_index(&self) -> bool {
        matches!(self, PerturbError::InvalidIndex(_))
    }

    pub fn is_review_required(&self) -> bool {
        matches!(self, PerturbError::ReviewRequired { .. })
    }
}

impl From<TransformError> for PerturbError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Parse(e) => PerturbError::Parse(e),
            TransformError::Unsupported(what) | TransformError::NotImplemented(what) => {
                PerturbError::UnsupportedConstruct(what)
            }
            TransformError::ReviewRequired { hash, program } => {
                PerturbError::ReviewRequired { hash, program }
            }
            TransformError::UnknownPerturbation(name) => {
                PerturbError::Config(format!("unknown perturbation {name:?}"))
            }
        }
    }
}

/// Result type for perturbation operations
pub type Result<T> = std::result::Result<T, PerturbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_partial_json() {
        let config = PerturbConfig::from_json_str(r#"{"recursion_limit": 500}"#).unwrap();
        assert_eq!(config.recursion_limit, 500);
        assert!(config.verify_with_asserts);
        assert!(config.extra_reviewed_hashes.is_empty());
        assert_eq!(PerturbConfig::default().recursion_limit, 1000);
    }

    #[test]
    fn test_config_errors() {
        let err = PerturbConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, PerturbError::Config(_)));

        let err = PerturbConfig::from_json_file("/nonexistent/perturb.json").unwrap_err();
        assert!(matches!(err, PerturbError::Io(_)));
    }

    #[test]
    fn test_config_review_list() {
        let config = PerturbConfig {
            extra_reviewed_hashes: vec!["abc".to_string()],
            ..Default::default()
        };
        let reviewed = config.review_list();
        assert!(reviewed.is_reviewed("abc"));
        assert!(reviewed.is_reviewed("2639430b68f6173d81687fa4a0281d77"));
    }

    #[test]
    fn test_transform_error_mapping() {
        let err: PerturbError = TransformError::NotImplemented("x".into()).into();
        assert!(matches!(err, PerturbError::UnsupportedConstruct(_)));
        let err: PerturbError = TransformError::UnknownPerturbation("y".into()).into();
        assert!(matches!(err, PerturbError::Config(_)));
        let err: PerturbError = TransformError::ReviewRequired {
            hash: "h".into(),
            program: "p".into(),
        }
        .into();
        assert!(err.is_review_required());
    }
}
