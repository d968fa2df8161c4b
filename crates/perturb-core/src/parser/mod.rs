// Parser module - turns Python source text into the crate's syntax tree
use thiserror::Error;

use crate::ast::Module;

pub mod python;

#[cfg(test)]
mod tests;

pub use python::PythonParser;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("failed to load the Python grammar: {0}")]
    Language(String),

    #[error("tree-sitter returned no syntax tree")]
    NoTree,

    #[error("syntax error at line {line}, column {column} near {snippet:?}")]
    Syntax {
        line: usize,
        column: usize,
        snippet: String,
    },

    #[error("unsupported syntax at line {line}: {construct}")]
    Unsupported { construct: String, line: usize },

    #[error("invalid literal at line {line}: {message}")]
    Literal { message: String, line: usize },

    #[error("unknown parser type: {0}")]
    UnknownParser(String),
}

/// Trait for source parsers
pub trait Parser: Send {
    /// Parse a complete program
    fn parse_program(&mut self, source: &str) -> Result<Module, ParseError>;

    /// Get parser name for debugging
    fn name(&self) -> &'static str;
}

/// Create a parser based on type
pub fn create_parser(parser_type: &str) -> Result<Box<dyn Parser>, ParseError> {
    match parser_type {
        "python" => Ok(Box::new(PythonParser::new()?)),
        other => Err(ParseError::UnknownParser(other.to_string())),
    }
}

/// Parse `source` with a freshly configured Python parser.
pub fn parse_program(source: &str) -> Result<Module, ParseError> {
    PythonParser::new()?.parse_module(source)
}
