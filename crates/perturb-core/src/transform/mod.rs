/*!
# Transformations

Source-to-source rewrites applied to benchmark programs before they are run.

- [`type_hints`] removes annotations and `typing` imports.
- [`one_based`] rewrites indexing, slicing and a whitelist of sequence methods
  so the program behaves as if sequences were indexed from 1.
- [`review`] holds the allow-list of hand-checked programs whose own exception
  handling could swallow the faults the rewriter plants.
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{Module, ToSource};
use crate::parser::{parse_program, ParseError};

pub mod one_based;
pub mod parents;
pub mod review;
pub mod type_hints;

#[cfg(test)]
mod tests;

pub use one_based::{rewrite_for_one_based_indexing, OneBasedIndexing, PRELUDE};
pub use parents::{Parent, ParentMap};
pub use review::ReviewList;
pub use type_hints::{remove_type_hints, TypeHintRemover};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A construct the rewriter is not certified to handle
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("program {hash} uses fault markers inside a try block and has not been reviewed")]
    ReviewRequired { hash: String, program: String },

    #[error("unknown perturbation: {0:?}")]
    UnknownPerturbation(String),
}

pub type TransformResult<T> = Result<T, TransformError>;

/// A rewrite over a whole program.
///
/// Rules never mutate their input; the returned module is a fresh tree.
pub trait TransformationRule: Send + Sync {
    /// Human-readable name for this rule
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn transform(&self, module: &Module) -> TransformResult<Module>;

    /// Parse, transform and unparse in one go
    fn transform_source(&self, source: &str) -> TransformResult<String> {
        let module = parse_program(source)?;
        Ok(self.transform(&module)?.to_source())
    }
}

/// Named perturbations that can be requested for a benchmark program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perturbation {
    OneBasedIndexing,
}

impl Perturbation {
    pub const ALL: [Perturbation; 1] = [Perturbation::OneBasedIndexing];

    pub fn name(self) -> &'static str {
        match self {
            Perturbation::OneBasedIndexing => "one_based_indexing",
        }
    }

    /// Rewrite `program` into its perturbed, directly runnable form
    pub fn apply(self, program: &str, reviewed: &ReviewList) -> TransformResult<String> {
        match self {
            Perturbation::OneBasedIndexing => {
                one_based::rewrite_with_review(program, reviewed)
            }
        }
    }
}

impl fmt::Display for Perturbation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Perturbation {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|perturbation| perturbation.name() == s)
            .ok_or_else(|| TransformError::UnknownPerturbation(s.to_string()))
    }
}
