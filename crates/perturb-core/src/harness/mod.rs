//! Benchmark harness: turns a task's solution and test code into a program
//! that prints one result line per test call, and runs such programs with or
//! without a perturbation.
//!
//! The pieces:
//! - [`calls`] finds and substitutes `candidate(...)` call sites
//! - [`eval`] runs programs in isolation and cross-checks asserts
//! - [`assemble`] builds the harness program for a [`BenchmarkRecord`]
//! - [`checks`] holds self-check programs for the one-based rewrite

pub mod assemble;
pub mod calls;
pub mod checks;
pub mod eval;

#[cfg(test)]
mod tests;

pub use assemble::{remove_docstrings, AssembledProgram, BenchmarkRecord, ProgramAssembler};
pub use calls::{extract_calls, substitute_calls, CallSite};
pub use eval::{eval_program_with_calls, Evaluator};

use crate::transform::Perturbation;
use crate::Result;

/// Parse an optional perturbation name as given on a command line or in a
/// record; `None` and `"none"` both mean unperturbed.
pub fn parse_perturbation(name: Option<&str>) -> Result<Option<Perturbation>> {
    match name {
        None | Some("none") => Ok(None),
        Some(name) => Ok(Some(name.parse()?)),
    }
}
