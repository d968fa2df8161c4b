//! Perturb CLI - batch driver for the perturbation toolkit
//!
//! This crate wires the `perturb-core` operations to files and JSON-lines
//! streams. The command functions live here so they can be tested without
//! spawning the binary.

pub mod commands;

// Re-export commonly used types for convenience
pub use commands::{assemble_records, AssembleOutput, AssembleSummary};
