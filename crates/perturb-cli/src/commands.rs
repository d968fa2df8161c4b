//! Command implementations behind the `perturb-cli` subcommands
//!
//! Every command takes already-read input and returns data; `main` owns the
//! terminal. Stdout carries only programs and JSON lines.

use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use perturb_core::harness::checks::{
    run_one_based_indexing_checks, run_one_based_indexing_unit_tests,
};
use perturb_core::{
    remove_type_hints, BenchmarkRecord, Evaluator, Perturbation, PerturbConfig, ProgramAssembler,
    ReviewList,
};
use serde::Serialize;
use tracing::{info, warn};

/// Read a file, or stdin when `path` is `None` or `-`
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

/// Configuration from `path`, or the defaults
pub fn load_config(path: Option<&Path>) -> Result<PerturbConfig> {
    match path {
        Some(path) => PerturbConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PerturbConfig::default()),
    }
}

/// Program text with type annotations and `typing` imports removed
pub fn strip(source: &str) -> Result<String> {
    remove_type_hints(source).context("Failed to strip type hints")
}

/// Program text as rewritten by `perturbation`
pub fn rewrite(source: &str, perturbation: Perturbation, config: &PerturbConfig) -> Result<String> {
    let reviewed: ReviewList = config.review_list();
    perturbation
        .apply(source, &reviewed)
        .with_context(|| format!("Failed to apply {perturbation}"))
}

/// Printed lines of `source`, optionally perturbed
pub fn eval(
    source: &str,
    perturbation: Option<Perturbation>,
    config: &PerturbConfig,
) -> Result<Vec<String>> {
    let evaluator = Evaluator::new(config.clone());
    evaluator
        .eval_program_with_calls(source, perturbation)
        .context("Program evaluation failed")
}

/// Run both rewriter self-checks and return the checked output lines
pub fn self_check(config: &PerturbConfig) -> Result<Vec<String>> {
    let evaluator = Evaluator::new(config.clone());
    run_one_based_indexing_unit_tests(&evaluator).context("One-based unit tests failed")?;
    run_one_based_indexing_checks(&evaluator).context("One-based checks failed")
}

/// One JSON line of `assemble` output
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AssembleOutput {
    Assembled {
        task_id: Option<String>,
        program: String,
        call_indices: Vec<usize>,
    },
    Failed {
        task_id: Option<String>,
        error: String,
    },
}

/// Counts over one `assemble` run
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct AssembleSummary {
    pub records: usize,
    pub assembled: usize,
    pub failed: usize,
    /// Records that kept no calls at all
    pub empty: usize,
}

/// Assemble every JSON-lines record from `input`, writing one JSON line per
/// record to `output`.
///
/// A record that fails to assemble is reported in its output line and the
/// run continues; unreadable input lines abort the run.
pub fn assemble_records(
    input: impl BufRead,
    mut output: impl Write,
    perturbation: Option<Perturbation>,
    fn_name: Option<&str>,
    config: &PerturbConfig,
) -> Result<AssembleSummary> {
    let assembler = ProgramAssembler::new(config.clone());
    let mut summary = AssembleSummary::default();

    for (line_no, line) in input.lines().enumerate() {
        let line = line.context("Failed to read record")?;
        if line.trim().is_empty() {
            continue;
        }
        let record: BenchmarkRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record on line {}", line_no + 1))?;
        summary.records += 1;

        let result = match assembler.assemble(&record, perturbation, fn_name) {
            Ok(assembled) => {
                summary.assembled += 1;
                if assembled.call_indices.is_empty() {
                    summary.empty += 1;
                }
                AssembleOutput::Assembled {
                    task_id: record.task_id,
                    program: assembled.program,
                    call_indices: assembled.call_indices,
                }
            }
            Err(err) => {
                summary.failed += 1;
                warn!(task = ?record.task_id, error = %err, "record failed to assemble");
                AssembleOutput::Failed {
                    task_id: record.task_id,
                    error: err.to_string(),
                }
            }
        };
        serde_json::to_writer(&mut output, &result)?;
        writeln!(output)?;
    }

    info!(
        records = summary.records,
        assembled = summary.assembled,
        failed = summary.failed,
        empty = summary.empty,
        "assemble finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_and_rewrite() {
        assert_eq!(strip("x: int = 1\n").unwrap(), "x = 1");
        let rewritten = rewrite(
            "print(xs[1])\n",
            Perturbation::OneBasedIndexing,
            &PerturbConfig::default(),
        )
        .unwrap();
        assert!(rewritten.starts_with("old_enumerate = enumerate\n"));
    }

    #[test]
    fn test_eval_reports_context() {
        let err = eval("print(1 // 0)\n", None, &PerturbConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "Program evaluation failed");
        assert!(format!("{err:#}").contains("ZeroDivisionError"));
    }

    #[test]
    fn test_self_check() {
        let lines = self_check(&PerturbConfig::default()).unwrap();
        assert_eq!(lines[0], "[[1, 2]]");
    }

    #[test]
    fn test_load_config_default() {
        assert_eq!(load_config(None).unwrap(), PerturbConfig::default());
    }
}
