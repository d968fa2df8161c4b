// Assembly of runnable harness programs from benchmark records.
// The result is the cleaned-up solution followed by one
// `print([entry_point(args...)])` line per surviving test call; wrapping the
// result in a list keeps `'1'` and `1` apart in the printed output.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::calls::{extract_calls, CANDIDATE};
use super::eval::Evaluator;
use crate::transform::{remove_type_hints, Perturbation};
use crate::{PerturbConfig, PerturbError, Result};

/// Header of the checking routine in a record's test code
pub const CHECK_HEADER: &str = "def check(candidate):\n";

/// One benchmark task as supplied by the dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub prompt: String,
    pub canonical_solution: String,
    pub test: String,
    pub entry_point: String,
}

impl BenchmarkRecord {
    /// Prompt, solution and test code as one program
    pub fn full_program(&self) -> String {
        format!("{}{}{}", self.prompt, self.canonical_solution, self.test)
    }
}

/// A harness program plus the positions, in the record's test code, of the
/// calls it kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledProgram {
    pub program: String,
    pub call_indices: Vec<usize>,
}

/// Remove docstrings and the `FIX = """...` marker from prompt text.
///
/// Text between triple quotes is dropped wholesale, so this is only meant
/// for prompts where every triple-quoted string is documentation.
pub fn remove_docstrings(text: &str) -> String {
    fn drop_quoted(text: &str, delimiter: &str) -> String {
        text.split(delimiter).step_by(2).collect()
    }

    let text = text.replace("FIX = \"\"\"", "\"\"\"");
    let text = drop_quoted(&text, "\"\"\"");
    let text = text.replace("FIX = '''", "'''");
    let text = drop_quoted(&text, "'''");
    let text = text.replace(":\n    \n", ":\n");
    text.trim_start_matches('\n').to_string()
}

/// Rename calls of `from` to `to`
fn rename_calls(context: &str, from: &str, to: &str) -> Result<String> {
    let pattern = Regex::new(&format!(r"\b{}\(", regex::escape(from)))
        .map_err(|e| PerturbError::Config(format!("bad entry point name {from:?}: {e}")))?;
    Ok(pattern
        .replace_all(context, regex::NoExpand(&format!("{to}(")))
        .into_owned())
}

#[derive(Debug, Clone, Default)]
pub struct ProgramAssembler {
    evaluator: Evaluator,
}

impl ProgramAssembler {
    pub fn new(config: PerturbConfig) -> Self {
        Self {
            evaluator: Evaluator::new(config),
        }
    }

    pub fn with_evaluator(evaluator: Evaluator) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Build the harness program for `record`.
    ///
    /// With a perturbation, calls that index position zero under it are
    /// dropped. When nothing was dropped or deduplicated the unperturbed
    /// output is checked against the record's own asserts.
    pub fn assemble(
        &self,
        record: &BenchmarkRecord,
        perturbation: Option<Perturbation>,
        fn_name: Option<&str>,
    ) -> Result<AssembledProgram> {
        let context = format!(
            "{}{}",
            remove_docstrings(&record.prompt),
            record.canonical_solution
        );
        let mut context = remove_type_hints(&context)?;

        let mut entry_point = record.entry_point.as_str();
        if let Some(name) = fn_name {
            context = rename_calls(&context, entry_point, name)?;
            entry_point = name;
        }

        let parts: Vec<&str> = record.test.split(CHECK_HEADER).collect();
        let [_, test_body] = parts.as_slice() else {
            return Err(PerturbError::Integrity(format!(
                "expected exactly one {CHECK_HEADER:?} header, found {}",
                parts.len().saturating_sub(1)
            )));
        };
        let calls = extract_calls(test_body)?;

        let mut filtered = false;
        let mut formatted: Vec<(usize, String)> = Vec::with_capacity(calls.len());
        for (index, call) in calls.iter().enumerate() {
            let line = format!("print([{entry_point}{}])", &call.text[CANDIDATE.len()..]);
            if formatted.iter().any(|(_, seen)| *seen == line) {
                filtered = true;
                continue;
            }
            formatted.push((index, line));
        }
        if formatted.len() < calls.len() {
            warn!(
                duplicates = calls.len() - formatted.len(),
                "removed duplicate calls"
            );
        }

        if let Some(perturbation) = perturbation {
            let mut kept = Vec::with_capacity(formatted.len());
            for (index, line) in formatted {
                let single = format!("{context}\n\n{line}");
                match self
                    .evaluator
                    .eval_program_with_calls(&single, Some(perturbation))
                {
                    Ok(output) if output.len() == 1 => kept.push((index, line)),
                    Ok(output) => {
                        return Err(PerturbError::Integrity(format!(
                            "call {index} printed {} lines",
                            output.len()
                        )))
                    }
                    Err(err) if err.is_invalid_index() => {
                        warn!(call = index, %perturbation, "dropping call that indexes position zero");
                        filtered = true;
                    }
                    Err(err) => return Err(err),
                }
            }
            formatted = kept;
        }

        let (call_indices, lines): (Vec<usize>, Vec<String>) = formatted.into_iter().unzip();
        let program = format!("{context}\n\n{}", lines.join("\n"));

        if !filtered && self.evaluator.config().verify_with_asserts {
            let outputs = self.evaluator.eval_program_with_calls(&program, None)?;
            self.evaluator.check_asserts_pass(record, &outputs)?;
        } else if !lines.is_empty() {
            self.evaluator.run_program(&program, None)?;
        }

        debug!(
            kept = call_indices.len(),
            total = calls.len(),
            filtered,
            "assembled program"
        );
        Ok(AssembledProgram {
            program,
            call_indices,
        })
    }
}
