//! Execution of assembled programs.
//!
//! Each run gets a fresh [`Interpreter`] on its own thread with a large stack,
//! so deeply recursive benchmark solutions hit the configured recursion limit
//! long before the host stack. Only plain data crosses back to the caller.

use std::thread;

use tracing::debug;

use super::assemble::BenchmarkRecord;
use super::calls::{extract_calls, substitute_calls};
use crate::interpreter::{ExceptionKind, Interpreter};
use crate::parser::{parse_program, ParseError};
use crate::transform::{Perturbation, ReviewList};
use crate::{PerturbConfig, PerturbError, Result};

const EVAL_STACK_SIZE: usize = 256 * 1024 * 1024;

/// How a run on the evaluation thread ended, in a form that can leave it
enum RunFailure {
    Parse(ParseError),
    Raised { kind: ExceptionKind, message: String },
}

fn run_isolated(program: &str, recursion_limit: usize) -> std::result::Result<String, RunFailure> {
    let module = parse_program(program).map_err(RunFailure::Parse)?;
    let mut interp = Interpreter::new(recursion_limit);
    match interp.exec_module(&module) {
        Ok(()) => Ok(interp.take_output()),
        Err(exception) => Err(RunFailure::Raised {
            kind: exception.kind,
            message: exception.message,
        }),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: PerturbConfig,
    reviewed: ReviewList,
}

impl Evaluator {
    pub fn new(config: PerturbConfig) -> Self {
        let reviewed = config.review_list();
        Self { config, reviewed }
    }

    pub fn config(&self) -> &PerturbConfig {
        &self.config
    }

    /// The program text that actually runs for `perturbation`
    pub fn prepare(&self, program: &str, perturbation: Option<Perturbation>) -> Result<String> {
        match perturbation {
            Some(perturbation) => Ok(perturbation.apply(program, &self.reviewed)?),
            None => Ok(program.to_string()),
        }
    }

    /// Run `program` and return its printed lines.
    ///
    /// Output must end with a newline; the empty segment after it is dropped.
    pub fn eval_program_with_calls(
        &self,
        program: &str,
        perturbation: Option<Perturbation>,
    ) -> Result<Vec<String>> {
        let output = self.execute(program, perturbation)?;
        let Some(body) = output.strip_suffix('\n') else {
            return Err(PerturbError::Integrity(format!(
                "program output {output:?} does not end with a newline"
            )));
        };
        Ok(body.split('\n').map(str::to_string).collect())
    }

    /// Run `program` for its side effects only
    pub fn run_program(&self, program: &str, perturbation: Option<Perturbation>) -> Result<()> {
        self.execute(program, perturbation).map(|_| ())
    }

    /// Re-run the record's own checking routine with every candidate call
    /// replaced by the value the harness printed for it.
    pub fn check_asserts_pass(
        &self,
        record: &BenchmarkRecord,
        called_values: &[String],
    ) -> Result<()> {
        let program = record.full_program();
        let calls = extract_calls(&program)?;
        let substituted = substitute_calls(&program, &calls, called_values)?;
        let checked = format!("{substituted}\n\ncheck({})\n", record.entry_point);
        debug!(calls = calls.len(), "checking asserts with substituted values");
        self.run_program(&checked, None)
    }

    fn execute(&self, program: &str, perturbation: Option<Perturbation>) -> Result<String> {
        let program = self.prepare(program, perturbation)?;
        let recursion_limit = self.config.recursion_limit;
        let handle = thread::Builder::new()
            .name("perturb-eval".to_string())
            .stack_size(EVAL_STACK_SIZE)
            .spawn(move || run_isolated(&program, recursion_limit))?;
        let outcome = handle
            .join()
            .map_err(|_| PerturbError::Integrity("evaluation thread panicked".to_string()))?;
        match outcome {
            Ok(output) => {
                debug!(bytes = output.len(), perturbed = perturbation.is_some(), "program ran");
                Ok(output)
            }
            Err(RunFailure::Parse(err)) => Err(PerturbError::Parse(err)),
            Err(RunFailure::Raised { kind, message })
                if perturbation.is_some() && kind == ExceptionKind::ZeroDivisionError =>
            {
                Err(PerturbError::InvalidIndex(message))
            }
            Err(RunFailure::Raised { kind, message }) => {
                Err(PerturbError::Execution { kind, message })
            }
        }
    }
}

/// [`Evaluator::eval_program_with_calls`] with the default configuration
pub fn eval_program_with_calls(
    program: &str,
    perturbation: Option<Perturbation>,
) -> Result<Vec<String>> {
    Evaluator::default().eval_program_with_calls(program, perturbation)
}
